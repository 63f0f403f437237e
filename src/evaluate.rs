// src/evaluate.rs

//! Per-record parameter computation.
//!
//! `evaluate` is the pure heart of the pipeline: record in, fully populated
//! audio parameters out. It never reads the audio graph or any playback
//! state, so it is trivially repeatable for the visualizer and for tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::mapping::{Mapping, MappingSet, ParamId};
use crate::record::{resolve_numeric, Record};

/// Per-parameter `(data_min, data_max)` over all records of a session.
///
/// Computed exactly once at playback start and never recomputed mid-session;
/// a parameter whose mapping gained a path afterwards simply falls back to
/// its fixed value until the next session.
#[derive(Debug, Clone, Default)]
pub struct DataRanges {
    ranges: HashMap<ParamId, (f64, f64)>,
}

impl DataRanges {
    /// Scans all records once for every data-driven mapping.
    pub fn compute(records: &[Record], set: &MappingSet) -> DataRanges {
        let mut ranges = HashMap::new();
        for mapping in set.mappings() {
            if !mapping.is_data_driven() {
                continue;
            }
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            let mut seen = false;
            for record in records {
                if let Some(v) = resolve_numeric(record, &mapping.path) {
                    min = min.min(v);
                    max = max.max(v);
                    seen = true;
                }
            }
            if seen {
                ranges.insert(mapping.id, (min, max));
            }
        }
        DataRanges { ranges }
    }

    pub fn get(&self, id: ParamId) -> Option<(f64, f64)> {
        self.ranges.get(&id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// A fully populated audio-parameter record for one tick.
///
/// Carries both mode's fields; parameters outside the active set keep their
/// declared defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AudioParams {
    pub frequency: f64,
    pub pitch: f64,
    pub sample_offset: f64,
    pub duration: f64,
    pub note_spacing: f64,
    pub pan: f64,
    pub filter_freq: f64,
    pub filter_q: f64,
    pub delay_time: f64,
    pub delay_feedback: f64,
    pub delay_mix: f64,
    pub reverb_decay: f64,
    pub reverb_mix: f64,
    pub attack: f64,
    pub release: f64,
}

impl Default for AudioParams {
    fn default() -> Self {
        AudioParams {
            frequency: ParamId::Frequency.spec().default,
            pitch: ParamId::Pitch.spec().default,
            sample_offset: ParamId::SampleOffset.spec().default,
            duration: ParamId::Duration.spec().default,
            note_spacing: ParamId::NoteSpacing.spec().default,
            pan: ParamId::Pan.spec().default,
            filter_freq: ParamId::FilterFreq.spec().default,
            filter_q: ParamId::FilterQ.spec().default,
            delay_time: ParamId::DelayTime.spec().default,
            delay_feedback: ParamId::DelayFeedback.spec().default,
            delay_mix: ParamId::DelayMix.spec().default,
            reverb_decay: ParamId::ReverbDecay.spec().default,
            reverb_mix: ParamId::ReverbMix.spec().default,
            attack: ParamId::Attack.spec().default,
            release: ParamId::Release.spec().default,
        }
    }
}

impl AudioParams {
    fn set(&mut self, id: ParamId, value: f64) {
        match id {
            ParamId::Frequency => self.frequency = value,
            ParamId::Pitch => self.pitch = value,
            ParamId::SampleOffset => self.sample_offset = value,
            ParamId::Duration => self.duration = value,
            ParamId::NoteSpacing => self.note_spacing = value,
            ParamId::Pan => self.pan = value,
            ParamId::FilterFreq => self.filter_freq = value,
            ParamId::FilterQ => self.filter_q = value,
            ParamId::DelayTime => self.delay_time = value,
            ParamId::DelayFeedback => self.delay_feedback = value,
            ParamId::DelayMix => self.delay_mix = value,
            ParamId::ReverbDecay => self.reverb_decay = value,
            ParamId::ReverbMix => self.reverb_mix = value,
            ParamId::Attack => self.attack = value,
            ParamId::Release => self.release = value,
        }
    }

    pub fn get(&self, id: ParamId) -> f64 {
        match id {
            ParamId::Frequency => self.frequency,
            ParamId::Pitch => self.pitch,
            ParamId::SampleOffset => self.sample_offset,
            ParamId::Duration => self.duration,
            ParamId::NoteSpacing => self.note_spacing,
            ParamId::Pan => self.pan,
            ParamId::FilterFreq => self.filter_freq,
            ParamId::FilterQ => self.filter_q,
            ParamId::DelayTime => self.delay_time,
            ParamId::DelayFeedback => self.delay_feedback,
            ParamId::DelayMix => self.delay_mix,
            ParamId::ReverbDecay => self.reverb_decay,
            ParamId::ReverbMix => self.reverb_mix,
            ParamId::Attack => self.attack,
            ParamId::Release => self.release,
        }
    }
}

/// Computes one mapped parameter: extract, normalize, curve, rescale.
/// Falls back to `fixed` on a path miss or non-numeric value, and to `min`
/// on a degenerate data range.
pub fn evaluate_one(record: &Record, mapping: &Mapping, range: Option<(f64, f64)>) -> f64 {
    if !mapping.is_data_driven() {
        return mapping.fixed;
    }
    let Some((data_min, data_max)) = range else {
        return mapping.fixed;
    };
    let Some(raw) = resolve_numeric(record, &mapping.path) else {
        return mapping.fixed;
    };
    if !raw.is_finite() {
        return mapping.fixed;
    }
    if data_max == data_min {
        return mapping.min;
    }
    let n = ((raw - data_min) / (data_max - data_min)).clamp(0.0, 1.0);
    let curved = mapping.curve.apply(n);
    mapping.min + curved * (mapping.max - mapping.min)
}

/// Produces the audio parameters for one record.
pub fn evaluate(record: &Record, set: &MappingSet, ranges: &DataRanges) -> AudioParams {
    let mut params = AudioParams::default();
    for mapping in set.mappings() {
        params.set(mapping.id, evaluate_one(record, mapping, ranges.get(mapping.id)));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{Curve, MappingPatch};
    use crate::record::discover;
    use crate::settings::EngineMode;
    use serde_json::json;

    fn single_mapping_set(path: &str, min: f64, max: f64, curve: Curve) -> MappingSet {
        let mut set = MappingSet::new(EngineMode::Synthesizer);
        set.apply_patch(
            ParamId::Frequency,
            MappingPatch {
                path: Some(path.to_string()),
                min: Some(min),
                max: Some(max),
                curve: Some(curve),
                ..Default::default()
            },
        );
        set
    }

    #[test]
    fn degenerate_range_outputs_min() {
        let records = vec![json!({"x": 5})];
        let set = single_mapping_set("x", 200.0, 2000.0, Curve::Linear);
        let ranges = DataRanges::compute(&records, &set);
        let params = evaluate(&records[0], &set, &ranges);
        assert_eq!(params.frequency, 200.0);
    }

    #[test]
    fn missing_path_falls_back_to_fixed() {
        let records = vec![json!({"x": 5}), json!({"y": 1})];
        let set = single_mapping_set("x", 200.0, 2000.0, Curve::Linear);
        let ranges = DataRanges::compute(&records, &set);
        let params = evaluate(&records[1], &set, &ranges);
        assert_eq!(params.frequency, ParamId::Frequency.spec().default);
    }

    #[test]
    fn unmapped_parameter_uses_fixed() {
        let records = vec![json!({"x": 5})];
        let set = MappingSet::new(EngineMode::Synthesizer);
        let ranges = DataRanges::compute(&records, &set);
        assert!(ranges.is_empty());
        let params = evaluate(&records[0], &set, &ranges);
        assert_eq!(params, AudioParams::default());
    }

    #[test]
    fn linear_scaling_spans_the_output_range() {
        let records = vec![json!({"x": 0.0}), json!({"x": 5.0}), json!({"x": 10.0})];
        let set = single_mapping_set("x", 100.0, 300.0, Curve::Linear);
        let ranges = DataRanges::compute(&records, &set);
        assert_eq!(evaluate(&records[0], &set, &ranges).frequency, 100.0);
        assert_eq!(evaluate(&records[1], &set, &ranges).frequency, 200.0);
        assert_eq!(evaluate(&records[2], &set, &ranges).frequency, 300.0);
    }

    #[test]
    fn exponential_curve_matches_scenario_arithmetic() {
        // mag 4.5 over [3.2, 5.1] -> n 0.68421 -> squared 0.46814 ->
        // [80, 1200] -> ~604 ms.
        let records = vec![
            json!({"properties": {"mag": 4.5}}),
            json!({"properties": {"mag": 3.2}}),
            json!({"properties": {"mag": 5.1}}),
        ];
        let mut set = MappingSet::new(EngineMode::Synthesizer);
        set.apply_patch(
            ParamId::NoteSpacing,
            MappingPatch {
                path: Some("properties.mag".into()),
                min: Some(80.0),
                max: Some(1200.0),
                curve: Some(Curve::Exponential),
                ..Default::default()
            },
        );
        let ranges = DataRanges::compute(&records, &set);
        let spacing = evaluate(&records[0], &set, &ranges).note_spacing;
        assert!((spacing - 604.3).abs() < 1.0, "got {}", spacing);
        assert_eq!(evaluate(&records[1], &set, &ranges).note_spacing, 80.0);
        assert_eq!(evaluate(&records[2], &set, &ranges).note_spacing, 1200.0);
    }

    #[test]
    fn out_of_range_values_clamp_to_the_endpoints() {
        let records = vec![json!({"x": 0.0}), json!({"x": 10.0})];
        let set = single_mapping_set("x", 100.0, 200.0, Curve::Linear);
        let ranges = DataRanges::compute(&records, &set);
        // A record outside the precomputed range clamps instead of
        // extrapolating.
        let outlier = json!({"x": 50.0});
        assert_eq!(evaluate(&outlier, &set, &ranges).frequency, 200.0);
    }

    #[test]
    fn evaluator_is_repeatable() {
        let records = vec![json!({"x": 1.0}), json!({"x": 2.0}), json!({"x": 3.0})];
        let set = single_mapping_set("x", 40.0, 4000.0, Curve::Logarithmic);
        let ranges = DataRanges::compute(&records, &set);
        let a = evaluate(&records[1], &set, &ranges);
        let b = evaluate(&records[1], &set, &ranges);
        assert_eq!(a, b);
    }

    #[test]
    fn planner_output_feeds_ranges_end_to_end() {
        let records = vec![
            json!({"properties": {"mag": 4.5}}),
            json!({"properties": {"mag": 3.2}}),
            json!({"properties": {"mag": 5.1}}),
        ];
        let descriptors = discover(&records);
        let mut set = MappingSet::new(EngineMode::Synthesizer);
        set.plan(&records, &descriptors);
        let ranges = DataRanges::compute(&records, &set);
        assert_eq!(ranges.get(ParamId::NoteSpacing), Some((3.2, 5.1)));
    }
}
