// src/mapping.rs

//! Audio parameter declarations and the data-to-parameter mapping planner.
//!
//! Every audio parameter owns one [`Mapping`] slot. A mapping either carries
//! a dotted record path (data-driven) or an empty path (the `fixed` value is
//! used). The planner ranks discovered numeric paths by interest score and
//! deals them out across a tier list, most interesting paths to the most
//! audible parameters.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::PathStats;
use crate::record::{resolve_numeric, PathDescriptor, Record};
use crate::settings::EngineMode;

/// Scaling curve applied to a normalized value during evaluation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    Linear,
    Exponential,
    Cubic,
    Logarithmic,
    Inverse,
}

impl Curve {
    pub const ALL: [Curve; 5] = [
        Curve::Linear,
        Curve::Exponential,
        Curve::Cubic,
        Curve::Logarithmic,
        Curve::Inverse,
    ];

    /// Maps `[0,1] -> [0,1]`. Every curve fixes 0 and 1 except `Inverse`,
    /// which swaps them.
    pub fn apply(&self, n: f64) -> f64 {
        match self {
            Curve::Linear => n,
            Curve::Exponential => n * n,
            Curve::Cubic => n * n * n,
            Curve::Logarithmic => (1.0 + 9.0 * n).log10(),
            Curve::Inverse => 1.0 - n,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Curve::Linear => "linear",
            Curve::Exponential => "exponential",
            Curve::Cubic => "cubic",
            Curve::Logarithmic => "logarithmic",
            Curve::Inverse => "inverse",
        }
    }
}

impl std::fmt::Display for Curve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifier of one slot in the audio graph.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ParamId {
    Frequency,
    Pitch,
    SampleOffset,
    Duration,
    NoteSpacing,
    Pan,
    FilterFreq,
    FilterQ,
    DelayTime,
    DelayFeedback,
    DelayMix,
    ReverbDecay,
    ReverbMix,
    Attack,
    Release,
}

/// Declared legal output range and fallback value of one parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub id: ParamId,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

// Pentatonic endpoints C4..A5, used as the planner's frequency range.
const PENTATONIC_LOW_HZ: f64 = 261.6256;
const PENTATONIC_HIGH_HZ: f64 = 880.0;

impl ParamId {
    /// Declared extremes and defaults. Times are in milliseconds, frequency
    /// and filter cutoff in Hz, reverb decay in seconds.
    pub fn spec(self) -> ParamSpec {
        let (min, max, default) = match self {
            ParamId::Frequency => (40.0, 4000.0, 440.0),
            ParamId::Pitch => (0.25, 4.0, 1.0),
            ParamId::SampleOffset => (0.0, 1.0, 0.0),
            ParamId::Duration => (50.0, 3000.0, 400.0),
            ParamId::NoteSpacing => (50.0, 2000.0, 300.0),
            ParamId::Pan => (-1.0, 1.0, 0.0),
            ParamId::FilterFreq => (100.0, 12000.0, 8000.0),
            ParamId::FilterQ => (0.1, 20.0, 1.0),
            ParamId::DelayTime => (1.0, 2000.0, 250.0),
            ParamId::DelayFeedback => (0.0, 0.9, 0.3),
            ParamId::DelayMix => (0.0, 1.0, 0.25),
            ParamId::ReverbDecay => (0.1, 5.0, 1.5),
            ParamId::ReverbMix => (0.0, 1.0, 0.3),
            ParamId::Attack => (1.0, 1000.0, 10.0),
            ParamId::Release => (1.0, 2000.0, 250.0),
        };
        ParamSpec {
            id: self,
            min,
            max,
            default,
        }
    }

    /// The parameter set for a mode, in tier order: critical (spacing,
    /// pitch-ish, duration), important, then subtle.
    pub fn set_for(mode: EngineMode) -> &'static [ParamId] {
        match mode {
            EngineMode::Synthesizer => &[
                ParamId::NoteSpacing,
                ParamId::Frequency,
                ParamId::Duration,
                ParamId::Pan,
                ParamId::FilterFreq,
                ParamId::DelayTime,
                ParamId::DelayFeedback,
                ParamId::DelayMix,
                ParamId::Attack,
                ParamId::Release,
                ParamId::FilterQ,
                ParamId::ReverbDecay,
                ParamId::ReverbMix,
            ],
            EngineMode::Sampler => &[
                ParamId::NoteSpacing,
                ParamId::SampleOffset,
                ParamId::Duration,
                ParamId::Pan,
                ParamId::FilterFreq,
                ParamId::DelayTime,
                ParamId::DelayFeedback,
                ParamId::DelayMix,
                ParamId::Attack,
                ParamId::Release,
                ParamId::Pitch,
                ParamId::FilterQ,
                ParamId::ReverbDecay,
                ParamId::ReverbMix,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamId::Frequency => "frequency",
            ParamId::Pitch => "pitch",
            ParamId::SampleOffset => "sampleOffset",
            ParamId::Duration => "duration",
            ParamId::NoteSpacing => "noteSpacing",
            ParamId::Pan => "pan",
            ParamId::FilterFreq => "filterFreq",
            ParamId::FilterQ => "filterQ",
            ParamId::DelayTime => "delayTime",
            ParamId::DelayFeedback => "delayFeedback",
            ParamId::DelayMix => "delayMix",
            ParamId::ReverbDecay => "reverbDecay",
            ParamId::ReverbMix => "reverbMix",
            ParamId::Attack => "attack",
            ParamId::Release => "release",
        }
    }
}

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The configured binding from a record path to one audio parameter.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Mapping {
    pub id: ParamId,
    /// Empty string means the parameter uses `fixed`.
    pub path: String,
    pub fixed: f64,
    pub min: f64,
    pub max: f64,
    pub curve: Curve,
}

impl Mapping {
    fn from_spec(spec: ParamSpec) -> Mapping {
        Mapping {
            id: spec.id,
            path: String::new(),
            fixed: spec.default,
            min: spec.min,
            max: spec.max,
            curve: Curve::Linear,
        }
    }

    pub fn is_data_driven(&self) -> bool {
        !self.path.is_empty()
    }
}

/// Partial update for one mapping, applied through `set_mapping`.
#[derive(Debug, Clone, Default)]
pub struct MappingPatch {
    pub path: Option<String>,
    pub fixed: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub curve: Option<Curve>,
}

/// The full mapping table for the active mode.
#[derive(Debug, Clone)]
pub struct MappingSet {
    mode: EngineMode,
    mappings: Vec<Mapping>,
}

impl MappingSet {
    pub fn new(mode: EngineMode) -> MappingSet {
        let mappings = ParamId::set_for(mode)
            .iter()
            .map(|id| Mapping::from_spec(id.spec()))
            .collect();
        MappingSet { mode, mappings }
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn get(&self, id: ParamId) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: ParamId) -> Option<&mut Mapping> {
        self.mappings.iter_mut().find(|m| m.id == id)
    }

    /// Applies a partial update, clamping the range into the declared
    /// extremes and keeping `min <= max`.
    pub fn apply_patch(&mut self, id: ParamId, patch: MappingPatch) {
        let spec = id.spec();
        if let Some(mapping) = self.get_mut(id) {
            if let Some(path) = patch.path {
                mapping.path = path;
            }
            if let Some(fixed) = patch.fixed {
                mapping.fixed = fixed.clamp(spec.min, spec.max);
            }
            if let Some(min) = patch.min {
                mapping.min = min.clamp(spec.min, spec.max);
            }
            if let Some(max) = patch.max {
                mapping.max = max.clamp(spec.min, spec.max);
            }
            if mapping.min > mapping.max {
                std::mem::swap(&mut mapping.min, &mut mapping.max);
            }
            if let Some(curve) = patch.curve {
                mapping.curve = curve;
            }
        }
    }

    /// Switches the parameter set. Entries shared between the sets survive
    /// untouched; parameters no longer present are dropped and new ones come
    /// in at their defaults. The caller re-plans afterwards.
    pub fn set_mode(&mut self, mode: EngineMode) {
        if mode == self.mode {
            return;
        }
        let next: Vec<Mapping> = ParamId::set_for(mode)
            .iter()
            .map(|id| {
                self.get(*id)
                    .cloned()
                    .unwrap_or_else(|| Mapping::from_spec(id.spec()))
            })
            .collect();
        self.mode = mode;
        self.mappings = next;
    }

    /// Restores every mapping in the active set to its declared defaults.
    pub fn reset(&mut self) {
        *self = MappingSet::new(self.mode);
    }

    /// Ranks numeric paths by interest score and deals them across the tier
    /// list, applying per-parameter curve rules and range overrides. With no
    /// numeric paths this is a no-op.
    pub fn plan(&mut self, records: &[Record], descriptors: &[PathDescriptor]) {
        let mut ranked: Vec<(String, PathStats)> = descriptors
            .iter()
            .filter(|d| d.is_numeric())
            .map(|d| {
                let values: Vec<f64> = records
                    .iter()
                    .filter_map(|r| resolve_numeric(r, &d.path))
                    .collect();
                (d.path.clone(), PathStats::from_values(&values))
            })
            .collect();

        if ranked.is_empty() {
            warn!("no numeric paths discovered; mappings left untouched");
            return;
        }

        ranked.sort_by(|a, b| {
            b.1.interest_score
                .partial_cmp(&a.1.interest_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for mapping in &mut self.mappings {
            mapping.path.clear();
        }

        let mut next = 0usize;
        let order: Vec<ParamId> = ParamId::set_for(self.mode).to_vec();
        for id in &order {
            let Some((path, stats)) = ranked.get(next) else {
                break;
            };
            next += 1;
            self.assign(*id, path.clone(), stats);
        }

        // Surplus paths re-seat the delay parameters with widened ranges so
        // that high-interest columns are never silently dropped.
        let surplus = [
            (ParamId::DelayTime, (20.0, 1800.0)),
            (ParamId::DelayFeedback, (0.05, 0.85)),
            (ParamId::DelayMix, (0.1, 0.95)),
        ];
        for (id, (lo, hi)) in surplus {
            let Some((path, stats)) = ranked.get(next) else {
                break;
            };
            next += 1;
            self.assign(id, path.clone(), stats);
            if let Some(mapping) = self.get_mut(id) {
                mapping.min = lo;
                mapping.max = hi;
            }
        }
        if next < ranked.len() {
            debug!(ignored = ranked.len() - next, "more numeric paths than parameters");
        }
    }

    fn assign(&mut self, id: ParamId, path: String, stats: &PathStats) {
        let mut curve = stats.recommended_curve();
        // Low-variance spacing data flattens the rhythm; bias it onto an
        // exponential curve for contrast.
        if id == ParamId::NoteSpacing && stats.coefficient_of_variation < 0.5 {
            curve = Curve::Exponential;
        }
        let range = planned_range(id);
        if let Some(mapping) = self.get_mut(id) {
            mapping.path = path;
            mapping.curve = curve;
            if let Some((min, max)) = range {
                mapping.min = min;
                mapping.max = max;
            }
        }
    }

    /// Re-rolls the path and curve of each parameter: a random path with
    /// probability 0.7 (spacing always stays data-driven), cleared
    /// otherwise.
    pub fn randomize_paths<R: Rng>(&mut self, descriptors: &[PathDescriptor], rng: &mut R) {
        let numeric: Vec<&PathDescriptor> =
            descriptors.iter().filter(|d| d.is_numeric()).collect();
        if numeric.is_empty() {
            warn!("no numeric paths discovered; nothing to randomize");
            return;
        }
        for mapping in &mut self.mappings {
            let keep = mapping.id == ParamId::NoteSpacing || rng.gen::<f64>() < 0.7;
            if keep {
                mapping.path = numeric[rng.gen_range(0..numeric.len())].path.clone();
            } else {
                mapping.path.clear();
            }
            mapping.curve = if mapping.id == ParamId::NoteSpacing && rng.gen::<f64>() < 0.6 {
                Curve::Exponential
            } else if rng.gen::<f64>() < 0.5 {
                Curve::Linear
            } else {
                Curve::ALL[rng.gen_range(0..Curve::ALL.len())]
            };
        }
    }

    /// Perturbs each output range by small uniform offsets, then re-sorts
    /// the endpoints and clamps them back into the declared extremes.
    pub fn randomize_ranges<R: Rng>(&mut self, rng: &mut R) {
        for mapping in &mut self.mappings {
            let spec = mapping.id.spec();
            let range = (mapping.max - mapping.min).abs().max(f64::EPSILON);
            let mut min = mapping.min + rng.gen_range(-0.3..0.3) * range;
            let mut max = mapping.max + rng.gen_range(-0.5..0.5) * range;
            if min > max {
                std::mem::swap(&mut min, &mut max);
            }
            mapping.min = min.clamp(spec.min, spec.max);
            mapping.max = max.clamp(spec.min, spec.max);
        }
    }
}

fn planned_range(id: ParamId) -> Option<(f64, f64)> {
    match id {
        ParamId::NoteSpacing => Some((80.0, 1200.0)),
        ParamId::Frequency => Some((PENTATONIC_LOW_HZ, PENTATONIC_HIGH_HZ)),
        ParamId::Pan => Some((-1.0, 1.0)),
        ParamId::FilterFreq => Some((400.0, 8000.0)),
        ParamId::Attack => Some((5.0, 300.0)),
        ParamId::Release => Some((50.0, 800.0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::discover;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn earthquake_records() -> Vec<Record> {
        vec![
            json!({"properties": {"mag": 4.5}, "geometry": {"coordinates": [-122.0, 37.5, 10]}}),
            json!({"properties": {"mag": 3.2}, "geometry": {"coordinates": [-121.8, 38.1, 8]}}),
            json!({"properties": {"mag": 5.1}, "geometry": {"coordinates": [-122.5, 36.9, 12]}}),
        ]
    }

    #[test]
    fn curves_fix_the_endpoints() {
        for curve in Curve::ALL {
            let (lo, hi) = (curve.apply(0.0), curve.apply(1.0));
            if curve == Curve::Inverse {
                assert_eq!((lo, hi), (1.0, 0.0));
            } else {
                assert!((lo - 0.0).abs() < 1e-12);
                assert!((hi - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn planner_puts_most_interesting_path_on_spacing() {
        let records = earthquake_records();
        let descriptors = discover(&records);
        let mut set = MappingSet::new(EngineMode::Synthesizer);
        set.plan(&records, &descriptors);

        let spacing = set.get(ParamId::NoteSpacing).unwrap();
        assert_eq!(spacing.path, "properties.mag");
        assert_eq!(spacing.min, 80.0);
        assert_eq!(spacing.max, 1200.0);
        // Magnitudes have CV < 0.5, so the spacing bias kicks in.
        assert_eq!(spacing.curve, Curve::Exponential);

        // The collapsed coordinates path lands on the next tier-1 slot.
        let frequency = set.get(ParamId::Frequency).unwrap();
        assert_eq!(frequency.path, "geometry.coordinates");
    }

    #[test]
    fn planner_without_numeric_paths_is_a_no_op() {
        let records = vec![json!({"label": "a"}), json!({"label": "b"})];
        let descriptors = discover(&records);
        let mut set = MappingSet::new(EngineMode::Synthesizer);
        let before: Vec<String> = set.mappings().iter().map(|m| m.path.clone()).collect();
        set.plan(&records, &descriptors);
        let after: Vec<String> = set.mappings().iter().map(|m| m.path.clone()).collect();
        assert_eq!(before, after);
        assert!(set.mappings().iter().all(|m| !m.is_data_driven()));
    }

    #[test]
    fn planner_stops_when_paths_run_out() {
        let records = earthquake_records();
        let descriptors = discover(&records);
        let mut set = MappingSet::new(EngineMode::Synthesizer);
        set.plan(&records, &descriptors);
        let assigned = set.mappings().iter().filter(|m| m.is_data_driven()).count();
        assert_eq!(assigned, 2); // mag + collapsed coordinates
    }

    #[test]
    fn mode_switch_swaps_frequency_for_pitch_and_offset() {
        let mut set = MappingSet::new(EngineMode::Synthesizer);
        assert!(set.get(ParamId::Frequency).is_some());
        assert!(set.get(ParamId::Pitch).is_none());

        set.set_mode(EngineMode::Sampler);
        assert!(set.get(ParamId::Frequency).is_none());
        assert!(set.get(ParamId::Pitch).is_some());
        assert!(set.get(ParamId::SampleOffset).is_some());

        set.set_mode(EngineMode::Synthesizer);
        assert!(set.get(ParamId::Frequency).is_some());
    }

    #[test]
    fn patch_clamps_and_orders_the_range() {
        let mut set = MappingSet::new(EngineMode::Synthesizer);
        set.apply_patch(
            ParamId::Frequency,
            MappingPatch {
                min: Some(9999.0),
                max: Some(100.0),
                ..Default::default()
            },
        );
        let m = set.get(ParamId::Frequency).unwrap();
        assert_eq!(m.min, 100.0);
        assert_eq!(m.max, 4000.0);
        assert!(m.min <= m.max);
    }

    #[test]
    fn randomize_paths_always_drives_spacing() {
        let records = earthquake_records();
        let descriptors = discover(&records);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let mut set = MappingSet::new(EngineMode::Synthesizer);
            set.randomize_paths(&descriptors, &mut rng);
            assert!(set.get(ParamId::NoteSpacing).unwrap().is_data_driven());
        }
    }

    #[test]
    fn randomize_ranges_keeps_ordering_and_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let mut set = MappingSet::new(EngineMode::Synthesizer);
            set.randomize_ranges(&mut rng);
            for m in set.mappings() {
                let spec = m.id.spec();
                assert!(m.min <= m.max, "{}: {} > {}", m.id, m.min, m.max);
                assert!(m.min >= spec.min && m.max <= spec.max);
            }
        }
    }

    #[test]
    fn reset_restores_defaults() {
        let records = earthquake_records();
        let descriptors = discover(&records);
        let mut set = MappingSet::new(EngineMode::Synthesizer);
        set.plan(&records, &descriptors);
        set.reset();
        for m in set.mappings() {
            let spec = m.id.spec();
            assert!(!m.is_data_driven());
            assert_eq!(m.fixed, spec.default);
            assert_eq!(m.min, spec.min);
            assert_eq!(m.max, spec.max);
        }
    }
}
