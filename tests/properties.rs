// tests/properties.rs

//! Property-based tests for the parameter pipeline.
//!
//! Uses proptest to verify the curve laws, evaluator purity and output
//! range containment over arbitrary inputs.

use proptest::prelude::*;
use serde_json::json;

use cadenza::evaluate::evaluate_one;
use cadenza::mapping::{Curve, Mapping, ParamId};
use cadenza::quantize::{quantize_spacing, PitchScale, RHYTHM_GRID_MS};

fn arbitrary_curve() -> impl Strategy<Value = Curve> {
    prop::sample::select(Curve::ALL.to_vec())
}

proptest! {
    /// Every curve maps [0,1] into [0,1] and fixes the endpoints (inverse
    /// swaps them).
    #[test]
    fn curves_stay_in_the_unit_interval(curve in arbitrary_curve(), n in 0.0f64..=1.0) {
        let out = curve.apply(n);
        prop_assert!((0.0..=1.0 + 1e-12).contains(&out), "{}({}) = {}", curve, n, out);
    }

    /// Monotonicity: non-decreasing for all curves except inverse, which is
    /// strictly decreasing.
    #[test]
    fn curves_are_monotonic(curve in arbitrary_curve(), a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (flo, fhi) = (curve.apply(lo), curve.apply(hi));
        if curve == Curve::Inverse {
            prop_assert!(flo >= fhi);
            if lo < hi {
                prop_assert!(flo > fhi);
            }
        } else {
            prop_assert!(flo <= fhi + 1e-12);
        }
    }

    /// The evaluator is referentially transparent.
    #[test]
    fn evaluator_is_pure(
        raw in -1e6f64..1e6,
        data_min in -1e3f64..1e3,
        span in 0.001f64..1e3,
        out_min in -100.0f64..100.0,
        out_span in 0.0f64..1000.0,
        curve in arbitrary_curve(),
    ) {
        let mapping = Mapping {
            id: ParamId::Pan,
            path: "x".to_string(),
            fixed: 0.0,
            min: out_min,
            max: out_min + out_span,
            curve,
        };
        let record = json!({ "x": raw });
        let range = Some((data_min, data_min + span));
        let first = evaluate_one(&record, &mapping, range);
        let second = evaluate_one(&record, &mapping, range);
        prop_assert_eq!(first, second);
        prop_assert!(first.is_finite());
    }

    /// For min < max and any raw value, the output lies in [min, max].
    #[test]
    fn outputs_are_contained_in_the_mapping_range(
        raw in -1e6f64..1e6,
        data_min in -1e3f64..1e3,
        span in 0.001f64..1e3,
        out_min in -100.0f64..100.0,
        out_span in 0.001f64..1000.0,
        curve in arbitrary_curve(),
    ) {
        let out_max = out_min + out_span;
        let mapping = Mapping {
            id: ParamId::Pan,
            path: "x".to_string(),
            fixed: 0.0,
            min: out_min,
            max: out_max,
            curve,
        };
        let record = json!({ "x": raw });
        let value = evaluate_one(&record, &mapping, Some((data_min, data_min + span)));
        prop_assert!(
            value >= out_min - 1e-9 && value <= out_max + 1e-9,
            "{} outside [{}, {}]",
            value,
            out_min,
            out_max
        );
    }

    /// A missing range always falls back to the fixed value.
    #[test]
    fn missing_range_yields_fixed(raw in -1e6f64..1e6, fixed in -1e3f64..1e3) {
        let mapping = Mapping {
            id: ParamId::Pan,
            path: "x".to_string(),
            fixed,
            min: 0.0,
            max: 1.0,
            curve: Curve::Linear,
        };
        let record = json!({ "x": raw });
        prop_assert_eq!(evaluate_one(&record, &mapping, None), fixed);
    }

    /// Rhythm quantization always lands on the grid and picks the nearest
    /// slot.
    #[test]
    fn rhythm_quantizer_snaps_to_nearest(ms in 0.0f64..5000.0) {
        let snapped = quantize_spacing(ms);
        prop_assert!(RHYTHM_GRID_MS.contains(&snapped));
        for slot in RHYTHM_GRID_MS {
            prop_assert!((snapped - ms).abs() <= (slot - ms).abs() + 1e-9);
        }
    }

    /// Pitch quantization lands on a member of the scale for any audible
    /// input frequency.
    #[test]
    fn pitch_quantizer_lands_on_scale(
        freq in 30.0f64..8000.0,
        scale in prop::sample::select(PitchScale::ALL.to_vec()),
    ) {
        let snapped = cadenza::quantize::quantize_pitch(freq, scale);
        let midi = 69.0 + 12.0 * (snapped / 440.0).log2();
        let pitch_class = midi.rem_euclid(12.0).round() as u8 % 12;
        prop_assert!(scale.intervals().contains(&pitch_class));
    }
}
