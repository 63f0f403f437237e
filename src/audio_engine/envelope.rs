// src/audio_engine/envelope.rs

//! Scheduled amplitude envelope for one note.
//!
//! The shape is fixed at note time: an exponential rise from the floor to
//! the peak over the attack, a hold, and an exponential fall back to the
//! floor ending exactly at the note duration. Exponential ramps need
//! non-zero endpoints, so the gain never goes below the floor while the
//! voice is alive; silencing happens by dropping the voice at `duration`.

/// Conventional non-zero endpoint for exponential gain ramps.
pub const ENVELOPE_FLOOR: f32 = 0.001;

#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    attack_end: u64,
    hold_end: u64,
    duration: u64,
    peak: f32,
}

impl Envelope {
    /// Builds the breakpoint schedule in samples. The hold ends at
    /// `max(attack, duration - release)`, so overlong attack/release pairs
    /// degrade gracefully instead of crossing.
    pub fn new(
        attack_ms: f64,
        release_ms: f64,
        duration_ms: f64,
        peak: f32,
        sample_rate: f32,
    ) -> Envelope {
        let per_ms = sample_rate as f64 / 1000.0;
        let duration = ((duration_ms.max(1.0)) * per_ms).ceil() as u64;
        let attack_end = (((attack_ms.max(0.0)) * per_ms).round() as u64).min(duration);
        let hold_end_ms = (duration_ms - release_ms.max(0.0)).max(attack_ms.max(0.0));
        let hold_end = ((hold_end_ms * per_ms).round() as u64).clamp(attack_end, duration);
        Envelope {
            attack_end,
            hold_end,
            duration,
            peak: peak.max(ENVELOPE_FLOOR),
        }
    }

    pub fn duration_samples(&self) -> u64 {
        self.duration
    }

    pub fn is_finished(&self, t: u64) -> bool {
        t >= self.duration
    }

    /// Gain at `t` samples after the note start. Always `>= ENVELOPE_FLOOR`.
    pub fn gain_at(&self, t: u64) -> f32 {
        if t >= self.duration {
            return ENVELOPE_FLOOR;
        }
        if t < self.attack_end {
            let frac = t as f32 / self.attack_end as f32;
            return ENVELOPE_FLOOR * (self.peak / ENVELOPE_FLOOR).powf(frac);
        }
        if t < self.hold_end {
            return self.peak;
        }
        let span = self.duration - self.hold_end;
        if span == 0 {
            return ENVELOPE_FLOOR;
        }
        let frac = (t - self.hold_end) as f32 / span as f32;
        self.peak * (ENVELOPE_FLOOR / self.peak).powf(frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn gain_never_drops_below_the_floor() {
        let env = Envelope::new(10.0, 50.0, 400.0, 0.8, SR);
        for t in 0..env.duration_samples() + 100 {
            assert!(env.gain_at(t) >= ENVELOPE_FLOOR);
        }
    }

    #[test]
    fn attack_rises_to_the_peak() {
        let env = Envelope::new(10.0, 50.0, 400.0, 0.8, SR);
        let attack_samples = (10.0 / 1000.0 * SR) as u64;
        assert!(env.gain_at(0) < 0.01);
        let at_peak = env.gain_at(attack_samples);
        assert!((at_peak - 0.8).abs() < 1e-3, "got {}", at_peak);
    }

    #[test]
    fn hold_plateau_sits_at_the_peak() {
        let env = Envelope::new(10.0, 100.0, 500.0, 0.6, SR);
        // Between attack end (10 ms) and release start (400 ms).
        for ms in [20.0f32, 100.0, 399.0] {
            let t = (ms / 1000.0 * SR) as u64;
            assert_eq!(env.gain_at(t), 0.6);
        }
    }

    #[test]
    fn release_decays_toward_the_floor() {
        let env = Envelope::new(5.0, 100.0, 300.0, 1.0, SR);
        let near_end = env.duration_samples() - 1;
        assert!(env.gain_at(near_end) < 0.01);
        assert!(env.gain_at(near_end) >= ENVELOPE_FLOOR);
        assert!(env.is_finished(env.duration_samples()));
    }

    #[test]
    fn attack_longer_than_duration_still_terminates() {
        let env = Envelope::new(1000.0, 500.0, 100.0, 0.9, SR);
        let last = env.duration_samples() - 1;
        let _ = env.gain_at(last);
        assert!(env.is_finished(env.duration_samples()));
        assert!(env.gain_at(env.duration_samples()) == ENVELOPE_FLOOR);
    }

    #[test]
    fn zero_attack_jumps_to_peak() {
        let env = Envelope::new(0.0, 10.0, 100.0, 0.5, SR);
        assert_eq!(env.gain_at(0), 0.5);
    }

    #[test]
    fn peak_is_floored_for_exponential_validity() {
        let env = Envelope::new(5.0, 5.0, 100.0, 0.0, SR);
        assert!(env.gain_at(10) >= ENVELOPE_FLOOR);
    }
}
