//! Automatic Frequency Control
//!
//! Trims the demodulator's local oscillator from the residual rotation
//! of the I/Q vector. When the LO sits exactly on the tone, the filtered
//! I/Q phasor stands still; any leftover frequency offset shows up as a
//! steady phase drift between consecutive samples:
//!
//! ```text
//! err_hz = Δφ · fs / 2π
//! ```
//!
//! The loop applies a small fraction of that error per sample (the gain),
//! ignores errors inside a dead-band to avoid hunting, and clamps the
//! corrected frequency to ±100 Hz around the nominal target so noise can
//! never walk the LO out of the passband.
//!
//! Correction only runs while the envelope is above a signal gate and
//! after a handful of consecutive signal samples, so key-up noise does
//! not steer the oscillator.

use std::f64::consts::PI;

/// Envelope level below which the loop freezes.
const SIGNAL_GATE: f64 = 0.005;

/// Consecutive signal samples required before corrections apply.
const WARMUP_SAMPLES: u32 = 5;

/// Maximum correction excursion from the target frequency, in Hz.
const MAX_DEVIATION_HZ: f64 = 100.0;

/// Phase-drift frequency tracker.
#[derive(Debug, Clone)]
pub struct Afc {
    sample_rate: f64,
    target_freq: f64,
    current_freq: f64,
    prev_phase: f64,
    phase_inc: f64,
    signal_consecutive: u32,
    gain: f64,
    deadband_hz: f64,
}

impl Afc {
    /// Create a tracker centered on `target_freq`.
    pub fn new(sample_rate: f64, target_freq: f64, gain: f64, deadband_hz: f64) -> Self {
        let mut afc = Self {
            sample_rate,
            target_freq,
            current_freq: target_freq,
            prev_phase: 0.0,
            phase_inc: 0.0,
            signal_consecutive: 0,
            gain,
            deadband_hz,
        };
        afc.update_phase_inc();
        afc
    }

    /// Frequency the loop currently believes the tone is at.
    pub fn current_freq(&self) -> f64 {
        self.current_freq
    }

    /// Re-center on a new target frequency.
    ///
    /// Updates within 5 Hz are ignored: the spectrum monitor jitters by a
    /// couple of Hz between ticks and re-centering on every wiggle would
    /// reset the warmup for nothing.
    pub fn update_target_freq(&mut self, freq: f64) {
        if (freq - self.target_freq).abs() < 5.0 {
            return;
        }
        self.target_freq = freq;
        self.current_freq = freq;
        self.signal_consecutive = 0;
        self.update_phase_inc();
    }

    /// Feed one filtered I/Q frame; returns the LO phase increment to use
    /// for the next sample.
    pub fn update(&mut self, filtered_i: f64, filtered_q: f64, envelope: f64) -> f64 {
        if envelope > SIGNAL_GATE {
            let curr_phase = filtered_q.atan2(filtered_i);

            if self.signal_consecutive > WARMUP_SAMPLES {
                let mut phase_delta = curr_phase - self.prev_phase;
                if phase_delta > PI {
                    phase_delta -= 2.0 * PI;
                } else if phase_delta < -PI {
                    phase_delta += 2.0 * PI;
                }

                let freq_error = phase_delta * self.sample_rate / (2.0 * PI);

                if freq_error.abs() > self.deadband_hz {
                    self.current_freq += freq_error * self.gain;
                    self.current_freq = self.current_freq.clamp(
                        self.target_freq - MAX_DEVIATION_HZ,
                        self.target_freq + MAX_DEVIATION_HZ,
                    );
                    self.update_phase_inc();
                }
            }

            self.prev_phase = curr_phase;
            self.signal_consecutive += 1;
        } else {
            self.signal_consecutive = 0;
        }
        self.phase_inc
    }

    fn update_phase_inc(&mut self) {
        self.phase_inc = 2.0 * PI * self.current_freq / self.sample_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_phase_inc_matches_target() {
        let afc = Afc::new(48_000.0, 700.0, 2e-4, 2.0);
        let expected = 2.0 * PI * 700.0 / 48_000.0;
        assert!((afc.phase_inc - expected).abs() < 1e-12);
    }

    #[test]
    fn small_retune_ignored() {
        let mut afc = Afc::new(48_000.0, 700.0, 2e-4, 2.0);
        afc.update_target_freq(703.0);
        assert_eq!(afc.current_freq(), 700.0);
        afc.update_target_freq(710.0);
        assert_eq!(afc.current_freq(), 710.0);
    }

    #[test]
    fn weak_envelope_resets_warmup() {
        let mut afc = Afc::new(48_000.0, 700.0, 2e-4, 2.0);
        for _ in 0..10 {
            afc.update(1.0, 0.0, 1.0);
        }
        assert!(afc.signal_consecutive > WARMUP_SAMPLES);
        afc.update(1.0, 0.0, 0.0);
        assert_eq!(afc.signal_consecutive, 0);
    }

    #[test]
    fn tracks_phase_drift_toward_tone() {
        let fs = 48_000.0;
        let gain = 2e-4;
        let mut afc = Afc::new(fs, 700.0, gain, 2.0);
        // Simulate a +20 Hz residual: the I/Q phasor rotates by
        // 2π·20/fs per sample.
        let drift = 2.0 * PI * 20.0 / fs;
        let mut phase: f64 = 0.0;
        for _ in 0..48_000 {
            afc.update(phase.cos(), phase.sin(), 1.0);
            phase += drift;
        }
        assert!(
            afc.current_freq() > 700.5,
            "frequency {} did not move up",
            afc.current_freq()
        );
        assert!(afc.current_freq() < 800.0);
    }

    #[test]
    fn correction_clamped_to_100_hz() {
        let fs = 48_000.0;
        // Absurd gain so the clamp is reached quickly.
        let mut afc = Afc::new(fs, 700.0, 1.0, 2.0);
        let drift = 2.0 * PI * 400.0 / fs;
        let mut phase: f64 = 0.0;
        for _ in 0..2_000 {
            afc.update(phase.cos(), phase.sin(), 1.0);
            phase += drift;
        }
        assert!(afc.current_freq() <= 800.0 + 1e-9);
    }

    #[test]
    fn deadband_freezes_small_errors() {
        let fs = 48_000.0;
        let mut afc = Afc::new(fs, 700.0, 1.0, 2.0);
        // 1 Hz residual is inside the 2 Hz dead-band.
        let drift = 2.0 * PI * 1.0 / fs;
        let mut phase: f64 = 0.0;
        for _ in 0..48_000 {
            afc.update(phase.cos(), phase.sin(), 1.0);
            phase += drift;
        }
        assert_eq!(afc.current_freq(), 700.0);
    }
}
