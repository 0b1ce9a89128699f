//! Quadrature down-conversion (I/Q demodulation)
//!
//! Recovers the keying envelope of a CW tone by mixing the audio with a
//! complex local oscillator at the tone frequency and low-passing each
//! branch. A tone at the LO frequency lands at DC after the mix; the
//! narrow Butterworth pair then rejects everything else, and the vector
//! magnitude of the filtered I/Q frame is the instantaneous amplitude.
//!
//! ```text
//! audio ──┬─ ×cos(φ) ─ LPF ─ I ─┐
//!         │                     ├─ 2·√(I²+Q²) ─ envelope
//!         └─ ×sin(φ) ─ LPF ─ Q ─┘
//!                 φ advance ← AFC
//! ```
//!
//! The factor of 2 restores the amplitude halved by mixing. With AFC
//! enabled the per-sample phase increment comes from the tracking loop;
//! otherwise the LO free-runs at the nominal target.

use std::f64::consts::PI;

use num_complex::Complex64;
use tracing::debug;

use crate::afc::Afc;
use crate::config::SdrConfig;
use crate::filters::ButterworthLowpass;
use crate::types::CwResult;

/// I/Q product detector with AFC-steered local oscillator.
#[derive(Debug)]
pub struct SdrDemodulator {
    sample_rate: f64,
    target_freq: f64,
    afc_enabled: bool,

    lpf_i: ButterworthLowpass,
    lpf_q: ButterworthLowpass,
    afc: Afc,
    phase: f64,
}

impl SdrDemodulator {
    /// Build a demodulator for the given nominal tone frequency.
    pub fn new(sample_rate: f64, target_freq: f64, cfg: &SdrConfig) -> CwResult<Self> {
        Ok(Self {
            sample_rate,
            target_freq,
            afc_enabled: cfg.afc_enabled,
            lpf_i: ButterworthLowpass::new(4, sample_rate, cfg.filter_bw_hz)?,
            lpf_q: ButterworthLowpass::new(4, sample_rate, cfg.filter_bw_hz)?,
            afc: Afc::new(sample_rate, target_freq, cfg.afc_gain, cfg.afc_deadband_hz),
            phase: 0.0,
        })
    }

    /// Nominal tone frequency the LO is centered on.
    pub fn target_freq(&self) -> f64 {
        self.target_freq
    }

    /// Follow a new tone frequency reported by the spectrum monitor.
    ///
    /// Steps under 5 Hz are ignored so monitor jitter cannot thrash the
    /// oscillator. Filter state is deliberately left alone on retune: the
    /// narrow passband absorbs a small frequency step without a visible
    /// transient, and resetting would drop a keying edge.
    pub fn set_target_freq(&mut self, freq: f64) {
        if (freq - self.target_freq).abs() > 5.0 {
            debug!(freq_hz = freq, "following signal");
            self.target_freq = freq;
            self.afc.update_target_freq(freq);
        }
    }

    /// Demodulate one audio sample into an envelope value.
    pub fn process(&mut self, sample: f64) -> f64 {
        // 1. LO generation and mixing.
        let lo = Complex64::new(self.phase.cos(), self.phase.sin());
        let mixed = sample * lo;

        // 2. Narrowband filtering of each branch.
        let filtered_i = self.lpf_i.process(mixed.re);
        let filtered_q = self.lpf_q.process(mixed.im);

        // 3. Envelope.
        let envelope = 2.0 * (filtered_i * filtered_i + filtered_q * filtered_q).sqrt();

        // 4. LO phase advance.
        let phase_inc = if self.afc_enabled {
            self.afc.update(filtered_i, filtered_q, envelope)
        } else {
            2.0 * PI * self.target_freq / self.sample_rate
        };
        self.phase += phase_inc;
        if self.phase > 2.0 * PI {
            self.phase -= 2.0 * PI;
        }

        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SdrConfig;

    fn demod(afc: bool) -> SdrDemodulator {
        let cfg = SdrConfig {
            afc_enabled: afc,
            ..SdrConfig::default()
        };
        SdrDemodulator::new(48_000.0, 700.0, &cfg).unwrap()
    }

    fn feed_tone(d: &mut SdrDemodulator, freq: f64, amp: f64, n: usize) -> f64 {
        let fs = 48_000.0;
        let mut last = 0.0;
        for i in 0..n {
            last = d.process(amp * (2.0 * PI * freq * i as f64 / fs).sin());
        }
        last
    }

    #[test]
    fn on_frequency_tone_yields_its_amplitude() {
        let mut d = demod(false);
        // Settle the filters, then check the envelope approximates the
        // tone amplitude.
        let env = feed_tone(&mut d, 700.0, 0.8, 48_000);
        assert!((env - 0.8).abs() < 0.1, "envelope {}", env);
    }

    #[test]
    fn far_off_tone_rejected() {
        let mut d = demod(false);
        let env = feed_tone(&mut d, 1500.0, 1.0, 48_000);
        assert!(env < 0.05, "envelope {} should be near zero", env);
    }

    #[test]
    fn silence_yields_zero_envelope() {
        let mut d = demod(true);
        let mut env = 0.0;
        for _ in 0..10_000 {
            env = d.process(0.0);
        }
        assert!(env < 1e-6);
    }

    #[test]
    fn retune_hysteresis_ignores_small_steps() {
        let mut d = demod(true);
        d.set_target_freq(702.0);
        assert_eq!(d.target_freq(), 700.0);
        d.set_target_freq(720.0);
        assert_eq!(d.target_freq(), 720.0);
    }

    #[test]
    fn afc_pulls_in_slightly_detuned_tone() {
        let mut d = demod(true);
        // 10 Hz off nominal, comfortably inside the ±100 Hz capture
        // range but outside the dead-band.
        let env = feed_tone(&mut d, 710.0, 1.0, 96_000);
        assert!(env > 0.7, "envelope {} after AFC pull-in", env);
    }
}
