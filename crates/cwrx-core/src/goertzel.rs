//! Goertzel single-bin tone detector
//!
//! Measures the energy at one frequency without a full FFT. Two state
//! variables and one multiply per sample make it far cheaper than a
//! transform when only a single bin matters — handy as a squelch probe
//! and for verifying that a signal actually contains the expected tone.
//!
//! ## Example
//!
//! ```rust
//! use cwrx_core::goertzel::Goertzel;
//!
//! let mut g = Goertzel::new(8000.0, 1000.0);
//! for n in 0..400 {
//!     let t = n as f64 / 8000.0;
//!     g.process_sample((2.0 * std::f64::consts::PI * 1000.0 * t).sin());
//! }
//! assert!(g.magnitude() > 100.0);
//! ```

use std::f64::consts::PI;

/// Block-mode Goertzel filter.
#[derive(Debug, Clone)]
pub struct Goertzel {
    target_freq: f64,
    coeff: f64,
    q1: f64,
    q2: f64,
}

impl Goertzel {
    /// Create a detector for `target_freq` Hz at `sample_rate` Hz.
    pub fn new(sample_rate: f64, target_freq: f64) -> Self {
        let coeff = 2.0 * (2.0 * PI * target_freq / sample_rate).cos();
        Self {
            target_freq,
            coeff,
            q1: 0.0,
            q2: 0.0,
        }
    }

    /// Frequency this detector is tuned to.
    pub fn target_freq(&self) -> f64 {
        self.target_freq
    }

    /// Clear accumulated state. Call between blocks.
    pub fn reset(&mut self) {
        self.q1 = 0.0;
        self.q2 = 0.0;
    }

    /// Feed one sample into the recurrence.
    #[inline]
    pub fn process_sample(&mut self, sample: f64) {
        let q0 = self.coeff * self.q1 - self.q2 + sample;
        self.q2 = self.q1;
        self.q1 = q0;
    }

    /// Feed a whole block.
    pub fn process_block(&mut self, samples: &[f64]) {
        for &s in samples {
            self.process_sample(s);
        }
    }

    /// Magnitude of the accumulated bin.
    pub fn magnitude(&self) -> f64 {
        let mag_sq = self.q1 * self.q1 + self.q2 * self.q2 - self.q1 * self.q2 * self.coeff;
        if mag_sq < 0.0 {
            0.0
        } else {
            mag_sq.sqrt()
        }
    }
}
