//! Threshold strategies for the Schmitt trigger
//!
//! Two interchangeable sources of `(high, low)` hysteresis thresholds
//! sit behind one trait so the trigger never branches on strategy:
//!
//! - [`HistoryThresholder`] (default) — periodic percentile analysis of
//!   a multi-second envelope history ([`HistoryOptimizer`]), refreshed
//!   every couple of seconds. Thresholds land low in the dynamic range,
//!   far from both the noise floor and the mark level, which keeps long
//!   dahs from splitting under envelope noise.
//! - [`AdaptiveThresholder`] — per-sample dual envelope tracker. Fast
//!   attack, slow decay on the peak; the floor drifts up until real
//!   noise samples push it back down. Squelches hard when the dynamic
//!   range collapses, which makes it the right choice for unattended
//!   monitoring of a dead channel.
//!
//! When squelched, both return thresholds the envelope cannot sustain,
//! pinning the trigger to space.

use tracing::debug;

use crate::history::HistoryOptimizer;

/// High threshold returned while squelched. Envelopes are normalized
/// around 1.0, so 10.0 is unreachable.
pub const SQUELCH_HIGH: f64 = 10.0;

/// Low threshold returned while squelched.
pub const SQUELCH_LOW: f64 = 9.0;

/// One envelope sample in, one `(high, low)` pair out.
pub trait ThresholdStrategy: Send {
    /// Update internal tracking with `envelope` and return the
    /// hysteresis thresholds to apply to this same sample.
    fn update(&mut self, envelope: f64) -> (f64, f64);
}

/// Dual envelope tracker with automatic squelch.
#[derive(Debug, Clone)]
pub struct AdaptiveThresholder {
    max_level: f64,
    min_level: f64,
    decay_rate: f64,
    min_range: f64,
}

impl AdaptiveThresholder {
    /// `decay_rate` near 1.0 (0.9995 at 48 kHz works well); `min_range`
    /// is the smallest max−min spread treated as a real signal.
    pub fn new(decay_rate: f64, min_range: f64) -> Self {
        Self {
            max_level: 0.0,
            min_level: 0.0,
            decay_rate,
            min_range,
        }
    }
}

impl ThresholdStrategy for AdaptiveThresholder {
    fn update(&mut self, envelope: f64) -> (f64, f64) {
        // Peak tracker: fast attack, slow decay.
        if envelope > self.max_level {
            self.max_level = envelope;
        } else {
            self.max_level *= self.decay_rate;
        }

        // Floor tracker: fast attack down, slow float up toward the
        // peak until a real noise sample presses it back.
        if envelope < self.min_level {
            self.min_level = envelope;
        } else {
            self.min_level += (self.max_level - self.min_level) * (1.0 - self.decay_rate);
        }

        if self.min_level > self.max_level {
            self.min_level = self.max_level;
        }

        let range = self.max_level - self.min_level;
        if range < self.min_range {
            return (SQUELCH_HIGH, SQUELCH_LOW);
        }

        let center = self.min_level + range * 0.5;
        let hysteresis = range * 0.05;
        (center + hysteresis, center - hysteresis)
    }
}

/// Percentile-history strategy.
///
/// Pushes every envelope sample into a [`HistoryOptimizer`] and
/// recomputes the thresholds at a fixed cadence. The low threshold is
/// 80% of the high one, which keeps marks latched across ragged edges.
#[derive(Debug, Clone)]
pub struct HistoryThresholder {
    history: HistoryOptimizer,
    refresh_samples: u64,
    counter: u64,
    high: f64,
    low: f64,
}

impl HistoryThresholder {
    /// `history_secs` of envelope retained at `downsample_hz`;
    /// thresholds recomputed every `refresh_secs`.
    pub fn new(
        history_secs: f64,
        downsample_hz: f64,
        refresh_secs: f64,
        sample_rate: f64,
    ) -> Self {
        Self {
            history: HistoryOptimizer::new(history_secs, downsample_hz, sample_rate),
            refresh_samples: (refresh_secs * sample_rate) as u64,
            counter: 0,
            // Unreachable until the first refresh has data.
            high: SQUELCH_HIGH,
            low: SQUELCH_LOW,
        }
    }
}

impl ThresholdStrategy for HistoryThresholder {
    fn update(&mut self, envelope: f64) -> (f64, f64) {
        self.history.push(envelope);
        self.counter += 1;
        if self.counter >= self.refresh_samples {
            self.counter = 0;
            // In the no-signal regime the suggestion is 3× the noise
            // floor, which the envelope cannot sustain: squelch falls
            // out of the percentiles.
            let (threshold, peak, noise) = self.history.suggest_threshold();
            self.high = threshold;
            self.low = threshold * 0.8;
            debug!(
                noise,
                peak,
                threshold = self.high,
                "auto-tune threshold refresh"
            );
        }
        (self.high, self.low)
    }
}
