//! Envelope history percentile analysis
//!
//! Keeps a low-rate record of the recent envelope and derives a keying
//! threshold from its distribution. Over a window long enough to contain
//! both marks and spaces, the 10th percentile sits on the noise floor
//! and the 95th on the signal peak; a threshold a fifth of the way up
//! the dynamic range clears noise spikes while surviving fades.
//!
//! The envelope is downsampled to roughly 100 Hz before storage — 10 ms
//! resolution is plenty for envelope statistics and keeps a 30-second
//! window at ~3000 entries.

/// Percentile-based threshold suggester.
#[derive(Debug, Clone)]
pub struct HistoryOptimizer {
    buffer: Vec<f64>,
    head: usize,
    is_full: bool,
    downsample: usize,
    counter: usize,
}

impl HistoryOptimizer {
    /// Create an optimizer covering `history_secs` of envelope at
    /// `sample_rate`, stored at `target_rate` Hz (100 Hz gives 10 ms
    /// resolution, plenty for envelope statistics).
    pub fn new(history_secs: f64, target_rate: f64, sample_rate: f64) -> Self {
        let downsample = ((sample_rate / target_rate) as usize).max(1);
        let buffer_size = ((history_secs * target_rate) as usize).max(1);
        Self {
            buffer: vec![0.0; buffer_size],
            head: 0,
            is_full: false,
            downsample,
            counter: 0,
        }
    }

    /// Record an envelope sample (keeps one in `fs/100`).
    pub fn push(&mut self, value: f64) {
        self.counter += 1;
        if self.counter < self.downsample {
            return;
        }
        self.counter = 0;

        self.buffer[self.head] = value;
        self.head = (self.head + 1) % self.buffer.len();
        if self.head == 0 {
            self.is_full = true;
        }
    }

    /// Derive `(threshold, signal_peak, noise_floor)` from the history.
    ///
    /// Noise floor is the 10th percentile, peak the 95th (extreme
    /// interference pulses excluded). When the peak is under 1.5× the
    /// floor there is no usable signal and the suggestion degenerates to
    /// a squelch value of `3·noise`.
    pub fn suggest_threshold(&self) -> (f64, f64, f64) {
        let mut data: Vec<f64> = if self.is_full {
            self.buffer.clone()
        } else {
            if self.head == 0 {
                // Nothing recorded yet.
                return (0.05, 0.1, 0.0);
            }
            self.buffer[..self.head].to_vec()
        };

        data.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = data.len();

        let noise_floor = data[(count as f64 * 0.10) as usize];
        let signal_peak = data[((count as f64 * 0.95) as usize).min(count - 1)];

        if signal_peak < noise_floor * 1.5 {
            return (noise_floor * 3.0, signal_peak, noise_floor);
        }

        let threshold = noise_floor + (signal_peak - noise_floor) * 0.2;
        (threshold, signal_peak, noise_floor)
    }
}
