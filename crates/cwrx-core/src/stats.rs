//! Duration statistics for adaptive timing
//!
//! A sender's fist is never metronomic, and speed drifts over a QSO.
//! Instead of trusting a fixed WPM, the decoder watches the durations it
//! actually receives and splits them into the two natural clusters —
//! short (dits) and long (dahs).
//!
//! Two tools live here:
//!
//! - [`StatisticalAnalyzer`] — sorts a sliding window of mark durations
//!   and finds the largest jump inside the central 50%. That jump is the
//!   natural dit/dah boundary; the spread of each side parameterizes the
//!   beam decoder's emission Gaussians, and a confidence score derived
//!   from the coefficients of variation scales the WPM learning rate.
//! - [`DurationClusters`] — classic 2-means over a window, used by the
//!   cluster decoder backend for both mark and space streams.

/// Mean / standard deviation / count for one duration cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

fn calculate_stats(data: &[f64]) -> SignalStats {
    if data.is_empty() {
        return SignalStats::default();
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let variance =
        data.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / data.len() as f64;
    SignalStats {
        mean,
        std_dev: variance.sqrt(),
        count: data.len(),
    }
}

/// Result of a full window analysis.
#[derive(Debug, Clone, Copy)]
pub struct StatsResult {
    /// Best dit/dah split threshold in ms.
    pub optimal_threshold: f64,
    pub dit_stats: SignalStats,
    pub dah_stats: SignalStats,
    /// 0.0–1.0; high when both clusters are tight.
    pub confidence: f64,
    pub valid: bool,
}

impl StatsResult {
    /// The invalid sentinel returned before the window fills or when the
    /// durations do not separate into two regimes.
    pub fn invalid() -> Self {
        Self {
            optimal_threshold: 0.0,
            dit_stats: SignalStats::default(),
            dah_stats: SignalStats::default(),
            confidence: 0.0,
            valid: false,
        }
    }
}

/// Sliding-window max-gap analyzer over recent mark durations.
#[derive(Debug, Clone)]
pub struct StatisticalAnalyzer {
    window_size: usize,
    history: Vec<f64>,
    cursor: usize,
    full: bool,
}

impl StatisticalAnalyzer {
    /// Create an analyzer over the most recent `window_size` durations.
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            history: vec![0.0; window_size],
            cursor: 0,
            full: false,
        }
    }

    /// Record one mark duration in milliseconds.
    pub fn add_observation(&mut self, duration_ms: f64) {
        self.history[self.cursor] = duration_ms;
        self.cursor = (self.cursor + 1) % self.window_size;
        if self.cursor == 0 {
            self.full = true;
        }
    }

    /// True once the window has wrapped at least once.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Split the window into dit and dah clusters.
    ///
    /// Searches for the largest consecutive gap between sorted durations
    /// within indices 25%..75% (the extremes are noise-prone). A max gap
    /// under 20 ms means only one regime is present and the result is
    /// invalid rather than a forced split.
    pub fn analyze(&self) -> StatsResult {
        if !self.full {
            return StatsResult::invalid();
        }

        let mut data = self.history.clone();
        data.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let start = (self.window_size as f64 * 0.25) as usize;
        let end = (self.window_size as f64 * 0.75) as usize;

        let mut max_gap = 0.0;
        let mut split_index = None;
        for i in start..end {
            let gap = data[i + 1] - data[i];
            if gap > max_gap {
                max_gap = gap;
                split_index = Some(i);
            }
        }

        let split_index = match split_index {
            Some(i) if max_gap >= 20.0 => i,
            _ => return StatsResult::invalid(),
        };

        let dits = &data[..=split_index];
        let dahs = &data[split_index + 1..];

        let dit_stats = calculate_stats(dits);
        let dah_stats = calculate_stats(dahs);

        // Coefficient of variation averaged over both clusters: tight
        // clusters mean a steady fist.
        let avg_cv =
            (dit_stats.std_dev / dit_stats.mean + dah_stats.std_dev / dah_stats.mean) / 2.0;
        let confidence = (1.0 - avg_cv).max(0.1);

        StatsResult {
            optimal_threshold: (dits[dits.len() - 1] + dahs[0]) / 2.0,
            dit_stats,
            dah_stats,
            confidence,
            valid: true,
        }
    }
}

/// Fixed-size circular duration window for the cluster backend.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    buffer: Vec<f64>,
    index: usize,
    full: bool,
}

impl WindowBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size],
            index: 0,
            full: false,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.buffer[self.index] = value;
        self.index = (self.index + 1) % self.buffer.len();
        if self.index == 0 {
            self.full = true;
        }
    }

    /// Valid portion of the window, oldest data unordered.
    pub fn data(&self) -> &[f64] {
        if self.full {
            &self.buffer
        } else {
            &self.buffer[..self.index]
        }
    }
}

/// Two-centroid 1-D K-means over a duration window.
#[derive(Debug, Clone, Copy)]
pub struct DurationClusters {
    /// Lower centroid (dit / element gap).
    pub short: f64,
    /// Upper centroid (dah / character gap).
    pub long: f64,
}

impl DurationClusters {
    /// Run Lloyd iterations seeded at `(seed_short, seed_long)`.
    ///
    /// If the seeds collapse (`seed_long < 1.5·seed_short`) the upper
    /// seed is re-spread to `3·seed_short` before iterating. Returns
    /// `None` with fewer than two observations.
    pub fn fit(data: &[f64], seed_short: f64, seed_long: f64) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }

        let mut c1 = seed_short;
        let mut c2 = seed_long;
        if c2 < c1 * 1.5 {
            c2 = c1 * 3.0;
        }

        for _ in 0..5 {
            let (mut sum1, mut count1) = (0.0, 0.0);
            let (mut sum2, mut count2) = (0.0, 0.0);
            for &v in data {
                if (v - c1).abs() < (v - c2).abs() {
                    sum1 += v;
                    count1 += 1.0;
                } else {
                    sum2 += v;
                    count2 += 1.0;
                }
            }
            if count1 > 0.0 {
                c1 = sum1 / count1;
            }
            if count2 > 0.0 {
                c2 = sum2 / count2;
            }
        }

        if c1 > c2 {
            std::mem::swap(&mut c1, &mut c2);
        }
        Some(Self { short: c1, long: c2 })
    }

    /// Seed from the observed extremes (used for mark durations).
    pub fn fit_from_extremes(data: &[f64]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }
        let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Self::fit(data, min, max)
    }
}
