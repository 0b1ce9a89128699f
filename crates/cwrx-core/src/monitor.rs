//! Background spectrum monitor
//!
//! Finds and tracks the CW tone so the demodulator stays centered
//! without operator tuning. The analysis is Welch's method: average the
//! power spectra of overlapping Hann-windowed segments, take the median
//! bin as the noise floor, then hunt the strongest bin inside the
//! configured band and refine it by parabolic interpolation.
//!
//! Acceptance is SNR-gated so band noise cannot drag the estimate
//! around, and accepted frequencies are blended through a first-order
//! smoother whose learning rate grows with SNR — strong signals pull
//! hard, marginal ones barely nudge. The very first acceptance latches
//! directly instead of smoothing up from nothing.
//!
//! [`SpectrumAnalyzer`] is the synchronous core; [`SpectrumMonitor`]
//! wraps it in a worker thread fed by a bounded, lossy channel. The
//! audio thread never blocks: if the monitor falls behind, chunks are
//! dropped and only tracking latency suffers. The tracked frequency is
//! published as atomic f64 bits, last-wins; the audio worker picks it up
//! at chunk boundaries.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use tracing::{debug, info, trace};

use crate::config::MonitorConfig;
use crate::fft_utils::{
    find_band_peak, hann_window, median_noise_floor, welch_power_spectrum, FftProcessor,
};

/// Welch segments the ring must hold.
const NUM_SEGMENTS: usize = 4;

/// Capacity of the audio intake channel, in chunks.
const AUDIO_CHANNEL_CAPACITY: usize = 100;

/// Floor on acceptable absolute peak power.
const MIN_PEAK_POWER: f64 = 0.001;

fn db(x: f64) -> f64 {
    10.0 * x.log10()
}

/// Synchronous Welch analysis core.
///
/// Drive it directly for deterministic tests: push samples, then call
/// [`SpectrumAnalyzer::tick`] as if an update interval elapsed.
#[derive(Debug)]
pub struct SpectrumAnalyzer {
    cfg: MonitorConfig,
    sample_rate: f64,
    fft: FftProcessor,
    window: Vec<f64>,
    overlap: usize,

    ring: Vec<f64>,
    ring_pos: usize,

    smoothed_freq: f64,
    has_lock: bool,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: f64, cfg: MonitorConfig) -> Self {
        let fft_size = cfg.fft_size;
        let overlap = cfg.overlap.min(fft_size - 1);
        let ring_len = fft_size + (NUM_SEGMENTS - 1) * (fft_size - overlap);
        Self {
            fft: FftProcessor::new(fft_size),
            window: hann_window(fft_size),
            overlap,
            sample_rate,
            cfg,
            ring: vec![0.0; ring_len],
            ring_pos: 0,
            smoothed_freq: 0.0,
            has_lock: false,
        }
    }

    /// Append audio to the ring.
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &s in samples {
            self.ring[self.ring_pos] = s as f64;
            self.ring_pos = (self.ring_pos + 1) % self.ring.len();
        }
    }

    /// True once a frequency has been accepted at least once.
    pub fn has_lock(&self) -> bool {
        self.has_lock
    }

    /// Run one analysis pass. Returns the smoothed tracked frequency
    /// when the peak passes the SNR gate, `None` otherwise.
    pub fn tick(&mut self) -> Option<f64> {
        let (freq, peak, noise) = self.analyze_welch()?;

        if peak <= noise * self.cfg.required_snr || peak <= MIN_PEAK_POWER {
            trace!(freq, peak, noise, "peak rejected by squelch");
            return None;
        }

        let snr = peak / noise;
        let alpha = (self.cfg.alpha_base + db(snr) / self.cfg.required_snr * self.cfg.alpha_gain)
            .min(self.cfg.alpha_max);

        if !self.has_lock {
            self.smoothed_freq = freq;
            self.has_lock = true;
            info!(freq_hz = freq, snr_db = db(snr), "initial frequency lock");
        } else {
            let old = self.smoothed_freq;
            self.smoothed_freq = old * (1.0 - alpha) + freq * alpha;
            if (self.smoothed_freq - old).abs() > 2.0 {
                debug!(
                    from_hz = old,
                    raw_hz = freq,
                    to_hz = self.smoothed_freq,
                    snr_db = db(snr),
                    "frequency update"
                );
            }
        }

        Some(self.smoothed_freq)
    }

    /// Welch pass over the ring: `(interpolated_freq, peak_power,
    /// noise_floor)`.
    fn analyze_welch(&mut self) -> Option<(f64, f64, f64)> {
        let spectrum =
            welch_power_spectrum(&mut self.fft, &self.window, &self.ring, self.overlap)?;

        let noise_floor = median_noise_floor(&spectrum);

        let bin_width = self.sample_rate / self.cfg.fft_size as f64;
        let start_bin = (self.cfg.min_freq / bin_width) as usize;
        let end_bin = (self.cfg.max_freq / bin_width) as usize;

        let (frac_bin, peak) = find_band_peak(&spectrum, start_bin, end_bin)?;
        Some((frac_bin * bin_width, peak, noise_floor))
    }
}

/// Worker-thread wrapper around [`SpectrumAnalyzer`].
pub struct SpectrumMonitor {
    enabled: bool,
    audio_tx: Option<Sender<Vec<f32>>>,
    cancel: Arc<AtomicBool>,
    freq_bits: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl SpectrumMonitor {
    /// Spawn the monitor worker. With `enabled: false` in the config,
    /// no thread starts and pushes are free no-ops.
    pub fn spawn(sample_rate: f64, cfg: MonitorConfig) -> Self {
        let enabled = cfg.enabled;
        let cancel = Arc::new(AtomicBool::new(false));
        let freq_bits = Arc::new(AtomicU64::new(0));

        if !enabled {
            return Self {
                enabled,
                audio_tx: None,
                cancel,
                freq_bits,
                handle: None,
            };
        }

        let (audio_tx, audio_rx) = bounded::<Vec<f32>>(AUDIO_CHANNEL_CAPACITY);
        let ticker = tick(Duration::from_millis(cfg.update_interval_ms));
        let worker_cancel = Arc::clone(&cancel);
        let worker_bits = Arc::clone(&freq_bits);

        let handle = std::thread::Builder::new()
            .name("cwrx-monitor".into())
            .spawn(move || {
                let mut analyzer = SpectrumAnalyzer::new(sample_rate, cfg);
                loop {
                    if worker_cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    select! {
                        recv(audio_rx) -> msg => match msg {
                            Ok(samples) => analyzer.push_samples(&samples),
                            Err(_) => break, // input side dropped
                        },
                        recv(ticker) -> _ => {
                            if let Some(freq) = analyzer.tick() {
                                worker_bits.store(freq.to_bits(), Ordering::Release);
                            }
                        }
                    }
                }
            })
            .expect("spawn spectrum monitor thread");

        Self {
            enabled,
            audio_tx: Some(audio_tx),
            cancel,
            freq_bits,
            handle: Some(handle),
        }
    }

    /// Hand a chunk to the worker. Never blocks: when the channel is
    /// saturated the chunk is dropped and only tracking latency is lost.
    pub fn push(&self, samples: &[f32]) {
        if !self.enabled {
            return;
        }
        if let Some(tx) = &self.audio_tx {
            if tx.try_send(samples.to_vec()).is_err() {
                trace!(len = samples.len(), "monitor intake full, chunk dropped");
            }
        }
    }

    /// Latest published frequency, if any acceptance has happened.
    pub fn latest_freq(&self) -> Option<f64> {
        let bits = self.freq_bits.load(Ordering::Acquire);
        if bits == 0 {
            None
        } else {
            Some(f64::from_bits(bits))
        }
    }

    /// Signal the worker and wait for it to finish its in-flight tick.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        // Dropping the sender wakes a blocked recv.
        self.audio_tx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SpectrumMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SpectrumMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumMonitor")
            .field("enabled", &self.enabled)
            .field("latest_freq", &self.latest_freq())
            .finish()
    }
}
