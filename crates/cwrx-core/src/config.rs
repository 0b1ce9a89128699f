//! # Configuration System
//!
//! Construction-time configuration for the decode pipeline. Every stage
//! reads its parameters from one [`CwConfig`] instance; nothing consults
//! the environment at runtime.
//!
//! Defaults carry the tuning that works for typical amateur-band CW
//! (48 kHz audio, 600–900 Hz sidetone, 15–35 WPM). All sections are
//! serde-friendly so embedders can load them from JSON/YAML alongside
//! their own settings.
//!
//! ## Example
//!
//! ```rust
//! use cwrx_core::config::CwConfig;
//!
//! let mut cfg = CwConfig::default();
//! cfg.audio.target_freq = 650.0;
//! cfg.symbol.initial_wpm = 25.0;
//! assert!(cfg.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{CwError, CwResult};

/// Audio input parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input sample rate in Hz.
    pub sample_rate: f64,
    /// Initial tone frequency in Hz (refined by the spectrum monitor).
    pub target_freq: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            target_freq: 700.0,
        }
    }
}

/// Background spectrum monitor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Whether the background monitor runs at all.
    pub enabled: bool,
    /// FFT size per Welch segment. Larger = finer frequency resolution.
    pub fft_size: usize,
    /// Overlap between Welch segments in samples (half the FFT size is
    /// the usual choice).
    pub overlap: usize,
    /// Analysis cadence in milliseconds.
    pub update_interval_ms: u64,
    /// Peak search lower bound in Hz.
    pub min_freq: f64,
    /// Peak search upper bound in Hz.
    pub max_freq: f64,
    /// Minimum linear SNR (peak power / median noise power) to accept a peak.
    pub required_snr: f64,
    /// Base learning rate for frequency smoothing.
    pub alpha_base: f64,
    /// SNR-proportional learning rate gain.
    pub alpha_gain: f64,
    /// Upper clip on the smoothing learning rate.
    pub alpha_max: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fft_size: 4096,
            overlap: 2048,
            update_interval_ms: 200,
            min_freq: 600.0,
            max_freq: 900.0,
            required_snr: 40.0,
            alpha_base: 0.02,
            alpha_gain: 0.005,
            alpha_max: 0.5,
        }
    }
}

/// Quadrature demodulator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdrConfig {
    /// Whether the AFC loop trims the local oscillator.
    pub afc_enabled: bool,
    /// AFC correction gain per update.
    pub afc_gain: f64,
    /// AFC dead-band in Hz; smaller errors are left alone.
    pub afc_deadband_hz: f64,
    /// I/Q low-pass cutoff in Hz. Passband is twice this.
    pub filter_bw_hz: f64,
}

impl Default for SdrConfig {
    fn default() -> Self {
        Self {
            afc_enabled: true,
            afc_gain: 2e-4,
            afc_deadband_hz: 2.0,
            filter_bw_hz: 50.0,
        }
    }
}

/// Which threshold strategy feeds the Schmitt trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Percentile analysis over a multi-second history ring.
    History,
    /// Per-sample dual envelope tracker with hard squelch.
    Adaptive,
}

/// Trigger and thresholding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Debounce window in milliseconds.
    pub debounce_ms: f64,
    /// Threshold strategy selection.
    pub mode: ThresholdMode,
    /// Envelope tracker decay factor (adaptive mode).
    pub decay_rate: f64,
    /// Minimum max−min envelope range before squelch (adaptive mode).
    pub min_range: f64,
    /// History window length in seconds (history mode).
    pub history_secs: f64,
    /// Envelope storage rate for the history ring in Hz (history mode).
    pub history_downsample_hz: f64,
    /// Threshold recompute interval in seconds (history mode).
    pub history_refresh_secs: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 12.0,
            mode: ThresholdMode::History,
            decay_rate: 0.9995,
            min_range: 0.005,
            history_secs: 30.0,
            history_downsample_hz: 100.0,
            history_refresh_secs: 2.0,
        }
    }
}

/// Symbol timing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolConfig {
    /// Initial speed guess in words per minute.
    pub initial_wpm: f64,
    /// Marks/gaps shorter than this are stitched away as glitches (ms).
    pub glitch_threshold_ms: f64,
    /// Gap longer than this many unit times ends a character.
    pub char_gap_ratio: f64,
    /// Gap longer than this many unit times is a word break.
    pub word_gap_ratio: f64,
    /// EMA factor for unit-time updates (scaled by analyzer confidence).
    pub wpm_update_alpha: f64,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            initial_wpm: 20.0,
            glitch_threshold_ms: 20.0,
            char_gap_ratio: 2.5,
            word_gap_ratio: 5.0,
            wpm_update_alpha: 0.25,
        }
    }
}

/// Beam search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamConfig {
    /// Maximum number of live hypotheses (K).
    pub beam_width: usize,
    /// Paths more than this many nats behind the best are pruned.
    pub prune_threshold: f64,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            beam_width: 20,
            prune_threshold: 10.0,
        }
    }
}

/// Decoder backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderBackend {
    /// Beam search guided by a bigram language model.
    Beam,
    /// 2-means duration clustering with table lookup.
    Cluster,
}

/// Cluster backend parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Mark duration statistics window.
    pub mark_window: usize,
    /// Space duration statistics window.
    pub space_window: usize,
    /// Minimum plausible dot length in seconds (~50 WPM).
    pub min_dot_len: f64,
    /// Maximum plausible dot length in seconds (~5 WPM).
    pub max_dot_len: f64,
    /// Marks shorter than this are dropped (ms).
    pub mark_glitch_ms: f64,
    /// Spaces shorter than this are dropped (ms).
    pub space_glitch_ms: f64,
    /// Hard floor on the character gap threshold (ms).
    pub char_gap_min_ms: f64,
    /// Gap longer than this many character gaps emits a word break.
    pub word_gap_ratio: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            mark_window: 16,
            space_window: 16,
            min_dot_len: 0.024,
            max_dot_len: 0.24,
            mark_glitch_ms: 20.0,
            space_glitch_ms: 20.0,
            char_gap_min_ms: 60.0,
            word_gap_ratio: 5.0,
        }
    }
}

/// Top-level decoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CwConfig {
    pub audio: AudioConfig,
    pub monitor: MonitorConfig,
    pub sdr: SdrConfig,
    pub trigger: TriggerConfig,
    pub symbol: SymbolConfig,
    pub beam: BeamConfig,
    pub backend: DecoderBackend,
    pub cluster: ClusterConfig,
}

impl Default for CwConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            monitor: MonitorConfig::default(),
            sdr: SdrConfig::default(),
            trigger: TriggerConfig::default(),
            symbol: SymbolConfig::default(),
            beam: BeamConfig::default(),
            backend: DecoderBackend::Beam,
            cluster: ClusterConfig::default(),
        }
    }
}

impl CwConfig {
    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> CwResult<()> {
        if !(self.audio.sample_rate.is_finite() && self.audio.sample_rate > 0.0) {
            return Err(CwError::InvalidSampleRate(self.audio.sample_rate));
        }
        if self.audio.target_freq <= 0.0
            || self.audio.target_freq >= self.audio.sample_rate / 2.0
        {
            return Err(CwError::InvalidConfig(format!(
                "target frequency {} Hz outside (0, Nyquist)",
                self.audio.target_freq
            )));
        }
        if self.monitor.fft_size < 64 || !self.monitor.fft_size.is_power_of_two() {
            return Err(CwError::InvalidConfig(format!(
                "fft_size {} must be a power of two >= 64",
                self.monitor.fft_size
            )));
        }
        if self.monitor.overlap >= self.monitor.fft_size {
            return Err(CwError::InvalidConfig(format!(
                "overlap {} must be below fft_size {}",
                self.monitor.overlap, self.monitor.fft_size
            )));
        }
        if self.monitor.min_freq >= self.monitor.max_freq {
            return Err(CwError::InvalidConfig(format!(
                "monitor band [{}, {}] is empty",
                self.monitor.min_freq, self.monitor.max_freq
            )));
        }
        if self.sdr.filter_bw_hz <= 0.0 {
            return Err(CwError::InvalidConfig(format!(
                "filter bandwidth {} Hz must be positive",
                self.sdr.filter_bw_hz
            )));
        }
        if self.trigger.debounce_ms < 0.0 {
            return Err(CwError::InvalidConfig(format!(
                "debounce {} ms must be non-negative",
                self.trigger.debounce_ms
            )));
        }
        if self.symbol.initial_wpm <= 0.0 {
            return Err(CwError::InvalidConfig(format!(
                "initial WPM {} must be positive",
                self.symbol.initial_wpm
            )));
        }
        if self.symbol.char_gap_ratio >= self.symbol.word_gap_ratio {
            return Err(CwError::InvalidConfig(
                "char_gap_ratio must be below word_gap_ratio".into(),
            ));
        }
        if self.beam.beam_width == 0 {
            return Err(CwError::InvalidConfig("beam_width must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(CwConfig::default().validate().is_ok());
    }

    #[test]
    fn bad_sample_rate_rejected() {
        let mut cfg = CwConfig::default();
        cfg.audio.sample_rate = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(CwError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn target_above_nyquist_rejected() {
        let mut cfg = CwConfig::default();
        cfg.audio.target_freq = 30_000.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_power_of_two_fft_rejected() {
        let mut cfg = CwConfig::default();
        cfg.monitor.fft_size = 1000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn roundtrips_through_json() {
        let cfg = CwConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: CwConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.monitor.fft_size, cfg.monitor.fft_size);
        assert_eq!(back.backend, DecoderBackend::Beam);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let back: CwConfig =
            serde_json::from_str(r#"{"audio": {"target_freq": 650.0}}"#).unwrap();
        assert_eq!(back.audio.target_freq, 650.0);
        assert_eq!(back.audio.sample_rate, 48_000.0);
        assert_eq!(back.beam.beam_width, 20);
    }
}
