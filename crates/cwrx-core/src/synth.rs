//! CW test-signal synthesis
//!
//! Generates keyed-tone audio from text so the decode pipeline can be
//! exercised end to end without a receiver. The keyer follows PARIS
//! timing (dit 1 unit, dah 3, element gap 1, character gap 3, word gap
//! 7, `unit_ms = 1200/wpm`) and shapes every element with raised-cosine
//! edges so the synthetic signal has no key clicks to trip the
//! debouncer.
//!
//! Impairments are all optional and all deterministic under a fixed
//! seed: AWGN at a configured SNR, sinusoidal QSB fading, per-element
//! timing jitter, and a linear frequency sweep over the leading portion
//! of the transmission (for exercising the tone tracker).

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::morse;

/// Synthesis parameters.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub sample_rate: f64,
    /// Tone frequency in Hz (end frequency when sweeping).
    pub tone_freq: f64,
    pub wpm: f64,
    /// Peak tone amplitude.
    pub amplitude: f64,
    /// SNR in dB; `None` adds no noise.
    pub snr_db: Option<f64>,
    /// QSB fade rate in Hz (0 disables).
    pub qsb_rate_hz: f64,
    /// QSB fade depth, 0.0–1.0.
    pub qsb_depth: f64,
    /// Per-element uniform timing jitter as a fraction (0.05 = ±5%).
    pub jitter: f64,
    /// Sweep the tone from this frequency to `tone_freq` over
    /// `sweep_secs`, then hold.
    pub sweep_from: Option<f64>,
    pub sweep_secs: f64,
    /// Raised-cosine keying edge length in ms.
    pub edge_ms: f64,
    /// Silence before keying starts, in ms.
    pub lead_silence_ms: f64,
    /// Silence after keying ends, in ms.
    pub tail_silence_ms: f64,
    /// PRNG seed for noise and jitter.
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            tone_freq: 700.0,
            wpm: 20.0,
            amplitude: 0.5,
            snr_db: None,
            qsb_rate_hz: 0.0,
            qsb_depth: 0.0,
            jitter: 0.0,
            sweep_from: None,
            sweep_secs: 0.0,
            edge_ms: 5.0,
            lead_silence_ms: 300.0,
            tail_silence_ms: 600.0,
            seed: 42,
        }
    }
}

/// One keying element: on/off and duration in ms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyElement {
    pub on: bool,
    pub duration_ms: f64,
}

/// Expand text into a keying timeline. Characters without a code are
/// skipped.
pub fn key_timeline(text: &str, wpm: f64) -> Vec<KeyElement> {
    let unit = 1200.0 / wpm;
    let mut timeline = Vec::new();
    let mut first_in_word = true;

    for ch in text.chars() {
        if ch == ' ' {
            timeline.push(KeyElement {
                on: false,
                duration_ms: unit * 7.0,
            });
            first_in_word = true;
            continue;
        }
        let Some(code) = morse::code_for(ch) else {
            continue;
        };
        if !first_in_word {
            timeline.push(KeyElement {
                on: false,
                duration_ms: unit * 3.0,
            });
        }
        first_in_word = false;
        for (i, element) in code.chars().enumerate() {
            if i > 0 {
                timeline.push(KeyElement {
                    on: false,
                    duration_ms: unit,
                });
            }
            timeline.push(KeyElement {
                on: true,
                duration_ms: if element == '-' { unit * 3.0 } else { unit },
            });
        }
    }
    timeline
}

/// Render text into impaired audio samples.
pub fn synthesize(text: &str, cfg: &SynthConfig) -> Vec<f32> {
    let fs = cfg.sample_rate;
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let mut timeline = key_timeline(text, cfg.wpm);
    if cfg.jitter > 0.0 {
        for element in timeline.iter_mut() {
            let factor = 1.0 + rng.gen_range(-cfg.jitter..cfg.jitter);
            element.duration_ms *= factor;
        }
    }

    let total_ms: f64 = cfg.lead_silence_ms
        + timeline.iter().map(|e| e.duration_ms).sum::<f64>()
        + cfg.tail_silence_ms;
    let total_samples = (total_ms / 1000.0 * fs) as usize;
    let mut samples = Vec::with_capacity(total_samples);

    let edge_samples = (cfg.edge_ms / 1000.0 * fs).max(1.0);
    let mut phase: f64 = 0.0;
    let mut sample_index = 0usize;

    let noise = cfg.snr_db.map(|snr_db| {
        let signal_power = cfg.amplitude * cfg.amplitude / 2.0;
        let noise_var = signal_power / 10.0f64.powf(snr_db / 10.0);
        Normal::new(0.0, noise_var.sqrt()).expect("valid noise sigma")
    });

    let mut render = |on: bool,
                      duration_ms: f64,
                      phase: &mut f64,
                      sample_index: &mut usize,
                      samples: &mut Vec<f32>,
                      rng: &mut StdRng| {
        let n = (duration_ms / 1000.0 * fs) as usize;
        for k in 0..n {
            let t = *sample_index as f64 / fs;

            // Instantaneous frequency, possibly swept.
            let freq = match cfg.sweep_from {
                Some(from) if cfg.sweep_secs > 0.0 => {
                    let progress = (t / cfg.sweep_secs).min(1.0);
                    from + (cfg.tone_freq - from) * progress
                }
                _ => cfg.tone_freq,
            };
            *phase += 2.0 * PI * freq / fs;
            if *phase > 2.0 * PI {
                *phase -= 2.0 * PI;
            }

            let mut value = 0.0;
            if on {
                // Raised-cosine keying envelope.
                let edge = edge_samples.min(n as f64 / 2.0);
                let keying = if (k as f64) < edge {
                    0.5 * (1.0 - (PI * k as f64 / edge).cos())
                } else if (k as f64) >= n as f64 - edge {
                    let remain = (n - 1 - k) as f64;
                    0.5 * (1.0 - (PI * remain / edge).cos())
                } else {
                    1.0
                };

                let qsb = if cfg.qsb_rate_hz > 0.0 && cfg.qsb_depth > 0.0 {
                    1.0 - cfg.qsb_depth * (0.5 + 0.5 * (2.0 * PI * cfg.qsb_rate_hz * t).sin())
                } else {
                    1.0
                };

                value = cfg.amplitude * keying * qsb * phase.sin();
            }

            if let Some(dist) = &noise {
                value += dist.sample(rng);
            }
            samples.push(value as f32);
            *sample_index += 1;
        }
    };

    render(
        false,
        cfg.lead_silence_ms,
        &mut phase,
        &mut sample_index,
        &mut samples,
        &mut rng,
    );
    for element in &timeline {
        render(
            element.on,
            element.duration_ms,
            &mut phase,
            &mut sample_index,
            &mut samples,
            &mut rng,
        );
    }
    render(
        false,
        cfg.tail_silence_ms,
        &mut phase,
        &mut sample_index,
        &mut samples,
        &mut rng,
    );

    samples
}
