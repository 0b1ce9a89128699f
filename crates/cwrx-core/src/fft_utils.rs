//! FFT utilities for tone tracking
//!
//! The spectrum monitor needs one narrow capability from the FFT: turn a
//! block of real audio into an averaged power spectrum and find the
//! strongest tone in a band with sub-bin accuracy. This module wraps a
//! planned `rustfft` transform with a reusable scratch buffer and
//! provides the Welch-averaging and peak-refinement helpers on top.
//!
//! ## Welch averaging
//!
//! A single periodogram of noisy audio is itself noisy. Averaging the
//! squared magnitudes of several overlapping, Hann-windowed segments
//! trades frequency resolution for variance, which is exactly the right
//! trade when hunting a steady CW tone under QRN.
//!
//! ```text
//! ring ──┬─ seg0 ─ window ─ FFT ─ |·|² ─┐
//!        ├─ seg1 ─ window ─ FFT ─ |·|² ─┼─ mean ─ power spectrum
//!        └─ seg2 ─ window ─ FFT ─ |·|² ─┘
//! ```

use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use std::fmt;
use std::f64::consts::PI;
use std::sync::Arc;

/// Planned forward FFT with scratch reuse.
pub struct FftProcessor {
    size: usize,
    fft_forward: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl fmt::Debug for FftProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftProcessor").field("size", &self.size).finish()
    }
}

impl FftProcessor {
    /// Create a processor for the given transform size.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(size);
        let scratch =
            vec![Complex64::new(0.0, 0.0); fft_forward.get_inplace_scratch_len()];
        Self {
            size,
            fft_forward,
            scratch,
        }
    }

    /// Transform size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Compute the forward FFT in place.
    pub fn fft_inplace(&mut self, buffer: &mut [Complex64]) {
        assert_eq!(buffer.len(), self.size);
        self.fft_forward.process_with_scratch(buffer, &mut self.scratch);
    }
}

/// Hann window coefficients.
pub fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (size as f64 - 1.0)).cos()))
        .collect()
}

/// Welch-averaged power spectrum of a real signal.
///
/// Windows consecutive segments of `fft.size()` samples stepping by
/// `fft.size() - overlap`, transforms each, and averages the squared
/// magnitudes over the one-sided spectrum (`size/2 + 1` bins). Returns
/// `None` when the input is shorter than one segment.
pub fn welch_power_spectrum(
    fft: &mut FftProcessor,
    window: &[f64],
    samples: &[f64],
    overlap: usize,
) -> Option<Vec<f64>> {
    let size = fft.size();
    debug_assert_eq!(window.len(), size);
    if samples.len() < size {
        return None;
    }

    let step = size.saturating_sub(overlap).max(1);
    let half = size / 2 + 1;
    let mut avg = vec![0.0f64; half];
    let mut buffer = vec![Complex64::new(0.0, 0.0); size];
    let mut num_segments = 0usize;

    let mut offset = 0;
    while offset + size <= samples.len() {
        for (j, slot) in buffer.iter_mut().enumerate() {
            *slot = Complex64::new(samples[offset + j] * window[j], 0.0);
        }
        fft.fft_inplace(&mut buffer);
        for (a, x) in avg.iter_mut().zip(buffer.iter()) {
            *a += x.norm_sqr();
        }
        num_segments += 1;
        offset += step;
    }

    for a in avg.iter_mut() {
        *a /= num_segments as f64;
    }
    Some(avg)
}

/// Median of a power spectrum, used as a robust noise floor estimate.
///
/// Clamped to `>= 1e-9` so perfectly silent input cannot produce a zero
/// divisor in SNR calculations.
pub fn median_noise_floor(spectrum: &[f64]) -> f64 {
    if spectrum.is_empty() {
        return 1e-9;
    }
    let mut sorted = spectrum.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted[sorted.len() / 2].max(1e-9)
}

/// Strongest bin in `[start_bin, end_bin)`, refined by parabolic
/// interpolation over the three bins around the peak.
///
/// Returns `(fractional_bin, peak_power)`, or `None` when the range is
/// empty.
pub fn find_band_peak(
    spectrum: &[f64],
    start_bin: usize,
    end_bin: usize,
) -> Option<(f64, f64)> {
    let end = end_bin.min(spectrum.len());
    if start_bin >= end {
        return None;
    }

    let mut max_idx = start_bin;
    let mut max_pow = spectrum[start_bin];
    for (i, &p) in spectrum.iter().enumerate().take(end).skip(start_bin) {
        if p > max_pow {
            max_pow = p;
            max_idx = i;
        }
    }

    if max_idx == 0 || max_idx + 1 >= spectrum.len() {
        return Some((max_idx as f64, max_pow));
    }

    let alpha = spectrum[max_idx - 1];
    let beta = spectrum[max_idx];
    let gamma = spectrum[max_idx + 1];
    let denom = alpha - 2.0 * beta + gamma;
    if denom.abs() < 1e-30 {
        return Some((max_idx as f64, max_pow));
    }
    let p = 0.5 * (alpha - gamma) / denom;
    Some((max_idx as f64 + p, max_pow))
}
