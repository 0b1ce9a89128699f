//! Viterbi-style beam search decoder
//!
//! Holds up to K ranked sentence hypotheses and extends every one of
//! them with every character whose timing template matches the incoming
//! pulse vector. Each candidate is scored by
//!
//! ```text
//! score = emission(pulses | pattern) + log P(char | prev_char)
//! ```
//!
//! where emission is a Gaussian log-likelihood per pulse with σ taken
//! from the live duration statistics (dit σ for short elements, dah σ
//! for long ones), and the transition term comes from the bigram
//! language model. Pruning keeps the beam tractable: sort by score,
//! keep at most K paths within a fixed window of the best, and collapse
//! paths that end in the same character — under a bigram model their
//! futures are identical, so only the best-scored one can ever win.
//!
//! Under pure noise every candidate can fall below the emission cutoff.
//! In that case the previous paths are retained untouched rather than
//! collapsing the beam to nothing.

use tracing::trace;

use crate::lang_model::LanguageModel;
use crate::morse::{standard_patterns, StandardPattern};
use crate::stats::StatsResult;

/// Emission score for a length mismatch.
const LENGTH_MISMATCH_SCORE: f64 = -1000.0;

/// Candidates scoring below this on emission alone are discarded early.
const EMISSION_CUTOFF: f64 = -50.0;

/// Gaussian σ bounds. The lower clamp guards against a freshly seeded
/// analyzer reporting near-zero spread; the upper keeps terrible signal
/// from flattening all scores into indistinguishability.
const SIGMA_MIN: f64 = 0.25;
const SIGMA_MAX: f64 = 5.0;

/// Fallback σ values used until the analyzer window fills.
const DEFAULT_DIT_SIGMA: f64 = 0.2;
const DEFAULT_DAH_SIGMA: f64 = 0.4;

/// One decoding hypothesis.
#[derive(Debug, Clone)]
pub struct Path {
    /// Sentence decoded along this path.
    pub sentence: String,
    /// Last character, for transition lookups ("" before any character).
    pub last_char: String,
    /// Cumulative log-probability.
    pub total_score: f64,
}

/// K-best beam over character hypotheses.
#[derive(Debug)]
pub struct BeamDecoder {
    lm: LanguageModel,
    patterns: Vec<StandardPattern>,
    paths: Vec<Path>,
    beam_width: usize,
    prune_threshold: f64,
}

impl BeamDecoder {
    /// Create a decoder with an initial empty hypothesis.
    pub fn new(lm: LanguageModel, beam_width: usize, prune_threshold: f64) -> Self {
        Self {
            lm,
            patterns: standard_patterns(),
            paths: vec![Path {
                sentence: String::new(),
                last_char: String::new(),
                total_score: 0.0,
            }],
            beam_width,
            prune_threshold,
        }
    }

    /// Extend every path with every plausible character for `signal`.
    ///
    /// `signal` is one character's normalized pulse vector; `stats` the
    /// current duration statistics (invalid stats fall back to seed σ).
    pub fn step(&mut self, signal: &[f64], stats: &StatsResult) {
        let (dit_sigma, dah_sigma) = if stats.valid {
            (stats.dit_stats.std_dev, stats.dah_stats.std_dev)
        } else {
            (DEFAULT_DIT_SIGMA, DEFAULT_DAH_SIGMA)
        };

        let mut candidates: Vec<Path> = Vec::new();
        for prev in &self.paths {
            for pattern in &self.patterns {
                let emit = emission_score(signal, &pattern.sequence, dit_sigma, dah_sigma);
                if emit < EMISSION_CUTOFF {
                    continue;
                }

                let ch = pattern.ch.to_string();
                let trans = self.lm.log_p(&prev.last_char, &ch);

                let mut sentence = String::with_capacity(prev.sentence.len() + 1);
                sentence.push_str(&prev.sentence);
                sentence.push(pattern.ch);
                candidates.push(Path {
                    sentence,
                    last_char: ch,
                    total_score: prev.total_score + emit + trans,
                });
            }
        }

        // Nothing matched: pure noise. Keep the beam as it was.
        if candidates.is_empty() {
            trace!(pulses = signal.len(), "no candidates, ignoring noise step");
            return;
        }

        self.paths = self.prune(candidates);
    }

    /// Append a word break to every path that does not already end in
    /// one, charged with the `prev → " "` transition score.
    pub fn inject_space(&mut self) {
        let mut new_paths = Vec::with_capacity(self.paths.len());
        for p in &self.paths {
            if p.sentence.is_empty() || p.sentence.ends_with(' ') {
                new_paths.push(p.clone());
                continue;
            }
            let trans = self.lm.log_p(&p.last_char, " ");
            new_paths.push(Path {
                sentence: format!("{} ", p.sentence),
                last_char: " ".to_string(),
                total_score: p.total_score + trans,
            });
        }
        self.paths = self.prune(new_paths);
    }

    /// Best sentence so far.
    pub fn best_sentence(&self) -> &str {
        self.paths.first().map(|p| p.sentence.as_str()).unwrap_or("")
    }

    /// Current beam, best first.
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    fn prune(&self, mut candidates: Vec<Path>) -> Vec<Path> {
        if candidates.is_empty() {
            return candidates;
        }

        candidates.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let best_score = candidates[0].total_score;

        let mut survivors: Vec<Path> = Vec::with_capacity(self.beam_width);
        let mut seen_states: Vec<String> = Vec::with_capacity(self.beam_width);

        for path in candidates {
            if survivors.len() >= self.beam_width {
                break;
            }
            if path.total_score < best_score - self.prune_threshold {
                break;
            }
            // A worse path ending in the same character can never
            // overtake: same futures, lower present.
            if seen_states.contains(&path.last_char) {
                continue;
            }
            seen_states.push(path.last_char.clone());
            survivors.push(path);
        }
        survivors
    }
}

/// Gaussian log-likelihood of `signal` against `pattern`.
fn emission_score(signal: &[f64], pattern: &[f64], dit_sigma: f64, dah_sigma: f64) -> f64 {
    if signal.len() != pattern.len() {
        return LENGTH_MISMATCH_SCORE;
    }

    let mut total = 0.0;
    for (&observed, &expected) in signal.iter().zip(pattern.iter()) {
        let sigma = if expected > 2.0 { dah_sigma } else { dit_sigma };
        let sigma = sigma.clamp(SIGMA_MIN, SIGMA_MAX);
        let diff = observed - expected;
        total += -(diff * diff) / (2.0 * sigma * sigma);
    }
    total
}
