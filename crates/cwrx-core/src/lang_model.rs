//! Bigram language model
//!
//! Transition scores for the beam decoder: how plausible is character
//! `next` after character `prev`? Scores are natural-log probabilities
//! (≤ 0), stored as a mapping of mappings so a later trigram model only
//! has to widen the outer key.
//!
//! Two fallbacks cover missing entries: an empty `prev` (start of
//! sentence or after a word break handled as `" "`) earns a flat
//! `ln(0.05)` prior, and any other unseen bigram the harsh
//! `ln(1e-6)` penalty — strictly worse than anything a trained model
//! would tabulate.
//!
//! ## File format
//!
//! JSON object of objects, single-code-point string keys at both levels,
//! float values:
//!
//! ```json
//! { "Q": { "U": -0.05, "R": -3.2 }, "T": { "H": -0.9 } }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::types::{CwError, CwResult};

/// Log prior for a character with no predecessor.
pub fn word_initial_log_p() -> f64 {
    0.05f64.ln()
}

/// Penalty for bigrams absent from the model.
pub fn default_penalty() -> f64 {
    1e-6f64.ln()
}

/// Immutable bigram log-probability table.
#[derive(Debug, Clone, Default)]
pub struct LanguageModel {
    log_probs: BTreeMap<String, BTreeMap<String, f64>>,
}

impl LanguageModel {
    /// An empty model: every transition falls through to the defaults.
    /// Decoding still works, scored by emission alone.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from a JSON file. Unreadable or malformed files are fatal.
    pub fn from_path(path: impl AsRef<Path>) -> CwResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| CwError::ModelRead(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json_str(&content)
    }

    /// Parse from a JSON string.
    pub fn from_json_str(json: &str) -> CwResult<Self> {
        let log_probs: BTreeMap<String, BTreeMap<String, f64>> =
            serde_json::from_str(json).map_err(|e| CwError::ModelParse(e.to_string()))?;
        Ok(Self { log_probs })
    }

    /// Transition score `log P(next | prev)`.
    pub fn log_p(&self, prev: &str, next: &str) -> f64 {
        if let Some(next_map) = self.log_probs.get(prev) {
            if let Some(&p) = next_map.get(next) {
                return p;
            }
        }
        if prev.is_empty() {
            return word_initial_log_p();
        }
        default_penalty()
    }

    /// Number of contexts in the table.
    pub fn num_contexts(&self) -> usize {
        self.log_probs.len()
    }
}
