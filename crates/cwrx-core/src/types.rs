//! Core types for CW signal processing
//!
//! This module defines the fundamental types shared across the decode
//! pipeline: sample aliases, the mark/space state vocabulary, the
//! debounced transition event emitted by the Schmitt trigger, and the
//! crate-wide error type.
//!
//! ## Mark and space
//!
//! CW is on-off keying: the transmitter is either keyed (*mark*) or
//! silent (*space*). Everything downstream of the envelope detector
//! reasons in terms of how long the signal stayed in one of these two
//! states.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// A floating point sample (for real-valued signals).
pub type Sample = f64;

/// A single I/Q sample point.
pub type IQSample = Complex64;

/// Result type for decoder operations.
pub type CwResult<T> = Result<T, CwError>;

/// Errors that can occur while constructing the pipeline.
///
/// Runtime signal anomalies (squelch, pure noise, degenerate timing) are
/// absorbed with state-preserving fallbacks and never surface here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CwError {
    #[error("invalid filter order: {0}. Must be even and >= 2")]
    InvalidFilterOrder(usize),

    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read language model: {0}")]
    ModelRead(String),

    #[error("failed to parse language model: {0}")]
    ModelParse(String),
}

/// Keying state of the received signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalState {
    /// Transmitter keyed, tone present.
    Mark,
    /// Transmitter silent.
    Space,
}

impl SignalState {
    /// The opposite state.
    pub fn toggled(self) -> Self {
        match self {
            SignalState::Mark => SignalState::Space,
            SignalState::Space => SignalState::Mark,
        }
    }

    /// True if this is [`SignalState::Mark`].
    pub fn is_mark(self) -> bool {
        matches!(self, SignalState::Mark)
    }
}

/// A debounce-confirmed state change.
///
/// Reports the state that just *ended* and how long it lasted. Durations
/// are wall-clock milliseconds derived from sample counts, measured up to
/// the raw crossing sample rather than the (later) debounce commit
/// sample, so glitch samples are credited to the new state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateTransition {
    /// The state that just finished.
    pub finished: SignalState,
    /// How long the finished state lasted, in milliseconds.
    pub duration_ms: f64,
}
