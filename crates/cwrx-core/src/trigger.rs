//! Schmitt trigger with debounce
//!
//! Binarizes the envelope into mark/space with two defenses against
//! noise. Hysteresis: a mark only ends when the envelope falls below the
//! *low* threshold, and only begins when it rises above the *high* one,
//! so chatter inside the band is invisible. Debounce: a raw flip must
//! persist strictly longer than the debounce window before it commits.
//!
//! Timing credit matters for the decoder downstream. When a change
//! commits, the finished state's duration runs from its start to the
//! *raw crossing* sample (`change_start`), not to the commit sample —
//! the debounce window's worth of samples belongs to the new state.
//! Without this, every dot and dash would read one debounce too long and
//! every gap one debounce too short.

use crate::thresholder::ThresholdStrategy;
use crate::types::{SignalState, StateTransition};

/// Hysteresis comparator + debounce state machine.
pub struct SchmittTrigger {
    sample_rate: f64,
    debounce_count: u64,
    thresholder: Box<dyn ThresholdStrategy>,

    current_state: SignalState,
    total_samples: u64,
    state_start_sample: u64,

    pending_change: bool,
    change_start_sample: u64,
}

impl SchmittTrigger {
    /// Create a trigger fed by the given threshold strategy.
    pub fn new(
        sample_rate: f64,
        debounce_ms: f64,
        thresholder: Box<dyn ThresholdStrategy>,
    ) -> Self {
        Self {
            sample_rate,
            debounce_count: (debounce_ms / 1000.0 * sample_rate) as u64,
            thresholder,
            current_state: SignalState::Space,
            total_samples: 0,
            state_start_sample: 0,
            pending_change: false,
            change_start_sample: 0,
        }
    }

    /// Current committed state.
    pub fn current_state(&self) -> SignalState {
        self.current_state
    }

    /// How long the current state has been running, in ms.
    pub fn current_state_duration_ms(&self) -> f64 {
        (self.total_samples - self.state_start_sample) as f64 / self.sample_rate * 1000.0
    }

    /// Feed one envelope sample. Returns a transition when a debounced
    /// state change commits, reporting the state that just ended.
    pub fn feed(&mut self, envelope: f64) -> Option<StateTransition> {
        self.total_samples += 1;

        let (high, low) = self.thresholder.update(envelope);

        // Raw hysteresis decision.
        let mut raw = self.current_state;
        match self.current_state {
            SignalState::Mark => {
                if envelope < low {
                    raw = SignalState::Space;
                }
            }
            SignalState::Space => {
                if envelope > high {
                    raw = SignalState::Mark;
                }
            }
        }

        // Stable, or returned to the committed state: drop any pending
        // change.
        if raw == self.current_state {
            self.pending_change = false;
            return None;
        }

        // First sample of a disagreement: start the debounce clock.
        if !self.pending_change {
            self.pending_change = true;
            self.change_start_sample = self.total_samples;
            return None;
        }

        // Equality does not commit; strictly longer does.
        let pending_duration = self.total_samples - self.change_start_sample;
        if pending_duration > self.debounce_count {
            let prev_duration_samples = self.change_start_sample - self.state_start_sample;
            let duration_ms = prev_duration_samples as f64 / self.sample_rate * 1000.0;

            let finished = self.current_state;
            self.current_state = raw;
            self.state_start_sample = self.change_start_sample;
            self.pending_change = false;

            return Some(StateTransition {
                finished,
                duration_ms,
            });
        }

        None
    }
}

impl std::fmt::Debug for SchmittTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchmittTrigger")
            .field("current_state", &self.current_state)
            .field("total_samples", &self.total_samples)
            .field("debounce_count", &self.debounce_count)
            .finish()
    }
}
