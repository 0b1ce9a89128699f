//! Symbol buffer — timing normalization and glitch stitching
//!
//! Sits between the Schmitt trigger and the beam decoder. Transitions
//! arrive as raw millisecond durations; characters leave as normalized
//! pulse vectors. Three jobs happen here:
//!
//! **Glitch stitching.** Noise splits marks and fakes marks. A gap
//! shorter than the glitch threshold welds its neighbors into one mark
//! (mark–blip–mark becomes mark). A mark shorter than the threshold is
//! a spike: it is discarded and the silence on both sides of it is
//! rejoined, including the gap already staged in the pulse buffer.
//!
//! **Speed tracking.** The unit time (one dit, `1200/WPM` ms) follows
//! the sender via an EMA over observed marks. Dahs are divided by three
//! first; the dit/dah decision comes from the statistical analyzer when
//! its window is full, else from a fixed `2.2×` unit ratio. Samples
//! outside 0.5–1.5× the current unit are used for decoding but not for
//! adaptation, and the analyzer's confidence scales the learning rate.
//!
//! **Character segmentation.** A gap beyond `char_gap_ratio` unit times
//! closes the character and hands the pulse buffer to the beam decoder;
//! beyond `word_gap_ratio` it also injects a word break.
//!
//! Marks settle lazily: a finished mark is only committed when the
//! *next* mark event arrives, because only then is it known whether the
//! intervening gap was real or a glitch to stitch across.

use tracing::warn;

use crate::beam::BeamDecoder;
use crate::config::SymbolConfig;
use crate::stats::StatisticalAnalyzer;
use crate::types::{SignalState, StateTransition};

/// Unit time below this is degenerate and triggers recovery (ms).
const UNIT_TIME_FLOOR_MS: f64 = 10.0;

/// Recovery unit time (20 WPM) after degeneration.
const UNIT_TIME_RESET_MS: f64 = 60.0;

/// Dit/dah classification ratio when the analyzer is not ready.
const FALLBACK_SPLIT_RATIO: f64 = 2.2;

/// Timing normalizer in front of the beam decoder.
#[derive(Debug)]
pub struct SymbolBuffer {
    cfg: SymbolConfig,
    unit_time_ms: f64,

    pending_mark_ms: f64,
    last_gap_ms: f64,
    pulse_buffer: Vec<f64>,

    analyzer: StatisticalAnalyzer,
    beam: BeamDecoder,
}

impl SymbolBuffer {
    /// Wire a symbol buffer to its beam decoder.
    pub fn new(cfg: SymbolConfig, beam: BeamDecoder) -> Self {
        let unit_time_ms = 1200.0 / cfg.initial_wpm;
        Self {
            cfg,
            unit_time_ms,
            pending_mark_ms: 0.0,
            last_gap_ms: 0.0,
            pulse_buffer: Vec::with_capacity(16),
            analyzer: StatisticalAnalyzer::new(10),
            beam,
        }
    }

    /// Current unit time estimate in ms.
    pub fn unit_time_ms(&self) -> f64 {
        self.unit_time_ms
    }

    /// Current speed estimate in words per minute.
    pub fn wpm(&self) -> f64 {
        1200.0 / self.unit_time_ms
    }

    /// Best sentence decoded so far.
    pub fn best_sentence(&self) -> &str {
        self.beam.best_sentence()
    }

    /// Consume one debounced transition.
    ///
    /// Gap completions only accumulate; mark completions run the full
    /// settle cycle and return the decoder's current best sentence.
    pub fn feed(&mut self, transition: StateTransition) -> Option<&str> {
        match transition.finished {
            SignalState::Space => {
                // A gap just ended. Stash it; its meaning depends on the
                // mark that follows.
                self.last_gap_ms += transition.duration_ms;
                None
            }
            SignalState::Mark => {
                self.on_mark_finished(transition.duration_ms);
                Some(self.beam.best_sentence())
            }
        }
    }

    /// Commit any held mark and force a decode of the open character.
    /// Call at end of stream.
    pub fn flush(&mut self) -> Option<&str> {
        if self.pending_mark_ms > 0.0 {
            let pulse = self.pending_mark_ms / self.unit_time_ms;
            self.pulse_buffer.push(pulse);
            self.pending_mark_ms = 0.0;
        }
        if !self.pulse_buffer.is_empty() {
            let stats = self.analyzer.analyze();
            self.beam.step(&self.pulse_buffer, &stats);
            self.pulse_buffer.clear();
            return Some(self.beam.best_sentence());
        }
        None
    }

    fn on_mark_finished(&mut self, duration_ms: f64) {
        // A mark just ended; `duration_ms` is its length. The staged
        // previous mark and the gap between them can now be judged.

        // Low-side stitch: the gap separating this mark from the staged
        // one was a dropout, not keying. Weld all three together and
        // keep waiting for the real end of the mark.
        if self.last_gap_ms > 0.0 && self.last_gap_ms < self.cfg.glitch_threshold_ms {
            self.pending_mark_ms += self.last_gap_ms + duration_ms;
            self.last_gap_ms = 0.0;
            return;
        }

        // Settle the staged mark.
        if self.pending_mark_ms > 0.0 {
            if self.pending_mark_ms > self.cfg.glitch_threshold_ms {
                let mark_ms = self.pending_mark_ms;
                self.update_wpm(mark_ms);
                self.pulse_buffer.push(mark_ms / self.unit_time_ms);
            } else {
                // High-side glitch: a spike pretended to be a mark. Drop
                // it and reconstruct the true silence across it, pulling
                // back the gap already staged in the buffer.
                let noise_ms = self.pending_mark_ms;
                if let Some(prev_gap_pulse) = self.pop_staged_gap() {
                    self.last_gap_ms += prev_gap_pulse * self.unit_time_ms + noise_ms;
                } else {
                    self.last_gap_ms += noise_ms;
                }
            }
        }

        // Settle the gap in front of this mark.
        if self.last_gap_ms > self.unit_time_ms * self.cfg.char_gap_ratio {
            if !self.pulse_buffer.is_empty() {
                let stats = self.analyzer.analyze();
                self.beam.step(&self.pulse_buffer, &stats);
                self.pulse_buffer.clear();
            }
            if self.last_gap_ms > self.unit_time_ms * self.cfg.word_gap_ratio {
                self.beam.inject_space();
            }
        } else if self.last_gap_ms > 0.0 && !self.pulse_buffer.is_empty() {
            // Intra-character gap: part of the pattern.
            let gap = self.last_gap_ms / self.unit_time_ms;
            self.pulse_buffer.push(gap);
        }

        // Stage the mark that just finished.
        self.pending_mark_ms = duration_ms;
        self.last_gap_ms = 0.0;
    }

    /// Remove the trailing staged gap from the pulse buffer, if any.
    fn pop_staged_gap(&mut self) -> Option<f64> {
        self.pulse_buffer.pop()
    }

    fn update_wpm(&mut self, mark_ms: f64) {
        self.analyzer.add_observation(mark_ms);
        let stats = self.analyzer.analyze();

        let (threshold, alpha) = if stats.valid {
            let alpha = (self.cfg.wpm_update_alpha * stats.confidence).clamp(0.05, 0.5);
            (stats.optimal_threshold, alpha)
        } else {
            (self.unit_time_ms * FALLBACK_SPLIT_RATIO, self.cfg.wpm_update_alpha)
        };

        let sample_unit = if mark_ms > threshold {
            mark_ms / 3.0
        } else {
            mark_ms
        };

        // Outlier rejection: decode with it, but do not learn from it.
        if sample_unit > self.unit_time_ms * 0.5 && sample_unit < self.unit_time_ms * 1.5 {
            self.unit_time_ms = alpha * sample_unit + (1.0 - alpha) * self.unit_time_ms;
        }

        if self.unit_time_ms < UNIT_TIME_FLOOR_MS {
            warn!(
                unit_ms = self.unit_time_ms,
                "unit time degenerated, resetting to {} ms", UNIT_TIME_RESET_MS
            );
            self.unit_time_ms = UNIT_TIME_RESET_MS;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::BeamDecoder;
    use crate::lang_model::LanguageModel;

    fn buffer_at(wpm: f64) -> SymbolBuffer {
        let cfg = SymbolConfig {
            initial_wpm: wpm,
            ..SymbolConfig::default()
        };
        let beam = BeamDecoder::new(LanguageModel::empty(), 20, 10.0);
        SymbolBuffer::new(cfg, beam)
    }

    fn mark(ms: f64) -> StateTransition {
        StateTransition {
            finished: SignalState::Mark,
            duration_ms: ms,
        }
    }

    fn space(ms: f64) -> StateTransition {
        StateTransition {
            finished: SignalState::Space,
            duration_ms: ms,
        }
    }

    /// Feed a keying sequence of (state, ms) pairs and return the final
    /// best sentence after flush.
    fn decode(sb: &mut SymbolBuffer, seq: &[(bool, f64)]) -> String {
        for &(is_mark, ms) in seq {
            let t = if is_mark { mark(ms) } else { space(ms) };
            sb.feed(t);
        }
        sb.flush();
        sb.best_sentence().to_string()
    }

    #[test]
    fn single_letter_a() {
        let mut sb = buffer_at(20.0); // unit 60 ms
        let out = decode(
            &mut sb,
            &[(true, 60.0), (false, 60.0), (true, 180.0), (false, 420.0)],
        );
        assert_eq!(out, "A");
    }

    #[test]
    fn two_letters_with_char_gap() {
        let mut sb = buffer_at(20.0);
        // E (dit) [char gap] T (dah)
        let out = decode(
            &mut sb,
            &[
                (true, 60.0),
                (false, 180.0),
                (true, 180.0),
                (false, 420.0),
                // Closing dit so the final T settles through a mark event.
                (true, 60.0),
            ],
        );
        assert!(out.starts_with("ET"), "got {:?}", out);
    }

    #[test]
    fn word_break_injected() {
        let mut sb = buffer_at(20.0);
        // E [word gap] E
        let out = decode(
            &mut sb,
            &[(true, 60.0), (false, 420.0), (true, 60.0), (false, 420.0)],
        );
        assert_eq!(out, "E E");
    }

    #[test]
    fn glitch_gap_stitches_mark() {
        let mut sb = buffer_at(20.0);
        // A 180 ms dah split by a 10 ms dropout: 100 + 10 + 70.
        sb.feed(mark(100.0));
        sb.feed(space(10.0));
        sb.feed(mark(70.0));
        // The pieces must have merged into one pending 180 ms mark.
        assert_eq!(sb.pulse_buffer.len(), 0);
        assert!((sb.pending_mark_ms - 180.0).abs() < 1e-9);
        sb.flush();
        // One pulse of ~3 units: a dah, decoded as T, not EE or I.
        assert_eq!(sb.best_sentence(), "T");
    }

    #[test]
    fn glitch_mark_rejoins_silence() {
        let mut sb = buffer_at(20.0);
        // Dit, normal gap, then a 10 ms spike, then more silence long
        // enough that the rejoined gap ends the character.
        sb.feed(mark(60.0));
        sb.feed(space(100.0));
        sb.feed(mark(10.0)); // spike, stays pending
        sb.feed(space(100.0));
        sb.feed(mark(60.0)); // settles the spike
        // The spike died; silence across it is 100+10+100 = 210 ms,
        // beyond the 150 ms char threshold, so "E" was decoded.
        assert_eq!(sb.best_sentence(), "E");
        // And the new dit is staged, with the buffer holding no leftover
        // gap from the aborted pattern.
        assert!((sb.pending_mark_ms - 60.0).abs() < 1e-9);
        assert!(sb.pulse_buffer.is_empty());
    }

    #[test]
    fn broken_dash_decodes_as_t_not_i() {
        // The canonical broken-dash case: 180 ms mark arriving as
        // 100 ms + 10 ms gap + 70 ms.
        let mut sb = buffer_at(20.0);
        let out = decode(
            &mut sb,
            &[
                (true, 100.0),
                (false, 10.0),
                (true, 70.0),
                (false, 420.0),
                (true, 60.0),
            ],
        );
        assert!(out.starts_with('T'), "got {:?}", out);
        assert!(!out.starts_with('I'), "got {:?}", out);
    }

    #[test]
    fn wpm_adapts_toward_sender() {
        let mut sb = buffer_at(20.0); // 60 ms unit
        // Sender is actually at 24 WPM (50 ms dits).
        for _ in 0..30 {
            sb.feed(mark(50.0));
            sb.feed(space(50.0));
            sb.feed(mark(150.0));
            sb.feed(space(200.0));
        }
        assert!(
            sb.unit_time_ms() < 56.0,
            "unit {} did not adapt",
            sb.unit_time_ms()
        );
        assert!(sb.unit_time_ms() > 45.0);
    }

    #[test]
    fn outlier_does_not_move_wpm() {
        let mut sb = buffer_at(20.0);
        let before = sb.unit_time_ms();
        // A 500 ms "mark" is outside 0.5–1.5× of any plausible unit.
        sb.feed(mark(500.0));
        sb.feed(space(420.0));
        sb.feed(mark(60.0));
        assert!((sb.unit_time_ms() - before).abs() < 1.0);
    }

    #[test]
    fn fallback_alpha_is_raw_update_alpha() {
        // With the analyzer window not yet full, a dit inside the
        // adaptation window moves the unit by exactly the configured α.
        let mut sb = buffer_at(20.0);
        let before = sb.unit_time_ms(); // 60
        sb.feed(mark(50.0));
        sb.feed(space(420.0));
        sb.feed(mark(60.0)); // settles the 50 ms dit
        let expected = 0.25 * 50.0 + 0.75 * before;
        assert!(
            (sb.unit_time_ms() - expected).abs() < 1e-9,
            "unit {} expected {}",
            sb.unit_time_ms(),
            expected
        );
    }

    #[test]
    fn degenerate_unit_time_resets() {
        let mut sb = buffer_at(20.0);
        sb.unit_time_ms = 10.5;
        // 27 ms marks classify as dahs against the 2.2× fallback split
        // (23.1 ms), so each one feeds a 9 ms sample unit — inside the
        // adaptation window, dragging the unit under the 10 ms floor.
        for _ in 0..6 {
            sb.feed(mark(27.0));
            sb.feed(space(420.0));
        }
        assert_eq!(sb.unit_time_ms(), UNIT_TIME_RESET_MS);
    }

    #[test]
    fn flush_commits_pending_mark() {
        let mut sb = buffer_at(20.0);
        sb.feed(mark(180.0)); // dah staged, never settled
        let out = sb.flush().unwrap().to_string();
        assert_eq!(out, "T");
    }

    #[test]
    fn gap_events_return_none() {
        let mut sb = buffer_at(20.0);
        assert!(sb.feed(space(100.0)).is_none());
        assert!(sb.feed(mark(60.0)).is_some());
    }
}
