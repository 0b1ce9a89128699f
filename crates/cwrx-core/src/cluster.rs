//! Clustering decoder backend
//!
//! A simpler alternative to the beam decoder: classify each mark as dot
//! or dash by comparing against 2-means centroids over recent
//! durations, accumulate a dot/dash string, and look the string up in
//! the code table at each character gap. No language model — what you
//! key is what you get, including prosigns.
//!
//! Durations feed two independent windows (marks and spaces) and the
//! centroids adapt as the sender's speed drifts. Guard rails keep the
//! clusters physically plausible: the dot length stays within a
//! 5–50 WPM envelope and a collapsed dash centroid is re-spread to
//! three dots.

use crate::config::ClusterConfig;
use crate::morse;
use crate::stats::{DurationClusters, WindowBuffer};
use crate::types::{SignalState, StateTransition};

/// Duration-clustering Morse decoder.
#[derive(Debug)]
pub struct ClusterDecoder {
    cfg: ClusterConfig,

    mark_buffer: WindowBuffer,
    space_buffer: WindowBuffer,

    // Cached cluster lengths, in seconds.
    dot_len: f64,
    dash_len: f64,
    elem_gap_len: f64,
    char_gap_len: f64,

    symbol_buffer: String,
    transcript: String,
    /// Set once a word gap has been emitted for the current silence.
    word_gap_emitted: bool,
}

impl ClusterDecoder {
    pub fn new(cfg: ClusterConfig) -> Self {
        Self {
            mark_buffer: WindowBuffer::new(cfg.mark_window),
            space_buffer: WindowBuffer::new(cfg.space_window),
            cfg,
            // 20 WPM seed.
            dot_len: 0.06,
            dash_len: 0.18,
            elem_gap_len: 0.06,
            char_gap_len: 0.18,
            symbol_buffer: String::new(),
            transcript: String::new(),
            word_gap_emitted: false,
        }
    }

    /// Everything decoded so far.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Current dot length estimate in seconds.
    pub fn dot_len(&self) -> f64 {
        self.dot_len
    }

    /// Consume one debounced transition. Returns the transcript when it
    /// changed.
    pub fn feed(&mut self, transition: StateTransition) -> Option<&str> {
        let duration_secs = transition.duration_ms / 1000.0;
        let before = self.transcript.len();
        match transition.finished {
            SignalState::Mark => self.on_mark_end(duration_secs),
            SignalState::Space => self.on_space_end(duration_secs),
        }
        if transition.finished == SignalState::Space {
            self.word_gap_emitted = false;
        }
        if self.transcript.len() != before {
            Some(&self.transcript)
        } else {
            None
        }
    }

    /// Notify the decoder of ongoing silence (no committed transition).
    /// Once the silence stretches past the word gap, a still-undecoded
    /// character is spilled and followed by a word break. With nothing
    /// pending the silence means nothing more: the last character was
    /// already flushed by its own gap.
    pub fn idle(&mut self, silence_ms: f64) -> Option<&str> {
        let word_gap_threshold = (self.char_gap_len * self.cfg.word_gap_ratio).max(0.2);
        if silence_ms / 1000.0 <= word_gap_threshold || self.word_gap_emitted {
            return None;
        }
        if self.symbol_buffer.is_empty() {
            return None;
        }
        self.word_gap_emitted = true;
        let before = self.transcript.len();
        self.decode_symbol_buffer();
        if !self.transcript.is_empty() && !self.transcript.ends_with(' ') {
            self.transcript.push(' ');
        }
        if self.transcript.len() != before {
            Some(&self.transcript)
        } else {
            None
        }
    }

    /// Decode whatever is still buffered. Call at end of stream.
    pub fn flush(&mut self) -> Option<&str> {
        let before = self.transcript.len();
        self.decode_symbol_buffer();
        if self.transcript.len() != before {
            Some(&self.transcript)
        } else {
            None
        }
    }

    fn on_mark_end(&mut self, duration_secs: f64) {
        if duration_secs < self.cfg.mark_glitch_ms / 1000.0 {
            return;
        }

        self.mark_buffer.add(duration_secs);
        self.update_mark_clusters();

        let threshold = (self.dot_len + self.dash_len) / 2.0;
        self.symbol_buffer.push(if duration_secs < threshold { '.' } else { '-' });

        // Longest table entry is 8 elements; anything beyond is garbage.
        if self.symbol_buffer.len() > 7 {
            self.decode_symbol_buffer();
        }
    }

    fn on_space_end(&mut self, duration_secs: f64) {
        if duration_secs < self.cfg.space_glitch_ms / 1000.0 {
            return;
        }

        self.space_buffer.add(duration_secs);
        self.update_space_clusters();

        let char_threshold = ((self.elem_gap_len + self.char_gap_len) / 2.0)
            .max(self.cfg.char_gap_min_ms / 1000.0);

        if duration_secs > char_threshold {
            self.decode_symbol_buffer();
        }
    }

    fn decode_symbol_buffer(&mut self) {
        if self.symbol_buffer.is_empty() {
            return;
        }
        if let Some(ch) = morse::decode_char(&self.symbol_buffer) {
            self.transcript.push(ch);
        } else if let Some(prosign) = morse::decode_prosign(&self.symbol_buffer) {
            self.transcript.push_str(prosign);
        }
        self.symbol_buffer.clear();
    }

    fn update_mark_clusters(&mut self) {
        let Some(clusters) = DurationClusters::fit_from_extremes(self.mark_buffer.data())
        else {
            return;
        };

        self.dot_len = clusters.short.clamp(self.cfg.min_dot_len, self.cfg.max_dot_len);
        self.dash_len = clusters.long;
        if self.dash_len < self.dot_len * 2.0 {
            self.dash_len = self.dot_len * 3.0;
        }
    }

    fn update_space_clusters(&mut self) {
        let seed_short = if self.dot_len > 0.0 { self.dot_len } else { 0.06 };
        let seed_long = seed_short * 3.0;
        let Some(clusters) =
            DurationClusters::fit(self.space_buffer.data(), seed_short, seed_long)
        else {
            return;
        };
        self.elem_gap_len = clusters.short;
        self.char_gap_len = clusters.long;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> ClusterDecoder {
        ClusterDecoder::new(ClusterConfig::default())
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

    /// Key a text at 20 WPM through the decoder.
    fn key_text(d: &mut ClusterDecoder, text: &str) {
        let unit = 60.0;
        for (wi, word) in text.split(' ').enumerate() {
            if wi > 0 {
                // Word boundary, in live order: silence stretches first
                // (idle reports see the last character still pending),
                // then the gap commits when the next word's first mark
                // begins.
                d.idle(2_000.0);
                d.feed(space(unit * 7.0));
            }
            for (ci, ch) in word.chars().enumerate() {
                if ci > 0 {
                    d.feed(space(unit * 3.0));
                }
                let code = morse::code_for(ch).unwrap();
                for (ei, e) in code.chars().enumerate() {
                    if ei > 0 {
                        d.feed(space(unit));
                    }
                    d.feed(mark(if e == '-' { unit * 3.0 } else { unit }));
                }
            }
        }
        d.feed(space(unit * 10.0));
        d.flush();
    }

    #[test]
    fn decodes_clean_word() {
        let mut d = decoder();
        key_text(&mut d, "PARIS");
        assert_eq!(d.transcript(), "PARIS");
    }

    #[test]
    fn decodes_words_with_breaks() {
        let mut d = decoder();
        key_text(&mut d, "CQ DX");
        assert_eq!(d.transcript(), "CQ DX");
    }

    #[test]
    fn glitches_filtered() {
        let mut d = decoder();
        // A 5 ms spike and a 5 ms dropout change nothing.
        d.feed(mark(5.0));
        d.feed(space(5.0));
        assert_eq!(d.transcript(), "");
        assert!(d.symbol_buffer.is_empty());
    }

    #[test]
    fn unknown_code_dropped() {
        let mut d = decoder();
        // 8 dits in a row is no character; the buffer force-decodes at
        // >7 elements and finds nothing.
        for _ in 0..8 {
            d.feed(mark(60.0));
            d.feed(space(60.0));
        }
        d.feed(space(600.0));
        d.flush();
        assert_eq!(d.transcript(), "");
    }

    #[test]
    fn prosign_decoded() {
        let mut d = decoder();
        // <SK> = ...-.-
        for e in "...-.-".chars() {
            d.feed(mark(if e == '-' { 180.0 } else { 60.0 }));
            d.feed(space(60.0));
        }
        d.feed(space(600.0));
        d.flush();
        assert_eq!(d.transcript(), "<SK>");
    }

    #[test]
    fn clusters_adapt_to_speed() {
        let mut d = decoder();
        // 30 WPM sender: 40 ms dots, 120 ms dashes.
        for _ in 0..12 {
            d.feed(mark(40.0));
            d.feed(space(40.0));
            d.feed(mark(120.0));
            d.feed(space(120.0));
        }
        assert!((d.dot_len() - 0.04).abs() < 0.01, "dot {}", d.dot_len());
    }

    #[test]
    fn idle_spills_pending_character_once() {
        let mut d = decoder();
        // A lone dit with no closing gap: the character is still open
        // when the silence stretches past the word gap.
        d.feed(mark(60.0));
        assert_eq!(d.transcript(), "");
        assert_eq!(d.idle(2_000.0), Some("E "));
        // Second idle call for the same silence adds nothing.
        assert!(d.idle(2_500.0).is_none());
    }

    #[test]
    fn idle_after_flushed_character_adds_nothing() {
        let mut d = decoder();
        d.feed(mark(60.0));
        // A long gap event already decoded the dit; the trailing silence
        // has nothing left to spill, and no stray space appears.
        d.feed(space(600.0));
        assert_eq!(d.transcript(), "E");
        assert!(d.idle(2_000.0).is_none());
        assert_eq!(d.transcript(), "E");
    }
}
