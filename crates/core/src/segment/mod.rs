//! Incremental sentence segmentation.
//!
//! Text arrives in arbitrary fragments. The segmenter buffers it and, once the
//! buffer holds `max_chars` characters, cuts at the last clause terminator in
//! that window (or hard-splits at `max_chars` when there is none). Whatever is
//! left when the upstream ends is flushed by [`SentenceSegmenter::finish`].

use crate::config::{ConfigError, StreamConfig, SynthesisOptions};

const LOG_TARGET: &str = "segment";

/// Sentence and clause punctuation treated as a cut point.
pub const DEFAULT_TERMINATORS: &[char] = &[
    '-', '.', '\u{2014}', '!', '?', ',', ';', ':', '\u{2026}', '\u{0964}', '|',
];

const EM_DASH: char = '\u{2014}';

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmenterConfig {
    /// Window size in characters (Unicode scalar values).
    pub max_chars: usize,
    pub terminators: Vec<char>,
}

impl SegmenterConfig {
    pub fn new(max_chars: usize) -> Result<Self, ConfigError> {
        if max_chars == 0 {
            return Err(ConfigError::ZeroUnitSize);
        }
        Ok(Self {
            max_chars,
            terminators: DEFAULT_TERMINATORS.to_vec(),
        })
    }

    pub fn for_options(options: &SynthesisOptions) -> Self {
        Self {
            max_chars: StreamConfig::unit_size_for(options),
            terminators: DEFAULT_TERMINATORS.to_vec(),
        }
    }

    pub fn with_terminators(mut self, terminators: impl Into<Vec<char>>) -> Self {
        self.terminators = terminators.into();
        self
    }
}

#[derive(Debug)]
pub struct SentenceSegmenter {
    config: SegmenterConfig,
    buffer: String,
}

impl SentenceSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.config.max_chars
    }

    /// Text held back waiting for more input.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Append a fragment and return every unit that became complete.
    pub fn feed(&mut self, fragment: &str) -> Vec<String> {
        if fragment.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(fragment);

        let mut units = Vec::new();
        let mut start = 0;
        while let Some(cut) = self.next_cut(&self.buffer[start..]) {
            if let Some(unit) = normalize(&self.buffer[start..start + cut]) {
                units.push(unit);
            }
            start += cut;
        }
        self.buffer.drain(..start);
        units
    }

    /// Flush the remainder regardless of size or boundary.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        normalize(&rest)
    }

    /// Byte offset into `window` to cut at, if it has reached the window size.
    fn next_cut(&self, window: &str) -> Option<usize> {
        let mut last_break = None;
        for (n, (idx, ch)) in window.char_indices().enumerate() {
            let end = idx + ch.len_utf8();
            // A terminator at the very start never produces a cut.
            if n > 0 && self.config.terminators.contains(&ch) {
                last_break = Some(end);
            }
            if n + 1 >= self.config.max_chars {
                if last_break.is_none() {
                    tracing::trace!(
                        target: LOG_TARGET,
                        max_chars = self.config.max_chars,
                        "no terminator in window, hard split"
                    );
                }
                return Some(last_break.unwrap_or(end));
            }
        }
        None
    }
}

/// Em-dash to space, trimmed, exactly one trailing space. Blank text yields `None`.
fn normalize(raw: &str) -> Option<String> {
    let replaced = raw.replace(EM_DASH, " ");
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut unit = String::with_capacity(trimmed.len() + 1);
    unit.push_str(trimmed);
    unit.push(' ');
    Some(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LARGE_MODEL;

    fn segment(max_chars: usize, fragments: &[&str]) -> Vec<String> {
        let mut seg = SentenceSegmenter::new(SegmenterConfig::new(max_chars).unwrap());
        let mut out = Vec::new();
        for f in fragments {
            out.extend(seg.feed(f));
        }
        out.extend(seg.finish());
        out
    }

    #[test]
    fn short_text_is_one_unit() {
        let units = segment(250, &["Hello world. ", "How are you? ", "Bye."]);
        assert_eq!(units, vec!["Hello world. How are you? Bye. "]);
    }

    #[test]
    fn small_window_splits_at_each_terminator() {
        let units = segment(15, &["Hello world. ", "How are you? ", "Bye."]);
        assert_eq!(units, vec!["Hello world. ", "How are you? ", "Bye. "]);
    }

    #[test]
    fn cuts_at_last_terminator_in_window() {
        let units = segment(12, &["a, b. cdefghijkl"]);
        assert_eq!(units[0], "a, b. ");
    }

    #[test]
    fn hard_split_without_terminator() {
        let units = segment(5, &["abcdefghijkl"]);
        assert_eq!(units, vec!["abcde ", "fghij ", "kl "]);
        for unit in &units[..2] {
            assert_eq!(unit.trim_end().chars().count(), 5);
        }
    }

    #[test]
    fn leading_terminator_is_not_a_cut_point() {
        let units = segment(4, &[".abcdef"]);
        assert_eq!(units, vec![".abc ", "def "]);
    }

    #[test]
    fn empty_fragments_are_noops() {
        let mut seg = SentenceSegmenter::new(SegmenterConfig::new(10).unwrap());
        assert!(seg.feed("").is_empty());
        assert_eq!(seg.pending(), "");
        assert_eq!(seg.finish(), None);
    }

    #[test]
    fn em_dash_replaced_and_whitespace_trimmed() {
        let units = segment(250, &["  well\u{2014}maybe  "]);
        assert_eq!(units, vec!["well maybe "]);
    }

    #[test]
    fn blank_remainder_is_dropped() {
        let units = segment(10, &["Hi you.", "   "]);
        assert_eq!(units, vec!["Hi you. "]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let units = segment(3, &["\u{00e9}\u{00e9}\u{00e9}\u{00e9}"]);
        assert_eq!(units, vec!["\u{00e9}\u{00e9}\u{00e9} ", "\u{00e9} "]);
    }

    #[test]
    fn units_respect_window_and_reconstruct_text() {
        let text = "The quick brown fox jumps over the lazy dog; it was not amused. \
                    Then again, who would be? Nobody knows \u{2014} perhaps the fox does!";
        let fragments: Vec<&str> = text.split_inclusive(' ').collect();
        let units = segment(20, &fragments);

        let last = units.len() - 1;
        for unit in &units[..last] {
            assert!(unit.trim_end().chars().count() <= 20, "unit too long: {unit:?}");
        }

        let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(squash(&units.concat()), squash(&text.replace('\u{2014}', " ")));
    }

    #[test]
    fn large_single_fragment_is_cut_in_one_pass() {
        let mut seg = SentenceSegmenter::new(SegmenterConfig::new(250).unwrap());
        let started = std::time::Instant::now();
        let units = seg.feed(&"Word. ".repeat(50_000));

        // 41 sentences of 6 chars fit in each 250-char window
        assert_eq!(units.len(), 1_219);
        assert!(units.iter().all(|u| *u == "Word. ".repeat(41)));
        assert_eq!(seg.pending().trim_start(), "Word. ".repeat(21));
        assert_eq!(seg.finish(), Some("Word. ".repeat(21)));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn custom_terminators() {
        let config = SegmenterConfig::new(8).unwrap().with_terminators(vec!['#']);
        let mut seg = SentenceSegmenter::new(config);
        let units = seg.feed("ab#cd. efgh");
        assert_eq!(units, vec!["ab# ", "cd. efgh "]);
    }

    #[test]
    fn window_follows_model() {
        let large = SynthesisOptions::default().with_model(LARGE_MODEL);
        assert_eq!(SegmenterConfig::for_options(&large).max_chars, 140);
        assert_eq!(
            SegmenterConfig::for_options(&SynthesisOptions::default()).max_chars,
            250
        );
        assert_eq!(SegmenterConfig::new(0), Err(ConfigError::ZeroUnitSize));
    }
}
