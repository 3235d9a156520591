//! Incremental sentence-boundary detection over a streamed text source.

use crate::completeness::Language;

/// Terminal marks that promote buffered text to a complete sentence.
const TERMINAL_MARKS: [char; 3] = ['.', '!', '?'];

/// Splits a stream of text fragments into discrete sentences as they
/// complete.
///
/// Fragments are appended to an internal buffer; every time the buffer
/// contains one of `.`, `!` or `?`, everything up to and including that mark
/// is carved off and emitted. [`SentenceSegmenter::finish`] drains whatever
/// remains once the stream ends, punctuated or not. Concatenating every
/// emitted piece reproduces the input verbatim.
#[derive(Debug)]
pub struct SentenceSegmenter {
    pending: String,
    language: Language,
}

impl SentenceSegmenter {
    pub fn new(language: Language) -> Self {
        Self {
            pending: String::new(),
            language,
        }
    }

    /// The language tag carried alongside emitted sentences.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Appends one fragment and returns every sentence it completed, in
    /// order. Returns an empty vec while the buffer is still mid-sentence.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.pending.push_str(fragment);
        let mut sentences = Vec::new();
        while let Some(idx) = self.pending.find(TERMINAL_MARKS) {
            // The marks are ASCII, so idx + 1 is always a char boundary.
            let rest = self.pending.split_off(idx + 1);
            sentences.push(std::mem::replace(&mut self.pending, rest));
        }
        sentences
    }

    /// Flushes the residual buffer at stream end as a final sentence.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> SentenceSegmenter {
        SentenceSegmenter::new(Language::En)
    }

    #[test]
    fn carves_on_each_terminal_mark() {
        let mut seg = segmenter();
        assert!(seg.push("Hello there").is_empty());
        assert_eq!(seg.push(". How are").as_slice(), ["Hello there."]);
        assert_eq!(seg.push(" you? I").as_slice(), [" How are you?"]);
        assert_eq!(seg.finish().as_deref(), Some(" I"));
    }

    #[test]
    fn multiple_marks_in_one_fragment() {
        let mut seg = segmenter();
        let out = seg.push("Yes! No. Maybe? rest");
        assert_eq!(out.as_slice(), ["Yes!", " No.", " Maybe?"]);
        assert_eq!(seg.finish().as_deref(), Some(" rest"));
    }

    #[test]
    fn finish_is_empty_after_clean_boundary() {
        let mut seg = segmenter();
        seg.push("Done.");
        assert_eq!(seg.finish(), None);
        assert_eq!(seg.finish(), None);
    }

    #[test]
    fn segmentation_is_lossless_over_fragmented_streams() {
        let text = "One two three. Four! Is this five? Six...  seven\nand no closing mark";
        // Re-run with several fragmentation granularities, including splits
        // that land in the middle of multi-byte characters' neighbours.
        for width in [1usize, 2, 3, 5, 11] {
            let mut seg = segmenter();
            let mut rebuilt = String::new();
            let chars: Vec<char> = text.chars().collect();
            for chunk in chars.chunks(width) {
                let fragment: String = chunk.iter().collect();
                for sentence in seg.push(&fragment) {
                    rebuilt.push_str(&sentence);
                }
            }
            if let Some(rest) = seg.finish() {
                rebuilt.push_str(&rest);
            }
            assert_eq!(rebuilt, text, "width {width}");
        }
    }

    #[test]
    fn handles_non_ascii_text() {
        let mut seg = SentenceSegmenter::new(Language::Es);
        let out = seg.push("¿Qué tal? Bien. ");
        assert_eq!(out.as_slice(), ["¿Qué tal?", " Bien."]);
        assert_eq!(seg.finish().as_deref(), Some(" "));
    }
}
