//! Overlapping, boundary-aware text windows.
//!
//! Sizes are counted in characters, not bytes. Each chunk is an exact slice
//! of the input and consecutive chunks either overlap or touch, so the input
//! can always be rebuilt from its chunks.
use std::ops::Range;

/// Break candidates, strongest first. Each group is one preference level.
const BREAKS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? ", "。"], &[" "]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl TextSplitter {
    /// `chunk_size` is clamped to at least 1 and `overlap` to below it.
    #[must_use]
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into owned chunks.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|r| text[r].to_string())
            .collect()
    }

    /// Byte ranges of each chunk within `text`.
    #[must_use]
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, including the end
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        if total <= self.chunk_size {
            return vec![0..text.len()];
        }

        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            let limit = (start + self.chunk_size).min(total);
            let end = if limit == total {
                total
            } else {
                self.find_break(text, &bounds, start, limit)
            };

            spans.push(bounds[start]..bounds[end]);
            if end == total {
                break;
            }

            let mut next = end.saturating_sub(self.overlap).max(start + 1);
            if let Some(word_start) = next_word_start(text, &bounds, next, end) {
                next = word_start;
            }
            start = next;
        }

        spans
    }

    /// Char index to end a window that starts at `start` and may reach `limit`.
    fn find_break(&self, text: &str, bounds: &[usize], start: usize, limit: usize) -> usize {
        let half = start + (limit - start) / 2;
        let window = &text[bounds[half]..bounds[limit]];

        for group in BREAKS {
            let best = group
                .iter()
                .filter_map(|sep| window.rfind(sep).map(|pos| pos + sep.len()))
                .max();

            if let Some(rel) = best {
                let byte = bounds[half] + rel;
                if let Ok(idx) = bounds.binary_search(&byte) {
                    if idx > start {
                        return idx;
                    }
                }
            }
        }

        limit
    }
}

/// First char index in `from..until` that begins a word, when `from` falls
/// inside one.
fn next_word_start(text: &str, bounds: &[usize], from: usize, until: usize) -> Option<usize> {
    let char_at = |i: usize| text[bounds[i]..].chars().next();

    let prev_is_space = from == 0 || char_at(from - 1).is_some_and(char::is_whitespace);
    if prev_is_space {
        return None;
    }

    (from..until).find(|&i| i > 0 && char_at(i - 1).is_some_and(char::is_whitespace))
}
