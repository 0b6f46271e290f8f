use crate::error::Result;
use crate::lines::{LineIndex, LineRange, Position};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Immutable input text with random access by character offset.
///
/// Cloning is cheap; clones share the text and the lazily built line index,
/// so a background task can build the index while the parse runs.
#[derive(Clone)]
pub struct TextBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    text: Arc<str>,
    chars: Vec<char>,
    lines: OnceCell<LineIndex>,
}

impl TextBuffer {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let chars = text.chars().collect();
        Self {
            inner: Arc::new(BufferInner {
                text,
                chars,
                lines: OnceCell::new(),
            }),
        }
    }

    /// The full input text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.inner.text
    }

    /// Number of characters
    #[must_use]
    pub fn length(&self) -> usize {
        self.inner.chars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.chars.is_empty()
    }

    /// Character at `index`, or `None` at end of input
    #[must_use]
    pub fn char_at(&self, index: usize) -> Option<char> {
        self.inner.chars.get(index).copied()
    }

    /// Whether `expected` occurs verbatim starting at `index`
    #[must_use]
    pub fn test(&self, index: usize, expected: &[char]) -> bool {
        self.inner
            .chars
            .get(index..index.saturating_add(expected.len()))
            .is_some_and(|window| window == expected)
    }

    /// Text between two offsets, both clamped to the buffer
    #[must_use]
    pub fn extract(&self, start: usize, end: usize) -> String {
        let len = self.length();
        let end = end.min(len);
        let start = start.min(end);
        self.inner.chars[start..end].iter().collect()
    }

    /// Line index, built on first use
    pub fn line_index(&self) -> &LineIndex {
        self.inner
            .lines
            .get_or_init(|| LineIndex::build(&self.inner.text))
    }

    /// Whether the line index has been built already
    #[must_use]
    pub fn has_line_index(&self) -> bool {
        self.inner.lines.get().is_some()
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_index().line_count()
    }

    #[must_use]
    pub fn position(&self, offset: usize) -> Position {
        self.line_index().offset_to_line_column(offset)
    }

    pub fn line_range(&self, line_number: usize) -> Result<LineRange> {
        self.line_index().line_range(line_number)
    }

    /// Text of a 1-based line without its line terminator
    pub fn extract_line(&self, line_number: usize) -> Result<String> {
        let range = self.line_range(line_number)?;
        let mut end = range.end;
        if end > range.start && self.char_at(end - 1) == Some('\n') {
            end -= 1;
        }
        if end > range.start && self.char_at(end - 1) == Some('\r') {
            end -= 1;
        }
        Ok(self.extract(range.start, end))
    }
}

impl std::fmt::Debug for TextBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextBuffer")
            .field("length", &self.length())
            .field("line_index_built", &self.has_line_index())
            .finish()
    }
}

impl From<&str> for TextBuffer {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for TextBuffer {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
