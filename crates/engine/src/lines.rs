use crate::error::{EngineError, Result};

/// Half-open `[start, end)` range of offsets covering one line, newline included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A 1-based line/column pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Maps character offsets to line/column positions.
///
/// Built by a single left-to-right scan splitting on `\n`. Every `\n` closes a
/// range, and a final (possibly empty) range always follows, so a text of N
/// newline-terminated lines plus a trailing fragment has N+1 lines.
///
/// Lookups are tolerant by contract: an offset at or past the end of the text
/// resolves to the last line, and a line number past the last line resolves
/// to the last line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    lines: Vec<LineRange>,
    len: usize,
}

impl LineIndex {
    /// Scan `text` once and record the range of every line
    #[must_use]
    pub fn build(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut lower = 0usize;
        let mut index = 0usize;

        for c in text.chars() {
            index += 1;
            if c != '\n' {
                continue;
            }
            lines.push(LineRange::new(lower, index));
            lower = index;
        }
        lines.push(LineRange::new(lower, index));

        log::trace!("line index built: {} lines over {} chars", lines.len(), index);
        Self { lines, len: index }
    }

    /// Number of lines, trailing fragment included
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Total number of characters the index was built over
    #[must_use]
    pub const fn text_len(&self) -> usize {
        self.len
    }

    /// All line ranges, in order
    #[must_use]
    pub fn ranges(&self) -> &[LineRange] {
        &self.lines
    }

    /// Resolve a character offset to a 1-based line and column
    #[must_use]
    pub fn offset_to_line_column(&self, offset: usize) -> Position {
        let last = self.lines.len() - 1;

        if offset >= self.len {
            let range = self.lines[last];
            return Position::new(last + 1, self.len - range.start + 1);
        }

        let line = self.binary_search(offset);
        let range = self.lines[line];
        Position::new(line + 1, offset - range.start + 1)
    }

    /// Range of a 1-based line; numbers past the last line clamp to it
    pub fn line_range(&self, line_number: usize) -> Result<LineRange> {
        if line_number == 0 {
            return Err(EngineError::InvalidLine(line_number));
        }
        let line = line_number.min(self.lines.len());
        Ok(self.lines[line - 1])
    }

    /// Index of the line containing `offset`; `offset` must be below the text length
    fn binary_search(&self, offset: usize) -> usize {
        self.lines
            .partition_point(|range| range.end <= offset)
            .min(self.lines.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn splits_on_newlines_with_trailing_fragment() {
        let index = LineIndex::build("ab\ncd");
        assert_eq!(index.line_count(), 2);
        assert_eq!(
            index.ranges(),
            &[LineRange::new(0, 3), LineRange::new(3, 5)]
        );
        assert_eq!(index.offset_to_line_column(4), Position::new(2, 2));
    }

    #[test]
    fn text_ending_on_newline_has_empty_last_line() {
        let index = LineIndex::build("ab\n");
        assert_eq!(index.line_count(), 2);
        assert!(index.ranges()[1].is_empty());
        assert_eq!(index.offset_to_line_column(3), Position::new(2, 1));
    }

    #[test]
    fn empty_text_has_one_empty_line() {
        let index = LineIndex::build("");
        assert_eq!(index.line_count(), 1);
        assert_eq!(index.offset_to_line_column(0), Position::new(1, 1));
    }

    #[test]
    fn offset_past_end_maps_to_last_line() {
        let index = LineIndex::build("one\ntwo");
        assert_eq!(index.offset_to_line_column(7), Position::new(2, 4));
        assert_eq!(index.offset_to_line_column(100), Position::new(2, 4));
    }

    #[test]
    fn newline_belongs_to_the_line_it_ends() {
        let index = LineIndex::build("a\nb\n");
        assert_eq!(index.offset_to_line_column(1), Position::new(1, 2));
        assert_eq!(index.offset_to_line_column(2), Position::new(2, 1));
    }

    #[test]
    fn line_range_clamps_and_rejects_zero() {
        let index = LineIndex::build("x\ny\nz");
        assert_eq!(index.line_range(2).unwrap(), LineRange::new(2, 4));
        assert_eq!(index.line_range(42).unwrap(), LineRange::new(4, 5));
        assert!(matches!(
            index.line_range(0),
            Err(EngineError::InvalidLine(0))
        ));
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let index = LineIndex::build("é\nü");
        assert_eq!(index.text_len(), 3);
        assert_eq!(index.offset_to_line_column(2), Position::new(2, 1));
    }

    proptest! {
        #[test]
        fn line_count_is_newlines_plus_one(text in "[a-c\n]{0,64}") {
            let index = LineIndex::build(&text);
            prop_assert_eq!(index.line_count(), text.matches('\n').count() + 1);
        }

        #[test]
        fn every_offset_lands_inside_its_line(text in "[a-c\n]{1,64}") {
            let index = LineIndex::build(&text);
            for offset in 0..index.text_len() {
                let pos = index.offset_to_line_column(offset);
                let range = index.line_range(pos.line).unwrap();
                prop_assert!(range.contains(offset));
                prop_assert_eq!(range.start + pos.column - 1, offset);
            }
        }

        #[test]
        fn ranges_tile_the_text(text in "[a-c\n]{0,64}") {
            let index = LineIndex::build(&text);
            let mut expected_start = 0;
            for range in index.ranges() {
                prop_assert_eq!(range.start, expected_start);
                expected_start = range.end;
            }
            prop_assert_eq!(expected_start, index.text_len());
        }
    }
}
