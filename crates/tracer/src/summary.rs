use crate::format::{expect_fields, parse_field, RowError};
use serde::{Deserialize, Serialize};

/// Totals recorded in the archive's `info.csv`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Wall clock at parse start, ms since the Unix epoch
    pub start_time_millis: u64,
    /// Events written to the trace table
    pub event_count: u64,
    pub matcher_count: usize,
    pub line_count: usize,
    /// Input length in UTF-16 code units
    pub char_count: usize,
    /// Input length in Unicode scalar values; the unit of every offset
    pub code_point_count: usize,
    /// Rule invocations
    pub node_count: u64,
}

impl RunSummary {
    /// `startTimeMillis;eventCount;matcherCount;lineCount;charCount;codePointCount;nodeCount`
    #[must_use]
    pub fn to_row(&self) -> String {
        format!(
            "{};{};{};{};{};{};{}\n",
            self.start_time_millis,
            self.event_count,
            self.matcher_count,
            self.line_count,
            self.char_count,
            self.code_point_count,
            self.node_count
        )
    }

    pub fn from_row(row: &str) -> Result<Self, RowError> {
        let fields = expect_fields(row, 7)?;
        Ok(Self {
            start_time_millis: parse_field(&fields, 0, "startTimeMillis")?,
            event_count: parse_field(&fields, 1, "eventCount")?,
            matcher_count: parse_field(&fields, 2, "matcherCount")?,
            line_count: parse_field(&fields, 3, "lineCount")?,
            char_count: parse_field(&fields, 4, "charCount")?,
            code_point_count: parse_field(&fields, 5, "codePointCount")?,
            node_count: parse_field(&fields, 6, "nodeCount")?,
        })
    }
}

/// Input length counters: (UTF-16 code units, Unicode scalar values)
#[must_use]
pub fn text_counts(text: &str) -> (usize, usize) {
    (text.encode_utf16().count(), text.chars().count())
}
