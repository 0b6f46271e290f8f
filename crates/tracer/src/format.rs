//! Row codecs for the `;`-separated archive tables.
//!
//! Rows carry no header and end with `\n`. Text fields are escaped so that a
//! row always splits back into the same fields.

use crate::catalog::{MatcherDescriptor, MatcherId};
use crate::event::NodeRecord;
use std::str::FromStr;

pub const SEPARATOR: char = ';';

/// Escape a text field: `\` → `\\`, `;` → `\;`, newline → `\n`, CR → `\r`
#[must_use]
pub fn escape_field(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape_field`]. Unknown escapes keep the escaped character.
#[must_use]
pub fn unescape_field(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split a row on unescaped separators, unescaping each field
#[must_use]
pub fn split_row(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = row.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            SEPARATOR => fields.push(unescape_field(&std::mem::take(&mut current))),
            other => current.push(other),
        }
    }
    fields.push(unescape_field(&current));
    fields
}

/// Error decoding a single row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError(pub String);

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn expect_fields(row: &str, expected: usize) -> Result<Vec<String>, RowError> {
    let fields = split_row(row);
    if fields.len() == expected {
        Ok(fields)
    } else {
        Err(RowError(format!(
            "expected {expected} fields, found {} in {row:?}",
            fields.len()
        )))
    }
}

pub(crate) fn parse_field<T: FromStr>(fields: &[String], index: usize, name: &str) -> Result<T, RowError> {
    fields[index]
        .parse()
        .map_err(|_| RowError(format!("invalid {name}: {:?}", fields[index])))
}

impl NodeRecord {
    /// `parentId;id;level;success;matcherId;startOffset;endOffset;elapsedNanos`
    #[must_use]
    pub fn to_row(&self) -> String {
        format!(
            "{};{};{};{};{};{};{};{}\n",
            self.parent_id,
            self.id,
            self.level,
            u8::from(self.success),
            self.matcher_id,
            self.start_offset,
            self.end_offset,
            self.elapsed_nanos
        )
    }

    pub fn from_row(row: &str) -> Result<Self, RowError> {
        let fields = expect_fields(row, 8)?;
        let success = match fields[3].as_str() {
            "1" => true,
            "0" => false,
            other => return Err(RowError(format!("invalid success flag: {other:?}"))),
        };
        Ok(Self {
            parent_id: parse_field(&fields, 0, "parentId")?,
            id: parse_field(&fields, 1, "id")?,
            level: parse_field(&fields, 2, "level")?,
            success,
            matcher_id: MatcherId(parse_field(&fields, 4, "matcherId")?),
            start_offset: parse_field(&fields, 5, "startOffset")?,
            end_offset: parse_field(&fields, 6, "endOffset")?,
            elapsed_nanos: parse_field(&fields, 7, "elapsedNanos")?,
        })
    }
}

impl MatcherDescriptor {
    /// `id;className;category;label`
    #[must_use]
    pub fn to_row(&self) -> String {
        format!(
            "{};{};{};{}\n",
            self.id,
            escape_field(&self.class_name),
            self.category,
            escape_field(&self.label)
        )
    }

    pub fn from_row(row: &str) -> Result<Self, RowError> {
        let fields = expect_fields(row, 4)?;
        let category = fields[2].parse().map_err(RowError)?;
        Ok(Self {
            id: MatcherId(parse_field(&fields, 0, "id")?),
            class_name: fields[1].clone(),
            category,
            label: fields[3].clone(),
        })
    }
}
