//! Timestamp patterns for log ingestion and extraction.
//!
//! A `TimestampPattern` describes where a timestamp sits in a raw log line
//! (how many spaces precede it) and how it is formatted. Ingestion uses a
//! `TimestampPatternSet` to recognize and strip the timestamp from each
//! line; extraction re-inserts a formatted timestamp at the same position.
//!
//! The pattern set is an explicit value passed into writer and reader
//! constructors. There is no process-global registry.
//!
//! # Format syntax
//!
//! A small strftime-like subset, enough for the formats the archive
//! recognizes out of the box:
//!
//! | Token | Meaning               | Width |
//! |-------|-----------------------|-------|
//! | `%Y`  | year                  | 4     |
//! | `%m`  | month                 | 2     |
//! | `%d`  | day                   | 2     |
//! | `%H`  | hour (24h)            | 2     |
//! | `%M`  | minute                | 2     |
//! | `%S`  | second                | 2     |
//! | `%3`  | milliseconds          | 3     |
//! | `%%`  | literal `%`           | 1     |
//!
//! Any other character in the format matches itself.

use std::fmt;
use std::ops::Range;

use chrono::{DateTime, NaiveDate, Timelike};

use crate::types::Epoch;

/// A timestamp pattern: position (spaces before the timestamp) plus a
/// format string in the syntax above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampPattern {
    num_spaces_before_ts: u32,
    format: String,
}

impl TimestampPattern {
    pub fn new(num_spaces_before_ts: u32, format: impl Into<String>) -> Self {
        TimestampPattern {
            num_spaces_before_ts,
            format: format.into(),
        }
    }

    pub fn num_spaces_before_ts(&self) -> u32 {
        self.num_spaces_before_ts
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Tries to parse this pattern's timestamp out of `line`.
    ///
    /// On success returns the epoch value and the byte range the timestamp
    /// occupies in `line`.
    pub fn parse_timestamp(&self, line: &str) -> Option<(Epoch, Range<usize>)> {
        let begin = self.timestamp_begin_pos(line)?;
        let bytes = line.as_bytes();

        let mut year: i32 = 1970;
        let mut month: u32 = 1;
        let mut day: u32 = 1;
        let mut hour: u32 = 0;
        let mut minute: u32 = 0;
        let mut second: u32 = 0;
        let mut millis: u32 = 0;

        let mut pos = begin;
        let mut fmt_chars = self.format.chars().peekable();
        while let Some(c) = fmt_chars.next() {
            if c != '%' {
                if bytes.get(pos).copied() != Some(c as u8) {
                    return None;
                }
                pos += c.len_utf8();
                continue;
            }
            let spec = fmt_chars.next()?;
            match spec {
                '%' => {
                    if bytes.get(pos).copied() != Some(b'%') {
                        return None;
                    }
                    pos += 1;
                }
                'Y' => year = read_digits(bytes, &mut pos, 4)? as i32,
                'm' => month = read_digits(bytes, &mut pos, 2)?,
                'd' => day = read_digits(bytes, &mut pos, 2)?,
                'H' => hour = read_digits(bytes, &mut pos, 2)?,
                'M' => minute = read_digits(bytes, &mut pos, 2)?,
                'S' => second = read_digits(bytes, &mut pos, 2)?,
                '3' => millis = read_digits(bytes, &mut pos, 3)?,
                _ => return None,
            }
        }

        let ts = NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_milli_opt(hour, minute, second, millis)?
            .and_utc()
            .timestamp_millis();
        Some((ts, begin..pos))
    }

    /// Parses the timestamp and returns it together with the line with the
    /// timestamp span removed.
    pub fn parse_and_strip(&self, line: &str) -> Option<(Epoch, String)> {
        let (ts, span) = self.parse_timestamp(line)?;
        let mut stripped = String::with_capacity(line.len() - (span.end - span.start));
        stripped.push_str(&line[..span.start]);
        stripped.push_str(&line[span.end..]);
        Some((ts, stripped))
    }

    /// Formats `ts` with this pattern and inserts it into `stripped` at
    /// the position the timestamp was removed from. Inverse of
    /// `parse_and_strip` up to timestamp re-formatting.
    pub fn insert_formatted(&self, ts: Epoch, stripped: &str) -> String {
        let begin = self
            .timestamp_begin_pos(stripped)
            .unwrap_or(stripped.len().min(self.num_spaces_before_ts as usize));
        let mut out = String::with_capacity(stripped.len() + self.format.len() + 8);
        out.push_str(&stripped[..begin]);
        self.render_timestamp(ts, &mut out);
        out.push_str(&stripped[begin..]);
        out
    }

    /// Renders `ts` in this pattern's format, appending to `out`.
    pub fn render_timestamp(&self, ts: Epoch, out: &mut String) {
        use fmt::Write;

        let dt = DateTime::from_timestamp_millis(ts)
            .unwrap_or_else(|| DateTime::from_timestamp_millis(0).unwrap())
            .naive_utc();

        let mut fmt_chars = self.format.chars().peekable();
        while let Some(c) = fmt_chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match fmt_chars.next() {
                Some('%') => out.push('%'),
                Some('Y') => {
                    let _ = write!(out, "{:04}", chrono::Datelike::year(&dt.date()));
                }
                Some('m') => {
                    let _ = write!(out, "{:02}", chrono::Datelike::month(&dt.date()));
                }
                Some('d') => {
                    let _ = write!(out, "{:02}", chrono::Datelike::day(&dt.date()));
                }
                Some('H') => {
                    let _ = write!(out, "{:02}", dt.time().hour());
                }
                Some('M') => {
                    let _ = write!(out, "{:02}", dt.time().minute());
                }
                Some('S') => {
                    let _ = write!(out, "{:02}", dt.time().second());
                }
                Some('3') => {
                    let _ = write!(out, "{:03}", dt.and_utc().timestamp_subsec_millis());
                }
                Some(other) => {
                    out.push('%');
                    out.push(other);
                }
                None => out.push('%'),
            }
        }
    }

    /// Position where the timestamp begins: directly after the
    /// `num_spaces_before_ts`-th space character.
    fn timestamp_begin_pos(&self, line: &str) -> Option<usize> {
        if self.num_spaces_before_ts == 0 {
            return Some(0);
        }
        let mut seen = 0u32;
        for (i, b) in line.bytes().enumerate() {
            if b == b' ' {
                seen += 1;
                if seen == self.num_spaces_before_ts {
                    return Some(i + 1);
                }
            }
        }
        None
    }
}

impl fmt::Display for TimestampPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.num_spaces_before_ts, self.format)
    }
}

fn read_digits(bytes: &[u8], pos: &mut usize, width: usize) -> Option<u32> {
    if *pos + width > bytes.len() {
        return None;
    }
    let mut value: u32 = 0;
    for &b in &bytes[*pos..*pos + width] {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (b - b'0') as u32;
    }
    *pos += width;
    Some(value)
}

/// An ordered collection of timestamp patterns tried against each line.
///
/// Passed by value into the archive writer and reader. The default set
/// covers the formats the archive recognizes without configuration.
#[derive(Debug, Clone)]
pub struct TimestampPatternSet {
    patterns: Vec<TimestampPattern>,
}

impl TimestampPatternSet {
    pub fn new(patterns: Vec<TimestampPattern>) -> Self {
        TimestampPatternSet { patterns }
    }

    /// The built-in pattern set.
    pub fn known_patterns() -> Self {
        TimestampPatternSet {
            patterns: vec![
                TimestampPattern::new(0, "%Y-%m-%d %H:%M:%S,%3"),
                TimestampPattern::new(0, "%Y-%m-%d %H:%M:%S.%3"),
                TimestampPattern::new(0, "%Y-%m-%dT%H:%M:%S.%3"),
                TimestampPattern::new(0, "%Y-%m-%dT%H:%M:%S,%3"),
                TimestampPattern::new(0, "[%Y-%m-%d %H:%M:%S,%3]"),
                TimestampPattern::new(0, "[%Y-%m-%d %H:%M:%S]"),
                TimestampPattern::new(0, "%Y-%m-%d %H:%M:%S"),
                TimestampPattern::new(0, "%Y-%m-%dT%H:%M:%S"),
                TimestampPattern::new(0, "%Y/%m/%d %H:%M:%S"),
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[TimestampPattern] {
        &self.patterns
    }

    /// Tries each pattern in order; returns the first match along with the
    /// parsed epoch and the stripped line.
    pub fn search(&self, line: &str) -> Option<(&TimestampPattern, Epoch, String)> {
        for pattern in &self.patterns {
            if let Some((ts, stripped)) = pattern.parse_and_strip(line) {
                return Some((pattern, ts, stripped));
            }
        }
        None
    }
}

impl Default for TimestampPatternSet {
    fn default() -> Self {
        Self::known_patterns()
    }
}
