//! Event Parser
//! ============
//!
//! Turns one raw output line into an [`Event`] or a [`ParseFailure`].
//!
//! The grammar is deliberately strict: single-space separated columns,
//! ASCII-digit numbers, and an action phrase that must match one of the five
//! known phrases byte for byte. A failure is evidence for the format check,
//! never a reason to stop reading.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{Event, EventKind};

// =============================================================================
// FAILURES
// =============================================================================

/// Why a line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseFailureReason {
    /// Fewer than the three required columns
    WrongColumnCount { found: usize },
    /// Timestamp column is not a non-negative integer
    NonNumericTimestamp,
    /// Philosopher column is not a non-negative integer
    NonNumericId,
    /// Timestamp column is a negative integer
    NegativeTimestamp,
    /// Action phrase is not one of the known phrases
    UnrecognizedAction(String),
}

impl std::fmt::Display for ParseFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongColumnCount { found } => {
                write!(f, "expected at least 3 columns, found {}", found)
            }
            Self::NonNumericTimestamp => write!(f, "timestamp is not numeric"),
            Self::NonNumericId => write!(f, "philosopher id is not numeric"),
            Self::NegativeTimestamp => write!(f, "timestamp is negative"),
            Self::UnrecognizedAction(phrase) => write!(f, "unrecognized action {:?}", phrase),
        }
    }
}

/// A line that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("line {line_number}: {reason} in {line:?}")]
pub struct ParseFailure {
    /// 1-based position of the line in the stdout stream (0 if unknown)
    pub line_number: usize,
    /// Raw line without its terminator
    pub line: String,
    /// Failure class
    pub reason: ParseFailureReason,
}

impl ParseFailure {
    fn new(line: &str, reason: ParseFailureReason) -> Self {
        Self {
            line_number: 0,
            line: line.to_string(),
            reason,
        }
    }

    /// Attaches the stream position of the offending line.
    pub fn at_line(mut self, line_number: usize) -> Self {
        self.line_number = line_number;
        self
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Decodes a single line.
///
/// Only a trailing `\n` / `\r\n` is stripped; any other whitespace is part
/// of the line and will make it fail.
pub fn parse_line(line: &str) -> Result<Event, ParseFailure> {
    let line = strip_terminator(line);

    let mut columns = line.splitn(3, ' ');
    let (ts, id, action) = match (columns.next(), columns.next(), columns.next()) {
        (Some(ts), Some(id), Some(action)) => (ts, id, action),
        _ => {
            let found = if line.is_empty() { 0 } else { line.split(' ').count() };
            return Err(ParseFailure::new(
                line,
                ParseFailureReason::WrongColumnCount { found },
            ));
        }
    };

    let timestamp_ms = match parse_digits(ts) {
        Some(value) => value,
        None if ts.strip_prefix('-').and_then(parse_digits).is_some() => {
            return Err(ParseFailure::new(line, ParseFailureReason::NegativeTimestamp));
        }
        None => {
            return Err(ParseFailure::new(line, ParseFailureReason::NonNumericTimestamp));
        }
    };

    let philosopher = parse_digits(id)
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| ParseFailure::new(line, ParseFailureReason::NonNumericId))?;

    let kind = EventKind::from_phrase(action).ok_or_else(|| {
        ParseFailure::new(line, ParseFailureReason::UnrecognizedAction(action.to_string()))
    })?;

    Ok(Event::new(timestamp_ms, philosopher, kind))
}

/// Strips one trailing `\n` or `\r\n`.
pub fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Parses a column made only of ASCII digits. Signs are not accepted.
fn parse_digits(column: &str) -> Option<u64> {
    if column.is_empty() || !column.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    column.parse().ok()
}

// =============================================================================
// LINE PARSER
// =============================================================================

/// Outcome of feeding one stdout line to a [`LineParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Well-formed event
    Event(Event),
    /// Line matched a tolerated banner exactly
    Banner(String),
    /// Malformed line
    Failure(ParseFailure),
}

/// Stateless line decoder with an optional banner allow-list.
///
/// Some subjects print a closing message such as
/// `All philosophers have eaten enough`. Such lines are not events; listing
/// them here records them as banners instead of format failures.
#[derive(Debug, Clone, Default)]
pub struct LineParser {
    banners: Vec<String>,
}

impl LineParser {
    /// Creates a strict parser with no tolerated banners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerates an exact banner line.
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banners.push(banner.into());
        self
    }

    /// Tolerates several banner lines.
    pub fn with_banners<I, S>(mut self, banners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.banners.extend(banners.into_iter().map(Into::into));
        self
    }

    /// Decodes `line`, which was the `line_number`-th stdout line (1-based).
    pub fn parse(&self, line_number: usize, line: &str) -> ParsedLine {
        let bare = strip_terminator(line);
        if self.banners.iter().any(|banner| banner == bare) {
            return ParsedLine::Banner(bare.to_string());
        }
        match parse_line(bare) {
            Ok(event) => ParsedLine::Event(event),
            Err(failure) => ParsedLine::Failure(failure.at_line(line_number)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(line: &str) -> ParseFailureReason {
        parse_line(line).unwrap_err().reason
    }

    #[test]
    fn test_parses_every_phrase() {
        let event = parse_line("200 3 has taken a fork").unwrap();
        assert_eq!(event.timestamp_ms, 200);
        assert_eq!(event.philosopher.get(), 3);
        assert_eq!(event.kind, EventKind::ForkAcquired);

        assert_eq!(parse_line("0 1 is eating").unwrap().kind, EventKind::StartedEating);
        assert_eq!(parse_line("0 1 is sleeping").unwrap().kind, EventKind::StartedSleeping);
        assert_eq!(parse_line("0 1 is thinking").unwrap().kind, EventKind::StartedThinking);
        assert_eq!(parse_line("811 1 died").unwrap().kind, EventKind::Died);
    }

    #[test]
    fn test_strips_line_terminators_only() {
        assert!(parse_line("5 1 is eating\n").is_ok());
        assert!(parse_line("5 1 is eating\r\n").is_ok());
        assert!(matches!(
            reason("5 1 is eating "),
            ParseFailureReason::UnrecognizedAction(_)
        ));
        assert!(matches!(reason(" 5 1 is eating"), ParseFailureReason::NonNumericTimestamp));
    }

    #[test]
    fn test_column_count() {
        assert_eq!(reason(""), ParseFailureReason::WrongColumnCount { found: 0 });
        assert_eq!(reason("12 3"), ParseFailureReason::WrongColumnCount { found: 2 });
        assert_eq!(reason("died"), ParseFailureReason::WrongColumnCount { found: 1 });
    }

    #[test]
    fn test_numeric_columns() {
        assert_eq!(reason("abc 1 died"), ParseFailureReason::NonNumericTimestamp);
        assert_eq!(reason("+5 1 died"), ParseFailureReason::NonNumericTimestamp);
        assert_eq!(reason("-5 1 died"), ParseFailureReason::NegativeTimestamp);
        assert_eq!(reason("5 x died"), ParseFailureReason::NonNumericId);
        assert_eq!(reason("5 -1 died"), ParseFailureReason::NonNumericId);
        assert_eq!(reason("5 99999999999 died"), ParseFailureReason::NonNumericId);
    }

    #[test]
    fn test_action_matching_is_exact() {
        for line in ["5 1 is  eating", "5 1 Is eating", "5 1 eating", "5 1 has taken a fork!"] {
            assert!(matches!(reason(line), ParseFailureReason::UnrecognizedAction(_)), "{}", line);
        }
    }

    #[test]
    fn test_zero_id_is_decoded_for_range_check() {
        // Range is the format checker's business, not the parser's.
        assert_eq!(parse_line("5 0 is eating").unwrap().philosopher.get(), 0);
    }

    #[test]
    fn test_line_parser_banners() {
        let parser = LineParser::new().with_banner("All philosophers have eaten enough");

        assert_eq!(
            parser.parse(9, "All philosophers have eaten enough\n"),
            ParsedLine::Banner("All philosophers have eaten enough".to_string())
        );

        match parser.parse(10, "garbage") {
            ParsedLine::Failure(failure) => assert_eq!(failure.line_number, 10),
            other => panic!("expected failure, got {:?}", other),
        }

        let strict = LineParser::new();
        assert!(matches!(
            strict.parse(1, "All philosophers have eaten enough"),
            ParsedLine::Failure(_)
        ));
    }
}
