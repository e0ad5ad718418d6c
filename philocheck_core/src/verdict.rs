//! Verdicts produced by checkers and by the scenario driver.

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Most offending events kept on a verdict.
pub const MAX_OFFENDERS: usize = 5;

/// Pass / soft-fail / hard-fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Pass,
    /// Suspicious but not provable without ground truth
    Warn,
    Fail,
}

impl Outcome {
    /// Short label for tables.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Warn => "WARN",
            Outcome::Fail => "FAIL",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One rule's judgment on one run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Rule that produced this verdict
    pub checker: String,

    /// Result
    pub outcome: Outcome,

    /// Human-readable explanation
    pub explanation: String,

    /// First offending events, if the rule failed on specific lines
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub offending: Vec<Event>,
}

impl Verdict {
    /// Passing verdict.
    pub fn pass(checker: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self::build(checker, Outcome::Pass, explanation, Vec::new())
    }

    /// Soft failure.
    pub fn warn(
        checker: impl Into<String>,
        explanation: impl Into<String>,
        offending: Vec<Event>,
    ) -> Self {
        Self::build(checker, Outcome::Warn, explanation, offending)
    }

    /// Hard failure.
    pub fn fail(
        checker: impl Into<String>,
        explanation: impl Into<String>,
        offending: Vec<Event>,
    ) -> Self {
        Self::build(checker, Outcome::Fail, explanation, offending)
    }

    fn build(
        checker: impl Into<String>,
        outcome: Outcome,
        explanation: impl Into<String>,
        mut offending: Vec<Event>,
    ) -> Self {
        offending.truncate(MAX_OFFENDERS);
        Self {
            checker: checker.into(),
            outcome,
            explanation: explanation.into(),
            offending,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == Outcome::Pass
    }

    pub fn is_warning(&self) -> bool {
        self.outcome == Outcome::Warn
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Fail
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.outcome, self.checker, self.explanation)?;
        for event in &self.offending {
            write!(f, "\n    at {}", event)?;
        }
        Ok(())
    }
}
