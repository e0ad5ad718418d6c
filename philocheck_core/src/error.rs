//! Error taxonomy for the verifier.

use thiserror::Error;

use crate::parser::ParseFailure;
use crate::timeline::OrderingViolation;

/// Every way a scenario can go wrong.
///
/// None of these abort a suite: the driver folds them into verdicts or
/// configuration-error entries on the scenario they belong to.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Bad scenario parameters or missing subject executable
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Malformed output line
    #[error(transparent)]
    ParseFailure(#[from] ParseFailure),

    /// Non-monotonic timestamps in the output stream
    #[error(transparent)]
    OrderingViolation(#[from] OrderingViolation),

    /// Subject exited abnormally or could not be supervised
    #[error("Process error: {0}")]
    ProcessError(String),

    /// Harness deadline elapsed
    #[error("Timeout after {0}ms")]
    TimeoutExceeded(u64),
}

impl VerifyError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Creates a process error.
    pub fn process(msg: impl Into<String>) -> Self {
        Self::ProcessError(msg.into())
    }

    /// Returns true for errors that mean the scenario never ran.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ConfigurationError(_))
    }
}
