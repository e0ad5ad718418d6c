//! Common types for the subject-process abstraction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of subject output as read, terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
    /// Arrival time relative to the launch
    pub received_at: Duration,
}

impl OutputLine {
    pub fn is_stdout(&self) -> bool {
        self.stream == OutputStream::Stdout
    }
}

/// How the subject process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectExit {
    /// Exit code for a normal exit
    pub code: Option<i32>,

    /// Terminating signal (unix)
    pub signal: Option<i32>,
}

impl SubjectExit {
    /// A normal exit with the given code.
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Termination by a signal.
    pub fn with_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Exit code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for SubjectExit {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl std::fmt::Display for SubjectExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown exit"),
        }
    }
}

/// Result of a grace-then-kill stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub exit: SubjectExit,

    /// The subject ignored the polite request and was killed
    pub escalated: bool,

    /// The subject had already exited before the stop was requested
    pub already_exited: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_display() {
        assert_eq!(SubjectExit::with_code(0).to_string(), "exit code 0");
        assert_eq!(SubjectExit::with_signal(9).to_string(), "signal 9");
        assert!(SubjectExit::with_code(0).success());
        assert!(!SubjectExit::with_signal(15).success());
    }
}
