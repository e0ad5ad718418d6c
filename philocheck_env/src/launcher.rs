//! Core launcher traits for subject processes.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::EnvError;
use crate::types::{OutputLine, SubjectExit, Termination};

/// Control half of a running subject.
///
/// Output is delivered separately through [`SpawnedSubject::lines`] so that
/// a reader task can consume it while the driver waits on the process.
#[async_trait]
pub trait SubjectControl: Send {
    /// Waits until the subject exits.
    async fn wait(&mut self) -> Result<SubjectExit, EnvError>;

    /// Returns the exit status if the subject already exited.
    fn try_wait(&mut self) -> Result<Option<SubjectExit>, EnvError>;

    /// Asks the subject to stop (SIGTERM on unix).
    fn request_stop(&mut self) -> Result<(), EnvError>;

    /// Stops the subject unconditionally and reaps it.
    async fn kill(&mut self) -> Result<(), EnvError>;

    /// OS process id, when there is one.
    fn pid(&self) -> Option<u32>;

    /// Stop request, then a forced kill if the subject is still alive after `grace`.
    async fn terminate(&mut self, grace: Duration) -> Result<Termination, EnvError> {
        if let Some(exit) = self.try_wait()? {
            return Ok(Termination {
                exit,
                escalated: false,
                already_exited: true,
            });
        }

        debug!("Requesting stop of subject pid={:?}", self.pid());
        self.request_stop()?;

        let waited = tokio::time::timeout(grace, self.wait()).await;
        match waited {
            Ok(exit) => Ok(Termination {
                exit: exit?,
                escalated: false,
                already_exited: false,
            }),
            Err(_) => {
                warn!(
                    "Subject pid={:?} still running {}ms after stop request, killing",
                    self.pid(),
                    grace.as_millis()
                );
                self.kill().await?;
                let exit = self.wait().await?;
                Ok(Termination {
                    exit,
                    escalated: true,
                    already_exited: false,
                })
            }
        }
    }
}

/// A launched subject: its output stream and its control handle.
pub struct SpawnedSubject {
    /// Output lines in arrival order; closes once both pipes are closed
    pub lines: mpsc::Receiver<OutputLine>,

    /// Process control
    pub control: Box<dyn SubjectControl>,
}

/// Starts subject processes.
///
/// # Implementations
///
/// - **Production**: `TokioLauncher` - spawns the real executable
/// - **Testing**: a scripted launcher that replays prepared output
#[async_trait]
pub trait SubjectLauncher: Send + Sync {
    /// Launches the subject with the given argument vector.
    async fn launch(&self, args: &[String]) -> Result<SpawnedSubject, EnvError>;

    /// Fails fast if the subject cannot be launched at all.
    fn preflight(&self) -> Result<(), EnvError> {
        Ok(())
    }

    /// Short description for logs and reports.
    fn describe(&self) -> String;
}
