//! philocheck Environment Abstraction Layer
//!
//! This crate isolates everything that touches the operating system so the
//! scenario driver can run against either a **real subject process** (tokio)
//! or a **scripted replay** in tests.
//!
//! # Core Concept: Split Output and Control
//!
//! A launched subject is two halves:
//! - an output channel of [`OutputLine`]s, consumed by a reader task
//! - a [`SubjectControl`] handle, used to wait, poll and stop the process
//!
//! Stopping is always a request first and a kill second, see
//! [`SubjectControl::terminate`].
//!
//! # Example
//!
//! ```ignore
//! use philocheck_env::{SubjectLauncher, TokioLauncher};
//!
//! let launcher = TokioLauncher::new("./philo");
//! let mut subject = launcher.launch(&args).await?;
//! tokio::select! {
//!     exit = subject.control.wait() => handle_exit(exit),
//!     _ = tokio::time::sleep(deadline) => subject.control.terminate(grace).await?,
//! }
//! ```

mod error;
mod launcher;
mod tokio_impl;
mod types;

pub use error::EnvError;
pub use launcher::{SpawnedSubject, SubjectControl, SubjectLauncher};
pub use tokio_impl::TokioLauncher;
pub use types::{OutputLine, OutputStream, SubjectExit, Termination};
