//! philocheck Scenario Harness
//!
//! Runs a dining-philosophers subject through a catalog of scenarios and
//! judges each run purely from its output.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ScenarioRunner                         │
//! │                                                              │
//! │   ScenarioSpec ──► launch ──► subject ──stdout/stderr──┐     │
//! │        │                        ▲                      ▼     │
//! │        │            terminate / kill          reader task    │
//! │        │                        │            (owns Timeline) │
//! │        │           select! { exit, deadline, first death }   │
//! │        ▼                                               │     │
//! │   checkers ◄──────────── Timeline handed back ◄────────┘     │
//! │        │                                                     │
//! │        ▼                                                     │
//! │     Report                                                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`ScheduleOracle`] writes logs a correct subject could produce, and
//! the [`ScriptedLauncher`] replays them, so the whole pipeline can be
//! exercised without an external binary.
//!
//! # Usage
//!
//! ```ignore
//! use philocheck_sim::{ScenarioRunner, ScenarioId, SuiteConfig};
//! use philocheck_env::TokioLauncher;
//!
//! let runner = ScenarioRunner::new(Arc::new(TokioLauncher::new("./philo")));
//! let spec = ScenarioId::Survival.spec(&SuiteConfig::default());
//! let mut report = Report::new("./philo");
//! runner.run(&spec, &mut report).await;
//! ```

mod context;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;

pub use context::{ScriptedExit, ScriptedLauncher};
pub use exporter::RunExport;
pub use oracle::{Fault, Schedule, ScheduleOracle};
pub use runner::{record, ScenarioPhase, ScenarioRun, ScenarioRunner, TERMINATION_CHECK};
pub use scenarios::{ScenarioId, SuiteConfig, MEALS_DONE_BANNER};
