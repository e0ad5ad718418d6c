//! philocheck Core - Black-box verification of dining-philosophers simulations
//!
//! This library judges a simulation purely from its output stream:
//! 1. **Parsing**: each `<ms> <id> <action>` line becomes a typed [`Event`]
//! 2. **Timeline**: events are kept in arrival order with their evidence
//!    (malformed lines, timestamps that went backwards)
//! 3. **Checkers**: format, fork exclusivity, death timing, meal limit,
//!    fairness and progress rules each produce a [`Verdict`]
//! 4. **Report**: verdicts of every scenario roll up into one [`Report`]
//!
//! Nothing here touches processes or clocks; see `philocheck_env` and
//! `philocheck_sim` for launching subjects and driving scenarios.

pub mod checkers;
pub mod error;
pub mod event;
pub mod parser;
pub mod report;
pub mod scenario;
pub mod stats;
pub mod timeline;
pub mod verdict;

// Re-export key types for convenience
pub use checkers::{run_checkers, CheckerKind};
pub use error::VerifyError;
pub use event::{Event, EventKind, PhilosopherId};
pub use parser::{
    parse_line, strip_terminator, LineParser, ParseFailure, ParseFailureReason, ParsedLine,
};
pub use report::{Report, RunSummary, ScenarioReport, TerminalState};
pub use scenario::{
    Expectation, MealPolicy, ScenarioSpec, SimulationParams, SubjectArgs,
    DEFAULT_DEATH_TOLERANCE_MS, DEFAULT_FAIRNESS_GAP_FACTOR, DEFAULT_FAIRNESS_WINDOW_FACTOR,
};
pub use stats::MealStatistics;
pub use timeline::{OrderingViolation, Timeline};
pub use verdict::{Outcome, Verdict};
