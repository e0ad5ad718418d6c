//! Report Aggregator
//! =================
//!
//! An owned accumulator created once per suite run and handed `&mut` to each
//! scenario driver invocation. Entries are never changed after recording.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkers::worst_outcome;
use crate::scenario::{Expectation, ScenarioSpec};
use crate::stats::MealStatistics;
use crate::verdict::{Outcome, Verdict};

/// How a scenario run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalState {
    /// Subject exited by itself, or was stopped after reporting a death
    Completed,
    /// Harness deadline elapsed with the subject still running
    TimedOut,
    /// Subject exited abnormally
    Crashed,
}

impl TerminalState {
    pub fn name(&self) -> &'static str {
        match self {
            TerminalState::Completed => "completed",
            TerminalState::TimedOut => "timed_out",
            TerminalState::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Facts about the subject process gathered by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub state: TerminalState,

    /// Exit code, if the subject exited normally
    pub exit_code: Option<i32>,

    /// Terminating signal, if any
    pub signal: Option<i32>,

    /// A death line was seen while the run was live
    pub death_observed: bool,

    /// The harness had to stop the subject
    pub forced_stop: bool,

    /// Wall-clock duration of the run
    pub elapsed_ms: u64,

    /// Accepted events
    pub event_count: usize,

    /// Non-event output (stderr and tolerated banners), capped
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub diagnostics: Vec<String>,
}

/// Everything recorded for one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub subject_args: Vec<String>,
    pub expectation: Expectation,

    /// Present unless the scenario was rejected before launch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunSummary>,

    /// Why the scenario never ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_error: Option<String>,

    pub verdicts: Vec<Verdict>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<MealStatistics>,
}

impl ScenarioReport {
    /// Report for a scenario that ran.
    pub fn completed(spec: &ScenarioSpec, run: RunSummary, verdicts: Vec<Verdict>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario: spec.name.clone(),
            subject_args: spec.subject_args(),
            expectation: spec.expectation,
            run: Some(run),
            configuration_error: None,
            verdicts,
            statistics: None,
        }
    }

    /// Report for a scenario rejected before launch.
    pub fn misconfigured(spec: &ScenarioSpec, error: impl std::fmt::Display) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario: spec.name.clone(),
            subject_args: spec.subject_args(),
            expectation: spec.expectation,
            run: None,
            configuration_error: Some(error.to_string()),
            verdicts: Vec::new(),
            statistics: None,
        }
    }

    /// Report for a scenario whose subject could not be supervised to the end.
    pub fn aborted(spec: &ScenarioSpec, error: impl std::fmt::Display) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario: spec.name.clone(),
            subject_args: spec.subject_args(),
            expectation: spec.expectation,
            run: None,
            configuration_error: None,
            verdicts: vec![Verdict::fail("supervision", error.to_string(), Vec::new())],
            statistics: None,
        }
    }

    /// Attaches meal statistics.
    pub fn with_statistics(mut self, statistics: MealStatistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Worst outcome; a configuration error counts as a failure.
    pub fn outcome(&self) -> Outcome {
        if self.configuration_error.is_some() {
            return Outcome::Fail;
        }
        worst_outcome(&self.verdicts)
    }

    pub fn passed(&self) -> bool {
        self.outcome() != Outcome::Fail
    }

    /// Verdicts that did not pass.
    pub fn findings(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.is_pass())
    }
}

/// Suite-level accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub suite_id: Uuid,
    pub subject: String,
    entries: Vec<ScenarioReport>,
}

impl Report {
    /// Creates an empty report for the given subject path.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            suite_id: Uuid::new_v4(),
            subject: subject.into(),
            entries: Vec::new(),
        }
    }

    /// Records one scenario.
    pub fn record(&mut self, entry: ScenarioReport) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ScenarioReport] {
        &self.entries
    }

    /// Looks up a scenario by name.
    pub fn entry(&self, scenario: &str) -> Option<&ScenarioReport> {
        self.entries.iter().find(|e| e.scenario == scenario)
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| !e.passed()).count()
    }

    pub fn warnings(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome() == Outcome::Warn)
            .count()
    }

    /// True when no scenario failed. Warnings do not fail the suite.
    pub fn passed(&self) -> bool {
        self.failed() == 0
    }

    /// Human-readable pass/fail table with the findings of each scenario.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<24} {:<17} {:<10} {:<6} {}\n",
            "SCENARIO", "EXPECT", "STATE", "RESULT", "ARGS"
        ));
        out.push_str(&format!("{}\n", "-".repeat(78)));

        for entry in &self.entries {
            let state = entry
                .run
                .as_ref()
                .map(|r| r.state.name())
                .unwrap_or("not_run");
            out.push_str(&format!(
                "{:<24} {:<17} {:<10} {:<6} {}\n",
                entry.scenario,
                entry.expectation.name(),
                state,
                entry.outcome().label(),
                entry.subject_args.join(" ")
            ));
            if let Some(error) = &entry.configuration_error {
                out.push_str(&format!("    {}\n", error));
            }
            for verdict in entry.findings() {
                for line in verdict.to_string().lines() {
                    out.push_str(&format!("    {}\n", line));
                }
            }
        }

        out.push_str(&format!("{}\n", "-".repeat(78)));
        out.push_str(&format!(
            "{}/{} scenario(s) passed, {} with warnings\n",
            self.total() - self.failed(),
            self.total(),
            self.warnings()
        ));
        out
    }
}
