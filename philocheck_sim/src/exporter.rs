//! JSON exporter for run visualization.
//!
//! Exports one scenario run (parameters, outcome, events, verdicts and
//! meal statistics) so a front end can replay the dinner offline.

use philocheck_core::{
    Event, Expectation, MealStatistics, Outcome, SimulationParams, TerminalState, Verdict,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::runner::ScenarioRun;

/// Complete export of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    /// Unique id of this export
    pub export_id: Uuid,

    /// Scenario name
    pub scenario: String,

    /// Argument vector passed to the subject
    pub subject_args: Vec<String>,

    /// Simulation parameters, absent for argument probes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<SimulationParams>,

    pub expectation: Expectation,

    /// How the run ended
    pub state: TerminalState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,

    /// Wall-clock duration
    pub elapsed_ms: u64,

    /// Accepted events in arrival order
    pub events: Vec<Event>,

    /// Malformed lines, rendered
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub malformed: Vec<String>,

    pub verdicts: Vec<Verdict>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<MealStatistics>,

    /// Final result
    pub outcome: Outcome,
}

impl RunExport {
    /// Builds the export from a finished run.
    pub fn from_run(run: &ScenarioRun) -> Self {
        Self {
            export_id: Uuid::new_v4(),
            scenario: run.spec.name.clone(),
            subject_args: run.spec.subject_args(),
            params: run.spec.params().copied(),
            expectation: run.spec.expectation,
            state: run.summary.state,
            exit_code: run.summary.exit_code,
            signal: run.summary.signal,
            elapsed_ms: run.summary.elapsed_ms,
            events: run.timeline.events().to_vec(),
            malformed: run
                .timeline
                .parse_failures()
                .iter()
                .map(|f| f.to_string())
                .collect(),
            verdicts: run.verdicts.clone(),
            statistics: run.statistics(),
            outcome: run.outcome(),
        }
    }

    /// File name used inside an export directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.scenario)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Writes into `dir` under [`RunExport::file_name`], creating the directory.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(self.file_name());
        self.write_to_file(&path)?;
        Ok(path)
    }
}
