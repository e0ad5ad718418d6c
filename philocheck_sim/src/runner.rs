//! Scenario runner - drives one subject process per scenario.
//!
//! Each scenario walks the state machine
//!
//! ```text
//! Built ──► Running ──► Draining ──► Completed
//!              │
//!              ├──────────────────► Completed | Crashed   (subject exited)
//!              └──────────────────► TimedOut              (deadline)
//! ```
//!
//! A reader task owns the [`Timeline`] while the subject runs. The driver
//! waits on the first of: subject exit, the harness deadline, or the
//! reader's first-death notification. Once a terminal state is reached the
//! reader drains what is left and hands the timeline back; only then do the
//! checkers run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use philocheck_core::checkers::worst_outcome;
use philocheck_core::{
    run_checkers, strip_terminator, Event, EventKind, Expectation, LineParser, MealStatistics,
    Outcome, ParsedLine, Report, RunSummary, ScenarioReport, ScenarioSpec, TerminalState,
    Timeline, Verdict, VerifyError,
};
use philocheck_env::{EnvError, OutputLine, OutputStream, SpawnedSubject, SubjectExit, SubjectLauncher};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// How long the reader may keep draining after the subject is gone.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Diagnostics kept per scenario.
const DEFAULT_MAX_DIAGNOSTICS: usize = 32;

/// Upper bound on lines taken from the channel once the reader is told to stop.
const MAX_DRAIN_LINES: usize = 65_536;

/// Name of the verdict comparing the terminal state with the expectation.
pub const TERMINATION_CHECK: &str = "termination";

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Driver phase of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioPhase {
    /// Validated, nothing launched yet
    Built,
    /// Subject running, reader consuming output
    Running,
    /// A death was reported; the subject is given time to exit
    Draining,
    Completed,
    TimedOut,
    Crashed,
}

impl ScenarioPhase {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioPhase::Built => "built",
            ScenarioPhase::Running => "running",
            ScenarioPhase::Draining => "draining",
            ScenarioPhase::Completed => "completed",
            ScenarioPhase::TimedOut => "timed_out",
            ScenarioPhase::Crashed => "crashed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScenarioPhase::Completed | ScenarioPhase::TimedOut | ScenarioPhase::Crashed
        )
    }

    /// Legal transitions.
    pub fn can_advance_to(&self, next: ScenarioPhase) -> bool {
        use ScenarioPhase::*;
        matches!(
            (self, next),
            (Built, Running)
                | (Running, Draining)
                | (Running, Completed)
                | (Running, TimedOut)
                | (Running, Crashed)
                | (Draining, Completed)
        )
    }
}

impl From<TerminalState> for ScenarioPhase {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Completed => ScenarioPhase::Completed,
            TerminalState::TimedOut => ScenarioPhase::TimedOut,
            TerminalState::Crashed => ScenarioPhase::Crashed,
        }
    }
}

impl std::fmt::Display for ScenarioPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Phase history of one scenario, with every transition traced.
struct PhaseLog<'a> {
    scenario: &'a str,
    history: Vec<ScenarioPhase>,
}

impl<'a> PhaseLog<'a> {
    fn new(scenario: &'a str) -> Self {
        Self {
            scenario,
            history: vec![ScenarioPhase::Built],
        }
    }

    fn current(&self) -> ScenarioPhase {
        self.history
            .last()
            .copied()
            .unwrap_or(ScenarioPhase::Built)
    }

    fn advance(&mut self, next: ScenarioPhase) {
        let current = self.current();
        debug_assert!(
            current.can_advance_to(next),
            "illegal transition {} -> {}",
            current,
            next
        );
        debug!("{}: {} -> {}", self.scenario, current, next);
        self.history.push(next);
    }

    fn finish(self) -> Vec<ScenarioPhase> {
        debug_assert!(
            self.current().is_terminal(),
            "{} left in {}",
            self.scenario,
            self.current()
        );
        self.history
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Everything produced by one driven scenario.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    /// Scenario that was run
    pub spec: ScenarioSpec,

    /// Output as observed
    pub timeline: Timeline,

    /// Process facts
    pub summary: RunSummary,

    /// Termination verdict first, then one per checker
    pub verdicts: Vec<Verdict>,

    /// Phases in the order they were entered
    pub phases: Vec<ScenarioPhase>,
}

impl ScenarioRun {
    /// Worst verdict outcome.
    pub fn outcome(&self) -> Outcome {
        worst_outcome(&self.verdicts)
    }

    /// True unless some verdict failed.
    pub fn passed(&self) -> bool {
        self.outcome() != Outcome::Fail
    }

    /// Looks up a verdict by checker name.
    pub fn verdict(&self, checker: &str) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| v.checker == checker)
    }

    /// Meal statistics, when the subject ran a simulation.
    pub fn statistics(&self) -> Option<MealStatistics> {
        self.spec
            .params()
            .map(|params| MealStatistics::from_timeline(&self.timeline, params.philosophers))
    }

    /// Report entry for this run.
    pub fn to_report(&self) -> ScenarioReport {
        let entry = ScenarioReport::completed(&self.spec, self.summary.clone(), self.verdicts.clone());
        match self.statistics() {
            Some(statistics) => entry.with_statistics(statistics),
            None => entry,
        }
    }
}

// =============================================================================
// RUNNER
// =============================================================================

/// Runs scenarios against a subject launcher.
#[derive(Clone)]
pub struct ScenarioRunner {
    /// Starts subject processes
    launcher: Arc<dyn SubjectLauncher>,

    /// Line decoder (banner allow-list)
    parser: LineParser,

    /// Bound on the post-termination drain
    drain_timeout: Duration,

    /// Diagnostics kept per scenario
    max_diagnostics: usize,

    /// Live event feed, if anyone listens
    observer: Option<broadcast::Sender<Event>>,
}

impl ScenarioRunner {
    /// Creates a runner with a strict parser.
    pub fn new(launcher: Arc<dyn SubjectLauncher>) -> Self {
        Self {
            launcher,
            parser: LineParser::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
            observer: None,
        }
    }

    /// Sets the line parser.
    pub fn with_parser(mut self, parser: LineParser) -> Self {
        self.parser = parser;
        self
    }

    /// Sets the drain bound.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Sets how many diagnostic lines are kept.
    pub fn with_max_diagnostics(mut self, max: usize) -> Self {
        self.max_diagnostics = max;
        self
    }

    /// Publishes every accepted event to `observer` while the subject runs.
    pub fn with_observer(mut self, observer: broadcast::Sender<Event>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runs one scenario and records it.
    pub async fn run(&self, spec: &ScenarioSpec, report: &mut Report) -> Option<ScenarioRun> {
        let result = self.execute(spec).await;
        record(spec, result, report)
    }

    /// Runs scenarios in order, or all at once when `parallel` is set.
    ///
    /// Entries are recorded in the order of `specs` either way.
    pub async fn run_suite(
        &self,
        specs: &[ScenarioSpec],
        report: &mut Report,
        parallel: bool,
    ) -> Vec<ScenarioRun> {
        let mut runs = Vec::new();

        if !parallel {
            for spec in specs {
                runs.extend(self.run(spec, report).await);
            }
            return runs;
        }

        let handles: Vec<_> = specs
            .iter()
            .cloned()
            .map(|spec| {
                let runner = self.clone();
                tokio::spawn(async move { runner.execute(&spec).await })
            })
            .collect();

        for (spec, handle) in specs.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(VerifyError::process(format!("driver task failed: {}", e))),
            };
            runs.extend(record(spec, result, report));
        }
        runs
    }

    /// Drives one scenario to a terminal state and judges it.
    ///
    /// Returns `Err` only when no judgment is possible: a configuration
    /// error before launch, or a subject that could not be supervised.
    pub async fn execute(&self, spec: &ScenarioSpec) -> Result<ScenarioRun, VerifyError> {
        let mut phases = PhaseLog::new(&spec.name);

        // Built
        spec.validate()?;
        self.launcher.preflight().map_err(env_error)?;

        let args = spec.subject_args();
        info!(
            "Starting scenario: {} ({} {})",
            spec.name,
            self.launcher.describe(),
            args.join(" ")
        );
        let started = Instant::now();
        let SpawnedSubject { lines, mut control } =
            self.launcher.launch(&args).await.map_err(env_error)?;

        // Running
        phases.advance(ScenarioPhase::Running);
        let (death_tx, mut death_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let sink = LineSink {
            parser: self.parser.clone(),
            observer: self.observer.clone(),
            max_diagnostics: self.max_diagnostics,
            death_tx: Some(death_tx),
            output: ReaderOutput::default(),
        };
        let mut reader = tokio::spawn(read_output(lines, sink, stop_rx));

        let deadline = tokio::time::sleep(spec.timeout);
        tokio::pin!(deadline);

        let first = tokio::select! {
            exit = control.wait() => FirstStop::Exited(exit.map_err(env_error)?),
            Ok(death) = &mut death_rx => FirstStop::Death(death),
            _ = &mut deadline => FirstStop::Deadline,
        };

        let mut forced_stop = false;
        let ending = match first {
            FirstStop::Exited(exit) => Ending::Exited(exit),
            FirstStop::Death(death) => {
                phases.advance(ScenarioPhase::Draining);
                debug!("{}: death reported: {}", spec.name, death);
                let exit = match tokio::time::timeout(spec.death_grace, control.wait()).await {
                    Ok(exit) => exit.map_err(env_error)?,
                    Err(_) => {
                        forced_stop = true;
                        warn!(
                            "{}: subject still running {}ms after the death, stopping it",
                            spec.name,
                            spec.death_grace.as_millis()
                        );
                        control.terminate(spec.kill_grace).await.map_err(env_error)?.exit
                    }
                };
                Ending::AfterDeath(exit)
            }
            FirstStop::Deadline => {
                let stop = control.terminate(spec.kill_grace).await.map_err(env_error)?;
                if stop.already_exited {
                    Ending::Exited(stop.exit)
                } else {
                    forced_stop = true;
                    debug!(
                        "{}: deadline reached, subject stopped ({}{})",
                        spec.name,
                        stop.exit,
                        if stop.escalated { ", killed" } else { "" }
                    );
                    Ending::Stopped(stop.exit)
                }
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        // The subject is gone; collect what its pipes still held.
        let output = match tokio::time::timeout(self.drain_timeout, &mut reader).await {
            Ok(joined) => joined,
            Err(_) => {
                debug!(
                    "{}: output still open {}ms after termination, stopping reader",
                    spec.name,
                    self.drain_timeout.as_millis()
                );
                let _ = stop_tx.send(true);
                reader.await
            }
        }
        .map_err(|e| VerifyError::process(format!("output reader failed: {}", e)))?;

        let death_observed = output.timeline.first_death().is_some();
        let (state, exit) = match ending {
            Ending::AfterDeath(exit) => (TerminalState::Completed, exit),
            Ending::Stopped(exit) => (TerminalState::TimedOut, exit),
            // A death printed just before exiting can beat the notification.
            Ending::Exited(exit) if death_observed => (TerminalState::Completed, exit),
            Ending::Exited(exit) => (classify_exit(&exit, spec.expectation), exit),
        };
        phases.advance(state.into());

        let summary = RunSummary {
            state,
            exit_code: exit.code,
            signal: exit.signal,
            death_observed,
            forced_stop,
            elapsed_ms,
            event_count: output.timeline.len(),
            diagnostics: output.diagnostics,
        };
        debug!(
            "{}: {} after {}ms with {} ({} events)",
            spec.name, state, elapsed_ms, exit, summary.event_count
        );

        let mut verdicts = vec![termination_verdict(
            spec,
            &summary,
            &exit,
            output.saw_error_message,
        )];
        verdicts.extend(run_checkers(&output.timeline, spec));

        Ok(ScenarioRun {
            spec: spec.clone(),
            timeline: output.timeline,
            summary,
            verdicts,
            phases: phases.finish(),
        })
    }
}

/// Records a scenario result into the report and logs it.
pub fn record(
    spec: &ScenarioSpec,
    result: Result<ScenarioRun, VerifyError>,
    report: &mut Report,
) -> Option<ScenarioRun> {
    match result {
        Ok(run) => {
            match run.outcome() {
                Outcome::Pass => info!("✓ {} PASSED", spec.name),
                Outcome::Warn => {
                    for verdict in run.verdicts.iter().filter(|v| v.is_warning()) {
                        warn!("⚠ {} {}: {}", spec.name, verdict.checker, verdict.explanation);
                    }
                }
                Outcome::Fail => {
                    for verdict in run.verdicts.iter().filter(|v| v.is_failure()) {
                        error!("✗ {} {}: {}", spec.name, verdict.checker, verdict.explanation);
                    }
                }
            }
            report.record(run.to_report());
            Some(run)
        }
        Err(err) if err.is_configuration() => {
            warn!("✗ {} not run: {}", spec.name, err);
            report.record(ScenarioReport::misconfigured(spec, err));
            None
        }
        Err(err) => {
            error!("✗ {} aborted: {}", spec.name, err);
            report.record(ScenarioReport::aborted(spec, err));
            None
        }
    }
}

/// Missing or unspawnable executables are configuration problems.
fn env_error(err: EnvError) -> VerifyError {
    if err.is_launch_failure() {
        VerifyError::config(err.to_string())
    } else {
        VerifyError::process(err.to_string())
    }
}

/// First thing that happened while the subject was running.
enum FirstStop {
    Exited(SubjectExit),
    Death(Event),
    Deadline,
}

/// How the subject process ended.
enum Ending {
    /// Exited by itself with no death pending
    Exited(SubjectExit),
    /// Exited, or was stopped, after reporting a death
    AfterDeath(SubjectExit),
    /// Stopped at the deadline
    Stopped(SubjectExit),
}

/// Terminal state of a subject that exited by itself.
fn classify_exit(exit: &SubjectExit, expectation: Expectation) -> TerminalState {
    if exit.success() {
        TerminalState::Completed
    } else if expectation == Expectation::RejectArguments && exit.code.is_some() {
        TerminalState::Completed
    } else {
        TerminalState::Crashed
    }
}

/// Compares the terminal state with what the scenario expected.
fn termination_verdict(
    spec: &ScenarioSpec,
    run: &RunSummary,
    exit: &SubjectExit,
    saw_error_message: bool,
) -> Verdict {
    let deadline_ms = spec.timeout.as_millis() as u64;
    let timed_out = || VerifyError::TimeoutExceeded(deadline_ms).to_string();

    match spec.expectation {
        Expectation::Survive => match run.state {
            _ if run.death_observed => Verdict::fail(
                TERMINATION_CHECK,
                "a philosopher died although everyone should survive",
                Vec::new(),
            ),
            TerminalState::TimedOut => Verdict::pass(
                TERMINATION_CHECK,
                format!("still running at the {}ms deadline with nobody dead", deadline_ms),
            ),
            TerminalState::Completed => Verdict::fail(
                TERMINATION_CHECK,
                format!("subject stopped ({}) before the {}ms deadline", exit, deadline_ms),
                Vec::new(),
            ),
            TerminalState::Crashed => Verdict::fail(
                TERMINATION_CHECK,
                format!("subject crashed ({})", exit),
                Vec::new(),
            ),
        },

        Expectation::Die if run.death_observed => {
            if run.forced_stop {
                Verdict::warn(
                    TERMINATION_CHECK,
                    format!(
                        "death reported, but the subject was still running {}ms later and had to be stopped",
                        spec.death_grace.as_millis()
                    ),
                    Vec::new(),
                )
            } else {
                Verdict::pass(TERMINATION_CHECK, format!("death reported, subject ended with {}", exit))
            }
        }
        Expectation::Die => {
            let why = match run.state {
                TerminalState::TimedOut => format!("{}: no death reported", timed_out()),
                TerminalState::Completed => format!("subject exited ({}) without reporting a death", exit),
                TerminalState::Crashed => format!("subject crashed ({}) without reporting a death", exit),
            };
            Verdict::fail(TERMINATION_CHECK, why, Vec::new())
        }

        Expectation::SatisfyMeals => match run.state {
            _ if run.death_observed => Verdict::fail(
                TERMINATION_CHECK,
                "a philosopher died before the meal limit stopped the simulation",
                Vec::new(),
            ),
            TerminalState::Completed => {
                Verdict::pass(TERMINATION_CHECK, format!("subject stopped by itself ({})", exit))
            }
            TerminalState::TimedOut => Verdict::fail(
                TERMINATION_CHECK,
                format!("{}: the meal limit never stopped the subject", timed_out()),
                Vec::new(),
            ),
            TerminalState::Crashed => Verdict::fail(
                TERMINATION_CHECK,
                format!("subject crashed ({})", exit),
                Vec::new(),
            ),
        },

        Expectation::RejectArguments => {
            let refused = exit.code.map_or(false, |code| code != 0);
            match (run.state, refused, saw_error_message) {
                (TerminalState::TimedOut, _, _) => Verdict::fail(
                    TERMINATION_CHECK,
                    format!("{}: subject accepted the arguments and kept running", timed_out()),
                    Vec::new(),
                ),
                (TerminalState::Crashed, _, _) => Verdict::fail(
                    TERMINATION_CHECK,
                    format!("subject crashed ({}) on bad arguments", exit),
                    Vec::new(),
                ),
                (_, true, true) => Verdict::pass(
                    TERMINATION_CHECK,
                    format!("arguments rejected with {} and an error message", exit),
                ),
                (_, true, false) => Verdict::fail(
                    TERMINATION_CHECK,
                    format!("subject exited with {} but printed no error message", exit),
                    Vec::new(),
                ),
                (_, false, _) => Verdict::fail(
                    TERMINATION_CHECK,
                    format!("subject accepted the arguments ({})", exit),
                    Vec::new(),
                ),
            }
        }

        Expectation::NoCrash => match run.state {
            TerminalState::Crashed => Verdict::fail(
                TERMINATION_CHECK,
                format!("subject crashed ({})", exit),
                Vec::new(),
            ),
            state => Verdict::pass(TERMINATION_CHECK, format!("ended {} without crashing", state)),
        },
    }
}

// =============================================================================
// OUTPUT READER
// =============================================================================

/// What the reader hands back to the driver.
#[derive(Debug, Default)]
struct ReaderOutput {
    timeline: Timeline,
    diagnostics: Vec<String>,
    omitted_diagnostics: usize,
    stdout_lines: usize,
    /// Some line on either stream mentioned "error"
    saw_error_message: bool,
}

/// Reader-side state: parser, observers and the accumulated output.
struct LineSink {
    parser: LineParser,
    observer: Option<broadcast::Sender<Event>>,
    max_diagnostics: usize,
    death_tx: Option<oneshot::Sender<Event>>,
    output: ReaderOutput,
}

impl LineSink {
    fn consume(&mut self, line: OutputLine) {
        if line.text.to_ascii_lowercase().contains("error") {
            self.output.saw_error_message = true;
        }

        match line.stream {
            OutputStream::Stderr => {
                self.note(format!("stderr: {}", strip_terminator(&line.text)))
            }
            OutputStream::Stdout => {
                self.output.stdout_lines += 1;
                let parsed = self.parser.parse(self.output.stdout_lines, &line.text);
                if let ParsedLine::Banner(banner) = &parsed {
                    self.note(format!("banner: {}", banner));
                }

                let Some(event) = self.output.timeline.ingest(parsed) else {
                    return;
                };
                if let Some(observer) = &self.observer {
                    // No subscribers is fine.
                    let _ = observer.send(event.clone());
                }
                if event.kind == EventKind::Died {
                    debug!(
                        "death line {} read {}ms after launch",
                        event,
                        line.received_at.as_millis()
                    );
                    if let Some(tx) = self.death_tx.take() {
                        let _ = tx.send(event.clone());
                    }
                }
                if event.sequence > 0 && event.sequence % 1000 == 0 {
                    debug!("{} events read", event.sequence);
                }
            }
        }
    }

    fn note(&mut self, text: String) {
        if self.output.diagnostics.len() < self.max_diagnostics {
            self.output.diagnostics.push(text);
        } else {
            self.output.omitted_diagnostics += 1;
        }
    }

    fn finish(mut self) -> ReaderOutput {
        if self.output.omitted_diagnostics > 0 {
            let omitted = self.output.omitted_diagnostics;
            self.output
                .diagnostics
                .push(format!("... {} more diagnostic line(s) omitted", omitted));
        }
        self.output
    }
}

/// Consumes subject output until the pipes close or a stop is requested.
async fn read_output(
    mut lines: mpsc::Receiver<OutputLine>,
    mut sink: LineSink,
    mut stop: watch::Receiver<bool>,
) -> ReaderOutput {
    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => {
                // Keep only what is already queued.
                for _ in 0..MAX_DRAIN_LINES {
                    match lines.try_recv() {
                        Ok(line) => sink.consume(line),
                        Err(_) => break,
                    }
                }
                break;
            }
            line = lines.recv() => match line {
                Some(line) => sink.consume(line),
                None => break,
            },
        }
    }
    sink.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ScriptedExit, ScriptedLauncher};
    use crate::oracle::ScheduleOracle;
    use crate::scenarios::{ScenarioId, SuiteConfig, MEALS_DONE_BANNER};
    use philocheck_core::{CheckerKind, SimulationParams};

    fn runner(launcher: ScriptedLauncher) -> ScenarioRunner {
        ScenarioRunner::new(Arc::new(launcher)).with_drain_timeout(Duration::from_millis(200))
    }

    fn survival_spec() -> ScenarioSpec {
        ScenarioSpec::new(
            "survival",
            SimulationParams::new(5, 800, 200, 200),
            Expectation::Survive,
        )
        .with_timeout(Duration::from_millis(400))
    }

    fn death_spec() -> ScenarioSpec {
        ScenarioSpec::new("death", SimulationParams::new(4, 310, 200, 100), Expectation::Die)
            .with_checkers(CheckerKind::safety())
            .with_timeout(Duration::from_secs(2))
            .with_death_grace(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_survival_runs_into_the_deadline() {
        let params = SimulationParams::new(5, 800, 200, 200);
        let schedule = ScheduleOracle::new(42).survival(&params, 2000);
        let launcher = ScriptedLauncher::from_schedule(&schedule, 0.05).then(ScriptedExit::Hang);

        let run = runner(launcher).execute(&survival_spec()).await.unwrap();

        assert_eq!(run.summary.state, TerminalState::TimedOut);
        assert!(run.summary.forced_stop);
        assert!(!run.summary.death_observed);
        assert_eq!(run.summary.event_count, schedule.events.len());
        assert_eq!(
            run.phases,
            vec![ScenarioPhase::Built, ScenarioPhase::Running, ScenarioPhase::TimedOut]
        );
        for verdict in &run.verdicts {
            assert!(verdict.is_pass(), "{}", verdict);
        }
    }

    #[tokio::test]
    async fn test_early_exit_fails_survival() {
        let launcher = ScriptedLauncher::new()
            .stdout("0 1 is thinking")
            .then(ScriptedExit::Code(0));

        let run = runner(launcher).execute(&survival_spec()).await.unwrap();

        assert_eq!(run.summary.state, TerminalState::Completed);
        assert!(run.verdict(TERMINATION_CHECK).unwrap().is_failure());
        assert!(!run.passed());
    }

    #[tokio::test]
    async fn test_death_then_exit() {
        let params = SimulationParams::new(4, 310, 200, 100);
        let schedule = ScheduleOracle::new(5).death(&params, 4, 2);
        let launcher = ScriptedLauncher::new()
            .stdout_lines(schedule.lines())
            .then(ScriptedExit::Code(0));

        let run = runner(launcher).execute(&death_spec()).await.unwrap();

        assert_eq!(run.summary.state, TerminalState::Completed);
        assert!(run.summary.death_observed);
        assert!(!run.summary.forced_stop);
        assert_eq!(run.phases.last(), Some(&ScenarioPhase::Completed));
        assert!(run.passed());
        assert_eq!(run.outcome(), Outcome::Pass);
    }

    #[tokio::test]
    async fn test_death_then_hang_is_drained_and_stopped() {
        let launcher = ScriptedLauncher::new()
            .stdout_lines(["0 1 is thinking", "311 1 died"])
            .then(ScriptedExit::Hang);

        let run = runner(launcher).execute(&death_spec()).await.unwrap();

        assert_eq!(
            run.phases,
            vec![
                ScenarioPhase::Built,
                ScenarioPhase::Running,
                ScenarioPhase::Draining,
                ScenarioPhase::Completed
            ]
        );
        assert!(run.summary.forced_stop);
        assert_eq!(run.summary.signal, Some(15));
        // Death timing is fine; only the slow exit is flagged.
        assert!(run.verdict(TERMINATION_CHECK).unwrap().is_warning());
        assert!(run.verdict("death_timing").unwrap().is_pass());
        assert!(run.passed());
    }

    #[tokio::test]
    async fn test_line_after_death_fails() {
        let launcher = ScriptedLauncher::new()
            .stdout_lines(["0 1 is thinking", "311 1 died", "312 2 is thinking"])
            .then(ScriptedExit::Code(0));

        let run = runner(launcher).execute(&death_spec()).await.unwrap();

        assert!(run.verdict("death_timing").unwrap().is_failure());
        assert!(!run.passed());
    }

    #[tokio::test]
    async fn test_no_death_before_deadline_fails_die() {
        let launcher = ScriptedLauncher::new().stdout("0 1 is thinking").then(ScriptedExit::Hang);
        let spec = death_spec().with_timeout(Duration::from_millis(100));

        let run = runner(launcher).execute(&spec).await.unwrap();

        assert_eq!(run.summary.state, TerminalState::TimedOut);
        let verdict = run.verdict(TERMINATION_CHECK).unwrap();
        assert!(verdict.is_failure());
        assert!(verdict.explanation.contains("Timeout after 100ms"));
    }

    #[tokio::test]
    async fn test_meal_limit_with_banner() {
        let params = SimulationParams::new(5, 800, 200, 200).with_meals(7);
        let schedule = ScheduleOracle::new(8).meals(&params);
        let launcher = ScriptedLauncher::new()
            .stdout_lines(schedule.lines())
            .stdout(MEALS_DONE_BANNER)
            .then(ScriptedExit::Code(0));
        let config = SuiteConfig::default().with_banner(MEALS_DONE_BANNER);
        let spec = ScenarioId::MealLimit.spec(&config);

        let run = runner(launcher)
            .with_parser(config.parser())
            .execute(&spec)
            .await
            .unwrap();

        assert_eq!(run.summary.state, TerminalState::Completed);
        assert_eq!(run.timeline.banners().len(), 1);
        assert!(run.summary.diagnostics.iter().any(|d| d.starts_with("banner:")));
        for verdict in &run.verdicts {
            assert!(verdict.is_pass(), "{}", verdict);
        }
        let stats = run.statistics().unwrap();
        assert_eq!(stats.total_meals, 35);
    }

    #[tokio::test]
    async fn test_banner_without_allow_list_is_a_format_failure() {
        let launcher = ScriptedLauncher::new()
            .stdout("0 1 is thinking")
            .stdout(MEALS_DONE_BANNER)
            .then(ScriptedExit::Hang);

        let run = runner(launcher).execute(&survival_spec()).await.unwrap();
        assert!(run.verdict("format").unwrap().is_failure());
    }

    #[tokio::test]
    async fn test_crash_is_reported() {
        let launcher = ScriptedLauncher::new()
            .stdout("0 1 is thinking")
            .stderr("Segmentation fault")
            .then(ScriptedExit::Signal(11));

        let run = runner(launcher).execute(&survival_spec()).await.unwrap();

        assert_eq!(run.summary.state, TerminalState::Crashed);
        assert_eq!(run.summary.signal, Some(11));
        assert_eq!(run.summary.diagnostics, vec!["stderr: Segmentation fault"]);
        assert!(!run.passed());
    }

    #[tokio::test]
    async fn test_argument_rejection() {
        let spec = ScenarioId::BadArgsNegative.spec(&SuiteConfig::default());

        let refused = ScriptedLauncher::new()
            .stderr("Error: invalid argument")
            .then(ScriptedExit::Code(1));
        let run = runner(refused).execute(&spec).await.unwrap();
        assert_eq!(run.summary.state, TerminalState::Completed);
        assert!(run.passed());
        assert_eq!(run.verdicts.len(), 1);

        let silent = ScriptedLauncher::new().then(ScriptedExit::Code(1));
        let run = runner(silent).execute(&spec).await.unwrap();
        assert!(!run.passed());

        let accepted = ScriptedLauncher::new()
            .stdout("error? no, running")
            .then(ScriptedExit::Code(0));
        let run = runner(accepted).execute(&spec).await.unwrap();
        assert!(!run.passed());
    }

    #[tokio::test]
    async fn test_configuration_errors_do_not_abort_the_suite() {
        let launcher = ScriptedLauncher::new().missing();
        let specs = vec![
            survival_spec(),
            ScenarioSpec::new("broken", SimulationParams::new(0, 800, 200, 200), Expectation::Survive),
        ];
        let mut report = Report::new("./philo");

        let runs = runner(launcher.clone()).run_suite(&specs, &mut report, false).await;

        assert!(runs.is_empty());
        assert_eq!(report.total(), 2);
        assert_eq!(report.failed(), 2);
        assert!(report.entries().iter().all(|e| e.configuration_error.is_some()));
        assert!(launcher.launches().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_spec_is_never_launched() {
        let launcher = ScriptedLauncher::new();
        let spec = ScenarioSpec::new("zero", SimulationParams::new(5, 0, 200, 200), Expectation::Survive);

        let err = runner(launcher.clone()).execute(&spec).await.unwrap_err();

        assert!(err.is_configuration());
        assert!(launcher.launches().is_empty());
    }

    #[tokio::test]
    async fn test_parallel_suite_keeps_catalog_order() {
        let launcher = ScriptedLauncher::new()
            .stderr("Error: bad arguments")
            .then(ScriptedExit::Code(1));
        let config = SuiteConfig::default();
        let specs: Vec<ScenarioSpec> = ScenarioId::rejection().iter().map(|id| id.spec(&config)).collect();
        let mut report = Report::new("./philo");

        let runs = runner(launcher.clone()).run_suite(&specs, &mut report, true).await;

        assert_eq!(runs.len(), specs.len());
        let names: Vec<&str> = report.entries().iter().map(|e| e.scenario.as_str()).collect();
        let expected: Vec<&str> = ScenarioId::rejection().iter().map(|id| id.name()).collect();
        assert_eq!(names, expected);
        assert!(report.passed());
        assert_eq!(launcher.launches().len(), specs.len());
    }

    #[tokio::test]
    async fn test_observer_sees_every_event() {
        let (tx, mut rx) = broadcast::channel(64);
        let launcher = ScriptedLauncher::new()
            .stdout_lines(["0 1 has taken a fork", "0 1 has taken a fork", "0 1 is eating", "garbage"])
            .then(ScriptedExit::Hang);

        let run = runner(launcher)
            .with_observer(tx)
            .execute(&survival_spec().with_timeout(Duration::from_millis(100)))
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event.kind);
        }
        assert_eq!(
            seen,
            vec![EventKind::ForkAcquired, EventKind::ForkAcquired, EventKind::StartedEating]
        );
        assert_eq!(run.timeline.parse_failures().len(), 1);
    }

    #[tokio::test]
    async fn test_diagnostics_are_capped() {
        let mut launcher = ScriptedLauncher::new();
        for i in 0..10 {
            launcher = launcher.stderr(format!("noise {}", i));
        }
        let launcher = launcher.then(ScriptedExit::Hang);

        let run = runner(launcher)
            .with_max_diagnostics(3)
            .execute(&survival_spec().with_timeout(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(run.summary.diagnostics.len(), 4);
        assert_eq!(
            run.summary.diagnostics.last().unwrap(),
            "... 7 more diagnostic line(s) omitted"
        );
    }

    #[test]
    fn test_terminal_phases() {
        assert!(ScenarioPhase::Completed.is_terminal());
        assert!(ScenarioPhase::TimedOut.is_terminal());
        assert!(!ScenarioPhase::Draining.is_terminal());
        assert!(ScenarioPhase::Running.can_advance_to(ScenarioPhase::Draining));
        assert!(!ScenarioPhase::Completed.can_advance_to(ScenarioPhase::Running));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_process_reports_single_death() {
        use philocheck_env::TokioLauncher;
        use std::os::unix::fs::PermissionsExt;

        // Prints its fork, then dies at time_to_die ($2) and exits.
        let script = std::env::temp_dir().join(format!("philocheck-{}.sh", uuid::Uuid::new_v4()));
        std::fs::write(
            &script,
            "#!/bin/sh\necho \"0 1 has taken a fork\"\nsleep 0.1\necho \"$2 1 died\"\nexit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let spec = ScenarioId::Single.spec(&SuiteConfig::default());
        let result = ScenarioRunner::new(Arc::new(TokioLauncher::new(script.clone())))
            .execute(&spec)
            .await;
        std::fs::remove_file(&script).unwrap();
        let run = result.unwrap();

        assert_eq!(run.summary.state, TerminalState::Completed);
        assert_eq!(run.summary.exit_code, Some(0));
        assert!(run.summary.death_observed);
        assert!(!run.summary.forced_stop);
        assert_eq!(run.timeline.len(), 2);
        assert_eq!(run.timeline.first_death().unwrap().timestamp_ms, 800);
        for verdict in &run.verdicts {
            assert!(verdict.is_pass(), "{}", verdict);
        }
    }
}
