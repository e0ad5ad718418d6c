//! Scripted subject implementing SubjectLauncher for deterministic testing.

use async_trait::async_trait;
use philocheck_env::{
    EnvError, OutputLine, OutputStream, SpawnedSubject, SubjectControl, SubjectExit,
    SubjectLauncher,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use crate::oracle::Schedule;

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

/// One prepared output line.
#[derive(Debug, Clone)]
struct ScriptStep {
    /// Pause before the line is written
    delay: Duration,
    stream: OutputStream,
    text: String,
}

/// What the scripted subject does after its last line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedExit {
    /// Exit with a code
    Code(i32),

    /// Exit on a signal without being asked (a crash)
    Signal(i32),

    /// Keep running until stopped
    Hang,

    /// Keep running and ignore the stop request; only a kill ends it
    IgnoreStop,
}

/// Signals delivered by the control handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivered {
    Nothing,
    Term,
    Kill,
}

/// Launcher that replays a prepared script instead of spawning a process.
///
/// This implements `SubjectLauncher` using:
/// - A feeder task writing lines with the scripted delays
/// - Watch channels standing in for signals and the exit status
/// - A record of every argument vector it was launched with
#[derive(Clone)]
pub struct ScriptedLauncher {
    steps: Vec<ScriptStep>,
    exit: ScriptedExit,
    missing: bool,
    launches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedLauncher {
    /// Creates an empty script that exits with code 0.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            exit: ScriptedExit::Code(0),
            missing: false,
            launches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replays a generated schedule, sleeping `scale` wall-clock ms per log ms.
    pub fn from_schedule(schedule: &Schedule, scale: f64) -> Self {
        let mut launcher = Self::new();
        let mut previous = 0u64;
        for event in &schedule.events {
            let delta = event.timestamp_ms.saturating_sub(previous);
            previous = event.timestamp_ms;
            launcher = launcher.stdout_after(
                Duration::from_secs_f64(delta as f64 * scale.max(0.0) / 1000.0),
                event.to_line(),
            );
        }
        launcher
    }

    /// Appends a stdout line written immediately.
    pub fn stdout(self, text: impl Into<String>) -> Self {
        self.stdout_after(Duration::ZERO, text)
    }

    /// Appends a stdout line written after `delay`.
    pub fn stdout_after(mut self, delay: Duration, text: impl Into<String>) -> Self {
        self.steps.push(ScriptStep {
            delay,
            stream: OutputStream::Stdout,
            text: text.into(),
        });
        self
    }

    /// Appends several stdout lines written immediately.
    pub fn stdout_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self = self.stdout(line);
        }
        self
    }

    /// Appends a stderr line written immediately.
    pub fn stderr(mut self, text: impl Into<String>) -> Self {
        self.steps.push(ScriptStep {
            delay: Duration::ZERO,
            stream: OutputStream::Stderr,
            text: text.into(),
        });
        self
    }

    /// Sets the behaviour after the last line.
    pub fn then(mut self, exit: ScriptedExit) -> Self {
        self.exit = exit;
        self
    }

    /// Makes preflight fail as if the executable did not exist.
    pub fn missing(mut self) -> Self {
        self.missing = true;
        self
    }

    /// Argument vectors of every launch so far.
    pub fn launches(&self) -> Vec<Vec<String>> {
        self.launches
            .lock()
            .map(|launches| launches.clone())
            .unwrap_or_default()
    }
}

impl Default for ScriptedLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubjectLauncher for ScriptedLauncher {
    async fn launch(&self, args: &[String]) -> Result<SpawnedSubject, EnvError> {
        self.preflight()?;
        if let Ok(mut launches) = self.launches.lock() {
            launches.push(args.to_vec());
        }

        let (line_tx, line_rx) = mpsc::channel(1024);
        let (exit_tx, exit_rx) = watch::channel(None);
        let (signal_tx, signal_rx) = watch::channel(Delivered::Nothing);

        tokio::spawn(feed(self.steps.clone(), self.exit, line_tx, exit_tx, signal_rx));

        Ok(SpawnedSubject {
            lines: line_rx,
            control: Box::new(ScriptedSubject { exit_rx, signal_tx }),
        })
    }

    fn preflight(&self) -> Result<(), EnvError> {
        if self.missing {
            return Err(EnvError::MissingExecutable("<scripted>".to_string()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("scripted subject ({} lines)", self.steps.len())
    }
}

/// Writes the script, then exits the way it was told to.
async fn feed(
    steps: Vec<ScriptStep>,
    exit: ScriptedExit,
    lines: mpsc::Sender<OutputLine>,
    exit_tx: watch::Sender<Option<SubjectExit>>,
    mut signals: watch::Receiver<Delivered>,
) {
    let started = Instant::now();
    let ignore_term = exit == ScriptedExit::IgnoreStop;

    for step in steps {
        if !step.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(step.delay) => {}
                fatal = fatal_signal(&mut signals, ignore_term) => {
                    exit_tx.send_replace(Some(fatal));
                    return;
                }
            }
        }
        let line = OutputLine {
            stream: step.stream,
            text: step.text,
            received_at: started.elapsed(),
        };
        // Reader gone; keep going so the exit still happens.
        let _ = lines.send(line).await;
    }

    let status = match exit {
        ScriptedExit::Code(code) => SubjectExit::with_code(code),
        ScriptedExit::Signal(signal) => SubjectExit::with_signal(signal),
        ScriptedExit::Hang | ScriptedExit::IgnoreStop => {
            fatal_signal(&mut signals, ignore_term).await
        }
    };
    drop(lines);
    exit_tx.send_replace(Some(status));
}

/// Resolves once a delivered signal would end the subject.
async fn fatal_signal(signals: &mut watch::Receiver<Delivered>, ignore_term: bool) -> SubjectExit {
    loop {
        if signals.changed().await.is_err() {
            // Control handle dropped: same as a kill on drop.
            return SubjectExit::with_signal(SIGKILL);
        }
        let delivered = *signals.borrow();
        match delivered {
            Delivered::Kill => return SubjectExit::with_signal(SIGKILL),
            Delivered::Term if !ignore_term => return SubjectExit::with_signal(SIGTERM),
            _ => {}
        }
    }
}

/// Control handle of a scripted subject.
struct ScriptedSubject {
    exit_rx: watch::Receiver<Option<SubjectExit>>,
    signal_tx: watch::Sender<Delivered>,
}

#[async_trait]
impl SubjectControl for ScriptedSubject {
    async fn wait(&mut self) -> Result<SubjectExit, EnvError> {
        loop {
            let current = *self.exit_rx.borrow();
            if let Some(exit) = current {
                return Ok(exit);
            }
            if self.exit_rx.changed().await.is_err() {
                let last = *self.exit_rx.borrow();
                return last.ok_or_else(|| EnvError::io("script ended without an exit status"));
            }
        }
    }

    fn try_wait(&mut self) -> Result<Option<SubjectExit>, EnvError> {
        Ok(*self.exit_rx.borrow())
    }

    fn request_stop(&mut self) -> Result<(), EnvError> {
        self.signal_tx.send_replace(Delivered::Term);
        Ok(())
    }

    async fn kill(&mut self) -> Result<(), EnvError> {
        self.signal_tx.send_replace(Delivered::Kill);
        self.wait().await.map(|_| ())
    }

    fn pid(&self) -> Option<u32> {
        None
    }
}
