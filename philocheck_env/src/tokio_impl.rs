//! Production implementation of SubjectLauncher using Tokio processes.

use crate::error::EnvError;
use crate::launcher::{SpawnedSubject, SubjectControl, SubjectLauncher};
use crate::types::{OutputLine, OutputStream, SubjectExit};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the output channel.
const LINE_BUFFER: usize = 4096;

/// Launcher backed by real OS processes.
///
/// Stdout and stderr are forwarded line by line into one channel by two
/// small pump tasks. The child is killed if its handle is dropped.
pub struct TokioLauncher {
    /// Subject executable
    executable: PathBuf,
}

impl TokioLauncher {
    /// Creates a launcher for the given executable.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

#[async_trait]
impl SubjectLauncher for TokioLauncher {
    async fn launch(&self, args: &[String]) -> Result<SpawnedSubject, EnvError> {
        self.preflight()?;

        let mut child = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EnvError::spawn(self.executable.display(), e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EnvError::spawn(self.executable.display(), "stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EnvError::spawn(self.executable.display(), "stderr not captured"))?;

        debug!(
            "Spawned {} {:?} (pid={:?})",
            self.executable.display(),
            args,
            child.id()
        );

        let started = Instant::now();
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        tokio::spawn(pump_lines(stdout, OutputStream::Stdout, tx.clone(), started));
        tokio::spawn(pump_lines(stderr, OutputStream::Stderr, tx, started));

        Ok(SpawnedSubject {
            lines: rx,
            control: Box::new(TokioSubject { child }),
        })
    }

    fn preflight(&self) -> Result<(), EnvError> {
        match std::fs::metadata(&self.executable) {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => Err(EnvError::MissingExecutable(
                self.executable.display().to_string(),
            )),
        }
    }

    fn describe(&self) -> String {
        self.executable.display().to_string()
    }
}

/// Forwards one pipe into the shared line channel until EOF.
///
/// Bytes are decoded lossily so a stray non-UTF-8 byte turns into a
/// malformed line instead of silently ending the stream.
async fn pump_lines<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<OutputLine>, started: Instant)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = OutputLine {
                    stream,
                    text: String::from_utf8_lossy(&buf).into_owned(),
                    received_at: started.elapsed(),
                };
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("{:?} pipe read failed: {}", stream, e);
                break;
            }
        }
    }
}

/// A running OS process.
struct TokioSubject {
    child: Child,
}

#[async_trait]
impl SubjectControl for TokioSubject {
    async fn wait(&mut self) -> Result<SubjectExit, EnvError> {
        self.child.wait().await.map(SubjectExit::from).map_err(EnvError::io)
    }

    fn try_wait(&mut self) -> Result<Option<SubjectExit>, EnvError> {
        self.child
            .try_wait()
            .map(|status| status.map(SubjectExit::from))
            .map_err(EnvError::io)
    }

    #[cfg(unix)]
    fn request_stop(&mut self) -> Result<(), EnvError> {
        let Some(pid) = self.child.id() else {
            // Already reaped.
            return Ok(());
        };
        // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            return Err(EnvError::Signal(std::io::Error::last_os_error().to_string()));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) -> Result<(), EnvError> {
        self.child
            .start_kill()
            .map_err(|e| EnvError::Signal(e.to_string()))
    }

    async fn kill(&mut self) -> Result<(), EnvError> {
        self.child.kill().await.map_err(|e| EnvError::Signal(e.to_string()))
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_launch_streams_both_pipes() {
        let launcher = TokioLauncher::new("/bin/sh");
        let mut subject = launcher
            .launch(&sh("echo '0 1 is thinking'; echo 'Error: bad' >&2; exit 3"))
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Some(line) = subject.lines.recv().await {
            lines.push(line);
        }
        let exit = subject.control.wait().await.unwrap();

        assert_eq!(exit, SubjectExit::with_code(3));
        assert!(lines.iter().any(|l| l.is_stdout() && l.text == "0 1 is thinking\n"));
        assert!(lines
            .iter()
            .any(|l| l.stream == OutputStream::Stderr && l.text == "Error: bad\n"));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let launcher = TokioLauncher::new("/definitely/not/here/philo");
        assert!(matches!(launcher.preflight(), Err(EnvError::MissingExecutable(_))));
        let err = launcher.launch(&[]).await.err().unwrap();
        assert!(err.is_launch_failure());
    }

    #[tokio::test]
    async fn test_terminate_politely() {
        let launcher = TokioLauncher::new("/bin/sh");
        let mut subject = launcher.launch(&sh("exec sleep 5")).await.unwrap();

        let stop = subject
            .control
            .terminate(Duration::from_secs(2))
            .await
            .unwrap();

        assert!(!stop.escalated);
        assert_eq!(stop.exit.signal, Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let launcher = TokioLauncher::new("/bin/sh");
        let mut subject = launcher
            .launch(&sh("trap '' TERM; while true; do sleep 0.05; done"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stop = subject
            .control
            .terminate(Duration::from_millis(200))
            .await
            .unwrap();

        assert!(stop.escalated);
        assert_eq!(stop.exit.signal, Some(libc::SIGKILL));
    }

    #[tokio::test]
    async fn test_terminate_after_exit() {
        let launcher = TokioLauncher::new("/bin/sh");
        let mut subject = launcher.launch(&sh("exit 0")).await.unwrap();
        let exit = subject.control.wait().await.unwrap();
        assert!(exit.success());

        let stop = subject
            .control
            .terminate(Duration::from_millis(100))
            .await
            .unwrap();
        assert!(stop.already_exited);
    }
}
