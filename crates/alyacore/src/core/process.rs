//! Process execution utilities with timeout support
//!
//! Every yt-dlp invocation goes through here so a hung process can never block
//! the pipeline or outlive the call that started it.

use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Why a subprocess did not produce an `Output`.
#[derive(Debug)]
pub enum ProcessError {
    /// The binary could not be spawned (missing, not executable, ...)
    Spawn(std::io::Error),
    /// Reading the output of a running process failed
    Wait(std::io::Error),
    /// The process outlived its deadline and was killed
    TimedOut(Duration),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Spawn(e) => write!(f, "failed to spawn process: {}", e),
            ProcessError::Wait(e) => write!(f, "failed to collect process output: {}", e),
            ProcessError::TimedOut(t) => write!(f, "process timed out after {}s", t.as_secs()),
        }
    }
}

impl std::error::Error for ProcessError {}

/// Run an async Command with a timeout.
///
/// The child is spawned with `kill_on_drop`, so when the deadline passes the
/// pending wait is dropped and the process is killed. stdin is closed; the
/// caller decides which of stdout/stderr are piped.
pub async fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output, ProcessError> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    let child = cmd.spawn().map_err(ProcessError::Spawn)?;
    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ProcessError::Wait(e)),
        Err(_) => {
            log::warn!(
                "Process {:?} exceeded {}s, killed",
                pid,
                timeout.as_secs()
            );
            Err(ProcessError::TimedOut(timeout))
        }
    }
}

/// First non-empty stderr line, for compact log messages.
pub fn first_stderr_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown error")
        .to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_run_with_timeout_collects_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello"]).stdout(Stdio::piped());
        let output = run_with_timeout(&mut cmd, Duration::from_secs(5)).await.unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_with_timeout_kills_slow_process() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 10"]);
        let started = Instant::now();
        let result = run_with_timeout(&mut cmd, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(ProcessError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_with_timeout_missing_binary() {
        let mut cmd = Command::new("/nonexistent/alya-test-binary");
        let result = run_with_timeout(&mut cmd, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProcessError::Spawn(_))));
    }

    #[test]
    fn test_wait_failure_is_reported_as_wait() {
        let err = ProcessError::Wait(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"));
        assert_eq!(err.to_string(), "failed to collect process output: pipe closed");
    }
}
