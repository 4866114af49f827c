//! Shell delegations: `sh -c` with bounded output and a terminate-then-kill timeout.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::WeaveResult;
use crate::tool::ToolOutput;

const CHUNK_SIZE: usize = 8192;
/// How long to wait for output pipes after the shell itself is gone. Background
/// grandchildren can hold them open indefinitely.
const PIPE_DRAIN_WAIT: Duration = Duration::from_millis(500);

/// Runs shell commands for delegations.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    max_output_bytes: usize,
    grace_period: Duration,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            max_output_bytes: 30_000,
            grace_period: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellStatus {
    Exited(i32),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShellOutcome {
    pub stdout: String,
    pub stderr: String,
    pub status: ShellStatus,
}

impl ShellOutcome {
    /// Output as the model sees it. `timeout_secs` is echoed in the timeout notice.
    pub fn into_tool_output(self, timeout_secs: f64) -> ToolOutput {
        let ShellOutcome {
            stdout,
            stderr,
            status,
        } = self;
        match status {
            ShellStatus::Exited(0) => ToolOutput::success(format!("{stdout}\n{stderr}")),
            ShellStatus::Exited(_) => ToolOutput::error(format!("{stderr}\n{stdout}")),
            ShellStatus::TimedOut => ToolOutput::error(format!(
                "Command timed out after {timeout_secs:.1}s\n{stderr}\n{stdout}"
            )),
        }
    }
}

impl ShellRunner {
    pub fn new(max_output_bytes: usize, grace_period: Duration) -> Self {
        Self {
            max_output_bytes,
            grace_period,
        }
    }

    pub async fn run(&self, command: &str, timeout: Duration) -> WeaveResult<ShellOutcome> {
        debug!(command, timeout_secs = timeout.as_secs_f64(), "running shell delegation");
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let readers = [
            child
                .stdout
                .take()
                .map(|pipe| self.spawn_reader(pipe, stdout.clone())),
            child
                .stderr
                .take()
                .map(|pipe| self.spawn_reader(pipe, stderr.clone())),
        ];

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => ShellStatus::Exited(exit_code(status?)),
            Err(_) => {
                self.terminate(&mut child).await;
                ShellStatus::TimedOut
            }
        };

        for mut reader in readers.into_iter().flatten() {
            if tokio::time::timeout(PIPE_DRAIN_WAIT, &mut reader).await.is_err() {
                reader.abort();
            }
        }

        let stdout = String::from_utf8_lossy(&stdout.lock().await).into_owned();
        let stderr = String::from_utf8_lossy(&stderr.lock().await).into_owned();
        debug!(command, status = ?status, stdout_len = stdout.len(), stderr_len = stderr.len(), "shell delegation finished");
        Ok(ShellOutcome {
            stdout,
            stderr,
            status,
        })
    }

    /// Read `pipe` to the end in chunks, keeping at most `max_output_bytes`.
    /// Reading continues past the cap so the writer never blocks on a full pipe.
    fn spawn_reader(
        &self,
        mut pipe: impl AsyncRead + Unpin + Send + 'static,
        sink: Arc<Mutex<Vec<u8>>>,
    ) -> JoinHandle<()> {
        let cap = self.max_output_bytes;
        tokio::spawn(async move {
            let mut chunk = vec![0u8; CHUNK_SIZE];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut buf = sink.lock().await;
                        let room = cap.saturating_sub(buf.len());
                        buf.extend_from_slice(&chunk[..n.min(room)]);
                    }
                }
            }
        })
    }

    /// SIGTERM the whole process group, then SIGKILL it after the grace period.
    async fn terminate(&self, child: &mut Child) {
        term_group(child);
        if tokio::time::timeout(self.grace_period, child.wait())
            .await
            .is_err()
        {
            warn!(pid = child.id(), "shell ignored SIGTERM, killing process group");
            kill_group(child);
            if let Err(e) = child.wait().await {
                warn!("Failed to reap shell: {}", e);
            }
        }
    }
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) {
    if let Some(pid) = child.id() {
        // SAFETY: plain FFI call; the group was created for this child by process_group(0).
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
        if rc != 0 {
            warn!(pid, signal, "Failed to signal process group");
        }
    }
}

#[cfg(unix)]
fn term_group(child: &mut Child) {
    signal_group(child, libc::SIGTERM);
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    signal_group(child, libc::SIGKILL);
}

#[cfg(not(unix))]
fn term_group(child: &mut Child) {
    kill_group(child);
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to stop shell: {}", e);
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    let code = {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .unwrap_or_else(|| status.signal().map(|s| 128 + s).unwrap_or(1))
    };
    #[cfg(not(unix))]
    let code = status.code().unwrap_or(1);
    code
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_puts_stdout_first() {
        let outcome = ShellRunner::default()
            .run("echo out; echo err >&2", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.status, ShellStatus::Exited(0));
        let output = outcome.into_tool_output(5.0);
        assert!(!output.is_error);
        assert_eq!(output.text(), "out\n\nerr\n");
    }

    #[tokio::test]
    async fn failure_puts_stderr_first() {
        let outcome = ShellRunner::default()
            .run("echo out; echo err >&2; exit 3", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.status, ShellStatus::Exited(3));
        let output = outcome.into_tool_output(5.0);
        assert!(output.is_error);
        assert_eq!(output.text(), "err\n\nout\n");
    }

    #[tokio::test]
    async fn timeout_terminates_promptly() {
        let started = std::time::Instant::now();
        let outcome = ShellRunner::default()
            .run("echo partial; sleep 5", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(outcome.status, ShellStatus::TimedOut);
        assert_eq!(outcome.stdout, "partial\n");
        let output = outcome.into_tool_output(1.0);
        assert!(output.is_error);
        assert!(output.text().starts_with("Command timed out after 1.0s"));
    }

    #[tokio::test]
    async fn output_is_capped() {
        let runner = ShellRunner::new(100, Duration::from_secs(5));
        let outcome = runner
            .run("head -c 50000 /dev/zero | tr '\\0' 'x'", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(outcome.status, ShellStatus::Exited(0));
        assert_eq!(outcome.stdout.len(), 100);
    }

    #[tokio::test]
    async fn background_grandchild_does_not_hang() {
        let started = std::time::Instant::now();
        let outcome = ShellRunner::default()
            .run("sleep 10 & echo done", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.status, ShellStatus::Exited(0));
        assert_eq!(outcome.stdout, "done\n");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn sigterm_ignoring_group_is_killed() {
        let started = std::time::Instant::now();
        let runner = ShellRunner::new(30_000, Duration::from_millis(300));
        let outcome = runner
            .run("trap '' TERM; sleep 30 & wait", Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(outcome.status, ShellStatus::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
