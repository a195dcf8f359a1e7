use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt as _;
use tokio::process::Command;
use tracing::debug;

/// Upper bound on captured bytes per stream. The agent is supposed to print
/// a short textual answer; anything past this bound fails the call closed.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Extra wall-clock grace on top of the timeout forwarded to the agent, so
/// the agent's own timeout handling gets a chance to produce diagnostics.
const WALL_CLOCK_GRACE_SECS: u64 = 10;

/// Upper bound on the per-call timeout a caller may request. Also keeps the
/// wall-clock addition below from overflowing on hostile input.
const MAX_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("agent exited with {status}: {stderr}")]
    Failed {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("agent produced more than {0} bytes of output")]
    OutputOverflow(usize),
    #[error("agent did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("agent io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for the external command-line agent.
///
/// The agent is a black box: it accepts positional/flag arguments and
/// reports results on stdout (exit 0) or diagnostics on stderr (non-zero).
#[derive(Debug, Clone)]
pub struct AgentClient {
    program: String,
    session_label: String,
}

impl AgentClient {
    pub fn new(program: impl Into<String>, session_label: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            session_label: session_label.into(),
        }
    }

    /// `agent sessions send --label <label> --message <text> --timeout <secs>`.
    pub async fn send_message(&self, message: &str, timeout_secs: u64) -> Result<String, AgentError> {
        let timeout_secs = timeout_secs.min(MAX_TIMEOUT_SECS);
        let args = self.send_message_args(message, timeout_secs);
        let wall = Duration::from_secs(timeout_secs + WALL_CLOCK_GRACE_SECS);
        self.run(&args, wall).await
    }

    /// `agent sessions list --limit <n>`.
    pub async fn list_sessions(&self, limit: u32) -> Result<String, AgentError> {
        let args = Self::list_sessions_args(limit);
        let wall = Duration::from_secs(WALL_CLOCK_GRACE_SECS + 20);
        self.run(&args, wall).await
    }

    fn send_message_args(&self, message: &str, timeout_secs: u64) -> Vec<String> {
        vec![
            "sessions".to_string(),
            "send".to_string(),
            "--label".to_string(),
            self.session_label.clone(),
            "--message".to_string(),
            escape_quotes(message),
            "--timeout".to_string(),
            timeout_secs.to_string(),
        ]
    }

    fn list_sessions_args(limit: u32) -> Vec<String> {
        vec![
            "sessions".to_string(),
            "list".to_string(),
            "--limit".to_string(),
            limit.to_string(),
        ]
    }

    async fn run(&self, args: &[String], wall_clock: Duration) -> Result<String, AgentError> {
        debug!(program = %self.program, ?args, "invoking agent");

        let mut command = Command::new(&self.program);
        command.args(args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        // Tie the child to this request: if the caller disconnects and the
        // future is dropped, the agent is reaped rather than orphaned.
        command.kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| AgentError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = (MAX_OUTPUT_BYTES + 1) as u64;

        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(h) = stdout {
                h.take(cap).read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(h) = stderr {
                h.take(cap).read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };

        let joined = async {
            let (out, err) = tokio::try_join!(read_stdout, read_stderr)?;
            if out.len() > MAX_OUTPUT_BYTES || err.len() > MAX_OUTPUT_BYTES {
                // The pipe is full and no longer drained; kill the child
                // instead of waiting for it to block forever.
                child.kill().await?;
                return Ok((None, out, err));
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((Some(status), out, err))
        };

        let (status, out, err) = tokio::time::timeout(wall_clock, joined)
            .await
            .map_err(|_| AgentError::TimedOut(wall_clock))??;

        let Some(status) = status else {
            return Err(AgentError::OutputOverflow(MAX_OUTPUT_BYTES));
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&err).trim().to_string();
            return Err(AgentError::Failed { status, stderr });
        }

        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Escape embedded double quotes before handing the message to the agent.
fn escape_quotes(message: &str) -> String {
    message.replace('"', "\\\"")
}
