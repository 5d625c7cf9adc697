use super::LaunchSpec;
use crate::mcp::error::McpError;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::debug;

const STDIO_SHUTDOWN_GRACE_SECONDS: u64 = 2;

/// A spawned server process and the two pipes wired to it.
///
/// The child is started with `kill_on_drop`, so dropping the transport on any
/// exit path (including a cancelled future) terminates the process.
pub struct StdioTransport {
    server_id: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    closed: bool,
}

impl StdioTransport {
    pub fn open(server_id: &str, spec: &LaunchSpec) -> Result<Self, McpError> {
        debug!(server_id = %server_id, command = %spec.command, args = ?spec.args, "Starting MCP stdio server");
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        if let Some(env) = &spec.env {
            cmd.envs(env);
        }
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let launch_error = |source: std::io::Error| McpError::Launch {
            command: spec.command.clone(),
            source,
        };

        let mut child = cmd.spawn().map_err(&launch_error)?;
        let missing_pipe =
            |name: &str| launch_error(std::io::Error::other(format!("Unable to retrieve {name}.")));
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        Self::spawn_stderr_drain(server_id.to_string(), stderr);

        Ok(Self {
            server_id: server_id.to_string(),
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            closed: false,
        })
    }

    fn spawn_stderr_drain(server_id: String, stderr: ChildStderr) {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!(server_id = %server_id, "server stderr: {line}");
            }
        });
    }

    /// Hands the (inbound, outbound) streams to the caller. Returns `None`
    /// once they have been taken.
    pub fn take_streams(&mut self) -> Option<(ChildStdout, ChildStdin)> {
        let stdout = self.stdout.take()?;
        let stdin = self.stdin.take()?;
        Some((stdout, stdin))
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Closes stdin, gives the server a short grace period to exit, then
    /// kills it. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stdin.take();
        self.stdout.take();

        let grace = Duration::from_secs(STDIO_SHUTDOWN_GRACE_SECONDS);
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server_id = %self.server_id, status = %status, "MCP stdio server exited");
            }
            Ok(Err(err)) => {
                debug!(server_id = %self.server_id, error = %err, "Failed to wait for MCP stdio server");
            }
            Err(_) => {
                debug!(server_id = %self.server_id, "MCP stdio server did not exit; killing it");
                if let Err(err) = self.child.kill().await {
                    debug!(server_id = %self.server_id, error = %err, "Failed to kill MCP stdio server");
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
