//! Builder for executing external tool commands with timeout and
//! cancellation support.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use muxpair_core::{Error, Result};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default time a running process gets after cancellation before it is killed.
const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// The child is spawned with `kill_on_drop`, so abandoning the wait (timeout
/// or cancellation) terminates the process.
///
/// # Example
///
/// ```no_run
/// use muxpair_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> muxpair_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "error", "-print_format", "json", "-show_format"])
///     .arg("/path/to/video.m4s")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    kill_grace: Duration,
    cancel: Option<CancellationToken>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
            cancel: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Abort the process once `token` is cancelled and `grace` has elapsed.
    pub fn cancel_on(&mut self, token: CancellationToken, grace: Duration) -> &mut Self {
        self.cancel = Some(token);
        self.kill_grace = grace;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::Tool`] if spawning fails, the process times out, or it
    ///   exits with a non-zero status (message includes stderr).
    /// - [`Error::Cancelled`] if the cancellation token fired and the process
    ///   did not finish within the grace period.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::trace!(tool = %program_name, args = ?self.args, "Spawning tool");

        let child = cmd
            .spawn()
            .map_err(|e| Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        let wait = tokio::time::timeout(self.timeout, child.wait_with_output());
        tokio::pin!(wait);

        let cancelled = async {
            match &self.cancel {
                Some(token) => {
                    token.cancelled().await;
                    tokio::time::sleep(self.kill_grace).await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        let result = tokio::select! {
            r = &mut wait => r,
            _ = cancelled => {
                tracing::warn!(tool = %program_name, "Killing tool after cancellation grace period");
                return Err(Error::Cancelled);
            }
        };

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(Error::tool(
                        program_name,
                        format!(
                            "exited with status {}: {}",
                            output.status,
                            stderr_tail(&tool_output.stderr)
                        ),
                    ));
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(Error::tool(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            Err(_elapsed) => Err(Error::tool(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }
}

/// Last few non-empty lines of a tool's stderr; ffmpeg prints its banner first.
fn stderr_tail(stderr: &str) -> String {
    const MAX_LINES: usize = 5;
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    lines[start..].join(" | ")
}
