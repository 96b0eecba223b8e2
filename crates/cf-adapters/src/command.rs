//! Running an external converter: argument building, pipe capture, timeout.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Used when the caller does not set one; registry commands override it.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Captured standard output, raw bytes (dcraw and pdftotext write their
    /// results here).
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    /// Standard output decoded as lossy UTF-8.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// An external tool invocation.
///
/// # Example
///
/// ```no_run
/// use cf_adapters::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> cf_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "error", "-show_entries", "format=duration"])
///     .arg("/path/to/clip.mp4")
///     .execute()
///     .await?;
/// println!("{}", output.stdout_text());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run to completion. Spawn failures, timeouts and non-zero exits are
    /// all [`cf_core::Error::Tool`]; the last stderr lines go in the message.
    pub async fn execute(&self) -> cf_core::Result<ToolOutput> {
        self.execute_with_stderr_callback(|_| {}).await
    }

    /// Execute the command, invoking `on_line` for every line written to
    /// stderr as it arrives. Stdout is collected concurrently so neither pipe
    /// can fill up and stall the child.
    pub async fn execute_with_stderr_callback(
        &self,
        mut on_line: impl FnMut(&str) + Send,
    ) -> cf_core::Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(tool = %program_name, args = ?self.args, "spawning tool");

        let mut child = cmd.spawn().map_err(|e| {
            cf_core::Error::tool(program_name.clone(), format!("failed to spawn: {e}"))
        })?;

        let (Some(mut stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(cf_core::Error::tool(
                program_name,
                "stdout/stderr pipes were not captured",
            ));
        };

        let run = async {
            let read_stdout = async {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).await.map(|_| buf)
            };
            let read_stderr = async {
                let mut collected = String::new();
                let mut lines = BufReader::new(stderr).lines();
                while let Some(line) = lines.next_line().await? {
                    on_line(&line);
                    collected.push_str(&line);
                    collected.push('\n');
                }
                Ok::<_, std::io::Error>(collected)
            };
            let (stdout, stderr) = tokio::try_join!(read_stdout, read_stderr)?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(ToolOutput {
                status,
                stdout,
                stderr,
            })
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    return Err(cf_core::Error::tool(
                        program_name,
                        format!(
                            "exited with status {}: {}",
                            output.status,
                            last_lines(&output.stderr, 5)
                        ),
                    ));
                }
                Ok(output)
            }
            Ok(Err(e)) => Err(cf_core::Error::tool(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            // The child is killed when it is dropped (`kill_on_drop`).
            Err(_elapsed) => Err(cf_core::Error::tool(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }
}

/// The last `n` non-empty lines of `text`, joined with `; `.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stderr_lines_reach_callback() {
        let mut seen = Vec::new();
        let result = ToolCommand::new(PathBuf::from("sh"))
            .args(["-c", "echo one >&2; echo two >&2; printf out"])
            .execute_with_stderr_callback(|line| seen.push(line.to_string()))
            .await;

        if let Ok(out) = result {
            assert_eq!(seen, vec!["one".to_string(), "two".to_string()]);
            assert_eq!(out.stdout, b"out");
        }
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let result = ToolCommand::new(PathBuf::from("sh"))
            .args(["-c", "echo broken input >&2; exit 3"])
            .execute()
            .await;

        if let Err(cf_core::Error::Tool { tool, message }) = result {
            assert_eq!(tool, "sh");
            assert!(message.contains("broken input"), "unexpected message: {message}");
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_tool_error() {
        let result = ToolCommand::new(PathBuf::from("/nonexistent/pdftoppm"))
            .execute()
            .await;
        assert!(matches!(result, Err(cf_core::Error::Tool { ref tool, .. }) if tool == "pdftoppm"));
    }

    #[tokio::test]
    async fn slow_tool_is_killed_at_timeout() {
        let started = std::time::Instant::now();
        let result = ToolCommand::new(PathBuf::from("sleep"))
            .arg("30")
            .timeout(Duration::from_millis(100))
            .execute()
            .await;
        let message = result.unwrap_err().to_string();
        assert!(
            message.contains("timed out") || message.contains("failed to spawn"),
            "unexpected error: {message}"
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn last_lines_trims_and_limits() {
        assert_eq!(last_lines("a\n\nb\nc\n", 2), "b; c");
        assert_eq!(last_lines("", 3), "");
    }
}
