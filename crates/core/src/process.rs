//! Cancellable subprocess execution.

use crate::{Error, Result};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lines of each captured stream kept in failure summaries.
pub const FAILURE_TAIL_LINES: usize = 20;

/// Result of a subprocess whose output was captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Whether the process exited successfully
    pub success: bool,
    /// Captured standard output (lossy UTF-8)
    pub stdout: String,
    /// Captured standard error (lossy UTF-8)
    pub stderr: String,
}

/// Run `command` to completion with stdout and stderr captured.
///
/// The child is killed if `cancel` fires first, and `Cancelled` is returned.
/// A process that cannot be started is a toolchain error.
pub async fn run_captured(mut command: Command, cancel: &CancellationToken) -> Result<CapturedOutput> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let program = command.as_std().get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(%program, "Spawning captured process");
    let child = command.spawn().map_err(|e| {
        Error::toolchain_with_help(
            format!("failed to start '{program}': {e}"),
            "Check that the toolchain is installed and on PATH",
        )
    })?;

    // Dropping the wait future drops the child, which kills it
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!(%program, "Cancelled, killing process");
            Err(Error::Cancelled)
        }
        output = child.wait_with_output() => {
            let output = output.map_err(|e| Error::io_no_path(e, format!("wait for '{program}'")))?;
            Ok(CapturedOutput {
                exit_code: output.status.code(),
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

/// Run `command` with the caller's stdio and return its exit code.
///
/// A child terminated by a signal reports `128 + signal`, as shells do.
/// Failing to start is `ExecutionFailed`; a nonzero exit is not an error.
pub async fn run_inherited(
    mut command: Command,
    binary: &Path,
    cancel: &CancellationToken,
) -> Result<i32> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| Error::execution_failed(binary, e))?;

    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!(binary = %binary.display(), "Cancelled, killing tool");
            // Already exited is fine; kill_on_drop covers the rest
            let _ = child.kill().await;
            Err(Error::Cancelled)
        }
        status = child.wait() => {
            let status = status.map_err(|e| Error::execution_failed(binary, e))?;
            Ok(exit_code_of(status))
        }
    }
}

/// Shell-style exit code for a finished process.
#[must_use]
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Human-readable summary of a failed process: the exit code and the tail
/// of each non-empty stream.
#[must_use]
pub fn summarize_failure(output: &CapturedOutput, max_output_lines: usize) -> String {
    let exit_code = output
        .exit_code
        .map_or_else(|| "unknown".to_string(), |c| c.to_string());

    let mut sections = vec![format!("exit code {exit_code}")];
    let streams: Vec<String> = [("stdout", &output.stdout), ("stderr", &output.stderr)]
        .into_iter()
        .filter_map(|(label, content)| summarize_stream(label, content, max_output_lines))
        .collect();

    if streams.is_empty() {
        sections.push("no output was captured".to_string());
    } else {
        sections.extend(streams);
    }
    sections.join("\n")
}

fn summarize_stream(label: &str, content: &str, max_output_lines: usize) -> Option<String> {
    let normalized = content.trim_end();
    if normalized.is_empty() {
        return None;
    }

    let lines: Vec<&str> = normalized.lines().collect();
    let total = lines.len();
    let start = total.saturating_sub(max_output_lines);
    let snippet = lines[start..].join("\n");

    let header = if total > max_output_lines {
        format!("{label} (last {max_output_lines} of {total} lines):")
    } else {
        format!("{label}:")
    };

    Some(format!("{header}\n{snippet}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_streams_and_status() {
        let out = run_captured(
            sh("echo out; echo err >&2; exit 3"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success);
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn missing_program_is_toolchain_error() {
        let err = run_captured(
            Command::new("bingen-no-such-program"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Toolchain { .. }));
    }

    #[tokio::test]
    async fn cancellation_kills_captured_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = run_captured(sh("sleep 30"), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn inherited_run_reports_exit_code() {
        let binary = Path::new("sh");
        let code = run_inherited(sh("exit 7"), binary, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(code, 7);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_maps_to_shell_exit_code() {
        let binary = Path::new("sh");
        let code = run_inherited(sh("kill -TERM $$"), binary, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(code, 128 + 15);
    }

    #[tokio::test]
    async fn inherited_run_cancels() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_inherited(sh("sleep 30"), Path::new("sh"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn summary_keeps_only_the_tail() {
        let stderr: String = (1..=30).map(|i| format!("line {i}\n")).collect();
        let output = CapturedOutput {
            exit_code: Some(2),
            success: false,
            stdout: String::new(),
            stderr,
        };
        let summary = summarize_failure(&output, FAILURE_TAIL_LINES);
        assert!(summary.starts_with("exit code 2"));
        assert!(summary.contains("stderr (last 20 of 30 lines):"));
        assert!(summary.contains("line 30"));
        assert!(!summary.contains("line 10\n"));
        assert!(!summary.contains("stdout"));
    }

    #[test]
    fn summary_without_output() {
        let output = CapturedOutput {
            exit_code: None,
            success: false,
            stdout: String::new(),
            stderr: "  \n".to_string(),
        };
        let summary = summarize_failure(&output, FAILURE_TAIL_LINES);
        assert_eq!(summary, "exit code unknown\nno output was captured");
    }
}
