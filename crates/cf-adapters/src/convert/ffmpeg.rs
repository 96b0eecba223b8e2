//! Shared ffmpeg plumbing: duration probing and `-progress` parsing.

use std::path::Path;

use crate::command::ToolCommand;
use crate::progress::ProgressSender;
use crate::tools::ToolRegistry;

/// Probe the container duration in seconds. Returns `None` when ffprobe is
/// missing or cannot determine it; progress is then left indeterminate.
pub(crate) async fn probe_duration(tools: &ToolRegistry, input: &Path) -> Option<f64> {
    let ffprobe = tools.require("ffprobe").ok()?;
    let mut cmd = ffprobe.command();
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]);
    cmd.arg(input.to_string_lossy().as_ref());

    match cmd.execute().await {
        Ok(output) => parse_duration(&output.stdout_text()),
        Err(e) => {
            tracing::debug!(error = %e, "ffprobe could not determine duration");
            None
        }
    }
}

fn parse_duration(text: &str) -> Option<f64> {
    text.lines()
        .find_map(|l| l.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Run a prepared ffmpeg command, translating its `-progress pipe:2` output
/// into percentages against `duration_secs`.
///
/// The command must already carry `-progress pipe:2 -nostats`.
pub(crate) async fn run_with_progress(
    cmd: &ToolCommand,
    duration_secs: Option<f64>,
    progress: &ProgressSender,
) -> cf_core::Result<()> {
    let mut last_out_time_us: Option<i64> = None;

    cmd.execute_with_stderr_callback(|line| {
        if let Some(val) = line.strip_prefix("out_time_us=") {
            last_out_time_us = val.trim().parse::<i64>().ok();
        } else if let Some(state) = line.strip_prefix("progress=") {
            // End of a progress block.
            if let Some(pct) = percent(last_out_time_us, duration_secs) {
                progress.send(pct, "encoding");
            }
            if state.trim() == "end" {
                progress.send(100.0, "encoded");
            }
        }
    })
    .await?;

    Ok(())
}

fn percent(out_time_us: Option<i64>, duration_secs: Option<f64>) -> Option<f32> {
    let (out_us, dur) = (out_time_us?, duration_secs?);
    if dur <= 0.0 || out_us < 0 {
        return None;
    }
    let elapsed_secs = out_us as f64 / 1_000_000.0;
    Some(((elapsed_secs / dur).clamp(0.0, 1.0) * 100.0) as f32)
}

/// Base ffmpeg invocation: overwrite, machine-readable progress, input.
pub(crate) fn base_command(tools: &ToolRegistry, input: &Path) -> cf_core::Result<ToolCommand> {
    let ffmpeg = tools.require("ffmpeg")?;
    let mut cmd = ffmpeg.command();
    cmd.args(["-y", "-progress", "pipe:2", "-nostats", "-i"]);
    cmd.arg(input.to_string_lossy().as_ref());
    Ok(cmd)
}
