//! External media tools (`yt-dlp`, `ffmpeg`) run as child processes.

use std::time::Duration;

use tokio::process::Command;

use atomic_core::{Error, Result};

/// Run a command with a timeout, returning stdout as a string.
///
/// `error` builds the error for every failure path (spawn failure, timeout,
/// non-zero exit), so callers choose the taxonomy their stage reports.
pub async fn run_cmd_with_timeout(
    cmd: &mut Command,
    timeout_secs: u64,
    error: fn(String) -> Error,
) -> Result<String> {
    cmd.kill_on_drop(true);
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| error(format!("External command timed out after {}s", timeout_secs)))?
        .map_err(|e| error(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(error(format!(
            "Command failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
