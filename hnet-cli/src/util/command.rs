use anyhow::{Result, anyhow};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::{process::Output, time::Duration};
use tokio::process::Command;
use tokio::time::timeout;

/// Run a command to completion, giving up after `timeout_duration`.
pub async fn safe_run_command(mut cmd: Command, timeout_duration: Duration) -> Result<Output> {
    cmd.kill_on_drop(true);
    match timeout(timeout_duration, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) => Err(anyhow!("I/O error while running command: {}", err)),
        Err(_) => Err(anyhow!("Command timed out")),
    }
}

/// Resolve `name` against `PATH` (or as a literal path when it contains a separator).
pub fn find_binary(name: &str) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        let p = PathBuf::from(name);
        return fs::metadata(&p).is_ok().then_some(p);
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| fs::metadata(p).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary() {
        assert!(find_binary("definitely-not-a-real-binary-name").is_none());
        assert!(find_binary("/nonexistent/dir/tool").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_safe_run_command_captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo fc94"]);
        let output = safe_run_command(cmd, Duration::from_secs(5)).await.unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "fc94");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_safe_run_command_times_out() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let err = safe_run_command(cmd, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
