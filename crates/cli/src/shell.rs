/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use async_trait::async_trait;
use request_controller::ShellRunner;
use std::time::Duration;
use tokio::process::Command;

/// Runs a pattern-planner probe step as `sh -c <command>`, killing it if
/// it outlives `timeout` (spec §5's "shell sub-process 30 s").
pub struct TokioShellRunner;

#[async_trait]
impl ShellRunner for TokioShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String, String> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| format!("command timed out after {timeout:?}: {command}"))?
            .map_err(|e| format!("failed to spawn {command:?}: {e}"))?;

        if !output.status.success() {
            return Err(format!(
                "{command:?} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let out = TokioShellRunner
            .run("echo hello", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let err = TokioShellRunner
            .run("exit 7", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.contains("exit"));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let err = TokioShellRunner
            .run("sleep 2", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.contains("timed out"));
    }
}
