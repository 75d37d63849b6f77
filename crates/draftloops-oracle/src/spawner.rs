use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

use crate::OracleError;

/// Captured result of a spawned oracle process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

/// Utility for running a CLI oracle with the prompt on stdin
pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Spawn a process, feed it `input`, and capture its output
    pub async fn spawn(binary: &Path, args: &[String], input: &str) -> Result<ProcessOutput, OracleError> {
        let start = Instant::now();

        debug!(
            binary = %binary.display(),
            args = ?args,
            input_len = input.len(),
            "Spawning oracle process"
        );

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OracleError::ExecutionFailed("stdin not captured".into()))?;
        let stdout_handle = child
            .stdout
            .take()
            .ok_or_else(|| OracleError::ExecutionFailed("stdout not captured".into()))?;
        let stderr_handle = child
            .stderr
            .take()
            .ok_or_else(|| OracleError::ExecutionFailed("stderr not captured".into()))?;

        // Write on a separate task so a chatty child cannot deadlock us
        let input = input.to_string();
        let writer = tokio::spawn(async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        });

        let mut stdout_reader = BufReader::new(stdout_handle).lines();
        let mut stderr_reader = BufReader::new(stderr_handle).lines();

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            tokio::select! {
                result = stdout_reader.next_line(), if stdout_open => {
                    match result {
                        Ok(Some(line)) => {
                            trace!(line = %line, "stdout");
                            push_line(&mut stdout, &line);
                        }
                        Ok(None) => stdout_open = false,
                        Err(e) => {
                            return Err(OracleError::ExecutionFailed(format!(
                                "Failed to read stdout: {}",
                                e
                            )));
                        }
                    }
                }
                result = stderr_reader.next_line(), if stderr_open => {
                    match result {
                        Ok(Some(line)) => {
                            trace!(line = %line, "stderr");
                            push_line(&mut stderr, &line);
                        }
                        Ok(None) => stderr_open = false,
                        Err(e) => {
                            return Err(OracleError::ExecutionFailed(format!(
                                "Failed to read stderr: {}",
                                e
                            )));
                        }
                    }
                }
            }
        }

        let status = child.wait().await.map_err(wait_failed)?;
        let duration = start.elapsed();

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Oracle process closed stdin early"),
            Err(e) => debug!(error = %e, "Stdin writer task failed"),
        }

        debug!(
            exit_code = status.code().unwrap_or(-1),
            duration_ms = duration.as_millis(),
            "Oracle process completed"
        );

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
            duration,
        })
    }
}

/// A failed wait after a successful spawn
fn wait_failed(e: std::io::Error) -> OracleError {
    OracleError::ExecutionFailed(format!("Failed to wait for process: {}", e))
}

fn push_line(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_spawn_echoes_stdin() {
        let output = ProcessSpawner::spawn(&PathBuf::from("cat"), &[], "line one\nline two")
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "line one\nline two");
        assert!(output.stderr.is_empty());
    }

    #[test]
    fn test_wait_failure_is_retryable() {
        let err = wait_failed(std::io::Error::new(std::io::ErrorKind::Interrupted, "wait"));
        assert!(matches!(err, OracleError::ExecutionFailed(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let result =
            ProcessSpawner::spawn(&PathBuf::from("definitely-not-a-real-binary-xyz"), &[], "").await;
        assert!(matches!(result, Err(OracleError::SpawnFailed(_))));
    }
}
