use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::daemon::DETACHED_MARKER;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// Non-zero exit, signal, or the program could not be started.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout and stderr, interleaved in the order they arrived
    pub output: String,
    pub status: CommandStatus,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String]) -> CommandOutput;
}

/// Runs the program directly (no shell) and waits for it to exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, argv: &[String]) -> CommandOutput {
        let Some((program, args)) = argv.split_first() else {
            return CommandOutput {
                output: String::new(),
                status: CommandStatus::Success,
            };
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_remove(DETACHED_MARKER)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return CommandOutput {
                    output: String::new(),
                    status: CommandStatus::Failed(format!("failed to spawn {program}: {err}")),
                }
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return CommandOutput {
                output: String::new(),
                status: CommandStatus::Failed("child output was not captured".to_string()),
            };
        };

        let captured = match read_interleaved(stdout, stderr).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = child.kill().await;
                return CommandOutput {
                    output: String::new(),
                    status: CommandStatus::Failed(format!("failed to read output of {program}: {err}")),
                };
            }
        };
        let output = String::from_utf8_lossy(&captured).into_owned();

        let status = match child.wait().await {
            Ok(status) if status.success() => CommandStatus::Success,
            Ok(status) => CommandStatus::Failed(status.to_string()),
            Err(err) => CommandStatus::Failed(format!("failed to wait for {program}: {err}")),
        };
        tracing::info!(program = %program, ?status, "command finished");

        CommandOutput { output, status }
    }
}

/// Drain both pipes into one buffer, appending chunks as they become readable.
async fn read_interleaved<O, E>(mut stdout: O, mut stderr: E) -> std::io::Result<Vec<u8>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    let mut out_buf = [0u8; 4096];
    let mut err_buf = [0u8; 4096];
    let (mut out_open, mut err_open) = (true, true);

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => {
                let n = read?;
                if n == 0 {
                    out_open = false;
                } else {
                    captured.extend_from_slice(&out_buf[..n]);
                }
            }
            read = stderr.read(&mut err_buf), if err_open => {
                let n = read?;
                if n == 0 {
                    err_open = false;
                } else {
                    captured.extend_from_slice(&err_buf[..n]);
                }
            }
        }
    }
    Ok(captured)
}
