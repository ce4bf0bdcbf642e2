//! External command execution
//!
//! Capabilities shell out to `helm` and installer scripts. The runner is a
//! trait so tests can script the outputs.

use crate::error::InstallCause;
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a program to completion
///
/// A missing program surfaces as [`io::ErrorKind::NotFound`] and an
/// expired timeout as [`io::ErrorKind::TimedOut`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> io::Result<CommandOutput>;
}

/// Runs commands on the local machine
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> io::Result<CommandOutput> {
        debug!(program = %program, args = ?args, "Running command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} did not finish within {:?}", program, timeout),
                ))
            }
        };

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Render an argv for error messages
pub(crate) fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command and turn anything but a zero exit into an [`InstallCause`]
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutput, InstallCause> {
    let command = display_command(program, args);
    let output = runner
        .run(program, args, timeout)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => InstallCause::CommandTimeout {
                command: command.clone(),
                timeout,
            },
            io::ErrorKind::NotFound => InstallCause::Command {
                command: command.clone(),
                status: "not found".to_string(),
                stderr: e.to_string(),
            },
            _ => InstallCause::Command {
                command: command.clone(),
                status: "spawn failure".to_string(),
                stderr: e.to_string(),
            },
        })?;

    if !output.success() {
        let status = match output.code {
            Some(code) => format!("exit code {}", code),
            None => "a signal".to_string(),
        };
        return Err(InstallCause::Command {
            command,
            status,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}
