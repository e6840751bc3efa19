//! Runtime command driver — runs container-runtime subcommands as child processes

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, SandboxError};

/// Captured result of one runtime invocation. A non-zero exit is not an error
/// at this layer; callers interpret it per subcommand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes runtime subcommands. `args[0]` is the subcommand.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String], stdin: Option<&str>) -> Result<CommandOutput>;
}

/// Observed state of a named container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

/// Spawns the real runtime binary
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CommandRunner for DockerCli {
    async fn run(&self, args: &[String], stdin: Option<&str>) -> Result<CommandOutput> {
        let subcommand = args.first().cloned().unwrap_or_default();
        debug!("{} {}", self.binary, subcommand);

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::RuntimeSpawn {
                binary: self.binary.clone(),
                source,
            })?;

        let pipe = child.stdin.take();
        let completion = async {
            if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
                // A child that exits early closes its end; that surfaces in the exit code
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    warn!("{} {}: failed to write stdin: {}", self.binary, subcommand, e);
                }
                drop(pipe);
            }
            child.wait_with_output().await
        };

        // On timeout the child is dropped with the future, and kill_on_drop reaps it
        match tokio::time::timeout(self.timeout, completion).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(source)) => Err(SandboxError::RuntimeSpawn {
                binary: self.binary.clone(),
                source,
            }),
            Err(_) => {
                warn!(
                    "{} {} timed out after {}s, killed",
                    self.binary,
                    subcommand,
                    self.timeout.as_secs()
                );
                Err(SandboxError::RuntimeTimeout {
                    subcommand,
                    timeout: self.timeout,
                })
            }
        }
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Whether the runtime answers at all
pub async fn is_available(runner: &dyn CommandRunner) -> bool {
    runner
        .run(&args(["version"]), None)
        .await
        .map(|o| o.success())
        .unwrap_or(false)
}

/// `inspect -f {{.State.Running}}`: non-zero exit means the name is unknown
pub async fn inspect_state(runner: &dyn CommandRunner, name: &str) -> Result<ContainerState> {
    let output = runner
        .run(&args(["inspect", "-f", "{{.State.Running}}", name]), None)
        .await?;
    if !output.success() {
        return Ok(ContainerState::Absent);
    }
    Ok(if output.stdout.trim() == "true" {
        ContainerState::Running
    } else {
        ContainerState::Stopped
    })
}

/// True only when inspect prints `true`; every other outcome is false
pub async fn is_running(runner: &dyn CommandRunner, name: &str) -> bool {
    matches!(
        inspect_state(runner, name).await,
        Ok(ContainerState::Running)
    )
}

pub async fn start(runner: &dyn CommandRunner, name: &str) -> Result<CommandOutput> {
    runner.run(&args(["start", name]), None).await
}

pub async fn stop(runner: &dyn CommandRunner, name: &str) -> Result<CommandOutput> {
    runner.run(&args(["stop", name]), None).await
}

pub async fn remove(runner: &dyn CommandRunner, name: &str, force: bool) -> Result<CommandOutput> {
    if force {
        runner.run(&args(["rm", "-f", name]), None).await
    } else {
        runner.run(&args(["rm", name]), None).await
    }
}
