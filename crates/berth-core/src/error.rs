//! Errors raised by the sandbox lifecycle

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Everything that can go wrong while provisioning or driving a sandbox container
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The configured env file could not be read.
    #[error("failed to read env file {path}: {source}")]
    EnvFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A per-session scope was requested without a usable session key.
    #[error("invalid session key '{0}'")]
    InvalidSessionKey(String),

    /// An environment entry cannot be delivered to an exec channel.
    #[error("environment entry '{key}' cannot be injected: {reason}")]
    InvalidEnvEntry { key: String, reason: &'static str },

    /// The runtime binary could not be spawned at all.
    #[error("failed to spawn container runtime '{binary}': {source}")]
    RuntimeSpawn {
        binary: String,
        source: std::io::Error,
    },

    /// A runtime subcommand ran past its deadline and was killed.
    #[error("container runtime '{subcommand}' timed out after {}s", .timeout.as_secs())]
    RuntimeTimeout {
        subcommand: String,
        timeout: Duration,
    },

    #[error("failed to create container '{name}': {stderr}")]
    ContainerCreation { name: String, stderr: String },

    #[error("failed to start container '{name}': {stderr}")]
    ContainerStart { name: String, stderr: String },

    #[error("failed to remove container '{name}': {stderr}")]
    ContainerRemoval { name: String, stderr: String },

    /// `exec` could not be launched inside the container (runtime-level failure,
    /// not a non-zero exit of the command itself).
    #[error("failed to exec in container '{name}': {stderr}")]
    Exec { name: String, stderr: String },

    /// The registry document could not be persisted.
    #[error("failed to write sandbox registry {path}: {source}")]
    RegistryWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl SandboxError {
    /// Whether the failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, SandboxError::RuntimeTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        let err = SandboxError::RuntimeTimeout {
            subcommand: "create".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "container runtime 'create' timed out after 5s"
        );
    }

    #[test]
    fn test_creation_error_carries_stderr() {
        let err = SandboxError::ContainerCreation {
            name: "berth-sbx-shared".to_string(),
            stderr: "no such image".to_string(),
        };
        assert!(!err.is_transient());
        let msg = err.to_string();
        assert!(msg.contains("berth-sbx-shared"));
        assert!(msg.contains("no such image"));
    }
}
