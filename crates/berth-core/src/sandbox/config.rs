//! Sandbox configuration — what container to run and how to wire it up

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::policy::SandboxToolPolicy;

/// Which tool invocations run inside the sandbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    #[default]
    All,
    Selected,
    None,
}

/// Whether one container serves every session or each session gets its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxScope {
    Shared,
    #[default]
    #[serde(alias = "per-session")]
    Session,
}

impl std::fmt::Display for SandboxScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxScope::Shared => write!(f, "shared"),
            SandboxScope::Session => write!(f, "session"),
        }
    }
}

/// Mount mode for the workspaces inside the container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceAccess {
    #[default]
    Ro,
    Rw,
}

impl WorkspaceAccess {
    /// Suffix used in `-v host:container:<mode>`
    pub fn mount_mode(&self) -> &'static str {
        match self {
            WorkspaceAccess::Ro => "ro",
            WorkspaceAccess::Rw => "rw",
        }
    }
}

/// Container runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerRuntimeConfig {
    /// Runtime executable, `docker` or a CLI-compatible replacement
    pub binary: String,
    pub image: String,
    pub container_prefix: String,
    pub workdir: String,
    pub read_only_root: bool,
    pub tmpfs: Vec<String>,
    pub network: String,
    pub cap_drop: Vec<String>,
    /// Merged environment. Secrets stay here for exec-time injection even though
    /// they never reach the `create` command line.
    pub env: IndexMap<String, String>,
    pub env_file: Option<PathBuf>,
    /// Extra secret names or `*` patterns on top of the built-in set
    pub secret_env: Vec<String>,
    pub command_timeout_secs: u64,
}

impl Default for DockerRuntimeConfig {
    fn default() -> Self {
        let mut env = IndexMap::new();
        env.insert("LANG".to_string(), "C.UTF-8".to_string());
        Self {
            binary: "docker".to_string(),
            image: "berth-sandbox:bookworm-slim".to_string(),
            container_prefix: "berth-sbx-".to_string(),
            workdir: "/workspace".to_string(),
            read_only_root: true,
            tmpfs: vec!["/tmp".to_string(), "/var/tmp".to_string(), "/run".to_string()],
            network: "none".to_string(),
            cap_drop: vec!["ALL".to_string()],
            env,
            env_file: None,
            secret_env: Vec::new(),
            command_timeout_secs: 60,
        }
    }
}

impl DockerRuntimeConfig {
    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

/// Browser-in-container support; carried for collaborators, not acted on here
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxBrowserConfig {
    pub enabled: bool,
    pub image: Option<String>,
}

/// Thresholds for removing managed containers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxPruneConfig {
    /// Remove containers older than this many hours (0 disables)
    pub max_age_hours: u64,
    /// Keep at most this many containers, newest first (0 disables)
    pub max_containers: usize,
    /// Background prune period in seconds (0 disables the loop)
    pub interval_secs: u64,
}

impl Default for SandboxPruneConfig {
    fn default() -> Self {
        Self {
            max_age_hours: 24 * 7,
            max_containers: 32,
            interval_secs: 600,
        }
    }
}

/// Per-run sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub mode: SandboxMode,
    pub scope: SandboxScope,
    pub workspace_access: WorkspaceAccess,
    pub workspace_root: PathBuf,
    pub docker: DockerRuntimeConfig,
    pub browser: SandboxBrowserConfig,
    pub tools: SandboxToolPolicy,
    pub prune: SandboxPruneConfig,
}

fn default_workspace_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".berth")
        .join("sandboxes")
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: SandboxMode::default(),
            scope: SandboxScope::default(),
            workspace_access: WorkspaceAccess::default(),
            workspace_root: default_workspace_root(),
            docker: DockerRuntimeConfig::default(),
            browser: SandboxBrowserConfig::default(),
            tools: SandboxToolPolicy::default(),
            prune: SandboxPruneConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_config_default() {
        let config = SandboxConfig::default();
        assert_eq!(config.mode, SandboxMode::All);
        assert_eq!(config.scope, SandboxScope::Session);
        assert_eq!(config.workspace_access, WorkspaceAccess::Ro);
        assert_eq!(config.docker.binary, "docker");
        assert_eq!(config.docker.network, "none");
        assert_eq!(config.docker.env.get("LANG").map(String::as_str), Some("C.UTF-8"));
        assert!(config.workspace_root.ends_with(".berth/sandboxes"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: SandboxConfig = toml::from_str(
            r#"
            scope = "shared"
            workspace_access = "rw"

            [docker]
            image = "custom:latest"
            env_file = "/etc/berth/sandbox.env"

            [docker.env]
            FOO = "bar"
            "#,
        )
        .unwrap();

        assert_eq!(config.scope, SandboxScope::Shared);
        assert_eq!(config.workspace_access, WorkspaceAccess::Rw);
        assert_eq!(config.docker.image, "custom:latest");
        assert_eq!(config.docker.container_prefix, "berth-sbx-");
        assert_eq!(
            config.docker.env_file.as_deref(),
            Some(std::path::Path::new("/etc/berth/sandbox.env"))
        );
        // An explicit table replaces the default env rather than merging into it
        assert_eq!(config.docker.env.len(), 1);
        assert_eq!(config.prune.max_containers, 32);
    }

    #[test]
    fn test_scope_accepts_per_session_alias() {
        let scope: SandboxScope = serde_json::from_str("\"per-session\"").unwrap();
        assert_eq!(scope, SandboxScope::Session);
        assert_eq!(serde_json::to_string(&scope).unwrap(), "\"session\"");
    }

    #[test]
    fn test_command_timeout_floor() {
        let docker = DockerRuntimeConfig {
            command_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(docker.command_timeout(), std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_mount_mode() {
        assert_eq!(WorkspaceAccess::Ro.mount_mode(), "ro");
        assert_eq!(WorkspaceAccess::Rw.mount_mode(), "rw");
    }
}
