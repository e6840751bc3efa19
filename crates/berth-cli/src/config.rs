//! Config file loading — `~/.berth/config.toml`

use anyhow::{Context, Result};
use berth_core::sandbox::{ContainerRegistry, SandboxConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BerthConfig {
    pub log_level: String,
    /// Overrides `~/.berth/sandbox/registry.json`
    pub registry_path: Option<PathBuf>,
    pub sandbox: SandboxConfig,
}

impl Default for BerthConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            registry_path: None,
            sandbox: SandboxConfig::default(),
        }
    }
}

impl BerthConfig {
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".berth")
            .join("config.toml")
    }

    /// Load from `path`, or the default location. A missing default file yields
    /// defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry_path
            .clone()
            .unwrap_or_else(ContainerRegistry::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::sandbox::SandboxScope;

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
log_level = "debug"
registry_path = "/var/lib/berth/registry.json"

[sandbox]
scope = "shared"

[sandbox.docker]
image = "agent-sandbox:latest"
"#,
        )
        .unwrap();

        let config = BerthConfig::load(Some(&path)).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.sandbox.scope, SandboxScope::Shared);
        assert_eq!(config.sandbox.docker.image, "agent-sandbox:latest");
        assert_eq!(
            config.registry_path(),
            PathBuf::from("/var/lib/berth/registry.json")
        );
    }

    #[test]
    fn test_missing_explicit_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = BerthConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_invalid_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sandbox = [").unwrap();
        assert!(BerthConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_default_registry_path() {
        let config = BerthConfig::default();
        assert!(config.registry_path().ends_with("sandbox/registry.json"));
    }
}
