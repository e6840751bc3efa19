//! Container registry — persisted record of the containers berth created
//!
//! The registry is a cache: the runtime stays authoritative about what is
//! actually running, so a missing or corrupt file reads as empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::config::SandboxScope;
use crate::error::{Result, SandboxError};

/// One managed container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub session_key: String,
    pub scope: SandboxScope,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub image: String,
}

/// On-disk document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub entries: Vec<RegistryEntry>,
}

impl RegistryState {
    pub fn find(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryOp {
    Upsert,
    Remove,
}

/// JSON-file registry with serialized, atomically replaced writes
pub struct ContainerRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ContainerRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `~/.berth/sandbox/registry.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".berth")
            .join("sandbox")
            .join("registry.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all entries. Never fails.
    pub async fn read(&self) -> RegistryState {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return RegistryState::default();
            }
            Err(e) => {
                warn!(
                    "Failed to read sandbox registry {}: {}",
                    self.path.display(),
                    e
                );
                return RegistryState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Sandbox registry {} is corrupt, treating as empty: {}",
                    self.path.display(),
                    e
                );
                RegistryState::default()
            }
        }
    }

    /// Apply an upsert/remove keyed by container name and persist the document
    pub async fn update(&self, entry: &RegistryEntry, op: RegistryOp) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut state = self.read().await;
        state.entries.retain(|e| e.name != entry.name);
        if op == RegistryOp::Upsert {
            state.entries.push(entry.clone());
        }

        self.write(&state).await?;
        debug!(
            "Registry {:?} '{}' ({} entries)",
            op,
            entry.name,
            state.entries.len()
        );
        Ok(())
    }

    async fn write(&self, state: &RegistryState) -> Result<()> {
        let io_err = |source| SandboxError::RegistryWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "registry.json".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        tokio::fs::write(&tmp, content).await.map_err(io_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(name: &str, session: &str) -> RegistryEntry {
        RegistryEntry {
            name: name.to_string(),
            session_key: session.to_string(),
            scope: SandboxScope::Session,
            created_at: Utc::now(),
            image: "berth-sandbox:bookworm-slim".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ContainerRegistry::new(dir.path().join("registry.json"));
        assert!(registry.read().await.entries.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{ not json").unwrap();
        let registry = ContainerRegistry::new(&path);
        assert!(registry.read().await.entries.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ContainerRegistry::new(dir.path().join("nested").join("registry.json"));
        let e = entry("berth-sbx-a", "a");

        registry.update(&e, RegistryOp::Upsert).await.unwrap();

        let state = registry.read().await;
        assert_eq!(state.entries, vec![e.clone()]);
        assert_eq!(state.find("berth-sbx-a"), Some(&e));
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ContainerRegistry::new(dir.path().join("registry.json"));
        let first = entry("berth-sbx-a", "a");
        let mut second = entry("berth-sbx-a", "a");
        second.image = "other:latest".to_string();

        registry.update(&first, RegistryOp::Upsert).await.unwrap();
        registry.update(&second, RegistryOp::Upsert).await.unwrap();

        let state = registry.read().await;
        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].image, "other:latest");
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ContainerRegistry::new(dir.path().join("registry.json"));
        let a = entry("berth-sbx-a", "a");
        let b = entry("berth-sbx-b", "b");
        registry.update(&a, RegistryOp::Upsert).await.unwrap();
        registry.update(&b, RegistryOp::Upsert).await.unwrap();

        registry.update(&a, RegistryOp::Remove).await.unwrap();

        let state = registry.read().await;
        assert_eq!(state.entries, vec![b]);
    }

    #[tokio::test]
    async fn test_entries_without_image_still_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(
            &path,
            r#"{"entries":[{"name":"n","session_key":"s","scope":"shared","created_at":"2026-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();

        let state = ContainerRegistry::new(&path).read().await;
        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].scope, SandboxScope::Shared);
        assert!(state.entries[0].image.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ContainerRegistry::new(dir.path().join("registry.json")));

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let e = entry(&format!("berth-sbx-{}", i), &i.to_string());
                registry.update(&e, RegistryOp::Upsert).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(registry.read().await.entries.len(), 16);
        // no temp files left behind
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
    }
}
