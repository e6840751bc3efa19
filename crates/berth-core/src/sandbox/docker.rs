//! Docker sandbox — reconcile a long-lived container per session or shared scope

use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::config::{SandboxConfig, SandboxScope};
use super::env::{merge_env_file, sanitize_env_vars_with};
use super::registry::{ContainerRegistry, RegistryEntry, RegistryOp};
use super::runtime::{self, CommandRunner, ContainerState, DockerCli};
use super::secrets::SecretKeyMatcher;
use crate::error::{Result, SandboxError};

/// Suffix used for the single container of a shared scope
const SHARED_SUFFIX: &str = "shared";

/// Longest session slug kept before it is truncated and hashed
const MAX_SLUG_LEN: usize = 48;

/// Mount point of the agent workspace when it differs from the session workspace
const AGENT_WORKSPACE_MOUNT: &str = "/agent";

/// Label put on every container berth creates
pub const SANDBOX_LABEL: &str = "berth.sandbox=1";

/// Who is asking for a container and which host directories it should see
#[derive(Debug, Clone)]
pub struct EnsureRequest {
    pub session_key: String,
    pub workspace_dir: PathBuf,
    pub agent_workspace_dir: PathBuf,
}

impl EnsureRequest {
    pub fn new(
        session_key: impl Into<String>,
        workspace_dir: impl Into<PathBuf>,
        agent_workspace_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session_key: session_key.into(),
            workspace_dir: workspace_dir.into(),
            agent_workspace_dir: agent_workspace_dir.into(),
        }
    }
}

/// Lowercase, runtime-safe slug of a session key. Keys that had to be altered
/// or truncated get a short hash so distinct keys keep distinct names.
///
/// The slug never contains a path separator and never starts with `.`, so it
/// is also safe as a single directory name.
pub fn session_slug(session_key: &str) -> Result<String> {
    let raw = session_key.trim();
    if raw.is_empty() {
        return Err(SandboxError::InvalidSessionKey(session_key.to_string()));
    }

    let mut slug = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            c
        } else {
            '-'
        };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    let mut slug = slug
        .trim_matches(|c| matches!(c, '-' | '.' | '_'))
        .to_string();

    let mut altered = slug != raw;
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('-').to_string();
        altered = true;
    }

    if altered {
        let digest = format!("{:x}", Sha256::digest(raw.as_bytes()));
        if slug.is_empty() {
            slug = digest[..8].to_string();
        } else {
            slug = format!("{}-{}", slug, &digest[..8]);
        }
    }
    Ok(slug)
}

/// Derive the container identity for a session under the configured scope
pub fn container_name(cfg: &SandboxConfig, session_key: &str) -> Result<String> {
    let suffix = match cfg.scope {
        SandboxScope::Shared => SHARED_SUFFIX.to_string(),
        SandboxScope::Session => session_slug(session_key)?,
    };
    Ok(format!("{}{}", cfg.docker.container_prefix, suffix))
}

/// Build the full `create` argv. `env` must already be sanitized.
pub fn build_create_args(
    name: &str,
    cfg: &SandboxConfig,
    env: &[String],
    workspace_dir: &Path,
    agent_workspace_dir: &Path,
) -> Vec<String> {
    let docker = &cfg.docker;
    let mode = cfg.workspace_access.mount_mode();

    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        name.to_string(),
        "--label".to_string(),
        SANDBOX_LABEL.to_string(),
        "--label".to_string(),
        format!("berth.scope={}", cfg.scope),
        "--workdir".to_string(),
        docker.workdir.clone(),
    ];

    if docker.read_only_root {
        args.push("--read-only".to_string());
    }

    for entry in env {
        args.push("--env".to_string());
        args.push(entry.clone());
    }

    args.push("-v".to_string());
    args.push(format!(
        "{}:{}:{}",
        workspace_dir.display(),
        docker.workdir,
        mode
    ));
    if agent_workspace_dir != workspace_dir {
        args.push("-v".to_string());
        args.push(format!(
            "{}:{}:{}",
            agent_workspace_dir.display(),
            AGENT_WORKSPACE_MOUNT,
            mode
        ));
    }

    for path in &docker.tmpfs {
        args.push("--tmpfs".to_string());
        args.push(path.clone());
    }

    if !docker.network.is_empty() {
        args.push("--network".to_string());
        args.push(docker.network.clone());
    }

    for cap in &docker.cap_drop {
        args.push("--cap-drop".to_string());
        args.push(cap.clone());
    }

    args.push("--security-opt".to_string());
    args.push("no-new-privileges".to_string());

    args.push(docker.image.clone());
    args.push("sleep".to_string());
    args.push("infinity".to_string());
    args
}

/// Owns the runtime driver, the registry and the per-identity locks
pub struct SandboxManager {
    runner: Arc<dyn CommandRunner>,
    registry: Arc<ContainerRegistry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SandboxManager {
    pub fn new(runner: Arc<dyn CommandRunner>, registry: Arc<ContainerRegistry>) -> Self {
        Self {
            runner,
            registry,
            locks: DashMap::new(),
        }
    }

    /// Manager driving the real runtime binary named in config
    pub fn from_config(cfg: &SandboxConfig, registry_path: impl Into<PathBuf>) -> Self {
        let runner = DockerCli::new(cfg.docker.binary.clone(), cfg.docker.command_timeout());
        Self::new(
            Arc::new(runner),
            Arc::new(ContainerRegistry::new(registry_path)),
        )
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    fn identity_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_identity_lock(&self, name: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks.remove_if(name, |_, l| Arc::strong_count(l) == 1);
    }

    /// Guarantee a running container for this session exists and return its name.
    ///
    /// `cfg.docker.env` is merged with the env file as a side effect, so callers
    /// can read the full environment afterwards for exec-time injection.
    pub async fn ensure_sandbox_container(
        &self,
        request: &EnsureRequest,
        cfg: &mut SandboxConfig,
    ) -> Result<String> {
        let name = container_name(cfg, &request.session_key)?;
        let lock = self.identity_lock(&name);
        let result = {
            let _guard = lock.lock().await;
            self.reconcile(&name, request, cfg).await
        };
        self.release_identity_lock(&name, lock);
        result.map(|()| name)
    }

    async fn reconcile(
        &self,
        name: &str,
        request: &EnsureRequest,
        cfg: &mut SandboxConfig,
    ) -> Result<()> {
        // Every caller reads the merged env afterwards, reused container or not
        merge_env_file(cfg).await?;
        let registered = self.registry.read().await.find(name).cloned();

        match runtime::inspect_state(self.runner(), name).await? {
            ContainerState::Running => {
                if registered.is_none() {
                    debug!("Adopting running container '{}' into registry", name);
                    self.record(name, request, cfg).await;
                }
                return Ok(());
            }
            ContainerState::Stopped => {
                info!("Container '{}' exists but is stopped, recreating", name);
                let output = runtime::remove(self.runner(), name, true).await?;
                if !output.success() {
                    return Err(SandboxError::ContainerRemoval {
                        name: name.to_string(),
                        stderr: output.stderr.trim().to_string(),
                    });
                }
            }
            ContainerState::Absent => {
                if registered.is_some() {
                    debug!("Registered container '{}' is gone from the runtime", name);
                }
            }
        }

        let matcher = SecretKeyMatcher::with_extra(&cfg.docker.secret_env);
        let env = sanitize_env_vars_with(&cfg.docker.env, &matcher);
        debug!(
            "Container '{}': passing {} of {} env vars on create",
            name,
            env.len(),
            cfg.docker.env.len()
        );

        let args = build_create_args(
            name,
            cfg,
            &env,
            &request.workspace_dir,
            &request.agent_workspace_dir,
        );
        let output = self.runner.run(&args, None).await?;
        if !output.success() {
            return Err(SandboxError::ContainerCreation {
                name: name.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        let output = runtime::start(self.runner(), name).await?;
        if !output.success() {
            // Leave nothing half-made behind
            if let Err(e) = runtime::remove(self.runner(), name, true).await {
                warn!("Failed to clean up unstarted container '{}': {}", name, e);
            }
            return Err(SandboxError::ContainerStart {
                name: name.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        info!("Started sandbox container '{}' ({})", name, cfg.docker.image);
        self.record(name, request, cfg).await;
        Ok(())
    }

    /// Upsert the registry entry. The container is already running, so a
    /// registry write failure only costs us reuse/prune bookkeeping.
    async fn record(&self, name: &str, request: &EnsureRequest, cfg: &SandboxConfig) {
        let entry = RegistryEntry {
            name: name.to_string(),
            session_key: request.session_key.clone(),
            scope: cfg.scope,
            created_at: Utc::now(),
            image: cfg.docker.image.clone(),
        };
        if let Err(e) = self.registry.update(&entry, RegistryOp::Upsert).await {
            warn!("Failed to record container '{}': {}", name, e);
        }
    }

    /// Stop and delete the container behind a registry snapshot, unless the
    /// entry was replaced or dropped since the snapshot was taken. Returns
    /// whether anything was removed.
    pub(crate) async fn destroy_if_current(&self, entry: &RegistryEntry) -> Result<bool> {
        let lock = self.identity_lock(&entry.name);
        let result = {
            let _guard = lock.lock().await;
            let current = self
                .registry
                .read()
                .await
                .find(&entry.name)
                .map(|e| e.created_at);
            if current == Some(entry.created_at) {
                self.destroy_unlocked(entry).await.map(|()| true)
            } else {
                debug!("Container '{}' changed since it was selected, skipping", entry.name);
                Ok(false)
            }
        };
        self.release_identity_lock(&entry.name, lock);
        result
    }

    async fn destroy_unlocked(&self, entry: &RegistryEntry) -> Result<()> {
        let name = entry.name.as_str();
        if runtime::inspect_state(self.runner(), name).await? != ContainerState::Absent {
            let stopped = runtime::stop(self.runner(), name).await?;
            if !stopped.success() {
                debug!(
                    "stop '{}' exited {}: {}",
                    name,
                    stopped.exit_code,
                    stopped.stderr.trim()
                );
            }
            let removed = runtime::remove(self.runner(), name, false).await?;
            if !removed.success() {
                return Err(SandboxError::ContainerRemoval {
                    name: name.to_string(),
                    stderr: removed.stderr.trim().to_string(),
                });
            }
        }
        self.registry.update(entry, RegistryOp::Remove).await
    }

    /// Explicit teardown of the container serving `session_key`
    pub async fn remove_sandbox_container(
        &self,
        session_key: &str,
        cfg: &SandboxConfig,
    ) -> Result<()> {
        let name = container_name(cfg, session_key)?;
        let lock = self.identity_lock(&name);
        let result = {
            let _guard = lock.lock().await;
            let entry = self
                .registry
                .read()
                .await
                .find(&name)
                .cloned()
                .unwrap_or_else(|| RegistryEntry {
                    name: name.clone(),
                    session_key: session_key.to_string(),
                    scope: cfg.scope,
                    created_at: Utc::now(),
                    image: cfg.docker.image.clone(),
                });
            self.destroy_unlocked(&entry).await
        };
        self.release_identity_lock(&name, lock);
        result?;
        info!("Removed sandbox container '{}'", name);
        Ok(())
    }
}
