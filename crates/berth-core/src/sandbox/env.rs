//! Environment merging and sanitization
//!
//! `merge_env_file` is the only place that mutates `docker.env`. The merged map
//! keeps secrets for exec-time injection; `sanitize_env_vars` produces the
//! subset that is safe to put on a `create` command line.

use indexmap::IndexMap;
use tracing::debug;

use super::config::SandboxConfig;
use super::secrets::SecretKeyMatcher;
use crate::error::{Result, SandboxError};

/// Parse `KEY=VALUE` lines. Values are literal text after the first `=`.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Merge `docker.env_file` into `docker.env`. Keys already present win.
pub async fn merge_env_file(config: &mut SandboxConfig) -> Result<()> {
    let Some(path) = config.docker.env_file.clone() else {
        return Ok(());
    };

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| SandboxError::EnvFileRead {
            path: path.clone(),
            source,
        })?;

    let mut added = 0usize;
    for (key, value) in parse_env_file(&content) {
        if !config.docker.env.contains_key(&key) {
            config.docker.env.insert(key, value);
            added += 1;
        }
    }

    debug!(
        "Merged env file {}: {} new keys, {} total",
        path.display(),
        added,
        config.docker.env.len()
    );
    Ok(())
}

/// `KEY=VALUE` entries safe for process arguments, using the built-in secret set
pub fn sanitize_env_vars(env: &IndexMap<String, String>) -> Vec<String> {
    sanitize_env_vars_with(env, &SecretKeyMatcher::default())
}

/// Same as [`sanitize_env_vars`] with a caller-supplied matcher
pub fn sanitize_env_vars_with(
    env: &IndexMap<String, String>,
    matcher: &SecretKeyMatcher,
) -> Vec<String> {
    env.iter()
        .filter(|(key, _)| !matcher.is_secret(key))
        .map(|(key, value)| format!("{}={}", key, value))
        .collect()
}
