//! Pruner — best-effort removal of old or excess sandbox containers

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SandboxPruneConfig;
use super::docker::SandboxManager;
use super::registry::RegistryEntry;

/// A container that could not be removed
#[derive(Debug, Clone, Serialize)]
pub struct PruneFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of one prune pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub removed: Vec<RegistryEntry>,
    pub failures: Vec<PruneFailure>,
}

impl PruneReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Entries violating the age or count policy, oldest first
pub fn select_victims(
    entries: &[RegistryEntry],
    policy: &SandboxPruneConfig,
    now: DateTime<Utc>,
) -> Vec<RegistryEntry> {
    let mut sorted: Vec<&RegistryEntry> = entries.iter().collect();
    // newest first
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let max_age_secs = policy.max_age_hours.saturating_mul(3600);
    let mut victims: Vec<RegistryEntry> = sorted
        .iter()
        .enumerate()
        .filter(|(index, entry)| {
            let age_secs = now.signed_duration_since(entry.created_at).num_seconds();
            let too_old = policy.max_age_hours > 0
                && u64::try_from(age_secs).is_ok_and(|age| age > max_age_secs);
            let excess = policy.max_containers > 0 && *index >= policy.max_containers;
            too_old || excess
        })
        .map(|(_, entry)| (*entry).clone())
        .collect();

    victims.reverse();
    victims
}

impl SandboxManager {
    /// Remove every registered container that violates `policy`. One failed
    /// removal does not stop the rest of the batch.
    pub async fn prune(&self, policy: &SandboxPruneConfig) -> PruneReport {
        let state = self.registry().read().await;
        let victims = select_victims(&state.entries, policy, Utc::now());

        let mut report = PruneReport::default();
        if victims.is_empty() {
            debug!("Prune: nothing to remove ({} entries)", state.entries.len());
            return report;
        }

        for entry in victims {
            match self.destroy_if_current(&entry).await {
                Ok(true) => {
                    info!("Pruned sandbox container '{}'", entry.name);
                    report.removed.push(entry);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to prune sandbox container '{}': {}", entry.name, e);
                    report.failures.push(PruneFailure {
                        name: entry.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

/// Run `prune` every `policy.interval_secs` until `cancel` fires.
/// Returns `None` when the interval is 0.
pub fn spawn_prune_loop(
    manager: Arc<SandboxManager>,
    policy: SandboxPruneConfig,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    if policy.interval_secs == 0 {
        return None;
    }
    let period = Duration::from_secs(policy.interval_secs);

    Some(tokio::spawn(async move {
        info!("Sandbox prune loop started (every {}s)", policy.interval_secs);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {
                    let report = manager.prune(&policy).await;
                    if !report.removed.is_empty() || !report.failures.is_empty() {
                        info!(
                            "Sandbox prune: {} removed, {} failed",
                            report.removed.len(),
                            report.failures.len()
                        );
                    }
                }
            }
        }
        debug!("Sandbox prune loop stopped");
    }))
}
