//! Worker lifecycle: install, activate, skip-waiting.
//!
//! A worker version moves `Installing → Installed → Activating →
//! Activated`, and becomes `Redundant` when a newer version replaces it.
//! Install pre-populates the static tier; activate purges every tier
//! carrying a stale version suffix, to completion, before this
//! version starts answering clients.

use serde::Serialize;
use vowkeep_core::{CachedEntry, Error, HttpRequest, TierKind};

use crate::bridge::WorkerMessage;
use crate::coordinator::Coordinator;

/// Lifecycle phase of this worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerPhase {
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl Coordinator {
    pub async fn phase(&self) -> WorkerPhase {
        *self.phase.read().await
    }

    async fn set_phase(&self, phase: WorkerPhase) {
        *self.phase.write().await = phase;
        tracing::debug!(?phase, "worker phase changed");
    }

    /// Pre-populate the static tier with the configured precache routes.
    ///
    /// Individual routes failing is survivable, but the offline page is
    /// the floor under every navigation fallback, so install only
    /// succeeds once it is cached.
    pub async fn install(&self) -> Result<(), Error> {
        self.set_phase(WorkerPhase::Installing).await;
        let tier = TierKind::Static.name(&self.config.version_suffix);

        let mut cached = 0usize;
        for route in &self.config.precache_routes {
            let url = match vowkeep_client::net::resolve(self.policy.origin(), route) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(route = %route, error = %e, "unresolvable precache route");
                    continue;
                }
            };
            let request = HttpRequest::get(url);

            match self.net.send(&request).await {
                Ok(response) if response.is_success() => {
                    let entry = CachedEntry::snapshot(tier.clone(), &request, &response);
                    self.db.put_entry(&entry).await?;
                    cached += 1;
                }
                Ok(response) => {
                    if route == &self.config.offline_page {
                        return Err(Error::Network(format!(
                            "offline page precache got status {}",
                            response.status
                        )));
                    }
                    tracing::warn!(route = %route, status = response.status, "precache route not cached");
                }
                Err(e) => {
                    if route == &self.config.offline_page {
                        return Err(e);
                    }
                    tracing::warn!(route = %route, error = %e, "precache route unreachable");
                }
            }
        }

        self.set_phase(WorkerPhase::Installed).await;
        tracing::info!(cached, tier = %tier, "install complete");
        Ok(())
    }

    /// Purge stale tiers, then take control of clients.
    ///
    /// The purge runs to completion before the phase flips to
    /// `Activated`, so no client is ever served out of a tier belonging
    /// to a previous version.
    pub async fn activate(&self) -> Result<(), Error> {
        self.set_phase(WorkerPhase::Activating).await;

        let purged = self.db.purge_stale_tiers(&self.config.version_suffix).await?;

        self.set_phase(WorkerPhase::Activated).await;
        self.bridge
            .send(WorkerMessage::UpdateReady { version: self.config.version_suffix.clone() });
        tracing::info!(purged, version = %self.config.version_suffix, "worker activated");
        Ok(())
    }

    /// Force an installed worker through activation immediately.
    ///
    /// Idempotent: on an already-activated (or still-installing) worker
    /// this is a no-op, so replaying the command changes nothing.
    pub async fn skip_waiting(&self) {
        if self.phase().await != WorkerPhase::Installed {
            tracing::debug!("skip-waiting ignored, no waiting worker");
            return;
        }
        if let Err(e) = self.activate().await {
            tracing::warn!(error = %e, "skip-waiting activation failed");
        }
    }

    /// Mark this version as replaced by a newer one. It stops being a
    /// candidate for activation; durable state belongs to the successor.
    pub async fn retire(&self) {
        self.set_phase(WorkerPhase::Redundant).await;
    }
}
