// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Recursor cache invalidation and authdns cleanup.
//!
//! After a switch the recursors would keep serving the old answer until the TTL expires,
//! so the affected names are wiped from their caches. All names of a batch are wiped
//! with a single `rec_control` invocation per host.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::{CONFD_TEMPLATE_STATE_DIR, EMERGENCY_WIPE_ROUNDS};
use crate::dns_errors::RemoteError;
use crate::metrics;
use crate::remote::RemoteCommandExecutor;

/// Something able to wipe names out of the recursor caches.
#[async_trait]
pub trait CacheWipeTrigger: Send + Sync {
    /// Wipe the given fully qualified names.
    async fn wipe_records(&self, names: &[String]) -> Result<(), RemoteError>;

    /// Wipe everything under the discovery zone.
    async fn wipe_zone(&self) -> Result<(), RemoteError>;
}

/// Cache invalidation through `rec_control` on the recursor fleet.
#[derive(Clone)]
pub struct CacheInvalidator {
    executor: Arc<dyn RemoteCommandExecutor>,
    recursor_hosts: String,
    authdns_hosts: String,
    zone: String,
}

impl CacheInvalidator {
    #[must_use]
    pub fn new(
        executor: Arc<dyn RemoteCommandExecutor>,
        recursor_hosts: &str,
        authdns_hosts: &str,
        zone: &str,
    ) -> Self {
        Self {
            executor,
            recursor_hosts: recursor_hosts.to_string(),
            authdns_hosts: authdns_hosts.to_string(),
            zone: zone.trim_matches('.').to_string(),
        }
    }

    /// Wipe a batch of names in one round.
    ///
    /// # Errors
    ///
    /// Returns an error if the command failed on any recursor.
    pub async fn wipe_for(&self, names: &[String]) -> Result<(), RemoteError> {
        if names.is_empty() {
            return Ok(());
        }
        let command = format!("sudo rec_control wipe-cache {}", names.join(" "));
        info!(records = %names.join(", "), "Wiping recursor caches");
        self.executor
            .run_on_hosts(&self.recursor_hosts, &command)
            .await?;
        metrics::record_cache_wipe("records");
        Ok(())
    }

    /// Blind wipe of the whole zone, repeated with `interval` in between.
    ///
    /// # Errors
    ///
    /// Stops at the first failed round.
    pub async fn emergency_wipe(&self, interval: Duration) -> Result<(), RemoteError> {
        for round in 1..=EMERGENCY_WIPE_ROUNDS {
            if round > 1 {
                debug!(secs = interval.as_secs(), "Sleeping before the next wipe");
                tokio::time::sleep(interval).await;
            }
            info!(round, zone = %self.zone, "Wiping the whole discovery zone");
            self.wipe_zone().await?;
        }
        Ok(())
    }

    /// Remove stale confd error markers left by an active/passive switch.
    ///
    /// # Errors
    ///
    /// Returns an error if the command failed on any authoritative server.
    pub async fn clean_transition_markers(&self, name: &str) -> Result<(), RemoteError> {
        let command = format!("rm -fv {CONFD_TEMPLATE_STATE_DIR}/.discovery-{name}.state*.err");
        debug!(record = %name, "Cleaning stale discovery template markers");
        self.executor
            .run_on_hosts(&self.authdns_hosts, &command)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl CacheWipeTrigger for CacheInvalidator {
    async fn wipe_records(&self, names: &[String]) -> Result<(), RemoteError> {
        self.wipe_for(names).await
    }

    async fn wipe_zone(&self) -> Result<(), RemoteError> {
        let command = format!("sudo rec_control wipe-cache '{}$'", self.zone);
        self.executor
            .run_on_hosts(&self.recursor_hosts, &command)
            .await?;
        metrics::record_cache_wipe("zone");
        Ok(())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod cache_tests;
