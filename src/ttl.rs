// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TTL management for discovery records.
//!
//! Before switching traffic the TTL of the affected records is lowered, and the
//! engine waits for the old TTL to expire everywhere. Once the switch is done the
//! TTL is restored.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::confctl::ControlPlaneClient;
use crate::dns::ResolverClient;
use crate::dns_errors::{CheckError, ReconcileError};

/// Reads and writes discovery record TTLs.
#[derive(Clone)]
pub struct TtlManager {
    control_plane: Arc<dyn ControlPlaneClient>,
    resolver: Arc<dyn ResolverClient>,
    zone: String,
}

impl TtlManager {
    #[must_use]
    pub fn new(
        control_plane: Arc<dyn ControlPlaneClient>,
        resolver: Arc<dyn ResolverClient>,
        zone: &str,
    ) -> Self {
        Self {
            control_plane,
            resolver,
            zone: zone.trim_matches('.').to_string(),
        }
    }

    /// Highest TTL currently served for `name` by any authoritative nameserver.
    ///
    /// # Errors
    ///
    /// Returns an error if the name can't be resolved.
    pub async fn current_ttl(&self, name: &str) -> Result<u32, ReconcileError> {
        let fqdn = format!("{name}.{}", self.zone);
        let answers = self
            .resolver
            .resolve(&fqdn)
            .await
            .map_err(CheckError::from)?;
        Ok(answers.iter().map(|a| a.ttl).max().unwrap_or(0))
    }

    /// Set the TTL of `name` to `ttl`, returning the previous TTL.
    ///
    /// Nothing is written if the served TTL already matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the name can't be resolved or the write fails.
    pub async fn set_ttl(&self, name: &str, ttl: u32) -> Result<u32, ReconcileError> {
        let previous = self.current_ttl(name).await?;
        if previous == ttl {
            debug!(record = %name, ttl, "TTL already set, nothing to do");
            return Ok(previous);
        }
        info!(record = %name, from = previous, to = ttl, "Changing TTL");
        self.control_plane.set_ttl(name, ttl).await?;
        Ok(previous)
    }

    /// Set the TTL of every name and return the highest previous TTL.
    ///
    /// # Errors
    ///
    /// Stops at the first name that fails.
    pub async fn set_ttls(&self, names: &[String], ttl: u32) -> Result<u32, ReconcileError> {
        let mut highest = 0;
        for name in names {
            highest = highest.max(self.set_ttl(name, ttl).await?);
        }
        Ok(highest)
    }

    /// Lower the TTL of every name, then wait until the old TTL has expired in caches.
    ///
    /// Returns how long it waited.
    ///
    /// # Errors
    ///
    /// Stops at the first name that fails, without waiting.
    pub async fn reduce_and_wait(
        &self,
        names: &[String],
        ttl: u32,
    ) -> Result<Duration, ReconcileError> {
        let previous = self.set_ttls(names, ttl).await?;
        let wait = Duration::from_secs(u64::from(previous));
        info!(
            records = names.len(),
            wait_secs = wait.as_secs(),
            "Waiting for the old TTL to expire"
        );
        tokio::time::sleep(wait).await;
        Ok(wait)
    }

    /// Put the TTL of every name back to `ttl`.
    ///
    /// # Errors
    ///
    /// Stops at the first name that fails.
    pub async fn restore(&self, names: &[String], ttl: u32) -> Result<(), ReconcileError> {
        self.set_ttls(names, ttl).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "ttl_tests.rs"]
mod ttl_tests;
