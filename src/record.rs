// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Discovery records and reconciliation operations.
//!
//! A [`DiscoveryRecord`] is an immutable snapshot of what the service catalog says
//! about a discovery name: its topology and the local endpoint in every datacenter.
//! The set of datacenters it is pooled in is never cached here; it is always read
//! live from the control plane through [`DiscoveryRecord::pooled_set`].
//!
//! A [`ReconciliationOperation`] captures the pooled set once (the before-state used
//! for rollback) and derives the desired state from it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use tracing::info;

use crate::confctl::{ControlPlaneClient, ServiceFilter};
use crate::dns_errors::ControlPlaneError;
use crate::metrics;

/// A set of datacenter names, ordered so that writes happen in a stable order.
pub type DatacenterSet = BTreeSet<String>;

/// Serving policy of a discovery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// May be served from several datacenters at once
    ActiveActive,
    /// Served from exactly one datacenter at a time
    ActivePassive,
}

impl Topology {
    /// Short label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActiveActive => "active/active",
            Self::ActivePassive => "active/passive",
        }
    }
}

/// Operator action on a datacenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Make the datacenter eligible to serve
    Pool,
    /// Make the datacenter ineligible to serve
    Depool,
}

impl Action {
    /// Lowercase verb used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Depool => "depool",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovery record as described by the service catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    name: String,
    service: String,
    topology: Topology,
    site_ips: BTreeMap<String, IpAddr>,
}

impl DiscoveryRecord {
    /// Create a record from catalog data.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        service: impl Into<String>,
        topology: Topology,
        site_ips: BTreeMap<String, IpAddr>,
    ) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
            topology,
            site_ips,
        }
    }

    /// The discovery name (the control-plane key and the DNS label).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The catalog service this record belongs to.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    #[must_use]
    pub fn topology(&self) -> Topology {
        self.topology
    }

    #[must_use]
    pub fn is_active_active(&self) -> bool {
        self.topology == Topology::ActiveActive
    }

    /// Local endpoint per datacenter.
    #[must_use]
    pub fn site_ips(&self) -> &BTreeMap<String, IpAddr> {
        &self.site_ips
    }

    /// Local endpoint of one datacenter.
    #[must_use]
    pub fn site_ip(&self, datacenter: &str) -> Option<IpAddr> {
        self.site_ips.get(datacenter).copied()
    }

    /// Datacenters the record has an endpoint in.
    pub fn datacenters(&self) -> impl Iterator<Item = &str> {
        self.site_ips.keys().map(String::as_str)
    }

    /// Read the set of datacenters the record is currently pooled in.
    ///
    /// # Errors
    ///
    /// Returns an error if the control plane can't be read.
    pub async fn pooled_set(
        &self,
        control_plane: &dyn ControlPlaneClient,
    ) -> Result<DatacenterSet, ControlPlaneError> {
        let refs = control_plane
            .list_services(&ServiceFilter::name(&self.name))
            .await?;
        Ok(refs
            .into_iter()
            .filter(|r| r.name == self.name && r.pooled)
            .map(|r| r.datacenter)
            .collect())
    }

    /// Pool the record in a datacenter.
    ///
    /// # Errors
    ///
    /// Returns an error if the control plane write fails.
    pub async fn pool(
        &self,
        control_plane: &dyn ControlPlaneClient,
        datacenter: &str,
    ) -> Result<(), ControlPlaneError> {
        info!(record = %self.name, datacenter = %datacenter, "Pooling discovery record");
        control_plane.set_pooled(&self.name, datacenter, true).await?;
        metrics::record_control_plane_write(Action::Pool);
        Ok(())
    }

    /// Depool the record from a datacenter.
    ///
    /// # Errors
    ///
    /// Returns an error if the control plane write fails.
    pub async fn depool(
        &self,
        control_plane: &dyn ControlPlaneClient,
        datacenter: &str,
    ) -> Result<(), ControlPlaneError> {
        info!(record = %self.name, datacenter = %datacenter, "Depooling discovery record");
        control_plane
            .set_pooled(&self.name, datacenter, false)
            .await?;
        metrics::record_control_plane_write(Action::Depool);
        Ok(())
    }
}

impl fmt::Display for DiscoveryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = self.name.chars();
        let capitalized: String = chars
            .next()
            .map(|c| c.to_uppercase().chain(chars).collect())
            .unwrap_or_default();
        write!(f, "{capitalized} ({})", self.topology.as_str())
    }
}

/// What an operation wants to achieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Apply an operator action on the target datacenter
    Apply(Action),
    /// Bring the record back to a previously captured state (rollback)
    Restore(DatacenterSet),
}

/// One pool/depool/rollback action on one record.
///
/// The before-state is captured once at creation and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ReconciliationOperation {
    record: DiscoveryRecord,
    target_datacenter: String,
    intent: Intent,
    before_state: DatacenterSet,
}

impl ReconciliationOperation {
    /// Snapshot the record's pooled set from the control plane.
    ///
    /// # Errors
    ///
    /// Returns an error if the control plane can't be read.
    pub async fn capture(
        record: DiscoveryRecord,
        target_datacenter: impl Into<String>,
        intent: Intent,
        control_plane: &dyn ControlPlaneClient,
    ) -> Result<Self, ControlPlaneError> {
        let before_state = record.pooled_set(control_plane).await?;
        Ok(Self::with_before_state(
            record,
            target_datacenter,
            intent,
            before_state,
        ))
    }

    /// Build an operation from an already captured before-state.
    #[must_use]
    pub fn with_before_state(
        record: DiscoveryRecord,
        target_datacenter: impl Into<String>,
        intent: Intent,
        before_state: DatacenterSet,
    ) -> Self {
        Self {
            record,
            target_datacenter: target_datacenter.into(),
            intent,
            before_state,
        }
    }

    #[must_use]
    pub fn record(&self) -> &DiscoveryRecord {
        &self.record
    }

    #[must_use]
    pub fn target_datacenter(&self) -> &str {
        &self.target_datacenter
    }

    #[must_use]
    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    #[must_use]
    pub fn before_state(&self) -> &DatacenterSet {
        &self.before_state
    }

    /// Compute the desired pooled set for this operation.
    ///
    /// - Active/active: add or remove the target datacenter, leaving the others alone.
    /// - Active/passive: pooling makes the target the only pooled datacenter,
    ///   depooling removes it (possibly leaving nothing).
    ///
    /// A restore intent always yields the captured state, whatever the topology.
    #[must_use]
    pub fn desired_state(&self) -> DatacenterSet {
        let target = &self.target_datacenter;
        match (&self.intent, self.record.topology) {
            (Intent::Restore(state), _) => state.clone(),
            (Intent::Apply(Action::Pool), Topology::ActiveActive) => {
                let mut desired = self.before_state.clone();
                desired.insert(target.clone());
                desired
            }
            (Intent::Apply(Action::Pool), Topology::ActivePassive) => {
                DatacenterSet::from([target.clone()])
            }
            (Intent::Apply(Action::Depool), _) => {
                let mut desired = self.before_state.clone();
                desired.remove(target);
                desired
            }
        }
    }
}

/// Datacenters to pool and to depool to go from `current` to `desired`.
///
/// Additions are returned first: they must be written before any removal.
#[must_use]
pub fn state_diff(
    current: &DatacenterSet,
    desired: &DatacenterSet,
) -> (Vec<String>, Vec<String>) {
    let additions = desired.difference(current).cloned().collect();
    let removals = current.difference(desired).cloned().collect();
    (additions, removals)
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod record_tests;
