// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service catalog and discovery record enumeration.
//!
//! The catalog lists every service with its lifecycle state, its endpoint in each
//! datacenter and the discovery records it owns:
//!
//! ```yaml
//! appservers-rw:
//!   state: production
//!   ip:
//!     eqiad: 10.2.2.1
//!     codfw: 10.2.1.1
//!   discovery:
//!     - dnsdisc: appservers-rw
//!       active_active: false
//! ```
//!
//! [`CatalogFilter`] turns it into the discovery records a run acts upon.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::dns_errors::CatalogError;
use crate::record::{DiscoveryRecord, Topology};

/// Lifecycle state of services that are acted upon.
pub const PRODUCTION_STATE: &str = "production";

fn default_state() -> String {
    PRODUCTION_STATE.to_string()
}

/// One discovery record declared by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEntry {
    /// Discovery name
    pub dnsdisc: String,
    /// Whether the record may be pooled in several datacenters at once
    #[serde(default)]
    pub active_active: bool,
}

/// One service of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogService {
    /// Lifecycle state (`production`, `lvs_setup`, ...)
    #[serde(default = "default_state")]
    pub state: String,
    /// Endpoint per datacenter
    #[serde(default)]
    pub ip: BTreeMap<String, IpAddr>,
    /// Discovery records, if the service has any
    #[serde(default)]
    pub discovery: Option<Vec<DiscoveryEntry>>,
}

/// Source of catalog data.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// All services, keyed by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog can't be read or parsed.
    async fn services(&self) -> Result<BTreeMap<String, CatalogService>, CatalogError>;
}

/// Catalog stored in a YAML file.
#[derive(Debug, Clone)]
pub struct YamlCatalog {
    path: PathBuf,
}

impl YamlCatalog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Parse catalog YAML read from `location`.
///
/// # Errors
///
/// Returns [`CatalogError::Malformed`] if the document isn't a valid catalog.
pub fn parse_catalog(
    content: &str,
    location: &str,
) -> Result<BTreeMap<String, CatalogService>, CatalogError> {
    serde_yaml::from_str(content).map_err(|e| CatalogError::Malformed {
        location: location.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl ServiceCatalog for YamlCatalog {
    async fn services(&self) -> Result<BTreeMap<String, CatalogService>, CatalogError> {
        let location = self.path.display().to_string();
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CatalogError::Unreachable {
                location: location.clone(),
                reason: e.to_string(),
            })?;
        parse_catalog(&content, &location)
    }
}

/// Catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    services: BTreeMap<String, CatalogService>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new(services: BTreeMap<String, CatalogService>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ServiceCatalog for StaticCatalog {
    async fn services(&self) -> Result<BTreeMap<String, CatalogService>, CatalogError> {
        Ok(self.services.clone())
    }
}

/// Discovery records selected for a run, split by topology.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumeratedRecords {
    pub active_active: Vec<DiscoveryRecord>,
    pub active_passive: Vec<DiscoveryRecord>,
}

impl EnumeratedRecords {
    #[must_use]
    pub fn len(&self) -> usize {
        self.active_active.len() + self.active_passive.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active/active records first, then active/passive ones.
    pub fn iter(&self) -> impl Iterator<Item = &DiscoveryRecord> {
        self.active_active.iter().chain(self.active_passive.iter())
    }

    /// Find a record by discovery name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&DiscoveryRecord> {
        self.iter().find(|r| r.name() == name)
    }
}

/// Selects the discovery records a run acts upon.
pub struct CatalogFilter;

impl CatalogFilter {
    /// Read the catalog and select records.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog can't be read or is malformed. There is no
    /// partial mode.
    pub async fn enumerate(
        catalog: &dyn ServiceCatalog,
        include_active_passive: bool,
        exclude: &BTreeSet<String>,
    ) -> Result<EnumeratedRecords, CatalogError> {
        let services = catalog.services().await?;
        Self::classify(&services, include_active_passive, exclude)
    }

    /// Select records from already loaded catalog data.
    ///
    /// Skips services without discovery records, services not in production and
    /// anything excluded by service or record name. Active/passive records are only
    /// kept when `include_active_passive` is set. Services are visited by name; a
    /// discovery name declared twice is kept from its first service only.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Malformed`] for a production service with discovery
    /// records but no endpoint.
    pub fn classify(
        services: &BTreeMap<String, CatalogService>,
        include_active_passive: bool,
        exclude: &BTreeSet<String>,
    ) -> Result<EnumeratedRecords, CatalogError> {
        let mut records = EnumeratedRecords::default();
        let mut seen = BTreeSet::new();

        for (name, service) in services {
            let Some(entries) = &service.discovery else {
                debug!(service = %name, "Skipping service without discovery record");
                continue;
            };
            if service.state != PRODUCTION_STATE {
                debug!(service = %name, state = %service.state, "Skipping service not in production");
                continue;
            }
            if exclude.contains(name) {
                info!(service = %name, "Skipping excluded service");
                continue;
            }
            if service.ip.is_empty() {
                return Err(CatalogError::Malformed {
                    location: name.clone(),
                    reason: "service has discovery records but no endpoint".to_string(),
                });
            }

            for entry in entries {
                if exclude.contains(&entry.dnsdisc) {
                    info!(record = %entry.dnsdisc, "Skipping excluded discovery record");
                    continue;
                }
                if !seen.insert(entry.dnsdisc.as_str()) {
                    warn!(record = %entry.dnsdisc, service = %name, "Ignoring duplicate discovery record");
                    continue;
                }
                let topology = if entry.active_active {
                    Topology::ActiveActive
                } else {
                    Topology::ActivePassive
                };
                let record =
                    DiscoveryRecord::new(&entry.dnsdisc, name, topology, service.ip.clone());
                match topology {
                    Topology::ActiveActive => records.active_active.push(record),
                    Topology::ActivePassive if include_active_passive => {
                        records.active_passive.push(record);
                    }
                    Topology::ActivePassive => {
                        debug!(record = %entry.dnsdisc, "Skipping active/passive record");
                    }
                }
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod catalog_tests;
