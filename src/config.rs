// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Engine configuration.
//!
//! The configuration is a YAML document describing the discovery zone, the datacenters
//! and their representative client subnets, the authoritative nameservers to verify
//! against and where the control plane and the service catalog live.
//!
//! # Example
//!
//! ```yaml
//! zone: discovery.wmnet
//! core_datacenters: [eqiad, codfw]
//! datacenter_subnets:
//!   eqiad: 10.64.0.1
//!   codfw: 10.192.0.1
//! authoritative_nameservers: ["10.3.0.1:53", "10.3.0.2:53"]
//! control_plane_url: "https://confctl.example.org/"
//! catalog_path: /etc/dnsdisc/catalog.yaml
//! verification:
//!   attempts: 15
//!   interval_secs: 3
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_AUTHDNS_HOSTS, DEFAULT_CHECK_ATTEMPTS, DEFAULT_CHECK_INTERVAL_SECS,
    DEFAULT_CORE_DATACENTERS, DEFAULT_DISCOVERY_ZONE, DEFAULT_EMERGENCY_WIPE_INTERVAL_SECS,
    DEFAULT_LOCK_DIR, DEFAULT_RECURSOR_HOSTS, DEFAULT_SETTLE_SECS,
};

/// Retry and settle parameters of the consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Maximum number of full check attempts
    pub attempts: u32,
    /// Constant delay between attempts
    pub interval_secs: u64,
    /// Delay between the writes and the first attempt
    pub settle_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_CHECK_ATTEMPTS,
            interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            settle_secs: DEFAULT_SETTLE_SECS,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// DNS Discovery zone suffix (e.g. `discovery.wmnet`)
    pub zone: String,
    /// Datacenters that can serve internal traffic
    pub core_datacenters: Vec<String>,
    /// A representative client IP per datacenter, used for EDNS client subnet lookups
    pub datacenter_subnets: BTreeMap<String, IpAddr>,
    /// Authoritative nameservers (`ip:port`) of the discovery zone
    pub authoritative_nameservers: Vec<String>,
    /// Host selector of the recursive resolvers
    pub recursor_hosts: String,
    /// Host selector of the authoritative DNS servers
    pub authdns_hosts: String,
    /// Static host selector resolution (`selector -> hosts`)
    pub hosts: BTreeMap<String, Vec<String>>,
    /// Base URL of the control plane HTTP API
    pub control_plane_url: String,
    /// Path of the YAML service catalog
    pub catalog_path: PathBuf,
    /// Services that are never switched by a datacenter run, with the reason
    pub excluded_services: BTreeMap<String, String>,
    /// Directory holding advisory lock slots
    pub lock_dir: PathBuf,
    /// Consistency check parameters
    pub verification: VerificationConfig,
    /// Delay between the two blind zone wipes in emergency mode
    pub emergency_wipe_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zone: DEFAULT_DISCOVERY_ZONE.to_string(),
            core_datacenters: DEFAULT_CORE_DATACENTERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            datacenter_subnets: default_datacenter_subnets(),
            authoritative_nameservers: Vec::new(),
            recursor_hosts: DEFAULT_RECURSOR_HOSTS.to_string(),
            authdns_hosts: DEFAULT_AUTHDNS_HOSTS.to_string(),
            hosts: BTreeMap::new(),
            control_plane_url: String::new(),
            catalog_path: PathBuf::new(),
            excluded_services: BTreeMap::new(),
            lock_dir: PathBuf::from(DEFAULT_LOCK_DIR),
            verification: VerificationConfig::default(),
            emergency_wipe_interval_secs: DEFAULT_EMERGENCY_WIPE_INTERVAL_SECS,
        }
    }
}

/// Some IP from a subnet of each datacenter.
fn default_datacenter_subnets() -> BTreeMap<String, IpAddr> {
    [
        ("eqiad", Ipv4Addr::new(10, 64, 0, 1)),
        ("codfw", Ipv4Addr::new(10, 192, 0, 1)),
        ("esams", Ipv4Addr::new(10, 80, 0, 1)),
        ("ulsfo", Ipv4Addr::new(10, 128, 0, 1)),
        ("eqsin", Ipv4Addr::new(10, 132, 0, 1)),
        ("drmrs", Ipv4Addr::new(10, 136, 0, 1)),
        ("magru", Ipv4Addr::new(10, 140, 0, 1)),
    ]
    .into_iter()
    .map(|(dc, ip)| (dc.to_string(), IpAddr::V4(ip)))
    .collect()
}

impl EngineConfig {
    /// Parse a configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or the configuration fails validation.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Check the configuration for values the engine can't work with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        if self.zone.trim_matches('.').is_empty() {
            bail!("zone must not be empty");
        }
        if self.authoritative_nameservers.is_empty() {
            bail!("at least one authoritative nameserver is required");
        }
        if self.verification.attempts == 0 {
            bail!("verification.attempts must be at least 1");
        }
        for dc in &self.core_datacenters {
            if !self.datacenter_subnets.contains_key(dc) {
                bail!("core datacenter {dc} has no entry in datacenter_subnets");
            }
        }
        Ok(())
    }

    /// Fully qualified name of a discovery record.
    #[must_use]
    pub fn fqdn(&self, name: &str) -> String {
        format!("{name}.{}", self.zone.trim_matches('.'))
    }

    /// Representative client IP of a datacenter.
    #[must_use]
    pub fn client_ip(&self, datacenter: &str) -> Option<IpAddr> {
        self.datacenter_subnets.get(datacenter).copied()
    }

    /// Whether the datacenter is one of the core datacenters.
    #[must_use]
    pub fn is_core(&self, datacenter: &str) -> bool {
        self.core_datacenters.iter().any(|dc| dc == datacenter)
    }

    /// Delay between two consistency check attempts.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.verification.interval_secs)
    }

    /// Delay between the writes and the first consistency check attempt.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.verification.settle_secs)
    }

    /// Delay between the two blind wipes performed in emergency mode.
    #[must_use]
    pub fn emergency_wipe_interval(&self) -> Duration {
        Duration::from_secs(self.emergency_wipe_interval_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
