// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common test utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dnsdisc::catalog::YamlCatalog;
use dnsdisc::config::EngineConfig;
use dnsdisc::confctl::{ControlPlaneClient, ServiceFilter, ServiceRef};
use dnsdisc::dns::{Answer, ResolverClient};
use dnsdisc::dns_errors::{ControlPlaneError, RemoteError, ResolverError};
use dnsdisc::prompt::OperatorPrompt;
use dnsdisc::reconcilers::ReconciliationEngine;
use dnsdisc::remote::{HostOutput, RemoteCommandExecutor};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const CATALOG: &str = r#"
svcA:
  ip:
    eqiad: 10.2.2.1
    codfw: 10.2.1.1
  discovery:
    - dnsdisc: svcA
      active_active: true
svcB:
  ip:
    eqiad: 10.2.2.2
    codfw: 10.2.1.2
  discovery:
    - dnsdisc: svcB
      active_active: false
staging-only:
  state: service_setup
  ip:
    eqiad: 10.2.2.3
  discovery:
    - dnsdisc: staging-only
      active_active: true
"#;

/// Write `content` to a temporary catalog file.
pub fn catalog_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create catalog file");
    file.write_all(content.as_bytes()).expect("write catalog");
    file
}

/// Config with two nameservers and no delays.
pub fn config() -> EngineConfig {
    EngineConfig::from_yaml_str(
        r#"
authoritative_nameservers: ["192.0.2.53:53", "198.51.100.53:53"]
control_plane_url: "http://confctl.invalid/"
verification:
  attempts: 3
  interval_secs: 0
  settle_secs: 0
emergency_wipe_interval_secs: 0
"#,
    )
    .expect("valid config")
}

/// Pooled state shared by the control plane and the resolver fakes.
#[derive(Default)]
pub struct World {
    pooled: Mutex<BTreeMap<(String, String), bool>>,
    endpoints: Mutex<BTreeMap<String, BTreeMap<String, IpAddr>>>,
    trace: Mutex<Vec<String>>,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, name: &str, sites: &[(&str, &str, bool)]) {
        let mut pooled = self.pooled.lock().unwrap();
        let mut endpoints = self.endpoints.lock().unwrap();
        for (dc, ip, is_pooled) in sites {
            pooled.insert((name.to_string(), (*dc).to_string()), *is_pooled);
            endpoints
                .entry(name.to_string())
                .or_default()
                .insert((*dc).to_string(), ip.parse().unwrap());
        }
    }

    pub fn pooled_in(&self, name: &str) -> BTreeSet<String> {
        self.pooled
            .lock()
            .unwrap()
            .iter()
            .filter(|((n, _), pooled)| n == name && **pooled)
            .map(|((_, dc), _)| dc.clone())
            .collect()
    }

    /// Writes seen so far, as `pool name/dc` or `depool name/dc`.
    pub fn trace(&self) -> Vec<String> {
        self.trace.lock().unwrap().clone()
    }
}

/// Control plane backed by a [`World`].
pub struct MemoryControlPlane(pub Arc<World>);

#[async_trait]
impl ControlPlaneClient for MemoryControlPlane {
    async fn get_pooled(
        &self,
        service: &str,
        datacenter: &str,
    ) -> Result<bool, ControlPlaneError> {
        self.0
            .pooled
            .lock()
            .unwrap()
            .get(&(service.to_string(), datacenter.to_string()))
            .copied()
            .ok_or_else(|| ControlPlaneError::NotFound {
                service: service.to_string(),
                datacenter: datacenter.to_string(),
            })
    }

    async fn set_pooled(
        &self,
        service: &str,
        datacenter: &str,
        pooled: bool,
    ) -> Result<(), ControlPlaneError> {
        self.0
            .pooled
            .lock()
            .unwrap()
            .insert((service.to_string(), datacenter.to_string()), pooled);
        let verb = if pooled { "pool" } else { "depool" };
        self.0
            .trace
            .lock()
            .unwrap()
            .push(format!("{verb} {service}/{datacenter}"));
        Ok(())
    }

    async fn list_services(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Vec<ServiceRef>, ControlPlaneError> {
        Ok(self
            .0
            .pooled
            .lock()
            .unwrap()
            .iter()
            .map(|((name, dc), pooled)| ServiceRef {
                name: name.clone(),
                datacenter: dc.clone(),
                pooled: *pooled,
                ttl: Some(300),
            })
            .filter(|s| filter.matches(s))
            .collect())
    }

    async fn set_ttl(&self, _service: &str, _ttl: u32) -> Result<(), ControlPlaneError> {
        Ok(())
    }
}

/// Geo-aware DNS answering from a [`World`], the way the authoritative servers do.
pub struct GeoDns {
    world: Arc<World>,
    zone: String,
    subnets: BTreeMap<IpAddr, String>,
    nameservers: Vec<String>,
}

impl GeoDns {
    pub fn new(world: Arc<World>, config: &EngineConfig) -> Self {
        Self {
            world,
            zone: config.zone.clone(),
            subnets: config
                .datacenter_subnets
                .iter()
                .map(|(dc, ip)| (*ip, dc.clone()))
                .collect(),
            nameservers: config.authoritative_nameservers.clone(),
        }
    }

    fn answer(&self, fqdn: &str, client_dc: Option<&str>) -> Result<Vec<Answer>, ResolverError> {
        let no_answer = || ResolverError::NoAnswer {
            name: fqdn.to_string(),
            nameserver: "geodns".to_string(),
            rcode: "NXDomain".to_string(),
        };
        let name = fqdn
            .strip_suffix(&format!(".{}", self.zone))
            .ok_or_else(no_answer)?;
        let pooled = self.world.pooled_in(name);
        let serving = match client_dc {
            Some(dc) if pooled.contains(dc) => dc.to_string(),
            _ => pooled.iter().next().cloned().ok_or_else(no_answer)?,
        };
        let address = self
            .world
            .endpoints
            .lock()
            .unwrap()
            .get(name)
            .and_then(|sites| sites.get(&serving).copied())
            .ok_or_else(no_answer)?;
        Ok(self
            .nameservers
            .iter()
            .map(|ns| Answer {
                nameserver: ns.clone(),
                address,
                ttl: 300,
            })
            .collect())
    }
}

#[async_trait]
impl ResolverClient for GeoDns {
    async fn resolve_with_subnet(
        &self,
        fqdn: &str,
        client_ip: IpAddr,
    ) -> Result<Vec<Answer>, ResolverError> {
        let dc = self.subnets.get(&client_ip).cloned();
        self.answer(fqdn, dc.as_deref())
    }

    async fn resolve(&self, fqdn: &str) -> Result<Vec<Answer>, ResolverError> {
        self.answer(fqdn, None)
    }
}

/// Executor that accepts every command and remembers it.
#[derive(Default)]
pub struct NoopExecutor {
    pub commands: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteCommandExecutor for NoopExecutor {
    async fn run_on_hosts(
        &self,
        _selector: &str,
        command: &str,
    ) -> Result<Vec<HostOutput>, RemoteError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(Vec::new())
    }
}

/// Engine over a [`World`], reading `catalog`.
pub fn engine(
    world: &Arc<World>,
    catalog: &NamedTempFile,
    executor: Arc<NoopExecutor>,
    prompt: Arc<dyn OperatorPrompt>,
) -> ReconciliationEngine {
    let config = Arc::new(config());
    let resolver = Arc::new(GeoDns::new(world.clone(), &config));
    ReconciliationEngine::new(
        config,
        Arc::new(MemoryControlPlane(world.clone())),
        resolver,
        executor,
        Arc::new(YamlCatalog::new(catalog.path())),
        prompt,
    )
}
