// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory collaborators for unit tests.
//!
//! [`FakeControlPlane`] keeps the pooled state in memory and records every write.
//! [`FakeDns`] renders answers from that same state, the way the authoritative servers
//! render them from the real control plane: a client in a pooled datacenter gets the
//! local endpoint, any other client gets the endpoint of the first pooled datacenter.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::catalog::{CatalogService, DiscoveryEntry, StaticCatalog, PRODUCTION_STATE};
use crate::config::EngineConfig;
use crate::confctl::{ControlPlaneClient, ServiceFilter, ServiceRef};
use crate::dns::{Answer, ResolverClient};
use crate::dns_errors::{ControlPlaneError, PromptError, RemoteError, ResolverError};
use crate::prompt::OperatorPrompt;
use crate::reconcilers::ReconciliationEngine;
use crate::record::{DatacenterSet, DiscoveryRecord, Topology};
use crate::remote::{HostOutput, RemoteCommandExecutor};

/// One write seen by the fake control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Pool(String, String),
    Depool(String, String),
    Ttl(String, u32),
}

impl Write {
    pub fn pool(name: &str, dc: &str) -> Self {
        Self::Pool(name.to_string(), dc.to_string())
    }

    pub fn depool(name: &str, dc: &str) -> Self {
        Self::Depool(name.to_string(), dc.to_string())
    }
}

#[derive(Default)]
pub struct FakeControlPlane {
    pooled: Mutex<BTreeMap<(String, String), bool>>,
    ttls: Mutex<BTreeMap<String, u32>>,
    writes: Mutex<Vec<Write>>,
    unreachable: Mutex<BTreeSet<String>>,
}

impl FakeControlPlane {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `record` with the given datacenters pooled and all other sites depooled.
    pub fn add(&self, record: &DiscoveryRecord, pooled: &[&str]) {
        let mut state = self.pooled.lock().unwrap();
        for dc in record.datacenters() {
            state.insert(
                (record.name().to_string(), dc.to_string()),
                pooled.contains(&dc),
            );
        }
        self.ttls
            .lock()
            .unwrap()
            .insert(record.name().to_string(), 300);
    }

    /// Make every call touching `name` fail as unreachable.
    pub fn break_record(&self, name: &str) {
        self.unreachable.lock().unwrap().insert(name.to_string());
    }

    pub fn pooled_set(&self, name: &str) -> DatacenterSet {
        self.pooled
            .lock()
            .unwrap()
            .iter()
            .filter(|((n, _), pooled)| n == name && **pooled)
            .map(|((_, dc), _)| dc.clone())
            .collect()
    }

    pub fn ttl(&self, name: &str) -> Option<u32> {
        self.ttls.lock().unwrap().get(name).copied()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    fn check_reachable(&self, name: &str) -> Result<(), ControlPlaneError> {
        if self.unreachable.lock().unwrap().contains(name) {
            return Err(ControlPlaneError::Unreachable {
                endpoint: "fake".to_string(),
                reason: format!("{name} is broken"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlaneClient for FakeControlPlane {
    async fn get_pooled(
        &self,
        service: &str,
        datacenter: &str,
    ) -> Result<bool, ControlPlaneError> {
        self.check_reachable(service)?;
        self.pooled
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
        self.check_reachable(service)?;
        self.pooled
            .lock()
            .unwrap()
            .insert((service.to_string(), datacenter.to_string()), pooled);
        self.writes.lock().unwrap().push(if pooled {
            Write::pool(service, datacenter)
        } else {
            Write::depool(service, datacenter)
        });
        Ok(())
    }

    async fn list_services(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Vec<ServiceRef>, ControlPlaneError> {
        if let Some(name) = &filter.name {
            self.check_reachable(name)?;
        }
        let ttls = self.ttls.lock().unwrap();
        Ok(self
            .pooled
            .lock()
            .unwrap()
            .iter()
            .map(|((name, dc), pooled)| ServiceRef {
                name: name.clone(),
                datacenter: dc.clone(),
                pooled: *pooled,
                ttl: ttls.get(name).copied(),
            })
            .filter(|s| filter.matches(s))
            .collect())
    }

    async fn set_ttl(&self, service: &str, ttl: u32) -> Result<(), ControlPlaneError> {
        self.check_reachable(service)?;
        self.ttls.lock().unwrap().insert(service.to_string(), ttl);
        self.writes
            .lock()
            .unwrap()
            .push(Write::Ttl(service.to_string(), ttl));
        Ok(())
    }
}

/// Authoritative DNS rendered from a [`FakeControlPlane`].
pub struct FakeDns {
    control_plane: Arc<FakeControlPlane>,
    records: BTreeMap<String, DiscoveryRecord>,
    client_datacenters: BTreeMap<IpAddr, String>,
    nameservers: Vec<String>,
    lagging_queries: AtomicU32,
    frozen: AtomicBool,
    queries: AtomicU32,
}

impl FakeDns {
    pub fn new(
        control_plane: Arc<FakeControlPlane>,
        config: &EngineConfig,
        records: &[DiscoveryRecord],
    ) -> Arc<Self> {
        Arc::new(Self {
            control_plane,
            records: records
                .iter()
                .map(|r| (config.fqdn(r.name()), r.clone()))
                .collect(),
            client_datacenters: config
                .datacenter_subnets
                .iter()
                .map(|(dc, ip)| (*ip, dc.clone()))
                .collect(),
            nameservers: config.authoritative_nameservers.clone(),
            lagging_queries: AtomicU32::new(0),
            frozen: AtomicBool::new(false),
            queries: AtomicU32::new(0),
        })
    }

    /// Time out the next `n` queries, as if the change had not propagated yet.
    pub fn lag_for(&self, n: u32) {
        self.lagging_queries.store(n, Ordering::SeqCst);
    }

    /// Time out every query from now on.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    fn timeout(&self, fqdn: &str) -> ResolverError {
        ResolverError::Timeout {
            name: fqdn.to_string(),
            nameserver: "fake".to_string(),
            timeout_ms: 0,
        }
    }

    fn lagging(&self) -> bool {
        if self.frozen.load(Ordering::SeqCst) {
            return true;
        }
        self.lagging_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn render(&self, fqdn: &str, client_dc: Option<&str>) -> Result<Vec<Answer>, ResolverError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.lagging() {
            return Err(self.timeout(fqdn));
        }
        let record = self
            .records
            .get(fqdn)
            .ok_or_else(|| ResolverError::NoAnswer {
                name: fqdn.to_string(),
                nameserver: "fake".to_string(),
                rcode: "NXDomain".to_string(),
            })?;
        let pooled = self.control_plane.pooled_set(record.name());
        let serving = match client_dc {
            Some(dc) if pooled.contains(dc) => Some(dc.to_string()),
            _ => pooled.iter().next().cloned(),
        };
        let address = serving
            .and_then(|dc| record.site_ip(&dc))
            .ok_or_else(|| ResolverError::NoAnswer {
                name: fqdn.to_string(),
                nameserver: "fake".to_string(),
                rcode: "ServFail".to_string(),
            })?;
        let ttl = self.control_plane.ttl(record.name()).unwrap_or(300);
        Ok(self
            .nameservers
            .iter()
            .map(|ns| Answer {
                nameserver: ns.clone(),
                address,
                ttl,
            })
            .collect())
    }
}

#[async_trait]
impl ResolverClient for FakeDns {
    async fn resolve_with_subnet(
        &self,
        fqdn: &str,
        client_ip: IpAddr,
    ) -> Result<Vec<Answer>, ResolverError> {
        let dc = self.client_datacenters.get(&client_ip).cloned();
        self.render(fqdn, dc.as_deref())
    }

    async fn resolve(&self, fqdn: &str) -> Result<Vec<Answer>, ResolverError> {
        self.render(fqdn, None)
    }
}

/// Executor recording `(selector, command)` pairs.
#[derive(Default)]
pub struct RecordingExecutor {
    commands: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteCommandExecutor for RecordingExecutor {
    async fn run_on_hosts(
        &self,
        selector: &str,
        command: &str,
    ) -> Result<Vec<HostOutput>, RemoteError> {
        self.commands
            .lock()
            .unwrap()
            .push((selector.to_string(), command.to_string()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::CommandFailed {
                command: command.to_string(),
                failed: 1,
                total: 1,
                first_error: "host1: boom".to_string(),
            });
        }
        Ok(vec![HostOutput {
            host: "host1".to_string(),
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }])
    }
}

/// Prompt replaying scripted answers; cancels once the script is exhausted.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| (*a).to_string()).collect()),
            asked: Mutex::new(Vec::new()),
        })
    }

    pub fn asked(&self) -> Vec<(String, Vec<String>)> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedPrompt {
    async fn ask_choice(&self, message: &str, options: &[String]) -> Result<String, PromptError> {
        self.asked
            .lock()
            .unwrap()
            .push((message.to_string(), options.to_vec()));
        match self.answers.lock().unwrap().pop_front() {
            Some(answer) if options.contains(&answer) => Ok(answer),
            _ => Err(PromptError::Cancelled {
                message: message.to_string(),
            }),
        }
    }
}

/// Config pointing at two fake nameservers, with all delays set to zero.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig {
        authoritative_nameservers: vec!["ns0:53".to_string(), "ns1:53".to_string()],
        control_plane_url: "http://confctl.invalid/".to_string(),
        ..EngineConfig::default()
    };
    config.verification.interval_secs = 0;
    config.verification.settle_secs = 0;
    config.emergency_wipe_interval_secs = 0;
    config
}

/// [`test_config`] with `names` configured as needing manual switching.
pub fn config_excluding(names: &[&str]) -> EngineConfig {
    let mut config = test_config();
    for name in names {
        config
            .excluded_services
            .insert((*name).to_string(), "switched by hand".to_string());
    }
    config
}

fn ips(sites: &[(&str, &str)]) -> BTreeMap<String, IpAddr> {
    sites
        .iter()
        .map(|(dc, ip)| ((*dc).to_string(), ip.parse().unwrap()))
        .collect()
}

/// Active/active `svcA` in eqiad and codfw.
pub fn svc_a() -> DiscoveryRecord {
    DiscoveryRecord::new(
        "svcA",
        "svcA",
        Topology::ActiveActive,
        ips(&[("eqiad", "10.2.2.1"), ("codfw", "10.2.1.1")]),
    )
}

/// Active/passive `svcB` in eqiad and codfw.
pub fn svc_b() -> DiscoveryRecord {
    DiscoveryRecord::new(
        "svcB",
        "svcB",
        Topology::ActivePassive,
        ips(&[("eqiad", "10.2.2.2"), ("codfw", "10.2.1.2")]),
    )
}

/// Active/active record present in three datacenters.
pub fn svc_c() -> DiscoveryRecord {
    DiscoveryRecord::new(
        "svcC",
        "svcC",
        Topology::ActiveActive,
        ips(&[
            ("eqiad", "10.2.2.3"),
            ("codfw", "10.2.1.3"),
            ("esams", "10.80.2.3"),
        ]),
    )
}

/// Catalog holding exactly `records`, each under its own service.
pub fn catalog_of(records: &[DiscoveryRecord]) -> StaticCatalog {
    let mut services: BTreeMap<String, CatalogService> = BTreeMap::new();
    for record in records {
        let service = services
            .entry(record.service().to_string())
            .or_insert_with(|| CatalogService {
                state: PRODUCTION_STATE.to_string(),
                ip: record.site_ips().clone(),
                discovery: Some(Vec::new()),
            });
        if let Some(entries) = service.discovery.as_mut() {
            entries.push(DiscoveryEntry {
                dnsdisc: record.name().to_string(),
                active_active: record.is_active_active(),
            });
        }
    }
    StaticCatalog::new(services)
}

/// An engine wired to fakes sharing one control-plane state.
pub struct Harness {
    pub config: Arc<EngineConfig>,
    pub control_plane: Arc<FakeControlPlane>,
    pub dns: Arc<FakeDns>,
    pub executor: Arc<RecordingExecutor>,
    pub prompt: Arc<ScriptedPrompt>,
    pub engine: ReconciliationEngine,
}

impl Harness {
    /// `records` with their initially pooled datacenters, `answers` for the prompt.
    pub fn new(records: &[(DiscoveryRecord, &[&str])], answers: &[&str]) -> Self {
        Self::with_config(test_config(), records, answers)
    }

    pub fn with_config(
        config: EngineConfig,
        records: &[(DiscoveryRecord, &[&str])],
        answers: &[&str],
    ) -> Self {
        let config = Arc::new(config);
        let control_plane = FakeControlPlane::new();
        for (record, pooled) in records {
            control_plane.add(record, pooled);
        }
        let all: Vec<DiscoveryRecord> = records.iter().map(|(r, _)| r.clone()).collect();
        let dns = FakeDns::new(control_plane.clone(), &config, &all);
        let executor = RecordingExecutor::new();
        let prompt = ScriptedPrompt::new(answers);
        let engine = ReconciliationEngine::new(
            config.clone(),
            control_plane.clone(),
            dns.clone(),
            executor.clone(),
            Arc::new(catalog_of(&all)),
            prompt.clone(),
        );
        Self {
            config,
            control_plane,
            dns,
            executor,
            prompt,
            engine,
        }
    }

    /// Commands run on remote hosts, without their selectors.
    pub fn commands(&self) -> Vec<String> {
        self.executor
            .commands()
            .into_iter()
            .map(|(_, command)| command)
            .collect()
    }
}

pub fn set(dcs: &[&str]) -> DatacenterSet {
    dcs.iter().map(|d| (*d).to_string()).collect()
}
