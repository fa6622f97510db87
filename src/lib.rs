// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # dnsdisc - DNS Discovery datacenter reconciliation
//!
//! dnsdisc pools and depools DNS Discovery records across datacenters. A discovery
//! record maps a service name to the endpoint of a live datacenter, so clients never
//! hardcode where a service runs. Moving traffic between datacenters means flipping
//! the pooled flag of every record in a control plane, then making sure every
//! authoritative nameserver serves the new answer and no recursor keeps the old one.
//!
//! ## Overview
//!
//! This library provides:
//!
//! - Enumeration of the discovery records of a service catalog
//! - The reconciliation engine for active/active and active/passive records
//! - Consistency checks of DNS answers with EDNS client subnet lookups
//! - TTL management and recursor cache invalidation
//! - Rollback to the state captured before a run
//!
//! ## Modules
//!
//! - [`reconcilers`] - The reconciliation engine and its entry points
//! - [`catalog`] - Service catalog and record enumeration
//! - [`record`] - Discovery records and desired-state computation
//! - [`checker`] - DNS consistency checks
//! - [`confctl`] - Control plane client
//! - [`dns`] - Authoritative DNS lookups
//! - [`cache`] / [`ttl`] - Cache invalidation and TTL management
//! - [`lock`] - Advisory run lock
//!
//! ## Example
//!
//! ```rust,no_run
//! use dnsdisc::catalog::YamlCatalog;
//! use dnsdisc::confctl::HttpControlPlane;
//! use dnsdisc::config::EngineConfig;
//! use dnsdisc::dns::UdpResolver;
//! use dnsdisc::prompt::FixedPrompt;
//! use dnsdisc::reconcilers::{ReconciliationEngine, RunAction, RunRequest};
//! use dnsdisc::remote::SshExecutor;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Arc::new(EngineConfig::load(Path::new("/etc/dnsdisc/config.yaml"))?);
//! let engine = ReconciliationEngine::new(
//!     config.clone(),
//!     Arc::new(HttpControlPlane::new(&config.control_plane_url)?),
//!     Arc::new(UdpResolver::new(config.authoritative_nameservers.clone())?),
//!     Arc::new(SshExecutor::new(config.hosts.clone())),
//!     Arc::new(YamlCatalog::new(&config.catalog_path)),
//!     Arc::new(FixedPrompt::default()),
//! );
//!
//! let report = engine.run(&RunRequest::new(RunAction::Depool, "codfw")).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod checker;
pub mod confctl;
pub mod config;
pub mod constants;
pub mod dns;
pub mod dns_errors;
pub mod lock;
pub mod metrics;
pub mod prompt;
pub mod reconcilers;
pub mod record;
pub mod remote;
pub mod ttl;

#[cfg(test)]
mod testing;
