// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Authoritative DNS lookups for discovery records.
//!
//! Discovery records answer differently depending on where the client is. To see what
//! a client in a given datacenter would get, queries carry an EDNS client subnet option
//! built from a representative IP of that datacenter ([`ecs`]).
//!
//! Every authoritative nameserver of the zone is queried independently, because
//! propagation from the control plane to each of them happens at its own pace.
//!
//! # Example
//!
//! ```rust,no_run
//! use dnsdisc::dns::{ResolverClient, UdpResolver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let resolver = UdpResolver::new(vec!["10.3.0.1:53".to_string()])?;
//! for answer in resolver
//!     .resolve_with_subnet("svcA.discovery.wmnet", "10.64.0.1".parse()?)
//!     .await?
//! {
//!     println!("{} -> {} (ttl {})", answer.nameserver, answer.address, answer.ttl);
//! }
//! # Ok(())
//! # }
//! ```

pub mod ecs;
pub mod udp;

pub use udp::UdpResolver;

use async_trait::async_trait;
use std::net::IpAddr;

use crate::dns_errors::ResolverError;

/// The address one authoritative nameserver returned for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Nameserver that answered (`ip:port`)
    pub nameserver: String,
    /// First address record in the answer
    pub address: IpAddr,
    /// Highest TTL of the records in the answer section
    pub ttl: u32,
}

/// Resolves discovery records against all authoritative nameservers of the zone.
#[async_trait]
pub trait ResolverClient: Send + Sync {
    /// Resolve `fqdn` as a client located in `client_ip`'s subnet would.
    ///
    /// Returns one answer per authoritative nameserver.
    async fn resolve_with_subnet(
        &self,
        fqdn: &str,
        client_ip: IpAddr,
    ) -> Result<Vec<Answer>, ResolverError>;

    /// Resolve `fqdn` without any client subnet hint.
    ///
    /// Returns one answer per authoritative nameserver.
    async fn resolve(&self, fqdn: &str) -> Result<Vec<Answer>, ResolverError>;
}
