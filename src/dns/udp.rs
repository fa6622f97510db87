// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Plain UDP resolver talking directly to the authoritative nameservers.

use async_trait::async_trait;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{ecs::client_subnet_option, Answer, ResolverClient};
use crate::constants::{DNS_PORT, DNS_QUERY_TIMEOUT_MILLIS, EDNS_UDP_PAYLOAD_SIZE};
use crate::dns_errors::ResolverError;

/// Resolver sending one non-recursive query per authoritative nameserver.
#[derive(Debug, Clone)]
pub struct UdpResolver {
    nameservers: Vec<String>,
    timeout: Duration,
}

impl UdpResolver {
    /// Create a resolver for the given nameservers.
    ///
    /// Entries may be `ip`, `ip:port`, `host` or `host:port`; the port defaults to 53.
    ///
    /// # Errors
    ///
    /// Returns an error if no nameserver is given.
    pub fn new(nameservers: Vec<String>) -> anyhow::Result<Self> {
        if nameservers.is_empty() {
            anyhow::bail!("At least one authoritative nameserver is required");
        }
        Ok(Self {
            nameservers: nameservers.iter().map(|ns| with_default_port(ns)).collect(),
            timeout: Duration::from_millis(DNS_QUERY_TIMEOUT_MILLIS),
        })
    }

    /// Override the per-query timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Normalized `host:port` of every nameserver.
    #[must_use]
    pub fn nameservers(&self) -> &[String] {
        &self.nameservers
    }

    async fn query_all(
        &self,
        fqdn: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<Vec<Answer>, ResolverError> {
        let mut answers = Vec::with_capacity(self.nameservers.len());
        for nameserver in &self.nameservers {
            answers.push(self.query_one(fqdn, nameserver, client_ip).await?);
        }
        Ok(answers)
    }

    async fn query_one(
        &self,
        fqdn: &str,
        nameserver: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<Answer, ResolverError> {
        let failed = |reason: String| ResolverError::QueryFailed {
            name: fqdn.to_string(),
            nameserver: nameserver.to_string(),
            reason,
        };

        let query = build_query(fqdn, client_ip).map_err(&failed)?;
        let request_id = query.id();
        let request = query.to_vec().map_err(|e| failed(e.to_string()))?;

        let target = resolve_nameserver(nameserver).await.map_err(&failed)?;
        let bind: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| failed(e.to_string()))?;
        socket
            .connect(target)
            .await
            .map_err(|e| failed(e.to_string()))?;

        debug!(
            name = %fqdn,
            nameserver = %nameserver,
            client_ip = ?client_ip,
            "Sending DNS query"
        );

        let exchange = async {
            socket.send(&request).await?;
            let mut buf = vec![0u8; usize::from(EDNS_UDP_PAYLOAD_SIZE)];
            loop {
                let len = socket.recv(&mut buf).await?;
                match Message::from_vec(&buf[..len]) {
                    Ok(response) if response.id() == request_id => {
                        return Ok::<Message, std::io::Error>(response)
                    }
                    Ok(response) => {
                        warn!(
                            nameserver = %nameserver,
                            expected = request_id,
                            got = response.id(),
                            "Ignoring DNS response with mismatched id"
                        );
                    }
                    Err(e) => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            e.to_string(),
                        ))
                    }
                }
            }
        };

        let response = timeout(self.timeout, exchange)
            .await
            .map_err(|_| ResolverError::Timeout {
                name: fqdn.to_string(),
                nameserver: nameserver.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| failed(e.to_string()))?;

        summarize_answer(&response, nameserver).ok_or_else(|| ResolverError::NoAnswer {
            name: fqdn.to_string(),
            nameserver: nameserver.to_string(),
            rcode: response.response_code().to_string(),
        })
    }
}

#[async_trait]
impl ResolverClient for UdpResolver {
    async fn resolve_with_subnet(
        &self,
        fqdn: &str,
        client_ip: IpAddr,
    ) -> Result<Vec<Answer>, ResolverError> {
        self.query_all(fqdn, Some(client_ip)).await
    }

    async fn resolve(&self, fqdn: &str) -> Result<Vec<Answer>, ResolverError> {
        self.query_all(fqdn, None).await
    }
}

fn with_default_port(nameserver: &str) -> String {
    if nameserver.parse::<SocketAddr>().is_ok() {
        return nameserver.to_string();
    }
    if let Ok(ip) = nameserver.parse::<IpAddr>() {
        return SocketAddr::new(ip, DNS_PORT).to_string();
    }
    if nameserver.contains(':') {
        nameserver.to_string()
    } else {
        format!("{nameserver}:{DNS_PORT}")
    }
}

async fn resolve_nameserver(nameserver: &str) -> Result<SocketAddr, String> {
    lookup_host(nameserver)
        .await
        .map_err(|e| e.to_string())?
        .next()
        .ok_or_else(|| format!("{nameserver} does not resolve to any address"))
}

fn build_query(fqdn: &str, client_ip: Option<IpAddr>) -> Result<Message, String> {
    let name = Name::from_ascii(format!("{}.", fqdn.trim_end_matches('.')))
        .map_err(|e| e.to_string())?;

    let mut edns = Edns::new();
    edns.set_max_payload(EDNS_UDP_PAYLOAD_SIZE);
    if let Some(ip) = client_ip {
        edns.options_mut().insert(client_subnet_option(ip));
    }

    let mut message = Message::new();
    message
        .set_id(rand::random::<u16>())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(false)
        .add_query(Query::query(name, RecordType::A));
    message.set_edns(edns);
    Ok(message)
}

/// Summarize a response: the first address record, with the highest TTL of all the
/// records of the answer section.
fn summarize_answer(response: &Message, nameserver: &str) -> Option<Answer> {
    if response.response_code() != ResponseCode::NoError {
        return None;
    }
    let answers = response.answers();
    let address = answers.iter().find_map(|record| match record.data() {
        Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
        Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
        _ => None,
    })?;
    let ttl = answers.iter().map(|record| record.ttl()).max().unwrap_or(0);
    Some(Answer {
        nameserver: nameserver.to_string(),
        address,
        ttl,
    })
}

#[cfg(test)]
#[path = "udp_tests.rs"]
mod udp_tests;
