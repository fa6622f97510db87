// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! EDNS client subnet option (RFC 7871).
//!
//! Queries announce the subnet of a representative client of a datacenter, so the
//! authoritative servers answer as they would for that datacenter. IPv4 clients are
//! announced as a /24, IPv6 clients as a /56, with a zero scope.

use hickory_proto::rr::rdata::opt::{ClientSubnet, EdnsOption};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::constants::{ECS_IPV4_SOURCE_PREFIX, ECS_IPV6_SOURCE_PREFIX};

/// Client subnet announcing `client_ip`'s network.
///
/// Address bits past the source prefix are zeroed, as servers reject them otherwise.
#[must_use]
pub fn client_subnet(client_ip: IpAddr) -> ClientSubnet {
    match client_ip {
        IpAddr::V4(ip) => {
            let mask = u32::MAX
                .checked_shl(32 - u32::from(ECS_IPV4_SOURCE_PREFIX))
                .unwrap_or(0);
            let network = Ipv4Addr::from(u32::from(ip) & mask);
            ClientSubnet::new(IpAddr::V4(network), ECS_IPV4_SOURCE_PREFIX, 0)
        }
        IpAddr::V6(ip) => {
            let mask = u128::MAX
                .checked_shl(128 - u32::from(ECS_IPV6_SOURCE_PREFIX))
                .unwrap_or(0);
            let network = Ipv6Addr::from(u128::from(ip) & mask);
            ClientSubnet::new(IpAddr::V6(network), ECS_IPV6_SOURCE_PREFIX, 0)
        }
    }
}

/// EDNS option carrying `client_ip`'s subnet, ready to be inserted in an OPT record.
#[must_use]
pub fn client_subnet_option(client_ip: IpAddr) -> EdnsOption {
    EdnsOption::Subnet(client_subnet(client_ip))
}

#[cfg(test)]
#[path = "ecs_tests.rs"]
mod ecs_tests;
