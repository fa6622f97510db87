// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for dnsdisc.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Discovery Zone Constants
// ============================================================================

/// Default DNS Discovery zone suffix
pub const DEFAULT_DISCOVERY_ZONE: &str = "discovery.wmnet";

/// Default core datacenters (the ones that can serve internal traffic)
pub const DEFAULT_CORE_DATACENTERS: &[&str] = &["eqiad", "codfw"];

/// Standard DNS port for queries
pub const DNS_PORT: u16 = 53;

/// Default path of the engine configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dnsdisc/config.yaml";

/// Default directory holding advisory lock slots
pub const DEFAULT_LOCK_DIR: &str = "/var/lock/dnsdisc";

// ============================================================================
// TTL Constants
// ============================================================================

/// Short TTL used right before a switchover (10 seconds)
pub const DNS_TTL_SHORT: u32 = 10;

/// Medium TTL used for routine pool/depool operations (5 minutes)
pub const DNS_TTL_MEDIUM: u32 = 300;

// ============================================================================
// EDNS Client Subnet Constants
// ============================================================================

/// Source prefix length announced for IPv4 client subnets
pub const ECS_IPV4_SOURCE_PREFIX: u8 = 24;

/// Source prefix length announced for IPv6 client subnets
pub const ECS_IPV6_SOURCE_PREFIX: u8 = 56;

/// EDNS UDP payload size advertised in queries
pub const EDNS_UDP_PAYLOAD_SIZE: u16 = 1232;

/// Timeout for a single authoritative DNS query (milliseconds)
pub const DNS_QUERY_TIMEOUT_MILLIS: u64 = 2000;

// ============================================================================
// Verification Constants
// ============================================================================

/// Maximum number of full consistency check attempts
pub const DEFAULT_CHECK_ATTEMPTS: u32 = 15;

/// Constant delay between consistency check attempts (3 seconds)
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3;

/// Delay between the control-plane writes and the first verification attempt
pub const DEFAULT_SETTLE_SECS: u64 = 1;

// ============================================================================
// Cache Invalidation Constants
// ============================================================================

/// Default host selector of the recursive resolvers
pub const DEFAULT_RECURSOR_HOSTS: &str = "A:dns-rec";

/// Default host selector of the authoritative DNS servers
pub const DEFAULT_AUTHDNS_HOSTS: &str = "A:dns-auth";

/// Delay between the two blind zone wipes in emergency mode (30 seconds)
pub const DEFAULT_EMERGENCY_WIPE_INTERVAL_SECS: u64 = 30;

/// Number of blind zone wipes performed in emergency mode
pub const EMERGENCY_WIPE_ROUNDS: u32 = 2;

/// Directory where confd keeps per-record template state on authoritative servers
pub const CONFD_TEMPLATE_STATE_DIR: &str = "/var/run/confd-template";

// ============================================================================
// Run Lock Constants
// ============================================================================

/// Lock TTL for read-only runs (1 minute)
pub const LOCK_RO_TTL_SECS: u64 = 60;

/// Lock TTL for mutating runs (10 minutes)
pub const LOCK_RW_TTL_SECS: u64 = 600;

/// Concurrency for read-only runs
pub const LOCK_RO_CONCURRENCY: usize = 20;

/// Concurrency for mutating runs
pub const LOCK_RW_CONCURRENCY: usize = 1;

// ============================================================================
// Control Plane HTTP Constants
// ============================================================================

/// Timeout for a single control-plane HTTP request (seconds)
pub const CONTROL_PLANE_TIMEOUT_SECS: u64 = 10;

/// Number of interactive attempts before a prompt is considered cancelled
pub const PROMPT_MAX_TRIES: u32 = 3;
