// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for DNS Discovery reconciliation.
//!
//! This module provides specialized error types for:
//! - Service catalog loading (fatal to a whole run)
//! - Control-plane reads and writes of the pooled state (fatal to one record)
//! - Authoritative DNS lookups with EDNS client subnet
//! - Consistency checks between the control plane and what DNS answers
//! - Remote command execution on resolver fleets
//! - Operator prompts and the advisory run lock
//!
//! Per-record failures are folded into [`ReconcileError`], which carries a
//! `status_reason()` code used in run reports and metrics labels.

use std::net::IpAddr;
use thiserror::Error;

/// Errors that can occur while reading the service catalog.
///
/// Any of these aborts the whole run before a single write happens; there is no
/// partial-catalog mode.
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    /// The catalog source could not be read at all
    #[error("Service catalog at {location} is unreachable: {reason}")]
    Unreachable {
        /// Where the catalog was read from (path or URL)
        location: String,
        /// Underlying I/O or transport error
        reason: String,
    },

    /// The catalog was read but could not be parsed or is inconsistent
    #[error("Service catalog at {location} is malformed: {reason}")]
    Malformed {
        /// Where the catalog was read from (path or URL)
        location: String,
        /// Explanation of what is invalid
        reason: String,
    },

    /// A discovery record asked for by name is not in the catalog
    #[error("Discovery record {name} is not in the service catalog")]
    UnknownRecord {
        /// The requested record name
        name: String,
    },
}

/// Errors that can occur when talking to the control plane (confctl-like store).
///
/// These always abort the reconciliation of the record being handled; they are
/// never silently skipped.
#[derive(Error, Debug, Clone)]
pub enum ControlPlaneError {
    /// The control plane could not be reached (connection refused, DNS failure, timeout)
    #[error("Control plane at {endpoint} unreachable: {reason}")]
    Unreachable {
        /// The control plane endpoint
        endpoint: String,
        /// Reason for the connection failure
        reason: String,
    },

    /// The control plane answered with an error status
    #[error("Control plane request for {service}/{datacenter} failed (HTTP {status_code}): {reason}")]
    RequestFailed {
        /// The discovery service being read or written
        service: String,
        /// The datacenter being read or written (or `*` for listings)
        datacenter: String,
        /// HTTP status code returned
        status_code: u16,
        /// Response body or error message
        reason: String,
    },

    /// The control plane has no object for the requested service/datacenter
    #[error("Service {service} has no discovery object in {datacenter}")]
    NotFound {
        /// The discovery service
        service: String,
        /// The datacenter
        datacenter: String,
    },

    /// The control plane answered with something that could not be decoded
    #[error("Invalid response from control plane at {endpoint}: {reason}")]
    InvalidResponse {
        /// The control plane endpoint
        endpoint: String,
        /// Decoding error
        reason: String,
    },
}

impl ControlPlaneError {
    /// Returns true if the request may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } => true,
            Self::RequestFailed { status_code, .. } => {
                *status_code == 429 || (500..600).contains(status_code)
            }
            Self::NotFound { .. } | Self::InvalidResponse { .. } => false,
        }
    }
}

/// Errors that can occur while resolving a discovery record.
#[derive(Error, Debug, Clone)]
pub enum ResolverError {
    /// The query could not be sent or the answer could not be decoded
    #[error("DNS query for {name} against {nameserver} failed: {reason}")]
    QueryFailed {
        /// The name being resolved
        name: String,
        /// The authoritative nameserver queried
        nameserver: String,
        /// Reason for the failure
        reason: String,
    },

    /// The nameserver did not answer in time
    #[error("DNS query for {name} against {nameserver} timed out after {timeout_ms}ms")]
    Timeout {
        /// The name being resolved
        name: String,
        /// The authoritative nameserver queried
        nameserver: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// The nameserver answered without any address record for the name
    #[error("DNS record {name} has no address on {nameserver} (rcode {rcode})")]
    NoAnswer {
        /// The name being resolved
        name: String,
        /// The authoritative nameserver queried
        nameserver: String,
        /// Response code returned by the server
        rcode: String,
    },
}

/// Errors raised by a single consistency check attempt.
///
/// A mismatch on any datacenter/nameserver pair fails the whole attempt; the
/// [`crate::checker::ConsistencyChecker`] retries the full check.
#[derive(Error, Debug, Clone)]
pub enum CheckError {
    /// A pooled datacenter does not get its local address
    #[error(
        "Error checking auth dns for {fqdn} in {datacenter} on {nameserver}: resolved to {observed}, expected: {expected}"
    )]
    NotLocal {
        /// The record checked
        fqdn: String,
        /// The datacenter used as EDNS client subnet
        datacenter: String,
        /// The authoritative nameserver that answered
        nameserver: String,
        /// The address observed
        observed: IpAddr,
        /// The local address expected
        expected: IpAddr,
    },

    /// A depooled datacenter still gets its local address
    #[error(
        "Error checking auth dns for {fqdn} in {datacenter} on {nameserver}: resolved to {local}, a different IP was expected"
    )]
    StillLocal {
        /// The record checked
        fqdn: String,
        /// The datacenter used as EDNS client subnet
        datacenter: String,
        /// The authoritative nameserver that answered
        nameserver: String,
        /// The local address that should no longer be served
        local: IpAddr,
    },

    /// No representative client IP is configured for a datacenter of the record
    #[error("No client subnet configured for datacenter {datacenter} (record {fqdn})")]
    UnknownDatacenter {
        /// The record checked
        fqdn: String,
        /// The datacenter without a subnet
        datacenter: String,
    },

    /// The lookup itself failed
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

impl CheckError {
    /// Returns true if the mismatch can be explained by propagation lag and the
    /// check should be attempted again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownDatacenter { .. })
    }
}

/// Errors raised while running commands on remote hosts.
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    /// The host selector matched nothing
    #[error("Host selector '{selector}' matched no hosts")]
    NoHosts {
        /// The selector used
        selector: String,
    },

    /// The command failed on some hosts
    #[error("Command '{command}' failed on {failed}/{total} hosts: {first_error}")]
    CommandFailed {
        /// The command executed
        command: String,
        /// Number of hosts where it failed
        failed: usize,
        /// Number of hosts targeted
        total: usize,
        /// First error reported
        first_error: String,
    },
}

/// Errors raised by the operator prompt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// The operator did not provide a valid answer
    #[error("Invalid or missing answer to '{message}'")]
    Cancelled {
        /// The question asked
        message: String,
    },

    /// The prompt could not read from or write to the terminal
    #[error("Prompt I/O failed: {reason}")]
    Io {
        /// Underlying I/O error
        reason: String,
    },
}

/// Errors raised while acquiring the advisory run lock.
#[derive(Error, Debug, Clone)]
pub enum LockError {
    /// The maximum number of concurrent holders is reached
    #[error("Lock '{key}' is held by {holders} run(s) (max concurrency {concurrency})")]
    Contended {
        /// The lock key
        key: String,
        /// Current number of live holders
        holders: usize,
        /// Maximum concurrency allowed
        concurrency: usize,
    },

    /// The lock directory could not be used
    #[error("Lock storage at {path} failed: {reason}")]
    Storage {
        /// The lock path
        path: String,
        /// Underlying I/O error
        reason: String,
    },
}

/// Composite error for the reconciliation of a single discovery record.
///
/// None of these abort the run; they are turned into a per-record outcome.
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    /// An active/passive record is pooled in more than one datacenter
    #[error(
        "The discovery record {record} is A/P but pooled in multiple datacenters ({}); resolve manually using conftool",
        .pooled.join(",")
    )]
    SplitBrain {
        /// The record name
        record: String,
        /// Datacenters where the record is pooled
        pooled: Vec<String>,
    },

    /// An active/passive record would end up pooled in more than one datacenter
    #[error("Cannot pool A/P record {record} in multiple datacenters ({})", .desired.join(","))]
    MultiTarget {
        /// The record name
        record: String,
        /// The rejected desired state
        desired: Vec<String>,
    },

    /// The skip-or-move prompt was not answered validly
    #[error("Invalid responses, NOT acting on record {record}: {reason}")]
    OperatorCancelled {
        /// The record name
        record: String,
        /// What went wrong with the prompt
        reason: String,
    },

    /// Reading or writing the pooled state failed
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    /// DNS kept disagreeing with the desired state after all attempts
    #[error("Record {fqdn} diverged after {attempts} attempts: {last}")]
    Divergence {
        /// The record checked
        fqdn: String,
        /// Number of attempts performed
        attempts: u32,
        /// Error of the last attempt
        last: CheckError,
    },

    /// A non-retryable check error (e.g. configuration)
    #[error(transparent)]
    Check(#[from] CheckError),

    /// A remote command (cache wipe, stale marker cleanup) failed
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ReconcileError {
    /// Returns the reason code for this error, used in outcomes and metrics labels.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::SplitBrain { .. } => "SplitBrain",
            Self::MultiTarget { .. } => "MultiTarget",
            Self::OperatorCancelled { .. } => "OperatorCancelled",
            Self::ControlPlane(ControlPlaneError::Unreachable { .. }) => "ControlPlaneUnreachable",
            Self::ControlPlane(ControlPlaneError::RequestFailed { .. }) => {
                "ControlPlaneRequestFailed"
            }
            Self::ControlPlane(ControlPlaneError::NotFound { .. }) => "ControlPlaneNotFound",
            Self::ControlPlane(ControlPlaneError::InvalidResponse { .. }) => {
                "ControlPlaneInvalidResponse"
            }
            Self::Divergence { .. } => "RecordDivergence",
            Self::Check(_) => "CheckFailed",
            Self::Remote(_) => "RemoteCommandFailed",
        }
    }

    /// Returns true if an operator has to fix the record by hand before the engine
    /// can act on it again.
    #[must_use]
    pub fn requires_manual_intervention(&self) -> bool {
        matches!(self, Self::SplitBrain { .. } | Self::MultiTarget { .. })
    }
}

#[cfg(test)]
#[path = "dns_errors_tests.rs"]
mod dns_errors_tests;
