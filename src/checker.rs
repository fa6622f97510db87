// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Consistency check between the pooled state and what DNS actually serves.
//!
//! For every datacenter a record has an endpoint in, the record is resolved as a client
//! of that datacenter would, against every authoritative nameserver:
//!
//! - if the datacenter is pooled, the answer must be the local endpoint;
//! - otherwise the answer must be some other datacenter's endpoint.
//!
//! Any mismatch fails the whole attempt. Attempts are repeated with a constant backoff
//! because the authoritative servers pick up control-plane changes with some lag.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::confctl::ControlPlaneClient;
use crate::dns::ResolverClient;
use crate::dns_errors::{CheckError, ReconcileError};
use crate::metrics;
use crate::reconcilers::retry::ConstantBackoff;
use crate::record::{DatacenterSet, DiscoveryRecord};

/// Verifies that DNS answers match a pooled state.
#[derive(Clone)]
pub struct ConsistencyChecker {
    resolver: Arc<dyn ResolverClient>,
    config: Arc<EngineConfig>,
}

impl ConsistencyChecker {
    #[must_use]
    pub fn new(resolver: Arc<dyn ResolverClient>, config: Arc<EngineConfig>) -> Self {
        Self { resolver, config }
    }

    /// Run a single check attempt.
    ///
    /// # Errors
    ///
    /// Returns the first mismatch or lookup failure found.
    pub async fn check_once(
        &self,
        record: &DiscoveryRecord,
        desired: &DatacenterSet,
    ) -> Result<(), CheckError> {
        let fqdn = self.config.fqdn(record.name());
        for (datacenter, expected) in record.site_ips() {
            let client_ip =
                self.config
                    .client_ip(datacenter)
                    .ok_or_else(|| CheckError::UnknownDatacenter {
                        fqdn: fqdn.clone(),
                        datacenter: datacenter.clone(),
                    })?;

            let answers = self.resolver.resolve_with_subnet(&fqdn, client_ip).await?;
            let pooled = desired.contains(datacenter);
            for answer in answers {
                if pooled && answer.address != *expected {
                    return Err(CheckError::NotLocal {
                        fqdn,
                        datacenter: datacenter.clone(),
                        nameserver: answer.nameserver,
                        observed: answer.address,
                        expected: *expected,
                    });
                }
                if !pooled && answer.address == *expected {
                    return Err(CheckError::StillLocal {
                        fqdn,
                        datacenter: datacenter.clone(),
                        nameserver: answer.nameserver,
                        local: *expected,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check `record` against `desired`, retrying until it converges or attempts run out.
    ///
    /// Returns the number of attempts it took.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Divergence`] once all attempts failed, or
    /// [`ReconcileError::Check`] right away for errors that retrying can't fix.
    pub async fn check(
        &self,
        record: &DiscoveryRecord,
        desired: &DatacenterSet,
    ) -> Result<u32, ReconcileError> {
        let fqdn = self.config.fqdn(record.name());
        let mut backoff = ConstantBackoff::new(
            self.config.check_interval(),
            self.config.verification.attempts,
        );

        loop {
            let result = self.check_once(record, desired).await;
            let next = backoff.next_backoff();
            let attempt = backoff.attempts_made();

            match result {
                Ok(()) => {
                    info!(record = %fqdn, attempt, "DNS answers match the pooled state");
                    metrics::record_verification_attempts(attempt, true);
                    return Ok(attempt);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(record = %fqdn, error = %e, "Consistency check can't succeed");
                    return Err(ReconcileError::Check(e));
                }
                Err(e) => match next {
                    Some(delay) => {
                        debug!(
                            record = %fqdn,
                            attempt,
                            max_attempts = backoff.max_attempts,
                            error = %e,
                            "DNS not converged yet, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!(record = %fqdn, attempts = attempt, error = %e, "DNS did not converge");
                        metrics::record_verification_attempts(attempt, false);
                        return Err(ReconcileError::Divergence {
                            fqdn,
                            attempts: attempt,
                            last: e,
                        });
                    }
                },
            }
        }
    }

    /// Check a record against its live pooled state, outside of any pool/depool run.
    ///
    /// # Errors
    ///
    /// Returns an error if the control plane can't be read or DNS doesn't converge.
    pub async fn check_record(
        &self,
        record: &DiscoveryRecord,
        control_plane: &dyn ControlPlaneClient,
    ) -> Result<u32, ReconcileError> {
        let pooled = record.pooled_set(control_plane).await?;
        self.check(record, &pooled).await
    }
}

#[cfg(test)]
#[path = "checker_tests.rs"]
mod checker_tests;
