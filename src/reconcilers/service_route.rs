// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pool or depool a list of services in one datacenter.
//!
//! Unlike a datacenter run, routing doesn't care about topology: the named records
//! are pooled or depooled in the datacenter as asked. To make the change visible
//! quickly, the TTL of the records is brought to [`DNS_TTL_MEDIUM`] first, and the
//! records are checked only once the previous TTL has expired everywhere.

use chrono::Utc;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::{ReconciliationEngine, RecordOutcome, RunReport};
use crate::constants::DNS_TTL_MEDIUM;
use crate::dns_errors::{CatalogError, ReconcileError};
use crate::metrics;
use crate::record::{Action, DiscoveryRecord};

impl ReconciliationEngine {
    /// Pool or depool `services` in `datacenter`.
    ///
    /// Services already in the requested state are no-ops. When `wipe_cache` is set,
    /// the recursor caches are wiped for the changed records in one batch; a failed
    /// wipe is reported as a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog can't be read or a service is not a discovery
    /// record of the catalog, before anything is written.
    pub async fn route_services(
        &self,
        action: Action,
        datacenter: &str,
        services: &[String],
        wipe_cache: bool,
    ) -> Result<RunReport, CatalogError> {
        let started = Instant::now();
        let catalog = self.enumerate(true, &BTreeSet::new()).await?;
        let records = services
            .iter()
            .map(|name| {
                catalog
                    .find(name)
                    .cloned()
                    .ok_or_else(|| CatalogError::UnknownRecord { name: name.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = RunReport::new(Some(datacenter));
        let pooled = action == Action::Pool;
        let mut changing = Vec::new();
        for record in records {
            match self
                .control_plane
                .get_pooled(record.name(), datacenter)
                .await
            {
                Ok(state) if state == pooled => push(
                    &mut report,
                    RecordOutcome::no_op(&record, format!("already {action}ed in {datacenter}")),
                ),
                Ok(_) => changing.push(record),
                Err(e) => push(
                    &mut report,
                    RecordOutcome::from_error(&record, &ReconcileError::from(e)),
                ),
            }
        }
        if changing.is_empty() {
            info!("All services are already in the desired state");
            return Ok(report);
        }

        let names: Vec<String> = changing.iter().map(|r| r.name().to_string()).collect();
        let old_ttl = match self.ttl.set_ttls(&names, DNS_TTL_MEDIUM).await {
            Ok(ttl) => ttl,
            Err(e) => {
                error!(error = %e, "Failed to set the TTL, not touching any service");
                for record in &changing {
                    push(&mut report, RecordOutcome::from_error(record, &e));
                }
                return Ok(report);
            }
        };

        let mut changed = Vec::new();
        for record in changing {
            let written = match action {
                Action::Pool => record.pool(self.control_plane.as_ref(), datacenter).await,
                Action::Depool => record.depool(self.control_plane.as_ref(), datacenter).await,
            };
            match written {
                Ok(()) => changed.push(record),
                Err(e) => push(
                    &mut report,
                    RecordOutcome::from_error(&record, &ReconcileError::from(e)),
                ),
            }
        }

        let wait = Duration::from_secs(u64::from(old_ttl));
        let deadline = tokio::time::Instant::now() + wait;
        let propagated_at = Utc::now()
            + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::zero());

        if wipe_cache {
            let fqdns: Vec<String> = changed
                .iter()
                .map(|r| self.config.fqdn(r.name()))
                .collect();
            if let Err(e) = self.cache.wipe_for(&fqdns).await {
                warn!(error = %e, "Failed to wipe recursor caches");
                report.warnings.push(format!("cache wipe failed: {e}"));
            }
        }

        info!(
            propagated_at = %propagated_at.to_rfc3339(),
            "Waiting for the old TTL to expire before checking"
        );
        tokio::time::sleep_until(deadline).await;

        for record in &changed {
            let outcome = self.routed_outcome(record, action, datacenter).await;
            push(&mut report, outcome);
        }
        metrics::record_run_duration("route", started.elapsed());
        Ok(report)
    }

    async fn routed_outcome(
        &self,
        record: &DiscoveryRecord,
        action: Action,
        datacenter: &str,
    ) -> RecordOutcome {
        match self
            .checker
            .check_record(record, self.control_plane.as_ref())
            .await
        {
            Ok(_) => RecordOutcome::applied(record, format!("{action}ed in {datacenter}")),
            Err(e) => {
                error!(record = %record.name(), error = %e, "Routed service failed its check");
                RecordOutcome::from_error(record, &e)
            }
        }
    }
}

fn push(report: &mut RunReport, outcome: RecordOutcome) {
    metrics::record_outcome(outcome.topology, outcome.outcome.as_str(), outcome.reason);
    report.outcomes.push(outcome);
}

#[cfg(test)]
#[path = "service_route_tests.rs"]
mod service_route_tests;
