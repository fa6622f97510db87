// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Read-only entry points.
//!
//! - [`ReconciliationEngine::status`] reports, per record and per datacenter, whether the
//!   record is pooled there.
//! - [`ReconciliationEngine::check`] audits records by checking that DNS answers match
//!   their live pooled state.
//!
//! Neither writes to the control plane.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{error, info};

use super::{ReconciliationEngine, RecordOutcome, RunReport};
use crate::catalog::EnumeratedRecords;
use crate::dns_errors::{CatalogError, ControlPlaneError};
use crate::metrics;
use crate::record::{DiscoveryRecord, Topology};

/// Pooled state of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordStatus {
    pub record: String,
    pub topology: Topology,
    /// Requested datacenter -> pooled
    pub pooled: BTreeMap<String, bool>,
}

impl RecordStatus {
    #[must_use]
    pub fn is_pooled_in(&self, datacenter: &str) -> bool {
        self.pooled.get(datacenter).copied().unwrap_or(false)
    }
}

/// Result of [`ReconciliationEngine::status`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub datacenters: Vec<String>,
    pub records: Vec<RecordStatus>,
    /// Records whose state could not be read
    pub skipped: Vec<String>,
}

impl StatusReport {
    /// Records pooled in `datacenter`.
    pub fn pooled_in<'a>(&'a self, datacenter: &'a str) -> impl Iterator<Item = &'a RecordStatus> {
        self.records.iter().filter(move |r| r.is_pooled_in(datacenter))
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for datacenter in &self.datacenters {
            writeln!(f, "=== POOLED SERVICES IN {} ===", datacenter.to_uppercase())?;
            for status in self.pooled_in(datacenter) {
                writeln!(f, "{:<30}{:<20}", status.record, status.topology.as_str())?;
            }
        }
        if !self.skipped.is_empty() {
            writeln!(f, "=== SKIPPED SERVICES ===")?;
            for name in &self.skipped {
                writeln!(f, "{name}")?;
            }
        }
        Ok(())
    }
}

impl ReconciliationEngine {
    /// Report whether each record is pooled in each of `datacenters`.
    ///
    /// Active/passive records are included, and so are the services configured as
    /// excluded from datacenter switches: only `exclusions` are left out. A record
    /// whose state can't be read is listed as skipped instead of failing the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog can't be read.
    pub async fn status(
        &self,
        datacenters: &[String],
        exclusions: &BTreeSet<String>,
    ) -> Result<StatusReport, CatalogError> {
        let records = self.enumerate(true, exclusions).await?;
        let mut report = StatusReport {
            datacenters: datacenters.to_vec(),
            ..StatusReport::default()
        };

        for record in records.iter() {
            match self.pooled_map(record, datacenters).await {
                Ok(pooled) => report.records.push(RecordStatus {
                    record: record.name().to_string(),
                    topology: record.topology(),
                    pooled,
                }),
                Err(e) => {
                    error!(record = %record.name(), error = %e, "Can't fetch status, skipping");
                    report.skipped.push(record.name().to_string());
                }
            }
        }
        Ok(report)
    }

    async fn pooled_map(
        &self,
        record: &DiscoveryRecord,
        datacenters: &[String],
    ) -> Result<BTreeMap<String, bool>, ControlPlaneError> {
        let mut pooled = BTreeMap::new();
        for datacenter in datacenters {
            let state = match self
                .control_plane
                .get_pooled(record.name(), datacenter)
                .await
            {
                Ok(state) => state,
                // No object there: the record has no endpoint in that datacenter
                Err(ControlPlaneError::NotFound { .. }) => false,
                Err(e) => return Err(e),
            };
            pooled.insert(datacenter.clone(), state);
        }
        Ok(pooled)
    }

    /// Check the named records against their live pooled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog can't be read or a name is not a discovery
    /// record of the catalog. Nothing is checked in that case.
    pub async fn check(&self, names: &[String]) -> Result<RunReport, CatalogError> {
        let records = self.enumerate(true, &BTreeSet::new()).await?;
        let mut selected = EnumeratedRecords::default();
        for name in names {
            let record = records
                .find(name)
                .cloned()
                .ok_or_else(|| CatalogError::UnknownRecord { name: name.clone() })?;
            if record.is_active_active() {
                selected.active_active.push(record);
            } else {
                selected.active_passive.push(record);
            }
        }
        Ok(self.audit(&selected).await)
    }

    /// Check every record, one outcome each: no-op when DNS matches, failed otherwise.
    pub(crate) async fn audit(&self, records: &EnumeratedRecords) -> RunReport {
        let mut report = RunReport::new(None);
        for record in records.iter() {
            let outcome = match self
                .checker
                .check_record(record, self.control_plane.as_ref())
                .await
            {
                Ok(attempts) => {
                    info!(record = %record.name(), attempts, "DNS matches the pooled state");
                    RecordOutcome::no_op(
                        record,
                        format!("DNS matches the pooled state after {attempts} attempt(s)"),
                    )
                }
                Err(e) => {
                    error!(record = %record.name(), error = %e, "DNS does not match the pooled state");
                    RecordOutcome::from_error(record, &e)
                }
            };
            metrics::record_outcome(record.topology(), outcome.outcome.as_str(), outcome.reason);
            report.outcomes.push(outcome);
        }
        report
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
