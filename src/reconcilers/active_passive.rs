// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Active/passive records.
//!
//! An active/passive record is served from exactly one datacenter. Pooling a
//! datacenter moves the record there; depooling its only datacenter asks the operator
//! where to move it. Every switch goes through [`super::skip_or_move`], which writes the
//! new datacenter before removing the old one.
//!
//! A record found pooled in more than one datacenter was edited by hand and is left
//! alone until someone fixes it.

use tracing::info;

use super::{describe_set, ReconciliationEngine, RecordOutcome};
use crate::dns_errors::ReconcileError;
use crate::record::ReconciliationOperation;

impl ReconciliationEngine {
    /// Reconcile an active/passive record.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::SplitBrain`] without writing anything if the record is
    /// pooled in several datacenters, [`ReconcileError::MultiTarget`] if the desired
    /// state has several members, or any error of the switch itself.
    pub(crate) async fn reconcile_active_passive(
        &self,
        operation: &ReconciliationOperation,
        emergency: bool,
    ) -> Result<RecordOutcome, ReconcileError> {
        let record = operation.record();
        let before = operation.before_state();

        if before.len() > 1 {
            return Err(ReconcileError::SplitBrain {
                record: record.name().to_string(),
                pooled: before.iter().cloned().collect(),
            });
        }

        let desired = operation.desired_state();
        if desired.len() > 1 {
            return Err(ReconcileError::MultiTarget {
                record: record.name().to_string(),
                desired: desired.into_iter().collect(),
            });
        }

        if desired == *before {
            info!(record = %record.name(), "Service is already in the desired state");
            return Ok(RecordOutcome::no_op(
                record,
                format!("pooled in {}", describe_set(before)),
            ));
        }

        let from = before.iter().next().map(String::as_str);
        let to = desired.iter().next().map(String::as_str);
        self.skip_or_move(operation, from, to, emergency).await
    }
}

#[cfg(test)]
#[path = "active_passive_tests.rs"]
mod active_passive_tests;
