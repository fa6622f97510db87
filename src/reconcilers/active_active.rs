// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Active/active records.
//!
//! An active/active record may be pooled in any number of datacenters, as long as it
//! is pooled in at least one. Changes are applied by pooling the additions first and
//! depooling the removals afterwards, so the record is never pooled nowhere while the
//! writes are in flight. A change that would leave it pooled nowhere is never applied
//! directly: the operator decides through [`super::skip_or_move`].

use tracing::{info, warn};

use super::{applied_detail, describe_set, ReconciliationEngine, RecordOutcome};
use crate::dns_errors::ReconcileError;
use crate::record::{state_diff, ReconciliationOperation};

impl ReconciliationEngine {
    /// Reconcile an active/active record.
    ///
    /// # Errors
    ///
    /// Returns an error if a control-plane write fails, if DNS doesn't converge, or if
    /// the operator prompt is cancelled.
    pub(crate) async fn reconcile_active_active(
        &self,
        operation: &ReconciliationOperation,
        emergency: bool,
    ) -> Result<RecordOutcome, ReconcileError> {
        let record = operation.record();
        let before = operation.before_state();
        let desired = operation.desired_state();

        if desired == *before {
            info!(record = %record.name(), "Service is already in the desired state");
            return Ok(RecordOutcome::no_op(
                record,
                format!("pooled in {}", describe_set(before)),
            ));
        }

        if desired.is_empty() {
            warn!(
                record = %record.name(),
                "The current operation would leave the service completely depooled"
            );
            return self
                .skip_or_move(operation, Some(operation.target_datacenter()), None, emergency)
                .await;
        }

        let control_plane = self.control_plane.as_ref();
        let (additions, removals) = state_diff(before, &desired);
        for datacenter in &additions {
            record.pool(control_plane, datacenter).await?;
        }
        for datacenter in &removals {
            record.depool(control_plane, datacenter).await?;
        }

        let warnings = self
            .verify_and_invalidate(record, &desired, emergency)
            .await?;
        Ok(RecordOutcome::applied(
            record,
            applied_detail(
                format!(
                    "pooled in {} (was {})",
                    describe_set(&desired),
                    describe_set(before)
                ),
                &warnings,
            ),
        ))
    }
}

#[cfg(test)]
#[path = "active_active_tests.rs"]
mod active_active_tests;
