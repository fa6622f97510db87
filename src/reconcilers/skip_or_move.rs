// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator-confirmed switch of a record to another datacenter.
//!
//! Entered when an active/active record would end up pooled nowhere, and for every
//! active/passive switch. The operator either skips the record, which leaves it
//! untouched, or moves it:
//!
//! 1. the destination is pooled;
//! 2. the original datacenter is depooled, if it is a core datacenter;
//! 3. DNS is verified and caches are wiped as for any other change.
//!
//! When no destination is given and only one other datacenter has an endpoint, it is
//! proposed without asking. Otherwise the operator picks one after choosing to move.
//! A cancelled or invalid answer leaves the record untouched.

use tracing::{info, warn};

use super::{applied_detail, ReconciliationEngine, RecordOutcome};
use crate::dns_errors::{PromptError, ReconcileError};
use crate::record::{DiscoveryRecord, ReconciliationOperation};

/// Answer that moves the record.
pub const MOVE: &str = "move";

/// Answer that leaves the record alone.
pub const SKIP: &str = "skip";

impl ReconciliationEngine {
    /// Ask the operator whether to skip `operation`'s record or move it away from
    /// `from` (`None` when it isn't pooled anywhere) to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::OperatorCancelled`] if the prompt wasn't answered
    /// validly, or any error of the writes and the verification.
    pub(crate) async fn skip_or_move(
        &self,
        operation: &ReconciliationOperation,
        from: Option<&str>,
        to: Option<&str>,
        emergency: bool,
    ) -> Result<RecordOutcome, ReconcileError> {
        let record = operation.record();
        let fqdn = self.config.fqdn(record.name());
        let candidates: Vec<String> = record
            .datacenters()
            .filter(|dc| Some(*dc) != from)
            .map(str::to_string)
            .collect();

        let mut selected = match to {
            Some(to) => Some(to.to_string()),
            None if candidates.len() == 1 => candidates.first().cloned(),
            None => None,
        };
        if selected.is_none() && candidates.is_empty() {
            warn!(record = %record.name(), "No other datacenter to move the service to");
            return Ok(RecordOutcome::skipped(
                record,
                "NoCandidate",
                "no other datacenter to move to".to_string(),
            ));
        }

        let question = format!(
            "{fqdn} is only pooled in {}: skip or move to {}?",
            from.unwrap_or("none"),
            selected.as_deref().unwrap_or("another datacenter")
        );
        let answer = self
            .prompt
            .ask_choice(&question, &[MOVE.to_string(), SKIP.to_string()])
            .await
            .map_err(|e| cancelled(record, &e))?;
        if answer == SKIP {
            info!(record = %record.name(), "Skipping service on operator request");
            return Ok(RecordOutcome::skipped(
                record,
                "OperatorSkipped",
                "skipped by the operator".to_string(),
            ));
        }

        let destination = match selected.take() {
            Some(destination) => destination,
            None => self
                .prompt
                .ask_choice("Please pick a datacenter to move to", &candidates)
                .await
                .map_err(|e| cancelled(record, &e))?,
        };

        let control_plane = self.control_plane.as_ref();
        let mut expected = operation.before_state().clone();
        record.pool(control_plane, &destination).await?;
        expected.insert(destination.clone());
        // A record pooled nowhere before has nothing to depool.
        if let Some(from) = from.filter(|dc| self.config.is_core(dc)) {
            record.depool(control_plane, from).await?;
            expected.remove(from);
        }

        let warnings = self
            .verify_and_invalidate(record, &expected, emergency)
            .await?;
        Ok(RecordOutcome::applied(
            record,
            applied_detail(
                format!("moved from {} to {destination}", from.unwrap_or("none")),
                &warnings,
            ),
        ))
    }
}

fn cancelled(record: &DiscoveryRecord, err: &PromptError) -> ReconcileError {
    warn!(record = %record.name(), error = %err, "Invalid responses, not acting on the record");
    ReconcileError::OperatorCancelled {
        record: record.name().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
#[path = "skip_or_move_tests.rs"]
mod skip_or_move_tests;
