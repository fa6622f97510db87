// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of discovery records against an operator action.
//!
//! The [`ReconciliationEngine`] is the single entry point of a run. For every record
//! selected by the [`CatalogFilter`] it:
//!
//! 1. **Snapshots** the pooled set from the control plane (kept for rollback)
//! 2. **Computes** the desired set from the action and the record topology
//! 3. **Applies** the difference, pooling before depooling
//! 4. **Verifies** DNS against the desired set and wipes the recursor caches
//!
//! Records are handled one at a time. A failure on one record is reported in its
//! outcome and the run moves on to the next one; only catalog errors abort a run.
//!
//! # Topologies
//!
//! - [`active_active`] - records that may be served from several datacenters
//! - [`active_passive`] - records served from exactly one datacenter
//! - [`skip_or_move`] - the operator-confirmed path taken when a record would end up
//!   pooled nowhere
//!
//! # Other entry points
//!
//! - [`ReconciliationEngine::rollback`] - replay captured before-states
//! - [`ReconciliationEngine::status`] - read-only pooled state per datacenter
//! - [`ReconciliationEngine::check`] - standalone DNS audit
//! - [`ReconciliationEngine::route_services`] - per-service pool/depool with TTL handling
//!
//! # Example
//!
//! ```rust,no_run
//! use dnsdisc::reconcilers::{ReconciliationEngine, RunAction, RunRequest};
//!
//! # async fn example(engine: ReconciliationEngine) -> anyhow::Result<()> {
//! let request = RunRequest::new(RunAction::Depool, "codfw");
//! let report = engine.run(&request).await?;
//! if !report.success() {
//!     engine.rollback(&report, request.emergency).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod active_active;
pub mod active_passive;
pub mod retry;
pub mod service_route;
pub mod skip_or_move;
pub mod status;

pub use status::{RecordStatus, StatusReport};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::CacheInvalidator;
use crate::catalog::{CatalogFilter, EnumeratedRecords, ServiceCatalog};
use crate::checker::ConsistencyChecker;
use crate::config::EngineConfig;
use crate::confctl::ControlPlaneClient;
use crate::dns::ResolverClient;
use crate::dns_errors::{CatalogError, ReconcileError};
use crate::metrics;
use crate::prompt::OperatorPrompt;
use crate::record::{
    Action, DatacenterSet, DiscoveryRecord, Intent, ReconciliationOperation, Topology,
};
use crate::remote::RemoteCommandExecutor;
use crate::ttl::TtlManager;

/// What a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAction {
    Pool,
    Depool,
    /// Audit every record against DNS without writing anything
    Status,
}

impl RunAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Depool => "depool",
            Self::Status => "status",
        }
    }

    /// The control-plane action, if this run writes.
    #[must_use]
    pub fn action(self) -> Option<Action> {
        match self {
            Self::Pool => Some(Action::Pool),
            Self::Depool => Some(Action::Depool),
            Self::Status => None,
        }
    }
}

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub action: RunAction,
    pub target_datacenter: String,
    /// Also act on active/passive records
    pub include_active_passive: bool,
    /// Skip per-record verification and wipe the whole zone at the end instead
    pub emergency: bool,
    /// Services or records to leave alone, on top of the configured exclusions
    pub exclusions: BTreeSet<String>,
}

impl RunRequest {
    #[must_use]
    pub fn new(action: RunAction, target_datacenter: &str) -> Self {
        Self {
            action,
            target_datacenter: target_datacenter.to_string(),
            include_active_passive: false,
            emergency: false,
            exclusions: BTreeSet::new(),
        }
    }
}

/// Final disposition of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Control-plane writes were made
    Applied,
    /// Already in the desired state, nothing written
    NoOp,
    /// Left untouched on purpose (operator choice, manual intervention required)
    Skipped,
    Failed,
}

impl Outcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::NoOp => "noop",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one record, as listed in a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub record: String,
    pub topology: Topology,
    pub outcome: Outcome,
    /// Human readable detail
    pub detail: String,
    /// Reason code for skips and failures
    pub reason: Option<&'static str>,
}

impl RecordOutcome {
    fn new(
        record: &DiscoveryRecord,
        outcome: Outcome,
        detail: String,
        reason: Option<&'static str>,
    ) -> Self {
        Self {
            record: record.name().to_string(),
            topology: record.topology(),
            outcome,
            detail,
            reason,
        }
    }

    #[must_use]
    pub fn applied(record: &DiscoveryRecord, detail: String) -> Self {
        Self::new(record, Outcome::Applied, detail, None)
    }

    #[must_use]
    pub fn no_op(record: &DiscoveryRecord, detail: String) -> Self {
        Self::new(record, Outcome::NoOp, detail, None)
    }

    #[must_use]
    pub fn skipped(record: &DiscoveryRecord, reason: &'static str, detail: String) -> Self {
        Self::new(record, Outcome::Skipped, detail, Some(reason))
    }

    /// Map a per-record error to its outcome.
    ///
    /// Manual-intervention cases and operator cancellations leave the record untouched
    /// and are skips; anything else is a failure.
    #[must_use]
    pub fn from_error(record: &DiscoveryRecord, err: &ReconcileError) -> Self {
        let outcome = match err {
            ReconcileError::SplitBrain { .. }
            | ReconcileError::MultiTarget { .. }
            | ReconcileError::OperatorCancelled { .. } => Outcome::Skipped,
            _ => Outcome::Failed,
        };
        Self::new(record, outcome, err.to_string(), Some(err.status_reason()))
    }

    /// Whether an operator should look at this record.
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped | Outcome::Failed)
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<30}{:<10}", self.record, self.outcome)?;
        if let Some(reason) = self.reason {
            write!(f, "[{reason}] ")?;
        }
        f.write_str(&self.detail)
    }
}

/// Pooled set of a record captured before a run touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub record: DiscoveryRecord,
    pub before_state: DatacenterSet,
}

/// Result of a run: one outcome per enumerated record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<RecordOutcome>,
    /// Before-states, used by [`ReconciliationEngine::rollback`]
    pub snapshots: Vec<Snapshot>,
    pub target_datacenter: Option<String>,
    /// Run-level problems that did not fail any record
    pub warnings: Vec<String>,
}

impl RunReport {
    #[must_use]
    pub fn new(target_datacenter: Option<&str>) -> Self {
        Self {
            target_datacenter: target_datacenter.map(str::to_string),
            ..Self::default()
        }
    }

    /// True when no record failed. Skipped records are listed but don't fail a run.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.outcomes.iter().any(|o| o.outcome == Outcome::Failed)
    }

    /// Number of records with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }

    /// Outcome of a record, by name.
    #[must_use]
    pub fn outcome(&self, record: &str) -> Option<&RecordOutcome> {
        self.outcomes.iter().find(|o| o.record == record)
    }

    /// Records an operator has to look at.
    pub fn needs_attention(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|o| o.needs_attention())
    }

    /// Whether the run wrote anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.count(Outcome::Applied) > 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{outcome}")?;
        }
        let attention: Vec<_> = self.needs_attention().collect();
        if !attention.is_empty() {
            writeln!(f, "=== RECORDS NEEDING ATTENTION ===")?;
            for outcome in attention {
                writeln!(f, "{outcome}")?;
            }
        }
        for warning in &self.warnings {
            writeln!(f, "WARNING: {warning}")?;
        }
        write!(
            f,
            "applied: {}, noop: {}, skipped: {}, failed: {}",
            self.count(Outcome::Applied),
            self.count(Outcome::NoOp),
            self.count(Outcome::Skipped),
            self.count(Outcome::Failed)
        )
    }
}

/// Drives pool/depool/rollback runs over the discovery records of the catalog.
pub struct ReconciliationEngine {
    config: Arc<EngineConfig>,
    control_plane: Arc<dyn ControlPlaneClient>,
    catalog: Arc<dyn ServiceCatalog>,
    prompt: Arc<dyn OperatorPrompt>,
    checker: ConsistencyChecker,
    cache: CacheInvalidator,
    ttl: TtlManager,
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(
        config: Arc<EngineConfig>,
        control_plane: Arc<dyn ControlPlaneClient>,
        resolver: Arc<dyn ResolverClient>,
        executor: Arc<dyn RemoteCommandExecutor>,
        catalog: Arc<dyn ServiceCatalog>,
        prompt: Arc<dyn OperatorPrompt>,
    ) -> Self {
        let checker = ConsistencyChecker::new(resolver.clone(), config.clone());
        let cache = CacheInvalidator::new(
            executor,
            &config.recursor_hosts,
            &config.authdns_hosts,
            &config.zone,
        );
        let ttl = TtlManager::new(control_plane.clone(), resolver, &config.zone);
        Self {
            config,
            control_plane,
            catalog,
            prompt,
            checker,
            cache,
            ttl,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Exclusions of a run: the request's, plus the configured ones for pool/depool.
    ///
    /// Configured services need manual switching, so only datacenter switches skip
    /// them. Audits and per-service entry points still see them.
    fn run_exclusions(&self, request: &RunRequest) -> BTreeSet<String> {
        let mut exclusions = request.exclusions.clone();
        if request.action.action().is_some() {
            exclusions.extend(self.config.excluded_services.keys().cloned());
        }
        exclusions
    }

    async fn enumerate(
        &self,
        include_active_passive: bool,
        exclusions: &BTreeSet<String>,
    ) -> Result<EnumeratedRecords, CatalogError> {
        CatalogFilter::enumerate(self.catalog.as_ref(), include_active_passive, exclusions).await
    }

    /// Execute a run.
    ///
    /// Every enumerated record gets exactly one outcome in the report.
    ///
    /// # Errors
    ///
    /// Returns an error only if the catalog can't be read, before anything is written.
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, CatalogError> {
        let started = Instant::now();
        let records = self
            .enumerate(
                request.include_active_passive,
                &self.run_exclusions(request),
            )
            .await?;

        let Some(action) = request.action.action() else {
            let report = self.audit(&records).await;
            metrics::record_run_duration(request.action.as_str(), started.elapsed());
            return Ok(report);
        };

        info!(
            action = %action,
            datacenter = %request.target_datacenter,
            records = records.len(),
            emergency = request.emergency,
            "Starting run"
        );

        let mut report = RunReport::new(Some(&request.target_datacenter));
        let total = records.len();
        for (index, record) in records.iter().enumerate() {
            info!(
                "[{}/{}] Handling {} service {}",
                index + 1,
                total,
                short_label(record.topology()),
                record.name()
            );
            let (outcome, before_state) = self
                .reconcile_record(
                    record.clone(),
                    &request.target_datacenter,
                    Intent::Apply(action),
                    request.emergency,
                )
                .await;
            if let Some(before_state) = before_state {
                report.snapshots.push(Snapshot {
                    record: record.clone(),
                    before_state,
                });
            }
            report.outcomes.push(outcome);
        }

        self.finish(&mut report, request.emergency).await;
        metrics::record_run_duration(request.action.as_str(), started.elapsed());
        info!(
            applied = report.count(Outcome::Applied),
            failed = report.count(Outcome::Failed),
            skipped = report.count(Outcome::Skipped),
            "Run finished"
        );
        Ok(report)
    }

    /// Bring every record of `report` back to its captured before-state.
    ///
    /// This is another forward reconciliation: pooling still happens before depooling,
    /// the same checks run, and a record that would end up pooled nowhere goes through
    /// skip-or-move. Active/passive records are restored first.
    pub async fn rollback(&self, report: &RunReport, emergency: bool) -> RunReport {
        let started = Instant::now();
        let target = report.target_datacenter.clone().unwrap_or_default();
        let mut rollback = RunReport::new(report.target_datacenter.as_deref());
        info!(records = report.snapshots.len(), "Rolling back to the state before the run");

        let (active_passive, active_active): (Vec<_>, Vec<_>) = report
            .snapshots
            .iter()
            .partition(|s| !s.record.is_active_active());

        for snapshot in active_passive.into_iter().chain(active_active) {
            let (outcome, _) = self
                .reconcile_record(
                    snapshot.record.clone(),
                    &target,
                    Intent::Restore(snapshot.before_state.clone()),
                    emergency,
                )
                .await;
            rollback.outcomes.push(outcome);
        }

        self.finish(&mut rollback, emergency).await;
        metrics::record_run_duration("rollback", started.elapsed());
        rollback
    }

    /// Snapshot one record and dispatch it to its topology's algorithm.
    ///
    /// Returns the outcome and the captured before-state, if the capture succeeded.
    async fn reconcile_record(
        &self,
        record: DiscoveryRecord,
        target_datacenter: &str,
        intent: Intent,
        emergency: bool,
    ) -> (RecordOutcome, Option<DatacenterSet>) {
        let topology = record.topology();
        let operation = match ReconciliationOperation::capture(
            record.clone(),
            target_datacenter,
            intent,
            self.control_plane.as_ref(),
        )
        .await
        {
            Ok(operation) => operation,
            Err(e) => {
                let err = ReconcileError::from(e);
                error!(record = %record.name(), error = %err, "Can't read the pooled state, skipping");
                let outcome = RecordOutcome::from_error(&record, &err);
                metrics::record_outcome(topology, outcome.outcome.as_str(), outcome.reason);
                return (outcome, None);
            }
        };

        let result = match topology {
            Topology::ActiveActive => self.reconcile_active_active(&operation, emergency).await,
            Topology::ActivePassive => self.reconcile_active_passive(&operation, emergency).await,
        };
        let outcome = result.unwrap_or_else(|e| {
            if e.requires_manual_intervention() {
                error!(record = %record.name(), error = %e, "Manual intervention required");
            } else {
                error!(record = %record.name(), error = %e, "Reconciliation failed");
            }
            RecordOutcome::from_error(&record, &e)
        });
        metrics::record_outcome(topology, outcome.outcome.as_str(), outcome.reason);
        (outcome, Some(operation.before_state().clone()))
    }

    /// Check DNS against `expected` and invalidate caches for the record.
    ///
    /// In emergency mode nothing is checked or wiped here; the whole zone is wiped at
    /// the end of the run instead. Cleanup and wipe failures don't fail the record and
    /// are returned as warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if DNS did not converge; caches are then left alone.
    pub(crate) async fn verify_and_invalidate(
        &self,
        record: &DiscoveryRecord,
        expected: &DatacenterSet,
        emergency: bool,
    ) -> Result<Vec<String>, ReconcileError> {
        if emergency {
            debug!(record = %record.name(), "Emergency mode, skipping verification");
            return Ok(Vec::new());
        }

        tokio::time::sleep(self.config.settle_delay()).await;
        self.checker.check(record, expected).await?;

        let mut warnings = Vec::new();
        if !record.is_active_active() {
            if let Err(e) = self.cache.clean_transition_markers(record.name()).await {
                warn!(record = %record.name(), error = %e, "Failed to clean discovery template markers");
                warnings.push(format!("template marker cleanup failed: {e}"));
            }
        }
        let fqdn = self.config.fqdn(record.name());
        if let Err(e) = self.cache.wipe_for(&[fqdn]).await {
            warn!(record = %record.name(), error = %e, "Failed to wipe recursor caches");
            warnings.push(format!("cache wipe failed: {e}"));
        }
        Ok(warnings)
    }

    /// Run-level cleanup: the blind zone wipe of emergency mode.
    async fn finish(&self, report: &mut RunReport, emergency: bool) {
        if !emergency || !report.has_changes() {
            return;
        }
        warn!("Emergency mode: wiping the whole discovery zone from the recursor caches");
        if let Err(e) = self
            .cache
            .emergency_wipe(self.config.emergency_wipe_interval())
            .await
        {
            error!(error = %e, "Emergency zone wipe failed");
            report.warnings.push(format!("emergency zone wipe failed: {e}"));
        }
    }
}

/// `A/A` or `A/P`, as shown in progress lines.
fn short_label(topology: Topology) -> &'static str {
    match topology {
        Topology::ActiveActive => "A/A",
        Topology::ActivePassive => "A/P",
    }
}

/// Comma separated datacenters, or `none`.
pub(crate) fn describe_set(set: &DatacenterSet) -> String {
    if set.is_empty() {
        "none".to_string()
    } else {
        set.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

/// Detail of an applied outcome, with the warnings collected on the way.
pub(crate) fn applied_detail(summary: String, warnings: &[String]) -> String {
    if warnings.is_empty() {
        summary
    } else {
        format!("{summary} ({})", warnings.join("; "))
    }
}
