// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `active_passive.rs`

#[cfg(test)]
mod tests {
    use crate::dns_errors::ReconcileError;
    use crate::reconcilers::{Outcome, RunAction, RunRequest};
    use crate::record::{Intent, ReconciliationOperation};
    use crate::testing::{set, svc_b, Harness, Write};

    fn request(action: RunAction, datacenter: &str) -> RunRequest {
        RunRequest {
            include_active_passive: true,
            ..RunRequest::new(action, datacenter)
        }
    }

    #[tokio::test]
    async fn test_depool_moves_to_other_site() {
        let h = Harness::new(&[(svc_b(), &["eqiad"])], &["move"]);

        let report = h
            .engine
            .run(&request(RunAction::Depool, "eqiad"))
            .await
            .unwrap();

        assert!(report.success());
        assert_eq!(report.outcome("svcB").unwrap().outcome, Outcome::Applied);
        assert_eq!(
            h.control_plane.writes(),
            vec![Write::pool("svcB", "codfw"), Write::depool("svcB", "eqiad")]
        );
        assert_eq!(h.control_plane.pooled_set("svcB"), set(&["codfw"]));
        assert_eq!(
            h.prompt.asked()[0].0,
            "svcB.discovery.wmnet is only pooled in eqiad: skip or move to codfw?"
        );
        // Stale template markers are cleaned before the cache wipe
        let commands = h.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with("rm -fv /var/run/confd-template/.discovery-svcB"));
        assert_eq!(
            commands[1],
            "sudo rec_control wipe-cache svcB.discovery.wmnet"
        );
    }

    #[tokio::test]
    async fn test_split_brain_is_never_touched() {
        let h = Harness::new(&[(svc_b(), &["eqiad", "codfw"])], &["move"]);

        let report = h
            .engine
            .run(&request(RunAction::Depool, "eqiad"))
            .await
            .unwrap();

        let outcome = report.outcome("svcB").unwrap();
        assert_eq!(outcome.outcome, Outcome::Skipped);
        assert_eq!(outcome.reason, Some("SplitBrain"));
        assert!(h.control_plane.writes().is_empty());
        assert!(h.prompt.asked().is_empty());
        assert_eq!(report.needs_attention().count(), 1);
    }

    #[tokio::test]
    async fn test_pool_where_already_pooled_is_noop() {
        let h = Harness::new(&[(svc_b(), &["codfw"])], &[]);

        let report = h
            .engine
            .run(&request(RunAction::Pool, "codfw"))
            .await
            .unwrap();

        assert_eq!(report.outcome("svcB").unwrap().outcome, Outcome::NoOp);
        assert!(h.control_plane.writes().is_empty());
        assert!(h.prompt.asked().is_empty());
    }

    #[tokio::test]
    async fn test_pool_moves_from_other_site() {
        let h = Harness::new(&[(svc_b(), &["eqiad"])], &["move"]);

        h.engine
            .run(&request(RunAction::Pool, "codfw"))
            .await
            .unwrap();

        assert_eq!(
            h.control_plane.writes(),
            vec![Write::pool("svcB", "codfw"), Write::depool("svcB", "eqiad")]
        );
    }

    #[tokio::test]
    async fn test_pool_unpooled_record_writes_once() {
        let h = Harness::new(&[(svc_b(), &[])], &["move"]);

        h.engine
            .run(&request(RunAction::Pool, "eqiad"))
            .await
            .unwrap();

        assert_eq!(h.control_plane.writes(), vec![Write::pool("svcB", "eqiad")]);
        assert_eq!(
            h.prompt.asked()[0].0,
            "svcB.discovery.wmnet is only pooled in none: skip or move to eqiad?"
        );
    }

    #[tokio::test]
    async fn test_active_passive_skipped_unless_requested() {
        let h = Harness::new(&[(svc_b(), &["eqiad"])], &["move"]);

        let report = h
            .engine
            .run(&RunRequest::new(RunAction::Depool, "eqiad"))
            .await
            .unwrap();

        assert!(report.outcomes.is_empty());
        assert!(h.control_plane.writes().is_empty());
    }

    #[tokio::test]
    async fn test_multi_target_is_rejected() {
        let h = Harness::new(&[(svc_b(), &["eqiad"])], &[]);
        let operation = ReconciliationOperation::with_before_state(
            svc_b(),
            "eqiad",
            Intent::Restore(set(&["eqiad", "codfw"])),
            set(&["eqiad"]),
        );

        let err = h
            .engine
            .reconcile_active_passive(&operation, false)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::MultiTarget { .. }));
        assert!(h.control_plane.writes().is_empty());
    }
}
