// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `active_active.rs`

#[cfg(test)]
mod tests {
    use crate::reconcilers::{Outcome, RunAction, RunRequest};
    use crate::record::{Action, Intent, ReconciliationOperation};
    use crate::testing::{set, svc_a, svc_c, Harness, Write};

    #[tokio::test]
    async fn test_depool_one_of_two_sites() {
        let h = Harness::new(&[(svc_a(), &["eqiad", "codfw"])], &[]);

        let report = h
            .engine
            .run(&RunRequest::new(RunAction::Depool, "eqiad"))
            .await
            .unwrap();

        assert!(report.success());
        assert_eq!(report.outcome("svcA").unwrap().outcome, Outcome::Applied);
        assert_eq!(h.control_plane.writes(), vec![Write::depool("svcA", "eqiad")]);
        assert_eq!(h.control_plane.pooled_set("svcA"), set(&["codfw"]));
        // Both sites were checked, then the record was wiped
        assert_eq!(h.dns.query_count(), 2);
        assert_eq!(
            h.commands(),
            vec!["sudo rec_control wipe-cache svcA.discovery.wmnet".to_string()]
        );
        assert!(h.prompt.asked().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let h = Harness::new(&[(svc_a(), &["eqiad", "codfw"])], &[]);
        let request = RunRequest::new(RunAction::Depool, "eqiad");

        h.engine.run(&request).await.unwrap();
        h.control_plane.clear_writes();
        let report = h.engine.run(&request).await.unwrap();

        assert_eq!(report.outcome("svcA").unwrap().outcome, Outcome::NoOp);
        assert!(h.control_plane.writes().is_empty());
    }

    #[tokio::test]
    async fn test_pool_adds_site() {
        let h = Harness::new(&[(svc_c(), &["eqiad"])], &[]);

        let report = h
            .engine
            .run(&RunRequest::new(RunAction::Pool, "esams"))
            .await
            .unwrap();

        assert!(report.success());
        assert_eq!(h.control_plane.writes(), vec![Write::pool("svcC", "esams")]);
        assert_eq!(h.control_plane.pooled_set("svcC"), set(&["eqiad", "esams"]));
    }

    #[tokio::test]
    async fn test_pools_are_written_before_depools() {
        let h = Harness::new(&[(svc_c(), &["eqiad"])], &[]);
        let operation = ReconciliationOperation::with_before_state(
            svc_c(),
            "eqiad",
            Intent::Restore(set(&["codfw", "esams"])),
            set(&["eqiad"]),
        );

        let outcome = h
            .engine
            .reconcile_active_active(&operation, false)
            .await
            .unwrap();

        assert_eq!(outcome.outcome, Outcome::Applied);
        assert_eq!(
            h.control_plane.writes(),
            vec![
                Write::pool("svcC", "codfw"),
                Write::pool("svcC", "esams"),
                Write::depool("svcC", "eqiad"),
            ]
        );
    }

    #[tokio::test]
    async fn test_last_site_goes_through_skip_or_move() {
        let h = Harness::new(&[(svc_a(), &["eqiad"])], &["skip"]);

        let report = h
            .engine
            .run(&RunRequest::new(RunAction::Depool, "eqiad"))
            .await
            .unwrap();

        let outcome = report.outcome("svcA").unwrap();
        assert_eq!(outcome.outcome, Outcome::Skipped);
        assert_eq!(outcome.reason, Some("OperatorSkipped"));
        assert_eq!(h.prompt.asked().len(), 1);
        assert!(h.control_plane.writes().is_empty());
        assert_eq!(h.control_plane.pooled_set("svcA"), set(&["eqiad"]));
        // Skips are reported but don't fail the run
        assert!(report.success());
    }

    #[tokio::test]
    async fn test_verification_survives_propagation_lag() {
        let h = Harness::new(&[(svc_a(), &["eqiad", "codfw"])], &[]);
        h.dns.lag_for(14);

        let report = h
            .engine
            .run(&RunRequest::new(RunAction::Depool, "eqiad"))
            .await
            .unwrap();

        assert!(report.success());
        assert_eq!(report.outcome("svcA").unwrap().outcome, Outcome::Applied);
    }

    #[tokio::test]
    async fn test_divergence_fails_without_wipe_or_revert() {
        let h = Harness::new(&[(svc_a(), &["eqiad", "codfw"])], &[]);
        h.dns.freeze();

        let report = h
            .engine
            .run(&RunRequest::new(RunAction::Depool, "eqiad"))
            .await
            .unwrap();

        let outcome = report.outcome("svcA").unwrap();
        assert_eq!(outcome.outcome, Outcome::Failed);
        assert_eq!(outcome.reason, Some("RecordDivergence"));
        assert!(!report.success());
        assert_eq!(h.dns.query_count(), 15);
        assert!(h.commands().is_empty());
        // The write stays applied until an operator asks for a rollback
        assert_eq!(h.control_plane.pooled_set("svcA"), set(&["codfw"]));
    }

    #[tokio::test]
    async fn test_pool_intent_on_single_site() {
        let h = Harness::new(&[(svc_a(), &[])], &[]);
        let operation = ReconciliationOperation::capture(
            svc_a(),
            "codfw",
            Intent::Apply(Action::Pool),
            h.control_plane.as_ref(),
        )
        .await
        .unwrap();

        let outcome = h
            .engine
            .reconcile_active_active(&operation, false)
            .await
            .unwrap();

        assert_eq!(outcome.outcome, Outcome::Applied);
        assert_eq!(outcome.detail, "pooled in codfw (was none)");
    }
}
