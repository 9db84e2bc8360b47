//! Invariants of projection, reconciliation, deduplication and lifecycle
//! atomicity.

mod common;

use std::collections::BTreeSet;

use accord_core::{
    AccessKey, CaseId, LedgerEvent, LedgerStatus, ProcessAccess, ScotiaId, REVOKE_PREFIX,
};
use accord_governance::services::{project, reconcile};
use chrono::Duration;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use common::{epoch, keys, TestContext};

const APPS: [&str; 4] = ["JIRA", "GIT", "PD", "SAP"];
const ROLES: [Option<&str>; 3] = [None, Some("Viewer"), Some("Admin")];

fn random_key(rng: &mut StdRng) -> AccessKey {
    let app = APPS[rng.gen_range(0..APPS.len())];
    let role = ROLES[rng.gen_range(0..ROLES.len())];
    AccessKey::new(app, role)
}

fn random_set(rng: &mut StdRng) -> BTreeSet<AccessKey> {
    let n = rng.gen_range(0..8);
    (0..n).map(|_| random_key(rng)).collect()
}

/// A ledger with strictly increasing record dates.
fn random_ledger(rng: &mut StdRng, len: usize) -> Vec<LedgerEvent> {
    let scotia_id = ScotiaId::from("E1");
    (0..len)
        .map(|i| {
            let at = epoch() + Duration::minutes(i as i64);
            let key = random_key(rng);
            let process = ProcessAccess::ALL[rng.gen_range(0..ProcessAccess::ALL.len())];
            let status = LedgerStatus::ALL[rng.gen_range(0..LedgerStatus::ALL.len())];
            let description = if rng.gen_bool(0.4) {
                Some(format!("{REVOKE_PREFIX} random"))
            } else {
                None
            };
            LedgerEvent {
                id: i as i64 + 1,
                case_id: CaseId::generate(at, &scotia_id),
                scotia_id: scotia_id.clone(),
                process_access: process,
                app_access_name: key.app_access_name,
                role_name: key.role_name,
                status,
                record_date: at,
                responsible: "hr".into(),
                description,
                closing_date: None,
                quality_status: None,
                quality_comment: None,
            }
        })
        .collect()
}

// ============================================================================
// Projection determinism
// ============================================================================

#[test]
fn test_projection_is_order_independent() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let ledger = random_ledger(&mut rng, 30);
        let expected = project(&ledger);
        assert_eq!(project(&ledger), expected);

        let mut shuffled = ledger.clone();
        shuffled.shuffle(&mut rng);
        assert_eq!(project(&shuffled), expected);
    }
}

// ============================================================================
// Grant/Revoke partition
// ============================================================================

#[test]
fn test_delta_partitions_effective_and_target() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let effective = random_set(&mut rng);
        let target = random_set(&mut rng);
        let delta = reconcile(&effective, &target);

        assert!(delta.to_grant.is_disjoint(&delta.to_revoke));
        assert!(delta.to_grant.is_disjoint(&delta.keep));
        assert!(delta.to_revoke.is_disjoint(&delta.keep));

        let granted_or_kept: BTreeSet<_> = delta.to_grant.union(&delta.keep).cloned().collect();
        assert_eq!(granted_or_kept, target);
        let revoked_or_kept: BTreeSet<_> = delta.to_revoke.union(&delta.keep).cloned().collect();
        assert_eq!(revoked_or_kept, effective);
    }
}

// ============================================================================
// Dedup horizon
// ============================================================================

#[tokio::test]
async fn test_at_most_one_insert_per_window() {
    let ctx = TestContext::new();
    ctx.hire("E1", "ANALYST", "TECH").await;
    ctx.seed_analyst_policy().await;

    for _ in 0..48 {
        ctx.engine
            .lifecycle()
            .onboarding(&"E1".into(), "ANALYST", "TECH", "hr")
            .await
            .unwrap();
        ctx.advance(Duration::hours(1));
    }

    let ledger = ctx.ledger().await;
    let window = ctx.engine.config().dedup_window();
    for a in &ledger {
        let overlapping = ledger
            .iter()
            .filter(|b| b.access_key() == a.access_key() && b.status == a.status)
            .filter(|b| (b.record_date - a.record_date).abs() <= window)
            .count();
        assert_eq!(overlapping, 1, "{} inserted twice within the window", a.access_key());
    }
    // Inserts at t=0h and t=25h for each of the two policy rows.
    assert_eq!(ledger.len(), 4);
}

// ============================================================================
// Lifecycle atomicity
// ============================================================================

#[tokio::test]
async fn test_failed_onboarding_leaves_placement_untouched() {
    let ctx = TestContext::new();
    ctx.hire("E1", "INTERN", "OPS").await;
    ctx.seed_analyst_policy().await;
    ctx.store.fail_ledger_inserts_after(1);

    let err = ctx
        .engine
        .lifecycle()
        .onboarding(&"E1".into(), "ANALYST", "TECH", "hr")
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    ctx.store.clear_faults();
    let employee = ctx.employee("E1").await;
    assert_eq!(employee.position, "INTERN");
    assert_eq!(employee.unit, "OPS");
    assert_eq!(ctx.store.ledger_len().await, 0);
}

#[tokio::test]
async fn test_failed_offboarding_keeps_employee_active() {
    let ctx = TestContext::new();
    ctx.hire("E1", "ANALYST", "TECH").await;
    ctx.seed_analyst_policy().await;
    ctx.engine
        .lifecycle()
        .onboarding(&"E1".into(), "ANALYST", "TECH", "hr")
        .await
        .unwrap();
    ctx.advance(Duration::hours(1));
    ctx.store.fail_ledger_inserts_after(1);

    let err = ctx
        .engine
        .lifecycle()
        .offboarding(&"E1".into(), "hr")
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    ctx.store.clear_faults();
    assert!(ctx.employee("E1").await.active);
    assert_eq!(ctx.store.ledger_len().await, 2);
    assert_eq!(
        ctx.effective("E1").await,
        keys(&[("JIRA", Some("Viewer")), ("GIT", Some("Dev"))])
    );
}

// ============================================================================
// Idempotent reinvocation
// ============================================================================

#[tokio::test]
async fn test_back_to_back_onboarding_adds_nothing() {
    let ctx = TestContext::new();
    ctx.hire("E1", "ANALYST", "TECH").await;
    ctx.seed_analyst_policy().await;

    ctx.engine
        .lifecycle()
        .onboarding(&"E1".into(), "ANALYST", "TECH", "hr")
        .await
        .unwrap();
    let once = ctx.effective("E1").await;
    let rows = ctx.store.ledger_len().await;

    let again = ctx
        .engine
        .lifecycle()
        .onboarding(&"E1".into(), "ANALYST", "TECH", "hr")
        .await
        .unwrap();
    assert_eq!(again.granted, 0);
    assert_eq!(ctx.effective("E1").await, once);
    assert_eq!(ctx.store.ledger_len().await, rows);
}

// ============================================================================
// Offboarding completeness
// ============================================================================

#[tokio::test]
async fn test_completed_offboarding_leaves_nothing() {
    let ctx = TestContext::new();
    ctx.hire("E1", "ANALYST", "TECH").await;
    ctx.seed_analyst_policy().await;
    ctx.entitle("OPS", "ANALYST", &[("SAP", None)]).await;

    let onboarded = ctx
        .engine
        .lifecycle()
        .onboarding(&"E1".into(), "ANALYST", "TECH", "hr")
        .await
        .unwrap();
    ctx.advance(Duration::minutes(1));
    ctx.engine
        .lifecycle()
        .manual_access(&"E1".into(), "SAP", None, "manager", None)
        .await
        .unwrap();
    ctx.engine
        .ledger()
        .update_case_status(&onboarded.case_id, LedgerStatus::Completed)
        .await
        .unwrap();
    ctx.advance(Duration::hours(1));

    let offboarded = ctx
        .engine
        .lifecycle()
        .offboarding(&"E1".into(), "hr")
        .await
        .unwrap();
    assert_eq!(offboarded.revoked, 3);
    ctx.engine
        .ledger()
        .update_case_status(&offboarded.case_id, LedgerStatus::Completed)
        .await
        .unwrap();

    let events = ctx.engine.ledger().history(&"E1".into()).await.unwrap();
    assert!(project(&events).is_empty());
    assert!(!ctx.employee("E1").await.active);
}

// ============================================================================
// Concurrent invocations
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_invocations_serialize() {
    let ctx = TestContext::new();
    ctx.hire("E1", "INTERN", "OPS").await;
    ctx.seed_analyst_policy().await;
    let lifecycle = ctx.engine.lifecycle();
    let id: ScotiaId = "E1".into();

    let (first, second) = tokio::join!(
        lifecycle.onboarding(&id, "ANALYST", "TECH", "hr"),
        lifecycle.onboarding(&id, "ANALYST", "TECH", "hr"),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    let mut granted = [first.granted, second.granted];
    granted.sort_unstable();
    assert_eq!(granted, [0, 2]);
    assert_eq!(first.skipped + second.skipped, 2);
    assert_eq!(ctx.store.ledger_len().await, 2);

    ctx.advance(Duration::hours(1));
    let (first, second) = tokio::join!(
        lifecycle.offboarding(&id, "hr"),
        lifecycle.offboarding(&id, "hr"),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    let mut revoked = [first.revoked, second.revoked];
    revoked.sort_unstable();
    assert_eq!(revoked, [0, 2]);

    assert_eq!(ctx.store.ledger_len().await, 4);
    assert!(!ctx.employee("E1").await.active);
}
