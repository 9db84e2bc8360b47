//! Common test utilities for accord-governance integration tests.
//!
//! Every test gets its own in-memory store and a manual clock so case ids
//! and record dates are predictable.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use accord_core::{
    AccessKey, Employee, InMemoryStore, LedgerEvent, NewApplication, ProcessAccess, ScotiaId,
    Store,
};
use accord_governance::{AccessGovernance, ClockSource, EngineConfig, ManualClock};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Start of every test timeline.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
}

/// Test context holding the engine, its store and its clock.
pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub engine: AccessGovernance,
}

impl TestContext {
    /// A context with the default 24h deduplication window.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// A context with a custom configuration. The clock is always injected.
    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(epoch()));
        let config = EngineConfig {
            clock_source: ClockSource::Injected,
            ..config
        };
        let engine = AccessGovernance::new(store.clone(), config, Some(clock.clone()))
            .expect("Failed to build engine");
        Self {
            store,
            clock,
            engine,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Register an active employee.
    pub async fn hire(&self, id: &str, position: &str, unit: &str) {
        let record = Employee::new(id, id, format!("{id}@example.com"), position, unit);
        self.engine
            .headcount()
            .register(&record)
            .await
            .expect("Failed to register employee");
    }

    /// Add one policy row per `(app, role)` for a placement.
    pub async fn entitle(&self, unit: &str, position: &str, access: &[(&str, Option<&str>)]) {
        for (app, role) in access {
            self.store
                .insert_application(&NewApplication::entitle(*app, *role, unit, position))
                .await
                .expect("Failed to insert policy row");
        }
    }

    /// TECH/ANALYST: `{(JIRA, Viewer), (GIT, Dev)}`.
    pub async fn seed_analyst_policy(&self) {
        self.entitle("TECH", "ANALYST", &[("JIRA", Some("Viewer")), ("GIT", Some("Dev"))])
            .await;
    }

    /// TECH/SENIOR: `{(JIRA, Admin), (GIT, Dev), (PD, OnCall)}`.
    pub async fn seed_senior_policy(&self) {
        self.entitle(
            "TECH",
            "SENIOR",
            &[("JIRA", Some("Admin")), ("GIT", Some("Dev")), ("PD", Some("OnCall"))],
        )
        .await;
    }

    pub async fn employee(&self, id: &str) -> Employee {
        self.engine
            .headcount()
            .get(&ScotiaId::from(id))
            .await
            .expect("Failed to read employee")
            .expect("Employee missing")
    }

    pub async fn effective(&self, id: &str) -> BTreeSet<AccessKey> {
        self.engine
            .projector()
            .effective_access(&ScotiaId::from(id))
            .await
            .expect("Failed to project")
            .keys()
    }

    pub async fn ledger(&self) -> Vec<LedgerEvent> {
        self.store.ledger_snapshot().await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn key(app: &str, role: Option<&str>) -> AccessKey {
    AccessKey::new(app, role)
}

pub fn keys(pairs: &[(&str, Option<&str>)]) -> BTreeSet<AccessKey> {
    pairs.iter().map(|(app, role)| key(app, *role)).collect()
}

/// Access keys of the events matching `process` and description prefix.
pub fn touched(
    events: &[LedgerEvent],
    process: ProcessAccess,
    prefix: &str,
) -> BTreeSet<AccessKey> {
    events
        .iter()
        .filter(|e| e.process_access == process)
        .filter(|e| e.description.as_deref().is_some_and(|d| d.starts_with(prefix)))
        .map(LedgerEvent::access_key)
        .collect()
}
