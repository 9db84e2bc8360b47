//! Effective-access projection.
//!
//! Reduces an employee's ledger to the `(app, role)` pairs they currently
//! hold. For each partition the latest event wins, ordered by `record_date`
//! and then by surrogate id; the access is held iff that event grants and
//! its status is Pending, In-Progress or Completed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use accord_core::{AccessKey, CaseId, LedgerEvent, ScotiaId, Store, StoreTransaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::services::deadline::StoreDeadline;

// ============================================================================
// Projection
// ============================================================================

/// One access an employee holds, with the event that conferred it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldAccess {
    pub app_access_name: String,
    pub role_name: Option<String>,
    /// `record_date` of the conferring event.
    pub granted_at: DateTime<Utc>,
    pub case_id: CaseId,
    pub event_id: i64,
}

impl HeldAccess {
    fn from_event(event: &LedgerEvent) -> Self {
        Self {
            app_access_name: event.app_access_name.clone(),
            role_name: event.role_name.clone(),
            granted_at: event.record_date,
            case_id: event.case_id.clone(),
            event_id: event.id,
        }
    }

    /// The `(app, role)` pair held.
    #[must_use]
    pub fn key(&self) -> AccessKey {
        AccessKey::new(self.app_access_name.clone(), self.role_name.as_deref())
    }
}

/// Effective access of one employee, keyed by `(app, role)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveAccess {
    held: BTreeMap<AccessKey, HeldAccess>,
}

impl EffectiveAccess {
    /// Whether `key` is held.
    #[must_use]
    pub fn contains(&self, key: &AccessKey) -> bool {
        self.held.contains_key(key)
    }

    /// Details of a held access.
    #[must_use]
    pub fn get(&self, key: &AccessKey) -> Option<&HeldAccess> {
        self.held.get(key)
    }

    /// The held pairs.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<AccessKey> {
        self.held.keys().cloned().collect()
    }

    /// Held accesses in key order.
    pub fn iter(&self) -> impl Iterator<Item = &HeldAccess> {
        self.held.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Whether `candidate` supersedes `current` within a partition.
fn is_later(candidate: &LedgerEvent, current: &LedgerEvent) -> bool {
    (candidate.record_date, candidate.id) > (current.record_date, current.id)
}

/// Latest event of every `(app, role)` partition.
#[must_use]
pub fn latest_per_access(events: &[LedgerEvent]) -> BTreeMap<AccessKey, &LedgerEvent> {
    let mut latest: BTreeMap<AccessKey, &LedgerEvent> = BTreeMap::new();
    for event in events {
        latest
            .entry(event.access_key())
            .and_modify(|current| {
                if is_later(event, current) {
                    *current = event;
                }
            })
            .or_insert(event);
    }
    latest
}

/// Reduce a ledger to effective access. Independent of row order.
#[must_use]
pub fn project(events: &[LedgerEvent]) -> EffectiveAccess {
    let held = latest_per_access(events)
        .into_iter()
        .filter(|(_, event)| event.confers_access())
        .map(|(key, event)| (key, HeldAccess::from_event(event)))
        .collect();
    EffectiveAccess { held }
}

/// Read and project an employee's ledger inside an open transaction.
pub async fn read_effective(
    tx: &mut dyn StoreTransaction,
    deadline: StoreDeadline,
    scotia_id: &ScotiaId,
) -> Result<EffectiveAccess> {
    let events = deadline.run(tx.list_ledger_for(scotia_id)).await?;
    Ok(project(&events))
}

// ============================================================================
// Service
// ============================================================================

/// Read-only effective-access queries.
pub struct AccessProjector {
    store: Arc<dyn Store>,
    deadline: StoreDeadline,
}

impl AccessProjector {
    /// Create a new projector.
    pub fn new(store: Arc<dyn Store>, deadline: StoreDeadline) -> Self {
        Self { store, deadline }
    }

    /// Current effective access of an employee.
    ///
    /// An employee with no ledger events holds nothing; existence is not
    /// checked.
    pub async fn effective_access(&self, scotia_id: &ScotiaId) -> Result<EffectiveAccess> {
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let effective = read_effective(tx.as_mut(), self.deadline, scotia_id).await?;
        self.deadline.run(tx.commit()).await?;
        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_core::LedgerStatus::{Cancelled, Completed, InProgress, Pending, Rejected};
    use accord_core::ProcessAccess::{LateralMovement, ManualAccess, Offboarding, Onboarding};
    use accord_core::{LedgerStatus, ProcessAccess};
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn event(
        id: i64,
        minutes: i64,
        process: ProcessAccess,
        app: &str,
        role: Option<&str>,
        status: LedgerStatus,
        description: Option<&str>,
    ) -> LedgerEvent {
        let scotia_id = ScotiaId::from("E1");
        LedgerEvent {
            id,
            case_id: CaseId::generate(at(minutes), &scotia_id),
            scotia_id,
            process_access: process,
            app_access_name: app.into(),
            role_name: role.map(str::to_string),
            status,
            record_date: at(minutes),
            responsible: "hr".into(),
            description: description.map(str::to_string),
            closing_date: None,
            quality_status: None,
            quality_comment: None,
        }
    }

    #[test]
    fn test_empty_ledger_projects_nothing() {
        assert!(project(&[]).is_empty());
    }

    #[test]
    fn test_effective_statuses_hold_access() {
        let events = vec![
            event(1, 0, Onboarding, "JIRA", Some("Viewer"), Pending, None),
            event(2, 0, Onboarding, "GIT", Some("Dev"), InProgress, None),
            event(3, 0, ManualAccess, "SAP", None, Completed, None),
            event(4, 0, Onboarding, "PD", None, Rejected, None),
            event(5, 0, Onboarding, "WIKI", None, Cancelled, None),
        ];
        let keys = project(&events).keys();
        assert_eq!(
            keys,
            BTreeSet::from([
                AccessKey::new("GIT", Some("Dev")),
                AccessKey::new("JIRA", Some("Viewer")),
                AccessKey::new("SAP", None),
            ])
        );
    }

    #[test]
    fn test_latest_revoke_removes_access() {
        let events = vec![
            event(1, 0, Onboarding, "JIRA", Some("Viewer"), Completed, None),
            event(2, 10, LateralMovement, "JIRA", Some("Viewer"), Pending, Some("Revoke: moved")),
            event(3, 0, Onboarding, "GIT", Some("Dev"), Completed, None),
            event(4, 10, LateralMovement, "GIT", Some("Admin"), Pending, Some("Grant: moved")),
        ];
        let keys = project(&events).keys();
        assert_eq!(
            keys,
            BTreeSet::from([
                AccessKey::new("GIT", Some("Admin")),
                AccessKey::new("GIT", Some("Dev")),
            ])
        );
    }

    #[test]
    fn test_cancelled_revoke_does_not_restore_access() {
        let events = vec![
            event(1, 0, Onboarding, "JIRA", None, Completed, None),
            event(2, 5, Offboarding, "JIRA", None, Cancelled, None),
        ];
        assert!(project(&events).is_empty());
    }

    #[test]
    fn test_same_record_date_larger_id_wins() {
        let grant = event(7, 0, Onboarding, "JIRA", None, Pending, None);
        let revoke = event(8, 0, Offboarding, "JIRA", None, Pending, None);
        assert!(project(&[grant.clone(), revoke.clone()]).is_empty());
        assert!(project(&[revoke.clone(), grant.clone()]).is_empty());

        let regrant = event(9, 0, ManualAccess, "JIRA", None, Pending, None);
        let effective = project(&[regrant, revoke, grant]);
        assert_eq!(effective.get(&AccessKey::new("JIRA", None)).unwrap().event_id, 9);
    }

    #[test]
    fn test_null_role_is_its_own_partition() {
        let events = vec![
            event(1, 0, ManualAccess, "SAP", None, Completed, None),
            event(2, 5, Offboarding, "SAP", Some("User"), Completed, None),
        ];
        let effective = project(&events);
        assert!(effective.contains(&AccessKey::new("SAP", None)));
        assert_eq!(effective.len(), 1);
    }

    #[test]
    fn test_held_access_records_conferring_event() {
        let events = vec![
            event(1, 0, Onboarding, "JIRA", None, Completed, None),
            event(2, 30, ManualAccess, "JIRA", None, Pending, None),
        ];
        let effective = project(&events);
        let held = effective.get(&AccessKey::new("JIRA", None)).unwrap();
        assert_eq!(held.granted_at, at(30));
        assert_eq!(held.event_id, 2);
        assert_eq!(held.case_id, CaseId::generate(at(30), &ScotiaId::from("E1")));
    }
}
