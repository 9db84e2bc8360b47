//! In-memory store.
//!
//! Transactions are serialized through an owned async mutex: `begin` takes
//! the lock and copies the state, `commit` swaps the copy back in. A dropped
//! or rolled-back transaction leaves the shared state untouched.
//!
//! Fault injection hooks let tests fail the store at a chosen point.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{StoreError, StoreResult};
use crate::ids::{CaseId, ScotiaId};
use crate::store::{Store, StoreTransaction};
use crate::types::{
    Application, Employee, IsolationLevel, LedgerEvent, LedgerStatusUpdate, NewApplication,
    NewLedgerEvent, ProcessAccess, UpsertMode,
};

const DEFAULT_LOCK_TIMEOUT: StdDuration = StdDuration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    employees: BTreeMap<ScotiaId, Employee>,
    applications: BTreeMap<i64, Application>,
    ledger: Vec<LedgerEvent>,
    next_application_id: i64,
    next_ledger_id: i64,
}

#[derive(Debug)]
struct FaultPlan {
    unavailable: AtomicBool,
    /// Ledger inserts allowed before every further insert fails; -1 = off.
    ledger_inserts_before_failure: AtomicI64,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            unavailable: AtomicBool::new(false),
            ledger_inserts_before_failure: AtomicI64::new(-1),
        }
    }
}

impl FaultPlan {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store marked unavailable"));
        }
        Ok(())
    }

    fn consume_ledger_insert(&self) -> StoreResult<()> {
        let remaining = self
            .ledger_inserts_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then_some(n - 1)
            });
        match remaining {
            // Disabled, or budget left.
            Err(-1) | Ok(_) => Ok(()),
            Err(_) => Err(StoreError::unavailable("injected ledger insert failure")),
        }
    }
}

/// In-memory [`Store`] for tests and embedded use.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<FaultPlan>,
    lock_timeout: StdDuration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                next_application_id: 1,
                next_ledger_id: 1,
                ..Default::default()
            })),
            faults: Arc::new(FaultPlan::default()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set how long `begin` waits for a concurrent transaction to finish.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: StdDuration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Let `n` further ledger inserts succeed, then fail every insert with
    /// [`StoreError::Unavailable`].
    pub fn fail_ledger_inserts_after(&self, n: usize) {
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        self.faults
            .ledger_inserts_before_failure
            .store(n, Ordering::SeqCst);
    }

    /// Make `begin` fail with [`StoreError::Unavailable`] while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.set_unavailable(false);
        self.faults
            .ledger_inserts_before_failure
            .store(-1, Ordering::SeqCst);
    }

    /// Number of committed ledger events.
    pub async fn ledger_len(&self) -> usize {
        self.state.lock().await.ledger.len()
    }

    /// Committed ledger in insertion order.
    pub async fn ledger_snapshot(&self) -> Vec<LedgerEvent> {
        self.state.lock().await.ledger.clone()
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    fn isolation_level(&self) -> IsolationLevel {
        IsolationLevel::Serializable
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.faults.check_available()?;

        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| StoreError::unavailable("timed out waiting for transaction lock"))?;

        let working = MemoryState::clone(&guard);
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }
}

/// Transaction over an [`InMemoryStore`]. Holds the store lock until it
/// commits, rolls back, or is dropped.
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<FaultPlan>,
}

fn newest_first(events: &mut [LedgerEvent]) {
    events.sort_by(|a, b| {
        b.record_date
            .cmp(&a.record_date)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[async_trait::async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn get_employee(&mut self, id: &ScotiaId) -> StoreResult<Option<Employee>> {
        Ok(self.working.employees.get(id).cloned())
    }

    async fn upsert_employee(&mut self, record: &Employee, mode: UpsertMode) -> StoreResult<()> {
        if mode == UpsertMode::Insert && self.working.employees.contains_key(&record.scotia_id) {
            return Err(StoreError::Conflict {
                id: record.scotia_id.to_string(),
            });
        }
        self.working
            .employees
            .insert(record.scotia_id.clone(), record.clone());
        Ok(())
    }

    async fn update_employee_position(
        &mut self,
        id: &ScotiaId,
        new_position: &str,
        new_unit: &str,
    ) -> StoreResult<bool> {
        match self.working.employees.get_mut(id) {
            Some(employee) => {
                employee.position = new_position.to_string();
                employee.unit = new_unit.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_employee_inactive(
        &mut self,
        id: &ScotiaId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.working.employees.get_mut(id) {
            Some(employee) => {
                employee.active = false;
                employee.end_date.get_or_insert(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_employees(&mut self, active_only: bool) -> StoreResult<Vec<Employee>> {
        Ok(self
            .working
            .employees
            .values()
            .filter(|e| !active_only || e.active)
            .cloned()
            .collect())
    }

    async fn list_policy_for(
        &mut self,
        unit: &str,
        position: &str,
    ) -> StoreResult<Vec<Application>> {
        Ok(self
            .working
            .applications
            .values()
            .filter(|a| a.unit == unit && a.position_role == position)
            .cloned()
            .collect())
    }

    async fn list_applications(&mut self) -> StoreResult<Vec<Application>> {
        Ok(self.working.applications.values().cloned().collect())
    }

    async fn insert_application(&mut self, input: &NewApplication) -> StoreResult<Application> {
        let duplicate = self.working.applications.values().any(|a| {
            a.logical_access_name == input.logical_access_name
                && a.unit == input.unit
                && a.position_role == input.position_role
                && a.role_name == input.role_name
        });
        if duplicate {
            return Err(StoreError::Conflict {
                id: format!(
                    "{}@{}/{}",
                    input.logical_access_name, input.unit, input.position_role
                ),
            });
        }

        let id = self.working.next_application_id;
        self.working.next_application_id += 1;
        let row = Application {
            id,
            logical_access_name: input.logical_access_name.clone(),
            unit: input.unit.clone(),
            position_role: input.position_role.clone(),
            role_name: input.role_name.clone(),
            access_category: input.access_category.clone(),
            owner: input.owner.clone(),
            description: input.description.clone(),
        };
        self.working.applications.insert(id, row.clone());
        Ok(row)
    }

    async fn delete_application(&mut self, id: i64) -> StoreResult<bool> {
        Ok(self.working.applications.remove(&id).is_some())
    }

    async fn insert_ledger(&mut self, event: &NewLedgerEvent) -> StoreResult<LedgerEvent> {
        self.faults.consume_ledger_insert()?;

        if !self.working.employees.contains_key(&event.scotia_id) {
            return Err(StoreError::backend(format!(
                "ledger event references unknown employee {}",
                event.scotia_id
            )));
        }

        let id = self.working.next_ledger_id;
        self.working.next_ledger_id += 1;
        let stored = LedgerEvent {
            id,
            scotia_id: event.scotia_id.clone(),
            case_id: event.case_id.clone(),
            process_access: event.process_access,
            app_access_name: event.app_access_name.clone(),
            role_name: event.role_name.clone(),
            status: event.status,
            record_date: event.record_date,
            responsible: event.responsible.clone(),
            description: event.description.clone(),
            closing_date: None,
            quality_status: None,
            quality_comment: None,
        };
        self.working.ledger.push(stored.clone());
        Ok(stored)
    }

    async fn find_recent_ledger(
        &mut self,
        scotia_id: &ScotiaId,
        app_access_name: &str,
        process_access: ProcessAccess,
        within: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<LedgerEvent>> {
        let cutoff = now - within;
        let mut events: Vec<_> = self
            .working
            .ledger
            .iter()
            .filter(|e| {
                &e.scotia_id == scotia_id
                    && e.app_access_name == app_access_name
                    && e.process_access == process_access
                    && e.record_date >= cutoff
            })
            .cloned()
            .collect();
        newest_first(&mut events);
        Ok(events)
    }

    async fn list_ledger_for(&mut self, scotia_id: &ScotiaId) -> StoreResult<Vec<LedgerEvent>> {
        let mut events: Vec<_> = self
            .working
            .ledger
            .iter()
            .filter(|e| &e.scotia_id == scotia_id)
            .cloned()
            .collect();
        newest_first(&mut events);
        Ok(events)
    }

    async fn list_ledger_for_case(&mut self, case_id: &CaseId) -> StoreResult<Vec<LedgerEvent>> {
        Ok(self
            .working
            .ledger
            .iter()
            .filter(|e| &e.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn get_ledger_event(&mut self, id: i64) -> StoreResult<Option<LedgerEvent>> {
        Ok(self.working.ledger.iter().find(|e| e.id == id).cloned())
    }

    async fn update_ledger_status(
        &mut self,
        id: i64,
        update: &LedgerStatusUpdate,
    ) -> StoreResult<Option<LedgerEvent>> {
        match self.working.ledger.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                update.apply_to(event);
                Ok(Some(event.clone()))
            }
            None => Ok(None),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LedgerStatus;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn grant(id: &str, app: &str, record_date: DateTime<Utc>) -> NewLedgerEvent {
        NewLedgerEvent {
            scotia_id: ScotiaId::from(id),
            case_id: CaseId::generate(record_date, &ScotiaId::from(id)),
            process_access: ProcessAccess::Onboarding,
            app_access_name: app.to_string(),
            role_name: None,
            status: LedgerStatus::Pending,
            record_date,
            responsible: "hr".to_string(),
            description: None,
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .upsert_employee(
                &Employee::new("E1", "Ada", "ada@example.com", "ANALYST", "TECH"),
                UpsertMode::Insert,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_conflict_on_existing_employee() {
        let store = seeded().await;
        let result = store
            .upsert_employee(
                &Employee::new("E1", "Other", "o@example.com", "X", "Y"),
                UpsertMode::Insert,
            )
            .await;
        assert_eq!(result, Err(StoreError::Conflict { id: "E1".into() }));

        store
            .upsert_employee(
                &Employee::new("E1", "Ada L.", "ada@example.com", "SENIOR", "TECH"),
                UpsertMode::Replace,
            )
            .await
            .unwrap();
        let employee = store.get_employee(&"E1".into()).await.unwrap().unwrap();
        assert_eq!(employee.position, "SENIOR");
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let store = seeded().await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_ledger(&grant("E1", "JIRA", at(9))).await.unwrap();
        tx.set_employee_inactive(&"E1".into(), at(9)).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.ledger_len().await, 0);
        let employee = store.get_employee(&"E1".into()).await.unwrap().unwrap();
        assert!(employee.active);
    }

    #[tokio::test]
    async fn test_drop_without_commit_discards_changes() {
        let store = seeded().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_ledger(&grant("E1", "JIRA", at(9))).await.unwrap();
        }
        assert_eq!(store.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_ledger_ordering_newest_first_with_id_tiebreak() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        let first = tx.insert_ledger(&grant("E1", "A", at(9))).await.unwrap();
        let second = tx.insert_ledger(&grant("E1", "B", at(9))).await.unwrap();
        let older = tx.insert_ledger(&grant("E1", "C", at(8))).await.unwrap();
        tx.commit().await.unwrap();

        let events = store.list_ledger_for(&"E1".into()).await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.id, first.id, older.id]);
    }

    #[tokio::test]
    async fn test_find_recent_respects_window() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.insert_ledger(&grant("E1", "JIRA", at(1))).await.unwrap();
        tx.insert_ledger(&grant("E1", "JIRA", at(10))).await.unwrap();
        tx.insert_ledger(&grant("E1", "GIT", at(10))).await.unwrap();

        let recent = tx
            .find_recent_ledger(
                &"E1".into(),
                "JIRA",
                ProcessAccess::Onboarding,
                Duration::hours(5),
                at(12),
            )
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].record_date, at(10));

        let none = tx
            .find_recent_ledger(
                &"E1".into(),
                "JIRA",
                ProcessAccess::Offboarding,
                Duration::hours(24),
                at(12),
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_injected_insert_failure() {
        let store = seeded().await;
        store.fail_ledger_inserts_after(1);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_ledger(&grant("E1", "A", at(9))).await.is_ok());
        let err = tx.insert_ledger(&grant("E1", "B", at(9))).await.unwrap_err();
        assert!(err.is_retryable());
        drop(tx);

        store.clear_faults();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_ledger(&grant("E1", "B", at(9))).await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_begin() {
        let store = seeded().await;
        store.set_unavailable(true);
        let err = store.begin().await.err().unwrap();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_concurrent_begin_times_out() {
        let store = seeded()
            .await
            .with_lock_timeout(StdDuration::from_millis(20));
        let _held = store.begin().await.unwrap();
        let err = store.begin().await.err().unwrap();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_ledger_rejects_unknown_employee() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_ledger(&grant("ghost", "A", at(9))).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_policy_row_conflicts() {
        let store = InMemoryStore::new();
        let row = NewApplication::entitle("JIRA", Some("Viewer"), "TECH", "ANALYST");
        store.insert_application(&row).await.unwrap();
        let err = store.insert_application(&row).await.unwrap_err();
        assert!(err.is_conflict());

        let other_role = NewApplication::entitle("JIRA", None, "TECH", "ANALYST");
        assert!(store.insert_application(&other_role).await.is_ok());
    }
}
