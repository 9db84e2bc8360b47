//! Storage contract.
//!
//! [`Store`] hands out [`StoreTransaction`]s; every read and write of the
//! engine goes through one. Lifecycle operations group their policy read,
//! effective-access read, ledger inserts and employee mutation in a single
//! transaction so that either all of them commit or none do.
//!
//! The one-shot methods on [`Store`] each run in their own transaction.
//!
//! Backends perform no business validation. Absence is reported as
//! `Ok(None)` / `Ok(false)`; uniqueness violations as
//! [`StoreError::Conflict`](crate::StoreError::Conflict); transport faults as
//! [`StoreError::Unavailable`](crate::StoreError::Unavailable).

use chrono::{DateTime, Duration, Utc};

use crate::error::StoreResult;
use crate::ids::{CaseId, ScotiaId};
use crate::types::{
    Application, Employee, IsolationLevel, LedgerEvent, LedgerStatusUpdate, NewApplication,
    NewLedgerEvent, ProcessAccess, UpsertMode,
};

/// An open transaction against a backend.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it
/// back.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    // ------------------------------------------------------------------
    // Employees
    // ------------------------------------------------------------------

    /// Fetch an employee by id.
    async fn get_employee(&mut self, id: &ScotiaId) -> StoreResult<Option<Employee>>;

    /// Insert or replace an employee record.
    async fn upsert_employee(&mut self, record: &Employee, mode: UpsertMode) -> StoreResult<()>;

    /// Move an employee to a new placement. Returns `false` if unknown.
    async fn update_employee_position(
        &mut self,
        id: &ScotiaId,
        new_position: &str,
        new_unit: &str,
    ) -> StoreResult<bool>;

    /// Flip `active` to false and stamp `end_date` if unset. Returns `false`
    /// if unknown.
    async fn set_employee_inactive(&mut self, id: &ScotiaId, at: DateTime<Utc>)
        -> StoreResult<bool>;

    /// List employees ordered by id.
    async fn list_employees(&mut self, active_only: bool) -> StoreResult<Vec<Employee>>;

    // ------------------------------------------------------------------
    // Policy matrix
    // ------------------------------------------------------------------

    /// Policy rows whose `unit` and `position_role` equal the arguments exactly.
    async fn list_policy_for(&mut self, unit: &str, position: &str)
        -> StoreResult<Vec<Application>>;

    /// Every policy row, ordered by id.
    async fn list_applications(&mut self) -> StoreResult<Vec<Application>>;

    /// Create a policy row.
    async fn insert_application(&mut self, input: &NewApplication) -> StoreResult<Application>;

    /// Delete a policy row. Returns `false` if unknown.
    async fn delete_application(&mut self, id: i64) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    /// Append a ledger event and return it with its surrogate id.
    async fn insert_ledger(&mut self, event: &NewLedgerEvent) -> StoreResult<LedgerEvent>;

    /// Events for `(scotia_id, app, process_access)` with
    /// `record_date >= now - within`.
    async fn find_recent_ledger(
        &mut self,
        scotia_id: &ScotiaId,
        app_access_name: &str,
        process_access: ProcessAccess,
        within: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<LedgerEvent>>;

    /// Every event of an employee, newest first (`record_date` desc, then id desc).
    async fn list_ledger_for(&mut self, scotia_id: &ScotiaId) -> StoreResult<Vec<LedgerEvent>>;

    /// Every event of a case, in insertion order.
    async fn list_ledger_for_case(&mut self, case_id: &CaseId) -> StoreResult<Vec<LedgerEvent>>;

    /// Fetch one event.
    async fn get_ledger_event(&mut self, id: i64) -> StoreResult<Option<LedgerEvent>>;

    /// Apply a status update to one event. Returns `None` if unknown.
    async fn update_ledger_status(
        &mut self,
        id: i64,
        update: &LedgerStatusUpdate,
    ) -> StoreResult<Option<LedgerEvent>>;

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Make every change of this transaction durable.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard every change of this transaction.
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// A transactional backend.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Isolation level every transaction of this store runs at.
    fn isolation_level(&self) -> IsolationLevel;

    /// Open a transaction.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    /// Fetch an employee in its own transaction.
    async fn get_employee(&self, id: &ScotiaId) -> StoreResult<Option<Employee>> {
        let mut tx = self.begin().await?;
        let employee = tx.get_employee(id).await?;
        tx.commit().await?;
        Ok(employee)
    }

    /// Insert or replace an employee in its own transaction.
    async fn upsert_employee(&self, record: &Employee, mode: UpsertMode) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        tx.upsert_employee(record, mode).await?;
        tx.commit().await
    }

    /// List employees in their own transaction.
    async fn list_employees(&self, active_only: bool) -> StoreResult<Vec<Employee>> {
        let mut tx = self.begin().await?;
        let employees = tx.list_employees(active_only).await?;
        tx.commit().await?;
        Ok(employees)
    }

    /// Policy rows for a placement in their own transaction.
    async fn list_policy_for(&self, unit: &str, position: &str) -> StoreResult<Vec<Application>> {
        let mut tx = self.begin().await?;
        let rows = tx.list_policy_for(unit, position).await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Every policy row in its own transaction.
    async fn list_applications(&self) -> StoreResult<Vec<Application>> {
        let mut tx = self.begin().await?;
        let rows = tx.list_applications().await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Create a policy row in its own transaction.
    async fn insert_application(&self, input: &NewApplication) -> StoreResult<Application> {
        let mut tx = self.begin().await?;
        let row = tx.insert_application(input).await?;
        tx.commit().await?;
        Ok(row)
    }

    /// An employee's ledger, newest first, in its own transaction.
    async fn list_ledger_for(&self, scotia_id: &ScotiaId) -> StoreResult<Vec<LedgerEvent>> {
        let mut tx = self.begin().await?;
        let events = tx.list_ledger_for(scotia_id).await?;
        tx.commit().await?;
        Ok(events)
    }
}
