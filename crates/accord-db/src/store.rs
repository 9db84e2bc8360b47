//! PostgreSQL implementation of the storage contract.

use std::time::Duration as StdDuration;

use accord_core::{
    Application, CaseId, Employee, IsolationLevel, LedgerEvent, LedgerStatusUpdate,
    NewApplication, NewLedgerEvent, ProcessAccess, ScotiaId, Store, StoreError, StoreResult,
    StoreTransaction, UpsertMode,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::DbError;
use crate::models::{ledger, ApplicationRow, EmployeeRow, LedgerRow};

/// Connection settings for [`PgStore`].
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    /// Isolation level of every transaction.
    pub isolation_level: IsolationLevel,
    /// Per-statement timeout and pool acquire timeout.
    pub statement_timeout: StdDuration,
    /// Upper bound of pooled connections.
    pub max_connections: u32,
}

impl PgStoreConfig {
    /// Settings carrying the engine's isolation level and per-call timeout.
    ///
    /// Embedders pass `EngineConfig::isolation_level` and
    /// `EngineConfig::store_timeout()` so both layers agree.
    #[must_use]
    pub fn new(isolation_level: IsolationLevel, statement_timeout: StdDuration) -> Self {
        Self {
            isolation_level,
            statement_timeout,
            ..Self::default()
        }
    }
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            isolation_level: IsolationLevel::default(),
            statement_timeout: StdDuration::from_millis(5000),
            max_connections: 10,
        }
    }
}

/// A [`Store`] backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    config: PgStoreConfig,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: PgPool, config: PgStoreConfig) -> Self {
        Self { pool, config }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns `DbError::ConnectionFailed` if the database cannot be reached.
    pub async fn connect(url: &str, config: PgStoreConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.statement_timeout)
            .connect(url)
            .await
            .map_err(DbError::ConnectionFailed)?;

        tracing::info!(
            isolation = config.isolation_level.as_sql(),
            max_connections = config.max_connections,
            "Connected access store"
        );
        Ok(Self { pool, config })
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    fn isolation_level(&self) -> IsolationLevel {
        self.config.isolation_level
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(DbError::ConnectionFailed)?;

        sqlx::query(&format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            self.config.isolation_level.as_sql()
        ))
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.config.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        Ok(Box::new(PgTransaction { tx }))
    }
}

/// An open PostgreSQL transaction.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

fn store_err(err: sqlx::Error) -> StoreError {
    DbError::from(err).into()
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    // ------------------------------------------------------------------
    // Employees
    // ------------------------------------------------------------------

    async fn get_employee(&mut self, id: &ScotiaId) -> StoreResult<Option<Employee>> {
        let row = EmployeeRow::find_by_id(&mut *self.tx, id.as_str())
            .await
            .map_err(store_err)?;
        Ok(row.map(Employee::from))
    }

    async fn upsert_employee(&mut self, record: &Employee, mode: UpsertMode) -> StoreResult<()> {
        match mode {
            UpsertMode::Insert => EmployeeRow::insert(&mut *self.tx, record)
                .await
                .map_err(|e| {
                    let err = DbError::from(e);
                    if err.is_unique_violation() {
                        StoreError::Conflict {
                            id: record.scotia_id.to_string(),
                        }
                    } else {
                        err.into()
                    }
                }),
            UpsertMode::Replace => EmployeeRow::upsert(&mut *self.tx, record)
                .await
                .map_err(store_err),
        }
    }

    async fn update_employee_position(
        &mut self,
        id: &ScotiaId,
        new_position: &str,
        new_unit: &str,
    ) -> StoreResult<bool> {
        EmployeeRow::update_position(&mut *self.tx, id.as_str(), new_position, new_unit)
            .await
            .map_err(store_err)
    }

    async fn set_employee_inactive(
        &mut self,
        id: &ScotiaId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        EmployeeRow::deactivate(&mut *self.tx, id.as_str(), at)
            .await
            .map_err(store_err)
    }

    async fn list_employees(&mut self, active_only: bool) -> StoreResult<Vec<Employee>> {
        let rows = EmployeeRow::list(&mut *self.tx, active_only)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(Employee::from).collect())
    }

    // ------------------------------------------------------------------
    // Policy matrix
    // ------------------------------------------------------------------

    async fn list_policy_for(
        &mut self,
        unit: &str,
        position: &str,
    ) -> StoreResult<Vec<Application>> {
        let rows = ApplicationRow::list_for_placement(&mut *self.tx, unit, position)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(Application::from).collect())
    }

    async fn list_applications(&mut self) -> StoreResult<Vec<Application>> {
        let rows = ApplicationRow::list_all(&mut *self.tx)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(Application::from).collect())
    }

    async fn insert_application(&mut self, input: &NewApplication) -> StoreResult<Application> {
        let row = ApplicationRow::create(&mut *self.tx, input)
            .await
            .map_err(store_err)?;
        Ok(row.into())
    }

    async fn delete_application(&mut self, id: i64) -> StoreResult<bool> {
        ApplicationRow::delete(&mut *self.tx, id)
            .await
            .map_err(store_err)
    }

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    async fn insert_ledger(&mut self, event: &NewLedgerEvent) -> StoreResult<LedgerEvent> {
        let row = LedgerRow::insert(&mut *self.tx, event)
            .await
            .map_err(store_err)?;
        tracing::debug!(
            ledger_id = row.id,
            scotia_id = %event.scotia_id,
            case_id = %event.case_id,
            "Inserted ledger event"
        );
        Ok(LedgerEvent::try_from(row)?)
    }

    async fn find_recent_ledger(
        &mut self,
        scotia_id: &ScotiaId,
        app_access_name: &str,
        process_access: ProcessAccess,
        within: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<LedgerEvent>> {
        let rows = LedgerRow::find_recent(
            &mut *self.tx,
            scotia_id.as_str(),
            app_access_name,
            process_access,
            now - within,
        )
        .await
        .map_err(store_err)?;
        Ok(ledger::into_events(rows)?)
    }

    async fn list_ledger_for(&mut self, scotia_id: &ScotiaId) -> StoreResult<Vec<LedgerEvent>> {
        let rows = LedgerRow::list_for_employee(&mut *self.tx, scotia_id.as_str())
            .await
            .map_err(store_err)?;
        Ok(ledger::into_events(rows)?)
    }

    async fn list_ledger_for_case(&mut self, case_id: &CaseId) -> StoreResult<Vec<LedgerEvent>> {
        let rows = LedgerRow::list_for_case(&mut *self.tx, case_id.as_str())
            .await
            .map_err(store_err)?;
        Ok(ledger::into_events(rows)?)
    }

    async fn get_ledger_event(&mut self, id: i64) -> StoreResult<Option<LedgerEvent>> {
        let row = LedgerRow::find_by_id(&mut *self.tx, id)
            .await
            .map_err(store_err)?;
        Ok(row.map(LedgerEvent::try_from).transpose()?)
    }

    async fn update_ledger_status(
        &mut self,
        id: i64,
        update: &LedgerStatusUpdate,
    ) -> StoreResult<Option<LedgerEvent>> {
        let row = LedgerRow::update_status(&mut *self.tx, id, update)
            .await
            .map_err(store_err)?;
        Ok(row.map(LedgerEvent::try_from).transpose()?)
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(store_err)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(store_err)
    }
}
