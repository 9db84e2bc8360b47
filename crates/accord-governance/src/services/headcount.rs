//! Headcount ingest boundary.
//!
//! `position` and `unit` are stored and later matched against the policy
//! matrix byte-for-byte. Callers canonicalize case and whitespace before
//! registering or syncing a record.

use std::sync::Arc;

use accord_core::{Employee, ScotiaId, Store, UpsertMode};

use crate::error::{GovernanceError, Result};
use crate::services::deadline::StoreDeadline;

/// Employee registration and lookup.
pub struct HeadcountService {
    store: Arc<dyn Store>,
    deadline: StoreDeadline,
}

impl HeadcountService {
    /// Create a new headcount service.
    pub fn new(store: Arc<dyn Store>, deadline: StoreDeadline) -> Self {
        Self { store, deadline }
    }

    /// Create an employee.
    ///
    /// # Errors
    ///
    /// `DuplicateEmployee` if the id already exists.
    pub async fn register(&self, record: &Employee) -> Result<()> {
        self.deadline
            .run(self.store.upsert_employee(record, UpsertMode::Insert))
            .await
            .map_err(|err| match err {
                GovernanceError::Conflict(_) => {
                    GovernanceError::DuplicateEmployee(record.scotia_id.to_string())
                }
                other => other,
            })?;
        tracing::info!(
            scotia_id = %record.scotia_id,
            position = %record.position,
            unit = %record.unit,
            "Employee registered"
        );
        Ok(())
    }

    /// Create or overwrite an employee from an ingest feed.
    pub async fn sync(&self, record: &Employee) -> Result<()> {
        self.deadline
            .run(self.store.upsert_employee(record, UpsertMode::Replace))
            .await?;
        tracing::debug!(scotia_id = %record.scotia_id, "Employee synced");
        Ok(())
    }

    /// Fetch an employee.
    pub async fn get(&self, scotia_id: &ScotiaId) -> Result<Option<Employee>> {
        self.deadline.run(self.store.get_employee(scotia_id)).await
    }

    /// List employees ordered by id.
    pub async fn list(&self, active_only: bool) -> Result<Vec<Employee>> {
        self.deadline.run(self.store.list_employees(active_only)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_core::InMemoryStore;

    fn service() -> HeadcountService {
        HeadcountService::new(Arc::new(InMemoryStore::new()), StoreDeadline::default())
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let service = service();
        let ada = Employee::new("E1", "Ada", "ada@example.com", "ANALYST", "TECH");
        service.register(&ada).await.unwrap();

        let err = service.register(&ada).await.unwrap_err();
        assert_eq!(err, GovernanceError::DuplicateEmployee("E1".into()));
    }

    #[tokio::test]
    async fn test_sync_overwrites_and_list_filters() {
        let service = service();
        service
            .register(&Employee::new("E1", "Ada", "ada@example.com", "ANALYST", "TECH"))
            .await
            .unwrap();
        let mut bo = Employee::new("E2", "Bo", "bo@example.com", "ANALYST", "TECH");
        bo.active = false;
        service.sync(&bo).await.unwrap();

        let mut ada = service.get(&"E1".into()).await.unwrap().unwrap();
        ada.unit = "OPS".into();
        service.sync(&ada).await.unwrap();
        assert_eq!(service.get(&"E1".into()).await.unwrap().unwrap().unit, "OPS");

        assert_eq!(service.list(false).await.unwrap().len(), 2);
        let active = service.list(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].scotia_id.as_str(), "E1");
    }

    #[tokio::test]
    async fn test_placement_is_stored_verbatim() {
        let service = service();
        service
            .register(&Employee::new("E1", "Ada", "ada@example.com", " Analyst", "tech"))
            .await
            .unwrap();
        let stored = service.get(&"E1".into()).await.unwrap().unwrap();
        assert_eq!(stored.position, " Analyst");
        assert_eq!(stored.unit, "tech");
    }
}
