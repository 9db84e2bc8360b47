//! Policy resolution.
//!
//! The target access of a `(unit, position)` placement is the set of
//! `(app, role)` pairs of every policy row whose `unit` and `position_role`
//! equal the placement byte-for-byte. Case and whitespace are the ingest
//! collaborator's concern.

use std::collections::BTreeSet;
use std::sync::Arc;

use accord_core::{AccessKey, Application, Store, StoreTransaction};

use crate::error::Result;
use crate::services::deadline::StoreDeadline;

/// Deduplicated `(app, role)` pairs of a set of policy rows.
#[must_use]
pub fn target_of(rows: &[Application]) -> BTreeSet<AccessKey> {
    rows.iter().map(Application::access_key).collect()
}

/// Resolve the target access of a placement inside an open transaction.
pub async fn resolve_target(
    tx: &mut dyn StoreTransaction,
    deadline: StoreDeadline,
    unit: &str,
    position: &str,
) -> Result<BTreeSet<AccessKey>> {
    let rows = deadline.run(tx.list_policy_for(unit, position)).await?;
    Ok(target_of(&rows))
}

/// Whether any policy row carries `app_access_name`, inside an open
/// transaction.
pub async fn application_exists(
    tx: &mut dyn StoreTransaction,
    deadline: StoreDeadline,
    app_access_name: &str,
) -> Result<bool> {
    let rows = deadline.run(tx.list_applications()).await?;
    Ok(rows.iter().any(|row| row.logical_access_name == app_access_name))
}

/// Read-only policy lookups.
pub struct PolicyResolver {
    store: Arc<dyn Store>,
    deadline: StoreDeadline,
}

impl PolicyResolver {
    /// Create a new resolver.
    pub fn new(store: Arc<dyn Store>, deadline: StoreDeadline) -> Self {
        Self { store, deadline }
    }

    /// Target access of a placement. Empty when no row matches.
    pub async fn target_for(&self, unit: &str, position: &str) -> Result<BTreeSet<AccessKey>> {
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let target = resolve_target(tx.as_mut(), self.deadline, unit, position).await?;
        self.deadline.run(tx.commit()).await?;
        Ok(target)
    }

    /// Whether any policy row carries `app_access_name`.
    pub async fn is_known_application(&self, app_access_name: &str) -> Result<bool> {
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let known = application_exists(tx.as_mut(), self.deadline, app_access_name).await?;
        self.deadline.run(tx.commit()).await?;
        Ok(known)
    }
}
