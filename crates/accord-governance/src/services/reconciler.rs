//! Grant/revoke delta between effective and target access.

use std::collections::BTreeSet;

use accord_core::AccessKey;
use serde::{Deserialize, Serialize};

/// Reason recorded on a grant produced by reconciliation.
pub const MISSING_ACCESS: &str = "Missing access";

/// Reason recorded on a revoke produced by reconciliation.
pub const NOT_AUTHORIZED: &str = "Not authorized by policy";

/// Partition of `effective ∪ target`.
///
/// `to_grant`, `to_revoke` and `keep` are pairwise disjoint;
/// `to_grant ∪ keep` is the target and `to_revoke ∪ keep` the effective set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDelta {
    pub to_grant: BTreeSet<AccessKey>,
    pub to_revoke: BTreeSet<AccessKey>,
    pub keep: BTreeSet<AccessKey>,
}

impl AccessDelta {
    /// Whether effective access already conforms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_grant.is_empty() && self.to_revoke.is_empty()
    }
}

/// Compute the delta. Equality is exact on both fields; a null role is its
/// own value.
#[must_use]
pub fn reconcile(effective: &BTreeSet<AccessKey>, target: &BTreeSet<AccessKey>) -> AccessDelta {
    AccessDelta {
        to_grant: target.difference(effective).cloned().collect(),
        to_revoke: effective.difference(target).cloned().collect(),
        keep: target.intersection(effective).cloned().collect(),
    }
}
