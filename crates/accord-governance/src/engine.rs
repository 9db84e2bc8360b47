//! Engine facade wiring the services over one store and clock.

use std::sync::Arc;

use accord_core::Store;

use crate::clock::{Clock, SystemClock};
use crate::config::{ClockSource, EngineConfig, ISOLATION_LEVEL_VAR};
use crate::error::{GovernanceError, Result};
use crate::services::{
    AccessProjector, HeadcountService, LedgerService, LifecycleEngine, PolicyResolver, Reporter,
    StoreDeadline, TicketWriter,
};

/// Entry point of the reconciliation engine.
///
/// All services share the same store, clock and per-call deadline.
pub struct AccessGovernance {
    config: EngineConfig,
    lifecycle: LifecycleEngine,
    reporter: Reporter,
    ledger: LedgerService,
    headcount: HeadcountService,
    projector: AccessProjector,
    policy: PolicyResolver,
}

impl AccessGovernance {
    /// Build the engine.
    ///
    /// With `ClockSource::Injected` the caller must supply `clock`; with
    /// `ClockSource::Wall` a supplied clock is ignored.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when an injected clock is required but absent,
    /// `ConfigInvalid` when the store timeout is zero or the store runs at a
    /// different isolation level than configured.
    pub fn new(
        store: Arc<dyn Store>,
        config: EngineConfig,
        clock: Option<Arc<dyn Clock>>,
    ) -> Result<Self> {
        let clock: Arc<dyn Clock> = match config.clock_source {
            ClockSource::Wall => Arc::new(SystemClock),
            ClockSource::Injected => clock.ok_or_else(|| GovernanceError::ConfigMissing {
                var: "clock".to_string(),
            })?,
        };
        if config.store_timeout_ms == 0 {
            return Err(GovernanceError::ConfigInvalid {
                var: "store_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if store.isolation_level() != config.isolation_level {
            return Err(GovernanceError::ConfigInvalid {
                var: ISOLATION_LEVEL_VAR.to_string(),
                reason: format!(
                    "store runs at {}, configured {}",
                    store.isolation_level().as_sql(),
                    config.isolation_level.as_sql()
                ),
            });
        }

        let deadline = StoreDeadline::new(config.store_timeout());
        let writer = TicketWriter::new(config.dedup_window(), deadline);

        tracing::info!(
            dedup_window_secs = config.dedup_window_secs,
            isolation_level = config.isolation_level.as_sql(),
            clock_source = config.clock_source.as_str(),
            store_timeout_ms = config.store_timeout_ms,
            "Access governance engine initialized"
        );

        Ok(Self {
            lifecycle: LifecycleEngine::new(store.clone(), clock.clone(), writer, deadline),
            reporter: Reporter::new(store.clone(), clock.clone(), deadline),
            ledger: LedgerService::new(store.clone(), clock, deadline),
            headcount: HeadcountService::new(store.clone(), deadline),
            projector: AccessProjector::new(store.clone(), deadline),
            policy: PolicyResolver::new(store, deadline),
            config,
        })
    }

    /// Onboarding, lateral movement, offboarding, manual access, conciliation.
    pub fn lifecycle(&self) -> &LifecycleEngine {
        &self.lifecycle
    }

    /// Reconciliation and projection reports.
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Ledger status updates and history.
    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    /// Employee ingest.
    pub fn headcount(&self) -> &HeadcountService {
        &self.headcount
    }

    pub fn projector(&self) -> &AccessProjector {
        &self.projector
    }

    pub fn policy(&self) -> &PolicyResolver {
        &self.policy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use accord_core::{Employee, InMemoryStore, IsolationLevel};
    use chrono::{TimeZone, Utc};

    fn injected() -> EngineConfig {
        EngineConfig {
            clock_source: ClockSource::Injected,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_injected_clock_is_required() {
        let result = AccessGovernance::new(Arc::new(InMemoryStore::new()), injected(), None);
        assert!(matches!(
            result,
            Err(GovernanceError::ConfigMissing { ref var }) if var == "clock"
        ));
    }

    #[test]
    fn test_zero_store_timeout_is_rejected() {
        let config = EngineConfig {
            store_timeout_ms: 0,
            ..EngineConfig::default()
        };
        let result = AccessGovernance::new(Arc::new(InMemoryStore::new()), config, None);
        assert!(matches!(result, Err(GovernanceError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_isolation_level_must_match_store() {
        let config = EngineConfig {
            isolation_level: IsolationLevel::ReadCommitted,
            ..EngineConfig::default()
        };
        let result = AccessGovernance::new(Arc::new(InMemoryStore::new()), config, None);
        assert!(matches!(
            result,
            Err(GovernanceError::ConfigInvalid { ref var, .. }) if var == "ACCORD_ISOLATION_LEVEL"
        ));

        let config = EngineConfig {
            isolation_level: IsolationLevel::Serializable,
            ..EngineConfig::default()
        };
        assert!(AccessGovernance::new(Arc::new(InMemoryStore::new()), config, None).is_ok());
    }

    #[tokio::test]
    async fn test_services_share_the_injected_clock() {
        let store = Arc::new(InMemoryStore::new());
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let clock = Arc::new(ManualClock::new(at));
        let engine = AccessGovernance::new(store, injected(), Some(clock)).unwrap();

        engine
            .headcount()
            .register(&Employee::new("E1", "Ada", "ada@example.com", "ANALYST", "TECH"))
            .await
            .unwrap();
        let report = engine
            .reporter()
            .reconciliation_report(&"E1".into())
            .await
            .unwrap();
        assert_eq!(report.generated_at, at);
        assert_eq!(engine.config().dedup_window_secs, 86_400);
    }
}
