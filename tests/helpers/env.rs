use chrono::Duration;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pkiguard::authz::audit::{AuditEvent, AuditLog};
use pkiguard::authz::catalog::StaticCatalog;
use pkiguard::authz::clock::ManualClock;
use pkiguard::authz::store::{GroupStore, MemoryGroupStore, VersionCounterStore};
use pkiguard::authz::trust::CertificateTrust;
use pkiguard::authz::types::{AccessRule, AdminEntity, AdminGroup, CaId, GroupId};
use pkiguard::authz::{AuthorizationService, AuthzOptions, Collaborators, StoreError};

use super::MockTrust;

/// Memory store that can be switched off to simulate an outage
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryGroupStore,
    down: AtomicBool,
    counter_down: AtomicBool,
}

impl FlakyStore {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Fail only version counter increments; reads and group writes keep working.
    pub fn set_counter_down(&self, down: bool) {
        self.counter_down.store(down, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("database connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl GroupStore for FlakyStore {
    fn find_all(&self) -> Result<Vec<AdminGroup>, StoreError> {
        self.guard()?;
        self.inner.find_all()
    }

    fn find_by_id(&self, id: GroupId) -> Result<Option<AdminGroup>, StoreError> {
        self.guard()?;
        self.inner.find_by_id(id)
    }

    fn find_by_name_and_ca(&self, name: &str, ca_id: CaId) -> Result<Option<AdminGroup>, StoreError> {
        self.guard()?;
        self.inner.find_by_name_and_ca(name, ca_id)
    }

    fn create(&self, name: &str, ca_id: CaId) -> Result<AdminGroup, StoreError> {
        self.guard()?;
        self.inner.create(name, ca_id)
    }

    fn rename(&self, id: GroupId, new_name: &str) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.rename(id, new_name)
    }

    fn remove(&self, id: GroupId) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.remove(id)
    }

    fn add_rules(&self, id: GroupId, rules: &[AccessRule]) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.add_rules(id, rules)
    }

    fn remove_rules(&self, id: GroupId, resources: &[String]) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.remove_rules(id, resources)
    }

    fn replace_rules(&self, id: GroupId, rules: &[AccessRule]) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.replace_rules(id, rules)
    }

    fn add_entities(&self, id: GroupId, entities: &[AdminEntity]) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.add_entities(id, entities)
    }

    fn remove_entities(&self, id: GroupId, entities: &[AdminEntity]) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.remove_entities(id, entities)
    }
}

impl VersionCounterStore for FlakyStore {
    fn current_version(&self) -> Result<i64, StoreError> {
        self.guard()?;
        self.inner.current_version()
    }

    fn increment(&self) -> Result<i64, StoreError> {
        self.guard()?;
        if self.counter_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("version counter row locked".into()));
        }
        self.inner.increment()
    }
}

/// Audit log keeping every event in memory
#[derive(Default)]
pub struct RecordingAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditLog {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditLog for RecordingAuditLog {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// One shared store and clock; every `instance()` is an independent service on top of them.
pub struct TestEnv {
    pub store: Arc<FlakyStore>,
    pub clock: Arc<ManualClock>,
    pub audit: Arc<RecordingAuditLog>,
    pub trust: Arc<dyn CertificateTrust>,
    pub ca_ids: Vec<CaId>,
    pub profile_ids: Vec<i32>,
    pub min_refresh: Duration,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            store: Arc::new(FlakyStore::default()),
            clock: Arc::new(ManualClock::default()),
            audit: Arc::new(RecordingAuditLog::default()),
            trust: Arc::new(MockTrust::new()),
            ca_ids: vec![1, 2, 5],
            profile_ids: vec![10, 20],
            min_refresh: Duration::zero(),
        }
    }

    pub fn with_min_refresh(mut self, secs: i64) -> Self {
        self.min_refresh = Duration::seconds(secs);
        self
    }

    pub fn with_trust(mut self, trust: MockTrust) -> Self {
        self.trust = Arc::new(trust);
        self
    }

    pub fn instance(&self) -> AuthorizationService {
        let collaborators = Collaborators {
            store: self.store.clone(),
            versions: self.store.clone(),
            catalog: Arc::new(StaticCatalog::new(self.ca_ids.clone(), self.profile_ids.clone())),
            trust: self.trust.clone(),
            audit: self.audit.clone(),
            clock: self.clock.clone(),
        };
        AuthorizationService::new(
            collaborators,
            AuthzOptions {
                min_refresh_interval: self.min_refresh,
                ..Default::default()
            },
        )
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }
}
