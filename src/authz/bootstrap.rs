//! Mandatory groups every deployment carries, and the rules protecting them.

use serde::Serialize;

use crate::authz::cache::TreeCache;
use crate::authz::errors::StoreError;
use crate::authz::store::GroupStore;
use crate::authz::types::*;

pub const DEFAULT_GROUP_NAME: &str = "DEFAULT";
pub const PUBLIC_WEB_GROUP_NAME: &str = "Public Web Users";
pub const SUPERADMIN_GROUP_NAME: &str = "Temporary Super Administrator Group";

/// DEFAULT on the internal CA and every Public Web Users group.
pub fn is_protected(name: &str, ca_id: CaId, internal_ca_id: CaId) -> bool {
    (name == DEFAULT_GROUP_NAME && ca_id == internal_ca_id) || name == PUBLIC_WEB_GROUP_NAME
}

/// Whether rule and entity edits are refused for the group.
pub fn is_locked(name: &str, ca_id: CaId, internal_ca_id: CaId) -> bool {
    name == DEFAULT_GROUP_NAME && ca_id == internal_ca_id
}

pub fn superadmin_entities(common_name: &str, ca_id: CaId) -> Vec<AdminEntity> {
    vec![AdminEntity::new(
        MatchWith::CommonName,
        Comparator::EqualCaseInsensitive,
        common_name,
        ca_id,
    )]
}

pub fn superadmin_rules() -> Vec<AccessRule> {
    vec![AccessRule::accept(SUPERADMIN, false)]
}

pub fn default_entities() -> Vec<AdminEntity> {
    [
        SpecialAdmin::BatchCommandLine,
        SpecialAdmin::CaCommandLine,
        SpecialAdmin::RaCommandLine,
        SpecialAdmin::InternalUser,
    ]
    .into_iter()
    .map(AdminEntity::special)
    .collect()
}

pub fn default_rules() -> Vec<AccessRule> {
    let mut rules = vec![
        AccessRule::accept(ADMINISTRATOR, true),
        AccessRule::accept(SUPERADMIN, false),
    ];
    rules.extend(
        [
            CA_FUNCTIONALITY,
            RA_FUNCTIONALITY,
            LOG_FUNCTIONALITY,
            SYSTEM_FUNCTIONALITY,
            HARDTOKEN_FUNCTIONALITY,
            CA_BASE,
            END_ENTITY_PROFILE_BASE,
        ]
        .into_iter()
        .map(|resource| AccessRule::accept(resource, true)),
    );
    rules
}

pub fn public_web_entities() -> Vec<AdminEntity> {
    vec![AdminEntity::special(SpecialAdmin::PublicWebUser)]
}

pub fn public_web_rules() -> Vec<AccessRule> {
    let mut rules: Vec<AccessRule> = [
        PUBLIC_WEB_USER,
        CA_BASIC_FUNCTIONS,
        CA_VIEW_CERTIFICATE,
        CA_CREATE_CERTIFICATE,
        CA_STORE_CERTIFICATE,
        RA_VIEW_END_ENTITY,
    ]
    .into_iter()
    .map(|resource| AccessRule::accept(resource, false))
    .collect();
    rules.push(AccessRule::accept(CA_BASE, true));
    rules.push(AccessRule::accept(END_ENTITY_PROFILE_BASE, true));
    rules
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicWebAction {
    Created,
    Repaired,
}

/// What one `initialize` run changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub superadmin_group_created: bool,
    pub default_group_created: bool,
    pub public_web: PublicWebAction,
}

/// Establishes and repairs the mandatory groups. Each structural step signals
/// the version counter exactly once.
pub struct Bootstrap<'a> {
    pub store: &'a dyn GroupStore,
    pub cache: &'a TreeCache,
    pub superadmin_common_name: &'a str,
    pub internal_ca_id: CaId,
}

impl Bootstrap<'_> {
    pub fn initialize(&self, ca_id: CaId) -> Result<BootstrapReport, StoreError> {
        let superadmin_group_created = self.ensure_superadmin_group(ca_id)?;
        let default_group_created = self.ensure_default_group()?;
        let public_web = self.ensure_public_web_group(ca_id)?;

        tracing::info!(
            ca_id,
            superadmin_group_created,
            default_group_created,
            public_web = ?public_web,
            "Initialized admin groups"
        );

        Ok(BootstrapReport {
            superadmin_group_created,
            default_group_created,
            public_web,
        })
    }

    /// Only a completely empty store receives the temporary superadmin group.
    /// A copy left without its rules by an interrupted run is completed.
    fn ensure_superadmin_group(&self, ca_id: CaId) -> Result<bool, StoreError> {
        let group = match self.store.find_by_name_and_ca(SUPERADMIN_GROUP_NAME, ca_id)? {
            Some(existing) if existing.is_superadmin_group() => return Ok(false),
            Some(partial) => {
                tracing::warn!(ca_id, id = %partial.id, "Completing partially created superadmin group");
                partial
            }
            None if self.store.find_all()?.is_empty() => self.store.create(SUPERADMIN_GROUP_NAME, ca_id)?,
            None => return Ok(false),
        };
        self.store
            .add_entities(group.id, &superadmin_entities(self.superadmin_common_name, ca_id))?;
        self.store.add_rules(group.id, &superadmin_rules())?;
        self.signal();
        Ok(true)
    }

    /// The step is committed; a failed increment is deferred by the cache.
    fn signal(&self) {
        self.cache.signal_committed().ok();
    }

    fn ensure_default_group(&self) -> Result<bool, StoreError> {
        if self
            .store
            .find_by_name_and_ca(DEFAULT_GROUP_NAME, self.internal_ca_id)?
            .is_some()
        {
            return Ok(false);
        }
        let group = match self.store.create(DEFAULT_GROUP_NAME, self.internal_ca_id) {
            Ok(group) => group,
            // Another instance won the race
            Err(StoreError::Conflict { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        self.store.add_entities(group.id, &default_entities())?;
        self.store.add_rules(group.id, &default_rules())?;
        self.signal();
        Ok(true)
    }

    fn ensure_public_web_group(&self, ca_id: CaId) -> Result<PublicWebAction, StoreError> {
        let (group, action) = match self.store.find_by_name_and_ca(PUBLIC_WEB_GROUP_NAME, ca_id)? {
            Some(existing) => {
                self.store.remove_entities(existing.id, &existing.entities)?;
                (existing, PublicWebAction::Repaired)
            }
            None => (
                self.store.create(PUBLIC_WEB_GROUP_NAME, ca_id)?,
                PublicWebAction::Created,
            ),
        };
        self.store.add_entities(group.id, &public_web_entities())?;
        self.store.replace_rules(group.id, &public_web_rules())?;
        self.signal();
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::clock::ManualClock;
    use crate::authz::store::{MemoryGroupStore, VersionCounterStore};
    use chrono::Duration;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryGroupStore>, TreeCache) {
        let store = Arc::new(MemoryGroupStore::new());
        let cache = TreeCache::new(
            store.clone(),
            store.clone(),
            Arc::new(ManualClock::default()),
            Duration::seconds(60),
        );
        (store, cache)
    }

    fn bootstrap<'a>(store: &'a MemoryGroupStore, cache: &'a TreeCache) -> Bootstrap<'a> {
        Bootstrap {
            store,
            cache,
            superadmin_common_name: "SuperAdmin",
            internal_ca_id: 0,
        }
    }

    #[test]
    fn test_initialize_empty_store() {
        let (store, cache) = setup();
        let report = bootstrap(&store, &cache).initialize(5).unwrap();
        assert_eq!(
            report,
            BootstrapReport {
                superadmin_group_created: true,
                default_group_created: true,
                public_web: PublicWebAction::Created,
            }
        );

        let names: Vec<String> = store.find_all().unwrap().into_iter().map(|g| g.name).collect();
        assert_eq!(
            names,
            vec![SUPERADMIN_GROUP_NAME, DEFAULT_GROUP_NAME, PUBLIC_WEB_GROUP_NAME]
        );
        assert_eq!(store.current_version().unwrap(), 3);

        let superadmin = store.find_by_name_and_ca(SUPERADMIN_GROUP_NAME, 5).unwrap().unwrap();
        assert!(superadmin.is_superadmin_group());
        assert_eq!(superadmin.entities[0].value, "SuperAdmin");
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (store, cache) = setup();
        bootstrap(&store, &cache).initialize(5).unwrap();
        let before = store.find_all().unwrap();

        let report = bootstrap(&store, &cache).initialize(5).unwrap();
        assert!(!report.superadmin_group_created);
        assert!(!report.default_group_created);
        assert_eq!(report.public_web, PublicWebAction::Repaired);
        assert_eq!(store.find_all().unwrap(), before);
    }

    #[test]
    fn test_public_web_group_is_reset() {
        let (store, cache) = setup();
        bootstrap(&store, &cache).initialize(5).unwrap();

        let web = store.find_by_name_and_ca(PUBLIC_WEB_GROUP_NAME, 5).unwrap().unwrap();
        store.add_rules(web.id, &[AccessRule::accept(SUPERADMIN, false)]).unwrap();
        store
            .add_entities(web.id, &[AdminEntity::special(SpecialAdmin::BatchCommandLine)])
            .unwrap();

        bootstrap(&store, &cache).initialize(5).unwrap();
        let web = store.find_by_id(web.id).unwrap().unwrap();
        assert_eq!(web.entities, public_web_entities());
        assert!(!web.is_superadmin_group());
        assert_eq!(web.rules.len(), public_web_rules().len());
    }

    #[test]
    fn test_second_ca_gets_its_own_public_web_group() {
        let (store, cache) = setup();
        bootstrap(&store, &cache).initialize(5).unwrap();
        let report = bootstrap(&store, &cache).initialize(6).unwrap();
        assert_eq!(report.public_web, PublicWebAction::Created);
        assert!(store.find_by_name_and_ca(PUBLIC_WEB_GROUP_NAME, 6).unwrap().is_some());
        assert!(store.find_by_name_and_ca(SUPERADMIN_GROUP_NAME, 6).unwrap().is_none());
    }

    #[test]
    fn test_protection() {
        assert!(is_protected(DEFAULT_GROUP_NAME, 0, 0));
        assert!(!is_protected(DEFAULT_GROUP_NAME, 5, 0));
        assert!(is_protected(PUBLIC_WEB_GROUP_NAME, 5, 0));
        assert!(!is_protected("Operators", 0, 0));

        assert!(is_locked(DEFAULT_GROUP_NAME, 0, 0));
        assert!(!is_locked(PUBLIC_WEB_GROUP_NAME, 5, 0));
    }

    #[test]
    fn test_default_group_content() {
        let rules = default_rules();
        assert_eq!(rules.len(), 9);
        assert!(rules.iter().filter(|r| !r.recursive).all(|r| r.resource == SUPERADMIN));
        assert_eq!(default_entities().len(), 4);
    }

    #[test]
    fn test_partial_superadmin_group_is_completed() {
        let (store, cache) = setup();
        // Created, then interrupted before its rules were stored
        let group = store.create(SUPERADMIN_GROUP_NAME, 5).unwrap();
        store.add_entities(group.id, &superadmin_entities("SuperAdmin", 5)).unwrap();

        let report = bootstrap(&store, &cache).initialize(5).unwrap();
        assert!(report.superadmin_group_created);
        let group = store.find_by_id(group.id).unwrap().unwrap();
        assert!(group.is_superadmin_group());
        assert_eq!(group.entities.len(), 1);

        let report = bootstrap(&store, &cache).initialize(5).unwrap();
        assert!(!report.superadmin_group_created);
    }
}
