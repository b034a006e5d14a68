use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use crate::authz::errors::StoreError;
use crate::authz::types::{normalize, AccessRule, AdminEntity, AdminGroup, CaId, GroupId};

/// Persistent home of admin groups. Every call is atomic.
pub trait GroupStore: Send + Sync {
    /// Every group, ordered by id.
    fn find_all(&self) -> Result<Vec<AdminGroup>, StoreError>;
    fn find_by_id(&self, id: GroupId) -> Result<Option<AdminGroup>, StoreError>;
    fn find_by_name_and_ca(&self, name: &str, ca_id: CaId)
        -> Result<Option<AdminGroup>, StoreError>;

    /// Create an empty group. Fails with `Conflict` if `(name, ca_id)` is taken.
    fn create(&self, name: &str, ca_id: CaId) -> Result<AdminGroup, StoreError>;
    fn rename(&self, id: GroupId, new_name: &str) -> Result<(), StoreError>;
    fn remove(&self, id: GroupId) -> Result<(), StoreError>;

    /// Add rules, replacing any existing rule on the same resource.
    fn add_rules(&self, id: GroupId, rules: &[AccessRule]) -> Result<(), StoreError>;
    fn remove_rules(&self, id: GroupId, resources: &[String]) -> Result<(), StoreError>;
    fn replace_rules(&self, id: GroupId, rules: &[AccessRule]) -> Result<(), StoreError>;

    fn add_entities(&self, id: GroupId, entities: &[AdminEntity]) -> Result<(), StoreError>;
    fn remove_entities(&self, id: GroupId, entities: &[AdminEntity]) -> Result<(), StoreError>;
}

/// Shared counter signalling that compiled access trees are stale.
pub trait VersionCounterStore: Send + Sync {
    fn current_version(&self) -> Result<i64, StoreError>;
    /// Bump the counter and return the new value.
    fn increment(&self) -> Result<i64, StoreError>;
}

#[derive(Debug, Clone)]
struct StoredGroup {
    name: String,
    ca_id: CaId,
    entities: BTreeSet<AdminEntity>,
    rules: BTreeMap<String, AccessRule>,
}

impl StoredGroup {
    fn to_group(&self, id: GroupId) -> AdminGroup {
        AdminGroup {
            id,
            name: self.name.clone(),
            ca_id: self.ca_id,
            entities: self.entities.iter().cloned().collect(),
            rules: self.rules.values().cloned().collect(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    groups: BTreeMap<GroupId, StoredGroup>,
    next_id: i64,
    version: i64,
}

impl Inner {
    fn group_mut(&mut self, id: GroupId) -> Result<&mut StoredGroup, StoreError> {
        self.groups.get_mut(&id).ok_or(StoreError::NotFound(id))
    }

    fn name_taken(&self, name: &str, ca_id: CaId) -> bool {
        self.groups
            .values()
            .any(|g| g.name == name && g.ca_id == ca_id)
    }
}

/// In-process store holding groups and the version counter. Cloning an `Arc` of it
/// lets several services share one "database".
#[derive(Debug, Default)]
pub struct MemoryGroupStore {
    inner: RwLock<Inner>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupStore for MemoryGroupStore {
    fn find_all(&self) -> Result<Vec<AdminGroup>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .groups
            .iter()
            .map(|(id, group)| group.to_group(*id))
            .collect())
    }

    fn find_by_id(&self, id: GroupId) -> Result<Option<AdminGroup>, StoreError> {
        Ok(self.inner.read().groups.get(&id).map(|g| g.to_group(id)))
    }

    fn find_by_name_and_ca(
        &self,
        name: &str,
        ca_id: CaId,
    ) -> Result<Option<AdminGroup>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .groups
            .iter()
            .find(|(_, g)| g.name == name && g.ca_id == ca_id)
            .map(|(id, g)| g.to_group(*id)))
    }

    fn create(&self, name: &str, ca_id: CaId) -> Result<AdminGroup, StoreError> {
        let mut inner = self.inner.write();
        if inner.name_taken(name, ca_id) {
            return Err(StoreError::Conflict {
                name: name.to_string(),
                ca_id,
            });
        }
        inner.next_id += 1;
        let id = GroupId(inner.next_id);
        let group = StoredGroup {
            name: name.to_string(),
            ca_id,
            entities: BTreeSet::new(),
            rules: BTreeMap::new(),
        };
        let created = group.to_group(id);
        inner.groups.insert(id, group);
        Ok(created)
    }

    fn rename(&self, id: GroupId, new_name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let ca_id = inner.group_mut(id)?.ca_id;
        if inner.name_taken(new_name, ca_id) {
            return Err(StoreError::Conflict {
                name: new_name.to_string(),
                ca_id,
            });
        }
        inner.group_mut(id)?.name = new_name.to_string();
        Ok(())
    }

    fn remove(&self, id: GroupId) -> Result<(), StoreError> {
        self.inner
            .write()
            .groups
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    fn add_rules(&self, id: GroupId, rules: &[AccessRule]) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let group = inner.group_mut(id)?;
        for rule in rules {
            let rule = AccessRule::new(&rule.resource, rule.effect, rule.recursive);
            group.rules.insert(rule.resource.clone(), rule);
        }
        Ok(())
    }

    fn remove_rules(&self, id: GroupId, resources: &[String]) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let group = inner.group_mut(id)?;
        for resource in resources {
            group.rules.remove(&normalize(resource));
        }
        Ok(())
    }

    fn replace_rules(&self, id: GroupId, rules: &[AccessRule]) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let group = inner.group_mut(id)?;
        group.rules = rules
            .iter()
            .map(|r| {
                let rule = AccessRule::new(&r.resource, r.effect, r.recursive);
                (rule.resource.clone(), rule)
            })
            .collect();
        Ok(())
    }

    fn add_entities(&self, id: GroupId, entities: &[AdminEntity]) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let group = inner.group_mut(id)?;
        group.entities.extend(entities.iter().cloned());
        Ok(())
    }

    fn remove_entities(&self, id: GroupId, entities: &[AdminEntity]) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let group = inner.group_mut(id)?;
        for entity in entities {
            group.entities.remove(entity);
        }
        Ok(())
    }
}

impl VersionCounterStore for MemoryGroupStore {
    fn current_version(&self) -> Result<i64, StoreError> {
        Ok(self.inner.read().version)
    }

    fn increment(&self) -> Result<i64, StoreError> {
        let mut inner = self.inner.write();
        inner.version += 1;
        Ok(inner.version)
    }
}
