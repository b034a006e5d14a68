use chrono::Duration;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::authz::audit::{AuditEvent, AuditKind, AuditLog, Outcome, TracingAuditLog};
use crate::authz::bootstrap::{self, Bootstrap, BootstrapReport, DEFAULT_GROUP_NAME};
use crate::authz::cache::TreeCache;
use crate::authz::catalog::PkiCatalog;
use crate::authz::clock::{Clock, SystemClock};
use crate::authz::engine;
use crate::authz::errors::{AuthzError, StoreError};
use crate::authz::matcher::AdminIdentity;
use crate::authz::store::{GroupStore, MemoryGroupStore, VersionCounterStore};
use crate::authz::tree::AccessTree;
use crate::authz::trust::{CertificateTrust, RejectAll};
use crate::authz::types::*;

/// External collaborators, resolved once at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn GroupStore>,
    pub versions: Arc<dyn VersionCounterStore>,
    pub catalog: Arc<dyn PkiCatalog>,
    pub trust: Arc<dyn CertificateTrust>,
    pub audit: Arc<dyn AuditLog>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Memory-backed store with tracing audit, the system clock and no certificate trust.
    pub fn in_memory(store: Arc<MemoryGroupStore>, catalog: Arc<dyn PkiCatalog>) -> Self {
        Self {
            store: store.clone(),
            versions: store,
            catalog,
            trust: Arc::new(RejectAll),
            audit: Arc::new(TracingAuditLog),
            clock: Arc::new(SystemClock),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthzOptions {
    /// Minimum time between two rebuilds of the local tree.
    pub min_refresh_interval: Duration,
    /// Common name matched by the temporary superadmin group.
    pub superadmin_common_name: String,
    /// CA id owning the DEFAULT group.
    pub internal_ca_id: CaId,
    /// Extra resources offered by `authorized_available_access_rules`.
    pub custom_access_rules: Vec<String>,
}

impl Default for AuthzOptions {
    fn default() -> Self {
        Self {
            min_refresh_interval: Duration::seconds(60),
            superadmin_common_name: "SuperAdmin".to_string(),
            internal_ca_id: 0,
            custom_access_rules: Vec::new(),
        }
    }
}

/// Process-wide authorization facade.
///
/// Decisions go through the [`TreeCache`]; mutations write to the group store,
/// signal the version counter and are audited.
pub struct AuthorizationService {
    store: Arc<dyn GroupStore>,
    catalog: Arc<dyn PkiCatalog>,
    trust: Arc<dyn CertificateTrust>,
    audit: Arc<dyn AuditLog>,
    cache: TreeCache,
    options: AuthzOptions,
}

impl AuthorizationService {
    pub fn new(collaborators: Collaborators, options: AuthzOptions) -> Self {
        let cache = TreeCache::new(
            collaborators.store.clone(),
            collaborators.versions,
            collaborators.clock,
            options.min_refresh_interval,
        );
        Self {
            store: collaborators.store,
            catalog: collaborators.catalog,
            trust: collaborators.trust,
            audit: collaborators.audit,
            cache,
            options,
        }
    }

    pub fn options(&self) -> &AuthzOptions {
        &self.options
    }

    pub fn cache(&self) -> &TreeCache {
        &self.cache
    }

    /// Tree to decide against, refreshed first when the counter moved.
    pub fn tree(&self) -> Arc<AccessTree> {
        self.cache.current()
    }

    fn record(&self, admin: &AdminIdentity, kind: AuditKind, outcome: Outcome, message: String) {
        self.audit.record(AuditEvent {
            admin: admin.to_string(),
            ca_id: admin.ca_id(),
            kind,
            outcome,
            message,
        });
    }

    fn decide(&self, admin: &AdminIdentity, resource: &str, granted: bool, audit: bool) -> Result<bool, AuthzError> {
        if audit {
            let (kind, outcome) = if granted {
                (AuditKind::AuthorizedToResource, Outcome::Success)
            } else {
                (AuditKind::NotAuthorizedToResource, Outcome::Failure)
            };
            self.record(admin, kind, outcome, format!("resource {resource}"));
        }
        if granted {
            Ok(true)
        } else {
            Err(AuthzError::AuthorizationDenied {
                admin: admin.to_string(),
                resource: resource.to_string(),
            })
        }
    }

    // ---------- Decisions ----------

    /// `Ok(true)` when granted, `AuthorizationDenied` otherwise. Audited.
    pub fn is_authorized(&self, admin: &AdminIdentity, resource: &str) -> Result<bool, AuthzError> {
        let granted = engine::check(&self.tree(), admin, resource);
        self.decide(admin, resource, granted, true)
    }

    pub fn is_authorized_no_log(&self, admin: &AdminIdentity, resource: &str) -> Result<bool, AuthzError> {
        let granted = engine::check(&self.tree(), admin, resource);
        self.decide(admin, resource, granted, false)
    }

    /// Evaluate the group's own rules for `resource`. `admin` is recorded in the audit trail only.
    pub fn is_group_authorized(
        &self,
        admin: &AdminIdentity,
        group_id: GroupId,
        resource: &str,
    ) -> Result<bool, AuthzError> {
        let granted = engine::check_group(&self.tree(), group_id, resource);
        self.decide(admin, resource, granted, true)
    }

    pub fn is_group_authorized_no_log(
        &self,
        admin: &AdminIdentity,
        group_id: GroupId,
        resource: &str,
    ) -> Result<bool, AuthzError> {
        let granted = engine::check_group(&self.tree(), group_id, resource);
        self.decide(admin, resource, granted, false)
    }

    /// Membership read straight from the store, not from the cached tree.
    pub fn exists_administrator_in_group(
        &self,
        admin: &AdminIdentity,
        group_id: GroupId,
    ) -> Result<bool, AuthzError> {
        Ok(self
            .store
            .find_by_id(group_id)?
            .is_some_and(|group| group.entities.iter().any(|entity| entity.matches(admin))))
    }

    /// Validate a client certificate. Failures are audited.
    pub fn authenticate(&self, certificate: &[u8]) -> Result<AdminIdentity, AuthzError> {
        engine::authenticate(self.trust.as_ref(), certificate).inspect_err(|e| {
            self.audit.record(AuditEvent {
                admin: "unauthenticated".to_string(),
                ca_id: None,
                kind: AuditKind::AuthenticationFailed,
                outcome: Outcome::Failure,
                message: e.to_string(),
            });
        })
    }

    pub fn authorized_ca_ids(&self, admin: &AdminIdentity) -> BTreeSet<CaId> {
        engine::authorized_ca_ids(&self.tree(), admin, self.catalog.as_ref())
    }

    pub fn authorized_end_entity_profile_ids(
        &self,
        admin: &AdminIdentity,
        privilege: ProfilePrivilege,
    ) -> BTreeSet<ProfileId> {
        engine::authorized_end_entity_profile_ids(&self.tree(), admin, self.catalog.as_ref(), privilege)
    }

    pub fn authorized_available_access_rules(&self, admin: &AdminIdentity) -> Vec<String> {
        engine::available_access_rules(
            &self.tree(),
            admin,
            self.catalog.as_ref(),
            &self.options.custom_access_rules,
        )
    }

    /// Groups `admin` may administer. Protected groups are never listed.
    ///
    /// A group with no explicit `/ca/<id>` accept passes the per-CA check
    /// trivially; only the owner CA then restricts it.
    pub fn authorized_admin_group_names(&self, admin: &AdminIdentity) -> Result<Vec<GroupName>, AuthzError> {
        let tree = self.tree();
        let groups = self.store.find_all()?;
        let superadmin = engine::is_superadmin(&tree, admin);
        let authorized_cas = engine::authorized_ca_ids(&tree, admin, self.catalog.as_ref());
        let all_cas: BTreeSet<CaId> = self.catalog.ca_ids().into_iter().collect();
        let authorized_to_all = all_cas.is_subset(&authorized_cas);

        let names = groups
            .into_iter()
            .filter(|group| !bootstrap::is_protected(&group.name, group.ca_id, self.options.internal_ca_id))
            .filter(|group| {
                if superadmin {
                    return true;
                }
                if !authorized_cas.contains(&group.ca_id) || group.is_superadmin_group() {
                    return false;
                }
                let explicit_cas_authorized = explicit_ca_ids(group)
                    .all(|ca_id| authorized_cas.contains(&ca_id));
                let recursive_ca_base = group.rules.iter().any(|rule| {
                    rule.effect == RuleEffect::Accept && rule.recursive && rule.resource == CA_BASE
                });
                explicit_cas_authorized || (recursive_ca_base && authorized_to_all)
            })
            .map(|group| GroupName {
                name: group.name,
                ca_id: group.ca_id,
            })
            .collect();
        Ok(names)
    }

    // ---------- Queries ----------

    pub fn admin_group(&self, name: &str, ca_id: CaId) -> Result<Option<AdminGroup>, AuthzError> {
        Ok(self.store.find_by_name_and_ca(name, ca_id)?)
    }

    /// Whether any rule of any group refers to the profile.
    pub fn exists_end_entity_profile_in_rules(&self, profile_id: ProfileId) -> Result<bool, AuthzError> {
        let id = profile_id.to_string();
        let prefix = ["endentityprofilesrules", id.as_str()];
        Ok(self
            .store
            .find_all()?
            .iter()
            .flat_map(|group| group.rules.iter())
            .any(|rule| starts_with_segments(&rule.resource, &prefix)))
    }

    /// Whether the CA both owns an admin group and is referred to by some access rule.
    /// The two conditions are checked across all groups independently.
    pub fn exists_ca_in_rules(&self, ca_id: CaId) -> Result<bool, AuthzError> {
        let id = ca_id.to_string();
        let prefix = ["ca", id.as_str()];
        let groups = self.store.find_all()?;
        let owns_group = groups.iter().any(|group| group.ca_id == ca_id);
        let in_rules = groups
            .iter()
            .flat_map(|group| group.rules.iter())
            .any(|rule| starts_with_segments(&rule.resource, &prefix));
        Ok(owns_group && in_rules)
    }

    /// Signal every instance and rebuild this one immediately.
    pub fn force_rule_update(&self) -> Result<(), AuthzError> {
        let tree = self.cache.force_update()?;
        tracing::info!(version = tree.version(), groups = tree.groups().len(), "Forced access tree update");
        Ok(())
    }

    // ---------- Bootstrap ----------

    /// Create the mandatory groups for `ca_id` and repair its public web group.
    pub fn initialize(&self, admin: &AdminIdentity, ca_id: CaId) -> Result<BootstrapReport, AuthzError> {
        let bootstrap = Bootstrap {
            store: self.store.as_ref(),
            cache: &self.cache,
            superadmin_common_name: &self.options.superadmin_common_name,
            internal_ca_id: self.options.internal_ca_id,
        };
        let result = bootstrap.initialize(ca_id).map_err(AuthzError::from);
        match &result {
            Ok(report) => self.record(
                admin,
                AuditKind::EditedAdministratorPrivileges,
                Outcome::Success,
                format!("initialized admin groups for ca {ca_id}: {report:?}"),
            ),
            Err(e) => self.record(
                admin,
                AuditKind::EditedAdministratorPrivileges,
                Outcome::Failure,
                format!("initializing admin groups for ca {ca_id} failed: {e}"),
            ),
        }
        result
    }

    // ---------- Mutations ----------

    /// Run a store mutation, signal on success and audit the outcome.
    ///
    /// Once `op` succeeds the change is durable, so a counter that cannot be
    /// bumped defers the signal instead of failing the call.
    fn mutate<F>(&self, admin: &AdminIdentity, action: String, op: F) -> Result<(), AuthzError>
    where
        F: FnOnce(&dyn GroupStore) -> Result<(), AuthzError>,
    {
        match op(self.store.as_ref()) {
            Ok(()) => {
                let message = match self.cache.signal_committed() {
                    Ok(_) => action,
                    Err(e) => format!("{action} (update signal deferred: {e})"),
                };
                self.record(
                    admin,
                    AuditKind::EditedAdministratorPrivileges,
                    Outcome::Success,
                    message,
                );
                Ok(())
            }
            Err(e) => {
                self.record(
                    admin,
                    AuditKind::EditedAdministratorPrivileges,
                    Outcome::Failure,
                    format!("{action} failed: {e}"),
                );
                Err(e)
            }
        }
    }

    fn resolve(store: &dyn GroupStore, name: &str, ca_id: CaId) -> Result<AdminGroup, AuthzError> {
        store
            .find_by_name_and_ca(name, ca_id)?
            .ok_or_else(|| AuthzError::AdminGroupNotFound {
                name: name.to_string(),
                ca_id,
            })
    }

    fn skip_protected(&self, operation: &str, name: &str, ca_id: CaId) -> bool {
        let protected = bootstrap::is_protected(name, ca_id, self.options.internal_ca_id);
        if protected {
            tracing::debug!(operation, name, ca_id, "Ignoring change to protected group");
        }
        protected
    }

    fn skip_locked(&self, operation: &str, name: &str, ca_id: CaId) -> bool {
        let locked = bootstrap::is_locked(name, ca_id, self.options.internal_ca_id);
        if locked {
            tracing::debug!(operation, name, ca_id, "Ignoring change to locked group");
        }
        locked
    }

    pub fn add_admin_group(&self, admin: &AdminIdentity, name: &str, ca_id: CaId) -> Result<(), AuthzError> {
        if name == DEFAULT_GROUP_NAME && ca_id == self.options.internal_ca_id {
            tracing::debug!(name, ca_id, "Ignoring creation of reserved group");
            return Ok(());
        }
        self.mutate(admin, format!("added admin group {name} (ca {ca_id})"), |store| {
            store.create(name, ca_id).map(|_| ()).map_err(|e| match e {
                StoreError::Conflict { name, ca_id } => AuthzError::AdminGroupExists { name, ca_id },
                other => other.into(),
            })
        })
    }

    pub fn remove_admin_group(&self, admin: &AdminIdentity, name: &str, ca_id: CaId) -> Result<(), AuthzError> {
        if self.skip_protected("remove", name, ca_id) {
            return Ok(());
        }
        self.mutate(admin, format!("removed admin group {name} (ca {ca_id})"), |store| {
            let group = Self::resolve(store, name, ca_id)?;
            Ok(store.remove(group.id)?)
        })
    }

    pub fn rename_admin_group(
        &self,
        admin: &AdminIdentity,
        name: &str,
        ca_id: CaId,
        new_name: &str,
    ) -> Result<(), AuthzError> {
        if self.skip_protected("rename", name, ca_id) {
            return Ok(());
        }
        self.mutate(
            admin,
            format!("renamed admin group {name} (ca {ca_id}) to {new_name}"),
            |store| {
                if bootstrap::is_protected(new_name, ca_id, self.options.internal_ca_id) {
                    return Err(AuthzError::ReservedGroupName {
                        name: new_name.to_string(),
                        ca_id,
                    });
                }
                let group = Self::resolve(store, name, ca_id)?;
                store.rename(group.id, new_name).map_err(|e| match e {
                    StoreError::Conflict { name, ca_id } => AuthzError::AdminGroupExists { name, ca_id },
                    other => other.into(),
                })
            },
        )
    }

    /// Add rules to a group, replacing existing rules on the same resources.
    pub fn add_access_rules(
        &self,
        admin: &AdminIdentity,
        name: &str,
        ca_id: CaId,
        rules: &[AccessRule],
    ) -> Result<(), AuthzError> {
        if self.skip_locked("add_access_rules", name, ca_id) {
            return Ok(());
        }
        self.mutate(
            admin,
            format!("added {} access rules to {name} (ca {ca_id})", rules.len()),
            |store| {
                let group = Self::resolve(store, name, ca_id)?;
                Ok(store.add_rules(group.id, rules)?)
            },
        )
    }

    pub fn remove_access_rules(
        &self,
        admin: &AdminIdentity,
        name: &str,
        ca_id: CaId,
        resources: &[String],
    ) -> Result<(), AuthzError> {
        if self.skip_locked("remove_access_rules", name, ca_id) {
            return Ok(());
        }
        self.mutate(
            admin,
            format!("removed {} access rules from {name} (ca {ca_id})", resources.len()),
            |store| {
                let group = Self::resolve(store, name, ca_id)?;
                Ok(store.remove_rules(group.id, resources)?)
            },
        )
    }

    pub fn replace_access_rules(
        &self,
        admin: &AdminIdentity,
        name: &str,
        ca_id: CaId,
        rules: &[AccessRule],
    ) -> Result<(), AuthzError> {
        if self.skip_locked("replace_access_rules", name, ca_id) {
            return Ok(());
        }
        self.mutate(
            admin,
            format!("replaced access rules of {name} (ca {ca_id})"),
            |store| {
                let group = Self::resolve(store, name, ca_id)?;
                Ok(store.replace_rules(group.id, rules)?)
            },
        )
    }

    pub fn add_admin_entities(
        &self,
        admin: &AdminIdentity,
        name: &str,
        ca_id: CaId,
        entities: &[AdminEntity],
    ) -> Result<(), AuthzError> {
        if self.skip_locked("add_admin_entities", name, ca_id) {
            return Ok(());
        }
        self.mutate(
            admin,
            format!("added {} admin entities to {name} (ca {ca_id})", entities.len()),
            |store| {
                let group = Self::resolve(store, name, ca_id)?;
                Ok(store.add_entities(group.id, entities)?)
            },
        )
    }

    pub fn remove_admin_entities(
        &self,
        admin: &AdminIdentity,
        name: &str,
        ca_id: CaId,
        entities: &[AdminEntity],
    ) -> Result<(), AuthzError> {
        if self.skip_locked("remove_admin_entities", name, ca_id) {
            return Ok(());
        }
        self.mutate(
            admin,
            format!("removed {} admin entities from {name} (ca {ca_id})", entities.len()),
            |store| {
                let group = Self::resolve(store, name, ca_id)?;
                Ok(store.remove_entities(group.id, entities)?)
            },
        )
    }
}

/// CA ids named by explicit `/ca/<id>` accept rules.
fn explicit_ca_ids(group: &AdminGroup) -> impl Iterator<Item = CaId> + '_ {
    group
        .rules
        .iter()
        .filter(|rule| rule.effect == RuleEffect::Accept)
        .filter_map(|rule| {
            let mut parts = segments(&rule.resource);
            match (parts.next(), parts.next(), parts.next()) {
                (Some("ca"), Some(id), None) => id.parse().ok(),
                _ => None,
            }
        })
}

fn starts_with_segments(resource: &str, prefix: &[&str]) -> bool {
    let mut parts = segments(resource);
    prefix.iter().all(|wanted| parts.next() == Some(*wanted))
}
