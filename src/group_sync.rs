use miette::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::authz::bootstrap;
use crate::authz::errors::AuthzError;
use crate::authz::loader::load_group_definitions;
use crate::authz::matcher::AdminIdentity;
use crate::authz::service::AuthorizationService;
use crate::authz::types::{AccessRule, AdminEntity, AdminGroup, GroupDefinition};

/// Outcome counts of one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncResult {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

/// Load seed files from `dir` and sync them into the group store (idempotent)
pub fn sync_groups_from_dir(
    service: &AuthorizationService,
    admin: &AdminIdentity,
    dir: &Path,
) -> Result<SyncReport> {
    tracing::info!("Loading admin groups from {}", dir.display());
    let definitions = load_group_definitions(dir)?;
    Ok(sync_groups(service, admin, &definitions)?)
}

/// Make the store match the definitions. Groups not mentioned are left alone.
pub fn sync_groups(
    service: &AuthorizationService,
    admin: &AdminIdentity,
    definitions: &[GroupDefinition],
) -> std::result::Result<SyncReport, AuthzError> {
    let mut report = SyncReport::default();

    for definition in definitions {
        match sync_group(service, admin, definition)? {
            SyncResult::Created => report.created += 1,
            SyncResult::Updated => report.updated += 1,
            SyncResult::Unchanged => report.unchanged += 1,
            SyncResult::Skipped => report.skipped += 1,
        }
    }

    tracing::info!(
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        "Admin group sync complete"
    );

    Ok(report)
}

fn rule_map(rules: &[AccessRule]) -> BTreeMap<String, AccessRule> {
    rules
        .iter()
        .map(|r| {
            let rule = AccessRule::new(&r.resource, r.effect, r.recursive);
            (rule.resource.clone(), rule)
        })
        .collect()
}

fn sync_group(
    service: &AuthorizationService,
    admin: &AdminIdentity,
    definition: &GroupDefinition,
) -> std::result::Result<SyncResult, AuthzError> {
    let GroupDefinition { name, ca_id, .. } = definition;

    if bootstrap::is_locked(name, *ca_id, service.options().internal_ca_id) {
        tracing::warn!("Seed for reserved group {name} (ca {ca_id}) ignored");
        return Ok(SyncResult::Skipped);
    }

    let existing = service.admin_group(name, *ca_id)?;
    let result = match &existing {
        None => {
            tracing::info!("Creating admin group: {name} (ca {ca_id})");
            service.add_admin_group(admin, name, *ca_id)?;
            SyncResult::Created
        }
        Some(_) => SyncResult::Unchanged,
    };

    let (current_rules, current_entities) = match existing {
        Some(AdminGroup { rules, entities, .. }) => (rule_map(&rules), entities.into_iter().collect::<BTreeSet<_>>()),
        None => (BTreeMap::new(), BTreeSet::new()),
    };
    let wanted_rules = rule_map(&definition.rules);
    let wanted_entities: BTreeSet<AdminEntity> = definition.entities.iter().cloned().collect();

    let mut changed = false;

    if current_rules != wanted_rules {
        let rules: Vec<AccessRule> = wanted_rules.into_values().collect();
        service.replace_access_rules(admin, name, *ca_id, &rules)?;
        changed = true;
    }

    let stale: Vec<AdminEntity> = current_entities.difference(&wanted_entities).cloned().collect();
    if !stale.is_empty() {
        service.remove_admin_entities(admin, name, *ca_id, &stale)?;
        changed = true;
    }

    let missing: Vec<AdminEntity> = wanted_entities.difference(&current_entities).cloned().collect();
    if !missing.is_empty() {
        service.add_admin_entities(admin, name, *ca_id, &missing)?;
        changed = true;
    }

    Ok(match result {
        SyncResult::Unchanged if changed => {
            tracing::info!("Updated admin group: {name} (ca {ca_id})");
            SyncResult::Updated
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::catalog::StaticCatalog;
    use crate::authz::policy::parse_kdl_document;
    use crate::authz::service::{AuthzOptions, Collaborators};
    use crate::authz::store::MemoryGroupStore;
    use chrono::Duration;
    use std::sync::Arc;

    fn service() -> AuthorizationService {
        let store = Arc::new(MemoryGroupStore::new());
        let catalog = Arc::new(StaticCatalog::new(vec![5], vec![]));
        AuthorizationService::new(
            Collaborators::in_memory(store, catalog),
            AuthzOptions {
                min_refresh_interval: Duration::zero(),
                ..Default::default()
            },
        )
    }

    const SEED: &str = r#"
group "CA Operators" ca=5 {
    entities {
        - "common_name" "alice"
    }
    rules {
        - "/ca_functionality" "accept" recursive=#true
        - "/ca/5" "accept"
    }
}
"#;

    #[test]
    fn test_sync_is_idempotent() {
        let service = service();
        let admin = AdminIdentity::internal();
        let defs = parse_kdl_document(SEED).unwrap();

        let first = sync_groups(&service, &admin, &defs).unwrap();
        assert_eq!(first.created, 1);

        let second = sync_groups(&service, &admin, &defs).unwrap();
        assert_eq!(
            second,
            SyncReport {
                unchanged: 1,
                ..Default::default()
            }
        );

        let alice = AdminIdentity::certificate(5, "01", "CN=alice");
        assert!(service.is_authorized(&alice, "/ca_functionality/create_certificate").unwrap());
    }

    #[test]
    fn test_sync_updates_drifted_group() {
        let service = service();
        let admin = AdminIdentity::internal();
        sync_groups(&service, &admin, &parse_kdl_document(SEED).unwrap()).unwrap();

        let changed = SEED.replace("\"alice\"", "\"bob\"");
        let report = sync_groups(&service, &admin, &parse_kdl_document(&changed).unwrap()).unwrap();
        assert_eq!(report.updated, 1);

        let group = service.admin_group("CA Operators", 5).unwrap().unwrap();
        assert_eq!(group.entities.len(), 1);
        assert_eq!(group.entities[0].value, "bob");
    }

    #[test]
    fn test_reserved_group_skipped() {
        let service = service();
        let defs = parse_kdl_document(r#"group "DEFAULT" ca=0"#).unwrap();
        let report = sync_groups(&service, &AdminIdentity::internal(), &defs).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(service.admin_group("DEFAULT", 0).unwrap().is_none());
    }

    #[test]
    fn test_sync_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("operators.kdl"), SEED).unwrap();
        let report = sync_groups_from_dir(&service(), &AdminIdentity::internal(), dir.path()).unwrap();
        assert_eq!(report.created, 1);
    }
}
