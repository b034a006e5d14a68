use miette::Result;
use std::sync::Arc;

use crate::authz::catalog::StaticCatalog;
use crate::authz::store::MemoryGroupStore;
use crate::authz::{AdminIdentity, AuthorizationService, Collaborators};
use crate::group_sync;
use crate::settings::Settings;

/// In-memory service with the mandatory groups established for every catalog CA,
/// then the configured seed groups synced on top.
///
/// Bootstrap runs first: the temporary superadmin group is only created on an
/// empty store.
pub fn build_service(settings: &Settings) -> Result<AuthorizationService> {
    let store = Arc::new(MemoryGroupStore::new());
    let catalog = Arc::new(StaticCatalog::new(
        settings.catalog.ca_ids.clone(),
        settings.catalog.end_entity_profile_ids.clone(),
    ));
    let service = AuthorizationService::new(
        Collaborators::in_memory(store, catalog),
        settings.authz.options(),
    );

    let system = AdminIdentity::internal();
    for ca_id in &settings.catalog.ca_ids {
        service.initialize(&system, *ca_id)?;
    }
    if let Some(dir) = &settings.seed.groups_dir {
        let report = group_sync::sync_groups_from_dir(&service, &system, dir)?;
        tracing::info!(?report, "Seed groups synced");
    }

    Ok(service)
}
