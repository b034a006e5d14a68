use crate::authz::types::{CaId, ProfileId};

/// Source of the CA ids and end entity profile ids known to the system.
pub trait PkiCatalog: Send + Sync {
    fn ca_ids(&self) -> Vec<CaId>;
    fn end_entity_profile_ids(&self) -> Vec<ProfileId>;
}

/// Catalog with a fixed, configured content.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    ca_ids: Vec<CaId>,
    profile_ids: Vec<ProfileId>,
}

impl StaticCatalog {
    pub fn new(ca_ids: Vec<CaId>, profile_ids: Vec<ProfileId>) -> Self {
        Self {
            ca_ids,
            profile_ids,
        }
    }
}

impl PkiCatalog for StaticCatalog {
    fn ca_ids(&self) -> Vec<CaId> {
        self.ca_ids.clone()
    }

    fn end_entity_profile_ids(&self) -> Vec<ProfileId> {
        self.profile_ids.clone()
    }
}
