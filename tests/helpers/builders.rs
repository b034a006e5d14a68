use pkiguard::authz::types::{AccessRule, AdminEntity, AdminGroup, CaId, Comparator, MatchWith, SpecialAdmin};
use pkiguard::authz::{AdminIdentity, AuthorizationService};

/// Builder for creating test admin groups through the service
pub struct GroupBuilder {
    name: String,
    ca_id: CaId,
    entities: Vec<AdminEntity>,
    rules: Vec<AccessRule>,
}

impl GroupBuilder {
    pub fn new(name: &str, ca_id: CaId) -> Self {
        Self {
            name: name.to_string(),
            ca_id,
            entities: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Case-insensitive common name match on the group's CA
    pub fn with_common_name(mut self, common_name: &str) -> Self {
        self.entities.push(AdminEntity::new(
            MatchWith::CommonName,
            Comparator::EqualCaseInsensitive,
            common_name,
            self.ca_id,
        ));
        self
    }

    pub fn with_special(mut self, special: SpecialAdmin) -> Self {
        self.entities.push(AdminEntity::special(special));
        self
    }

    pub fn with_entity(mut self, entity: AdminEntity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn accept(mut self, resource: &str, recursive: bool) -> Self {
        self.rules.push(AccessRule::accept(resource, recursive));
        self
    }

    pub fn decline(mut self, resource: &str) -> Self {
        self.rules.push(AccessRule::decline(resource));
        self
    }

    pub fn create(self, service: &AuthorizationService) -> AdminGroup {
        let admin = AdminIdentity::internal();
        service
            .add_admin_group(&admin, &self.name, self.ca_id)
            .expect("Failed to create test group");
        if !self.entities.is_empty() {
            service
                .add_admin_entities(&admin, &self.name, self.ca_id, &self.entities)
                .expect("Failed to add entities");
        }
        if !self.rules.is_empty() {
            service
                .add_access_rules(&admin, &self.name, self.ca_id, &self.rules)
                .expect("Failed to add rules");
        }
        service
            .admin_group(&self.name, self.ca_id)
            .expect("Failed to read group back")
            .expect("Group not found after creation")
    }
}
