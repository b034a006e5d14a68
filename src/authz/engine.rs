use std::collections::BTreeSet;

use crate::authz::catalog::PkiCatalog;
use crate::authz::errors::AuthzError;
use crate::authz::matcher::AdminIdentity;
use crate::authz::trust::CertificateTrust;
use crate::authz::tree::AccessTree;
use crate::authz::types::*;

/// Check if `admin` may access `resource`: OR of every group the admin is a member of.
pub fn check(tree: &AccessTree, admin: &AdminIdentity, resource: &str) -> bool {
    tree.candidate_groups(admin)
        .any(|group| group.grants(resource))
}

/// Check whether the group itself grants `resource`. Unknown groups are denied.
pub fn check_group(tree: &AccessTree, group_id: GroupId, resource: &str) -> bool {
    tree.group(group_id)
        .map(|group| group.grants(resource))
        .unwrap_or(false)
}

/// Whether any group the admin belongs to carries the superadministrator rule.
pub fn is_superadmin(tree: &AccessTree, admin: &AdminIdentity) -> bool {
    tree.candidate_groups(admin).any(|group| group.is_superadmin())
}

/// Every known CA id the admin may access through `/ca/<id>`.
pub fn authorized_ca_ids(
    tree: &AccessTree,
    admin: &AdminIdentity,
    catalog: &dyn PkiCatalog,
) -> BTreeSet<CaId> {
    catalog
        .ca_ids()
        .into_iter()
        .filter(|&ca_id| check(tree, admin, &ca_resource(ca_id)))
        .collect()
}

/// Every known end entity profile the admin holds `privilege` on.
pub fn authorized_end_entity_profile_ids(
    tree: &AccessTree,
    admin: &AdminIdentity,
    catalog: &dyn PkiCatalog,
    privilege: ProfilePrivilege,
) -> BTreeSet<ProfileId> {
    catalog
        .end_entity_profile_ids()
        .into_iter()
        .filter(|&profile_id| {
            let resource = format!(
                "{}{}",
                end_entity_profile_resource(profile_id),
                privilege.suffix()
            );
            check(tree, admin, &resource)
        })
        .collect()
}

const STANDARD_RULES: &[&str] = &[
    ADMINISTRATOR,
    CA_FUNCTIONALITY,
    CA_BASIC_FUNCTIONS,
    CA_VIEW_CERTIFICATE,
    CA_CREATE_CERTIFICATE,
    CA_STORE_CERTIFICATE,
    CA_EDIT_CERTIFICATE_PROFILES,
    RA_FUNCTIONALITY,
    RA_VIEW_END_ENTITY,
    RA_CREATE_END_ENTITY,
    RA_EDIT_END_ENTITY,
    RA_DELETE_END_ENTITY,
    RA_REVOKE_END_ENTITY,
    RA_VIEW_END_ENTITY_HISTORY,
    LOG_FUNCTIONALITY,
    LOG_VIEW,
    SYSTEM_FUNCTIONALITY,
    SYSTEM_EDIT_ADMIN_PRIVILEGES,
    HARDTOKEN_FUNCTIONALITY,
];

/// Every rule an administrator could be granted, in display order.
fn candidate_rules(catalog: &dyn PkiCatalog, custom_rules: &[String]) -> Vec<String> {
    let mut rules: Vec<String> = vec![SUPERADMIN.to_string()];
    rules.extend(STANDARD_RULES.iter().map(|r| r.to_string()));

    rules.push(CA_BASE.to_string());
    rules.extend(catalog.ca_ids().into_iter().map(ca_resource));

    rules.push(END_ENTITY_PROFILE_BASE.to_string());
    for profile_id in catalog.end_entity_profile_ids() {
        let base = end_entity_profile_resource(profile_id);
        rules.push(base.clone());
        rules.extend(
            ProfilePrivilege::ALL
                .iter()
                .map(|privilege| format!("{base}{}", privilege.suffix())),
        );
    }

    rules.extend(custom_rules.iter().map(|r| normalize(r)));

    let mut seen = BTreeSet::new();
    rules.retain(|rule| seen.insert(rule.clone()));
    rules
}

/// Rules `admin` may hand out to other groups: everything for a superadministrator,
/// otherwise the candidate rules the admin itself is granted.
pub fn available_access_rules(
    tree: &AccessTree,
    admin: &AdminIdentity,
    catalog: &dyn PkiCatalog,
    custom_rules: &[String],
) -> Vec<String> {
    let candidates = candidate_rules(catalog, custom_rules);
    if is_superadmin(tree, admin) {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|rule| rule != SUPERADMIN && check(tree, admin, rule))
        .collect()
}

/// Validate a client certificate through the trust collaborator and derive the
/// identity used for decisions.
pub fn authenticate(
    trust: &dyn CertificateTrust,
    certificate: &[u8],
) -> Result<AdminIdentity, AuthzError> {
    trust
        .validate(certificate)
        .map(AdminIdentity::Certificate)
        .map_err(|e| AuthzError::AuthenticationFailed(e.to_string()))
}
