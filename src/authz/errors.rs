use miette::Diagnostic;
use thiserror::Error;

use crate::authz::types::{CaId, GroupId};

/// Failures reported by a `GroupStore` or `VersionCounterStore`.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("Group store unavailable: {0}")]
    #[diagnostic(
        code(pkiguard::store::unavailable),
        help("Decisions keep using the last compiled access tree until the store is reachable")
    )]
    Unavailable(String),

    #[error("Admin group `{name}` already exists for CA {ca_id}")]
    #[diagnostic(code(pkiguard::store::conflict))]
    Conflict { name: String, ca_id: CaId },

    #[error("Admin group {0} not found")]
    #[diagnostic(code(pkiguard::store::not_found))]
    NotFound(GroupId),
}

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Administrator `{admin}` is not authorized to resource `{resource}`")]
    #[diagnostic(code(pkiguard::authz::denied))]
    AuthorizationDenied { admin: String, resource: String },

    #[error("Authentication failed: {0}")]
    #[diagnostic(
        code(pkiguard::authz::authentication_failed),
        help("The client certificate must chain to a trusted CA and must not be revoked")
    )]
    AuthenticationFailed(String),

    #[error("Admin group `{name}` already exists for CA {ca_id}")]
    #[diagnostic(
        code(pkiguard::authz::group_exists),
        help("Group names must be unique per CA; choose another name")
    )]
    AdminGroupExists { name: String, ca_id: CaId },

    #[error("Admin group name `{name}` is reserved for CA {ca_id}")]
    #[diagnostic(
        code(pkiguard::authz::reserved_name),
        help("DEFAULT and Public Web Users are managed by bootstrap and cannot be taken by renaming")
    )]
    ReservedGroupName { name: String, ca_id: CaId },

    #[error("Admin group `{name}` does not exist for CA {ca_id}")]
    #[diagnostic(code(pkiguard::authz::group_not_found))]
    AdminGroupNotFound { name: String, ca_id: CaId },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to load seed file `{path}`")]
    #[diagnostic(
        code(pkiguard::authz::seed_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    SeedLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid seed: {0}")]
    #[diagnostic(
        code(pkiguard::authz::invalid_seed),
        help("Seed files contain `group \"<name>\" ca=<id> {{ entities {{ ... }} rules {{ ... }} }}` nodes")
    )]
    InvalidSeed(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(pkiguard::authz::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(pkiguard::authz::io))]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Denials and authentication failures are final answers, not faults.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthzError::AuthorizationDenied { .. } | AuthzError::AuthenticationFailed(_)
        )
    }
}
