use serde::Serialize;
use std::fmt;

use crate::authz::types::CaId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    AuthorizedToResource,
    NotAuthorizedToResource,
    AuthenticationFailed,
    EditedAdministratorPrivileges,
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditKind::AuthorizedToResource => "authorized_to_resource",
            AuditKind::NotAuthorizedToResource => "not_authorized_to_resource",
            AuditKind::AuthenticationFailed => "authentication_failed",
            AuditKind::EditedAdministratorPrivileges => "edited_administrator_privileges",
        };
        f.write_str(s)
    }
}

/// One observable event: who, against which CA, what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub admin: String,
    pub ca_id: Option<CaId>,
    pub kind: AuditKind,
    pub outcome: Outcome,
    pub message: String,
}

/// Receives audit events. Never influences decisions.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events as structured `tracing` events on the `pkiguard::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, event: AuditEvent) {
        match event.outcome {
            Outcome::Success => tracing::info!(
                target: "pkiguard::audit",
                admin = %event.admin,
                ca_id = ?event.ca_id,
                kind = %event.kind,
                "{}",
                event.message
            ),
            Outcome::Failure => tracing::warn!(
                target: "pkiguard::audit",
                admin = %event.admin,
                ca_id = ?event.ca_id,
                kind = %event.kind,
                "{}",
                event.message
            ),
        }
    }
}
