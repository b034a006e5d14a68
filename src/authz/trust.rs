use thiserror::Error;

use crate::authz::matcher::CertificateIdentity;

/// Reasons a client certificate is not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    #[error("certificate is not issued by a trusted CA: {0}")]
    Untrusted(String),
    #[error("malformed certificate: {0}")]
    Malformed(String),
    #[error("certificate {0} is revoked")]
    Revoked(String),
    #[error("certificate is expired or not yet valid: {0}")]
    Expired(String),
}

/// Chain validation and revocation checking for administrator certificates.
pub trait CertificateTrust: Send + Sync {
    fn validate(&self, certificate: &[u8]) -> Result<CertificateIdentity, TrustError>;
}

/// Trust source that accepts nothing. Used when no certificate authentication is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

impl CertificateTrust for RejectAll {
    fn validate(&self, _certificate: &[u8]) -> Result<CertificateIdentity, TrustError> {
        Err(TrustError::Untrusted("no trust anchors configured".into()))
    }
}
