use pkiguard::authz::trust::{CertificateTrust, TrustError};
use pkiguard::authz::CertificateIdentity;
use std::collections::HashMap;

/// Trust source keyed by raw certificate bytes. Unknown bytes are untrusted.
#[derive(Default)]
pub struct MockTrust {
    known: HashMap<Vec<u8>, Result<CertificateIdentity, TrustError>>,
}

impl MockTrust {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_certificate(mut self, der: &[u8], ca_id: i32, serial: &str, subject_dn: &str) -> Self {
        self.known.insert(
            der.to_vec(),
            Ok(CertificateIdentity {
                issuer_ca_id: ca_id,
                serial_number: serial.to_string(),
                subject_dn: subject_dn.to_string(),
            }),
        );
        self
    }

    pub fn with_revoked(mut self, der: &[u8], serial: &str) -> Self {
        self.known
            .insert(der.to_vec(), Err(TrustError::Revoked(serial.to_string())));
        self
    }
}

impl CertificateTrust for MockTrust {
    fn validate(&self, certificate: &[u8]) -> Result<CertificateIdentity, TrustError> {
        self.known
            .get(certificate)
            .cloned()
            .unwrap_or_else(|| Err(TrustError::Untrusted("unknown certificate".into())))
    }
}
