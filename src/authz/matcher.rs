use serde::{Deserialize, Serialize};
use std::fmt;

use crate::authz::types::{AdminEntity, CaId, Comparator, MatchWith, SpecialAdmin};

/// Identity taken from a validated client certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateIdentity {
    pub issuer_ca_id: CaId,
    /// Certificate serial number in hex.
    pub serial_number: String,
    /// Subject DN, e.g. `CN=alice,O=Example,C=SE`.
    pub subject_dn: String,
}

/// The caller an authorization decision is made for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdminIdentity {
    Certificate(CertificateIdentity),
    Special(SpecialAdmin),
}

impl AdminIdentity {
    pub fn certificate(issuer_ca_id: CaId, serial_number: &str, subject_dn: &str) -> Self {
        AdminIdentity::Certificate(CertificateIdentity {
            issuer_ca_id,
            serial_number: serial_number.to_string(),
            subject_dn: subject_dn.to_string(),
        })
    }

    pub fn internal() -> Self {
        AdminIdentity::Special(SpecialAdmin::InternalUser)
    }

    /// CA the identity belongs to, for audit records.
    pub fn ca_id(&self) -> Option<CaId> {
        match self {
            AdminIdentity::Certificate(cert) => Some(cert.issuer_ca_id),
            AdminIdentity::Special(_) => None,
        }
    }
}

impl fmt::Display for AdminIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminIdentity::Certificate(cert) => write!(
                f,
                "{} (serial {}, ca {})",
                cert.subject_dn, cert.serial_number, cert.issuer_ca_id
            ),
            AdminIdentity::Special(special) => f.write_str(special.as_str()),
        }
    }
}

impl AdminEntity {
    /// Whether this descriptor matches the given caller.
    pub fn matches(&self, identity: &AdminIdentity) -> bool {
        match (&self.match_with, identity) {
            (MatchWith::Special(wanted), AdminIdentity::Special(actual)) => wanted == actual,
            (MatchWith::Special(_), AdminIdentity::Certificate(_)) => false,
            (_, AdminIdentity::Special(_)) => false,
            (match_with, AdminIdentity::Certificate(cert)) => {
                if cert.issuer_ca_id != self.ca_id {
                    return false;
                }
                let (values, wanted) = match match_with {
                    MatchWith::SerialNumber => (
                        vec![normalize_serial(&cert.serial_number)],
                        normalize_serial(&self.value),
                    ),
                    MatchWith::FullDn => {
                        (vec![normalize_dn(&cert.subject_dn)], normalize_dn(&self.value))
                    }
                    other => {
                        let Some(attribute) = other.dn_attribute() else {
                            return false;
                        };
                        (dn_values(&cert.subject_dn, attribute), self.value.clone())
                    }
                };
                compare_any(self.comparator, &values, &wanted)
            }
        }
    }
}

/// Positive comparators match when any value compares equal. Negated ones
/// require at least one value and none equal.
fn compare_any(comparator: Comparator, values: &[String], wanted: &str) -> bool {
    match comparator {
        Comparator::EqualCase => values.iter().any(|v| v == wanted),
        Comparator::EqualCaseInsensitive => values.iter().any(|v| eq_ignore_case(v, wanted)),
        Comparator::NotEqualCase => !values.is_empty() && values.iter().all(|v| v != wanted),
        Comparator::NotEqualCaseInsensitive => {
            !values.is_empty() && values.iter().all(|v| !eq_ignore_case(v, wanted))
        }
    }
}

/// Unicode-aware case-insensitive equality; DN values are often not ASCII.
fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

fn normalize_serial(serial: &str) -> String {
    let trimmed = serial.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let stripped = hex.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_ascii_uppercase()
    }
}

/// Split a DN into `(ATTRIBUTE, value)` pairs. Handles `\,` escapes, quoted
/// values such as `CN="Doe, John"` and multi-valued RDNs joined with `+`.
pub fn parse_dn(dn: &str) -> Vec<(String, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    let mut quoted = false;

    for c in dn.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            ',' | '+' if !quoted => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            let key = canonical_attribute(key.trim());
            let value = value.trim();
            if key.is_empty() {
                return None;
            }
            Some((key, value.to_string()))
        })
        .collect()
}

fn canonical_attribute(key: &str) -> String {
    let upper = key.to_ascii_uppercase();
    match upper.as_str() {
        "EMAILADDRESS" | "EMAIL" => "E".to_string(),
        "SERIALNUMBER" => "SN".to_string(),
        "TITLE" => "T".to_string(),
        "S" => "ST".to_string(),
        _ => upper,
    }
}

fn dn_values(dn: &str, attribute: &str) -> Vec<String> {
    parse_dn(dn)
        .into_iter()
        .filter(|(key, _)| key == attribute)
        .map(|(_, value)| value)
        .collect()
}

/// Canonical DN text used for full-DN comparison.
pub fn normalize_dn(dn: &str) -> String {
    parse_dn(dn)
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}
