use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a certificate authority.
pub type CaId = i32;

/// Identifier of an end entity profile.
pub type ProfileId = i32;

// ---------- Well-known resources ----------

pub const ROOT: &str = "/";
pub const SUPERADMIN: &str = "/super_administrator";
pub const ADMINISTRATOR: &str = "/administrator";
pub const PUBLIC_WEB_USER: &str = "/public_web_user";

pub const CA_FUNCTIONALITY: &str = "/ca_functionality";
pub const CA_BASIC_FUNCTIONS: &str = "/ca_functionality/basic_functions";
pub const CA_VIEW_CERTIFICATE: &str = "/ca_functionality/view_certificate";
pub const CA_CREATE_CERTIFICATE: &str = "/ca_functionality/create_certificate";
pub const CA_STORE_CERTIFICATE: &str = "/ca_functionality/store_certificate";
pub const CA_EDIT_CERTIFICATE_PROFILES: &str = "/ca_functionality/edit_certificate_profiles";

pub const RA_FUNCTIONALITY: &str = "/ra_functionality";
pub const RA_VIEW_END_ENTITY: &str = "/ra_functionality/view_end_entity";
pub const RA_CREATE_END_ENTITY: &str = "/ra_functionality/create_end_entity";
pub const RA_EDIT_END_ENTITY: &str = "/ra_functionality/edit_end_entity";
pub const RA_DELETE_END_ENTITY: &str = "/ra_functionality/delete_end_entity";
pub const RA_REVOKE_END_ENTITY: &str = "/ra_functionality/revoke_end_entity";
pub const RA_VIEW_END_ENTITY_HISTORY: &str = "/ra_functionality/view_end_entity_history";

pub const LOG_FUNCTIONALITY: &str = "/log_functionality";
pub const LOG_VIEW: &str = "/log_functionality/view_log";
pub const SYSTEM_FUNCTIONALITY: &str = "/system_functionality";
pub const SYSTEM_EDIT_ADMIN_PRIVILEGES: &str = "/system_functionality/edit_administrator_privileges";
pub const HARDTOKEN_FUNCTIONALITY: &str = "/hardtoken_functionality";

pub const CA_BASE: &str = "/ca";
pub const END_ENTITY_PROFILE_BASE: &str = "/endentityprofilesrules";

/// `/ca/<id>`
pub fn ca_resource(ca_id: CaId) -> String {
    format!("{CA_BASE}/{ca_id}")
}

/// `/endentityprofilesrules/<id>`
pub fn end_entity_profile_resource(profile_id: ProfileId) -> String {
    format!("{END_ENTITY_PROFILE_BASE}/{profile_id}")
}

/// Non-empty path segments of a resource. `/a//b/` yields `a`, `b`.
pub fn segments(resource: &str) -> impl Iterator<Item = &str> {
    resource.split('/').filter(|s| !s.is_empty())
}

/// Canonical form of a resource path: leading slash, no empty or trailing segments.
pub fn normalize(resource: &str) -> String {
    let joined = segments(resource).collect::<Vec<_>>().join("/");
    format!("/{joined}")
}

/// Privilege suffixes appended to `/endentityprofilesrules/<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilePrivilege {
    View,
    Edit,
    Create,
    Delete,
    Revoke,
    History,
    HardToken,
    KeyRecovery,
    Approve,
}

impl ProfilePrivilege {
    pub const ALL: [ProfilePrivilege; 9] = [
        ProfilePrivilege::View,
        ProfilePrivilege::Edit,
        ProfilePrivilege::Create,
        ProfilePrivilege::Delete,
        ProfilePrivilege::Revoke,
        ProfilePrivilege::History,
        ProfilePrivilege::HardToken,
        ProfilePrivilege::KeyRecovery,
        ProfilePrivilege::Approve,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            ProfilePrivilege::View => "/view_end_entity",
            ProfilePrivilege::Edit => "/edit_end_entity",
            ProfilePrivilege::Create => "/create_end_entity",
            ProfilePrivilege::Delete => "/delete_end_entity",
            ProfilePrivilege::Revoke => "/revoke_end_entity",
            ProfilePrivilege::History => "/view_end_entity_history",
            ProfilePrivilege::HardToken => "/view_hardtoken",
            ProfilePrivilege::KeyRecovery => "/keyrecovery",
            ProfilePrivilege::Approve => "/approve_end_entity",
        }
    }
}

impl FromStr for ProfilePrivilege {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "view" => ProfilePrivilege::View,
            "edit" => ProfilePrivilege::Edit,
            "create" => ProfilePrivilege::Create,
            "delete" => ProfilePrivilege::Delete,
            "revoke" => ProfilePrivilege::Revoke,
            "history" => ProfilePrivilege::History,
            "hard_token" => ProfilePrivilege::HardToken,
            "key_recovery" => ProfilePrivilege::KeyRecovery,
            "approve" => ProfilePrivilege::Approve,
            other => return Err(format!("unknown profile privilege `{other}`")),
        })
    }
}

// ---------- Access rules ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEffect {
    Accept,
    Decline,
}

impl FromStr for RuleEffect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(RuleEffect::Accept),
            "decline" => Ok(RuleEffect::Decline),
            other => Err(format!("unknown rule effect `{other}` (expected accept or decline)")),
        }
    }
}

impl fmt::Display for RuleEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleEffect::Accept => f.write_str("accept"),
            RuleEffect::Decline => f.write_str("decline"),
        }
    }
}

/// A rule governing one resource path for a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessRule {
    pub resource: String,
    pub effect: RuleEffect,
    pub recursive: bool,
}

impl AccessRule {
    pub fn new(resource: &str, effect: RuleEffect, recursive: bool) -> Self {
        Self {
            resource: normalize(resource),
            effect,
            recursive,
        }
    }

    pub fn accept(resource: &str, recursive: bool) -> Self {
        Self::new(resource, RuleEffect::Accept, recursive)
    }

    pub fn decline(resource: &str) -> Self {
        Self::new(resource, RuleEffect::Decline, false)
    }

    pub fn is_superadmin(&self) -> bool {
        self.effect == RuleEffect::Accept && self.resource == SUPERADMIN
    }
}

// ---------- Admin entities ----------

/// Callers that are not authenticated with a client certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialAdmin {
    PublicWebUser,
    CaCommandLine,
    RaCommandLine,
    BatchCommandLine,
    InternalUser,
}

impl SpecialAdmin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialAdmin::PublicWebUser => "public_web_user",
            SpecialAdmin::CaCommandLine => "ca_command_line",
            SpecialAdmin::RaCommandLine => "ra_command_line",
            SpecialAdmin::BatchCommandLine => "batch_command_line",
            SpecialAdmin::InternalUser => "internal_user",
        }
    }
}

/// What part of the caller identity an entity compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchWith {
    Country,
    DomainComponent,
    State,
    Locality,
    Organization,
    OrganizationalUnit,
    Title,
    CommonName,
    Uid,
    DnSerialNumber,
    SerialNumber,
    DnEmail,
    FullDn,
    Special(SpecialAdmin),
}

impl MatchWith {
    /// DN attribute keyword for attribute matches, e.g. `CN`.
    pub fn dn_attribute(&self) -> Option<&'static str> {
        Some(match self {
            MatchWith::Country => "C",
            MatchWith::DomainComponent => "DC",
            MatchWith::State => "ST",
            MatchWith::Locality => "L",
            MatchWith::Organization => "O",
            MatchWith::OrganizationalUnit => "OU",
            MatchWith::Title => "T",
            MatchWith::CommonName => "CN",
            MatchWith::Uid => "UID",
            MatchWith::DnSerialNumber => "SN",
            MatchWith::DnEmail => "E",
            MatchWith::SerialNumber | MatchWith::FullDn | MatchWith::Special(_) => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchWith::Country => "country",
            MatchWith::DomainComponent => "domain_component",
            MatchWith::State => "state",
            MatchWith::Locality => "locality",
            MatchWith::Organization => "organization",
            MatchWith::OrganizationalUnit => "organizational_unit",
            MatchWith::Title => "title",
            MatchWith::CommonName => "common_name",
            MatchWith::Uid => "uid",
            MatchWith::DnSerialNumber => "dn_serial_number",
            MatchWith::SerialNumber => "serial_number",
            MatchWith::DnEmail => "dn_email",
            MatchWith::FullDn => "full_dn",
            MatchWith::Special(special) => special.as_str(),
        }
    }
}

impl FromStr for MatchWith {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "country" => MatchWith::Country,
            "domain_component" => MatchWith::DomainComponent,
            "state" => MatchWith::State,
            "locality" => MatchWith::Locality,
            "organization" => MatchWith::Organization,
            "organizational_unit" => MatchWith::OrganizationalUnit,
            "title" => MatchWith::Title,
            "common_name" => MatchWith::CommonName,
            "uid" => MatchWith::Uid,
            "dn_serial_number" => MatchWith::DnSerialNumber,
            "serial_number" => MatchWith::SerialNumber,
            "dn_email" => MatchWith::DnEmail,
            "full_dn" => MatchWith::FullDn,
            "public_web_user" => MatchWith::Special(SpecialAdmin::PublicWebUser),
            "ca_command_line" => MatchWith::Special(SpecialAdmin::CaCommandLine),
            "ra_command_line" => MatchWith::Special(SpecialAdmin::RaCommandLine),
            "batch_command_line" => MatchWith::Special(SpecialAdmin::BatchCommandLine),
            "internal_user" => MatchWith::Special(SpecialAdmin::InternalUser),
            other => return Err(format!("unknown match attribute `{other}`")),
        })
    }
}

impl fmt::Display for MatchWith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    EqualCase,
    EqualCaseInsensitive,
    NotEqualCase,
    NotEqualCaseInsensitive,
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "equal_case" => Comparator::EqualCase,
            "equal_case_insensitive" => Comparator::EqualCaseInsensitive,
            "not_equal_case" => Comparator::NotEqualCase,
            "not_equal_case_insensitive" => Comparator::NotEqualCaseInsensitive,
            other => return Err(format!("unknown comparator `{other}`")),
        })
    }
}

/// Descriptor matching a real or synthetic administrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdminEntity {
    pub match_with: MatchWith,
    pub comparator: Comparator,
    pub value: String,
    /// Issuing CA the caller certificate must come from. Ignored for special admins.
    pub ca_id: CaId,
}

impl AdminEntity {
    pub fn new(match_with: MatchWith, comparator: Comparator, value: &str, ca_id: CaId) -> Self {
        Self {
            match_with,
            comparator,
            value: value.to_string(),
            ca_id,
        }
    }

    pub fn special(special: SpecialAdmin) -> Self {
        Self {
            match_with: MatchWith::Special(special),
            comparator: Comparator::EqualCase,
            value: String::new(),
            ca_id: 0,
        }
    }
}

// ---------- Groups ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named, CA-scoped bundle of admin entities and access rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminGroup {
    pub id: GroupId,
    pub name: String,
    pub ca_id: CaId,
    pub entities: Vec<AdminEntity>,
    pub rules: Vec<AccessRule>,
}

impl AdminGroup {
    pub fn is_superadmin_group(&self) -> bool {
        self.rules.iter().any(AccessRule::is_superadmin)
    }
}

/// `(name, ca_id)` pair identifying a group to operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupName {
    pub name: String,
    pub ca_id: CaId,
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ca {})", self.name, self.ca_id)
    }
}

/// A group as declared in a seed file, before it has a store id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDefinition {
    pub name: String,
    pub ca_id: CaId,
    pub entities: Vec<AdminEntity>,
    pub rules: Vec<AccessRule>,
}
