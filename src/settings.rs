use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::authz::service::AuthzOptions;
use crate::authz::types::{CaId, ProfileId};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub authz: Authz,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub seed: Seed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authz {
    /// Minimum seconds between two rebuilds of the compiled access tree
    pub min_refresh_interval_secs: i64,
    /// Common name matched by the temporary superadmin group created on an empty store
    pub superadmin_common_name: String,
    /// CA id owning the reserved DEFAULT group
    pub internal_ca_id: CaId,
    /// Extra resources offered when listing available access rules
    #[serde(default)]
    pub custom_access_rules: Vec<String>,
}

/// CA and end entity profile ids known to this installation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Catalog {
    #[serde(default)]
    pub ca_ids: Vec<CaId>,
    #[serde(default)]
    pub end_entity_profile_ids: Vec<ProfileId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Seed {
    /// Directory of `.kdl` admin group definitions synced at startup
    pub groups_dir: Option<PathBuf>,
}

impl Default for Authz {
    fn default() -> Self {
        Self {
            min_refresh_interval_secs: 60,
            superadmin_common_name: "SuperAdmin".to_string(),
            internal_ca_id: 0,
            custom_access_rules: Vec::new(),
        }
    }
}

impl Authz {
    pub fn options(&self) -> AuthzOptions {
        AuthzOptions {
            min_refresh_interval: chrono::Duration::seconds(self.min_refresh_interval_secs),
            superadmin_common_name: self.superadmin_common_name.clone(),
            internal_ca_id: self.internal_ca_id,
            custom_access_rules: self.custom_access_rules.clone(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let defaults = Authz::default();
        let mut builder = config::Config::builder()
            .set_default(
                "authz.min_refresh_interval_secs",
                defaults.min_refresh_interval_secs,
            )
            .into_diagnostic()?
            .set_default("authz.superadmin_common_name", defaults.superadmin_common_name)
            .into_diagnostic()?
            .set_default("authz.internal_ca_id", defaults.internal_ca_id)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PKIGUARD__AUTHZ__MIN_REFRESH_INTERVAL_SECS=5, etc.
        builder = builder.add_source(config::Environment::with_prefix("PKIGUARD").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        if s.authz.min_refresh_interval_secs < 0 {
            return Err(miette::miette!(
                "authz.min_refresh_interval_secs must not be negative (got {})",
                s.authz.min_refresh_interval_secs
            ));
        }

        // Normalize seed dir to be relative to current dir
        if let Some(dir) = &s.seed.groups_dir {
            if dir.is_relative() {
                s.seed.groups_dir = Some(std::env::current_dir().into_diagnostic()?.join(dir));
            }
        }

        Ok(s)
    }
}
