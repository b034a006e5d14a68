use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use pkiguard::authz::types::{ProfilePrivilege, SpecialAdmin};
use pkiguard::authz::AdminIdentity;
use pkiguard::settings::Settings;
use pkiguard::startup;

#[derive(Parser, Debug)]
#[command(
    name = "pkiguard",
    version,
    about = "Administrator authorization for certificate authorities"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(flatten)]
    identity: IdentityArgs,

    #[command(subcommand)]
    command: Command,
}

/// The administrator a question is asked for
#[derive(Args, Debug)]
struct IdentityArgs {
    /// Synthetic caller instead of a certificate
    #[arg(long, value_enum, global = true, conflicts_with = "subject_dn")]
    special: Option<SpecialArg>,

    /// Subject DN of the client certificate, e.g. "CN=alice,O=Example"
    #[arg(long, global = true)]
    subject_dn: Option<String>,

    /// CA id that issued the client certificate
    #[arg(long, global = true)]
    issuer_ca_id: Option<i32>,

    /// Certificate serial number in hex
    #[arg(long, global = true, default_value = "0")]
    serial: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SpecialArg {
    Batch,
    CaCli,
    Ra,
    Internal,
    PublicWeb,
}

impl From<SpecialArg> for SpecialAdmin {
    fn from(arg: SpecialArg) -> Self {
        match arg {
            SpecialArg::Batch => SpecialAdmin::BatchCommandLine,
            SpecialArg::CaCli => SpecialAdmin::CaCommandLine,
            SpecialArg::Ra => SpecialAdmin::RaCommandLine,
            SpecialArg::Internal => SpecialAdmin::InternalUser,
            SpecialArg::PublicWeb => SpecialAdmin::PublicWebUser,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide whether the admin may access a resource
    Check {
        #[arg(long)]
        resource: String,
    },
    /// CA ids the admin may use
    CaIds,
    /// End entity profile ids the admin holds a privilege on
    ProfileIds {
        #[arg(long, default_value = "view")]
        privilege: String,
    },
    /// Admin groups the admin may administer
    Groups,
    /// Access rules the admin may hand out
    Rules,
}

impl IdentityArgs {
    fn admin(&self) -> Result<AdminIdentity> {
        if let Some(special) = self.special {
            return Ok(AdminIdentity::Special(special.into()));
        }
        match (&self.subject_dn, self.issuer_ca_id) {
            (Some(dn), Some(ca_id)) => Ok(AdminIdentity::certificate(ca_id, &self.serial, dn)),
            _ => Err(miette::miette!(
                help = "Pass --special <kind>, or --subject-dn together with --issuer-ca-id",
                "No administrator identity given"
            )),
        }
    }
}

fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let admin = cli.identity.admin()?;
    let service = startup::build_service(&settings)?;

    let output = match cli.command {
        Command::Check { resource } => {
            let granted = match service.is_authorized(&admin, &resource) {
                Ok(granted) => granted,
                Err(e) if e.is_rejection() => false,
                Err(e) => return Err(e.into()),
            };
            json!({ "admin": admin.to_string(), "resource": resource, "granted": granted })
        }
        Command::CaIds => json!(service.authorized_ca_ids(&admin)),
        Command::ProfileIds { privilege } => {
            let privilege: ProfilePrivilege = privilege
                .parse()
                .map_err(|e: String| miette::miette!("{e}"))?;
            json!(service.authorized_end_entity_profile_ids(&admin, privilege))
        }
        Command::Groups => json!(service.authorized_admin_group_names(&admin)?),
        Command::Rules => json!(service.authorized_available_access_rules(&admin)),
    };

    println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
    Ok(())
}
