use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use vpn_conf::scenario::{Role, Scenario};
use vpn_conf::secrets::UserKind;

#[derive(Parser, Debug)]
#[command(name = "vpn-conf")]
#[command(about = "Manage strongSwan IPsec connections, secrets and firewall rules")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Settings TOML file. Defaults to the built-in settings.
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,
    /// ipsec.conf to read and edit, overriding the settings file.
    #[arg(long, global = true)]
    pub conf: Option<PathBuf>,
    /// ipsec.secrets to read and edit, overriding the settings file.
    #[arg(long, global = true)]
    pub secrets: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// List managed connections.
    Show(ShowArgs),
    /// Show the full record of one connection as it will be written.
    Inspect(InspectArgs),
    /// Check the configuration for problems before applying it.
    Verify(VerifyArgs),
    /// Print the operator summary.
    Summary,
    /// Print the firewall rules (or script) derived from the connections.
    Firewall(FirewallArgs),
    /// Create a connection.
    New(NewArgs),
    /// Delete a connection and its client secret.
    Delete(NameArgs),
    /// Set a connection parameter.
    Set(SetArgs),
    /// Remove a connection parameter.
    Unset(UnsetArgs),
    /// Move a connection to another scenario.
    Scenario(ScenarioArgs),
    /// Turn a connection into a gateway or a client.
    Role(RoleArgs),
    /// Set the gateway pre-shared key.
    GatewayPsk(GatewayPskArgs),
    /// Set the gateway certificate and key.
    GatewayCert(GatewayCertArgs),
    /// Set the pre-shared key used towards a remote gateway.
    ClientPsk(ClientPskArgs),
    /// Set the certificate and key used towards a remote gateway.
    ClientCert(ClientCertArgs),
    /// Manage XAuth and EAP users.
    User(UserArgs),
    /// Write configuration, secrets and firewall script below a root directory.
    Apply(ApplyArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum RoleArg {
    Gateway,
    Client,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Gateway => Role::Gateway,
            RoleArg::Client => Role::Client,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum ScenarioArg {
    #[value(name = "gw_psk")]
    GwPsk,
    #[value(name = "gw_cert")]
    GwCert,
    #[value(name = "gw_mobile")]
    GwMobile,
    #[value(name = "gw_win")]
    GwWin,
    #[value(name = "client_psk")]
    ClientPsk,
    #[value(name = "client_cert")]
    ClientCert,
}

impl From<ScenarioArg> for Scenario {
    fn from(value: ScenarioArg) -> Self {
        match value {
            ScenarioArg::GwPsk => Scenario::GwPsk,
            ScenarioArg::GwCert => Scenario::GwCert,
            ScenarioArg::GwMobile => Scenario::GwMobile,
            ScenarioArg::GwWin => Scenario::GwWin,
            ScenarioArg::ClientPsk => Scenario::ClientPsk,
            ScenarioArg::ClientCert => Scenario::ClientCert,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum UserKindArg {
    Xauth,
    Eap,
}

impl From<UserKindArg> for UserKind {
    fn from(value: UserKindArg) -> Self {
        match value {
            UserKindArg::Xauth => UserKind::Xauth,
            UserKindArg::Eap => UserKind::Eap,
        }
    }
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Connection name.
    pub name: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Fail on warnings as well as errors.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Debug)]
pub struct FirewallArgs {
    /// Clamp TCP MSS of forwarded traffic.
    #[arg(long)]
    pub reduce_mss: bool,
    /// Print the complete custom-rules script instead of bare rules.
    #[arg(long)]
    pub script: bool,
}

#[derive(Parser, Debug)]
pub struct NewArgs {
    /// Connection name.
    pub name: String,
    #[arg(long, value_enum, default_value_t = RoleArg::Client)]
    pub role: RoleArg,
}

#[derive(Parser, Debug)]
pub struct NameArgs {
    /// Connection name.
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct SetArgs {
    /// Connection name.
    pub name: String,
    /// strongSwan parameter, for example `right` or `leftsubnet`.
    pub key: String,
    pub value: String,
}

#[derive(Parser, Debug)]
pub struct UnsetArgs {
    pub name: String,
    pub key: String,
}

#[derive(Parser, Debug)]
pub struct ScenarioArgs {
    pub name: String,
    #[arg(value_enum)]
    pub scenario: ScenarioArg,
}

#[derive(Parser, Debug)]
pub struct RoleArgs {
    pub name: String,
    #[arg(value_enum)]
    pub role: RoleArg,
}

#[derive(Parser, Debug)]
pub struct GatewayPskArgs {
    pub psk: String,
}

#[derive(Parser, Debug)]
pub struct GatewayCertArgs {
    /// Certificate file path.
    pub cert: PathBuf,
    /// Private key file path.
    pub key: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ClientPskArgs {
    /// Remote gateway identity (the connection's `right`).
    pub gateway: String,
    pub psk: String,
}

#[derive(Parser, Debug)]
pub struct ClientCertArgs {
    /// Remote gateway identity (the connection's `right`).
    pub gateway: String,
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Parser, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub action: UserAction,
}

#[derive(clap::Subcommand, Debug)]
pub enum UserAction {
    /// Add a user.
    Add {
        #[arg(value_enum)]
        kind: UserKindArg,
        username: String,
        password: String,
    },
    /// Delete a user.
    Del {
        #[arg(value_enum)]
        kind: UserKindArg,
        username: String,
    },
}

#[derive(Parser, Debug)]
pub struct ApplyArgs {
    /// Directory the managed files are written below.
    #[arg(long)]
    pub root: PathBuf,
    /// Permit writing into the live system when root is `/`.
    #[arg(long)]
    pub allow_system_root: bool,
    /// Leave the IPsec daemon disabled regardless of settings.
    #[arg(long)]
    pub no_daemon: bool,
    /// Clamp TCP MSS of forwarded traffic regardless of settings.
    #[arg(long, conflicts_with = "no_reduce_mss")]
    pub reduce_mss: bool,
    /// Stop clamping TCP MSS, even when the last apply did.
    #[arg(long)]
    pub no_reduce_mss: bool,
    /// Print the plan without writing anything.
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
