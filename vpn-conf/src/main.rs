use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod apply_cmd;
mod cli;
mod edit_cmd;
mod path_guard;
mod session;
mod show_cmd;
mod verify_cmd;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let global = &cli.global;
    match cli.command {
        Command::Show(args) => show_cmd::run_show(global, args),
        Command::Inspect(args) => show_cmd::run_inspect(global, args),
        Command::Verify(args) => verify_cmd::run_verify(global, args),
        Command::Summary => show_cmd::run_summary(global),
        Command::Firewall(args) => show_cmd::run_firewall(global, args),
        Command::New(args) => edit_cmd::run_new(global, args),
        Command::Delete(args) => edit_cmd::run_delete(global, args),
        Command::Set(args) => edit_cmd::run_set(global, args),
        Command::Unset(args) => edit_cmd::run_unset(global, args),
        Command::Scenario(args) => edit_cmd::run_scenario(global, args),
        Command::Role(args) => edit_cmd::run_role(global, args),
        Command::GatewayPsk(args) => edit_cmd::run_gateway_psk(global, args),
        Command::GatewayCert(args) => edit_cmd::run_gateway_cert(global, args),
        Command::ClientPsk(args) => edit_cmd::run_client_psk(global, args),
        Command::ClientCert(args) => edit_cmd::run_client_cert(global, args),
        Command::User(args) => edit_cmd::run_user(global, args),
        Command::Apply(args) => apply_cmd::run_apply(global, args),
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the `-v` level.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
