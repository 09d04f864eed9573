use anyhow::{bail, Result};
use vpn_conf::scenario::Scenario;
use vpn_conf::secrets::UserKind;

use crate::cli::{
    ClientCertArgs, ClientPskArgs, GatewayCertArgs, GatewayPskArgs, GlobalArgs, NameArgs, NewArgs,
    RoleArgs, ScenarioArgs, SetArgs, UnsetArgs, UserAction, UserArgs,
};
use crate::session::Session;

pub fn run_new(global: &GlobalArgs, args: NewArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    session.store.create(&args.name, args.role.into())?;
    let scenario = current_scenario(&session)?;
    session.save()?;
    println!("created {} ({scenario})", args.name);
    Ok(())
}

pub fn run_delete(global: &GlobalArgs, args: NameArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    session.select(&args.name)?;
    session.store.delete()?;
    session.save()?;
    println!("deleted {}", args.name);
    Ok(())
}

pub fn run_set(global: &GlobalArgs, args: SetArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    session.select(&args.name)?;
    ensure_editable(&session, &args.name, &args.key)?;
    session.store.set_param(&args.key, Some(&args.value))?;
    session.save()?;
    println!("{}: {}={}", args.name, args.key, args.value);
    Ok(())
}

pub fn run_unset(global: &GlobalArgs, args: UnsetArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    session.select(&args.name)?;
    ensure_editable(&session, &args.name, &args.key)?;
    session.store.set_param(&args.key, None)?;
    session.save()?;
    println!("{}: removed {}", args.name, args.key);
    Ok(())
}

pub fn run_scenario(global: &GlobalArgs, args: ScenarioArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    session.select(&args.name)?;
    let scenario: Scenario = args.scenario.into();
    session.store.change_scenario(scenario)?;
    session.save()?;
    println!("{}: scenario {scenario}", args.name);
    Ok(())
}

pub fn run_role(global: &GlobalArgs, args: RoleArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    session.select(&args.name)?;
    session.store.change_role(args.role.into())?;
    let scenario = current_scenario(&session)?;
    session.save()?;
    println!("{}: scenario {scenario}", args.name);
    Ok(())
}

pub fn run_gateway_psk(global: &GlobalArgs, args: GatewayPskArgs) -> Result<()> {
    if args.psk.is_empty() {
        bail!("gateway pre-shared key must not be empty");
    }
    let mut session = Session::open(global)?;
    session.store.set_gateway_psk(&args.psk);
    session.save()?;
    println!("gateway pre-shared key updated");
    Ok(())
}

pub fn run_gateway_cert(global: &GlobalArgs, args: GatewayCertArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    let cert = args.cert.display().to_string();
    let key = args.key.display().to_string();
    session.store.set_gateway_cert(&cert, &key);
    session.save()?;
    println!("gateway certificate {cert} with key {key}");
    Ok(())
}

pub fn run_client_psk(global: &GlobalArgs, args: ClientPskArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    session.store.set_client_psk(&args.gateway, &args.psk)?;
    session.save()?;
    println!("pre-shared key for gateway {} updated", args.gateway);
    Ok(())
}

pub fn run_client_cert(global: &GlobalArgs, args: ClientCertArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    let cert = args.cert.display().to_string();
    let key = args.key.display().to_string();
    session.store.set_client_cert(&args.gateway, &cert, &key)?;
    session.save()?;
    println!("certificate for gateway {} updated", args.gateway);
    Ok(())
}

pub fn run_user(global: &GlobalArgs, args: UserArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    match args.action {
        UserAction::Add {
            kind,
            username,
            password,
        } => {
            let kind: UserKind = kind.into();
            session.store.add_user(kind, &username, &password)?;
            session.save()?;
            println!("added {kind} user {}", username.trim());
        }
        UserAction::Del { kind, username } => {
            let kind: UserKind = kind.into();
            if !session.store.delete_user(kind, &username) {
                bail!("no {kind} user named '{username}'");
            }
            session.save()?;
            println!("deleted {kind} user {username}");
        }
    }
    Ok(())
}

fn current_scenario(session: &Session) -> Result<Scenario> {
    match session.store.current() {
        Some(conn) => Ok(conn.scenario),
        None => bail!("no connection is selected"),
    }
}

/// Refuse keys the scenario does not fill in; they would not survive the
/// next load.
fn ensure_editable(session: &Session, name: &str, key: &str) -> Result<()> {
    let scenario = current_scenario(session)?;
    if !scenario.editable_keys().any(|editable| editable == key) {
        bail!(
            "cannot change '{key}' on {name}: {scenario} connections take {}",
            scenario.editable_keys().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(())
}
