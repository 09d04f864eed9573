use anyhow::{bail, Result};
use serde::Serialize;
use vpn_conf::firewall::render_script;
use vpn_conf::report::{render_connection_detail, render_connections, summary};
use vpn_conf::scenario::{ParamMap, Role, Scenario};

use crate::cli::{FirewallArgs, GlobalArgs, InspectArgs, OutputFormat, ShowArgs};
use crate::session::Session;

#[derive(Debug, Serialize)]
struct ConnectionRow<'a> {
    name: &'a str,
    role: Role,
    scenario: Scenario,
    description: &'static str,
    missing: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ConnectionDetail<'a> {
    name: &'a str,
    scenario: Scenario,
    record: &'a ParamMap,
    missing: &'a [String],
}

pub fn run_show(global: &GlobalArgs, args: ShowArgs) -> Result<()> {
    let session = Session::open(global)?;
    session.report_warnings();
    match args.format {
        OutputFormat::Text => println!("{}", render_connections(&session.store)),
        OutputFormat::Json => {
            let mut export = session.store.export();
            let rows: Vec<ConnectionRow<'_>> = session
                .store
                .connections()
                .map(|conn| ConnectionRow {
                    name: &conn.name,
                    role: conn.role(),
                    scenario: conn.scenario,
                    description: conn.scenario.description(),
                    missing: export.incomplete.shift_remove(&conn.name).unwrap_or_default(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

pub fn run_inspect(global: &GlobalArgs, args: InspectArgs) -> Result<()> {
    let session = Session::open(global)?;
    let Some(conn) = session.store.connection(&args.name) else {
        bail!("no connection named '{}'", args.name);
    };
    match args.format {
        OutputFormat::Text => {
            if let Some(text) = render_connection_detail(&session.store, &args.name) {
                println!("{text}");
            }
        }
        OutputFormat::Json => {
            let export = session.store.export();
            let Some(record) = export.records.get(&args.name) else {
                bail!("no connection named '{}'", args.name);
            };
            let detail = ConnectionDetail {
                name: &conn.name,
                scenario: conn.scenario,
                record,
                missing: export
                    .incomplete
                    .get(&args.name)
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
            };
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
    }
    Ok(())
}

pub fn run_summary(global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    session.report_warnings();
    println!("{}", summary(&session.store));
    Ok(())
}

pub fn run_firewall(global: &GlobalArgs, args: FirewallArgs) -> Result<()> {
    let mut session = Session::open(global)?;
    if args.reduce_mss {
        session.store.set_reduce_tcp_mss(true);
    }
    let rules = session.store.derive_firewall_rules();
    if args.script {
        print!("{}", render_script(&rules));
    } else {
        for rule in &rules {
            println!("{rule}");
        }
    }
    Ok(())
}
