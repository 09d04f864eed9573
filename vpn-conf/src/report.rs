use colored::Colorize;

use crate::conf_files::LoadWarnings;
use crate::scenario::Role;
use crate::store::ConnectionStore;

/// Plain-text overview: global toggles, then one line per connection.
pub fn summary(store: &ConnectionStore) -> String {
    let toggles = store.toggles();
    let mut out = vec![
        "VPN Global Settings".to_string(),
        format!("Enable VPN (IPsec) daemon: {}", toggles.enable_daemon),
        format!("Reduce TCP MSS: {}", toggles.reduce_tcp_mss),
        "Gateway and Connections".to_string(),
    ];
    for conn in store.connections() {
        let line = match conn.role() {
            Role::Gateway => format!(
                "{}: A gateway serving clients in {}",
                conn.name,
                conn.param("rightsourceip").unwrap_or_default()
            ),
            Role::Client => format!(
                "{}: A client connecting to {}",
                conn.name,
                conn.param("right").unwrap_or_default()
            ),
        };
        out.push(line);
    }
    out.join("\n")
}

/// Connection listing for the terminal. The current connection is marked.
pub fn render_connections(store: &ConnectionStore) -> String {
    if store.is_empty() {
        return "no connections configured".dimmed().to_string();
    }
    let incomplete = store.export().incomplete;
    let mut out = Vec::new();
    for conn in store.connections() {
        let marker = if store.current_name() == Some(conn.name.as_str()) {
            "*"
        } else {
            " "
        };
        let role = match conn.role() {
            Role::Gateway => "gateway".cyan(),
            Role::Client => "client".blue(),
        };
        let state = match incomplete.get(&conn.name) {
            Some(keys) => format!("incomplete: {}", keys.join(", ")).red().to_string(),
            None => "ok".green().to_string(),
        };
        out.push(format!(
            "{marker} {} [{role}] {} ({}) {state}",
            conn.name.bold(),
            conn.scenario,
            conn.scenario.description()
        ));
    }
    out.join("\n")
}

/// Full record of one connection as it will be written.
pub fn render_connection_detail(store: &ConnectionStore, name: &str) -> Option<String> {
    let conn = store.connection(name)?;
    let export = store.export();
    let record = export.records.get(name)?;
    let mut out = vec![format!(
        "{} {} ({})",
        "conn".bold(),
        conn.name.bold(),
        conn.scenario.description()
    )];
    for (key, value) in record {
        let line = if value.trim().is_empty() {
            format!("  {key}=").red().to_string()
        } else if conn.params.contains_key(key) {
            format!("  {key}={value}").yellow().to_string()
        } else {
            format!("  {key}={value}")
        };
        out.push(line);
    }
    Some(out.join("\n"))
}

/// Warnings about content that will be dropped on save.
pub fn render_load_warnings(warnings: &LoadWarnings) -> String {
    let mut out = Vec::new();
    for header in &warnings.unsupported_sections {
        out.push(format!("warning: unsupported section '{header}' will be dropped"));
    }
    for name in &warnings.unsupported_connections {
        out.push(format!("warning: unsupported connection '{name}' will be dropped"));
    }
    for label in &warnings.unsupported_secrets {
        out.push(format!("warning: unsupported secret '{label}' will be dropped"));
    }
    out.into_iter()
        .map(|line| line.yellow().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
