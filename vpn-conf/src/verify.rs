use serde::Serialize;

use crate::conf_files::LoadWarnings;
use crate::scenario::Scenario;
use crate::secrets::{ClientSecretKind, SecretKind, UserKind};
use crate::store::ConnectionStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VerifySeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyIssue {
    pub severity: VerifySeverity,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub connections: usize,
    pub errors: usize,
    pub warnings: usize,
    pub issues: Vec<VerifyIssue>,
}

/// Check a loaded store for problems that would stop or weaken an apply run.
///
/// Only unfilled template blanks are errors; everything else is a warning.
pub fn build_verify_report(store: &ConnectionStore, load: &LoadWarnings) -> VerifyReport {
    let mut issues = Vec::new();

    for (name, keys) in &store.export().incomplete {
        issues.push(err(
            "incomplete_connection",
            format!("{name}: missing {}", keys.join(", ")),
        ));
    }
    issues.extend(load_issues(load));
    issues.extend(client_secret_issues(store));
    issues.extend(gateway_issues(store));

    if !store.is_empty() && !store.toggles().enable_daemon {
        issues.push(warn(
            "daemon_disabled",
            "connections are configured but the IPsec daemon will not be enabled".to_string(),
        ));
    }

    let errors = issues
        .iter()
        .filter(|issue| issue.severity == VerifySeverity::Error)
        .count();
    VerifyReport {
        connections: store.len(),
        errors,
        warnings: issues.len() - errors,
        issues,
    }
}

fn load_issues(load: &LoadWarnings) -> Vec<VerifyIssue> {
    let mut out = Vec::new();
    for header in &load.unsupported_sections {
        out.push(warn(
            "unsupported_section",
            format!("'{header}' is not managed and will be dropped on save"),
        ));
    }
    for name in &load.unsupported_connections {
        out.push(warn(
            "unsupported_connection",
            format!("connection '{name}' matches no supported scenario and will be dropped on save"),
        ));
    }
    for label in &load.unsupported_secrets {
        out.push(warn(
            "unsupported_secret",
            format!("secret '{label}' has an unsupported type and will be dropped on save"),
        ));
    }
    out
}

fn client_secret_issues(store: &ConnectionStore) -> Vec<VerifyIssue> {
    let mut out = Vec::new();
    for kind in [ClientSecretKind::Psk, ClientSecretKind::Cert] {
        for (gateway, secret) in store.client_secrets(kind) {
            if secret.is_blank() {
                let what = match kind {
                    ClientSecretKind::Psk => "pre-shared key",
                    ClientSecretKind::Cert => "certificate key",
                };
                out.push(warn(
                    "missing_client_secret",
                    format!("no {what} configured for gateway {gateway}"),
                ));
            }
        }
    }
    for (kind, identity) in store.dangling_secrets() {
        let label = match kind {
            SecretKind::Rsa => "RSA key",
            _ => "PSK",
        };
        out.push(warn(
            "dangling_secret",
            format!("{label} for {identity} is not used by any client connection"),
        ));
    }
    out
}

fn gateway_issues(store: &ConnectionStore) -> Vec<VerifyIssue> {
    let has = |scenario| !store.connections_by_scenario(scenario).is_empty();
    let secrets = store.secrets();
    let mut out = Vec::new();

    if (has(Scenario::GwPsk) || has(Scenario::GwMobile)) && secrets.gw_psk.is_empty() {
        out.push(warn(
            "missing_gateway_psk",
            "a PSK gateway is configured but no gateway pre-shared key is set".to_string(),
        ));
    }
    if (has(Scenario::GwCert) || has(Scenario::GwWin)) && secrets.gw_rsa.is_empty() {
        out.push(warn(
            "missing_gateway_key",
            "a certificate gateway is configured but no gateway key is set".to_string(),
        ));
    }
    if has(Scenario::GwMobile) && secrets.users(UserKind::Xauth).is_empty() {
        out.push(warn(
            "no_xauth_users",
            "the mobile client gateway has no XAuth users".to_string(),
        ));
    }
    if has(Scenario::GwWin) && secrets.users(UserKind::Eap).is_empty() {
        out.push(warn(
            "no_eap_users",
            "the Windows client gateway has no EAP users".to_string(),
        ));
    }
    out
}

fn err(code: &str, message: String) -> VerifyIssue {
    VerifyIssue {
        severity: VerifySeverity::Error,
        code: code.to_string(),
        message,
    }
}

fn warn(code: &str, message: String) -> VerifyIssue {
    VerifyIssue {
        severity: VerifySeverity::Warning,
        code: code.to_string(),
        message,
    }
}

pub fn render_verify_text(report: &VerifyReport) -> String {
    let mut out = Vec::new();
    out.push(format!("verify connections={}", report.connections));
    out.push(format!(
        "result errors={} warnings={}",
        report.errors, report.warnings
    ));
    out.push("issues".to_string());
    if report.issues.is_empty() {
        out.push("- none".to_string());
        return out.join("\n");
    }
    for issue in &report.issues {
        let sev = match issue.severity {
            VerifySeverity::Error => "error",
            VerifySeverity::Warning => "warning",
        };
        out.push(format!("- [{sev}] {}: {}", issue.code, issue.message));
    }
    out.join("\n")
}
