//! Turning a connection store into files and system changes.
//!
//! [`plan`] is pure: it renders everything that has to be written and
//! decides which system switches to flip. [`execute`] hands the plan to a
//! [`SystemEffector`], which performs the I/O.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use ipsec_flatfile::{write_conf, write_secrets};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::conf_files::{to_conf_document, to_secrets_document};
use crate::firewall::{
    merge_into_script, remove_from_script, render_applied_rules, SCRIPT_TEMPLATE,
};
use crate::settings::PathSettings;
use crate::store::ConnectionStore;

/// Files written on apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedFile {
    IpsecConf,
    IpsecSecrets,
    FirewallScript,
    AppliedRules,
}

/// IP forwarding switches required by the configured gateways.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Forwarding {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl Forwarding {
    pub fn any(self) -> bool {
        self.ipv4 || self.ipv6
    }
}

/// Everything an apply run writes or switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyPlan {
    pub ipsec_conf: String,
    pub ipsec_secrets: String,
    pub firewall_rules: Vec<String>,
    pub firewall_script: String,
    /// Record of `firewall_rules`, read back by the next apply.
    pub applied_rules: String,
    pub enable_daemon: bool,
    pub forwarding: Forwarding,
    /// Connections exist but the daemon stays disabled.
    pub daemon_hint: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("incomplete configuration: {}", describe_incomplete(.0))]
    Incomplete(IndexMap<String, Vec<String>>),
}

fn describe_incomplete(incomplete: &IndexMap<String, Vec<String>>) -> String {
    incomplete
        .iter()
        .map(|(name, keys)| format!("{name} is missing {}", keys.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum EffectError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Side effects of an apply run.
pub trait SystemEffector {
    fn write_file(&mut self, file: ManagedFile, contents: &str) -> Result<(), EffectError>;
    fn set_daemon_enabled(&mut self, enabled: bool) -> Result<(), EffectError>;
    fn set_forwarding(&mut self, forwarding: Forwarding) -> Result<(), EffectError>;
}

/// Plan a first apply run against a fresh firewall script.
pub fn plan(store: &ConnectionStore) -> Result<ApplyPlan, ApplyError> {
    plan_with_script(store, None, &[])
}

/// Plan an apply run, merging firewall rules into `existing_script` when given.
///
/// `previous_rules` are the rules the last apply installed. They are taken
/// out of the script together with the current ones before the current rules
/// are merged back, so rules of removed pools or a dropped MSS clamp do not
/// linger. With the daemon disabled nothing is merged back.
pub fn plan_with_script(
    store: &ConnectionStore,
    existing_script: Option<&str>,
    previous_rules: &[String],
) -> Result<ApplyPlan, ApplyError> {
    let export = store.export();
    if !export.is_complete() {
        return Err(ApplyError::Incomplete(export.incomplete));
    }

    let mut forwarding = Forwarding::default();
    for record in export.records.values() {
        if let Some(subnet) = record.get("leftsubnet") {
            forwarding.ipv4 |= subnet.contains('.');
            forwarding.ipv6 |= subnet.contains(':');
        }
    }

    let toggles = store.toggles();
    let rules = store.derive_firewall_rules();
    let mut stale = previous_rules.to_vec();
    stale.extend(rules.iter().cloned());
    let cleaned = remove_from_script(existing_script.unwrap_or(SCRIPT_TEMPLATE), &stale);
    let (firewall_rules, firewall_script) = if toggles.enable_daemon {
        let script = merge_into_script(&cleaned, &rules);
        (rules, script)
    } else {
        (Vec::new(), cleaned)
    };

    Ok(ApplyPlan {
        ipsec_conf: write_conf(&to_conf_document(&export)),
        ipsec_secrets: write_secrets(&to_secrets_document(&store.export_secrets())),
        applied_rules: render_applied_rules(&firewall_rules),
        firewall_rules,
        firewall_script,
        enable_daemon: toggles.enable_daemon,
        forwarding,
        daemon_hint: !store.is_empty() && !toggles.enable_daemon,
    })
}

/// Carry out a plan: files first, then the daemon, then forwarding.
pub fn execute(plan: &ApplyPlan, effector: &mut dyn SystemEffector) -> Result<(), EffectError> {
    effector.write_file(ManagedFile::IpsecConf, &plan.ipsec_conf)?;
    effector.write_file(ManagedFile::IpsecSecrets, &plan.ipsec_secrets)?;
    effector.write_file(ManagedFile::FirewallScript, &plan.firewall_script)?;
    effector.write_file(ManagedFile::AppliedRules, &plan.applied_rules)?;
    effector.set_daemon_enabled(plan.enable_daemon)?;
    if plan.forwarding.any() {
        effector.set_forwarding(plan.forwarding)?;
    }
    info!(
        rules = plan.firewall_rules.len(),
        daemon = plan.enable_daemon,
        "applied configuration"
    );
    Ok(())
}

/// Writes managed files below a root directory.
///
/// Forwarding is persisted as a sysctl drop-in. Daemon state is only recorded
/// so the caller can tell the operator what to enable.
#[derive(Debug, Clone)]
pub struct RootedEffector {
    root: PathBuf,
    paths: PathSettings,
    daemon_request: Option<bool>,
    written: Vec<PathBuf>,
}

impl RootedEffector {
    pub fn new(root: impl Into<PathBuf>, paths: PathSettings) -> Self {
        Self {
            root: root.into(),
            paths,
            daemon_request: None,
            written: Vec::new(),
        }
    }

    /// Location of `path` below the root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let relative: PathBuf = path
            .components()
            .filter(|c| matches!(c, Component::Normal(_) | Component::CurDir))
            .collect();
        self.root.join(relative)
    }

    pub fn path_of(&self, file: ManagedFile) -> PathBuf {
        let configured = match file {
            ManagedFile::IpsecConf => &self.paths.ipsec_conf,
            ManagedFile::IpsecSecrets => &self.paths.ipsec_secrets,
            ManagedFile::FirewallScript => &self.paths.firewall_script,
            ManagedFile::AppliedRules => &self.paths.applied_rules,
        };
        self.resolve(configured)
    }

    pub fn daemon_request(&self) -> Option<bool> {
        self.daemon_request
    }

    /// Files written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write(&mut self, path: PathBuf, contents: &str, private: bool) -> Result<(), EffectError> {
        let io_err = |source| EffectError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        if private {
            write_private_file(&path, contents).map_err(io_err)?;
        } else {
            fs::write(&path, contents).map_err(io_err)?;
        }
        debug!(path = %path.display(), bytes = contents.len(), private, "wrote file");
        self.written.push(path);
        Ok(())
    }
}

impl SystemEffector for RootedEffector {
    fn write_file(&mut self, file: ManagedFile, contents: &str) -> Result<(), EffectError> {
        let path = self.path_of(file);
        self.write(path, contents, file == ManagedFile::IpsecSecrets)
    }

    fn set_daemon_enabled(&mut self, enabled: bool) -> Result<(), EffectError> {
        info!(enabled, "IPsec daemon state requested");
        self.daemon_request = Some(enabled);
        Ok(())
    }

    fn set_forwarding(&mut self, forwarding: Forwarding) -> Result<(), EffectError> {
        let path = self.resolve(&self.paths.sysctl_conf);
        self.write(path, &sysctl_dropin(forwarding), false)
    }
}

/// sysctl settings enabling the requested forwarding.
pub fn sysctl_dropin(forwarding: Forwarding) -> String {
    let mut lines = vec!["# Generated by vpn-conf.".to_string()];
    if forwarding.ipv4 {
        lines.push("net.ipv4.ip_forward = 1".to_string());
        lines.push("net.ipv4.conf.all.forwarding = 1".to_string());
        lines.push("net.ipv4.conf.default.forwarding = 1".to_string());
    }
    if forwarding.ipv6 {
        lines.push("net.ipv6.conf.all.forwarding = 1".to_string());
        lines.push("net.ipv6.conf.default.forwarding = 1".to_string());
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Write a file only its owner can read, such as `ipsec.secrets`.
///
/// New files are created with mode 0600 so the contents are never exposed,
/// and an existing file is narrowed to 0600 before it is truncated.
pub fn write_private_file(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    restrict_permissions(&file)?;
    file.set_len(0)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::firewall::parse_applied_rules;
    use crate::scenario::Role;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl SystemEffector for Recorder {
        fn write_file(&mut self, file: ManagedFile, _contents: &str) -> Result<(), EffectError> {
            self.events.push(format!("write {file:?}"));
            Ok(())
        }

        fn set_daemon_enabled(&mut self, enabled: bool) -> Result<(), EffectError> {
            self.events.push(format!("daemon {enabled}"));
            Ok(())
        }

        fn set_forwarding(&mut self, forwarding: Forwarding) -> Result<(), EffectError> {
            self.events
                .push(format!("forward v4={} v6={}", forwarding.ipv4, forwarding.ipv6));
            Ok(())
        }
    }

    fn gateway_store() -> ConnectionStore {
        let mut store = ConnectionStore::new();
        store.set_enable_daemon(true);
        store.create("gw", Role::Gateway).expect("create");
        store.set_param("leftsubnet", Some("0.0.0.0/0,::/0")).expect("subnet");
        store.set_param("rightsourceip", Some("10.8.0.0/24")).expect("pool");
        store.set_gateway_psk("secret");
        store
    }

    #[test]
    fn incomplete_configuration_blocks_planning() {
        let mut store = ConnectionStore::new();
        store.create("office", Role::Client).expect("create");
        let err = plan(&store).expect_err("should block");
        assert_eq!(
            err.to_string(),
            "incomplete configuration: office is missing right, rightsubnet"
        );
    }

    #[test]
    fn plan_renders_files_rules_and_forwarding() {
        let plan = plan(&gateway_store()).expect("plan");

        assert!(plan.ipsec_conf.starts_with("conn gw\n\tauto=add\n"));
        assert_eq!(plan.ipsec_secrets, "%any : PSK \"secret\"\n");
        assert_eq!(plan.firewall_rules.len(), 9);
        assert!(plan
            .firewall_script
            .contains("iptables -t nat -A POSTROUTING -s 10.8.0.0/24 -j MASQUERADE"));
        assert_eq!(plan.forwarding, Forwarding { ipv4: true, ipv6: true });
        assert!(!plan.daemon_hint);
    }

    #[test]
    fn disabled_daemon_strips_generated_rules() {
        let enabled = plan(&gateway_store()).expect("plan");
        let mut store = gateway_store();
        store.set_enable_daemon(false);

        let disabled = plan_with_script(
            &store,
            Some(&enabled.firewall_script),
            &enabled.firewall_rules,
        )
        .expect("plan");
        assert!(disabled.firewall_rules.is_empty());
        assert_eq!(disabled.firewall_script, SCRIPT_TEMPLATE);
        assert_eq!(parse_applied_rules(&disabled.applied_rules), Vec::<String>::new());
        assert!(disabled.daemon_hint);
    }

    #[test]
    fn replanning_keeps_script_stable() {
        let store = gateway_store();
        let first = plan(&store).expect("plan");
        let second = plan_with_script(&store, Some(&first.firewall_script), &first.firewall_rules)
            .expect("plan");
        assert_eq!(first.firewall_script, second.firewall_script);
        assert_eq!(first.applied_rules, second.applied_rules);
    }

    #[test]
    fn replanning_drops_rules_of_the_previous_apply() {
        let mut store = gateway_store();
        store.set_reduce_tcp_mss(true);
        let first = plan(&store).expect("plan");
        assert!(first.firewall_script.contains("-s 10.8.0.0/24 -j MASQUERADE"));
        assert!(first.firewall_script.contains("--set-mss 1220"));

        store.set_reduce_tcp_mss(false);
        store.set_param("rightsourceip", Some("10.9.0.0/24")).expect("pool");
        let previous = parse_applied_rules(&first.applied_rules);
        let second =
            plan_with_script(&store, Some(&first.firewall_script), &previous).expect("plan");

        assert!(!second.firewall_script.contains("10.8.0.0/24"));
        assert!(!second.firewall_script.contains("--set-mss"));
        assert!(second.firewall_script.contains("-s 10.9.0.0/24 -j MASQUERADE"));
        assert_eq!(parse_applied_rules(&second.applied_rules), second.firewall_rules);
    }

    #[test]
    fn execute_runs_steps_in_order() {
        let plan = plan(&gateway_store()).expect("plan");
        let mut recorder = Recorder::default();
        execute(&plan, &mut recorder).expect("execute");
        assert_eq!(
            recorder.events,
            vec![
                "write IpsecConf",
                "write IpsecSecrets",
                "write FirewallScript",
                "write AppliedRules",
                "daemon true",
                "forward v4=true v6=true",
            ]
        );
    }

    #[test]
    fn rooted_effector_writes_below_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plan = plan(&gateway_store()).expect("plan");
        let mut effector = RootedEffector::new(dir.path(), PathSettings::default());
        execute(&plan, &mut effector).expect("execute");

        let conf = fs::read_to_string(dir.path().join("etc/ipsec.conf")).expect("conf");
        assert_eq!(conf, plan.ipsec_conf);
        let sysctl =
            fs::read_to_string(dir.path().join("etc/sysctl.d/70-vpn-conf.conf")).expect("sysctl");
        assert!(sysctl.contains("net.ipv4.ip_forward = 1"));
        assert!(sysctl.contains("net.ipv6.conf.all.forwarding = 1"));
        assert_eq!(effector.daemon_request(), Some(true));
        assert_eq!(effector.written().len(), 5);
        let applied = fs::read_to_string(dir.path().join("etc/vpn-conf/firewall-rules.applied"))
            .expect("applied rules");
        assert_eq!(parse_applied_rules(&applied), plan.firewall_rules);
    }

    #[cfg(unix)]
    #[test]
    fn private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ipsec.secrets");
        fs::write(&path, "old contents that are longer\n").expect("seed");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

        write_private_file(&path, "%any : PSK \"s\"\n").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "%any : PSK \"s\"\n");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let fresh = dir.path().join("fresh.secrets");
        write_private_file(&fresh, "").expect("write");
        let mode = fs::metadata(&fresh).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn resolve_ignores_parent_components() {
        let effector = RootedEffector::new("/tmp/root", PathSettings::default());
        assert_eq!(
            effector.resolve(Path::new("/etc/../ipsec.conf")),
            PathBuf::from("/tmp/root/etc/ipsec.conf")
        );
    }
}
