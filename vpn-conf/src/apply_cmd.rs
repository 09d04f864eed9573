use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use vpn_conf::apply::{execute, plan_with_script, ApplyPlan, ManagedFile, RootedEffector};
use vpn_conf::firewall::{mss_reduction_enabled, parse_applied_rules};

use crate::cli::{ApplyArgs, GlobalArgs, OutputFormat};
use crate::path_guard::ensure_not_system_root;
use crate::session::Session;

pub fn run_apply(global: &GlobalArgs, args: ApplyArgs) -> Result<()> {
    ensure_not_system_root(&args.root, args.allow_system_root)?;

    let mut session = Session::open(global)?;
    session.report_warnings();
    let mut effector = RootedEffector::new(&args.root, session.settings.paths.clone());

    let existing_script = read_if_present(&effector.path_of(ManagedFile::FirewallScript))?;
    let previous_rules = read_if_present(&effector.path_of(ManagedFile::AppliedRules))?
        .map(|text| parse_applied_rules(&text))
        .unwrap_or_default();

    if args.no_daemon {
        session.store.set_enable_daemon(false);
    }
    // Without a flag, MSS clamping follows the settings or the last apply.
    let reduce_mss = if args.no_reduce_mss {
        false
    } else {
        args.reduce_mss
            || session.store.toggles().reduce_tcp_mss
            || mss_reduction_enabled(&previous_rules.join("\n"))
    };
    session.store.set_reduce_tcp_mss(reduce_mss);

    let plan = plan_with_script(&session.store, existing_script.as_deref(), &previous_rules)?;

    if args.dry_run {
        match args.format {
            OutputFormat::Text => println!("{}", render_plan(&args.root, &plan, &effector)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        }
        return Ok(());
    }

    execute(&plan, &mut effector)?;
    for path in effector.written() {
        println!("wrote {}", path.display());
    }
    if plan.daemon_hint {
        println!(
            "{}",
            "connections are configured but the IPsec daemon is disabled".yellow()
        );
    } else if effector.daemon_request() == Some(true) {
        println!("enable and restart the IPsec daemon to activate the configuration");
    }
    Ok(())
}

fn read_if_present(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .with_context(|| format!("failed to read {}", path.display()))
}

fn render_plan(root: &Path, plan: &ApplyPlan, effector: &RootedEffector) -> String {
    let mut out = vec![
        format!("plan root={}", root.display()),
        format!("- {}", effector.path_of(ManagedFile::IpsecConf).display()),
        format!("- {}", effector.path_of(ManagedFile::IpsecSecrets).display()),
        format!("- {}", effector.path_of(ManagedFile::FirewallScript).display()),
        format!("- {}", effector.path_of(ManagedFile::AppliedRules).display()),
        format!("daemon enabled={}", plan.enable_daemon),
        format!(
            "forwarding ipv4={} ipv6={}",
            plan.forwarding.ipv4, plan.forwarding.ipv6
        ),
        format!("firewall rules={}", plan.firewall_rules.len()),
    ];
    out.extend(plan.firewall_rules.iter().map(|rule| format!("  {rule}")));
    out.join("\n")
}
