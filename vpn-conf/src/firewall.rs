//! Firewall rules for configured VPN connections and the custom-rules script
//! they are installed into.

use crate::scenario::Role;
use crate::store::Connection;

/// MSS that forwarded TCP connections are clamped to when reduction is on.
pub const REDUCED_MSS: u16 = 1220;

const INPUT_ANCHOR: &str = "fw_custom_after_chain_creation";
const FORWARD_ANCHOR: &str = "fw_custom_before_masq";

/// Skeleton of the custom-rules script. Each hook is a no-op until rules are
/// merged into it.
pub const SCRIPT_TEMPLATE: &str = "#!/bin/bash
# Generated by vpn-conf. Rules below are kept in sync with the VPN connections.
fw_custom_after_chain_creation() {
true
}
fw_custom_after_chain_creation
fw_custom_before_port_handling() {
true
}
fw_custom_before_port_handling
fw_custom_before_masq() {
true
}
fw_custom_before_masq
fw_custom_before_denyall() {
true
}
fw_custom_before_denyall
fw_custom_after_finished() {
true
}
fw_custom_after_finished
";

/// Derive the ordered firewall commands for a set of connections.
///
/// Rule order matters: port opening first, then MSS clamping, then
/// forwarding and masquerading for gateways that offer Internet access.
pub fn derive_rules<'a, I>(connections: I, reduce_mss: bool) -> Vec<String>
where
    I: IntoIterator<Item = &'a Connection>,
{
    let connections: Vec<&Connection> = connections.into_iter().collect();
    let mut rules = Vec::new();

    if !connections.is_empty() {
        for tool in ["iptables", "ip6tables"] {
            for port in [500, 4500] {
                rules.push(format!("{tool} -A INPUT -p udp --dport {port} -j ACCEPT"));
            }
        }
        for tool in ["iptables", "ip6tables"] {
            rules.push(format!("{tool} -A INPUT -p 50 -j ACCEPT"));
        }
    }

    if reduce_mss {
        for tool in ["iptables", "ip6tables"] {
            rules.push(format!(
                "{tool} -A FORWARD -p tcp -m tcp --tcp-flags SYN,RST SYN -m tcpmss --mss {}:65535 -j TCPMSS --set-mss {REDUCED_MSS}",
                REDUCED_MSS + 1
            ));
        }
    }

    for cidr in internet_access_pools(&connections) {
        let tool = if cidr.contains(':') {
            "ip6tables"
        } else {
            "iptables"
        };
        rules.push(format!("{tool} -A FORWARD -s {cidr} -j ACCEPT"));
        rules.push(format!("{tool} -A FORWARD -d {cidr} -j ACCEPT"));
        rules.push(format!("{tool} -t nat -A POSTROUTING -s {cidr} -j MASQUERADE"));
    }

    rules
}

/// Client address pools of gateways that route everything through the tunnel.
fn internet_access_pools<'a>(connections: &[&'a Connection]) -> Vec<&'a str> {
    connections
        .iter()
        .copied()
        .filter(|conn| conn.role() == Role::Gateway)
        .filter(|conn| {
            conn.param("leftsubnet")
                .map(|subnets| {
                    subnets
                        .split(',')
                        .map(str::trim)
                        .any(|net| net == "0.0.0.0/0" || net == "::/0")
                })
                .unwrap_or(false)
        })
        .filter_map(|conn| conn.param("rightsourceip"))
        .map(str::trim)
        .filter(|pool| !pool.is_empty())
        .collect()
}

/// Render a fresh script carrying `rules`.
pub fn render_script(rules: &[String]) -> String {
    merge_into_script(SCRIPT_TEMPLATE, rules)
}

/// Merge rules into an existing custom-rules script.
///
/// `-A INPUT` rules land right after the opening line of
/// `fw_custom_after_chain_creation`, the others right after the opening line
/// of `fw_custom_before_masq`. Rules already present in some line are not
/// inserted again.
pub fn merge_into_script(existing: &str, rules: &[String]) -> String {
    let (input, forward): (Vec<&str>, Vec<&str>) = rules
        .iter()
        .map(|rule| rule.trim())
        .partition(|rule| rule.contains("-A INPUT"));

    let mut lines: Vec<String> = existing.lines().map(str::to_string).collect();
    merge_section(&mut lines, &input, INPUT_ANCHOR);
    merge_section(&mut lines, &forward, FORWARD_ANCHOR);

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn merge_section(lines: &mut Vec<String>, rules: &[&str], anchor: &str) {
    let mut pending: Vec<String> = Vec::new();
    for rule in rules {
        let present = lines.iter().any(|line| line.contains(rule))
            || pending.iter().any(|queued| queued == rule);
        if !present {
            pending.push((*rule).to_string());
        }
    }
    if pending.is_empty() {
        return;
    }

    // Without the hook, rules go to the top, below an interpreter line.
    let shebang = lines.first().is_some_and(|line| line.starts_with("#!"));
    let at = lines
        .iter()
        .position(|line| is_hook_opening(line, anchor))
        .map_or(usize::from(shebang), |idx| idx + 1);
    for (offset, rule) in pending.into_iter().enumerate() {
        lines.insert(at + offset, rule);
    }
}

fn is_hook_opening(line: &str, hook: &str) -> bool {
    line.find(hook)
        .map(|pos| line[pos + hook.len()..].contains('{'))
        .unwrap_or(false)
}

/// Drop every line that carries one of `rules`.
pub fn remove_from_script(existing: &str, rules: &[String]) -> String {
    let mut out = existing
        .lines()
        .filter(|line| !rules.iter().any(|rule| line.contains(rule.trim())))
        .collect::<Vec<_>>()
        .join("\n");
    out.push('\n');
    out
}

/// Record of the rules installed by the last apply, so the next apply can
/// take them out again even when the connections changed since.
pub fn render_applied_rules(rules: &[String]) -> String {
    let mut out = String::from("# Firewall rules installed by vpn-conf. Do not edit.\n");
    for rule in rules {
        out.push_str(rule.trim());
        out.push('\n');
    }
    out
}

/// Rules listed in an applied-rules record. Blank and comment lines are skipped.
pub fn parse_applied_rules(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// True when merging `rules` would not change the script.
pub fn script_contains_all(existing: &str, rules: &[String]) -> bool {
    merge_into_script(existing, rules).trim() == existing.trim()
}

/// True when the script already clamps MSS to the reduced value.
pub fn mss_reduction_enabled(script: &str) -> bool {
    script.contains(&format!("--set-mss {REDUCED_MSS}"))
}
