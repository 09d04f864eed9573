//! Scenario catalog.
//!
//! Every supported connection follows one of six fixed templates. A template
//! maps strongSwan parameter names to either a fixed value or a blank that the
//! connection has to fill in. Loaded records are classified against the
//! templates, and edited connections are merged back into them on export.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered parameter-name to value mapping.
pub type ParamMap = IndexMap<String, String>;

/// A template entry: parameter name and its fixed value, or `None` for a blank.
pub type TemplateEntry = (&'static str, Option<&'static str>);

/// Connection bookkeeping keys that are never written as protocol parameters.
const BOOKKEEPING_KEYS: [&str; 2] = ["name", "scenario"];

/// The six connection archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    GwPsk,
    GwCert,
    GwMobile,
    GwWin,
    ClientPsk,
    ClientCert,
}

/// Whether a connection accepts clients or connects to a remote gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Gateway,
    Client,
}

impl Scenario {
    /// Catalog order, also the classification order.
    pub const ALL: [Scenario; 6] = [
        Scenario::GwPsk,
        Scenario::GwCert,
        Scenario::GwMobile,
        Scenario::GwWin,
        Scenario::ClientPsk,
        Scenario::ClientCert,
    ];

    /// Gateway scenarios in slot-search order. Each is a singleton slot.
    pub const GATEWAYS: [Scenario; 4] = [
        Scenario::GwPsk,
        Scenario::GwCert,
        Scenario::GwMobile,
        Scenario::GwWin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::GwPsk => "gw_psk",
            Scenario::GwCert => "gw_cert",
            Scenario::GwMobile => "gw_mobile",
            Scenario::GwWin => "gw_win",
            Scenario::ClientPsk => "client_psk",
            Scenario::ClientCert => "client_cert",
        }
    }

    pub fn role(self) -> Role {
        if Self::GATEWAYS.contains(&self) {
            Role::Gateway
        } else {
            Role::Client
        }
    }

    /// Short operator-facing label.
    pub fn description(self) -> &'static str {
        match self {
            Scenario::GwPsk => "Gateway - PSK",
            Scenario::GwCert => "Gateway - Certificate",
            Scenario::GwMobile => "Gateway - Mobile clients",
            Scenario::GwWin => "Gateway - Windows clients",
            Scenario::ClientPsk => "Client - PSK",
            Scenario::ClientCert => "Client - Certificate",
        }
    }

    /// Template entries in file order.
    pub fn template(self) -> &'static [TemplateEntry] {
        match self {
            Scenario::GwPsk => GW_PSK,
            Scenario::GwCert => GW_CERT,
            Scenario::GwMobile => GW_MOBILE,
            Scenario::GwWin => GW_WIN,
            Scenario::ClientPsk => CLIENT_PSK,
            Scenario::ClientCert => CLIENT_CERT,
        }
    }

    /// Template blanks: the parameters a connection of this scenario fills
    /// in. Only these survive a reload of the written files.
    pub fn editable_keys(self) -> impl Iterator<Item = &'static str> {
        self.template()
            .iter()
            .filter(|(_, fixed)| fixed.is_none())
            .map(|(key, _)| *key)
    }

    /// Fixed value of `key` in this template, if the template fixes it.
    pub fn fixed_value(self, key: &str) -> Option<&'static str> {
        self.template()
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| *v)
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s.trim())
            .ok_or_else(|| format!("unknown scenario '{s}'"))
    }
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Gateway => "gateway",
            Role::Client => "client",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const GW_PSK: &[TemplateEntry] = &[
    ("auto", Some("add")),
    ("keyexchange", Some("ikev2")),
    ("left", Some("%defaultroute")),
    ("leftauth", Some("psk")),
    ("leftsubnet", None),
    ("right", Some("%any")),
    ("rightauth", Some("psk")),
    ("rightsourceip", None),
    ("fragmentation", Some("yes")),
    ("dpdaction", Some("clear")),
    ("dpdtimeout", Some("600")),
    ("dpddelay", Some("60")),
];

const GW_CERT: &[TemplateEntry] = &[
    ("auto", Some("add")),
    ("keyexchange", Some("ikev2")),
    ("left", Some("%defaultroute")),
    ("leftcert", None),
    ("leftauth", Some("pubkey")),
    ("leftsubnet", None),
    ("right", Some("%any")),
    ("rightcert", None),
    ("rightsourceip", None),
    ("rightauth", Some("pubkey")),
    ("fragmentation", Some("yes")),
    ("dpdaction", Some("clear")),
    ("dpdtimeout", Some("600")),
    ("dpddelay", Some("60")),
];

const GW_MOBILE: &[TemplateEntry] = &[
    ("auto", Some("add")),
    ("keyexchange", Some("ikev1")),
    ("left", Some("%defaultroute")),
    ("leftauth", Some("psk")),
    ("leftsubnet", None),
    ("right", Some("%any")),
    ("rightauth", Some("psk")),
    ("rightauth2", Some("xauth")),
    ("rightsourceip", None),
    ("fragmentation", Some("yes")),
    ("dpdaction", Some("clear")),
    ("dpdtimeout", Some("600")),
    ("dpddelay", Some("60")),
];

const GW_WIN: &[TemplateEntry] = &[
    ("auto", Some("add")),
    ("keyexchange", Some("ikev2")),
    ("rekey", Some("no")),
    ("left", Some("%defaultroute")),
    ("leftcert", None),
    ("leftauth", Some("pubkey")),
    ("leftsubnet", None),
    ("right", Some("%any")),
    ("rightsendcert", Some("never")),
    ("rightauth", Some("eap-mschapv2")),
    ("rightsourceip", None),
    ("eap_identity", Some("%any")),
    ("esp", Some("aes256-sha1!")),
    ("ike", Some("aes256-sha1-modp1024!")),
    ("fragmentation", Some("yes")),
    ("dpdaction", Some("clear")),
    ("dpdtimeout", Some("600")),
    ("dpddelay", Some("60")),
];

const CLIENT_PSK: &[TemplateEntry] = &[
    ("auto", Some("start")),
    ("keyexchange", Some("ikev2")),
    ("left", Some("%defaultroute")),
    ("leftauth", Some("psk")),
    ("leftsourceip", Some("%config")),
    ("right", None),
    ("rightsubnet", None),
    ("rightauth", Some("psk")),
    ("fragmentation", Some("yes")),
    ("dpdtimeout", Some("600")),
    ("dpddelay", Some("60")),
    ("dpdaction", Some("restart")),
    ("closeaction", Some("restart")),
    ("keyingtries", Some("%forever")),
];

const CLIENT_CERT: &[TemplateEntry] = &[
    ("auto", Some("start")),
    ("keyexchange", Some("ikev2")),
    ("left", Some("%defaultroute")),
    ("leftsourceip", Some("%config")),
    ("leftcert", None),
    ("leftauth", Some("pubkey")),
    ("right", None),
    ("rightcert", None),
    ("rightsubnet", None),
    ("rightauth", Some("pubkey")),
    ("fragmentation", Some("yes")),
    ("dpdtimeout", Some("600")),
    ("dpddelay", Some("60")),
    ("dpdaction", Some("restart")),
    ("closeaction", Some("restart")),
    ("keyingtries", Some("%forever")),
];

/// Fallback for subnet parameters missing from a loaded record.
pub const DEFAULT_SUBNET: &str = "0.0.0.0/0";

/// Match a loaded record against the catalog.
///
/// A template matches when every key it fixes is present in the record with
/// the same value; blanks impose nothing. The first match in catalog order
/// wins. The templates are pairwise distinguishable (see
/// [`check_templates_distinguishable`]), so at most one can match.
pub fn classify(record: &ParamMap) -> Option<Scenario> {
    Scenario::ALL.into_iter().find(|scenario| {
        scenario
            .template()
            .iter()
            .filter_map(|(key, value)| value.map(|v| (*key, v)))
            .all(|(key, fixed)| record.get(key).map(String::as_str) == Some(fixed))
    })
}

/// Pull the parameters a connection of `scenario` fills in out of a loaded record.
pub fn extract_specific_params(scenario: Scenario, record: &ParamMap) -> ParamMap {
    let subnet = |key: &str| -> (String, String) { fetch(record, key, DEFAULT_SUBNET) };
    let plain = |key: &str| -> (String, String) { fetch(record, key, "") };

    let entries = match scenario {
        Scenario::GwPsk | Scenario::GwMobile => {
            vec![subnet("leftsubnet"), plain("rightsourceip")]
        }
        Scenario::GwCert => vec![
            plain("leftcert"),
            plain("rightcert"),
            subnet("leftsubnet"),
            plain("rightsourceip"),
        ],
        Scenario::GwWin => vec![
            plain("leftcert"),
            subnet("leftsubnet"),
            plain("rightsourceip"),
        ],
        Scenario::ClientPsk => vec![plain("right"), subnet("rightsubnet")],
        Scenario::ClientCert => vec![
            plain("leftcert"),
            plain("right"),
            plain("rightcert"),
            subnet("rightsubnet"),
        ],
    };
    entries.into_iter().collect()
}

fn fetch(record: &ParamMap, key: &str, default: &str) -> (String, String) {
    let value = record
        .get(key)
        .cloned()
        .unwrap_or_else(|| default.to_string());
    (key.to_string(), value)
}

/// Build a template-complete record from a connection's customized parameters.
///
/// Template entries come first in template order, with blanks filled from
/// `custom` (or left empty). Custom keys unknown to every template follow in
/// their own order. A value fixed by the template is never overridden.
///
/// Keys that only other templates use are dropped on purpose, unlike unknown
/// keys: a `leftcert` or `rightsourceip` left behind by a scenario change
/// would otherwise be written under a scenario that does not expect it.
pub fn merge_template(scenario: Scenario, custom: &ParamMap) -> ParamMap {
    let mut merged = ParamMap::new();
    for (key, fixed) in scenario.template() {
        let value = match fixed {
            Some(fixed) => (*fixed).to_string(),
            None => custom.get(*key).cloned().unwrap_or_default(),
        };
        merged.insert((*key).to_string(), value);
    }
    for (key, value) in custom {
        if merged.contains_key(key)
            || BOOKKEEPING_KEYS.contains(&key.as_str())
            || is_catalog_key(key)
        {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn is_catalog_key(key: &str) -> bool {
    Scenario::ALL
        .iter()
        .any(|scenario| scenario.template().iter().any(|(k, _)| *k == key))
}

/// Verify no record could match two templates.
///
/// Two templates are distinguishable when they fix the same key to different
/// values. Returns the first offending pair otherwise.
pub fn check_templates_distinguishable() -> Result<(), (Scenario, Scenario)> {
    for (idx, first) in Scenario::ALL.iter().enumerate() {
        for second in &Scenario::ALL[idx + 1..] {
            let conflicting = first.template().iter().any(|(key, value)| {
                matches!((value, second.fixed_value(key)), (Some(a), Some(b)) if *a != b)
            });
            if !conflicting {
                return Err((*first, *second));
            }
        }
    }
    Ok(())
}
