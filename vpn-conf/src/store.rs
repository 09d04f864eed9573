//! In-memory model of VPN connections and their secrets.
//!
//! A [`ConnectionStore`] is built from loaded records, mutated by operator
//! actions, and exported back into template-complete records and flat
//! secret lines. Exactly one connection is "current"; most editing
//! operations act on it.

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::firewall;
use crate::scenario::{
    check_templates_distinguishable, classify, extract_specific_params, merge_template, ParamMap,
    Role, Scenario,
};
use crate::secrets::{
    is_gateway_identity, ClientCert, ClientSecret, ClientSecretKind, SecretKind, SecretRecord,
    SecretStore, UserKind,
};

/// Errors returned by store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("the connection name '{0}' is already used")]
    NameAlreadyUsed(String),
    #[error("invalid connection name '{0}': use letters, digits, '_' and '-', not starting with a digit")]
    InvalidName(String),
    #[error("all gateway scenarios are already used; only one gateway connection per scenario is allowed")]
    NoFreeGatewaySlot,
    #[error("scenario {scenario} is already configured by gateway '{occupant}'")]
    ScenarioSlotTaken { scenario: Scenario, occupant: String },
    #[error("cannot find a client certificate connection to gateway '{0}'")]
    CannotFindMatchingClientConnection(String),
    #[error("'{0}' is not a remote gateway: client connections need a concrete address or host name")]
    InvalidRemoteGateway(String),
    #[error("no connection is selected")]
    NoCurrentConnection,
    #[error("invalid user name '{0}': use letters, digits, '_' and '-'")]
    InvalidUsername(String),
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("{kind} user '{username}' already exists")]
    UserAlreadyExists { kind: UserKind, username: String },
}

/// One configured connection.
///
/// `params` holds only the values the operator customized; fixed template
/// values are added back by [`merge_template`] on export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub name: String,
    pub scenario: Scenario,
    pub params: ParamMap,
}

impl Connection {
    fn new(name: &str, scenario: Scenario) -> Self {
        Self {
            name: name.to_string(),
            scenario,
            params: ParamMap::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.scenario.role()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Remote gateway identity of a client connection, if set.
    fn remote_identity(&self) -> Option<&str> {
        self.param("right").filter(|right| !right.is_empty())
    }
}

/// Settings that live outside the connection model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalToggles {
    pub enable_daemon: bool,
    pub reduce_tcp_mss: bool,
}

/// A secret line as loaded, before it is sorted into buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawSecret {
    pub identity: String,
    /// Type tag as found in the file, any case.
    pub kind: String,
    pub secret: String,
}

impl RawSecret {
    pub fn new(identity: &str, kind: &str, secret: &str) -> Self {
        Self {
            identity: identity.to_string(),
            kind: kind.to_string(),
            secret: secret.to_string(),
        }
    }
}

/// What a reload skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub loaded: usize,
    pub unsupported_connections: Vec<String>,
    /// `"<identity> <TYPE>"`, trimmed.
    pub unsupported_secrets: Vec<String>,
}

impl ReloadReport {
    pub fn has_warnings(&self) -> bool {
        !self.unsupported_connections.is_empty() || !self.unsupported_secrets.is_empty()
    }
}

/// Template-complete records plus the blanks that are still unfilled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Export {
    pub records: IndexMap<String, ParamMap>,
    /// Connection name to the parameters whose value is blank.
    pub incomplete: IndexMap<String, Vec<String>>,
}

impl Export {
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty()
    }
}

/// Connections, the selected connection, secrets and global toggles.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStore {
    connections: IndexMap<String, Connection>,
    current: Option<String>,
    secrets: SecretStore,
    toggles: GlobalToggles,
}

impl ConnectionStore {
    pub fn new() -> Self {
        debug_assert!(
            check_templates_distinguishable().is_ok(),
            "scenario templates must be pairwise distinguishable"
        );
        Self::default()
    }

    /// Replace connections and secrets with freshly loaded ones.
    ///
    /// Records that match no scenario and secrets of unknown types are left
    /// out and listed in the returned report. Toggles are not touched.
    pub fn reload(&mut self, records: &[(String, ParamMap)], secrets: &[RawSecret]) -> ReloadReport {
        let mut report = ReloadReport::default();
        self.connections.clear();
        self.secrets = SecretStore::default();

        for (name, record) in records {
            let Some(scenario) = classify(record) else {
                debug!(connection = %name, "record matches no scenario");
                report.unsupported_connections.push(name.clone());
                continue;
            };
            let conn = Connection {
                name: name.clone(),
                scenario,
                params: extract_specific_params(scenario, record),
            };
            self.connections.insert(name.clone(), conn);
        }
        report.loaded = self.connections.len();

        for raw in secrets {
            let kind = match raw.kind.parse::<SecretKind>() {
                Ok(kind) => kind,
                Err(_) => {
                    let label = format!("{} {}", raw.identity, raw.kind).trim().to_string();
                    debug!(secret = %label, "unsupported secret type");
                    report.unsupported_secrets.push(label);
                    continue;
                }
            };
            let identity = raw.identity.trim();
            match kind {
                SecretKind::Psk if is_gateway_identity(identity) => {
                    self.secrets.gw_psk = raw.secret.clone();
                }
                SecretKind::Rsa if is_gateway_identity(identity) => {
                    self.secrets.gw_rsa = raw.secret.clone();
                }
                _ => {
                    self.secrets
                        .bucket_mut(kind)
                        .insert(identity.to_string(), raw.secret.clone());
                }
            }
        }

        let keep_current = self
            .current
            .as_ref()
            .is_some_and(|name| self.connections.contains_key(name));
        if !keep_current {
            self.current = self.connections.keys().next().cloned();
        }

        info!(
            loaded = report.loaded,
            unsupported_connections = report.unsupported_connections.len(),
            unsupported_secrets = report.unsupported_secrets.len(),
            "reloaded connection store"
        );
        report
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection(&self, name: &str) -> Option<&Connection> {
        self.connections.get(name)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    pub fn toggles(&self) -> GlobalToggles {
        self.toggles
    }

    pub fn set_enable_daemon(&mut self, enabled: bool) {
        self.toggles.enable_daemon = enabled;
    }

    pub fn set_reduce_tcp_mss(&mut self, enabled: bool) {
        self.toggles.reduce_tcp_mss = enabled;
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The selected connection, or `None` when nothing (or an unknown name)
    /// is selected.
    pub fn current(&self) -> Option<&Connection> {
        self.current
            .as_ref()
            .and_then(|name| self.connections.get(name))
    }

    fn current_mut(&mut self) -> Result<&mut Connection, StoreError> {
        let name = self.current.as_ref().ok_or(StoreError::NoCurrentConnection)?;
        self.connections
            .get_mut(name)
            .ok_or(StoreError::NoCurrentConnection)
    }

    /// Names of the connections using `scenario`, in store order.
    pub fn connections_by_scenario(&self, scenario: Scenario) -> Vec<&str> {
        self.connections
            .values()
            .filter(|conn| conn.scenario == scenario)
            .map(|conn| conn.name.as_str())
            .collect()
    }

    fn free_gateway_slot(&self) -> Option<Scenario> {
        Scenario::GATEWAYS
            .into_iter()
            .find(|scenario| self.connections_by_scenario(*scenario).is_empty())
    }

    /// Add an empty connection and select it.
    pub fn create(&mut self, name: &str, role: Role) -> Result<(), StoreError> {
        if !is_valid_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        if self.connections.contains_key(name) {
            return Err(StoreError::NameAlreadyUsed(name.to_string()));
        }
        let scenario = match role {
            Role::Client => Scenario::ClientPsk,
            Role::Gateway if self.connections_by_scenario(Scenario::GwPsk).is_empty() => {
                Scenario::GwPsk
            }
            Role::Gateway => self.free_gateway_slot().ok_or(StoreError::NoFreeGatewaySlot)?,
        };
        self.connections
            .insert(name.to_string(), Connection::new(name, scenario));
        self.current = Some(name.to_string());
        info!(connection = name, %scenario, "created connection");
        Ok(())
    }

    /// Select a connection. Unknown names are accepted; [`Self::current`]
    /// then returns `None`.
    pub fn switch(&mut self, name: &str) {
        self.current = Some(name.to_string());
    }

    /// Turn the current connection into a gateway or a client.
    pub fn change_role(&mut self, role: Role) -> Result<(), StoreError> {
        let current_role = self.current_mut()?.role();
        if current_role == role {
            return Ok(());
        }
        let scenario = match role {
            Role::Gateway => self.free_gateway_slot().ok_or(StoreError::NoFreeGatewaySlot)?,
            Role::Client => Scenario::ClientPsk,
        };
        let conn = self.current_mut()?;
        debug!(connection = %conn.name, from = %conn.scenario, to = %scenario, "changed role");
        conn.scenario = scenario;
        Ok(())
    }

    /// Move the current connection to another scenario, keeping its params.
    pub fn change_scenario(&mut self, scenario: Scenario) -> Result<(), StoreError> {
        let name = self.current_mut()?.name.clone();
        if scenario.role() == Role::Gateway {
            if let Some(occupant) = self
                .connections_by_scenario(scenario)
                .into_iter()
                .find(|occupant| *occupant != name)
            {
                return Err(StoreError::ScenarioSlotTaken {
                    scenario,
                    occupant: occupant.to_string(),
                });
            }
        }
        let conn = self.current_mut()?;
        debug!(connection = %conn.name, from = %conn.scenario, to = %scenario, "changed scenario");
        conn.scenario = scenario;
        Ok(())
    }

    /// Set (`Some`) or remove (`None`) a parameter of the current connection.
    ///
    /// Changing `right` on a client connection moves its secret to the new
    /// gateway identity first. A client `right` may not be blank or `%any`,
    /// since secrets under those identities belong to the gateway side.
    pub fn set_param(&mut self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        let conn = self.current_mut()?;
        let scenario = conn.scenario;
        let old_right = conn.param("right").map(str::to_string);

        if key == "right" && client_secret_bucket(scenario).is_some() {
            if let Some(value) = value.filter(|value| is_gateway_identity(value.trim())) {
                return Err(StoreError::InvalidRemoteGateway(value.to_string()));
            }
        }

        if key == "right" {
            if let (Some(kind), Some(old), Some(new)) =
                (client_secret_bucket(scenario), old_right.as_deref(), value)
            {
                if old != new {
                    self.migrate_secret(kind, old, new);
                }
            }
        }

        let conn = self.current_mut()?;
        match value {
            Some(value) => {
                conn.params.insert(key.to_string(), value.to_string());
            }
            None => {
                conn.params.shift_remove(key);
            }
        }
        Ok(())
    }

    fn migrate_secret(&mut self, kind: SecretKind, from: &str, to: &str) {
        if let Some(secret) = self.secrets.remove(kind, from) {
            info!(%kind, from, to, "moved client secret to new gateway identity");
            self.secrets.bucket_mut(kind).insert(to.to_string(), secret);
        }
    }

    /// Delete the current connection together with its client secret.
    ///
    /// Gateway secrets and user buckets are shared and stay in place.
    pub fn delete(&mut self) -> Result<(), StoreError> {
        let conn = self.current_mut()?;
        let name = conn.name.clone();
        let owned = client_secret_bucket(conn.scenario)
            .zip(conn.remote_identity().map(str::to_string));

        if let Some((kind, identity)) = owned {
            if self.secrets.remove(kind, &identity).is_some() {
                debug!(%kind, identity = %identity, "removed client secret");
            }
        }
        self.connections.shift_remove(&name);
        self.current = self.connections.keys().next().cloned();
        info!(connection = %name, "deleted connection");
        Ok(())
    }

    /// Gateway identity to secret for every client connection of `kind`.
    ///
    /// Connections without a stored secret appear with a blank one. Secrets
    /// that no connection refers to are not returned.
    pub fn client_secrets(&self, kind: ClientSecretKind) -> IndexMap<String, ClientSecret> {
        let scenario = match kind {
            ClientSecretKind::Psk => Scenario::ClientPsk,
            ClientSecretKind::Cert => Scenario::ClientCert,
        };
        self.connections
            .values()
            .filter(|conn| conn.scenario == scenario)
            .filter_map(|conn| conn.remote_identity().map(|right| (conn, right)))
            .map(|(conn, right)| {
                let secret = match kind {
                    ClientSecretKind::Psk => ClientSecret::Psk(
                        self.secrets.psk.get(right).cloned().unwrap_or_default(),
                    ),
                    ClientSecretKind::Cert => ClientSecret::Cert(ClientCert {
                        cert: conn.param("leftcert").unwrap_or_default().to_string(),
                        key: self.secrets.rsa.get(right).cloned().unwrap_or_default(),
                    }),
                };
                (right.to_string(), secret)
            })
            .collect()
    }

    pub fn set_client_psk(&mut self, gateway: &str, psk: &str) -> Result<(), StoreError> {
        if is_gateway_identity(gateway.trim()) {
            return Err(StoreError::InvalidRemoteGateway(gateway.to_string()));
        }
        self.secrets.psk.insert(gateway.to_string(), psk.to_string());
        Ok(())
    }

    /// Attach a certificate and key to the client connection for `gateway`.
    pub fn set_client_cert(&mut self, gateway: &str, cert: &str, key: &str) -> Result<(), StoreError> {
        if is_gateway_identity(gateway.trim()) {
            return Err(StoreError::InvalidRemoteGateway(gateway.to_string()));
        }
        let conn = self
            .connections
            .values_mut()
            .find(|conn| conn.scenario == Scenario::ClientCert && conn.param("right") == Some(gateway))
            .ok_or_else(|| StoreError::CannotFindMatchingClientConnection(gateway.to_string()))?;
        conn.params.insert("leftcert".to_string(), cert.to_string());
        conn.params.insert("rightcert".to_string(), cert.to_string());
        self.secrets.rsa.insert(gateway.to_string(), key.to_string());
        Ok(())
    }

    pub fn set_gateway_psk(&mut self, psk: &str) {
        self.secrets.gw_psk = psk.to_string();
    }

    /// Certificate of the certificate-based gateway and the gateway key.
    pub fn gateway_cert_and_key(&self) -> Option<(String, String)> {
        let name = [Scenario::GwCert, Scenario::GwWin]
            .into_iter()
            .find_map(|scenario| self.connections_by_scenario(scenario).first().copied())?;
        let cert = self
            .connections
            .get(name)
            .and_then(|conn| conn.param("leftcert"))
            .unwrap_or_default()
            .to_string();
        Some((cert, self.secrets.gw_rsa.clone()))
    }

    /// Install a gateway certificate on every certificate-based gateway.
    pub fn set_gateway_cert(&mut self, cert: &str, key: &str) {
        for conn in self.connections.values_mut() {
            match conn.scenario {
                Scenario::GwCert => {
                    conn.params.insert("leftcert".to_string(), cert.to_string());
                    conn.params.insert("rightcert".to_string(), cert.to_string());
                }
                Scenario::GwWin => {
                    conn.params.insert("leftcert".to_string(), cert.to_string());
                }
                _ => {}
            }
        }
        self.secrets.gw_rsa = key.to_string();
    }

    /// Add an XAuth or EAP user.
    pub fn add_user(&mut self, kind: UserKind, username: &str, password: &str) -> Result<(), StoreError> {
        let username = username.trim();
        if !is_valid_username(username) {
            return Err(StoreError::InvalidUsername(username.to_string()));
        }
        if password.is_empty() {
            return Err(StoreError::EmptyPassword);
        }
        let users = self.secrets.users_mut(kind);
        if users.contains_key(username) {
            return Err(StoreError::UserAlreadyExists {
                kind,
                username: username.to_string(),
            });
        }
        users.insert(username.to_string(), password.to_string());
        Ok(())
    }

    /// Remove a user. Returns whether it existed.
    pub fn delete_user(&mut self, kind: UserKind, username: &str) -> bool {
        self.secrets.users_mut(kind).shift_remove(username).is_some()
    }

    /// Keyed client secrets no connection refers to.
    pub fn dangling_secrets(&self) -> Vec<(SecretKind, String)> {
        let mut out = Vec::new();
        for (kind, scenario) in [
            (SecretKind::Psk, Scenario::ClientPsk),
            (SecretKind::Rsa, Scenario::ClientCert),
        ] {
            for identity in self.secrets.bucket(kind).keys() {
                let owned = self.connections.values().any(|conn| {
                    conn.scenario == scenario && conn.param("right") == Some(identity.as_str())
                });
                if !owned {
                    out.push((kind, identity.clone()));
                }
            }
        }
        out
    }

    /// Merge every connection into its template and collect unfilled blanks.
    pub fn export(&self) -> Export {
        let mut export = Export::default();
        for conn in self.connections.values() {
            let merged = merge_template(conn.scenario, &conn.params);
            let blanks: Vec<String> = merged
                .iter()
                .filter(|(_, value)| value.trim().is_empty())
                .map(|(key, _)| key.clone())
                .collect();
            if !blanks.is_empty() {
                export.incomplete.insert(conn.name.clone(), blanks);
            }
            export.records.insert(conn.name.clone(), merged);
        }
        export
    }

    pub fn export_secrets(&self) -> Vec<SecretRecord> {
        self.secrets.records()
    }

    pub fn derive_firewall_rules(&self) -> Vec<String> {
        firewall::derive_rules(self.connections.values(), self.toggles.reduce_tcp_mss)
    }
}

/// Bucket holding the secret of a client connection in `scenario`.
fn client_secret_bucket(scenario: Scenario) -> Option<SecretKind> {
    match scenario {
        Scenario::ClientPsk => Some(SecretKind::Psk),
        Scenario::ClientCert => Some(SecretKind::Rsa),
        _ => None,
    }
}

/// Connection names: a letter, `_` or `-`, then letters, digits, `_` or `-`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '-' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
