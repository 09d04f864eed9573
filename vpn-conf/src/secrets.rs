//! Secret buckets keyed by remote identity.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

/// Identity under which gateway-wide secrets are written.
pub const ANY_IDENTITY: &str = "%any";

/// True for identities that select the gateway-wide secret.
pub fn is_gateway_identity(identity: &str) -> bool {
    identity.is_empty() || identity == ANY_IDENTITY
}

/// The four secret types this tool manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretKind {
    Psk,
    Rsa,
    Eap,
    Xauth,
}

impl SecretKind {
    /// Type tag as written in `ipsec.secrets`.
    pub fn file_tag(self) -> &'static str {
        match self {
            SecretKind::Psk => "PSK",
            SecretKind::Rsa => "RSA",
            SecretKind::Eap => "EAP",
            SecretKind::Xauth => "XAUTH",
        }
    }
}

impl Display for SecretKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_tag())
    }
}

impl FromStr for SecretKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "psk" => Ok(SecretKind::Psk),
            "rsa" => Ok(SecretKind::Rsa),
            "eap" => Ok(SecretKind::Eap),
            "xauth" => Ok(SecretKind::Xauth),
            _ => Err(format!("unsupported secret type '{s}'")),
        }
    }
}

/// Username/password bucket selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    Xauth,
    Eap,
}

impl Display for UserKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UserKind::Xauth => f.write_str("xauth"),
            UserKind::Eap => f.write_str("eap"),
        }
    }
}

/// Secret bucket selector for client connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientSecretKind {
    Psk,
    Cert,
}

/// Certificate path paired with its private key path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientCert {
    pub cert: String,
    pub key: String,
}

/// Secret material of one client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ClientSecret {
    Psk(String),
    Cert(ClientCert),
}

impl ClientSecret {
    /// True when no secret material is configured.
    pub fn is_blank(&self) -> bool {
        match self {
            ClientSecret::Psk(psk) => psk.trim().is_empty(),
            ClientSecret::Cert(bundle) => bundle.key.trim().is_empty(),
        }
    }
}

/// All secrets known to a store.
///
/// `psk` and `rsa` hold per-identity client secrets; the gateway side keeps a
/// single scalar for each. `xauth` and `eap` map usernames to passwords.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecretStore {
    pub xauth: IndexMap<String, String>,
    pub eap: IndexMap<String, String>,
    pub psk: IndexMap<String, String>,
    pub rsa: IndexMap<String, String>,
    pub gw_psk: String,
    pub gw_rsa: String,
}

impl SecretStore {
    pub fn bucket(&self, kind: SecretKind) -> &IndexMap<String, String> {
        match kind {
            SecretKind::Psk => &self.psk,
            SecretKind::Rsa => &self.rsa,
            SecretKind::Eap => &self.eap,
            SecretKind::Xauth => &self.xauth,
        }
    }

    pub fn bucket_mut(&mut self, kind: SecretKind) -> &mut IndexMap<String, String> {
        match kind {
            SecretKind::Psk => &mut self.psk,
            SecretKind::Rsa => &mut self.rsa,
            SecretKind::Eap => &mut self.eap,
            SecretKind::Xauth => &mut self.xauth,
        }
    }

    pub fn users(&self, kind: UserKind) -> &IndexMap<String, String> {
        match kind {
            UserKind::Xauth => &self.xauth,
            UserKind::Eap => &self.eap,
        }
    }

    pub fn users_mut(&mut self, kind: UserKind) -> &mut IndexMap<String, String> {
        match kind {
            UserKind::Xauth => &mut self.xauth,
            UserKind::Eap => &mut self.eap,
        }
    }

    /// Remove a keyed secret, keeping the order of the others.
    pub fn remove(&mut self, kind: SecretKind, identity: &str) -> Option<String> {
        self.bucket_mut(kind).shift_remove(identity)
    }

    /// Flatten into records: psk, rsa, eap, xauth, gateway scalars first.
    ///
    /// Keyed psk and rsa entries under a gateway identity are skipped; only
    /// the gateway scalar is written for those.
    pub fn records(&self) -> Vec<SecretRecord> {
        let mut out = Vec::new();
        for (kind, scalar) in [
            (SecretKind::Psk, &self.gw_psk),
            (SecretKind::Rsa, &self.gw_rsa),
        ] {
            if !scalar.is_empty() {
                out.push(SecretRecord::new(kind, ANY_IDENTITY, scalar));
            }
            for (identity, secret) in self.bucket(kind) {
                if !is_gateway_identity(identity) {
                    out.push(SecretRecord::new(kind, identity, secret));
                }
            }
        }
        for kind in [SecretKind::Eap, SecretKind::Xauth] {
            for (identity, secret) in self.bucket(kind) {
                out.push(SecretRecord::new(kind, identity, secret));
            }
        }
        out
    }
}

/// One exported secret line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretRecord {
    pub kind: SecretKind,
    pub identity: String,
    pub secret: String,
}

impl SecretRecord {
    pub fn new(kind: SecretKind, identity: &str, secret: &str) -> Self {
        Self {
            kind,
            identity: identity.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Value part of the secrets line. RSA key paths stay unquoted.
    pub fn file_value(&self) -> String {
        match self.kind {
            SecretKind::Rsa => format!("{} {}", self.kind.file_tag(), self.secret),
            _ => format!("{} \"{}\"", self.kind.file_tag(), self.secret),
        }
    }
}
