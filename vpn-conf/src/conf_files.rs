//! Translation between parsed strongSwan files and the connection store.

use std::path::Path;

use ipsec_flatfile::{
    parse_conf_file, parse_secrets_file, ConfDocument, ConfSection, ParseError, SecretEntry,
    SecretsDocument,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::scenario::ParamMap;
use crate::secrets::SecretRecord;
use crate::store::{ConnectionStore, Export, RawSecret, ReloadReport};

/// Section name holding defaults for every connection. Not managed here.
const DEFAULT_CONN: &str = "%default";

/// Connection records and raw secrets extracted from the two files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadedConfig {
    pub connections: Vec<(String, ParamMap)>,
    pub secrets: Vec<RawSecret>,
    /// Headers of sections (and top-level directives) this tool does not manage.
    pub unsupported_sections: Vec<String>,
}

/// Everything that will be lost when the files are written back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadWarnings {
    pub unsupported_sections: Vec<String>,
    pub unsupported_connections: Vec<String>,
    pub unsupported_secrets: Vec<String>,
}

impl LoadWarnings {
    pub fn is_empty(&self) -> bool {
        self.unsupported_sections.is_empty()
            && self.unsupported_connections.is_empty()
            && self.unsupported_secrets.is_empty()
    }

    fn from_parts(loaded: &LoadedConfig, report: ReloadReport) -> Self {
        Self {
            unsupported_sections: loaded.unsupported_sections.clone(),
            unsupported_connections: report.unsupported_connections,
            unsupported_secrets: report.unsupported_secrets,
        }
    }
}

/// Split parsed documents into connection records and raw secrets.
pub fn load(conf: &ConfDocument, secrets: &SecretsDocument) -> LoadedConfig {
    let mut loaded = LoadedConfig {
        unsupported_sections: conf.directives.clone(),
        ..LoadedConfig::default()
    };

    for section in &conf.sections {
        if section.kind() != "conn" || section.name() == DEFAULT_CONN || section.name().is_empty() {
            debug!(header = %section.header, "skipping unmanaged section");
            loaded.unsupported_sections.push(section.header.clone());
            continue;
        }
        let record: ParamMap = section
            .params
            .iter()
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();
        loaded
            .connections
            .push((section.name().to_string(), record));
    }

    for entry in &secrets.entries {
        loaded.secrets.push(RawSecret {
            identity: entry.selectors.trim().to_string(),
            kind: entry.kind().to_string(),
            secret: entry.payload().replace('"', ""),
        });
    }
    if !secrets.directives.is_empty() {
        warn!(
            count = secrets.directives.len(),
            "include directives in the secrets file are not preserved"
        );
    }

    loaded
}

/// Render exported records as `conn` sections in connection order.
pub fn to_conf_document(export: &Export) -> ConfDocument {
    let sections = export
        .records
        .iter()
        .map(|(name, record)| {
            let mut section = ConfSection::conn(name);
            for (key, value) in record {
                section.push(key.as_str(), value.as_str());
            }
            section
        })
        .collect();
    ConfDocument {
        directives: Vec::new(),
        sections,
    }
}

/// Render secret records as `identity : TYPE secret` lines.
pub fn to_secrets_document(records: &[SecretRecord]) -> SecretsDocument {
    SecretsDocument {
        directives: Vec::new(),
        entries: records
            .iter()
            .map(|record| SecretEntry::new(record.identity.as_str(), record.file_value()))
            .collect(),
    }
}

/// Read both files. A file that does not exist reads as an empty document.
pub fn read_files(
    conf_path: &Path,
    secrets_path: &Path,
) -> Result<(ConfDocument, SecretsDocument), ParseError> {
    let conf = if conf_path.exists() {
        parse_conf_file(conf_path)?
    } else {
        debug!(path = %conf_path.display(), "configuration file missing, starting empty");
        ConfDocument::default()
    };
    let secrets = if secrets_path.exists() {
        parse_secrets_file(secrets_path)?
    } else {
        debug!(path = %secrets_path.display(), "secrets file missing, starting empty");
        SecretsDocument::default()
    };
    Ok((conf, secrets))
}

/// Build a store from parsed documents.
pub fn build_store(conf: &ConfDocument, secrets: &SecretsDocument) -> (ConnectionStore, LoadWarnings) {
    let loaded = load(conf, secrets);
    let mut store = ConnectionStore::new();
    let report = store.reload(&loaded.connections, &loaded.secrets);
    let warnings = LoadWarnings::from_parts(&loaded, report);
    for header in &warnings.unsupported_sections {
        info!(section = %header, "unsupported section will not be managed");
    }
    for name in &warnings.unsupported_connections {
        info!(connection = %name, "connection matches no supported scenario");
    }
    for label in &warnings.unsupported_secrets {
        info!(secret = %label, "unsupported secret type");
    }
    (store, warnings)
}

/// Read both files and build a store from them.
pub fn load_store(
    conf_path: &Path,
    secrets_path: &Path,
) -> Result<(ConnectionStore, LoadWarnings), ParseError> {
    let (conf, secrets) = read_files(conf_path, secrets_path)?;
    Ok(build_store(&conf, &secrets))
}
