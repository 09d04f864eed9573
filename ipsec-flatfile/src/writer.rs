use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::tree::{ConfDocument, SecretsDocument};

/// Errors that can occur while writing strongSwan flat files.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to write output file.
    #[error("failed to write file: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize a [`ConfDocument`] into `ipsec.conf` text.
pub fn write_conf(doc: &ConfDocument) -> String {
    let mut blocks = Vec::with_capacity(doc.sections.len() + 1);
    if !doc.directives.is_empty() {
        let mut block = doc.directives.join("\n");
        block.push('\n');
        blocks.push(block);
    }
    for section in &doc.sections {
        blocks.push(section.to_string());
    }
    blocks.join("\n")
}

/// Serialize a [`ConfDocument`] and write it to `path`.
pub fn write_conf_file(doc: &ConfDocument, path: &Path) -> Result<(), WriteError> {
    fs::write(path, write_conf(doc))?;
    Ok(())
}

/// Serialize a [`SecretsDocument`] into `ipsec.secrets` text.
pub fn write_secrets(doc: &SecretsDocument) -> String {
    let mut out = String::new();
    for directive in &doc.directives {
        out.push_str(directive);
        out.push('\n');
    }
    for entry in &doc.entries {
        out.push_str(&entry.to_string());
        out.push('\n');
    }
    out
}

/// Serialize a [`SecretsDocument`] and write it to `path`.
pub fn write_secrets_file(doc: &SecretsDocument, path: &Path) -> Result<(), WriteError> {
    fs::write(path, write_secrets(doc))?;
    Ok(())
}
