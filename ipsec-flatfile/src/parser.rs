use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::tree::{ConfDocument, ConfSection, SecretEntry, SecretsDocument};

/// Errors that can occur while parsing strongSwan flat files.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Failed to read input file.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    /// A line could not be interpreted.
    #[error("malformed input at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

fn malformed(line: usize, message: &str) -> ParseError {
    ParseError::Malformed {
        line,
        message: message.to_string(),
    }
}

/// Parse `ipsec.conf` text into a [`ConfDocument`].
pub fn parse_conf(text: &str) -> Result<ConfDocument, ParseError> {
    let mut doc = ConfDocument::default();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw);
        if line.trim().is_empty() {
            continue;
        }

        if !starts_indented(line) {
            let header = normalize_whitespace(line);
            if is_conf_directive(&header) {
                doc.directives.push(header);
            } else {
                doc.sections.push(ConfSection::new(header));
            }
            continue;
        }

        let section = doc
            .sections
            .last_mut()
            .ok_or_else(|| malformed(line_no, "parameter outside of a section"))?;
        let (key, value) = line
            .trim()
            .split_once('=')
            .ok_or_else(|| malformed(line_no, "expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed(line_no, "empty parameter name"));
        }
        section.push(key, unquote(value.trim()));
    }

    Ok(doc)
}

/// Parse an `ipsec.conf` file into a [`ConfDocument`].
pub fn parse_conf_file(path: &Path) -> Result<ConfDocument, ParseError> {
    let text = fs::read_to_string(path)?;
    parse_conf(&text)
}

/// Parse `ipsec.secrets` text into a [`SecretsDocument`].
pub fn parse_secrets(text: &str) -> Result<SecretsDocument, ParseError> {
    let mut doc = SecretsDocument::default();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw);
        if line.trim().is_empty() {
            continue;
        }

        if starts_indented(line) {
            let entry = doc
                .entries
                .last_mut()
                .ok_or_else(|| malformed(line_no, "continuation line without an entry"))?;
            entry.value.push(' ');
            entry.value.push_str(line.trim());
            continue;
        }

        let line = line.trim_end();
        if is_secrets_directive(line) {
            doc.directives.push(normalize_whitespace(line));
            continue;
        }

        let pos = find_separator(line)
            .ok_or_else(|| malformed(line_no, "expected 'selectors : TYPE secret'"))?;
        let selectors = normalize_whitespace(&line[..pos]);
        let value = line[pos + 1..].trim();
        if value.is_empty() {
            return Err(malformed(line_no, "missing secret after ':'"));
        }
        doc.entries.push(SecretEntry::new(selectors, value));
    }

    Ok(doc)
}

/// Parse an `ipsec.secrets` file into a [`SecretsDocument`].
pub fn parse_secrets_file(path: &Path) -> Result<SecretsDocument, ParseError> {
    let text = fs::read_to_string(path)?;
    parse_secrets(&text)
}

/// Drop a trailing `#` comment that is not inside double quotes.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn starts_indented(line: &str) -> bool {
    line.starts_with(char::is_whitespace)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_conf_directive(header: &str) -> bool {
    matches!(header.split(' ').next(), Some("include" | "version"))
}

fn is_secrets_directive(line: &str) -> bool {
    line == "include" || line.starts_with("include ")
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Locate the `:` separating selectors from the secret.
///
/// IPv6 selectors contain bare colons, so the separator must stand alone:
/// at the start of the line or after whitespace, and followed by whitespace
/// or the end of the line.
fn find_separator(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    for (idx, &b) in bytes.iter().enumerate() {
        if b != b':' {
            continue;
        }
        let before_ok = idx == 0 || bytes[idx - 1].is_ascii_whitespace();
        let after_ok = idx + 1 == bytes.len() || bytes[idx + 1].is_ascii_whitespace();
        if before_ok && after_ok {
            return Some(idx);
        }
    }
    None
}
