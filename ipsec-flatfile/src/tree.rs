use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// A parsed `ipsec.conf` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfDocument {
    /// Top-level `include`/`version` lines, kept verbatim.
    pub directives: Vec<String>,
    /// Sections in file order.
    pub sections: Vec<ConfSection>,
}

impl ConfDocument {
    /// Return the first section with the provided header.
    pub fn get_section(&self, header: &str) -> Option<&ConfSection> {
        self.sections.iter().find(|section| section.header == header)
    }

    /// Return all sections of the provided kind (`conn`, `ca`, `config`).
    pub fn sections_of_kind(&self, kind: &str) -> Vec<&ConfSection> {
        self.sections
            .iter()
            .filter(|section| section.kind() == kind)
            .collect()
    }
}

/// One `ipsec.conf` section: a header line followed by indented parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfSection {
    /// Full header, for example `conn office` or `config setup`.
    pub header: String,
    /// Parameters in file order.
    pub params: Vec<(String, String)>,
}

impl ConfSection {
    /// Create a section with no parameters.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            params: Vec::new(),
        }
    }

    /// Create a `conn <name>` section.
    pub fn conn(name: &str) -> Self {
        Self::new(format!("conn {name}"))
    }

    /// First word of the header.
    pub fn kind(&self) -> &str {
        self.header.split_whitespace().next().unwrap_or("")
    }

    /// Header remainder after the kind, empty when absent.
    pub fn name(&self) -> &str {
        self.header
            .split_once(' ')
            .map(|(_, name)| name.trim())
            .unwrap_or("")
    }

    /// Return the value of the last parameter named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Append a parameter.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.push((key.into(), value.into()));
    }
}

impl Display for ConfSection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        for (key, value) in &self.params {
            writeln!(f, "\t{}={}", key, quote_if_needed(value))?;
        }
        Ok(())
    }
}

/// A parsed `ipsec.secrets` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecretsDocument {
    /// Top-level `include` lines, kept verbatim.
    pub directives: Vec<String>,
    /// Secret entries in file order.
    pub entries: Vec<SecretEntry>,
}

/// One `selectors : TYPE secret` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretEntry {
    /// Identity selectors left of the separator, possibly empty.
    pub selectors: String,
    /// Everything right of the separator, for example `PSK "secret"`.
    pub value: String,
}

impl SecretEntry {
    pub fn new(selectors: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            selectors: selectors.into(),
            value: value.into(),
        }
    }

    /// Secret type token, as written in the file.
    pub fn kind(&self) -> &str {
        self.value.split_whitespace().next().unwrap_or("")
    }

    /// Raw secret text following the type token.
    pub fn payload(&self) -> &str {
        let trimmed = self.value.trim_start();
        match trimmed.split_once(char::is_whitespace) {
            Some((_, rest)) => rest.trim(),
            None => "",
        }
    }
}

impl Display for SecretEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.selectors.is_empty() {
            write!(f, ": {}", self.value)
        } else {
            write!(f, "{} : {}", self.selectors, self.value)
        }
    }
}

pub(crate) fn quote_if_needed(value: &str) -> String {
    if value.chars().any(|c| c.is_whitespace() || c == '#') {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfSection, SecretEntry};

    #[test]
    fn section_kind_and_name_split_header() {
        let section = ConfSection::new("conn  road warrior");
        assert_eq!(section.kind(), "conn");
        assert_eq!(section.name(), "road warrior");

        let setup = ConfSection::new("config setup");
        assert_eq!(setup.kind(), "config");
        assert_eq!(setup.name(), "setup");
    }

    #[test]
    fn section_get_prefers_last_occurrence() {
        let mut section = ConfSection::conn("office");
        section.push("right", "10.0.0.1");
        section.push("right", "10.0.0.2");
        assert_eq!(section.get("right"), Some("10.0.0.2"));
        assert_eq!(section.get("left"), None);
    }

    #[test]
    fn section_display_quotes_values_with_spaces() {
        let mut section = ConfSection::new("config setup");
        section.push("charondebug", "ike 2, knl 1");
        assert_eq!(
            section.to_string(),
            "config setup\n\tcharondebug=\"ike 2, knl 1\"\n"
        );
    }

    #[test]
    fn secret_entry_splits_kind_and_payload() {
        let entry = SecretEntry::new("%any 25.52.34.34", "PSK \"test 123\"");
        assert_eq!(entry.kind(), "PSK");
        assert_eq!(entry.payload(), "\"test 123\"");
        assert_eq!(entry.to_string(), "%any 25.52.34.34 : PSK \"test 123\"");

        let bare = SecretEntry::new("", "RSA /key.pem");
        assert_eq!(bare.to_string(), ": RSA /key.pem");
    }
}
