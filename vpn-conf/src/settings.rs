use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tool settings: where the managed files live and global switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub options: Options,
}

/// Locations of the files written on apply, and of the working copy that
/// edits are staged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub ipsec_conf: PathBuf,
    pub ipsec_secrets: PathBuf,
    pub firewall_script: PathBuf,
    pub applied_rules: PathBuf,
    pub sysctl_conf: PathBuf,
    pub work_dir: PathBuf,
}

impl PathSettings {
    /// Staged copy of `ipsec.conf` that edits go to.
    pub fn staged_conf(&self) -> PathBuf {
        self.work_dir.join("ipsec.conf")
    }

    /// Staged copy of `ipsec.secrets` that edits go to.
    pub fn staged_secrets(&self) -> PathBuf {
        self.work_dir.join("ipsec.secrets")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub enable_daemon: bool,
    pub reduce_tcp_mss: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enable_daemon: true,
            reduce_tcp_mss: false,
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            ipsec_conf: PathBuf::from("/etc/ipsec.conf"),
            ipsec_secrets: PathBuf::from("/etc/ipsec.secrets"),
            firewall_script: PathBuf::from("/etc/vpn-conf/firewall-rules.sh"),
            applied_rules: PathBuf::from("/etc/vpn-conf/firewall-rules.applied"),
            sysctl_conf: PathBuf::from("/etc/sysctl.d/70-vpn-conf.conf"),
            work_dir: PathBuf::from("/var/lib/vpn-conf"),
        }
    }
}

/// Errors returned when loading settings files.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Load settings from a TOML file. Missing keys take their defaults.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.display().to_string(),
        source,
    })?;

    parse_settings(&raw, path.display().to_string())
}

/// Settings shipped with the tool.
pub fn default_settings() -> Settings {
    let embedded = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/settings/default.toml"));
    parse_settings(embedded, "embedded settings".to_string()).unwrap_or_default()
}

fn parse_settings(raw: &str, path: String) -> Result<Settings, SettingsError> {
    toml::from_str(raw).map_err(|source| SettingsError::Parse { path, source })
}

#[cfg(test)]
mod tests {
    use super::{default_settings, load_settings, parse_settings, Settings, SettingsError};
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn loads_partial_settings_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vpn.toml");
        fs::write(
            &path,
            r#"
[paths]
ipsec_conf = "/srv/vpn/ipsec.conf"

[options]
reduce_tcp_mss = true
"#,
        )
        .expect("write settings");

        let settings = load_settings(&path).expect("settings should parse");
        assert_eq!(settings.paths.ipsec_conf, PathBuf::from("/srv/vpn/ipsec.conf"));
        assert_eq!(settings.paths.ipsec_secrets, PathBuf::from("/etc/ipsec.secrets"));
        assert_eq!(
            settings.paths.staged_conf(),
            PathBuf::from("/var/lib/vpn-conf/ipsec.conf")
        );
        assert!(settings.options.reduce_tcp_mss);
        assert!(settings.options.enable_daemon);
    }

    #[test]
    fn returns_parse_error_for_invalid_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        fs::write(&path, "paths = [valid").expect("write broken file");

        let err = load_settings(&path).expect_err("should fail parse");
        match err {
            SettingsError::Parse { .. } => {}
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_settings(&PathBuf::from("/nonexistent/vpn-conf.toml"))
            .expect_err("should fail read");
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[test]
    fn embedded_settings_match_defaults() {
        let embedded = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/settings/default.toml"));
        let parsed = parse_settings(embedded, "embedded settings".to_string())
            .expect("embedded settings should parse");
        assert_eq!(parsed, Settings::default());
        assert_eq!(default_settings(), Settings::default());
    }
}
