use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use ipsec_flatfile::{write_conf_file, write_secrets};
use tracing::debug;
use vpn_conf::apply::write_private_file;
use vpn_conf::conf_files::{load_store, to_conf_document, to_secrets_document, LoadWarnings};
use vpn_conf::report::render_load_warnings;
use vpn_conf::settings::{default_settings, load_settings, Settings};
use vpn_conf::store::ConnectionStore;

use crate::cli::GlobalArgs;
use crate::path_guard::same_file;

/// A loaded store plus where it came from.
///
/// Without `--conf`/`--secrets` the session works on the staged copies in
/// the settings' `work_dir`. A staged copy that does not exist yet is seeded
/// from the live file.
pub struct Session {
    pub settings: Settings,
    pub conf_path: PathBuf,
    pub secrets_path: PathBuf,
    pub store: ConnectionStore,
    pub warnings: LoadWarnings,
}

impl Session {
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let settings = match &global.settings {
            Some(path) => load_settings(path)?,
            None => default_settings(),
        };
        let paths = &settings.paths;
        let conf_path = global.conf.clone().unwrap_or_else(|| paths.staged_conf());
        let secrets_path = global
            .secrets
            .clone()
            .unwrap_or_else(|| paths.staged_secrets());
        let conf_source = seed_source(&conf_path, global.conf.is_none(), &paths.ipsec_conf);
        let secrets_source =
            seed_source(&secrets_path, global.secrets.is_none(), &paths.ipsec_secrets);

        let (mut store, warnings) = load_store(conf_source, secrets_source).with_context(|| {
            format!(
                "failed to load {} and {}",
                conf_source.display(),
                secrets_source.display()
            )
        })?;
        store.set_enable_daemon(settings.options.enable_daemon);
        store.set_reduce_tcp_mss(settings.options.reduce_tcp_mss);

        Ok(Self {
            settings,
            conf_path,
            secrets_path,
            store,
            warnings,
        })
    }

    /// Print warnings about content the tool does not manage.
    pub fn report_warnings(&self) {
        if !self.warnings.is_empty() {
            eprintln!("{}", render_load_warnings(&self.warnings));
        }
    }

    /// Make `name` the current connection, failing when it does not exist.
    pub fn select(&mut self, name: &str) -> Result<()> {
        if self.store.connection(name).is_none() {
            bail!("no connection named '{name}'");
        }
        self.store.switch(name);
        Ok(())
    }

    /// Write the store back to the files it is edited in.
    ///
    /// Incomplete connections may be saved to a working copy, never to the
    /// live files the daemon reads. The secrets file is written owner-only.
    pub fn save(&self) -> Result<()> {
        self.report_warnings();
        let export = self.store.export();
        for (name, keys) in &export.incomplete {
            eprintln!(
                "{}",
                format!("warning: connection '{name}' is incomplete, missing {}", keys.join(", "))
                    .yellow()
            );
        }
        if !export.is_complete() {
            self.ensure_not_live(&self.conf_path)?;
            self.ensure_not_live(&self.secrets_path)?;
        }

        create_parent(&self.conf_path)?;
        write_conf_file(&to_conf_document(&export), &self.conf_path)
            .with_context(|| format!("failed to write {}", self.conf_path.display()))?;
        create_parent(&self.secrets_path)?;
        let secrets = write_secrets(&to_secrets_document(&self.store.export_secrets()));
        write_private_file(&self.secrets_path, &secrets)
            .with_context(|| format!("failed to write {}", self.secrets_path.display()))?;
        Ok(())
    }

    fn ensure_not_live(&self, path: &Path) -> Result<()> {
        let paths = &self.settings.paths;
        for live in [&paths.ipsec_conf, &paths.ipsec_secrets] {
            if same_file(path, live)? {
                bail!(
                    "refusing to write an incomplete configuration to the live file {}: \
                     complete it in a working copy and run apply",
                    path.display()
                );
            }
        }
        Ok(())
    }
}

/// File to load: the staged copy, or the live file while nothing is staged.
fn seed_source<'a>(staged: &'a Path, from_work_dir: bool, live: &'a Path) -> &'a Path {
    if from_work_dir && !staged.exists() {
        debug!(
            staged = %staged.display(),
            live = %live.display(),
            "no working copy yet, reading the live file"
        );
        return live;
    }
    staged
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display())),
        _ => Ok(()),
    }
}
