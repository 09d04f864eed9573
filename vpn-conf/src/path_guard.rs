use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Refuse to treat the live filesystem root as an apply target unless allowed.
pub fn ensure_not_system_root(root: &Path, allow_system_root: bool) -> Result<()> {
    let normalized = normalize_for_compare(root)
        .with_context(|| format!("failed to normalize root path {}", root.display()))?;
    if normalized.parent().is_none() && !allow_system_root {
        bail!(
            "refusing to write into the live system at {}: pass --allow-system-root to confirm",
            root.display()
        );
    }
    Ok(())
}

/// Whether two paths name the same file once normalized.
pub fn same_file(first: &Path, second: &Path) -> Result<bool> {
    Ok(normalize_for_compare(first)? == normalize_for_compare(second)?)
}

fn normalize_for_compare(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return path
            .canonicalize()
            .with_context(|| format!("canonicalize {}", path.display()));
    }

    // `..` is not resolved for paths that do not exist yet.
    let base = if path.is_absolute() {
        PathBuf::new()
    } else {
        std::env::current_dir().context("current_dir")?
    };

    Ok(base.join(path))
}
