//! Containment check for folder paths handed to tool servers.

use std::path::{Component, Path, PathBuf};

use crate::error::ConfigError;

/// Set of allowed base directories. Empty means nothing is allowed.
#[derive(Debug, Clone, Default)]
pub struct PathSandbox {
    bases: Vec<PathBuf>,
}

impl PathSandbox {
    /// Bases are canonicalized when they exist so symlinked roots compare
    /// correctly against canonicalized candidates.
    pub fn new(bases: impl IntoIterator<Item = PathBuf>) -> Self {
        let bases = bases
            .into_iter()
            .filter(|b| !b.as_os_str().is_empty())
            .map(|b| b.canonicalize().unwrap_or(b))
            .collect();
        Self { bases }
    }

    /// Build from the values of the named variables; unset or empty ones are
    /// skipped.
    pub fn from_env_names<F>(names: &[String], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let bases: Vec<PathBuf> = names
            .iter()
            .filter_map(|name| lookup(name))
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .collect();
        if bases.is_empty() {
            tracing::warn!(?names, "no sandbox data directories are set; folder paths will be rejected");
        }
        Self::new(bases)
    }

    pub fn bases(&self) -> &[PathBuf] {
        &self.bases
    }

    /// Validate that `path` is absolute, free of `..`, and resolves inside
    /// one of the bases. Returns the resolved path.
    pub fn check(&self, path: &Path) -> Result<PathBuf, ConfigError> {
        if self.bases.is_empty() {
            return Err(ConfigError::NoSandboxBases);
        }
        if !path.is_absolute() {
            return Err(ConfigError::InvalidPath {
                path: path.to_path_buf(),
                reason: "path must be absolute".into(),
            });
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(ConfigError::InvalidPath {
                path: path.to_path_buf(),
                reason: "path must not contain '..' components".into(),
            });
        }

        let resolved = resolve_existing_prefix(path).map_err(|e| ConfigError::InvalidPath {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if self.bases.iter().any(|base| resolved.starts_with(base)) {
            Ok(resolved)
        } else {
            Err(ConfigError::OutsideSandbox {
                path: path.to_path_buf(),
            })
        }
    }
}

/// Canonicalize the longest existing ancestor of `path` and re-append the
/// components that do not exist yet.
fn resolve_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        return path.canonicalize();
    }

    let mut existing = path;
    let mut tail = Vec::new();
    while !existing.exists() {
        match existing.parent() {
            Some(parent) => {
                if let Some(name) = existing.file_name() {
                    tail.push(name);
                }
                existing = parent;
            }
            None => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for part in tail.into_iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}
