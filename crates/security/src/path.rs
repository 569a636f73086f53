//! Path validation: filesystem sandboxing to the working root.
//!
//! Every tool resolves the model-supplied path through [`resolve`] before
//! touching the filesystem. Resolution follows symlinks to their real target
//! and compares on path-segment boundaries, so `/work` never admits
//! `/workshop`.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Error returned when path validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("Path '{path}' is outside the working directory")]
    OutsideRoot { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    Canonicalize { path: String, reason: String },

    #[error("Invalid working directory '{path}': {reason}")]
    InvalidRoot { path: String, reason: String },
}

/// The canonical directory all tool operations are confined to.
///
/// Fixed for the process lifetime; clones share the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingRoot {
    path: Arc<Path>,
}

impl WorkingRoot {
    /// Canonicalize `path` and require it to be an existing directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let raw = path.as_ref();
        let canonical = raw.canonicalize().map_err(|e| SandboxError::InvalidRoot {
            path: raw.display().to_string(),
            reason: e.to_string(),
        })?;
        if !canonical.is_dir() {
            return Err(SandboxError::InvalidRoot {
                path: raw.display().to_string(),
                reason: "not a directory".into(),
            });
        }
        Ok(Self {
            path: Arc::from(canonical),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an already-canonical path lies at or below the root.
    pub fn contains(&self, canonical: &Path) -> bool {
        // Path::starts_with compares whole components
        canonical.starts_with(&self.path)
    }

    /// Render a resolved path relative to the root (`.` for the root itself).
    pub fn display_relative(&self, resolved: &Path) -> String {
        match resolved.strip_prefix(&self.path) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".into(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => resolved.display().to_string(),
        }
    }
}

/// Resolve `relative` against `root` and reject any result outside it.
///
/// Targets that don't exist yet (e.g. files about to be written) are resolved
/// by canonicalizing their longest existing ancestor and re-applying the
/// remaining components lexically. Symlinks among those components, including
/// dangling ones, are followed before the containment check.
pub fn resolve(root: &WorkingRoot, relative: &str) -> Result<PathBuf, SandboxError> {
    // An absolute `relative` replaces the root here and is rejected below.
    let joined = root.path().join(relative);

    let resolved = canonicalize_lenient(&joined).map_err(|e| SandboxError::Canonicalize {
        path: relative.to_string(),
        reason: e.to_string(),
    })?;

    if !root.contains(&resolved) {
        tracing::warn!(
            path = %relative,
            resolved = %resolved.display(),
            "Sandbox rejected path outside working root"
        );
        return Err(SandboxError::OutsideRoot {
            path: relative.to_string(),
        });
    }

    Ok(resolved)
}

/// Upper bound on symlinks followed while resolving one path.
const MAX_LINK_HOPS: u32 = 40;

fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    canonicalize_following(path, MAX_LINK_HOPS)
}

fn canonicalize_following(path: &Path, hops: u32) -> io::Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }

    let components: Vec<Component<'_>> = path.components().collect();
    let mut last_err = None;

    for split in (1..components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        let mut base = match prefix.canonicalize() {
            Ok(base) => base,
            Err(e) => {
                last_err = Some(e);
                continue;
            }
        };

        let rest = &components[split..];
        for (i, component) in rest.iter().enumerate() {
            match component {
                Component::Normal(name) => {
                    let candidate = base.join(name);
                    // A dangling link fails canonicalize() but still redirects writes
                    let is_link = std::fs::symlink_metadata(&candidate)
                        .is_ok_and(|m| m.file_type().is_symlink());
                    if !is_link {
                        base = candidate;
                        continue;
                    }
                    if hops == 0 {
                        return Err(io::Error::other("too many levels of symbolic links"));
                    }
                    // Relative targets are relative to the link's directory
                    let mut redirected = base.join(std::fs::read_link(&candidate)?);
                    for tail in &rest[i + 1..] {
                        redirected.push(tail.as_os_str());
                    }
                    return canonicalize_following(&redirected, hops - 1);
                }
                Component::ParentDir => {
                    base.pop();
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        return Ok(base);
    }

    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no existing ancestor")))
}
