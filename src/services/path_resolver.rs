//! Confinement of client-supplied paths to the root boundary.
//!
//! Resolution happens in two stages. The raw input is first normalized
//! lexically (`.` and `..` collapsed, absolute components rejected), then the
//! joined path is canonicalized so symlinks are followed and the real target is
//! checked against the canonical root.
//!
//! Case sensitivity is whatever the host filesystem does: on a
//! case-insensitive volume `Docs` and `docs` resolve to the same entry.

use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    /// The path leaves the root, lexically or through a symlink.
    #[error("path traversal rejected")]
    PathTraversal,

    #[error("invalid path: {0}")]
    InvalidInput(&'static str),

    /// Canonicalization failed for a reason other than a missing leaf.
    #[error("path resolution failed: {0}")]
    Io(#[from] io::Error),
}

/// A path proven to lie inside the root boundary at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: PathBuf,
    exists: bool,
}

impl ResolvedPath {
    /// Canonical absolute path. Missing trailing components are appended to
    /// the canonical form of their deepest existing ancestor.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Lexically normalized path relative to the root.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Whether the target existed when it was resolved.
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: Arc<Path>,
}

/// Collapses `.` and `..` without touching the filesystem.
fn normalize(raw: &str) -> Result<PathBuf, PathError> {
    if raw.contains('\0') {
        return Err(PathError::InvalidInput("path contains a null byte"));
    }

    let mut parts: Vec<&OsStr> = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(PathError::PathTraversal);
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(PathError::PathTraversal),
        }
    }

    Ok(parts.iter().collect())
}

impl PathResolver {
    /// Creates the root directory if needed and pins its canonical form.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let canonical = std::fs::canonicalize(root.as_ref())?;
        Ok(Self {
            root: Arc::from(canonical),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a canonical path lies inside the root (or is the root).
    ///
    /// `Path::starts_with` compares whole components, so `/srv/data2` is not
    /// inside `/srv/data`.
    pub fn contains(&self, canonical: &Path) -> bool {
        canonical.starts_with(&self.root)
    }

    /// Maps a client path to an absolute path inside the root.
    ///
    /// Blocking: performs `canonicalize` calls.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath, PathError> {
        let relative = normalize(raw).inspect_err(|e| {
            tracing::warn!("Rejected path {:?}: {}", raw, e);
        })?;
        let joined = self.root.join(&relative);

        let mut existing: &Path = &joined;
        let mut pending: Vec<&OsStr> = Vec::new();
        let base = loop {
            match std::fs::canonicalize(existing) {
                Ok(canonical) => break canonical,
                Err(e) if e.kind() == io::ErrorKind::NotFound && existing != &*self.root => {
                    match (existing.parent(), existing.file_name()) {
                        (Some(parent), Some(name)) => {
                            pending.push(name);
                            existing = parent;
                        }
                        _ => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        let exists = pending.is_empty();
        let mut absolute = base;
        for name in pending.iter().rev() {
            absolute.push(name);
        }

        if !self.contains(&absolute) {
            tracing::warn!(
                "Rejected path {:?}: resolves to {} outside the root",
                raw,
                absolute.display()
            );
            return Err(PathError::PathTraversal);
        }

        Ok(ResolvedPath {
            absolute,
            relative,
            exists,
        })
    }
}
