//! The packages directory.
//!
//! # Storage layout
//!
//! ```text
//! <packages_dir>/
//!   default.conf       (must always exist)
//!   <name>.conf        (one file per package, raw Redis directives)
//!   .<name>.lock       (advisory lock serializing save + fan-out)
//! ```
//!
//! Package content is opaque text: it is never parsed here. A bad directive
//! shows up when Redis starts, not when the package is saved.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::FileExt;

use crate::error::{io_err, CoreError};
use crate::types::PackageName;
use crate::write::atomic_write;

/// Mode of package files on disk.
const PACKAGE_MODE: u32 = 0o644;

/// Seed content for `default.conf` on a fresh install.
pub const DEFAULT_PACKAGE_CONTENT: &str = "maxmemory 128mb\nmaxmemory-policy allkeys-lru\n";

/// Content a user's config is built from, plus the package it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: PackageName,
    pub content: String,
    /// True when the requested package was missing and `default` was used.
    pub fell_back: bool,
}

/// Exclusive hold on one package; released on drop.
#[derive(Debug)]
pub struct PackageLock {
    _file: File,
}

#[derive(Debug, Clone)]
pub struct PackageStore {
    dir: PathBuf,
}

impl PackageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<packages_dir>/<name>.conf` (pure, no I/O).
    pub fn path_for(&self, name: &PackageName) -> PathBuf {
        self.dir.join(name.file_name())
    }

    pub fn exists(&self, name: &PackageName) -> bool {
        self.path_for(name).is_file()
    }

    /// Every `*.conf` in the directory, name → raw content, sorted by name.
    pub fn list(&self) -> Result<BTreeMap<String, String>, CoreError> {
        let mut packages = BTreeMap::new();
        if !self.dir.exists() {
            return Ok(packages);
        }
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("conf") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            packages.insert(stem.to_owned(), content);
        }
        Ok(packages)
    }

    /// Raw content of one package, `None` if the file is absent.
    pub fn load(&self, name: &PackageName) -> Result<Option<String>, CoreError> {
        let path = self.path_for(name);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(path, e)),
        }
    }

    /// Content for a user bound to `requested`, falling back to `default`.
    ///
    /// `requested` comes from the panel's user record, so it is sanitized
    /// here; a name that sanitizes to nothing also falls back.
    /// Returns [`CoreError::DefaultPackageMissing`] if `default.conf` is gone.
    pub fn resolve(&self, requested: &str) -> Result<ResolvedPackage, CoreError> {
        if let Ok(name) = PackageName::sanitize(requested) {
            if let Some(content) = self.load(&name)? {
                return Ok(ResolvedPackage {
                    name,
                    content,
                    fell_back: false,
                });
            }
        }

        let default = PackageName::default_package();
        match self.load(&default)? {
            Some(content) => {
                tracing::debug!(requested, "package not found, using default");
                Ok(ResolvedPackage {
                    name: default,
                    content,
                    fell_back: true,
                })
            }
            None => Err(CoreError::DefaultPackageMissing {
                path: self.path_for(&default),
            }),
        }
    }

    /// Create or overwrite `<name>.conf` with `content`, atomically.
    pub fn save(&self, name: &PackageName, content: &str) -> Result<PathBuf, CoreError> {
        self.ensure_dir()?;
        let path = self.path_for(name);
        atomic_write(&path, content, PACKAGE_MODE, |_| Ok(()))?;
        tracing::info!(package = %name, path = %path.display(), "saved package");
        Ok(path)
    }

    /// Remove `<name>.conf`. Returns whether a file was removed.
    ///
    /// `default` is refused with [`CoreError::ProtectedPackage`]; an absent
    /// file is not an error.
    pub fn delete(&self, name: &PackageName) -> Result<bool, CoreError> {
        if name.is_default() {
            return Err(CoreError::ProtectedPackage {
                name: name.to_string(),
            });
        }
        let path = self.path_for(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(package = %name, "deleted package");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(path, e)),
        }
    }

    /// Block until this process holds the exclusive lock for `name`.
    pub fn lock(&self, name: &PackageName) -> Result<PackageLock, CoreError> {
        self.ensure_dir()?;
        let path = self.dir.join(format!(".{}.lock", name.as_str()));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        file.lock_exclusive().map_err(|e| io_err(&path, e))?;
        Ok(PackageLock { _file: file })
    }

    /// Write `default.conf` with `content` unless it already exists.
    /// Returns whether the file was created.
    pub fn seed_default(&self, content: &str) -> Result<bool, CoreError> {
        let default = PackageName::default_package();
        if self.exists(&default) {
            return Ok(false);
        }
        self.save(&default, content)?;
        Ok(true)
    }

    fn ensure_dir(&self) -> Result<(), CoreError> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
