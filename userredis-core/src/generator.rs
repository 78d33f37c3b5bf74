//! Writes a user's `redis.conf` and applies the ownership policy.
//!
//! | path                        | owner            | mode |
//! |-----------------------------|------------------|------|
//! | `<home>/<user>/redis/`      | user (first creation only) | 0750 |
//! | `<home>/<user>/redis/redis.conf` | privileged identity | 0644 |
//!
//! The user's Redis runs as the user: it can read its config and create its
//! socket in the directory, but cannot rewrite the config.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{io_err, CoreError};
use crate::layout::InstanceLayout;
use crate::packages::PackageStore;
use crate::render::ConfigRenderer;
use crate::types::{PackageName, Username};
use crate::write::{atomic_write, set_mode};

const CONF_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o750;

/// Changes owner and group of a path to the named account
/// (group = the account's primary group).
pub trait Ownership: Send + Sync {
    fn chown(&self, path: &Path, account: &str) -> Result<(), CoreError>;
}

/// What [`ConfigGenerator::generate`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedConfig {
    pub path: PathBuf,
    /// Package the content actually came from.
    pub package: PackageName,
    pub fell_back: bool,
    /// True when this call created the instance directory.
    pub created_dir: bool,
}

pub struct ConfigGenerator {
    home_root: PathBuf,
    privileged_user: String,
    store: PackageStore,
    renderer: ConfigRenderer,
    ownership: Arc<dyn Ownership>,
}

impl ConfigGenerator {
    pub fn new(
        home_root: impl Into<PathBuf>,
        privileged_user: impl Into<String>,
        store: PackageStore,
        ownership: Arc<dyn Ownership>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            home_root: home_root.into(),
            privileged_user: privileged_user.into(),
            store,
            renderer: ConfigRenderer::new()?,
            ownership,
        })
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    pub fn layout(&self, user: &Username) -> InstanceLayout {
        InstanceLayout::for_user(&self.home_root, user)
    }

    /// Generate `user`'s config from `package` (falling back to `default`).
    ///
    /// Overwrites any previous config. Fails if the instance directory cannot
    /// be created or no package content (not even `default`) exists.
    pub fn generate(&self, user: &Username, package: &str) -> Result<GeneratedConfig, CoreError> {
        let layout = self.layout(user);
        let created_dir = self.ensure_instance_dir(&layout, user)?;

        let resolved = self.store.resolve(package)?;
        let content = self.renderer.render(&layout, &resolved.content)?;

        atomic_write(&layout.conf, &content, CONF_MODE, |tmp| {
            self.ownership.chown(tmp, &self.privileged_user)
        })?;

        tracing::info!(
            user = %user,
            package = %resolved.name,
            fell_back = resolved.fell_back,
            "generated redis config"
        );
        Ok(GeneratedConfig {
            path: layout.conf,
            package: resolved.name,
            fell_back: resolved.fell_back,
            created_dir,
        })
    }

    /// Create the instance directory owned by `user`. An existing directory is
    /// left exactly as it is.
    fn ensure_instance_dir(&self, layout: &InstanceLayout, user: &Username) -> Result<bool, CoreError> {
        match std::fs::symlink_metadata(&layout.dir) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(CoreError::UnsafeInstanceDir {
                    path: layout.dir.clone(),
                })
            }
            Ok(meta) if meta.is_dir() => return Ok(false),
            _ => {}
        }
        std::fs::create_dir_all(&layout.dir).map_err(|e| io_err(&layout.dir, e))?;
        let handed_over = set_mode(&layout.dir, DIR_MODE)
            .and_then(|()| self.ownership.chown(&layout.dir, user.as_str()));
        if let Err(err) = handed_over {
            // Ownership is only ever set on creation; leave nothing behind so
            // the next attempt creates the directory again.
            if let Err(cleanup) = std::fs::remove_dir(&layout.dir) {
                tracing::warn!(dir = %layout.dir.display(), error = %cleanup, "could not remove half-created instance directory");
            }
            return Err(err);
        }
        tracing::debug!(user = %user, dir = %layout.dir.display(), "created instance directory");
        Ok(true)
    }
}

impl std::fmt::Debug for ConfigGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigGenerator")
            .field("home_root", &self.home_root)
            .field("privileged_user", &self.privileged_user)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
