//! The provisioning service.
//!
//! [`Provisioner`] owns the settings, the config generator and the ports; every
//! user-facing operation and lifecycle hook is a method on it. Operations run
//! to completion synchronously. Admin operations require an [`AdminToken`].

use std::collections::BTreeMap;
use std::sync::Arc;

use userredis_core::types::{MEMORY_UNAVAILABLE, STATUS_INACTIVE};
use userredis_core::{
    ConfigGenerator, CoreError, GeneratedConfig, InstanceInfo, InstanceLayout, PackageName,
    PackageStore, Settings, Username, DEFAULT_PACKAGE,
};

use crate::auth::AdminToken;
use crate::error::{io_err, ProvisionError};
use crate::ports::{Ports, RedisProbe, ServiceAction, ServiceControl, UserDirectory};
use crate::system::parse_used_memory_human;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of regenerating every user bound to one package.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOutReport {
    pub regenerated: Vec<Username>,
    /// `(account, error)` for every user whose regeneration failed.
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub name: PackageName,
    pub fan_out: FanOutReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub name: PackageName,
    /// False when there was no file to remove.
    pub removed: bool,
}

// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

pub struct Provisioner {
    settings: Settings,
    generator: ConfigGenerator,
    services: Arc<dyn ServiceControl>,
    redis: Arc<dyn RedisProbe>,
    users: Arc<dyn UserDirectory>,
}

impl Provisioner {
    pub fn new(settings: Settings, ports: Ports) -> Result<Self, ProvisionError> {
        let store = PackageStore::new(&settings.packages_dir);
        let generator = ConfigGenerator::new(
            &settings.home_root,
            &settings.privileged_user,
            store,
            ports.ownership,
        )?;
        Ok(Self {
            settings,
            generator,
            services: ports.services,
            redis: ports.redis,
            users: ports.users,
        })
    }

    /// Provisioner wired to the real system adapters.
    pub fn system(settings: Settings) -> Result<Self, ProvisionError> {
        let ports = Ports::system(&settings);
        Self::new(settings, ports)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn packages(&self) -> &PackageStore {
        self.generator.store()
    }

    pub fn layout(&self, user: &Username) -> InstanceLayout {
        self.generator.layout(user)
    }

    // -----------------------------------------------------------------------
    // Config generation
    // -----------------------------------------------------------------------

    /// Write `user`'s config from `package`, falling back to `default`.
    pub fn generate_config(
        &self,
        user: &Username,
        package: &str,
    ) -> Result<GeneratedConfig, ProvisionError> {
        Ok(self.generator.generate(user, package)?)
    }

    /// Look up `user`'s bound package in the panel and generate their config.
    /// Returns `None` when the panel does not know the user.
    pub fn provision_user(&self, user: &Username) -> Result<Option<GeneratedConfig>, ProvisionError> {
        match self.users.package_of(user)? {
            Some(package) => Ok(Some(self.generate_config(user, &package)?)),
            None => {
                tracing::info!(user = %user, "user unknown to panel, nothing provisioned");
                Ok(None)
            }
        }
    }

    /// Provision `user` only if their instance directory does not exist yet.
    /// Returns whether a config was generated.
    pub fn ensure_provisioned(&self, user: &Username) -> Result<bool, ProvisionError> {
        if self.layout(user).is_provisioned() {
            return Ok(false);
        }
        Ok(self.provision_user(user)?.is_some())
    }

    // -----------------------------------------------------------------------
    // Service control and status
    // -----------------------------------------------------------------------

    /// Apply `action` to `user`'s unit. A failing service manager call is
    /// logged, not returned: callers cannot tell it from a no-op.
    pub fn control(&self, action: ServiceAction, user: &Username) {
        let unit = self.settings.unit_name(user);
        match self.services.apply(action, &unit) {
            Ok(()) => tracing::info!(user = %user, unit = %unit, action = action.verb(), "service action applied"),
            Err(err) => tracing::warn!(
                user = %user,
                unit = %unit,
                action = action.verb(),
                error = %err,
                "service action failed"
            ),
        }
    }

    /// Status and memory of `user`'s instance. Never fails: an unreachable
    /// service manager reads as `inactive`, an unreachable instance as `N/A`.
    pub fn get_info(&self, user: &Username) -> InstanceInfo {
        let unit = self.settings.unit_name(user);
        let status = self
            .services
            .active_state(&unit)
            .unwrap_or_else(|| STATUS_INACTIVE.to_owned());

        let socket = self.layout(user).socket;
        let memory = self
            .redis
            .info_memory(user, &socket)
            .as_deref()
            .and_then(parse_used_memory_human)
            .unwrap_or_else(|| MEMORY_UNAVAILABLE.to_owned());

        InstanceInfo { status, memory }
    }

    // -----------------------------------------------------------------------
    // Packages (admin)
    // -----------------------------------------------------------------------

    pub fn list_packages(
        &self,
        _token: &AdminToken,
    ) -> Result<BTreeMap<String, String>, ProvisionError> {
        Ok(self.packages().list()?)
    }

    /// Sanitize `raw_name`, write the package, then regenerate every bound user.
    ///
    /// The package lock is held across the write and the sweep. The package is
    /// saved even if listing users afterwards fails; that failure is returned.
    pub fn save_package(
        &self,
        _token: &AdminToken,
        raw_name: &str,
        content: &str,
    ) -> Result<SaveReport, ProvisionError> {
        let name = PackageName::sanitize(raw_name)?;
        let store = self.packages();
        let _lock = store.lock(&name)?;
        store.save(&name, content)?;
        let fan_out = self.fan_out(&name)?;
        Ok(SaveReport { name, fan_out })
    }

    /// Regenerate every user bound to `name` without changing the package.
    /// Used when a package file changed on disk outside of [`Self::save_package`].
    pub fn refresh_package_users(
        &self,
        _token: &AdminToken,
        name: &PackageName,
    ) -> Result<FanOutReport, ProvisionError> {
        let _lock = self.packages().lock(name)?;
        self.fan_out(name)
    }

    /// Remove a package file. `default` is refused; a missing file is a no-op.
    /// Users bound to the package keep their last generated config.
    pub fn delete_package(
        &self,
        _token: &AdminToken,
        raw_name: &str,
    ) -> Result<DeleteOutcome, ProvisionError> {
        if raw_name == DEFAULT_PACKAGE {
            return Err(CoreError::ProtectedPackage {
                name: DEFAULT_PACKAGE.to_owned(),
            }
            .into());
        }
        let name = PackageName::sanitize(raw_name)?;
        let removed = self.packages().delete(&name)?;
        Ok(DeleteOutcome { name, removed })
    }

    /// One isolated regeneration per affected user; failures are collected,
    /// never propagated.
    fn fan_out(&self, name: &PackageName) -> Result<FanOutReport, ProvisionError> {
        let mut report = FanOutReport::default();
        for record in self.users.list_users()? {
            let Some(bound) = record.package.as_deref() else {
                continue;
            };
            if !self.is_bound_to(bound, name) {
                continue;
            }
            let user = match Username::parse(&record.name) {
                Ok(user) => user,
                Err(err) => {
                    tracing::warn!(account = %record.name, error = %err, "skipping account");
                    report.failed.push((record.name, err.to_string()));
                    continue;
                }
            };

            tracing::info!(user = %user, package = %name, "updating redis config after package change");
            match self.generator.generate(&user, bound) {
                Ok(_) => report.regenerated.push(user),
                Err(err) => {
                    tracing::warn!(user = %user, package = %name, error = %err, "regeneration failed");
                    report.failed.push((record.name, err.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Whether a user bound to `bound` takes their content from `name`:
    /// either the same package, or `name` is `default` and `bound` has no file.
    fn is_bound_to(&self, bound: &str, name: &PackageName) -> bool {
        match PackageName::sanitize(bound) {
            Ok(bound) if bound == *name => true,
            Ok(bound) => name.is_default() && !self.packages().exists(&bound),
            Err(_) => name.is_default(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle hooks
    // -----------------------------------------------------------------------

    /// User created or moved to another package.
    pub fn on_user_changed(
        &self,
        user: &Username,
        package: &str,
    ) -> Result<GeneratedConfig, ProvisionError> {
        self.generate_config(user, package)
    }

    /// User removed: stop and disable the unit, then delete the instance
    /// directory. Returns whether a directory was removed.
    pub fn on_user_deleted(&self, user: &Username) -> Result<bool, ProvisionError> {
        tracing::info!(user = %user, "disabling and removing redis instance");
        self.control(ServiceAction::Disable, user);

        let dir = self.layout(user).dir;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(dir, e)),
        }
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("settings", &self.settings)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}
