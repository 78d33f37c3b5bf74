//! Template unit management.
//!
//! One `redis-user@.service` template serves every account; the instance name
//! (`%i`) is the username. Installing also seeds the `default` package so the
//! first generated config has something to fall back to.

use std::fs;
use std::path::PathBuf;

use userredis_core::packages::DEFAULT_PACKAGE_CONTENT;
use userredis_core::{PackageStore, Settings};

use crate::error::{io_err, ProvisionError};
use crate::exec::run;

const UNIT_MODE: u32 = 0o644;

/// What [`install`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub unit_path: PathBuf,
    /// False when `default.conf` was already present.
    pub seeded_default: bool,
}

/// Render the template unit for `settings`.
pub fn generate_unit(settings: &Settings) -> String {
    let conf = settings
        .home_root
        .join("%i")
        .join(userredis_core::layout::INSTANCE_DIR)
        .join(userredis_core::layout::CONF_FILE);

    format!(
        r#"[Unit]
Description=Redis instance for user %i
After=network.target

[Service]
Type=simple
User=%i
Group=%i
ExecStart={server} {conf} --daemonize no
Restart=on-failure
NoNewPrivileges=true
PrivateTmp=true

[Install]
WantedBy=multi-user.target
"#,
        server = settings.redis_server,
        conf = conf.display(),
    )
}

/// Write the template unit, reload systemd and seed the `default` package.
pub fn install(settings: &Settings) -> Result<InstallReport, ProvisionError> {
    let unit_dir = &settings.unit_dir;
    if !unit_dir.exists() {
        fs::create_dir_all(unit_dir).map_err(|e| io_err(unit_dir, e))?;
    }

    let unit_path = unit_dir.join(settings.template_unit_name());
    fs::write(&unit_path, generate_unit(settings)).map_err(|e| io_err(&unit_path, e))?;
    set_unit_mode(&unit_path)?;
    tracing::info!(path = %unit_path.display(), "wrote template unit");

    daemon_reload(settings, false)?;

    let store = PackageStore::new(&settings.packages_dir);
    let seeded_default = store.seed_default(DEFAULT_PACKAGE_CONTENT)?;
    if seeded_default {
        tracing::info!(dir = %store.dir().display(), "seeded default package");
    }

    Ok(InstallReport {
        unit_path,
        seeded_default,
    })
}

/// Remove the template unit if present. Packages and instance directories
/// are left alone. Returns whether a unit file was removed.
pub fn uninstall(settings: &Settings) -> Result<bool, ProvisionError> {
    let unit_path = settings.unit_dir.join(settings.template_unit_name());
    if !unit_path.exists() {
        return Ok(false);
    }
    fs::remove_file(&unit_path).map_err(|e| io_err(&unit_path, e))?;
    tracing::info!(path = %unit_path.display(), "removed template unit");
    daemon_reload(settings, true)?;
    Ok(true)
}

fn daemon_reload(settings: &Settings, ignore_failure: bool) -> Result<(), ProvisionError> {
    let result = run(&settings.systemctl, &["daemon-reload"], settings.command_timeout())
        .and_then(|out| out.check(&settings.systemctl));
    match result {
        Ok(_) => Ok(()),
        Err(err) if ignore_failure => {
            tracing::warn!(error = %err, "daemon-reload failed");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
fn set_unit_mode(path: &std::path::Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(UNIT_MODE)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_unit_mode(_path: &std::path::Path) -> Result<(), ProvisionError> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir, systemctl: &str) -> Settings {
        Settings {
            home_root: "/home".into(),
            packages_dir: dir.path().join("packages"),
            unit_dir: dir.path().join("units"),
            systemctl: systemctl.into(),
            ..Settings::default()
        }
    }

    #[test]
    fn unit_runs_server_on_generated_config() {
        let unit = generate_unit(&Settings {
            home_root: "/home".into(),
            redis_server: "/usr/bin/redis-server".into(),
            ..Settings::default()
        });
        assert!(unit.contains("ExecStart=/usr/bin/redis-server /home/%i/redis/redis.conf --daemonize no\n"));
        assert!(unit.contains("User=%i\nGroup=%i\n"));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn install_writes_unit_and_seeds_default_once() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir, "true");

        let report = install(&settings).unwrap();
        assert!(report.seeded_default);
        assert_eq!(
            report.unit_path,
            dir.path().join("units").join("redis-user@.service")
        );
        let mode = fs::metadata(&report.unit_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        assert_eq!(
            fs::read_to_string(dir.path().join("packages/default.conf")).unwrap(),
            DEFAULT_PACKAGE_CONTENT
        );

        fs::write(dir.path().join("packages/default.conf"), "maxmemory 1gb\n").unwrap();
        let again = install(&settings).unwrap();
        assert!(!again.seeded_default);
        assert_eq!(
            fs::read_to_string(dir.path().join("packages/default.conf")).unwrap(),
            "maxmemory 1gb\n"
        );
    }

    #[test]
    fn install_fails_when_reload_fails() {
        let dir = TempDir::new().unwrap();
        let err = install(&settings_in(&dir, "false")).unwrap_err();
        assert!(matches!(err, ProvisionError::CommandFailed { .. }));
    }

    #[test]
    fn uninstall_tolerates_reload_failure_and_missing_unit() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir, "true");
        install(&settings).unwrap();

        let settings = settings_in(&dir, "false");
        assert!(uninstall(&settings).unwrap());
        assert!(!uninstall(&settings).unwrap());
        assert!(dir.path().join("packages/default.conf").exists());
    }
}
