//! Installation settings, loaded from YAML.
//!
//! # Lookup
//!
//! 1. `--config <path>` on the command line, else
//! 2. `$USERREDIS_CONFIG`, else
//! 3. `/etc/userredis/config.yaml`.
//!
//! A missing file yields [`Settings::default`]; every key is optional.
//!
//! # API pattern
//!
//! As with the package store, [`Settings::load_at`] takes an explicit path and
//! is what tests call; [`Settings::load`] resolves the path first.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::Username;

pub const DEFAULT_SETTINGS_PATH: &str = "/etc/userredis/config.yaml";
pub const SETTINGS_ENV: &str = "USERREDIS_CONFIG";

/// Placeholder replaced by the username in unit names and user commands.
pub const USER_PLACEHOLDER: &str = "{user}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Parent of every user's home directory; instances live in `<home_root>/<user>/redis`.
    pub home_root: PathBuf,
    /// Directory holding `<package>.conf` files.
    pub packages_dir: PathBuf,
    /// Per-user unit name; `{user}` is replaced with the username.
    pub unit_template: String,
    /// Account that owns generated configs and may run admin verbs.
    pub privileged_user: String,

    pub systemctl: String,
    pub redis_cli: String,
    pub redis_server: String,
    pub runuser: String,

    /// argv printing every panel user as JSON (`{"<user>": {"PACKAGE": ...}}`).
    pub list_users_command: Vec<String>,
    /// argv printing one panel user as JSON; `{user}` is substituted.
    pub show_user_command: Vec<String>,

    /// Upper bound for any external command.
    pub command_timeout_secs: u64,

    /// Unix socket served by `userredis daemon start`.
    pub status_socket: PathBuf,
    /// Where `userredis install` writes the template unit.
    pub unit_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home_root: PathBuf::from("/home"),
            packages_dir: PathBuf::from("/usr/local/hestia/plugins/redis/packages"),
            unit_template: "redis-user@{user}.service".to_owned(),
            privileged_user: "root".to_owned(),
            systemctl: "systemctl".to_owned(),
            redis_cli: "/usr/bin/redis-cli".to_owned(),
            redis_server: "/usr/bin/redis-server".to_owned(),
            runuser: "runuser".to_owned(),
            list_users_command: vec![
                "/usr/local/hestia/bin/v-list-users".to_owned(),
                "json".to_owned(),
            ],
            show_user_command: vec![
                "/usr/local/hestia/bin/v-list-user".to_owned(),
                USER_PLACEHOLDER.to_owned(),
                "json".to_owned(),
            ],
            command_timeout_secs: 10,
            status_socket: PathBuf::from("/run/userredis/status.sock"),
            unit_dir: PathBuf::from("/etc/systemd/system"),
        }
    }
}

impl Settings {
    /// Load from `path`; a missing file means defaults.
    pub fn load_at(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file absent, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| CoreError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the settings path (explicit, env, default) and load it.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CoreError> {
        Self::load_at(&Self::resolve_path(explicit))
    }

    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var_os(SETTINGS_ENV) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => PathBuf::from(DEFAULT_SETTINGS_PATH),
        }
    }

    /// `redis-user@alice.service` for the default template.
    pub fn unit_name(&self, user: &Username) -> String {
        self.unit_template.replace(USER_PLACEHOLDER, user.as_str())
    }

    /// Systemd template unit file name, e.g. `redis-user@.service`.
    pub fn template_unit_name(&self) -> String {
        self.unit_template.replace(USER_PLACEHOLDER, "")
    }

    /// `show_user_command` with `{user}` substituted.
    pub fn show_user_argv(&self, user: &Username) -> Vec<String> {
        self.show_user_command
            .iter()
            .map(|arg| arg.replace(USER_PLACEHOLDER, user.as_str()))
            .collect()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
