//! Real adapters for the [`crate::ports`] traits.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use userredis_core::{CoreError, Ownership, Settings, Username};

use crate::error::ProvisionError;
use crate::exec::{run, run_argv};
use crate::ports::{Ports, RedisProbe, ServiceAction, ServiceControl, UserDirectory, UserRecord};

impl Ports {
    /// Adapters backed by `systemctl`, `runuser`+`redis-cli`, the panel's
    /// listing commands and `chown(2)`.
    pub fn system(settings: &Settings) -> Self {
        let timeout = settings.command_timeout();
        Self {
            services: Arc::new(Systemctl {
                program: settings.systemctl.clone(),
                timeout,
            }),
            redis: Arc::new(RedisCli {
                runuser: settings.runuser.clone(),
                redis_cli: settings.redis_cli.clone(),
                timeout,
            }),
            users: Arc::new(PanelUsers {
                settings: settings.clone(),
                timeout,
            }),
            ownership: Arc::new(SystemOwnership::new(timeout)),
        }
    }
}

// ---------------------------------------------------------------------------
// systemctl
// ---------------------------------------------------------------------------

pub struct Systemctl {
    program: String,
    timeout: Duration,
}

impl ServiceControl for Systemctl {
    fn apply(&self, action: ServiceAction, unit: &str) -> Result<(), ProvisionError> {
        let mut args: Vec<&str> = action.systemctl_args().to_vec();
        args.push(unit);
        run(&self.program, &args, self.timeout)?.check(&self.program)?;
        Ok(())
    }

    fn active_state(&self, unit: &str) -> Option<String> {
        // `is-active` exits non-zero for every state but `active`; stdout still names it.
        match run(&self.program, &["is-active", unit], self.timeout) {
            Ok(out) => {
                let state = out.stdout.trim();
                (!state.is_empty()).then(|| state.to_owned())
            }
            Err(err) => {
                tracing::debug!(unit, error = %err, "is-active query failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// redis-cli
// ---------------------------------------------------------------------------

pub struct RedisCli {
    runuser: String,
    redis_cli: String,
    timeout: Duration,
}

impl RedisProbe for RedisCli {
    fn info_memory(&self, user: &Username, socket: &Path) -> Option<String> {
        let socket = socket.display().to_string();
        let args = [
            "-u",
            user.as_str(),
            "--",
            self.redis_cli.as_str(),
            "-s",
            socket.as_str(),
            "INFO",
            "memory",
        ];
        match run(&self.runuser, &args, self.timeout) {
            Ok(out) if out.success() && !out.stdout.trim().is_empty() => Some(out.stdout),
            Ok(out) => {
                tracing::debug!(user = %user, stderr = %out.stderr.trim(), "redis-cli gave no info");
                None
            }
            Err(err) => {
                tracing::debug!(user = %user, error = %err, "redis-cli could not run");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Panel user listing
// ---------------------------------------------------------------------------

pub struct PanelUsers {
    settings: Settings,
    timeout: Duration,
}

impl UserDirectory for PanelUsers {
    fn package_of(&self, user: &Username) -> Result<Option<String>, ProvisionError> {
        let argv = self.settings.show_user_argv(user);
        let out = run_argv(&argv, self.timeout)?;
        if !out.success() {
            // The panel exits non-zero for unknown accounts.
            tracing::debug!(user = %user, stderr = %out.stderr.trim(), "user lookup failed");
            return Ok(None);
        }
        let records = parse_user_listing(&out.stdout)?;
        Ok(records
            .into_iter()
            .find(|r| r.name == user.as_str())
            .and_then(|r| r.package))
    }

    fn list_users(&self) -> Result<Vec<UserRecord>, ProvisionError> {
        let argv = &self.settings.list_users_command;
        let program = argv.first().cloned().unwrap_or_default();
        let out = run_argv(argv, self.timeout)?.check(&program)?;
        parse_user_listing(&out.stdout)
    }
}

/// Parse `{"<user>": {"PACKAGE": "<name>", ...}, ...}` as printed by the panel.
pub fn parse_user_listing(json: &str) -> Result<Vec<UserRecord>, ProvisionError> {
    if json.trim().is_empty() {
        return Ok(vec![]);
    }
    let users: BTreeMap<String, Value> = serde_json::from_str(json)
        .map_err(|e| ProvisionError::UserListing(e.to_string()))?;
    Ok(users
        .into_iter()
        .map(|(name, details)| UserRecord {
            package: details
                .get("PACKAGE")
                .and_then(Value::as_str)
                .map(str::to_owned),
            name,
        })
        .collect())
}

/// Extract `used_memory_human` from `INFO memory` output.
pub fn parse_used_memory_human(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.strip_prefix("used_memory_human:"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

/// `chown(2)` with uid/gid resolved through `id`, cached per account.
pub struct SystemOwnership {
    timeout: Duration,
    ids: Mutex<HashMap<String, (u32, u32)>>,
}

impl SystemOwnership {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ids: Mutex::new(HashMap::new()),
        }
    }

    fn resolve(&self, path: &Path, account: &str) -> Result<(u32, u32), CoreError> {
        if let Some(ids) = self.ids.lock().ok().and_then(|c| c.get(account).copied()) {
            return Ok(ids);
        }
        let uid = self.id_number(path, "-u", account)?;
        let gid = self.id_number(path, "-g", account)?;
        if let Ok(mut cache) = self.ids.lock() {
            cache.insert(account.to_owned(), (uid, gid));
        }
        Ok((uid, gid))
    }

    fn id_number(&self, path: &Path, flag: &str, account: &str) -> Result<u32, CoreError> {
        let fail = |message: String| CoreError::Ownership {
            path: path.to_path_buf(),
            owner: account.to_owned(),
            message,
        };
        let out = run("id", &[flag, account], self.timeout)
            .and_then(|out| out.check("id"))
            .map_err(|e| fail(e.to_string()))?;
        out.stdout
            .trim()
            .parse()
            .map_err(|e| fail(format!("unexpected `id {flag}` output: {e}")))
    }
}

impl Ownership for SystemOwnership {
    #[cfg(unix)]
    fn chown(&self, path: &Path, account: &str) -> Result<(), CoreError> {
        let (uid, gid) = self.resolve(path, account)?;
        std::os::unix::fs::chown(path, Some(uid), Some(gid)).map_err(|e| CoreError::Ownership {
            path: path.to_path_buf(),
            owner: account.to_owned(),
            message: e.to_string(),
        })
    }

    #[cfg(not(unix))]
    fn chown(&self, _path: &Path, _account: &str) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Name of the account this process runs as (`id -un`).
pub fn current_user_name(timeout: Duration) -> Result<String, ProvisionError> {
    let out = run("id", &["-un"], timeout)?.check("id")?;
    Ok(out.stdout.trim().to_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
