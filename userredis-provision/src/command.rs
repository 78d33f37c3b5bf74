//! Typed command router.
//!
//! Each plugin verb is one [`Command`] variant carrying its own typed
//! arguments. [`Provisioner::dispatch`] routes a command to the matching
//! operation and shapes the result as a [`Reply`].
//!
//! | namespace     | verb                  | reply |
//! |---------------|-----------------------|-------|
//! | `redis`       | `enable` / `disable` / `restart` | none |
//! | `redis`       | `provision_user`      | none |
//! | `redis`       | `get_user_redis_info` (`get_status`) | JSON `{status, memory}` |
//! | `redis-admin` | `get_packages`        | JSON name → content |
//! | `redis-admin` | `save_package`        | text |
//! | `redis-admin` | `delete_package`      | text |

use serde::{Deserialize, Serialize};

use userredis_core::Username;

use crate::auth::AdminToken;
use crate::error::ProvisionError;
use crate::ports::ServiceAction;
use crate::provisioner::Provisioner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Command {
    Enable { user: Username },
    Disable { user: Username },
    Restart { user: Username },
    ProvisionUser { user: Username },
    #[serde(alias = "get_status")]
    GetUserRedisInfo { user: Username },
    GetPackages,
    SavePackage { name: String, content: String },
    DeletePackage { name: String },
}

impl Command {
    /// Package verbs need an [`AdminToken`].
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::GetPackages | Command::SavePackage { .. } | Command::DeletePackage { .. }
        )
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Enable { .. } => "enable",
            Command::Disable { .. } => "disable",
            Command::Restart { .. } => "restart",
            Command::ProvisionUser { .. } => "provision_user",
            Command::GetUserRedisInfo { .. } => "get_user_redis_info",
            Command::GetPackages => "get_packages",
            Command::SavePackage { .. } => "save_package",
            Command::DeletePackage { .. } => "delete_package",
        }
    }
}

/// What a command hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Side effect only.
    Empty,
    /// Compact JSON, fields in declaration order.
    Json(String),
    Text(String),
}

impl Reply {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ProvisionError> {
        Ok(Reply::Json(serde_json::to_string(value)?))
    }

    /// The caller-facing rendering: JSON, plain text, or nothing.
    pub fn render(&self) -> Option<&str> {
        match self {
            Reply::Empty => None,
            Reply::Json(body) | Reply::Text(body) => Some(body.as_str()),
        }
    }
}

impl Provisioner {
    /// Route `command` to its operation.
    ///
    /// Admin verbs without a token fail with [`ProvisionError::PermissionDenied`]
    /// before anything is touched.
    pub fn dispatch(
        &self,
        command: Command,
        token: Option<&AdminToken>,
    ) -> Result<Reply, ProvisionError> {
        tracing::debug!(verb = command.verb(), "dispatching command");
        let admin = || token.ok_or(ProvisionError::PermissionDenied);

        match command {
            Command::Enable { user } => {
                self.control(ServiceAction::Enable, &user);
                Ok(Reply::Empty)
            }
            Command::Disable { user } => {
                self.control(ServiceAction::Disable, &user);
                Ok(Reply::Empty)
            }
            Command::Restart { user } => {
                self.control(ServiceAction::Restart, &user);
                Ok(Reply::Empty)
            }
            Command::ProvisionUser { user } => {
                self.provision_user(&user)?;
                Ok(Reply::Empty)
            }
            Command::GetUserRedisInfo { user } => {
                Reply::json(&self.get_info(&user))
            }
            Command::GetPackages => {
                let packages = self.list_packages(admin()?)?;
                Reply::json(&packages)
            }
            Command::SavePackage { name, content } => {
                let report = self.save_package(admin()?, &name, &content)?;
                let mut text = format!(
                    "Package '{}' saved; {} user(s) updated.",
                    report.name,
                    report.fan_out.regenerated.len()
                );
                for (account, error) in &report.fan_out.failed {
                    text.push_str(&format!("\nWarning: could not update {account}: {error}"));
                }
                Ok(Reply::Text(text))
            }
            Command::DeletePackage { name } => {
                let outcome = self.delete_package(admin()?, &name)?;
                let text = if outcome.removed {
                    format!("Package '{}' deleted.", outcome.name)
                } else {
                    format!("Package '{}' does not exist; nothing deleted.", outcome.name)
                };
                Ok(Reply::Text(text))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn admin_verbs_are_flagged() {
        let alice = Username::parse("alice").unwrap();
        assert!(!Command::Enable { user: alice.clone() }.requires_admin());
        assert!(!Command::GetUserRedisInfo { user: alice }.requires_admin());
        assert!(Command::GetPackages.requires_admin());
        assert!(Command::DeletePackage { name: "x".into() }.requires_admin());
    }

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let cmd: Command =
            serde_json::from_value(json!({"verb": "get_status", "user": "alice"})).unwrap();
        assert_eq!(
            cmd,
            Command::GetUserRedisInfo {
                user: Username::parse("alice").unwrap()
            }
        );
        let cmd: Command = serde_json::from_value(
            json!({"verb": "save_package", "name": "p", "content": "maxmemory 1mb"}),
        )
        .unwrap();
        assert_eq!(cmd.verb(), "save_package");
    }

    #[test]
    fn invalid_username_is_rejected_at_parse() {
        let err = serde_json::from_value::<Command>(json!({"verb": "enable", "user": "../etc"}));
        assert!(err.is_err());
    }

    #[test]
    fn reply_rendering() {
        let info = userredis_core::InstanceInfo {
            status: "active".into(),
            memory: "1M".into(),
        };
        assert_eq!(Reply::Empty.render(), None);
        assert_eq!(Reply::Text("ok".into()).render(), Some("ok"));
        assert_eq!(
            Reply::json(&info).unwrap().render(),
            Some(r#"{"status":"active","memory":"1M"}"#)
        );
    }
}
