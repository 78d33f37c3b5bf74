//! Ports: the external collaborators the [`crate::Provisioner`] is built with.
//!
//! Real adapters live in [`crate::system`]; tests substitute in-memory fakes.

use std::path::Path;
use std::sync::Arc;

use userredis_core::{Ownership, Username};

use crate::error::ProvisionError;

/// A user-facing service verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceAction {
    /// Start now and start at boot.
    Enable,
    /// Stop now and do not start at boot.
    Disable,
    Restart,
}

impl ServiceAction {
    /// `systemctl` arguments preceding the unit name.
    pub fn systemctl_args(&self) -> &'static [&'static str] {
        match self {
            ServiceAction::Enable => &["enable", "--now"],
            ServiceAction::Disable => &["disable", "--now"],
            ServiceAction::Restart => &["restart"],
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            ServiceAction::Enable => "enable",
            ServiceAction::Disable => "disable",
            ServiceAction::Restart => "restart",
        }
    }
}

/// The service manager.
pub trait ServiceControl: Send + Sync {
    /// Apply `action` to `unit`.
    fn apply(&self, action: ServiceAction, unit: &str) -> Result<(), ProvisionError>;

    /// Raw activity state of `unit` (`active`, `inactive`, `failed`, ...).
    /// `None` when the service manager gave no usable answer.
    fn active_state(&self, unit: &str) -> Option<String>;
}

/// The Redis command-line client, run as the instance owner.
pub trait RedisProbe: Send + Sync {
    /// Raw `INFO memory` output from the instance behind `socket`, `None` if unreachable.
    fn info_memory(&self, user: &Username, socket: &Path) -> Option<String>;
}

/// One panel account and the package it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub package: Option<String>,
}

/// The panel's user directory.
pub trait UserDirectory: Send + Sync {
    /// Bound package of `user`; `None` if the panel does not know the user.
    fn package_of(&self, user: &Username) -> Result<Option<String>, ProvisionError>;

    /// Every account with its bound package.
    fn list_users(&self) -> Result<Vec<UserRecord>, ProvisionError>;
}

/// Bundle of ports handed to [`crate::Provisioner::new`].
#[derive(Clone)]
pub struct Ports {
    pub services: Arc<dyn ServiceControl>,
    pub redis: Arc<dyn RedisProbe>,
    pub users: Arc<dyn UserDirectory>,
    pub ownership: Arc<dyn Ownership>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ServiceAction::Enable, &["enable", "--now"])]
    #[case(ServiceAction::Disable, &["disable", "--now"])]
    #[case(ServiceAction::Restart, &["restart"])]
    fn actions_map_to_systemctl_verbs(#[case] action: ServiceAction, #[case] args: &[&str]) {
        assert_eq!(action.systemctl_args(), args);
        assert_eq!(action.verb(), args[0]);
    }
}
