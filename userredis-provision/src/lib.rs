//! # userredis-provision
//!
//! Per-user Redis provisioning: the [`Provisioner`] service, the typed
//! [`Command`] router, and the adapters that talk to `systemctl`, `redis-cli`,
//! the panel's user listing and the filesystem's ownership calls.
//!
//! Everything external sits behind a port in [`ports`]; [`system`] holds the
//! real implementations.

pub mod auth;
pub mod command;
pub mod error;
pub mod exec;
pub mod ports;
pub mod provisioner;
pub mod system;
pub mod systemd;

pub use auth::AdminToken;
pub use command::{Command, Reply};
pub use error::ProvisionError;
pub use ports::{Ports, RedisProbe, ServiceAction, ServiceControl, UserDirectory, UserRecord};
pub use provisioner::{DeleteOutcome, FanOutReport, Provisioner, SaveReport};
pub use systemd::InstallReport;
