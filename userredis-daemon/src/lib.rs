//! Status daemon: the panel's status endpoint plus the package watcher.
//!
//! The panel asks for a user's instance status over a Unix socket with one
//! JSON object per line. Instances are provisioned on first request. When the
//! daemon runs as the privileged user it also watches the packages directory
//! and regenerates bound users whenever a package file changes on disk.

mod error;
pub mod logging;
pub mod protocol;
mod runtime;
mod watcher;

pub use error::DaemonError;
pub use logging::init_tracing;
pub use protocol::{
    request_ping, request_status, request_stop, DaemonRequest, DaemonResponse, StatusClient,
};
pub use runtime::{run, start_blocking, NOT_AUTHENTICATED};
pub use watcher::DEBOUNCE_WINDOW;
