//! Error types for userredis-provision.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use userredis_core::CoreError;

/// All errors that can arise from provisioning and dispatch.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Package store, settings or config generation failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Admin verb invoked without the admin capability.
    #[error("Permission denied.")]
    PermissionDenied,

    /// External program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// External program exceeded the configured timeout and was killed.
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// External program ran but reported failure.
    #[error("{program} failed ({status}): {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Output of the panel's user listing was not the expected JSON.
    #[error("unexpected user listing output: {0}")]
    UserListing(String),

    /// I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`ProvisionError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProvisionError {
    ProvisionError::Io {
        path: path.into(),
        source,
    }
}
