//! Error types for userredis-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from package, settings and config-generation operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file exists but is not valid YAML for [`crate::Settings`].
    #[error("failed to parse settings at {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Render(#[from] tera::Error),

    /// Package name is empty after stripping disallowed characters.
    #[error("Invalid package name: '{raw}'")]
    InvalidPackageName { raw: String },

    /// Username contains characters that cannot appear in a system account name.
    #[error("Invalid username: '{raw}'")]
    InvalidUsername { raw: String },

    /// Attempt to delete the `default` package.
    #[error("Cannot delete {name} package.")]
    ProtectedPackage { name: String },

    /// Neither the requested package nor `default.conf` exists.
    #[error("default package missing at {path}; installation is misconfigured")]
    DefaultPackageMissing { path: PathBuf },

    /// The instance directory is a symlink; writing through it would land a
    /// root-owned file wherever the user pointed it.
    #[error("refusing to write through symlinked instance directory {path}")]
    UnsafeInstanceDir { path: PathBuf },

    /// Could not change file ownership.
    #[error("failed to set owner of {path} to '{owner}': {message}")]
    Ownership {
        path: PathBuf,
        owner: String,
        message: String,
    },
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
