//! Admin capability.
//!
//! Package operations take an [`AdminToken`]. The only ways to get one are
//! [`AdminToken::acquire`], which checks the identity of the running process,
//! and [`AdminToken::verify`] for callers that already know it. Entry points
//! (CLI, daemon) mint the token once and pass it down.

use userredis_core::Settings;

use crate::error::ProvisionError;
use crate::system::current_user_name;

#[derive(Debug)]
pub struct AdminToken {
    _private: (),
}

impl AdminToken {
    /// Mint a token if this process runs as `settings.privileged_user`.
    pub fn acquire(settings: &Settings) -> Result<Self, ProvisionError> {
        let identity = current_user_name(settings.command_timeout()).map_err(|err| {
            tracing::warn!(error = %err, "could not determine current identity");
            ProvisionError::PermissionDenied
        })?;
        Self::verify(&identity, settings)
    }

    /// Mint a token if `identity` is the privileged identity.
    pub fn verify(identity: &str, settings: &Settings) -> Result<Self, ProvisionError> {
        if identity != settings.privileged_user {
            tracing::warn!(identity, "admin operation refused");
            return Err(ProvisionError::PermissionDenied);
        }
        Ok(Self { _private: () })
    }
}
