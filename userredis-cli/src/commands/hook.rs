//! `userredis hook`: called by the panel when accounts change.

use anyhow::{Context, Result};
use clap::Subcommand;

use userredis_core::{Settings, Username};
use userredis_provision::Provisioner;

use crate::parse_username;

#[derive(Subcommand, Debug)]
pub enum HookCommand {
    /// An account was created or moved to another package.
    UserChanged {
        #[arg(value_parser = parse_username)]
        user: Username,
        package: String,
    },
    /// An account was removed.
    UserDeleted {
        #[arg(value_parser = parse_username)]
        user: Username,
    },
}

pub fn run(command: HookCommand, settings: Settings) -> Result<()> {
    let provisioner = Provisioner::system(settings).context("failed to set up provisioner")?;
    match command {
        HookCommand::UserChanged { user, package } => {
            provisioner
                .on_user_changed(&user, &package)
                .with_context(|| format!("failed to update redis config for {user}"))?;
        }
        HookCommand::UserDeleted { user } => {
            provisioner
                .on_user_deleted(&user)
                .with_context(|| format!("failed to remove redis instance for {user}"))?;
        }
    }
    Ok(())
}
