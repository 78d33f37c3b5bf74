//! `userredis redis-admin`: package management.
//!
//! Errors are returned without extra context so the caller sees the bare
//! message (`Permission denied.`, `Invalid package name: '…'`).

use anyhow::Result;
use clap::Subcommand;

use userredis_core::Settings;
use userredis_provision::{AdminToken, Command, Provisioner};

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Print every package as JSON, name to content.
    #[command(name = "get_packages", alias = "get-packages")]
    GetPackages,
    /// Create or overwrite a package and update every user bound to it.
    #[command(name = "save_package", alias = "save-package")]
    SavePackage {
        name: String,
        /// Redis directives, verbatim.
        #[arg(allow_hyphen_values = true)]
        content: String,
    },
    /// Remove a package. `default` cannot be deleted.
    #[command(name = "delete_package", alias = "delete-package")]
    DeletePackage { name: String },
}

impl From<AdminCommand> for Command {
    fn from(command: AdminCommand) -> Self {
        match command {
            AdminCommand::GetPackages => Command::GetPackages,
            AdminCommand::SavePackage { name, content } => Command::SavePackage { name, content },
            AdminCommand::DeletePackage { name } => Command::DeletePackage { name },
        }
    }
}

pub fn run(command: AdminCommand, settings: Settings) -> Result<()> {
    let token = AdminToken::acquire(&settings)?;
    let provisioner = Provisioner::system(settings)?;
    let reply = provisioner.dispatch(command.into(), Some(&token))?;
    super::print_reply(&reply)
}
