//! `userredis redis`: per-user verbs.

use anyhow::{Context, Result};
use clap::Subcommand;

use userredis_core::{Settings, Username};
use userredis_provision::{Command, Provisioner};

use crate::parse_username;

#[derive(Subcommand, Debug)]
pub enum RedisCommand {
    /// Start the user's instance now and at boot.
    Enable {
        #[arg(value_parser = parse_username)]
        user: Username,
    },
    /// Stop the user's instance and keep it from starting at boot.
    Disable {
        #[arg(value_parser = parse_username)]
        user: Username,
    },
    /// Restart the user's instance.
    Restart {
        #[arg(value_parser = parse_username)]
        user: Username,
    },
    /// Generate the user's config from their bound package.
    #[command(name = "provision_user", alias = "provision-user")]
    ProvisionUser {
        #[arg(value_parser = parse_username)]
        user: Username,
    },
    /// Print `{"status", "memory"}` for the user's instance.
    #[command(
        name = "get_user_redis_info",
        visible_alias = "get_status",
        alias = "get-user-redis-info"
    )]
    GetUserRedisInfo {
        #[arg(value_parser = parse_username)]
        user: Username,
    },
}

impl From<RedisCommand> for Command {
    fn from(command: RedisCommand) -> Self {
        match command {
            RedisCommand::Enable { user } => Command::Enable { user },
            RedisCommand::Disable { user } => Command::Disable { user },
            RedisCommand::Restart { user } => Command::Restart { user },
            RedisCommand::ProvisionUser { user } => Command::ProvisionUser { user },
            RedisCommand::GetUserRedisInfo { user } => Command::GetUserRedisInfo { user },
        }
    }
}

pub fn run(command: RedisCommand, settings: Settings) -> Result<()> {
    let provisioner = Provisioner::system(settings).context("failed to set up provisioner")?;
    let command = Command::from(command);
    let verb = command.verb();
    let reply = provisioner
        .dispatch(command, None)
        .with_context(|| format!("{verb} failed"))?;
    super::print_reply(&reply)
}
