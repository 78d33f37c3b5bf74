//! userredis: per-user Redis instances for a hosting panel.
//!
//! # Usage
//!
//! ```text
//! userredis redis enable|disable|restart <user>
//! userredis redis provision_user <user>
//! userredis redis get_user_redis_info <user>
//! userredis redis-admin get_packages
//! userredis redis-admin save_package <name> <content>
//! userredis redis-admin delete_package <name>
//! userredis hook user-changed <user> <package>
//! userredis hook user-deleted <user>
//! userredis daemon start|stop|status|query
//! userredis install | uninstall | doctor [--json]
//! ```

mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    admin::AdminCommand, daemon::DaemonCommand, doctor::DoctorArgs, hook::HookCommand,
    redis::RedisCommand,
};
use userredis_core::{Settings, Username};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "userredis",
    version,
    about = "Provision and manage per-user Redis instances",
    long_about = None,
)]
struct Cli {
    /// Settings file (YAML).
    #[arg(long, global = true, env = "USERREDIS_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Per-user instance verbs.
    Redis {
        #[command(subcommand)]
        command: RedisCommand,
    },

    /// Package management. Requires the privileged user.
    RedisAdmin {
        #[command(subcommand)]
        command: AdminCommand,
    },

    /// Panel lifecycle hooks.
    Hook {
        #[command(subcommand)]
        command: HookCommand,
    },

    /// Status endpoint daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Install the systemd template unit and seed the default package.
    Install,

    /// Remove the systemd template unit.
    Uninstall,

    /// Report missing external tools.
    Doctor(DoctorArgs),
}

/// clap value parser for account names.
pub fn parse_username(raw: &str) -> std::result::Result<Username, String> {
    Username::parse(raw).map_err(|err| err.to_string())
}

fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let path = Settings::resolve_path(config);
    Settings::load_at(&path).with_context(|| format!("failed to load settings from {}", path.display()))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    userredis_daemon::init_tracing(cli.log_json);
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Redis { command } => commands::redis::run(command, settings),
        Commands::RedisAdmin { command } => commands::admin::run(command, settings),
        Commands::Hook { command } => commands::hook::run(command, settings),
        Commands::Daemon { command } => commands::daemon::run(command, settings),
        Commands::Install => commands::install::install(&settings),
        Commands::Uninstall => commands::install::uninstall(&settings),
        Commands::Doctor(args) => args.run(&settings),
    }
}
