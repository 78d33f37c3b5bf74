//! `userredis doctor`: report which external tools are missing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;

use userredis_core::Settings;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Print machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ToolCheck {
    role: &'static str,
    program: String,
    found: Option<PathBuf>,
}

impl DoctorArgs {
    pub fn run(self, settings: &Settings) -> Result<()> {
        let checks = required_tools(settings)
            .into_iter()
            .map(|(role, program)| ToolCheck {
                role,
                found: locate(&program),
                program,
            })
            .collect::<Vec<_>>();
        let missing: Vec<&str> = checks
            .iter()
            .filter(|c| c.found.is_none())
            .map(|c| c.program.as_str())
            .collect();

        if self.json {
            let payload = json!({
                "ok": missing.is_empty(),
                "missing": missing,
                "checks": checks.iter().map(|c| json!({
                    "role": c.role,
                    "program": c.program,
                    "found": c.found.as_ref().map(|p| p.display().to_string()),
                })).collect::<Vec<_>>(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render doctor JSON")?
            );
            return Ok(());
        }

        for check in &checks {
            let mark = match check.found {
                Some(_) => "ok".green().bold(),
                None => "missing".red().bold(),
            };
            println!("{mark:>8}  {:<18} {}", check.role, check.program);
        }
        if missing.is_empty() {
            println!("All required tools are available.");
        } else {
            println!("Missing: {}", missing.join(", "));
        }
        Ok(())
    }
}

fn required_tools(settings: &Settings) -> Vec<(&'static str, String)> {
    let first = |argv: &[String]| argv.first().cloned().unwrap_or_default();
    vec![
        ("service manager", settings.systemctl.clone()),
        ("redis client", settings.redis_cli.clone()),
        ("redis server", settings.redis_server.clone()),
        ("runuser", settings.runuser.clone()),
        ("user listing", first(&settings.list_users_command)),
        ("user lookup", first(&settings.show_user_command)),
    ]
}

/// Resolve `program` like the shell would: as a path if it has a slash,
/// otherwise through `PATH`.
fn locate(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    if program.contains('/') {
        let path = Path::new(program);
        return is_executable(path).then(|| path.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
