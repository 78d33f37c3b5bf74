//! `userredis install` / `userredis uninstall`.

use anyhow::{Context, Result};

use userredis_core::Settings;
use userredis_provision::systemd;

pub fn install(settings: &Settings) -> Result<()> {
    let report = systemd::install(settings).context("failed to install systemd unit")?;
    println!("installed systemd unit: {}", report.unit_path.display());
    if report.seeded_default {
        println!(
            "created default package in {}",
            settings.packages_dir.display()
        );
    }
    Ok(())
}

pub fn uninstall(settings: &Settings) -> Result<()> {
    if systemd::uninstall(settings).context("failed to uninstall systemd unit")? {
        println!("removed systemd unit");
    } else {
        println!("systemd unit not installed");
    }
    Ok(())
}
