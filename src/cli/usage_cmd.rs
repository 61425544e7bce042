use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::config::{AppConfig, ConfigEntry, Settings};
use crate::core::integration::{Integration, SetupError};
use crate::core::srp::SrpConnector;

/// Load the stored entry, or explain how to create one.
pub fn require_entry(config: &AppConfig) -> ConfigEntry {
    match &config.entry {
        Some(entry) => entry.clone(),
        None => {
            eprintln!("No SRP Energy account configured. Run `srp-energy setup` first.");
            std::process::exit(1);
        }
    }
}

/// Set up the integration, exiting with a retry hint if SRP is unreachable.
pub async fn start(entry: &ConfigEntry, settings: &Settings) -> Result<Integration> {
    match Integration::setup(entry, settings, Arc::new(SrpConnector)).await {
        Ok(integration) => Ok(integration),
        Err(SetupError::NotReady(err)) => {
            eprintln!("SRP Energy is not ready: {}", err);
            eprintln!("Try again later.");
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}

/// Show a spinner on stderr until aborted (text mode only).
pub fn spinner(opts: &OutputOptions, msg: &'static str) -> Option<JoinHandle<()>> {
    if !matches!(opts.format, OutputFormat::Text) {
        return None;
    }
    Some(tokio::spawn(async move {
        let frames = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
        let mut i = 0usize;
        loop {
            eprint!("\r {} {}", frames[i % frames.len()], msg);
            i = i.wrapping_add(1);
            tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        }
    }))
}

pub fn stop_spinner(spinner: Option<JoinHandle<()>>) {
    if let Some(s) = spinner {
        s.abort();
        eprint!("\r\x1b[2K");
    }
}

pub async fn run(opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load()?;
    let entry = require_entry(&config);

    let spinner = spinner(opts, "Fetching usage data...");
    let integration = start(&entry, &config.settings).await;
    stop_spinner(spinner);
    let integration = integration?;

    let snapshot = integration.sensor().snapshot();
    match opts.format {
        OutputFormat::Text => {
            println!(
                "{}",
                renderer::render_sensor(
                    &snapshot,
                    Some(config.settings.update_interval()),
                    opts.use_color
                )
            );
        }
        OutputFormat::Json => {
            println!("{}", opts.to_json(&snapshot)?);
            if opts.verbose {
                if let Some(err) = &snapshot.last_error {
                    eprintln!("Error fetching usage: {}", err);
                }
            }
        }
    }

    integration.unload().await;
    Ok(())
}
