use anyhow::Result;
use tracing::{debug, info};

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::cli::usage_cmd::{require_entry, spinner, start, stop_spinner};
use crate::core::config::AppConfig;
use crate::core::formatter::format_interval;
use crate::core::models::sensor::SensorSnapshot;

fn print_snapshot(snapshot: &SensorSnapshot, opts: &OutputOptions) -> Result<()> {
    match opts.format {
        OutputFormat::Text => println!("{}", renderer::render_update(snapshot, opts.use_color)),
        // One object per line so the stream stays parseable.
        OutputFormat::Json => println!("{}", serde_json::to_string(snapshot)?),
    }
    Ok(())
}

/// Keep the sensor running and print every update until Ctrl-C.
pub async fn run(opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load()?;
    let entry = require_entry(&config);

    let spinner = spinner(opts, "Connecting to SRP Energy...");
    let integration = start(&entry, &config.settings).await;
    stop_spinner(spinner);
    let integration = integration?;

    let coordinator = integration.coordinator();
    info!(
        title = %integration.title(),
        sensor = %integration.sensor().name(),
        coordinator = %coordinator.name(),
        polling = coordinator.is_polling(),
        interval = %format_interval(config.settings.update_interval()),
        "Watching usage, press Ctrl-C to stop"
    );

    let mut updates = integration.sensor().subscribe();
    print_snapshot(&updates.borrow_and_update().clone(), opts)?;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                debug!(
                    value = ?coordinator.current_value(),
                    listeners = coordinator.listener_count(),
                    "Sensor updated"
                );
                print_snapshot(&snapshot, opts)?;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    integration.unload().await;
    Ok(())
}
