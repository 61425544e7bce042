use anyhow::Result;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::config::AppConfig;

pub fn check(opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if !path.exists() {
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `srp-energy setup` to create one.");
        return Ok(());
    }

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let issues = config.validate();
    if matches!(opts.format, OutputFormat::Json) {
        let payload = serde_json::json!({
            "path": path.display().to_string(),
            "valid": issues.is_empty(),
            "issues": issues,
            "configured": config.entry.is_some(),
        });
        println!("{}", opts.to_json(&payload)?);
        if !issues.is_empty() {
            std::process::exit(1);
        }
        return Ok(());
    }

    if issues.is_empty() {
        println!("Config is valid: {}", path.display());
        match &config.entry {
            Some(entry) => println!("  Account {} ({})", entry.account_id, entry.name),
            None => println!("  No account configured."),
        }
        println!(
            "  Refresh every {} minutes, timeout {}s",
            config.settings.update_interval_minutes, config.settings.request_timeout_secs
        );
    } else {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Forget the stored account.
pub fn remove(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    let mut config = AppConfig::load_from(&path)?;
    let Some(entry) = config.remove_entry() else {
        eprintln!("No SRP Energy account configured.");
        std::process::exit(1);
    };

    config.save_to(&path)?;
    println!("Removed {} ({})", entry.name, entry.account_id);
    println!("  Updated {}", path.display());
    Ok(())
}
