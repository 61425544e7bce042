use std::io::IsTerminal;

use anyhow::Result;
use serde::Serialize;

use crate::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
    pub verbose: bool,
}

impl OutputOptions {
    /// Combine command-line flags with the persisted defaults. Flags win.
    pub fn resolve(
        format: Option<&str>,
        json: bool,
        pretty: bool,
        no_color: bool,
        verbose: bool,
        settings: &Settings,
    ) -> Self {
        let format = if json {
            OutputFormat::Json
        } else {
            match format.unwrap_or(settings.default_format.as_str()) {
                "json" => OutputFormat::Json,
                _ => OutputFormat::Text,
            }
        };
        Self {
            format,
            pretty,
            use_color: detect_color(!no_color, &settings.color),
            verbose,
        }
    }

    pub fn to_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}

pub fn detect_color(color_flag: bool, setting: &str) -> bool {
    if !color_flag {
        return false;
    }
    match setting {
        "never" => false,
        "always" => true,
        _ => std::env::var("NO_COLOR").is_err() && std::io::stdout().is_terminal(),
    }
}
