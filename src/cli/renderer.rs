use std::time::Duration;

use colored::{control, ColoredString, Colorize};

use crate::core::formatter::{format_energy, format_interval, format_last_refresh};
use crate::core::models::sensor::SensorSnapshot;

/// Render the usage sensor as a colored (or plain) block.
///
/// Layout:
/// ```text
///  SRP Energy Usage
///   Usage     12.35 kWh
///   Status    Available
///   Refresh   Updated 5m ago (every 24h)
///   Powered by SRP Energy
/// ```
pub fn render_sensor(
    snapshot: &SensorSnapshot,
    interval: Option<Duration>,
    use_color: bool,
) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!(" {}", snapshot.name).bold().to_string());

    let energy = format_energy(snapshot.state, &snapshot.unit_of_measurement);
    let energy: ColoredString = match snapshot.state {
        Some(_) if snapshot.available => energy.green(),
        Some(_) => energy.yellow(),
        None => energy.dimmed(),
    };
    lines.push(format!("  {}     {}", "Usage".cyan(), energy));

    let status = if snapshot.available {
        "Available".green()
    } else {
        "Unavailable".red()
    };
    lines.push(format!("  {}    {}", "Status".cyan(), status));
    if let Some(err) = &snapshot.last_error {
        lines.push(format!("            {}", err.red()));
    }

    let refreshed = snapshot
        .last_refresh
        .as_ref()
        .map(format_last_refresh)
        .unwrap_or_else(|| "Never updated".to_string());
    let refresh = match interval {
        Some(interval) => format!("{} ({})", refreshed, format_interval(interval)),
        None => refreshed,
    };
    lines.push(format!("  {}   {}", "Refresh".cyan(), refresh));

    if let Some(attribution) = &snapshot.attribution {
        lines.push(format!("  {}", attribution.dimmed()));
    }

    lines.join("\n")
}

/// One line per update, for `watch`.
pub fn render_update(snapshot: &SensorSnapshot, use_color: bool) -> String {
    control::set_override(use_color);

    let energy = format_energy(snapshot.state, &snapshot.unit_of_measurement);
    match &snapshot.last_error {
        Some(err) if !snapshot.available => {
            format!("{} {} ({})", snapshot.name.bold(), energy, err.red())
        }
        _ => format!("{} {}", snapshot.name.bold(), energy.green()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_snapshot() -> SensorSnapshot {
        SensorSnapshot {
            name: "SRP Energy Usage".to_string(),
            unique_id: "usage".to_string(),
            state: Some(12.345),
            unit_of_measurement: "kWh".to_string(),
            icon: "mdi:flash".to_string(),
            available: true,
            attribution: Some("Powered by SRP Energy".to_string()),
            last_refresh: Some(Utc::now()),
            last_error: None,
        }
    }

    #[test]
    fn render_contains_name_and_value() {
        let output = render_sensor(&make_snapshot(), None, false);
        assert!(output.contains("SRP Energy Usage"));
        assert!(output.contains("12.35 kWh"));
        assert!(output.contains("Available"));
        assert!(output.contains("Powered by SRP Energy"));
    }

    #[test]
    fn render_contains_interval() {
        let output = render_sensor(&make_snapshot(), Some(Duration::from_secs(86_400)), false);
        assert!(output.contains("Updated just now (every 24h)"));
    }

    #[test]
    fn render_unavailable_shows_error() {
        let mut snapshot = make_snapshot();
        snapshot.available = false;
        snapshot.last_error = Some("Timeout communicating with API".to_string());
        let output = render_sensor(&snapshot, None, false);
        assert!(output.contains("Unavailable"));
        assert!(output.contains("Timeout communicating with API"));
    }

    #[test]
    fn render_without_data() {
        let mut snapshot = make_snapshot();
        snapshot.state = None;
        snapshot.attribution = None;
        snapshot.last_refresh = None;
        let output = render_sensor(&snapshot, None, false);
        assert!(output.contains("unknown"));
        assert!(output.contains("Never updated"));
        assert!(!output.contains("Powered by"));
    }

    #[test]
    fn render_no_ansi_when_color_false() {
        let output = render_sensor(&make_snapshot(), None, false);
        assert!(!output.contains('\x1b'), "output should not contain ANSI codes");
        let line = render_update(&make_snapshot(), false);
        assert!(!line.contains('\x1b'));
    }

    #[test]
    fn update_line_shows_error_when_unavailable() {
        let mut snapshot = make_snapshot();
        snapshot.available = false;
        snapshot.last_error = Some("Error communicating with API: HTTP 500".to_string());
        let line = render_update(&snapshot, false);
        assert_eq!(
            line,
            "SRP Energy Usage 12.35 kWh (Error communicating with API: HTTP 500)"
        );
    }
}
