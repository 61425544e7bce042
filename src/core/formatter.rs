use chrono::{DateTime, Utc};
use std::time::Duration;

/// Returns "12.35 kWh", or "unknown" when there is no reading yet.
pub fn format_energy(kwh: Option<f64>, unit: &str) -> String {
    match kwh {
        Some(value) => format!("{:.2} {}", value, unit),
        None => "unknown".to_string(),
    }
}

/// Returns "Updated 5m ago" relative to now. Future or sub-minute times read "Updated just now".
pub fn format_last_refresh(at: &DateTime<Utc>) -> String {
    let elapsed = (Utc::now() - *at).num_seconds();
    if elapsed < 60 {
        return "Updated just now".to_string();
    }

    let minutes = elapsed / 60;
    let hours = minutes / 60;
    if hours >= 24 {
        let days = hours / 24;
        let remaining_hours = hours % 24;
        if remaining_hours == 0 {
            format!("Updated {}d ago", days)
        } else {
            format!("Updated {}d {}h ago", days, remaining_hours)
        }
    } else if hours > 0 {
        format!("Updated {}h {}m ago", hours, minutes % 60)
    } else {
        format!("Updated {}m ago", minutes)
    }
}

/// Returns a polling interval like "every 24h", "every 1h 30m" or "every 45s".
pub fn format_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs < 60 {
        return format!("every {}s", secs);
    }
    let minutes = secs / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    match (hours, minutes) {
        (0, m) => format!("every {}m", m),
        (h, 0) => format!("every {}h", h),
        (h, m) => format!("every {}h {}m", h, m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_energy_two_decimals() {
        assert_eq!(format_energy(Some(3.5), "kWh"), "3.50 kWh");
        assert_eq!(format_energy(Some(12.345), "kWh"), "12.35 kWh");
        assert_eq!(format_energy(None, "kWh"), "unknown");
    }

    #[test]
    fn format_last_refresh_recent() {
        let at = Utc::now() - chrono::Duration::seconds(10);
        assert_eq!(format_last_refresh(&at), "Updated just now");
        let future = Utc::now() + chrono::Duration::minutes(5);
        assert_eq!(format_last_refresh(&future), "Updated just now");
    }

    #[test]
    fn format_last_refresh_minutes_and_hours() {
        let at = Utc::now() - chrono::Duration::minutes(5) - chrono::Duration::seconds(5);
        assert_eq!(format_last_refresh(&at), "Updated 5m ago");

        let at = Utc::now() - chrono::Duration::minutes(135) - chrono::Duration::seconds(5);
        assert_eq!(format_last_refresh(&at), "Updated 2h 15m ago");
    }

    #[test]
    fn format_last_refresh_days() {
        let at = Utc::now() - chrono::Duration::hours(48) - chrono::Duration::seconds(5);
        assert_eq!(format_last_refresh(&at), "Updated 2d ago");
        let at = Utc::now() - chrono::Duration::hours(27) - chrono::Duration::seconds(5);
        assert_eq!(format_last_refresh(&at), "Updated 1d 3h ago");
    }

    #[test]
    fn format_interval_units() {
        assert_eq!(format_interval(Duration::from_secs(30)), "every 30s");
        assert_eq!(format_interval(Duration::from_secs(45 * 60)), "every 45m");
        assert_eq!(format_interval(Duration::from_secs(24 * 3600)), "every 24h");
        assert_eq!(format_interval(Duration::from_secs(90 * 60)), "every 1h 30m");
    }
}
