use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the usage sensor displays at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub name: String,
    pub unique_id: String,
    /// Previous day's consumption in kWh, `None` until the first successful refresh
    pub state: Option<f64>,
    pub unit_of_measurement: String,
    pub icon: String,
    /// Whether the most recent refresh succeeded
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,
    /// Reason the most recent refresh failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
