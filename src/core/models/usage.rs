use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One hourly interval as reported by the usage API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReading {
    pub date: NaiveDate,
    /// Hour of day (0-23) the interval starts at
    pub hour: u32,
    /// Minute the interval starts at, usually 0
    pub minute: u32,
    /// Energy consumed in the interval. `None` when the API sent nothing usable.
    pub kwh: Option<f64>,
    /// Cost of the interval in dollars, if reported
    pub cost: Option<f64>,
}

impl UsageReading {
    pub fn new(date: NaiveDate, hour: u32, minute: u32, kwh: f64, cost: f64) -> Self {
        Self {
            date,
            hour,
            minute,
            kwh: Some(kwh),
            cost: Some(cost),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UsageError {
    #[error("Reading {index} ({date} {hour:02}:{minute:02}) has no numeric kWh value")]
    MissingKwh {
        index: usize,
        date: NaiveDate,
        hour: u32,
        minute: u32,
    },
}

/// Sum the kWh of every reading into the daily usage total.
///
/// A reading without a kWh value fails the whole aggregation instead of
/// counting as zero.
pub fn daily_total(readings: &[UsageReading]) -> Result<f64, UsageError> {
    readings
        .iter()
        .enumerate()
        .try_fold(0.0, |total, (index, reading)| match reading.kwh {
            Some(kwh) if kwh.is_finite() => Ok(total + kwh),
            _ => Err(UsageError::MissingKwh {
                index,
                date: reading.date,
                hour: reading.hour,
                minute: reading.minute,
            }),
        })
}
