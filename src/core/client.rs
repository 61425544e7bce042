use chrono::NaiveDateTime;
use thiserror::Error;

use crate::core::config::ConfigEntry;
use crate::core::models::usage::UsageReading;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid account id '{0}': must be a string of digits")]
    InvalidAccount(String),
    #[error("Invalid usage window: {0}")]
    InvalidWindow(String),
    #[error("Failed to reach {endpoint}: {source}")]
    Connection {
        endpoint: &'static str,
        #[source]
        source: ureq::Error,
    },
    #[error("HTTP {status} from {endpoint}")]
    Http { status: u16, endpoint: &'static str },
    #[error("Malformed response from {endpoint}: {reason}")]
    Malformed {
        endpoint: &'static str,
        reason: String,
    },
}

impl ClientError {
    /// Errors caused by bad input rather than by the remote side.
    pub fn is_value_error(&self) -> bool {
        matches!(self, Self::InvalidAccount(_) | Self::InvalidWindow(_))
    }
}

/// Blocking access to a utility account's usage data.
///
/// Both calls perform network I/O and must be run off the async executor,
/// e.g. through `tokio::task::spawn_blocking`.
pub trait UsageClient: Send + Sync {
    /// Check the stored credentials against the remote service.
    ///
    /// `Ok(false)` means the service rejected the credentials.
    fn validate(&self) -> Result<bool, ClientError>;

    /// Hourly readings between `start` and `end` (local time).
    fn usage(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<UsageReading>, ClientError>;
}

/// Builds a [`UsageClient`] for a configured account.
pub trait Connector: Send + Sync {
    fn connect(&self, entry: &ConfigEntry) -> Result<Box<dyn UsageClient>, ClientError>;
}
