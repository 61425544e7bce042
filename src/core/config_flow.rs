use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::core::client::Connector;
use crate::core::config::{ConfigEntry, DEFAULT_NAME};

pub const STEP_USER: &str = "user";

/// Values submitted through the setup form.
#[derive(Clone, Default)]
pub struct UserInput {
    pub account_id: String,
    pub username: String,
    pub password: String,
    pub name: Option<String>,
    pub is_tou: Option<bool>,
}

impl UserInput {
    fn into_entry(self) -> ConfigEntry {
        ConfigEntry {
            account_id: self.account_id,
            username: self.username,
            password: self.password,
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NAME.to_string()),
            is_tou: self.is_tou.unwrap_or(false),
        }
    }
}

impl fmt::Debug for UserInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserInput")
            .field("account_id", &self.account_id)
            .field("username", &self.username)
            .field("name", &self.name)
            .field("is_tou", &self.is_tou)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowError {
    #[error("Invalid username or password")]
    InvalidAuth,
    #[error("Invalid account id")]
    InvalidAccount,
    #[error("Unexpected error")]
    Unknown,
}

impl FlowError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAuth => "invalid_auth",
            Self::InvalidAccount => "invalid_account",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    SingleInstanceAllowed,
}

impl AbortReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SingleInstanceAllowed => "single_instance_allowed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    /// Show (or re-show) the form, with errors keyed by field (`base` for the form itself)
    Form {
        step_id: &'static str,
        errors: BTreeMap<&'static str, FlowError>,
    },
    CreateEntry {
        title: String,
        data: ConfigEntry,
    },
    Abort {
        reason: AbortReason,
    },
}

/// Collects and validates SRP credentials before an entry is stored.
pub struct ConfigFlow {
    connector: Arc<dyn Connector>,
}

impl ConfigFlow {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Handle the user step. `existing` is the entry already configured, if any.
    pub async fn step_user(
        &self,
        existing: Option<&ConfigEntry>,
        input: Option<UserInput>,
    ) -> FlowResult {
        if existing.is_some() {
            return FlowResult::Abort {
                reason: AbortReason::SingleInstanceAllowed,
            };
        }

        let mut errors = BTreeMap::new();
        if let Some(input) = input {
            let entry = input.into_entry();
            match self.validate(&entry).await {
                Ok(()) => {
                    info!(account = %entry.account_id, "Credentials accepted");
                    return FlowResult::CreateEntry {
                        title: entry.name.clone(),
                        data: entry,
                    };
                }
                Err(err) => {
                    errors.insert("base", err);
                }
            }
        }

        FlowResult::Form {
            step_id: STEP_USER,
            errors,
        }
    }

    /// Import an entry from flags or the config file.
    pub async fn step_import(&self, existing: Option<&ConfigEntry>, input: UserInput) -> FlowResult {
        self.step_user(existing, Some(input)).await
    }

    async fn validate(&self, entry: &ConfigEntry) -> Result<(), FlowError> {
        let connector = Arc::clone(&self.connector);
        let entry = entry.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let client = connector.connect(&entry)?;
            client.validate()
        })
        .await;

        match outcome {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(FlowError::InvalidAuth),
            Ok(Err(err)) if err.is_value_error() => Err(FlowError::InvalidAccount),
            Ok(Err(err)) => {
                error!(error = %err, "Unexpected exception");
                Err(FlowError::Unknown)
            }
            Err(err) => {
                error!(error = %err, "Credential validation task failed");
                Err(FlowError::Unknown)
            }
        }
    }
}
