use std::sync::Arc;

use chrono::{Duration, Local};
use thiserror::Error;
use tracing::{error, info};

use crate::core::client::{ClientError, Connector, UsageClient};
use crate::core::config::{ConfigEntry, Settings};
use crate::core::coordinator::{Coordinator, CoordinatorOptions, UpdateFailed, UpdateFuture};
use crate::core::models::usage::daily_total;
use crate::core::sensor::UsageSensor;

#[derive(Error, Debug)]
pub enum SetupError {
    /// Transient; setup can be retried later.
    #[error("SRP Energy is not ready: {0}")]
    NotReady(#[source] ClientError),
    #[error("SRP Energy setup task failed: {0}")]
    Task(String),
}

impl From<ClientError> for UpdateFailed {
    fn from(err: ClientError) -> Self {
        Self::Fetch(err.to_string())
    }
}

/// A running SRP Energy integration: client, coordinator and sensor.
pub struct Integration {
    title: String,
    client: Arc<dyn UsageClient>,
    coordinator: Coordinator<f64>,
    sensor: UsageSensor,
}

impl Integration {
    /// Connect, fetch the initial data and attach the usage sensor.
    pub async fn setup(
        entry: &ConfigEntry,
        settings: &Settings,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SetupError> {
        let client = connect(entry, connector).await?;

        let options = CoordinatorOptions::new("sensor", settings.update_interval())
            .request_timeout(settings.request_timeout());
        let coordinator = Coordinator::new(options, daily_usage_method(Arc::clone(&client)));

        // Fetch initial data so the sensor has a value when it subscribes.
        coordinator.refresh_now().await;

        let sensor = UsageSensor::attach(coordinator.clone(), &entry.name);
        info!(
            title = %entry.name,
            available = coordinator.is_available(),
            "SRP Energy set up"
        );

        Ok(Self {
            title: entry.name.clone(),
            client,
            coordinator,
            sensor,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn sensor(&self) -> &UsageSensor {
        &self.sensor
    }

    pub fn coordinator(&self) -> &Coordinator<f64> {
        &self.coordinator
    }

    /// Tear everything down. The sensor is the only platform to unload.
    pub async fn unload(mut self) -> bool {
        self.sensor.remove();
        self.coordinator.shutdown();

        let client = self.client;
        drop(self.coordinator);
        // The client may own blocking I/O resources; release it off the executor.
        if let Err(err) = tokio::task::spawn_blocking(move || drop(client)).await {
            error!(error = %err, "Failed to release SRP client");
        }
        info!(title = %self.title, "SRP Energy unloaded");
        true
    }
}

async fn connect(
    entry: &ConfigEntry,
    connector: Arc<dyn Connector>,
) -> Result<Arc<dyn UsageClient>, SetupError> {
    let entry = entry.clone();
    let connected = tokio::task::spawn_blocking(move || connector.connect(&entry))
        .await
        .map_err(|err| SetupError::Task(err.to_string()))?;

    match connected {
        Ok(client) => Ok(Arc::from(client)),
        Err(err) => {
            error!("Unable to connect to Srp Energy: {}", err);
            Err(SetupError::NotReady(err))
        }
    }
}

/// Update method summing the last 24 hours of hourly usage.
fn daily_usage_method(client: Arc<dyn UsageClient>) -> impl Fn() -> UpdateFuture<f64> {
    move || -> UpdateFuture<f64> {
        let client = Arc::clone(&client);
        Box::pin(async move {
            let end = Local::now().naive_local();
            let start = end - Duration::days(1);
            let readings = tokio::task::spawn_blocking(move || client.usage(start, end))
                .await
                .map_err(|err| UpdateFailed::Fetch(format!("usage task failed: {}", err)))??;
            daily_total(&readings).map_err(|err| UpdateFailed::Fetch(err.to_string()))
        })
    }
}
