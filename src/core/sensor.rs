use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::core::coordinator::{Coordinator, CoordinatorSnapshot, ListenerHandle};
use crate::core::models::sensor::SensorSnapshot;

pub const SENSOR_NAME: &str = "Usage";
pub const SENSOR_TYPE: &str = "usage";
pub const ENERGY_KWH: &str = "kWh";
pub const ICON: &str = "mdi:flash";
pub const ATTRIBUTION: &str = "Powered by SRP Energy";

/// The previous day's energy usage, pushed from the coordinator.
pub struct UsageSensor {
    name: String,
    coordinator: Coordinator<f64>,
    updates: Arc<watch::Sender<SensorSnapshot>>,
    listener: Option<ListenerHandle<f64>>,
}

impl UsageSensor {
    /// Create the sensor and subscribe it to coordinator updates.
    pub fn attach(coordinator: Coordinator<f64>, entry_name: &str) -> Self {
        let name = format!("{} {}", entry_name, SENSOR_NAME);
        let initial = to_snapshot(&name, &coordinator.snapshot());
        let (tx, _) = watch::channel(initial);
        let updates = Arc::new(tx);

        let publisher = Arc::clone(&updates);
        let listener_name = name.clone();
        let listener = coordinator.register_listener(move |snapshot| {
            publisher.send_replace(to_snapshot(&listener_name, snapshot));
        });
        debug!(sensor = %name, "Sensor attached");

        Self {
            name,
            coordinator,
            updates,
            listener: Some(listener),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        self.updates.borrow().clone()
    }

    /// Receive every snapshot published after a refresh.
    pub fn subscribe(&self) -> watch::Receiver<SensorSnapshot> {
        self.updates.subscribe()
    }

    /// Ask the coordinator for fresh data.
    pub async fn request_update(&self) {
        self.coordinator.refresh_now().await;
    }

    /// Stop receiving updates. Polling stops if this was the last listener.
    pub fn remove(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.unregister();
            debug!(sensor = %self.name, "Sensor removed");
        }
    }
}

fn to_snapshot(name: &str, state: &CoordinatorSnapshot<f64>) -> SensorSnapshot {
    SensorSnapshot {
        name: name.to_string(),
        unique_id: SENSOR_TYPE.to_string(),
        state: state.data,
        unit_of_measurement: ENERGY_KWH.to_string(),
        icon: ICON.to_string(),
        available: state.last_update_success,
        attribution: state.data.map(|_| ATTRIBUTION.to_string()),
        last_refresh: state.last_refresh,
        last_error: state.last_error.as_ref().map(|e| e.to_string()),
    }
}
