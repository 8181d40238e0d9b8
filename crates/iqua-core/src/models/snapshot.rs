use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One device payload as returned by the data endpoint.
///
/// The payload is kept as raw JSON; the API returns far more properties than
/// any consumer reads, and their shape varies between softener models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    payload: Value,
    fetched_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            fetched_at: Utc::now(),
        }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Look up a property object under `device.properties`
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.payload.get("device")?.get("properties")?.get(name)
    }
}
