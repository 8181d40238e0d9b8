use std::fmt;

use serde_json::Value;

use super::DeviceSnapshot;
use crate::api::ApiError;

/// Property holding today's water consumption
const USAGE_PROPERTY: &str = "gallons_used_today";

/// Today's water consumption as reported by the softener.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterUsage {
    pub gallons: f64,
    pub updated_at: String,
}

impl WaterUsage {
    /// Extract `device.properties.gallons_used_today.{converted_value, updated_at}`.
    ///
    /// `converted_value` is accepted as a JSON number or a numeric string.
    /// `updated_at` is passed through as text whatever its JSON type.
    pub fn from_snapshot(snapshot: &DeviceSnapshot) -> Result<Self, ApiError> {
        let property = snapshot.property(USAGE_PROPERTY).ok_or_else(|| {
            ApiError::PayloadShape(format!("missing device.properties.{}", USAGE_PROPERTY))
        })?;

        let value = field(property, "converted_value")?;
        let gallons = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            ApiError::PayloadShape(format!(
                "{}.converted_value is not numeric: {}",
                USAGE_PROPERTY, value
            ))
        })?;

        let updated_at = match field(property, "updated_at")? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        Ok(Self {
            gallons,
            updated_at,
        })
    }
}

fn field<'a>(property: &'a Value, key: &str) -> Result<&'a Value, ApiError> {
    property
        .get(key)
        .ok_or_else(|| ApiError::PayloadShape(format!("{}.{} is missing", USAGE_PROPERTY, key)))
}

impl fmt::Display for WaterUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Water usage: {}\tUpdated: {}",
            self.gallons, self.updated_at
        )
    }
}

/// Sensor-style view of the latest snapshot: a single value or nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageSensor;

impl UsageSensor {
    pub const NAME: &'static str = "Water Usage Today";
    pub const UNIT: &'static str = "gal";

    /// Current reading, `None` if nothing was fetched yet or the shape is wrong
    pub fn native_value(&self, snapshot: Option<&DeviceSnapshot>) -> Option<f64> {
        snapshot
            .and_then(|s| WaterUsage::from_snapshot(s).ok())
            .map(|u| u.gallons)
    }
}
