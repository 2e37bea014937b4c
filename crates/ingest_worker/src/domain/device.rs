use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::Row;

// Six colon- or hyphen-separated hex byte pairs, case-insensitive.
static MAC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}$").expect("regex")
});

/// Telemetry source classification, determined solely from the device key's
/// lexical form. Adding a device kind means adding a variant here and its
/// expansion arm in [`expand_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    RuuviTag,
    Teros12,
    Unknown,
}

impl DeviceKind {
    pub fn from_device_key(device_key: &str) -> Self {
        if MAC_RE.is_match(device_key) {
            DeviceKind::RuuviTag
        } else if device_key == "TEROS12" {
            DeviceKind::Teros12
        } else {
            DeviceKind::Unknown
        }
    }

    /// Value of the "Sensor Type" output column.
    pub fn sensor_type(&self) -> &'static str {
        match self {
            DeviceKind::RuuviTag => "Ruuvitag",
            DeviceKind::Teros12 => "TEROS 12",
            DeviceKind::Unknown => "",
        }
    }
}

/// Expand one decoded event into output rows, one per sample index of the
/// kind's primary reading array (temperature for RuuviTag, volumetric water
/// content for Teros12).
///
/// Companion arrays shorter than the primary contribute empty fields past
/// their end. Absent or non-array reading values are treated as empty arrays.
/// Unknown device kinds produce no rows. Never fails.
pub fn expand_rows(kind: DeviceKind, device_key: &str, readings: &Map<String, Value>) -> Vec<Row> {
    match kind {
        DeviceKind::RuuviTag => {
            let temperatures = samples(readings, "temperature");
            let humidities = samples(readings, "humidity");
            let pressures = samples(readings, "pressure");

            (0..temperatures.len())
                .map(|i| Row {
                    device_id: device_key.to_string(),
                    sensor_type: kind.sensor_type().to_string(),
                    temperature: sample_at(temperatures, i),
                    humidity: sample_at(humidities, i),
                    pressure: sample_at(pressures, i),
                    ..Row::default()
                })
                .collect()
        }
        DeviceKind::Teros12 => {
            let vwc_values = samples(readings, "volumetric_water_content");
            let temperatures = samples(readings, "temperature");
            let ec_values = samples(readings, "electrical_conductivity");

            (0..vwc_values.len())
                .map(|i| Row {
                    device_id: device_key.to_string(),
                    sensor_type: kind.sensor_type().to_string(),
                    temperature: sample_at(temperatures, i),
                    volumetric_water_content: sample_at(vwc_values, i),
                    electrical_conductivity: sample_at(ec_values, i),
                    ..Row::default()
                })
                .collect()
        }
        DeviceKind::Unknown => {
            warn!(device_key, "unknown device key, no rows emitted");
            Vec::new()
        }
    }
}

fn samples<'a>(readings: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    readings
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn sample_at(values: &[Value], index: usize) -> String {
    match values.get(index) {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
