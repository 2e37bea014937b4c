/// Column names shared by every daily CSV file, in output order.
pub const CSV_HEADER: [&str; 7] = [
    "Device ID",
    "Sensor Type",
    "Temperature",
    "Humidity",
    "Pressure",
    "Volumetric Water Content",
    "Electrical Conductivity",
];

/// One flat output record. Fields that do not apply to a device kind, or
/// whose reading array is shorter than the row index, stay empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    pub device_id: String,
    pub sensor_type: String,
    pub temperature: String,
    pub humidity: String,
    pub pressure: String,
    pub volumetric_water_content: String,
    pub electrical_conductivity: String,
}

impl Row {
    /// Field values in [`CSV_HEADER`] order.
    pub fn fields(&self) -> [&str; 7] {
        [
            &self.device_id,
            &self.sensor_type,
            &self.temperature,
            &self.humidity,
            &self.pressure,
            &self.volumetric_water_content,
            &self.electrical_conductivity,
        ]
    }
}
