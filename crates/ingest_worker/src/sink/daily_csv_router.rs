use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use csv::Writer;
use tracing::{debug, error, info};

use crate::domain::{Row, RowSink, SinkResult, CSV_HEADER};

struct DailySink {
    writer: Writer<File>,
}

/// Owns one open CSV writer per UTC date key.
///
/// Files are named `data_<YYYY-MM-DD>.csv` under the output directory, opened
/// in append mode on first use, held open across pull cycles, and closed once
/// at shutdown. The header row is written only when the file was created
/// fresh by this run; a file inherited from an earlier run already carries
/// its header and is never re-headered.
pub struct DailyCsvRouter {
    output_dir: PathBuf,
    sinks: HashMap<String, DailySink>,
}

impl DailyCsvRouter {
    /// Creates the output directory if it does not exist yet.
    pub fn new(output_dir: impl Into<PathBuf>) -> SinkResult<Self> {
        let output_dir = output_dir.into();
        if !output_dir.exists() {
            std::fs::create_dir_all(&output_dir)?;
            info!(dir = %output_dir.display(), "created output directory");
        }
        Ok(Self {
            output_dir,
            sinks: HashMap::new(),
        })
    }

    pub fn file_path(&self, date_key: &str) -> PathBuf {
        daily_file_path(&self.output_dir, date_key)
    }

    fn open_sink(output_dir: &Path, date_key: &str) -> SinkResult<DailySink> {
        let path = daily_file_path(output_dir, date_key);
        let existed = path.is_file();

        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let mut writer = Writer::from_writer(file);

        if !existed {
            writer.write_record(CSV_HEADER)?;
            writer.flush()?;
        }

        info!(
            date = date_key,
            path = %path.display(),
            existed,
            "opened daily csv"
        );
        Ok(DailySink { writer })
    }
}

impl RowSink for DailyCsvRouter {
    fn append(&mut self, date_key: &str, row: &Row) -> SinkResult<()> {
        let sink = match self.sinks.entry(date_key.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let sink = Self::open_sink(&self.output_dir, date_key)?;
                entry.insert(sink)
            }
        };

        sink.writer.write_record(row.fields())?;
        sink.writer.flush()?;
        Ok(())
    }

    fn close_all(&mut self) {
        for (date_key, mut sink) in self.sinks.drain() {
            match sink.writer.flush() {
                Ok(()) => debug!(date = %date_key, "closed daily csv"),
                Err(e) => error!(date = %date_key, error = %e, "failed to flush daily csv on close"),
            }
        }
    }
}

fn daily_file_path(output_dir: &Path, date_key: &str) -> PathBuf {
    output_dir.join(format!("data_{date_key}.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ruuvi_row(temperature: &str) -> Row {
        Row {
            device_id: "AA:BB:CC:DD:EE:FF".to_string(),
            sensor_type: "Ruuvitag".to_string(),
            temperature: temperature.to_string(),
            ..Row::default()
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    const HEADER_LINE: &str =
        "Device ID,Sensor Type,Temperature,Humidity,Pressure,Volumetric Water Content,Electrical Conductivity";

    #[test]
    fn creates_output_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("out").join("daily");
        DailyCsvRouter::new(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn writes_header_exactly_once_per_fresh_file() {
        let dir = TempDir::new().unwrap();
        let mut router = DailyCsvRouter::new(dir.path()).unwrap();

        router.append("2024-06-01", &ruuvi_row("20.1")).unwrap();
        router.append("2024-06-01", &ruuvi_row("20.3")).unwrap();
        router.close_all();

        let lines = read_lines(&router.file_path("2024-06-01"));
        assert_eq!(
            lines,
            vec![
                HEADER_LINE.to_string(),
                "AA:BB:CC:DD:EE:FF,Ruuvitag,20.1,,,,".to_string(),
                "AA:BB:CC:DD:EE:FF,Ruuvitag,20.3,,,,".to_string(),
            ]
        );
    }

    #[test]
    fn does_not_reheader_preexisting_file() {
        let dir = TempDir::new().unwrap();

        // First run.
        let mut router = DailyCsvRouter::new(dir.path()).unwrap();
        router.append("2024-06-01", &ruuvi_row("20.1")).unwrap();
        router.close_all();
        drop(router);

        // Second run against the same file.
        let mut router = DailyCsvRouter::new(dir.path()).unwrap();
        router.append("2024-06-01", &ruuvi_row("21.5")).unwrap();
        router.close_all();

        let lines = read_lines(&router.file_path("2024-06-01"));
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER_LINE);
        assert_eq!(lines.iter().filter(|l| *l == HEADER_LINE).count(), 1);
        assert_eq!(lines[2], "AA:BB:CC:DD:EE:FF,Ruuvitag,21.5,,,,");
    }

    #[test]
    fn routes_dates_to_separate_files() {
        let dir = TempDir::new().unwrap();
        let mut router = DailyCsvRouter::new(dir.path()).unwrap();

        router.append("2024-06-01", &ruuvi_row("20.1")).unwrap();
        router.append("2024-06-02", &ruuvi_row("19.8")).unwrap();
        router.close_all();

        assert!(router.file_path("2024-06-01").is_file());
        assert!(router.file_path("2024-06-02").is_file());
        assert_eq!(read_lines(&router.file_path("2024-06-02")).len(), 2);
    }

    #[test]
    fn quotes_fields_containing_the_delimiter() {
        let dir = TempDir::new().unwrap();
        let mut router = DailyCsvRouter::new(dir.path()).unwrap();

        let row = Row {
            device_id: "weird,device".to_string(),
            sensor_type: "Ruuvitag".to_string(),
            ..Row::default()
        };
        router.append("2024-06-01", &row).unwrap();
        router.close_all();

        let lines = read_lines(&router.file_path("2024-06-01"));
        assert_eq!(lines[1], "\"weird,device\",Ruuvitag,,,,,");
    }
}
