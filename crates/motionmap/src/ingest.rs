use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use rusqlite::params;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use motionmap_engine::model::{SensorId, ACTIVE_VALUE};
use motionmap_engine::timestamp::{format_wire_timestamp, require_explicit_offset};

use crate::db::{upsert_sensor_in_tx, Database};

const DEFAULT_SENSOR_TYPE: &str = "imported";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub total_rows: usize,
    pub imported_rows: usize,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone)]
struct ImportCsvColumns {
    sensor: usize,
    timestamp: usize,
    value: Option<usize>,
    name: Option<usize>,
    kind: Option<usize>,
}

impl ImportCsvColumns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let sensor = find_csv_header_index(headers, &["sensor", "sensor_id", "unique_id", "device"]);
        let timestamp = find_csv_header_index(headers, &["timestamp", "time", "ts", "datetime"]);
        let (Some(sensor), Some(timestamp)) = (sensor, timestamp) else {
            bail!("CSV missing required columns. Need sensor and timestamp.");
        };
        Ok(Self {
            sensor,
            timestamp,
            value: find_csv_header_index(headers, &["value", "state", "event"]),
            name: find_csv_header_index(headers, &["name", "sensor_name"]),
            kind: find_csv_header_index(headers, &["type", "sensor_type", "kind"]),
        })
    }
}

/// Imports events from `csv_path` in one transaction. Sensors are created on
/// first sight, keyed by their unique id. Rows whose timestamp lacks an
/// explicit offset are skipped.
pub fn import_csv_file(db: &mut Database, csv_path: &Path) -> Result<ImportStats> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("failed to open CSV file: {}", csv_path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read CSV headers: {}", csv_path.display()))?
        .clone();
    let columns = ImportCsvColumns::from_headers(&headers)?;

    let stats = db.with_transaction(|tx| {
        let mut sensor_cache: HashMap<String, SensorId> = HashMap::new();
        let mut stats = ImportStats::default();

        for (row_idx, row_result) in reader.records().enumerate() {
            stats.total_rows += 1;
            let line = row_idx + 2;
            let row = match row_result {
                Ok(row) => row,
                Err(err) => {
                    stats.skipped_rows += 1;
                    warn!(line, "CSV row parse error: {err}");
                    continue;
                }
            };

            let Some(unique_id) = csv_record_text(&row, Some(columns.sensor)) else {
                stats.skipped_rows += 1;
                warn!(line, "CSV row has no sensor");
                continue;
            };
            let timestamp = match csv_record_text(&row, Some(columns.timestamp))
                .map(require_explicit_offset)
            {
                Some(Ok(at)) => at,
                Some(Err(err)) => {
                    stats.skipped_rows += 1;
                    warn!(line, "CSV row rejected: {err}");
                    continue;
                }
                None => {
                    stats.skipped_rows += 1;
                    warn!(line, "CSV row has no timestamp");
                    continue;
                }
            };
            let value = csv_record_text(&row, columns.value).unwrap_or(ACTIVE_VALUE);

            let sensor_id = match sensor_cache.get(unique_id) {
                Some(id) => *id,
                None => {
                    let name = csv_record_text(&row, columns.name).unwrap_or(unique_id);
                    let kind = csv_record_text(&row, columns.kind).unwrap_or(DEFAULT_SENSOR_TYPE);
                    let id = upsert_sensor_in_tx(tx, unique_id, name, kind)?;
                    sensor_cache.insert(unique_id.to_owned(), id);
                    id
                }
            };

            tx.execute(
                "INSERT INTO activity_logs (sensor_id, timestamp, value) VALUES (?1, ?2, ?3)",
                params![sensor_id, format_wire_timestamp(timestamp), value],
            )
            .context("failed to insert imported event")?;
            stats.imported_rows += 1;
        }

        Ok(stats)
    })?;

    if stats.total_rows == 0 {
        bail!("CSV has no data rows");
    }
    if stats.imported_rows == 0 {
        bail!("CSV contains no valid rows");
    }

    info!(
        path = %csv_path.display(),
        imported = stats.imported_rows,
        skipped = stats.skipped_rows,
        "imported events"
    );
    Ok(stats)
}

fn find_csv_header_index(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    let normalized_aliases: HashSet<String> =
        aliases.iter().map(|alias| normalize_csv_header_key(alias)).collect();

    headers
        .iter()
        .position(|header| normalized_aliases.contains(&normalize_csv_header_key(header)))
}

fn normalize_csv_header_key(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

fn csv_record_text(record: &StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use motionmap_engine::ActivityStore;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn header_aliases_are_normalized() {
        let headers = StringRecord::from(vec!["Sensor ID", "Date-Time", "State"]);
        let columns = ImportCsvColumns::from_headers(&headers).unwrap();
        assert_eq!(columns.sensor, 0);
        assert_eq!(columns.timestamp, 1);
        assert_eq!(columns.value, Some(2));

        let missing = StringRecord::from(vec!["sensor", "value"]);
        assert!(ImportCsvColumns::from_headers(&missing).is_err());
    }

    #[test]
    fn imports_rows_with_explicit_offsets_only() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("events.csv");
        fs::write(
            &csv_path,
            "\
sensor,timestamp,value,name
hall,2024-05-06T09:00:00Z,active,Hallway
hall,2024-05-06T11:30:00+02:00,,
den,2024-05-06 10:00:00,active,Den
,2024-05-06T10:00:00Z,active,
den,2024-05-06T10:00:00Z,inactive,Den
",
        )
        .unwrap();

        let mut db = Database::open(&dir.path().join("motionmap.db")).unwrap();
        let stats = import_csv_file(&mut db, &csv_path).unwrap();
        assert_eq!(
            stats,
            ImportStats {
                total_rows: 5,
                imported_rows: 3,
                skipped_rows: 2,
            }
        );

        let sensors = db.list_sensors().unwrap();
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].name, "Hallway");
        let events = db.list_events().unwrap();
        assert_eq!(events[1].timestamp, "2024-05-06T09:30:00.000Z");
        assert_eq!(events[1].value, "active");
    }

    #[test]
    fn empty_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("empty.csv");
        fs::write(&csv_path, "sensor,timestamp\n").unwrap();
        let mut db = Database::open(&dir.path().join("motionmap.db")).unwrap();
        assert!(import_csv_file(&mut db, &csv_path).is_err());
    }
}
