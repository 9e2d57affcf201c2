use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use motionmap_engine::model::{
    Adjustment, AdjustmentId, NewAdjustment, RawAdjustment, RawEvent, Sensor, SensorId,
};
use motionmap_engine::timestamp::format_wire_timestamp;
use motionmap_engine::{ActivityStore, SlotPlan};

pub const DEMO_PREFIX: &str = "demo-";

#[derive(Debug, Clone)]
pub struct EventInsert {
    pub sensor_id: SensorId,
    pub timestamp: DateTime<Utc>,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub sensors: usize,
    pub events: usize,
    pub adjustments: usize,
}

pub struct Database {
    conn: Connection,
    sensor_cache: HashMap<String, SensorId>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create SQLite directory: {}",
                    parent.display()
                )
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database: {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("failed to set busy timeout")?;

        conn.execute_batch(
            "\
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sensors (
              id INTEGER PRIMARY KEY,
              unique_id TEXT NOT NULL UNIQUE,
              name TEXT NOT NULL,
              type TEXT NOT NULL DEFAULT '',
              is_hidden INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS activity_logs (
              id INTEGER PRIMARY KEY,
              sensor_id INTEGER NOT NULL,
              timestamp TEXT NOT NULL,
              value TEXT NOT NULL,
              FOREIGN KEY(sensor_id) REFERENCES sensors(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS data_adjustments (
              id INTEGER PRIMARY KEY,
              timestamp TEXT NOT NULL,
              sensor_id INTEGER,
              value INTEGER NOT NULL,
              comment TEXT NOT NULL DEFAULT '',
              created_at TEXT NOT NULL,
              FOREIGN KEY(sensor_id) REFERENCES sensors(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_logs_sensor_ts ON activity_logs(sensor_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_adjustments_sensor_ts ON data_adjustments(sensor_id, timestamp);",
        )
        .context("failed to initialize schema")?;

        Ok(Self {
            conn,
            sensor_cache: HashMap::new(),
        })
    }

    /// Returns the id of the sensor with `unique_id`, creating it if needed.
    /// An existing sensor keeps its name, type and visibility.
    pub fn upsert_sensor(&mut self, unique_id: &str, name: &str, kind: &str) -> Result<SensorId> {
        if let Some(id) = self.sensor_cache.get(unique_id) {
            return Ok(*id);
        }

        let tx = self
            .conn
            .transaction()
            .context("failed to start upsert_sensor transaction")?;
        let id = upsert_sensor_in_tx(&tx, unique_id, name, kind)?;
        tx.commit().context("failed to commit upsert_sensor transaction")?;

        self.sensor_cache.insert(unique_id.to_owned(), id);
        Ok(id)
    }

    pub fn insert_events(&mut self, events: &[EventInsert]) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start insert_events transaction")?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO activity_logs (sensor_id, timestamp, value) VALUES (?1, ?2, ?3)")
                .context("failed to prepare event insert")?;
            for event in events {
                stmt.execute(params![
                    event.sensor_id,
                    format_wire_timestamp(event.timestamp),
                    event.value,
                ])
                .context("failed to insert event")?;
            }
        }
        tx.commit().context("failed to commit insert_events transaction")?;
        debug!(count = events.len(), "inserted events");
        Ok(events.len())
    }

    /// Runs `f` inside one transaction; nothing is kept if it fails.
    pub fn with_transaction<T>(&mut self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let tx = self
            .conn
            .transaction()
            .context("failed to open transaction")?;
        let out = f(&tx)?;
        tx.commit().context("failed to commit transaction")?;
        Ok(out)
    }

    pub fn set_sensor_hidden(&mut self, id: SensorId, hidden: bool) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE sensors SET is_hidden = ?1 WHERE id = ?2",
                params![bool_to_i64(hidden), id],
            )
            .context("failed to update sensors.is_hidden")?;
        if changed == 0 {
            bail!("sensor {id} does not exist");
        }
        info!(sensor_id = id, hidden, "updated sensor visibility");
        Ok(())
    }

    /// Deletes every sensor whose unique id starts with `prefix`, with its events
    /// and adjustments.
    pub fn purge_sensors_with_prefix(&mut self, prefix: &str) -> Result<PurgeStats> {
        let pattern = format!("{}%", escape_like(prefix));
        let tx = self
            .conn
            .transaction()
            .context("failed to start purge transaction")?;

        let ids: Vec<SensorId> = {
            let mut stmt = tx
                .prepare("SELECT id FROM sensors WHERE unique_id LIKE ?1 ESCAPE '\\'")
                .context("failed to prepare purge lookup")?;
            let rows = stmt
                .query_map(params![pattern], |row| row.get::<_, i64>(0))
                .context("failed to query sensors to purge")?;
            rows.collect::<rusqlite::Result<_>>()
                .context("failed to read sensors to purge")?
        };

        let mut stats = PurgeStats::default();
        for id in &ids {
            stats.events += tx
                .execute("DELETE FROM activity_logs WHERE sensor_id = ?1", params![id])
                .context("failed to delete sensor events")?;
            stats.adjustments += tx
                .execute("DELETE FROM data_adjustments WHERE sensor_id = ?1", params![id])
                .context("failed to delete sensor adjustments")?;
            stats.sensors += tx
                .execute("DELETE FROM sensors WHERE id = ?1", params![id])
                .context("failed to delete sensor")?;
        }

        tx.commit().context("failed to commit purge transaction")?;
        self.sensor_cache.clear();
        Ok(stats)
    }
}

impl ActivityStore for Database {
    type Error = anyhow::Error;

    fn list_events(&self) -> Result<Vec<RawEvent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, sensor_id, timestamp, value FROM activity_logs ORDER BY timestamp, id")
            .context("failed to prepare event query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RawEvent {
                    id: row.get(0)?,
                    sensor_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    value: row.get(3)?,
                })
            })
            .context("failed to query events")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read events")
    }

    fn list_adjustments(&self) -> Result<Vec<RawAdjustment>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, sensor_id, timestamp, value, comment FROM data_adjustments ORDER BY id")
            .context("failed to prepare adjustment query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RawAdjustment {
                    id: row.get(0)?,
                    sensor_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    value: row.get(3)?,
                    comment: row.get(4)?,
                })
            })
            .context("failed to query adjustments")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read adjustments")
    }

    fn list_sensors(&self) -> Result<Vec<Sensor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, type, unique_id, is_hidden FROM sensors ORDER BY id")
            .context("failed to prepare sensor query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Sensor {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    kind: row.get(2)?,
                    unique_id: row.get(3)?,
                    is_hidden: row.get::<_, i64>(4)? != 0,
                })
            })
            .context("failed to query sensors")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read sensors")
    }

    fn create_adjustment(&mut self, new: &NewAdjustment) -> Result<Adjustment> {
        insert_adjustment(&self.conn, new)
    }

    fn delete_adjustment(&mut self, id: AdjustmentId) -> Result<()> {
        delete_adjustment_row(&self.conn, id)
    }

    fn apply_slot_plan(&mut self, plan: &SlotPlan) -> Result<Option<Adjustment>> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start slot transaction")?;
        for &id in &plan.deletes {
            delete_adjustment_row(&tx, id)?;
        }
        let inserted = match &plan.insert {
            Some(new) => Some(insert_adjustment(&tx, new)?),
            None => None,
        };
        tx.commit().context("failed to commit slot transaction")?;
        Ok(inserted)
    }
}

pub fn upsert_sensor_in_tx(tx: &Transaction<'_>, unique_id: &str, name: &str, kind: &str) -> Result<SensorId> {
    tx.execute(
        "\
        INSERT INTO sensors (unique_id, name, type)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(unique_id) DO NOTHING",
        params![unique_id, name, kind],
    )
    .context("failed to upsert sensors row")?;

    tx.query_row(
        "SELECT id FROM sensors WHERE unique_id = ?1",
        params![unique_id],
        |row| row.get::<_, i64>(0),
    )
    .context("failed to read sensors.id after upsert")
}

fn insert_adjustment(conn: &Connection, new: &NewAdjustment) -> Result<Adjustment> {
    conn.execute(
        "\
        INSERT INTO data_adjustments (timestamp, sensor_id, value, comment, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            format_wire_timestamp(new.timestamp),
            new.sensor_id,
            new.value,
            new.comment,
            format_wire_timestamp(Utc::now()),
        ],
    )
    .context("failed to insert adjustment")?;

    Ok(Adjustment {
        id: conn.last_insert_rowid(),
        sensor_id: new.sensor_id,
        timestamp: new.timestamp,
        value: new.value,
        comment: new.comment.clone(),
    })
}

fn delete_adjustment_row(conn: &Connection, id: AdjustmentId) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM data_adjustments WHERE id = ?1", params![id])
        .with_context(|| format!("failed to delete adjustment {id}"))?;
    if deleted == 0 {
        debug!(adjustment_id = id, "adjustment already deleted");
    }
    Ok(())
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn bool_to_i64(v: bool) -> i64 {
    if v {
        1
    } else {
        0
    }
}
