//! A test double: a store kept entirely in memory, with switches that make
//! reads or writes fail on demand. Only built for tests or with the
//! `test-util` feature.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::model::{
    Adjustment, AdjustmentId, NewAdjustment, RawAdjustment, RawEvent, Sensor, SensorId,
};
use crate::store::ActivityStore;
use crate::timestamp::format_wire_timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryStoreError {
    #[error("injected failure: {0}")]
    Injected(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    sensors: Vec<Sensor>,
    events: Vec<RawEvent>,
    adjustments: Vec<RawAdjustment>,
    next_id: i64,
    /// Number of deletes allowed before every further delete fails.
    pub fail_deletes_after: Option<usize>,
    pub fail_creates: bool,
    pub fail_reads: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_sensor(&mut self, unique_id: &str, name: &str, kind: &str) -> SensorId {
        let id = self.next_id();
        self.sensors.push(Sensor {
            id,
            name: name.to_owned(),
            kind: kind.to_owned(),
            unique_id: unique_id.to_owned(),
            is_hidden: false,
        });
        id
    }

    pub fn add_event(&mut self, sensor_id: SensorId, at: DateTime<Utc>, value: &str) -> i64 {
        let timestamp = format_wire_timestamp(at);
        self.add_raw_event(sensor_id, &timestamp, value)
    }

    /// Stores a timestamp verbatim, including legacy offset-less forms.
    pub fn add_raw_event(&mut self, sensor_id: SensorId, timestamp: &str, value: &str) -> i64 {
        let id = self.next_id();
        self.events.push(RawEvent {
            id,
            sensor_id,
            timestamp: timestamp.to_owned(),
            value: value.to_owned(),
        });
        id
    }

    pub fn add_raw_adjustment(
        &mut self,
        sensor_id: Option<SensorId>,
        timestamp: &str,
        value: i64,
        comment: &str,
    ) -> AdjustmentId {
        let id = self.next_id();
        self.adjustments.push(RawAdjustment {
            id,
            sensor_id,
            timestamp: timestamp.to_owned(),
            value,
            comment: comment.to_owned(),
        });
        id
    }

    pub fn remove_sensor(&mut self, id: SensorId) {
        self.sensors.retain(|s| s.id != id);
    }

    pub fn adjustment_count(&self) -> usize {
        self.adjustments.len()
    }
}

impl ActivityStore for InMemoryStore {
    type Error = MemoryStoreError;

    fn list_events(&self) -> Result<Vec<RawEvent>, Self::Error> {
        if self.fail_reads {
            return Err(MemoryStoreError::Injected("read"));
        }
        Ok(self.events.clone())
    }

    fn list_adjustments(&self) -> Result<Vec<RawAdjustment>, Self::Error> {
        if self.fail_reads {
            return Err(MemoryStoreError::Injected("read"));
        }
        Ok(self.adjustments.clone())
    }

    fn list_sensors(&self) -> Result<Vec<Sensor>, Self::Error> {
        if self.fail_reads {
            return Err(MemoryStoreError::Injected("read"));
        }
        Ok(self.sensors.clone())
    }

    fn create_adjustment(&mut self, new: &NewAdjustment) -> Result<Adjustment, Self::Error> {
        if self.fail_creates {
            return Err(MemoryStoreError::Injected("create"));
        }
        let id = self.add_raw_adjustment(
            Some(new.sensor_id),
            &format_wire_timestamp(new.timestamp),
            new.value,
            &new.comment,
        );
        Ok(Adjustment {
            id,
            sensor_id: new.sensor_id,
            timestamp: new.timestamp,
            value: new.value,
            comment: new.comment.clone(),
        })
    }

    fn delete_adjustment(&mut self, id: AdjustmentId) -> Result<(), Self::Error> {
        if let Some(remaining) = self.fail_deletes_after.as_mut() {
            if *remaining == 0 {
                return Err(MemoryStoreError::Injected("delete"));
            }
            *remaining -= 1;
        }
        let before = self.adjustments.len();
        self.adjustments.retain(|a| a.id != id);
        if self.adjustments.len() == before {
            debug!(adjustment_id = id, "adjustment already deleted");
        }
        Ok(())
    }
}
