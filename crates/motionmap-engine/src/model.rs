use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RecordError;
use crate::timestamp::{parse_wire_timestamp, NaiveTimestampPolicy};

pub type SensorId = i64;
pub type EventId = i64;
pub type AdjustmentId = i64;

pub const ACTIVE_VALUE: &str = "active";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub unique_id: String,
    pub is_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventValue {
    Active,
    Other(String),
}

impl EventValue {
    pub fn from_wire(value: &str) -> Self {
        if value == ACTIVE_VALUE {
            Self::Active
        } else {
            Self::Other(value.to_owned())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => ACTIVE_VALUE,
            Self::Other(value) => value,
        }
    }
}

impl From<String> for EventValue {
    fn from(value: String) -> Self {
        Self::from_wire(&value)
    }
}

impl From<EventValue> for String {
    fn from(value: EventValue) -> Self {
        value.as_str().to_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub sensor_id: SensorId,
    pub timestamp: DateTime<Utc>,
    pub value: EventValue,
}

impl Event {
    pub fn is_active(&self) -> bool {
        self.value == EventValue::Active
    }
}

/// A signed correction attached to one sensor and one hour slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: AdjustmentId,
    pub sensor_id: SensorId,
    pub timestamp: DateTime<Utc>,
    pub value: i64,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAdjustment {
    pub sensor_id: SensorId,
    pub timestamp: DateTime<Utc>,
    pub value: i64,
    pub comment: String,
}

/// An event exactly as the store returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: EventId,
    pub sensor_id: SensorId,
    pub timestamp: String,
    pub value: String,
}

/// An adjustment exactly as the store returns it. Legacy rows may lack a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAdjustment {
    pub id: AdjustmentId,
    pub sensor_id: Option<SensorId>,
    pub timestamp: String,
    pub value: i64,
    pub comment: String,
}

impl RawEvent {
    pub fn decode(&self, policy: NaiveTimestampPolicy) -> Result<Event, RecordError> {
        Ok(Event {
            id: self.id,
            sensor_id: self.sensor_id,
            timestamp: parse_wire_timestamp(&self.timestamp, policy)?,
            value: EventValue::from_wire(&self.value),
        })
    }
}

impl RawAdjustment {
    pub fn decode(&self, policy: NaiveTimestampPolicy) -> Result<Adjustment, RecordError> {
        let sensor_id = self
            .sensor_id
            .ok_or(RecordError::SensorlessAdjustment(self.id))?;
        Ok(Adjustment {
            id: self.id,
            sensor_id,
            timestamp: parse_wire_timestamp(&self.timestamp, policy)?,
            value: self.value,
            comment: self.comment.clone(),
        })
    }
}

/// Decodes every event it can; returns the decoded events and the number dropped.
pub fn decode_events(raw: &[RawEvent], policy: NaiveTimestampPolicy) -> (Vec<Event>, usize) {
    let mut skipped = 0;
    let mut events = Vec::with_capacity(raw.len());
    for row in raw {
        match row.decode(policy) {
            Ok(event) => events.push(event),
            Err(err) => {
                skipped += 1;
                warn!(event_id = row.id, sensor_id = row.sensor_id, "dropping event: {err}");
            }
        }
    }
    (events, skipped)
}

pub fn decode_adjustments(
    raw: &[RawAdjustment],
    policy: NaiveTimestampPolicy,
) -> (Vec<Adjustment>, usize) {
    let mut skipped = 0;
    let mut adjustments = Vec::with_capacity(raw.len());
    for row in raw {
        match row.decode(policy) {
            Ok(adjustment) => adjustments.push(adjustment),
            Err(err) => {
                skipped += 1;
                warn!(adjustment_id = row.id, "dropping adjustment: {err}");
            }
        }
    }
    (adjustments, skipped)
}
