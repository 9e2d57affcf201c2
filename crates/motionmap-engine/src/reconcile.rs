//! Editable state of one (sensor, hour) slot and the writes that replace it.
//!
//! Saving always deletes every adjustment recorded for the slot and inserts a
//! single replacement at the canonical hour, so fragmented history collapses
//! into one record. The replacement carries `new_total - raw_count`; reopening
//! the slot afterwards shows exactly the saved total.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::LocalSlot;
use crate::error::ValidationError;
use crate::model::{Adjustment, AdjustmentId, Event, NewAdjustment, Sensor, SensorId};
use crate::selection::SensorSelection;

/// The data a slot is reconciled against.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext<'a> {
    pub events: &'a [Event],
    pub adjustments: &'a [Adjustment],
    pub sensors: &'a [Sensor],
    pub selection: &'a SensorSelection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentTarget {
    pub sensor_id: SensorId,
    /// Start of the local hour, the consolidation key.
    pub slot: DateTime<Utc>,
    pub local_slot: LocalSlot,
    pub raw_count: i64,
    pub existing: Vec<Adjustment>,
    pub net_adjustment: i64,
    /// Adjustments of other sensors in the slot. Always zero while a target
    /// is bound to a single sensor.
    pub other_adjustments: i64,
    pub current_total: i64,
}

impl AdjustmentTarget {
    pub fn existing_ids(&self) -> Vec<AdjustmentId> {
        self.existing.iter().map(|a| a.id).collect()
    }

    pub fn has_adjustments(&self) -> bool {
        !self.existing.is_empty()
    }

    /// Most recent non-empty comment, offered as the default on edit.
    pub fn previous_comment(&self) -> Option<&str> {
        self.existing
            .iter()
            .filter(|a| !a.comment.trim().is_empty())
            .max_by_key(|a| (a.timestamp, a.id))
            .map(|a| a.comment.as_str())
    }
}

/// Writes that apply one reconciliation: deletes first, then the optional insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPlan {
    pub sensor_id: SensorId,
    pub slot: DateTime<Utc>,
    pub deletes: Vec<AdjustmentId>,
    pub insert: Option<NewAdjustment>,
}

/// Corrections must be attributable to exactly one known sensor.
pub fn resolve_target_sensor(
    selection: &SensorSelection,
    sensors: &[Sensor],
) -> Result<SensorId, ValidationError> {
    let sensor_id = selection
        .single()
        .ok_or(ValidationError::AmbiguousSensor {
            selected: selection.len(),
        })?;
    if !sensors.iter().any(|s| s.id == sensor_id) {
        return Err(ValidationError::UnknownSensor(sensor_id));
    }
    Ok(sensor_id)
}

pub fn open_adjustment_target<Tz: TimeZone>(
    tz: &Tz,
    at: DateTime<Utc>,
    ctx: &ReconcileContext<'_>,
) -> Result<AdjustmentTarget, ValidationError> {
    let sensor_id = resolve_target_sensor(ctx.selection, ctx.sensors)?;
    let local_slot = LocalSlot::of(tz, at);
    let in_slot = |sensor: SensorId, ts: DateTime<Utc>| {
        sensor == sensor_id && LocalSlot::of(tz, ts) == local_slot
    };

    let raw_count = ctx
        .events
        .iter()
        .filter(|e| e.is_active() && in_slot(e.sensor_id, e.timestamp))
        .count() as i64;

    let existing: Vec<Adjustment> = ctx
        .adjustments
        .iter()
        .filter(|a| in_slot(a.sensor_id, a.timestamp))
        .cloned()
        .collect();
    let net_adjustment: i64 = existing.iter().map(|a| a.value).sum();

    Ok(AdjustmentTarget {
        sensor_id,
        slot: local_slot.start(tz),
        local_slot,
        raw_count,
        existing,
        net_adjustment,
        other_adjustments: 0,
        current_total: (raw_count + net_adjustment).max(0),
    })
}

pub fn save_adjustment(
    target: &AdjustmentTarget,
    new_total: i64,
    comment: &str,
) -> Result<SlotPlan, ValidationError> {
    let comment = comment.trim();
    if comment.is_empty() {
        return Err(ValidationError::MissingComment);
    }
    if new_total < 0 {
        return Err(ValidationError::NegativeTotal(new_total));
    }

    let delta = new_total - target.raw_count - target.other_adjustments;
    Ok(SlotPlan {
        sensor_id: target.sensor_id,
        slot: target.slot,
        deletes: target.existing_ids(),
        insert: Some(NewAdjustment {
            sensor_id: target.sensor_id,
            timestamp: target.slot,
            value: delta,
            comment: comment.to_owned(),
        }),
    })
}

pub fn clear_adjustment(
    target: &AdjustmentTarget,
    confirmed: bool,
) -> Result<SlotPlan, ValidationError> {
    if !confirmed {
        return Err(ValidationError::ClearNotConfirmed);
    }
    if !target.has_adjustments() {
        return Err(ValidationError::NothingToClear);
    }
    Ok(SlotPlan {
        sensor_id: target.sensor_id,
        slot: target.slot,
        deletes: target.existing_ids(),
        insert: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventValue;
    use chrono::FixedOffset;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, h, m, 0).unwrap()
    }

    fn sensor(id: SensorId) -> Sensor {
        Sensor {
            id,
            name: format!("Sensor {id}"),
            kind: "motion".to_owned(),
            unique_id: format!("s-{id}"),
            is_hidden: false,
        }
    }

    fn event(id: i64, sensor_id: SensorId, ts: DateTime<Utc>) -> Event {
        Event {
            id,
            sensor_id,
            timestamp: ts,
            value: EventValue::Active,
        }
    }

    fn adjustment(id: i64, sensor_id: SensorId, ts: DateTime<Utc>, value: i64) -> Adjustment {
        Adjustment {
            id,
            sensor_id,
            timestamp: ts,
            value,
            comment: format!("note {id}"),
        }
    }

    struct Fixture {
        events: Vec<Event>,
        adjustments: Vec<Adjustment>,
        sensors: Vec<Sensor>,
        selection: SensorSelection,
    }

    impl Fixture {
        fn ctx(&self) -> ReconcileContext<'_> {
            ReconcileContext {
                events: &self.events,
                adjustments: &self.adjustments,
                sensors: &self.sensors,
                selection: &self.selection,
            }
        }
    }

    fn fixture() -> Fixture {
        Fixture {
            events: vec![
                event(1, 1, at(9, 0)),
                event(2, 1, at(9, 10)),
                event(3, 1, at(9, 59)),
                event(4, 2, at(9, 5)),
                event(5, 1, at(10, 0)),
            ],
            adjustments: vec![
                adjustment(10, 1, at(9, 0), 2),
                adjustment(11, 1, at(9, 20), -1),
                adjustment(12, 2, at(9, 0), 7),
            ],
            sensors: vec![sensor(1), sensor(2)],
            selection: SensorSelection::from_ids([1]),
        }
    }

    #[test]
    fn opening_collects_slot_state() {
        let f = fixture();
        let target = open_adjustment_target(&Utc, at(9, 37), &f.ctx()).unwrap();
        assert_eq!(target.sensor_id, 1);
        assert_eq!(target.slot, at(9, 0));
        assert_eq!(target.raw_count, 3);
        assert_eq!(target.existing_ids(), vec![10, 11]);
        assert_eq!(target.net_adjustment, 1);
        assert_eq!(target.current_total, 4);
        assert_eq!(target.previous_comment(), Some("note 11"));
    }

    #[test]
    fn opening_requires_one_sensor() {
        let mut f = fixture();
        f.selection = SensorSelection::from_ids([1, 2]);
        assert_eq!(
            open_adjustment_target(&Utc, at(9, 0), &f.ctx()),
            Err(ValidationError::AmbiguousSensor { selected: 2 })
        );
        f.selection = SensorSelection::default();
        assert_eq!(
            open_adjustment_target(&Utc, at(9, 0), &f.ctx()),
            Err(ValidationError::AmbiguousSensor { selected: 0 })
        );
        f.selection = SensorSelection::from_ids([42]);
        assert_eq!(
            open_adjustment_target(&Utc, at(9, 0), &f.ctx()),
            Err(ValidationError::UnknownSensor(42))
        );
    }

    #[test]
    fn save_replaces_every_record() {
        let f = fixture();
        let target = open_adjustment_target(&Utc, at(9, 0), &f.ctx()).unwrap();
        let plan = save_adjustment(&target, 2, "  door propped open  ").unwrap();
        assert_eq!(plan.deletes, vec![10, 11]);
        let insert = plan.insert.unwrap();
        assert_eq!(insert.value, -1);
        assert_eq!(insert.timestamp, at(9, 0));
        assert_eq!(insert.sensor_id, 1);
        assert_eq!(insert.comment, "door propped open");
    }

    #[test]
    fn repeated_local_hour_is_reconciled_as_one_slot() {
        let tz = chrono_tz::America::New_York;
        let utc = |h: u32, m: u32| Utc.with_ymd_and_hms(2024, 11, 3, h, m, 0).unwrap();
        // 05:xx UTC is 01:xx EDT and 06:xx UTC is 01:xx EST.
        let f = Fixture {
            events: vec![event(1, 1, utc(5, 10)), event(2, 1, utc(6, 10)), event(3, 1, utc(7, 0))],
            adjustments: vec![adjustment(10, 1, utc(6, 0), 1)],
            sensors: vec![sensor(1)],
            selection: SensorSelection::from_ids([1]),
        };

        let target = open_adjustment_target(&tz, utc(6, 40), &f.ctx()).unwrap();
        assert_eq!(target.slot, utc(5, 0));
        assert_eq!(target.local_slot.hour, 1);
        assert_eq!(target.raw_count, 2);
        assert_eq!(target.current_total, 3);

        let plan = save_adjustment(&target, 1, "double count").unwrap();
        assert_eq!(plan.deletes, vec![10]);
        assert_eq!(plan.insert.map(|a| (a.timestamp, a.value)), Some((utc(5, 0), -1)));
    }

    #[test]
    fn save_validates_input() {
        let f = fixture();
        let target = open_adjustment_target(&Utc, at(9, 0), &f.ctx()).unwrap();
        assert_eq!(
            save_adjustment(&target, 2, "   "),
            Err(ValidationError::MissingComment)
        );
        assert_eq!(
            save_adjustment(&target, -1, "why"),
            Err(ValidationError::NegativeTotal(-1))
        );
    }

    #[test]
    fn clearing_needs_confirmation_and_records() {
        let f = fixture();
        let target = open_adjustment_target(&Utc, at(9, 0), &f.ctx()).unwrap();
        assert_eq!(
            clear_adjustment(&target, false),
            Err(ValidationError::ClearNotConfirmed)
        );
        let plan = clear_adjustment(&target, true).unwrap();
        assert_eq!(plan.deletes, vec![10, 11]);
        assert!(plan.insert.is_none());

        let empty = open_adjustment_target(&Utc, at(14, 0), &f.ctx()).unwrap();
        assert_eq!(
            clear_adjustment(&empty, true),
            Err(ValidationError::NothingToClear)
        );
    }

    #[test]
    fn slot_is_a_concrete_local_hour() {
        let tz = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let mut f = fixture();
        f.events = vec![event(1, 1, at(3, 30)), event(2, 1, at(4, 29)), event(3, 1, at(4, 30))];
        f.adjustments.clear();
        // 03:45 UTC is 09:15 local; the local hour covers 03:30..04:30 UTC.
        let target = open_adjustment_target(&tz, at(3, 45), &f.ctx()).unwrap();
        assert_eq!(target.raw_count, 2);
        assert_eq!(target.slot, at(3, 30));
    }

    #[test]
    fn negative_net_shows_zero() {
        let mut f = fixture();
        f.adjustments = vec![adjustment(20, 1, at(14, 0), -5)];
        let target = open_adjustment_target(&Utc, at(14, 0), &f.ctx()).unwrap();
        assert_eq!(target.raw_count, 0);
        assert_eq!(target.current_total, 0);
        let plan = save_adjustment(&target, 3, "missed events").unwrap();
        assert_eq!(plan.insert.map(|i| i.value), Some(3));
    }
}
