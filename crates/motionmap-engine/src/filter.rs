//! Narrows events and adjustments down to what one window displays.
//!
//! An item is included when all of these hold:
//!
//! 1. its sensor is selected, or the selection is empty and the item is an
//!    adjustment of a known sensor (events always need an explicit match);
//! 2. its timestamp falls inside the window;
//! 3. with `exclude_today`, it is not on the current local day;
//! 4. with `exclude_first_day`, it is not on the local day its sensor first
//!    reported anything, computed over the unfiltered history.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{day_bounds, local_date};
use crate::model::{Adjustment, Event, Sensor, SensorId};
use crate::range::WeekWindow;
use crate::selection::SensorSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub exclude_today: bool,
    pub exclude_first_day: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            exclude_today: true,
            exclude_first_day: true,
        }
    }
}

/// Local calendar day of each sensor's earliest event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstSeenDays(HashMap<SensorId, NaiveDate>);

impl FirstSeenDays {
    pub fn from_events<Tz: TimeZone>(tz: &Tz, events: &[Event]) -> Self {
        let mut earliest: HashMap<SensorId, DateTime<Utc>> = HashMap::new();
        for event in events {
            earliest
                .entry(event.sensor_id)
                .and_modify(|at| *at = (*at).min(event.timestamp))
                .or_insert(event.timestamp);
        }
        Self(
            earliest
                .into_iter()
                .map(|(sensor, at)| (sensor, local_date(tz, at)))
                .collect(),
        )
    }

    pub fn get(&self, sensor: SensorId) -> Option<NaiveDate> {
        self.0.get(&sensor).copied()
    }
}

/// Everything the filter rules need, fixed for one recomputation.
pub struct FilterContext<'a, Tz: TimeZone> {
    tz: &'a Tz,
    selection: &'a SensorSelection,
    known: HashSet<SensorId>,
    options: FilterOptions,
    today: (DateTime<Utc>, DateTime<Utc>),
    first_seen: &'a FirstSeenDays,
}

impl<'a, Tz: TimeZone> FilterContext<'a, Tz> {
    pub fn new(
        tz: &'a Tz,
        now: DateTime<Utc>,
        selection: &'a SensorSelection,
        sensors: &[Sensor],
        options: FilterOptions,
        first_seen: &'a FirstSeenDays,
    ) -> Self {
        Self {
            tz,
            selection,
            known: sensors.iter().map(|s| s.id).collect(),
            options,
            today: day_bounds(tz, local_date(tz, now)),
            first_seen,
        }
    }

    fn passes_time_rules(&self, sensor: SensorId, at: DateTime<Utc>) -> bool {
        if self.options.exclude_today && at >= self.today.0 && at < self.today.1 {
            return false;
        }
        if self.options.exclude_first_day {
            if let Some(first) = self.first_seen.get(sensor) {
                if local_date(self.tz, at) == first {
                    return false;
                }
            }
        }
        true
    }

    fn event_selected(&self, sensor: SensorId) -> bool {
        self.known.contains(&sensor) && self.selection.contains(sensor)
    }

    fn adjustment_selected(&self, sensor: SensorId) -> bool {
        self.known.contains(&sensor)
            && (self.selection.is_empty() || self.selection.contains(sensor))
    }

    pub fn includes_event(&self, event: &Event, window: &WeekWindow) -> bool {
        self.event_selected(event.sensor_id)
            && window.contains(event.timestamp)
            && self.passes_time_rules(event.sensor_id, event.timestamp)
    }

    pub fn includes_adjustment(&self, adjustment: &Adjustment, window: &WeekWindow) -> bool {
        self.adjustment_selected(adjustment.sensor_id)
            && window.contains(adjustment.timestamp)
            && self.passes_time_rules(adjustment.sensor_id, adjustment.timestamp)
    }
}

pub fn filter_events<'e, Tz: TimeZone>(
    events: &'e [Event],
    ctx: &FilterContext<'_, Tz>,
    window: &WeekWindow,
) -> Vec<&'e Event> {
    events
        .iter()
        .filter(|e| ctx.includes_event(e, window))
        .collect()
}

pub fn filter_adjustments<'a, Tz: TimeZone>(
    adjustments: &'a [Adjustment],
    ctx: &FilterContext<'_, Tz>,
    window: &WeekWindow,
) -> Vec<&'a Adjustment> {
    adjustments
        .iter()
        .filter(|a| ctx.includes_adjustment(a, window))
        .collect()
}
