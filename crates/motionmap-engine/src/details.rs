use std::collections::BTreeSet;

use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::calendar::{local_date, weekday_index, LocalSlot};
use crate::model::Event;

/// A clicked cell. With `date` set it names one concrete slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSelector {
    pub day: usize,
    pub hour: u32,
    pub date: Option<NaiveDate>,
}

impl CellSelector {
    pub fn for_slot(slot: LocalSlot) -> Self {
        Self {
            day: weekday_index(slot.date),
            hour: slot.hour,
            date: Some(slot.date),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellDetails {
    /// Matching active events, newest first.
    pub events: Vec<Event>,
    /// Distinct local dates the events fall on, ascending.
    pub dates: Vec<NaiveDate>,
}

pub fn cell_details<'a, Tz: TimeZone>(
    tz: &Tz,
    selector: CellSelector,
    included: impl IntoIterator<Item = &'a Event>,
) -> CellDetails {
    let mut events: Vec<Event> = included
        .into_iter()
        .filter(|event| event.is_active())
        .filter(|event| {
            let slot = LocalSlot::of(tz, event.timestamp);
            slot.hour == selector.hour
                && slot.day_index() == selector.day
                && selector.date.map_or(true, |date| date == slot.date)
        })
        .cloned()
        .collect();
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

    let dates: BTreeSet<NaiveDate> = events
        .iter()
        .map(|event| local_date(tz, event.timestamp))
        .collect();

    CellDetails {
        events,
        dates: dates.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventValue;
    use chrono::{DateTime, Utc};

    fn event(id: i64, d: u32, h: u32, m: u32) -> Event {
        Event {
            id,
            sensor_id: 1,
            timestamp: Utc.with_ymd_and_hms(2024, 5, d, h, m, 0).unwrap(),
            value: EventValue::Active,
        }
    }

    fn ids(details: &CellDetails) -> Vec<i64> {
        details.events.iter().map(|e| e.id).collect()
    }

    #[test]
    fn weekday_cell_spans_weeks() {
        // Mondays 6th and 13th, plus a Tuesday.
        let events = vec![event(1, 6, 9, 10), event(2, 13, 9, 40), event(3, 7, 9, 0)];
        let details = cell_details(
            &Utc,
            CellSelector {
                day: 1,
                hour: 9,
                date: None,
            },
            &events,
        );
        assert_eq!(ids(&details), vec![2, 1]);
        assert_eq!(details.dates.len(), 2);
        assert!(details.dates[0] < details.dates[1]);
    }

    #[test]
    fn concrete_slot_matches_one_date() {
        let events = vec![event(1, 6, 9, 10), event(2, 13, 9, 40), event(3, 6, 9, 50)];
        let at: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        let details = cell_details(&Utc, CellSelector::for_slot(LocalSlot::of(&Utc, at)), &events);
        assert_eq!(ids(&details), vec![3, 1]);
        assert_eq!(details.dates, vec![at.date_naive()]);
    }
}
