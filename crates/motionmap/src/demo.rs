use anyhow::Result;
use chrono::{Datelike, NaiveDate, NaiveTime, TimeZone, Weekday};
use tracing::info;

use motionmap_engine::calendar::{local_instant, shift_days};
use motionmap_engine::model::{SensorId, ACTIVE_VALUE};

use crate::db::{Database, EventInsert, PurgeStats, DEMO_PREFIX};

pub const DEMO_DAYS: i64 = 30;

const DEMO_SENSORS: [(&str, &str); 3] = [
    ("living-room", "Living Room Motion (Demo)"),
    ("kitchen", "Kitchen Motion (Demo)"),
    ("bedroom", "Bedroom Motion (Demo)"),
];
const DEMO_TYPE: &str = "PIR";

// (first hour, last hour exclusive, min events, max events)
const WEEKDAY_BANDS: [(u32, u32, u32, u32); 3] = [(6, 9, 8, 18), (9, 17, 2, 8), (17, 23, 10, 22)];
const WEEKEND_BANDS: [(u32, u32, u32, u32); 3] = [(8, 12, 6, 14), (12, 18, 12, 25), (18, 23, 8, 18)];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoStats {
    pub sensors: usize,
    pub events: usize,
}

pub fn generate_demo<Tz: TimeZone>(db: &mut Database, tz: &Tz, today: NaiveDate) -> Result<DemoStats> {
    let mut sensor_ids = Vec::with_capacity(DEMO_SENSORS.len());
    for (suffix, name) in DEMO_SENSORS {
        let unique_id = format!("{DEMO_PREFIX}{suffix}");
        let id = db.upsert_sensor(&unique_id, name, DEMO_TYPE)?;
        db.set_sensor_hidden(id, false)?;
        sensor_ids.push(id);
    }

    let events = demo_events(tz, today, &sensor_ids);
    let inserted = db.insert_events(&events)?;
    info!(sensors = sensor_ids.len(), events = inserted, "generated demo data");
    Ok(DemoStats {
        sensors: sensor_ids.len(),
        events: inserted,
    })
}

pub fn clear_demo(db: &mut Database) -> Result<PurgeStats> {
    let stats = db.purge_sensors_with_prefix(DEMO_PREFIX)?;
    info!(
        sensors = stats.sensors,
        events = stats.events,
        adjustments = stats.adjustments,
        "cleared demo data"
    );
    Ok(stats)
}

/// Thirty days of patterned activity ending the day before `today`. Weekdays
/// peak mornings and evenings; weekends peak in the afternoon. Every count is
/// derived from the day, hour and sensor, so reruns produce the same data.
pub fn demo_events<Tz: TimeZone>(tz: &Tz, today: NaiveDate, sensors: &[SensorId]) -> Vec<EventInsert> {
    let mut events = Vec::new();
    for day_back in (1..=DEMO_DAYS).rev() {
        let Some(date) = shift_days(today, -day_back) else {
            continue;
        };
        let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        let bands = if weekend { WEEKEND_BANDS } else { WEEKDAY_BANDS };
        let seed_day = date.num_days_from_ce() as u32;

        for (idx, &sensor_id) in sensors.iter().enumerate() {
            let seed = seed_day.wrapping_mul(31).wrapping_add(idx as u32 * 17);

            for (first, last, min, max) in bands {
                for hour in first..last {
                    let count = spread(seed, hour, min, max);
                    push_hour(&mut events, tz, date, hour, count, sensor_id);
                }
            }

            // Late night, every other day.
            if seed % 2 == 0 {
                for hour in [23, 0] {
                    push_hour(&mut events, tz, date, hour, spread(seed, hour, 1, 4), sensor_id);
                }
            }

            // Rare early-morning movement, more often on weekends.
            let every = if weekend { 3 } else { 7 };
            if seed % every == 0 {
                let hour = 1 + seed % 5;
                push_hour(&mut events, tz, date, hour, spread(seed, hour, 1, 3), sensor_id);
            }

            // Unusual 3 AM bursts on a few days, skipping one sensor each time.
            if seed_day % 6 == 0 && idx as u32 != seed_day % 3 {
                push_hour(&mut events, tz, date, 3, spread(seed, 3, 15, 25), sensor_id);
            }
        }
    }
    events
}

fn spread(seed: u32, hour: u32, min: u32, max: u32) -> u32 {
    let span = max - min + 1;
    min + (seed.wrapping_add(hour.wrapping_mul(7))) % span
}

fn push_hour<Tz: TimeZone>(
    events: &mut Vec<EventInsert>,
    tz: &Tz,
    date: NaiveDate,
    hour: u32,
    count: u32,
    sensor_id: SensorId,
) {
    for i in 0..count {
        let minute = i * 60 / count.max(1);
        let second = (i * 13) % 60;
        let Some(time) = NaiveTime::from_hms_opt(hour, minute, second) else {
            continue;
        };
        events.push(EventInsert {
            sensor_id,
            timestamp: local_instant(tz, date.and_time(time)),
            value: ACTIVE_VALUE.to_owned(),
        });
    }
}
