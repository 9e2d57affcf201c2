//! Day-by-hour bucketing.

use std::collections::BTreeMap;

use chrono::{Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::{DAYS_PER_WEEK, HOURS_PER_DAY};
use crate::model::{Adjustment, Event};
use crate::range::WeekWindow;

/// One repeating `(weekday, hour)` position. `day` 0 is Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPos {
    pub day: usize,
    pub hour: usize,
}

impl CellPos {
    pub fn of<Tz: TimeZone>(tz: &Tz, at: chrono::DateTime<chrono::Utc>) -> Self {
        let local = at.with_timezone(tz);
        Self {
            day: local.weekday().num_days_from_sunday() as usize,
            hour: local.hour() as usize,
        }
    }
}

/// Effective counts indexed `[hour][day]`, never negative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    counts: [[u32; DAYS_PER_WEEK]; HOURS_PER_DAY],
    adjusted: [[bool; DAYS_PER_WEEK]; HOURS_PER_DAY],
}

impl Grid {
    pub fn count(&self, hour: usize, day: usize) -> u32 {
        self.counts[hour][day]
    }

    pub fn is_adjusted(&self, hour: usize, day: usize) -> bool {
        self.adjusted[hour][day]
    }

    pub fn counts(&self) -> &[[u32; DAYS_PER_WEEK]; HOURS_PER_DAY] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().map(|&c| u64::from(c)).sum()
    }

    pub fn max(&self) -> u32 {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }

    pub fn has_data(&self) -> bool {
        self.total() > 0 || self.adjusted.iter().flatten().any(|&a| a)
    }

    /// Every position in row-major `(hour, day)` order.
    pub fn cells() -> impl Iterator<Item = CellPos> {
        (0..HOURS_PER_DAY).flat_map(|hour| (0..DAYS_PER_WEEK).map(move |day| CellPos { day, hour }))
    }

    pub(crate) fn set(&mut self, pos: CellPos, count: u32, adjusted: bool) {
        self.counts[pos.hour][pos.day] = count;
        self.adjusted[pos.hour][pos.day] = adjusted;
    }
}

/// Buckets active events by local weekday and hour, then overlays the net
/// adjustment of each cell. Items outside `window` are ignored.
pub fn build_grid<'a, Tz: TimeZone>(
    tz: &Tz,
    window: &WeekWindow,
    events: impl IntoIterator<Item = &'a Event>,
    adjustments: impl IntoIterator<Item = &'a Adjustment>,
) -> Grid {
    let mut grid = Grid::default();

    for event in events {
        if !event.is_active() || !window.contains(event.timestamp) {
            continue;
        }
        let pos = CellPos::of(tz, event.timestamp);
        grid.counts[pos.hour][pos.day] = grid.counts[pos.hour][pos.day].saturating_add(1);
    }

    let mut net: BTreeMap<CellPos, i64> = BTreeMap::new();
    for adjustment in adjustments {
        if !window.contains(adjustment.timestamp) {
            continue;
        }
        *net.entry(CellPos::of(tz, adjustment.timestamp)).or_default() += adjustment.value;
    }

    for (pos, delta) in &net {
        let raw = i64::from(grid.counts[pos.hour][pos.day]);
        let effective = (raw + delta).clamp(0, i64::from(u32::MAX)) as u32;
        grid.set(*pos, effective, true);
    }

    debug!(
        window = %window.label,
        total = grid.total(),
        adjusted_cells = net.len(),
        "built grid"
    );
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventValue;
    use chrono::{DateTime, Duration, FixedOffset, Utc};

    const NO_EVENTS: &[Event] = &[];
    const NO_ADJUSTMENTS: &[Adjustment] = &[];

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, m, 0).unwrap()
    }

    fn window() -> WeekWindow {
        WeekWindow {
            start: at(5, 0, 0),
            end: at(12, 0, 0),
            label: "Week of May 5 - May 11".to_owned(),
        }
    }

    fn event(id: i64, ts: DateTime<Utc>, value: EventValue) -> Event {
        Event {
            id,
            sensor_id: 1,
            timestamp: ts,
            value,
        }
    }

    fn adjustment(id: i64, ts: DateTime<Utc>, value: i64) -> Adjustment {
        Adjustment {
            id,
            sensor_id: 1,
            timestamp: ts,
            value,
            comment: "manual".to_owned(),
        }
    }

    #[test]
    fn counts_active_events_per_cell() {
        // Monday 2024-05-06.
        let events = vec![
            event(1, at(6, 9, 0), EventValue::Active),
            event(2, at(6, 9, 0), EventValue::Active),
            event(3, at(6, 9, 30), EventValue::Active),
            event(4, at(6, 9, 45), EventValue::Other("inactive".to_owned())),
        ];
        let grid = build_grid(&Utc, &window(), &events, NO_ADJUSTMENTS);
        assert_eq!(grid.count(9, 1), 3);
        assert_eq!(grid.total(), 3);
        assert_eq!(grid.max(), 3);
        assert!(!grid.is_adjusted(9, 1));
    }

    #[test]
    fn adjustments_net_per_cell() {
        let events: Vec<_> = (0..3).map(|i| event(i, at(6, 9, 5), EventValue::Active)).collect();
        let adjustments = vec![adjustment(10, at(6, 9, 0), 2), adjustment(11, at(6, 9, 0), -1)];
        let grid = build_grid(&Utc, &window(), &events, &adjustments);
        assert_eq!(grid.count(9, 1), 4);
        assert!(grid.is_adjusted(9, 1));
    }

    #[test]
    fn negative_net_clamps_to_zero() {
        let adjustments = vec![adjustment(10, at(6, 9, 0), -5)];
        let grid = build_grid(&Utc, &window(), NO_EVENTS, &adjustments);
        assert_eq!(grid.count(9, 1), 0);
        assert!(grid.is_adjusted(9, 1));
        assert!(grid.has_data());
    }

    #[test]
    fn zero_net_still_marks_cell() {
        let adjustments = vec![adjustment(10, at(7, 3, 0), 4), adjustment(11, at(7, 3, 0), -4)];
        let grid = build_grid(&Utc, &window(), NO_EVENTS, &adjustments);
        assert_eq!(grid.count(3, 2), 0);
        assert!(grid.is_adjusted(3, 2));
    }

    #[test]
    fn unaligned_adjustments_bucket_by_hour_of_occurrence() {
        let adjustments = vec![adjustment(10, at(6, 9, 59), 1)];
        let grid = build_grid(&Utc, &window(), NO_EVENTS, &adjustments);
        assert_eq!(grid.count(9, 1), 1);
    }

    #[test]
    fn buckets_use_local_time() {
        let tz = FixedOffset::west_opt(4 * 3600).unwrap();
        let local_window = WeekWindow {
            start: window().start + Duration::hours(4),
            end: window().end + Duration::hours(4),
            label: String::new(),
        };
        // 02:00 UTC Tuesday is 22:00 Monday at UTC-4.
        let events = vec![event(1, at(7, 2, 0), EventValue::Active)];
        let grid = build_grid(&tz, &local_window, &events, NO_ADJUSTMENTS);
        assert_eq!(grid.count(22, 1), 1);
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    mod proptest_grid {
        use super::*;
        use proptest::prelude::*;

        fn pt_config() -> ProptestConfig {
            ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            }
        }

        // Minutes from one day before the window to one day after it.
        fn arb_events() -> impl Strategy<Value = Vec<Event>> {
            prop::collection::vec((-1440i64..11_520, any::<bool>()), 0..60).prop_map(|rows| {
                rows.into_iter()
                    .enumerate()
                    .map(|(i, (minute, active))| {
                        let value = if active {
                            EventValue::Active
                        } else {
                            EventValue::Other("idle".to_owned())
                        };
                        event(i as i64, window().start + Duration::minutes(minute), value)
                    })
                    .collect()
            })
        }

        fn arb_adjustments() -> impl Strategy<Value = Vec<Adjustment>> {
            prop::collection::vec((0i64..168, -10i64..10), 0..30).prop_map(|rows| {
                rows.into_iter()
                    .enumerate()
                    .map(|(i, (hour, value))| {
                        adjustment(100 + i as i64, window().start + Duration::hours(hour), value)
                    })
                    .collect()
            })
        }

        proptest! {
            #![proptest_config(pt_config())]

            #[test]
            fn prop_total_matches_active_in_window(events in arb_events()) {
                let w = window();
                let expected = events
                    .iter()
                    .filter(|e| e.is_active() && w.contains(e.timestamp))
                    .count() as u64;
                let grid = build_grid(&Utc, &w, &events, NO_ADJUSTMENTS);
                prop_assert_eq!(grid.total(), expected);
            }

            #[test]
            fn prop_adjustment_order_is_irrelevant(
                events in arb_events(),
                adjustments in arb_adjustments(),
                seed in any::<u64>(),
            ) {
                let forward = build_grid(&Utc, &window(), &events, &adjustments);
                let mut shuffled = adjustments.clone();
                let len = shuffled.len();
                if len > 1 {
                    shuffled.rotate_left((seed as usize) % len);
                    shuffled.reverse();
                }
                let reordered = build_grid(&Utc, &window(), &events, &shuffled);
                prop_assert_eq!(forward, reordered);
            }

            #[test]
            fn prop_cells_follow_clamped_net(
                events in arb_events(),
                adjustments in arb_adjustments(),
            ) {
                let w = window();
                let base = build_grid(&Utc, &w, &events, NO_ADJUSTMENTS);
                let grid = build_grid(&Utc, &w, &events, &adjustments);
                for pos in Grid::cells() {
                    let net: i64 = adjustments
                        .iter()
                        .filter(|a| CellPos::of(&Utc, a.timestamp) == pos)
                        .map(|a| a.value)
                        .sum();
                    let touched = adjustments.iter().any(|a| CellPos::of(&Utc, a.timestamp) == pos);
                    let expected = if touched {
                        (i64::from(base.count(pos.hour, pos.day)) + net).max(0) as u32
                    } else {
                        base.count(pos.hour, pos.day)
                    };
                    prop_assert_eq!(grid.count(pos.hour, pos.day), expected);
                    prop_assert_eq!(grid.is_adjusted(pos.hour, pos.day), touched);
                }
            }
        }
    }
}
