//! The whole read pipeline as one pure function of a snapshot and view parameters.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::combine::{combine, CombineMode, CombinedView, WindowGrid};
use crate::details::{cell_details, CellDetails, CellSelector};
use crate::filter::{filter_adjustments, filter_events, FilterContext, FilterOptions, FirstSeenDays};
use crate::grid::build_grid;
use crate::model::Event;
use crate::range::{
    compute_windows, format_range_label, latest_week_offset, min_week_offset, DataBounds, WeekSpan,
    WeekWindow,
};
use crate::selection::SensorSelection;
use crate::store::Snapshot;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewParams {
    pub week_offset: i64,
    pub span: WeekSpan,
    pub mode: CombineMode,
    pub filters: FilterOptions,
    pub selection: SensorSelection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapView {
    pub windows: Vec<WeekWindow>,
    pub combined: CombinedView,
    pub range_label: String,
    pub min_week_offset: i64,
    /// Events that passed the filters in any window, for cell details.
    pub included_events: Vec<Event>,
}

impl HeatmapView {
    pub fn compute<Tz: TimeZone>(
        tz: &Tz,
        now: DateTime<Utc>,
        snapshot: &Snapshot,
        params: &ViewParams,
    ) -> Self {
        let bounds = DataBounds::from_events(&snapshot.events, now);
        let windows = compute_windows(tz, now, params.week_offset, params.span, bounds);
        let first_seen = FirstSeenDays::from_events(tz, &snapshot.events);
        let ctx = FilterContext::new(
            tz,
            now,
            &params.selection,
            &snapshot.sensors,
            params.filters,
            &first_seen,
        );

        let mut included_events = Vec::new();
        let grids: Vec<WindowGrid> = windows
            .iter()
            .map(|window| {
                let events = filter_events(&snapshot.events, &ctx, window);
                let adjustments = filter_adjustments(&snapshot.adjustments, &ctx, window);
                let grid = build_grid(tz, window, events.iter().copied(), adjustments.iter().copied());
                included_events.extend(events.into_iter().cloned());
                WindowGrid {
                    window: window.clone(),
                    grid,
                }
            })
            .collect();

        Self {
            range_label: format_range_label(tz, params.span, &windows),
            min_week_offset: min_week_offset(now, bounds.min),
            combined: combine(grids, params.mode),
            windows,
            included_events,
        }
    }

    pub fn cell_details<Tz: TimeZone>(&self, tz: &Tz, selector: CellSelector) -> CellDetails {
        cell_details(tz, selector, &self.included_events)
    }
}

/// Offset that shows the newest event, or `None` without events.
pub fn offset_of_latest<Tz: TimeZone>(tz: &Tz, now: DateTime<Utc>, snapshot: &Snapshot) -> Option<i64> {
    let latest = snapshot.events.iter().map(|e| e.timestamp).max()?;
    Some(latest_week_offset(tz, now, latest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::timestamp::NaiveTimestampPolicy;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, m, 0).unwrap()
    }

    fn snapshot() -> (Snapshot, i64, i64) {
        let mut store = InMemoryStore::new();
        let hall = store.add_sensor("hall", "Hallway", "motion");
        let den = store.add_sensor("den", "Den", "motion");
        // Hall first reports on Saturday the 4th.
        store.add_event(hall, at(4, 8, 0), "active");
        for minute in [0, 0, 30] {
            store.add_event(hall, at(6, 9, minute), "active");
        }
        store.add_event(hall, at(13, 9, 10), "active");
        store.add_event(den, at(7, 9, 0), "active");
        store.add_raw_event(den, "2024-05-07 10:00:00", "active");
        store.add_raw_adjustment(Some(hall), "2024-05-06T09:00:00Z", 2, "missed");
        store.add_raw_adjustment(Some(hall), "2024-05-06T09:00:00Z", -1, "double");
        let snapshot = Snapshot::load(&store, NaiveTimestampPolicy::AssumeUtc).unwrap();
        (snapshot, hall, den)
    }

    #[test]
    fn single_week_view() {
        let (snapshot, hall, _) = snapshot();
        let params = ViewParams {
            week_offset: -1,
            selection: SensorSelection::from_ids([hall]),
            ..ViewParams::default()
        };
        let view = HeatmapView::compute(&Utc, at(15, 12, 0), &snapshot, &params);
        assert_eq!(view.windows.len(), 1);
        assert_eq!(view.range_label, "May 5, 2024 - May 11, 2024");
        let grid = &view.combined.windows()[0].grid;
        assert_eq!(grid.count(9, 1), 4);
        assert!(grid.is_adjusted(9, 1));
        assert_eq!(view.combined.max_count, 4);
        assert_eq!(view.included_events.len(), 3);
        assert_eq!(view.min_week_offset, -3);
    }

    #[test]
    fn aggregate_across_weeks() {
        let (snapshot, hall, den) = snapshot();
        let params = ViewParams {
            week_offset: -2,
            span: WeekSpan::Weeks(3),
            mode: CombineMode::Aggregate { sum: true },
            selection: SensorSelection::from_ids([hall, den]),
            ..ViewParams::default()
        };
        let view = HeatmapView::compute(&Utc, at(15, 12, 0), &snapshot, &params);
        let totals = view.combined.totals().unwrap();
        // Monday 09:00 over both weeks: 4 adjusted plus 1.
        assert_eq!(totals.count(9, 1), 5);
        // The den's legacy row decodes as UTC; its first day (the 7th) is excluded.
        assert_eq!(totals.count(10, 2), 0);
        // The hall's first day falls in the first window and is excluded.
        assert_eq!(totals.count(8, 6), 0);

        let details = view.cell_details(
            &Utc,
            CellSelector {
                day: 1,
                hour: 9,
                date: None,
            },
        );
        assert_eq!(details.dates.len(), 2);
        assert_eq!(details.events[0].timestamp, at(13, 9, 10));
    }

    #[test]
    fn all_time_and_latest_offset() {
        let (snapshot, hall, den) = snapshot();
        let params = ViewParams {
            span: WeekSpan::AllTime,
            filters: FilterOptions {
                exclude_today: false,
                exclude_first_day: false,
            },
            selection: SensorSelection::from_ids([hall, den]),
            ..ViewParams::default()
        };
        let now = at(28, 12, 0);
        let view = HeatmapView::compute(&Utc, now, &snapshot, &params);
        assert_eq!(view.range_label, "All Time");
        assert_eq!(view.combined.windows()[0].grid.total(), 7 + 1);
        assert_eq!(offset_of_latest(&Utc, now, &snapshot), Some(-2));
    }
}
