//! Week windows and navigation bounds.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{local_date, local_instant, local_midnight, shift_days, week_start_date};
use crate::error::ValidationError;
use crate::model::Event;

pub const MAX_WEEKS_TO_VIEW: u32 = 12;
pub const ALL_TIME_LABEL: &str = "All Time";

const LABEL_DATE: &str = "%b %-d";
const RANGE_DATE: &str = "%b %-d, %Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeekSpan {
    AllTime,
    Weeks(u32),
}

impl WeekSpan {
    /// `0` selects the whole data extent.
    pub fn from_weeks(weeks: u32) -> Result<Self, ValidationError> {
        match weeks {
            0 => Ok(Self::AllTime),
            1..=MAX_WEEKS_TO_VIEW => Ok(Self::Weeks(weeks)),
            got => Err(ValidationError::WeeksOutOfRange {
                got,
                max: MAX_WEEKS_TO_VIEW,
            }),
        }
    }

    pub fn weeks(self) -> u32 {
        match self {
            Self::AllTime => 0,
            Self::Weeks(n) => n,
        }
    }
}

impl Default for WeekSpan {
    fn default() -> Self {
        Self::Weeks(1)
    }
}

/// Half-open `[start, end)` range bucketed into one grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
}

impl WeekWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    /// Smallest range covering every window, or `None` for an empty slice.
    pub fn spanning(windows: &[WeekWindow]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = windows.iter().map(|w| w.start).min()?;
        let end = windows.iter().map(|w| w.end).max()?;
        Some((start, end))
    }
}

/// Earliest and latest event instants of the full data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBounds {
    pub min: DateTime<Utc>,
    pub max: DateTime<Utc>,
}

impl DataBounds {
    pub fn around(now: DateTime<Utc>) -> Self {
        Self { min: now, max: now }
    }

    /// Falls back to `now` when there are no events.
    pub fn from_events(events: &[Event], now: DateTime<Utc>) -> Self {
        let Some(first) = events.first() else {
            return Self::around(now);
        };
        let mut bounds = Self::around(first.timestamp);
        for event in &events[1..] {
            bounds.min = bounds.min.min(event.timestamp);
            bounds.max = bounds.max.max(event.timestamp);
        }
        bounds
    }
}

pub fn compute_windows<Tz: TimeZone>(
    tz: &Tz,
    now: DateTime<Utc>,
    week_offset: i64,
    span: WeekSpan,
    bounds: DataBounds,
) -> Vec<WeekWindow> {
    match span {
        WeekSpan::AllTime => vec![all_time_window(tz, bounds)],
        WeekSpan::Weeks(count) => {
            let this_week = week_start_date(local_date(tz, now));
            let Some(base) = week_offset
                .checked_mul(7)
                .and_then(|days| shift_days(this_week, days))
            else {
                return Vec::new();
            };
            (0..i64::from(count))
                .filter_map(|i| {
                    let first = shift_days(base, i * 7)?;
                    let next = shift_days(first, 7)?;
                    let start = local_midnight(tz, first);
                    let end = local_midnight(tz, next);
                    let label = format!(
                        "Week of {} - {}",
                        format_local(tz, start, LABEL_DATE),
                        format_local(tz, end - Duration::milliseconds(1), LABEL_DATE)
                    );
                    Some(WeekWindow { start, end, label })
                })
                .collect()
        }
    }
}

fn all_time_window<Tz: TimeZone>(tz: &Tz, bounds: DataBounds) -> WeekWindow {
    let first = week_start_date(local_date(tz, bounds.min));
    let last_sunday = week_start_date(local_date(tz, bounds.max));
    let start = local_midnight(tz, first);
    let end = match shift_days(last_sunday, 6) {
        Some(saturday) => {
            let close = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
            local_instant(tz, saturday.and_time(close))
        }
        None => bounds.max,
    };
    WeekWindow {
        start,
        end,
        label: ALL_TIME_LABEL.to_owned(),
    }
}

/// Lowest offset worth navigating to, with one spare week before the earliest data.
pub fn min_week_offset(now: DateTime<Utc>, earliest: DateTime<Utc>) -> i64 {
    let week_ms = Duration::days(7).num_milliseconds();
    let distance = (now - earliest).num_milliseconds().abs();
    let weeks = (distance + week_ms - 1) / week_ms;
    -weeks - 1
}

/// Offset whose window holds `latest`.
pub fn latest_week_offset<Tz: TimeZone>(tz: &Tz, now: DateTime<Utc>, latest: DateTime<Utc>) -> i64 {
    let this_week = week_start_date(local_date(tz, now));
    let that_week = week_start_date(local_date(tz, latest));
    (that_week - this_week).num_days().div_euclid(7)
}

pub fn format_range_label<Tz: TimeZone>(tz: &Tz, span: WeekSpan, windows: &[WeekWindow]) -> String {
    if span == WeekSpan::AllTime {
        return ALL_TIME_LABEL.to_owned();
    }
    match WeekWindow::spanning(windows) {
        Some((start, end)) => format!(
            "{} - {}",
            format_local(tz, start, RANGE_DATE),
            format_local(tz, end - Duration::milliseconds(1), RANGE_DATE)
        ),
        None => String::new(),
    }
}

fn format_local<Tz: TimeZone>(tz: &Tz, at: DateTime<Utc>, fmt: &str) -> String {
    local_date(tz, at).format(fmt).to_string()
}
