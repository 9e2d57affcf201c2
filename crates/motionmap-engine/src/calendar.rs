//! Local-time helpers. Weeks start on Sunday (weekday index 0).

use chrono::{
    DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Utc, Weekday,
};
use serde::{Deserialize, Serialize};

pub const DAYS_PER_WEEK: usize = 7;
pub const HOURS_PER_DAY: usize = 24;
pub const DAY_NAMES: [&str; DAYS_PER_WEEK] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

// Longest DST gap we step over when a local wall-clock time does not exist.
const MAX_GAP_HOURS: usize = 3;

/// One concrete local calendar hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalSlot {
    pub date: NaiveDate,
    pub hour: u32,
}

impl LocalSlot {
    pub fn of<Tz: TimeZone>(tz: &Tz, at: DateTime<Utc>) -> Self {
        let local = at.with_timezone(tz);
        Self {
            date: local.date_naive(),
            hour: local.hour(),
        }
    }

    pub fn day_index(&self) -> usize {
        weekday_index(self.date)
    }

    /// The hour-aligned instant that starts this slot.
    pub fn start<Tz: TimeZone>(&self, tz: &Tz) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.hour, 0, 0).unwrap_or(NaiveTime::MIN);
        local_instant(tz, self.date.and_time(time))
    }
}

/// Resolves a local wall-clock time. Ambiguous times take the earlier instant;
/// times skipped by a DST gap move forward to the first hour that exists.
pub fn local_instant<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    let mut candidate = naive;
    for _ in 0..=MAX_GAP_HOURS {
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt.with_timezone(&Utc);
        }
        candidate += Duration::hours(1);
    }
    Utc.from_utc_datetime(&naive)
}

pub fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    local_instant(tz, date.and_time(NaiveTime::MIN))
}

pub fn local_date<Tz: TimeZone>(tz: &Tz, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

pub fn weekday_index(date: NaiveDate) -> usize {
    date.weekday().num_days_from_sunday() as usize
}

pub fn week_start_date(date: NaiveDate) -> NaiveDate {
    date.week(Weekday::Sun).first_day()
}

pub fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

/// `[local midnight of date, local midnight of the next day)`.
pub fn day_bounds<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(tz, date);
    let end = date
        .succ_opt()
        .map(|next| local_midnight(tz, next))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weeks_start_on_sunday() {
        // 2024-05-06 is a Monday.
        assert_eq!(weekday_index(date(2024, 5, 6)), 1);
        assert_eq!(week_start_date(date(2024, 5, 6)), date(2024, 5, 5));
        assert_eq!(week_start_date(date(2024, 5, 5)), date(2024, 5, 5));
        assert_eq!(week_start_date(date(2024, 5, 11)), date(2024, 5, 5));
    }

    #[test]
    fn slots_use_local_wall_clock() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 5, 23, 30, 0).unwrap();
        let slot = LocalSlot::of(&tz, at);
        assert_eq!(slot.date, date(2024, 5, 6));
        assert_eq!(slot.hour, 1);
        assert_eq!(slot.day_index(), 1);
        assert_eq!(slot.start(&tz), Utc.with_ymd_and_hms(2024, 5, 5, 23, 0, 0).unwrap());
    }

    #[test]
    fn day_bounds_follow_the_offset() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let (start, end) = day_bounds(&tz, date(2024, 5, 6));
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 6, 5, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn gap_hours_move_forward() {
        let tz = chrono_tz::America::New_York;
        // 02:00-02:59 does not exist on 2024-03-10.
        let naive = date(2024, 3, 10).and_hms_opt(2, 30, 0).unwrap();
        assert_eq!(local_instant(&tz, naive), Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap());

        let skipped = LocalSlot {
            date: date(2024, 3, 10),
            hour: 2,
        };
        assert_eq!(skipped.start(&tz), Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap());

        let (start, end) = day_bounds(&tz, date(2024, 3, 10));
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 10, 5, 0, 0).unwrap());
        assert_eq!(end - start, Duration::hours(23));
    }

    #[test]
    fn repeated_hour_is_one_slot_starting_at_the_earlier_instant() {
        let tz = chrono_tz::America::New_York;
        let naive = date(2024, 11, 3).and_hms_opt(1, 30, 0).unwrap();
        // 01:30 EDT, not 01:30 EST.
        assert_eq!(local_instant(&tz, naive), Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap());

        let first_pass = LocalSlot::of(&tz, Utc.with_ymd_and_hms(2024, 11, 3, 5, 15, 0).unwrap());
        let second_pass = LocalSlot::of(&tz, Utc.with_ymd_and_hms(2024, 11, 3, 6, 15, 0).unwrap());
        assert_eq!(first_pass, second_pass);
        assert_eq!(first_pass.hour, 1);
        assert_eq!(first_pass.start(&tz), Utc.with_ymd_and_hms(2024, 11, 3, 5, 0, 0).unwrap());

        let (start, end) = day_bounds(&tz, date(2024, 11, 3));
        assert_eq!(end - start, Duration::hours(25));
    }

    #[test]
    fn shifting_days_in_both_directions() {
        assert_eq!(shift_days(date(2024, 5, 5), -7), Some(date(2024, 4, 28)));
        assert_eq!(shift_days(date(2024, 5, 5), 14), Some(date(2024, 5, 19)));
    }
}
