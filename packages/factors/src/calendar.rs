//! Calendar lookups: civic holidays, day types and peak windows.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rider_demand_factors_models::{ClockTime, DayOfWeek, DayType, PeakWindow};

/// Fixed civic holidays as `(month, day)`.
pub const CIVIC_HOLIDAYS: [(u32, u32); 8] = [
    (1, 1),
    (1, 21),
    (4, 28),
    (5, 1),
    (8, 1),
    (11, 30),
    (12, 25),
    (12, 26),
];

/// Returns `true` if `date` is a fixed civic holiday or listed in `extra`.
#[must_use]
pub fn is_holiday(date: NaiveDate, extra: &[NaiveDate]) -> bool {
    CIVIC_HOLIDAYS.contains(&(date.month(), date.day())) || extra.contains(&date)
}

/// Resolves the day type of `date`. Holidays take precedence over
/// Sunday, which takes precedence over Saturday.
#[must_use]
pub fn day_type(date: NaiveDate, extra_holidays: &[NaiveDate]) -> DayType {
    if is_holiday(date, extra_holidays) {
        return DayType::Holiday;
    }
    match DayOfWeek::from_chrono(date.weekday()) {
        DayOfWeek::Sunday => DayType::Sunday,
        DayOfWeek::Saturday => DayType::Saturday,
        _ => DayType::Weekday,
    }
}

/// Returns `true` if `time` falls inside the `[start, end)` window on one
/// of `days`.
///
/// When `end` is earlier than `start` the window wraps past midnight: the
/// part after midnight belongs to the window that started the previous
/// day, so it is matched against the previous day's weekday. Equal
/// `start` and `end` is an empty window.
#[must_use]
pub fn in_window(
    start: ClockTime,
    end: ClockTime,
    days: &[DayOfWeek],
    time: NaiveDateTime,
) -> bool {
    let now = ClockTime::of(time);
    let today = DayOfWeek::from_chrono(time.weekday());

    if start < end {
        return days.contains(&today) && start <= now && now < end;
    }
    if start == end {
        return false;
    }

    if now >= start {
        return days.contains(&today);
    }
    if now < end {
        let yesterday = DayOfWeek::from_chrono((time - Duration::days(1)).weekday());
        return days.contains(&yesterday);
    }
    false
}

/// Returns the first peak window active at `time`, if any.
#[must_use]
pub fn active_peak_window(windows: &[PeakWindow], time: NaiveDateTime) -> Option<&PeakWindow> {
    windows
        .iter()
        .find(|w| in_window(w.start, w.end, &w.days, time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn window(start: (u16, u16), end: (u16, u16), days: &[DayOfWeek]) -> PeakWindow {
        PeakWindow {
            name: None,
            start: ClockTime::new(start.0, start.1).unwrap(),
            end: ClockTime::new(end.0, end.1).unwrap(),
            days: days.to_vec(),
            multiplier: 1.0,
        }
    }

    #[test]
    fn holiday_beats_weekday_and_weekend() {
        // 2024-01-01 is a Monday, 2023-12-31 a Sunday, 2022-01-01 a Saturday.
        for (time, expected) in [
            (at(2024, 1, 1, 0, 0), DayType::Holiday),
            (at(2022, 1, 1, 0, 0), DayType::Holiday),
            (at(2023, 12, 31, 0, 0), DayType::Sunday),
            (at(2024, 1, 6, 0, 0), DayType::Saturday),
            (at(2024, 1, 2, 0, 0), DayType::Weekday),
        ] {
            assert_eq!(day_type(time.date(), &[]), expected, "{time}");
        }
    }

    #[test]
    fn extra_holidays_are_honoured() {
        let extra = [NaiveDate::from_ymd_opt(2024, 3, 29).unwrap()];
        assert_eq!(day_type(extra[0], &extra), DayType::Holiday);
        assert_eq!(day_type(extra[0], &[]), DayType::Weekday);
    }

    #[test]
    fn same_day_window_is_half_open() {
        let w = window((7, 0), (9, 0), &[DayOfWeek::Monday]);
        let windows = [w];
        assert!(active_peak_window(&windows, at(2024, 1, 1, 7, 0)).is_some());
        assert!(active_peak_window(&windows, at(2024, 1, 1, 8, 59)).is_some());
        assert!(active_peak_window(&windows, at(2024, 1, 1, 9, 0)).is_none());
        assert!(active_peak_window(&windows, at(2024, 1, 2, 8, 0)).is_none());
    }

    #[test]
    fn overnight_window_wraps_into_next_day() {
        // Friday 22:00 to 02:00.
        let windows = [window((22, 0), (2, 0), &[DayOfWeek::Friday])];
        // 2024-01-05 is a Friday.
        assert!(active_peak_window(&windows, at(2024, 1, 5, 23, 30)).is_some());
        assert!(active_peak_window(&windows, at(2024, 1, 6, 1, 59)).is_some());
        assert!(active_peak_window(&windows, at(2024, 1, 6, 2, 0)).is_none());
        assert!(active_peak_window(&windows, at(2024, 1, 6, 23, 0)).is_none());
        assert!(active_peak_window(&windows, at(2024, 1, 5, 1, 0)).is_none());
    }

    #[test]
    fn first_matching_window_wins() {
        let mut morning = window((6, 0), (10, 0), &[DayOfWeek::Monday]);
        morning.multiplier = 1.4;
        let mut rush = window((8, 0), (9, 0), &[DayOfWeek::Monday]);
        rush.multiplier = 2.0;
        let windows = [morning, rush];
        let active = active_peak_window(&windows, at(2024, 1, 1, 8, 30)).unwrap();
        assert!((active.multiplier - 1.4).abs() < 1e-12);
    }
}
