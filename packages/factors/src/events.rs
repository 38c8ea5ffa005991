//! Special-event date patterns.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use rider_demand_factors_models::{DayOfWeek, EventPattern, SpecialEvent};

use crate::calendar;

/// Returns `true` if `pattern` is active at `time`.
#[must_use]
pub fn matches(pattern: &EventPattern, time: NaiveDateTime) -> bool {
    let weekday = DayOfWeek::from_chrono(time.weekday());
    let hour = time.hour();
    match pattern {
        EventPattern::WeekdayMornings => weekday.is_weekday() && (6..10).contains(&hour),
        EventPattern::WeekdayEvenings => weekday.is_weekday() && (16..19).contains(&hour),
        EventPattern::Weekends => !weekday.is_weekday(),
        EventPattern::FirstSaturdayOfMonth => weekday == DayOfWeek::Saturday && time.day() <= 7,
        EventPattern::LastFridayOfMonth => {
            weekday == DayOfWeek::Friday && (time + Duration::days(7)).month() != time.month()
        }
        EventPattern::MonthDay { month, day } => time.month() == *month && time.day() == *day,
        EventPattern::Date { date } => time.date() == *date,
        EventPattern::Weekdays { days } => days.contains(&weekday),
        EventPattern::TimeWindow { start, end, days } => {
            calendar::in_window(*start, *end, days, time)
        }
    }
}

/// Compounds the multipliers of every event active at `time`.
///
/// Returns the product (1.0 when nothing matches) and the names of the
/// matching events in declaration order.
#[must_use]
pub fn event_factor(events: &[SpecialEvent], time: NaiveDateTime) -> (f64, Vec<String>) {
    events
        .iter()
        .filter(|e| matches(&e.pattern, time))
        .fold((1.0, Vec::new()), |(factor, mut names), event| {
            names.push(event.name.clone());
            (factor * event.multiplier, names)
        })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rider_demand_factors_models::ClockTime;

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn event(name: &str, pattern: EventPattern, multiplier: f64) -> SpecialEvent {
        SpecialEvent {
            name: name.to_owned(),
            pattern,
            multiplier,
        }
    }

    #[test]
    fn weekday_commute_windows() {
        // 2024-01-03 is a Wednesday, 2024-01-06 a Saturday.
        assert!(matches(&EventPattern::WeekdayMornings, at(2024, 1, 3, 6)));
        assert!(!matches(&EventPattern::WeekdayMornings, at(2024, 1, 3, 10)));
        assert!(!matches(&EventPattern::WeekdayMornings, at(2024, 1, 6, 8)));
        assert!(matches(&EventPattern::WeekdayEvenings, at(2024, 1, 3, 18)));
        assert!(!matches(&EventPattern::WeekdayEvenings, at(2024, 1, 3, 19)));
        assert!(matches(&EventPattern::Weekends, at(2024, 1, 6, 12)));
    }

    #[test]
    fn first_saturday_and_last_friday() {
        assert!(matches(&EventPattern::FirstSaturdayOfMonth, at(2024, 6, 1, 9)));
        assert!(!matches(&EventPattern::FirstSaturdayOfMonth, at(2024, 6, 8, 9)));
        assert!(matches(&EventPattern::LastFridayOfMonth, at(2024, 5, 31, 9)));
        assert!(matches(&EventPattern::LastFridayOfMonth, at(2024, 2, 23, 9)));
        assert!(!matches(&EventPattern::LastFridayOfMonth, at(2024, 5, 24, 9)));
    }

    #[test]
    fn fixed_dates() {
        let carnival = EventPattern::MonthDay { month: 8, day: 1 };
        assert!(matches(&carnival, at(2023, 8, 1, 0)));
        assert!(matches(&carnival, at(2024, 8, 1, 23)));
        assert!(!matches(&carnival, at(2024, 8, 2, 0)));

        let once = EventPattern::Date {
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        };
        assert!(matches(&once, at(2024, 3, 15, 12)));
        assert!(!matches(&once, at(2025, 3, 15, 12)));
    }

    #[test]
    fn time_window_pattern_uses_day_list() {
        let late = EventPattern::TimeWindow {
            start: ClockTime::new(20, 0).unwrap(),
            end: ClockTime::new(23, 0).unwrap(),
            days: vec![DayOfWeek::Thursday],
        };
        // 2024-01-04 is a Thursday.
        assert!(matches(&late, at(2024, 1, 4, 21)));
        assert!(!matches(&late, at(2024, 1, 5, 21)));
    }

    #[test]
    fn matching_events_compound() {
        let events = [
            event("market", EventPattern::FirstSaturdayOfMonth, 1.5),
            event("weekend", EventPattern::Weekends, 1.2),
            event("commute", EventPattern::WeekdayMornings, 3.0),
        ];
        let (factor, names) = event_factor(&events, at(2024, 6, 1, 9));
        assert!((factor - 1.8).abs() < 1e-12);
        assert_eq!(names, vec!["market".to_owned(), "weekend".to_owned()]);

        let (factor, names) = event_factor(&[], at(2024, 6, 1, 9));
        assert!((factor - 1.0).abs() < 1e-12);
        assert!(names.is_empty());
    }
}
