//! Semantic validation of parsed models.
//!
//! Parsing already guarantees the document's shape (clock times, weekday
//! names, event pattern tags). The checks here catch values that parse but
//! make no sense, and every problem found is reported at once.

use chrono::NaiveDate;
use rider_demand_factors_models::{EventPattern, Model, RateSpec};

/// Allowed distance of the demand-profile percentage total from 100.
const PERCENTAGE_TOLERANCE: f64 = 1.0;

/// Collects every semantic problem in `model`. An empty result means the
/// model is valid.
#[must_use]
pub fn validate_model(model: &Model) -> Vec<String> {
    let mut problems = Vec::new();

    if model.locations.is_empty() {
        problems.push("model defines no locations".to_owned());
    }

    for (id, location) in &model.locations {
        let rates = &location.passenger_rates;
        for (direction, table) in [
            ("boarding", &rates.boarding),
            ("alighting", &rates.alighting),
        ] {
            check_rate(&mut problems, id, direction, "peak", &table.peak);
            check_rate(&mut problems, id, direction, "off_peak", &table.off_peak);
        }

        for (season, factor) in location.seasonal_factors.configured() {
            if !is_non_negative(factor) {
                problems.push(format!(
                    "location '{id}': seasonal factor for {season} must be non-negative, got {factor}"
                ));
            }
        }

        for event in &location.special_events {
            if !is_non_negative(event.multiplier) {
                problems.push(format!(
                    "location '{id}': event '{}' multiplier must be non-negative, got {}",
                    event.name, event.multiplier
                ));
            }
            check_pattern(&mut problems, id, &event.name, &event.pattern);
        }
    }

    for (i, window) in model.time_patterns.peak_hours.iter().enumerate() {
        let label = window.name.clone().unwrap_or_else(|| format!("#{i}"));
        if window.days.is_empty() {
            problems.push(format!("peak window {label} names no weekdays"));
        }
        if window.start == window.end {
            problems.push(format!(
                "peak window {label} is empty ({} to {})",
                window.start, window.end
            ));
        }
        if !is_non_negative(window.multiplier) {
            problems.push(format!(
                "peak window {label} multiplier must be non-negative, got {}",
                window.multiplier
            ));
        }
    }

    let day_types = &model.time_patterns.day_types;
    for (name, factor) in [
        ("weekday", day_types.weekday),
        ("saturday", day_types.saturday),
        ("sunday", day_types.sunday),
        ("holiday", day_types.holiday),
    ] {
        if !is_non_negative(factor) {
            problems.push(format!(
                "day type '{name}' multiplier must be non-negative, got {factor}"
            ));
        }
    }

    if !model.demand_profiles.is_empty() {
        let mut total = 0.0;
        for (purpose, profile) in &model.demand_profiles {
            if !is_non_negative(profile.percentage) {
                problems.push(format!(
                    "demand profile '{purpose}' percentage must be non-negative, got {}",
                    profile.percentage
                ));
            }
            total += profile.percentage;
        }
        if (total - 100.0).abs() > PERCENTAGE_TOLERANCE {
            problems.push(format!(
                "demand profile percentages must sum to 100, got {total}"
            ));
        }
    }

    let adjustments = &model.real_time_adjustments;
    for (table, entries) in [
        ("weather_impact", &adjustments.weather_impact),
        ("service_disruptions", &adjustments.service_disruptions),
        ("economic_factors", &adjustments.economic_factors),
        ("infrastructure_events", &adjustments.infrastructure_events),
    ] {
        for (key, factor) in entries {
            if !is_non_negative(*factor) {
                problems.push(format!(
                    "{table}.{key} must be non-negative, got {factor}"
                ));
            }
        }
    }

    problems
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn is_unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn check_rate(
    problems: &mut Vec<String>,
    id: &str,
    direction: &str,
    period: &str,
    rate: &RateSpec,
) {
    if !is_non_negative(rate.rate_per_hour) {
        problems.push(format!(
            "location '{id}': {direction}.{period} rate must be non-negative, got {}",
            rate.rate_per_hour
        ));
    }
    if !is_unit_interval(rate.variance) {
        problems.push(format!(
            "location '{id}': {direction}.{period} variance must be within [0, 1], got {}",
            rate.variance
        ));
    }
    if !is_unit_interval(rate.confidence_level) {
        problems.push(format!(
            "location '{id}': {direction}.{period} confidence level must be within [0, 1], got {}",
            rate.confidence_level
        ));
    }
}

fn check_pattern(problems: &mut Vec<String>, id: &str, name: &str, pattern: &EventPattern) {
    match pattern {
        // 2024 is a leap year, so 29 February is accepted.
        EventPattern::MonthDay { month, day } => {
            if NaiveDate::from_ymd_opt(2024, *month, *day).is_none() {
                problems.push(format!(
                    "location '{id}': event '{name}' has no such date {month}/{day}"
                ));
            }
        }
        EventPattern::Weekdays { days } | EventPattern::TimeWindow { days, .. }
            if days.is_empty() =>
        {
            problems.push(format!("location '{id}': event '{name}' names no weekdays"));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use rider_demand_factors_models::{DemandProfile, PeakPreference};

    use super::*;

    fn minimal() -> Model {
        serde_json::from_str(
            r#"{
                "locations": {
                    "stop": {
                        "passenger_rates": {
                            "boarding": {"peak": {"rate_per_hour": 10.0}, "off_peak": {"rate_per_hour": 5.0}},
                            "alighting": {"peak": {"rate_per_hour": 8.0}, "off_peak": {"rate_per_hour": 4.0}}
                        }
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn minimal_model_is_valid() {
        assert!(validate_model(&minimal()).is_empty());
    }

    #[test]
    fn reports_every_problem_at_once() {
        let mut model = minimal();
        let stop = model.locations.get_mut("stop").unwrap();
        stop.passenger_rates.boarding.peak.rate_per_hour = -1.0;
        stop.passenger_rates.alighting.off_peak.variance = 1.5;
        stop.seasonal_factors.winter = Some(-0.2);
        model.demand_profiles.insert(
            "commute".to_owned(),
            DemandProfile {
                percentage: 70.0,
                peak_preference: PeakPreference::Peak,
            },
        );

        let problems = validate_model(&model);
        assert_eq!(problems.len(), 4, "{problems:#?}");
        assert!(problems.iter().any(|p| p.contains("boarding.peak rate")));
        assert!(problems.iter().any(|p| p.contains("variance")));
        assert!(problems.iter().any(|p| p.contains("winter")));
        assert!(problems.iter().any(|p| p.contains("sum to 100")));
    }

    #[test]
    fn rejects_empty_model_and_bad_event_dates() {
        let mut model = minimal();
        model.locations.get_mut("stop").unwrap().special_events.push(
            rider_demand_factors_models::SpecialEvent {
                name: "ghost".to_owned(),
                pattern: EventPattern::MonthDay { month: 2, day: 30 },
                multiplier: 1.0,
            },
        );
        let problems = validate_model(&model);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("no such date"));

        model.locations.clear();
        assert!(
            validate_model(&model)
                .iter()
                .any(|p| p.contains("no locations"))
        );
    }

    #[test]
    fn percentages_within_tolerance_pass() {
        let mut model = minimal();
        for (name, pct) in [("a", 33.3), ("b", 33.3), ("c", 33.3)] {
            model.demand_profiles.insert(
                name.to_owned(),
                DemandProfile {
                    percentage: pct,
                    peak_preference: PeakPreference::Neutral,
                },
            );
        }
        assert!(validate_model(&model).is_empty());
    }
}
