//! Passenger-flow evaluation for a single location and time window.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime};
use rand::Rng;
use rider_demand_factors_models::{
    ConditionKind, Conditions, DemandProfile, FactorBreakdown, FlowResult, LocationProfile, Model,
    RealTimeAdjustments, Season,
};

use crate::{calendar, events};

/// Boost applied to trip purposes whose peak preference matches the
/// current peak state, before renormalising.
pub const PEAK_PREFERENCE_BOOST: f64 = 1.5;

/// Product of the four real-time lookup tables for `conditions`.
///
/// An unset condition or a condition missing from its table contributes
/// `1.0`.
#[must_use]
pub fn real_time_factor(adjustments: &RealTimeAdjustments, conditions: &Conditions) -> f64 {
    [
        (ConditionKind::Weather, &adjustments.weather_impact),
        (ConditionKind::ServiceStatus, &adjustments.service_disruptions),
        (ConditionKind::EconomicCondition, &adjustments.economic_factors),
        (ConditionKind::InfrastructureStatus, &adjustments.infrastructure_events),
    ]
    .into_iter()
    .map(|(kind, table)| {
        conditions
            .get(kind)
            .and_then(|key| table.get(key))
            .copied()
            .unwrap_or(1.0)
    })
    .product()
}

/// Boosts purposes matching `is_peak` by [`PEAK_PREFERENCE_BOOST`] and
/// renormalises the mix to sum to 100.
///
/// A mix whose percentages are all zero is returned unchanged.
#[must_use]
pub fn trip_purposes(
    profiles: &BTreeMap<String, DemandProfile>,
    is_peak: bool,
) -> BTreeMap<String, f64> {
    let boosted: BTreeMap<String, f64> = profiles
        .iter()
        .map(|(purpose, profile)| {
            let boost = if profile.peak_preference.matches(is_peak) {
                PEAK_PREFERENCE_BOOST
            } else {
                1.0
            };
            (purpose.clone(), profile.percentage.max(0.0) * boost)
        })
        .collect();

    let total: f64 = boosted.values().sum();
    if total <= 0.0 {
        return boosted;
    }
    boosted
        .into_iter()
        .map(|(purpose, value)| (purpose, value * 100.0 / total))
        .collect()
}

/// Scales `rate` by a uniform draw from `[1 - variance, 1 + variance]`,
/// never going below zero. A non-finite rate yields zero and a
/// non-finite variance is treated as none.
fn apply_variance<R: Rng + ?Sized>(rng: &mut R, rate: f64, variance: f64) -> f64 {
    if !rate.is_finite() {
        return 0.0;
    }
    if !variance.is_finite() || variance <= 0.0 {
        return rate.max(0.0);
    }
    let variance = variance.min(1.0);
    let jitter = rng.gen_range(-variance..=variance);
    (rate * (1.0 + jitter)).max(0.0)
}

/// Evaluates one location at `time` over `duration_minutes`.
pub(crate) fn evaluate<R: Rng + ?Sized>(
    model: &Model,
    location_id: &str,
    location: &LocationProfile,
    conditions: &Conditions,
    time: NaiveDateTime,
    duration_minutes: u32,
    rng: &mut R,
) -> FlowResult {
    let patterns = &model.time_patterns;

    let day_type = calendar::day_type(time.date(), &patterns.holidays);
    let peak_window = calendar::active_peak_window(&patterns.peak_hours, time);
    let is_peak = peak_window.is_some();
    let season = Season::from_month(time.month());

    let time_factor =
        patterns.day_types.factor(day_type) * peak_window.map_or(1.0, |w| w.multiplier);
    let seasonal = location.seasonal_factors.factor(season);
    let (event, active_events) = events::event_factor(&location.special_events, time);
    let real_time = real_time_factor(&model.real_time_adjustments, conditions);
    let combined = time_factor * seasonal * event * real_time;

    let boarding_spec = location.passenger_rates.boarding.select(is_peak);
    let alighting_spec = location.passenger_rates.alighting.select(is_peak);
    let boarding_rate = apply_variance(
        rng,
        boarding_spec.rate_per_hour * combined,
        boarding_spec.variance,
    );
    let alighting_rate = apply_variance(
        rng,
        alighting_spec.rate_per_hour * combined,
        alighting_spec.variance,
    );

    let hours = f64::from(duration_minutes) / 60.0;

    FlowResult {
        location_id: location_id.to_owned(),
        timestamp: time,
        duration_minutes,
        is_peak,
        day_type,
        season,
        boarding_rate_per_hour: boarding_rate,
        alighting_rate_per_hour: alighting_rate,
        expected_boarding: boarding_rate * hours,
        expected_alighting: alighting_rate * hours,
        confidence_level: boarding_spec.confidence_level,
        factors: FactorBreakdown {
            time: time_factor,
            seasonal,
            event,
            real_time,
            combined,
        },
        active_events,
        trip_purposes: trip_purposes(&model.demand_profiles, is_peak),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rider_demand_factors_models::PeakPreference;

    use super::*;

    fn profile(percentage: f64, peak_preference: PeakPreference) -> DemandProfile {
        DemandProfile {
            percentage,
            peak_preference,
        }
    }

    #[test]
    fn real_time_factor_defaults_to_one() {
        let mut adjustments = RealTimeAdjustments::default();
        adjustments.weather_impact.insert("rain".to_owned(), 0.8);
        adjustments
            .service_disruptions
            .insert("delayed".to_owned(), 0.5);

        assert!((real_time_factor(&adjustments, &Conditions::default()) - 1.0).abs() < 1e-12);

        let conditions = Conditions::default()
            .with(ConditionKind::Weather, "rain")
            .with(ConditionKind::ServiceStatus, "delayed")
            .with(ConditionKind::EconomicCondition, "unknown_key");
        assert!((real_time_factor(&adjustments, &conditions) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn trip_purposes_boost_and_renormalise() {
        let profiles = BTreeMap::from([
            ("commute".to_owned(), profile(50.0, PeakPreference::Peak)),
            ("leisure".to_owned(), profile(30.0, PeakPreference::OffPeak)),
            ("errand".to_owned(), profile(20.0, PeakPreference::Neutral)),
        ]);

        let peak = trip_purposes(&profiles, true);
        assert!((peak.values().sum::<f64>() - 100.0).abs() < 1e-9);
        // 75 / (75 + 30 + 20)
        assert!((peak["commute"] - 60.0).abs() < 1e-9);

        let off_peak = trip_purposes(&profiles, false);
        assert!((off_peak.values().sum::<f64>() - 100.0).abs() < 1e-9);
        assert!(off_peak["leisure"] > 30.0);
        assert!(off_peak["commute"] < 50.0);
    }

    #[test]
    fn all_zero_mix_is_left_alone() {
        let profiles = BTreeMap::from([("idle".to_owned(), profile(0.0, PeakPreference::Peak))]);
        let mix = trip_purposes(&profiles, true);
        assert!(mix["idle"].abs() < 1e-12);
        assert!(trip_purposes(&BTreeMap::new(), true).is_empty());
    }

    #[test]
    fn variance_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let v = apply_variance(&mut rng, 100.0, 0.2);
            assert!((80.0..=120.0).contains(&v), "{v}");
        }
        assert!((apply_variance(&mut rng, 100.0, 0.0) - 100.0).abs() < 1e-12);
        assert!(apply_variance(&mut rng, -5.0, 0.0).abs() < 1e-12);
    }

    #[test]
    fn non_finite_inputs_do_not_panic() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!((apply_variance(&mut rng, 10.0, f64::NAN) - 10.0).abs() < 1e-12);
        assert!((apply_variance(&mut rng, 10.0, f64::INFINITY) - 10.0).abs() < 1e-12);
        assert!(apply_variance(&mut rng, f64::NAN, 0.2).abs() < 1e-12);
        assert!(apply_variance(&mut rng, f64::INFINITY, 0.2).abs() < 1e-12);
    }

    #[test]
    fn unvalidated_nan_variance_gives_finite_flow() {
        let doc = r"
            [locations.stop.passenger_rates.boarding.peak]
            rate_per_hour = 10.0
            variance = nan

            [locations.stop.passenger_rates.boarding.off_peak]
            rate_per_hour = 5.0
            variance = nan

            [locations.stop.passenger_rates.alighting.peak]
            rate_per_hour = 8.0
            variance = nan

            [locations.stop.passenger_rates.alighting.off_peak]
            rate_per_hour = 4.0
            variance = nan
        ";
        let mut factors = crate::FactorModel::new();
        factors
            .load_model_str("nan", doc, crate::ModelFormat::Toml, false)
            .unwrap();

        let time = chrono::NaiveDate::from_ymd_opt(2025, 6, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let flow = factors
            .calculate_passenger_flow_with_rng("nan", "stop", time, 30, &mut rng)
            .unwrap();
        assert!(flow.boarding_rate_per_hour.is_finite());
        assert!(flow.boarding_rate_per_hour >= 0.0);
        assert!(flow.expected_alighting.is_finite());
        assert!(flow.expected_alighting >= 0.0);
    }
}
