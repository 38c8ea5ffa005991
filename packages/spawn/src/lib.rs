#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hierarchical spawn-rate calculator.
//!
//! Turns a depot's terminal catchment and a route's share of that
//! catchment into an expected passengers-per-hour figure, then samples an
//! integer spawn count for a time window from a Poisson distribution:
//!
//! ```text
//! effective_rate       = base_rate * hourly_mult * day_mult
//! terminal_population  = buildings_near_depot * effective_rate
//! route_attractiveness = buildings_along_route / total_buildings_all_routes
//! passengers_per_hour  = terminal_population * route_attractiveness
//! lambda               = passengers_per_hour * window_minutes / 60
//! spawn_count          ~ Poisson(lambda)
//! ```
//!
//! Every function here is total. Degenerate inputs (no buildings, an empty
//! depot, a non-positive rate) resolve to zero instead of an error so a
//! simulation tick can never be halted by a spawn decision.

pub mod poisson;

use chrono::{Datelike, NaiveDateTime, Timelike};
use rider_demand_spawn_models::{SpawnConfig, SpawnExpectation, SpawnResult};

pub use poisson::{sample_poisson, sample_spawn_count};

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Temporal multipliers resolved for a single instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalMultipliers {
    /// Passengers per building per hour.
    pub base_rate: f64,
    /// Multiplier for the hour of day.
    pub hourly_mult: f64,
    /// Multiplier for the day of week.
    pub day_mult: f64,
}

impl TemporalMultipliers {
    /// `base_rate * hourly_mult * day_mult`.
    #[must_use]
    pub fn effective_rate(&self) -> f64 {
        effective_rate(self.base_rate, self.hourly_mult, self.day_mult)
    }
}

/// Building counts feeding one route's spawn evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatchmentCounts {
    /// Structures within the depot's terminal radius.
    pub buildings_near_depot: u32,
    /// Structures within the buffer around this route.
    pub buildings_along_route: u32,
    /// Sum of `buildings_along_route` across every route sharing the depot.
    pub total_buildings_all_routes: u32,
}

impl CatchmentCounts {
    /// Creates a set of counts.
    #[must_use]
    pub const fn new(
        buildings_near_depot: u32,
        buildings_along_route: u32,
        total_buildings_all_routes: u32,
    ) -> Self {
        Self {
            buildings_near_depot,
            buildings_along_route,
            total_buildings_all_routes,
        }
    }
}

/// Resolves the base rate and the hour/day multipliers for `time`.
///
/// Hours are taken from the wall clock of `time`; weekdays are numbered
/// `0 = Monday` through `6 = Sunday`. Missing entries fall back to the
/// defaults documented on [`SpawnConfig`].
#[must_use]
pub fn extract_temporal_multipliers(
    config: &SpawnConfig,
    time: NaiveDateTime,
) -> TemporalMultipliers {
    TemporalMultipliers {
        base_rate: config.base_rate_or_default(),
        hourly_mult: config.hourly_rates.multiplier(time.hour()),
        day_mult: config
            .day_multipliers
            .multiplier(time.weekday().num_days_from_monday()),
    }
}

/// `base_rate * hourly_mult * day_mult`.
#[must_use]
pub fn effective_rate(base_rate: f64, hourly_mult: f64, day_mult: f64) -> f64 {
    base_rate * hourly_mult * day_mult
}

/// Expected passengers per hour generated by a depot's whole catchment.
#[must_use]
pub fn terminal_population(buildings_near_depot: u32, effective_rate: f64) -> f64 {
    f64::from(buildings_near_depot) * effective_rate
}

/// A route's share of its depot's terminal population.
///
/// Returns `0.0` when no route at the depot has any buildings.
#[must_use]
pub fn route_attractiveness(buildings_along_route: u32, total_buildings_all_routes: u32) -> f64 {
    if total_buildings_all_routes == 0 {
        return 0.0;
    }
    f64::from(buildings_along_route) / f64::from(total_buildings_all_routes)
}

/// Expected passengers per hour on one route.
#[must_use]
pub fn passengers_per_route_per_hour(terminal_population: f64, route_attractiveness: f64) -> f64 {
    terminal_population * route_attractiveness
}

/// Poisson rate for a window of `window_minutes`.
#[must_use]
pub fn lambda_for_window(passengers_per_hour: f64, window_minutes: f64) -> f64 {
    passengers_per_hour * (window_minutes / 60.0)
}

/// Runs the expectation half of the pipeline.
///
/// Identical to [`hybrid_spawn`] but never samples, so its output is a
/// pure function of the inputs.
#[must_use]
pub fn validation_hybrid_spawn(
    counts: CatchmentCounts,
    config: &SpawnConfig,
    time: NaiveDateTime,
    window_minutes: f64,
) -> SpawnExpectation {
    let multipliers = extract_temporal_multipliers(config, time);
    let effective_rate = multipliers.effective_rate();
    let terminal_population = terminal_population(counts.buildings_near_depot, effective_rate);
    let route_attractiveness = route_attractiveness(
        counts.buildings_along_route,
        counts.total_buildings_all_routes,
    );
    let passengers_per_hour =
        passengers_per_route_per_hour(terminal_population, route_attractiveness);
    let lambda_param = lambda_for_window(passengers_per_hour, window_minutes);

    SpawnExpectation {
        base_rate: multipliers.base_rate,
        hourly_mult: multipliers.hourly_mult,
        day_mult: multipliers.day_mult,
        effective_rate,
        terminal_population,
        route_attractiveness,
        passengers_per_hour,
        window_minutes,
        lambda_param,
    }
}

/// Runs the full pipeline and draws a spawn count for the window.
///
/// With `seed = Some(s)` the draw is reproducible for identical inputs.
#[must_use]
pub fn hybrid_spawn(
    counts: CatchmentCounts,
    config: &SpawnConfig,
    time: NaiveDateTime,
    window_minutes: f64,
    seed: Option<u64>,
) -> SpawnResult {
    let expectation = validation_hybrid_spawn(counts, config, time, window_minutes);
    let spawn_count = sample_spawn_count(expectation.lambda_param, seed);

    log::trace!(
        "spawn at {time}: rate={:.5} terminal={:.3} attract={:.4} pph={:.3} lambda={:.3} -> {spawn_count}",
        expectation.effective_rate,
        expectation.terminal_population,
        expectation.route_attractiveness,
        expectation.passengers_per_hour,
        expectation.lambda_param,
    );

    expectation.with_spawn_count(spawn_count)
}

/// Derives an independent, reproducible seed for one route from a tick seed.
///
/// Uses FNV-1a over the route identifier so the result is stable across
/// processes and platforms.
#[must_use]
pub fn derive_route_seed(seed: u64, route_id: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let hash = route_id.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    seed ^ hash.wrapping_mul(MIXING_CONSTANT)
}
