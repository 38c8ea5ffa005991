#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spawn configuration and result types.
//!
//! These types describe the inputs of the spawn-rate pipeline (depot and
//! route building counts, temporal multipliers) and the [`SpawnResult`]
//! it produces for a route on each simulation tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Base rate (passengers per building per hour) used when a config does
/// not set one.
pub const DEFAULT_BASE_RATE: f64 = 0.3;

/// Calibrated base rate used by [`SpawnConfig::calibrated`].
pub const CALIBRATED_BASE_RATE: f64 = 0.05;

/// Multiplier used for any hour or weekday without an explicit entry.
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

/// Error returned when a rate table contains an invalid key or value.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRateTableError {
    /// The offending key as written in the source document.
    pub key: String,
    /// Why the entry was rejected.
    pub reason: String,
}

impl std::fmt::Display for InvalidRateTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid rate table entry '{}': {}",
            self.key, self.reason
        )
    }
}

impl std::error::Error for InvalidRateTableError {}

fn parse_table<const N: usize>(
    map: BTreeMap<String, f64>,
) -> Result<[Option<f64>; N], InvalidRateTableError> {
    let mut slots = [None; N];
    for (key, value) in map {
        let index = key
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|i| *i < N)
            .ok_or_else(|| InvalidRateTableError {
                key: key.clone(),
                reason: format!("expected an integer key in 0..{N}"),
            })?;
        if !value.is_finite() || value < 0.0 {
            return Err(InvalidRateTableError {
                key,
                reason: format!("multiplier must be a non-negative number, got {value}"),
            });
        }
        slots[index] = Some(value);
    }
    Ok(slots)
}

fn table_to_map<const N: usize>(slots: &[Option<f64>; N]) -> BTreeMap<String, f64> {
    slots
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i.to_string(), v)))
        .collect()
}

/// Per-hour multipliers, indexed by hour of day (0-23).
///
/// Serialized as a map keyed by the hour as a string (`"8" = 2.0`), which
/// is how the spawn documents are authored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, f64>",
    into = "BTreeMap<String, f64>"
)]
pub struct HourlyRates([Option<f64>; 24]);

impl HourlyRates {
    /// Returns the explicit multiplier for `hour`, if one is configured.
    #[must_use]
    pub fn get(&self, hour: u32) -> Option<f64> {
        self.0.get(hour as usize).copied().flatten()
    }

    /// Returns the multiplier for `hour`, or [`DEFAULT_MULTIPLIER`].
    #[must_use]
    pub fn multiplier(&self, hour: u32) -> f64 {
        self.get(hour).unwrap_or(DEFAULT_MULTIPLIER)
    }

    /// Sets the multiplier for `hour`. Out-of-range hours are ignored.
    pub fn set(&mut self, hour: u32, multiplier: f64) {
        if let Some(slot) = self.0.get_mut(hour as usize) {
            *slot = Some(multiplier.max(0.0));
        }
    }
}

impl TryFrom<BTreeMap<String, f64>> for HourlyRates {
    type Error = InvalidRateTableError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        parse_table(map).map(Self)
    }
}

impl From<HourlyRates> for BTreeMap<String, f64> {
    fn from(rates: HourlyRates) -> Self {
        table_to_map(&rates.0)
    }
}

/// Per-weekday multipliers, indexed `0 = Monday` through `6 = Sunday`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, f64>",
    into = "BTreeMap<String, f64>"
)]
pub struct DayMultipliers([Option<f64>; 7]);

impl DayMultipliers {
    /// Returns the explicit multiplier for `weekday`, if one is configured.
    #[must_use]
    pub fn get(&self, weekday: u32) -> Option<f64> {
        self.0.get(weekday as usize).copied().flatten()
    }

    /// Returns the multiplier for `weekday`, or [`DEFAULT_MULTIPLIER`].
    #[must_use]
    pub fn multiplier(&self, weekday: u32) -> f64 {
        self.get(weekday).unwrap_or(DEFAULT_MULTIPLIER)
    }

    /// Sets the multiplier for `weekday`. Out-of-range days are ignored.
    pub fn set(&mut self, weekday: u32, multiplier: f64) {
        if let Some(slot) = self.0.get_mut(weekday as usize) {
            *slot = Some(multiplier.max(0.0));
        }
    }
}

impl TryFrom<BTreeMap<String, f64>> for DayMultipliers {
    type Error = InvalidRateTableError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        parse_table(map).map(Self)
    }
}

impl From<DayMultipliers> for BTreeMap<String, f64> {
    fn from(days: DayMultipliers) -> Self {
        table_to_map(&days.0)
    }
}

/// Temporal spawn configuration for one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    /// Passengers per building per hour. Falls back to
    /// [`DEFAULT_BASE_RATE`] when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_rate: Option<f64>,
    /// Hour-of-day multipliers.
    #[serde(default)]
    pub hourly_rates: HourlyRates,
    /// Day-of-week multipliers.
    #[serde(default)]
    pub day_multipliers: DayMultipliers,
}

impl SpawnConfig {
    /// A config with the calibrated base rate and no multipliers.
    #[must_use]
    pub fn calibrated() -> Self {
        Self {
            base_rate: Some(CALIBRATED_BASE_RATE),
            ..Self::default()
        }
    }

    /// Returns the configured base rate, or [`DEFAULT_BASE_RATE`].
    #[must_use]
    pub fn base_rate_or_default(&self) -> f64 {
        self.base_rate.unwrap_or(DEFAULT_BASE_RATE)
    }

    /// Sets the base rate.
    #[must_use]
    pub const fn with_base_rate(mut self, base_rate: f64) -> Self {
        self.base_rate = Some(base_rate);
        self
    }

    /// Sets the multiplier for one hour of the day.
    #[must_use]
    pub fn with_hourly_rate(mut self, hour: u32, multiplier: f64) -> Self {
        self.hourly_rates.set(hour, multiplier);
        self
    }

    /// Sets the multiplier for one day of the week (`0 = Monday`).
    #[must_use]
    pub fn with_day_multiplier(mut self, weekday: u32, multiplier: f64) -> Self {
        self.day_multipliers.set(weekday, multiplier);
        self
    }
}

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a point from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A depot (terminal) and the structures counted in its catchment radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Depot {
    /// Depot identifier.
    pub id: String,
    /// Depot location.
    pub location: GeoPoint,
    /// Number of structures within the terminal catchment radius.
    pub buildings_near_depot: u32,
}

impl Depot {
    /// Creates a depot with no counted buildings.
    #[must_use]
    pub fn new(id: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: id.into(),
            location,
            buildings_near_depot: 0,
        }
    }

    /// Sets the terminal catchment building count.
    #[must_use]
    pub const fn with_buildings(mut self, buildings: u32) -> Self {
        self.buildings_near_depot = buildings;
        self
    }
}

/// A route served from a depot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Route identifier.
    pub id: String,
    /// Identifier of the depot this route belongs to.
    pub depot_id: String,
    /// Ordered polyline of the route path.
    pub geometry: Vec<GeoPoint>,
    /// Number of structures within the buffer around the route path.
    pub buildings_along_route: u32,
}

impl Route {
    /// Creates a route with an empty geometry and no counted buildings.
    #[must_use]
    pub fn new(id: impl Into<String>, depot_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            depot_id: depot_id.into(),
            geometry: Vec::new(),
            buildings_along_route: 0,
        }
    }

    /// Sets the route polyline.
    #[must_use]
    pub fn with_geometry(mut self, geometry: Vec<GeoPoint>) -> Self {
        self.geometry = geometry;
        self
    }

    /// Sets the buffered building count.
    #[must_use]
    pub const fn with_buildings(mut self, buildings: u32) -> Self {
        self.buildings_along_route = buildings;
        self
    }
}

/// The expectation half of a spawn evaluation, without a Poisson draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnExpectation {
    /// Passengers per building per hour before temporal multipliers.
    pub base_rate: f64,
    /// Hour-of-day multiplier.
    pub hourly_mult: f64,
    /// Day-of-week multiplier.
    pub day_mult: f64,
    /// `base_rate * hourly_mult * day_mult`.
    pub effective_rate: f64,
    /// Expected passengers per hour across the whole depot catchment.
    pub terminal_population: f64,
    /// This route's share of the terminal population (0..=1).
    pub route_attractiveness: f64,
    /// Expected passengers per hour on this route.
    pub passengers_per_hour: f64,
    /// Length of the sampling window in minutes.
    pub window_minutes: f64,
    /// Poisson rate for the sampling window.
    pub lambda_param: f64,
}

impl SpawnExpectation {
    /// Completes the expectation with a sampled spawn count.
    #[must_use]
    pub const fn with_spawn_count(self, spawn_count: u32) -> SpawnResult {
        SpawnResult {
            base_rate: self.base_rate,
            hourly_mult: self.hourly_mult,
            day_mult: self.day_mult,
            effective_rate: self.effective_rate,
            terminal_population: self.terminal_population,
            route_attractiveness: self.route_attractiveness,
            passengers_per_hour: self.passengers_per_hour,
            window_minutes: self.window_minutes,
            lambda_param: self.lambda_param,
            spawn_count,
        }
    }
}

/// A complete spawn evaluation for one route on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnResult {
    /// Passengers per building per hour before temporal multipliers.
    pub base_rate: f64,
    /// Hour-of-day multiplier.
    pub hourly_mult: f64,
    /// Day-of-week multiplier.
    pub day_mult: f64,
    /// `base_rate * hourly_mult * day_mult`.
    pub effective_rate: f64,
    /// Expected passengers per hour across the whole depot catchment.
    pub terminal_population: f64,
    /// This route's share of the terminal population (0..=1).
    pub route_attractiveness: f64,
    /// Expected passengers per hour on this route.
    pub passengers_per_hour: f64,
    /// Length of the sampling window in minutes.
    pub window_minutes: f64,
    /// Poisson rate for the sampling window.
    pub lambda_param: f64,
    /// Passengers sampled for this window.
    pub spawn_count: u32,
}

impl SpawnResult {
    /// Drops the sampled count, leaving the expectation fields.
    #[must_use]
    pub const fn expectation(&self) -> SpawnExpectation {
        SpawnExpectation {
            base_rate: self.base_rate,
            hourly_mult: self.hourly_mult,
            day_mult: self.day_mult,
            effective_rate: self.effective_rate,
            terminal_population: self.terminal_population,
            route_attractiveness: self.route_attractiveness,
            passengers_per_hour: self.passengers_per_hour,
            window_minutes: self.window_minutes,
            lambda_param: self.lambda_param,
        }
    }
}
