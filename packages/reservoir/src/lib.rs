#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-depot, per-route passenger reservoir.
//!
//! [`Reservoir`] is the composition root of the engine. It owns the depot
//! and route registry, the active [`SpawnConfig`], a [`FactorModel`] and,
//! once [`attach_catchments`](Reservoir::attach_catchments) has been
//! called, one [`CatchmentCache`] per route and per depot. Each simulation
//! tick asks it for a spawn decision on every route.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use rider_demand_catchment::{CatchmentCache, CatchmentConfig, CatchmentError};
use rider_demand_catchment_models::Zone;
use rider_demand_factors::FactorModel;
use rider_demand_factors_models::FlowResult;
use rider_demand_geodata::{GeodataProvider, GeodataQuery};
use rider_demand_spawn::{CatchmentCounts, derive_route_seed, hybrid_spawn, validation_hybrid_spawn};
use rider_demand_spawn_models::{Depot, Route, SpawnConfig, SpawnExpectation, SpawnResult};
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

/// Errors that can occur in the reservoir.
#[derive(Debug, thiserror::Error)]
pub enum ReservoirError {
    /// No depot is registered under this id.
    #[error("Unknown depot: {id}")]
    UnknownDepot {
        /// The requested id.
        id: String,
    },

    /// No route is registered under this id.
    #[error("Unknown route: {id}")]
    UnknownRoute {
        /// The requested id.
        id: String,
    },

    /// A catchment cache could not be started.
    #[error("Catchment error: {0}")]
    Catchment(#[from] CatchmentError),
}

const fn default_window_minutes() -> u32 {
    15
}

/// Settings from the `[reservoir]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservoirConfig {
    /// Length of one simulation tick.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
    /// Tick seed for reproducible runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            seed: None,
        }
    }
}

/// Spawn decision for one route on one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSpawn {
    /// Depot the route belongs to.
    pub depot_id: String,
    /// Route the passengers spawn on.
    pub route_id: String,
    /// Full pipeline output.
    pub result: SpawnResult,
}

/// Expected (unsampled) demand for one route on one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteExpectation {
    /// Depot the route belongs to.
    pub depot_id: String,
    /// Route the expectation is for.
    pub route_id: String,
    /// Expectation fields of the pipeline.
    pub expectation: SpawnExpectation,
}

/// Runs the spawn pipeline for `route` departing from `depot`.
///
/// `total_buildings_all_routes` is the sum of `buildings_along_route`
/// across every route sharing the depot.
#[must_use]
pub fn evaluate_spawn(
    depot: &Depot,
    route: &Route,
    total_buildings_all_routes: u32,
    config: &SpawnConfig,
    time: NaiveDateTime,
    window_minutes: f64,
    seed: Option<u64>,
) -> SpawnResult {
    hybrid_spawn(
        CatchmentCounts::new(
            depot.buildings_near_depot,
            route.buildings_along_route,
            total_buildings_all_routes,
        ),
        config,
        time,
        window_minutes,
        seed,
    )
}

/// Owned copies of a cache's current population and amenity zones.
#[must_use]
pub fn snapshot_catchment(cache: &CatchmentCache) -> (Vec<Zone>, Vec<Zone>) {
    cache.get_cached_zones()
}

/// Depot/route registry with spawn, flow and catchment plumbing.
pub struct Reservoir {
    depots: BTreeMap<String, Depot>,
    routes: BTreeMap<String, Route>,
    config: SpawnConfig,
    factors: FactorModel,
    catchment_config: CatchmentConfig,
    route_caches: BTreeMap<String, CatchmentCache>,
    depot_caches: BTreeMap<String, CatchmentCache>,
}

impl Reservoir {
    /// Creates an empty reservoir using `config` for every spawn.
    #[must_use]
    pub fn new(config: SpawnConfig) -> Self {
        Self {
            depots: BTreeMap::new(),
            routes: BTreeMap::new(),
            config,
            factors: FactorModel::new(),
            catchment_config: CatchmentConfig::default(),
            route_caches: BTreeMap::new(),
            depot_caches: BTreeMap::new(),
        }
    }

    /// Uses `factors` for [`evaluate_flow`](Self::evaluate_flow).
    #[must_use]
    pub fn with_factor_model(mut self, factors: FactorModel) -> Self {
        self.factors = factors;
        self
    }

    /// Buffer radii and timeouts used by
    /// [`attach_catchments`](Self::attach_catchments).
    #[must_use]
    pub fn with_catchment_config(mut self, catchment_config: CatchmentConfig) -> Self {
        self.catchment_config = catchment_config;
        self
    }

    /// Registers or replaces a depot.
    pub fn add_depot(&mut self, depot: Depot) {
        log::debug!("Registering depot {}", depot.id);
        self.depots.insert(depot.id.clone(), depot);
    }

    /// Registers or replaces a route.
    ///
    /// # Errors
    ///
    /// Returns [`ReservoirError::UnknownDepot`] if the route's depot has not
    /// been added.
    pub fn add_route(&mut self, route: Route) -> Result<(), ReservoirError> {
        if !self.depots.contains_key(&route.depot_id) {
            return Err(ReservoirError::UnknownDepot { id: route.depot_id });
        }
        log::debug!("Registering route {} at depot {}", route.id, route.depot_id);
        self.routes.insert(route.id.clone(), route);
        Ok(())
    }

    /// The depot registered under `id`.
    #[must_use]
    pub fn depot(&self, id: &str) -> Option<&Depot> {
        self.depots.get(id)
    }

    /// The route registered under `id`.
    #[must_use]
    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.get(id)
    }

    /// Every depot, in id order.
    pub fn depots(&self) -> impl Iterator<Item = &Depot> {
        self.depots.values()
    }

    /// Every route, in id order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Routes departing from `depot_id`, in id order.
    pub fn routes_for_depot<'a>(&'a self, depot_id: &'a str) -> impl Iterator<Item = &'a Route> {
        self.routes.values().filter(move |r| r.depot_id == depot_id)
    }

    /// Sum of `buildings_along_route` over the routes at `depot_id`.
    #[must_use]
    pub fn sibling_total(&self, depot_id: &str) -> u32 {
        self.routes_for_depot(depot_id)
            .map(|r| r.buildings_along_route)
            .fold(0_u32, u32::saturating_add)
    }

    /// Config used for every spawn.
    #[must_use]
    pub const fn config(&self) -> &SpawnConfig {
        &self.config
    }

    /// Swaps the spawn config between runs.
    pub fn set_config(&mut self, config: SpawnConfig) {
        self.config = config;
    }

    /// Factor model behind [`evaluate_flow`](Self::evaluate_flow).
    #[must_use]
    pub const fn factors(&self) -> &FactorModel {
        &self.factors
    }

    /// Mutable factor model, for loading models or updating conditions.
    pub const fn factors_mut(&mut self) -> &mut FactorModel {
        &mut self.factors
    }

    fn resolve(&self, depot_id: &str, route_id: &str) -> Result<(&Depot, &Route), ReservoirError> {
        let depot = self
            .depots
            .get(depot_id)
            .ok_or_else(|| ReservoirError::UnknownDepot {
                id: depot_id.to_owned(),
            })?;
        let route = self
            .routes
            .get(route_id)
            .ok_or_else(|| ReservoirError::UnknownRoute {
                id: route_id.to_owned(),
            })?;
        Ok((depot, route))
    }

    /// Spawn decision for one route, with siblings taken from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ReservoirError::UnknownDepot`] or
    /// [`ReservoirError::UnknownRoute`] for unregistered ids.
    pub fn evaluate_spawn(
        &self,
        depot_id: &str,
        route_id: &str,
        time: NaiveDateTime,
        window_minutes: f64,
        seed: Option<u64>,
    ) -> Result<SpawnResult, ReservoirError> {
        let (depot, route) = self.resolve(depot_id, route_id)?;
        Ok(evaluate_spawn(
            depot,
            route,
            self.sibling_total(depot_id),
            &self.config,
            time,
            window_minutes,
            seed,
        ))
    }

    /// Passenger flow at `location_id` from the named factor model.
    ///
    /// Returns `None` for an unknown model or location.
    #[must_use]
    pub fn evaluate_flow(
        &self,
        model_name: &str,
        location_id: &str,
        time: NaiveDateTime,
        duration_minutes: u32,
    ) -> Option<FlowResult> {
        self.factors
            .calculate_passenger_flow(model_name, location_id, time, duration_minutes)
    }

    fn depot_of<'a>(&'a self, route: &Route) -> Option<&'a Depot> {
        let depot = self.depots.get(&route.depot_id);
        if depot.is_none() {
            log::warn!(
                "Route {} references missing depot {}, skipping",
                route.id,
                route.depot_id
            );
        }
        depot
    }

    /// Samples a spawn count for every route.
    ///
    /// With a tick `seed`, each route draws from its own seed derived from
    /// the route id, so results do not depend on iteration order.
    #[must_use]
    pub fn tick(
        &self,
        time: NaiveDateTime,
        window_minutes: f64,
        seed: Option<u64>,
    ) -> Vec<RouteSpawn> {
        let totals = self.depot_totals();
        self.routes
            .values()
            .filter_map(|route| {
                let depot = self.depot_of(route)?;
                let result = evaluate_spawn(
                    depot,
                    route,
                    totals.get(depot.id.as_str()).copied().unwrap_or(0),
                    &self.config,
                    time,
                    window_minutes,
                    seed.map(|s| derive_route_seed(s, &route.id)),
                );
                Some(RouteSpawn {
                    depot_id: depot.id.clone(),
                    route_id: route.id.clone(),
                    result,
                })
            })
            .collect()
    }

    /// Expected demand for every route, without sampling.
    #[must_use]
    pub fn expected_tick(&self, time: NaiveDateTime, window_minutes: f64) -> Vec<RouteExpectation> {
        let totals = self.depot_totals();
        self.routes
            .values()
            .filter_map(|route| {
                let depot = self.depot_of(route)?;
                let expectation = validation_hybrid_spawn(
                    CatchmentCounts::new(
                        depot.buildings_near_depot,
                        route.buildings_along_route,
                        totals.get(depot.id.as_str()).copied().unwrap_or(0),
                    ),
                    &self.config,
                    time,
                    window_minutes,
                );
                Some(RouteExpectation {
                    depot_id: depot.id.clone(),
                    route_id: route.id.clone(),
                    expectation,
                })
            })
            .collect()
    }

    fn depot_totals(&self) -> BTreeMap<&str, u32> {
        let mut totals = BTreeMap::new();
        for route in self.routes.values() {
            let total: &mut u32 = totals.entry(route.depot_id.as_str()).or_default();
            *total = total.saturating_add(route.buildings_along_route);
        }
        totals
    }

    /// Starts a catchment load for every route (buffered by `buffer_km`)
    /// and every depot (buffered by `depot_radius_km`).
    ///
    /// Routes without geometry keep their configured building counts.
    /// Existing caches are re-initialised in place.
    ///
    /// # Errors
    ///
    /// Returns [`ReservoirError::Catchment`] if a worker cannot be started.
    pub fn attach_catchments(
        &mut self,
        provider: &Arc<dyn GeodataProvider>,
        query: &GeodataQuery,
    ) -> Result<(), ReservoirError> {
        let shutdown_timeout = self.catchment_config.shutdown_timeout();
        let new_cache = |buffer_km: f64| {
            CatchmentCache::new(Arc::clone(provider), query.clone(), buffer_km)
                .with_shutdown_timeout(shutdown_timeout)
        };

        for route in self.routes.values() {
            if route.geometry.is_empty() {
                log::debug!("Route {} has no geometry, skipping catchment", route.id);
                continue;
            }
            let cache = self
                .route_caches
                .entry(route.id.clone())
                .or_insert_with(|| new_cache(self.catchment_config.buffer_km));
            cache.initialize_for_route(&route.geometry, &[])?;
        }

        for depot in self.depots.values() {
            let cache = self
                .depot_caches
                .entry(depot.id.clone())
                .or_insert_with(|| new_cache(self.catchment_config.depot_radius_km));
            cache.initialize_for_route(&[], &[depot.location])?;
        }

        log::info!(
            "Attached {} route and {} depot catchment(s)",
            self.route_caches.len(),
            self.depot_caches.len()
        );
        Ok(())
    }

    /// The catchment cache of a route, if attached.
    #[must_use]
    pub fn route_catchment(&self, route_id: &str) -> Option<&CatchmentCache> {
        self.route_caches.get(route_id)
    }

    /// The catchment cache of a depot, if attached.
    #[must_use]
    pub fn depot_catchment(&self, depot_id: &str) -> Option<&CatchmentCache> {
        self.depot_caches.get(depot_id)
    }

    /// Waits for every attached cache's current load. Returns `true` only
    /// if all of them published within `timeout`.
    pub async fn wait_for_catchments(&self, timeout: Duration) -> bool {
        let mut all_loaded = true;
        for (id, cache) in self.route_caches.iter().chain(&self.depot_caches) {
            if !cache.wait_for_initial_load(timeout).await {
                log::warn!("Catchment {id} not loaded within {timeout:?}");
                all_loaded = false;
            }
        }
        all_loaded
    }

    /// Copies snapshot counts into `buildings_along_route` and
    /// `buildings_near_depot`. Caches that have never loaded are skipped,
    /// so configured counts survive until real data arrives.
    ///
    /// Returns how many routes and depots were updated.
    pub fn sync_building_counts(&mut self) -> usize {
        let mut updated = 0;
        for (id, cache) in &self.route_caches {
            if let (Some(route), Some(count)) = (self.routes.get_mut(id), loaded_count(cache)) {
                route.buildings_along_route = count;
                updated += 1;
            }
        }
        for (id, cache) in &self.depot_caches {
            if let (Some(depot), Some(count)) = (self.depots.get_mut(id), loaded_count(cache)) {
                depot.buildings_near_depot = count;
                updated += 1;
            }
        }
        log::debug!("Synced building counts for {updated} route(s)/depot(s)");
        updated
    }

    /// Shuts down every attached cache. Returns `true` if every worker
    /// exited within its timeout.
    pub fn shutdown(&self) -> bool {
        self.route_caches
            .values()
            .chain(self.depot_caches.values())
            .fold(true, |all, cache| cache.shutdown() && all)
    }

    /// [`shutdown`](Self::shutdown) for callers on a tokio runtime.
    pub async fn shutdown_async(&self) -> bool {
        let mut all = true;
        for cache in self.route_caches.values().chain(self.depot_caches.values()) {
            all &= cache.shutdown_async().await;
        }
        all
    }
}

fn loaded_count(cache: &CatchmentCache) -> Option<u32> {
    if !cache.get_stats().loading_complete {
        return None;
    }
    Some(u32::try_from(cache.count_buildings()).unwrap_or(u32::MAX))
}
