use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rider_demand_factors::ModelFormat;
use rider_demand_geodata::{Collection, GeodataError, GeodataProvider, GeodataQuery, Page};
use rider_demand_spawn::derive_route_seed;
use rider_demand_spawn_models::{Depot, GeoPoint, Route, SpawnConfig};
use serde_json::{Value, json};

use crate::{Reservoir, ReservoirConfig, ReservoirError, snapshot_catchment};

const SHARED_ROUTES: [(&str, u32); 5] = [
    ("r1", 69),
    ("r2", 80),
    ("r3", 90),
    ("r4", 70),
    ("r5", 80),
];

/// Monday, 2 June 2025.
fn monday_at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn calibrated() -> SpawnConfig {
    SpawnConfig::calibrated()
        .with_hourly_rate(8, 2.0)
        .with_hourly_rate(2, 0.05)
        .with_day_multiplier(0, 1.3)
}

fn depot() -> Depot {
    Depot::new("speightstown", GeoPoint::new(13.25, -59.64)).with_buildings(1556)
}

fn solo() -> Reservoir {
    let mut reservoir = Reservoir::new(calibrated());
    reservoir.add_depot(depot());
    reservoir
        .add_route(Route::new("1A", "speightstown").with_buildings(69))
        .unwrap();
    reservoir
}

fn shared() -> Reservoir {
    let mut reservoir = Reservoir::new(calibrated());
    reservoir.add_depot(depot());
    for (id, buildings) in SHARED_ROUTES {
        reservoir
            .add_route(Route::new(id, "speightstown").with_buildings(buildings))
            .unwrap();
    }
    reservoir
}

fn close(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= tolerance
}

#[test]
fn solo_route_gets_whole_terminal_population() {
    let result = solo()
        .evaluate_spawn("speightstown", "1A", monday_at(8), 15.0, Some(7))
        .unwrap();
    assert!(close(result.effective_rate, 0.13, 1e-9));
    assert!(close(result.terminal_population, 202.28, 1e-6));
    assert!(close(result.route_attractiveness, 1.0, 1e-12));
    assert!(close(result.passengers_per_hour, 202.28, 1e-6));
    assert!(close(result.lambda_param, 50.57, 1e-6));
    assert!(close(result.window_minutes, 15.0, 1e-12));
}

#[test]
fn shared_depot_splits_by_buildings() {
    let result = shared()
        .evaluate_spawn("speightstown", "r1", monday_at(8), 15.0, Some(7))
        .unwrap();
    assert!(close(result.route_attractiveness, 0.1774, 1e-4));
    assert!(close(result.passengers_per_hour, 35.88, 1e-2));
    assert!(close(result.lambda_param, 8.97, 1e-2));
}

#[test]
fn shared_depot_conserves_terminal_population() {
    let reservoir = shared();
    let plan = reservoir.expected_tick(monday_at(8), 60.0);
    assert_eq!(plan.len(), SHARED_ROUTES.len());

    let attractiveness: f64 = plan
        .iter()
        .map(|p| p.expectation.route_attractiveness)
        .sum();
    assert!(close(attractiveness, 1.0, 1e-4));

    let total: f64 = plan.iter().map(|p| p.expectation.passengers_per_hour).sum();
    assert!(close(total, plan[0].expectation.terminal_population, 1e-2));
    assert!(plan.iter().all(|p| p.depot_id == "speightstown"));
}

#[test]
fn night_hours_scale_down() {
    let result = solo()
        .evaluate_spawn("speightstown", "1A", monday_at(2), 15.0, None)
        .unwrap();
    assert!(close(result.effective_rate, 0.003_25, 1e-9));
    assert!(close(result.terminal_population, 5.057, 1e-6));
}

#[test]
fn seeded_tick_is_reproducible_per_route() {
    let reservoir = shared();
    let first = reservoir.tick(monday_at(8), 15.0, Some(2024));
    let second = reservoir.tick(monday_at(8), 15.0, Some(2024));
    assert_eq!(first, second);

    for spawn in &first {
        let alone = reservoir
            .evaluate_spawn(
                &spawn.depot_id,
                &spawn.route_id,
                monday_at(8),
                15.0,
                Some(derive_route_seed(2024, &spawn.route_id)),
            )
            .unwrap();
        assert_eq!(alone, spawn.result);
    }
}

#[test]
fn depot_without_route_buildings_spawns_nothing() {
    let mut reservoir = Reservoir::new(calibrated());
    reservoir.add_depot(depot());
    reservoir
        .add_route(Route::new("empty", "speightstown"))
        .unwrap();

    let spawns = reservoir.tick(monday_at(8), 15.0, Some(1));
    assert_eq!(spawns.len(), 1);
    assert!(close(spawns[0].result.route_attractiveness, 0.0, 1e-12));
    assert_eq!(spawns[0].result.spawn_count, 0);
}

#[test]
fn unknown_ids_are_reported() {
    let mut reservoir = solo();
    assert!(matches!(
        reservoir.add_route(Route::new("9Z", "oistins")),
        Err(ReservoirError::UnknownDepot { id }) if id == "oistins"
    ));
    assert!(matches!(
        reservoir.evaluate_spawn("speightstown", "9Z", monday_at(8), 15.0, None),
        Err(ReservoirError::UnknownRoute { .. })
    ));
    assert!(matches!(
        reservoir.evaluate_spawn("oistins", "1A", monday_at(8), 15.0, None),
        Err(ReservoirError::UnknownDepot { .. })
    ));
}

#[test]
fn sibling_total_and_config_swap() {
    let mut reservoir = shared();
    assert_eq!(reservoir.sibling_total("speightstown"), 389);
    assert_eq!(reservoir.sibling_total("oistins"), 0);
    assert_eq!(reservoir.routes_for_depot("speightstown").count(), 5);
    let depot_ids: Vec<&str> = reservoir.depots().map(|d| d.id.as_str()).collect();
    assert_eq!(depot_ids, vec!["speightstown"]);
    let route_ids: Vec<&str> = reservoir.routes().map(|r| r.id.as_str()).collect();
    assert_eq!(route_ids, vec!["r1", "r2", "r3", "r4", "r5"]);

    reservoir.set_config(SpawnConfig::default());
    assert!(reservoir.config().base_rate.is_none());
    let result = reservoir
        .evaluate_spawn("speightstown", "r1", monday_at(8), 60.0, None)
        .unwrap();
    assert!(close(result.base_rate, 0.3, 1e-12));
    assert!(close(result.hourly_mult, 1.0, 1e-12));
}

const FLOW_MODEL: &str = r#"
[locations.terminal.passenger_rates.boarding.peak]
rate_per_hour = 120.0

[locations.terminal.passenger_rates.boarding.off_peak]
rate_per_hour = 40.0

[locations.terminal.passenger_rates.alighting.peak]
rate_per_hour = 60.0

[locations.terminal.passenger_rates.alighting.off_peak]
rate_per_hour = 20.0

[demand_profiles.commute]
percentage = 100.0
peak_preference = "peak"
"#;

#[test]
fn flow_lookups_degrade_to_none() {
    let mut reservoir = solo();
    reservoir
        .factors_mut()
        .load_model_str("island", FLOW_MODEL, ModelFormat::Toml, true)
        .unwrap();
    assert_eq!(
        reservoir.factors().model_names().collect::<Vec<_>>(),
        vec!["island"]
    );

    let flow = reservoir
        .evaluate_flow("island", "terminal", monday_at(11), 30)
        .unwrap();
    assert!(!flow.is_peak);
    assert!(close(flow.expected_boarding, 20.0, 1e-9));
    assert!(close(flow.expected_alighting, 10.0, 1e-9));

    assert!(reservoir.evaluate_flow("island", "nowhere", monday_at(11), 30).is_none());
    assert!(reservoir.evaluate_flow("mainland", "terminal", monday_at(11), 30).is_none());
}

#[test]
fn reservoir_config_defaults() {
    let config: ReservoirConfig = toml::from_str("seed = 11").unwrap();
    assert_eq!(config.window_minutes, 15);
    assert_eq!(config.seed, Some(11));
    assert_eq!(ReservoirConfig::default().seed, None);
}

/// Serves every zone on a single page.
struct OnePage {
    zones: Vec<Value>,
}

#[async_trait]
impl GeodataProvider for OnePage {
    async fn fetch_page(
        &self,
        collection: Collection,
        _query: &GeodataQuery,
        _page: u32,
    ) -> Result<Page, GeodataError> {
        let features = match collection {
            Collection::Zones => self.zones.clone(),
            Collection::Places => Vec::new(),
        };
        Ok(Page {
            features,
            page_count: 1,
        })
    }
}

fn zone(id: u32, lat: f64, lon: f64) -> Value {
    json!({"id": id, "zone_type": "residential", "latitude": lat, "longitude": lon})
}

#[tokio::test]
async fn catchments_refresh_building_counts() {
    let depot_at = GeoPoint::new(13.25, -59.64);
    let provider: Arc<dyn GeodataProvider> = Arc::new(OnePage {
        zones: vec![
            // At the depot.
            zone(1, 13.25, -59.64),
            // Along the route, 0.45 km and 0.9 km north of the depot.
            zone(2, 13.254, -59.64),
            zone(3, 13.258, -59.64),
            // Far away.
            zone(4, 13.1, -59.6),
        ],
    });

    let mut reservoir = Reservoir::new(calibrated());
    reservoir.add_depot(Depot::new("speightstown", depot_at).with_buildings(1556));
    reservoir
        .add_route(
            Route::new("1A", "speightstown")
                .with_geometry(vec![depot_at, GeoPoint::new(13.27, -59.64)])
                .with_buildings(69),
        )
        .unwrap();
    reservoir
        .add_route(Route::new("unmapped", "speightstown").with_buildings(5))
        .unwrap();

    reservoir
        .attach_catchments(&provider, &GeodataQuery::default())
        .unwrap();
    assert!(reservoir.route_catchment("unmapped").is_none());
    assert!(reservoir.wait_for_catchments(Duration::from_secs(10)).await);
    assert_eq!(reservoir.sync_building_counts(), 2);

    assert_eq!(reservoir.route("1A").unwrap().buildings_along_route, 3);
    let unmapped = reservoir.route("unmapped").unwrap();
    assert_eq!(unmapped.buildings_along_route, 5);
    // Default terminal radius is 0.8 km: the depot zone and the one 0.45 km away.
    let depot = reservoir.depot("speightstown").unwrap();
    assert_eq!(depot.buildings_near_depot, 2);

    let cache = reservoir.route_catchment("1A").unwrap();
    let (population, amenity) = snapshot_catchment(cache);
    assert_eq!(population.len(), 3);
    assert!(amenity.is_empty());

    let depot_cache = reservoir.depot_catchment("speightstown").unwrap();
    assert_eq!(depot_cache.count_buildings(), 2);
    assert!(reservoir.depot_catchment("oistins").is_none());

    assert!(reservoir.shutdown_async().await);
    assert!(reservoir.shutdown());
}
