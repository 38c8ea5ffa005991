#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the rider demand engine.
//!
//! Uses `indicatif-log-bridge` (via [`rider_demand_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod config;
mod route;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use rider_demand_catchment::CatchmentCache;
use rider_demand_cli_utils::PageBar;
use rider_demand_factors_models::{ConditionKind, Conditions};
use rider_demand_geodata::{GeodataProvider, HttpGeodataProvider};
use rider_demand_reservoir::evaluate_spawn;
use rider_demand_spawn_models::{Depot, GeoPoint, Route};

use crate::config::{EngineConfig, GEODATA_URL_VAR};

#[derive(Parser)]
#[command(name = "rider_demand", about = "Passenger spawn and demand engine")]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the spawn pipeline for one route and print the result as JSON
    Spawn {
        /// Buildings within the depot's terminal catchment
        #[arg(long)]
        depot_buildings: u32,
        /// Buildings along this route
        #[arg(long)]
        route_buildings: u32,
        /// Buildings along every route sharing the depot (defaults to this
        /// route's count, i.e. a solo route)
        #[arg(long)]
        total_buildings: Option<u32>,
        /// Evaluation time, e.g. `2025-06-02T08:00` (defaults to now)
        #[arg(long, value_parser = parse_time)]
        time: Option<NaiveDateTime>,
        /// Window length in minutes (defaults to `reservoir.window_minutes`)
        #[arg(long)]
        window: Option<u32>,
        /// Seed for a reproducible draw (defaults to `reservoir.seed`)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Compute passenger flow at one location of a factor model
    Flow {
        /// Model name from the config, or a path to a model file
        #[arg(long)]
        model: String,
        /// Location id within the model
        #[arg(long)]
        location: String,
        /// Evaluation time (defaults to now)
        #[arg(long, value_parser = parse_time)]
        time: Option<NaiveDateTime>,
        /// Duration in minutes
        #[arg(long, default_value = "60")]
        duration: u32,
        #[command(flatten)]
        conditions: ConditionArgs,
    },
    /// Print one JSON line per location and interval between two times
    Schedule {
        /// Model name from the config, or a path to a model file
        #[arg(long)]
        model: String,
        /// First interval boundary
        #[arg(long, value_parser = parse_time)]
        start: NaiveDateTime,
        /// End of the range (exclusive)
        #[arg(long, value_parser = parse_time)]
        end: NaiveDateTime,
        /// Minutes between boundaries
        #[arg(long, default_value = "15")]
        interval: u32,
        /// Seed for reproducible variance (defaults to `reservoir.seed`)
        #[arg(long)]
        seed: Option<u64>,
        #[command(flatten)]
        conditions: ConditionArgs,
    },
    /// Load the catchment around a route from the configured geodata API
    Catchment {
        /// GeoJSON file holding the route line
        #[arg(long)]
        route: PathBuf,
        /// Depot location as `LAT,LON` (repeatable)
        #[arg(long, value_parser = route::parse_point)]
        depot: Vec<GeoPoint>,
        /// Buffer radius in km (defaults to `catchment.buffer_km`)
        #[arg(long)]
        buffer_km: Option<f64>,
    },
}

/// Real-time conditions applied before evaluating.
#[derive(clap::Args)]
struct ConditionArgs {
    /// Current weather, e.g. "rain"
    #[arg(long)]
    weather: Option<String>,
    /// Current service status, e.g. "delayed"
    #[arg(long)]
    service_status: Option<String>,
    /// Current economic condition
    #[arg(long)]
    economic: Option<String>,
    /// Current infrastructure status
    #[arg(long)]
    infrastructure: Option<String>,
}

impl ConditionArgs {
    fn into_conditions(self) -> Conditions {
        [
            (ConditionKind::Weather, self.weather),
            (ConditionKind::ServiceStatus, self.service_status),
            (ConditionKind::EconomicCondition, self.economic),
            (ConditionKind::InfrastructureStatus, self.infrastructure),
        ]
        .into_iter()
        .filter_map(|(kind, value)| value.map(|v| (kind, v)))
        .fold(Conditions::default(), |conditions, (kind, value)| {
            conditions.with(kind, value)
        })
    }
}

const TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

fn parse_time(s: &str) -> Result<NaiveDateTime, String> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s.trim(), format).ok())
        .ok_or_else(|| format!("expected YYYY-MM-DDTHH:MM[:SS], got '{s}'"))
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Loads the configured models plus `model` if it is not one of them.
/// Returns the factor model and the name `model` is registered under.
fn factor_model(
    config: &EngineConfig,
    model: &str,
    conditions: Conditions,
) -> Result<(rider_demand_factors::FactorModel, String), Box<dyn std::error::Error>> {
    let mut factors = config.factor_model()?;
    let name = if factors.model(model).is_some() {
        model.to_string()
    } else {
        factors.load_model(model, true)?
    };
    factors.update_conditions(conditions);
    Ok((factors, name))
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = rider_demand_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Spawn {
            depot_buildings,
            route_buildings,
            total_buildings,
            time,
            window,
            seed,
        } => {
            let depot = Depot::new("cli", GeoPoint::new(0.0, 0.0)).with_buildings(depot_buildings);
            let route = Route::new("cli", "cli").with_buildings(route_buildings);
            let result = evaluate_spawn(
                &depot,
                &route,
                total_buildings.unwrap_or(route_buildings),
                &config.spawn,
                time.unwrap_or_else(now),
                f64::from(window.unwrap_or(config.reservoir.window_minutes)),
                seed.or(config.reservoir.seed),
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Flow {
            model,
            location,
            time,
            duration,
            conditions,
        } => {
            let (factors, name) = factor_model(&config, &model, conditions.into_conditions())?;
            let flow = factors
                .calculate_passenger_flow(&name, &location, time.unwrap_or_else(now), duration)
                .ok_or_else(|| format!("Unknown location '{location}' in model '{name}'"))?;
            println!("{}", serde_json::to_string_pretty(&flow)?);
        }
        Commands::Schedule {
            model,
            start,
            end,
            interval,
            seed,
            conditions,
        } => {
            let (factors, name) = factor_model(&config, &model, conditions.into_conditions())?;
            let schedule = factors
                .generate_passenger_schedule(
                    &name,
                    start,
                    end,
                    interval,
                    seed.or(config.reservoir.seed),
                )
                .ok_or_else(|| format!("Unknown model '{name}'"))?;

            log::info!("Schedule seed: {}", schedule.seed());
            let total = schedule.total_len();
            let progress = rider_demand_cli_utils::count_bar(
                &multi,
                "Schedule",
                u64::try_from(total).unwrap_or(u64::MAX),
            );
            for flow in schedule {
                multi.suspend(|| serde_json::to_string(&flow).map(|line| println!("{line}")))?;
                progress.inc(1);
            }
            progress.finish_with_message(format!("{total} flow result(s)"));
        }
        Commands::Catchment {
            route: route_path,
            depot,
            buffer_km,
        } => {
            let geodata = config.geodata.clone().ok_or_else(|| {
                format!("No [geodata] section configured and {GEODATA_URL_VAR} not set")
            })?;
            let points = route::route_from_geojson(&std::fs::read_to_string(&route_path)?)?;
            let query = geodata.query();
            let provider: Arc<dyn GeodataProvider> = Arc::new(HttpGeodataProvider::new(geodata)?);

            let cache = CatchmentCache::new(
                provider,
                query,
                buffer_km.unwrap_or(config.catchment.buffer_km),
            )
            .with_shutdown_timeout(config.catchment.shutdown_timeout())
            .with_progress(PageBar::shared(&multi, "Loading catchment"));

            cache.initialize_for_route(&points, &depot)?;
            let timeout = config.catchment.initial_load_timeout();
            if !cache.wait_for_initial_load(timeout).await {
                log::warn!("Catchment not loaded within {timeout:?}, reporting what is cached");
            }
            println!("{}", serde_json::to_string_pretty(&cache.get_stats())?);
            cache.shutdown_async().await;
        }
    }

    Ok(())
}
