#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Background-loaded spatial catchment cache.
//!
//! A [`CatchmentCache`] owns one buffer around a route (and optionally its
//! depots) and one worker thread that fetches every zone and place page
//! from a [`GeodataProvider`], keeps the features that touch the buffer,
//! and publishes them as an immutable [`CatchmentSnapshot`].
//!
//! The worker runs its own single-threaded tokio runtime, so slow
//! paginated fetches never occupy the caller's scheduler. All shared state
//! sits behind one mutex that is only held to swap or clone an `Arc`.
//!
//! Lifecycle: `Idle -> Loading -> Ready`. Re-initialising a ready cache
//! goes back to `Loading` while the previous snapshot stays readable. A
//! failed load keeps the previous snapshot.

pub mod buffer;

#[cfg(test)]
mod test_provider;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rider_demand_catchment_models::{CatchmentStats, LoadState, Zone, ZoneClass};
use rider_demand_geodata::normalize::normalize_features;
use rider_demand_geodata::{
    Collection, GeodataError, GeodataProvider, GeodataQuery, ProgressCallback, fetch_all_pages,
    null_progress,
};
use rider_demand_spawn_models::GeoPoint;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use buffer::CatchmentBuffer;

/// Errors that can occur in the catchment cache.
#[derive(Debug, thiserror::Error)]
pub enum CatchmentError {
    /// Fetching geodata failed.
    #[error("Geodata error: {0}")]
    Geodata(#[from] GeodataError),

    /// The requested buffer geometry is unusable.
    #[error("Geometry error: {message}")]
    Geometry {
        /// What was wrong.
        message: String,
    },

    /// The worker's runtime could not be built.
    #[error("Runtime error: {0}")]
    Runtime(std::io::Error),

    /// The worker thread could not be started.
    #[error("Failed to spawn catchment worker: {0}")]
    WorkerSpawn(std::io::Error),
}

const fn default_buffer_km() -> f64 {
    0.5
}

const fn default_depot_radius_km() -> f64 {
    0.8
}

const fn default_shutdown_timeout_secs() -> u64 {
    5
}

const fn default_initial_load_timeout_secs() -> u64 {
    30
}

/// Settings from the `[catchment]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CatchmentConfig {
    /// Buffer around each route.
    #[serde(default = "default_buffer_km")]
    pub buffer_km: f64,
    /// Terminal catchment radius around each depot.
    #[serde(default = "default_depot_radius_km")]
    pub depot_radius_km: f64,
    /// How long `shutdown` waits for the worker.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// How long callers should wait for the first load.
    #[serde(default = "default_initial_load_timeout_secs")]
    pub initial_load_timeout_secs: u64,
}

impl Default for CatchmentConfig {
    fn default() -> Self {
        Self {
            buffer_km: default_buffer_km(),
            depot_radius_km: default_depot_radius_km(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            initial_load_timeout_secs: default_initial_load_timeout_secs(),
        }
    }
}

impl CatchmentConfig {
    /// [`shutdown_timeout_secs`](Self::shutdown_timeout_secs) as a duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// [`initial_load_timeout_secs`](Self::initial_load_timeout_secs) as a
    /// duration.
    #[must_use]
    pub const fn initial_load_timeout(&self) -> Duration {
        Duration::from_secs(self.initial_load_timeout_secs)
    }
}

/// A consistent, immutable view of the cached zones.
#[derive(Debug, Clone, Default)]
pub struct CatchmentSnapshot {
    /// Population-class zones touching the buffer.
    pub population: Vec<Zone>,
    /// Amenity-class zones and places touching the buffer.
    pub amenity: Vec<Zone>,
    /// When this snapshot was published; `None` before the first load.
    pub last_loaded: Option<DateTime<Utc>>,
}

impl CatchmentSnapshot {
    /// Zones across both classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.population.len() + self.amenity.len()
    }

    /// Returns `true` if neither class has zones.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fetches both collections, classifies the features and keeps the ones
/// touching `buffer`.
///
/// # Errors
///
/// Returns [`CatchmentError::Geodata`] if any page fails or `stop` is set
/// between pages.
pub async fn load_catchment(
    provider: &dyn GeodataProvider,
    query: &GeodataQuery,
    buffer: &CatchmentBuffer,
    stop: &AtomicBool,
    progress: &dyn ProgressCallback,
) -> Result<CatchmentSnapshot, CatchmentError> {
    let raw_zones = fetch_all_pages(provider, Collection::Zones, query, stop, progress).await?;
    let raw_places = fetch_all_pages(provider, Collection::Places, query, stop, progress).await?;

    let zones = normalize_features(&raw_zones, Collection::Zones);
    let places = normalize_features(&raw_places, Collection::Places);

    let (population, mut amenity): (Vec<Zone>, Vec<Zone>) = zones
        .into_iter()
        .partition(|z| z.class() == ZoneClass::Population);
    amenity.extend(places);

    let population: Vec<Zone> = population
        .into_iter()
        .filter(|z| buffer.intersects(&z.geometry))
        .collect();
    let amenity: Vec<Zone> = amenity
        .into_iter()
        .filter(|z| buffer.intersects(&z.geometry))
        .collect();

    Ok(CatchmentSnapshot {
        population,
        amenity,
        last_loaded: Some(Utc::now()),
    })
}

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Outcome of one load generation, broadcast to waiters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Completion {
    generation: u64,
    success: bool,
}

struct Inner {
    snapshot: Arc<CatchmentSnapshot>,
    buffer: Option<Arc<CatchmentBuffer>>,
    state: LoadState,
    generation: u64,
    loaded_once: bool,
}

struct Worker {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

struct Shared {
    inner: Mutex<Inner>,
    completion: watch::Sender<Completion>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes the outcome of `generation`, unless it has been
    /// superseded or stopped.
    fn finish(
        &self,
        generation: u64,
        stop: &AtomicBool,
        result: Result<CatchmentSnapshot, CatchmentError>,
    ) {
        let mut inner = self.lock();
        if inner.generation != generation || stop.load(Ordering::Relaxed) {
            log::debug!("Discarding result of superseded catchment load #{generation}");
            return;
        }

        let success = match result {
            Ok(snapshot) => {
                log::info!(
                    "Catchment load #{generation} complete: {} population, {} amenity zone(s)",
                    snapshot.population.len(),
                    snapshot.amenity.len()
                );
                inner.snapshot = Arc::new(snapshot);
                inner.loaded_once = true;
                inner.state = LoadState::Ready;
                true
            }
            Err(e) => {
                log::error!(
                    "Catchment load #{generation} aborted, keeping previous snapshot: {e}"
                );
                inner.state = if inner.loaded_once {
                    LoadState::Ready
                } else {
                    LoadState::Idle
                };
                false
            }
        };
        drop(inner);

        self.completion.send_replace(Completion {
            generation,
            success,
        });
    }
}

/// Spatial catchment cache for one route/depot grouping.
pub struct CatchmentCache {
    provider: Arc<dyn GeodataProvider>,
    query: GeodataQuery,
    buffer_km: f64,
    shutdown_timeout: Duration,
    progress: Arc<dyn ProgressCallback>,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl CatchmentCache {
    /// Creates an idle cache that buffers by `buffer_km`.
    #[must_use]
    pub fn new(provider: Arc<dyn GeodataProvider>, query: GeodataQuery, buffer_km: f64) -> Self {
        let (completion, _) = watch::channel(Completion::default());
        Self {
            provider,
            query,
            buffer_km,
            shutdown_timeout: Duration::from_secs(default_shutdown_timeout_secs()),
            progress: null_progress(),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    snapshot: Arc::new(CatchmentSnapshot::default()),
                    buffer: None,
                    state: LoadState::Idle,
                    generation: 0,
                    loaded_once: false,
                }),
                completion,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Sets how long [`shutdown`](Self::shutdown) waits for the worker.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Reports fetch progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Buffer radius in kilometres.
    #[must_use]
    pub const fn buffer_km(&self) -> f64 {
        self.buffer_km
    }

    /// Builds the buffer around `route` and `depots` and starts a
    /// background load. Returns without waiting for it.
    ///
    /// A load already in flight is told to stop and its result is
    /// discarded. The current snapshot stays readable until the new load
    /// publishes.
    ///
    /// # Errors
    ///
    /// * [`CatchmentError::Geometry`] if there are no points to buffer
    /// * [`CatchmentError::WorkerSpawn`] if the worker thread cannot start
    pub fn initialize_for_route(
        &self,
        route: &[GeoPoint],
        depots: &[GeoPoint],
    ) -> Result<(), CatchmentError> {
        let buffer = CatchmentBuffer::new(route, depots, self.buffer_km);
        if buffer.is_empty() {
            return Err(CatchmentError::Geometry {
                message: format!(
                    "cannot buffer {} route and {} depot point(s) by {} km",
                    route.len(),
                    depots.len(),
                    self.buffer_km
                ),
            });
        }
        let buffer = Arc::new(buffer);

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        let generation = {
            let mut inner = self.shared.lock();
            if let Some(previous) = worker.take() {
                log::debug!("Superseding catchment load #{}", inner.generation);
                previous.stop.store(true, Ordering::Relaxed);
            }
            inner.generation += 1;
            inner.state = LoadState::Loading;
            inner.buffer = Some(Arc::clone(&buffer));
            inner.generation
        };

        log::info!(
            "Starting catchment load #{generation}: {} route point(s), {} depot(s), {} km buffer",
            route.len(),
            depots.len(),
            self.buffer_km
        );

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            let shared = Arc::clone(&self.shared);
            let provider = Arc::clone(&self.provider);
            let progress = Arc::clone(&self.progress);
            let query = self.query.clone();
            std::thread::Builder::new()
                .name(format!("catchment-{generation}"))
                .spawn(move || {
                    let result = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(CatchmentError::Runtime)
                        .and_then(|runtime| {
                            runtime.block_on(load_catchment(
                                provider.as_ref(),
                                &query,
                                &buffer,
                                &stop,
                                progress.as_ref(),
                            ))
                        });
                    if !stop.load(Ordering::Relaxed) {
                        match &result {
                            Ok(snapshot) => {
                                progress.finish(format!("{} zone(s) in catchment", snapshot.len()));
                            }
                            Err(e) => progress.finish(format!("Catchment load failed: {e}")),
                        }
                    }
                    shared.finish(generation, &stop, result);
                })
        };

        match handle {
            Ok(handle) => {
                *worker = Some(Worker { handle, stop });
                Ok(())
            }
            Err(e) => {
                let mut inner = self.shared.lock();
                inner.state = if inner.loaded_once {
                    LoadState::Ready
                } else {
                    LoadState::Idle
                };
                drop(inner);
                self.shared.completion.send_replace(Completion {
                    generation,
                    success: false,
                });
                Err(CatchmentError::WorkerSpawn(e))
            }
        }
    }

    /// Waits, without blocking the calling runtime, until the most recently
    /// started load finishes.
    ///
    /// Returns `true` if it published a snapshot, `false` if it failed,
    /// was stopped, or did not finish within `timeout`. With no load ever
    /// started, returns whether a snapshot exists.
    pub async fn wait_for_initial_load(&self, timeout: Duration) -> bool {
        let (target, loaded_once) = {
            let inner = self.shared.lock();
            (inner.generation, inner.loaded_once)
        };
        if target == 0 {
            return loaded_once;
        }

        let mut rx = self.shared.completion.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|c| c.generation >= target)).await {
            Ok(Ok(completion)) => completion.success,
            Ok(Err(_)) => false,
            Err(_) => {
                log::debug!("Timed out after {timeout:?} waiting for catchment load #{target}");
                false
            }
        }
    }

    /// The current snapshot. Never blocks on a running load.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatchmentSnapshot> {
        Arc::clone(&self.shared.lock().snapshot)
    }

    /// Owned copies of the current population and amenity zones.
    #[must_use]
    pub fn get_cached_zones(&self) -> (Vec<Zone>, Vec<Zone>) {
        let snapshot = self.snapshot();
        (snapshot.population.clone(), snapshot.amenity.clone())
    }

    /// Total zones in the current snapshot.
    #[must_use]
    pub fn count_buildings(&self) -> usize {
        self.snapshot().len()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.shared.lock().state
    }

    /// The buffer of the most recent initialisation.
    #[must_use]
    pub fn buffer(&self) -> Option<Arc<CatchmentBuffer>> {
        self.shared.lock().buffer.clone()
    }

    /// Counts and timestamps for observability.
    #[must_use]
    pub fn get_stats(&self) -> CatchmentStats {
        let inner = self.shared.lock();
        CatchmentStats {
            population_zones: inner.snapshot.population.len(),
            amenity_zones: inner.snapshot.amenity.len(),
            buffer_km: self.buffer_km,
            route_points: inner.buffer.as_ref().map_or(0, |b| b.route_points()),
            depot_points: inner.buffer.as_ref().map_or(0, |b| b.depot_points()),
            last_loaded: inner.snapshot.last_loaded,
            loading_complete: inner.loaded_once,
            state: inner.state,
        }
    }

    /// Stops the worker and waits up to the shutdown timeout for it to
    /// exit. The last snapshot stays readable.
    ///
    /// This blocks the calling thread while it polls the worker. From
    /// inside a tokio runtime use [`shutdown_async`](Self::shutdown_async).
    ///
    /// Returns `false` if the worker was still running at the deadline; it
    /// is left to finish on its own and its result is discarded.
    pub fn shutdown(&self) -> bool {
        let Some(worker) = self.stop_worker() else {
            return true;
        };
        let deadline = Instant::now() + self.shutdown_timeout;
        while !worker.handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(SHUTDOWN_POLL);
        }
        self.release(worker)
    }

    /// [`shutdown`](Self::shutdown) that sleeps on the tokio timer instead
    /// of blocking the thread.
    pub async fn shutdown_async(&self) -> bool {
        let Some(worker) = self.stop_worker() else {
            return true;
        };
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        while !worker.handle.is_finished() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
        self.release(worker)
    }

    fn stop_worker(&self) -> Option<Worker> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        worker.stop.store(true, Ordering::Relaxed);
        Some(worker)
    }

    /// Joins `worker` if it has exited, otherwise detaches it, then settles
    /// a state left at `Loading`.
    fn release(&self, worker: Worker) -> bool {
        let joined = worker.handle.is_finished();
        if joined {
            if worker.handle.join().is_err() {
                log::error!("Catchment worker panicked");
            }
        } else {
            log::warn!(
                "Catchment worker did not stop within {:?}, detaching",
                self.shutdown_timeout
            );
        }

        let mut inner = self.shared.lock();
        let generation = inner.generation;
        let was_loading = inner.state == LoadState::Loading;
        if was_loading {
            inner.state = if inner.loaded_once {
                LoadState::Ready
            } else {
                LoadState::Idle
            };
        }
        drop(inner);

        if was_loading {
            self.shared.completion.send_replace(Completion {
                generation,
                success: false,
            });
        }
        joined
    }
}

impl Drop for CatchmentCache {
    fn drop(&mut self) {
        if let Some(worker) = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            worker.stop.store(true, Ordering::Relaxed);
        }
    }
}
