#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Catchment data types.
//!
//! A [`Zone`] is one geodata feature (a land-use zone or a point of
//! interest) with its geometry in WGS84 longitude/latitude. Zones are
//! classified into [`ZoneClass::Population`] (where trips start) or
//! [`ZoneClass::Amenity`] (where trips go) by their [`ZoneType`].

use chrono::{DateTime, Utc};
use geo::{BoundingRect, Geometry, Rect};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Land-use category of a zone.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ZoneType {
    /// Housing.
    Residential,
    /// Offices and shops.
    Commercial,
    /// Factories and warehouses.
    Industrial,
    /// Mixed residential and commercial.
    #[strum(to_string = "mixed_use", serialize = "mixed-use")]
    MixedUse,
    /// Government and civic buildings.
    Institutional,
    /// Stores.
    Retail,
    /// Schools and universities.
    Education,
    /// Clinics and hospitals.
    Healthcare,
    /// Parks, beaches, sport grounds.
    Recreation,
    /// Terminals and transit hubs.
    Transport,
    /// A raw point of interest from the places collection.
    Place,
}

impl ZoneType {
    /// Returns the demand class this zone type belongs to.
    #[must_use]
    pub const fn class(self) -> ZoneClass {
        match self {
            Self::Residential
            | Self::Commercial
            | Self::Industrial
            | Self::MixedUse
            | Self::Institutional => ZoneClass::Population,
            Self::Retail
            | Self::Education
            | Self::Healthcare
            | Self::Recreation
            | Self::Transport
            | Self::Place => ZoneClass::Amenity,
        }
    }
}

/// Which side of a trip a zone generates.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ZoneClass {
    /// Trip origins.
    Population,
    /// Trip destinations.
    Amenity,
}

/// A geodata feature with a classified type and a geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    /// Source identifier.
    pub id: String,
    /// Land-use category.
    pub zone_type: ZoneType,
    /// Geometry in longitude/latitude degrees.
    pub geometry: Geometry<f64>,
    /// Owning country or operator id, if the feature carried one.
    pub owner_id: Option<String>,
    /// Display name, if any.
    pub name: Option<String>,
}

impl Zone {
    /// Creates a zone with no owner or name.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        zone_type: ZoneType,
        geometry: impl Into<Geometry<f64>>,
    ) -> Self {
        Self {
            id: id.into(),
            zone_type,
            geometry: geometry.into(),
            owner_id: None,
            name: None,
        }
    }

    /// Sets the owner id.
    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Demand class of this zone.
    #[must_use]
    pub const fn class(&self) -> ZoneClass {
        self.zone_type.class()
    }

    /// Bounding rectangle of the geometry, or `None` for empty geometry.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

/// Lifecycle of a catchment cache.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoadState {
    /// No load has completed and none is running.
    #[default]
    Idle,
    /// A background load is running.
    Loading,
    /// A snapshot is available and no load is running.
    Ready,
}

/// Observability snapshot of a catchment cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchmentStats {
    /// Zones in the population class.
    pub population_zones: usize,
    /// Zones in the amenity class.
    pub amenity_zones: usize,
    /// Radius used to buffer the route.
    pub buffer_km: f64,
    /// Vertices in the route polyline.
    pub route_points: usize,
    /// Depot points included in the buffer.
    pub depot_points: usize,
    /// When the current snapshot was published.
    pub last_loaded: Option<DateTime<Utc>>,
    /// Whether at least one load has completed.
    pub loading_complete: bool,
    /// Current lifecycle state.
    pub state: LoadState,
}

impl CatchmentStats {
    /// Total zones across both classes.
    #[must_use]
    pub const fn total_zones(&self) -> usize {
        self.population_zones + self.amenity_zones
    }
}
