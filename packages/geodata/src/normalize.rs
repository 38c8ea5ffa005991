//! Turns raw provider features into typed [`Zone`]s.
//!
//! Features come in a few shapes. Attributes may sit at the top level or
//! inside an `attributes` envelope, and the geometry may be a GeoJSON
//! object, a GeoJSON string, or bare `latitude`/`longitude` fields.

use geo::{CoordsIter, Geometry, Point};
use geojson::GeoJson;
use rider_demand_catchment_models::{Zone, ZoneType};
use serde_json::Value;

use crate::Collection;

/// Keys checked, in order, for a GeoJSON geometry.
const GEOMETRY_KEYS: [&str; 3] = ["geometry", "geojson", "geometry_geojson"];

/// Why a single feature was rejected.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// No geometry or coordinate fields were present.
    #[error("feature {id}: no geometry")]
    MissingGeometry {
        /// Feature id.
        id: String,
    },

    /// Geometry was present but could not be used.
    #[error("feature {id}: invalid geometry: {message}")]
    InvalidGeometry {
        /// Feature id.
        id: String,
        /// What was wrong with it.
        message: String,
    },

    /// A zone without a `zone_type`.
    #[error("feature {id}: missing zone_type")]
    MissingZoneType {
        /// Feature id.
        id: String,
    },

    /// A zone whose `zone_type` is not a known category.
    #[error("feature {id}: unknown zone_type '{zone_type}'")]
    UnknownZoneType {
        /// Feature id.
        id: String,
        /// The unrecognised value.
        zone_type: String,
    },
}

/// Normalizes every feature, logging and dropping the ones that fail.
#[must_use]
pub fn normalize_features(features: &[Value], collection: Collection) -> Vec<Zone> {
    features
        .iter()
        .filter_map(|feature| match normalize_feature(feature, collection) {
            Ok(zone) => Some(zone),
            Err(e) => {
                log::warn!("Dropping {collection} {e}");
                None
            }
        })
        .collect()
}

/// Normalizes one feature. Places are always [`ZoneType::Place`].
///
/// # Errors
///
/// Returns [`FeatureError`] if the geometry is missing or malformed, or
/// a zone's type is missing or unknown.
pub fn normalize_feature(feature: &Value, collection: Collection) -> Result<Zone, FeatureError> {
    let attrs = feature
        .get("attributes")
        .filter(|a| a.is_object())
        .unwrap_or(feature);
    let id = feature_id(feature, attrs);

    let zone_type = match collection {
        Collection::Places => ZoneType::Place,
        Collection::Zones => {
            let raw = attrs
                .get("zone_type")
                .and_then(Value::as_str)
                .ok_or_else(|| FeatureError::MissingZoneType { id: id.clone() })?;
            raw.parse().map_err(|_| FeatureError::UnknownZoneType {
                id: id.clone(),
                zone_type: raw.to_string(),
            })?
        }
    };

    let geometry = extract_geometry(attrs).map_err(|message| match message {
        None => FeatureError::MissingGeometry { id: id.clone() },
        Some(message) => FeatureError::InvalidGeometry {
            id: id.clone(),
            message,
        },
    })?;
    check_coordinates(&geometry).map_err(|message| FeatureError::InvalidGeometry {
        id: id.clone(),
        message,
    })?;

    let mut zone = Zone::new(id, zone_type, geometry);
    zone.owner_id = owner_id(attrs);
    zone.name = attrs
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(zone)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn feature_id(feature: &Value, attrs: &Value) -> String {
    feature
        .get("id")
        .and_then(scalar_to_string)
        .or_else(|| attrs.get("documentId").and_then(scalar_to_string))
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// Owner id from `country` as a scalar, `{id}` or `{data: {id}}`, falling
/// back to `owner_id`.
fn owner_id(attrs: &Value) -> Option<String> {
    if let Some(country) = attrs.get("country") {
        let id = scalar_to_string(country)
            .or_else(|| country.get("id").and_then(scalar_to_string))
            .or_else(|| country.pointer("/data/id").and_then(scalar_to_string));
        if id.is_some() {
            return id;
        }
    }
    attrs.get("owner_id").and_then(scalar_to_string)
}

fn as_coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `Err(None)` means no geometry at all; `Err(Some(_))` means a geometry
/// was present but unusable.
fn extract_geometry(attrs: &Value) -> Result<Geometry<f64>, Option<String>> {
    for key in GEOMETRY_KEYS {
        match attrs.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => return parse_geojson_str(s).map_err(Some),
            Some(value) => return geojson_value_to_geometry(value.clone()).map_err(Some),
        }
    }

    let lat = attrs.get("latitude").or_else(|| attrs.get("lat"));
    let lon = attrs
        .get("longitude")
        .or_else(|| attrs.get("lon"))
        .or_else(|| attrs.get("lng"));
    match (lat, lon) {
        (None, None) => Err(None),
        (Some(lat), Some(lon)) => match (as_coordinate(lat), as_coordinate(lon)) {
            (Some(lat), Some(lon)) => Ok(Point::new(lon, lat).into()),
            _ => Err(Some(format!("non-numeric coordinates {lat}, {lon}"))),
        },
        _ => Err(Some("only one of latitude/longitude present".to_string())),
    }
}

fn geojson_value_to_geometry(value: Value) -> Result<Geometry<f64>, String> {
    let geometry = geojson::Geometry::from_json_value(value).map_err(|e| e.to_string())?;
    Geometry::<f64>::try_from(geometry).map_err(|e| e.to_string())
}

fn parse_geojson_str(s: &str) -> Result<Geometry<f64>, String> {
    let geojson: GeoJson = s.parse().map_err(|e: geojson::Error| e.to_string())?;
    let geometry = match geojson {
        GeoJson::Geometry(g) => g,
        GeoJson::Feature(f) => f
            .geometry
            .ok_or_else(|| "feature without geometry".to_string())?,
        GeoJson::FeatureCollection(_) => {
            return Err("feature collections are not supported".to_string());
        }
    };
    Geometry::<f64>::try_from(geometry).map_err(|e| e.to_string())
}

fn check_coordinates(geometry: &Geometry<f64>) -> Result<(), String> {
    let mut count = 0_usize;
    for coord in geometry.coords_iter() {
        count += 1;
        if !coord.x.is_finite()
            || !coord.y.is_finite()
            || !(-180.0..=180.0).contains(&coord.x)
            || !(-90.0..=90.0).contains(&coord.y)
        {
            return Err(format!("coordinate ({}, {}) out of range", coord.x, coord.y));
        }
    }
    if count == 0 {
        return Err("empty geometry".to_string());
    }
    Ok(())
}
