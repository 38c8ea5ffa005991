//! Route and depot geometry from command-line input.

use geo::{CoordsIter, Geometry};
use geojson::GeoJson;
use rider_demand_spawn_models::GeoPoint;

/// Reads the first line geometry out of a GeoJSON document.
///
/// Accepts a bare geometry, a feature or a feature collection; the first
/// `LineString` or `MultiLineString` found is used, as ordered
/// `(lat, lon)` points.
///
/// # Errors
///
/// Returns a message if the document does not parse or holds no line.
pub fn route_from_geojson(contents: &str) -> Result<Vec<GeoPoint>, String> {
    let geojson: GeoJson = contents.parse().map_err(|e: geojson::Error| e.to_string())?;
    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::Geometry(g) => vec![g],
        GeoJson::Feature(f) => f.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    };

    for geometry in geometries {
        let geometry = Geometry::<f64>::try_from(geometry).map_err(|e| e.to_string())?;
        if matches!(
            geometry,
            Geometry::LineString(_) | Geometry::MultiLineString(_)
        ) {
            return Ok(geometry
                .coords_iter()
                .map(|c| GeoPoint::new(c.y, c.x))
                .collect());
        }
    }
    Err("no LineString in route document".to_string())
}

/// Parses `"LAT,LON"`.
///
/// # Errors
///
/// Returns a message if either part is missing, non-numeric or out of
/// range.
pub fn parse_point(s: &str) -> Result<GeoPoint, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{s}'"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("bad latitude '{lat}'"))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("bad longitude '{lon}'"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinates out of range: {lat},{lon}"));
    }
    Ok(GeoPoint::new(lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_line_from_feature_collection() {
        let doc = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [-59.6, 13.1]}},
                {"type": "Feature", "properties": {"route": "1A"}, "geometry": {
                    "type": "LineString",
                    "coordinates": [[-59.64, 13.25], [-59.62, 13.2], [-59.61, 13.1]]
                }}
            ]
        }"#;
        let route = route_from_geojson(doc).unwrap();
        assert_eq!(route.len(), 3);
        assert!((route[0].lat - 13.25).abs() < 1e-12);
        assert!((route[0].lon + 59.64).abs() < 1e-12);
    }

    #[test]
    fn rejects_documents_without_lines() {
        let doc = r#"{"type": "Point", "coordinates": [-59.6, 13.1]}"#;
        assert!(route_from_geojson(doc).is_err());
        assert!(route_from_geojson("not json").is_err());
    }

    #[test]
    fn parses_points() {
        let p = parse_point("13.1, -59.6").unwrap();
        assert!((p.lat - 13.1).abs() < 1e-12);
        assert!((p.lon + 59.6).abs() < 1e-12);
        assert!(parse_point("13.1").is_err());
        assert!(parse_point("91,0").is_err());
        assert!(parse_point("a,b").is_err());
    }
}
