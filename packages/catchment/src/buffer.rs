//! Catchment buffer geometry.
//!
//! `geo` has no buffer operation, so the buffer is assembled from simple
//! pieces in a local flat frame: a circle of `radius_km` around every route
//! vertex and depot, and a rectangle of width `2 * radius_km` along every
//! route segment. The union of the pieces is the buffered corridor. The
//! frame uses 111 km per degree of latitude and `111 * cos(lat)` km per
//! degree of longitude at the mean latitude of the input, which is accurate
//! enough at the scale of a single city or island network.

use geo::{Coord, Geometry, Intersects, LineString, Point, Polygon, Rect};
use rider_demand_spawn_models::GeoPoint;
use rstar::{AABB, Envelope, RTree, RTreeObject};

/// Kilometres per degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Vertices used to approximate each circle.
const CIRCLE_SEGMENTS: usize = 24;

/// Flat frame centred on a reference latitude.
#[derive(Debug, Clone, Copy)]
struct LocalFrame {
    km_per_deg_lon: f64,
}

impl LocalFrame {
    fn at_latitude(lat: f64) -> Self {
        Self {
            km_per_deg_lon: (KM_PER_DEGREE * lat.to_radians().cos()).max(1e-3),
        }
    }

    fn to_km(self, p: GeoPoint) -> Coord<f64> {
        Coord {
            x: p.lon * self.km_per_deg_lon,
            y: p.lat * KM_PER_DEGREE,
        }
    }

    fn to_degrees(self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: c.x / self.km_per_deg_lon,
            y: c.y / KM_PER_DEGREE,
        }
    }

    fn polygon(self, ring_km: impl IntoIterator<Item = Coord<f64>>) -> Polygon<f64> {
        let ring: Vec<Coord<f64>> = ring_km.into_iter().map(|c| self.to_degrees(c)).collect();
        Polygon::new(LineString::from(ring), vec![])
    }

    #[allow(clippy::cast_precision_loss)]
    fn circle(self, center: GeoPoint, radius_km: f64) -> Polygon<f64> {
        let c = self.to_km(center);
        self.polygon((0..CIRCLE_SEGMENTS).map(|i| {
            let angle = std::f64::consts::TAU * i as f64 / CIRCLE_SEGMENTS as f64;
            Coord {
                x: radius_km.mul_add(angle.cos(), c.x),
                y: radius_km.mul_add(angle.sin(), c.y),
            }
        }))
    }

    fn segment(self, a: GeoPoint, b: GeoPoint, radius_km: f64) -> Option<Polygon<f64>> {
        let a = self.to_km(a);
        let b = self.to_km(b);
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let len = dx.hypot(dy);
        if len < 1e-9 {
            return None;
        }
        let n = Coord {
            x: -dy / len * radius_km,
            y: dx / len * radius_km,
        };
        Some(self.polygon([a + n, b + n, b - n, a - n]))
    }
}

struct BufferPiece {
    polygon: Polygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl BufferPiece {
    fn new(polygon: Polygon<f64>) -> Option<Self> {
        let rect = geo::BoundingRect::bounding_rect(&polygon)?;
        Some(Self {
            envelope: rect_to_aabb(rect),
            polygon,
        })
    }
}

impl RTreeObject for BufferPiece {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn rect_to_aabb(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// A buffered corridor around a route and its depots.
pub struct CatchmentBuffer {
    radius_km: f64,
    route_points: usize,
    depot_points: usize,
    bounds: Option<Rect<f64>>,
    pieces: RTree<BufferPiece>,
}

impl std::fmt::Debug for CatchmentBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatchmentBuffer")
            .field("radius_km", &self.radius_km)
            .field("route_points", &self.route_points)
            .field("depot_points", &self.depot_points)
            .field("bounds", &self.bounds)
            .field("pieces", &self.pieces.size())
            .finish()
    }
}

impl CatchmentBuffer {
    /// Buffers the `route` polyline and `depots` by `radius_km`.
    ///
    /// A non-positive or non-finite radius, or no points at all, yields an
    /// empty buffer that intersects nothing.
    #[must_use]
    pub fn new(route: &[GeoPoint], depots: &[GeoPoint], radius_km: f64) -> Self {
        let all: Vec<GeoPoint> = route
            .iter()
            .chain(depots)
            .copied()
            .filter(|p| p.lat.is_finite() && p.lon.is_finite())
            .collect();

        let mut pieces = Vec::new();
        if radius_km.is_finite() && radius_km > 0.0 && !all.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let mean_lat = all.iter().map(|p| p.lat).sum::<f64>() / all.len() as f64;
            let frame = LocalFrame::at_latitude(mean_lat);

            pieces.extend(all.iter().map(|p| frame.circle(*p, radius_km)));
            pieces.extend(
                route
                    .windows(2)
                    .filter_map(|w| frame.segment(w[0], w[1], radius_km)),
            );
        }

        let pieces: Vec<BufferPiece> = pieces.into_iter().filter_map(BufferPiece::new).collect();
        let bounds = pieces
            .iter()
            .map(|p| p.envelope)
            .reduce(|a, b| a.merged(&b))
            .map(|env| {
                let [min_x, min_y] = env.lower();
                let [max_x, max_y] = env.upper();
                Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y })
            });

        Self {
            radius_km,
            route_points: route.len(),
            depot_points: depots.len(),
            bounds,
            pieces: RTree::bulk_load(pieces),
        }
    }

    /// Buffer radius in kilometres.
    #[must_use]
    pub const fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Number of route vertices the buffer was built from.
    #[must_use]
    pub const fn route_points(&self) -> usize {
        self.route_points
    }

    /// Number of depot points the buffer was built from.
    #[must_use]
    pub const fn depot_points(&self) -> usize {
        self.depot_points
    }

    /// Bounding rectangle in degrees, `None` when empty.
    #[must_use]
    pub const fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }

    /// Returns `true` if the buffer covers nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pieces.size() == 0
    }

    /// Returns `true` if `geometry` (in lon/lat degrees) touches the buffer.
    #[must_use]
    pub fn intersects(&self, geometry: &Geometry<f64>) -> bool {
        let Some(bounds) = self.bounds else {
            return false;
        };
        let Some(rect) = geo::BoundingRect::bounding_rect(geometry) else {
            return false;
        };
        if !bounds.intersects(&rect) {
            return false;
        }
        self.pieces
            .locate_in_envelope_intersecting(&rect_to_aabb(rect))
            .any(|piece| piece.polygon.intersects(geometry))
    }

    /// Returns `true` if the point lies inside the buffer.
    #[must_use]
    pub fn contains_point(&self, lat: f64, lon: f64) -> bool {
        self.intersects(&Point::new(lon, lat).into())
    }
}
