//! Geo math for proximity matching: haversine distance and geohash cells.

use geohash::Coord;

use crate::types::GeoPoint;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Fixed proximity radius: two same-category reports within this distance
/// describe the same physical defect.
pub const PROXIMITY_RADIUS_M: f64 = 30.0;

/// Geohash precision for candidate prefiltering. Precision-7 cells are
/// ~150m x 150m, so a cell plus its 8 neighbors always covers the 30m radius.
pub const MATCH_CELL_PRECISION: usize = 7;

/// Coarser precision for the advisory lock that serializes concurrent
/// matching over the same area.
pub const LOCK_CELL_PRECISION: usize = 6;

/// Haversine great-circle distance between two points in meters.
pub fn haversine_distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_METERS * c
}

/// Geohash cell for a point at the given precision.
///
/// Encoding only fails on out-of-range coordinates, which validation rejects
/// upstream; a degenerate fallback keeps this total for callers.
pub fn cell_id(point: GeoPoint, precision: usize) -> String {
    geohash::encode(
        Coord {
            x: point.lng,
            y: point.lat,
        },
        precision,
    )
    .unwrap_or_else(|_| "0".repeat(precision))
}

/// The cell containing `point` plus its 8 neighbors, at the given precision.
/// Used to prefilter issue candidates before exact distance checks.
pub fn cell_neighborhood(point: GeoPoint, precision: usize) -> Vec<String> {
    let center = cell_id(point, precision);
    let mut cells = Vec::with_capacity(9);
    if let Ok(n) = geohash::neighbors(&center) {
        cells.extend([n.sw, n.s, n.se, n.w, n.e, n.nw, n.n, n.ne]);
    }
    cells.push(center);
    cells
}
