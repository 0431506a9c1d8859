use serde::{Deserialize, Serialize};

/// Mean earth radius (meters) for the spherical approximations below.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Latitude limit of the Web Mercator tiling scheme (degrees).
pub const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// A WGS84 position in degrees, latitude first.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned lat/lon rectangle in degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bbox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    pub fn center(&self) -> LatLon {
        LatLon::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    pub fn contains(&self, p: LatLon) -> bool {
        p.lat >= self.south && p.lat <= self.north && p.lon >= self.west && p.lon <= self.east
    }

    /// Expand outward by `meters` on every side.
    ///
    /// Uses a spherical approximation: the latitude margin is the arc length
    /// over the earth radius, the longitude margin is widened by the cosine of
    /// the latitude furthest from the equator. Zero, negative and non-finite
    /// margins leave the box unchanged.
    pub fn padded(&self, meters: f64) -> Bbox {
        if !meters.is_finite() || meters <= 0.0 {
            return *self;
        }

        let dlat = (meters / EARTH_RADIUS_M).to_degrees();
        let widest_lat = self.south.abs().max(self.north.abs()).min(89.0);
        let dlon = dlat / widest_lat.to_radians().cos();

        Bbox {
            south: (self.south - dlat).max(-90.0),
            west: (self.west - dlon).max(-180.0),
            north: (self.north + dlat).min(90.0),
            east: (self.east + dlon).min(180.0),
        }
    }
}

/// Free-function form of [`Bbox::padded`].
pub fn pad_bbox(bbox: Bbox, meters: f64) -> Bbox {
    bbox.padded(meters)
}

/// Great-circle distance in meters.
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
