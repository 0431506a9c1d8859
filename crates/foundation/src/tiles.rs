use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::geo::{Bbox, LatLon, MERCATOR_MAX_LAT};

/// Tile index in the slippy-map (ZXY) scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileIndex {
    pub x: u32,
    pub y: u32,
}

impl TileIndex {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// File stem used by tiled datasets: `"{x}_{y}"`.
    pub fn name(&self) -> String {
        format!("{}_{}", self.x, self.y)
    }

    /// The 3×3 block centred on this tile. Neighbours that fall off the grid
    /// at `zoom` are skipped, so edge tiles yield fewer than nine entries.
    pub fn neighborhood(&self, zoom: u8) -> Vec<TileIndex> {
        let last = tiles_per_axis(zoom) as i64 - 1;
        let mut out = Vec::with_capacity(9);
        for x in self.x as i64 - 1..=self.x as i64 + 1 {
            for y in self.y as i64 - 1..=self.y as i64 + 1 {
                if (0..=last).contains(&x) && (0..=last).contains(&y) {
                    out.push(TileIndex::new(x as u32, y as u32));
                }
            }
        }
        out
    }
}

/// Number of tiles along one axis at `zoom` (2^z).
pub fn tiles_per_axis(zoom: u8) -> u64 {
    1u64 << zoom.min(31)
}

/// Slippy-map tile containing `(lat, lon)` at `zoom`.
///
/// Latitude is clamped to the Web Mercator limit and the result to the grid,
/// so points on the antimeridian or the poles map to edge tiles.
pub fn lat_lon_to_tile(lat: f64, lon: f64, zoom: u8) -> TileIndex {
    let n = tiles_per_axis(zoom) as f64;
    let lat_rad = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();

    let x = ((lon + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

    let max = n - 1.0;
    TileIndex::new(x.clamp(0.0, max) as u32, y.clamp(0.0, max) as u32)
}

pub fn lat_lon_to_tile_at(p: LatLon, zoom: u8) -> TileIndex {
    lat_lon_to_tile(p.lat, p.lon, zoom)
}

/// Bounding box covered by tile `(x, y)` at `zoom`.
pub fn tile_to_bbox(x: u32, y: u32, zoom: u8) -> Bbox {
    let n = tiles_per_axis(zoom) as f64;
    let west = x as f64 / n * 360.0 - 180.0;
    let east = (x as f64 + 1.0) / n * 360.0 - 180.0;

    // Web Mercator Y flip: row 0 is the northern edge.
    let north = tile_y_to_lat(y as f64, n);
    let south = tile_y_to_lat(y as f64 + 1.0, n);

    Bbox::new(south, west, north, east)
}

fn tile_y_to_lat(y: f64, n: f64) -> f64 {
    let m = PI - 2.0 * PI * y / n;
    m.sinh().atan().to_degrees()
}
