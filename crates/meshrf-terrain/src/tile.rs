//! Slippy-map tile coordinates and the grid orientation convention.
//!
//! Uses the OpenStreetMap Slippy Map tile naming convention:
//! - `z` is the zoom level
//! - `x` is the column (0 to 2^z - 1, from west to east)
//! - `y` is the row (0 to 2^z - 1, from north to south)
//!
//! At zoom level 12 each tile covers ~0.088° of longitude (about 9.8 km at the
//! equator), which the cache samples with a 16x16 grid (~650 m spacing).
//!
//! ## Grid orientation
//!
//! Every elevation grid in this workspace is laid out the same way, and
//! [`TileBounds::sample_position`] is the single definition of it:
//! - row 0 is the north edge (`max_lat`), rows increase southward
//! - column 0 is the west edge (`min_lon`), columns increase eastward
//! - samples are spaced linearly in degrees and include both edges

use crate::{Result, TerrainError};
use std::f64::consts::PI;

/// Minimum valid zoom level.
pub const MIN_ZOOM: u8 = 1;

/// Maximum valid zoom level.
pub const MAX_ZOOM: u8 = 20;

/// Default zoom level (~30 m source data sampled on a ~650 m grid).
pub const DEFAULT_ZOOM: u8 = 12;

/// Latitude limit of the Web Mercator projection (arctan(sinh(π))).
const MERCATOR_MAX_LAT: f64 = 85.0511;

/// Nudge applied to the east/south edges of a region so a box ending exactly on
/// a tile boundary does not pull in the neighbouring tile.
const REGION_EDGE_EPSILON: f64 = 1e-11;

/// OSM-style tile coordinates (z, x, y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TileCoord {
    /// Zoom level.
    pub z: u8,
    /// X coordinate (column, 0 at 180°W, increases eastward).
    pub x: u32,
    /// Y coordinate (row, 0 at ~85.05°N, increases southward).
    pub y: u32,
}

impl TileCoord {
    /// Create a tile coordinate, validating the ranges for the zoom level.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self> {
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&z) {
            return Err(TerrainError::InvalidZoomLevel(z));
        }
        let max_coord = 1u32 << z;
        if x >= max_coord || y >= max_coord {
            return Err(TerrainError::InvalidTileCoord { z, x, y });
        }
        Ok(Self { z, x, y })
    }

    /// Convert latitude/longitude to tile coordinates.
    ///
    /// Uses the OpenStreetMap Slippy Map tiling formula:
    /// - x = floor((lon + 180) / 360 * 2^z)
    /// - y = floor((1 - ln(tan(lat) + sec(lat)) / π) / 2 * 2^z)
    ///
    /// Latitudes beyond the Mercator limit are clamped, and x/y are clamped to
    /// the valid range (handles exactly ±180°).
    pub fn from_lat_lon(lat: f64, lon: f64, z: u8) -> Result<Self> {
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&z) {
            return Err(TerrainError::InvalidZoomLevel(z));
        }

        let lat_clamped = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT);
        let lon_clamped = lon.clamp(-180.0, 180.0);
        let n = (1u32 << z) as f64;

        let x = ((lon_clamped + 180.0) / 360.0 * n).floor().max(0.0) as u32;

        let lat_rad = lat_clamped.to_radians();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n)
            .floor()
            .max(0.0) as u32;

        let max_coord = (1u32 << z) - 1;
        Ok(Self {
            z,
            x: x.min(max_coord),
            y: y.min(max_coord),
        })
    }

    /// Get the bounding box for this tile.
    pub fn bounds(&self) -> TileBounds {
        let n = (1u32 << self.z) as f64;

        let min_lon = self.x as f64 / n * 360.0 - 180.0;
        let max_lon = (self.x + 1) as f64 / n * 360.0 - 180.0;

        // Inverse of the Slippy Map formula
        let max_lat = (PI * (1.0 - 2.0 * self.y as f64 / n)).sinh().atan().to_degrees();
        let min_lat = (PI * (1.0 - 2.0 * (self.y + 1) as f64 / n)).sinh().atan().to_degrees();

        TileBounds {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Key under which this tile's grid is persisted in a cache store.
    pub fn cache_key(&self) -> String {
        format!("tile:{}:{}:{}", self.z, self.x, self.y)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Enumerate all tiles at zoom `z` intersecting a lat/lon box.
///
/// Tiles are returned column by column (x outer, y inner), west to east and
/// north to south.
pub fn tiles_in_region(
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
    z: u8,
) -> Result<Vec<TileCoord>> {
    let east = (max_lon - REGION_EDGE_EPSILON).max(min_lon);
    let south = (min_lat + REGION_EDGE_EPSILON).min(max_lat);

    let top_left = TileCoord::from_lat_lon(max_lat, min_lon, z)?;
    let bottom_right = TileCoord::from_lat_lon(south, east, z)?;

    let mut tiles = Vec::new();
    for x in top_left.x..=bottom_right.x {
        for y in top_left.y..=bottom_right.y {
            tiles.push(TileCoord { z, x, y });
        }
    }
    Ok(tiles)
}

/// Geographic bounds of a tile.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TileBounds {
    /// Minimum latitude (south edge).
    pub min_lat: f64,
    /// Maximum latitude (north edge).
    pub max_lat: f64,
    /// Minimum longitude (west edge).
    pub min_lon: f64,
    /// Maximum longitude (east edge).
    pub max_lon: f64,
}

impl TileBounds {
    /// Check if a coordinate is within the bounds.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// Geographic position of grid cell (`row`, `col`) in a `grid_size` grid.
    ///
    /// Row 0 is the north edge, column 0 the west edge. This is the only place
    /// the orientation is defined; the cache writer, the interpolator and the
    /// sieve all go through it or its inverse [`TileBounds::fractional_index`].
    pub fn sample_position(&self, row: usize, col: usize, grid_size: usize) -> (f64, f64) {
        let (lat_step, lon_step) = self.steps(grid_size);
        let lat = self.max_lat - row as f64 * lat_step;
        let lon = self.min_lon + col as f64 * lon_step;
        (lat, lon)
    }

    /// Fractional (row, col) of a coordinate in a `grid_size` grid.
    ///
    /// Values are clamped to `[0, grid_size - 1]` so coordinates on or slightly
    /// beyond the tile edge resolve to the edge samples.
    pub fn fractional_index(&self, lat: f64, lon: f64, grid_size: usize) -> (f64, f64) {
        let last = grid_size.saturating_sub(1) as f64;
        let lat_range = self.max_lat - self.min_lat;
        let lon_range = self.max_lon - self.min_lon;
        if last == 0.0 || lat_range <= 0.0 || lon_range <= 0.0 {
            return (0.0, 0.0);
        }

        let row = (self.max_lat - lat) / lat_range * last;
        let col = (lon - self.min_lon) / lon_range * last;
        (clamp_index(row, last), clamp_index(col, last))
    }

    fn steps(&self, grid_size: usize) -> (f64, f64) {
        if grid_size < 2 {
            return (0.0, 0.0);
        }
        let last = (grid_size - 1) as f64;
        (
            (self.max_lat - self.min_lat) / last,
            (self.max_lon - self.min_lon) / last,
        )
    }
}

fn clamp_index(value: f64, last: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, last)
    }
}

/// SRTM-style height file name for the 1x1 degree cell containing a point.
///
/// Produces names like `N45W123.hgt`, the convention expected by external
/// terrain tools that read raw SRTM cells.
pub fn srtm_filename(lat: f64, lon: f64) -> String {
    let ns = if lat >= 0.0 { 'N' } else { 'S' };
    let ew = if lon >= 0.0 { 'E' } else { 'W' };
    let lat_deg = (lat.floor() as i32).unsigned_abs();
    let lon_deg = (lon.floor() as i32).unsigned_abs();
    format!("{}{:02}{}{:03}.hgt", ns, lat_deg, ew, lon_deg)
}
