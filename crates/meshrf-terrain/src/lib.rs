//! # meshrf-terrain
//!
//! Elevation data for radio planning: a TTL-bounded cache of slippy-map tiles,
//! each holding a 16×16 elevation grid sampled from a point-elevation API.
//!
//! ## Overview
//!
//! - [`TileCoord`] / [`TileBounds`] map coordinates to zoom-12 tiles and fix the
//!   grid orientation (row 0 north, column 0 west).
//! - [`ElevationSource`] answers batched point queries. [`OpenTopoDataSource`]
//!   talks to an OpenTopoData API; [`FnSource`] computes synthetic terrain.
//! - [`CacheStore`] persists encoded tiles with an expiry ([`MemoryStore`],
//!   [`FileStore`]).
//! - [`ElevationCache`] ties them together and serves tiles, point elevations
//!   and resampled grids.
//! - [`terrain_rgb`] encodes grids as Terrain-RGB pixels.
//!
//! ## Example
//!
//! ```no_run
//! use meshrf_terrain::{CacheConfig, ElevationCache, FileStore, OpenTopoDataSource};
//!
//! let source = OpenTopoDataSource::new("https://api.opentopodata.org", "srtm30m")?;
//! let store = FileStore::open("./tile_cache")?;
//! let cache = ElevationCache::new(Box::new(source), Box::new(store), CacheConfig::default())?;
//!
//! let elevation = cache.get_elevation(47.6062, -122.3321);
//! println!("Seattle elevation: {:.1} m", elevation.value());
//! # Ok::<(), meshrf_terrain::TerrainError>(())
//! ```

mod cache;
mod error;
mod grid;
mod source;
mod store;
pub mod terrain_rgb;
mod tile;

pub use cache::{
    CacheConfig, CacheStats, DegradedReason, ElevationCache, PointElevation, DEFAULT_BATCH_DELAY,
    DEFAULT_MEMORY_TILES, DEFAULT_TILE_TTL, DEFAULT_UNAVAILABLE_TTL,
};
pub use error::TerrainError;
pub use grid::{ElevationGrid, TerrainTile, GRID_SIZE};
pub use source::{
    flat_source, ElevationSource, FnSource, OpenTopoDataSource, DEFAULT_API_URL, DEFAULT_BATCH_SIZE,
    DEFAULT_DATASET, DEFAULT_TIMEOUT,
};
pub use store::{CacheStore, FileStore, MemoryStore};
pub use tile::{srtm_filename, tiles_in_region, TileBounds, TileCoord, DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM};

/// Result type for terrain operations.
pub type Result<T> = std::result::Result<T, TerrainError>;
