//! The elevation grid cache.
//!
//! [`ElevationCache`] turns an [`ElevationSource`] that answers point queries
//! into a tile-grained, TTL-bounded cache of [`TerrainTile`]s:
//!
//! 1. an in-memory LRU layer of decoded tiles (fast path, no I/O)
//! 2. a [`CacheStore`] holding encoded tiles (shared or persistent)
//! 3. on a miss, a batched fetch of the tile's N×N sample positions
//!
//! Failed batches degrade instead of failing: their samples become 0 m and are
//! flagged in the tile's mask. Only a tile for which *every* batch failed is
//! reported as unavailable. Such a tile is never stored; it is remembered in
//! memory for [`CacheConfig::unavailable_ttl`] so that a run of lookups in the
//! same tile does not hit the source once per point.

use crate::grid::{ElevationGrid, TerrainTile, GRID_SIZE};
use crate::source::ElevationSource;
use crate::store::{CacheStore, MemoryStore};
use crate::tile::{TileCoord, DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM};
use crate::{Result, TerrainError};
use meshrf_metrics::metric_defs;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tiles stay valid for 30 days.
pub const DEFAULT_TILE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default number of decoded tiles kept in memory.
pub const DEFAULT_MEMORY_TILES: usize = 1024;

/// Pause between consecutive batch requests for one tile.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(300);

/// How long a tile that could not be fetched at all is answered as unavailable
/// without asking the source again.
pub const DEFAULT_UNAVAILABLE_TTL: Duration = Duration::from_secs(60);

/// Cache tuning.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Zoom level tiles are resolved at.
    pub zoom: u8,
    /// Lifetime of a cached tile.
    pub tile_ttl: Duration,
    /// Capacity of the in-memory layer.
    pub memory_tiles: usize,
    /// Pause between batch requests while fetching one tile.
    pub batch_delay: Duration,
    /// Retry holdoff for tiles whose every batch failed. Zero disables it.
    pub unavailable_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            tile_ttl: DEFAULT_TILE_TTL,
            memory_tiles: DEFAULT_MEMORY_TILES,
            batch_delay: DEFAULT_BATCH_DELAY,
            unavailable_ttl: DEFAULT_UNAVAILABLE_TTL,
        }
    }
}

/// Why a point elevation is not a clean measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// The whole tile could not be fetched; the value is 0 m.
    TileUnavailable,
    /// At least one of the interpolation samples was a 0 m stand-in.
    PartialTile,
}

/// Elevation at a point, tagged with whether it rests on substituted data.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointElevation {
    /// Interpolated from real samples only.
    Measured(f64),
    /// Interpolated from, or replaced by, stand-in data.
    Degraded {
        /// Elevation in metres.
        value: f64,
        /// What was substituted.
        reason: DegradedReason,
    },
}

impl PointElevation {
    /// Elevation in metres, regardless of quality.
    pub fn value(&self) -> f64 {
        match self {
            PointElevation::Measured(v) => *v,
            PointElevation::Degraded { value, .. } => *value,
        }
    }

    /// Whether the value rests on substituted data.
    pub fn is_degraded(&self) -> bool {
        matches!(self, PointElevation::Degraded { .. })
    }
}

/// Cache counters for this session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Tiles served from memory or the store.
    pub hits: u64,
    /// Tiles that had to be fetched.
    pub misses: u64,
    /// Tiles fetched with at least one successful batch.
    pub tiles_fetched: u64,
    /// Batches that failed and were replaced by 0 m.
    pub degraded_batches: u64,
    /// Tiles for which no batch succeeded.
    pub tiles_unavailable: u64,
}

/// `now + ttl`, or `None` (never) when that is not representable.
fn expiry(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

fn is_expired(expires: Option<Instant>, now: Instant) -> bool {
    expires.is_some_and(|at| now >= at)
}

struct LruEntry {
    tile: Arc<TerrainTile>,
    expires: Option<Instant>,
    /// Tick of the last access; the smallest is evicted first.
    last_used: AtomicU64,
}

/// LRU cache for decoded tiles in memory.
///
/// Lookups only need `&self`, so readers share the lock; recency is kept in
/// per-entry atomics and resolved when an insert has to evict.
struct TileLru {
    tiles: HashMap<TileCoord, LruEntry>,
    clock: AtomicU64,
    max_size: usize,
}

impl TileLru {
    fn new(max_size: usize) -> Self {
        Self {
            tiles: HashMap::new(),
            clock: AtomicU64::new(0),
            max_size,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn get(&self, coord: &TileCoord) -> Option<Arc<TerrainTile>> {
        let entry = self.tiles.get(coord)?;
        if is_expired(entry.expires, Instant::now()) {
            return None;
        }
        entry.last_used.store(self.tick(), Ordering::Relaxed);
        Some(Arc::clone(&entry.tile))
    }

    fn insert(&mut self, tile: Arc<TerrainTile>, expires: Option<Instant>) {
        if self.max_size == 0 {
            return;
        }
        let now = Instant::now();
        self.tiles.retain(|_, entry| !is_expired(entry.expires, now));

        let coord = tile.coord;
        if !self.tiles.contains_key(&coord) {
            while self.tiles.len() >= self.max_size {
                let oldest = self
                    .tiles
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                    .map(|(key, _)| *key);
                match oldest {
                    Some(oldest) => self.tiles.remove(&oldest),
                    None => break,
                };
            }
        }
        let last_used = AtomicU64::new(self.tick());
        self.tiles.insert(
            coord,
            LruEntry {
                tile,
                expires,
                last_used,
            },
        );
    }
}

/// Tile cache in front of an elevation source.
///
/// Safe to share between threads (`&ElevationCache` is all the analyzer,
/// planner and sieve need). Concurrent misses on the same tile may each fetch
/// it; the results are identical and the last store write wins.
pub struct ElevationCache {
    config: CacheConfig,
    source: Box<dyn ElevationSource>,
    store: Box<dyn CacheStore>,
    memory: RwLock<TileLru>,
    /// Tiles whose last fetch failed outright, with the end of their holdoff.
    unavailable: Mutex<HashMap<TileCoord, (Option<Instant>, String)>>,
    hits: AtomicU64,
    misses: AtomicU64,
    tiles_fetched: AtomicU64,
    degraded_batches: AtomicU64,
    tiles_unavailable: AtomicU64,
}

impl std::fmt::Debug for ElevationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevationCache")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish()
    }
}

impl ElevationCache {
    /// Create a cache over `source`, persisting tiles in `store`.
    pub fn new(
        source: Box<dyn ElevationSource>,
        store: Box<dyn CacheStore>,
        config: CacheConfig,
    ) -> Result<Self> {
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&config.zoom) {
            return Err(TerrainError::InvalidZoomLevel(config.zoom));
        }

        Ok(Self {
            memory: RwLock::new(TileLru::new(config.memory_tiles)),
            unavailable: Mutex::new(HashMap::new()),
            config,
            source,
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            tiles_fetched: AtomicU64::new(0),
            degraded_batches: AtomicU64::new(0),
            tiles_unavailable: AtomicU64::new(0),
        })
    }

    /// Cache with a process-local store, default settings and no batch delay.
    pub fn in_memory(source: impl ElevationSource + 'static) -> Self {
        Self {
            config: CacheConfig {
                batch_delay: Duration::ZERO,
                ..CacheConfig::default()
            },
            source: Box::new(source),
            store: Box::new(MemoryStore::new()),
            memory: RwLock::new(TileLru::new(DEFAULT_MEMORY_TILES)),
            unavailable: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            tiles_fetched: AtomicU64::new(0),
            degraded_batches: AtomicU64::new(0),
            tiles_unavailable: AtomicU64::new(0),
        }
    }

    /// Zoom level tiles are resolved at.
    pub fn zoom(&self) -> u8 {
        self.config.zoom
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Session counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            tiles_fetched: self.tiles_fetched.load(Ordering::Relaxed),
            degraded_batches: self.degraded_batches.load(Ordering::Relaxed),
            tiles_unavailable: self.tiles_unavailable.load(Ordering::Relaxed),
        }
    }

    /// Tile key for a coordinate at the cache zoom.
    pub fn tile_for_coord(&self, lat: f64, lon: f64) -> Result<TileCoord> {
        TileCoord::from_lat_lon(lat, lon, self.config.zoom)
    }

    /// Tile containing a coordinate.
    pub fn get_tile(&self, lat: f64, lon: f64) -> Result<Arc<TerrainTile>> {
        let coord = self.tile_for_coord(lat, lon)?;
        self.tile(coord)
    }

    /// Tile for an explicit key.
    pub fn tile(&self, coord: TileCoord) -> Result<Arc<TerrainTile>> {
        {
            let memory = self
                .memory
                .read()
                .map_err(|_| TerrainError::CacheLockPoisoned)?;
            if let Some(tile) = memory.get(&coord) {
                self.record_hit();
                return Ok(tile);
            }
        }

        if let Some(tile) = self.load_from_store(&coord) {
            let tile = Arc::new(tile);
            self.remember(Arc::clone(&tile))?;
            self.record_hit();
            return Ok(tile);
        }

        if let Some(reason) = self.held_off(&coord)? {
            debug!(tile = %coord, "tile recently unavailable, not refetching");
            return Err(TerrainError::DataUnavailable {
                z: coord.z,
                x: coord.x,
                y: coord.y,
                reason,
            });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(metric_defs::TILE_CACHE_MISSES.name).increment(1);
        debug!(tile = %coord, "tile cache miss");

        let tile = match self.fetch_tile(coord) {
            Ok(tile) => Arc::new(tile),
            Err(e) => {
                if let TerrainError::DataUnavailable { reason, .. } = &e {
                    self.hold_off(coord, reason.clone())?;
                }
                return Err(e);
            }
        };

        if let Err(e) = self
            .store
            .set(&coord.cache_key(), &tile.encode(), self.config.tile_ttl)
        {
            warn!(tile = %coord, error = %e, "failed to persist tile");
        }
        self.remember(Arc::clone(&tile))?;
        Ok(tile)
    }

    /// Interpolated elevation at a point.
    ///
    /// Never fails: an unavailable tile yields 0 m tagged as degraded.
    pub fn get_elevation(&self, lat: f64, lon: f64) -> PointElevation {
        match self.get_tile(lat, lon) {
            Ok(tile) => {
                let (value, degraded) = tile.sample(lat, lon);
                if degraded {
                    PointElevation::Degraded {
                        value,
                        reason: DegradedReason::PartialTile,
                    }
                } else {
                    PointElevation::Measured(value)
                }
            }
            Err(e) => {
                debug!(lat, lon, error = %e, "elevation unavailable, using 0 m");
                PointElevation::Degraded {
                    value: 0.0,
                    reason: DegradedReason::TileUnavailable,
                }
            }
        }
    }

    /// A tile's grid resampled to `size`×`size`, corners aligned.
    ///
    /// Returns an all-zero grid when the tile cannot be obtained or the key is
    /// invalid.
    pub fn get_interpolated_grid(&self, tile_x: u32, tile_y: u32, zoom: u8, size: usize) -> ElevationGrid {
        let tile = TileCoord::new(zoom, tile_x, tile_y).and_then(|coord| self.tile(coord));
        match tile {
            Ok(tile) => tile.grid.resample(size),
            Err(e) => {
                warn!(z = zoom, x = tile_x, y = tile_y, error = %e, "grid unavailable, returning zeros");
                ElevationGrid::zeros(size)
            }
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(metric_defs::TILE_CACHE_HITS.name).increment(1);
    }

    fn remember(&self, tile: Arc<TerrainTile>) -> Result<()> {
        let expires = expiry(self.config.tile_ttl);
        self.memory
            .write()
            .map_err(|_| TerrainError::CacheLockPoisoned)?
            .insert(tile, expires);
        Ok(())
    }

    /// The failure reason if `coord` is inside its retry holdoff.
    fn held_off(&self, coord: &TileCoord) -> Result<Option<String>> {
        let mut unavailable = self
            .unavailable
            .lock()
            .map_err(|_| TerrainError::CacheLockPoisoned)?;
        let now = Instant::now();
        unavailable.retain(|_, (expires, _)| !is_expired(*expires, now));
        Ok(unavailable.get(coord).map(|(_, reason)| reason.clone()))
    }

    fn hold_off(&self, coord: TileCoord, reason: String) -> Result<()> {
        if self.config.unavailable_ttl.is_zero() {
            return Ok(());
        }
        self.unavailable
            .lock()
            .map_err(|_| TerrainError::CacheLockPoisoned)?
            .insert(coord, (expiry(self.config.unavailable_ttl), reason));
        Ok(())
    }

    fn load_from_store(&self, coord: &TileCoord) -> Option<TerrainTile> {
        let bytes = match self.store.get(&coord.cache_key()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(tile = %coord, error = %e, "cache store read failed");
                return None;
            }
        };

        match TerrainTile::decode(&bytes) {
            Ok(tile) if tile.coord == *coord => Some(tile),
            Ok(tile) => {
                warn!(tile = %coord, stored = %tile.coord, "cache entry holds a different tile");
                None
            }
            Err(e) => {
                warn!(tile = %coord, error = %e, "undecodable cache entry, refetching");
                None
            }
        }
    }

    /// Fetch every sample position of a tile from the source, batch by batch.
    fn fetch_tile(&self, coord: TileCoord) -> Result<TerrainTile> {
        let bounds = coord.bounds();
        let points: Vec<(f64, f64)> = (0..GRID_SIZE)
            .flat_map(|row| (0..GRID_SIZE).map(move |col| (row, col)))
            .map(|(row, col)| bounds.sample_position(row, col, GRID_SIZE))
            .collect();

        let batch_size = self.source.max_batch_size().max(1);
        let mut values = Vec::with_capacity(points.len());
        let mut degraded = Vec::with_capacity(points.len());
        let mut failed_batches = 0usize;
        let mut last_error = String::new();

        for (i, batch) in points.chunks(batch_size).enumerate() {
            if i > 0 && !self.config.batch_delay.is_zero() {
                std::thread::sleep(self.config.batch_delay);
            }

            let started = Instant::now();
            let result = self.source.fetch_batch(batch).and_then(|elevations| {
                if elevations.len() == batch.len() {
                    Ok(elevations)
                } else {
                    Err(TerrainError::MalformedResponse(format!(
                        "expected {} elevations, got {}",
                        batch.len(),
                        elevations.len()
                    )))
                }
            });
            metrics::histogram!(metric_defs::BATCH_LATENCY.name)
                .record(started.elapsed().as_secs_f64() * 1000.0);

            match result {
                Ok(elevations) => {
                    values.extend(elevations.into_iter().map(|e| e as f32));
                    degraded.extend(std::iter::repeat(false).take(batch.len()));
                }
                Err(e) => {
                    warn!(
                        tile = %coord,
                        batch = i,
                        points = batch.len(),
                        source = self.source.name(),
                        error = %e,
                        "elevation batch failed, substituting 0 m"
                    );
                    self.degraded_batches.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(metric_defs::DEGRADED_BATCHES.name).increment(1);
                    failed_batches += 1;
                    last_error = e.to_string();
                    values.extend(std::iter::repeat(0.0f32).take(batch.len()));
                    degraded.extend(std::iter::repeat(true).take(batch.len()));
                }
            }
        }

        let total_batches = points.len().div_ceil(batch_size);
        if failed_batches == total_batches {
            self.tiles_unavailable.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(metric_defs::TILES_UNAVAILABLE.name).increment(1);
            return Err(TerrainError::DataUnavailable {
                z: coord.z,
                x: coord.x,
                y: coord.y,
                reason: last_error,
            });
        }

        self.tiles_fetched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(metric_defs::TILES_FETCHED.name).increment(1);
        debug!(tile = %coord, batches = total_batches, failed = failed_batches, "fetched tile");

        TerrainTile::new(coord, ElevationGrid::new(GRID_SIZE, values)?, degraded)
    }
}
