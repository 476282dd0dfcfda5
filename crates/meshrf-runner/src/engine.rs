//! The engine facade: one method per operation, each answering with an
//! [`ApiResponse`].

use crate::config::{ElevationProvider, EngineConfig};
use crate::result_cache::ResultCache;
use crate::{ApiResponse, RunnerError};
use meshrf_link::{analyze_link, GeoPoint, LinkRequest, LinkResult};
use meshrf_metrics::metric_defs;
use meshrf_planner::{find_sites, plan_network, CandidateSite, NetworkPlan, SearchRegion, SieveReport};
use meshrf_terrain::{
    flat_source, terrain_rgb, CacheStore, ElevationCache, ElevationSource, FileStore, MemoryStore,
    OpenTopoDataSource, PointElevation, TileCoord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Edge length of rendered Terrain-RGB tiles.
pub const TERRAIN_TILE_SIZE: usize = 256;

// ============================================================================
// Requests
// ============================================================================

/// Point-to-point link between a transmitter and a receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkQuery {
    pub tx_lat: f64,
    pub tx_lon: f64,
    pub rx_lat: f64,
    pub rx_lon: f64,
    pub frequency_mhz: f64,
    pub tx_height: f64,
    pub rx_height: f64,
}

impl LinkQuery {
    pub fn to_request(&self) -> LinkRequest {
        LinkRequest {
            from: GeoPoint::new(self.tx_lat, self.tx_lon),
            to: GeoPoint::new(self.rx_lat, self.rx_lon),
            freq_mhz: self.frequency_mhz,
            from_height_m: self.tx_height,
            to_height_m: self.rx_height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationQuery {
    pub lat: f64,
    pub lon: f64,
}

/// Bounding box search for transmitter sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSearchQuery {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
    pub frequency_mhz: f64,
    pub height_meters: f64,
}

impl SiteSearchQuery {
    pub fn region(&self) -> SearchRegion {
        SearchRegion {
            min_lat: self.min_lat,
            min_lon: self.min_lon,
            max_lat: self.max_lat,
            max_lon: self.max_lon,
        }
    }
}

/// Network optimization over a GeoJSON polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkQuery {
    pub candidates: Vec<CandidateSite>,
    pub polygon: Value,
    pub frequency_mhz: f64,
    /// Overrides `planner.target_spacing_m`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing_meters: Option<f64>,
}

/// Elevation answer, flagged when the value is a substitute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationReport {
    pub lat: f64,
    pub lon: f64,
    pub elevation: f64,
    pub point: PointElevation,
}

/// Metadata of a rendered Terrain-RGB tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainTileInfo {
    pub tile: TileCoord,
    pub size: usize,
    pub bytes: usize,
    pub min_elevation: f64,
    pub max_elevation: f64,
}

// ============================================================================
// Result memoization
// ============================================================================

/// Results built on substituted terrain are answered but never memoized, so a
/// source outage is not replayed after the source recovers.
trait Memoizable {
    fn rests_on_measured_terrain(&self) -> bool;
}

impl Memoizable for LinkResult {
    fn rests_on_measured_terrain(&self) -> bool {
        self.degraded_samples == 0
    }
}

impl Memoizable for SieveReport {
    fn rests_on_measured_terrain(&self) -> bool {
        self.tiles_failed == 0
    }
}

impl Memoizable for NetworkPlan {
    fn rests_on_measured_terrain(&self) -> bool {
        self.degraded_samples == 0
    }
}

/// Which terrain an answer was computed from; part of every result key.
#[derive(Debug, Serialize)]
struct TerrainIdentity<'a> {
    provider: ElevationProvider,
    api_url: &'a str,
    dataset: &'a str,
    flat_height_m: f64,
    zoom: u8,
}

// ============================================================================
// Engine
// ============================================================================

/// Owns the elevation cache and the optional result cache.
pub struct Engine {
    config: EngineConfig,
    cache: ElevationCache,
    results: Option<ResultCache>,
}

impl Engine {
    /// Build the elevation source, tile store and result cache described by
    /// `config`. `use_result_cache = false` bypasses result memoization.
    pub fn from_config(config: EngineConfig, use_result_cache: bool) -> Result<Self, RunnerError> {
        config.validate()?;

        let source: Box<dyn ElevationSource> = match config.elevation.provider {
            ElevationProvider::OpenTopoData => Box::new(
                OpenTopoDataSource::with_timeout(
                    config.elevation.api_url.clone(),
                    config.elevation.dataset.clone(),
                    Duration::from_secs(config.elevation.timeout_secs),
                )?
                .with_batch_size(config.elevation.batch_size),
            ),
            ElevationProvider::Flat => {
                Box::new(flat_source(config.elevation.flat_height_m).with_batch_size(config.elevation.batch_size))
            }
        };
        let store: Box<dyn CacheStore> = match &config.cache.dir {
            Some(dir) => Box::new(FileStore::open(dir)?),
            None => Box::new(MemoryStore::new()),
        };
        let cache = ElevationCache::new(source, store, config.cache_config())?;

        let results = if use_result_cache && config.results.ttl_hours > 0 {
            let store: Box<dyn CacheStore> = match &config.results.dir {
                Some(dir) => Box::new(FileStore::open(dir)?),
                None => Box::new(MemoryStore::new()),
            };
            Some(ResultCache::new(store, config.result_ttl()))
        } else {
            None
        };

        info!(
            provider = ?config.elevation.provider,
            dataset = %config.elevation.dataset,
            zoom = config.cache.zoom,
            persistent_tiles = config.cache.dir.is_some(),
            result_cache = results.is_some(),
            "engine ready"
        );
        Ok(Self::new(config, cache, results))
    }

    /// Assemble an engine from parts.
    pub fn new(config: EngineConfig, cache: ElevationCache, results: Option<ResultCache>) -> Self {
        Self { config, cache, results }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ElevationCache {
        &self.cache
    }

    /// Analyze a single link.
    pub fn link(&self, query: &LinkQuery) -> ApiResponse {
        self.run("link", query, &self.config.link, || {
            analyze_link(&self.cache, &query.to_request(), &self.config.link)
        })
    }

    /// Elevation at one point. Never cached: the tile cache already is.
    pub fn elevation(&self, query: &ElevationQuery) -> ApiResponse {
        let started = Instant::now();
        let response = if !(query.lat.is_finite() && query.lon.is_finite())
            || query.lat.abs() > 90.0
            || query.lon.abs() > 180.0
        {
            ApiResponse::error(format!("Invalid input: coordinate ({}, {}) out of range", query.lat, query.lon))
        } else {
            let point = self.cache.get_elevation(query.lat, query.lon);
            to_response(
                "elevation",
                Ok::<_, RunnerError>(ElevationReport {
                    lat: query.lat,
                    lon: query.lon,
                    elevation: point.value(),
                    point,
                }),
            )
        };
        record_time("elevation", started);
        response
    }

    /// Sieve a bounding box for transmitter sites.
    pub fn find_sites(&self, query: &SiteSearchQuery) -> ApiResponse {
        self.run("find_sites", query, &self.config.sieve, || {
            find_sites(
                &self.cache,
                &query.region(),
                query.frequency_mhz,
                query.height_meters,
                &self.config.sieve,
            )
        })
    }

    /// Sample targets in a polygon and select covering sites.
    pub fn optimize_network(&self, query: &NetworkQuery) -> ApiResponse {
        let mut params = self.config.planner_params();
        if let Some(spacing) = query.spacing_meters {
            params.target_spacing_m = spacing;
        }
        self.run("optimize_network", query, &params, || {
            plan_network(&self.cache, &query.polygon, &query.candidates, query.frequency_mhz, &params)
        })
    }

    /// Render a tile as `size`×`size` Terrain-RGB pixels (row-major RGB).
    ///
    /// Tiles without data render as sea level.
    pub fn terrain_tile(&self, z: u8, x: u32, y: u32, size: usize) -> Result<(TerrainTileInfo, Vec<u8>), RunnerError> {
        let started = Instant::now();
        let tile = TileCoord::new(z, x, y)?;
        if size == 0 {
            return Err(RunnerError::Config("tile size must be at least 1".to_string()));
        }
        let grid = self.cache.get_interpolated_grid(x, y, z, size);
        let pixels = terrain_rgb::encode_grid(&grid);
        let info = TerrainTileInfo {
            tile,
            size,
            bytes: pixels.len(),
            min_elevation: grid.min().map_or(0.0, f64::from),
            max_elevation: grid.max().map_or(0.0, f64::from),
        };
        debug!(tile = %tile, size, "rendered terrain tile");
        record_time("terrain_tile", started);
        Ok((info, pixels))
    }

    fn terrain_identity(&self) -> TerrainIdentity<'_> {
        let elevation = &self.config.elevation;
        TerrainIdentity {
            provider: elevation.provider,
            api_url: &elevation.api_url,
            dataset: &elevation.dataset,
            flat_height_m: elevation.flat_height_m,
            zoom: self.config.cache.zoom,
        }
    }

    /// Memoize, time and wrap one operation.
    ///
    /// The result key covers the request, the operation `settings` and the
    /// terrain identity, so a configuration change never replays an old answer.
    fn run<P, S, R, E>(
        &self,
        operation: &'static str,
        params: &P,
        settings: &S,
        op: impl FnOnce() -> Result<R, E>,
    ) -> ApiResponse
    where
        P: Serialize,
        S: Serialize,
        R: Serialize + Memoizable,
        E: Display,
    {
        let started = Instant::now();

        let key = match &self.results {
            Some(_) => match ResultCache::key(operation, &(params, settings, self.terrain_identity())) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(operation, error = %e, "request not cacheable");
                    None
                }
            },
            None => None,
        };

        if let (Some(results), Some(key)) = (&self.results, &key) {
            if let Some(cached) = results.get(key) {
                metrics::counter!(metric_defs::RESULT_CACHE_HITS.name, "operation" => operation).increment(1);
                debug!(operation, "answered from result cache");
                record_time(operation, started);
                return ApiResponse::success(cached);
            }
        }

        let outcome = op();
        let memoize = matches!(&outcome, Ok(result) if result.rests_on_measured_terrain());
        let response = to_response(operation, outcome);
        if let (Some(results), Some(key), Some(result)) = (&self.results, &key, &response.result) {
            if memoize {
                results.put(key, result);
            } else {
                debug!(operation, "result rests on substituted terrain, not cached");
            }
        }
        record_time(operation, started);
        response
    }
}

fn to_response<R: Serialize, E: Display>(operation: &str, outcome: Result<R, E>) -> ApiResponse {
    let value = outcome
        .map_err(|e| e.to_string())
        .and_then(|r| serde_json::to_value(r).map_err(|e| e.to_string()));
    match value {
        Ok(value) => ApiResponse::success(value),
        Err(message) => {
            warn!(operation, error = %message, "operation failed");
            ApiResponse::error(message)
        }
    }
}

fn record_time(operation: &'static str, started: Instant) {
    metrics::histogram!(metric_defs::OPERATION_TIME.name, "operation" => operation)
        .record(started.elapsed().as_secs_f64() * 1000.0);
}
