//! Engine configuration.
//!
//! Loaded from YAML; every field has a default so an empty file (or no file)
//! yields a working configuration. `ELEVATION_API_URL` and `ELEVATION_DATASET`
//! override the elevation source after the file is read.
//!
//! ```yaml
//! elevation:
//!   api_url: https://api.opentopodata.org
//!   dataset: srtm30m
//! cache:
//!   dir: ./tile_cache
//! sieve:
//!   score_visibility: true
//! ```

use crate::RunnerError;
use meshrf_link::LinkParams;
use meshrf_planner::{PlannerParams, SieveParams};
use meshrf_terrain::{
    CacheConfig, DEFAULT_API_URL, DEFAULT_BATCH_SIZE, DEFAULT_DATASET, DEFAULT_MEMORY_TILES,
    DEFAULT_UNAVAILABLE_TTL, DEFAULT_ZOOM,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`ElevationConfig::api_url`].
pub const ENV_API_URL: &str = "ELEVATION_API_URL";

/// Environment variable overriding [`ElevationConfig::dataset`].
pub const ENV_DATASET: &str = "ELEVATION_DATASET";

const SECS_PER_DAY: u64 = 24 * 60 * 60;
const SECS_PER_HOUR: u64 = 60 * 60;

/// Where elevation samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElevationProvider {
    /// An OpenTopoData-compatible HTTP API.
    #[default]
    OpenTopoData,
    /// Constant height everywhere, for offline runs.
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    pub provider: ElevationProvider,
    pub api_url: String,
    pub dataset: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub batch_delay_ms: u64,
    /// Height used by the `flat` provider (meters).
    pub flat_height_m: f64,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            provider: ElevationProvider::default(),
            api_url: DEFAULT_API_URL.to_string(),
            dataset: DEFAULT_DATASET.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: 10,
            batch_delay_ms: 300,
            flat_height_m: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub zoom: u8,
    pub tile_ttl_days: u64,
    pub memory_tiles: usize,
    /// Seconds a tile that could not be fetched is not retried.
    pub unavailable_secs: u64,
    /// Directory for persisted tiles; in-memory only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            tile_ttl_days: 30,
            memory_tiles: DEFAULT_MEMORY_TILES,
            unavailable_secs: DEFAULT_UNAVAILABLE_TTL.as_secs(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    pub target_spacing_m: f64,
    pub candidate_height_m: f64,
    pub receiver_height_m: f64,
}

impl Default for PlannerSection {
    fn default() -> Self {
        let params = PlannerParams::default();
        Self {
            target_spacing_m: params.target_spacing_m,
            candidate_height_m: params.candidate_height_m,
            receiver_height_m: params.receiver_height_m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsSection {
    /// Lifetime of cached operation results (hours). Zero disables the cache.
    pub ttl_hours: u64,
    /// Directory for persisted results; in-memory only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for ResultsSection {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            dir: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub elevation: ElevationConfig,
    pub cache: CacheSection,
    pub link: LinkParams,
    pub planner: PlannerSection,
    pub sieve: SieveParams,
    pub results: ResultsSection,
}

impl EngineConfig {
    /// Parse YAML. An empty document gives the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RunnerError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunnerError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Load `path` if given, otherwise the defaults, then apply environment
    /// overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self, RunnerError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `ELEVATION_API_URL` / `ELEVATION_DATASET` from `lookup`.
    ///
    /// Blank values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.elevation.api_url = url;
        }
        if let Some(dataset) = lookup(ENV_DATASET).filter(|v| !v.trim().is_empty()) {
            self.elevation.dataset = dataset;
        }
    }

    /// Check values that would otherwise fail deep inside an operation.
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.elevation.batch_size == 0 {
            return Err(RunnerError::Config("elevation.batch_size must be at least 1".to_string()));
        }
        if self.elevation.timeout_secs == 0 {
            return Err(RunnerError::Config("elevation.timeout_secs must be at least 1".to_string()));
        }
        if !(self.link.step_m.is_finite() && self.link.step_m > 0.0) {
            return Err(RunnerError::Config(format!("link.step_m must be positive, got {}", self.link.step_m)));
        }
        if !(self.planner.target_spacing_m.is_finite() && self.planner.target_spacing_m > 0.0) {
            return Err(RunnerError::Config(format!(
                "planner.target_spacing_m must be positive, got {}",
                self.planner.target_spacing_m
            )));
        }
        if self.sieve.results == 0 || self.sieve.top_k == 0 {
            return Err(RunnerError::Config("sieve.top_k and sieve.results must be at least 1".to_string()));
        }
        if self.cache.tile_ttl_days.checked_mul(SECS_PER_DAY).is_none() {
            return Err(RunnerError::Config(format!(
                "cache.tile_ttl_days is out of range: {}",
                self.cache.tile_ttl_days
            )));
        }
        if self.results.ttl_hours.checked_mul(SECS_PER_HOUR).is_none() {
            return Err(RunnerError::Config(format!(
                "results.ttl_hours is out of range: {}",
                self.results.ttl_hours
            )));
        }
        Ok(())
    }

    /// Settings for the elevation cache.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            zoom: self.cache.zoom,
            tile_ttl: Duration::from_secs(self.cache.tile_ttl_days.saturating_mul(SECS_PER_DAY)),
            memory_tiles: self.cache.memory_tiles,
            batch_delay: Duration::from_millis(self.elevation.batch_delay_ms),
            unavailable_ttl: Duration::from_secs(self.cache.unavailable_secs),
        }
    }

    /// Settings for network planning.
    pub fn planner_params(&self) -> PlannerParams {
        PlannerParams {
            target_spacing_m: self.planner.target_spacing_m,
            candidate_height_m: self.planner.candidate_height_m,
            receiver_height_m: self.planner.receiver_height_m,
            link: self.link.clone(),
        }
    }

    /// Result cache lifetime.
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.results.ttl_hours.saturating_mul(SECS_PER_HOUR))
    }
}
