//! # meshrf-runner
//!
//! Ties the planning crates into a runnable engine: YAML configuration, an
//! [`Engine`] facade that answers every operation with an [`ApiResponse`]
//! envelope, a result cache keyed by request hash, and the `meshrf` CLI.
//!
//! ```no_run
//! use meshrf_runner::{ElevationQuery, Engine, EngineConfig};
//!
//! let config = EngineConfig::resolve(None)?;
//! let engine = Engine::from_config(config, true)?;
//! let response = engine.elevation(&ElevationQuery { lat: 47.6, lon: -122.3 });
//! println!("{}", serde_json::to_string(&response)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
mod engine;
mod error;
pub mod logging;
mod response;
mod result_cache;

pub use config::{EngineConfig, ElevationProvider};
pub use engine::{
    ElevationQuery, ElevationReport, Engine, LinkQuery, NetworkQuery, SiteSearchQuery, TerrainTileInfo,
    TERRAIN_TILE_SIZE,
};
pub use error::RunnerError;
pub use response::{ApiResponse, ResponseStatus};
pub use result_cache::{ResultCache, DEFAULT_RESULT_TTL};
