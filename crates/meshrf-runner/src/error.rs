use meshrf_terrain::TerrainError;
use thiserror::Error;

/// Errors raised while setting up or driving the engine.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Terrain error: {0}")]
    Terrain(#[from] TerrainError),
}
