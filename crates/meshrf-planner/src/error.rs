use meshrf_link::LinkError;
use meshrf_terrain::TerrainError;
use thiserror::Error;

/// Errors that can occur while planning.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The search region does not intersect any tile.
    #[error("No tiles found for area")]
    NoTilesInRegion,

    /// A polygon, bounding box or spacing is unusable.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The request would touch more tiles or grid points than allowed.
    #[error("Region too large: {requested} {unit} requested, limit is {limit}")]
    RegionTooLarge {
        /// Amount the request needs.
        requested: usize,
        /// Configured ceiling.
        limit: usize,
        /// What is being counted.
        unit: &'static str,
    },

    /// A candidate site carries an unusable value.
    #[error("Invalid candidate {index}: {reason}")]
    InvalidCandidate {
        /// Position in the request's candidate list.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A link evaluation was rejected.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Terrain lookup failed in a way that cannot be degraded.
    #[error(transparent)]
    Terrain(#[from] TerrainError),
}
