//! Error types for the terrain crate.

use thiserror::Error;

/// Errors that can occur when fetching, caching or decoding elevation data.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// I/O error reading or writing the cache store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error when talking to the elevation source.
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// The elevation source answered with a non-success status.
    #[error("Elevation source returned status {status}: {detail}")]
    SourceStatus {
        /// HTTP status code or API status string.
        status: String,
        /// First part of the response body.
        detail: String,
    },

    /// The elevation source answered with data we could not use.
    #[error("Malformed elevation response: {0}")]
    MalformedResponse(String),

    /// No elevation data could be obtained for a tile.
    #[error("Elevation data unavailable for tile z={z} x={x} y={y}: {reason}")]
    DataUnavailable {
        /// Zoom level.
        z: u8,
        /// X tile coordinate.
        x: u32,
        /// Y tile coordinate.
        y: u32,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid zoom level.
    #[error("Invalid zoom level {0} (must be 1-20)")]
    InvalidZoomLevel(u8),

    /// Tile coordinates out of range for their zoom level.
    #[error("Tile x={x} y={y} out of range for zoom {z}")]
    InvalidTileCoord {
        /// Zoom level.
        z: u8,
        /// X tile coordinate.
        x: u32,
        /// Y tile coordinate.
        y: u32,
    },

    /// A grid did not hold exactly size² samples.
    #[error("Elevation grid of size {size} needs {expected} samples, got {actual}")]
    GridShape {
        /// Grid edge length.
        size: usize,
        /// Required sample count.
        expected: usize,
        /// Supplied sample count.
        actual: usize,
    },

    /// A stored tile could not be decoded.
    #[error("Tile codec error: {0}")]
    Codec(String),

    /// Cache lock was poisoned (a thread panicked while holding the lock).
    #[error("Tile cache lock was poisoned")]
    CacheLockPoisoned,
}
