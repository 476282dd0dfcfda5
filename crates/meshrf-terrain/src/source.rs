//! Elevation sources: where the cache gets raw point elevations from.

use crate::{Result, TerrainError};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Public OpenTopoData endpoint.
pub const DEFAULT_API_URL: &str = "https://api.opentopodata.org";

/// SRTM 30 m dataset name on OpenTopoData.
pub const DEFAULT_DATASET: &str = "srtm30m";

/// OpenTopoData accepts at most 100 locations per request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A provider of point elevations.
///
/// Implementations must return exactly one elevation per input point, in
/// order. Any error fails the whole batch; the cache substitutes 0 m for it.
pub trait ElevationSource: Send + Sync {
    /// Largest number of points accepted by one [`ElevationSource::fetch_batch`] call.
    fn max_batch_size(&self) -> usize;

    /// Fetch elevations in metres for `(lat, lon)` points.
    fn fetch_batch(&self, points: &[(f64, f64)]) -> Result<Vec<f64>>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "elevation-source"
    }
}

// ============================================================================
// OpenTopoData
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenTopoResponse {
    status: String,
    #[serde(default)]
    results: Vec<OpenTopoResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenTopoResult {
    elevation: Option<f64>,
}

/// HTTP client for an OpenTopoData-compatible API.
///
/// Issues `GET {base}/v1/{dataset}?locations=lat,lon|lat,lon|...`. Points the
/// dataset has no value for (`null`, e.g. over the sea) read as 0 m.
pub struct OpenTopoDataSource {
    base_url: String,
    dataset: String,
    batch_size: usize,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for OpenTopoDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenTopoDataSource")
            .field("base_url", &self.base_url)
            .field("dataset", &self.dataset)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl OpenTopoDataSource {
    /// Create a client for `base_url` and `dataset` with the default timeout.
    pub fn new(base_url: impl Into<String>, dataset: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, dataset, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        dataset: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dataset: dataset.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            client,
        })
    }

    /// Override the batch limit (self-hosted instances allow more).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Build the request URL for a batch.
    pub fn request_url(&self, points: &[(f64, f64)]) -> String {
        let locations = points
            .iter()
            .map(|(lat, lon)| format!("{},{}", lat, lon))
            .collect::<Vec<_>>()
            .join("|");
        format!("{}/v1/{}?locations={}", self.base_url, self.dataset, locations)
    }
}

impl ElevationSource for OpenTopoDataSource {
    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn fetch_batch(&self, points: &[(f64, f64)]) -> Result<Vec<f64>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.request_url(points);
        debug!(points = points.len(), dataset = %self.dataset, "requesting elevation batch");

        let response = self.client.get(&url).send()?;
        let http_status = response.status();
        let body = response.text()?;

        if !http_status.is_success() {
            return Err(TerrainError::SourceStatus {
                status: http_status.to_string(),
                detail: body.chars().take(200).collect(),
            });
        }

        parse_response(&body, points.len())
    }

    fn name(&self) -> &str {
        "opentopodata"
    }
}

fn parse_response(body: &str, expected: usize) -> Result<Vec<f64>> {
    let parsed: OpenTopoResponse = serde_json::from_str(body)
        .map_err(|e| TerrainError::MalformedResponse(e.to_string()))?;

    if parsed.status != "OK" {
        return Err(TerrainError::SourceStatus {
            status: parsed.status,
            detail: parsed.error.unwrap_or_default(),
        });
    }

    if parsed.results.len() != expected {
        return Err(TerrainError::MalformedResponse(format!(
            "expected {} results, got {}",
            expected,
            parsed.results.len()
        )));
    }

    Ok(parsed
        .results
        .into_iter()
        .map(|r| r.elevation.unwrap_or(0.0))
        .collect())
}

// ============================================================================
// Closure-backed source
// ============================================================================

/// Elevation source computed by a closure `(lat, lon) -> metres`.
///
/// Used for synthetic terrain and for running the engine without network access.
pub struct FnSource<F> {
    elevation: F,
    batch_size: usize,
}

impl<F> FnSource<F>
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    /// Wrap a closure, with the OpenTopoData batch limit.
    pub fn new(elevation: F) -> Self {
        Self {
            elevation,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the batch limit.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl<F> ElevationSource for FnSource<F>
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn fetch_batch(&self, points: &[(f64, f64)]) -> Result<Vec<f64>> {
        Ok(points
            .iter()
            .map(|(lat, lon)| (self.elevation)(*lat, *lon))
            .collect())
    }

    fn name(&self) -> &str {
        "function"
    }
}

/// A flat plain at a fixed height.
pub fn flat_source(height_m: f64) -> FnSource<impl Fn(f64, f64) -> f64 + Send + Sync> {
    FnSource::new(move |_, _| height_m)
}
