//! Target sampling and the candidate→target coverage graph.

use crate::PlanError;
use geo::{BoundingRect, Contains, Point, Polygon};
use meshrf_link::{analyze_link, GeoPoint, LinkError, LinkParams, LinkRequest};
use meshrf_metrics::metric_defs;
use meshrf_terrain::ElevationCache;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Metres per degree used to turn target spacing into a grid step.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Largest target grid (before polygon filtering) a request may ask for.
pub const MAX_TARGET_GRID_POINTS: usize = 250_000;

fn default_weight() -> f64 {
    1.0
}

/// A place a transmitter could be installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSite {
    /// Identifier; blank ids are assigned `cand_{index}`.
    #[serde(default)]
    pub id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Ground elevation (meters), filled in from terrain when the graph is built.
    #[serde(default)]
    pub elevation: f64,
    /// Antenna height above ground (meters); the planner default applies when absent.
    #[serde(default, alias = "height")]
    pub height_m: Option<f64>,
    /// Cost of selecting this site.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl CandidateSite {
    /// Candidate at a position with default height and weight.
    pub fn new(id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            elevation: 0.0,
            height_m: None,
            weight: default_weight(),
        }
    }

    /// Set the selection cost.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the antenna height.
    pub fn with_height(mut self, height_m: f64) -> Self {
        self.height_m = Some(height_m);
        self
    }

    /// Reject weights that would skew the cost ratio (NaN, infinite, zero or
    /// negative).
    pub fn validate(&self) -> Result<(), String> {
        if !(self.weight.is_finite() && self.weight > 0.0) {
            return Err(format!("weight must be finite and positive, got {}", self.weight));
        }
        Ok(())
    }
}

/// A point that should be covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPoint {
    /// Identifier, `tgt_{index}`.
    pub id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Ground elevation (meters).
    pub elevation: f64,
}

/// Settings for building a coverage graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageOptions {
    /// Antenna height for candidates that do not specify one (meters).
    pub candidate_height_m: f64,
    /// Receiver antenna height at targets (meters).
    pub receiver_height_m: f64,
    /// Link analysis constants.
    pub link: LinkParams,
}

impl Default for CoverageOptions {
    fn default() -> Self {
        Self {
            candidate_height_m: 10.0,
            receiver_height_m: 2.0,
            link: LinkParams::default(),
        }
    }
}

/// Which targets each candidate reaches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageGraph {
    /// Candidates in input order, ids and elevations resolved.
    pub candidates: Vec<CandidateSite>,
    /// Targets in input order.
    pub targets: Vec<TargetPoint>,
    /// For each candidate, ascending indices of the targets it covers.
    pub adjacency: Vec<Vec<usize>>,
    /// Candidate ground elevations and link profile samples that rest on
    /// substituted terrain.
    pub degraded_samples: usize,
}

impl CoverageGraph {
    /// Total number of candidate→target edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    /// Targets covered by candidate `index`.
    pub fn neighbors(&self, index: usize) -> &[usize] {
        self.adjacency.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Grid-sample the polygon at roughly `spacing_m` and keep interior points.
///
/// The grid starts at the bounding box's south-west corner and steps by
/// `spacing_m / 111000` degrees, longitude in the outer loop and latitude in
/// the inner loop, stopping before the east/north edges. Points on the
/// boundary are not inside.
pub fn sample_targets(
    cache: &ElevationCache,
    polygon: &Polygon<f64>,
    spacing_m: f64,
) -> Result<Vec<TargetPoint>, PlanError> {
    if !(spacing_m.is_finite() && spacing_m > 0.0) {
        return Err(PlanError::InvalidGeometry(format!(
            "target spacing must be positive, got {}",
            spacing_m
        )));
    }
    let rect = polygon
        .bounding_rect()
        .ok_or_else(|| PlanError::InvalidGeometry("polygon has no extent".to_string()))?;

    let step = spacing_m / METERS_PER_DEGREE;
    let (min, max) = (rect.min(), rect.max());
    let columns = steps_in(min.x, max.x, step);
    let rows = steps_in(min.y, max.y, step);

    let requested = columns.saturating_mul(rows);
    if requested > MAX_TARGET_GRID_POINTS {
        return Err(PlanError::RegionTooLarge {
            requested,
            limit: MAX_TARGET_GRID_POINTS,
            unit: "grid points",
        });
    }

    let mut targets = Vec::new();
    for i in 0..columns {
        let lon = min.x + i as f64 * step;
        for j in 0..rows {
            let lat = min.y + j as f64 * step;
            if polygon.contains(&Point::new(lon, lat)) {
                let elevation = cache.get_elevation(lat, lon).value();
                targets.push(TargetPoint {
                    id: format!("tgt_{}", targets.len()),
                    lat,
                    lon,
                    elevation,
                });
            }
        }
    }

    debug!(grid = requested, targets = targets.len(), spacing_m, "sampled targets");
    Ok(targets)
}

/// Number of values in the half-open range `[start, stop)` stepping by `step`.
fn steps_in(start: f64, stop: f64, step: f64) -> usize {
    let n = ((stop - start) / step).ceil();
    if n.is_finite() && n > 0.0 {
        n as usize
    } else {
        0
    }
}

pub(crate) fn validate_candidates(candidates: &[CandidateSite]) -> Result<(), PlanError> {
    for (index, c) in candidates.iter().enumerate() {
        c.validate().map_err(|reason| PlanError::InvalidCandidate { index, reason })?;
    }
    Ok(())
}

/// Evaluate every candidate/target pair and connect the usable ones.
///
/// Candidates are processed in parallel; the adjacency lists come out in
/// candidate input order with target indices ascending.
pub fn build_coverage_graph(
    cache: &ElevationCache,
    candidates: &[CandidateSite],
    targets: &[TargetPoint],
    freq_mhz: f64,
    options: &CoverageOptions,
) -> Result<CoverageGraph, PlanError> {
    if !(freq_mhz.is_finite() && freq_mhz > 0.0) {
        return Err(LinkError::InvalidInput(format!(
            "frequency must be positive, got {} MHz",
            freq_mhz
        ))
        .into());
    }

    validate_candidates(candidates)?;

    let mut degraded_samples = 0;
    let candidates: Vec<CandidateSite> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut c = c.clone();
            if c.id.trim().is_empty() {
                c.id = format!("cand_{}", i);
            }
            let ground = cache.get_elevation(c.lat, c.lon);
            degraded_samples += usize::from(ground.is_degraded());
            c.elevation = ground.value();
            c
        })
        .collect();

    info!(
        candidates = candidates.len(),
        targets = targets.len(),
        threads = rayon::current_num_threads(),
        "building coverage graph"
    );

    let rows = candidates
        .par_iter()
        .map(|candidate| -> Result<(Vec<usize>, usize), LinkError> {
            let from = GeoPoint::new(candidate.lat, candidate.lon);
            let from_height_m = candidate.height_m.unwrap_or(options.candidate_height_m);

            let mut covered = Vec::new();
            let mut degraded = 0;
            for (t, target) in targets.iter().enumerate() {
                let request = LinkRequest {
                    from,
                    to: GeoPoint::new(target.lat, target.lon),
                    freq_mhz,
                    from_height_m,
                    to_height_m: options.receiver_height_m,
                };
                let link = analyze_link(cache, &request, &options.link)?;
                degraded += link.degraded_samples;
                if link.status.is_usable() {
                    covered.push(t);
                }
            }
            Ok((covered, degraded))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut adjacency = Vec::with_capacity(rows.len());
    for (covered, degraded) in rows {
        adjacency.push(covered);
        degraded_samples += degraded;
    }
    if degraded_samples > 0 {
        warn!(degraded_samples, "coverage graph built on substituted terrain");
    }

    let graph = CoverageGraph {
        candidates,
        targets: targets.to_vec(),
        adjacency,
        degraded_samples,
    };
    metrics::gauge!(metric_defs::COVERAGE_GRAPH_EDGES.name).set(graph.edge_count() as f64);
    info!(edges = graph.edge_count(), "coverage graph built");
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_in_matches_half_open_range() {
        assert_eq!(steps_in(0.0, 1.0, 0.25), 4);
        assert_eq!(steps_in(0.0, 1.0, 0.3), 4);
        assert_eq!(steps_in(0.0, 0.0, 0.1), 0);
        assert_eq!(steps_in(1.0, 0.0, 0.1), 0);
    }

    #[test]
    fn test_candidate_json_defaults() {
        let c: CandidateSite = serde_json::from_str(r#"{"lat": 1.0, "lon": 2.0, "height": 25}"#).unwrap();
        assert_eq!(c.id, "");
        assert_eq!(c.height_m, Some(25.0));
        assert_eq!(c.weight, 1.0);

        let bare: CandidateSite = serde_json::from_str(r#"{"lat": 1.0, "lon": 2.0, "type": "tower"}"#).unwrap();
        assert_eq!(bare.height_m, None);
    }

    #[test]
    fn test_graph_edge_count() {
        let graph = CoverageGraph {
            candidates: vec![CandidateSite::new("a", 0.0, 0.0), CandidateSite::new("b", 0.0, 0.0)],
            targets: Vec::new(),
            adjacency: vec![vec![0, 1, 2], vec![2]],
            degraded_samples: 0,
        };
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.neighbors(1), &[2]);
        assert!(graph.neighbors(7).is_empty());
    }

    #[test]
    fn test_candidate_weight_must_be_finite_and_positive() {
        assert!(CandidateSite::new("a", 0.0, 0.0).validate().is_ok());
        for weight in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let c = CandidateSite::new("a", 0.0, 0.0).with_weight(weight);
            assert!(c.validate().is_err(), "weight {} accepted", weight);
        }
    }
}
