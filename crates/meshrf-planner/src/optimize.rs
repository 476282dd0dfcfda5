//! Greedy weighted set cover over a coverage graph.

use crate::coverage::{
    build_coverage_graph, sample_targets, validate_candidates, CandidateSite, CoverageGraph, CoverageOptions,
};
use crate::polygon::polygon_from_geojson;
use crate::PlanError;
use meshrf_link::LinkParams;
use meshrf_metrics::metric_defs;
use meshrf_terrain::ElevationCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Chosen sites and how much of the target set they cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSelection {
    /// Selected candidates in the order they were picked.
    pub selected_sites: Vec<CandidateSite>,
    /// Indices of the selected candidates in the graph's candidate list.
    pub selected_indices: Vec<usize>,
    /// Targets reached by at least one selected site.
    pub covered_targets: usize,
    /// Size of the target set.
    pub total_targets: usize,
    /// `covered_targets / total_targets`, 0 for an empty target set.
    pub coverage_fraction: f64,
}

/// Pick sites greedily by lowest `weight / newly covered targets`.
///
/// Candidates are scanned in input order with a strict `<` comparison, so the
/// earliest candidate wins among equal ratios. Stops when every target is
/// covered or no remaining candidate adds coverage.
pub fn optimize_sites(graph: &CoverageGraph) -> SiteSelection {
    let total_targets = graph.targets.len();
    let mut covered = vec![false; total_targets];
    let mut covered_count = 0usize;
    let mut chosen = vec![false; graph.candidates.len()];
    let mut selected_indices = Vec::new();

    while covered_count < total_targets {
        let mut best: Option<(usize, f64)> = None;

        for (index, candidate) in graph.candidates.iter().enumerate() {
            if chosen[index] {
                continue;
            }
            let new_cover = graph
                .neighbors(index)
                .iter()
                .filter(|t| **t < total_targets && !covered[**t])
                .count();
            if new_cover == 0 {
                continue;
            }

            let ratio = candidate.weight / new_cover as f64;
            if best.map_or(ratio < f64::INFINITY, |(_, best_ratio)| ratio < best_ratio) {
                best = Some((index, ratio));
            }
        }

        let Some((index, ratio)) = best else {
            break;
        };

        chosen[index] = true;
        selected_indices.push(index);
        for t in graph.neighbors(index) {
            if *t < total_targets && !covered[*t] {
                covered[*t] = true;
                covered_count += 1;
            }
        }
        debug!(
            candidate = %graph.candidates[index].id,
            ratio,
            covered = covered_count,
            total = total_targets,
            "selected site"
        );
    }

    let coverage_fraction = if total_targets == 0 {
        0.0
    } else {
        covered_count as f64 / total_targets as f64
    };
    metrics::gauge!(metric_defs::COVERAGE_FRACTION.name).set(coverage_fraction);

    SiteSelection {
        selected_sites: selected_indices
            .iter()
            .map(|i| graph.candidates[*i].clone())
            .collect(),
        selected_indices,
        covered_targets: covered_count,
        total_targets,
        coverage_fraction,
    }
}

// ============================================================================
// End-to-end planning
// ============================================================================

/// Settings for [`plan_network`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerParams {
    /// Spacing of the target grid (meters).
    pub target_spacing_m: f64,
    /// Antenna height for candidates that do not specify one (meters).
    pub candidate_height_m: f64,
    /// Receiver antenna height at targets (meters).
    pub receiver_height_m: f64,
    /// Link analysis constants.
    pub link: LinkParams,
}

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            target_spacing_m: 200.0,
            candidate_height_m: 10.0,
            receiver_height_m: 2.0,
            link: LinkParams::default(),
        }
    }
}

impl PlannerParams {
    /// Coverage options derived from these settings.
    pub fn coverage_options(&self) -> CoverageOptions {
        CoverageOptions {
            candidate_height_m: self.candidate_height_m,
            receiver_height_m: self.receiver_height_m,
            link: self.link.clone(),
        }
    }
}

/// Result of [`plan_network`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPlan {
    /// Site selection over the sampled targets.
    #[serde(flatten)]
    pub selection: SiteSelection,
    /// Candidate→target edges in the coverage graph.
    pub edge_count: usize,
    /// Elevation samples behind the plan that rest on substituted terrain.
    pub degraded_samples: usize,
}

/// Sample targets inside a GeoJSON polygon, build the coverage graph for the
/// candidates and select sites.
pub fn plan_network(
    cache: &ElevationCache,
    polygon: &Value,
    candidates: &[CandidateSite],
    freq_mhz: f64,
    params: &PlannerParams,
) -> Result<NetworkPlan, PlanError> {
    let polygon = polygon_from_geojson(polygon)?;
    validate_candidates(candidates)?;

    let targets = sample_targets(cache, &polygon, params.target_spacing_m)?;
    info!(targets = targets.len(), "sampled target points");

    let graph = build_coverage_graph(cache, candidates, &targets, freq_mhz, &params.coverage_options())?;
    let selection = optimize_sites(&graph);
    info!(
        selected = selection.selected_sites.len(),
        coverage = selection.coverage_fraction,
        "optimization complete"
    );

    Ok(NetworkPlan {
        selection,
        edge_count: graph.edge_count(),
        degraded_samples: graph.degraded_samples,
    })
}
