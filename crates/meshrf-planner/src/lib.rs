//! # meshrf-planner
//!
//! Network planning on top of [`meshrf_link`]:
//!
//! - [`find_sites`] sieves the tiles covering a bounding box for local
//!   elevation maxima and ranks the best transmitter sites.
//! - [`sample_targets`] grid-samples a GeoJSON polygon, and
//!   [`build_coverage_graph`] records which targets each candidate site
//!   reaches with a usable link.
//! - [`optimize_sites`] picks a low-cost set of sites by greedy weighted set
//!   cover; [`plan_network`] runs the whole pipeline.
//!
//! Coverage graphs are built in parallel on the rayon thread pool.

mod coverage;
mod error;
mod optimize;
mod polygon;
mod sieve;

pub use coverage::{
    build_coverage_graph, sample_targets, CandidateSite, CoverageGraph, CoverageOptions, TargetPoint,
    MAX_TARGET_GRID_POINTS, METERS_PER_DEGREE,
};
pub use error::PlanError;
pub use optimize::{optimize_sites, plan_network, NetworkPlan, PlannerParams, SiteSelection};
pub use polygon::polygon_from_geojson;
pub use sieve::{find_sites, local_maxima, view_score, ScoredSite, SearchRegion, SieveParams, SieveReport};
