//! # meshrf-link
//!
//! Radio link viability over real terrain.
//!
//! Given two coordinates, antenna heights and a frequency, [`analyze_link`]
//! samples the terrain along the great-circle path from an
//! [`ElevationCache`](meshrf_terrain::ElevationCache), raises it by the earth
//! bulge for an effective earth radius factor, and measures how much of the
//! first Fresnel zone is clear of the straight line of sight.
//!
//! ## Status
//!
//! | Minimum clearance ratio | Status |
//! |-------------------------|--------|
//! | `< 0` | [`LinkStatus::Blocked`] |
//! | `< 0.6` | [`LinkStatus::Degraded`] |
//! | otherwise | [`LinkStatus::Viable`] |
//!
//! Path loss is reported as free-space loss only.

mod analyze;
mod error;
mod geodesy;

pub use analyze::{
    analyze_link, earth_bulge, free_space_path_loss, fresnel_radius, LinkParams, LinkRequest,
    LinkResult, LinkStatus, ProfileSample, TerrainProfile, SPEED_OF_LIGHT_M_S,
};
pub use error::LinkError;
pub use geodesy::{haversine_distance, intermediate_point, GeoPoint, EARTH_RADIUS_M};
