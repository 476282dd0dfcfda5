//! Line-of-sight and first-Fresnel-zone clearance along a terrain profile.

use crate::geodesy::{haversine_distance, intermediate_point, GeoPoint, EARTH_RADIUS_M};
use crate::LinkError;
use meshrf_metrics::metric_defs;
use meshrf_terrain::ElevationCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Speed of light used for wavelength calculation (m/s).
pub const SPEED_OF_LIGHT_M_S: f64 = 2.99792e8;

// ============================================================================
// Parameters
// ============================================================================

/// Tunable constants of the clearance analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    /// Target spacing between profile samples (meters).
    pub step_m: f64,
    /// Effective earth radius factor.
    pub k_factor: f64,
    /// Minimum clearance ratio for a viable link (the 60% rule).
    pub viable_ratio: f64,
    /// Fresnel radius reported at the endpoints (meters).
    pub min_fresnel_radius_m: f64,
    /// Samples closer than this to either end are excluded from the minimum (meters).
    pub endpoint_exclusion_m: f64,
    /// Ratio reported when no interior sample exists.
    pub unobstructed_ratio: f64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            step_m: 30.0,
            k_factor: 1.333,
            viable_ratio: 0.6,
            min_fresnel_radius_m: 0.1,
            endpoint_exclusion_m: 1.0,
            unobstructed_ratio: 100.0,
        }
    }
}

// ============================================================================
// Request / result types
// ============================================================================

/// A link to analyze.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRequest {
    /// Transmitter position.
    pub from: GeoPoint,
    /// Receiver position.
    pub to: GeoPoint,
    /// Carrier frequency in MHz.
    pub freq_mhz: f64,
    /// Transmit antenna height above ground (meters).
    pub from_height_m: f64,
    /// Receive antenna height above ground (meters).
    pub to_height_m: f64,
}

impl LinkRequest {
    /// Check ranges; every analysis starts here.
    pub fn validate(&self) -> Result<(), LinkError> {
        if !self.from.is_valid() {
            return Err(LinkError::InvalidInput(format!(
                "transmitter position ({}, {}) out of range",
                self.from.lat, self.from.lon
            )));
        }
        if !self.to.is_valid() {
            return Err(LinkError::InvalidInput(format!(
                "receiver position ({}, {}) out of range",
                self.to.lat, self.to.lon
            )));
        }
        if !(self.freq_mhz.is_finite() && self.freq_mhz > 0.0) {
            return Err(LinkError::InvalidInput(format!(
                "frequency must be positive, got {} MHz",
                self.freq_mhz
            )));
        }
        for (name, h) in [("from_height_m", self.from_height_m), ("to_height_m", self.to_height_m)] {
            if !(h.is_finite() && h >= 0.0) {
                return Err(LinkError::InvalidInput(format!(
                    "{} must be a non-negative height, got {}",
                    name, h
                )));
            }
        }
        Ok(())
    }
}

/// Link viability classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// At least the viability ratio of the first Fresnel zone is clear everywhere.
    Viable,
    /// Line of sight exists but the Fresnel zone is partly obstructed.
    Degraded,
    /// Terrain (with earth bulge) cuts the line of sight.
    Blocked,
}

impl LinkStatus {
    /// Classify a minimum clearance ratio.
    pub fn classify(min_clearance_ratio: f64, viable_ratio: f64) -> Self {
        if min_clearance_ratio < 0.0 {
            LinkStatus::Blocked
        } else if min_clearance_ratio < viable_ratio {
            LinkStatus::Degraded
        } else {
            LinkStatus::Viable
        }
    }

    /// Lowercase label used in reports and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Viable => "viable",
            LinkStatus::Degraded => "degraded",
            LinkStatus::Blocked => "blocked",
        }
    }

    /// Whether the link counts for coverage (viable or degraded).
    pub fn is_usable(&self) -> bool {
        !matches!(self, LinkStatus::Blocked)
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One terrain sample along the path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileSample {
    /// Distance from the transmitter (meters).
    pub distance_m: f64,
    /// Ground elevation (meters).
    pub elevation_m: f64,
    /// The elevation rests on substituted data.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// Terrain elevations sampled along the great-circle path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainProfile {
    /// Samples in order from transmitter to receiver.
    pub samples: Vec<ProfileSample>,
}

impl TerrainProfile {
    /// Sample `max(2, floor(distance / step))` evenly spaced points from `from`
    /// to `to`. Coincident endpoints produce a single sample at distance 0.
    pub fn extract(cache: &ElevationCache, from: GeoPoint, to: GeoPoint, step_m: f64) -> Self {
        let distance_m = haversine_distance(from, to);

        if distance_m == 0.0 {
            let elevation = cache.get_elevation(from.lat, from.lon);
            return Self {
                samples: vec![ProfileSample {
                    distance_m: 0.0,
                    elevation_m: elevation.value(),
                    degraded: elevation.is_degraded(),
                }],
            };
        }

        let num_points = ((distance_m / step_m).floor() as usize).max(2);
        let last = (num_points - 1) as f64;

        let samples = (0..num_points)
            .map(|i| {
                let fraction = i as f64 / last;
                let point = intermediate_point(from, to, fraction);
                let elevation = cache.get_elevation(point.lat, point.lon);
                ProfileSample {
                    distance_m: fraction * distance_m,
                    elevation_m: elevation.value(),
                    degraded: elevation.is_degraded(),
                }
            })
            .collect();

        Self { samples }
    }

    /// Samples whose elevation rests on substituted data.
    pub fn degraded_samples(&self) -> usize {
        self.samples.iter().filter(|s| s.degraded).count()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the profile has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Elevations only.
    pub fn elevations(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.elevation_m).collect()
    }
}

/// Outcome of a link analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkResult {
    /// Great-circle distance (km).
    pub distance_km: f64,
    /// Viability classification.
    pub status: LinkStatus,
    /// Smallest clearance / Fresnel-radius ratio over interior samples.
    pub min_clearance_ratio: f64,
    /// Index of the sample that set the minimum, if any interior sample exists.
    pub worst_sample: Option<usize>,
    /// Free-space path loss (dB).
    pub path_loss_db: f64,
    /// Terrain profile the verdict was computed from.
    pub profile: TerrainProfile,
    /// Profile samples that rest on substituted data.
    pub degraded_samples: usize,
}

// ============================================================================
// Physics
// ============================================================================

/// First Fresnel zone radius at a point `d1` from one end and `d2` from the
/// other, for a path of `distance_m` at `freq_mhz`.
pub fn fresnel_radius(distance_m: f64, freq_mhz: f64, d1: f64, d2: f64) -> f64 {
    let wavelength = SPEED_OF_LIGHT_M_S / (freq_mhz * 1e6);
    (wavelength * d1 * d2 / distance_m).sqrt()
}

/// Height the earth rises above the chord at a point `d1`/`d2` from the ends.
pub fn earth_bulge(d1: f64, d2: f64, k_factor: f64) -> f64 {
    d1 * d2 / (2.0 * k_factor * EARTH_RADIUS_M)
}

/// Free-space path loss in dB. Zero below 1 m.
pub fn free_space_path_loss(distance_m: f64, freq_mhz: f64) -> f64 {
    let distance_km = distance_m / 1000.0;
    if distance_km < 0.001 {
        return 0.0;
    }
    20.0 * distance_km.log10() + 20.0 * freq_mhz.log10() + 32.44
}

// ============================================================================
// Analysis
// ============================================================================

/// Analyze a link between two points over cached terrain.
///
/// The LOS reference is the straight line from the transmitter antenna to the
/// receiver antenna; terrain is raised by the earth bulge before comparing.
/// Clearance at each interior sample is divided by the first Fresnel radius
/// and the minimum decides the status.
pub fn analyze_link(
    cache: &ElevationCache,
    request: &LinkRequest,
    params: &LinkParams,
) -> Result<LinkResult, LinkError> {
    request.validate()?;
    if !(params.step_m.is_finite() && params.step_m > 0.0) {
        return Err(LinkError::InvalidInput(format!(
            "profile step must be positive, got {}",
            params.step_m
        )));
    }

    let distance_m = haversine_distance(request.from, request.to);
    let profile = TerrainProfile::extract(cache, request.from, request.to, params.step_m);
    let degraded_samples = profile.degraded_samples();

    let (min_clearance_ratio, worst_sample) = clearance_minimum(&profile, distance_m, request, params);
    let status = LinkStatus::classify(min_clearance_ratio, params.viable_ratio);

    metrics::counter!(metric_defs::LINKS_ANALYZED.name, "status" => status.as_str()).increment(1);
    metrics::histogram!(metric_defs::PROFILE_SAMPLES.name).record(profile.len() as f64);
    debug!(
        distance_m,
        samples = profile.len(),
        degraded = degraded_samples,
        min_clearance_ratio,
        %status,
        "analyzed link"
    );

    Ok(LinkResult {
        distance_km: distance_m / 1000.0,
        status,
        min_clearance_ratio,
        worst_sample,
        path_loss_db: free_space_path_loss(distance_m, request.freq_mhz),
        degraded_samples,
        profile,
    })
}

fn clearance_minimum(
    profile: &TerrainProfile,
    distance_m: f64,
    request: &LinkRequest,
    params: &LinkParams,
) -> (f64, Option<usize>) {
    let mut min_ratio = params.unobstructed_ratio;
    let mut worst = None;

    let (first, last) = match (profile.samples.first(), profile.samples.last()) {
        (Some(first), Some(last)) if profile.len() >= 2 => (first, last),
        _ => return (min_ratio, worst),
    };

    let tx_alt = first.elevation_m + request.from_height_m;
    let rx_alt = last.elevation_m + request.to_height_m;
    let steps = (profile.len() - 1) as f64;

    for (i, sample) in profile.samples.iter().enumerate() {
        let d1 = sample.distance_m;
        let d2 = distance_m - d1;
        if d1 < params.endpoint_exclusion_m || d2 < params.endpoint_exclusion_m {
            continue;
        }

        let los = tx_alt + (rx_alt - tx_alt) * (i as f64 / steps);
        let terrain = sample.elevation_m + earth_bulge(d1, d2, params.k_factor);
        let radius = fresnel_radius(distance_m, request.freq_mhz, d1, d2).max(params.min_fresnel_radius_m);
        let ratio = (los - terrain) / radius;

        if ratio < min_ratio {
            min_ratio = ratio;
            worst = Some(i);
        }
    }

    (min_ratio, worst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(LinkStatus::classify(-0.01, 0.6), LinkStatus::Blocked);
        assert_eq!(LinkStatus::classify(0.0, 0.6), LinkStatus::Degraded);
        assert_eq!(LinkStatus::classify(0.59, 0.6), LinkStatus::Degraded);
        assert_eq!(LinkStatus::classify(0.6, 0.6), LinkStatus::Viable);
        assert_eq!(LinkStatus::classify(100.0, 0.6), LinkStatus::Viable);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(LinkStatus::Degraded.to_string(), "degraded");
        assert!(LinkStatus::Degraded.is_usable());
        assert!(!LinkStatus::Blocked.is_usable());
    }

    #[test]
    fn test_fresnel_radius_midpoint() {
        // 10 km at 1 GHz: sqrt(0.299792 * 5000 * 5000 / 10000) ≈ 27.38 m
        assert_abs_diff_eq!(fresnel_radius(10_000.0, 1000.0, 5000.0, 5000.0), 27.377, epsilon = 1e-3);
    }

    #[test]
    fn test_fresnel_radius_decreases_with_frequency() {
        let low = fresnel_radius(5000.0, 433.0, 1000.0, 4000.0);
        let high = fresnel_radius(5000.0, 2400.0, 1000.0, 4000.0);
        assert!(high < low);
    }

    #[test]
    fn test_earth_bulge_midpoint() {
        // 10 km path, k = 1.333: 5000² / (2 · 1.333 · 6371000) ≈ 1.472 m
        assert_abs_diff_eq!(earth_bulge(5000.0, 5000.0, 1.333), 1.4718, epsilon = 1e-4);
        assert_eq!(earth_bulge(0.0, 10_000.0, 1.333), 0.0);
    }

    #[test]
    fn test_free_space_path_loss() {
        assert_abs_diff_eq!(free_space_path_loss(10_000.0, 915.0), 111.668, epsilon = 1e-3);
        assert_eq!(free_space_path_loss(0.5, 915.0), 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let good = LinkRequest {
            from: GeoPoint::new(45.0, -122.0),
            to: GeoPoint::new(45.1, -122.0),
            freq_mhz: 915.0,
            from_height_m: 10.0,
            to_height_m: 2.0,
        };
        assert!(good.validate().is_ok());

        let cases = [
            LinkRequest { from: GeoPoint::new(91.0, 0.0), ..good.clone() },
            LinkRequest { to: GeoPoint::new(0.0, 181.0), ..good.clone() },
            LinkRequest { freq_mhz: 0.0, ..good.clone() },
            LinkRequest { freq_mhz: f64::NAN, ..good.clone() },
            LinkRequest { from_height_m: -1.0, ..good.clone() },
            LinkRequest { to_height_m: f64::INFINITY, ..good.clone() },
        ];
        for case in cases {
            assert!(matches!(case.validate(), Err(LinkError::InvalidInput(_))), "{:?}", case);
        }
    }

    #[test]
    fn test_default_params() {
        let params = LinkParams::default();
        assert_eq!(params.step_m, 30.0);
        assert_eq!(params.k_factor, 1.333);
        assert_eq!(params.viable_ratio, 0.6);
        assert_eq!(params.unobstructed_ratio, 100.0);
    }
}
