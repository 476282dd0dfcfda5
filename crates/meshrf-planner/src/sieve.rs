//! The sieve: find the most promising transmitter sites in a bounding box.
//!
//! Every tile touching the box is scanned for local elevation maxima; the
//! highest peaks inside the box are kept, optionally rescored by how far the
//! view reaches across the tile, and the best few are returned.

use crate::PlanError;
use meshrf_metrics::metric_defs;
use meshrf_terrain::{tiles_in_region, ElevationCache, ElevationGrid, TerrainTile, TileCoord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ray directions for the visibility score: cardinals, then diagonals.
const DIRECTIONS: [(isize, isize); 8] = [
    (0, 1),
    (0, -1),
    (1, 0),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// A lat/lon bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchRegion {
    /// South edge.
    pub min_lat: f64,
    /// West edge.
    pub min_lon: f64,
    /// North edge.
    pub max_lat: f64,
    /// East edge.
    pub max_lon: f64,
}

impl SearchRegion {
    /// Reject non-finite, out-of-range or empty boxes.
    pub fn validate(&self) -> Result<(), PlanError> {
        let values = [self.min_lat, self.min_lon, self.max_lat, self.max_lon];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PlanError::InvalidGeometry("bounding box has non-finite edges".to_string()));
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 || self.min_lon < -180.0 || self.max_lon > 180.0 {
            return Err(PlanError::InvalidGeometry(format!(
                "bounding box {:?} outside the valid coordinate range",
                values
            )));
        }
        if self.min_lat >= self.max_lat || self.min_lon >= self.max_lon {
            return Err(PlanError::InvalidGeometry(format!(
                "bounding box is empty: lat {}..{}, lon {}..{}",
                self.min_lat, self.max_lat, self.min_lon, self.max_lon
            )));
        }
        Ok(())
    }

    /// Whether a point lies inside the box (edges included).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Sieve settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SieveParams {
    /// Peaks kept after the elevation sort.
    pub top_k: usize,
    /// Sites returned.
    pub results: usize,
    /// Edge length of the local-maximum window (cells).
    pub window: usize,
    /// Longest visibility ray (cells).
    pub horizon_radius: usize,
    /// Mast height added to the site when marching visibility rays (meters).
    pub tower_offset_m: f64,
    /// Add the visibility score to the elevation score.
    pub score_visibility: bool,
    /// Metres of score per cell of visibility.
    pub visibility_weight: f64,
    /// Largest number of tiles one request may scan.
    pub max_tiles: usize,
}

impl Default for SieveParams {
    fn default() -> Self {
        Self {
            top_k: 20,
            results: 3,
            window: 3,
            horizon_radius: 50,
            tower_offset_m: 10.0,
            score_visibility: false,
            visibility_weight: 1.0,
            max_tiles: 64,
        }
    }
}

/// A recommended site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSite {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Ground elevation (meters).
    pub elevation: f64,
    /// Tile the peak was found in.
    pub tile: TileCoord,
    /// Sum of unobstructed ray lengths (cells), when visibility scoring is on.
    pub visibility: Option<u32>,
    /// Ranking score.
    pub score: f64,
}

/// Outcome of a sieve pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SieveReport {
    /// Best sites, highest score first.
    pub sites: Vec<ScoredSite>,
    /// Tiles touching the search box.
    pub tiles_scanned: usize,
    /// Tiles whose terrain could not be fetched.
    pub tiles_failed: usize,
    /// Local maxima found inside the box.
    pub candidates_found: usize,
    /// Frequency the search was run for (MHz).
    pub freq_mhz: f64,
    /// Requested antenna height (meters).
    pub height_m: f64,
}

struct Peak {
    tile: Arc<TerrainTile>,
    row: usize,
    col: usize,
    lat: f64,
    lon: f64,
    elevation: f64,
}

/// Cells equal to the maximum of their `window`×`window` neighbourhood.
///
/// The window is clipped at the grid edges; plateaus flag every tied cell.
/// Results are in row-major order.
pub fn local_maxima(grid: &ElevationGrid, window: usize) -> Vec<(usize, usize)> {
    let size = grid.size();
    let half = window.max(1) / 2;
    let values = grid.values();
    let mut peaks = Vec::new();

    for row in 0..size {
        for col in 0..size {
            let here = values[row * size + col];
            let r_range = row.saturating_sub(half)..=(row + half).min(size - 1);
            let is_peak = r_range.into_iter().all(|r| {
                let c_range = col.saturating_sub(half)..=(col + half).min(size - 1);
                c_range.into_iter().all(|c| values[r * size + c] <= here)
            });
            if is_peak {
                peaks.push((row, col));
            }
        }
    }
    peaks
}

/// Sum over eight directions of how many cells a ray travels before hitting
/// terrain at or above the site plus `tower_offset_m`, or leaving the grid.
///
/// Rays stop after `horizon_radius - 1` cells. Earth curvature is ignored.
pub fn view_score(grid: &ElevationGrid, row: usize, col: usize, tower_offset_m: f64, horizon_radius: usize) -> u32 {
    let size = grid.size() as isize;
    let Some(base) = grid.get(row, col) else {
        return 0;
    };
    let site = base as f64 + tower_offset_m;

    let mut total = 0u32;
    for (dr, dc) in DIRECTIONS {
        let (mut r, mut c) = (row as isize, col as isize);
        let mut distance = 0u32;
        for i in 1..horizon_radius {
            r += dr;
            c += dc;
            distance = i as u32;
            if r < 0 || c < 0 || r >= size || c >= size {
                break;
            }
            let target = grid.get(r as usize, c as usize).map_or(f64::NEG_INFINITY, f64::from);
            if target >= site {
                break;
            }
        }
        total += distance;
    }
    total
}

/// Scan the tiles covering `region` for the best transmitter sites.
///
/// `freq_mhz` and `height_m` describe the intended installation and are
/// echoed in the report; the ranking itself is terrain-only.
pub fn find_sites(
    cache: &ElevationCache,
    region: &SearchRegion,
    freq_mhz: f64,
    height_m: f64,
    params: &SieveParams,
) -> Result<SieveReport, PlanError> {
    region.validate()?;

    let tiles = tiles_in_region(
        region.min_lat,
        region.min_lon,
        region.max_lat,
        region.max_lon,
        cache.zoom(),
    )?;
    if tiles.is_empty() {
        return Err(PlanError::NoTilesInRegion);
    }
    if tiles.len() > params.max_tiles {
        return Err(PlanError::RegionTooLarge {
            requested: tiles.len(),
            limit: params.max_tiles,
            unit: "tiles",
        });
    }
    info!(tiles = tiles.len(), "sieve scanning tiles");

    let per_tile: Vec<Option<Vec<Peak>>> = tiles
        .par_iter()
        .map(|coord| match cache.tile(*coord) {
            Ok(tile) => Some(tile_peaks(&tile, region, params.window)),
            Err(e) => {
                warn!(tile = %coord, error = %e, "skipping unavailable tile");
                None
            }
        })
        .collect();

    let tiles_failed = per_tile.iter().filter(|p| p.is_none()).count();
    let mut peaks: Vec<Peak> = per_tile.into_iter().flatten().flatten().collect();
    let candidates_found = peaks.len();
    metrics::histogram!(metric_defs::SIEVE_CANDIDATES.name).record(candidates_found as f64);
    debug!(candidates = candidates_found, failed = tiles_failed, "collected peaks");

    peaks.sort_by(|a, b| {
        b.elevation
            .total_cmp(&a.elevation)
            .then_with(|| a.tile.coord.cmp(&b.tile.coord))
            .then_with(|| (a.row, a.col).cmp(&(b.row, b.col)))
    });
    peaks.truncate(params.top_k);

    let mut sites: Vec<ScoredSite> = peaks
        .iter()
        .map(|peak| {
            let visibility = params.score_visibility.then(|| {
                view_score(&peak.tile.grid, peak.row, peak.col, params.tower_offset_m, params.horizon_radius)
            });
            let score = peak.elevation + visibility.map_or(0.0, |v| params.visibility_weight * v as f64);
            ScoredSite {
                lat: peak.lat,
                lon: peak.lon,
                elevation: peak.elevation,
                tile: peak.tile.coord,
                visibility,
                score,
            }
        })
        .collect();

    sites.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    sites.truncate(params.results);

    Ok(SieveReport {
        sites,
        tiles_scanned: tiles.len(),
        tiles_failed,
        candidates_found,
        freq_mhz,
        height_m,
    })
}

fn tile_peaks(tile: &Arc<TerrainTile>, region: &SearchRegion, window: usize) -> Vec<Peak> {
    let bounds = tile.coord.bounds();
    let size = tile.grid.size();

    local_maxima(&tile.grid, window)
        .into_iter()
        .filter_map(|(row, col)| {
            let (lat, lon) = bounds.sample_position(row, col, size);
            if !region.contains(lat, lon) {
                return None;
            }
            Some(Peak {
                tile: Arc::clone(tile),
                row,
                col,
                lat,
                lon,
                elevation: tile.grid.get(row, col).map_or(0.0, f64::from),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(size: usize, f: impl Fn(usize, usize) -> f32) -> ElevationGrid {
        let data = (0..size * size).map(|i| f(i / size, i % size)).collect();
        ElevationGrid::new(size, data).unwrap()
    }

    #[test]
    fn test_single_interior_peak() {
        // Surface falls away from (2, 3) in every direction.
        let g = grid(5, |r, c| 50.0 - 5.0 * ((r as f32 - 2.0).abs() + (c as f32 - 3.0).abs()));
        assert_eq!(local_maxima(&g, 3), vec![(2, 3)]);
    }

    #[test]
    fn test_spike_on_flat_tile() {
        let g = grid(16, |r, c| if (r, c) == (8, 8) { 100.0 } else { 0.0 });
        let maxima = local_maxima(&g, 3);

        assert!(maxima.contains(&(8, 8)));
        for (dr, dc) in DIRECTIONS {
            let neighbour = ((8 + dr) as usize, (8 + dc) as usize);
            assert!(!maxima.contains(&neighbour), "{:?} flagged", neighbour);
        }
        // The rest of the flat tile ties with its neighbourhood.
        assert_eq!(maxima.len(), 16 * 16 - 8);

        let bounds = TileCoord::from_lat_lon(45.3, 7.2, 12).unwrap().bounds();
        let (lat, lon) = bounds.sample_position(8, 8, 16);
        assert!(bounds.contains(lat, lon));
    }

    #[test]
    fn test_edge_window_is_clipped() {
        // Ramp rising to the north-east corner: the corner is the only maximum.
        let g = grid(4, |r, c| (c as f32) - (r as f32));
        assert_eq!(local_maxima(&g, 3), vec![(0, 3)]);
    }

    #[test]
    fn test_plateau_flags_all_ties() {
        let g = grid(3, |_, _| 7.0);
        assert_eq!(local_maxima(&g, 3).len(), 9);
    }

    #[test]
    fn test_view_score_flat_grid_runs_to_edges() {
        let g = grid(5, |_, _| 0.0);
        // From the centre every ray leaves the grid after 3 steps.
        assert_eq!(view_score(&g, 2, 2, 10.0, 50), 8 * 3);
        // From a corner: 3 directions run 5 steps, 5 leave immediately.
        assert_eq!(view_score(&g, 0, 0, 10.0, 50), 3 * 5 + 5);
    }

    #[test]
    fn test_view_score_blocked_and_horizon() {
        // A wall one cell east of the site, higher than site + tower.
        let g = grid(5, |_, c| if c == 3 { 20.0 } else { 0.0 });
        let open = view_score(&g, 2, 2, 10.0, 50);
        let g_low = grid(5, |_, c| if c == 3 { 5.0 } else { 0.0 });
        assert!(view_score(&g_low, 2, 2, 10.0, 50) > open);

        // Horizon radius 2 allows a single step per ray.
        assert_eq!(view_score(&grid(9, |_, _| 0.0), 4, 4, 10.0, 2), 8);
    }

    #[test]
    fn test_region_validation() {
        let ok = SearchRegion { min_lat: 1.0, min_lon: 1.0, max_lat: 2.0, max_lon: 2.0 };
        assert!(ok.validate().is_ok());
        let flat = SearchRegion { max_lat: 1.0, ..ok };
        assert!(matches!(flat.validate(), Err(PlanError::InvalidGeometry(_))));
        let nan = SearchRegion { min_lon: f64::NAN, ..ok };
        assert!(nan.validate().is_err());
        let out = SearchRegion { max_lat: 95.0, ..ok };
        assert!(out.validate().is_err());
    }
}
