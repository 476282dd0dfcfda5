//! Site sieve and network planning over synthetic terrain.

use approx::assert_abs_diff_eq;
use meshrf_planner::{
    build_coverage_graph, find_sites, plan_network, polygon_from_geojson, sample_targets, CandidateSite,
    PlanError, PlannerParams, SearchRegion, SieveParams,
};
use meshrf_terrain::{flat_source, ElevationCache, FnSource, TileBounds, TileCoord, GRID_SIZE};
use serde_json::json;

fn peak_tile() -> TileCoord {
    TileCoord::from_lat_lon(45.3, 7.2, 12).unwrap()
}

/// A cone with its apex on grid cell (`row`, `col`) of `tile`.
fn cone_cache(tile: TileCoord, row: usize, col: usize) -> (ElevationCache, f64, f64) {
    let (peak_lat, peak_lon) = tile.bounds().sample_position(row, col, GRID_SIZE);
    let cache = ElevationCache::in_memory(FnSource::new(move |lat, lon| {
        1000.0 - 20_000.0 * (lat - peak_lat).hypot(lon - peak_lon)
    }));
    (cache, peak_lat, peak_lon)
}

fn inset(bounds: TileBounds, by: f64) -> SearchRegion {
    SearchRegion {
        min_lat: bounds.min_lat + by,
        min_lon: bounds.min_lon + by,
        max_lat: bounds.max_lat - by,
        max_lon: bounds.max_lon - by,
    }
}

// ============================================================================
// Sieve
// ============================================================================

#[test]
fn test_sieve_finds_peak_with_north_up_orientation() {
    let tile = peak_tile();
    let (cache, peak_lat, peak_lon) = cone_cache(tile, 3, 9);

    let report = find_sites(&cache, &inset(tile.bounds(), 1e-6), 915.0, 10.0, &SieveParams::default()).unwrap();

    assert_eq!(report.tiles_scanned, 1);
    assert_eq!(report.tiles_failed, 0);
    assert_eq!(report.candidates_found, 1);
    assert_eq!(report.freq_mhz, 915.0);
    assert_eq!(report.height_m, 10.0);

    let best = &report.sites[0];
    assert_eq!(best.tile, tile);
    assert_abs_diff_eq!(best.lat, peak_lat, epsilon = 1e-9);
    assert_abs_diff_eq!(best.lon, peak_lon, epsilon = 1e-9);
    assert_abs_diff_eq!(best.elevation, 1000.0, epsilon = 1e-3);
    assert_eq!(best.visibility, None);
    assert_eq!(best.score, best.elevation);
    // Row 3 lies in the northern half of the tile.
    assert!(best.lat > (tile.bounds().min_lat + tile.bounds().max_lat) / 2.0);
}

#[test]
fn test_sieve_excludes_peaks_outside_box() {
    let tile = peak_tile();
    let (cache, peak_lat, _) = cone_cache(tile, 3, 9);

    // Cut the box south of the apex.
    let mut region = inset(tile.bounds(), 1e-6);
    region.max_lat = peak_lat - 1e-4;

    let report = find_sites(&cache, &region, 915.0, 10.0, &SieveParams::default()).unwrap();
    assert_eq!(report.candidates_found, 0);
    assert!(report.sites.is_empty());
}

#[test]
fn test_sieve_ranks_by_elevation_and_limits_results() {
    let tile = peak_tile();
    let bounds = tile.bounds();
    let peaks: Vec<(f64, f64, f64)> = [(2, 2, 900.0), (8, 12, 950.0), (12, 4, 800.0), (13, 13, 700.0)]
        .iter()
        .map(|(r, c, h)| {
            let (lat, lon) = bounds.sample_position(*r, *c, GRID_SIZE);
            (lat, lon, *h)
        })
        .collect();
    let cache = ElevationCache::in_memory(FnSource::new(move |lat, lon| {
        peaks
            .iter()
            .map(|(plat, plon, h)| h - 40_000.0 * (lat - plat).hypot(lon - plon))
            .fold(0.0, f64::max)
    }));

    let report = find_sites(&cache, &inset(bounds, 1e-6), 433.0, 5.0, &SieveParams::default()).unwrap();

    let elevations: Vec<f64> = report.sites.iter().map(|s| s.elevation.round()).collect();
    assert_eq!(elevations, vec![950.0, 900.0, 800.0]);
    assert!(report.candidates_found >= 4);
}

#[test]
fn test_sieve_visibility_adds_to_score() {
    let tile = peak_tile();
    let (cache, _, _) = cone_cache(tile, 7, 7);
    let params = SieveParams {
        score_visibility: true,
        ..SieveParams::default()
    };

    let report = find_sites(&cache, &inset(tile.bounds(), 1e-6), 915.0, 10.0, &params).unwrap();
    let best = &report.sites[0];
    let visibility = best.visibility.unwrap();
    assert!(visibility > 0);
    assert_abs_diff_eq!(best.score, best.elevation + visibility as f64, epsilon = 1e-9);
}

#[test]
fn test_sieve_skips_failed_tiles() {
    let west = peak_tile();
    let east = TileCoord::new(12, west.x + 1, west.y).unwrap();
    let (east_bounds, west_bounds) = (east.bounds(), west.bounds());
    let cutoff = (east_bounds.min_lon + east_bounds.max_lon) / 2.0;

    let (apex_lat, apex_lon) = west_bounds.sample_position(5, 5, GRID_SIZE);
    let source = FnSource::new(move |lat: f64, lon: f64| 500.0 - 20_000.0 * (lat - apex_lat).hypot(lon - apex_lon));
    let cache = ElevationCache::in_memory(FailingAbove { inner: source, cutoff });

    let region = SearchRegion {
        min_lat: west_bounds.min_lat + 1e-6,
        min_lon: west_bounds.min_lon + 1e-6,
        max_lat: west_bounds.max_lat - 1e-6,
        max_lon: east_bounds.max_lon - 1e-6,
    };
    let report = find_sites(&cache, &region, 915.0, 10.0, &SieveParams::default()).unwrap();

    assert_eq!(report.tiles_scanned, 2);
    assert_eq!(report.tiles_failed, 1);
    assert_abs_diff_eq!(report.sites[0].lat, apex_lat, epsilon = 1e-9);
    assert_abs_diff_eq!(report.sites[0].lon, apex_lon, epsilon = 1e-9);
}

/// Fails any batch containing a point east of `cutoff`.
struct FailingAbove<S> {
    inner: S,
    cutoff: f64,
}

impl<S: meshrf_terrain::ElevationSource> meshrf_terrain::ElevationSource for FailingAbove<S> {
    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }

    fn fetch_batch(&self, points: &[(f64, f64)]) -> meshrf_terrain::Result<Vec<f64>> {
        if points.iter().any(|(_, lon)| *lon > self.cutoff) {
            return Err(meshrf_terrain::TerrainError::MalformedResponse("no data".to_string()));
        }
        self.inner.fetch_batch(points)
    }
}

#[test]
fn test_sieve_rejects_bad_regions() {
    let cache = ElevationCache::in_memory(flat_source(0.0));
    let bounds = peak_tile().bounds();

    let empty = SearchRegion {
        min_lat: 1.0,
        min_lon: 1.0,
        max_lat: 1.0,
        max_lon: 2.0,
    };
    assert!(matches!(
        find_sites(&cache, &empty, 915.0, 10.0, &SieveParams::default()),
        Err(PlanError::InvalidGeometry(_))
    ));

    let wide = SearchRegion {
        min_lat: bounds.min_lat + 1e-6,
        min_lon: bounds.min_lon + 1e-6,
        max_lat: bounds.max_lat - 1e-6,
        max_lon: bounds.max_lon + 0.01,
    };
    let params = SieveParams {
        max_tiles: 1,
        ..SieveParams::default()
    };
    assert!(matches!(
        find_sites(&cache, &wide, 915.0, 10.0, &params),
        Err(PlanError::RegionTooLarge { requested: 2, limit: 1, .. })
    ));
}

// ============================================================================
// Coverage planning
// ============================================================================

fn square(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> serde_json::Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [min_lon, min_lat], [max_lon, min_lat], [max_lon, max_lat], [min_lon, max_lat], [min_lon, min_lat]
        ]]
    })
}

#[test]
fn test_target_sampling_ids_and_order() {
    let cache = ElevationCache::in_memory(flat_source(12.0));
    let polygon = polygon_from_geojson(&square(0.0, 0.0, 0.01, 0.01)).unwrap();

    let targets = sample_targets(&cache, &polygon, 222.0).unwrap();
    // Step 0.002°: five columns and rows, the first of each on the boundary.
    assert_eq!(targets.len(), 16);
    assert_eq!(targets[0].id, "tgt_0");
    assert_eq!(targets[15].id, "tgt_15");
    // Latitude varies fastest.
    assert_abs_diff_eq!(targets[0].lon, targets[1].lon, epsilon = 1e-12);
    assert!(targets[1].lat > targets[0].lat);
    assert!(targets.iter().all(|t| (t.elevation - 12.0).abs() < 1e-9));
}

#[test]
fn test_flat_plan_picks_cheapest_full_cover() {
    let cache = ElevationCache::in_memory(flat_source(0.0));
    let candidates = vec![
        CandidateSite::new("", 0.005, 0.005).with_weight(5.0),
        CandidateSite::new("", 0.005, 0.006),
    ];

    let plan = plan_network(
        &cache,
        &square(0.0, 0.0, 0.01, 0.01),
        &candidates,
        915.0,
        &PlannerParams::default(),
    )
    .unwrap();

    assert_eq!(plan.selection.selected_indices, vec![1]);
    assert_eq!(plan.selection.selected_sites[0].id, "cand_1");
    assert_eq!(plan.selection.coverage_fraction, 1.0);
    assert_eq!(plan.selection.covered_targets, plan.selection.total_targets);
    assert_eq!(plan.edge_count, 2 * plan.selection.total_targets);
}

#[test]
fn test_ridge_needs_a_site_on_each_side() {
    // 500 m ridge running north-south through lon 0.05.
    let cache = ElevationCache::in_memory(FnSource::new(|_lat, lon| {
        500.0 * (-((lon - 0.05) / 0.01).powi(2)).exp()
    }));
    let polygon = square(0.02, 0.0, 0.08, 0.01);
    let candidates = vec![
        CandidateSite::new("west", 0.005, 0.02),
        CandidateSite::new("east", 0.005, 0.08),
    ];
    let params = PlannerParams::default();

    let targets = sample_targets(&cache, &polygon_from_geojson(&polygon).unwrap(), params.target_spacing_m).unwrap();
    let graph = build_coverage_graph(&cache, &candidates, &targets, 915.0, &params.coverage_options()).unwrap();

    let westmost = (0..targets.len())
        .min_by(|a, b| targets[*a].lon.total_cmp(&targets[*b].lon))
        .unwrap();
    let eastmost = (0..targets.len())
        .max_by(|a, b| targets[*a].lon.total_cmp(&targets[*b].lon))
        .unwrap();
    assert!(graph.neighbors(0).contains(&westmost));
    assert!(!graph.neighbors(0).contains(&eastmost));
    assert!(graph.neighbors(1).contains(&eastmost));
    assert!(!graph.neighbors(1).contains(&westmost));

    let plan = plan_network(&cache, &polygon, &candidates, 915.0, &params).unwrap();
    let mut chosen = plan.selection.selected_indices.clone();
    chosen.sort_unstable();
    assert_eq!(chosen, vec![0, 1]);
    assert!(plan.selection.selected_sites.iter().all(|s| s.elevation < 1.0));
}

#[test]
fn test_plan_rejects_bad_input() {
    let cache = ElevationCache::in_memory(flat_source(0.0));
    let candidates = vec![CandidateSite::new("a", 0.005, 0.005)];

    let line = json!({"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]});
    assert!(matches!(
        plan_network(&cache, &line, &candidates, 915.0, &PlannerParams::default()),
        Err(PlanError::InvalidGeometry(_))
    ));

    assert!(matches!(
        plan_network(&cache, &square(0.0, 0.0, 0.01, 0.01), &candidates, -1.0, &PlannerParams::default()),
        Err(PlanError::Link(_))
    ));

    let huge = PlannerParams {
        target_spacing_m: 1.0,
        ..PlannerParams::default()
    };
    assert!(matches!(
        plan_network(&cache, &square(0.0, 0.0, 1.0, 1.0), &candidates, 915.0, &huge),
        Err(PlanError::RegionTooLarge { .. })
    ));

    let costless = vec![candidates[0].clone(), CandidateSite::new("b", 0.005, 0.006).with_weight(f64::NAN)];
    assert!(matches!(
        plan_network(&cache, &square(0.0, 0.0, 0.01, 0.01), &costless, 915.0, &PlannerParams::default()),
        Err(PlanError::InvalidCandidate { index: 1, .. })
    ));
}

#[test]
fn test_plan_counts_degraded_samples() {
    let polygon = square(0.0, 0.0, 0.01, 0.01);
    let candidates = vec![CandidateSite::new("a", 0.005, 0.005)];

    let healthy = ElevationCache::in_memory(flat_source(0.0));
    let plan = plan_network(&healthy, &polygon, &candidates, 915.0, &PlannerParams::default()).unwrap();
    assert_eq!(plan.degraded_samples, 0);

    let offline = ElevationCache::in_memory(FailingAbove {
        inner: flat_source(0.0),
        cutoff: -180.0,
    });
    let plan = plan_network(&offline, &polygon, &candidates, 915.0, &PlannerParams::default()).unwrap();
    assert!(plan.degraded_samples > 0);
}

#[test]
fn test_empty_target_set_has_zero_coverage() {
    let cache = ElevationCache::in_memory(flat_source(0.0));
    // Spacing wider than the polygon: the only grid point is the boundary corner.
    let plan = plan_network(
        &cache,
        &square(0.0, 0.0, 0.001, 0.001),
        &[CandidateSite::new("a", 0.0005, 0.0005)],
        915.0,
        &PlannerParams::default(),
    )
    .unwrap();
    assert_eq!(plan.selection.total_targets, 0);
    assert_eq!(plan.selection.coverage_fraction, 0.0);
    assert!(plan.selection.selected_sites.is_empty());
}
