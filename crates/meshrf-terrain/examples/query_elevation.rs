//! Example: Query elevation through the tile cache.
//!
//! Usage: cargo run --example query_elevation -- <lat> <lon> [cache_dir]

use meshrf_terrain::{
    CacheConfig, ElevationCache, FileStore, OpenTopoDataSource, DEFAULT_API_URL, DEFAULT_DATASET,
};
use std::env;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <lat> <lon> [cache_dir]", args[0]);
        eprintln!("Example: {} 47.6062 -122.3321 ./tile_cache", args[0]);
        std::process::exit(1);
    }

    let lat: f64 = args[1].parse()?;
    let lon: f64 = args[2].parse()?;
    let cache_dir = args.get(3).map(|s| s.as_str()).unwrap_or("tile_cache");

    let source = OpenTopoDataSource::new(DEFAULT_API_URL, DEFAULT_DATASET)?;
    let store = FileStore::open(cache_dir)?;
    let cache = ElevationCache::new(Box::new(source), Box::new(store), CacheConfig::default())?;

    let coord = cache.tile_for_coord(lat, lon)?;
    println!("Querying elevation at ({}, {}) in tile {}...", lat, lon, coord);

    let start = Instant::now();
    let elevation = cache.get_elevation(lat, lon);
    println!(
        "Elevation: {:.2} meters{} ({:.2}s)",
        elevation.value(),
        if elevation.is_degraded() { " [degraded]" } else { "" },
        start.elapsed().as_secs_f64()
    );

    // Second query is served from memory
    let start = Instant::now();
    let again = cache.get_elevation(lat, lon);
    println!("Cached: {:.2} meters ({:.6}s)", again.value(), start.elapsed().as_secs_f64());
    println!("Stats: {:?}", cache.stats());

    Ok(())
}
