//! `meshrf` command-line entry point.
//!
//! Every subcommand prints a JSON [`ApiResponse`] on stdout; logs go to
//! stderr. The exit code is 1 when the response is an error.

use clap::{Parser, Subcommand};
use meshrf_runner::logging::init_logging;
use meshrf_runner::{
    ApiResponse, ElevationQuery, Engine, EngineConfig, LinkQuery, NetworkQuery, RunnerError, SiteSearchQuery,
    TERRAIN_TILE_SIZE,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "meshrf", author, version, about = "Terrain-aware radio link analysis and network planning")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Do not read or write the result cache
    #[arg(long, global = true)]
    no_result_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a point-to-point link
    Link {
        #[arg(long, allow_negative_numbers = true)]
        tx_lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        tx_lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        rx_lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        rx_lon: f64,
        /// Carrier frequency (MHz)
        #[arg(long, default_value_t = 915.0)]
        freq: f64,
        /// Transmitter antenna height (m)
        #[arg(long, default_value_t = 10.0)]
        tx_height: f64,
        /// Receiver antenna height (m)
        #[arg(long, default_value_t = 2.0)]
        rx_height: f64,
    },

    /// Ground elevation at a point
    Elevation {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },

    /// Rank the best transmitter sites in a bounding box
    FindSites {
        #[arg(long, allow_negative_numbers = true)]
        min_lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        min_lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        max_lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        max_lon: f64,
        #[arg(long, default_value_t = 915.0)]
        freq: f64,
        /// Antenna height (m)
        #[arg(long, default_value_t = 10.0)]
        height: f64,
    },

    /// Select sites covering a polygon from a JSON request file
    OptimizeNetwork {
        /// File holding `{ candidates, polygon, frequency_mhz, spacing_meters? }`
        #[arg(long)]
        request: PathBuf,
    },

    /// Render a tile as raw Terrain-RGB pixels
    TerrainTile {
        z: u8,
        x: u32,
        y: u32,
        /// Output edge length in pixels
        #[arg(long, default_value_t = TERRAIN_TILE_SIZE)]
        size: usize,
        /// Write pixels here and print a JSON summary; raw pixels go to stdout otherwise
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Warning: {}", e);
    }
    meshrf_metrics::describe_metrics();

    match run(cli) {
        Ok(Some(response)) => {
            let ok = response.is_success();
            match serde_json::to_string_pretty(&response) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
            if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            match serde_json::to_string_pretty(&ApiResponse::error(e.to_string())) {
                Ok(json) => println!("{}", json),
                Err(_) => eprintln!("Error: {}", e),
            }
            ExitCode::FAILURE
        }
    }
}

/// Execute one subcommand. `None` means raw output was already written.
fn run(cli: Cli) -> Result<Option<ApiResponse>, RunnerError> {
    let config = EngineConfig::resolve(cli.config.as_deref())?;
    let engine = Engine::from_config(config, !cli.no_result_cache)?;

    let response = match cli.command {
        Command::Link {
            tx_lat,
            tx_lon,
            rx_lat,
            rx_lon,
            freq,
            tx_height,
            rx_height,
        } => engine.link(&LinkQuery {
            tx_lat,
            tx_lon,
            rx_lat,
            rx_lon,
            frequency_mhz: freq,
            tx_height,
            rx_height,
        }),

        Command::Elevation { lat, lon } => engine.elevation(&ElevationQuery { lat, lon }),

        Command::FindSites {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
            freq,
            height,
        } => engine.find_sites(&SiteSearchQuery {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
            frequency_mhz: freq,
            height_meters: height,
        }),

        Command::OptimizeNetwork { request } => {
            let contents = std::fs::read_to_string(&request)?;
            let query: NetworkQuery = serde_json::from_str(&contents)?;
            engine.optimize_network(&query)
        }

        Command::TerrainTile { z, x, y, size, output } => {
            let (info, pixels) = engine.terrain_tile(z, x, y, size)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &pixels)?;
                    ApiResponse::success(serde_json::to_value(&info)?)
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&pixels)?;
                    stdout.flush()?;
                    return Ok(None);
                }
            }
        }
    };

    Ok(Some(response))
}
