//! terrain-probe: fly a camera over synthetic terrain and watch the cache
//! refine.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use terrain_cache::TerrainCache;
use terrain_runner::{run_probe, Result, RunnerConfig, SyntheticTerrain};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "terrain-probe", version, about = "Drive the terrain cache along a scripted camera path")]
struct Args {
    /// Scenario file (YAML). Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u32>,

    /// View level reported to the cache
    #[arg(long)]
    view_level: Option<u32>,

    /// Starting latitude
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Starting longitude
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Provider latency per batch in milliseconds
    #[arg(long)]
    latency_ms: Option<u64>,

    /// Resolve on the frame thread instead of a background worker
    #[arg(long)]
    cooperative: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,

    /// Serve Prometheus metrics on this address
    #[cfg(feature = "prometheus")]
    #[arg(long)]
    metrics_addr: Option<std::net::SocketAddr>,
}

impl Args {
    /// Load the scenario file and apply command-line overrides.
    fn runner_config(&self) -> Result<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::load(path)?,
            None => RunnerConfig::default(),
        };

        let scenario = &mut config.scenario;
        if let Some(frames) = self.frames {
            scenario.frames = frames;
        }
        if let Some(view_level) = self.view_level {
            scenario.view_level = view_level;
        }
        if let Some(lat) = self.lat {
            scenario.start_lat = lat;
        }
        if let Some(lon) = self.lon {
            scenario.start_lon = lon;
        }
        if let Some(latency_ms) = self.latency_ms {
            scenario.latency_ms = latency_ms;
        }
        if self.cooperative {
            config.cache.spawn_worker = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(args: &Args) -> Result<()> {
    let config = args.runner_config()?;

    #[cfg(feature = "prometheus")]
    {
        if let Some(addr) = args.metrics_addr {
            match terrain_metrics::install_prometheus(addr) {
                Ok(()) => info!("Serving metrics on http://{}/metrics", addr),
                Err(e) => error!("Failed to start metrics exporter: {}", e),
            }
        }
    }

    let scenario = &config.scenario;
    let terrain = Arc::new(SyntheticTerrain::new(
        Duration::from_millis(scenario.latency_ms),
        scenario.sea_level_m,
    ));
    let cache = TerrainCache::new(config.cache.clone(), Arc::clone(&terrain))?;
    info!(
        "Cache '{}': max level {}, {}x{} samples per node, {}",
        config.cache.name,
        config.cache.max_level,
        config.cache.grid_subdivisions + 1,
        config.cache.grid_subdivisions + 1,
        if config.cache.spawn_worker {
            "background resolver"
        } else {
            "cooperative resolution"
        }
    );

    let report = run_probe(&cache, scenario)?;
    cache.shutdown();

    info!(
        "Provider served {} points in {} batches; {} nodes freed, terrain version {}",
        terrain.points(),
        terrain.batches(),
        report.pruned,
        report.terrain_version
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let args = Args::parse_from([
            "terrain-probe",
            "--frames",
            "12",
            "--lat",
            "-33.9",
            "--lon",
            "151.2",
            "--cooperative",
        ]);
        let config = args.runner_config().unwrap();
        assert_eq!(config.scenario.frames, 12);
        assert_eq!(config.scenario.start_lat, -33.9);
        assert_eq!(config.scenario.start_lon, 151.2);
        assert!(!config.cache.spawn_worker);
        assert_eq!(config.scenario.view_level, 12);
    }

    #[test]
    fn test_missing_config_file_fails() {
        let args = Args::parse_from(["terrain-probe", "--config", "nope/scenario.yaml"]);
        assert!(args.runner_config().is_err());
    }
}
