//! CLI entry point for osm2gtfs.
//!
//! Loads the configuration, optionally refreshes cached source data and
//! converts OpenStreetMap transit data into a GTFS archive.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use osm2gtfs::{
    cache::DiskCache,
    config::{ConfigOverrides, Configuration},
    creators::CreatorRegistry,
    osm::OverpassSource,
    pipeline::{self, PipelineState, RefreshScope},
    schedule,
    store::GeoDataStore,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "osm2gtfs")]
#[command(about = "Create GTFS from OpenStreetMap data", long_about = None)]
#[command(group(ArgGroup::new("refresh").multiple(false)))]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// GTFS output zip file, overriding the configured one
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Refresh OSM data for all routes
    #[arg(long, group = "refresh")]
    refresh_routes: bool,

    /// Refresh OSM data for all stops
    #[arg(long, group = "refresh")]
    refresh_stops: bool,

    /// Refresh data for time information
    #[arg(long, group = "refresh")]
    refresh_schedule_source: bool,

    /// Refresh all source data, then convert
    #[arg(long, group = "refresh")]
    refresh_all: bool,
}

impl Cli {
    fn refresh_scope(&self) -> RefreshScope {
        if self.refresh_routes {
            RefreshScope::Routes
        } else if self.refresh_stops {
            RefreshScope::Stops
        } else if self.refresh_schedule_source {
            RefreshScope::ScheduleSource
        } else if self.refresh_all {
            RefreshScope::All
        } else {
            RefreshScope::None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/osm2gtfs.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("osm2gtfs.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    if let Err(e) = convert(&cli).await {
        error!(error = %e, "Conversion failed");
        return Err(e);
    }
    Ok(())
}

#[tracing::instrument(skip(cli), fields(config = %cli.config.display()))]
async fn convert(cli: &Cli) -> Result<()> {
    let overrides = ConfigOverrides {
        output: cli.output.clone(),
    };
    let config = Configuration::load(&cli.config, &overrides)?;
    info!(selector = config.selector(), "Configuration loaded");

    let geo = OverpassSource::from_config(&config).context("cannot build Overpass client")?;
    let schedule = schedule::source_from_config(&config)?;
    let cache = DiskCache::new(&config.cache().dir, config.selector());
    let mut store = GeoDataStore::new(
        Box::new(geo),
        schedule,
        cache,
        config.cache().clone(),
    );

    let registry = CreatorRegistry::with_defaults();
    let outcome = pipeline::run(&config, &mut store, &registry, cli.refresh_scope()).await?;

    match outcome.state {
        PipelineState::DataLoaded => info!("Refresh finished"),
        _ => info!(
            archive = ?outcome.archive,
            warnings = outcome.problems.len(),
            "GTFS archive written"
        ),
    }
    Ok(())
}
