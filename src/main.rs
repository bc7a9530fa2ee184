//! CLI entry point for the railguard transit-safety service.
//!
//! Provides subcommands for running the HTTP service, querying normalized
//! arrivals for one agency, listing supported agencies, and driving the SOS
//! failsafe end to end.

use anyhow::Result;
use clap::{Parser, Subcommand};
use railguard::agencies::{AdapterRegistry, Agency, ArrivalsQuery};
use railguard::config::AppConfig;
use railguard::emergency::{
    GeoFix, HttpBackupLogger, NoLocation, SosButton, SosContext, StaticLocation,
};
use railguard::http::{serve, AppState};
use railguard::store::{Backend, MemoryBackend, RestBackend};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "railguard")]
#[command(about = "Normalized rail arrivals and rider safety services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Bind address, overriding RAILGUARD_BIND
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Fetch normalized arrivals for one agency and station
    Arrivals {
        /// Agency id (cta, wmata, marta, mbta, mta, rtd, septa, lametro, sf511)
        agency: String,

        /// Station identifier in the agency's own scheme
        station: String,

        /// Comma-separated route filter
        #[arg(short, long)]
        routes: Option<String>,

        /// Maximum number of arrivals to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Emit the canonical JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List supported agencies and their credential status
    Agencies,
    /// Drive the SOS failsafe: press, hold through the window, activate
    Sos {
        /// City the report files under
        #[arg(long, default_value = "chicago")]
        city: String,

        /// Transit line the rider is on
        #[arg(long, default_value = "unknown")]
        line: String,

        /// Human-readable location name
        #[arg(long, default_value = "unknown")]
        location: String,

        /// Latitude to attach (with --lon) instead of a device fix
        #[arg(long)]
        lat: Option<f64>,

        /// Longitude to attach (with --lat)
        #[arg(long)]
        lon: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/railguard.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("railguard.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Serve { bind } => {
            let registry = Arc::new(AdapterRegistry::from_config(&config)?);
            let backend = build_backend(&config)?;
            let bind = bind.unwrap_or_else(|| config.bind.clone());

            serve(&bind, AppState::new(registry, backend)).await?;
        }
        Commands::Arrivals {
            agency,
            station,
            routes,
            limit,
            json,
        } => {
            let Some(agency) = Agency::from_id(&agency) else {
                anyhow::bail!(
                    "'{agency}' is not a supported agency; try one of: {}",
                    Agency::ALL
                        .iter()
                        .map(|a| a.id())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            };
            let registry = AdapterRegistry::from_config(&config)?;

            let query = ArrivalsQuery {
                station,
                routes: routes
                    .as_deref()
                    .map(|r| r.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default(),
                limit,
            };
            let arrivals = registry.arrivals(agency, &query).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&arrivals)?);
            } else if arrivals.is_empty() {
                println!("No upcoming arrivals at {}", query.station);
            } else {
                for arrival in &arrivals {
                    let delay = if arrival.delay.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", arrival.delay)
                    };
                    println!(
                        "{:<10} {:<28} {:>10}{delay}",
                        arrival.line, arrival.destination, arrival.arrival_time
                    );
                }
            }
        }
        Commands::Agencies => {
            let registry = AdapterRegistry::from_config(&config)?;
            for agency in registry.agencies() {
                let ready = registry.get(agency).map(|a| a.ready()).unwrap_or(false);
                let status = if ready { "ready" } else { "no key" };
                println!("{:<8} {:<52} [{status}]", agency.id(), agency.display_name());
            }
        }
        Commands::Sos {
            city,
            line,
            location,
            lat,
            lon,
        } => {
            let backend = build_backend(&config)?;
            let provider: Arc<dyn railguard::emergency::LocationProvider> = match (lat, lon) {
                (Some(latitude), Some(longitude)) => Arc::new(StaticLocation(GeoFix {
                    latitude,
                    longitude,
                    accuracy: None,
                })),
                _ => Arc::new(NoLocation),
            };
            let backup = match &config.backup_url {
                Some(url) => Some(Arc::new(HttpBackupLogger::new(url)?)
                    as Arc<dyn railguard::emergency::BackupLogger>),
                None => None,
            };

            let ctx = SosContext {
                reporter_id: Uuid::new_v4(),
                city,
                transit_line: line,
                location_name: location,
            };

            let mut button = SosButton::new(backend, provider, backup);
            button.press();
            info!("SOS pressed, holding");
            let report = button.hold_through(&ctx).await?;
            println!("Emergency incident recorded: {}", report.id);
        }
    }

    Ok(())
}

/// Picks the REST backend when configured, the in-memory one otherwise.
fn build_backend(config: &AppConfig) -> Result<Arc<dyn Backend>> {
    match &config.backend {
        Some(backend_config) => {
            info!(base_url = %backend_config.base_url, "Using managed backend");
            Ok(Arc::new(RestBackend::new(backend_config)?))
        }
        None => {
            warn!("No backend configured; using in-memory store");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}
