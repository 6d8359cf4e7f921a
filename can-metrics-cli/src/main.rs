//! CAN Metrics CLI Application
//!
//! Command-line shell over the can-metrics library. It loads a config.toml
//! describing the store, the DBC file of each protocol and the vehicles with
//! their candump recordings, then runs one operation and prints JSON:
//! - `process`: decode recordings and store them as metric records
//! - `catalog`: every signal ever seen for a vehicle, by category
//! - `snapshot`: latest values, optionally filtered
//! - `history`: values of named signals across recent records
//! - `inspect`: summary of a protocol's DBC definitions
//! - `export`: decode a recording to CSV without storing it

use anyhow::{Context, Result};
use can_metrics::{
    Category, MetricsError, MetricsService, SnapshotFilter, DEFAULT_HISTORY_LIMIT,
};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod export;

/// CAN Metrics - Decode CAN recordings into queryable vehicle metrics
#[derive(Parser, Debug)]
#[command(name = "can-metrics")]
#[command(about = "Decode CAN recordings into queryable vehicle metrics", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode recordings and store the results (all vehicles if none given)
    Process {
        #[arg(value_name = "VEHICLE")]
        vehicles: Vec<String>,
    },
    /// List every signal observed for a vehicle, grouped by category
    Catalog {
        vehicle: String,
    },
    /// Show the latest stored values for a vehicle
    Snapshot {
        vehicle: String,

        /// Signal names to include (comma separated)
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,

        /// Categories to include (comma separated)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
    },
    /// Show values of signals across the most recent records
    History {
        vehicle: String,

        /// Signal names (comma separated)
        #[arg(long, value_delimiter = ',', required = true)]
        metrics: Vec<String>,

        /// Maximum number of records
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Summarize the DBC definitions of a protocol
    Inspect {
        protocol: String,
    },
    /// Decode a vehicle's recording to CSV without storing it
    Export {
        vehicle: String,

        /// Signal names to export (comma separated, default all)
        #[arg(long, value_delimiter = ',')]
        signals: Vec<String>,

        /// Output file (default: <VEHICLE>-decoded.csv)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Metrics CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using metrics library v{}", can_metrics::VERSION);

    log::info!("Loading configuration from: {:?}", args.config);
    let config = config::load_config(&args.config)?;
    log::debug!(
        "Configuration loaded: {} protocols, {} vehicles",
        config.protocols.len(),
        config.vehicles.len()
    );

    let store = config.store.open().context("Failed to open metrics store")?;
    let service = MetricsService::new(
        config.registry(),
        config.dbc_source(),
        config.recording_source(),
        Arc::new(store),
    )
    .with_config(config.pipeline.clone());

    let ok = match &args.command {
        Command::Process { vehicles } => process_mode(&service, vehicles)?,
        Command::Catalog { vehicle } => respond(service.catalog(vehicle))?,
        Command::Snapshot {
            vehicle,
            metrics,
            categories,
        } => {
            let filter = SnapshotFilter::new()
                .with_names(metrics.iter().cloned())
                .with_categories(parse_categories(categories)?);
            respond(service.snapshot(vehicle, &filter))?
        }
        Command::History {
            vehicle,
            metrics,
            limit,
        } => respond(service.history(vehicle, metrics, *limit))?,
        Command::Inspect { protocol } => respond(inspect(&service, protocol))?,
        Command::Export {
            vehicle,
            signals,
            output,
        } => export_mode(&service, vehicle, signals, output.as_deref())?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Process vehicles in parallel; the store serializes the writes
fn process_mode(service: &MetricsService, vehicles: &[String]) -> Result<bool> {
    let targets: Vec<String> = if vehicles.is_empty() {
        service.registry().ids().map(str::to_string).collect()
    } else {
        vehicles.to_vec()
    };

    let results: Vec<(String, can_metrics::Result<_>)> = targets
        .par_iter()
        .map(|vehicle| (vehicle.clone(), service.process(vehicle)))
        .collect();

    let mut ok = true;
    let mut report = Vec::with_capacity(results.len());
    for (vehicle, result) in results {
        match result {
            Ok(summary) => {
                if summary.warnings.warnings() > 0 {
                    log::warn!(
                        "Vehicle '{}': {} frames skipped or rejected",
                        vehicle,
                        summary.warnings.warnings()
                    );
                }
                report.push(serde_json::to_value(&summary)?);
            }
            Err(e) => {
                log::error!("Processing '{}' failed: {}", vehicle, e);
                ok = false;
                let mut body = error_body(&e);
                body["vehicle"] = json!(vehicle);
                report.push(body);
            }
        }
    }

    print_json(&report)?;
    Ok(ok)
}

fn export_mode(
    service: &MetricsService,
    vehicle: &str,
    signals: &[String],
    output: Option<&Path>,
) -> Result<bool> {
    let session = match service.decode(vehicle, signals) {
        Ok(session) => session,
        Err(e) => return respond::<()>(Err(e)),
    };

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| export::default_path(vehicle));
    let rows = export::write_csv_file(&session, &path)?;

    print_json(&json!({
        "success": true,
        "vehicle": vehicle,
        "path": path,
        "signals": session.len(),
        "rows": rows,
        "warnings": session.stats,
    }))?;
    Ok(true)
}

fn inspect(service: &MetricsService, protocol: &str) -> can_metrics::Result<serde_json::Value> {
    let model = service.model(protocol)?;
    let messages: Vec<serde_json::Value> = model
        .messages()
        .map(|m| {
            json!({
                "id": m.id,
                "name": m.name,
                "size": m.size,
                "multiplexed": m.is_multiplexed(),
                "signals": m.signals.iter().map(|s| s.public_name.as_str()).collect::<Vec<_>>(),
            })
        })
        .collect();

    Ok(json!({
        "protocol": protocol,
        "stats": model.stats(),
        "messages": messages,
    }))
}

fn parse_categories(names: &[String]) -> Result<Vec<Category>> {
    names
        .iter()
        .map(|name| {
            Category::parse(name.trim()).with_context(|| {
                let known: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
                format!("Unknown category '{}' (expected one of: {})", name, known.join(", "))
            })
        })
        .collect()
}

/// Print a successful result, or the structured error; returns false on error
fn respond<T: Serialize>(result: can_metrics::Result<T>) -> Result<bool> {
    match result {
        Ok(value) => {
            print_json(&value)?;
            Ok(true)
        }
        Err(e) => {
            log::error!("{}", e);
            print_json(&error_body(&e))?;
            Ok(false)
        }
    }
}

fn error_body(error: &MetricsError) -> serde_json::Value {
    let kind = error.kind();
    json!({
        "success": false,
        "error": kind,
        "status": kind.status_class(),
        "message": error.to_string(),
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
