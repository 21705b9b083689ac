//! CLI entry point for the Databús toolkit.
//!
//! Provides subcommands for browsing the feed catalog, inspecting,
//! validating and filtering GTFS feeds, and showing the active configuration.

mod infra;
mod services;

use crate::infra::databus::DatabusClient;
use crate::services::catalog_api::{Agency, CatalogApi, CatalogFeed, Route, Stop, Trip};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use databus::config::Config;
use databus::filter::BoundingBox;
use databus::output::{append_summary, format_file_size, write_report};
use databus::stats::route_type_name;
use databus::validation::{ReportIssue, ValidationReport, Validator};
use databus::GtfsProcessor;
use serde::Serialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "databus", version)]
#[command(about = "Toolkit for GTFS transit feeds", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed catalog API commands
    Api {
        #[command(subcommand)]
        command: ApiCommands,
    },
    /// Local GTFS feed commands
    Gtfs {
        #[command(subcommand)]
        command: GtfsCommands,
    },
    /// Print the active configuration
    ConfigShow,
}

#[derive(Subcommand)]
enum ApiCommands {
    /// List available GTFS feeds
    Feeds {
        /// Filter feeds by country code (e.g. CR)
        #[arg(long)]
        country: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Show catalog metadata for one feed
    Feed {
        feed_id: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List the agencies of a feed
    Agencies {
        feed_id: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List the routes of a feed
    Routes {
        feed_id: String,

        #[arg(long)]
        agency: Option<String>,

        /// GTFS route_type code (e.g. 3 for bus)
        #[arg(long)]
        route_type: Option<i32>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List the stops of a feed
    Stops {
        feed_id: String,

        /// Bounding box as min_lon,min_lat,max_lon,max_lat
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<BoundingBox>,

        #[arg(long)]
        route: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List the trips of a feed
    Trips {
        feed_id: String,

        #[arg(long)]
        route: Option<String>,

        #[arg(long)]
        service: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Download a GTFS feed archive
    Download {
        feed_id: String,

        /// Output file path (defaults to <FEED_ID>.zip)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum GtfsCommands {
    /// Show summary statistics for a feed
    Info {
        #[arg(value_name = "PATH")]
        feed_path: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Validate a feed against the standard rule set
    Validate {
        #[arg(value_name = "PATH")]
        feed_path: PathBuf,

        /// Write the full JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// CSV file to append the report summary to
        #[arg(long, value_name = "CSV")]
        history: Option<PathBuf>,
    },
    /// Write each table of a feed as a CSV file
    Convert {
        #[arg(value_name = "PATH")]
        feed_path: PathBuf,

        output_dir: PathBuf,
    },
    /// Write a markdown summary of a feed
    Summary {
        #[arg(value_name = "PATH")]
        feed_path: PathBuf,

        /// Output file path (defaults to <FEED>_summary.md)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Filter a feed by geographic bounds or date range and export it as zip
    Filter {
        input_path: PathBuf,
        output_path: PathBuf,

        /// Bounding box as min_lon,min_lat,max_lon,max_lat
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<BoundingBox>,

        /// Date range as start,end (YYYY-MM-DD)
        #[arg(long)]
        dates: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .ok()
        .or_else(|| config.logging.file_path.clone())
        .unwrap_or_else(|| "logs/databus.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("databus.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(level.parse()?));

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

    match cli.command {
        Commands::Api { command } => {
            let client = DatabusClient::from_config(&config.api)?;
            run_api(&client, command).await?;
        }
        Commands::Gtfs { command } => run_gtfs(command)?,
        Commands::ConfigShow => {
            let mut shown = config.clone();
            if shown.api.api_key.is_some() {
                shown.api.api_key = Some("***".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}

async fn run_api(client: &(impl CatalogApi + Sync), command: ApiCommands) -> Result<()> {
    match command {
        ApiCommands::Feeds { country, format } => {
            let feeds = client.list_feeds(country.as_deref()).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&feeds)?),
                OutputFormat::Table => print_feeds(&feeds),
            }
        }
        ApiCommands::Feed { feed_id, format } => {
            let feed = client.get_feed(&feed_id).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&feed)?),
                OutputFormat::Table => print_feeds(std::slice::from_ref(&feed)),
            }
        }
        ApiCommands::Agencies { feed_id, format } => {
            let agencies = client.get_agencies(&feed_id).await?;
            print_rows(
                format,
                &agencies,
                &["ID", "Name", "Timezone"],
                |a: &Agency| {
                    vec![
                        a.agency_id.clone().unwrap_or_default(),
                        a.agency_name.clone(),
                        a.agency_timezone.clone(),
                    ]
                },
            )?;
        }
        ApiCommands::Routes {
            feed_id,
            agency,
            route_type,
            format,
        } => {
            let routes = client
                .get_routes(&feed_id, agency.as_deref(), route_type)
                .await?;
            print_rows(format, &routes, &["ID", "Name", "Type"], |r: &Route| {
                vec![
                    r.route_id.clone(),
                    r.route_short_name
                        .clone()
                        .or_else(|| r.route_long_name.clone())
                        .unwrap_or_default(),
                    route_type_name(&r.route_type.to_string()),
                ]
            })?;
        }
        ApiCommands::Stops {
            feed_id,
            bbox,
            route,
            format,
        } => {
            let stops = client.get_stops(&feed_id, bbox, route.as_deref()).await?;
            print_rows(format, &stops, &["ID", "Name", "Lat", "Lon"], |s: &Stop| {
                vec![
                    s.stop_id.clone(),
                    s.stop_name.clone(),
                    s.stop_lat.to_string(),
                    s.stop_lon.to_string(),
                ]
            })?;
        }
        ApiCommands::Trips {
            feed_id,
            route,
            service,
            format,
        } => {
            let trips = client
                .get_trips(&feed_id, route.as_deref(), service.as_deref())
                .await?;
            print_rows(format, &trips, &["ID", "Route", "Service", "Headsign"], |t: &Trip| {
                vec![
                    t.trip_id.clone(),
                    t.route_id.clone(),
                    t.service_id.clone(),
                    t.trip_headsign.clone().unwrap_or_default(),
                ]
            })?;
        }
        ApiCommands::Download { feed_id, output } => {
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{feed_id}.zip")));
            let path = client.download_feed(&feed_id, &output).await?;
            println!("Downloaded feed to: {}", path.display());
        }
    }
    Ok(())
}

/// Prints `items` as pretty JSON or as a left-aligned table.
fn print_rows<T: Serialize>(
    format: OutputFormat,
    items: &[T],
    headers: &[&str],
    columns: impl Fn(&T) -> Vec<String>,
) -> Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(items)?);
        return Ok(());
    }

    let rows: Vec<Vec<String>> = items.iter().map(columns).collect();
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .chain([h.len()])
                .max()
                .unwrap_or_default()
        })
        .collect();

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", line(headers.to_vec()));
    for row in &rows {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
    println!("\nTotal: {}", rows.len());
    Ok(())
}

fn load(feed_path: &Path) -> Result<GtfsProcessor> {
    let mut processor = GtfsProcessor::new(Some(feed_path.to_path_buf()));
    processor
        .load_feed(None)
        .with_context(|| format!("could not load {}", feed_path.display()))?;
    Ok(processor)
}

fn run_gtfs(command: GtfsCommands) -> Result<()> {
    match command {
        GtfsCommands::Info { feed_path, format } => {
            let stats = load(&feed_path)?.feed_stats()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Table => {
                    println!("GTFS Feed Info: {}", display_name(&feed_path));
                    for (label, count) in [
                        ("Agencies", stats.agencies),
                        ("Routes", stats.routes),
                        ("Stops", stats.stops),
                        ("Trips", stats.trips),
                        ("Stop Times", stats.stop_times),
                        ("Shapes", stats.shapes),
                    ] {
                        println!("  {label:<12} {count:>10}");
                    }
                    if !stats.routes_by_type.is_empty() {
                        println!("\nRoutes by Type");
                        for (route_type, count) in &stats.routes_by_type {
                            println!("  {:<34} {count:>6}", route_type_name(route_type));
                        }
                    }
                    if let Some(period) = &stats.service_period {
                        println!("\nService Period: {} to {}", period.start, period.end);
                    }
                }
            }
        }
        GtfsCommands::Validate {
            feed_path,
            output,
            format,
            history,
        } => {
            let processor = load(&feed_path)?;
            let report = Validator::standard().validate(&processor)?;

            if let Some(history) = &history {
                append_summary(history, &report.summary())?;
            }

            match (format, &output) {
                (_, Some(output)) => {
                    write_report(output, &report)?;
                    println!("Validation report saved to: {}", output.display());
                }
                (OutputFormat::Json, None) => println!("{}", report.to_json()?),
                (OutputFormat::Table, None) => print_report(&feed_path, &report),
            }
        }
        GtfsCommands::Convert {
            feed_path,
            output_dir,
        } => {
            let files = load(&feed_path)?.to_csv(&output_dir)?;
            for (table, path) in &files {
                println!("  {:<20} {}", table.file_name(), path.display());
            }
            println!("Exported {} tables to: {}", files.len(), output_dir.display());
        }
        GtfsCommands::Summary { feed_path, output } => {
            let output = output.unwrap_or_else(|| {
                let stem = feed_path.file_stem().unwrap_or(OsStr::new("feed"));
                PathBuf::from(format!("{}_summary.md", stem.to_string_lossy()))
            });
            let written = load(&feed_path)?.create_summary_report(&output)?;
            println!("Summary report saved to: {}", written.display());
        }
        GtfsCommands::Filter {
            input_path,
            output_path,
            bbox,
            dates,
        } => {
            let mut processor = load(&input_path)?;

            if let Some(bbox) = bbox {
                processor = processor.filter_by_bounding_box(
                    bbox.min_lat,
                    bbox.min_lon,
                    bbox.max_lat,
                    bbox.max_lon,
                )?;
            }
            if let Some(dates) = dates {
                let (start, end) = dates
                    .split_once(',')
                    .context("Date range must be start,end")?;
                processor = processor.filter_by_dates(start, end)?;
            }

            let written = processor.export_to_zip(&output_path)?;
            info!(path = %written.display(), "Filtered feed exported");
            println!("Filtered feed exported to: {}", written.display());
        }
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}

fn print_feeds(feeds: &[CatalogFeed]) {
    println!(
        "{:<24} {:<32} {:<8} {:<16} {:<10} {:>10}",
        "ID", "Name", "Country", "City", "Status", "Size"
    );
    for feed in feeds {
        println!(
            "{:<24} {:<32} {:<8} {:<16} {:<10} {:>10}",
            feed.id,
            feed.name,
            feed.country_code,
            feed.city.as_deref().unwrap_or("-"),
            feed.status,
            feed.file_size.map(format_file_size).unwrap_or_else(|| "-".to_string()),
        );
    }
    println!("\nTotal feeds: {}", feeds.len());
}

fn print_issues(title: &str, issues: &[ReportIssue], limit: usize) {
    if issues.is_empty() {
        return;
    }
    println!("\n{title}:");
    for issue in issues.iter().take(limit) {
        println!("  • {}", issue.message);
    }
    if issues.len() > limit {
        println!("  ... and {} more", issues.len() - limit);
    }
}

fn print_report(feed_path: &Path, report: &ValidationReport) {
    println!("Validation Report: {}", display_name(feed_path));
    println!(
        "  Status: {}  Score: {:.1}/100  Errors: {}  Warnings: {}  Notices: {}",
        report.status().as_str().to_uppercase(),
        report.score(),
        report.errors().len(),
        report.warnings().len(),
        report.notices().len(),
    );
    print_issues("Errors", report.errors(), 5);
    print_issues("Warnings", report.warnings(), 3);
}
