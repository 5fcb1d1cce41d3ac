//! Fleetscope - telemetry exporter for managed device fleets
//!
//! A CLI tool that pulls raw device reports from a fleet dashboard
//! API, reconciles the field-name differences between the macOS and
//! Windows reporting agents, and exports canonical per-module records.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, config, malformed response, etc.)
//!   2 - Device failures occurred and --fail-on-failures was set

mod aggregate;
mod api;
mod cli;
mod config;
mod extract;
mod models;
mod normalize;
mod report;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::Config;
use models::{FleetReport, ModuleCollections, ModuleKind, ReportMetadata};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Fleetscope v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the export
    match run_export(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Export failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .fleetscope.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".fleetscope.toml");

    if path.exists() {
        eprintln!("⚠️  .fleetscope.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .fleetscope.toml")?;

    println!("✅ Created .fleetscope.toml with default settings.");
    println!("   Edit it to customize the API URL, modules, and output.");
    Ok(())
}

/// Initialize logging based on verbosity settings. Logs go to stderr so
/// reports printed to stdout stay parseable.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete export workflow. Returns exit code (0 or 2).
async fn run_export(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let api_url = config.api.url.clone();

    if !args.quiet {
        eprintln!("📡 Fleet API: {}", api_url);
    }

    let client = api::FleetClient::new(api::ClientOptions {
        base_url: api_url.clone(),
        timeout_seconds: config.api.timeout_seconds,
        retries: config.api.retries,
    });

    let aggregator = aggregate::Aggregator::new(
        client,
        aggregate::AggregatorOptions {
            concurrency: config.aggregation.concurrency,
            show_progress: !args.quiet,
        },
    );

    // Step 1: Resolve the fleet listing
    let devices = aggregator
        .fleet()
        .await
        .context("Failed to list fleet devices")?;

    if !args.quiet {
        eprintln!("🖥  Fleet: {} devices", devices.len());
    }

    // Handle --list-devices: print the fleet and exit
    if args.list_devices {
        return handle_list_devices(&devices);
    }

    // Step 2: Aggregate the selected modules
    let modules = modules_from_names(&config.aggregation.modules);
    if modules.is_empty() {
        anyhow::bail!("No valid modules selected");
    }

    let mut collections = ModuleCollections::default();
    for module in &modules {
        if !args.quiet {
            eprintln!("📦 Aggregating {} module...", module);
        }
        aggregator
            .collect_into(&devices, *module, &mut collections)
            .await;
    }

    // Step 3: Build the report
    let duration = start_time.elapsed().as_secs_f64();

    let summaries = aggregate::device_summaries(&devices);

    let metadata = ReportMetadata {
        api_url,
        generated_at: Utc::now(),
        device_count: devices.len(),
        modules_exported: collections.exported_count(),
        total_records: collections.record_count(),
        total_failures: collections.failure_count(),
        duration_seconds: duration,
    };

    let report = FleetReport {
        metadata,
        devices: summaries,
        modules: collections,
    };

    // Step 4: Render and deliver the report
    let output = match effective_format(&config.report.format) {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    match config.report.output.as_deref() {
        Some(path) => {
            let path = PathBuf::from(path);
            std::fs::write(&path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !args.quiet {
                eprintln!("\n✅ Export complete! Report saved to: {}", path.display());
            }
        }
        None => {
            println!("{}", output);
        }
    }

    // Print summary
    if !args.quiet {
        eprintln!("\n📊 Export Summary:");
        eprintln!("   Devices: {}", report.metadata.device_count);
        eprintln!("   Modules: {}", report.metadata.modules_exported);
        eprintln!("   Records: {}", report.metadata.total_records);
        if report.metadata.total_failures > 0 {
            eprintln!("   Failures: {}", report.metadata.total_failures);
        }
        eprintln!("   Duration: {:.1}s", duration);
    }

    // Check --fail-on-failures
    if args.fail_on_failures && report.metadata.total_failures > 0 {
        eprintln!(
            "\n⛔ {} devices failed to export. Failing (exit code 2).",
            report.metadata.total_failures
        );
        return Ok(2);
    }

    Ok(0)
}

/// Handle --list-devices: print the resolved fleet, exit.
fn handle_list_devices(devices: &[aggregate::FleetDevice]) -> Result<i32> {
    if devices.is_empty() {
        println!("No devices found in the fleet listing.");
        return Ok(0);
    }

    let summaries = aggregate::device_summaries(devices);
    println!("Found {} devices:\n", summaries.len());
    for summary in &summaries {
        println!(
            "  {} | {} | {} | {}",
            summary.device_id,
            summary.platform,
            summary.device_name.as_deref().unwrap_or("-"),
            summary.serial_number.as_deref().unwrap_or("-"),
        );
    }
    println!("\nTotal: {} devices", summaries.len());
    Ok(0)
}

/// Parse the configured report format. Unknown names fall back to JSON.
fn effective_format(name: &str) -> OutputFormat {
    match name.to_lowercase().as_str() {
        "json" => OutputFormat::Json,
        "markdown" | "md" => OutputFormat::Markdown,
        other => {
            warn!("Unknown report format '{}', using json", other);
            OutputFormat::Json
        }
    }
}

/// Resolve configured module names into canonical module order. Unknown
/// names are warned about and skipped.
fn modules_from_names(names: &[String]) -> Vec<ModuleKind> {
    if names.is_empty() || names.iter().any(|name| name.eq_ignore_ascii_case("all")) {
        return ModuleKind::ALL.to_vec();
    }

    for name in names {
        let known = ModuleKind::ALL
            .iter()
            .any(|kind| name.eq_ignore_ascii_case(kind.as_str()));
        if !known {
            warn!("Unknown module '{}' in configuration, skipping", name);
        }
    }

    ModuleKind::ALL
        .iter()
        .copied()
        .filter(|kind| names.iter().any(|name| name.eq_ignore_ascii_case(kind.as_str())))
        .collect()
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .fleetscope.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
