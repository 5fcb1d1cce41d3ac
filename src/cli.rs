//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

use crate::models::ModuleKind;

/// Fleetscope - telemetry exporter for managed device fleets
///
/// Pulls raw device reports from a fleet dashboard API, reconciles the
/// field-name differences between the reporting agents, and exports
/// canonical per-module records as JSON or a Markdown summary.
///
/// Examples:
///   fleetscope --api-url http://fleet.local:8080
///   fleetscope --api-url http://fleet.local:8080 --modules system,network
///   fleetscope --api-url http://fleet.local:8080 --format markdown --output fleet.md
///   fleetscope --api-url http://fleet.local:8080 --list-devices
///   fleetscope --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Base URL of the fleet dashboard API
    ///
    /// Can also be set via FLEETSCOPE_API_URL or .fleetscope.toml.
    #[arg(short, long, value_name = "URL", env = "FLEETSCOPE_API_URL")]
    pub api_url: Option<String>,

    /// Modules to export (comma-separated)
    ///
    /// Example: --modules system,network,security
    #[arg(short, long, value_name = "MODULES", value_delimiter = ',')]
    pub modules: Option<Vec<ModuleArg>>,

    /// Output file path for the report
    ///
    /// Written to stdout when omitted.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (json, markdown)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .fleetscope.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries for timed-out or refused requests
    #[arg(long, value_name = "COUNT")]
    pub retries: Option<u32>,

    /// Number of concurrent device fetches
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// List the devices in the fleet and exit without exporting
    #[arg(long)]
    pub list_devices: bool,

    /// Exit with code 2 when any device fails to export
    ///
    /// Useful for monitoring jobs that should notice broken devices.
    #[arg(long)]
    pub fail_on_failures: bool,

    /// Generate a default .fleetscope.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Canonical JSON export (default)
    #[default]
    Json,
    /// Markdown summary
    Markdown,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "markdown",
        }
    }
}

/// Module selector for --modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModuleArg {
    /// Every module below
    All,
    System,
    Network,
    Installs,
    Identity,
    Security,
    Management,
    Peripherals,
}

fn kind_of(arg: ModuleArg) -> Option<ModuleKind> {
    match arg {
        ModuleArg::All => None,
        ModuleArg::System => Some(ModuleKind::System),
        ModuleArg::Network => Some(ModuleKind::Network),
        ModuleArg::Installs => Some(ModuleKind::Installs),
        ModuleArg::Identity => Some(ModuleKind::Identity),
        ModuleArg::Security => Some(ModuleKind::Security),
        ModuleArg::Management => Some(ModuleKind::Management),
        ModuleArg::Peripherals => Some(ModuleKind::Peripherals),
    }
}

/// Expands module selectors into canonical module order, deduplicated.
pub fn resolve_modules(args: &[ModuleArg]) -> Vec<ModuleKind> {
    if args.iter().any(|arg| *arg == ModuleArg::All) {
        return ModuleKind::ALL.to_vec();
    }
    ModuleKind::ALL
        .iter()
        .copied()
        .filter(|kind| args.iter().any(|arg| kind_of(*arg) == Some(*kind)))
        .collect()
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Modules selected on the command line, in canonical order.
    /// `None` when --modules was not given.
    pub fn selected_modules(&self) -> Option<Vec<ModuleKind>> {
        self.modules.as_deref().map(resolve_modules)
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Validate API URL format if provided
        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Validate concurrency
        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        // Validate timeout if provided
        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
