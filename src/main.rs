//! Binary entry point for phytoscan.
//!
//! This binary provides the CLI interface for the phytoscan analysis
//! pipeline.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use phytoscan::cli::{self, CatalogAddArgs};
use phytoscan::config::PhytoscanConfig;
use phytoscan::observability::{self, InitOptions};
use std::path::PathBuf;
use std::process::ExitCode;

/// Phytoscan - plant disease image analysis.
#[derive(Parser)]
#[command(name = "phytoscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print collected metrics to stderr when the command finishes.
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Analyze a plant image: deduplicate, diagnose, and recommend products.
    Analyze {
        /// Image file to analyze.
        image: PathBuf,

        /// Owner recorded on the scan.
        #[arg(short, long)]
        owner: Option<String>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show a stored scan.
    Show {
        /// Scan identifier.
        scan_id: String,

        /// Print the scan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print an image's fingerprint.
    Hash {
        /// Image file.
        image: PathBuf,
    },

    /// Compare two images' fingerprints.
    Compare {
        /// First image.
        a: PathBuf,

        /// Second image.
        b: PathBuf,
    },

    /// Rank catalog products for a condition.
    Match {
        /// Condition name, e.g. "Leaf Blight".
        condition: String,

        /// Maximum number of products.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Manage the product catalog.
    Catalog {
        /// Catalog action.
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Show status.
    Status,

    /// Show resolved configuration.
    Config,
}

/// Catalog subcommands.
#[derive(Subcommand)]
enum CatalogAction {
    /// Add or update a product.
    Add {
        /// Product identifier.
        #[arg(long)]
        id: String,

        /// Product name.
        #[arg(long)]
        name: String,

        /// Product description.
        #[arg(short, long, default_value = "")]
        description: String,

        /// Unit price.
        #[arg(short, long, default_value = "0")]
        price: f64,

        /// Store the product as inactive.
        #[arg(long)]
        inactive: bool,
    },

    /// List products.
    List {
        /// Include inactive products.
        #[arg(short, long)]
        all: bool,
    },

    /// Import products from CSV (`id,name,description,price,active`).
    Import {
        /// CSV file.
        file: PathBuf,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match PhytoscanConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: false,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let print_metrics = cli.print_metrics;
    let result = run_command(cli.command, &config);

    if print_metrics {
        match observability::render_global() {
            Some(rendered) => eprint!("{rendered}"),
            None => eprintln!("Metrics are disabled (set PHYTOSCAN_METRICS_ENABLED=true)"),
        }
    }

    match result {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command and returns its output.
fn run_command(command: Commands, config: &PhytoscanConfig) -> phytoscan::Result<String> {
    match command {
        Commands::Analyze { image, owner, json } => {
            cli::cmd_analyze(config, &image, owner.as_deref(), json)
        },

        Commands::Show { scan_id, json } => cli::cmd_show(config, &scan_id, json),

        Commands::Hash { image } => cli::cmd_hash(&image),

        Commands::Compare { a, b } => cli::cmd_compare(config, &a, &b),

        Commands::Match { condition, limit } => cli::cmd_match(config, &condition, limit),

        Commands::Catalog { action } => match action {
            CatalogAction::Add {
                id,
                name,
                description,
                price,
                inactive,
            } => cli::cmd_catalog_add(
                config,
                CatalogAddArgs {
                    id,
                    name,
                    description,
                    price,
                    inactive,
                },
            ),
            CatalogAction::List { all } => cli::cmd_catalog_list(config, all),
            CatalogAction::Import { file } => cli::cmd_catalog_import(config, &file),
        },

        Commands::Status => cli::cmd_status(config),

        Commands::Config => Ok(cli::cmd_config(config)),
    }
}
