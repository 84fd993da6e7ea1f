use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use tracing_subscriber::EnvFilter;

use boxvault_kernel::artifact::create_test_box_file;
use boxvault_kernel::backend::BackendRegistry;
use boxvault_kernel::config::ToolConfig;
use boxvault_kernel::manager::BackendManager;

/// Boxvault catalog CLI
#[derive(Parser, Debug)]
#[command(name = "boxvault")]
#[command(about = "Manage versioned catalogs of box artifacts", long_about = None)]
struct Cli {
    /// Path to tool config JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter; overrides the config file and RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the whole catalog as JSON
    Show(CatalogArgs),

    /// Write a synthetic box file for testing
    CreateTestBox {
        /// Where to write the box file
        #[arg(long = "box")]
        box_path: PathBuf,

        /// Provider recorded in the box metadata
        #[arg(long)]
        provider: String,

        /// Write a plain tar instead of a gzip-compressed one
        #[arg(long)]
        uncompressed: bool,
    },

    /// Register a box file under a version
    Add {
        /// Catalog URI, or a local path to the catalog JSON
        #[arg(long)]
        catalog: String,

        /// Box name tracked by the catalog
        #[arg(long)]
        name: String,

        /// Local path to the box file
        #[arg(long = "box")]
        box_path: PathBuf,

        /// Exact version to register, e.g. 1.2.5
        #[arg(long)]
        version: String,

        /// Catalog description, used when the catalog has none yet
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Print matching catalog entries as JSON
    Query(FilterArgs),

    /// Remove matching catalog entries and their box files
    Delete(FilterArgs),
}

#[derive(Args, Debug)]
struct CatalogArgs {
    /// Catalog URI, or a local path to the catalog JSON
    #[arg(long)]
    catalog: String,

    /// Box name, used when the catalog does not exist yet
    #[arg(long, default_value = "")]
    name: String,
}

#[derive(Args, Debug)]
struct FilterArgs {
    #[command(flatten)]
    catalog: CatalogArgs,

    /// Version range such as '<=1.2.3' or '>=1.0, <2.0'
    #[arg(long, default_value = "")]
    version: String,

    /// Regular expression searched in provider names, e.g. 'virtualbox|vmware'
    #[arg(long, default_value = "")]
    provider: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    initialize_tracing(cli.log_level.as_deref(), &config);

    if let Some(output) = run(cli.command, &config)? {
        println!("{output}");
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ToolConfig> {
    match path {
        Some(path) => {
            let data = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            ToolConfig::from_json(&data)
                .with_context(|| format!("invalid config {}", path.display()))
        }
        None => Ok(ToolConfig::default_config()),
    }
}

/// Logs always go to stderr; stdout carries command output only.
fn initialize_tracing(cli_level: Option<&str>, config: &ToolConfig) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(config.log_level.as_deref().unwrap_or("info"))
        }),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute one command, returning what should be printed on stdout.
fn run(command: Command, config: &ToolConfig) -> Result<Option<String>> {
    match command {
        Command::Show(args) => {
            let manager = open_manager(&args.catalog, &args.name)?;
            let catalog = manager.get_catalog()?;
            Ok(Some(catalog.to_json_pretty()?))
        }

        Command::CreateTestBox {
            box_path,
            provider,
            uncompressed,
        } => {
            create_test_box_file(&box_path, &provider, !uncompressed)
                .context("could not create test box")?;
            tracing::info!("box file created at {}", box_path.display());
            Ok(None)
        }

        Command::Add {
            catalog,
            name,
            box_path,
            version,
            description,
        } => {
            let mut manager = open_manager(&catalog, &name)?;
            let artifact = manager
                .add_box_file(&box_path, &version, &description, config.checksum_type)
                .with_context(|| format!("could not add {}", box_path.display()))?;
            tracing::info!(
                provider = %artifact.provider,
                checksum = %artifact.checksum,
                "box added to catalog"
            );
            Ok(Some(manager.get_catalog()?.to_json_pretty()?))
        }

        Command::Query(filter) => {
            let manager = open_manager(&filter.catalog.catalog, &filter.catalog.name)?;
            let result = manager.query(&filter.version, &filter.provider)?;
            Ok(Some(result.to_json_pretty()?))
        }

        Command::Delete(filter) => {
            let mut manager = open_manager(&filter.catalog.catalog, &filter.catalog.name)?;
            let report = manager.delete(&filter.version, &filter.provider)?;
            if !report.is_clean() {
                print!("{report}");
                anyhow::bail!(
                    "catalog updated, but {} box file(s) could not be deleted",
                    report.failed.len()
                );
            }
            Ok(Some(report.to_string()))
        }
    }
}

fn open_manager(catalog: &str, name: &str) -> Result<BackendManager> {
    let uri = catalog_uri(catalog)?;
    tracing::debug!("using catalog URI {uri}");

    let registry = BackendRegistry::with_defaults();
    BackendManager::from_uri(&uri, name, &registry)
        .with_context(|| format!("no usable backend for {uri}"))
}

/// Accept either a URI or a local path, which becomes an absolute
/// `file://` URI.
fn catalog_uri(catalog: &str) -> Result<String> {
    let scheme = Regex::new("^[a-zA-Z0-9]+://")?;
    if scheme.is_match(catalog) {
        return Ok(catalog.to_string());
    }

    let path = Path::new(catalog);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("could not resolve the current directory")?
            .join(path)
    };
    Ok(format!("file://{}", absolute.display()))
}
