#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use modelpull::config::Config;
use modelpull::error::Result;
use modelpull::models::publish::format_bytes;
use modelpull::models::{list_models, ModelCatalog, Publisher};
use modelpull::quant::{self, QuantDocument};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modelpull")]
#[command(about = "Download, convert and publish model checkpoints", long_about = None)]
struct Cli {
    /// Root directory models are published under
    #[arg(long, global = true, value_name = "DIR")]
    model_directory: Option<PathBuf>,

    /// Model catalog (JSON) to use instead of the built-in one
    #[arg(long, global = true, value_name = "FILE")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and convert a model
    Download {
        model: String,
        /// Hugging Face access token
        #[arg(long)]
        hf_token: Option<String>,
    },
    /// List catalog models and whether they are downloaded
    List,
    /// Print the directory a model is published at
    Where { model: String },
    /// Remove a downloaded model
    Remove { model: String },
    /// Show supported quantization options from a capability document
    Quant {
        file: PathBuf,
        /// Filter rows, e.g. --where device=cpu (repeatable)
        #[arg(long = "where", value_name = "FIELD=VALUE")]
        filters: Vec<String>,
    },
}

fn main() {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(dir) = cli.model_directory {
        config.models_dir = Some(dir);
    }
    if let Some(catalog) = cli.catalog {
        config.catalog = Some(catalog);
    }

    let catalog = match &config.catalog {
        Some(path) => ModelCatalog::load(path)?,
        None => ModelCatalog::builtin()?,
    };

    match cli.command {
        Commands::Download { model, hf_token } => {
            let token = config.hub_token(hf_token);
            let publisher = Publisher::from_config(&config, catalog, token)?;
            let model_dir = publisher.download_and_convert(&model)?;
            println!("✓ Downloaded {model} to {}", model_dir.display());
        }
        Commands::List => {
            let models_dir = config.models_dir()?;
            for status in list_models(&catalog, &models_dir)? {
                let marker = if status.downloaded { "✓" } else { " " };
                let size = status.size_bytes.map(format_bytes).unwrap_or_default();
                let aliases = if status.aliases.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", status.aliases.join(", "))
                };
                println!("{marker} {}{aliases} {size}", status.name);
            }
        }
        Commands::Where { model } => {
            let publisher = Publisher::from_config(&config, catalog, None)?;
            println!("{}", publisher.model_dir(&model)?.display());
        }
        Commands::Remove { model } => {
            let publisher = Publisher::from_config(&config, catalog, None)?;
            if publisher.remove(&model)? {
                println!("✓ Removed {model}");
            } else {
                println!("{model} is not downloaded");
            }
        }
        Commands::Quant { file, filters } => {
            let filters = filters
                .iter()
                .map(|f| quant::parse_filter(f))
                .collect::<Result<Vec<_>>>()?;
            let rows = quant::flatten(&QuantDocument::load(&file)?);

            println!("{}", quant::FIELDS.join("\t"));
            for row in quant::select(&rows, &filters)? {
                println!("{}", row.values().join("\t"));
            }
        }
    }

    Ok(())
}
