//! petbuddy-ai - recognition diagnostics
//!
//! Inspects or writes the configuration, the label → species taxonomy and the
//! image preprocessor. With the `onnx` feature, runs end-to-end recognition
//! on a photo.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use petbuddy_ai::services::ImagePreprocessor;
use petbuddy_ai::taxonomy::humanize_label;
use petbuddy_ai::{CatalogTaxonomy, RecognitionConfig, Species, SpeciesTaxonomy};
use std::path::PathBuf;
use tracing::info;

/// Command-line arguments for petbuddy-ai
#[derive(Parser, Debug)]
#[command(name = "petbuddy-ai")]
#[command(about = "Species/breed recognition diagnostics for PetBuddy")]
#[command(version)]
struct Args {
    /// Config file (overrides PETBUDDY_AI_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration as TOML
    CheckConfig,

    /// Write a default configuration file
    InitConfig {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Map labels to species with the configured catalog
    ClassifyLabel {
        #[arg(required = true)]
        labels: Vec<String>,
    },

    /// Decode a photo and report what the preprocessor sees
    InspectImage { path: PathBuf },

    /// Run recognition on a photo and print the result as JSON
    #[cfg(feature = "onnx")]
    Recognize {
        path: PathBuf,

        /// Only accept results of this species
        #[arg(long, value_enum)]
        species: Option<SpeciesArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SpeciesArg {
    Dog,
    Cat,
}

impl From<SpeciesArg> for Species {
    fn from(arg: SpeciesArg) -> Self {
        match arg {
            SpeciesArg::Dog => Species::Dog,
            SpeciesArg::Cat => Species::Cat,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // init-config must work even when the existing file does not parse
    let config = match &args.command {
        Command::InitConfig { .. } => RecognitionConfig::default(),
        _ => RecognitionConfig::load(args.config.as_deref())
            .context("Failed to load recognition configuration")?,
    };

    // RUST_LOG wins over the config file
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "petbuddy-ai starting");

    match args.command {
        Command::CheckConfig => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        Command::InitConfig { force } => {
            let path = config
                .save(args.config.as_deref(), force)
                .context("Failed to write configuration")?;
            println!("{}", path.display());
        }
        Command::ClassifyLabel { labels } => {
            let taxonomy = CatalogTaxonomy::new(&config.cat_breeds);
            for label in labels {
                println!(
                    "{}\t{}\t{}",
                    label,
                    taxonomy.classify_species(&label),
                    humanize_label(&label)
                );
            }
        }
        Command::InspectImage { path } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let image = ImagePreprocessor::new(config.limits)
                .decode_and_normalize(&bytes)
                .with_context(|| format!("Failed to decode {}", path.display()))?;
            println!(
                "{}: {:?} {}x{} ({} channels, {} bytes)",
                path.display(),
                image.source_format(),
                image.width(),
                image.height(),
                image.channels(),
                bytes.len()
            );
        }
        #[cfg(feature = "onnx")]
        Command::Recognize { path, species } => {
            recognize(&config, path, species.map(Species::from)).await?;
        }
    }

    Ok(())
}

#[cfg(feature = "onnx")]
async fn recognize(config: &RecognitionConfig, path: PathBuf, species: Option<Species>) -> Result<()> {
    use petbuddy_ai::services::OnnxModelLoader;
    use petbuddy_ai::{ModelManager, RecognitionService};
    use std::sync::Arc;

    let loader = OnnxModelLoader::from_config(&config.model).context("Invalid model configuration")?;
    let models = Arc::new(ModelManager::new(Arc::new(loader)));
    let service = RecognitionService::new(config, models);

    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let result = service.recognize_bytes(bytes, species).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
