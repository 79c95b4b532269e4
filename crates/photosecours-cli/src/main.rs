use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use photosecours_core::{AnalysisSettings, ModelPaths, Pipeline};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

const DEFAULT_URL: &str = "http://localhost:8000/";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "photosecours", about = "PhotoSecours skin and wound photo analysis CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a face photo and analyse the skin
    Skin {
        image: PathBuf,
        /// Directory containing the ONNX models and tokenizer
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Describe a wound photo and print first-aid steps
    Wound {
        image: PathBuf,
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Run only the face gate
    Validate {
        image: PathBuf,
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Check that a running server answers
    Health {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Skin { image, model_dir } => {
            let mut pipeline = load_pipeline(model_dir)?;
            let report = pipeline.analyze_skin(&open_image(&image)?)?;
            print_json(&report)?;
        }
        Commands::Wound { image, model_dir } => {
            let mut pipeline = load_pipeline(model_dir)?;
            let report = pipeline.analyze_wound(&open_image(&image)?)?;
            print_json(&report)?;
        }
        Commands::Validate { image, model_dir } => {
            let mut pipeline = load_pipeline(model_dir)?;
            let validation = pipeline.validate_face(&open_image(&image)?)?;
            print_json(&validation)?;
        }
        Commands::Health { url } => {
            if !health(&url).await {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_pipeline(model_dir: Option<PathBuf>) -> Result<Pipeline> {
    let dir = model_dir.unwrap_or_else(photosecours_core::default_model_dir);
    tracing::debug!(dir = %dir.display(), "loading models");
    let pipeline = Pipeline::load(&ModelPaths::from_dir(&dir), AnalysisSettings::default())
        .with_context(|| format!("cannot load models from {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), "models loaded");
    Ok(pipeline)
}

fn open_image(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("cannot read image {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// GET `url`; healthy only on HTTP 200.
async fn health(url: &str) -> bool {
    let client = match reqwest::Client::builder().timeout(HEALTH_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("health: {e}");
            return false;
        }
    };

    tracing::debug!(%url, "checking health");
    match client.get(url).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => {
            println!("healthy");
            true
        }
        Ok(response) => {
            eprintln!("unhealthy: HTTP {}", response.status());
            false
        }
        Err(e) => {
            eprintln!("unreachable: {e}");
            false
        }
    }
}
