use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use tracing_subscriber::EnvFilter;

use reelgen::config::PipelineConfig;
use reelgen::engine::RemotionCli;
use reelgen::error::build_error_report;
use reelgen::pipeline::PipelineOrchestrator;
use reelgen::synthesis::{GeminiClient, InstructionStyle};

fn version_string() -> String {
    match option_env!("REELGEN_GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{} ({hash})", env!("CARGO_PKG_VERSION")),
        _ => env!("CARGO_PKG_VERSION").to_owned(),
    }
}

#[derive(Debug, Parser)]
#[command(name = "reelgen")]
#[command(about = "Prompt-to-video generation pipeline")]
#[command(version = version_string())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate a video from a free-text prompt.
    Generate {
        prompt: String,
        #[arg(long = "config")]
        config: Option<PathBuf>,
        #[arg(long = "model")]
        model: Option<String>,
        #[arg(long = "style", value_enum, default_value_t)]
        style: InstructionStyle,
        #[arg(long = "output-dir")]
        output_dir: Option<PathBuf>,
        #[arg(long = "base-url")]
        base_url: Option<String>,
        #[arg(long = "engine-command", default_value = "npx")]
        engine_command: String,
        /// Emit the outcome as JSON on stdout.
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },
    /// Verify the external render engine is reachable.
    CheckEngine {
        #[arg(long = "engine-command", default_value = "npx")]
        engine_command: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Generate {
            prompt,
            config,
            model,
            style,
            output_dir,
            base_url,
            engine_command,
            json,
        } => {
            run_generate(
                &prompt,
                config.as_deref(),
                model,
                style,
                output_dir,
                base_url,
                &engine_command,
                json,
            )
            .await
        }
        Commands::CheckEngine { engine_command } => run_check_engine(&engine_command),
    }
}

async fn run_generate(
    prompt: &str,
    config_path: Option<&std::path::Path>,
    model: Option<String>,
    style: InstructionStyle,
    output_dir: Option<PathBuf>,
    base_url: Option<String>,
    engine_command: &str,
    json: bool,
) -> Result<()> {
    let mut config = PipelineConfig::load(config_path)?;
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(output_dir) = output_dir {
        config.output_dir = output_dir;
    }
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    config.validate()?;

    let api_key = env::var("GEMINI_API_KEY")
        .context("GEMINI_API_KEY is required to call the generation API")?;
    let http = Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("failed to create HTTP client")?;
    let generator = GeminiClient::new(http, api_key, config.model.clone());
    let engine = RemotionCli::new(
        engine_command,
        config.scratch_dir.clone(),
        Duration::from_secs(config.render_timeout_seconds),
    );

    let orchestrator = PipelineOrchestrator::new(&config, generator, engine, style);
    let started = Instant::now();

    match orchestrator.run(prompt).await {
        Ok(outcome) => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome).context("failed to encode outcome")?
                );
            } else {
                println!("Video: {}", outcome.video_path.display());
                println!("URL:   {}", outcome.video_url);
            }
            eprintln!("Generated in {} ms", started.elapsed().as_millis());
            Ok(())
        }
        Err(error) => {
            let report = build_error_report(&error);
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to encode error report")?
            );
            std::process::exit(1);
        }
    }
}

fn run_check_engine(engine_command: &str) -> Result<()> {
    let engine = RemotionCli::new(
        engine_command,
        PathBuf::from("temp"),
        Duration::from_secs(60),
    );
    let versions = engine.preflight()?;
    println!("Render engine reachable:\n{versions}");
    Ok(())
}
