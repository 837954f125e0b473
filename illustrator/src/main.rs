mod error;
mod jimeng;
mod output;
mod providers;
mod settings;
mod signer;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::{Env, Target};
use error::ApiError;
use log::{error, info};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// A backend that turns a prompt into encoded image bytes.
pub trait ImageGenerator {
    fn generate(&self, prompt: &str, aspect_ratio: &str) -> Result<Vec<u8>, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Provider {
    /// Jimeng 4.0 on Volcengine
    #[value(alias = "volcengine")]
    Jimeng,
    #[value(name = "openrouter")]
    OpenRouter,
    Gemini,
}

#[derive(Parser, Debug)]
#[command(name = "illustrator", version, about = "Generate an article cover image from a prompt")]
struct Cli {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    output: PathBuf,
    /// 1:1, 16:9, 9:16, 4:3, 3:4, 3:2, 2:3, 21:9 or 9:21
    #[arg(long, default_value = "16:9")]
    aspect_ratio: String,
    #[arg(long, value_enum, ignore_case = true, default_value_t = Provider::Jimeng)]
    provider: Provider,
    /// Overwrite an existing output file instead of picking a new name
    #[arg(long)]
    no_auto_rename: bool,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("Generation failed: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let output = output::prepare_output(&cli.output, !cli.no_auto_rename)?;
    let settings = settings::load_from(&settings::candidate_paths())?;
    let lookup = |key: &str| env::var(key).ok();

    let generator: Box<dyn ImageGenerator> = match cli.provider {
        Provider::Jimeng => {
            let (access_key, secret_key) = settings.jimeng_keys(lookup)?;
            info!("Generating image with Jimeng AI");
            Box::new(jimeng::JimengClient::new(access_key, secret_key)?)
        }
        Provider::OpenRouter => {
            let config = settings.openrouter(lookup)?;
            info!("Generating image with OpenRouter ({})", config.model);
            Box::new(providers::OpenRouterClient::new(config.api_key, config.model)?)
        }
        Provider::Gemini => {
            let config = settings.gemini(lookup)?;
            info!("Generating image with Gemini ({})", config.model);
            Box::new(providers::GeminiClient::new(config.api_key, config.model)?)
        }
    };

    info!("Prompt: {}", output::prompt_preview(&cli.prompt));
    let image = generator.generate(&cli.prompt, &cli.aspect_ratio)?;
    fs::write(&output, &image)
        .with_context(|| format!("Failed to write image: {}", output.display()))?;

    info!("Image generated: {} ({} bytes)", output.display(), image.len());
    Ok(())
}

fn init_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .format(|buf, record| writeln!(buf, "illustrator: [{}] {}", record.level(), record.args()))
        .init();
}
