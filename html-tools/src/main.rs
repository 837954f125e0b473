use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::{Env, Target};
use html_tools::{convert_code_blocks, fix_editor_issues, fix_wechat_style, optimize_spacing};
use log::info;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "html-tools", version, about = "Rewrite article HTML for the WeChat editor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn <pre><code> blocks into <div> + <br> + &nbsp; markup
    CodeBlocks { input: PathBuf, output: PathBuf },
    /// Tighten paragraph, heading and image spacing
    Optimize { input: PathBuf, output: PathBuf },
    /// Remove inter-tag whitespace and pin indent/alignment styles
    FixStyle { input: PathBuf, output: PathBuf },
    /// Run the full pre-publish editor compatibility pass
    EditorFix { input: PathBuf, output: PathBuf },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::CodeBlocks { input, output } => {
            rewrite(&input, &output, convert_code_blocks)?;
            info!("Converted code blocks to div + br + &nbsp; markup");
        }
        Command::Optimize { input, output } => {
            rewrite(&input, &output, optimize_spacing)?;
            info!("Spacing optimised: paragraph margins 4px, headings and images tightened, 2em indent");
        }
        Command::FixStyle { input, output } => {
            rewrite(&input, &output, fix_wechat_style)?;
            info!("Style fixed: indent forced to 0 !important, margins normalised, whitespace removed");
        }
        Command::EditorFix { input, output } => {
            let mut report = None;
            rewrite(&input, &output, |html| {
                let fixed = fix_editor_issues(html);
                report = Some((fixed.converted, fixed.excluded));
                fixed.html
            })?;
            if let Some((converted, excluded)) = report {
                info!(
                    "Background blocks: {} converted to tables, {} excluded",
                    converted, excluded
                );
            }
        }
    }

    Ok(())
}

fn rewrite(input: &Path, output: &Path, transform: impl FnOnce(&str) -> String) -> Result<()> {
    info!("Reading {}", input.display());
    let html = fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;

    let rewritten = transform(&html);

    info!("Writing {}", output.display());
    fs::write(output, rewritten)
        .with_context(|| format!("Failed to write output file: {}", output.display()))?;
    Ok(())
}

fn init_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .format(|buf, record| writeln!(buf, "html-tools: [{}] {}", record.level(), record.args()))
        .init();
}
