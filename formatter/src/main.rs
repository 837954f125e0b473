mod batch;
mod converter;
mod preview;
mod theme;

use anyhow::{bail, Result};
use batch::{find_markdown_files, BatchConverter, BatchReport};
use clap::{Parser, Subcommand};
use converter::Converter;
use env_logger::{Env, Target};
use preview::PreviewOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use theme::Theme;

#[derive(Parser, Debug)]
#[command(name = "formatter", version, about = "Render Markdown articles as WeChat-ready HTML")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a file or a directory of Markdown files
    Convert {
        #[arg(short, long)]
        input: PathBuf,
        /// Output directory (default: next to each source file)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = Theme::Tech)]
        theme: Theme,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
        #[arg(short, long, default_value_t = 4)]
        workers: usize,
        /// Only print the summary
        #[arg(short, long)]
        quiet: bool,
    },
    /// Re-render a file on every save and serve it locally
    Preview {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value = "preview")]
        output: PathBuf,
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = Theme::Tech)]
        theme: Theme,
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
        #[arg(long)]
        no_browser: bool,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Convert {
            input,
            output,
            theme,
            recursive,
            workers,
            quiet,
        } => {
            let batch = BatchConverter::new(Converter::new(theme), output, workers).quiet(quiet);
            convert(&input, recursive, &batch)?;
        }
        Command::Preview {
            input,
            output,
            theme,
            port,
            no_browser,
        } => {
            let options = PreviewOptions {
                input,
                output_dir: output,
                port,
                open_browser: !no_browser,
            };
            preview::run(options, Converter::new(theme))?;
        }
    }

    Ok(())
}

/// Converts everything found under `input`. Finding nothing, or any file
/// failing, is an error so the process exits non-zero.
fn convert(input: &Path, recursive: bool, batch: &BatchConverter) -> Result<BatchReport> {
    let files = find_markdown_files(input, recursive)?;
    if files.is_empty() {
        bail!("No Markdown files found in {}", input.display());
    }

    let started = Instant::now();
    let report = batch.convert_batch(&files)?;
    report.log_summary();
    log::info!("Elapsed: {:.2}s", started.elapsed().as_secs_f64());

    if !report.failed.is_empty() {
        bail!("{} of {} files failed to convert", report.failed.len(), report.total);
    }
    Ok(report)
}

fn init_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .format(|buf, record| writeln!(buf, "formatter: [{}] {}", record.level(), record.args()))
        .init();
}
