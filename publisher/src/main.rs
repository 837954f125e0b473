mod config;
mod content;
mod wechat;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use env_logger::{Env, Target};
use log::{info, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use wechat::{DraftInput, ImageUploader, WeChatClient};

const DEFAULT_AUTHOR: &str = "YanG";
const DEFAULT_COVER: &str = "cover.png";

#[derive(Parser, Debug)]
#[command(
    name = "publisher",
    version,
    about = "Create a WeChat official account draft from an HTML article",
    after_help = "Examples:\n  publisher -t \"Title\" -c article.html\n  publisher -t \"Title\" -c article.html --cover cover.png -a \"Author\"\n  publisher --interactive"
)]
struct Cli {
    /// Article title (default: first <h1> or <title> of the content)
    #[arg(short, long)]
    title: Option<String>,
    /// HTML file with the article content
    #[arg(short, long, required_unless_present = "interactive")]
    content: Option<PathBuf>,
    #[arg(short, long, default_value = DEFAULT_AUTHOR)]
    author: String,
    /// Cover image, uploaded as the draft thumbnail when it exists
    #[arg(long, default_value = DEFAULT_COVER)]
    cover: PathBuf,
    #[arg(short, long)]
    digest: Option<String>,
    /// Prompt for every field instead of reading arguments
    #[arg(long)]
    interactive: bool,
}

struct Request {
    title: Option<String>,
    content: PathBuf,
    author: String,
    cover: Option<PathBuf>,
    digest: Option<String>,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let request = if cli.interactive {
        prompt_request()?
    } else {
        Request {
            title: cli.title,
            content: cli.content.ok_or_else(|| anyhow!("--content is required"))?,
            author: cli.author,
            cover: Some(cli.cover),
            digest: cli.digest,
        }
    };

    if !request.content.is_file() {
        bail!("Content file does not exist: {}", request.content.display());
    }
    let raw = fs::read_to_string(&request.content)
        .with_context(|| format!("Failed to read content file: {}", request.content.display()))?;

    let title = match request.title.filter(|t| !t.trim().is_empty()) {
        Some(title) => title,
        None => content::derive_title(&raw).ok_or_else(|| {
            anyhow!("No --title given and the content has neither <h1> nor <title>")
        })?,
    };
    let html = content::publishable_html(&raw);

    info!("Title: {}", title);
    info!(
        "Author: {}",
        if request.author.is_empty() { "(not set)" } else { request.author.as_str() }
    );
    info!(
        "Content: {} ({} characters)",
        request.content.display(),
        html.chars().count()
    );
    info!(
        "Cover: {}",
        request
            .cover
            .as_ref()
            .map(|c| c.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );

    let paths = config::Paths::in_home()?;
    let credentials = config::load_credentials(&paths)?;
    let mut client = WeChatClient::new(credentials, paths)?;

    let thumb_media_id = match &request.cover {
        Some(cover) if cover.is_file() => client.upload_image(cover)?.media_id,
        Some(cover) => {
            warn!("Cover image not found: {}, creating draft without thumbnail", cover.display());
            String::new()
        }
        None => String::new(),
    };

    let content_dir = content_dir(&request.content)?;
    let media_id = client.create_draft(&DraftInput {
        title,
        author: request.author,
        digest: request.digest,
        content: html,
        content_dir,
        thumb_media_id,
    })?;

    info!("Published! media_id: {}", media_id);
    info!("Open the WeChat official account backend to review the draft");
    Ok(())
}

fn prompt_request() -> Result<Request> {
    println!("=== WeChat draft publisher (interactive) ===\n");
    let title = config::prompt("Article title (empty: use <h1>): ")?;
    let content = config::prompt("Content file (HTML): ")?;
    let author = config::prompt("Author (optional): ")?;
    let cover = config::prompt("Cover image (optional): ")?;
    let digest = config::prompt("Digest (optional): ")?;

    if content.is_empty() {
        bail!("A content file is required");
    }
    Ok(Request {
        title: Some(title).filter(|t| !t.is_empty()),
        content: PathBuf::from(content),
        author,
        cover: Some(cover).filter(|c| !c.is_empty()).map(PathBuf::from),
        digest: Some(digest).filter(|d| !d.is_empty()),
    })
}

fn content_dir(content: &Path) -> Result<PathBuf> {
    let absolute = fs::canonicalize(content)
        .with_context(|| format!("Failed to resolve {}", content.display()))?;
    Ok(absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

fn init_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .format(|buf, record| writeln!(buf, "publisher: [{}] {}", record.level(), record.args()))
        .init();
}
