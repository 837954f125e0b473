//! Live preview: re-render a Markdown file whenever it changes and serve the
//! result over a local HTTP server.

use crate::converter::Converter;
use anyhow::{anyhow, Context, Result};
use chrono::Local;
use log::{error, info, warn};
use percent_encoding::percent_decode_str;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, SystemTime};
use tiny_http::{Header, Response, Server};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PreviewOptions {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub port: u16,
    pub open_browser: bool,
}

/// Tracks one source file and re-renders it when its mtime moves.
pub struct Watcher {
    input: PathBuf,
    output: PathBuf,
    converter: Converter,
    last_modified: Option<SystemTime>,
}

impl Watcher {
    pub fn new(input: PathBuf, output_dir: &Path, converter: Converter) -> Self {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let output = output_dir.join(format!("{}.html", stem));
        Self {
            input,
            output,
            converter,
            last_modified: None,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Converts the file if it changed since the last call. Returns whether a
    /// conversion was attempted.
    pub fn refresh(&mut self) -> Result<bool> {
        let modified = fs::metadata(&self.input)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("Failed to stat {}", self.input.display()))?;
        if self.last_modified == Some(modified) {
            return Ok(false);
        }
        self.last_modified = Some(modified);

        let now = Local::now().format("%H:%M:%S");
        match self.converter.convert_file(&self.input, &self.output) {
            Ok(_) => info!("[{}] Updated {}", now, self.output.display()),
            Err(e) => error!("[{}] Conversion failed: {}", now, e),
        }
        Ok(true)
    }
}

pub fn run(options: PreviewOptions, converter: Converter) -> Result<()> {
    if !options.input.is_file() {
        return Err(anyhow!("File does not exist: {}", options.input.display()));
    }
    fs::create_dir_all(&options.output_dir).with_context(|| {
        format!("Failed to create output directory: {}", options.output_dir.display())
    })?;

    let mut watcher = Watcher::new(options.input.clone(), &options.output_dir, converter);
    watcher.refresh()?;

    let addr = format!("127.0.0.1:{}", options.port);
    let server = Server::http(&addr).map_err(|e| anyhow!("Failed to start server on {}: {}", addr, e))?;
    let source_dir = options
        .input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let serve_dir = options.output_dir.clone();
    thread::spawn(move || serve(server, &serve_dir, &source_dir));

    let page = watcher
        .output()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let url = format!("http://localhost:{}/{}", options.port, page);
    info!("Theme: {}", converter.theme().name());
    info!("Preview at {}", url);
    info!("Watching {} (Ctrl+C to stop)", options.input.display());

    if options.open_browser {
        if let Err(e) = open_in_browser(&url) {
            warn!("Could not open browser: {}", e);
        }
    }

    loop {
        thread::sleep(POLL_INTERVAL);
        if let Err(e) = watcher.refresh() {
            warn!("{:#}", e);
        }
    }
}

fn serve(server: Server, root: &Path, fallback: &Path) {
    for request in server.incoming_requests() {
        let response = match resolve(root, fallback, request.url()) {
            Some(path) => match fs::read(&path) {
                Ok(bytes) => {
                    let mut response = Response::from_data(bytes);
                    if let Ok(header) =
                        Header::from_bytes(&b"Content-Type"[..], content_type(&path).as_bytes())
                    {
                        response = response.with_header(header);
                    }
                    response
                }
                Err(_) => Response::from_string("Not Found").with_status_code(404),
            },
            None => Response::from_string("Not Found").with_status_code(404),
        };
        let _ = request.respond(response);
    }
}

/// Maps a request URL onto a file under `root`, falling back to `fallback`
/// so relative image paths in the Markdown still load. Paths escaping either
/// directory are rejected.
fn resolve(root: &Path, fallback: &Path, url: &str) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let decoded = percent_decode_str(path.trim_start_matches('/')).decode_utf8_lossy();
    let relative = PathBuf::from(decoded.into_owned());
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    [root, fallback]
        .iter()
        .map(|dir| dir.join(&relative))
        .find(|candidate| candidate.is_file())
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn open_in_browser(url: &str) -> Result<()> {
    let status = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).status()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", "", url]).status()
    } else {
        Command::new("xdg-open").arg(url).status()
    }
    .context("Failed to launch browser")?;

    if !status.success() {
        return Err(anyhow!("browser launcher exited with {}", status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::Theme;
    use tempfile::tempdir;

    #[test]
    fn refresh_converts_only_on_change() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("draft.md");
        fs::write(&input, "# Draft\n\nfirst").unwrap();
        let out_dir = dir.path().join("preview");

        let mut watcher = Watcher::new(input.clone(), &out_dir, Converter::new(Theme::Tech));
        assert_eq!(watcher.output(), out_dir.join("draft.html"));

        assert!(watcher.refresh().unwrap());
        assert!(fs::read_to_string(watcher.output()).unwrap().contains("first"));
        assert!(!watcher.refresh().unwrap());

        fs::write(&input, "# Draft\n\nsecond").unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(&input)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(watcher.refresh().unwrap());
        assert!(fs::read_to_string(watcher.output()).unwrap().contains("second"));
    }

    #[test]
    fn refresh_fails_when_source_disappears() {
        let dir = tempdir().unwrap();
        let mut watcher = Watcher::new(dir.path().join("gone.md"), dir.path(), Converter::new(Theme::Tech));
        assert!(watcher.refresh().is_err());
    }

    #[test]
    fn resolves_from_output_then_source_dir() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("preview");
        let src = dir.path().join("src");
        fs::create_dir_all(out.join("sub")).unwrap();
        fs::create_dir_all(src.join("img")).unwrap();
        fs::write(out.join("page.html"), "x").unwrap();
        fs::write(src.join("img/a b.png"), "x").unwrap();

        assert_eq!(resolve(&out, &src, "/page.html?t=1"), Some(out.join("page.html")));
        assert_eq!(resolve(&out, &src, "/img/a%20b.png"), Some(src.join("img/a b.png")));
        assert_eq!(resolve(&out, &src, "/missing.html"), None);
        assert_eq!(resolve(&out, &src, "/../src/img/a%20b.png"), None);
    }

    #[test]
    fn request_paths_are_percent_decoded() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("图.png"), "x").unwrap();
        fs::write(dir.path().join("a%+41b.png"), "x").unwrap();

        assert_eq!(
            resolve(dir.path(), dir.path(), "/%E5%9B%BE.png"),
            Some(dir.path().join("图.png"))
        );
        assert_eq!(
            resolve(dir.path(), dir.path(), "/a%+41b.png"),
            Some(dir.path().join("a%+41b.png"))
        );
        assert_eq!(resolve(dir.path(), dir.path(), "/%2e%2e/%E5%9B%BE.png"), None);
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type(Path::new("a.HTML")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(content_type(Path::new("a.bin")), "application/octet-stream");
    }
}
