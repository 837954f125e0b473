use crate::converter::Converter;
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

const MARKDOWN_EXTENSIONS: [&str; 2] = ["md", "markdown"];

/// Collects the Markdown files under `path`.
///
/// A single file is returned as-is when it has a Markdown extension and
/// skipped with a warning otherwise. Directories are scanned one level deep
/// unless `recursive` is set. The result is sorted and free of duplicates.
pub fn find_markdown_files(path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        if is_markdown(path) {
            return Ok(vec![path.to_path_buf()]);
        }
        warn!("{} is not a Markdown file, skipping", path.display());
        return Ok(Vec::new());
    }

    if !path.is_dir() {
        return Err(anyhow!("Path does not exist: {}", path.display()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = BTreeSet::new();
    for entry in WalkDir::new(path).max_depth(max_depth) {
        let entry = entry.with_context(|| format!("Failed to scan {}", path.display()))?;
        if entry.file_type().is_file() && is_markdown(entry.path()) {
            files.insert(entry.into_path());
        }
    }

    Ok(files.into_iter().collect())
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MARKDOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

struct FileOutcome {
    input: PathBuf,
    result: Result<(PathBuf, Duration), String>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64 * 100.0
    }

    pub fn log_summary(&self) {
        info!("Conversion summary");
        info!("Total files: {}", self.total);
        info!("Succeeded: {}", self.succeeded);
        info!("Failed: {}", self.failed.len());
        for (file, error) in &self.failed {
            info!("  {}: {}", file_name(file), error);
        }
        if self.total > 0 {
            info!("Success rate: {:.1}%", self.success_rate());
        }
    }
}

pub struct BatchConverter {
    converter: Converter,
    output_dir: Option<PathBuf>,
    workers: usize,
    show_progress: bool,
}

impl BatchConverter {
    pub fn new(converter: Converter, output_dir: Option<PathBuf>, workers: usize) -> Self {
        Self {
            converter,
            output_dir,
            workers: workers.max(1),
            show_progress: true,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.show_progress = !quiet;
        self
    }

    /// Where the HTML for `input` is written: the output directory when one
    /// was given, otherwise next to the source file.
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => {
                let stem = input.file_stem().unwrap_or_default().to_string_lossy();
                dir.join(format!("{}.html", stem))
            }
            None => input.with_extension("html"),
        }
    }

    pub fn convert_batch(&self, files: &[PathBuf]) -> Result<BatchReport> {
        let mut report = BatchReport {
            total: files.len(),
            ..BatchReport::default()
        };
        if files.is_empty() {
            warn!("No Markdown files found");
            return Ok(report);
        }

        info!("Found {} Markdown files", files.len());
        info!("Theme: {}", self.converter.theme().name());
        info!("Workers: {}", self.workers);
        match &self.output_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
                info!("Output directory: {}", dir.display());
            }
            None => info!("Output directory: next to each source file"),
        }

        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<FileOutcome>();

        thread::scope(|scope| {
            for _ in 0..self.workers.min(files.len()) {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(input) = files.get(index) else {
                        break;
                    };
                    if tx.send(self.convert_single_file(input)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            for outcome in rx {
                let done = report.succeeded + report.failed.len() + 1;
                match outcome.result {
                    Ok((output, elapsed)) => {
                        report.succeeded += 1;
                        if self.show_progress {
                            info!(
                                "[{}/{}] {} -> {} ({:.2}s)",
                                done,
                                report.total,
                                file_name(&outcome.input),
                                file_name(&output),
                                elapsed.as_secs_f64()
                            );
                        }
                    }
                    Err(error) => {
                        if self.show_progress {
                            warn!(
                                "[{}/{}] {} failed: {}",
                                done,
                                report.total,
                                file_name(&outcome.input),
                                error
                            );
                        }
                        report.failed.push((outcome.input, error));
                    }
                }
            }
        });

        Ok(report)
    }

    fn convert_single_file(&self, input: &Path) -> FileOutcome {
        let output = self.output_path_for(input);
        let started = Instant::now();
        let result = self
            .converter
            .convert_file(input, &output)
            .map(|written| (written, started.elapsed()))
            .map_err(|e| e.to_string());
        FileOutcome {
            input: input.to_path_buf(),
            result,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::Theme;
    use tempfile::tempdir;

    fn touch(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn finds_markdown_in_directory() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("b.md"), "b");
        touch(&dir.path().join("a.markdown"), "a");
        touch(&dir.path().join("notes.txt"), "x");
        touch(&dir.path().join("nested/c.md"), "c");

        let flat = find_markdown_files(dir.path(), false).unwrap();
        assert_eq!(
            flat,
            vec![dir.path().join("a.markdown"), dir.path().join("b.md")]
        );

        let deep = find_markdown_files(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&dir.path().join("nested/c.md")));
    }

    #[test]
    fn single_file_inputs() {
        let dir = tempdir().unwrap();
        let md = dir.path().join("post.md");
        let txt = dir.path().join("post.txt");
        touch(&md, "x");
        touch(&txt, "x");

        assert_eq!(find_markdown_files(&md, false).unwrap(), vec![md.clone()]);
        assert!(find_markdown_files(&txt, false).unwrap().is_empty());
        assert!(find_markdown_files(&dir.path().join("nope"), false).is_err());
    }

    #[test]
    fn output_path_defaults_next_to_source() {
        let batch = BatchConverter::new(Converter::new(Theme::Tech), None, 2);
        assert_eq!(
            batch.output_path_for(Path::new("posts/hello.md")),
            PathBuf::from("posts/hello.html")
        );

        let batch = BatchConverter::new(Converter::new(Theme::Tech), Some(PathBuf::from("out")), 2);
        assert_eq!(
            batch.output_path_for(Path::new("posts/hello.md")),
            PathBuf::from("out/hello.html")
        );
    }

    #[test]
    fn zero_workers_still_converts() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("solo.md");
        touch(&input, "# Solo");

        let batch = BatchConverter::new(Converter::new(Theme::Tech), None, 0).quiet(true);
        assert_eq!(batch.workers, 1);
        let report = batch.convert_batch(&[input]).unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(dir.path().join("solo.html").is_file());
    }

    #[test]
    fn empty_batch_is_an_empty_report() {
        let report = BatchConverter::new(Converter::new(Theme::Tech), None, 2)
            .quiet(true)
            .convert_batch(&[])
            .unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.success_rate(), 0.0);
    }

    #[test]
    fn converts_every_file_across_workers() {
        let dir = tempdir().unwrap();
        let files: Vec<PathBuf> = (0..7)
            .map(|i| {
                let path = dir.path().join(format!("post{}.md", i));
                touch(&path, &format!("# Post {}\n\nbody", i));
                path
            })
            .collect();
        let out = dir.path().join("html");

        let report = BatchConverter::new(Converter::new(Theme::Minimal), Some(out.clone()), 3)
            .quiet(true)
            .convert_batch(&files)
            .unwrap();

        assert_eq!(report.total, 7);
        assert_eq!(report.succeeded, 7);
        assert!(report.failed.is_empty());
        assert_eq!(report.success_rate(), 100.0);
        for i in 0..7 {
            let html = fs::read_to_string(out.join(format!("post{}.html", i))).unwrap();
            assert!(html.contains(&format!("<title>Post {}</title>", i)));
        }
    }

    #[test]
    fn failures_are_reported_per_file() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.md");
        touch(&good, "ok");
        let missing = dir.path().join("missing.md");

        let report = BatchConverter::new(Converter::new(Theme::Tech), None, 4)
            .quiet(true)
            .convert_batch(&[good, missing.clone()])
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, missing);
        assert_eq!(report.success_rate(), 50.0);
    }
}
