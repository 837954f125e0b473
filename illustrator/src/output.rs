use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

/// Creates the parent directory and, when `auto_rename` is set, moves an
/// existing `stem.ext` to the first free `stem_N.ext`.
pub fn prepare_output(path: &Path, auto_rename: bool) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    if auto_rename {
        Ok(unique_path(path))
    } else {
        Ok(path.to_path_buf())
    }
}

pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 1;
    loop {
        let candidate = parent.join(format!("{}_{}{}", stem, counter, ext));
        if !candidate.exists() {
            warn!(
                "File exists, renaming output: {} -> {}",
                path.file_name().unwrap_or_default().to_string_lossy(),
                candidate.file_name().unwrap_or_default().to_string_lossy()
            );
            return candidate;
        }
        counter += 1;
    }
}

pub fn prompt_preview(prompt: &str) -> String {
    if prompt.chars().count() > 100 {
        format!("{}...", prompt.chars().take(100).collect::<String>())
    } else {
        prompt.to_string()
    }
}
