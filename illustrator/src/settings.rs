use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_OPENROUTER_MODEL: &str = "google/gemini-2.5-flash-image-preview";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image-preview";

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    jimeng: JimengSettings,
    #[serde(default)]
    openrouter: ProviderSettings,
    #[serde(default)]
    gemini: ProviderSettings,
}

#[derive(Debug, Default, Deserialize)]
struct JimengSettings {
    access_key_id: Option<String>,
    ak: Option<String>,
    secret_access_key: Option<String>,
    sk: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderSettings {
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyConfig {
    pub api_key: String,
    pub model: String,
}

/// Project settings first, then the install-relative fallback.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".claude").join("config").join("settings.json")];
    if let Some(exe_dir) = env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        paths.push(exe_dir.join("..").join("config").join("settings.json"));
    }
    paths
}

/// Parses the first settings file that exists. No file at all means empty
/// settings; a file that exists but is not valid JSON is an error.
pub fn load_from(paths: &[PathBuf]) -> Result<Settings> {
    for path in paths {
        if !path.is_file() {
            continue;
        }
        debug!("Loading settings from {}", path.display());
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        return serde_json::from_str(&raw)
            .with_context(|| format!("Settings file is not valid JSON: {}", path.display()));
    }
    Ok(Settings::default())
}

fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v.starts_with("your-") || v.starts_with("your_")
}

fn pick(candidates: &[Option<&str>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .find(|v| !is_placeholder(v))
        .map(|v| v.trim().to_string())
}

impl Settings {
    /// Access key and secret key for Jimeng, from settings then environment.
    pub fn jimeng_keys(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<(String, String)> {
        let volc_ak = lookup("VOLC_ACCESSKEY");
        let jimeng_ak = lookup("JIMENG_AK");
        let access_key = pick(&[
            self.jimeng.access_key_id.as_deref(),
            self.jimeng.ak.as_deref(),
            volc_ak.as_deref(),
            jimeng_ak.as_deref(),
        ])
        .ok_or_else(|| {
            anyhow!(
                "Jimeng Access Key ID is not configured: set jimeng.access_key_id in \
                 .claude/config/settings.json or the VOLC_ACCESSKEY environment variable"
            )
        })?;

        let volc_sk = lookup("VOLC_SECRETKEY");
        let jimeng_sk = lookup("JIMENG_SK");
        let secret_key = pick(&[
            self.jimeng.secret_access_key.as_deref(),
            self.jimeng.sk.as_deref(),
            volc_sk.as_deref(),
            jimeng_sk.as_deref(),
        ])
        .ok_or_else(|| {
            anyhow!(
                "Jimeng Secret Access Key is not configured: set jimeng.secret_access_key in \
                 .claude/config/settings.json or the VOLC_SECRETKEY environment variable"
            )
        })?;

        Ok((access_key, secret_key))
    }

    pub fn openrouter(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<ApiKeyConfig> {
        api_key_config(&self.openrouter, "openrouter", "OPENROUTER_API_KEY", DEFAULT_OPENROUTER_MODEL, lookup)
    }

    pub fn gemini(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<ApiKeyConfig> {
        api_key_config(&self.gemini, "gemini", "GEMINI_API_KEY", DEFAULT_GEMINI_MODEL, lookup)
    }
}

fn api_key_config(
    settings: &ProviderSettings,
    section: &str,
    env_key: &str,
    default_model: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ApiKeyConfig> {
    let from_env = lookup(env_key);
    let api_key = pick(&[settings.api_key.as_deref(), from_env.as_deref()]).ok_or_else(|| {
        anyhow!(
            "{} API key is not configured: set {}.api_key in settings or the {} environment variable",
            section,
            section,
            env_key
        )
    })?;
    let model = pick(&[settings.model.as_deref()]).unwrap_or_else(|| default_model.to_string());
    Ok(ApiKeyConfig { api_key, model })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(json: &str) -> Settings {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn first_existing_file_wins() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("missing.json");
        let second = dir.path().join("settings.json");
        let third = dir.path().join("other.json");
        fs::write(&second, r#"{"jimeng":{"ak":"AK2","sk":"SK2"}}"#).unwrap();
        fs::write(&third, r#"{"jimeng":{"ak":"AK3","sk":"SK3"}}"#).unwrap();

        let settings = load_from(&[first, second, third]).unwrap();
        assert_eq!(
            settings.jimeng_keys(no_env).unwrap(),
            ("AK2".to_string(), "SK2".to_string())
        );
    }

    #[test]
    fn no_files_means_empty_settings() {
        let dir = tempdir().unwrap();
        let settings = load_from(&[dir.path().join("nope.json")]).unwrap();
        assert!(settings.jimeng_keys(no_env).is_err());
    }

    #[test]
    fn invalid_json_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{").unwrap();
        assert!(load_from(&[path]).is_err());
    }

    #[test]
    fn long_names_beat_short_names() {
        let settings = parse(
            r#"{"jimeng":{"access_key_id":"AK","ak":"short","secret_access_key":"SK","sk":"short"}}"#,
        );
        assert_eq!(
            settings.jimeng_keys(no_env).unwrap(),
            ("AK".to_string(), "SK".to_string())
        );
    }

    #[test]
    fn placeholders_fall_through_to_env() {
        let settings = parse(
            r#"{"jimeng":{"access_key_id":"your-access-key-id-here","secret_access_key":"your-secret-access-key-here"}}"#,
        );
        let env = |key: &str| match key {
            "JIMENG_AK" => Some("env-ak".to_string()),
            "VOLC_SECRETKEY" => Some("env-sk".to_string()),
            "JIMENG_SK" => Some("ignored".to_string()),
            _ => None,
        };
        assert_eq!(
            settings.jimeng_keys(env).unwrap(),
            ("env-ak".to_string(), "env-sk".to_string())
        );
    }

    #[test]
    fn chat_providers_use_default_models() {
        let settings = parse(r#"{"gemini":{"api_key":"g-key","model":"gemini-custom"}}"#);
        assert_eq!(
            settings.gemini(no_env).unwrap(),
            ApiKeyConfig {
                api_key: "g-key".to_string(),
                model: "gemini-custom".to_string()
            }
        );

        let env = |key: &str| (key == "OPENROUTER_API_KEY").then(|| "or-key".to_string());
        let openrouter = settings.openrouter(env).unwrap();
        assert_eq!(openrouter.api_key, "or-key");
        assert_eq!(openrouter.model, DEFAULT_OPENROUTER_MODEL);

        assert!(Settings::default().gemini(no_env).is_err());
    }
}
