use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".wechat-publisher";
const CONFIG_FILE: &str = "config.json";
const TOKEN_CACHE_FILE: &str = "token_cache.json";

const APPID_PLACEHOLDERS: [&str; 2] = ["your_appid", "your_appid_here"];
const APPSECRET_PLACEHOLDERS: [&str; 2] = ["your_appsecret", "your_appsecret_here"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub appid: String,
    #[serde(default)]
    pub appsecret: String,
}

/// Locations of the files kept under `~/.wechat-publisher`.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config: PathBuf,
    pub token_cache: PathBuf,
}

impl Paths {
    pub fn in_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(Self::in_dir(&home.join(CONFIG_DIR)))
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            token_cache: dir.join(TOKEN_CACHE_FILE),
        }
    }
}

/// Loads the AppID/AppSecret pair: config file first, then `WECHAT_APPID` and
/// `WECHAT_APPSECRET` on top. With nothing configured and a terminal attached
/// the user is walked through creating the config file.
pub fn load_credentials(paths: &Paths) -> Result<Credentials> {
    let from_file = read_config_file(&paths.config)?;
    let mut credentials = with_env_overrides(from_file.clone().unwrap_or_default(), |key| {
        env::var(key).ok()
    });

    if from_file.is_none() && credentials.appid.is_empty() && credentials.appsecret.is_empty() {
        if !io::stdin().is_terminal() {
            bail!(
                "No credentials configured. Create {} with {{\"appid\": \"...\", \"appsecret\": \"...\"}} \
                 or set WECHAT_APPID and WECHAT_APPSECRET",
                paths.config.display()
            );
        }
        credentials = interactive_setup(&paths.config)?;
    }

    let credentials = validate(credentials, &paths.config)?;
    info!("Configuration loaded (AppID: {}***)", masked_appid(&credentials.appid));
    Ok(credentials)
}

fn read_config_file(path: &Path) -> Result<Option<Credentials>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let parsed = serde_json::from_str(&raw)
        .with_context(|| format!("Config file is not valid JSON: {}", path.display()))?;
    Ok(Some(parsed))
}

fn with_env_overrides(
    mut credentials: Credentials,
    lookup: impl Fn(&str) -> Option<String>,
) -> Credentials {
    if let Some(appid) = lookup("WECHAT_APPID").filter(|v| !v.trim().is_empty()) {
        credentials.appid = appid;
    }
    if let Some(appsecret) = lookup("WECHAT_APPSECRET").filter(|v| !v.trim().is_empty()) {
        credentials.appsecret = appsecret;
    }
    credentials
}

fn validate(credentials: Credentials, config_path: &Path) -> Result<Credentials> {
    let appid = credentials.appid.trim().to_string();
    let appsecret = credentials.appsecret.trim().to_string();

    if appid.is_empty() || APPID_PLACEHOLDERS.contains(&appid.as_str()) {
        bail!("Please set a valid appid in {}", config_path.display());
    }
    if appsecret.is_empty() || APPSECRET_PLACEHOLDERS.contains(&appsecret.as_str()) {
        bail!("Please set a valid appsecret in {}", config_path.display());
    }
    if !appid.starts_with("wx") || appid.chars().count() != 18 {
        warn!("AppID format looks wrong (expected 18 characters starting with wx)");
    }

    Ok(Credentials { appid, appsecret })
}

pub fn masked_appid(appid: &str) -> String {
    appid.chars().take(6).collect()
}

fn interactive_setup(config_path: &Path) -> Result<Credentials> {
    println!("{}", "=".repeat(60));
    println!("  WeChat draft publisher: first-time setup");
    println!("{}", "=".repeat(60));
    println!("Find your credentials at https://mp.weixin.qq.com");
    println!("  Settings & Development -> Basic Configuration -> AppID / AppSecret\n");

    let answer = prompt("Configure now? (Y/n): ")?.to_lowercase();
    if !matches!(answer.as_str(), "" | "y" | "yes") {
        bail!(
            "Create {} manually with {{\"appid\": \"your_appid\", \"appsecret\": \"your_appsecret\"}}",
            config_path.display()
        );
    }

    let credentials = Credentials {
        appid: prompt("AppID (starts with wx): ")?,
        appsecret: prompt("AppSecret: ")?,
    };
    if !credentials.appid.starts_with("wx") {
        warn!("AppID usually starts with wx");
    }

    save_credentials(config_path, &credentials)?;
    info!("Configuration saved to {} (mode 600)", config_path.display());
    Ok(credentials)
}

pub fn save_credentials(path: &Path, credentials: &Credentials) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(credentials)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
    }
    Ok(())
}

/// Reads one trimmed line from stdin after printing `label`.
pub fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn creds(appid: &str, appsecret: &str) -> Credentials {
        Credentials {
            appid: appid.to_string(),
            appsecret: appsecret.to_string(),
        }
    }

    #[test]
    fn env_overrides_file_values() {
        let file = creds("wx_from_file_00000", "file-secret");
        let merged = with_env_overrides(file, |key| match key {
            "WECHAT_APPSECRET" => Some("env-secret".to_string()),
            "WECHAT_APPID" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(merged, creds("wx_from_file_00000", "env-secret"));
    }

    #[test]
    fn rejects_placeholders_and_blanks() {
        let path = Path::new("config.json");
        assert!(validate(creds("your_appid_here", "s3cret"), path).is_err());
        assert!(validate(creds("wx1234567890abcdef", "your_appsecret"), path).is_err());
        assert!(validate(creds("", "s3cret"), path).is_err());
    }

    #[test]
    fn odd_appid_is_only_a_warning() {
        let ok = validate(creds(" abc ", " s3cret "), Path::new("config.json")).unwrap();
        assert_eq!(ok, creds("abc", "s3cret"));
    }

    #[test]
    fn masks_all_but_prefix() {
        assert_eq!(masked_appid("wx1234567890abcdef"), "wx1234");
        assert_eq!(masked_appid("wx"), "wx");
    }

    #[test]
    fn saved_config_reads_back() {
        let dir = tempdir().unwrap();
        let paths = Paths::in_dir(&dir.path().join(".wechat-publisher"));
        let saved = creds("wx1234567890abcdef", "s3cret");
        save_credentials(&paths.config, &saved).unwrap();

        assert_eq!(read_config_file(&paths.config).unwrap(), Some(saved));
        assert_eq!(read_config_file(&paths.token_cache).unwrap(), None);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&paths.config).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{appid: nope").unwrap();
        assert!(read_config_file(&path).is_err());
    }
}
