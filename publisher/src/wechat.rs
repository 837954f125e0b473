use crate::config::{Credentials, Paths};
use crate::content::{self, DraftFields};
use chrono::{Local, Utc};
use html_tools::{fix_editor_issues, remove_cover_image};
use log::{info, warn};
use reqwest::blocking::{multipart, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://api.weixin.qq.com/cgi-bin";
const DEFAULT_EXPIRES_IN: i64 = 7200;
// Refresh this many seconds before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 300;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum WeChatError {
    #[error("{context} failed (errcode {code}): {message}{hint}")]
    Api {
        context: &'static str,
        code: i64,
        message: String,
        hint: String,
    },
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to parse API response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Image file does not exist: {0}")]
    MissingImage(PathBuf),
    #[error("{0} response is missing {1}")]
    MissingField(&'static str, &'static str),
}

impl WeChatError {
    pub fn api(context: &'static str, code: i64, errmsg: &str, config_path: &Path) -> Self {
        let message = known_error_message(code)
            .map(str::to_string)
            .unwrap_or_else(|| errmsg.to_string());
        Self::Api {
            context,
            code,
            message,
            hint: remediation_hint(code, config_path),
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    fn token_expired(&self) -> bool {
        matches!(self.code(), Some(40001 | 42001))
    }
}

fn known_error_message(code: i64) -> Option<&'static str> {
    let message = match code {
        40001 => "AppSecret is wrong or does not belong to this AppID",
        40002 => "grant_type must be client_credential",
        40013 => "Invalid AppID, check that it is correct",
        40125 => "Invalid AppSecret, check that it is correct",
        40164 => "The calling IP address is not in the IP whitelist",
        41001 => "Missing access_token parameter",
        42001 => "access_token has expired",
        45009 => "API call quota exceeded (daily limit reached)",
        47003 => "Invalid parameters, check that all required fields are present",
        48001 => "API not authorised, check the account type",
        50005 => "User does not follow the official account",
        -1 => "System busy, try again later",
        _ => return None,
    };
    Some(message)
}

fn remediation_hint(code: i64, config_path: &Path) -> String {
    let mut hint = String::new();
    match code {
        40164 => {
            hint.push_str("\n\nTo fix:");
            hint.push_str("\n  1. Log in to https://mp.weixin.qq.com");
            hint.push_str("\n  2. Settings & Development -> Basic Configuration -> IP whitelist");
            hint.push_str("\n  3. Add this machine's IP address");
            if let Some(ip) = local_ip() {
                hint.push_str(&format!("\n  4. The current IP may be: {}", ip));
            }
        }
        40001 | 40125 | 40013 => {
            hint.push_str("\n\nTo fix:");
            hint.push_str("\n  1. Check the AppID and AppSecret in the config file");
            hint.push_str(&format!("\n  2. Config file: {}", config_path.display()));
            hint.push_str("\n  3. The AppID starts with wx and is 18 characters long");
        }
        45009 => {
            hint.push_str("\n\nTo fix:");
            hint.push_str("\n  The API quota is used up, try again tomorrow");
            hint.push_str("\n  or ask the WeChat platform for a higher quota");
        }
        _ => {}
    }
    hint
}

// Connecting a UDP socket sends nothing; it only selects the outbound interface.
fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

/// `errcode`/`errmsg` pair carried by every WeChat API response.
#[derive(Debug, Default, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(flatten)]
    status: ApiStatus,
    access_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(flatten)]
    status: ApiStatus,
    media_id: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    #[serde(flatten)]
    status: ApiStatus,
    media_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    #[serde(deserialize_with = "unix_seconds")]
    pub expires_at: i64,
    pub updated_at: String,
}

impl TokenCache {
    pub fn new(access_token: String, expires_in: i64, now: i64) -> Self {
        Self {
            access_token,
            expires_at: now + expires_in,
            updated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn is_fresh(&self, now: i64) -> bool {
        now < self.expires_at - EXPIRY_MARGIN_SECS
    }
}

// Older caches store a fractional timestamp.
fn unix_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(f64::deserialize(deserializer)? as i64)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub media_id: String,
    pub url: Option<String>,
}

/// Anything that can push a local image to WeChat's material library.
pub trait ImageUploader {
    fn upload_image(&mut self, path: &Path) -> Result<UploadedImage, WeChatError>;
}

#[derive(Debug, Serialize)]
struct DraftArticle<'a> {
    title: &'a str,
    author: &'a str,
    digest: &'a str,
    content: &'a str,
    content_source_url: &'a str,
    thumb_media_id: &'a str,
    show_cover_pic: u8,
    need_open_comment: u8,
    only_fans_can_comment: u8,
}

#[derive(Debug, Serialize)]
struct DraftRequest<'a> {
    articles: [DraftArticle<'a>; 1],
}

/// Everything needed to create one draft.
#[derive(Debug, Clone)]
pub struct DraftInput {
    pub title: String,
    pub author: String,
    pub digest: Option<String>,
    pub content: String,
    pub content_dir: PathBuf,
    pub thumb_media_id: String,
}

pub struct WeChatClient {
    http: Client,
    api_base: String,
    credentials: Credentials,
    paths: Paths,
    access_token: Option<String>,
}

impl WeChatClient {
    pub fn new(credentials: Credentials, paths: Paths) -> Result<Self, WeChatError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base: API_BASE.to_string(),
            credentials,
            paths,
            access_token: None,
        })
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: String) -> Self {
        self.http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()
            .unwrap();
        self.api_base = api_base;
        self
    }

    /// Returns a valid access token, from memory, the on-disk cache or the
    /// token endpoint in that order. `force_refresh` skips both caches.
    pub fn access_token(&mut self, force_refresh: bool) -> Result<String, WeChatError> {
        let now = Utc::now().timestamp();
        if !force_refresh {
            if let Some(token) = &self.access_token {
                return Ok(token.clone());
            }
            if let Some(token) = read_cached_token(&self.paths.token_cache, now) {
                info!("Using cached access_token");
                self.access_token = Some(token.clone());
                return Ok(token);
            }
        }

        info!("Requesting a new access_token");
        let response: TokenResponse = self.decode(
            self.http
                .get(format!("{}/token", self.api_base))
                .query(&[
                    ("grant_type", "client_credential"),
                    ("appid", self.credentials.appid.as_str()),
                    ("secret", self.credentials.appsecret.as_str()),
                ])
                .send()?,
        )?;
        self.check("Fetching access_token", &response.status)?;

        let token = response
            .access_token
            .ok_or(WeChatError::MissingField("token", "access_token"))?;
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);

        let cache = TokenCache::new(token.clone(), expires_in, now);
        if let Err(e) = write_token_cache(&self.paths.token_cache, &cache) {
            warn!("Failed to cache access_token: {}", e);
        }

        info!("Got access_token (valid for {}s)", expires_in);
        self.access_token = Some(token.clone());
        Ok(token)
    }

    /// Runs the content pipeline and creates the draft, returning its media_id.
    pub fn create_draft(&mut self, draft: &DraftInput) -> Result<String, WeChatError> {
        let content = remove_cover_image(&draft.content);

        info!("Processing images in the content");
        let (content, uploaded) = content::upload_content_images(&content, &draft.content_dir, self);
        if uploaded > 0 {
            info!("Uploaded {} content images", uploaded);
        }

        let fixed = fix_editor_issues(&content);
        info!(
            "Background blocks: {} converted, {} excluded",
            fixed.converted, fixed.excluded
        );
        info!("HTML adjusted for the WeChat editor");

        let fields = DraftFields::new(&draft.title, &draft.author, draft.digest.as_deref());
        info!("Creating draft: {}", fields.title);

        let body = serde_json::to_vec(&DraftRequest {
            articles: [DraftArticle {
                title: &fields.title,
                author: &fields.author,
                digest: &fields.digest,
                content: &fixed.html,
                content_source_url: "",
                thumb_media_id: &draft.thumb_media_id,
                show_cover_pic: 1,
                need_open_comment: 0,
                only_fans_can_comment: 0,
            }],
        })?;

        let token = self.access_token(false)?;
        let media_id = match self.post_draft(&token, &body) {
            Err(e) if e.token_expired() => {
                warn!("access_token expired, refreshing");
                let token = self.access_token(true)?;
                self.post_draft(&token, &body)?
            }
            other => other?,
        };

        info!("Draft created, media_id: {}", media_id);
        Ok(media_id)
    }

    fn post_draft(&self, token: &str, body: &[u8]) -> Result<String, WeChatError> {
        let response: DraftResponse = self.decode(
            self.http
                .post(format!("{}/draft/add", self.api_base))
                .query(&[("access_token", token)])
                .header("Content-Type", "application/json; charset=utf-8")
                .body(body.to_vec())
                .send()?,
        )?;
        self.check("Creating draft", &response.status)?;
        response
            .media_id
            .ok_or(WeChatError::MissingField("draft", "media_id"))
    }

    fn decode<T: DeserializeOwned>(
        &self,
        response: reqwest::blocking::Response,
    ) -> Result<T, WeChatError> {
        let text = response.text()?;
        Ok(serde_json::from_str(&text)?)
    }

    fn check(&self, context: &'static str, status: &ApiStatus) -> Result<(), WeChatError> {
        if status.errcode == 0 {
            return Ok(());
        }
        let errmsg = if status.errmsg.is_empty() {
            "Unknown error"
        } else {
            status.errmsg.as_str()
        };
        Err(WeChatError::api(context, status.errcode, errmsg, &self.paths.config))
    }
}

impl ImageUploader for WeChatClient {
    fn upload_image(&mut self, path: &Path) -> Result<UploadedImage, WeChatError> {
        if !path.is_file() {
            return Err(WeChatError::MissingImage(path.to_path_buf()));
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.jpg".to_string());
        info!("Uploading image: {}", file_name);

        let bytes = fs::read(path).map_err(|source| WeChatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new().part("media", part);

        let token = self.access_token(false)?;
        let response: UploadResponse = self.decode(
            self.http
                .post(format!("{}/material/add_material", self.api_base))
                .query(&[("access_token", token.as_str()), ("type", "image")])
                .multipart(form)
                .send()?,
        )?;
        self.check("Uploading image", &response.status)?;

        let media_id = response
            .media_id
            .ok_or(WeChatError::MissingField("upload", "media_id"))?;
        info!("Image uploaded (media_id: {})", media_id);
        Ok(UploadedImage {
            media_id,
            url: response.url.filter(|u| !u.is_empty()),
        })
    }
}

fn read_cached_token(path: &Path, now: i64) -> Option<String> {
    if !path.exists() {
        return None;
    }
    let cache = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str::<TokenCache>(&raw).map_err(|e| e.to_string()));
    match cache {
        Ok(cache) if cache.is_fresh(now) => Some(cache.access_token),
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to read token cache: {}", e);
            None
        }
    }
}

fn write_token_cache(path: &Path, cache: &TokenCache) -> Result<(), WeChatError> {
    let io_err = |source| WeChatError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, serde_json::to_string_pretty(cache)?).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread::{self, JoinHandle};
    use tempfile::{tempdir, TempDir};
    use tiny_http::{Response, Server};

    /// Answers requests in order with the given JSON bodies and hands back
    /// each request's URL and body once the replies run out.
    fn scripted_api(replies: &[&str]) -> (String, JoinHandle<Vec<(String, String)>>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let replies: Vec<String> = replies.iter().map(|r| r.to_string()).collect();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for reply in replies {
                let mut request = match server.recv_timeout(Duration::from_secs(10)) {
                    Ok(Some(request)) => request,
                    _ => break,
                };
                let mut body = Vec::new();
                request.as_reader().read_to_end(&mut body).unwrap();
                seen.push((
                    request.url().to_string(),
                    String::from_utf8_lossy(&body).into_owned(),
                ));
                request.respond(Response::from_string(reply)).unwrap();
            }
            seen
        });
        (format!("http://{}", addr), handle)
    }

    fn client(dir: &TempDir, api_base: String) -> WeChatClient {
        let credentials = Credentials {
            appid: "wx1234567890abcdef".to_string(),
            appsecret: "secret".to_string(),
        };
        WeChatClient::new(credentials, Paths::in_dir(dir.path()))
            .unwrap()
            .with_api_base(api_base)
    }

    fn draft(dir: &TempDir, content: &str) -> DraftInput {
        DraftInput {
            title: "标题".to_string(),
            author: "YanG".to_string(),
            digest: None,
            content: content.to_string(),
            content_dir: dir.path().to_path_buf(),
            thumb_media_id: "thumb".to_string(),
        }
    }

    #[test]
    fn known_codes_get_friendly_messages() {
        let err = WeChatError::api("Creating draft", 47003, "argument invalid", Path::new("c.json"));
        assert_eq!(
            err.to_string(),
            "Creating draft failed (errcode 47003): Invalid parameters, check that all required fields are present"
        );
    }

    #[test]
    fn unknown_codes_fall_back_to_errmsg() {
        let err = WeChatError::api("Uploading image", 40007, "invalid media_id", Path::new("c.json"));
        assert_eq!(err.to_string(), "Uploading image failed (errcode 40007): invalid media_id");
        assert_eq!(err.code(), Some(40007));
    }

    #[test]
    fn credential_errors_point_at_config() {
        let err = WeChatError::api("Fetching access_token", 40125, "", Path::new("/home/u/config.json"));
        let text = err.to_string();
        assert!(text.contains("Invalid AppSecret"));
        assert!(text.contains("Config file: /home/u/config.json"));
    }

    #[test]
    fn whitelist_and_quota_hints() {
        let whitelist = WeChatError::api("x", 40164, "", Path::new("c")).to_string();
        assert!(whitelist.contains("IP whitelist"));
        let quota = WeChatError::api("x", 45009, "", Path::new("c")).to_string();
        assert!(quota.contains("try again tomorrow"));
    }

    #[test]
    fn only_token_errors_trigger_refresh() {
        assert!(WeChatError::api("x", 40001, "", Path::new("c")).token_expired());
        assert!(WeChatError::api("x", 42001, "", Path::new("c")).token_expired());
        assert!(!WeChatError::api("x", 45009, "", Path::new("c")).token_expired());
        assert!(!WeChatError::MissingImage(PathBuf::from("a.png")).token_expired());
    }

    #[test]
    fn cached_token_respects_expiry_margin() {
        let cache = TokenCache::new("tok".to_string(), 7200, 1_000);
        assert_eq!(cache.expires_at, 8_200);
        assert!(cache.is_fresh(7_899));
        assert!(!cache.is_fresh(7_900));
    }

    #[test]
    fn token_cache_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/token_cache.json");
        write_token_cache(&path, &TokenCache::new("tok".to_string(), 7200, 1_000)).unwrap();

        assert_eq!(read_cached_token(&path, 2_000), Some("tok".to_string()));
        assert_eq!(read_cached_token(&path, 8_000), None);
        assert_eq!(read_cached_token(&dir.path().join("absent.json"), 0), None);
    }

    #[test]
    fn fractional_expiry_is_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token_cache.json");
        fs::write(
            &path,
            r#"{"access_token":"tok","expires_at":8200.75,"updated_at":"2025-01-01 10:00:00"}"#,
        )
        .unwrap();
        assert_eq!(read_cached_token(&path, 7_899), Some("tok".to_string()));
        assert_eq!(read_cached_token(&path, 7_900), None);
    }

    #[test]
    fn corrupt_token_cache_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token_cache.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(read_cached_token(&path, 0), None);
    }

    #[test]
    fn api_status_parses_success_and_failure() {
        let ok: UploadResponse =
            serde_json::from_str(r#"{"media_id":"m1","url":"http://mmbiz.qpic.cn/x"}"#).unwrap();
        assert_eq!(ok.status.errcode, 0);
        assert_eq!(ok.media_id.as_deref(), Some("m1"));

        let err: TokenResponse =
            serde_json::from_str(r#"{"errcode":40013,"errmsg":"invalid appid"}"#).unwrap();
        assert_eq!(err.status.errcode, 40013);
        assert!(err.access_token.is_none());
    }

    #[test]
    fn draft_json_keeps_non_ascii() {
        let body = serde_json::to_string(&DraftRequest {
            articles: [DraftArticle {
                title: "标题",
                author: "YanG",
                digest: "摘要",
                content: "<p>正文</p>",
                content_source_url: "",
                thumb_media_id: "thumb",
                show_cover_pic: 1,
                need_open_comment: 0,
                only_fans_can_comment: 0,
            }],
        })
        .unwrap();
        assert!(body.contains(r#""title":"标题""#));
        assert!(body.contains(r#""show_cover_pic":1"#));
        assert!(body.starts_with(r#"{"articles":[{"#));
    }

    #[test]
    fn expired_token_is_refreshed_once_and_draft_retried() {
        let dir = tempdir().unwrap();
        let (base, api) = scripted_api(&[
            r#"{"access_token":"t1","expires_in":7200}"#,
            r#"{"errcode":40001,"errmsg":"invalid credential"}"#,
            r#"{"access_token":"t2","expires_in":7200}"#,
            r#"{"media_id":"draft-1"}"#,
        ]);

        let mut wechat = client(&dir, base);
        let media_id = wechat.create_draft(&draft(&dir, "<p>body</p>")).unwrap();
        assert_eq!(media_id, "draft-1");

        let urls: Vec<String> = api.join().unwrap().into_iter().map(|(url, _)| url).collect();
        assert_eq!(urls.len(), 4);
        assert!(urls[0].starts_with("/token?grant_type=client_credential"));
        assert_eq!(urls[1], "/draft/add?access_token=t1");
        assert!(urls[2].starts_with("/token?"));
        assert_eq!(urls[3], "/draft/add?access_token=t2");
        assert_eq!(
            read_cached_token(&dir.path().join("token_cache.json"), Utc::now().timestamp()),
            Some("t2".to_string())
        );
    }

    #[test]
    fn second_expiry_is_returned_as_error() {
        let dir = tempdir().unwrap();
        let (base, api) = scripted_api(&[
            r#"{"access_token":"t1","expires_in":7200}"#,
            r#"{"errcode":40001,"errmsg":"invalid credential"}"#,
            r#"{"access_token":"t2","expires_in":7200}"#,
            r#"{"errcode":42001,"errmsg":"access_token expired"}"#,
        ]);

        let mut wechat = client(&dir, base);
        let err = wechat.create_draft(&draft(&dir, "<p>body</p>")).unwrap_err();
        assert_eq!(err.code(), Some(42001));
        assert_eq!(api.join().unwrap().len(), 4);
    }

    #[test]
    fn other_draft_errors_are_not_retried() {
        let dir = tempdir().unwrap();
        let (base, api) = scripted_api(&[
            r#"{"access_token":"t1","expires_in":7200}"#,
            r#"{"errcode":45009,"errmsg":"reach max api daily quota limit"}"#,
        ]);

        let mut wechat = client(&dir, base);
        let err = wechat.create_draft(&draft(&dir, "<p>body</p>")).unwrap_err();
        assert_eq!(err.code(), Some(45009));
        assert_eq!(api.join().unwrap().len(), 2);
    }

    #[test]
    fn content_goes_through_cover_removal_upload_and_editor_fix() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cover.png"), b"cover").unwrap();
        fs::write(dir.path().join("chart.png"), b"chart").unwrap();
        let (base, api) = scripted_api(&[
            r#"{"access_token":"t1","expires_in":7200}"#,
            r#"{"media_id":"m1","url":"http://mmbiz.qpic.cn/chart"}"#,
            r#"{"media_id":"draft-2"}"#,
        ]);

        let content = r#"<img src="cover.png"><div style="background-color:#f0f0f0;"><img src="chart.png"></div>"#;
        let mut wechat = client(&dir, base);
        assert_eq!(wechat.create_draft(&draft(&dir, content)).unwrap(), "draft-2");

        let seen = api.join().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].0.starts_with("/token?"));
        assert_eq!(seen[1].0, "/material/add_material?access_token=t1&type=image");
        assert_eq!(seen[2].0, "/draft/add?access_token=t1");

        let body: serde_json::Value = serde_json::from_str(&seen[2].1).unwrap();
        let article = &body["articles"][0];
        let html = article["content"].as_str().unwrap();
        assert!(!html.contains("cover.png"));
        assert!(html.contains("http://mmbiz.qpic.cn/chart"));
        assert!(html.starts_with("<table"));
        assert_eq!(article["title"], "标题");
        assert_eq!(article["digest"], "标题");
        assert_eq!(article["thumb_media_id"], "thumb");
    }
}
