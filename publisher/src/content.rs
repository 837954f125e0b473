use crate::wechat::ImageUploader;
use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use std::path::Path;

const MAX_TITLE_CHARS: usize = 64;
const MAX_TITLE_BYTES: usize = 192;
const MAX_AUTHOR_BYTES: usize = 20;
const MAX_DIGEST_BYTES: usize = 120;
const DEFAULT_DIGEST_BYTES: usize = 54;

static RE_IMG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img([^>]*?)src=["']([^"']+)["']([^>]*?)>"#).unwrap());
static RE_FULL_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!doctype\s+html|<html[\s>]|<body[\s>]").unwrap());

/// Returns what should be published: the inner HTML of `<body>` for a full
/// document, the input unchanged for a fragment.
pub fn publishable_html(html: &str) -> String {
    if !RE_FULL_DOCUMENT.is_match(html) {
        return html.to_string();
    }
    let document = Html::parse_document(html);
    match Selector::parse("body") {
        Ok(selector) => document
            .select(&selector)
            .next()
            .map(|body| body.inner_html().trim().to_string())
            .unwrap_or_else(|| html.to_string()),
        Err(_) => html.to_string(),
    }
}

/// Text of the first `<h1>`, falling back to `<title>`.
pub fn derive_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    ["h1", "title"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        document
            .select(&selector)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|text| !text.is_empty())
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uploads local images referenced by `html` and points their `src` at the
/// hosted copy. Remote images and the cover are left alone, as is any image
/// that cannot be found or uploaded. Returns the rewritten HTML and the number
/// of images replaced.
pub fn upload_content_images(
    html: &str,
    base_dir: &Path,
    uploader: &mut impl ImageUploader,
) -> (String, usize) {
    let mut uploaded = 0;
    let rewritten = RE_IMG.replace_all(html, |caps: &Captures| {
        let original = caps[0].to_string();
        let src = &caps[2];
        if src.starts_with("http://") || src.starts_with("https://") {
            return original;
        }
        if src.to_lowercase().contains("cover") {
            return original;
        }

        let path = base_dir.join(src);
        if !path.exists() {
            warn!("Image not found, skipping: {}", src);
            return original;
        }

        match uploader.upload_image(&path) {
            Ok(image) => match image.url {
                Some(url) => {
                    uploaded += 1;
                    format!("<img{}src=\"{}\"{}>", &caps[1], url, &caps[3])
                }
                None => {
                    warn!("No URL returned for {}, keeping original path", src);
                    original
                }
            },
            Err(e) => {
                warn!("Failed to upload {}: {}", src, e);
                original
            }
        }
    });
    (rewritten.into_owned(), uploaded)
}

/// Draft metadata trimmed to the limits of the draft API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftFields {
    pub title: String,
    pub author: String,
    pub digest: String,
}

impl DraftFields {
    pub fn new(title: &str, author: &str, digest: Option<&str>) -> Self {
        let title = fit_title(title);

        let short_author = truncate_to_max_bytes_utf8(author, MAX_AUTHOR_BYTES);
        if short_author != author {
            warn!("Author too long, truncated: {} -> {}", author, short_author);
        }

        let digest = match digest.filter(|d| !d.is_empty()) {
            Some(d) => d.to_string(),
            None => truncate_to_max_bytes_utf8(&title, DEFAULT_DIGEST_BYTES),
        };
        let short_digest = truncate_to_max_bytes_utf8(&digest, MAX_DIGEST_BYTES);
        if short_digest != digest {
            warn!("Digest too long, truncated");
        }

        Self {
            title,
            author: short_author,
            digest: short_digest,
        }
    }
}

fn fit_title(title: &str) -> String {
    let chars = title.chars().count();
    if chars > MAX_TITLE_CHARS {
        let short: String = title.chars().take(MAX_TITLE_CHARS).collect();
        warn!(
            "Title is {} characters (limit {}), truncated to: {}",
            chars, MAX_TITLE_CHARS, short
        );
        warn!("The full title can be restored in the WeChat editor");
        return short;
    }
    if title.len() > MAX_TITLE_BYTES {
        let short = truncate_to_max_bytes_utf8(title, MAX_TITLE_BYTES);
        warn!(
            "Title is {} bytes (limit {}), truncated to: {}",
            title.len(),
            MAX_TITLE_BYTES,
            short
        );
        warn!("The full title can be restored in the WeChat editor");
        return short;
    }
    title.to_string()
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a character.
pub fn truncate_to_max_bytes_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = 0;
    for (idx, ch) in s.char_indices() {
        if idx + ch.len_utf8() > max_bytes {
            break;
        }
        end = idx + ch.len_utf8();
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wechat::{UploadedImage, WeChatError};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct FakeUploader {
        calls: Vec<PathBuf>,
        url_for: fn(&Path) -> Option<String>,
    }

    impl ImageUploader for FakeUploader {
        fn upload_image(&mut self, path: &Path) -> Result<UploadedImage, WeChatError> {
            self.calls.push(path.to_path_buf());
            if path.ends_with("broken.png") {
                return Err(WeChatError::MissingField("upload", "media_id"));
            }
            Ok(UploadedImage {
                media_id: "m".to_string(),
                url: (self.url_for)(path),
            })
        }
    }

    fn hosted(path: &Path) -> Option<String> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        Some(format!("https://mmbiz.qpic.cn/{}", name))
    }

    #[test]
    fn uploads_local_images_and_rewrites_src() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("img")).unwrap();
        fs::write(dir.path().join("img/a.png"), b"png").unwrap();
        fs::write(dir.path().join("my-cover.png"), b"png").unwrap();
        fs::write(dir.path().join("broken.png"), b"png").unwrap();

        let html = concat!(
            r#"<img alt="a" src="img/a.png" style="width:100%">"#,
            r#"<img src="https://example.com/remote.png">"#,
            r#"<img src="my-cover.png">"#,
            r#"<img src='missing.png'>"#,
            r#"<img src="broken.png">"#,
        );
        let mut uploader = FakeUploader {
            calls: Vec::new(),
            url_for: hosted,
        };

        let (out, count) = upload_content_images(html, dir.path(), &mut uploader);

        assert_eq!(count, 1);
        assert_eq!(
            uploader.calls,
            vec![dir.path().join("img/a.png"), dir.path().join("broken.png")]
        );
        assert!(out.starts_with(
            r#"<img alt="a" src="https://mmbiz.qpic.cn/a.png" style="width:100%">"#
        ));
        assert!(out.contains(r#"<img src="https://example.com/remote.png">"#));
        assert!(out.contains(r#"<img src="my-cover.png">"#));
        assert!(out.contains(r#"<img src='missing.png'>"#));
        assert!(out.ends_with(r#"<img src="broken.png">"#));
    }

    #[test]
    fn keeps_tag_when_no_url_comes_back() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.png"), b"png").unwrap();
        let mut uploader = FakeUploader {
            calls: Vec::new(),
            url_for: |_| None,
        };

        let html = r#"<p><img src="a.png"></p>"#;
        let (out, count) = upload_content_images(html, dir.path(), &mut uploader);
        assert_eq!(out, html);
        assert_eq!(count, 0);
    }

    #[test]
    fn extracts_body_of_full_documents() {
        let doc = "<!DOCTYPE html><html><head><title>T</title></head><body>\n<section style=\"color: red\"><p>Hi</p></section>\n</body></html>";
        assert_eq!(
            publishable_html(doc),
            "<section style=\"color: red\"><p>Hi</p></section>"
        );

        let fragment = "<section><p>Hi</p></section>";
        assert_eq!(publishable_html(fragment), fragment);
    }

    #[test]
    fn title_from_h1_then_title_tag() {
        let with_h1 = "<html><head><title>Page</title></head><body><h1> Hello\n  World </h1><h1>Second</h1></body></html>";
        assert_eq!(derive_title(with_h1).as_deref(), Some("Hello World"));

        let title_only = "<html><head><title>Page</title></head><body><p>x</p></body></html>";
        assert_eq!(derive_title(title_only).as_deref(), Some("Page"));

        assert_eq!(derive_title("<p>nothing</p>"), None);
    }

    #[test]
    fn byte_truncation_respects_char_boundaries() {
        assert_eq!(truncate_to_max_bytes_utf8("abc", 5), "abc");
        assert_eq!(truncate_to_max_bytes_utf8("中文标题", 7), "中文");
        assert_eq!(truncate_to_max_bytes_utf8("中文标题", 2), "");
    }

    #[test]
    fn long_titles_are_truncated_by_chars_first() {
        let title = "字".repeat(70);
        let fields = DraftFields::new(&title, "YanG", None);
        assert_eq!(fields.title.chars().count(), 64);
        // 54 bytes of three-byte characters
        assert_eq!(fields.digest, "字".repeat(18));
    }

    #[test]
    fn titles_within_char_limit_can_still_exceed_bytes() {
        let title = "😀".repeat(60);
        let fields = DraftFields::new(&title, "", None);
        assert_eq!(fields.title, "😀".repeat(48));
    }

    #[test]
    fn author_and_digest_limits() {
        let fields = DraftFields::new("T", "作者名字很长很长很长", Some(&"d".repeat(150)));
        assert_eq!(fields.author, "作者名字很长");
        assert_eq!(fields.digest.len(), 120);

        let fields = DraftFields::new("Short title", "YanG", Some(""));
        assert_eq!(fields.digest, "Short title");
        assert_eq!(fields.author, "YanG");
    }
}
