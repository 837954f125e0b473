//! The cover image is uploaded separately as the draft thumbnail, so it must
//! not also appear at the top of the article body.

use once_cell::sync::Lazy;
use regex::Regex;

static COVER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)<img[^>]*src=["']cover\.(png|jpg|jpeg|gif)["'][^>]*>"#,
        r#"(?i)<img[^>]*alt=["'][^"']*封面[^"']*["'][^>]*>"#,
        r#"(?i)<img[^>]*title=["'][^"']*封面[^"']*["'][^>]*>"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

// An image placed right after the "title" marker comment is the cover slot.
static RE_IMG_AFTER_TITLE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(<!--[^>]*标题[^>]*-->)\s*<img[^>]*>").unwrap());

pub fn remove_cover_image(html: &str) -> String {
    let mut out = html.to_string();
    for re in COVER_PATTERNS.iter() {
        out = re.replace_all(&out, "").into_owned();
    }
    RE_IMG_AFTER_TITLE_COMMENT
        .replacen(&out, 1, "${1}")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_cover_file_reference() {
        let html = r#"<p>a</p><img src="cover.png" alt="x"><p>b</p><img src='COVER.JPG'>"#;
        assert_eq!(remove_cover_image(html), "<p>a</p><p>b</p>");
    }

    #[test]
    fn removes_images_labelled_as_cover() {
        let html = r#"<img src="hero.png" alt="文章封面"><img src="x.png" title="封面图"><img src="keep.png">"#;
        assert_eq!(remove_cover_image(html), r#"<img src="keep.png">"#);
    }

    #[test]
    fn removes_only_first_image_after_title_comment() {
        let html = "<!-- 标题区域 -->\n<img src=\"hero.png\"><p>t</p><!-- 标题 --><img src=\"second.png\">";
        assert_eq!(
            remove_cover_image(html),
            "<!-- 标题区域 --><p>t</p><!-- 标题 --><img src=\"second.png\">"
        );
    }

    #[test]
    fn other_images_stay() {
        let html = r#"<img src="images/cover-story.png"><img src="diagram.png">"#;
        assert_eq!(remove_cover_image(html), html);
    }
}
