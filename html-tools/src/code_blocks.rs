//! Rewrites `<pre><code>` blocks into the `<div>` + `<br>` + `&nbsp;` form the
//! WeChat editor keeps intact. The editor collapses whitespace inside `<pre>`,
//! so indentation and line breaks have to be spelled out as markup.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_PRE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<pre[^>]*><code[^>]*>(.*?)</code></pre>").unwrap());
static RE_PRE_STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<pre\s+style="([^"]+)""#).unwrap());
static RE_WHITE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"white-space:\s*[^;]+;?").unwrap());
static RE_OVERFLOW: Lazy<Regex> = Lazy::new(|| Regex::new(r"overflow[^:]*:\s*[^;]+;?").unwrap());

/// Converts every `<pre><code>` block in `html`.
pub fn convert_code_blocks(html: &str) -> String {
    RE_PRE_CODE
        .replace_all(html, |caps: &Captures| convert_pre_block(caps))
        .into_owned()
}

fn convert_pre_block(caps: &Captures) -> String {
    let pre_tag = &caps[0];
    let body = spell_out_whitespace(&caps[1]);

    match RE_PRE_STYLE.captures(pre_tag) {
        Some(style) => {
            let style = RE_WHITE_SPACE.replace_all(&style[1], "");
            let style = RE_OVERFLOW.replace_all(&style, "");
            format!("<div style=\"{}\">{}</div>", style.trim(), body)
        }
        None => format!("<div>{}</div>", body),
    }
}

/// Spaces become `&nbsp;` and newlines `<br>`, but tags (e.g. highlighter
/// spans) are copied through untouched.
fn spell_out_whitespace(code: &str) -> String {
    let mut out = String::with_capacity(code.len() * 2);
    let mut rest = code;

    while let Some(ch) = rest.chars().next() {
        match ch {
            '<' => match rest.find('>') {
                Some(end) => {
                    out.push_str(&rest[..=end]);
                    rest = &rest[end + 1..];
                    continue;
                }
                None => out.push('<'),
            },
            '\n' => out.push_str("<br>\n"),
            ' ' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
        rest = &rest[ch.len_utf8()..];
    }

    out
}
