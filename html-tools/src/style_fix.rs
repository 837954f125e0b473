//! Light-weight style repair for articles pasted into the WeChat editor:
//! strips inter-tag whitespace (rendered as blank lines in edit mode), kills
//! the editor's first-line indent and pins alignment rules with `!important`.
//! Code blocks are stashed first so their formatting is left alone.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_PRE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<pre[^>]*>.*?</pre>").unwrap());
static RE_BETWEEN_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").unwrap());
static RE_COMMENT_THEN_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(<!--[^>]+-->)<").unwrap());
static RE_TEXT_INDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"text-indent:\s*[^;!]+;").unwrap());
static RE_TEXT_INDENT_ZERO: Lazy<Regex> = Lazy::new(|| Regex::new(r"text-indent:\s*0;").unwrap());
static RE_VERTICAL_ALIGN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"vertical-align:\s*([^;]+);").unwrap());
static RE_TEXT_ALIGN: Lazy<Regex> = Lazy::new(|| Regex::new(r"text-align:\s*([^;!]+);").unwrap());
static RE_MARGIN_VERTICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"margin:\s*\d+px\s+0;").unwrap());
static RE_MARGIN_ZERO: Lazy<Regex> = Lazy::new(|| Regex::new(r"margin:\s*0;").unwrap());
static RE_MARGIN_BOTTOM: Lazy<Regex> = Lazy::new(|| Regex::new(r"margin-bottom:\s*\d+px;").unwrap());
static RE_INLINE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"display:\s*inline-block;").unwrap());
static RE_MARGIN_BOTTOM_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"margin:\s*0\s+0\s+\d+px\s+0;").unwrap());

const PLACEHOLDER_PREFIX: &str = "___CODE_BLOCK_";

pub fn fix_wechat_style(html: &str) -> String {
    let mut code_blocks: Vec<String> = Vec::new();
    let out = RE_PRE_BLOCK.replace_all(html, |caps: &Captures| {
        code_blocks.push(caps[0].to_string());
        placeholder(code_blocks.len() - 1)
    });

    let out = RE_BETWEEN_TAGS.replace_all(&out, "><");
    let out = RE_COMMENT_THEN_TAG.replace_all(&out, "${1}\n<");

    let out = RE_TEXT_INDENT.replace_all(&out, "text-indent: 0 !important;");
    let out = RE_TEXT_INDENT_ZERO.replace_all(&out, "text-indent: 0 !important;");
    let out = RE_VERTICAL_ALIGN.replace_all(&out, "vertical-align: ${1} !important;");
    let out = RE_TEXT_ALIGN.replace_all(&out, "text-align: ${1} !important;");

    let out = RE_MARGIN_VERTICAL.replace_all(&out, "margin: 0 0 8px 0;");
    let out = RE_MARGIN_ZERO.replace_all(&out, "margin: 0 0 8px 0;");
    let out = RE_MARGIN_BOTTOM.replace_all(&out, "margin-bottom: 12px;");

    let out = RE_INLINE_BLOCK.replace_all(&out, "display: inline-block !important;");
    let out = RE_MARGIN_BOTTOM_ONLY.replace_all(&out, |caps: &Captures| {
        caps[0].replace(';', " !important;")
    });

    let mut out = out.into_owned();
    for (i, block) in code_blocks.iter().enumerate() {
        out = out.replace(&placeholder(i), block);
    }
    out
}

fn placeholder(index: usize) -> String {
    format!("{}{}___", PLACEHOLDER_PREFIX, index)
}
