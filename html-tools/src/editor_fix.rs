//! The pre-publish rewrite that keeps an article's look intact once it lands
//! in the WeChat draft editor.
//!
//! The editor re-renders newlines between tags as empty paragraphs, resets
//! `text-indent`, `margin`, `font-size` and alignment on anything not marked
//! `!important`, drops `box-shadow` and gradients, and discards background
//! colours on `<div>`/`<section>` (but not on table cells). Every pass below
//! targets one of those behaviours. All passes are regex based and leave
//! anything they do not recognise untouched.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// One leftmost-first pass over both tags; a block nested in a converted one
// stays inside the cell as is.
static RE_BG_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?is)<div\s+style="([^"]*background[^"]*)"[^>]*>(.*?)</div>"#,
        r#"|<section\s+style="([^"]*background[^"]*)"[^>]*>(.*?)</section>"#,
    ))
    .unwrap()
});
static RE_FIRST_MARGIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"margin[^:]*:\s*([^;!]+)").unwrap());

static RE_BETWEEN_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").unwrap());
static RE_AFTER_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+").unwrap());
static RE_BEFORE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+<").unwrap());
static RE_SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"  +").unwrap());

static RE_BORDER_RADIUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"border-radius:\s*([^;!]+);").unwrap());
static RE_BOX_SHADOW: Lazy<Regex> = Lazy::new(|| Regex::new(r"box-shadow:\s*[^;]+;\s*").unwrap());
static RE_TEXT_SHADOW: Lazy<Regex> = Lazy::new(|| Regex::new(r"text-shadow:\s*[^;]+;\s*").unwrap());
static RE_GRADIENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"background:\s*linear-gradient[^;]+;").unwrap());
static RE_BACKGROUND_HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bbackground:\s*([#a-fA-F0-9]+);").unwrap());
static RE_BACKGROUND_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"background-color:\s*([^;!]+);").unwrap());

static RE_LARGE_MARGIN_BOTTOM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"margin-bottom:\s*([3-9]\d+|[1-9]\d{2,})px;").unwrap());
static RE_MARGIN_TOP_BOTTOM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"margin:\s*\d+px\s+0\s+\d+px\s+0;").unwrap());

static RE_FIRST_STYLED_DIV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(<div[^>]*style="[^"]*)(">)"#).unwrap());
static RE_TEXT_INDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"text-indent:\s*[^;!]+;").unwrap());
static RE_TEXT_INDENT_ZERO: Lazy<Regex> = Lazy::new(|| Regex::new(r"text-indent:\s*0;").unwrap());
static RE_STYLE_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"style="([^"]*)""#).unwrap());

static RE_MARGIN_BOTTOM_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"margin:\s*0\s+0\s+\d+px\s+0;").unwrap());
static RE_MARGIN_BOTTOM: Lazy<Regex> = Lazy::new(|| Regex::new(r"margin-bottom:\s*\d+px;").unwrap());
static RE_MARGIN_VERTICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"margin:\s*\d+px\s+0;").unwrap());

static RE_VERTICAL_ALIGN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"vertical-align:\s*([^;!]+);").unwrap());
static RE_TEXT_ALIGN: Lazy<Regex> = Lazy::new(|| Regex::new(r"text-align:\s*([^;!]+);").unwrap());
static RE_INLINE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"display:\s*inline-block;").unwrap());
static RE_LINE_HEIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"line-height:\s*([^;!]+);").unwrap());
static RE_FONT_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"font-size:\s*([^;!]+);").unwrap());
static RE_PADDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"padding:\s*([^;!]+);").unwrap());

static RE_TABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<table[^>]*>.*?</table>").unwrap());
static RE_TABLE_STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<table\s+style=""#).unwrap());
static RE_TD_STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(<td\s+style="[^"]*)(">)"#).unwrap());
static RE_DASHED_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"border-top:\s*1px\s+dashed\s+#ccc;").unwrap());

static RE_STYLED_IMG: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<img([^>]*style="[^"]*)""#).unwrap());
static RE_IMG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<img([^>]*)>").unwrap());

const CARD_COLLAPSE: &str = "border-collapse:separate;border-spacing:0;overflow:hidden!important;";

/// Result of [`fix_editor_issues`]: the rewritten HTML plus how many
/// background blocks were turned into tables and how many were left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorFix {
    pub html: String,
    pub converted: usize,
    pub excluded: usize,
}

pub fn fix_editor_issues(html: &str) -> EditorFix {
    let mut converted = 0;
    let mut excluded = 0;

    let out = RE_BG_BLOCK.replace_all(html, |caps: &Captures| {
        let (style, inner) = match caps.get(1) {
            Some(style) => (style.as_str(), &caps[2]),
            None => (&caps[3], &caps[4]),
        };
        match background_block_to_table(style, inner) {
            BlockRewrite::Table(table) => {
                converted += 1;
                table
            }
            BlockRewrite::Excluded => {
                excluded += 1;
                caps[0].to_string()
            }
            BlockRewrite::Untouched => caps[0].to_string(),
        }
    });

    let out = compress_whitespace(&out);
    let out = normalise_backgrounds(&out);
    let out = out.replace("<section", "<div").replace("</section>", "</div>");

    let out = RE_LARGE_MARGIN_BOTTOM.replace_all(&out, "margin-bottom:18px;");
    let out = RE_MARGIN_TOP_BOTTOM.replace_all(&out, "margin:0 0 18px 0;");

    let out = RE_FIRST_STYLED_DIV.replacen(
        &out,
        1,
        "${1} text-indent: 0 !important; font-size: 15px !important;${2}",
    );
    let out = pin_text_indent(&out);
    let out = pin_margins(&out);
    let out = pin_layout(&out);

    let out = RE_TABLE.replace_all(&out, |caps: &Captures| round_card_table(&caps[0]));
    let out = RE_DASHED_RULE.replace_all(&out, "");
    let out = round_images(&out);

    EditorFix {
        html: out,
        converted,
        excluded,
    }
}

enum BlockRewrite {
    Table(String),
    Excluded,
    Untouched,
}

fn background_block_to_table(style: &str, inner: &str) -> BlockRewrite {
    let lower = style.to_lowercase();

    // Outer article container
    if style.contains("font-family") && lower.contains("ffffff") {
        return BlockRewrite::Excluded;
    }

    let compact = style.replace(' ', "");
    let white = compact.contains("background:#ffffff") || compact.contains("background-color:#ffffff");
    if white && !style.contains("border") {
        return BlockRewrite::Excluded;
    }

    if !lower.contains("background") {
        return BlockRewrite::Untouched;
    }

    let margin = RE_FIRST_MARGIN
        .captures(style)
        .map(|m| m[1].trim().to_string())
        .unwrap_or_else(|| "0".to_string());

    BlockRewrite::Table(format!(
        "<table style=\"width:100%!important;border-collapse:separate!important;border-spacing:0!important;border-radius:10px!important;overflow:hidden!important;margin:{}!important;\"><tr><td style=\"{}\">{}</td></tr></table>",
        margin,
        add_important(style),
        inner
    ))
}

/// Appends `!important` to every declaration that does not carry it yet.
pub fn add_important(style: &str) -> String {
    let declarations: Vec<String> = style
        .split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
        .map(|decl| {
            if decl.contains("!important") {
                decl.to_string()
            } else {
                format!("{}!important", decl)
            }
        })
        .collect();
    format!("{};", declarations.join(";"))
}

fn compress_whitespace(html: &str) -> String {
    let out = RE_BETWEEN_TAGS.replace_all(html, "><");
    let out = RE_AFTER_TAG.replace_all(&out, ">");
    let out = RE_BEFORE_TAG.replace_all(&out, "<");
    RE_SPACE_RUN.replace_all(&out, " ").into_owned()
}

fn normalise_backgrounds(html: &str) -> String {
    let out = RE_BORDER_RADIUS.replace_all(html, "border-radius:${1}!important;");
    let out = RE_BOX_SHADOW.replace_all(&out, "");
    let out = RE_TEXT_SHADOW.replace_all(&out, "");
    let out = RE_GRADIENT.replace_all(&out, "");
    let out = RE_BACKGROUND_HEX.replace_all(&out, "background-color:${1}!important;");
    RE_BACKGROUND_COLOR
        .replace_all(&out, "background-color:${1}!important;")
        .into_owned()
}

fn pin_text_indent(html: &str) -> String {
    let out = RE_TEXT_INDENT.replace_all(html, "text-indent: 0 !important;");
    let out = RE_TEXT_INDENT_ZERO.replace_all(&out, "text-indent: 0 !important;");
    RE_STYLE_ATTR
        .replace_all(&out, |caps: &Captures| {
            if caps[1].contains("text-indent") {
                caps[0].to_string()
            } else {
                format!("style=\"{} text-indent: 0 !important;\"", &caps[1])
            }
        })
        .into_owned()
}

fn pin_margins(html: &str) -> String {
    let out = RE_MARGIN_BOTTOM_ONLY.replace_all(html, "margin: 0 0 18px 0 !important;");
    let out = RE_MARGIN_BOTTOM.replace_all(&out, "margin-bottom: 18px !important;");
    RE_MARGIN_VERTICAL
        .replace_all(&out, "margin: 0 0 18px 0 !important;")
        .into_owned()
}

fn pin_layout(html: &str) -> String {
    let out = RE_VERTICAL_ALIGN.replace_all(html, "vertical-align: ${1} !important;");
    let out = RE_TEXT_ALIGN.replace_all(&out, "text-align: ${1} !important;");
    let out = RE_INLINE_BLOCK.replace_all(&out, "display: inline-block !important;");
    let out = RE_LINE_HEIGHT.replace_all(&out, "line-height: ${1} !important;");
    let out = RE_FONT_SIZE.replace_all(&out, "font-size: ${1} !important;");
    RE_PADDING
        .replace_all(&out, "padding: ${1} !important;")
        .into_owned()
}

/// Single-cell "card" tables get rounded corners; data tables (with header
/// cells) keep their collapsed borders.
fn round_card_table(table: &str) -> String {
    if table.to_lowercase().contains("<th") {
        return table.to_string();
    }

    let table = table
        .replace("border-collapse: collapse;", CARD_COLLAPSE)
        .replace("border-collapse:collapse;", CARD_COLLAPSE);
    let table = RE_TABLE_STYLE.replace_all(&table, "<table style=\"border-radius:10px!important;");
    RE_TD_STYLE
        .replace_all(&table, "${1}border-radius:10px!important;${2}")
        .into_owned()
}

fn round_images(html: &str) -> String {
    let out = RE_STYLED_IMG.replace_all(html, "<img${1};border-radius:8px!important;\"");
    RE_IMG
        .replace_all(&out, |caps: &Captures| {
            let attrs = &caps[1];
            if attrs.contains("style") {
                return caps[0].to_string();
            }
            match attrs.strip_suffix('/') {
                Some(attrs) => format!("<img{} style=\"border-radius:8px!important;\"/>", attrs),
                None => format!("<img{} style=\"border-radius:8px!important;\">", attrs),
            }
        })
        .into_owned()
}
