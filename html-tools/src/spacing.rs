//! Tightens the generous margins produced by the article themes so a long
//! article reads denser on a phone screen.

use once_cell::sync::Lazy;
use regex::Regex;

/// Literal rewrites, applied in order. Later entries may no longer match
/// once an earlier one rewrote their prefix; that ordering is intentional.
const MARGIN_REWRITES: &[(&str, &str)] = &[
    // paragraphs
    ("margin: 18px 0", "margin: 4px 0"),
    ("margin: 15px 0", "margin: 4px 0"),
    ("margin: 20px 0", "margin: 4px 0"),
    ("margin: 8px 0", "margin: 4px 0"),
    ("margin: 15px 0 0 0", "margin: 4px 0 0 0"),
    // headings
    ("margin: 40px 0", "margin: 12px 0"),
    ("margin: 28px 0 20px 0", "margin: 12px 0 6px 0"),
    ("margin: 32px 0 24px 0", "margin: 14px 0 8px 0"),
    ("margin: 20px 0 12px 0", "margin: 12px 0 6px 0"),
    ("margin: 24px 0 16px 0", "margin: 14px 0 8px 0"),
    // images
    ("margin: 24px auto", "margin: 8px auto"),
    ("margin: 12px auto", "margin: 6px auto"),
    // first-line indent of two characters
    ("text-indent: 0;", "text-indent: 2em;"),
];

static RE_BETWEEN_PARAGRAPHS: Lazy<Regex> = Lazy::new(|| Regex::new(r"</p>\s+<p").unwrap());
static RE_BETWEEN_SECTIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</section>\s+<section").unwrap());

pub fn optimize_spacing(html: &str) -> String {
    let mut out = html.to_string();
    for (from, to) in MARGIN_REWRITES {
        out = out.replace(from, to);
    }

    let out = RE_BETWEEN_PARAGRAPHS.replace_all(&out, "</p><p");
    RE_BETWEEN_SECTIONS
        .replace_all(&out, "</section><section")
        .into_owned()
}
