//! Inline-style themes. The WeChat editor drops `<style>` blocks and class
//! based rules, so every element carries its full CSS in a `style` attribute.
//!
//! The outer container always sets `font-family` and a `#ffffff` background:
//! the publisher's editor pass relies on that pair to recognise the container
//! and leave it as a `<div>` instead of turning it into a card table.

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Theme {
    /// Blue accents, centred headings, dark code blocks
    #[default]
    Tech,
    /// Black and white with generous whitespace
    Minimal,
    /// Navy and gold, serif headings
    Business,
}

impl Theme {
    pub fn name(self) -> &'static str {
        match self {
            Theme::Tech => "tech",
            Theme::Minimal => "minimal",
            Theme::Business => "business",
        }
    }

    pub fn styles(self) -> &'static Styles {
        match self {
            Theme::Tech => &TECH,
            Theme::Minimal => &MINIMAL,
            Theme::Business => &BUSINESS,
        }
    }
}

#[derive(Debug)]
pub struct Styles {
    pub container: &'static str,
    pub h1: &'static str,
    pub h2: &'static str,
    pub h3: &'static str,
    pub h4: &'static str,
    pub paragraph: &'static str,
    pub strong: &'static str,
    pub em: &'static str,
    pub del: &'static str,
    pub inline_code: &'static str,
    pub code_block: &'static str,
    pub blockquote: &'static str,
    pub list: &'static str,
    pub list_item: &'static str,
    pub link: &'static str,
    pub image: &'static str,
    pub hr: &'static str,
    pub table: &'static str,
    pub th: &'static str,
    pub td: &'static str,
}

impl Styles {
    pub fn heading(&self, level: usize) -> &'static str {
        match level {
            1 => self.h1,
            2 => self.h2,
            3 => self.h3,
            _ => self.h4,
        }
    }
}

static TECH: Styles = Styles {
    container: "font-family: -apple-system, BlinkMacSystemFont, 'PingFang SC', 'Microsoft YaHei', sans-serif; font-size: 15px; line-height: 1.75; color: #333333; background-color: #ffffff; padding: 8px 4px; word-break: break-word;",
    h1: "font-size: 22px; font-weight: bold; color: #1a73e8; margin: 32px 0 24px 0; text-align: center;",
    h2: "font-size: 19px; font-weight: bold; color: #1a73e8; margin: 28px 0 20px 0; padding-left: 10px; border-left: 4px solid #1a73e8;",
    h3: "font-size: 17px; font-weight: bold; color: #2c3e50; margin: 24px 0 16px 0;",
    h4: "font-size: 15px; font-weight: bold; color: #2c3e50; margin: 20px 0 12px 0;",
    paragraph: "margin: 18px 0; text-indent: 0; text-align: justify; letter-spacing: 0.5px;",
    strong: "font-weight: bold; color: #1a73e8;",
    em: "font-style: italic; color: #555555;",
    del: "text-decoration: line-through; color: #999999;",
    inline_code: "font-family: Menlo, Consolas, monospace; font-size: 13px; color: #d6336c; background-color: #f3f4f6; padding: 2px 4px; border-radius: 3px;",
    code_block: "font-family: Menlo, Consolas, monospace; font-size: 13px; line-height: 1.6; color: #e6edf3; background-color: #1e1e2e; padding: 14px 16px; margin: 18px 0; border-radius: 6px; white-space: pre; overflow-x: auto;",
    blockquote: "margin: 18px 0; padding: 12px 16px; color: #555555; background-color: #f0f7ff; border-left: 4px solid #1a73e8;",
    list: "margin: 15px 0; padding-left: 24px;",
    list_item: "margin: 8px 0; line-height: 1.75;",
    link: "color: #1a73e8; text-decoration: none; border-bottom: 1px solid #1a73e8;",
    image: "display: block; max-width: 100%; margin: 24px auto; border-radius: 4px;",
    hr: "border: none; border-top: 1px solid #e5e7eb; margin: 24px 0;",
    table: "width: 100%; border-collapse: collapse; margin: 18px 0; font-size: 14px;",
    th: "background-color: #1a73e8; color: #ffffff; padding: 8px 10px; border: 1px solid #d0d7de; font-weight: bold;",
    td: "padding: 8px 10px; border: 1px solid #d0d7de;",
};

static MINIMAL: Styles = Styles {
    container: "font-family: Georgia, 'Songti SC', serif; font-size: 16px; line-height: 1.9; color: #222222; background-color: #ffffff; padding: 8px 4px;",
    h1: "font-size: 24px; font-weight: normal; color: #111111; margin: 40px 0; text-align: center; letter-spacing: 2px;",
    h2: "font-size: 20px; font-weight: normal; color: #111111; margin: 40px 0; border-bottom: 1px solid #dddddd; padding-bottom: 6px;",
    h3: "font-size: 17px; font-weight: bold; color: #111111; margin: 24px 0 16px 0;",
    h4: "font-size: 16px; font-weight: bold; color: #333333; margin: 20px 0 12px 0;",
    paragraph: "margin: 15px 0; text-indent: 0;",
    strong: "font-weight: bold; color: #000000;",
    em: "font-style: italic;",
    del: "text-decoration: line-through; color: #aaaaaa;",
    inline_code: "font-family: Menlo, Consolas, monospace; font-size: 14px; background-color: #f5f5f5; padding: 1px 4px;",
    code_block: "font-family: Menlo, Consolas, monospace; font-size: 13px; line-height: 1.6; color: #333333; background-color: #f7f7f7; padding: 12px 14px; margin: 15px 0; white-space: pre; overflow-x: auto;",
    blockquote: "margin: 15px 0; padding: 4px 16px; color: #666666; border-left: 2px solid #cccccc;",
    list: "margin: 15px 0; padding-left: 22px;",
    list_item: "margin: 8px 0;",
    link: "color: #222222; text-decoration: underline;",
    image: "display: block; max-width: 100%; margin: 24px auto;",
    hr: "border: none; border-top: 1px solid #dddddd; margin: 40px 0;",
    table: "width: 100%; border-collapse: collapse; margin: 15px 0; font-size: 14px;",
    th: "padding: 6px 8px; border-bottom: 2px solid #222222; font-weight: bold;",
    td: "padding: 6px 8px; border-bottom: 1px solid #eeeeee;",
};

static BUSINESS: Styles = Styles {
    container: "font-family: 'Helvetica Neue', 'PingFang SC', 'Microsoft YaHei', sans-serif; font-size: 15px; line-height: 1.8; color: #2b2b2b; background-color: #ffffff; padding: 8px 4px;",
    h1: "font-size: 22px; font-weight: bold; color: #1f3a5f; margin: 32px 0 24px 0; text-align: center; border-bottom: 2px solid #c9a227; padding-bottom: 10px;",
    h2: "font-size: 18px; font-weight: bold; color: #ffffff; background-color: #1f3a5f; margin: 28px 0 20px 0; padding: 6px 12px;",
    h3: "font-size: 16px; font-weight: bold; color: #1f3a5f; margin: 24px 0 16px 0; border-left: 3px solid #c9a227; padding-left: 8px;",
    h4: "font-size: 15px; font-weight: bold; color: #1f3a5f; margin: 20px 0 12px 0;",
    paragraph: "margin: 20px 0; text-indent: 0; text-align: justify;",
    strong: "font-weight: bold; color: #1f3a5f;",
    em: "font-style: italic; color: #6b5b2a;",
    del: "text-decoration: line-through; color: #999999;",
    inline_code: "font-family: Menlo, Consolas, monospace; font-size: 13px; color: #1f3a5f; background-color: #f2f4f7; padding: 2px 4px; border-radius: 2px;",
    code_block: "font-family: Menlo, Consolas, monospace; font-size: 13px; line-height: 1.6; color: #2b2b2b; background-color: #f2f4f7; padding: 12px 16px; margin: 20px 0; border-radius: 4px; white-space: pre; overflow-x: auto;",
    blockquote: "margin: 20px 0; padding: 12px 16px; color: #4a4a4a; background-color: #faf6e8; border-left: 4px solid #c9a227;",
    list: "margin: 15px 0; padding-left: 24px;",
    list_item: "margin: 8px 0;",
    link: "color: #1f3a5f; text-decoration: underline;",
    image: "display: block; max-width: 100%; margin: 24px auto; border: 1px solid #e5e5e5;",
    hr: "border: none; border-top: 1px solid #c9a227; margin: 24px 0;",
    table: "width: 100%; border-collapse: collapse; margin: 20px 0; font-size: 14px;",
    th: "background-color: #1f3a5f; color: #ffffff; padding: 8px 10px; border: 1px solid #c8ccd2;",
    td: "padding: 8px 10px; border: 1px solid #c8ccd2;",
};
