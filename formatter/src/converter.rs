use crate::theme::{Styles, Theme};
use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A converted article: the themed HTML fragment plus the text of its first
/// level-1 heading, if there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Converter {
    theme: Theme,
}

impl Converter {
    pub fn new(theme: Theme) -> Self {
        Self { theme }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn convert(&self, markdown: &str) -> Article {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let styles = self.theme.styles();
        let mut renderer = Renderer::new(styles);
        for event in Parser::new_ext(markdown, options) {
            renderer.event(event);
        }

        Article {
            title: renderer.title,
            body: format!(
                "<section style=\"{}\">\n{}</section>",
                styles.container, renderer.out
            ),
        }
    }

    /// Converts `input` and writes a standalone HTML document to `output`.
    pub fn convert_file(&self, input: &Path, output: &Path) -> Result<PathBuf, ConvertError> {
        let markdown = fs::read_to_string(input).map_err(|source| ConvertError::Read {
            path: input.to_path_buf(),
            source,
        })?;

        let article = self.convert(&markdown);
        let fallback = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let document = render_document(&article, &fallback);

        let write_err = |source| ConvertError::Write {
            path: output.to_path_buf(),
            source,
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(output, document).map_err(write_err)?;

        Ok(output.to_path_buf())
    }
}

pub fn render_document(article: &Article, fallback_title: &str) -> String {
    let title = article.title.as_deref().unwrap_or(fallback_title);
    format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{}</title>
</head>
<body>
{}
</body>
</html>
"#,
        escape_html(title),
        article.body
    )
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

struct PendingImage {
    src: String,
    title: String,
    alt: String,
}

struct Renderer {
    styles: &'static Styles,
    out: String,
    title: Option<String>,
    // Collecting the text of the first h1
    title_buf: Option<String>,
    image: Option<PendingImage>,
    in_code_block: bool,
    alignments: Vec<Alignment>,
    in_table_head: bool,
    cell_index: usize,
}

impl Renderer {
    fn new(styles: &'static Styles) -> Self {
        Self {
            styles,
            out: String::new(),
            title: None,
            title_buf: None,
            image: None,
            in_code_block: false,
            alignments: Vec::new(),
            in_table_head: false,
            cell_index: 0,
        }
    }

    fn event(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                self.collect_title(&code);
                if let Some(image) = self.image.as_mut() {
                    image.alt.push_str(&code);
                } else {
                    self.out.push_str(&format!(
                        "<code style=\"{}\">{}</code>",
                        self.styles.inline_code,
                        escape_html(&code)
                    ));
                }
            }
            Event::Html(html) | Event::InlineHtml(html) => self.out.push_str(&html),
            Event::SoftBreak => {
                if self.image.is_some() {
                    self.push_alt(" ");
                } else {
                    self.out.push('\n');
                }
            }
            Event::HardBreak => self.out.push_str("<br>\n"),
            Event::Rule => self
                .out
                .push_str(&format!("<hr style=\"{}\">\n", self.styles.hr)),
            Event::FootnoteReference(name) => self
                .out
                .push_str(&format!("<sup>[{}]</sup>", escape_html(&name))),
            Event::TaskListMarker(checked) => self.out.push_str(if checked { "☑ " } else { "☐ " }),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag) {
        // Only plain text makes it into an image's alt attribute
        if self.image.is_some() {
            return;
        }
        let styles = self.styles;
        match tag {
            Tag::Paragraph => self.open("p", styles.paragraph),
            Tag::Heading { level, .. } => {
                if level == HeadingLevel::H1 && self.title.is_none() && self.title_buf.is_none() {
                    self.title_buf = Some(String::new());
                }
                let depth = heading_depth(level);
                self.open(&format!("h{}", depth), styles.heading(depth));
            }
            Tag::BlockQuote => self.open("blockquote", styles.blockquote),
            Tag::CodeBlock(kind) => {
                self.in_code_block = true;
                self.out
                    .push_str(&format!("<pre style=\"{}\">", styles.code_block));
                match kind {
                    CodeBlockKind::Fenced(lang) if !lang.trim().is_empty() => {
                        let lang = lang.split_whitespace().next().unwrap_or_default();
                        self.out.push_str(&format!(
                            "<code class=\"language-{}\">",
                            escape_html(lang)
                        ));
                    }
                    _ => self.out.push_str("<code>"),
                }
            }
            Tag::List(Some(start)) if start != 1 => self.out.push_str(&format!(
                "<ol start=\"{}\" style=\"{}\">\n",
                start, styles.list
            )),
            Tag::List(Some(_)) => self.open_block("ol", styles.list),
            Tag::List(None) => self.open_block("ul", styles.list),
            Tag::Item => self.open("li", styles.list_item),
            Tag::Table(alignments) => {
                self.alignments = alignments;
                self.open_block("table", styles.table);
            }
            Tag::TableHead => {
                self.in_table_head = true;
                self.cell_index = 0;
                self.out.push_str("<thead><tr>");
            }
            Tag::TableRow => {
                self.cell_index = 0;
                self.out.push_str("<tr>");
            }
            Tag::TableCell => {
                let (cell, style) = if self.in_table_head {
                    ("th", styles.th)
                } else {
                    ("td", styles.td)
                };
                let align = match self.alignments.get(self.cell_index) {
                    Some(Alignment::Left) => " text-align: left;",
                    Some(Alignment::Center) => " text-align: center;",
                    Some(Alignment::Right) => " text-align: right;",
                    _ => "",
                };
                self.out
                    .push_str(&format!("<{} style=\"{}{}\">", cell, style, align));
            }
            Tag::Emphasis => self.open("em", styles.em),
            Tag::Strong => self.open("strong", styles.strong),
            Tag::Strikethrough => self.open("del", styles.del),
            Tag::Link { dest_url, title, .. } => {
                let title = if title.is_empty() {
                    String::new()
                } else {
                    format!(" title=\"{}\"", escape_html(&title))
                };
                self.out.push_str(&format!(
                    "<a href=\"{}\"{} style=\"{}\">",
                    escape_html(&dest_url),
                    title,
                    styles.link
                ));
            }
            Tag::Image { dest_url, title, .. } => {
                self.image = Some(PendingImage {
                    src: dest_url.to_string(),
                    title: title.to_string(),
                    alt: String::new(),
                });
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        if self.image.is_some() && tag != TagEnd::Image {
            return;
        }
        match tag {
            TagEnd::Paragraph => self.out.push_str("</p>\n"),
            TagEnd::Heading(level) => {
                if level == HeadingLevel::H1 {
                    if let Some(text) = self.title_buf.take() {
                        let text = text.trim().to_string();
                        if !text.is_empty() {
                            self.title = Some(text);
                        }
                    }
                }
                self.out
                    .push_str(&format!("</h{}>\n", heading_depth(level)));
            }
            TagEnd::BlockQuote => self.out.push_str("</blockquote>\n"),
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.out.push_str("</code></pre>\n");
            }
            TagEnd::List(true) => self.out.push_str("</ol>\n"),
            TagEnd::List(false) => self.out.push_str("</ul>\n"),
            TagEnd::Item => self.out.push_str("</li>\n"),
            TagEnd::Table => {
                self.alignments.clear();
                self.out.push_str("</tbody></table>\n");
            }
            TagEnd::TableHead => {
                self.in_table_head = false;
                self.out.push_str("</tr></thead><tbody>\n");
            }
            TagEnd::TableRow => self.out.push_str("</tr>\n"),
            TagEnd::TableCell => {
                let cell = if self.in_table_head { "th" } else { "td" };
                self.out.push_str(&format!("</{}>", cell));
                self.cell_index += 1;
            }
            TagEnd::Emphasis => self.out.push_str("</em>"),
            TagEnd::Strong => self.out.push_str("</strong>"),
            TagEnd::Strikethrough => self.out.push_str("</del>"),
            TagEnd::Link => self.out.push_str("</a>"),
            TagEnd::Image => {
                if let Some(image) = self.image.take() {
                    let title = if image.title.is_empty() {
                        String::new()
                    } else {
                        format!(" title=\"{}\"", escape_html(&image.title))
                    };
                    self.out.push_str(&format!(
                        "<img src=\"{}\" alt=\"{}\"{} style=\"{}\">",
                        escape_html(&image.src),
                        escape_html(&image.alt),
                        title,
                        self.styles.image
                    ));
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.image.is_some() {
            self.push_alt(text);
            return;
        }
        if !self.in_code_block {
            self.collect_title(text);
        }
        self.out.push_str(&escape_html(text));
    }

    fn collect_title(&mut self, text: &str) {
        if let Some(buf) = self.title_buf.as_mut() {
            buf.push_str(text);
        }
    }

    fn push_alt(&mut self, text: &str) {
        if let Some(image) = self.image.as_mut() {
            image.alt.push_str(text);
        }
    }

    fn open(&mut self, tag: &str, style: &str) {
        self.out.push_str(&format!("<{} style=\"{}\">", tag, style));
    }

    fn open_block(&mut self, tag: &str, style: &str) {
        self.out.push_str(&format!("<{} style=\"{}\">\n", tag, style));
    }
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
