/// Rich log content: BBCode escaping/stripping and lightweight markup rendering.
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// BBCode that is trusted to be displayed as-is.
///
/// Plain strings never become `RichText` implicitly: they go through
/// [`bbcode_escape`] when rendered, so user input cannot inject markup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RichText(String);

impl RichText {
    /// Wraps already sanitized BBCode. The caller vouches for its content.
    pub fn from_trusted(bbcode: impl Into<String>) -> Self {
        Self(bbcode.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Escapes BBCode brackets in text for safe display in RichTextLabel.
pub fn bbcode_escape(text: &str) -> String {
    text.replace('[', "~LB~")
        .replace(']', "~RB~")
        .replace("~LB~", "[lb]")
        .replace("~RB~", "[rb]")
}

/// Strips all BBCode tags from text, returning plain text.
pub fn bbcode_strip(text: &str) -> String {
    let unescaped = text.replace("[lb]", "\u{1}").replace("[rb]", "\u{2}");
    let mut result = String::with_capacity(unescaped.len());
    let mut in_brackets = false;
    for c in unescaped.chars() {
        match c {
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            _ if !in_brackets => result.push(c),
            _ => {}
        }
    }
    result.replace('\u{1}', "[").replace('\u{2}', "]")
}

/// Renders lightweight markup (a CommonMark subset) to BBCode.
///
/// Raw HTML is shown literally. Tables and heading ids are not enabled.
pub fn render_markdown(source: &str) -> RichText {
    let parser = Parser::new_ext(source, Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(source.len());
    let mut lists: Vec<Option<u64>> = Vec::new();

    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph => {}
                Tag::Heading { level, .. } => {
                    let size = heading_size(level);
                    out.push_str(&format!("[b][font_size={}]", size));
                }
                Tag::Emphasis => out.push_str("[i]"),
                Tag::Strong => out.push_str("[b]"),
                Tag::Strikethrough => out.push_str("[s]"),
                Tag::CodeBlock(_) => out.push_str("[code]"),
                Tag::BlockQuote(_) => out.push_str("[indent]"),
                Tag::Link { dest_url, .. } => {
                    out.push_str(&format!("[url={}]", bbcode_escape(&dest_url)));
                }
                Tag::List(start) => {
                    if !lists.is_empty() {
                        push_line_break(&mut out);
                    }
                    lists.push(start);
                }
                Tag::Item => {
                    let depth = lists.len().saturating_sub(1);
                    out.push_str(&"  ".repeat(depth));
                    match lists.last_mut() {
                        Some(Some(n)) => {
                            out.push_str(&format!("{}. ", n));
                            *n += 1;
                        }
                        _ => out.push_str("• "),
                    }
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Paragraph => {
                    if lists.is_empty() {
                        out.push_str("\n\n");
                    }
                }
                TagEnd::Heading(_) => out.push_str("[/font_size][/b]\n\n"),
                TagEnd::Emphasis => out.push_str("[/i]"),
                TagEnd::Strong => out.push_str("[/b]"),
                TagEnd::Strikethrough => out.push_str("[/s]"),
                TagEnd::CodeBlock => {
                    trim_trailing_newlines(&mut out);
                    out.push_str("[/code]\n\n");
                }
                TagEnd::BlockQuote(_) => {
                    trim_trailing_newlines(&mut out);
                    out.push_str("[/indent]\n\n");
                }
                TagEnd::Link => out.push_str("[/url]"),
                TagEnd::List(_) => {
                    lists.pop();
                    if lists.is_empty() {
                        out.push('\n');
                    }
                }
                TagEnd::Item => push_line_break(&mut out),
                _ => {}
            },
            Event::Text(text) => out.push_str(&bbcode_escape(&text)),
            Event::Code(code) => {
                out.push_str("[code]");
                out.push_str(&bbcode_escape(&code));
                out.push_str("[/code]");
            }
            Event::Html(html) | Event::InlineHtml(html) => out.push_str(&bbcode_escape(&html)),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::Rule => out.push_str("----------\n\n"),
            _ => {}
        }
    }

    trim_trailing_newlines(&mut out);
    RichText(out)
}

fn heading_size(level: HeadingLevel) -> u32 {
    match level {
        HeadingLevel::H1 => 24,
        HeadingLevel::H2 => 20,
        HeadingLevel::H3 => 18,
        _ => 16,
    }
}

fn push_line_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn trim_trailing_newlines(out: &mut String) {
    while out.ends_with('\n') {
        out.pop();
    }
}
