//! Markdown to terminal text: pulldown-cmark events rendered with crossterm styling.

use crossterm::style::Stylize;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// Render `text` for the terminal with ANSI styling.
pub fn render(text: &str) -> String {
    Renderer::new(true).run(text)
}

/// Render `text` to plain text (layout only, no escape codes).
pub fn render_plain(text: &str) -> String {
    Renderer::new(false).run(text)
}

struct Renderer {
    styled: bool,
    out: String,
    bold: usize,
    italic: usize,
    strike: usize,
    heading: bool,
    quote: usize,
    code_block: bool,
    /// One entry per open list: next number for ordered lists, None for bullets.
    lists: Vec<Option<u64>>,
    link_dest: Vec<String>,
}

impl Renderer {
    fn new(styled: bool) -> Self {
        Self {
            styled,
            out: String::new(),
            bold: 0,
            italic: 0,
            strike: 0,
            heading: false,
            quote: 0,
            code_block: false,
            lists: Vec::new(),
            link_dest: Vec::new(),
        }
    }

    fn run(mut self, text: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        for event in Parser::new_ext(text, options) {
            self.event(event);
        }
        self.out.trim_end_matches('\n').to_string()
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(t) => {
                if self.code_block {
                    self.code_text(&t);
                } else {
                    self.text(&t);
                }
            }
            Event::Code(t) => {
                let s = if self.styled {
                    t.to_string().cyan().to_string()
                } else {
                    format!("`{}`", t)
                };
                self.out.push_str(&s);
            }
            Event::Html(t) | Event::InlineHtml(t) => self.out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => self.newline(),
            Event::Rule => {
                self.block_break();
                self.out.push_str(&"─".repeat(40));
                self.block_break();
            }
            Event::TaskListMarker(done) => {
                self.out.push_str(if done { "[x] " } else { "[ ] " });
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { .. } => {
                self.block_break();
                self.heading = true;
            }
            Tag::BlockQuote { .. } => {
                self.block_break();
                self.quote += 1;
                self.quote_prefix();
            }
            Tag::CodeBlock(kind) => {
                self.block_break();
                self.code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        let label = format!("[{}]", lang);
                        self.push_dim(&label);
                        self.out.push('\n');
                    }
                }
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.block_break();
                } else if !self.out.ends_with('\n') {
                    self.out.push('\n');
                }
                self.lists.push(start);
            }
            Tag::Item => {
                if !self.out.is_empty() && !self.out.ends_with('\n') {
                    self.out.push('\n');
                }
                let depth = self.lists.len().saturating_sub(1);
                self.out.push_str(&"  ".repeat(depth));
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let m = format!("{}. ", n);
                        *n += 1;
                        m
                    }
                    _ => "• ".to_string(),
                };
                self.out.push_str(&marker);
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => self.link_dest.push(dest_url.to_string()),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.lists.is_empty() {
                    self.block_break();
                } else {
                    self.newline();
                }
            }
            TagEnd::Heading { .. } => {
                self.heading = false;
                self.block_break();
            }
            TagEnd::BlockQuote { .. } => {
                self.quote = self.quote.saturating_sub(1);
                self.block_break();
            }
            TagEnd::CodeBlock => {
                self.code_block = false;
                self.block_break();
            }
            TagEnd::List { .. } => {
                self.lists.pop();
                if self.lists.is_empty() {
                    self.block_break();
                }
            }
            TagEnd::Item => {
                if !self.out.ends_with('\n') {
                    self.out.push('\n');
                }
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => {
                if let Some(dest) = self.link_dest.pop() {
                    let s = format!(" ({})", dest);
                    self.push_dim(&s);
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, t: &str) {
        if !self.styled {
            self.out.push_str(t);
            return;
        }
        let mut s = t.to_string().stylize();
        if self.bold > 0 || self.heading {
            s = s.bold();
        }
        if self.heading {
            s = s.underlined();
        }
        if self.italic > 0 || self.quote > 0 {
            s = s.italic();
        }
        if self.strike > 0 {
            s = s.crossed_out();
        }
        self.out.push_str(&s.to_string());
    }

    fn code_text(&mut self, t: &str) {
        for line in t.split_inclusive('\n') {
            self.out.push_str("    ");
            let (body, nl) = match line.strip_suffix('\n') {
                Some(b) => (b, "\n"),
                None => (line, ""),
            };
            self.push_dim(body);
            self.out.push_str(nl);
        }
    }

    fn push_dim(&mut self, s: &str) {
        if self.styled {
            self.out.push_str(&s.to_string().dim().to_string());
        } else {
            self.out.push_str(s);
        }
    }

    fn quote_prefix(&mut self) {
        if self.quote > 0 {
            let prefix = "│ ".repeat(self.quote);
            self.push_dim(&prefix);
        }
    }

    fn newline(&mut self) {
        self.out.push('\n');
        if !self.lists.is_empty() {
            self.out.push_str(&"  ".repeat(self.lists.len()));
        }
        self.quote_prefix();
    }

    /// Make sure the next block starts after one blank line.
    fn block_break(&mut self) {
        if self.out.is_empty() {
            return;
        }
        while !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
        if self.quote > 0 {
            self.quote_prefix();
        }
    }
}
