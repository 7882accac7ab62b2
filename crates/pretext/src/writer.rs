//! Indenting XML writer.
//!
//! Block elements go on their own lines, indented two spaces per level.
//! Inline content is written into the current line. Text and attribute
//! values are always escaped.

use std::borrow::Cow;

/// Builds an XML document in memory.
#[derive(Debug, Default)]
pub struct XmlWriter {
    out: String,
    open: Vec<&'static str>,
}

impl XmlWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self {
            out: String::with_capacity(8192),
            open: Vec::new(),
        }
    }

    /// Writes the `<?xml ...?>` declaration.
    pub fn declaration(&mut self) {
        self.out
            .push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    }

    /// Opens a block element on its own line.
    pub fn open(&mut self, name: &'static str, attrs: &[(&str, &str)]) {
        self.indent();
        self.start_tag(name, attrs, false);
        self.out.push('\n');
        self.open.push(name);
    }

    /// Closes the most recently opened block element.
    pub fn close(&mut self) {
        let Some(name) = self.open.pop() else {
            log::debug!("close() without an open element");
            return;
        };
        self.indent();
        self.end_tag(name);
        self.out.push('\n');
    }

    /// Writes a self-closing element on its own line.
    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.indent();
        self.start_tag(name, attrs, true);
        self.out.push('\n');
    }

    /// Starts a line holding one element with inline content.
    pub fn line_start(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.indent();
        self.start_tag(name, attrs, false);
    }

    /// Ends a line started with [`XmlWriter::line_start`].
    pub fn line_end(&mut self, name: &str) {
        self.end_tag(name);
        self.out.push('\n');
    }

    /// Writes an opening tag inside the current line.
    pub fn inline_start(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.start_tag(name, attrs, false);
    }

    /// Writes a closing tag inside the current line.
    pub fn inline_end(&mut self, name: &str) {
        self.end_tag(name);
    }

    /// Writes a self-closing tag inside the current line.
    pub fn inline_empty(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.start_tag(name, attrs, true);
    }

    /// Writes escaped text content.
    pub fn push_text(&mut self, s: &str) {
        self.out.push_str(&escape_text(s));
    }

    /// Writes one escaped line at column zero, as required inside `<input>`.
    pub fn verbatim_line(&mut self, line: &str) {
        self.out.push_str(&escape_text(line));
        self.out.push('\n');
    }

    /// Current nesting depth of block elements.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Closes any element still open and returns the document.
    pub fn finish(mut self) -> String {
        while !self.open.is_empty() {
            self.close();
        }
        self.out
    }

    fn indent(&mut self) {
        for _ in 0..self.open.len() {
            self.out.push_str("  ");
        }
    }

    fn start_tag(&mut self, name: &str, attrs: &[(&str, &str)], self_closing: bool) {
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attrs {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attr(value));
            self.out.push('"');
        }
        self.out.push_str(if self_closing { "/>" } else { ">" });
    }

    fn end_tag(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }
}

/// Escapes `&`, `<` and `>` in text content.
pub fn escape_text(s: &str) -> Cow<'_, str> {
    html_escape::encode_text(s)
}

/// Escapes a double-quoted attribute value.
pub fn escape_attr(s: &str) -> Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(s)
}
