//! Inline span conversion.
//!
//! Raw paragraph, heading and caption text is rewritten into a sequence of
//! [`InlineSpan`]s in a fixed order:
//!
//! 1. math (`$$..$$` before `$..$`), code spans, backslash escapes and
//!    `\index{..}` are extracted and become atomic;
//! 2. strong and emphasis delimiters;
//! 3. cross-references and citations;
//! 4. links, autolinks and footnotes.
//!
//! Later stages see protected spans as opaque items, so nothing inside math
//! or code is ever rewritten. Escaping for the target format is left to the
//! emitter.

use crate::config::ConvertConfig;
use crate::error::ReferenceKind;

/// A typed fragment of converted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineSpan {
    /// Literal text.
    Text(String),
    /// Backslash-escaped punctuation. Written as text, never read as markup.
    Escaped(String),
    /// `*emphasis*` or `_emphasis_`.
    Emphasis(Vec<InlineSpan>),
    /// `**strong**` or `__strong__`.
    Strong(Vec<InlineSpan>),
    /// `` `code` ``, kept verbatim.
    Code(String),
    /// `$math$`, kept verbatim.
    MathInline(String),
    /// `$$math$$`, kept verbatim.
    MathDisplay(String),
    /// `@sec-foo` reference to a declared element.
    CrossReference(String),
    /// `[@key]` bibliography citation.
    Citation(String),
    /// `^[footnote text]`.
    Footnote(Vec<InlineSpan>),
    /// `[label](href)` or `<href>`.
    Link {
        /// Link target.
        href: String,
        /// Link text.
        label: Vec<InlineSpan>,
    },
    /// `\index{term}` index entry.
    Index(String),
}

/// Working representation shared by the conversion stages.
#[derive(Debug, Clone)]
enum Item {
    Char(char),
    Span(InlineSpan),
    Strong(Vec<Item>),
    Emphasis(Vec<Item>),
    Footnote(Vec<Item>),
    Link { href: String, label: Vec<Item> },
}

/// Converts raw text into inline spans.
pub struct InlineConverter<'a> {
    config: &'a ConvertConfig,
}

impl<'a> InlineConverter<'a> {
    /// Creates a converter using the cross-reference prefixes of `config`.
    pub fn new(config: &'a ConvertConfig) -> Self {
        Self { config }
    }

    /// Converts `text` into spans. Newlines become spaces outside protected spans.
    pub fn convert(&self, text: &str) -> Vec<InlineSpan> {
        let items = protect(text);
        let items = emphasis(items);
        let items = self.references(items);
        let items = links(items);
        finish(items)
    }

    fn references(&self, items: Vec<Item>) -> Vec<Item> {
        let mut out: Vec<Item> = Vec::with_capacity(items.len());
        let mut i = 0;

        while i < items.len() {
            if is_char(&items, i, '[')
                && let Some((spans, next)) = self.bracketed_references(&items, i)
            {
                out.extend(spans.into_iter().map(Item::Span));
                i = next;
                continue;
            }

            if is_char(&items, i, '@')
                && !prev_is_word(&items, i)
                && let Some((key, next)) = read_key(&items, i + 1)
            {
                // `-@sec-x` suppresses the prefix; the hyphen is not text.
                if is_char(&items, i.wrapping_sub(1), '-')
                    && !prev_is_word(&items, i - 1)
                    && matches!(out.last(), Some(Item::Char('-')))
                {
                    out.pop();
                }
                out.push(Item::Span(self.reference_span(key)));
                i = next;
                continue;
            }

            out.push(items[i].clone());
            i += 1;
        }

        descend(out, &|children: Vec<Item>| self.references(children))
    }

    /// `[see @a; @b, p. 3]` or `[Chapter -@sec-x]`.
    fn bracketed_references(&self, items: &[Item], open: usize) -> Option<(Vec<InlineSpan>, usize)> {
        let mut content = String::new();
        let mut close = None;
        for (offset, item) in items[open + 1..].iter().enumerate() {
            match item {
                Item::Char(']') => {
                    close = Some(open + 1 + offset);
                    break;
                }
                Item::Char('[') => return None,
                Item::Char(c) => content.push(*c),
                _ => return None,
            }
        }
        let close = close?;
        if is_char(items, close + 1, '(') || !content.contains('@') {
            return None;
        }

        let chars: Vec<Item> = content.chars().map(Item::Char).collect();
        let mut spans = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            if is_char(&chars, i, '@')
                && !prev_is_word(&chars, i)
                && let Some((key, next)) = read_key(&chars, i + 1)
            {
                spans.push(self.reference_span(key));
                i = next;
            } else {
                i += 1;
            }
        }

        if spans.is_empty() {
            None
        } else {
            Some((spans, close + 1))
        }
    }

    fn reference_span(&self, key: String) -> InlineSpan {
        let is_xref = key
            .split_once('-')
            .is_some_and(|(prefix, _)| self.config.is_xref_prefix(prefix));
        if is_xref {
            InlineSpan::CrossReference(key)
        } else {
            InlineSpan::Citation(key)
        }
    }
}

/// Stage 1: math, code, escapes and index terms become atomic spans.
fn protect(text: &str) -> Vec<Item> {
    let chars: Vec<char> = text.chars().collect();
    let mut items = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if starts_with(&chars, i, "\\index{") => {
                let start = i + "\\index{".len();
                if let Some(end) = find_char(&chars, start, '}') {
                    let term: String = chars[start..end].iter().collect();
                    items.push(Item::Span(InlineSpan::Index(term.trim().to_string())));
                    i = end + 1;
                } else {
                    items.push(Item::Char(c));
                    i += 1;
                }
            }
            '\\' if chars.get(i + 1).is_some_and(|n| n.is_ascii_punctuation()) => {
                items.push(Item::Span(InlineSpan::Escaped(chars[i + 1].to_string())));
                i += 2;
            }
            '$' if chars.get(i + 1) == Some(&'$') => match find_display_math_end(&chars, i + 2) {
                Some(end) => {
                    let math: String = chars[i + 2..end].iter().collect();
                    items.push(Item::Span(InlineSpan::MathDisplay(math.trim().to_string())));
                    i = end + 2;
                }
                None => {
                    items.push(Item::Char('$'));
                    items.push(Item::Char('$'));
                    i += 2;
                }
            },
            '$' => match find_inline_math_end(&chars, i) {
                Some(end) => {
                    let math: String = chars[i + 1..end].iter().collect();
                    items.push(Item::Span(InlineSpan::MathInline(math)));
                    i = end + 1;
                }
                None => {
                    items.push(Item::Char('$'));
                    i += 1;
                }
            },
            '`' => {
                let run = chars[i..].iter().take_while(|ch| **ch == '`').count();
                match find_backtick_run(&chars, i + run, run) {
                    Some(end) => {
                        let code: String = chars[i + run..end].iter().collect();
                        items.push(Item::Span(InlineSpan::Code(trim_code_padding(&code))));
                        i = end + run;
                    }
                    None => {
                        items.extend(std::iter::repeat_n(Item::Char('`'), run));
                        i += run;
                    }
                }
            }
            _ => {
                items.push(Item::Char(c));
                i += 1;
            }
        }
    }

    items
}

fn find_display_math_end(chars: &[char], from: usize) -> Option<usize> {
    let mut j = from;
    while j + 1 < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            '$' if chars[j + 1] == '$' => {
                return (j > from).then_some(j);
            }
            _ => j += 1,
        }
    }
    None
}

/// Opening `$` needs a non-space to its right; the closing `$` needs a
/// non-space to its left and must not be followed by a digit.
fn find_inline_math_end(chars: &[char], open: usize) -> Option<usize> {
    let first = *chars.get(open + 1)?;
    if first.is_whitespace() || first == '$' {
        return None;
    }
    let mut j = open + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            '$' => {
                let before = chars[j - 1];
                let after = chars.get(j + 1);
                if !before.is_whitespace() && !after.is_some_and(|a| a.is_ascii_digit()) {
                    return Some(j);
                }
                j += 1;
            }
            _ => j += 1,
        }
    }
    None
}

fn find_backtick_run(chars: &[char], from: usize, run: usize) -> Option<usize> {
    let mut j = from;
    while j < chars.len() {
        if chars[j] == '`' {
            let len = chars[j..].iter().take_while(|ch| **ch == '`').count();
            if len == run {
                return Some(j);
            }
            j += len;
        } else {
            j += 1;
        }
    }
    None
}

fn trim_code_padding(code: &str) -> String {
    let code = code.replace('\n', " ");
    if code.len() >= 2 && code.starts_with(' ') && code.ends_with(' ') && !code.trim().is_empty() {
        code[1..code.len() - 1].to_string()
    } else {
        code
    }
}

/// Stage 2: `**strong**`, `__strong__`, `*emphasis*`, `_emphasis_`.
fn emphasis(items: Vec<Item>) -> Vec<Item> {
    let mut out = Vec::with_capacity(items.len());
    let mut i = 0;

    while i < items.len() {
        if let Some(delim) = emphasis_delimiter(&items, i) {
            if is_char(&items, i + 1, delim)
                && let Some(close) = find_emphasis_closer(&items, i, delim, 2)
            {
                out.push(Item::Strong(items[i + 2..close].to_vec()));
                i = close + 2;
                continue;
            }
            if !is_char(&items, i + 1, delim)
                && let Some(close) = find_emphasis_closer(&items, i, delim, 1)
            {
                out.push(Item::Emphasis(items[i + 1..close].to_vec()));
                i = close + 1;
                continue;
            }
        }
        out.push(items[i].clone());
        i += 1;
    }

    descend(out, &emphasis)
}

fn emphasis_delimiter(items: &[Item], i: usize) -> Option<char> {
    match items.get(i) {
        Some(Item::Char('*')) => Some('*'),
        Some(Item::Char('_')) if !prev_is_word(items, i) => Some('_'),
        _ => None,
    }
}

fn find_emphasis_closer(items: &[Item], open: usize, delim: char, width: usize) -> Option<usize> {
    let content_start = open + width;
    if items.get(content_start).is_none_or(is_space) {
        return None;
    }

    let mut j = content_start + 1;
    while j + width <= items.len() {
        if !is_char(items, j, delim) {
            j += 1;
            continue;
        }
        let run = (j..items.len()).take_while(|&k| is_char(items, k, delim)).count();
        if width == 1 && run >= 2 {
            j += run;
            continue;
        }
        // In `***`, the closer is the rightmost `width` delimiters of the run.
        let close = j + run.saturating_sub(width);
        let left_ok = !is_space(&items[close - 1]) || run > width;
        let right_ok = delim != '_' || !is_word(items.get(close + width));
        if run >= width && left_ok && right_ok && close > content_start {
            return Some(close);
        }
        j += run;
    }
    None
}

/// Stage 4: `^[footnotes]`, `[label](href)` and `<https://autolinks>`.
fn links(items: Vec<Item>) -> Vec<Item> {
    let mut out = Vec::with_capacity(items.len());
    let mut i = 0;

    while i < items.len() {
        if is_char(&items, i, '^')
            && is_char(&items, i + 1, '[')
            && let Some(close) = find_matching_bracket(&items, i + 1)
        {
            out.push(Item::Footnote(items[i + 2..close].to_vec()));
            i = close + 1;
            continue;
        }

        if is_char(&items, i, '[')
            && let Some(close) = find_matching_bracket(&items, i)
            && is_char(&items, close + 1, '(')
            && let Some((href, end)) = read_until(&items, close + 2, ')')
            && !href.is_empty()
        {
            out.push(Item::Link {
                href,
                label: items[i + 1..close].to_vec(),
            });
            i = end + 1;
            continue;
        }

        if is_char(&items, i, '<')
            && let Some((href, end)) = read_until(&items, i + 1, '>')
            && ["http://", "https://", "mailto:"]
                .iter()
                .any(|scheme| href.starts_with(scheme))
        {
            let label = href.chars().map(Item::Char).collect();
            out.push(Item::Link { href, label });
            i = end + 1;
            continue;
        }

        out.push(items[i].clone());
        i += 1;
    }

    descend(out, &links)
}

fn find_matching_bracket(items: &[Item], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (j, item) in items.iter().enumerate().skip(open) {
        match item {
            Item::Char('[') => depth += 1,
            Item::Char(']') => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

/// Reads plain, non-space characters up to `end`.
fn read_until(items: &[Item], from: usize, end: char) -> Option<(String, usize)> {
    let mut text = String::new();
    for (j, item) in items.iter().enumerate().skip(from) {
        match item {
            Item::Char(c) if *c == end => return Some((text, j)),
            Item::Char(c) if !c.is_whitespace() => text.push(*c),
            _ => return None,
        }
    }
    None
}

/// Reads a citation key or label starting at `from`.
fn read_key(items: &[Item], from: usize) -> Option<(String, usize)> {
    let mut key = String::new();
    let mut j = from;
    while let Some(Item::Char(c)) = items.get(j) {
        let accepted = if key.is_empty() {
            c.is_alphanumeric() || *c == '_'
        } else {
            c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '+' | '/')
        };
        if !accepted {
            break;
        }
        key.push(*c);
        j += 1;
    }

    while key.ends_with(['.', ':', '-', '+', '/']) {
        key.pop();
        j -= 1;
    }

    (!key.is_empty()).then_some((key, j))
}

/// Applies `stage` to the children of every container item.
fn descend(items: Vec<Item>, stage: &dyn Fn(Vec<Item>) -> Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .map(|item| match item {
            Item::Strong(children) => Item::Strong(stage(children)),
            Item::Emphasis(children) => Item::Emphasis(stage(children)),
            Item::Footnote(children) => Item::Footnote(stage(children)),
            Item::Link { href, label } => Item::Link {
                href,
                label: stage(label),
            },
            other => other,
        })
        .collect()
}

fn finish(items: Vec<Item>) -> Vec<InlineSpan> {
    let mut spans = Vec::new();
    let mut text = String::new();

    for item in items {
        let span = match item {
            Item::Char(c) => {
                text.push(if c == '\n' { ' ' } else { c });
                continue;
            }
            Item::Span(InlineSpan::Text(t)) => {
                text.push_str(&t);
                continue;
            }
            Item::Span(InlineSpan::Escaped(e)) => {
                if text.is_empty()
                    && let Some(InlineSpan::Escaped(last)) = spans.last_mut()
                {
                    last.push_str(&e);
                    continue;
                }
                InlineSpan::Escaped(e)
            }
            Item::Span(span) => span,
            Item::Strong(children) => InlineSpan::Strong(finish(children)),
            Item::Emphasis(children) => InlineSpan::Emphasis(finish(children)),
            Item::Footnote(children) => InlineSpan::Footnote(finish(children)),
            Item::Link { href, label } => InlineSpan::Link {
                href,
                label: finish(label),
            },
        };
        if !text.is_empty() {
            spans.push(InlineSpan::Text(std::mem::take(&mut text)));
        }
        spans.push(span);
    }

    if !text.is_empty() {
        spans.push(InlineSpan::Text(text));
    }
    spans
}

fn is_char(items: &[Item], i: usize, expected: char) -> bool {
    matches!(items.get(i), Some(Item::Char(c)) if *c == expected)
}

fn is_space(item: &Item) -> bool {
    matches!(item, Item::Char(c) if c.is_whitespace())
}

fn is_word(item: Option<&Item>) -> bool {
    matches!(item, Some(Item::Char(c)) if c.is_alphanumeric())
}

fn prev_is_word(items: &[Item], i: usize) -> bool {
    i > 0 && is_word(items.get(i - 1))
}

fn starts_with(chars: &[char], i: usize, pattern: &str) -> bool {
    let mut j = i;
    for p in pattern.chars() {
        if chars.get(j) != Some(&p) {
            return false;
        }
        j += 1;
    }
    true
}

fn find_char(chars: &[char], from: usize, target: char) -> Option<usize> {
    chars
        .iter()
        .skip(from)
        .position(|c| *c == target)
        .map(|p| p + from)
}

/// Concatenated visible text of `spans`, used for id derivation and matching.
pub fn plain_text(spans: &[InlineSpan]) -> String {
    let mut text = String::new();
    push_plain_text(spans, &mut text);
    text
}

fn push_plain_text(spans: &[InlineSpan], text: &mut String) {
    for span in spans {
        match span {
            InlineSpan::Text(t)
            | InlineSpan::Escaped(t)
            | InlineSpan::Code(t)
            | InlineSpan::MathInline(t)
            | InlineSpan::MathDisplay(t)
            | InlineSpan::CrossReference(t)
            | InlineSpan::Citation(t) => text.push_str(t),
            InlineSpan::Emphasis(children) | InlineSpan::Strong(children) => {
                push_plain_text(children, text)
            }
            InlineSpan::Link { label, .. } => push_plain_text(label, text),
            InlineSpan::Footnote(_) | InlineSpan::Index(_) => {}
        }
    }
}

/// Every cross-reference and citation target in `spans`, in order.
pub fn collect_references(spans: &[InlineSpan], out: &mut Vec<(String, ReferenceKind)>) {
    for span in spans {
        match span {
            InlineSpan::CrossReference(target) => {
                out.push((target.clone(), ReferenceKind::CrossReference))
            }
            InlineSpan::Citation(key) => out.push((key.clone(), ReferenceKind::Citation)),
            InlineSpan::Emphasis(children)
            | InlineSpan::Strong(children)
            | InlineSpan::Footnote(children) => collect_references(children, out),
            InlineSpan::Link { label, .. } => collect_references(label, out),
            _ => {}
        }
    }
}
