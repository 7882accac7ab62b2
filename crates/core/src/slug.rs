//! Identifier derivation and heading attribute extraction.

/// Attributes parsed from a trailing `{#id .class key=value}` annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes<'a> {
    /// The `#id` entry, if any.
    pub id: Option<&'a str>,
    /// Every `.class` entry in order (`{-}` contributes `unnumbered`).
    pub classes: Vec<&'a str>,
    /// `key=value` pairs with surrounding quotes stripped from the value.
    pub pairs: Vec<(&'a str, &'a str)>,
}

/// Splits a trailing `{...}` attribute annotation off heading text.
///
/// Returns the trimmed text without the annotation and the parsed attributes.
/// Text without a well-formed annotation is returned unchanged.
///
/// # Examples
///
/// ```
/// use qmdptx_core::slug::extract_attributes;
///
/// let (text, attrs) = extract_attributes("Overview {#sec-a}");
/// assert_eq!(text, "Overview");
/// assert_eq!(attrs.id, Some("sec-a"));
///
/// let (text, attrs) = extract_attributes("Plain heading");
/// assert_eq!(text, "Plain heading");
/// assert_eq!(attrs.id, None);
/// ```
pub fn extract_attributes(text: &str) -> (&str, Attributes<'_>) {
    let trimmed = text.trim_end();
    if !trimmed.ends_with('}') {
        return (text.trim(), Attributes::default());
    }
    let Some(open) = trimmed.rfind('{') else {
        return (text.trim(), Attributes::default());
    };
    let inner = &trimmed[open + 1..trimmed.len() - 1];
    match parse_attribute_list(inner) {
        Some(attrs) => (trimmed[..open].trim(), attrs),
        None => (text.trim(), Attributes::default()),
    }
}

/// Parses the inside of an attribute annotation (`#id .class key="v"`).
///
/// Returns `None` when any entry is not an id, class, or key/value pair, so
/// ordinary braces in prose are never mistaken for an annotation.
pub fn parse_attribute_list(inner: &str) -> Option<Attributes<'_>> {
    let mut attrs = Attributes::default();
    let mut saw_entry = false;

    for token in tokenize_attrs(inner) {
        saw_entry = true;
        if token == "-" {
            attrs.classes.push("unnumbered");
        } else if let Some(id) = token.strip_prefix('#') {
            if !is_identifier(id) {
                return None;
            }
            attrs.id = Some(id);
        } else if let Some(class) = token.strip_prefix('.') {
            if class.is_empty() {
                return None;
            }
            attrs.classes.push(class);
        } else if let Some((key, value)) = token.split_once('=') {
            if key.is_empty() {
                return None;
            }
            attrs.pairs.push((key, strip_quotes(value)));
        } else {
            return None;
        }
    }

    saw_entry.then_some(attrs)
}

/// Tokenize attributes respecting quoted values.
/// Splits on whitespace but keeps quoted strings intact.
fn tokenize_attrs(attrs: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut token_start: Option<usize> = None;
    let mut in_quotes = false;
    let mut quote_char = '"';

    for (i, c) in attrs.char_indices() {
        match c {
            '"' | '\'' if !in_quotes => {
                if token_start.is_none() {
                    token_start = Some(i);
                }
                in_quotes = true;
                quote_char = c;
            }
            c if c == quote_char && in_quotes => {
                in_quotes = false;
            }
            c if c.is_whitespace() && !in_quotes => {
                if let Some(start) = token_start.take() {
                    tokens.push(&attrs[start..i]);
                }
            }
            _ => {
                if token_start.is_none() {
                    token_start = Some(i);
                }
            }
        }
    }

    if let Some(start) = token_start {
        tokens.push(&attrs[start..]);
    }

    tokens
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Returns true for ids made of ASCII alphanumerics, `-`, `_`, `.` and `:`.
pub fn is_identifier(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
}

/// Derives the fallback identifier for a title or label.
///
/// 1. Lowercase
/// 2. Replace every run of non-alphanumeric characters with a single `-`
/// 3. Trim leading and trailing `-`
///
/// The result may be empty (e.g. a title made only of punctuation); callers
/// that need a non-empty id supply their own positional fallback.
pub fn derive_id(text: &str) -> String {
    let mut id = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !id.is_empty() {
                id.push('-');
            }
            pending_hyphen = false;
            id.extend(ch.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    id
}
