//! Chunk metadata interpretation.
//!
//! Executable chunks carry their options either in the fence header
//! (`{r fig-x, fig.cap="..."}`) or as leading `#| key: value` lines. The
//! `#|` block is YAML, so it is handed to `serde_yaml` as one document,
//! which takes care of continuation lines, block scalars and `- item`
//! lists. Header options are knitr R expressions and are read by hand.

use serde_yaml::Value;

use crate::ast::{Classification, FigureSpec, Panel, TableSpec};
use crate::code_fence::FenceOpening;
use crate::inline::InlineConverter;
use crate::slug::derive_id;

/// Options of one chunk, with knitr and Quarto spellings unified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Chunk label (`fig-x`, `tbl-y`, ...).
    pub label: Option<String>,
    /// Raw figure caption (`fig-cap`).
    pub caption: Option<String>,
    /// Raw table caption (`tbl-cap`).
    pub table_caption: Option<String>,
    /// Raw sub-captions, one per panel (`fig-subcap`).
    pub sub_captions: Vec<String>,
    /// Alternative text (`fig-alt`).
    pub alt: Option<String>,
    /// Panels per row (`layout-ncol`).
    pub columns: Option<usize>,
    /// False when the chunk is excluded from the output (`include: false`).
    pub include: bool,
    /// False when the code itself is hidden (`echo: false`).
    pub echo: bool,
}

impl Default for ChunkDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            caption: None,
            table_caption: None,
            sub_captions: Vec::new(),
            alt: None,
            columns: None,
            include: true,
            echo: true,
        }
    }
}

/// Why chunk metadata could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadataError {
    /// Human readable reason.
    pub message: String,
    /// Index of the offending metadata line, when known.
    pub line: Option<usize>,
}

impl ChunkMetadataError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }
}

/// Builds the descriptor of a chunk from its fence header and `#|` lines.
///
/// `option_lines` are the raw lines including the `#|` prefix. Options given
/// as `#|` lines override header options of the same name.
pub fn interpret_chunk(
    opening: &FenceOpening,
    option_lines: &[String],
) -> Result<ChunkDescriptor, ChunkMetadataError> {
    let mut descriptor = ChunkDescriptor {
        label: opening.header_label.clone(),
        ..ChunkDescriptor::default()
    };

    for (key, raw) in &opening.header_options {
        apply_option(&mut descriptor, key, header_value(raw))?;
    }

    for (key, value) in yaml_options(option_lines)? {
        apply_option(&mut descriptor, &key, value)?;
    }

    Ok(descriptor)
}

/// Parses the `#|` block into key/value pairs in source order.
fn yaml_options(option_lines: &[String]) -> Result<Vec<(String, Value)>, ChunkMetadataError> {
    if option_lines.is_empty() {
        return Ok(Vec::new());
    }

    let document: String = option_lines
        .iter()
        .map(|line| strip_option_prefix(line))
        .collect::<Vec<_>>()
        .join("\n");

    let value: Value = serde_yaml::from_str(&document).map_err(|err| ChunkMetadataError {
        message: err.to_string(),
        line: err.location().map(|loc| loc.line().saturating_sub(1)),
    })?;

    match value {
        Value::Mapping(mapping) => mapping
            .into_iter()
            .map(|(key, value)| match key {
                Value::String(key) => Ok((key, value)),
                other => Err(ChunkMetadataError::new(format!(
                    "option name must be text, found {other:?}"
                ))),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(ChunkMetadataError::new(
            "chunk options must be `key: value` pairs",
        )),
    }
}

fn strip_option_prefix(line: &str) -> &str {
    let rest = line.trim_start().trim_start_matches("#|");
    rest.strip_prefix(' ').unwrap_or(rest)
}

/// Reads a knitr header value: quoted text, `TRUE`/`FALSE`, numbers or `c(...)`.
fn header_value(raw: &str) -> Value {
    let raw = raw.trim();
    if let Some(text) = unquote(raw) {
        return Value::String(text.to_string());
    }
    match raw {
        "TRUE" | "T" => return Value::Bool(true),
        "FALSE" | "F" => return Value::Bool(false),
        _ => {}
    }
    if let Some(inner) = raw.strip_prefix("c(").and_then(|r| r.strip_suffix(')')) {
        let items = inner
            .split(',')
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(unquote(item).unwrap_or(item).to_string()))
            .collect();
        return Value::Sequence(items);
    }
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn unquote(raw: &str) -> Option<&str> {
    ['"', '\'']
        .iter()
        .find_map(|q| raw.strip_prefix(*q).and_then(|r| r.strip_suffix(*q)))
}

fn apply_option(
    descriptor: &mut ChunkDescriptor,
    key: &str,
    value: Value,
) -> Result<(), ChunkMetadataError> {
    let key = key.trim().replace('.', "-");
    match key.as_str() {
        "label" => descriptor.label = text_value(&value),
        "fig-cap" => descriptor.caption = text_value(&value),
        "tbl-cap" => descriptor.table_caption = text_value(&value),
        "fig-subcap" => descriptor.sub_captions = list_value(&value),
        "fig-alt" => descriptor.alt = text_value(&value),
        "layout-ncol" => {
            let columns = count_value(&value).ok_or_else(|| {
                ChunkMetadataError::new(format!("layout-ncol must be a positive number, got {value:?}"))
            })?;
            descriptor.columns = Some(columns);
        }
        "include" => descriptor.include = bool_value(&key, &value)?,
        "echo" => descriptor.echo = bool_value(&key, &value)?,
        _ => log::trace!("ignoring chunk option {}", key),
    }
    Ok(())
}

fn text_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn list_value(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(text_value).collect(),
        other => text_value(other).into_iter().collect(),
    }
}

fn count_value(value: &Value) -> Option<usize> {
    let count = match value {
        Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (count > 0).then_some(count)
}

fn bool_value(key: &str, value: &Value) -> Result<bool, ChunkMetadataError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(ChunkMetadataError::new(format!(
            "{key} must be true or false, got {other:?}"
        ))),
    }
}

/// Decides whether a chunk is a listing, figure or table.
///
/// A `tbl-` label makes a table, whatever the caption. Any other label with
/// a non-empty `fig-cap` makes a figure whose panel images are named
/// `<label>-<n>.png`. Everything else is a listing.
pub fn classify_chunk(descriptor: &ChunkDescriptor, inline: &InlineConverter<'_>) -> Classification {
    let Some(label) = descriptor.label.as_deref() else {
        return Classification::Listing { id: None };
    };
    let id = derive_id(label);
    if id.is_empty() {
        log::debug!("chunk label {:?} yields no identifier", label);
        return Classification::Listing { id: None };
    }

    if label.starts_with("tbl-") {
        let caption = descriptor
            .table_caption
            .as_deref()
            .or(descriptor.caption.as_deref())
            .map(|c| inline.convert(c))
            .unwrap_or_default();
        return Classification::Table(TableSpec {
            label: label.to_string(),
            id,
            caption,
        });
    }

    let Some(caption) = descriptor.caption.as_deref().filter(|c| !c.trim().is_empty()) else {
        return Classification::Listing { id: Some(id) };
    };

    let panel_count = descriptor.sub_captions.len().max(1);
    let panels = (1..=panel_count)
        .map(|n| Panel {
            caption: descriptor
                .sub_captions
                .get(n - 1)
                .map(|c| inline.convert(c))
                .unwrap_or_default(),
            image: format!("{label}-{n}.png"),
        })
        .collect();

    Classification::Figure(FigureSpec {
        label: label.to_string(),
        id,
        caption: inline.convert(caption),
        panels,
        columns: descriptor.columns.unwrap_or(1),
        alt: descriptor.alt.clone(),
    })
}

/// Drops blank lines at both ends of a chunk body; interior lines are kept as is.
pub fn trim_code_lines(mut lines: Vec<String>) -> Vec<String> {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.trim().is_empty()).count();
    lines.drain(..leading);
    lines
}
