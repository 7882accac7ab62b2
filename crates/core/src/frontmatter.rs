//! YAML front matter extraction.
//!
//! Quarto chapters open with a `---` delimited YAML header. Only the fields
//! that influence the chapter element are read; everything else is ignored.

use serde::Deserialize;
use thiserror::Error;

/// Chapter-level fields read from the YAML header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Frontmatter {
    /// Chapter title.
    #[serde(default)]
    pub title: Option<String>,
    /// Explicit chapter identifier.
    #[serde(default)]
    pub id: Option<String>,
}

/// Result returned after extracting front matter from a document.
#[derive(Debug)]
pub struct FrontmatterExtraction {
    /// Parsed front matter (empty when the document has none).
    pub frontmatter: Frontmatter,
    /// Byte offset inside the source document where the body begins.
    pub body_start: usize,
    /// Number of lines consumed before the body, for 1-based line numbering.
    pub body_line_offset: usize,
}

impl FrontmatterExtraction {
    fn empty() -> Self {
        Self {
            frontmatter: Frontmatter::default(),
            body_start: 0,
            body_line_offset: 0,
        }
    }
}

/// Errors emitted while parsing or extracting front matter.
#[derive(Debug, Error)]
pub enum FrontmatterError {
    /// Unclosed YAML fence (e.g., missing terminating `---`).
    #[error("Unterminated YAML frontmatter block: expected closing '---'")]
    Unterminated,
    /// YAML failed to parse.
    #[error("Frontmatter parse error: {0}")]
    Parse(String),
}

/// Extracts YAML front matter from an input document.
///
/// Leading blank lines are skipped; a first non-blank line other than `---`
/// means there is no front matter.
pub fn extract_frontmatter(input: &str) -> Result<FrontmatterExtraction, FrontmatterError> {
    let (without_bom, bom_len) = strip_bom(input);
    let mut cursor = 0usize;
    let mut line_count = 0usize;

    while let Some((line, next_cursor)) = next_line(without_bom, cursor) {
        line_count += 1;
        if line.trim().is_empty() {
            cursor = next_cursor;
            continue;
        }
        if !is_yaml_fence(line) {
            return Ok(FrontmatterExtraction::empty());
        }

        let block_start = next_cursor;
        let mut scan_cursor = next_cursor;
        while let Some((block_line, next_line_cursor)) = next_line(without_bom, scan_cursor) {
            line_count += 1;
            if is_yaml_fence(block_line) {
                let block = &without_bom[block_start..scan_cursor];
                return Ok(FrontmatterExtraction {
                    frontmatter: parse_yaml_block(block)?,
                    body_start: bom_len + next_line_cursor,
                    body_line_offset: line_count,
                });
            }
            scan_cursor = next_line_cursor;
        }
        return Err(FrontmatterError::Unterminated);
    }

    Ok(FrontmatterExtraction::empty())
}

fn parse_yaml_block(block: &str) -> Result<Frontmatter, FrontmatterError> {
    if block.trim().is_empty() {
        return Ok(Frontmatter::default());
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(block).map_err(|err| FrontmatterError::Parse(err.to_string()))?;
    match value {
        serde_yaml::Value::Null => Ok(Frontmatter::default()),
        serde_yaml::Value::Mapping(_) => {
            serde_yaml::from_value(value).map_err(|err| FrontmatterError::Parse(err.to_string()))
        }
        _ => Err(FrontmatterError::Parse(
            "frontmatter must be a YAML mapping at the top level".to_string(),
        )),
    }
}

fn strip_bom(input: &str) -> (&str, usize) {
    if let Some(stripped) = input.strip_prefix('\u{feff}') {
        (stripped, '\u{feff}'.len_utf8())
    } else {
        (input, 0)
    }
}

fn next_line(input: &str, start: usize) -> Option<(&str, usize)> {
    if start >= input.len() {
        return None;
    }

    let bytes = &input.as_bytes()[start..];
    if let Some(pos) = bytes.iter().position(|b| *b == b'\n') {
        let line_end = start + pos;
        Some((&input[start..line_end], line_end + 1))
    } else {
        Some((&input[start..], input.len()))
    }
}

fn is_yaml_fence(line: &str) -> bool {
    line.trim_end_matches('\r').trim_end() == "---"
}
