//! Code fence detection for the line classifier.
//!
//! Tracks whether the scanner is inside a fenced chunk and parses the info
//! string of opening fences (`` ```{r fig-x, echo=FALSE} `` or `` ```python ``).

/// Fence parsing phases tracked across lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FencePhase {
    /// Not currently inside a fence.
    #[default]
    Outside,
    /// Within fence contents.
    InsideFence,
}

/// Current fence state (phase, marker, and length).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FenceState {
    /// Current fence phase.
    pub phase: FencePhase,
    /// Fence marker character (``` or ~~~).
    pub marker: Option<char>,
    /// Length of the opening fence (number of ` or ~ characters).
    pub length: usize,
}

/// What a single line did to the fence state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceTransition {
    /// The line opened a fence.
    Opened,
    /// The line closed the current fence.
    Closed,
    /// The line is fence content.
    Inside,
    /// The line is outside any fence.
    Outside,
}

/// Advance fence state based on a single line of text.
pub fn advance_fence_state(line: &str, state: FenceState) -> (FenceState, FenceTransition) {
    let (visual_indent, byte_offset) = leading_whitespace_info(line);
    let after_indent = &line[byte_offset..];

    match state.phase {
        FencePhase::Outside => {
            if visual_indent <= 3
                && let Some((marker, length)) = detect_fence_marker_with_length(after_indent)
                && (marker == '~' || !after_indent[length..].contains('`'))
            {
                let next = FenceState {
                    phase: FencePhase::InsideFence,
                    marker: Some(marker),
                    length,
                };
                return (next, FenceTransition::Opened);
            }
            (state, FenceTransition::Outside)
        }
        FencePhase::InsideFence => {
            if visual_indent <= 3
                && is_closing_fence(after_indent)
                && let Some((marker, closer_len)) = detect_fence_marker_with_length(after_indent)
                && Some(marker) == state.marker
                && closer_len >= state.length
            {
                return (FenceState::default(), FenceTransition::Closed);
            }
            (state, FenceTransition::Inside)
        }
    }
}

/// Parsed info string of an opening fence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FenceOpening {
    /// Language name (`r`, `python`), lowercased; `None` for bare fences.
    pub language: Option<String>,
    /// True for `{lang}` executable chunks whose `#|` lines are metadata.
    pub executable: bool,
    /// Knitr-style label given in the header (`{r fig-x}`).
    pub header_label: Option<String>,
    /// Knitr-style `key=value` options given in the header.
    pub header_options: Vec<(String, String)>,
}

/// Parses the info string following the fence marker.
pub fn parse_fence_opening(line: &str) -> FenceOpening {
    let trimmed = line.trim_start();
    let info = trimmed
        .trim_start_matches(['`', '~'])
        .trim();

    if let Some(inner) = info.strip_prefix('{') {
        let inner = inner.strip_suffix('}').unwrap_or(inner).trim();
        return parse_chunk_header(inner);
    }

    let language = info
        .split_whitespace()
        .next()
        .map(|lang| lang.trim_start_matches('.').to_ascii_lowercase())
        .filter(|lang| !lang.is_empty());

    FenceOpening {
        language,
        ..FenceOpening::default()
    }
}

/// Parses `r fig-x, fig.cap="A caption", echo=FALSE`.
fn parse_chunk_header(inner: &str) -> FenceOpening {
    let mut opening = FenceOpening {
        executable: true,
        ..FenceOpening::default()
    };

    let (language, rest) = match inner.find(|c: char| c.is_whitespace() || c == ',') {
        Some(pos) => (&inner[..pos], &inner[pos..]),
        None => (inner, ""),
    };
    if !language.is_empty() {
        opening.language = Some(language.to_ascii_lowercase());
    }

    for (index, part) in split_header_options(rest).into_iter().enumerate() {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('=') {
            Some((key, value)) => opening
                .header_options
                .push((key.trim().to_string(), value.trim().to_string())),
            None if index == 0 => opening.header_label = Some(part.to_string()),
            None => log::debug!("ignoring chunk header entry without a value: {}", part),
        }
    }

    opening
}

/// Splits header options on commas that are not inside quotes.
fn split_header_options(rest: &str) -> Vec<&str> {
    let rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;

    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => {
                parts.push(&rest[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < rest.len() {
        parts.push(&rest[start..]);
    }

    parts
}

/// Returns (visual_columns, byte_offset) for leading whitespace.
/// Visual columns expand tabs to 4-column boundaries.
fn leading_whitespace_info(line: &str) -> (usize, usize) {
    let mut col = 0;
    let mut bytes = 0;
    for b in line.bytes() {
        match b {
            b' ' => {
                col += 1;
                bytes += 1;
            }
            b'\t' => {
                col += 4 - (col % 4);
                bytes += 1;
            }
            _ => break,
        }
    }
    (col, bytes)
}

fn detect_fence_marker_with_length(after_indent: &str) -> Option<(char, usize)> {
    let mut chars = after_indent.chars();
    let first = chars.next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let run_len = 1 + chars.take_while(|c| *c == first).count();
    if run_len >= 3 {
        Some((first, run_len))
    } else {
        None
    }
}

/// A closing fence has only fence markers followed by optional whitespace.
fn is_closing_fence(after_indent: &str) -> bool {
    let Some(first) = after_indent.chars().next() else {
        return false;
    };
    if first != '`' && first != '~' {
        return false;
    }
    let markers = after_indent.chars().take_while(|c| *c == first).count();
    markers >= 3 && after_indent[markers..].trim().is_empty()
}
