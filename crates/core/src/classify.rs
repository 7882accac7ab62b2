//! Line classification.
//!
//! [`LineClassifier`] walks the body line by line and tags each line with a
//! [`LineKind`]. It owns the lexical state that decides how a line must be
//! read: inside a code fence every line is code, inside `$$` display math
//! every line is text. Block structure is left to the parser.

use crate::ast::ListMarker;
use crate::code_fence::{
    FenceOpening, FenceState, FenceTransition, advance_fence_state,
    parse_fence_opening,
};
use crate::divs::{DivOpening, is_div_closer, parse_div_opening};
use crate::slug::extract_attributes;

/// LaTeX layout commands that carry no content.
const SKIPPED_COMMANDS: &[&str] = &[
    "\\vspace",
    "\\clearpage",
    "\\newpage",
    "\\vfill",
    "\\pagebreak",
    "\\chaptermark",
];

/// The role of a single source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Empty or whitespace-only line.
    Blank,
    /// ATX heading; `depth` is the number of `#` characters.
    Heading {
        /// Number of leading `#` characters.
        depth: usize,
        /// Heading text without the attribute annotation.
        text: String,
        /// Explicit `{#id}` annotation.
        id: Option<String>,
    },
    /// Thematic break (`---`, `***`, `___`).
    Rule,
    /// Line that produces no output (layout command, shortcode, comment).
    Skip,
    /// Fenced div opening.
    DivOpen(DivOpening),
    /// Fenced div close marker.
    DivClose,
    /// Code fence opening.
    FenceOpen(FenceOpening),
    /// Code fence closing.
    FenceClose,
    /// `#|` metadata line at the top of an executable chunk.
    ChunkOption,
    /// Line of code inside a fence.
    CodeLine,
    /// List item marker line.
    ListItem {
        /// Marker style.
        marker: ListMarker,
        /// Visual column of the marker.
        indent: usize,
        /// Item text after the marker.
        text: String,
    },
    /// Ordinary prose.
    Text,
}

/// A classified line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// Classification.
    pub kind: LineKind,
    /// 1-based line number in the input.
    pub line: usize,
    /// The line as written.
    pub raw: &'a str,
}

/// Iterator over classified lines.
pub struct LineClassifier<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    line_offset: usize,
    fence: FenceState,
    chunk_options_allowed: bool,
    in_display_math: bool,
}

impl<'a> LineClassifier<'a> {
    /// Classifies `body`, numbering lines from `line_offset + 1`.
    pub fn new(body: &'a str, line_offset: usize) -> Self {
        Self {
            lines: body.lines().enumerate(),
            line_offset,
            fence: FenceState::default(),
            chunk_options_allowed: false,
            in_display_math: false,
        }
    }

    fn classify(&mut self, raw: &str) -> LineKind {
        let (fence, transition) = advance_fence_state(raw, self.fence);
        self.fence = fence;

        match transition {
            FenceTransition::Opened => {
                let opening = parse_fence_opening(raw);
                self.chunk_options_allowed = opening.executable;
                LineKind::FenceOpen(opening)
            }
            FenceTransition::Closed => {
                self.chunk_options_allowed = false;
                LineKind::FenceClose
            }
            FenceTransition::Inside => {
                if self.chunk_options_allowed && raw.trim_start().starts_with("#|") {
                    LineKind::ChunkOption
                } else {
                    self.chunk_options_allowed = false;
                    LineKind::CodeLine
                }
            }
            FenceTransition::Outside => {
                if self.in_display_math {
                    if toggles_display_math(raw) {
                        self.in_display_math = false;
                    }
                    return LineKind::Text;
                }
                let kind = classify_line(raw);
                if kind == LineKind::Text && toggles_display_math(raw) {
                    self.in_display_math = true;
                }
                kind
            }
        }
    }
}

impl<'a> Iterator for LineClassifier<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, raw) = self.lines.next()?;
        let kind = self.classify(raw);
        Some(Token {
            kind,
            line: self.line_offset + index + 1,
            raw,
        })
    }
}

/// An odd number of `$$` delimiters leaves display math open (or closes it).
fn toggles_display_math(raw: &str) -> bool {
    raw.matches("$$").count() % 2 == 1
}

/// Classifies a line outside fences and display math.
pub fn classify_line(raw: &str) -> LineKind {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }

    if is_div_closer(raw) {
        return LineKind::DivClose;
    }
    if let Some(opening) = parse_div_opening(raw) {
        return LineKind::DivOpen(opening);
    }

    if is_skipped(trimmed) {
        return LineKind::Skip;
    }

    if let Some(kind) = parse_heading(raw) {
        return kind;
    }

    if is_rule(trimmed) {
        return LineKind::Rule;
    }

    if let Some(kind) = parse_list_item(raw) {
        return kind;
    }

    LineKind::Text
}

fn is_skipped(trimmed: &str) -> bool {
    if trimmed.starts_with("{{<") && trimmed.ends_with(">}}") {
        return true;
    }
    if trimmed.starts_with("<!--") && trimmed.ends_with("-->") {
        return true;
    }
    SKIPPED_COMMANDS.iter().any(|cmd| {
        trimmed
            .strip_prefix(cmd)
            .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_alphabetic()))
    })
}

fn parse_heading(raw: &str) -> Option<LineKind> {
    if raw.starts_with(' ') {
        return None;
    }
    let depth = raw.chars().take_while(|c| *c == '#').count();
    if depth == 0 || depth > 6 {
        return None;
    }
    let rest = &raw[depth..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }

    let (text, attrs) = extract_attributes(rest);
    let text = strip_closing_hashes(text);
    Some(LineKind::Heading {
        depth,
        text: text.to_string(),
        id: attrs.id.map(str::to_string),
    })
}

/// Removes an optional closing sequence (`## Title ##`).
fn strip_closing_hashes(text: &str) -> &str {
    let without = text.trim_end_matches('#');
    if without.len() != text.len() && (without.is_empty() || without.ends_with(' ')) {
        without.trim_end()
    } else {
        text
    }
}

fn is_rule(trimmed: &str) -> bool {
    let Some(first) = trimmed.chars().next() else {
        return false;
    };
    matches!(first, '-' | '*' | '_')
        && trimmed.chars().filter(|c| *c == first).count() >= 3
        && trimmed.chars().all(|c| c == first || c == ' ')
}

fn parse_list_item(raw: &str) -> Option<LineKind> {
    let indent = raw.len() - raw.trim_start_matches([' ', '\t']).len();
    let indent = raw[..indent]
        .chars()
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum();
    let rest = raw.trim_start();

    let (marker, after) = if let Some(after) = rest
        .strip_prefix(['-', '*', '+'])
        .filter(|a| a.starts_with([' ', '\t']))
    {
        (ListMarker::Bullet, after)
    } else {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let (marker, label_len) = if (1..=9).contains(&digits) {
            (ListMarker::Decimal, digits)
        } else if rest.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
            (ListMarker::LowerAlpha, 1)
        } else {
            return None;
        };
        let after = rest[label_len..].strip_prefix(['.', ')'])?;
        if !after.starts_with([' ', '\t']) {
            return None;
        }
        (marker, after)
    };

    let text = after.trim();
    if text.is_empty() && marker == ListMarker::LowerAlpha {
        return None;
    }
    Some(LineKind::ListItem {
        marker,
        indent,
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(body: &str) -> Vec<LineKind> {
        LineClassifier::new(body, 0).map(|t| t.kind).collect()
    }

    #[test]
    fn headings_with_attributes() {
        assert_eq!(
            classify_line("## Overview {#sec-a}"),
            LineKind::Heading {
                depth: 2,
                text: "Overview".into(),
                id: Some("sec-a".into()),
            }
        );
        assert_eq!(
            classify_line("### Solution {-}"),
            LineKind::Heading {
                depth: 3,
                text: "Solution".into(),
                id: None,
            }
        );
        assert_eq!(classify_line("#hashtag"), LineKind::Text);
    }

    #[test]
    fn list_markers() {
        assert_eq!(
            classify_line("  - nested"),
            LineKind::ListItem {
                marker: ListMarker::Bullet,
                indent: 2,
                text: "nested".into(),
            }
        );
        assert_eq!(
            classify_line("12. twelfth"),
            LineKind::ListItem {
                marker: ListMarker::Decimal,
                indent: 0,
                text: "twelfth".into(),
            }
        );
        assert_eq!(
            classify_line("b) second"),
            LineKind::ListItem {
                marker: ListMarker::LowerAlpha,
                indent: 0,
                text: "second".into(),
            }
        );
        assert_eq!(classify_line("*emphasis* first"), LineKind::Text);
        assert_eq!(classify_line("e.g. this"), LineKind::Text);
        assert_eq!(classify_line("1984 was a year"), LineKind::Text);
    }

    #[test]
    fn rules_skips_and_divs() {
        assert_eq!(classify_line("---"), LineKind::Rule);
        assert_eq!(classify_line("* * *"), LineKind::Rule);
        assert_eq!(classify_line("\\vspace{5mm}"), LineKind::Skip);
        assert_eq!(classify_line("\\clearpage"), LineKind::Skip);
        assert_eq!(classify_line("{{< include _links.qmd >}}"), LineKind::Skip);
        assert_eq!(classify_line("<!-- note to self -->"), LineKind::Skip);
        assert_eq!(classify_line("\\vspacewide"), LineKind::Text);
        assert_eq!(classify_line(":::"), LineKind::DivClose);
        assert!(matches!(classify_line("::: {.data}"), LineKind::DivOpen(_)));
    }

    #[test]
    fn chunk_options_only_at_chunk_start() {
        let body = "```{r}\n#| label: fig-x\n#| fig-cap: X\nplot(x)\n#| not metadata\n```";
        assert_eq!(
            kinds(body),
            vec![
                LineKind::FenceOpen(parse_fence_opening("```{r}")),
                LineKind::ChunkOption,
                LineKind::ChunkOption,
                LineKind::CodeLine,
                LineKind::CodeLine,
                LineKind::FenceClose,
            ]
        );
    }

    #[test]
    fn static_fence_has_no_options() {
        let body = "```r\n#| label: x\n```";
        assert_eq!(kinds(body)[1], LineKind::CodeLine);
    }

    #[test]
    fn fence_content_is_never_structure() {
        let body = "```\n## not a heading\n:::\n- item\n```\n## heading";
        let kinds = kinds(body);
        assert_eq!(kinds[1], LineKind::CodeLine);
        assert_eq!(kinds[2], LineKind::CodeLine);
        assert_eq!(kinds[3], LineKind::CodeLine);
        assert!(matches!(kinds[5], LineKind::Heading { depth: 2, .. }));
    }

    #[test]
    fn display_math_lines_are_text() {
        let body = "$$\n- x + y\n# z\n$$\n- item";
        let kinds = kinds(body);
        assert_eq!(kinds[..4], [LineKind::Text, LineKind::Text, LineKind::Text, LineKind::Text]);
        assert!(matches!(kinds[4], LineKind::ListItem { .. }));
    }

    #[test]
    fn line_numbers_include_offset() {
        let tokens: Vec<_> = LineClassifier::new("a\nb", 4).collect();
        assert_eq!(tokens[0].line, 5);
        assert_eq!(tokens[1].line, 6);
        assert_eq!(tokens[1].raw, "b");
    }
}
