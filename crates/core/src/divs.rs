//! Fenced div markers (`::: {.guidedpractice}` ... `:::`).
//!
//! Opening and closing markers share the same leading run of colons; a line
//! made only of colons is always reported as a closer and the parser decides
//! which open scope it ends.

use crate::slug::parse_attribute_list;

/// Parsed representation of a div opening line (e.g. `::: {.data #data-loans}`).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DivOpening {
    /// Classes in source order, without the leading dot.
    pub classes: Vec<String>,
    /// Explicit `#id`, if given.
    pub id: Option<String>,
    /// Remaining `key=value` attributes.
    pub attrs: Vec<(String, String)>,
}

impl DivOpening {
    /// The first class, which selects the block kind.
    pub fn primary_class(&self) -> Option<&str> {
        self.classes.first().map(String::as_str)
    }
}

/// Parse an opening div line like `::: {.callout-note collapse="true"}`.
///
/// Accepts the braced attribute form, the bare-word form (`::: data`) and the
/// brace-only form without a space (`:::{.important}`). Returns `None` for
/// closers and for anything that is not a div marker.
pub fn parse_div_opening(line: &str) -> Option<DivOpening> {
    let rest = strip_colons(line)?;
    let rest = rest.trim_end_matches(':').trim();
    if rest.is_empty() {
        return None;
    }

    if let Some(inner) = rest.strip_prefix('{') {
        let inner = inner.strip_suffix('}')?;
        let attrs = parse_attribute_list(inner)?;
        return Some(DivOpening {
            classes: attrs.classes.iter().map(|c| c.to_string()).collect(),
            id: attrs.id.map(str::to_string),
            attrs: attrs
                .pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    let word = rest.split_whitespace().next()?;
    if !word
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }

    Some(DivOpening {
        classes: vec![word.to_string()],
        ..DivOpening::default()
    })
}

/// Check if a line is a div closer (three or more colons and nothing else).
pub fn is_div_closer(line: &str) -> bool {
    matches!(strip_colons(line), Some(rest) if rest.trim().is_empty())
}

/// Strips the leading run of 3+ colons, returning what follows.
fn strip_colons(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.len() - trimmed.trim_start_matches(':').len() < 3 {
        return None;
    }
    Some(trimmed.trim_start_matches(':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_braced_opening() {
        let opening = parse_div_opening("::: {.guidedpractice data-latex=\"\"}").unwrap();
        assert_eq!(opening.primary_class(), Some("guidedpractice"));
        assert_eq!(opening.attrs, vec![("data-latex".into(), "".into())]);
    }

    #[test]
    fn parses_opening_without_space_and_with_id() {
        let opening = parse_div_opening(":::{.data #data-loans}").unwrap();
        assert_eq!(opening.classes, vec!["data"]);
        assert_eq!(opening.id.as_deref(), Some("data-loans"));
    }

    #[test]
    fn parses_long_fence_and_bare_word() {
        let opening = parse_div_opening(":::: {.callout-note collapse=\"true\"}").unwrap();
        assert_eq!(opening.classes, vec!["callout-note"]);
        assert_eq!(opening.attrs, vec![("collapse".to_string(), "true".to_string())]);

        let opening = parse_div_opening("::: workedexample").unwrap();
        assert_eq!(opening.primary_class(), Some("workedexample"));
    }

    #[test]
    fn closers_are_not_openings() {
        assert!(parse_div_opening(":::").is_none());
        assert!(parse_div_opening("::::  ").is_none());
        assert!(is_div_closer(":::"));
        assert!(is_div_closer("  :::::"));
    }

    #[test]
    fn rejects_non_markers() {
        assert!(parse_div_opening(":: {.data}").is_none());
        assert!(!is_div_closer("::"));
        assert!(!is_div_closer("::: {.data}"));
        assert!(parse_div_opening("::: {not valid}").is_none());
    }
}
