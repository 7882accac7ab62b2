//! Conversion configuration.
//!
//! Maps fenced-div classes to special block kinds and carries the naming
//! conventions of the target book (image directory, citation prefix, ...).
//! Every field has a default, so a partial YAML or JSON document is enough to
//! override a single setting.

use serde::{Deserialize, Serialize};

use crate::ast::SpecialKind;
use crate::error::ConvertError;

/// Mapping from a div class to a special block kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMapping {
    /// Div class without the leading dot (e.g. "guidedpractice").
    pub class: String,
    /// Block kind produced for the class.
    pub kind: SpecialKind,
    /// Fixed title emitted for every block of this class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl BlockMapping {
    fn new(class: &str, kind: SpecialKind, title: Option<&str>) -> Self {
        Self {
            class: class.to_string(),
            kind,
            title: title.map(str::to_string),
        }
    }
}

/// Settings shared by the parser and the emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvertConfig {
    /// Div class to block kind mappings.
    pub blocks: Vec<BlockMapping>,
    /// Div classes that open a solution scope inside an exercise or example.
    pub solution_classes: Vec<String>,
    /// Heading texts that mark the start of a solution.
    pub solution_headings: Vec<String>,
    /// Label namespaces recognised by `@prefix-id` cross-references.
    pub xref_prefixes: Vec<String>,
    /// Language assumed for chunks that do not name one.
    pub language: String,
    /// Directory prefix of figure images.
    pub image_dir: String,
    /// Directory prefix of externally generated table bodies.
    pub table_dir: String,
    /// Width of single-panel figures.
    pub figure_width: String,
    /// Prefix prepended to citation keys in references.
    pub citation_prefix: String,
    /// Citation keys known to exist in the external bibliography.
    pub known_citations: Vec<String>,
    /// Chapter id override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    /// Chapter title override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
    /// Title of the exercises section created for an exercise document.
    pub exercises_title: String,
    /// Emit the code of figure and table chunks as a listing as well.
    pub include_figure_code: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            blocks: vec![
                BlockMapping::new("chapterintro", SpecialKind::Introduction, None),
                BlockMapping::new("guidedpractice", SpecialKind::Exercise, None),
                BlockMapping::new("workedexample", SpecialKind::WorkedExample, None),
                BlockMapping::new("data", SpecialKind::DataNote, Some("Data")),
                BlockMapping::new("important", SpecialKind::EmphasisBox, None),
            ],
            solution_classes: vec!["callout-note".to_string()],
            solution_headings: vec!["Solution".to_string(), "Answer".to_string()],
            xref_prefixes: ["sec", "subsec", "fig", "tbl", "eq", "exm", "exr", "lst"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            language: "r".to_string(),
            image_dir: "images".to_string(),
            table_dir: "tables".to_string(),
            figure_width: "70%".to_string(),
            citation_prefix: String::new(),
            known_citations: Vec::new(),
            chapter_id: None,
            chapter_title: None,
            exercises_title: "Exercises".to_string(),
            include_figure_code: false,
        }
    }
}

impl ConvertConfig {
    /// Loads a configuration from YAML; missing fields keep their defaults.
    pub fn from_yaml_str(input: &str) -> Result<Self, ConvertError> {
        serde_yaml::from_str(input).map_err(|err| ConvertError::Config(err.to_string()))
    }

    /// Loads a configuration from JSON; missing fields keep their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, ConvertError> {
        serde_json::from_str(input).map_err(|err| ConvertError::Config(err.to_string()))
    }

    /// Get the block mapping for a div class.
    pub fn block_mapping(&self, class: &str) -> Option<&BlockMapping> {
        self.blocks.iter().find(|m| m.class == class)
    }

    /// Check if a div class opens a solution scope.
    pub fn is_solution_class(&self, class: &str) -> bool {
        self.solution_classes.iter().any(|c| c == class)
    }

    /// Check if heading text marks the start of a solution.
    pub fn is_solution_heading(&self, text: &str) -> bool {
        let text = text.trim();
        self.solution_headings.iter().any(|h| {
            text.len() >= h.len()
                && text.is_char_boundary(h.len())
                && text[..h.len()].eq_ignore_ascii_case(h)
        })
    }

    /// Check if a label namespace is a cross-reference prefix.
    pub fn is_xref_prefix(&self, prefix: &str) -> bool {
        self.xref_prefixes.iter().any(|p| p == prefix)
    }

    /// Check if a citation key resolves in the external bibliography.
    pub fn is_known_citation(&self, key: &str) -> bool {
        self.known_citations.iter().any(|k| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_book_classes() {
        let config = ConvertConfig::default();
        assert_eq!(
            config.block_mapping("guidedpractice").map(|m| m.kind),
            Some(SpecialKind::Exercise)
        );
        assert_eq!(
            config.block_mapping("data").and_then(|m| m.title.as_deref()),
            Some("Data")
        );
        assert!(config.block_mapping("callout-tip").is_none());
        assert!(config.is_solution_class("callout-note"));
    }

    #[test]
    fn solution_heading_matches_prefix_case_insensitively() {
        let config = ConvertConfig::default();
        assert!(config.is_solution_heading("Solution"));
        assert!(config.is_solution_heading("solution {-}"));
        assert!(config.is_solution_heading("Answer to part (a)"));
        assert!(!config.is_solution_heading("Overview"));
        assert!(!config.is_solution_heading("Sol"));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ConvertConfig::from_yaml_str("imageDir: figures\nincludeFigureCode: true\n")
            .expect("config should load");
        assert_eq!(config.image_dir, "figures");
        assert!(config.include_figure_code);
        assert_eq!(config.language, "r");
        assert_eq!(config.blocks.len(), 5);
    }

    #[test]
    fn json_block_mappings_replace_defaults() {
        let config = ConvertConfig::from_json_str(
            r#"{"blocks": [{"class": "tip", "kind": "emphasisBox"}]}"#,
        )
        .expect("config should load");
        assert_eq!(config.blocks.len(), 1);
        assert_eq!(
            config.block_mapping("tip").map(|m| m.kind),
            Some(SpecialKind::EmphasisBox)
        );
    }

    #[test]
    fn invalid_config_is_reported() {
        let err = ConvertConfig::from_yaml_str("blocks: 3").unwrap_err();
        assert!(matches!(err, ConvertError::Config(_)));
    }
}
