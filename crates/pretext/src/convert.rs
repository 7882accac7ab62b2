//! Single-document conversion pipeline.

use qmdptx_core::{BlockParser, ConvertConfig, ConvertError, ConvertWarning};

use crate::emit::{AssetRequest, emit_document};
use crate::exercises::{group_exercises, merge_exercises};

/// Successful conversion of one chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// The PreTeXt document.
    pub xml: String,
    /// Non-fatal problems, in the order they were found.
    pub warnings: Vec<ConvertWarning>,
    /// External assets the document refers to.
    pub assets: Vec<AssetRequest>,
}

impl Conversion {
    /// Warnings rendered as `location: message` lines.
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}

/// Converts chapters, optionally with a separate exercise document.
#[derive(Debug, Clone)]
pub struct Converter<'c> {
    config: &'c ConvertConfig,
    file: Option<String>,
    exercises_file: Option<String>,
}

impl<'c> Converter<'c> {
    /// Create a converter.
    pub fn new(config: &'c ConvertConfig) -> Self {
        Self {
            config,
            file: None,
            exercises_file: None,
        }
    }

    /// Name used in locations reported for the chapter.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Name used in locations reported for the exercise document.
    pub fn with_exercises_file(mut self, file: impl Into<String>) -> Self {
        self.exercises_file = Some(file.into());
        self
    }

    /// Converts a chapter and, if given, merges its exercise document.
    ///
    /// Either the whole chapter converts or nothing is produced: any fatal
    /// error in either document is returned before output is written.
    pub fn convert(&self, source: &str, exercises: Option<&str>) -> Result<Conversion, ConvertError> {
        let mut parser = BlockParser::new(self.config);
        if let Some(file) = &self.file {
            parser = parser.with_file(file.clone());
        }
        let mut parsed = parser.parse(source)?;

        if let Some(exercise_source) = exercises {
            let mut exercise_parser = BlockParser::new(self.config)
                .fragment()
                .reserving(&parsed.registry);
            if let Some(file) = &self.exercises_file {
                exercise_parser = exercise_parser.with_file(file.clone());
            }
            let exercise_doc = exercise_parser.parse(exercise_source)?;
            let mut exercise_registry = exercise_doc.registry;
            let blocks = group_exercises(exercise_doc.document, &mut exercise_registry);
            parsed.diagnostics.extend(exercise_doc.diagnostics);
            merge_exercises(
                &mut parsed,
                blocks,
                exercise_registry,
                &self.config.exercises_title,
            )?;
        }

        parsed.resolve_references(self.config);
        let emission = emit_document(&parsed.document, self.config);
        log::debug!(
            "converted {} ({} bytes, {} warnings, {} assets)",
            self.file.as_deref().unwrap_or("<input>"),
            emission.xml.len(),
            parsed.diagnostics.count(),
            emission.assets.len()
        );

        Ok(Conversion {
            xml: emission.xml,
            warnings: parsed.diagnostics.warnings,
            assets: emission.assets,
        })
    }
}

/// Converts one chapter.
pub fn convert(source: &str, config: &ConvertConfig) -> Result<Conversion, ConvertError> {
    Converter::new(config).convert(source, None)
}

/// Converts one chapter together with its exercise document.
pub fn convert_with_exercises(
    source: &str,
    exercises: &str,
    config: &ConvertConfig,
) -> Result<Conversion, ConvertError> {
    Converter::new(config).convert(source, Some(exercises))
}
