use thiserror::Error;

use crate::frontmatter::FrontmatterError;

/// Source location information for error reporting
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// Optional file path
    pub file: Option<String>,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    /// Create a source location with file information
    pub fn with_file(file: String, line: usize, column: usize) -> Self {
        Self {
            file: Some(file),
            line,
            column,
        }
    }

    /// Location of the first column of a line.
    pub fn line(line: usize) -> Self {
        Self::new(line, 1)
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:{}:{}", file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Violations of block nesting found by the block stack parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// End of input reached while a block was still open.
    #[error("unclosed {kind} block opened at {location}")]
    UnclosedBlock {
        /// Human readable block kind (e.g. `exercise`).
        kind: String,
        /// Where the block was opened.
        location: SourceLocation,
    },
    /// A close marker with no open block to close.
    #[error("close marker at {location} has no open block")]
    UnmatchedClose {
        /// Where the stray close marker appeared.
        location: SourceLocation,
    },
    /// A code fence that never reached its closing marker.
    #[error("unclosed code fence opened at {location}")]
    UnclosedFence {
        /// Where the fence was opened.
        location: SourceLocation,
    },
}

/// Fatal errors that abort the conversion of a document.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Unbalanced or unclosed block structure.
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),
    /// Two declarations claim the same identifier.
    #[error("Duplicate id `{id}` at {second} (first declared at {first})")]
    DuplicateId {
        /// The identifier declared twice.
        id: String,
        /// Location of the first declaration.
        first: SourceLocation,
        /// Location of the conflicting declaration.
        second: SourceLocation,
    },
    /// The YAML front matter could not be read.
    #[error("Frontmatter error: {0}")]
    Frontmatter(#[from] FrontmatterError),
    /// The conversion configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ConvertError {
    /// Shorthand for an unclosed block error.
    pub fn unclosed(kind: impl Into<String>, location: SourceLocation) -> Self {
        Self::Structural(StructuralError::UnclosedBlock {
            kind: kind.into(),
            location,
        })
    }
}

/// Which inline construct produced a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `@sec-foo` style cross-reference to a declared element.
    CrossReference,
    /// `[@key]` citation resolved by an external bibliography.
    Citation,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::CrossReference => f.write_str("cross-reference"),
            ReferenceKind::Citation => f.write_str("citation"),
        }
    }
}

/// Non-fatal conditions surfaced alongside a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertWarning {
    /// A reference target that was never declared.
    UnresolvedReference {
        /// The referenced identifier or citation key.
        target: String,
        /// Cross-reference or citation.
        kind: ReferenceKind,
        /// Where the reference appeared.
        location: SourceLocation,
    },
    /// Chunk metadata that could not be read; the chunk became a plain listing.
    MalformedChunkMetadata {
        /// Location of the code fence.
        location: SourceLocation,
        /// What was wrong with the metadata.
        message: String,
    },
    /// A solution scope was opened but collected no content.
    EmptySolution {
        /// Kind of the enclosing block.
        kind: String,
        /// Where the enclosing block was opened.
        location: SourceLocation,
    },
    /// A fenced div whose class maps to no known block kind.
    UnknownDivClass {
        /// The first class on the div, if any.
        class: String,
        /// Where the div was opened.
        location: SourceLocation,
    },
}

impl std::fmt::Display for ConvertWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvertWarning::UnresolvedReference {
                target,
                kind,
                location,
            } => write!(f, "{}: unresolved {} `{}`", location, kind, target),
            ConvertWarning::MalformedChunkMetadata { location, message } => {
                write!(f, "{}: malformed chunk metadata: {}", location, message)
            }
            ConvertWarning::EmptySolution { kind, location } => {
                write!(f, "{}: empty solution in {} block", location, kind)
            }
            ConvertWarning::UnknownDivClass { class, location } => {
                write!(f, "{}: unknown div class `{}`", location, class)
            }
        }
    }
}

/// Collection of non-fatal diagnostics gathered during one conversion.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// Warnings in the order they were raised.
    pub warnings: Vec<ConvertWarning>,
}

impl Diagnostics {
    /// Create a new empty diagnostics collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a warning, logging it at warn level.
    pub fn add_warning(&mut self, warning: ConvertWarning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Append every warning from another collection.
    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Unresolved references only.
    pub fn unresolved_references(&self) -> impl Iterator<Item = &ConvertWarning> {
        self.warnings
            .iter()
            .filter(|w| matches!(w, ConvertWarning::UnresolvedReference { .. }))
    }

    /// Get total count of all diagnostics
    pub fn count(&self) -> usize {
        self.warnings.len()
    }
}
