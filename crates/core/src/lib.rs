#![deny(missing_docs)]
//! qmdptx core: reads Quarto-flavoured academic Markdown into a document
//! tree with typed inline spans, a checked identifier registry and
//! accumulated diagnostics.

/// Document tree types.
pub mod ast;
/// Chunk metadata interpretation and classification.
pub mod chunk;
/// Line classification.
pub mod classify;
/// Code fence detection utilities.
pub mod code_fence;
/// Conversion configuration.
pub mod config;
/// Fenced div markers.
pub mod divs;
/// Core error and diagnostic types.
pub mod error;
/// YAML frontmatter extraction helpers.
pub mod frontmatter;
/// Inline span conversion.
pub mod inline;
/// Block stack parser.
pub mod parser;
/// Identifier declarations and references.
pub mod registry;
/// Identifier derivation and attribute annotations.
pub mod slug;

pub use ast::{
    Block, Classification, CodeArtifact, Document, FigureSpec, List, ListItem, ListMarker, Panel,
    Section, SectionLevel, SpecialBlock, SpecialKind, TableSpec,
};
pub use chunk::{ChunkDescriptor, ChunkMetadataError, classify_chunk, interpret_chunk};
pub use classify::{LineClassifier, LineKind, Token, classify_line};
pub use config::{BlockMapping, ConvertConfig};
pub use error::{
    ConvertError, ConvertWarning, Diagnostics, ReferenceKind, SourceLocation, StructuralError,
};
pub use frontmatter::{Frontmatter, FrontmatterError, FrontmatterExtraction, extract_frontmatter};
pub use inline::{InlineConverter, InlineSpan, collect_references, plain_text};
pub use parser::{BlockParser, ParsedDocument, parse_document};
pub use registry::{Declaration, DeclarationKind, IdRegistry, Reference};
pub use slug::{Attributes, derive_id, extract_attributes};
