//! Document tree produced by the block stack parser.
//!
//! The tree is built in a single forward pass and is immutable afterwards;
//! emitters only read it.

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkDescriptor;
use crate::error::SourceLocation;
use crate::inline::InlineSpan;

/// Root of a converted document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    /// Chapter identifier.
    pub id: String,
    /// Chapter title.
    pub title: Vec<InlineSpan>,
    /// Introduction block, also collecting content found before the first section.
    pub introduction: Option<SpecialBlock>,
    /// Top-level sections in source order.
    pub sections: Vec<Section>,
}

impl Document {
    /// Finds the section that holds the chapter exercises.
    pub fn exercises_section_mut(&mut self) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.exercises)
    }
}

/// Section nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SectionLevel {
    /// `##` heading.
    Section,
    /// `###` heading, only directly under a [`SectionLevel::Section`].
    Subsection,
}

/// A titled division of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Nesting level.
    pub level: SectionLevel,
    /// Unique, non-empty identifier.
    pub id: String,
    /// Heading text.
    pub title: Vec<InlineSpan>,
    /// True when this section holds the chapter's exercises.
    pub exercises: bool,
    /// Content in source order.
    pub children: Vec<Block>,
    /// Where the heading appeared.
    pub location: SourceLocation,
}

/// Block-level content.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Run of prose.
    Paragraph(Vec<InlineSpan>),
    /// Ordered or unordered list.
    List(List),
    /// Code chunk rendered as a listing, figure or table.
    Code(CodeArtifact),
    /// Fenced special block.
    Special(SpecialBlock),
    /// Subsection (only inside a level-1 section).
    Section(Section),
}

/// Kinds of fenced blocks with dedicated output elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecialKind {
    /// Chapter introduction.
    Introduction,
    /// Guided practice with an optional solution.
    Exercise,
    /// Worked example with an optional solution.
    WorkedExample,
    /// Description of a data set.
    DataNote,
    /// Highlighted box for important statements.
    EmphasisBox,
}

impl SpecialKind {
    /// Whether blocks of this kind carry a statement/solution pair.
    pub fn has_solution(self) -> bool {
        matches!(self, SpecialKind::Exercise | SpecialKind::WorkedExample)
    }

    /// Human readable name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            SpecialKind::Introduction => "introduction",
            SpecialKind::Exercise => "exercise",
            SpecialKind::WorkedExample => "worked example",
            SpecialKind::DataNote => "data note",
            SpecialKind::EmphasisBox => "emphasis box",
        }
    }
}

/// A fenced block such as an exercise or data note.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialBlock {
    /// Block kind.
    pub kind: SpecialKind,
    /// Identifier, always present for exercises and worked examples.
    pub id: Option<String>,
    /// Optional title from configuration or an inner heading.
    pub title: Option<Vec<InlineSpan>>,
    /// Statement content (the whole body for kinds without solutions).
    pub statement: Vec<Block>,
    /// Solution content, present only for exercises and worked examples.
    pub solution: Option<Vec<Block>>,
    /// Where the block was opened.
    pub location: SourceLocation,
}

/// List marker style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMarker {
    /// `-`, `*` or `+`.
    Bullet,
    /// `1.` or `1)`.
    Decimal,
    /// `a.` or `a)`.
    LowerAlpha,
}

impl ListMarker {
    /// Returns true for numbered and lettered markers.
    pub fn is_ordered(self) -> bool {
        !matches!(self, ListMarker::Bullet)
    }
}

/// A list of items sharing one marker style.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    /// Marker style of every item.
    pub marker: ListMarker,
    /// Items in order.
    pub items: Vec<ListItem>,
}

impl List {
    /// Returns true for numbered and lettered lists.
    pub fn ordered(&self) -> bool {
        self.marker.is_ordered()
    }
}

/// One list item.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    /// Item text including soft-wrapped continuation lines.
    pub content: Vec<InlineSpan>,
    /// Nested lists introduced by deeper-indented markers. A change of marker
    /// style at the same depth starts another list.
    pub sublists: Vec<List>,
}

/// How a code chunk is presented.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Plain program listing, identified when the chunk carries a label.
    Listing {
        /// Identifier derived from the chunk label.
        id: Option<String>,
    },
    /// Figure produced by the chunk.
    Figure(FigureSpec),
    /// Table produced by the chunk; its body is supplied externally.
    Table(TableSpec),
}

/// Figure presentation of a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct FigureSpec {
    /// Chunk label (`fig-x`).
    pub label: String,
    /// Figure identifier derived from the label.
    pub id: String,
    /// Caption.
    pub caption: Vec<InlineSpan>,
    /// One entry per panel of a multi-panel figure.
    pub panels: Vec<Panel>,
    /// Panels per row.
    pub columns: usize,
    /// Alternative text for the image(s).
    pub alt: Option<String>,
}

/// One panel of a multi-panel figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    /// Sub-caption.
    pub caption: Vec<InlineSpan>,
    /// Image file name (`<label>-<n>.png`).
    pub image: String,
}

/// Table presentation of a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    /// Chunk label (`tbl-x`).
    pub label: String,
    /// Table identifier derived from the label.
    pub id: String,
    /// Caption.
    pub caption: Vec<InlineSpan>,
}

/// An embedded code chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeArtifact {
    /// Raw code lines, metadata lines excluded.
    pub source_lines: Vec<String>,
    /// Language name, if known.
    pub language: Option<String>,
    /// Listing, figure or table.
    pub classification: Classification,
    /// Interpreted chunk metadata.
    pub descriptor: ChunkDescriptor,
    /// Where the fence was opened.
    pub location: SourceLocation,
}

impl CodeArtifact {
    /// Image file names referenced by a figure, in panel order.
    pub fn image_sources(&self) -> Vec<&str> {
        match &self.classification {
            Classification::Figure(figure) => {
                figure.panels.iter().map(|p| p.image.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}
