//! Block stack parser.
//!
//! Consumes classified lines and builds the [`Document`] tree in one pass.
//! Open scopes live on an explicit stack of frames: the document at the
//! bottom, then sections, then fenced divs. Paragraph and list text is
//! buffered and flushed into the top frame whenever structure changes.
//!
//! Headings never cross a div boundary: inside a fenced div a heading is a
//! block title, a solution marker or a bold paragraph.

use crate::ast::{
    Block, CodeArtifact, Classification, Document, List, ListItem, ListMarker, Section,
    SectionLevel, SpecialBlock, SpecialKind,
};
use crate::chunk::{ChunkDescriptor, classify_chunk, interpret_chunk, trim_code_lines};
use crate::classify::{LineClassifier, LineKind, Token};
use crate::code_fence::FenceOpening;
use crate::config::ConvertConfig;
use crate::divs::DivOpening;
use crate::error::{
    ConvertError, ConvertWarning, Diagnostics, SourceLocation, StructuralError,
};
use crate::frontmatter::{Frontmatter, extract_frontmatter};
use crate::inline::{InlineConverter, InlineSpan, collect_references, plain_text};
use crate::registry::{DeclarationKind, IdRegistry};
use crate::slug::derive_id;

/// Result of parsing one document.
#[derive(Debug)]
pub struct ParsedDocument {
    /// The document tree.
    pub document: Document,
    /// Declared identifiers and unresolved references.
    pub registry: IdRegistry,
    /// Warnings raised while parsing.
    pub diagnostics: Diagnostics,
}

impl ParsedDocument {
    /// Resolves recorded references and adds a warning for each dangling one.
    ///
    /// Call this once every document sharing the registry has been merged.
    pub fn resolve_references(&mut self, config: &ConvertConfig) {
        for warning in self.registry.resolve(config) {
            self.diagnostics.add_warning(warning);
        }
    }
}

/// Parses academic Markdown into a [`Document`].
#[derive(Debug, Clone)]
pub struct BlockParser<'c> {
    config: &'c ConvertConfig,
    file: Option<String>,
    fragment: bool,
    reserved: Option<&'c IdRegistry>,
}

impl<'c> BlockParser<'c> {
    /// Create a parser for a complete chapter.
    pub fn new(config: &'c ConvertConfig) -> Self {
        Self {
            config,
            file: None,
            fragment: false,
            reserved: None,
        }
    }

    /// Attach a file name to every reported location.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Parse a fragment that will be merged into another document.
    ///
    /// Fragments declare no chapter identifier and treat a `#` heading as a
    /// section.
    pub fn fragment(mut self) -> Self {
        self.fragment = true;
        self
    }

    /// Treat every id declared in `registry` as taken.
    ///
    /// Derived ids get a numeric suffix instead of colliding, so the result
    /// can be absorbed into `registry` afterwards.
    pub fn reserving(mut self, registry: &'c IdRegistry) -> Self {
        self.reserved = Some(registry);
        self
    }

    /// Parses `input`. Structural violations and duplicate identifiers abort
    /// the parse; everything else is reported through the diagnostics.
    pub fn parse(&self, input: &str) -> Result<ParsedDocument, ConvertError> {
        let extraction = extract_frontmatter(input)?;
        let body = input[extraction.body_start..].trim_start_matches('\u{feff}');

        let mut state = ParseState::new(self, extraction.frontmatter);
        for token in LineClassifier::new(body, extraction.body_line_offset) {
            state.step(token)?;
        }
        state.finish()
    }
}

/// Parses a complete chapter with no file name attached.
pub fn parse_document(input: &str, config: &ConvertConfig) -> Result<ParsedDocument, ConvertError> {
    BlockParser::new(config).parse(input)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Document,
    Section(SectionLevel),
    Special(SpecialKind),
    /// Solution div nested in an exercise or worked example.
    Solution,
    /// Div with no block mapping; its content flows into the parent.
    Div,
}

impl FrameKind {
    fn name(self) -> &'static str {
        match self {
            FrameKind::Document => "document",
            FrameKind::Section(SectionLevel::Section) => "section",
            FrameKind::Section(SectionLevel::Subsection) => "subsection",
            FrameKind::Special(kind) => kind.name(),
            FrameKind::Solution => "solution",
            FrameKind::Div => "div",
        }
    }

    fn is_div(self) -> bool {
        matches!(self, FrameKind::Special(_) | FrameKind::Solution | FrameKind::Div)
    }
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    location: SourceLocation,
    id: Option<String>,
    title: Option<Vec<InlineSpan>>,
    exercises: bool,
    blocks: Vec<Block>,
    /// `Some` once a special block has entered its solution.
    solution: Option<Vec<Block>>,
}

impl Frame {
    fn new(kind: FrameKind, location: SourceLocation) -> Self {
        Self {
            kind,
            location,
            id: None,
            title: None,
            exercises: false,
            blocks: Vec::new(),
            solution: None,
        }
    }

    fn accepts_solution(&self) -> bool {
        matches!(self.kind, FrameKind::Special(kind) if kind.has_solution()) && self.solution.is_none()
    }
}

#[derive(Debug)]
struct PendingCode {
    opening: FenceOpening,
    options: Vec<String>,
    lines: Vec<String>,
    location: SourceLocation,
}

struct ParseState<'c> {
    config: &'c ConvertConfig,
    inline: InlineConverter<'c>,
    file: Option<String>,
    fragment: bool,
    frontmatter: Frontmatter,
    registry: IdRegistry,
    diagnostics: Diagnostics,
    stack: Vec<Frame>,
    sections: Vec<Section>,
    chapter_id: Option<String>,
    heading_title: Option<String>,
    paragraph: Vec<String>,
    paragraph_line: usize,
    list: Option<ListBuilder>,
    after_blank: bool,
    code: Option<PendingCode>,
    section_count: usize,
    exercise_count: usize,
    example_count: usize,
}

impl<'c> ParseState<'c> {
    fn new(parser: &BlockParser<'c>, frontmatter: Frontmatter) -> Self {
        let mut state = Self {
            config: parser.config,
            inline: InlineConverter::new(parser.config),
            file: parser.file.clone(),
            fragment: parser.fragment,
            frontmatter,
            registry: parser
                .reserved
                .map(IdRegistry::reserving)
                .unwrap_or_default(),
            diagnostics: Diagnostics::new(),
            stack: Vec::new(),
            sections: Vec::new(),
            chapter_id: None,
            heading_title: None,
            paragraph: Vec::new(),
            paragraph_line: 0,
            list: None,
            after_blank: false,
            code: None,
            section_count: 0,
            exercise_count: 0,
            example_count: 0,
        };
        let root = Frame::new(FrameKind::Document, state.location(1));
        state.stack.push(root);

        if !state.fragment {
            let explicit = state
                .config
                .chapter_id
                .clone()
                .or_else(|| state.frontmatter.id.clone());
            if let Some(id) = explicit {
                let location = state.location(1);
                state
                    .registry
                    .declare_unique(&id, DeclarationKind::Chapter, location);
                state.chapter_id = Some(id);
            }
        }
        state
    }

    fn location(&self, line: usize) -> SourceLocation {
        SourceLocation {
            file: self.file.clone(),
            line,
            column: 1,
        }
    }

    fn step(&mut self, token: Token<'_>) -> Result<(), ConvertError> {
        log::trace!("line {}: {:?}", token.line, token.kind);
        let line = token.line;

        match token.kind {
            LineKind::Blank => {
                self.flush_paragraph();
                self.after_blank = true;
            }
            LineKind::Text => self.text(token.raw, line),
            LineKind::ListItem {
                marker,
                indent,
                text,
            } => self.list_item(marker, indent, text, line),
            LineKind::Heading { depth, text, id } => {
                self.flush_all();
                self.heading(depth, text, id, line)?;
            }
            LineKind::Rule => {
                self.flush_all();
                match self.stack.last_mut() {
                    Some(top) if top.accepts_solution() => top.solution = Some(Vec::new()),
                    _ => log::debug!("ignoring rule at line {}", line),
                }
            }
            LineKind::Skip => log::debug!("skipping line {}: {}", line, token.raw.trim()),
            LineKind::DivOpen(opening) => {
                self.flush_all();
                self.open_div(opening, line)?;
            }
            LineKind::DivClose => {
                self.flush_all();
                self.close_div(line)?;
            }
            LineKind::FenceOpen(opening) => {
                self.flush_all();
                self.code = Some(PendingCode {
                    opening,
                    options: Vec::new(),
                    lines: Vec::new(),
                    location: self.location(line),
                });
            }
            LineKind::ChunkOption => {
                if let Some(code) = self.code.as_mut() {
                    code.options.push(token.raw.to_string());
                }
            }
            LineKind::CodeLine => {
                if let Some(code) = self.code.as_mut() {
                    code.lines.push(token.raw.to_string());
                }
            }
            LineKind::FenceClose => self.finish_code()?,
        }
        Ok(())
    }

    fn text(&mut self, raw: &str, line: usize) {
        if let Some(list) = self.list.as_mut() {
            let indented = raw.len() - raw.trim_start().len() >= 2;
            if !self.after_blank || indented {
                list.continue_item(raw.trim());
                self.after_blank = false;
                return;
            }
            self.flush_list();
        }
        if self.paragraph.is_empty() {
            self.paragraph_line = line;
        }
        self.paragraph.push(raw.trim().to_string());
        self.after_blank = false;
    }

    fn list_item(&mut self, marker: ListMarker, indent: usize, text: String, line: usize) {
        self.flush_paragraph();
        let finished = self
            .list
            .get_or_insert_with(ListBuilder::default)
            .push(marker, indent, text, line);
        if let Some(raw) = finished {
            let list = self.build_list(raw);
            self.add_block(Block::List(list));
        }
        self.after_blank = false;
    }

    fn heading(
        &mut self,
        depth: usize,
        text: String,
        id: Option<String>,
        line: usize,
    ) -> Result<(), ConvertError> {
        let location = self.location(line);
        if self.stack.last().is_some_and(|f| f.kind.is_div()) {
            self.block_heading(&text, line);
            return Ok(());
        }

        match depth {
            1 if !self.fragment && self.heading_title.is_none() => {
                self.chapter_heading(text, id, location)
            }
            1 | 2 => self.open_section(SectionLevel::Section, &text, id, location),
            3 => self.open_section(SectionLevel::Subsection, &text, id, location),
            _ => {
                self.minor_heading(&text, line);
                Ok(())
            }
        }
    }

    fn chapter_heading(
        &mut self,
        text: String,
        id: Option<String>,
        location: SourceLocation,
    ) -> Result<(), ConvertError> {
        if self.chapter_id.is_none() {
            let chapter_id = match id {
                Some(id) => {
                    self.registry
                        .declare(&id, DeclarationKind::Chapter, location)?;
                    id
                }
                None => {
                    let base = derive_id(&plain_text(&self.inline.convert(&text)));
                    let base = if base.is_empty() { "chapter".to_string() } else { base };
                    self.registry
                        .declare_unique(&base, DeclarationKind::Chapter, location)
                }
            };
            self.chapter_id = Some(chapter_id);
        }
        self.heading_title = Some(text);
        Ok(())
    }

    /// A heading inside a fenced div.
    fn block_heading(&mut self, text: &str, line: usize) {
        let is_solution_heading = self.config.is_solution_heading(text);
        let title = self.convert(text, line);
        let Some(top) = self.stack.last_mut() else {
            return;
        };

        let untouched = top.title.is_none() && top.blocks.is_empty() && top.solution.is_none();
        match top.kind {
            FrameKind::Special(kind) if kind.has_solution() && is_solution_heading => {
                top.solution.get_or_insert_with(Vec::new);
                return;
            }
            FrameKind::Solution if is_solution_heading => return,
            FrameKind::Special(_) if untouched => {
                top.title = Some(title);
                return;
            }
            _ => {}
        }
        self.add_block(Block::Paragraph(vec![InlineSpan::Strong(title)]));
    }

    fn minor_heading(&mut self, text: &str, line: usize) {
        let spans = self.convert(text, line);
        self.add_block(Block::Paragraph(vec![InlineSpan::Strong(spans)]));
    }

    fn open_section(
        &mut self,
        level: SectionLevel,
        text: &str,
        explicit_id: Option<String>,
        location: SourceLocation,
    ) -> Result<(), ConvertError> {
        while let Some(FrameKind::Section(open)) = self.stack.last().map(|f| f.kind) {
            if open < level {
                break;
            }
            self.close_section();
        }

        let parent_is_section = matches!(
            self.stack.last().map(|f| f.kind),
            Some(FrameKind::Section(SectionLevel::Section))
        );
        let level = if level == SectionLevel::Subsection && !parent_is_section {
            log::debug!("subsection at {} has no enclosing section, promoting", location);
            SectionLevel::Section
        } else {
            level
        };

        self.section_count += 1;
        let title = self.convert(text, location.line);
        let id = match explicit_id {
            Some(id) => {
                self.registry
                    .declare(&id, DeclarationKind::Section, location.clone())?;
                id
            }
            None => {
                let derived = derive_id(&plain_text(&title));
                let base = if derived.is_empty() {
                    format!("section-{}", self.section_count)
                } else {
                    derived
                };
                self.registry
                    .declare_unique(&base, DeclarationKind::Section, location.clone())
            }
        };

        let exercises = level == SectionLevel::Section
            && (id.to_lowercase().contains("exercises")
                || plain_text(&title).to_lowercase().contains("exercises"));

        let mut frame = Frame::new(FrameKind::Section(level), location);
        frame.id = Some(id);
        frame.title = Some(title);
        frame.exercises = exercises;
        self.stack.push(frame);
        Ok(())
    }

    fn close_section(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let FrameKind::Section(level) = frame.kind else {
            self.stack.push(frame);
            return;
        };
        let section = Section {
            level,
            id: frame.id.unwrap_or_default(),
            title: frame.title.unwrap_or_default(),
            exercises: frame.exercises,
            children: frame.blocks,
            location: frame.location,
        };
        match level {
            SectionLevel::Section => self.sections.push(section),
            SectionLevel::Subsection => self.add_block(Block::Section(section)),
        }
    }

    fn open_div(&mut self, opening: DivOpening, line: usize) -> Result<(), ConvertError> {
        let config = self.config;
        let location = self.location(line);

        if opening
            .classes
            .iter()
            .any(|class| config.is_solution_class(class))
        {
            if let Some(top) = self.stack.last_mut()
                && top.accepts_solution()
            {
                top.solution = Some(Vec::new());
                self.stack.push(Frame::new(FrameKind::Solution, location));
            } else {
                log::debug!("solution div at {} outside an exercise, keeping content", location);
                self.stack.push(Frame::new(FrameKind::Div, location));
            }
            return Ok(());
        }

        let Some(mapping) = opening
            .classes
            .iter()
            .find_map(|class| config.block_mapping(class))
        else {
            if let Some(class) = opening.primary_class() {
                self.diagnostics.add_warning(ConvertWarning::UnknownDivClass {
                    class: class.to_string(),
                    location: location.clone(),
                });
            }
            self.stack.push(Frame::new(FrameKind::Div, location));
            return Ok(());
        };

        let kind = mapping.kind;
        let title = mapping.title.clone().map(|t| vec![InlineSpan::Text(t)]);
        let id = match opening.id {
            Some(id) => {
                let declared = if kind.has_solution() {
                    DeclarationKind::Exercise
                } else {
                    DeclarationKind::Block
                };
                self.registry.declare(&id, declared, location.clone())?;
                Some(id)
            }
            None if kind.has_solution() => {
                let base = if kind == SpecialKind::Exercise {
                    self.exercise_count += 1;
                    format!("exercise-{}", self.exercise_count)
                } else {
                    self.example_count += 1;
                    format!("example-{}", self.example_count)
                };
                Some(self.registry.declare_unique(
                    &base,
                    DeclarationKind::Exercise,
                    location.clone(),
                ))
            }
            None => None,
        };

        let mut frame = Frame::new(FrameKind::Special(kind), location);
        frame.id = id;
        frame.title = title;
        self.stack.push(frame);
        Ok(())
    }

    fn close_div(&mut self, line: usize) -> Result<(), ConvertError> {
        let kind = self.stack.last().map(|f| f.kind);
        match kind {
            None | Some(FrameKind::Document) | Some(FrameKind::Section(_)) => {
                Err(StructuralError::UnmatchedClose {
                    location: self.location(line),
                }
                .into())
            }
            Some(FrameKind::Div) => {
                if let Some(frame) = self.stack.pop() {
                    for block in frame.blocks {
                        self.add_block(block);
                    }
                }
                Ok(())
            }
            Some(FrameKind::Solution) => {
                if let Some(frame) = self.stack.pop()
                    && let Some(parent) = self.stack.last_mut()
                {
                    parent
                        .solution
                        .get_or_insert_with(Vec::new)
                        .extend(frame.blocks);
                }
                Ok(())
            }
            Some(FrameKind::Special(kind)) => {
                if let Some(frame) = self.stack.pop() {
                    let block = self.finish_special(kind, frame);
                    self.add_block(Block::Special(block));
                }
                Ok(())
            }
        }
    }

    fn finish_special(&mut self, kind: SpecialKind, frame: Frame) -> SpecialBlock {
        let solution = match frame.solution {
            Some(blocks) if blocks.is_empty() => {
                self.diagnostics.add_warning(ConvertWarning::EmptySolution {
                    kind: kind.name().to_string(),
                    location: frame.location.clone(),
                });
                None
            }
            other => other,
        };
        SpecialBlock {
            kind,
            id: frame.id,
            title: frame.title,
            statement: frame.blocks,
            solution,
            location: frame.location,
        }
    }

    fn finish_code(&mut self) -> Result<(), ConvertError> {
        let Some(code) = self.code.take() else {
            return Ok(());
        };
        let location = code.location;

        let descriptor = match interpret_chunk(&code.opening, &code.options) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                let location = match err.line {
                    Some(offset) => self.location(location.line + 1 + offset),
                    None => location.clone(),
                };
                self.diagnostics
                    .add_warning(ConvertWarning::MalformedChunkMetadata {
                        location,
                        message: err.message,
                    });
                ChunkDescriptor::default()
            }
        };
        if !descriptor.include {
            log::debug!("dropping chunk at {} (include: false)", location);
            return Ok(());
        }

        let classification = classify_chunk(&descriptor, &self.inline);
        match &classification {
            Classification::Figure(figure) => {
                self.record_references(&figure.caption, &location);
                for panel in &figure.panels {
                    self.record_references(&panel.caption, &location);
                }
                self.registry
                    .declare(&figure.id, DeclarationKind::Figure, location.clone())?;
                if figure.panels.len() > 1 {
                    for n in 1..=figure.panels.len() {
                        self.registry.declare(
                            &format!("{}-{}", figure.id, n),
                            DeclarationKind::Figure,
                            location.clone(),
                        )?;
                    }
                }
            }
            Classification::Table(table) => {
                self.record_references(&table.caption, &location);
                self.registry
                    .declare(&table.id, DeclarationKind::Table, location.clone())?;
            }
            Classification::Listing { id: Some(id) } => {
                self.registry
                    .declare(id, DeclarationKind::Listing, location.clone())?;
            }
            Classification::Listing { id: None } => {}
        }

        let language = code
            .opening
            .language
            .clone()
            .or_else(|| code.opening.executable.then(|| self.config.language.clone()));

        self.add_block(Block::Code(CodeArtifact {
            source_lines: trim_code_lines(code.lines),
            language,
            classification,
            descriptor,
            location,
        }));
        Ok(())
    }

    fn add_block(&mut self, block: Block) {
        if let Some(frame) = self.stack.last_mut() {
            match frame.solution.as_mut() {
                Some(solution) => solution.push(block),
                None => frame.blocks.push(block),
            }
        }
    }

    fn convert(&mut self, text: &str, line: usize) -> Vec<InlineSpan> {
        let spans = self.inline.convert(text);
        let location = self.location(line);
        self.record_references(&spans, &location);
        spans
    }

    fn record_references(&mut self, spans: &[InlineSpan], location: &SourceLocation) {
        let mut references = Vec::new();
        collect_references(spans, &mut references);
        for (target, kind) in references {
            self.registry.reference(&target, kind, location.clone());
        }
    }

    fn flush_paragraph(&mut self) {
        if self.paragraph.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.paragraph).join("\n");
        let spans = self.convert(&text, self.paragraph_line);
        if !spans.is_empty() {
            self.add_block(Block::Paragraph(spans));
        }
    }

    fn flush_list(&mut self) {
        if let Some(builder) = self.list.take()
            && let Some(raw) = builder.finish()
        {
            let list = self.build_list(raw);
            self.add_block(Block::List(list));
        }
    }

    fn flush_all(&mut self) {
        self.flush_paragraph();
        self.flush_list();
        self.after_blank = false;
    }

    fn build_list(&mut self, raw: RawList) -> List {
        let items = raw
            .items
            .into_iter()
            .map(|item| ListItem {
                content: self.convert(&item.text, item.line),
                sublists: item
                    .sublists
                    .into_iter()
                    .map(|sub| self.build_list(sub))
                    .collect(),
            })
            .collect();
        List {
            marker: raw.marker,
            items,
        }
    }

    fn finish(mut self) -> Result<ParsedDocument, ConvertError> {
        if let Some(code) = &self.code {
            return Err(StructuralError::UnclosedFence {
                location: code.location.clone(),
            }
            .into());
        }
        self.flush_all();

        while let Some(kind) = self.stack.last().map(|f| f.kind) {
            match kind {
                FrameKind::Document => break,
                FrameKind::Section(_) => self.close_section(),
                kind => {
                    let location = self
                        .stack
                        .last()
                        .map(|f| f.location.clone())
                        .unwrap_or_default();
                    return Err(ConvertError::unclosed(kind.name(), location));
                }
            }
        }

        let root = self.stack.pop().map(|f| f.blocks).unwrap_or_default();
        let introduction = build_introduction(root, self.location(1));
        let (id, title) = self.chapter_identity();

        Ok(ParsedDocument {
            document: Document {
                id,
                title,
                introduction,
                sections: self.sections,
            },
            registry: self.registry,
            diagnostics: self.diagnostics,
        })
    }

    /// Title precedence: configuration, front matter, `#` heading.
    fn chapter_identity(&mut self) -> (String, Vec<InlineSpan>) {
        let title_text = self
            .config
            .chapter_title
            .clone()
            .or_else(|| self.frontmatter.title.clone())
            .or_else(|| self.heading_title.clone());
        let title = match title_text.as_deref() {
            Some(text) => self.convert(text, 1),
            None => Vec::new(),
        };
        if self.fragment {
            return (String::new(), title);
        }

        let id = match self.chapter_id.take() {
            Some(id) => id,
            None => {
                let derived = derive_id(&plain_text(&title));
                let base = if derived.is_empty() { "chapter".to_string() } else { derived };
                let location = self.location(1);
                self.registry
                    .declare_unique(&base, DeclarationKind::Chapter, location)
            }
        };
        (id, title)
    }
}

/// Collects document-level content into a single introduction block.
fn build_introduction(blocks: Vec<Block>, location: SourceLocation) -> Option<SpecialBlock> {
    let mut introduction: Option<SpecialBlock> = None;
    let mut loose = Vec::new();

    for block in blocks {
        match block {
            Block::Special(mut special)
                if special.kind == SpecialKind::Introduction && introduction.is_none() =>
            {
                loose.append(&mut special.statement);
                special.statement = std::mem::take(&mut loose);
                introduction = Some(special);
            }
            other => match introduction.as_mut() {
                Some(intro) => intro.statement.push(other),
                None => loose.push(other),
            },
        }
    }

    if introduction.is_none() && !loose.is_empty() {
        introduction = Some(SpecialBlock {
            kind: SpecialKind::Introduction,
            id: None,
            title: None,
            statement: loose,
            solution: None,
            location,
        });
    }
    introduction
}

#[derive(Debug)]
struct RawList {
    marker: ListMarker,
    indent: usize,
    items: Vec<RawItem>,
}

#[derive(Debug)]
struct RawItem {
    text: String,
    line: usize,
    sublists: Vec<RawList>,
}

enum ListAction {
    Nest,
    Restart,
    Append,
}

/// Indentation stack of the list currently being read.
#[derive(Debug, Default)]
struct ListBuilder {
    levels: Vec<RawList>,
}

impl ListBuilder {
    /// Adds an item. Returns the finished top-level list when a marker of a
    /// different style ends it.
    fn push(&mut self, marker: ListMarker, indent: usize, text: String, line: usize) -> Option<RawList> {
        while self.levels.len() > 1 && self.levels.last().is_some_and(|l| indent < l.indent) {
            self.close_level();
        }

        let action = match self.levels.last() {
            None => ListAction::Nest,
            Some(level) if indent > level.indent => ListAction::Nest,
            Some(level) if level.marker != marker => ListAction::Restart,
            Some(_) => ListAction::Append,
        };

        let mut finished = None;
        match action {
            ListAction::Nest => {}
            ListAction::Restart if self.levels.len() == 1 => finished = self.levels.pop(),
            ListAction::Restart => self.close_level(),
            ListAction::Append => {}
        }
        if !matches!(action, ListAction::Append) {
            self.levels.push(RawList {
                marker,
                indent,
                items: Vec::new(),
            });
        }
        if let Some(level) = self.levels.last_mut() {
            level.items.push(RawItem {
                text,
                line,
                sublists: Vec::new(),
            });
        }
        finished
    }

    fn continue_item(&mut self, text: &str) {
        if let Some(item) = self.levels.last_mut().and_then(|l| l.items.last_mut()) {
            item.text.push('\n');
            item.text.push_str(text);
        }
    }

    fn close_level(&mut self) {
        let Some(level) = self.levels.pop() else {
            return;
        };
        match self.levels.last_mut().and_then(|p| p.items.last_mut()) {
            Some(parent) => match parent.sublists.last_mut() {
                Some(existing) if existing.marker == level.marker => {
                    existing.items.extend(level.items)
                }
                _ => parent.sublists.push(level),
            },
            None => self.levels.push(level),
        }
    }

    fn finish(mut self) -> Option<RawList> {
        while self.levels.len() > 1 {
            self.close_level();
        }
        self.levels.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Classification;
    use crate::inline::InlineSpan::*;

    fn parse(input: &str) -> Result<ParsedDocument, ConvertError> {
        parse_document(input, &ConvertConfig::default())
    }

    fn text(t: &str) -> InlineSpan {
        Text(t.to_string())
    }

    fn special(block: &Block) -> &SpecialBlock {
        match block {
            Block::Special(special) => special,
            other => panic!("expected special block, got {other:?}"),
        }
    }

    #[test]
    fn section_with_paragraph() {
        let parsed = parse("## Overview {#sec-a}\n\nSome *text* and $x^2$.\n").unwrap();
        let sections = &parsed.document.sections;
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].id, "sec-a");
        assert_eq!(sections[0].title, vec![text("Overview")]);
        assert_eq!(
            sections[0].children,
            vec![Block::Paragraph(vec![
                text("Some "),
                Emphasis(vec![text("text")]),
                text(" and "),
                MathInline("x^2".into()),
                text("."),
            ])]
        );
        assert!(!parsed.diagnostics.has_warnings());
    }

    #[test]
    fn chapter_title_and_subsections() {
        let input = "# Inference {#ch-inference}\n\n## Bootstrap\n\n### Resampling\n\nText.\n\n## Bootstrap\n";
        let parsed = parse(input).unwrap();
        let doc = &parsed.document;
        assert_eq!(doc.id, "ch-inference");
        assert_eq!(doc.title, vec![text("Inference")]);
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].id, "bootstrap");
        assert_eq!(doc.sections[1].id, "bootstrap-2");
        let Block::Section(sub) = &doc.sections[0].children[0] else {
            panic!("expected subsection");
        };
        assert_eq!(sub.level, SectionLevel::Subsection);
        assert_eq!(sub.id, "resampling");
        assert_eq!(sub.children, vec![Block::Paragraph(vec![text("Text.")])]);
    }

    #[test]
    fn frontmatter_title_and_derived_chapter_id() {
        let parsed = parse("---\ntitle: \"Hypothesis testing\"\n---\n\nIntro text.\n").unwrap();
        assert_eq!(parsed.document.id, "hypothesis-testing");
        assert_eq!(parsed.document.title, vec![text("Hypothesis testing")]);
        let intro = parsed.document.introduction.as_ref().unwrap();
        assert_eq!(intro.statement, vec![Block::Paragraph(vec![text("Intro text.")])]);
    }

    #[test]
    fn exercise_with_solution_div() {
        let input = "\
## Practice

::: {.guidedpractice}
What is $p$?

::: {.callout-note collapse=\"true\"}
## Solution
It is 0.5.
:::
:::
";
        let parsed = parse(input).unwrap();
        let block = special(&parsed.document.sections[0].children[0]);
        assert_eq!(block.kind, SpecialKind::Exercise);
        assert_eq!(block.id.as_deref(), Some("exercise-1"));
        assert_eq!(
            block.statement,
            vec![Block::Paragraph(vec![text("What is "), MathInline("p".into()), text("?")])]
        );
        assert_eq!(
            block.solution,
            Some(vec![Block::Paragraph(vec![text("It is 0.5.")])])
        );
        assert!(!parsed.diagnostics.has_warnings());
    }

    #[test]
    fn solution_heading_and_rule_markers() {
        let input = "\
::: {.workedexample #exm-coin}
### Fair coin?
Flip it.

### Answer
Yes.
:::

::: workedexample
Statement.

---

Solution text.
:::
";
        let parsed = parse(input).unwrap();
        let intro = parsed.document.introduction.unwrap();
        let first = special(&intro.statement[0]);
        assert_eq!(first.id.as_deref(), Some("exm-coin"));
        assert_eq!(first.title, Some(vec![text("Fair coin?")]));
        assert_eq!(first.solution, Some(vec![Block::Paragraph(vec![text("Yes.")])]));

        let second = special(&intro.statement[1]);
        assert_eq!(second.id.as_deref(), Some("example-1"));
        assert_eq!(second.statement, vec![Block::Paragraph(vec![text("Statement.")])]);
        assert_eq!(
            second.solution,
            Some(vec![Block::Paragraph(vec![text("Solution text.")])])
        );
    }

    #[test]
    fn empty_solution_is_dropped_with_warning() {
        let parsed = parse("::: {.guidedpractice}\nQuestion.\n\n## Solution\n:::\n").unwrap();
        let intro = parsed.document.introduction.unwrap();
        assert_eq!(special(&intro.statement[0]).solution, None);
        assert!(matches!(
            parsed.diagnostics.warnings.as_slice(),
            [ConvertWarning::EmptySolution { .. }]
        ));
    }

    #[test]
    fn unclosed_block_names_kind() {
        let err = parse("## A\n\n::: {.guidedpractice}\nNever closed.\n").unwrap_err();
        match err {
            ConvertError::Structural(StructuralError::UnclosedBlock { kind, location }) => {
                assert_eq!(kind, "exercise");
                assert_eq!(location.line, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stray_close_marker_is_fatal() {
        let err = parse("::: {.data}\nLoans.\n:::\n:::\n").unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Structural(StructuralError::UnmatchedClose { location }) if location.line == 4
        ));
    }

    #[test]
    fn unclosed_fence_is_fatal() {
        let err = parse("Text.\n\n```{r}\nx <- 1\n").unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Structural(StructuralError::UnclosedFence { location }) if location.line == 3
        ));
    }

    #[test]
    fn duplicate_explicit_ids_are_fatal() {
        let err = parse("## A {#sec-a}\n\n## B {#sec-a}\n").unwrap_err();
        assert!(matches!(err, ConvertError::DuplicateId { ref id, .. } if id == "sec-a"));
    }

    #[test]
    fn unknown_div_is_transparent() {
        let parsed = parse("## S\n\n::: {.callout-tip}\nInside.\n:::\n").unwrap();
        assert_eq!(
            parsed.document.sections[0].children,
            vec![Block::Paragraph(vec![text("Inside.")])]
        );
        assert!(matches!(
            parsed.diagnostics.warnings.as_slice(),
            [ConvertWarning::UnknownDivClass { class, .. }] if class == "callout-tip"
        ));
    }

    #[test]
    fn nested_lists_and_continuations() {
        let input = "- one\n  continued\n- two\n    a. alpha\n    b. beta\n- three\n\n1. first\n";
        let parsed = parse(input).unwrap();
        let blocks = &parsed.document.introduction.unwrap().statement;
        let Block::List(bullets) = &blocks[0] else {
            panic!("expected list");
        };
        assert_eq!(bullets.marker, ListMarker::Bullet);
        assert_eq!(bullets.items.len(), 3);
        assert_eq!(bullets.items[0].content, vec![text("one continued")]);
        let sub = &bullets.items[1].sublists[0];
        assert_eq!(sub.marker, ListMarker::LowerAlpha);
        assert_eq!(sub.items.len(), 2);
        let Block::List(numbers) = &blocks[1] else {
            panic!("expected second list");
        };
        assert!(numbers.ordered());
    }

    #[test]
    fn marker_change_at_nested_depth_starts_new_sublist() {
        let parsed = parse("- a\n  - x\n  1. y\n- b\n").unwrap();
        let blocks = &parsed.document.introduction.unwrap().statement;
        let [Block::List(outer)] = blocks.as_slice() else {
            panic!("expected one list, got {blocks:?}");
        };
        assert_eq!(outer.items.len(), 2);
        let markers: Vec<_> = outer.items[0].sublists.iter().map(|l| l.marker).collect();
        assert_eq!(markers, vec![ListMarker::Bullet, ListMarker::Decimal]);
        assert_eq!(outer.items[0].sublists[1].items[0].content, vec![text("y")]);
        assert!(outer.items[1].sublists.is_empty());
    }

    #[test]
    fn blank_lines_between_items_keep_one_list() {
        let input = "- a\n\n  still a\n\n- b\n\nAfter the list.\n";
        let parsed = parse(input).unwrap();
        let blocks = &parsed.document.introduction.unwrap().statement;
        let [Block::List(list), Block::Paragraph(after)] = blocks.as_slice() else {
            panic!("expected a list and a paragraph, got {blocks:?}");
        };
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].content, vec![text("a still a")]);
        assert_eq!(after, &vec![text("After the list.")]);
    }

    #[test]
    fn figure_chunk_declares_ids() {
        let input = "\
```{r}
#| label: fig-x
#| fig-cap: Two panels, see @sec-missing
#| fig-subcap:
#|   - Left
#|   - Right
#| layout-ncol: 2

plot(x)
```
";
        let mut parsed = parse(input).unwrap();
        for id in ["fig-x", "fig-x-1", "fig-x-2"] {
            assert!(parsed.registry.contains(id), "{id} not declared");
        }
        let intro = parsed.document.introduction.as_ref().unwrap();
        let Block::Code(code) = &intro.statement[0] else {
            panic!("expected code");
        };
        assert_eq!(code.source_lines, vec!["plot(x)"]);
        assert_eq!(code.language.as_deref(), Some("r"));
        assert_eq!(code.image_sources(), vec!["fig-x-1.png", "fig-x-2.png"]);

        parsed.resolve_references(&ConvertConfig::default());
        assert_eq!(parsed.diagnostics.unresolved_references().count(), 1);
    }

    #[test]
    fn malformed_chunk_degrades_to_listing() {
        let parsed = parse("```{r}\n#| label: fig-x\n#| fig-cap: [oops\nplot(x)\n```\n").unwrap();
        let intro = parsed.document.introduction.unwrap();
        let Block::Code(code) = &intro.statement[0] else {
            panic!("expected code");
        };
        assert_eq!(code.classification, Classification::Listing { id: None });
        assert!(matches!(
            parsed.diagnostics.warnings.as_slice(),
            [ConvertWarning::MalformedChunkMetadata { .. }]
        ));
    }

    #[test]
    fn excluded_chunk_is_dropped() {
        let parsed = parse("```{r}\n#| include: false\nlibrary(x)\n```\n").unwrap();
        assert!(parsed.document.introduction.is_none());
    }

    #[test]
    fn skipped_lines_do_not_break_paragraphs() {
        let parsed = parse("First line\n\\vspace{2mm}\nsecond line.\n").unwrap();
        let intro = parsed.document.introduction.unwrap();
        assert_eq!(
            intro.statement,
            vec![Block::Paragraph(vec![text("First line second line.")])]
        );
    }

    #[test]
    fn locations_carry_file_name() {
        let config = ConvertConfig::default();
        let err = BlockParser::new(&config)
            .with_file("ch05.qmd")
            .parse("---\ntitle: T\n---\n:::\n")
            .unwrap_err();
        assert!(err.to_string().contains("ch05.qmd:4:1"), "{err}");
    }
}
