//! End-of-chapter exercises.
//!
//! Exercises are written in their own file as a numbered list: each item
//! opens an exercise, an optional leading bold phrase is its title, and the
//! blocks that follow (sub-part lists, code, figures) belong to it until the
//! next item. The grouped exercises are merged into the chapter's exercises
//! section, and the exercise file's identifiers into the chapter registry.

use qmdptx_core::{
    Block, ConvertError, DeclarationKind, Document, IdRegistry, InlineSpan, List, ParsedDocument,
    Section, SectionLevel, SourceLocation, SpecialBlock, SpecialKind, derive_id,
};

/// Regroups a parsed exercise document into exercise blocks.
///
/// Generated ids (`exr-1`, `exr-2`, ...) are declared in `registry`.
pub fn group_exercises(document: Document, registry: &mut IdRegistry) -> Vec<Block> {
    let mut flat = Vec::new();
    if let Some(introduction) = document.introduction {
        flat.extend(introduction.statement);
    }
    for section in document.sections {
        flatten_section(section, &mut flat);
    }

    let mut grouper = Grouper {
        registry,
        out: Vec::new(),
        current: None,
        count: 0,
    };
    for block in flat {
        grouper.block(block);
    }
    grouper.finish()
}

fn flatten_section(section: Section, out: &mut Vec<Block>) {
    for child in section.children {
        match child {
            Block::Section(sub) => flatten_section(sub, out),
            other => out.push(other),
        }
    }
}

struct Grouper<'r> {
    registry: &'r mut IdRegistry,
    out: Vec<Block>,
    current: Option<SpecialBlock>,
    count: usize,
}

impl Grouper<'_> {
    fn block(&mut self, block: Block) {
        match block {
            Block::List(list) if list.ordered() => self.numbered_list(list),
            Block::Special(special) if special.kind == SpecialKind::Exercise => {
                self.close_current();
                self.out.push(Block::Special(special));
            }
            other => match self.current.as_mut() {
                Some(exercise) => exercise.statement.push(other),
                None => self.out.push(other),
            },
        }
    }

    fn numbered_list(&mut self, list: List) {
        for item in list.items {
            self.close_current();
            self.count += 1;
            let location = SourceLocation::default();
            let id = self.registry.declare_unique(
                &format!("exr-{}", self.count),
                DeclarationKind::Exercise,
                location.clone(),
            );

            let (title, content) = split_title(item.content);
            let mut statement = Vec::new();
            if !content.is_empty() {
                statement.push(Block::Paragraph(content));
            }
            statement.extend(item.sublists.into_iter().map(Block::List));

            self.current = Some(SpecialBlock {
                kind: SpecialKind::Exercise,
                id: Some(id),
                title,
                statement,
                solution: None,
                location,
            });
        }
    }

    fn close_current(&mut self) {
        if let Some(exercise) = self.current.take() {
            self.out.push(Block::Special(exercise));
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.close_current();
        self.out
    }
}

/// Splits a leading `**Title.**` off an item's content.
fn split_title(mut content: Vec<InlineSpan>) -> (Option<Vec<InlineSpan>>, Vec<InlineSpan>) {
    let Some(InlineSpan::Strong(_)) = content.first() else {
        return (None, content);
    };
    let InlineSpan::Strong(mut title) = content.remove(0) else {
        return (None, content);
    };

    if let Some(InlineSpan::Text(last)) = title.last_mut() {
        let trimmed = last.trim_end().trim_end_matches('.').trim_end().to_string();
        *last = trimmed;
        if last.is_empty() {
            title.pop();
        }
    }

    if let Some(InlineSpan::Text(first)) = content.first_mut() {
        let trimmed = first.trim_start().to_string();
        *first = trimmed;
        if first.is_empty() {
            content.remove(0);
        }
    }
    (Some(title), content)
}

/// Adds exercise blocks to the chapter's exercises section, creating it if needed.
///
/// The exercise registry is merged into `registry` first; any identifier
/// declared in both documents is a [`ConvertError::DuplicateId`].
pub fn merge_exercises(
    main: &mut ParsedDocument,
    exercises: Vec<Block>,
    exercise_registry: IdRegistry,
    exercises_title: &str,
) -> Result<(), ConvertError> {
    main.registry.absorb(exercise_registry)?;

    if let Some(section) = main.document.exercises_section_mut() {
        section.children.extend(exercises);
        return Ok(());
    }

    let derived = derive_id(exercises_title);
    let base = if derived.is_empty() { "exercises".to_string() } else { derived };
    let base = if main.document.id.is_empty() {
        base
    } else {
        format!("{}-{}", main.document.id, base)
    };
    let location = SourceLocation::default();
    let id = main
        .registry
        .declare_unique(&base, DeclarationKind::Section, location.clone());
    main.document.sections.push(Section {
        level: SectionLevel::Section,
        id,
        title: vec![InlineSpan::Text(exercises_title.to_string())],
        exercises: true,
        children: exercises,
        location,
    });
    Ok(())
}
