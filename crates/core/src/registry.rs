//! Identifier declarations and the references that point at them.
//!
//! Declarations are checked eagerly, so a duplicate fails the conversion at
//! the point it is seen. References are only recorded while parsing and are
//! resolved once the whole document (and any merged exercise document) is
//! known, which keeps forward references legal.

use std::collections::HashMap;

use crate::config::ConvertConfig;
use crate::error::{ConvertError, ConvertWarning, ReferenceKind, SourceLocation};

/// What kind of element declared an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    /// The document root.
    Chapter,
    /// Heading-1 or heading-2 section.
    Section,
    /// Exercise or worked example.
    Exercise,
    /// Other special block with an explicit id.
    Block,
    /// Figure, or one panel of a multi-panel figure.
    Figure,
    /// Table.
    Table,
    /// Labelled listing.
    Listing,
}

/// A declared identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Declaring element kind.
    pub kind: DeclarationKind,
    /// Where it was declared.
    pub location: SourceLocation,
}

/// A recorded reference awaiting resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Referenced id or citation key.
    pub target: String,
    /// Cross-reference or citation.
    pub kind: ReferenceKind,
    /// Where the reference appeared.
    pub location: SourceLocation,
}

/// Registry of declared identifiers and pending references.
#[derive(Debug, Default)]
pub struct IdRegistry {
    declarations: HashMap<String, Declaration>,
    order: Vec<String>,
    references: Vec<Reference>,
    /// Ids owned by the document this registry will be merged into.
    reserved: HashMap<String, SourceLocation>,
}

impl IdRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that treats every id of `target` as taken.
    ///
    /// Used for a document that will later be [absorbed](Self::absorb) into
    /// `target`: its derived ids step around the reserved ones, and an
    /// explicit id that repeats one of them fails immediately.
    pub fn reserving(target: &IdRegistry) -> Self {
        let mut reserved: HashMap<String, SourceLocation> = target.reserved.clone();
        for (id, declaration) in &target.declarations {
            reserved.insert(id.clone(), declaration.location.clone());
        }
        Self {
            reserved,
            ..Self::default()
        }
    }

    /// Declares `id`, failing if it is already taken.
    pub fn declare(
        &mut self,
        id: &str,
        kind: DeclarationKind,
        location: SourceLocation,
    ) -> Result<(), ConvertError> {
        let first = self
            .declarations
            .get(id)
            .map(|existing| &existing.location)
            .or_else(|| self.reserved.get(id));
        if let Some(first) = first {
            return Err(ConvertError::DuplicateId {
                id: id.to_string(),
                first: first.clone(),
                second: location,
            });
        }
        log::trace!("declared {} ({:?}) at {}", id, kind, location);
        self.declarations
            .insert(id.to_string(), Declaration { kind, location });
        self.order.push(id.to_string());
        Ok(())
    }

    /// Returns `base`, or `base-2`, `base-3`, ... if it is already declared.
    pub fn unique_id(&self, base: &str) -> String {
        if !self.is_taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !self.is_taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Declares a derived identifier, suffixing it if needed. Never fails.
    pub fn declare_unique(
        &mut self,
        base: &str,
        kind: DeclarationKind,
        location: SourceLocation,
    ) -> String {
        let id = self.unique_id(base);
        if id != base {
            log::debug!("derived id {} already taken, using {}", base, id);
        }
        self.declarations
            .insert(id.clone(), Declaration { kind, location });
        self.order.push(id.clone());
        id
    }

    /// Check if an identifier has been declared.
    pub fn contains(&self, id: &str) -> bool {
        self.declarations.contains_key(id)
    }

    fn is_taken(&self, id: &str) -> bool {
        self.declarations.contains_key(id) || self.reserved.contains_key(id)
    }

    /// Get the declaration of an identifier.
    pub fn get(&self, id: &str) -> Option<&Declaration> {
        self.declarations.get(id)
    }

    /// Declared identifiers in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of declared identifiers.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if nothing has been declared.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Records a reference for later resolution.
    pub fn reference(&mut self, target: &str, kind: ReferenceKind, location: SourceLocation) {
        self.references.push(Reference {
            target: target.to_string(),
            kind,
            location,
        });
    }

    /// References recorded so far, in source order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Moves every declaration and reference of `other` into this registry.
    ///
    /// A declaration present in both is a [`ConvertError::DuplicateId`].
    /// Build `other` with [`IdRegistry::reserving`] so that only explicit
    /// ids can collide.
    pub fn absorb(&mut self, other: IdRegistry) -> Result<(), ConvertError> {
        let IdRegistry {
            mut declarations,
            order,
            references,
            ..
        } = other;
        for id in order {
            if let Some(declaration) = declarations.remove(&id) {
                self.declare(&id, declaration.kind, declaration.location)?;
            }
        }
        self.references.extend(references);
        Ok(())
    }

    /// Resolves every recorded reference, one warning per unresolved one.
    ///
    /// Cross-references must name a declared id. Citations are checked only
    /// when `config` lists the known bibliography keys.
    pub fn resolve(&self, config: &ConvertConfig) -> Vec<ConvertWarning> {
        self.references
            .iter()
            .filter(|r| match r.kind {
                ReferenceKind::CrossReference => !self.contains(&r.target),
                ReferenceKind::Citation => {
                    !config.known_citations.is_empty() && !config.is_known_citation(&r.target)
                }
            })
            .map(|r| ConvertWarning::UnresolvedReference {
                target: r.target.clone(),
                kind: r.kind,
                location: r.location.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_declaration_reports_both_locations() {
        let mut registry = IdRegistry::new();
        registry
            .declare("sec-a", DeclarationKind::Section, SourceLocation::line(3))
            .unwrap();
        let err = registry
            .declare("sec-a", DeclarationKind::Section, SourceLocation::line(9))
            .unwrap_err();
        match err {
            ConvertError::DuplicateId { id, first, second } => {
                assert_eq!(id, "sec-a");
                assert_eq!(first.line, 3);
                assert_eq!(second.line, 9);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn derived_ids_get_numeric_suffixes() {
        let mut registry = IdRegistry::new();
        let loc = SourceLocation::line(1);
        assert_eq!(registry.declare_unique("overview", DeclarationKind::Section, loc.clone()), "overview");
        assert_eq!(registry.declare_unique("overview", DeclarationKind::Section, loc.clone()), "overview-2");
        assert_eq!(registry.declare_unique("overview", DeclarationKind::Section, loc), "overview-3");
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["overview", "overview-2", "overview-3"]);
    }

    #[test]
    fn forward_references_resolve() {
        let mut registry = IdRegistry::new();
        registry.reference("fig-x", ReferenceKind::CrossReference, SourceLocation::line(1));
        registry
            .declare("fig-x", DeclarationKind::Figure, SourceLocation::line(5))
            .unwrap();
        assert!(registry.resolve(&ConvertConfig::default()).is_empty());
    }

    #[test]
    fn each_unresolved_reference_warns_once() {
        let mut registry = IdRegistry::new();
        registry.reference("sec-missing", ReferenceKind::CrossReference, SourceLocation::line(2));
        registry.reference("smith2020", ReferenceKind::Citation, SourceLocation::line(4));

        let warnings = registry.resolve(&ConvertConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            &warnings[0],
            ConvertWarning::UnresolvedReference { target, .. } if target == "sec-missing"
        ));

        let config = ConvertConfig {
            known_citations: vec!["efron1993".into()],
            ..ConvertConfig::default()
        };
        assert_eq!(registry.resolve(&config).len(), 2);
    }

    #[test]
    fn absorb_merges_and_detects_collisions() {
        let mut main = IdRegistry::new();
        main.declare("sec-a", DeclarationKind::Section, SourceLocation::line(1))
            .unwrap();

        let mut exercises = IdRegistry::new();
        exercises
            .declare("exr-1", DeclarationKind::Exercise, SourceLocation::line(2))
            .unwrap();
        exercises.reference("sec-a", ReferenceKind::CrossReference, SourceLocation::line(3));
        main.absorb(exercises).unwrap();
        assert!(main.contains("exr-1"));
        assert!(main.resolve(&ConvertConfig::default()).is_empty());

        let mut clash = IdRegistry::new();
        clash
            .declare("sec-a", DeclarationKind::Section, SourceLocation::line(7))
            .unwrap();
        assert!(matches!(
            main.absorb(clash),
            Err(ConvertError::DuplicateId { id, .. }) if id == "sec-a"
        ));
    }

    #[test]
    fn reserving_registry_steps_around_target_ids() {
        let mut main = IdRegistry::new();
        let id = main.declare_unique("exercise-1", DeclarationKind::Exercise, SourceLocation::line(5));
        assert_eq!(id, "exercise-1");
        main.declare("sec-a", DeclarationKind::Section, SourceLocation::line(1))
            .unwrap();

        let mut fragment = IdRegistry::reserving(&main);
        let derived =
            fragment.declare_unique("exercise-1", DeclarationKind::Exercise, SourceLocation::line(3));
        assert_eq!(derived, "exercise-1-2");
        assert!(!fragment.contains("exercise-1"));

        let err = fragment
            .declare("sec-a", DeclarationKind::Section, SourceLocation::line(8))
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::DuplicateId { ref id, ref first, .. } if id == "sec-a" && first.line == 1
        ));

        main.absorb(fragment).unwrap();
        assert!(main.contains("exercise-1"));
        assert!(main.contains("exercise-1-2"));
    }
}
