//! The resolved in-memory model
//!
//! The `Model` exclusively owns every registry; all other entities are owned
//! by exactly one registry and referenced from elsewhere by name (or a
//! (domain, name) pair for concepts). Entities are created during load,
//! mutated only by the resolvers, and frozen thereafter; projection reads
//! but never mutates.

pub mod column;
pub mod concept;

pub use column::{Column, ColumnRef, ColumnSet, ColumnType, DefaultValue, Restriction, Usage};
pub use concept::{Arity, Concept, ConceptDomain, ConceptType, ConceptTypeParent, RelatedConcept};

use std::collections::HashMap;
use std::time::SystemTime;

use crate::cv::CvEntry;
use crate::digest::DigestSet;
use crate::error::{ModelError, Result};
use crate::pattern::{FilenamePattern, PatternMatch};
use crate::types::{PatternRegistry, TypeTable};

/// One annotation value: plain text or a sequence of text/markup fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue {
    Text(String),
    Fragments(Vec<Fragment>),
}

impl AnnotationValue {
    /// Flatten to plain text, markup tags stripped
    pub fn as_text(&self) -> String {
        match self {
            AnnotationValue::Text(t) => t.clone(),
            AnnotationValue::Fragments(parts) => parts
                .iter()
                .map(|f| match f {
                    Fragment::Text(t) => t.as_str(),
                    Fragment::Markup { text, .. } => text.as_str(),
                })
                .collect(),
        }
    }
}

/// A fragment of a mixed-content annotation value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Markup { tag: String, text: String },
}

/// Ordered mapping from annotation name to value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationSet {
    entries: Vec<(String, AnnotationValue)>,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: AnnotationValue) {
        self.entries.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&AnnotationValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnnotationValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One index over a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub unique: bool,
    /// (column name, direction) pairs; +1 ascending, -1 descending
    pub keys: Vec<(String, i8)>,
}

/// A named destination within the target backend
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub name: String,
    pub path: String,
    pub indices: Vec<Index>,
}

/// A named, reusable column-set usable as a column's type
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundType {
    pub name: String,
    pub columns: ColumnSet,
}

/// Generic name-keyed registry preserving declaration order
#[derive(Debug, Clone)]
pub struct Registry<T> {
    kind: &'static str,
    order: Vec<String>,
    items: HashMap<String, T>,
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            order: Vec::new(),
            items: HashMap::new(),
        }
    }

    /// Register an item; names are unique within the registry
    pub fn insert(&mut self, name: impl Into<String>, item: T) -> Result<()> {
        let name = name.into();
        if self.items.contains_key(&name) {
            return Err(ModelError::DuplicateName {
                kind: self.kind,
                name,
            });
        }
        self.order.push(name.clone());
        self.items.insert(name, item);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.items.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// (name, item) pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.order
            .iter()
            .filter_map(|n| self.items.get(n).map(|i| (n.as_str(), i)))
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<T: PartialEq> PartialEq for Registry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order && self.items == other.items
    }
}

/// Registry counts, for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStats {
    pub collections: usize,
    pub patterns: usize,
    pub cvs: usize,
    pub compound_types: usize,
    pub concept_types: usize,
    pub domains: usize,
    pub concepts: usize,
    pub filename_patterns: usize,
}

/// The fully linked, invariant-checked, content-addressed model
pub struct Model {
    pub project: String,
    pub schema_ver: String,
    pub annotations: AnnotationSet,
    pub description: Option<String>,
    /// Path of the collection receiving the serialized model, if any
    pub metadata_collection: Option<String>,
    /// Id of the CV bound to the null-value slot
    pub null_cv: String,
    pub collections: Registry<Collection>,
    pub patterns: PatternRegistry,
    pub cvs: Registry<CvEntry>,
    pub compound_types: Registry<CompoundType>,
    pub concept_types: Registry<ConceptType>,
    pub domains: Registry<ConceptDomain>,
    pub filename_patterns: Registry<FilenamePattern>,
    /// Content digests computed during load
    pub digests: DigestSet,
    /// Raw bytes of the meta-schema the model was validated against
    pub schema_bytes: Vec<u8>,
    /// Modification time of the source model document, when known
    pub source_mtime: Option<SystemTime>,
    /// The immutable primitive-type table
    pub type_table: TypeTable,
}

impl Model {
    /// Look up a concept domain by name
    pub fn concept_domain(&self, name: &str) -> Option<&ConceptDomain> {
        self.domains.get(name)
    }

    /// Look up a concept by (domain, name)
    pub fn concept(&self, domain: &str, name: &str) -> Option<&Concept> {
        self.domains.get(domain).and_then(|d| d.get(name))
    }

    /// Whether `value` is one of the null-CV's term keys
    pub fn is_valid_null(&self, value: &str) -> bool {
        match self.cvs.get(&self.null_cv) {
            Some(entry) => entry.contains_key(value, &self.cvs),
            None => false,
        }
    }

    /// Validate a key against a CV; `CvUnresolved` for URI-only CVs
    pub fn cv_validate(&self, cv_id: &str, key: &str) -> Result<bool> {
        let entry = self
            .cvs
            .get(cv_id)
            .ok_or_else(|| ModelError::UnknownReference {
                kind: "CV",
                name: cv_id.to_string(),
                referrer: "cv_validate".to_string(),
            })?;
        entry.validate(key, &self.cvs)
    }

    /// The collection a concept's records land in: its own link, the first
    /// based-on concept type carrying one, or the `extends` chain's
    pub fn effective_collection<'a>(&'a self, concept: &'a Concept) -> Option<&'a str> {
        if let Some(collection) = &concept.collection {
            return Some(collection.as_str());
        }
        for type_name in &concept.based_on {
            if let Some(collection) = self
                .concept_types
                .get(type_name)
                .and_then(|ct| ct.collection.as_deref())
            {
                return Some(collection);
            }
        }
        if let Some(parent_name) = &concept.extends {
            if let Some(parent) = self.concept(&concept.domain, parent_name) {
                return self.effective_collection(parent);
            }
        }
        None
    }

    /// All filename-pattern matches for a file, in declaration order
    pub fn match_concept(&self, filename: &str) -> Vec<PatternMatch> {
        let basename = filename.rsplit('/').next().unwrap_or(filename);
        let mut matches = Vec::new();
        for (_, pattern) in self.filename_patterns.iter() {
            if let Some(m) = pattern.match_basename(basename, &self.type_table) {
                matches.push(m);
            }
        }
        matches
    }

    /// Registry counts
    pub fn stats(&self) -> ModelStats {
        ModelStats {
            collections: self.collections.len(),
            patterns: self.patterns.len(),
            cvs: self.cvs.len(),
            compound_types: self.compound_types.len(),
            concept_types: self.concept_types.len(),
            domains: self.domains.len(),
            concepts: self
                .domains
                .iter()
                .map(|(_, d)| d.len())
                .sum(),
            filename_patterns: self.filename_patterns.len(),
        }
    }
}

impl PartialEq for Model {
    /// Structural equality on all registries, including declaration order.
    /// Digests, retained schema bytes and the type table are incidental to
    /// the structure and excluded.
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project
            && self.schema_ver == other.schema_ver
            && self.annotations == other.annotations
            && self.description == other.description
            && self.metadata_collection == other.metadata_collection
            && self.null_cv == other.null_cv
            && self.collections == other.collections
            && self.patterns == other.patterns
            && self.cvs == other.cvs
            && self.compound_types == other.compound_types
            && self.concept_types == other.concept_types
            && self.domains == other.domains
            && self.filename_patterns == other.filename_patterns
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("project", &self.project)
            .field("schema_ver", &self.schema_ver)
            .field("stats", &self.stats())
            .field("digests", &self.digests)
            .finish()
    }
}
