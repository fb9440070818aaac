//! Concepts, concept domains, concept types and related-concept edges

use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::model::column::ColumnSet;
use crate::model::AnnotationSet;

/// Cardinality of a related-concept reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    One,
    ZeroOrOne,
    OneToMany,
    ZeroToMany,
}

impl Arity {
    pub fn tag(&self) -> &'static str {
        match self {
            Arity::One => "1",
            Arity::ZeroOrOne => "0..1",
            Arity::OneToMany => "1..N",
            Arity::ZeroToMany => "0..N",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "1" => Some(Arity::One),
            "0..1" => Some(Arity::ZeroOrOne),
            "1..N" => Some(Arity::OneToMany),
            "0..N" => Some(Arity::ZeroToMany),
            _ => None,
        }
    }
}

/// A directed reference from one concept to another
///
/// `resolved` and `fk_columns` are populated by the foreign-key propagation
/// pass; before it runs they are empty.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedConcept {
    /// Target domain; None means the owning concept's domain
    pub domain: Option<String>,
    /// Target concept name within that domain
    pub concept: String,
    /// Prefix applied to the injected foreign-key columns
    pub key_prefix: String,
    pub arity: Arity,
    /// (domain, concept) of the resolved target
    pub resolved: Option<(String, String)>,
    /// Names of the FK columns injected on the source concept
    pub fk_columns: Vec<String>,
}

/// A reusable, possibly abstract column template
///
/// Anonymous (unnamed) concept types exist only as inline parents inside a
/// declaration chain; they contribute columns during merging but are not
/// installed in the name registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptType {
    pub name: Option<String>,
    pub parent: Option<ConceptTypeParent>,
    pub collection: Option<String>,
    /// Columns declared on this chain member only
    pub declared: ColumnSet,
    /// Root-to-leaf merged columns, filled by the resolver
    pub merged: ColumnSet,
}

/// Parent link of a concept type
#[derive(Debug, Clone, PartialEq)]
pub enum ConceptTypeParent {
    /// A previously declared, named concept type
    Named(String),
    /// An anonymous abstract mixin nested in the declaration
    Anonymous(Box<ConceptType>),
}

impl ConceptType {
    /// Display name for error reporting
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}

/// An entity type with a column set
#[derive(Debug, Clone, PartialEq)]
pub struct Concept {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub annotations: AnnotationSet,
    /// Owning domain name
    pub domain: String,
    /// Concept types this concept is based on, in declaration order
    pub based_on: Vec<String>,
    /// In-domain inheritance parent
    pub extends: Option<String>,
    /// In-domain weak-entity identifier concept
    pub identified_by: Option<String>,
    /// Prefix for the borrowed identifier columns
    pub id_prefix: Option<String>,
    pub collection: Option<String>,
    /// Columns declared locally on this concept
    pub declared: ColumnSet,
    /// Fully merged column set, filled by the resolver
    pub columns: ColumnSet,
    pub related: Vec<RelatedConcept>,
}

impl Concept {
    /// Qualified `domain.name` identifier
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.domain, self.name)
    }
}

/// A named grouping of concepts sharing a subject area
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptDomain {
    pub name: String,
    pub full_name: String,
    pub is_abstract: bool,
    pub description: Option<String>,
    pub annotations: AnnotationSet,
    order: Vec<String>,
    concepts: HashMap<String, Concept>,
}

impl ConceptDomain {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            is_abstract: false,
            description: None,
            annotations: AnnotationSet::new(),
            order: Vec::new(),
            concepts: HashMap::new(),
        }
    }

    pub fn insert(&mut self, concept: Concept) -> Result<()> {
        if self.concepts.contains_key(&concept.name) {
            return Err(ModelError::DuplicateName {
                kind: "concept",
                name: format!("{}.{}", self.name, concept.name),
            });
        }
        self.order.push(concept.name.clone());
        self.concepts.insert(concept.name.clone(), concept);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Concept> {
        self.concepts.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Concept> {
        self.concepts.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.concepts.contains_key(name)
    }

    /// Concepts in declaration order
    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.order.iter().filter_map(|n| self.concepts.get(n))
    }

    /// Concept names in declaration order
    pub fn concept_names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
