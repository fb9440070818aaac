//! Primitive types and named patterns
//!
//! The primitive set is statically known; each type carries a syntactic
//! predicate (regex-based or always-true) used during record validation and
//! filename-pattern capture checking. The table is immutable after
//! construction and shared by read-only reference.

use regex::Regex;
use std::collections::HashMap;

use crate::error::{ModelError, Result};

/// Built-in primitive type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    String,
    Text,
    Integer,
    Decimal,
    Boolean,
    Timestamp,
    Duration,
    Compound,
}

impl Primitive {
    /// All primitives, in declaration order
    pub const ALL: [Primitive; 8] = [
        Primitive::String,
        Primitive::Text,
        Primitive::Integer,
        Primitive::Decimal,
        Primitive::Boolean,
        Primitive::Timestamp,
        Primitive::Duration,
        Primitive::Compound,
    ];

    /// The tag used in model documents
    pub fn tag(&self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Text => "text",
            Primitive::Integer => "integer",
            Primitive::Decimal => "decimal",
            Primitive::Boolean => "boolean",
            Primitive::Timestamp => "timestamp",
            Primitive::Duration => "duration",
            Primitive::Compound => "compound",
        }
    }

    /// Parse a model-document tag
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.tag() == tag)
    }

    /// Native type name in a document-store projection
    pub fn document_type(&self) -> &'static str {
        match self {
            Primitive::String | Primitive::Text => "string",
            Primitive::Integer => "int64",
            Primitive::Decimal => "float64",
            Primitive::Boolean => "bool",
            Primitive::Timestamp => "date",
            Primitive::Duration => "string",
            Primitive::Compound => "document",
        }
    }

    /// Field type in a search-index projection
    pub fn search_type(&self) -> &'static str {
        match self {
            Primitive::String => "keyword",
            Primitive::Text => "text",
            Primitive::Integer => "long",
            Primitive::Decimal => "double",
            Primitive::Boolean => "boolean",
            Primitive::Timestamp => "date",
            Primitive::Duration => "keyword",
            Primitive::Compound => "nested",
        }
    }

    /// Regex sub-pattern used for typed filename captures
    pub fn capture_subpattern(&self) -> &'static str {
        match self {
            Primitive::Integer => r"[+-]?[0-9]+",
            Primitive::Decimal => r"[+-]?[0-9]+(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?",
            Primitive::Boolean => r"(?:true|false|0|1)",
            Primitive::Timestamp => r"[0-9][0-9TZ:+.-]*",
            _ => r".+?",
        }
    }
}

/// The immutable primitive-type table
///
/// Constructed once (regexes compiled in the constructor) and then only
/// read. `is_valid` is syntactic: it accepts any value for the pattern-free
/// types and checks the compiled predicate for the rest.
pub struct TypeTable {
    checks: HashMap<Primitive, Regex>,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut checks = HashMap::new();
        let patterns: [(Primitive, &str); 5] = [
            (Primitive::Integer, r"^[+-]?[0-9]+$"),
            (
                Primitive::Decimal,
                r"^[+-]?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?$",
            ),
            (Primitive::Boolean, r"^(true|false|0|1)$"),
            // ISO-8601 timestamp, date-only form allowed
            (
                Primitive::Timestamp,
                r"^[0-9]{4}-[0-9]{2}-[0-9]{2}([T ][0-9]{2}:[0-9]{2}(:[0-9]{2}(\.[0-9]+)?)?(Z|[+-][0-9]{2}:?[0-9]{2})?)?$",
            ),
            // ISO-8601 duration
            (
                Primitive::Duration,
                r"^-?P([0-9]+Y)?([0-9]+M)?([0-9]+W)?([0-9]+D)?(T([0-9]+H)?([0-9]+M)?([0-9]+(\.[0-9]+)?S)?)?$",
            ),
        ];
        for (primitive, pattern) in patterns {
            // the patterns are static and known-good
            checks.insert(primitive, Regex::new(pattern).unwrap());
        }
        Self { checks }
    }

    /// Syntactic validity of `value` for `primitive`
    pub fn is_valid(&self, primitive: Primitive, value: &str) -> bool {
        match self.checks.get(&primitive) {
            Some(re) => re.is_match(value),
            None => true,
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Named patterns declared in the model document, compiled once at load
pub struct PatternRegistry {
    order: Vec<String>,
    patterns: HashMap<String, Regex>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            patterns: HashMap::new(),
        }
    }

    /// Compile and register a pattern
    pub fn insert(&mut self, name: &str, pattern: &str) -> Result<()> {
        if self.patterns.contains_key(name) {
            return Err(ModelError::DuplicateName {
                kind: "pattern",
                name: name.to_string(),
            });
        }
        let regex = Regex::new(pattern).map_err(|e| ModelError::PatternInvalid {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        self.order.push(name.to_string());
        self.patterns.insert(name.to_string(), regex);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Regex> {
        self.patterns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    /// Pattern names in declaration order
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

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PatternRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
            && self.order.iter().all(|name| {
                match (self.patterns.get(name), other.patterns.get(name)) {
                    (Some(a), Some(b)) => a.as_str() == b.as_str(),
                    _ => false,
                }
            })
    }
}

impl std::fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternRegistry")
            .field("names", &self.order)
            .finish()
    }
}
