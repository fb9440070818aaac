//! Columns, column types and insertion-ordered column sets

use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::model::AnnotationSet;
use crate::types::Primitive;

/// How a column participates in a concept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// Identifier column; the identifier subset of a column-set
    IdRef,
    Required,
    Desirable,
    Optional,
}

impl Usage {
    pub fn tag(&self) -> &'static str {
        match self {
            Usage::IdRef => "idref",
            Usage::Required => "required",
            Usage::Desirable => "desirable",
            Usage::Optional => "optional",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "idref" => Some(Usage::IdRef),
            "required" => Some(Usage::Required),
            "desirable" => Some(Usage::Desirable),
            "optional" => Some(Usage::Optional),
            _ => None,
        }
    }

    /// Position on the widening chain required -> desirable -> optional;
    /// idref sits outside the chain.
    fn widening_rank(&self) -> Option<u8> {
        match self {
            Usage::IdRef => None,
            Usage::Required => Some(0),
            Usage::Desirable => Some(1),
            Usage::Optional => Some(2),
        }
    }

    /// Whether an override may change usage `from` into `to`
    pub fn widens_to(from: Usage, to: Usage) -> bool {
        if from == to {
            return true;
        }
        match (from.widening_rank(), to.widening_rank()) {
            (Some(a), Some(b)) => b >= a,
            _ => false,
        }
    }
}

/// Column default: a literal value or a reference to a sibling column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Literal(String),
    Column(String),
}

/// Value restriction: at most one per column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restriction {
    /// Named pattern registered on the model
    Pattern(String),
    /// Controlled vocabulary, by CV id
    Cv(String),
    /// Named compound type
    Compound(String),
}

/// The type of a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub primitive: Primitive,
    pub usage: Usage,
    pub default: Option<DefaultValue>,
    pub restriction: Option<Restriction>,
    /// Array-separator ladder: one single-character separator per dimension,
    /// outermost first. Empty means scalar.
    pub separators: Vec<char>,
}

impl ColumnType {
    pub fn new(primitive: Primitive, usage: Usage) -> Self {
        Self {
            primitive,
            usage,
            default: None,
            restriction: None,
            separators: Vec::new(),
        }
    }

    /// Array dimensionality (0 = scalar)
    pub fn array_depth(&self) -> usize {
        self.separators.len()
    }

    pub fn is_array(&self) -> bool {
        !self.separators.is_empty()
    }

    /// Whether `other` may override a column of this type: same primitive,
    /// usage change only along the widening chain.
    pub fn compatible_override(&self, other: &ColumnType) -> bool {
        self.primitive == other.primitive && Usage::widens_to(self.usage, other.usage)
    }
}

/// Back-reference to the concept column an injected column was copied from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub domain: String,
    pub concept: String,
    pub column: String,
}

/// A single column of a concept, compound type or concept type
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub description: Option<String>,
    pub annotations: AnnotationSet,
    pub ctype: ColumnType,
    /// Populated for columns injected by identification or FK propagation
    pub refers_to: Option<ColumnRef>,
}

impl Column {
    pub fn new(name: impl Into<String>, ctype: ColumnType) -> Self {
        Self {
            name: name.into(),
            description: None,
            annotations: AnnotationSet::new(),
            ctype,
            refers_to: None,
        }
    }
}

/// Insertion-ordered mapping from column name to column
///
/// Iteration order is declaration/merge order; the identifier subset is the
/// sub-ordering of columns whose usage is `idref`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSet {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; duplicate names are an error
    pub fn insert(&mut self, column: Column) -> Result<()> {
        if self.index.contains_key(&column.name) {
            return Err(ModelError::DuplicateName {
                kind: "column",
                name: column.name.clone(),
            });
        }
        self.index.insert(column.name.clone(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    /// Merge a column in, allowing a compatible override of an existing
    /// column at its original position. `owner` names the concept for error
    /// reporting.
    pub fn merge(&mut self, column: Column, owner: &str) -> Result<()> {
        match self.index.get(&column.name) {
            None => {
                self.index.insert(column.name.clone(), self.columns.len());
                self.columns.push(column);
                Ok(())
            }
            Some(&pos) => {
                let existing = &self.columns[pos];
                if !existing.ctype.compatible_override(&column.ctype) {
                    return Err(ModelError::ColumnConflict {
                        concept: owner.to_string(),
                        column: column.name.clone(),
                        message: format!(
                            "incompatible override: {} {} vs {} {}",
                            existing.ctype.primitive.tag(),
                            existing.ctype.usage.tag(),
                            column.ctype.primitive.tag(),
                            column.ctype.usage.tag()
                        ),
                    });
                }
                self.columns[pos] = column;
                Ok(())
            }
        }
    }

    /// Merge every column of `other`, in order
    pub fn merge_all(&mut self, other: &ColumnSet, owner: &str) -> Result<()> {
        for column in other.iter() {
            self.merge(column.clone(), owner)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Column> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.columns[i]),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Columns in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Column names in insertion order
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The identifier subset, in insertion order
    pub fn identifiers(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.ctype.usage == Usage::IdRef)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
