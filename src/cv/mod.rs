//! Controlled vocabularies
//!
//! A simple CV carries an insertion-ordered term map sourced from inline
//! `<term>` elements, an external line-oriented file, or one or more
//! reference URIs (in which case the CV stays unresolved: its structure
//! loads but term-level validation is a distinguished error until the
//! content is fetched out of band). A meta-CV is an ordered union over
//! previously declared CVs and carries no terms of its own.

pub mod file;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::model::{AnnotationSet, Registry};

/// One vocabulary term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvTerm {
    /// Primary key
    pub key: String,
    pub alt_keys: Vec<String>,
    /// Display name
    pub name: String,
    /// Parent keys; for alias terms this is the union-of key list
    pub parents: Vec<String>,
    /// Reflexive-free transitive closure of parents; empty for aliases
    pub ancestors: Vec<String>,
    pub alias: bool,
}

impl CvTerm {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        let key = key.into();
        let name = name.into();
        Self {
            key,
            alt_keys: Vec::new(),
            name,
            parents: Vec::new(),
            ancestors: Vec::new(),
            alias: false,
        }
    }
}

/// Insertion-ordered term map with a unified key lookup
///
/// Primary and alternate keys share one namespace within a CV; collisions
/// are rejected at insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermMap {
    order: Vec<String>,
    terms: HashMap<String, CvTerm>,
    /// Any key (primary or alternate) to primary key
    lookup: HashMap<String, String>,
}

impl TermMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, term: CvTerm) -> Result<()> {
        for key in std::iter::once(&term.key).chain(term.alt_keys.iter()) {
            if self.lookup.contains_key(key) {
                return Err(ModelError::DuplicateName {
                    kind: "CV term",
                    name: key.clone(),
                });
            }
        }
        for key in term.alt_keys.iter() {
            self.lookup.insert(key.clone(), term.key.clone());
        }
        self.lookup.insert(term.key.clone(), term.key.clone());
        self.order.push(term.key.clone());
        self.terms.insert(term.key.clone(), term);
        Ok(())
    }

    pub fn get(&self, primary: &str) -> Option<&CvTerm> {
        self.terms.get(primary)
    }

    pub fn get_mut(&mut self, primary: &str) -> Option<&mut CvTerm> {
        self.terms.get_mut(primary)
    }

    /// Resolve any key (primary or alternate) to the primary key
    pub fn resolve(&self, key: &str) -> Option<&str> {
        self.lookup.get(key).map(|s| s.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup.contains_key(key)
    }

    /// Terms in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &CvTerm> {
        self.order.iter().filter_map(|k| self.terms.get(k))
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A simple controlled vocabulary
#[derive(Debug, Clone)]
pub struct Cv {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub annotations: AnnotationSet,
    pub terms: TermMap,
    /// Reference URIs; content is never fetched at load
    pub uris: Vec<String>,
    /// External file path as written in the model document
    pub file: Option<String>,
    /// Raw content of the external file, retained for packaged emission
    pub source_text: Option<String>,
    /// True when term content is URI-referenced (or parsing was skipped)
    /// and term-level validation is unavailable
    pub unresolved: bool,
}

impl Cv {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            annotations: AnnotationSet::new(),
            terms: TermMap::new(),
            uris: Vec::new(),
            file: None,
            source_text: None,
            unresolved: false,
        }
    }

    /// Compute the reflexive-free transitive ancestor closure for every
    /// non-alias term. Parent keys must resolve within this CV; cycles in
    /// the parent relation are an error.
    pub fn compute_ancestors(&mut self) -> Result<()> {
        // normalize parents to primary keys first
        let mut normalized: HashMap<String, Vec<String>> = HashMap::new();
        for term in self.terms.iter() {
            let mut parents = Vec::with_capacity(term.parents.len());
            for parent in &term.parents {
                let primary = self.terms.resolve(parent).ok_or_else(|| {
                    ModelError::CvTermNotFound {
                        cv: self.id.clone(),
                        key: parent.clone(),
                    }
                })?;
                parents.push(primary.to_string());
            }
            normalized.insert(term.key.clone(), parents);
        }

        // cycle check over the non-alias parent relation
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut nodes = HashMap::new();
        for term in self.terms.iter().filter(|t| !t.alias) {
            nodes.insert(term.key.as_str(), graph.add_node(term.key.as_str()));
        }
        for term in self.terms.iter().filter(|t| !t.alias) {
            for parent in &normalized[&term.key] {
                if let (Some(&from), Some(&to)) =
                    (nodes.get(term.key.as_str()), nodes.get(parent.as_str()))
                {
                    graph.add_edge(from, to, ());
                }
            }
        }
        if let Err(cycle) = toposort(&graph, None) {
            return Err(ModelError::CvCycle {
                cv: self.id.clone(),
                term: graph[cycle.node_id()].to_string(),
            });
        }

        // closure by iterative expansion, breadth-first from the parent list
        let keys: Vec<String> = self.terms.keys().to_vec();
        for key in keys {
            let term = self.terms.get(&key).map(|t| (t.alias, normalized[&key].clone()));
            let Some((alias, parents)) = term else { continue };
            let mut ancestors: Vec<String> = Vec::new();
            if !alias {
                let mut queue: Vec<String> = parents.clone();
                while let Some(current) = queue.pop() {
                    if current == key || ancestors.contains(&current) {
                        continue;
                    }
                    ancestors.push(current.clone());
                    if let Some(grand) = normalized.get(&current) {
                        for g in grand {
                            queue.push(g.clone());
                        }
                    }
                }
            }
            if let Some(term) = self.terms.get_mut(&key) {
                term.parents = parents;
                term.ancestors = ancestors;
            }
        }
        Ok(())
    }
}

impl PartialEq for Cv {
    /// The external-file path is rewritten on packaged emission and is
    /// incidental to the vocabulary itself, so it is excluded here.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.annotations == other.annotations
            && self.terms == other.terms
            && self.uris == other.uris
            && self.unresolved == other.unresolved
    }
}

/// A named union over an ordered list of CVs
#[derive(Debug, Clone, PartialEq)]
pub struct MetaCv {
    pub id: String,
    /// Enclosed CV ids, in declaration order
    pub members: Vec<String>,
}

/// Registry entry: a simple CV or a meta-CV
#[derive(Debug, Clone, PartialEq)]
pub enum CvEntry {
    Simple(Cv),
    Meta(MetaCv),
}

impl CvEntry {
    pub fn id(&self) -> &str {
        match self {
            CvEntry::Simple(cv) => &cv.id,
            CvEntry::Meta(meta) => &meta.id,
        }
    }

    pub fn as_simple(&self) -> Option<&Cv> {
        match self {
            CvEntry::Simple(cv) => Some(cv),
            CvEntry::Meta(_) => None,
        }
    }

    /// Term count, meta-CVs summing their members
    pub fn term_count(&self, registry: &Registry<CvEntry>) -> usize {
        match self {
            CvEntry::Simple(cv) => cv.terms.len(),
            CvEntry::Meta(meta) => meta
                .members
                .iter()
                .filter_map(|m| registry.get(m))
                .map(|e| e.term_count(registry))
                .sum(),
        }
    }

    /// Case-sensitive membership across primary and alternate keys,
    /// including enclosed CVs. Unresolved CVs contribute nothing.
    pub fn contains_key(&self, key: &str, registry: &Registry<CvEntry>) -> bool {
        match self {
            CvEntry::Simple(cv) => cv.terms.contains(key),
            CvEntry::Meta(meta) => meta
                .members
                .iter()
                .filter_map(|m| registry.get(m))
                .any(|e| e.contains_key(key, registry)),
        }
    }

    /// Validate a key; `CvUnresolved` when any reachable CV is unresolved
    /// and the key is not found elsewhere.
    pub fn validate(&self, key: &str, registry: &Registry<CvEntry>) -> Result<bool> {
        match self {
            CvEntry::Simple(cv) => {
                if cv.unresolved {
                    Err(ModelError::CvUnresolved { cv: cv.id.clone() })
                } else {
                    Ok(cv.terms.contains(key))
                }
            }
            CvEntry::Meta(meta) => {
                let mut unresolved = None;
                for member in &meta.members {
                    let Some(entry) = registry.get(member) else {
                        continue;
                    };
                    match entry.validate(key, registry) {
                        Ok(true) => return Ok(true),
                        Ok(false) => {}
                        Err(e @ ModelError::CvUnresolved { .. }) => unresolved = Some(e),
                        Err(e) => return Err(e),
                    }
                }
                match unresolved {
                    Some(e) => Err(e),
                    None => Ok(false),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(key: &str, parents: &[&str]) -> CvTerm {
        let mut t = CvTerm::new(key, key.to_uppercase());
        t.parents = parents.iter().map(|s| s.to_string()).collect();
        t
    }

    #[test]
    fn test_key_namespace_is_shared() {
        let mut map = TermMap::new();
        let mut t = CvTerm::new("a", "A");
        t.alt_keys = vec!["b".to_string()];
        map.insert(t).unwrap();

        let err = map.insert(CvTerm::new("b", "B")).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateName { kind: "CV term", .. }));
        assert_eq!(map.resolve("b"), Some("a"));
    }

    #[test]
    fn test_ancestor_closure() {
        let mut cv = Cv::new("t");
        cv.terms.insert(term("root", &[])).unwrap();
        cv.terms.insert(term("mid", &["root"])).unwrap();
        cv.terms.insert(term("leaf", &["mid"])).unwrap();
        cv.compute_ancestors().unwrap();

        let leaf = cv.terms.get("leaf").unwrap();
        assert_eq!(leaf.parents, vec!["mid"]);
        assert!(leaf.ancestors.contains(&"mid".to_string()));
        assert!(leaf.ancestors.contains(&"root".to_string()));
        assert_eq!(leaf.ancestors.len(), 2);
        assert!(cv.terms.get("root").unwrap().ancestors.is_empty());
    }

    #[test]
    fn test_parent_cycle_detected() {
        let mut cv = Cv::new("t");
        cv.terms.insert(term("a", &["b"])).unwrap();
        cv.terms.insert(term("b", &["a"])).unwrap();
        let err = cv.compute_ancestors().unwrap_err();
        assert!(matches!(err, ModelError::CvCycle { .. }));
    }

    #[test]
    fn test_unknown_parent() {
        let mut cv = Cv::new("t");
        cv.terms.insert(term("a", &["missing"])).unwrap();
        let err = cv.compute_ancestors().unwrap_err();
        assert!(matches!(err, ModelError::CvTermNotFound { .. }));
    }

    #[test]
    fn test_alias_skips_closure() {
        let mut cv = Cv::new("t");
        cv.terms.insert(term("x", &[])).unwrap();
        cv.terms.insert(term("y", &[])).unwrap();
        let mut alias = term("both", &["x", "y"]);
        alias.alias = true;
        cv.terms.insert(alias).unwrap();
        cv.compute_ancestors().unwrap();

        let both = cv.terms.get("both").unwrap();
        assert_eq!(both.parents, vec!["x", "y"]);
        assert!(both.ancestors.is_empty());
    }

    #[test]
    fn test_meta_cv_union_validation() {
        let mut registry = Registry::new("CV");
        let mut a = Cv::new("a");
        a.terms.insert(CvTerm::new("one", "One")).unwrap();
        let mut b = Cv::new("b");
        b.terms.insert(CvTerm::new("two", "Two")).unwrap();
        registry.insert("a", CvEntry::Simple(a)).unwrap();
        registry.insert("b", CvEntry::Simple(b)).unwrap();
        registry
            .insert(
                "ab",
                CvEntry::Meta(MetaCv {
                    id: "ab".to_string(),
                    members: vec!["a".to_string(), "b".to_string()],
                }),
            )
            .unwrap();

        let meta = registry.get("ab").unwrap();
        assert!(meta.validate("two", &registry).unwrap());
        assert!(!meta.validate("three", &registry).unwrap());
        assert_eq!(meta.term_count(&registry), 2);
    }

    #[test]
    fn test_unresolved_cv_is_an_error() {
        let mut registry = Registry::new("CV");
        let mut cv = Cv::new("remote");
        cv.uris = vec!["http://example.org/cv".to_string()];
        cv.unresolved = true;
        registry.insert("remote", CvEntry::Simple(cv)).unwrap();

        let err = registry
            .get("remote")
            .unwrap()
            .validate("x", &registry)
            .unwrap_err();
        assert!(matches!(err, ModelError::CvUnresolved { .. }));
    }
}
