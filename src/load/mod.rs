//! Model loading
//!
//! Opens a model document, validates it against the meta-schema, builds
//! every registry in declaration order, resolves references and returns the
//! frozen model. Loading is atomic: it either returns a fully resolved
//! [`Model`] or fails with a single error; a partially built model is never
//! observable.

pub mod meta;
pub mod resolve;
pub mod xml;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use roxmltree::{Document, Node};
use tracing::{debug, info};

use crate::cv::{self, Cv, CvEntry, CvTerm, MetaCv};
use crate::digest::{CvStream, DigestSet, Sha1Hex};
use crate::error::{ModelError, Result};
use crate::model::{
    Collection, Column, ColumnType, CompoundType, Concept, ConceptDomain, ConceptType,
    ConceptTypeParent, DefaultValue, Index, Model, Registry, Restriction, Usage,
};
use crate::model::concept::{Arity, RelatedConcept};
use crate::pattern::{CaptureSpec, FilenamePattern, PatternPart};
use crate::types::{PatternRegistry, Primitive, TypeTable};
use xml::{bool_attr, child_elements, find_child, node_path, parse_annotations, parse_description, req_attr, text_of};

/// Default id of the CV bound to the null-value slot
pub const DEFAULT_NULL_CV: &str = "nullCV";

/// Options controlling a load
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Directory external CV paths are resolved against; defaults to the
    /// model document's directory
    pub cv_dir: Option<PathBuf>,
    /// Leave external-file CVs unresolved instead of reading them
    pub skip_cv_parse: bool,
}

/// Source of external CV content, by the path written in the document
pub trait CvSource {
    fn read(&mut self, path: &str) -> Result<Vec<u8>>;
}

/// Reads CV files relative to a base directory
pub struct DirCvSource {
    base: PathBuf,
}

impl DirCvSource {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl CvSource for DirCvSource {
    fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.base.join(path))?)
    }
}

/// Load a plain model document with default options
pub fn load_path(path: &Path) -> Result<Model> {
    load_path_with(path, &LoadOptions::default())
}

/// Load a plain model document
pub fn load_path_with(path: &Path, options: &LoadOptions) -> Result<Model> {
    let model_bytes = fs::read(path)?;
    let source_mtime = fs::metadata(path)?.modified().ok();
    let base = match &options.cv_dir {
        Some(dir) => dir.clone(),
        None => path.parent().unwrap_or(Path::new(".")).to_path_buf(),
    };
    let mut cv_source = DirCvSource::new(base);
    let model = build_model(
        &model_bytes,
        meta::META_SCHEMA.as_bytes().to_vec(),
        &mut cv_source,
        options,
        source_mtime,
    )?;
    info!(project = %model.project, path = %path.display(), "model loaded");
    Ok(model)
}

/// Parse, resolve and invariant-check a model from raw bytes.
///
/// Shared by the plain and packaged load paths, which differ only in where
/// the bytes and the CV content come from.
pub(crate) fn build_model(
    model_bytes: &[u8],
    schema_bytes: Vec<u8>,
    cv_source: &mut dyn CvSource,
    options: &LoadOptions,
    source_mtime: Option<SystemTime>,
) -> Result<Model> {
    let text = std::str::from_utf8(model_bytes)
        .map_err(|e| ModelError::schema("/", format!("document is not UTF-8: {e}")))?;
    let doc = Document::parse(text)
        .map_err(|e| ModelError::schema("/", format!("XML parse error: {e}")))?;
    meta::validate(&doc)?;
    let root = doc.root_element();

    let project = req_attr(root, "project")?.to_string();
    let schema_ver = req_attr(root, "schemaVer")?.to_string();
    let metadata_collection = root.attribute("metadataCollection").map(str::to_string);
    let null_cv = root
        .attribute("nullCV")
        .unwrap_or(DEFAULT_NULL_CV)
        .to_string();
    let annotations = parse_annotations(root)?;
    let description = parse_description(root);

    let collections = parse_collections(root)?;
    let patterns = parse_patterns(root)?;

    let mut cv_stream = CvStream::new(model_bytes);
    let cvs = parse_cvs(root, cv_source, options, &mut cv_stream)?;
    let compound_types = parse_compound_types(root)?;
    let mut concept_types = parse_concept_types(root)?;
    let mut domains = parse_domains(root)?;

    // resolution passes, in dependency order
    let type_names: Vec<String> = concept_types.names().to_vec();
    for name in type_names {
        let mut ct = concept_types.get(&name).cloned().expect("type just listed");
        resolve::resolve_concept_type(&mut ct, &concept_types)?;
        *concept_types.get_mut(&name).expect("type just listed") = ct;
    }
    resolve::resolve_domains(&mut domains, &concept_types)?;
    resolve::propagate_related(&mut domains)?;

    let filename_patterns = parse_filename_patterns(root)?;

    let (cv_digest, full_digest) = cv_stream.finish();
    let digests = DigestSet {
        schema: Sha1Hex::from_bytes(&schema_bytes),
        model: Sha1Hex::from_bytes(model_bytes),
        cv: cv_digest,
        full: full_digest,
    };

    let model = Model {
        project,
        schema_ver,
        annotations,
        description,
        metadata_collection,
        null_cv,
        collections,
        patterns,
        cvs,
        compound_types,
        concept_types,
        domains,
        filename_patterns,
        digests,
        schema_bytes,
        source_mtime,
        type_table: TypeTable::new(),
    };

    resolve::check_invariants(&model)?;
    debug!(stats = ?model.stats(), "model resolved");
    Ok(model)
}

fn parse_collections(root: Node) -> Result<Registry<Collection>> {
    let mut registry = Registry::new("collection");
    let Some(block) = find_child(root, "collections") else {
        return Ok(registry);
    };
    for node in child_elements(block) {
        let name = req_attr(node, "name")?.to_string();
        let path = req_attr(node, "path")?.to_string();
        let mut indices = Vec::new();
        for index_node in child_elements(node).filter(|n| n.has_tag_name("index")) {
            let unique = bool_attr(index_node, "unique", false)?;
            let mut keys = Vec::new();
            for key_node in child_elements(index_node) {
                let column = req_attr(key_node, "column")?.to_string();
                let order = match key_node.attribute("order") {
                    Some("-1") => -1,
                    _ => 1,
                };
                keys.push((column, order));
            }
            indices.push(Index { unique, keys });
        }
        registry.insert(
            name.clone(),
            Collection {
                name,
                path,
                indices,
            },
        )?;
    }
    Ok(registry)
}

fn parse_patterns(root: Node) -> Result<PatternRegistry> {
    let mut registry = PatternRegistry::new();
    let Some(block) = find_child(root, "patterns") else {
        return Ok(registry);
    };
    for node in child_elements(block) {
        let name = req_attr(node, "name")?;
        registry.insert(name, text_of(node).trim())?;
    }
    Ok(registry)
}

fn parse_cvs(
    root: Node,
    cv_source: &mut dyn CvSource,
    options: &LoadOptions,
    stream: &mut CvStream,
) -> Result<Registry<CvEntry>> {
    let mut registry = Registry::new("CV");
    let Some(block) = find_child(root, "cvs") else {
        return Ok(registry);
    };
    for node in child_elements(block) {
        match node.tag_name().name() {
            "cv" => {
                let entry = parse_simple_cv(node, cv_source, options, stream)?;
                registry.insert(entry.id.clone(), CvEntry::Simple(entry))?;
            }
            "metaCv" => {
                let id = req_attr(node, "id")?.to_string();
                let mut members = Vec::new();
                for cv_ref in child_elements(node) {
                    let target = req_attr(cv_ref, "ref")?.to_string();
                    // enclosed CVs must be declared earlier
                    if !registry.contains(&target) {
                        return Err(ModelError::UnknownReference {
                            kind: "CV",
                            name: target,
                            referrer: format!("metaCv {id}"),
                        });
                    }
                    members.push(target);
                }
                registry.insert(id.clone(), CvEntry::Meta(MetaCv { id, members }))?;
            }
            _ => unreachable!("meta validation admits cv and metaCv only"),
        }
    }
    Ok(registry)
}

fn parse_simple_cv(
    node: Node,
    cv_source: &mut dyn CvSource,
    options: &LoadOptions,
    stream: &mut CvStream,
) -> Result<Cv> {
    let id = req_attr(node, "id")?;
    let mut entry = Cv::new(id);
    entry.name = node.attribute("name").map(str::to_string);
    entry.description = parse_description(node);
    entry.annotations = parse_annotations(node)?;

    for child in child_elements(node) {
        match child.tag_name().name() {
            "term" => {
                let key = req_attr(child, "key")?;
                let mut term = CvTerm::new(key, child.attribute("name").unwrap_or(key));
                term.alt_keys = split_list(child.attribute("alt"));
                term.parents = split_list(child.attribute("parents"));
                term.alias = bool_attr(child, "alias", false)?;
                entry.terms.insert(term)?;
            }
            "file" => {
                if entry.file.is_some() {
                    return Err(ModelError::schema(
                        node_path(child),
                        "only one external file per CV",
                    ));
                }
                entry.file = Some(req_attr(child, "path")?.to_string());
            }
            "uri" => entry.uris.push(text_of(child).trim().to_string()),
            _ => {}
        }
    }

    if entry.file.is_some() && !entry.terms.is_empty() {
        return Err(ModelError::schema(
            node_path(node),
            "a CV carries inline terms or an external file, not both",
        ));
    }

    if let Some(path) = entry.file.clone() {
        if options.skip_cv_parse {
            entry.unresolved = true;
        } else {
            let bytes = cv_source.read(&path)?;
            stream.update(&bytes);
            let content = String::from_utf8(bytes).map_err(|e| {
                ModelError::schema(node_path(node), format!("CV file is not UTF-8: {e}"))
            })?;
            cv::file::parse_into(&mut entry, &content)?;
            entry.source_text = Some(content);
        }
    } else if entry.terms.is_empty() && !entry.uris.is_empty() {
        // URI-referenced content is never fetched at load
        entry.unresolved = true;
    }

    if !entry.unresolved {
        entry.compute_ancestors()?;
    }
    Ok(entry)
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_compound_types(root: Node) -> Result<Registry<CompoundType>> {
    let mut registry = Registry::new("compound type");
    let Some(block) = find_child(root, "compoundTypes") else {
        return Ok(registry);
    };
    for node in child_elements(block) {
        let name = req_attr(node, "name")?.to_string();
        let mut columns = crate::model::ColumnSet::new();
        for column_node in child_elements(node).filter(|n| n.has_tag_name("column")) {
            let column = parse_column(column_node)?;
            // compound members may only use earlier-declared compound types
            if let Some(Restriction::Compound(target)) = &column.ctype.restriction {
                if !registry.contains(target) {
                    return Err(ModelError::UnknownReference {
                        kind: "compound type",
                        name: target.clone(),
                        referrer: format!("compound type {name}"),
                    });
                }
            }
            columns.insert(column)?;
        }
        registry.insert(name.clone(), CompoundType { name, columns })?;
    }
    Ok(registry)
}

fn parse_concept_types(root: Node) -> Result<Registry<ConceptType>> {
    let mut registry = Registry::new("concept type");
    let Some(block) = find_child(root, "conceptTypes") else {
        return Ok(registry);
    };
    for node in child_elements(block) {
        let ct = parse_concept_type(node, &registry, true)?;
        let name = ct.name.clone().expect("top-level types are named");
        registry.insert(name, ct)?;
    }
    Ok(registry)
}

fn parse_concept_type(
    node: Node,
    registry: &Registry<ConceptType>,
    top_level: bool,
) -> Result<ConceptType> {
    let name = node.attribute("name").map(str::to_string);
    if top_level && name.is_none() {
        return Err(ModelError::schema(
            node_path(node),
            "top-level concept types must be named",
        ));
    }
    if !top_level && name.is_some() {
        return Err(ModelError::schema(
            node_path(node),
            "inline parent concept types are anonymous",
        ));
    }

    let inline_parent = find_child(node, "conceptType");
    let named_parent = node.attribute("parent");
    let parent = match (named_parent, inline_parent) {
        (Some(_), Some(inline)) => {
            return Err(ModelError::schema(
                node_path(inline),
                "a concept type has either a named or an inline parent",
            ));
        }
        (Some(parent_name), None) => {
            if !registry.contains(parent_name) {
                return Err(ModelError::UnknownReference {
                    kind: "concept type",
                    name: parent_name.to_string(),
                    referrer: name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
                });
            }
            Some(ConceptTypeParent::Named(parent_name.to_string()))
        }
        (None, Some(inline)) => Some(ConceptTypeParent::Anonymous(Box::new(
            parse_concept_type(inline, registry, false)?,
        ))),
        (None, None) => None,
    };

    let mut declared = crate::model::ColumnSet::new();
    for column_node in child_elements(node).filter(|n| n.has_tag_name("column")) {
        declared.insert(parse_column(column_node)?)?;
    }

    Ok(ConceptType {
        name,
        parent,
        collection: node.attribute("collection").map(str::to_string),
        declared,
        merged: crate::model::ColumnSet::new(),
    })
}

fn parse_domains(root: Node) -> Result<Registry<ConceptDomain>> {
    let mut registry = Registry::new("concept domain");
    for node in child_elements(root).filter(|n| n.has_tag_name("conceptDomain")) {
        let name = req_attr(node, "name")?.to_string();
        let mut domain = ConceptDomain::new(name.clone(), req_attr(node, "fullName")?);
        domain.is_abstract = bool_attr(node, "abstract", false)?;
        domain.description = parse_description(node);
        domain.annotations = parse_annotations(node)?;

        for concept_node in child_elements(node).filter(|n| n.has_tag_name("concept")) {
            domain.insert(parse_concept(concept_node, &name)?)?;
        }
        registry.insert(name, domain)?;
    }
    Ok(registry)
}

fn parse_concept(node: Node, domain: &str) -> Result<Concept> {
    let name = req_attr(node, "name")?.to_string();
    let identified_by = node.attribute("identifiedBy").map(str::to_string);
    let id_prefix = node.attribute("idPrefix").map(str::to_string);
    if identified_by.is_some() && id_prefix.is_none() {
        return Err(ModelError::schema(
            node_path(node),
            "identifiedBy requires idPrefix",
        ));
    }

    let mut declared = crate::model::ColumnSet::new();
    for column_node in child_elements(node).filter(|n| n.has_tag_name("column")) {
        declared.insert(parse_column(column_node)?)?;
    }

    let mut related = Vec::new();
    for rel_node in child_elements(node).filter(|n| n.has_tag_name("relatedConcept")) {
        let arity = match rel_node.attribute("arity") {
            None => Arity::One,
            Some(tag) => Arity::parse(tag).ok_or_else(|| {
                ModelError::schema(node_path(rel_node), format!("invalid arity '{tag}'"))
            })?,
        };
        related.push(RelatedConcept {
            domain: rel_node.attribute("domain").map(str::to_string),
            concept: req_attr(rel_node, "concept")?.to_string(),
            key_prefix: req_attr(rel_node, "keyPrefix")?.to_string(),
            arity,
            resolved: None,
            fk_columns: Vec::new(),
        });
    }

    Ok(Concept {
        name,
        full_name: req_attr(node, "fullName")?.to_string(),
        description: parse_description(node),
        annotations: parse_annotations(node)?,
        domain: domain.to_string(),
        based_on: split_list(node.attribute("basedOn")),
        extends: node.attribute("extends").map(str::to_string),
        identified_by,
        id_prefix,
        collection: node.attribute("collection").map(str::to_string),
        declared,
        columns: crate::model::ColumnSet::new(),
        related,
    })
}

fn parse_filename_patterns(root: Node) -> Result<Registry<FilenamePattern>> {
    let mut registry = Registry::new("filename pattern");
    for node in child_elements(root).filter(|n| n.has_tag_name("filenamePattern")) {
        let name = req_attr(node, "name")?.to_string();
        let concept_ref = req_attr(node, "concept")?;
        let Some((domain, concept)) = concept_ref.split_once('.') else {
            return Err(ModelError::schema(
                node_path(node),
                format!("concept reference '{concept_ref}' must be domain.concept"),
            ));
        };

        let mut parts = Vec::new();
        for part_node in child_elements(node) {
            match part_node.tag_name().name() {
                "literal" => parts.push(PatternPart::Literal(text_of(part_node))),
                "capture" => {
                    let type_tag = req_attr(part_node, "type")?;
                    let primitive = Primitive::parse(type_tag).ok_or_else(|| {
                        ModelError::schema(
                            node_path(part_node),
                            format!("unknown type '{type_tag}'"),
                        )
                    })?;
                    if primitive == Primitive::Compound {
                        return Err(ModelError::schema(
                            node_path(part_node),
                            "captures cannot be compound-typed",
                        ));
                    }
                    parts.push(PatternPart::Capture(CaptureSpec {
                        name: req_attr(part_node, "name")?.to_string(),
                        primitive,
                        column: part_node.attribute("column").map(str::to_string),
                    }));
                }
                _ => {}
            }
        }
        let pattern =
            FilenamePattern::compile(name.clone(), (domain.to_string(), concept.to_string()), parts)?;
        registry.insert(name, pattern)?;
    }
    Ok(registry)
}

/// Parse one `<column>` element
fn parse_column(node: Node) -> Result<Column> {
    let name = req_attr(node, "name")?.to_string();
    let type_tag = req_attr(node, "type")?;
    let primitive = Primitive::parse(type_tag).ok_or_else(|| {
        ModelError::schema(node_path(node), format!("unknown type '{type_tag}'"))
    })?;
    let usage = match node.attribute("use") {
        None => Usage::Optional,
        Some(tag) => Usage::parse(tag).ok_or_else(|| {
            ModelError::schema(node_path(node), format!("invalid use '{tag}'"))
        })?,
    };

    let restriction = if let Some(cv) = node.attribute("cv") {
        Some(Restriction::Cv(cv.to_string()))
    } else if let Some(pattern) = node.attribute("pattern") {
        Some(Restriction::Pattern(pattern.to_string()))
    } else {
        node.attribute("compound")
            .map(|c| Restriction::Compound(c.to_string()))
    };

    // the compound primitive and the compound restriction imply each other
    match (&primitive, &restriction) {
        (Primitive::Compound, Some(Restriction::Compound(_))) => {}
        (Primitive::Compound, _) => {
            return Err(ModelError::schema(
                node_path(node),
                "compound columns must name their compound type",
            ));
        }
        (_, Some(Restriction::Compound(_))) => {
            return Err(ModelError::schema(
                node_path(node),
                "only compound columns may carry a compound restriction",
            ));
        }
        _ => {}
    }

    let default = if let Some(literal) = node.attribute("default") {
        Some(DefaultValue::Literal(literal.to_string()))
    } else {
        node.attribute("defaultCol")
            .map(|c| DefaultValue::Column(c.to_string()))
    };

    let separators: Vec<char> = node
        .attribute("arraySep")
        .map(|s| s.chars().collect())
        .unwrap_or_default();

    let mut column = Column::new(
        name,
        ColumnType {
            primitive,
            usage,
            default,
            restriction,
            separators,
        },
    );
    column.description = parse_description(node);
    column.annotations = parse_annotations(node)?;
    Ok(column)
}
