//! Document-store projection
//!
//! Derives collection and index specifications from the model and
//! serializes it into the metadata collection as a document sequence: one
//! model header, one per concept-domain, one per concept, one per CV. Large
//! CVs are fragmented into segments that respect the backend's per-document
//! size limit.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::cv::CvEntry;
use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::project::{cv_entry_document, Entity, Serializer};

/// Hard cap on terms per serialized CV segment
pub const MAX_SEGMENT_TERMS: usize = 256;

/// Default per-document size limit (16 MiB)
pub const DEFAULT_DOCUMENT_LIMIT: usize = 16 * 1024 * 1024;

/// Default safety margin subtracted from the document limit
pub const DEFAULT_SAFETY_MARGIN: usize = 64 * 1024;

/// Knobs for the document-store projection
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// Backend per-document size limit in bytes
    pub document_size_limit: usize,
    /// Margin kept free below the limit
    pub safety_margin: usize,
    /// Maximum terms per CV segment
    pub max_cv_terms: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            document_size_limit: DEFAULT_DOCUMENT_LIMIT,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            max_cv_terms: MAX_SEGMENT_TERMS,
        }
    }
}

impl ProjectionConfig {
    fn size_bound(&self) -> usize {
        self.document_size_limit.saturating_sub(self.safety_margin)
    }
}

/// One index to ensure on a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub collection: String,
    pub keys: Vec<(String, i8)>,
    pub unique: bool,
}

/// One collection to create, with its declared indices
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub path: String,
    pub indices: Vec<IndexSpec>,
}

/// The full document-store projection of a model
#[derive(Debug, Clone)]
pub struct DocumentProjection {
    pub collections: Vec<CollectionSpec>,
    /// Path of the metadata collection the documents belong to, if any
    pub metadata_collection: Option<String>,
    /// Serialized model documents, in insertion order
    pub documents: Vec<Value>,
    /// Standing indices on the metadata collection
    pub auxiliary_indices: Vec<IndexSpec>,
}

/// Project a resolved model for a document store
pub fn project(model: &Model, config: &ProjectionConfig) -> Result<DocumentProjection> {
    let serializer = Serializer::new(model);

    let collections = model
        .collections
        .iter()
        .map(|(name, collection)| CollectionSpec {
            name: name.to_string(),
            path: collection.path.clone(),
            indices: collection
                .indices
                .iter()
                .map(|index| IndexSpec {
                    collection: name.to_string(),
                    keys: index.keys.clone(),
                    unique: index.unique,
                })
                .collect(),
        })
        .collect();

    let mut documents = Vec::new();
    documents.push(serializer.serialize(Entity::Model(model)));
    for (_, domain) in model.domains.iter() {
        documents.push(serializer.serialize(Entity::Domain(domain)));
        for concept in domain.concepts() {
            documents.push(serializer.serialize(Entity::Concept(concept)));
        }
    }
    for (id, entry) in model.cvs.iter() {
        if let CvEntry::Simple(cv) = entry {
            if cv.unresolved {
                debug!(cv = id, "skipping unresolved CV in projection");
                continue;
            }
        }
        let doc = cv_entry_document(model, entry);
        documents.extend(fragment_cv(doc, config)?);
    }

    let auxiliary_indices = model
        .metadata_collection
        .as_deref()
        .map(|collection| {
            ["term", "parents", "ancestors"]
                .iter()
                .map(|field| IndexSpec {
                    collection: collection.to_string(),
                    keys: vec![(format!("terms.{field}"), 1)],
                    unique: false,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(DocumentProjection {
        collections,
        metadata_collection: model.metadata_collection.clone(),
        documents,
        auxiliary_indices,
    })
}

/// Split an oversize CV document into segments.
///
/// Fragmentation triggers when the term count exceeds the per-segment cap
/// or the serialized length exceeds the size bound. The first segment keeps
/// `_id`, `description` and `annotations` and carries `num-segments`; later
/// segments omit those three fields but share `name` and a correlation key
/// equal to the first segment's `_id`.
pub fn fragment_cv(doc: Value, config: &ProjectionConfig) -> Result<Vec<Value>> {
    let Value::Object(doc) = doc else {
        return Err(ModelError::Backend {
            target: "cv document".to_string(),
            message: "CV must serialize to an object".to_string(),
        });
    };
    let terms = doc
        .get("terms")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let total_bytes = serde_json::to_vec(&doc).map(|v| v.len()).unwrap_or(0);
    let bound = config.size_bound();

    if terms.len() <= config.max_cv_terms && total_bytes <= bound {
        return Ok(vec![Value::Object(doc)]);
    }

    // terms per segment: the cap, shrunk when the average term size would
    // push a full segment past the size bound
    let terms_bytes: usize = terms
        .iter()
        .map(|t| serde_json::to_vec(t).map(|v| v.len()).unwrap_or(0))
        .sum();
    let avg_term = (terms_bytes / terms.len().max(1)).max(1);
    let mut per_segment = config.max_cv_terms.min(bound / avg_term);
    per_segment = per_segment.max(1);

    let segments: Vec<&[Value]> = terms.chunks(per_segment).collect();
    let count = segments.len();
    let cv_id = doc.get("_id").cloned().unwrap_or(Value::Null);
    let cv_name = doc.get("name").cloned().unwrap_or(Value::Null);

    let mut out = Vec::with_capacity(count);
    for (ordinal, chunk) in segments.into_iter().enumerate() {
        if ordinal == 0 {
            let mut first = doc.clone();
            first.insert("terms".into(), json!(chunk));
            first.insert("num-segments".into(), json!(count));
            out.push(Value::Object(first));
        } else {
            let mut segment = Map::new();
            segment.insert("name".into(), cv_name.clone());
            segment.insert("segment-of".into(), cv_id.clone());
            segment.insert("segment".into(), json!(ordinal));
            segment.insert("terms".into(), json!(chunk));
            out.push(Value::Object(segment));
        }
    }
    debug!(segments = count, "fragmented oversize CV");
    Ok(out)
}
