//! Backend projection
//!
//! Serializes the resolved model into a backend-neutral structured form and
//! derives backend-specific artifacts from it: document-store collections
//! with indices and metadata documents, or search-index field mappings.
//! Serialization for every entity variant lives here, in one serializer
//! that dispatches on the variant tag; entities themselves carry no
//! serialization code.

pub mod document;
pub mod search;
pub mod xml;

use serde_json::{json, Map, Value};

use crate::cv::{Cv, CvEntry, CvTerm, MetaCv};
use crate::model::{
    AnnotationSet, Collection, Column, ColumnType, Concept, ConceptDomain, DefaultValue, Index,
    Model, Restriction,
};

/// The fixed entity set the serializer dispatches over
pub enum Entity<'a> {
    Model(&'a Model),
    Collection(&'a Collection),
    Index(&'a Index),
    Domain(&'a ConceptDomain),
    Concept(&'a Concept),
    Column(&'a Column),
    ColumnType(&'a ColumnType),
    Cv(&'a Cv),
    MetaCv(&'a MetaCv),
    CvTerm(&'a CvTerm),
    Annotations(&'a AnnotationSet),
}

/// Serializer over the resolved model
///
/// Reads the model but never mutates it; every document it produces is a
/// fresh JSON value in the backend-neutral shape.
pub struct Serializer<'a> {
    model: &'a Model,
}

impl<'a> Serializer<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    /// Serialize any entity variant
    pub fn serialize(&self, entity: Entity<'_>) -> Value {
        match entity {
            Entity::Model(m) => self.model_document(m),
            Entity::Collection(c) => self.collection_document(c),
            Entity::Index(i) => self.index_document(i),
            Entity::Domain(d) => self.domain_document(d),
            Entity::Concept(c) => self.concept_document(c),
            Entity::Column(c) => self.column_document(c),
            Entity::ColumnType(t) => self.column_type_document(t),
            Entity::Cv(cv) => self.cv_document(cv),
            Entity::MetaCv(meta) => self.meta_cv_document(meta),
            Entity::CvTerm(t) => self.term_document(t),
            Entity::Annotations(a) => self.annotations_document(a),
        }
    }

    /// The top-level serialized model: project, schema version, annotations,
    /// collections keyed by path, domains keyed by name
    fn model_document(&self, model: &Model) -> Value {
        let mut collections = Map::new();
        for (_, collection) in model.collections.iter() {
            collections.insert(
                collection.path.clone(),
                self.collection_document(collection),
            );
        }
        let mut domains = Map::new();
        for (name, domain) in model.domains.iter() {
            domains.insert(name.to_string(), self.domain_document(domain));
        }
        json!({
            "project": model.project,
            "schemaVer": model.schema_ver,
            "annotations": self.annotations_document(&model.annotations),
            "collections": Value::Object(collections),
            "domains": Value::Object(domains),
        })
    }

    fn collection_document(&self, collection: &Collection) -> Value {
        json!({
            "name": collection.name,
            "path": collection.path,
            "indices": collection.indices.iter()
                .map(|i| self.index_document(i))
                .collect::<Vec<_>>(),
        })
    }

    fn index_document(&self, index: &Index) -> Value {
        json!({
            "unique": index.unique,
            "keys": index.keys.iter()
                .map(|(column, order)| json!({ "column": column, "order": order }))
                .collect::<Vec<_>>(),
        })
    }

    fn domain_document(&self, domain: &ConceptDomain) -> Value {
        let mut doc = Map::new();
        doc.insert("_id".into(), json!(domain.name));
        doc.insert("name".into(), json!(domain.name));
        doc.insert("fullname".into(), json!(domain.full_name));
        if let Some(description) = &domain.description {
            doc.insert("description".into(), json!(description));
        }
        doc.insert(
            "annotations".into(),
            self.annotations_document(&domain.annotations),
        );
        doc.insert(
            "concepts".into(),
            json!(domain
                .concepts()
                .map(|c| c.qualified_name())
                .collect::<Vec<_>>()),
        );
        Value::Object(doc)
    }

    fn concept_document(&self, concept: &Concept) -> Value {
        let mut doc = Map::new();
        doc.insert("_id".into(), json!(concept.qualified_name()));
        doc.insert("name".into(), json!(concept.name));
        doc.insert("fullname".into(), json!(concept.full_name));
        if let Some(description) = &concept.description {
            doc.insert("description".into(), json!(description));
        }
        doc.insert(
            "annotations".into(),
            self.annotations_document(&concept.annotations),
        );
        if let Some(extends) = &concept.extends {
            doc.insert("extends".into(), json!(format!("{}.{extends}", concept.domain)));
        }
        if let Some(id_concept) = &concept.identified_by {
            doc.insert(
                "identifiedBy".into(),
                json!(format!("{}.{id_concept}", concept.domain)),
            );
        }
        let mut related: Vec<String> = Vec::new();
        for relation in &concept.related {
            if let Some((domain, name)) = &relation.resolved {
                let id = format!("{domain}.{name}");
                if !related.contains(&id) {
                    related.push(id);
                }
            }
        }
        if !related.is_empty() {
            doc.insert("relatedTo".into(), json!(related));
        }
        let mut columns = Map::new();
        for column in concept.columns.iter() {
            columns.insert(column.name.clone(), self.column_document(column));
        }
        doc.insert("columns".into(), Value::Object(columns));
        Value::Object(doc)
    }

    fn column_document(&self, column: &Column) -> Value {
        let Value::Object(mut doc) = self.column_type_document(&column.ctype) else {
            unreachable!("column types serialize to objects");
        };
        if let Some(description) = &column.description {
            doc.insert("description".into(), json!(description));
        }
        if !column.annotations.is_empty() {
            doc.insert(
                "annotations".into(),
                self.annotations_document(&column.annotations),
            );
        }
        if let Some(referred) = &column.refers_to {
            doc.insert(
                "refColumn".into(),
                json!({
                    "concept": format!("{}.{}", referred.domain, referred.concept),
                    "column": referred.column,
                }),
            );
        }
        Value::Object(doc)
    }

    fn column_type_document(&self, ctype: &ColumnType) -> Value {
        let mut doc = Map::new();
        doc.insert("type".into(), json!(ctype.primitive.tag()));
        doc.insert("use".into(), json!(ctype.usage.tag()));
        doc.insert("isArray".into(), json!(ctype.is_array()));
        match &ctype.default {
            Some(DefaultValue::Literal(value)) => {
                doc.insert("default".into(), json!(value));
            }
            Some(DefaultValue::Column(column)) => {
                doc.insert("defaultCol".into(), json!(column));
            }
            None => {}
        }
        match &ctype.restriction {
            Some(Restriction::Cv(id)) => {
                doc.insert("cv".into(), json!(id));
            }
            Some(Restriction::Pattern(name)) => {
                doc.insert("pattern".into(), json!(name));
            }
            Some(Restriction::Compound(name)) => {
                // compound types expand to their member columns
                let mut members = Map::new();
                if let Some(compound) = self.model.compound_types.get(name) {
                    for member in compound.columns.iter() {
                        members.insert(member.name.clone(), self.column_document(member));
                    }
                }
                doc.insert("columns".into(), Value::Object(members));
            }
            None => {}
        }
        Value::Object(doc)
    }

    fn cv_document(&self, cv: &Cv) -> Value {
        let mut doc = Map::new();
        doc.insert("_id".into(), json!(cv.id));
        doc.insert(
            "name".into(),
            json!(cv.name.clone().unwrap_or_else(|| cv.id.clone())),
        );
        if let Some(description) = &cv.description {
            doc.insert("description".into(), json!(description));
        }
        doc.insert(
            "annotations".into(),
            self.annotations_document(&cv.annotations),
        );
        if !cv.uris.is_empty() {
            doc.insert("uris".into(), json!(cv.uris));
        }
        doc.insert(
            "terms".into(),
            json!(cv.terms.iter().map(|t| self.term_document(t)).collect::<Vec<_>>()),
        );
        Value::Object(doc)
    }

    fn meta_cv_document(&self, meta: &MetaCv) -> Value {
        // the union's terms, in member declaration order
        let mut terms = Vec::new();
        for member in &meta.members {
            if let Some(CvEntry::Simple(cv)) = self.model.cvs.get(member) {
                terms.extend(cv.terms.iter().map(|t| self.term_document(t)));
            }
        }
        json!({
            "_id": meta.id,
            "name": meta.id,
            "annotations": Value::Object(Map::new()),
            "enclosed": meta.members,
            "terms": terms,
        })
    }

    fn term_document(&self, term: &CvTerm) -> Value {
        let mut doc = Map::new();
        doc.insert("_id".into(), json!(term.key));
        doc.insert("term".into(), json!(term.key));
        doc.insert("name".into(), json!(term.name));
        if !term.alt_keys.is_empty() {
            doc.insert("alt-id".into(), json!(term.alt_keys));
        }
        if term.alias {
            doc.insert("alias".into(), json!(true));
            doc.insert("union-of".into(), json!(term.parents));
        } else {
            if !term.parents.is_empty() {
                doc.insert("parents".into(), json!(term.parents));
            }
            if !term.ancestors.is_empty() {
                doc.insert("ancestors".into(), json!(term.ancestors));
            }
        }
        Value::Object(doc)
    }

    /// Annotations as an ordered name-to-text object
    fn annotations_document(&self, annotations: &AnnotationSet) -> Value {
        let mut doc = Map::new();
        for (name, value) in annotations.iter() {
            doc.insert(name.to_string(), json!(value.as_text()));
        }
        Value::Object(doc)
    }
}

/// Serialize a CV registry entry (simple or meta)
pub fn cv_entry_document(model: &Model, entry: &CvEntry) -> Value {
    let serializer = Serializer::new(model);
    match entry {
        CvEntry::Simple(cv) => serializer.serialize(Entity::Cv(cv)),
        CvEntry::Meta(meta) => serializer.serialize(Entity::MetaCv(meta)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{build_model, CvSource, LoadOptions};

    struct NoCvs;
    impl CvSource for NoCvs {
        fn read(&mut self, path: &str) -> crate::error::Result<Vec<u8>> {
            Err(crate::error::ModelError::corrupt(path, "no CV source"))
        }
    }

    fn tiny_model() -> Model {
        let xml = r#"<model project="demo" schemaVer="0.9">
  <collections>
    <collection name="main" path="db.main"/>
  </collections>
  <cvs>
    <cv id="nullCV"><term key="-" name="not available"/></cv>
  </cvs>
  <conceptDomain name="s" fullName="Samples">
    <concept name="sample" fullName="Sample">
      <column name="id" type="string" use="idref"/>
      <column name="name" type="string" use="required"/>
    </concept>
  </conceptDomain>
</model>"#;
        build_model(
            xml.as_bytes(),
            b"schema".to_vec(),
            &mut NoCvs,
            &LoadOptions::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_model_document_shape() {
        let model = tiny_model();
        let doc = Serializer::new(&model).serialize(Entity::Model(&model));
        assert_eq!(doc["project"], "demo");
        assert_eq!(doc["schemaVer"], "0.9");
        assert!(doc["collections"]["db.main"].is_object());
        assert!(doc["domains"]["s"].is_object());
    }

    #[test]
    fn test_concept_document_column_order() {
        let model = tiny_model();
        let concept = model.concept("s", "sample").unwrap();
        let doc = Serializer::new(&model).serialize(Entity::Concept(concept));
        assert_eq!(doc["_id"], "s.sample");
        let columns = doc["columns"].as_object().unwrap();
        let names: Vec<&String> = columns.keys().collect();
        assert_eq!(names, ["id", "name"]);
        assert_eq!(columns["id"]["use"], "idref");
        assert_eq!(columns["id"]["isArray"], false);
    }

    #[test]
    fn test_term_document_variants() {
        let model = tiny_model();
        let serializer = Serializer::new(&model);

        let mut plain = CvTerm::new("leaf", "Leaf");
        plain.parents = vec!["mid".to_string()];
        plain.ancestors = vec!["mid".to_string(), "root".to_string()];
        let doc = serializer.serialize(Entity::CvTerm(&plain));
        assert_eq!(doc["parents"], json!(["mid"]));
        assert_eq!(doc["ancestors"], json!(["mid", "root"]));
        assert!(doc.get("union-of").is_none());

        let mut alias = CvTerm::new("either", "Either");
        alias.alias = true;
        alias.parents = vec!["a".to_string(), "b".to_string()];
        let doc = serializer.serialize(Entity::CvTerm(&alias));
        assert_eq!(doc["alias"], json!(true));
        assert_eq!(doc["union-of"], json!(["a", "b"]));
        assert!(doc.get("ancestors").is_none());
    }
}
