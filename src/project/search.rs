//! Search-index projection
//!
//! Each collection maps to one index; each concept assigned to that
//! collection contributes a mapping whose field schema derives from the
//! concept's column set. The primitive-to-field-type mapping is fixed;
//! compound types become nested sub-documents and literal column defaults
//! become null-value defaults on the field.

use serde_json::{json, Map, Value};

use crate::model::{Column, DefaultValue, Model, Restriction};
use crate::types::Primitive;

/// One field in a concept mapping
#[derive(Debug, Clone, PartialEq)]
pub struct SearchField {
    pub name: String,
    pub field_type: &'static str,
    /// Null-value default, from a literal column default
    pub null_value: Option<String>,
    /// Sub-fields for nested (compound) fields
    pub fields: Vec<SearchField>,
}

/// Field mappings for one concept
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptMapping {
    /// Qualified concept id (`domain.name`)
    pub concept: String,
    pub fields: Vec<SearchField>,
}

/// One search index derived from a collection
#[derive(Debug, Clone, PartialEq)]
pub struct SearchIndexSpec {
    /// Index name (the collection name)
    pub index: String,
    pub mappings: Vec<ConceptMapping>,
}

/// Project a resolved model for an inverted-index search backend
pub fn project(model: &Model) -> Vec<SearchIndexSpec> {
    let mut indices = Vec::new();
    for (collection_name, _) in model.collections.iter() {
        let mut mappings = Vec::new();
        for (_, domain) in model.domains.iter() {
            for concept in domain.concepts() {
                if model.effective_collection(concept) != Some(collection_name) {
                    continue;
                }
                let fields = concept
                    .columns
                    .iter()
                    .map(|column| field_for(model, column))
                    .collect();
                mappings.push(ConceptMapping {
                    concept: concept.qualified_name(),
                    fields,
                });
            }
        }
        if !mappings.is_empty() {
            indices.push(SearchIndexSpec {
                index: collection_name.to_string(),
                mappings,
            });
        }
    }
    indices
}

fn field_for(model: &Model, column: &Column) -> SearchField {
    let null_value = match &column.ctype.default {
        Some(DefaultValue::Literal(value)) => Some(value.clone()),
        _ => None,
    };
    let fields = match (&column.ctype.primitive, &column.ctype.restriction) {
        (Primitive::Compound, Some(Restriction::Compound(name))) => model
            .compound_types
            .get(name)
            .map(|compound| {
                compound
                    .columns
                    .iter()
                    .map(|member| field_for(model, member))
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    SearchField {
        name: column.name.clone(),
        field_type: column.ctype.primitive.search_type(),
        null_value,
        fields,
    }
}

/// Serialize an index spec into its mapping document
pub fn mapping_document(spec: &SearchIndexSpec) -> Value {
    let mut mappings = Map::new();
    for mapping in &spec.mappings {
        mappings.insert(
            mapping.concept.clone(),
            json!({ "properties": properties_of(&mapping.fields) }),
        );
    }
    json!({ "mappings": Value::Object(mappings) })
}

fn properties_of(fields: &[SearchField]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        let mut doc = Map::new();
        doc.insert("type".into(), json!(field.field_type));
        if let Some(null_value) = &field.null_value {
            doc.insert("null_value".into(), json!(null_value));
        }
        if !field.fields.is_empty() {
            doc.insert("properties".into(), properties_of(&field.fields));
        }
        properties.insert(field.name.clone(), Value::Object(doc));
    }
    Value::Object(properties)
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

    fn model_with_compound() -> Model {
        let xml = r#"<model project="demo" schemaVer="1">
  <collections><collection name="main" path="db.main"/></collections>
  <cvs><cv id="nullCV"><term key="-"/></cv></cvs>
  <compoundTypes>
    <compoundType name="interval">
      <column name="start" type="integer" use="required"/>
      <column name="end" type="integer" use="required"/>
    </compoundType>
  </compoundTypes>
  <conceptDomain name="g" fullName="Genomics">
    <concept name="region" fullName="Region" collection="main">
      <column name="id" type="string" use="idref"/>
      <column name="span" type="compound" compound="interval"/>
      <column name="score" type="decimal" default="0"/>
      <column name="notes" type="text"/>
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
    fn test_field_type_mapping() {
        let model = model_with_compound();
        let indices = project(&model);
        assert_eq!(indices.len(), 1);
        assert_eq!(indices[0].index, "main");

        let mapping = &indices[0].mappings[0];
        assert_eq!(mapping.concept, "g.region");
        let by_name: std::collections::HashMap<&str, &SearchField> = mapping
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f))
            .collect();
        assert_eq!(by_name["id"].field_type, "keyword");
        assert_eq!(by_name["notes"].field_type, "text");
        assert_eq!(by_name["span"].field_type, "nested");
        assert_eq!(by_name["span"].fields.len(), 2);
        assert_eq!(by_name["span"].fields[0].field_type, "long");
        assert_eq!(by_name["score"].null_value.as_deref(), Some("0"));
    }

    #[test]
    fn test_mapping_document_shape() {
        let model = model_with_compound();
        let indices = project(&model);
        let doc = mapping_document(&indices[0]);
        let span = &doc["mappings"]["g.region"]["properties"]["span"];
        assert_eq!(span["type"], "nested");
        assert_eq!(span["properties"]["start"]["type"], "long");
    }
}
