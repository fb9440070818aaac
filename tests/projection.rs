//! Projection scenarios
//!
//! Document-store projection with oversize-CV fragmentation, the auxiliary
//! metadata indices, the serialized-model document sequence, and filename
//! pattern matching against the resolved model.

use std::fs;
use std::path::PathBuf;

use bpmodel::load_path;
use bpmodel::project::document::{self, ProjectionConfig};
use bpmodel::project::search;

fn write_model(dir: &tempfile::TempDir, xml: &str) -> PathBuf {
    let path = dir.path().join("bp-model.xml");
    fs::write(&path, xml).unwrap();
    path
}

fn big_cv_model() -> String {
    let terms: String = (0..700)
        .map(|i| format!(r#"<term key="t{i}" name="Term {i}"/>"#))
        .collect();
    format!(
        r#"<model project="demo" schemaVer="1.0" metadataCollection="db.meta">
  <collections>
    <collection name="main" path="db.main">
      <index unique="true"><key column="id"/></index>
    </collection>
  </collections>
  <cvs>
    <cv id="nullCV"><term key="-"/></cv>
    <cv id="big" name="Big CV"><description>a large vocabulary</description>{terms}</cv>
  </cvs>
  <conceptDomain name="s" fullName="Samples">
    <concept name="sample" fullName="Sample" collection="main">
      <column name="id" type="string" use="idref"/>
      <column name="kind" type="string" cv="big"/>
    </concept>
  </conceptDomain>
</model>"#
    )
}

// =============================================================================
// S6: oversize-CV fragmentation
// =============================================================================

#[test]
fn test_oversize_cv_fragmentation() {
    let dir = tempfile::tempdir().unwrap();
    let model = load_path(&write_model(&dir, &big_cv_model())).unwrap();
    let projection = document::project(&model, &ProjectionConfig::default()).unwrap();

    let segments: Vec<&serde_json::Value> = projection
        .documents
        .iter()
        .filter(|d| d["_id"] == "big" || d["segment-of"] == "big")
        .collect();
    assert_eq!(segments.len(), 3);

    // segment 0 carries identity, metadata and the segment count
    assert_eq!(segments[0]["_id"], "big");
    assert_eq!(segments[0]["description"], "a large vocabulary");
    assert_eq!(segments[0]["num-segments"], 3);

    // segments 1..N omit identity and metadata but share name and the
    // correlation key
    for segment in &segments[1..] {
        assert!(segment.get("_id").is_none());
        assert!(segment.get("description").is_none());
        assert!(segment.get("annotations").is_none());
        assert_eq!(segment["name"], "Big CV");
        assert_eq!(segment["segment-of"], "big");
    }

    let sizes: Vec<usize> = segments
        .iter()
        .map(|s| s["terms"].as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![256, 256, 188]);
    assert!(sizes.iter().all(|&s| s <= 256));
    assert_eq!(sizes.iter().sum::<usize>(), 700);
}

// =============================================================================
// Document-store projection
// =============================================================================

#[test]
fn test_collection_and_auxiliary_indices() {
    let dir = tempfile::tempdir().unwrap();
    let model = load_path(&write_model(&dir, &big_cv_model())).unwrap();
    let projection = document::project(&model, &ProjectionConfig::default()).unwrap();

    assert_eq!(projection.collections.len(), 1);
    let main = &projection.collections[0];
    assert_eq!(main.path, "db.main");
    assert_eq!(main.indices.len(), 1);
    assert!(main.indices[0].unique);
    assert_eq!(main.indices[0].keys, vec![("id".to_string(), 1)]);

    assert_eq!(projection.metadata_collection.as_deref(), Some("db.meta"));
    let aux: Vec<&str> = projection
        .auxiliary_indices
        .iter()
        .map(|i| i.keys[0].0.as_str())
        .collect();
    assert_eq!(aux, vec!["terms.term", "terms.parents", "terms.ancestors"]);
}

#[test]
fn test_metadata_document_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let model = load_path(&write_model(&dir, &big_cv_model())).unwrap();
    let projection = document::project(&model, &ProjectionConfig::default()).unwrap();

    // header first, then domain, concept and CV documents
    let header = &projection.documents[0];
    assert_eq!(header["project"], "demo");
    assert!(header["collections"]["db.main"].is_object());

    assert!(projection
        .documents
        .iter()
        .any(|d| d["_id"] == "s" && d["concepts"][0] == "s.sample"));
    assert!(projection
        .documents
        .iter()
        .any(|d| d["_id"] == "s.sample" && d["columns"]["kind"]["cv"] == "big"));
}

// =============================================================================
// Search projection and filename patterns
// =============================================================================

#[test]
fn test_search_projection_uses_collections() {
    let dir = tempfile::tempdir().unwrap();
    let model = load_path(&write_model(&dir, &big_cv_model())).unwrap();
    let indices = search::project(&model);
    assert_eq!(indices.len(), 1);
    assert_eq!(indices[0].index, "main");
    assert_eq!(indices[0].mappings[0].concept, "s.sample");
}

#[test]
fn test_filename_pattern_matching() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        r#"<model project="demo" schemaVer="1.0">
  <cvs><cv id="nullCV"><term key="-"/></cv></cvs>
  <conceptDomain name="s" fullName="Samples">
    <concept name="sample" fullName="Sample">
      <column name="id" type="string" use="idref"/>
      <column name="rep" type="integer"/>
    </concept>
  </conceptDomain>
  <filenamePattern name="sample-file" concept="s.sample">
    <literal>sample_</literal>
    <capture name="id" type="string"/>
    <literal>_r</literal>
    <capture name="replicate" type="integer" column="rep"/>
    <literal>.txt</literal>
  </filenamePattern>
  <filenamePattern name="any-sample" concept="s.sample">
    <literal>sample_</literal>
    <capture name="id" type="string"/>
  </filenamePattern>
</model>"#,
    );
    let model = load_path(&path).unwrap();

    // both matching patterns are returned, in declaration order
    let matches = model.match_concept("/data/runs/sample_ABC_r3.txt");
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].pattern, "sample-file");
    assert_eq!(matches[0].concept, ("s".to_string(), "sample".to_string()));
    assert_eq!(matches[0].mapped["rep"], serde_json::json!(3));
    assert_eq!(matches[0].extracted["replicate"], "3");
    assert_eq!(matches[1].pattern, "any-sample");

    assert!(model.match_concept("unrelated.bin").is_empty());
}
