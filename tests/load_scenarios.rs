//! End-to-end load scenarios
//!
//! Exercises the full pipeline from a plain model document on disk: column
//! ordering, weak-entity identification, cross-domain foreign keys, CV
//! ancestor closure, and idempotence of the propagation pass.

use std::fs;
use std::path::PathBuf;

use bpmodel::digest::Sha1Hex;
use bpmodel::load::resolve;
use bpmodel::model::Usage;
use bpmodel::{load_path, ModelError};

fn write_model(dir: &tempfile::TempDir, xml: &str) -> PathBuf {
    let path = dir.path().join("bp-model.xml");
    fs::write(&path, xml).unwrap();
    path
}

const NULL_CV: &str = r#"<cv id="nullCV"><term key="-" name="not available"/></cv>"#;

// =============================================================================
// S1: plain load
// =============================================================================

#[test]
fn test_plain_load_minimal_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <collections><collection name="main" path="db.main"/></collections>
  <cvs>{NULL_CV}</cvs>
  <conceptDomain name="s" fullName="Samples">
    <concept name="sample" fullName="Sample">
      <column name="id" type="string" use="idref"/>
      <column name="name" type="string" use="required"/>
    </concept>
  </conceptDomain>
</model>"#
        ),
    );

    let model = load_path(&path).unwrap();
    assert_eq!(model.project, "demo");

    let domain = model.concept_domain("s").unwrap();
    let sample = domain.concepts().next().unwrap();
    assert_eq!(sample.columns.names(), vec!["id", "name"]);
    assert_eq!(
        sample.columns.get("id").unwrap().ctype.usage,
        Usage::IdRef
    );

    // the model digest is the SHA-1 of the file bytes, before any parsing
    let bytes = fs::read(&path).unwrap();
    assert_eq!(model.digests.model, Sha1Hex::from_bytes(&bytes));
}

#[test]
fn test_load_is_atomic_on_bad_reference() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <cvs>{NULL_CV}</cvs>
  <conceptDomain name="s" fullName="Samples">
    <concept name="sample" fullName="Sample">
      <column name="sex" type="string" cv="missing"/>
    </concept>
  </conceptDomain>
</model>"#
        ),
    );
    let err = load_path(&path).unwrap_err();
    assert!(matches!(err, ModelError::UnknownReference { kind: "CV", .. }));
}

// =============================================================================
// S2: weak-entity propagation
// =============================================================================

fn weak_entity_xml() -> String {
    format!(
        r#"<model project="demo" schemaVer="1.0">
  <collections><collection name="main" path="db.main"/></collections>
  <cvs>{NULL_CV}</cvs>
  <conceptDomain name="s" fullName="Samples">
    <concept name="donor" fullName="Donor">
      <column name="id" type="string" use="idref"/>
      <column name="sex" type="string"/>
    </concept>
    <concept name="sample" fullName="Sample" identifiedBy="donor" idPrefix="donor_">
      <column name="id" type="string" use="idref"/>
      <column name="tissue" type="string"/>
    </concept>
  </conceptDomain>
</model>"#
    )
}

#[test]
fn test_weak_entity_identification() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(&dir, &weak_entity_xml());
    let model = load_path(&path).unwrap();

    let sample = model.concept("s", "sample").unwrap();
    assert_eq!(sample.columns.names(), vec!["donor_id", "id", "tissue"]);

    let borrowed = sample.columns.get("donor_id").unwrap();
    let referred = borrowed.refers_to.as_ref().unwrap();
    assert_eq!(referred.concept, "donor");
    assert_eq!(referred.column, "id");
    // borrowed identifier columns keep their identifier role
    assert_eq!(borrowed.ctype.usage, Usage::IdRef);

    // the originals remain on the id-concept
    let donor = model.concept("s", "donor").unwrap();
    assert_eq!(donor.columns.names(), vec!["id", "sex"]);
}

// =============================================================================
// S3: cross-domain foreign keys
// =============================================================================

#[test]
fn test_cross_domain_foreign_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <cvs>{NULL_CV}</cvs>
  <conceptDomain name="x" fullName="X">
    <concept name="y" fullName="Y">
      <column name="id" type="string" use="idref"/>
    </concept>
  </conceptDomain>
  <conceptDomain name="a" fullName="A">
    <concept name="b" fullName="B">
      <column name="id" type="string" use="idref"/>
      <relatedConcept domain="x" concept="y" keyPrefix="y_" arity="0..N"/>
    </concept>
  </conceptDomain>
</model>"#
        ),
    );
    let model = load_path(&path).unwrap();

    let b = model.concept("a", "b").unwrap();
    assert_eq!(b.columns.names(), vec!["id", "y_id"]);

    let fk = b.columns.get("y_id").unwrap();
    // idref is cleared to required on the injected foreign key
    assert_eq!(fk.ctype.usage, Usage::Required);
    let referred = fk.refers_to.as_ref().unwrap();
    assert_eq!((referred.domain.as_str(), referred.concept.as_str()), ("x", "y"));

    let relation = &b.related[0];
    assert_eq!(relation.resolved, Some(("x".to_string(), "y".to_string())));
    assert_eq!(relation.fk_columns, vec!["y_id"]);
}

#[test]
fn test_unknown_related_concept_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <cvs>{NULL_CV}</cvs>
  <conceptDomain name="a" fullName="A">
    <concept name="b" fullName="B">
      <column name="id" type="string" use="idref"/>
      <relatedConcept concept="nowhere" keyPrefix="n_"/>
    </concept>
  </conceptDomain>
</model>"#
        ),
    );
    assert!(matches!(
        load_path(&path).unwrap_err(),
        ModelError::UnknownReference { .. }
    ));
}

// =============================================================================
// P5: propagation idempotence
// =============================================================================

#[test]
fn test_propagation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(&dir, &weak_entity_xml());
    let mut model = load_path(&path).unwrap();

    let before: Vec<String> = model
        .concept("s", "sample")
        .unwrap()
        .columns
        .names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    resolve::propagate_related(&mut model.domains).unwrap();

    let after = model.concept("s", "sample").unwrap();
    assert_eq!(after.columns.names(), before);
}

// =============================================================================
// S4: CV ancestor closure
// =============================================================================

#[test]
fn test_cv_ancestor_closure_and_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <cvs>
    {NULL_CV}
    <cv id="T">
      <term key="root"/>
      <term key="mid" parents="root"/>
      <term key="leaf" parents="mid"/>
    </cv>
  </cvs>
  <conceptDomain name="s" fullName="S">
    <concept name="c" fullName="C">
      <column name="t" type="string" cv="T"/>
    </concept>
  </conceptDomain>
</model>"#
        ),
    );
    let model = load_path(&path).unwrap();

    let entry = model.cvs.get("T").unwrap();
    let cv = entry.as_simple().unwrap();
    let leaf = cv.terms.get("leaf").unwrap();
    let ancestors: std::collections::HashSet<&str> =
        leaf.ancestors.iter().map(|s| s.as_str()).collect();
    assert_eq!(ancestors, ["mid", "root"].into_iter().collect());

    assert!(model.cv_validate("T", "leaf").unwrap());
    assert!(!model.cv_validate("T", "unknown").unwrap());
}

#[test]
fn test_cv_parent_cycle_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <cvs>
    {NULL_CV}
    <cv id="loop">
      <term key="a" parents="b"/>
      <term key="b" parents="a"/>
    </cv>
  </cvs>
</model>"#
        ),
    );
    assert!(matches!(
        load_path(&path).unwrap_err(),
        ModelError::CvCycle { .. }
    ));
}

// =============================================================================
// Inheritance and external CV files
// =============================================================================

#[test]
fn test_concept_type_and_extends_merge_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <cvs>{NULL_CV}</cvs>
  <conceptTypes>
    <conceptType name="dated">
      <column name="created" type="timestamp" use="required"/>
    </conceptType>
    <conceptType name="audited" parent="dated">
      <column name="author" type="string" use="required"/>
    </conceptType>
  </conceptTypes>
  <conceptDomain name="s" fullName="S">
    <concept name="base" fullName="Base" basedOn="audited">
      <column name="id" type="string" use="idref"/>
    </concept>
    <concept name="child" fullName="Child" extends="base">
      <column name="extra" type="string"/>
      <column name="author" type="string" use="desirable"/>
    </concept>
  </conceptDomain>
</model>"#
        ),
    );
    let model = load_path(&path).unwrap();

    // parent chain first, then own declarations; same-name override widens
    let child = model.concept("s", "child").unwrap();
    assert_eq!(
        child.columns.names(),
        vec!["created", "author", "id", "extra"]
    );
    assert_eq!(
        child.columns.get("author").unwrap().ctype.usage,
        Usage::Desirable
    );
}

#[test]
fn test_incompatible_override_is_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <cvs>{NULL_CV}</cvs>
  <conceptDomain name="s" fullName="S">
    <concept name="base" fullName="Base">
      <column name="v" type="string" use="optional"/>
    </concept>
    <concept name="child" fullName="Child" extends="base">
      <column name="v" type="string" use="required"/>
    </concept>
  </conceptDomain>
</model>"#
        ),
    );
    assert!(matches!(
        load_path(&path).unwrap_err(),
        ModelError::ColumnConflict { .. }
    ));
}

#[test]
fn test_external_cv_file_and_digest() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("cv")).unwrap();
    let cv_content = "brain\tBrain\nliver|hepar\tLiver\ncortex\tCortex\tbrain\n";
    fs::write(dir.path().join("cv/tissue.cv"), cv_content).unwrap();

    let path = write_model(
        &dir,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <cvs>
    {NULL_CV}
    <cv id="tissue"><file path="cv/tissue.cv"/></cv>
  </cvs>
</model>"#
        ),
    );
    let model = load_path(&path).unwrap();

    assert!(model.cv_validate("tissue", "hepar").unwrap());
    let cv = model.cvs.get("tissue").unwrap().as_simple().unwrap();
    assert_eq!(
        cv.terms.get("cortex").unwrap().ancestors,
        vec!["brain".to_string()]
    );

    // the CV stream digest covers exactly the file bytes, in order
    assert_eq!(model.digests.cv, Sha1Hex::from_bytes(cv_content.as_bytes()));
}

#[test]
fn test_uri_cv_stays_unresolved() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <cvs>
    {NULL_CV}
    <cv id="remote"><uri>http://purl.example.org/vocab</uri></cv>
  </cvs>
</model>"#
        ),
    );
    let model = load_path(&path).unwrap();
    assert!(matches!(
        model.cv_validate("remote", "x").unwrap_err(),
        ModelError::CvUnresolved { .. }
    ));
}

#[test]
fn test_null_cv_is_required() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(
        &dir,
        r#"<model project="demo" schemaVer="1.0">
  <conceptDomain name="s" fullName="S">
    <concept name="c" fullName="C">
      <column name="id" type="string" use="idref"/>
    </concept>
  </conceptDomain>
</model>"#,
    );
    assert!(load_path(&path).is_err());
    let dir2 = tempfile::tempdir().unwrap();
    let path2 = write_model(
        &dir2,
        &format!(
            r#"<model project="demo" schemaVer="1.0">
  <cvs>{NULL_CV}</cvs>
</model>"#
        ),
    );
    let model = load_path(&path2).unwrap();
    assert!(model.is_valid_null("-"));
    assert!(!model.is_valid_null("?"));
}
