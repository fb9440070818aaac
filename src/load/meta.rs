//! Meta-schema validation
//!
//! Validates the parsed model document against the bundled meta-schema
//! grammar: allowed elements per parent, required/optional attributes,
//! closed attribute value domains. The XSD rendition of the same grammar
//! ships in `resources/bp-schema.xsd` and is the schema member of packaged
//! archives. Successful validation does not imply semantic correctness;
//! reference resolution performs that.

use roxmltree::{Document, Node};

use crate::error::{ModelError, Result};
use crate::load::xml::node_path;

/// The bundled meta-schema, raw bytes as shipped
pub const META_SCHEMA: &str = include_str!("../../resources/bp-schema.xsd");

/// Per-element grammar rule
struct ElementRule {
    name: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
    children: &'static [&'static str],
    /// Any child elements allowed (mixed content)
    mixed: bool,
}

const PRIMITIVES: &[&str] = &[
    "string",
    "text",
    "integer",
    "decimal",
    "boolean",
    "timestamp",
    "duration",
    "compound",
];

const RULES: &[ElementRule] = &[
    ElementRule {
        name: "model",
        required: &["project", "schemaVer"],
        optional: &["metadataCollection", "nullCV"],
        children: &[
            "annotations",
            "description",
            "collections",
            "patterns",
            "cvs",
            "compoundTypes",
            "conceptTypes",
            "conceptDomain",
            "filenamePattern",
        ],
        mixed: false,
    },
    ElementRule {
        name: "annotations",
        required: &[],
        optional: &[],
        children: &["annotation"],
        mixed: false,
    },
    ElementRule {
        name: "annotation",
        required: &["name"],
        optional: &[],
        children: &[],
        mixed: true,
    },
    ElementRule {
        name: "description",
        required: &[],
        optional: &[],
        children: &[],
        mixed: true,
    },
    ElementRule {
        name: "collections",
        required: &[],
        optional: &[],
        children: &["collection"],
        mixed: false,
    },
    ElementRule {
        name: "collection",
        required: &["name", "path"],
        optional: &[],
        children: &["index"],
        mixed: false,
    },
    ElementRule {
        name: "index",
        required: &[],
        optional: &["unique"],
        children: &["key"],
        mixed: false,
    },
    ElementRule {
        name: "key",
        required: &["column"],
        optional: &["order"],
        children: &[],
        mixed: false,
    },
    ElementRule {
        name: "patterns",
        required: &[],
        optional: &[],
        children: &["pattern"],
        mixed: false,
    },
    ElementRule {
        name: "pattern",
        required: &["name"],
        optional: &[],
        children: &[],
        mixed: true,
    },
    ElementRule {
        name: "cvs",
        required: &[],
        optional: &[],
        children: &["cv", "metaCv"],
        mixed: false,
    },
    ElementRule {
        name: "cv",
        required: &["id"],
        optional: &["name"],
        children: &["description", "annotations", "term", "file", "uri"],
        mixed: false,
    },
    ElementRule {
        name: "term",
        required: &["key"],
        optional: &["name", "parents", "alt", "alias"],
        children: &[],
        mixed: false,
    },
    ElementRule {
        name: "file",
        required: &["path"],
        optional: &[],
        children: &[],
        mixed: false,
    },
    ElementRule {
        name: "uri",
        required: &[],
        optional: &[],
        children: &[],
        mixed: true,
    },
    ElementRule {
        name: "metaCv",
        required: &["id"],
        optional: &[],
        children: &["cvRef"],
        mixed: false,
    },
    ElementRule {
        name: "cvRef",
        required: &["ref"],
        optional: &[],
        children: &[],
        mixed: false,
    },
    ElementRule {
        name: "compoundTypes",
        required: &[],
        optional: &[],
        children: &["compoundType"],
        mixed: false,
    },
    ElementRule {
        name: "compoundType",
        required: &["name"],
        optional: &[],
        children: &["column"],
        mixed: false,
    },
    ElementRule {
        name: "conceptTypes",
        required: &[],
        optional: &[],
        children: &["conceptType"],
        mixed: false,
    },
    ElementRule {
        name: "conceptType",
        required: &[],
        optional: &["name", "parent", "collection"],
        children: &["conceptType", "column"],
        mixed: false,
    },
    ElementRule {
        name: "conceptDomain",
        required: &["name", "fullName"],
        optional: &["abstract"],
        children: &["description", "annotations", "concept"],
        mixed: false,
    },
    ElementRule {
        name: "concept",
        required: &["name", "fullName"],
        optional: &["basedOn", "extends", "identifiedBy", "idPrefix", "collection"],
        children: &["description", "annotations", "column", "relatedConcept"],
        mixed: false,
    },
    ElementRule {
        name: "relatedConcept",
        required: &["concept", "keyPrefix"],
        optional: &["domain", "arity"],
        children: &[],
        mixed: false,
    },
    ElementRule {
        name: "column",
        required: &["name", "type"],
        optional: &[
            "use", "default", "defaultCol", "cv", "pattern", "compound", "arraySep",
        ],
        children: &["description", "annotations"],
        mixed: false,
    },
    ElementRule {
        name: "filenamePattern",
        required: &["name", "concept"],
        optional: &[],
        children: &["literal", "capture"],
        mixed: false,
    },
    ElementRule {
        name: "literal",
        required: &[],
        optional: &[],
        children: &[],
        mixed: true,
    },
    ElementRule {
        name: "capture",
        required: &["name", "type"],
        optional: &["column"],
        children: &[],
        mixed: false,
    },
];

/// Closed value domain for an (element, attribute) pair, if any
fn value_domain(element: &str, attr: &str) -> Option<&'static [&'static str]> {
    match (element, attr) {
        ("column", "use") => Some(&["idref", "required", "desirable", "optional"]),
        ("column", "type") | ("capture", "type") => Some(PRIMITIVES),
        ("relatedConcept", "arity") => Some(&["1", "0..1", "1..N", "0..N"]),
        ("key", "order") => Some(&["+1", "-1"]),
        ("index", "unique")
        | ("conceptDomain", "abstract")
        | ("term", "alias") => Some(&["true", "false"]),
        _ => None,
    }
}

fn rule_for(name: &str) -> Option<&'static ElementRule> {
    RULES.iter().find(|r| r.name == name)
}

/// Validate the whole document tree; the first violation aborts
pub fn validate(doc: &Document) -> Result<()> {
    let root = doc.root_element();
    if root.tag_name().name() != "model" {
        return Err(ModelError::schema(
            node_path(root),
            format!("root element must be <model>, got <{}>", root.tag_name().name()),
        ));
    }
    validate_element(root)
}

fn validate_element(node: Node) -> Result<()> {
    let name = node.tag_name().name();
    let Some(rule) = rule_for(name) else {
        return Err(ModelError::schema(
            node_path(node),
            format!("unknown element <{name}>"),
        ));
    };

    for attr in rule.required {
        if node.attribute(*attr).is_none() {
            return Err(ModelError::schema(
                node_path(node),
                format!("missing attribute '{attr}'"),
            ));
        }
    }
    for attr in node.attributes() {
        let attr_name = attr.name();
        if !rule.required.contains(&attr_name) && !rule.optional.contains(&attr_name) {
            return Err(ModelError::schema(
                node_path(node),
                format!("unexpected attribute '{attr_name}'"),
            ));
        }
        if let Some(allowed) = value_domain(name, attr_name) {
            if !allowed.contains(&attr.value()) {
                return Err(ModelError::schema(
                    node_path(node),
                    format!(
                        "attribute '{}' must be one of {:?}, got '{}'",
                        attr_name,
                        allowed,
                        attr.value()
                    ),
                ));
            }
        }
    }

    // a column carries at most one restriction and at most one default
    if name == "column" {
        let restrictions = ["cv", "pattern", "compound"]
            .iter()
            .filter(|a| node.attribute(**a).is_some())
            .count();
        if restrictions > 1 {
            return Err(ModelError::schema(
                node_path(node),
                "at most one of 'cv', 'pattern', 'compound' is allowed",
            ));
        }
        if node.attribute("default").is_some() && node.attribute("defaultCol").is_some() {
            return Err(ModelError::schema(
                node_path(node),
                "'default' and 'defaultCol' are mutually exclusive",
            ));
        }
    }

    if rule.mixed {
        return Ok(());
    }
    for child in node.children().filter(|c| c.is_element()) {
        let child_name = child.tag_name().name();
        if !rule.children.contains(&child_name) {
            return Err(ModelError::schema(
                node_path(child),
                format!("element <{child_name}> not allowed inside <{name}>"),
            ));
        }
        validate_element(child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(xml: &str) -> Document {
        Document::parse(xml).unwrap()
    }

    #[test]
    fn test_minimal_model_validates() {
        let d = doc(r#"<model project="p" schemaVer="1"><collections/></model>"#);
        validate(&d).unwrap();
    }

    #[test]
    fn test_wrong_root_rejected() {
        let d = doc(r#"<thing/>"#);
        assert!(matches!(
            validate(&d).unwrap_err(),
            ModelError::SchemaViolation { .. }
        ));
    }

    #[test]
    fn test_missing_required_attribute() {
        let d = doc(r#"<model project="p"/>"#);
        let err = validate(&d).unwrap_err();
        let ModelError::SchemaViolation { message, .. } = err else {
            panic!("expected SchemaViolation");
        };
        assert!(message.contains("schemaVer"));
    }

    #[test]
    fn test_unknown_child_rejected() {
        let d = doc(r#"<model project="p" schemaVer="1"><bogus/></model>"#);
        assert!(validate(&d).is_err());
    }

    #[test]
    fn test_bad_usage_value() {
        let d = doc(
            r#"<model project="p" schemaVer="1"><compoundTypes><compoundType name="t">
                 <column name="c" type="string" use="mandatory"/>
               </compoundType></compoundTypes></model>"#,
        );
        assert!(validate(&d).is_err());
    }

    #[test]
    fn test_conflicting_restrictions() {
        let d = doc(
            r#"<model project="p" schemaVer="1"><compoundTypes><compoundType name="t">
                 <column name="c" type="string" cv="x" pattern="y"/>
               </compoundType></compoundTypes></model>"#,
        );
        assert!(validate(&d).is_err());
    }

    #[test]
    fn test_meta_schema_is_bundled() {
        assert!(META_SCHEMA.contains("bp-model"));
    }
}
