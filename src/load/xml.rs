//! XML reading helpers
//!
//! Thin wrappers over the read-only document tree: attribute access with
//! schema-violation errors carrying an element path, and parsers for the
//! annotation/description blocks shared by most elements.

use roxmltree::Node;

use crate::error::{ModelError, Result};
use crate::model::{AnnotationSet, AnnotationValue, Fragment};

/// Element path for error locations, e.g. `/model/cvs/cv[sex]`
pub fn node_path(node: Node) -> String {
    let mut parts: Vec<String> = Vec::new();
    for ancestor in node.ancestors() {
        if !ancestor.is_element() {
            continue;
        }
        let name = ancestor.tag_name().name();
        let label = ancestor
            .attribute("name")
            .or_else(|| ancestor.attribute("id"))
            .map(|n| format!("{name}[{n}]"))
            .unwrap_or_else(|| name.to_string());
        parts.push(label);
    }
    parts.reverse();
    format!("/{}", parts.join("/"))
}

/// Required attribute, `SchemaViolation` when absent
pub fn req_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name).ok_or_else(|| {
        ModelError::schema(node_path(node), format!("missing attribute '{name}'"))
    })
}

/// Element children, in document order
pub fn child_elements<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(|c| c.is_element())
}

/// First child element with the given tag
pub fn find_child<'a, 'i>(node: Node<'a, 'i>, tag: &str) -> Option<Node<'a, 'i>> {
    child_elements(node).find(|c| c.tag_name().name() == tag)
}

/// Concatenated text content of an element (markup descendants included)
pub fn text_of(node: Node) -> String {
    let mut out = String::new();
    for descendant in node.descendants() {
        if descendant.is_text() {
            if let Some(t) = descendant.text() {
                out.push_str(t);
            }
        }
    }
    out
}

/// Parse an `<annotations>` block, preserving declaration order
pub fn parse_annotations(node: Node) -> Result<AnnotationSet> {
    let mut set = AnnotationSet::new();
    let Some(block) = find_child(node, "annotations") else {
        return Ok(set);
    };
    for annotation in child_elements(block) {
        let name = req_attr(annotation, "name")?;
        set.push(name, parse_annotation_value(annotation));
    }
    Ok(set)
}

/// Annotation value: plain text, or fragments when markup children exist
pub fn parse_annotation_value(node: Node) -> AnnotationValue {
    let has_markup = node.children().any(|c| c.is_element());
    if !has_markup {
        return AnnotationValue::Text(node.text().unwrap_or("").trim().to_string());
    }
    let mut fragments = Vec::new();
    for child in node.children() {
        if child.is_text() {
            let text = child.text().unwrap_or("");
            if !text.trim().is_empty() {
                fragments.push(Fragment::Text(text.to_string()));
            }
        } else if child.is_element() {
            fragments.push(Fragment::Markup {
                tag: child.tag_name().name().to_string(),
                text: text_of(child),
            });
        }
    }
    AnnotationValue::Fragments(fragments)
}

/// Parse the optional `<description>` child as trimmed text
pub fn parse_description(node: Node) -> Option<String> {
    find_child(node, "description").map(|d| text_of(d).trim().to_string())
}

/// Parse a boolean attribute, defaulting when absent
pub fn bool_attr(node: Node, name: &str, default: bool) -> Result<bool> {
    match node.attribute(name) {
        None => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(ModelError::schema(
            node_path(node),
            format!("attribute '{name}' must be true or false, got '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_path_labels() {
        let doc = roxmltree::Document::parse(
            r#"<model project="p" schemaVer="1"><cvs><cv id="sex"/></cvs></model>"#,
        )
        .unwrap();
        let cv = doc.descendants().find(|n| n.has_tag_name("cv")).unwrap();
        assert_eq!(node_path(cv), "/model/cvs/cv[sex]");
    }

    #[test]
    fn test_annotation_fragments() {
        let doc = roxmltree::Document::parse(
            r#"<x><annotations><annotation name="note">see <b>this</b> term</annotation></annotations></x>"#,
        )
        .unwrap();
        let set = parse_annotations(doc.root_element()).unwrap();
        let value = set.get("note").unwrap();
        assert_eq!(value.as_text(), "see this term");
        assert!(matches!(value, AnnotationValue::Fragments(f) if f.len() == 3));
    }
}
