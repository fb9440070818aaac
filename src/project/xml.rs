//! Model document emission
//!
//! Re-serializes a resolved model back to its XML document form, used when
//! emitting a packaged archive. Only declared structure is written: merged
//! column sets and injected foreign-key columns are recomputed on the next
//! load, so a round trip reproduces the same resolved model.

use std::collections::HashMap;

use crate::cv::CvEntry;
use crate::model::{
    AnnotationSet, AnnotationValue, Column, ColumnSet, ConceptType, ConceptTypeParent,
    DefaultValue, Fragment, Model, Restriction, Usage,
};
use crate::pattern::PatternPart;

/// Serialize the model document, rewriting external CV paths through
/// `cv_paths` (CV id to new path)
pub fn model_to_xml(model: &Model, cv_paths: &HashMap<String, String>) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<model project=\"{}\" schemaVer=\"{}\"",
        esc(&model.project),
        esc(&model.schema_ver)
    ));
    if let Some(collection) = &model.metadata_collection {
        out.push_str(&format!(" metadataCollection=\"{}\"", esc(collection)));
    }
    if model.null_cv != crate::load::DEFAULT_NULL_CV {
        out.push_str(&format!(" nullCV=\"{}\"", esc(&model.null_cv)));
    }
    out.push_str(">\n");

    write_annotations(&mut out, &model.annotations, 1);
    write_description(&mut out, model.description.as_deref(), 1);

    if !model.collections.is_empty() {
        out.push_str("  <collections>\n");
        for (_, collection) in model.collections.iter() {
            out.push_str(&format!(
                "    <collection name=\"{}\" path=\"{}\"",
                esc(&collection.name),
                esc(&collection.path)
            ));
            if collection.indices.is_empty() {
                out.push_str("/>\n");
                continue;
            }
            out.push_str(">\n");
            for index in &collection.indices {
                if index.unique {
                    out.push_str("      <index unique=\"true\">\n");
                } else {
                    out.push_str("      <index>\n");
                }
                for (column, order) in &index.keys {
                    if *order < 0 {
                        out.push_str(&format!(
                            "        <key column=\"{}\" order=\"-1\"/>\n",
                            esc(column)
                        ));
                    } else {
                        out.push_str(&format!("        <key column=\"{}\"/>\n", esc(column)));
                    }
                }
                out.push_str("      </index>\n");
            }
            out.push_str("    </collection>\n");
        }
        out.push_str("  </collections>\n");
    }

    if !model.patterns.is_empty() {
        out.push_str("  <patterns>\n");
        for name in model.patterns.names() {
            let source = model.patterns.get(name).map(|r| r.as_str()).unwrap_or("");
            out.push_str(&format!(
                "    <pattern name=\"{}\">{}</pattern>\n",
                esc(name),
                esc(source)
            ));
        }
        out.push_str("  </patterns>\n");
    }

    if !model.cvs.is_empty() {
        out.push_str("  <cvs>\n");
        for (id, entry) in model.cvs.iter() {
            match entry {
                CvEntry::Simple(cv) => {
                    out.push_str(&format!("    <cv id=\"{}\"", esc(&cv.id)));
                    if let Some(name) = &cv.name {
                        out.push_str(&format!(" name=\"{}\"", esc(name)));
                    }
                    out.push_str(">\n");
                    write_description(&mut out, cv.description.as_deref(), 3);
                    write_annotations(&mut out, &cv.annotations, 3);
                    if let Some(original) = &cv.file {
                        let path = cv_paths
                            .get(id)
                            .map(String::as_str)
                            .unwrap_or(original.as_str());
                        out.push_str(&format!("      <file path=\"{}\"/>\n", esc(path)));
                    } else {
                        for term in cv.terms.iter() {
                            out.push_str(&format!("      <term key=\"{}\"", esc(&term.key)));
                            if term.name != term.key {
                                out.push_str(&format!(" name=\"{}\"", esc(&term.name)));
                            }
                            if !term.alt_keys.is_empty() {
                                out.push_str(&format!(
                                    " alt=\"{}\"",
                                    esc(&term.alt_keys.join(","))
                                ));
                            }
                            if !term.parents.is_empty() {
                                out.push_str(&format!(
                                    " parents=\"{}\"",
                                    esc(&term.parents.join(","))
                                ));
                            }
                            if term.alias {
                                out.push_str(" alias=\"true\"");
                            }
                            out.push_str("/>\n");
                        }
                    }
                    for uri in &cv.uris {
                        out.push_str(&format!("      <uri>{}</uri>\n", esc(uri)));
                    }
                    out.push_str("    </cv>\n");
                }
                CvEntry::Meta(meta) => {
                    out.push_str(&format!("    <metaCv id=\"{}\">\n", esc(&meta.id)));
                    for member in &meta.members {
                        out.push_str(&format!("      <cvRef ref=\"{}\"/>\n", esc(member)));
                    }
                    out.push_str("    </metaCv>\n");
                }
            }
        }
        out.push_str("  </cvs>\n");
    }

    if !model.compound_types.is_empty() {
        out.push_str("  <compoundTypes>\n");
        for (_, compound) in model.compound_types.iter() {
            out.push_str(&format!(
                "    <compoundType name=\"{}\">\n",
                esc(&compound.name)
            ));
            write_columns(&mut out, &compound.columns, 3);
            out.push_str("    </compoundType>\n");
        }
        out.push_str("  </compoundTypes>\n");
    }

    if !model.concept_types.is_empty() {
        out.push_str("  <conceptTypes>\n");
        for (_, ct) in model.concept_types.iter() {
            write_concept_type(&mut out, ct, 2);
        }
        out.push_str("  </conceptTypes>\n");
    }

    for (_, domain) in model.domains.iter() {
        out.push_str(&format!(
            "  <conceptDomain name=\"{}\" fullName=\"{}\"",
            esc(&domain.name),
            esc(&domain.full_name)
        ));
        if domain.is_abstract {
            out.push_str(" abstract=\"true\"");
        }
        out.push_str(">\n");
        write_description(&mut out, domain.description.as_deref(), 2);
        write_annotations(&mut out, &domain.annotations, 2);
        for concept in domain.concepts() {
            out.push_str(&format!(
                "    <concept name=\"{}\" fullName=\"{}\"",
                esc(&concept.name),
                esc(&concept.full_name)
            ));
            if !concept.based_on.is_empty() {
                out.push_str(&format!(" basedOn=\"{}\"", esc(&concept.based_on.join(","))));
            }
            if let Some(extends) = &concept.extends {
                out.push_str(&format!(" extends=\"{}\"", esc(extends)));
            }
            if let Some(identified_by) = &concept.identified_by {
                out.push_str(&format!(" identifiedBy=\"{}\"", esc(identified_by)));
            }
            if let Some(prefix) = &concept.id_prefix {
                out.push_str(&format!(" idPrefix=\"{}\"", esc(prefix)));
            }
            if let Some(collection) = &concept.collection {
                out.push_str(&format!(" collection=\"{}\"", esc(collection)));
            }
            out.push_str(">\n");
            write_description(&mut out, concept.description.as_deref(), 3);
            write_annotations(&mut out, &concept.annotations, 3);
            write_columns(&mut out, &concept.declared, 3);
            for relation in &concept.related {
                out.push_str("      <relatedConcept");
                if let Some(domain) = &relation.domain {
                    out.push_str(&format!(" domain=\"{}\"", esc(domain)));
                }
                out.push_str(&format!(
                    " concept=\"{}\" keyPrefix=\"{}\"",
                    esc(&relation.concept),
                    esc(&relation.key_prefix)
                ));
                if relation.arity != crate::model::Arity::One {
                    out.push_str(&format!(" arity=\"{}\"", relation.arity.tag()));
                }
                out.push_str("/>\n");
            }
            out.push_str("    </concept>\n");
        }
        out.push_str("  </conceptDomain>\n");
    }

    for (_, pattern) in model.filename_patterns.iter() {
        out.push_str(&format!(
            "  <filenamePattern name=\"{}\" concept=\"{}.{}\">\n",
            esc(&pattern.name),
            esc(&pattern.concept.0),
            esc(&pattern.concept.1)
        ));
        for part in &pattern.parts {
            match part {
                PatternPart::Literal(text) => {
                    out.push_str(&format!("    <literal>{}</literal>\n", esc(text)));
                }
                PatternPart::Capture(spec) => {
                    out.push_str(&format!(
                        "    <capture name=\"{}\" type=\"{}\"",
                        esc(&spec.name),
                        spec.primitive.tag()
                    ));
                    if let Some(column) = &spec.column {
                        out.push_str(&format!(" column=\"{}\"", esc(column)));
                    }
                    out.push_str("/>\n");
                }
            }
        }
        out.push_str("  </filenamePattern>\n");
    }

    out.push_str("</model>\n");
    out
}

fn write_concept_type(out: &mut String, ct: &ConceptType, depth: usize) {
    let pad = "  ".repeat(depth);
    out.push_str(&format!("{pad}<conceptType"));
    if let Some(name) = &ct.name {
        out.push_str(&format!(" name=\"{}\"", esc(name)));
    }
    if let Some(ConceptTypeParent::Named(parent)) = &ct.parent {
        out.push_str(&format!(" parent=\"{}\"", esc(parent)));
    }
    if let Some(collection) = &ct.collection {
        out.push_str(&format!(" collection=\"{}\"", esc(collection)));
    }
    out.push_str(">\n");
    if let Some(ConceptTypeParent::Anonymous(parent)) = &ct.parent {
        write_concept_type(out, parent, depth + 1);
    }
    write_columns(out, &ct.declared, depth + 1);
    out.push_str(&format!("{pad}</conceptType>\n"));
}

fn write_columns(out: &mut String, columns: &ColumnSet, depth: usize) {
    for column in columns.iter() {
        write_column(out, column, depth);
    }
}

fn write_column(out: &mut String, column: &Column, depth: usize) {
    let pad = "  ".repeat(depth);
    out.push_str(&format!(
        "{pad}<column name=\"{}\" type=\"{}\"",
        esc(&column.name),
        column.ctype.primitive.tag()
    ));
    if column.ctype.usage != Usage::Optional {
        out.push_str(&format!(" use=\"{}\"", column.ctype.usage.tag()));
    }
    match &column.ctype.default {
        Some(DefaultValue::Literal(value)) => {
            out.push_str(&format!(" default=\"{}\"", esc(value)));
        }
        Some(DefaultValue::Column(sibling)) => {
            out.push_str(&format!(" defaultCol=\"{}\"", esc(sibling)));
        }
        None => {}
    }
    match &column.ctype.restriction {
        Some(Restriction::Cv(id)) => out.push_str(&format!(" cv=\"{}\"", esc(id))),
        Some(Restriction::Pattern(name)) => {
            out.push_str(&format!(" pattern=\"{}\"", esc(name)));
        }
        Some(Restriction::Compound(name)) => {
            out.push_str(&format!(" compound=\"{}\"", esc(name)));
        }
        None => {}
    }
    if !column.ctype.separators.is_empty() {
        let seps: String = column.ctype.separators.iter().collect();
        out.push_str(&format!(" arraySep=\"{}\"", esc(&seps)));
    }
    if column.description.is_none() && column.annotations.is_empty() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    write_description(out, column.description.as_deref(), depth + 1);
    write_annotations(out, &column.annotations, depth + 1);
    out.push_str(&format!("{pad}</column>\n"));
}

fn write_description(out: &mut String, description: Option<&str>, depth: usize) {
    if let Some(text) = description {
        let pad = "  ".repeat(depth);
        out.push_str(&format!("{pad}<description>{}</description>\n", esc(text)));
    }
}

fn write_annotations(out: &mut String, annotations: &AnnotationSet, depth: usize) {
    if annotations.is_empty() {
        return;
    }
    let pad = "  ".repeat(depth);
    out.push_str(&format!("{pad}<annotations>\n"));
    for (name, value) in annotations.iter() {
        out.push_str(&format!("{pad}  <annotation name=\"{}\">", esc(name)));
        match value {
            AnnotationValue::Text(text) => out.push_str(&esc(text)),
            AnnotationValue::Fragments(fragments) => {
                for fragment in fragments {
                    match fragment {
                        Fragment::Text(text) => out.push_str(&esc(text)),
                        Fragment::Markup { tag, text } => {
                            out.push_str(&format!("<{tag}>{}</{tag}>", esc(text)));
                        }
                    }
                }
            }
        }
        out.push_str("</annotation>\n");
    }
    out.push_str(&format!("{pad}</annotations>\n"));
}

/// Escape text for XML content and attribute values
fn esc(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaping() {
        assert_eq!(esc("a<b&c\"d"), "a&lt;b&amp;c&quot;d");
    }
}
