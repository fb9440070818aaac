//! Reference resolution
//!
//! Runs after parsing, in dependency order: concept-type chains first, then
//! concept domains (column-set merging), then the foreign-key propagation
//! pass over every concept's related-concepts, and finally the whole-model
//! invariant check. All resolvers mutate the freshly parsed registries;
//! after the loader returns, nothing mutates the model again.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{ModelError, Result};
use crate::model::{
    Column, ColumnRef, ColumnSet, Concept, ConceptDomain, ConceptType, ConceptTypeParent, Model,
    Registry, Restriction, Usage,
};

/// Compute the root-to-leaf merged column set of a concept type.
///
/// Named parents must be previously declared (their merged set is already
/// computed); anonymous parents are resolved recursively in place.
pub fn resolve_concept_type(
    ct: &mut ConceptType,
    registry: &Registry<ConceptType>,
) -> Result<()> {
    let label = ct.label().to_string();
    let mut merged = ColumnSet::new();
    match &mut ct.parent {
        None => {}
        Some(ConceptTypeParent::Named(parent_name)) => {
            let parent = registry
                .get(parent_name)
                .ok_or_else(|| ModelError::UnknownReference {
                    kind: "concept type",
                    name: parent_name.clone(),
                    referrer: label.clone(),
                })?;
            merged.merge_all(&parent.merged, &label)?;
        }
        Some(ConceptTypeParent::Anonymous(parent)) => {
            resolve_concept_type(parent, registry)?;
            merged.merge_all(&parent.merged, &label)?;
        }
    }
    merged.merge_all(&ct.declared, &label)?;
    ct.merged = merged;
    Ok(())
}

/// Resolve every concept of every domain, in declaration order.
///
/// Merge order per concept: based-on concept types, `extends` parent's fully
/// merged set, `identifiedBy` identifier columns under the id prefix, then
/// locally declared columns. Conflicts beyond the compatible-override rule
/// are errors.
pub fn resolve_domains(
    domains: &mut Registry<ConceptDomain>,
    concept_types: &Registry<ConceptType>,
) -> Result<()> {
    let domain_names: Vec<String> = domains.names().to_vec();
    for domain_name in domain_names {
        let domain = domains.get_mut(&domain_name).expect("domain just listed");
        let concept_names: Vec<String> = domain.concept_names().to_vec();
        let mut resolved: HashSet<String> = HashSet::new();
        for concept_name in concept_names {
            let merged = build_concept_columns(domain, &concept_name, concept_types, &resolved)?;
            let concept = domain.get_mut(&concept_name).expect("concept just listed");
            concept.columns = merged;
            resolved.insert(concept_name);
        }
        debug!(domain = %domain_name, "resolved concept domain");
    }
    Ok(())
}

fn build_concept_columns(
    domain: &ConceptDomain,
    concept_name: &str,
    concept_types: &Registry<ConceptType>,
    resolved: &HashSet<String>,
) -> Result<ColumnSet> {
    let concept = domain.get(concept_name).expect("concept exists");
    let owner = concept.qualified_name();
    let mut merged = ColumnSet::new();

    // 1. based-on concept types, declaration order
    for type_name in &concept.based_on {
        let ct = concept_types
            .get(type_name)
            .ok_or_else(|| ModelError::UnknownReference {
                kind: "concept type",
                name: type_name.clone(),
                referrer: owner.clone(),
            })?;
        merged.merge_all(&ct.merged, &owner)?;
    }

    // 2. in-domain inheritance parent (already resolved: declared earlier)
    if let Some(parent_name) = &concept.extends {
        let parent = lookup_resolved(domain, parent_name, &owner, resolved)?;
        merged.merge_all(&parent.columns, &owner)?;
    }

    // 3. weak-entity identification: borrow the id-concept's identifier
    // columns under the id prefix, keeping their identifier role
    if let Some(id_name) = &concept.identified_by {
        let id_concept = lookup_resolved(domain, id_name, &owner, resolved)?;
        let prefix = concept.id_prefix.as_deref().unwrap_or_default();
        for id_column in id_concept.columns.identifiers() {
            let mut injected = id_column.clone();
            injected.name = format!("{prefix}{}", id_column.name);
            injected.refers_to = Some(ColumnRef {
                domain: domain.name.clone(),
                concept: id_concept.name.clone(),
                column: id_column.name.clone(),
            });
            merged.merge(injected, &owner)?;
        }
    }

    // 4. locally declared columns
    merged.merge_all(&concept.declared, &owner)?;
    Ok(merged)
}

/// Look up an earlier-declared concept in the same domain whose column set
/// is already resolved; inheritance chains must point backwards
fn lookup_resolved<'a>(
    domain: &'a ConceptDomain,
    name: &str,
    referrer: &str,
    resolved: &HashSet<String>,
) -> Result<&'a Concept> {
    match domain.get(name) {
        Some(target) if resolved.contains(name) => Ok(target),
        _ => Err(ModelError::UnknownReference {
            kind: "concept",
            name: format!("{}.{}", domain.name, name),
            referrer: referrer.to_string(),
        }),
    }
}

/// Foreign-key propagation: a second pass over every concept's
/// related-concepts, run after all domains are resolved.
///
/// For each related-concept the target's identifier columns are copied onto
/// the source under the relation's key prefix, with usage cleared to
/// `required` and a back-reference recorded. Already-resolved entries are
/// skipped, which makes the pass idempotent.
pub fn propagate_related(domains: &mut Registry<ConceptDomain>) -> Result<()> {
    let mut work: Vec<(String, String)> = Vec::new();
    for (domain_name, domain) in domains.iter() {
        for concept in domain.concepts() {
            if !concept.related.is_empty() {
                work.push((domain_name.to_string(), concept.name.clone()));
            }
        }
    }

    for (domain_name, concept_name) in work {
        let relation_count = domains
            .get(&domain_name)
            .and_then(|d| d.get(&concept_name))
            .map(|c| c.related.len())
            .unwrap_or(0);

        for rel_idx in 0..relation_count {
            // read phase: resolve the target and copy its identifier columns
            let (target_domain, target_concept, key_prefix, id_columns) = {
                let source = domains
                    .get(&domain_name)
                    .and_then(|d| d.get(&concept_name))
                    .expect("source concept listed");
                let relation = &source.related[rel_idx];
                if relation.resolved.is_some() {
                    continue;
                }
                let target_domain = relation
                    .domain
                    .clone()
                    .unwrap_or_else(|| domain_name.clone());
                let referrer = source.qualified_name();
                let target = domains
                    .get(&target_domain)
                    .and_then(|d| d.get(&relation.concept))
                    .ok_or_else(|| ModelError::UnknownReference {
                        kind: "concept",
                        name: format!("{}.{}", target_domain, relation.concept),
                        referrer,
                    })?;
                let id_columns: Vec<Column> =
                    target.columns.identifiers().cloned().collect();
                (
                    target_domain,
                    relation.concept.clone(),
                    relation.key_prefix.clone(),
                    id_columns,
                )
            };

            // write phase: inject the foreign-key columns on the source
            let domain = domains.get_mut(&domain_name).expect("domain listed");
            let source = domain.get_mut(&concept_name).expect("concept listed");
            let mut fk_names = Vec::with_capacity(id_columns.len());
            for id_column in &id_columns {
                let fk_name = format!("{key_prefix}{}", id_column.name);
                if source.columns.contains(&fk_name) {
                    return Err(ModelError::ColumnConflict {
                        concept: source.qualified_name(),
                        column: fk_name,
                        message: "foreign-key column collides with an existing column"
                            .to_string(),
                    });
                }
                let mut fk = id_column.clone();
                fk.name = fk_name.clone();
                fk.ctype.usage = Usage::Required;
                fk.refers_to = Some(ColumnRef {
                    domain: target_domain.clone(),
                    concept: target_concept.clone(),
                    column: id_column.name.clone(),
                });
                source.columns.insert(fk)?;
                fk_names.push(fk_name);
            }
            let relation = &mut source.related[rel_idx];
            relation.resolved = Some((target_domain, target_concept));
            relation.fk_columns = fk_names;
        }
    }
    debug!("foreign-key propagation complete");
    Ok(())
}

/// Whole-model invariant check, run on the assembled model before the
/// loader returns it
pub fn check_invariants(model: &Model) -> Result<()> {
    // restriction references resolve (I5), sibling defaults exist, and
    // identifier array ladders agree with their referred column (I4)
    let mut column_sets: Vec<(String, &ColumnSet)> = Vec::new();
    for (name, compound) in model.compound_types.iter() {
        column_sets.push((format!("compound type {name}"), &compound.columns));
    }
    for (name, ct) in model.concept_types.iter() {
        column_sets.push((format!("concept type {name}"), &ct.merged));
    }
    for (_, domain) in model.domains.iter() {
        for concept in domain.concepts() {
            column_sets.push((concept.qualified_name(), &concept.columns));
        }
    }

    for (owner, set) in &column_sets {
        for column in set.iter() {
            match &column.ctype.restriction {
                Some(Restriction::Cv(id)) if !model.cvs.contains(id) => {
                    return Err(ModelError::UnknownReference {
                        kind: "CV",
                        name: id.clone(),
                        referrer: format!("{owner}.{}", column.name),
                    });
                }
                Some(Restriction::Pattern(name)) if !model.patterns.contains(name) => {
                    return Err(ModelError::UnknownReference {
                        kind: "pattern",
                        name: name.clone(),
                        referrer: format!("{owner}.{}", column.name),
                    });
                }
                Some(Restriction::Compound(name)) if !model.compound_types.contains(name) => {
                    return Err(ModelError::UnknownReference {
                        kind: "compound type",
                        name: name.clone(),
                        referrer: format!("{owner}.{}", column.name),
                    });
                }
                _ => {}
            }
            if let Some(crate::model::DefaultValue::Column(sibling)) = &column.ctype.default {
                if !set.contains(sibling) {
                    return Err(ModelError::UnknownReference {
                        kind: "column",
                        name: sibling.clone(),
                        referrer: format!("{owner}.{}", column.name),
                    });
                }
            }
            if column.ctype.usage == Usage::IdRef && column.ctype.array_depth() > 0 {
                if let Some(referred) = &column.refers_to {
                    let ok = model
                        .concept(&referred.domain, &referred.concept)
                        .and_then(|c| c.columns.get(&referred.column))
                        .map(|c| c.ctype.array_depth() > 0)
                        .unwrap_or(false);
                    if !ok {
                        return Err(ModelError::ColumnConflict {
                            concept: owner.clone(),
                            column: column.name.clone(),
                            message: "identifier array ladder deeper than referred column"
                                .to_string(),
                        });
                    }
                }
            }
        }
    }

    // collection links resolve and index keys name existing columns (I2)
    for (_, domain) in model.domains.iter() {
        for concept in domain.concepts() {
            if let Some(collection) = &concept.collection {
                if !model.collections.contains(collection) {
                    return Err(ModelError::UnknownReference {
                        kind: "collection",
                        name: collection.clone(),
                        referrer: concept.qualified_name(),
                    });
                }
            }
        }
    }
    for (name, collection) in model.collections.iter() {
        let assigned: Vec<&Concept> = model
            .domains
            .iter()
            .flat_map(|(_, d)| d.concepts())
            .filter(|c| model.effective_collection(c) == Some(name))
            .collect();
        if assigned.is_empty() {
            continue;
        }
        for index in &collection.indices {
            for (key_column, _) in &index.keys {
                if !assigned.iter().any(|c| c.columns.contains(key_column)) {
                    return Err(ModelError::UnknownReference {
                        kind: "column",
                        name: key_column.clone(),
                        referrer: format!("index on collection {name}"),
                    });
                }
            }
        }
    }

    // filename patterns point at real concepts and columns (I2)
    for (name, pattern) in model.filename_patterns.iter() {
        let (domain, concept_name) = &pattern.concept;
        let concept =
            model
                .concept(domain, concept_name)
                .ok_or_else(|| ModelError::UnknownReference {
                    kind: "concept",
                    name: format!("{domain}.{concept_name}"),
                    referrer: format!("filename pattern {name}"),
                })?;
        for capture in pattern.captures() {
            if !concept.columns.contains(capture.target_column()) {
                return Err(ModelError::UnknownReference {
                    kind: "column",
                    name: capture.target_column().to_string(),
                    referrer: format!("filename pattern {name}"),
                });
            }
        }
    }

    // the null CV is defined and non-empty (I7)
    match model.cvs.get(&model.null_cv) {
        Some(entry) if entry.term_count(&model.cvs) > 0 => {}
        Some(_) => {
            return Err(ModelError::schema(
                format!("/model/cvs/cv[{}]", model.null_cv),
                "null-value CV is empty",
            ));
        }
        None => {
            return Err(ModelError::UnknownReference {
                kind: "CV",
                name: model.null_cv.clone(),
                referrer: "null-value slot".to_string(),
            });
        }
    }

    Ok(())
}
