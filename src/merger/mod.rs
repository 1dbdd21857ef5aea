//! Merges a newly inferred schema into a previously existing one: features
//! propagate from supertypes, similar types pair up and combine, references
//! are rewritten through the resulting name mapping, and the sub/supertype
//! DAG is repaired (and extended with newly-implied relations) at the end.

use indexmap::IndexMap;
use indexmap::IndexSet;
use itertools::Itertools;
use tracing::info;

use crate::graph::DataType;
use crate::types::propagate_labels_and_properties;
use crate::types::GraphType;
use crate::types::Type;

#[cfg_attr(feature = "snapshot_tracing", tracing::instrument(skip_all))]
pub fn merge_schemas(original: &GraphType, new: &GraphType, threshold: f64) -> GraphType {
    let mut new_node_types = new.node_types.clone();
    let mut new_edge_types = new.edge_types.clone();
    propagate_supertype_features(&mut new_node_types, &mut new_edge_types);

    let (mut node_types, node_mapping) =
        merge_type_set(&original.node_types, &new_node_types, threshold);
    let (mut edge_types, edge_mapping) =
        merge_type_set(&original.edge_types, &new_edge_types, threshold);

    rewrite_references(&mut node_types, &node_mapping);
    rewrite_references(&mut edge_types, &edge_mapping);
    for edge in edge_types.values_mut() {
        edge.start_node_types = edge
            .start_node_types
            .iter()
            .map(|n| node_mapping.get(n).cloned().unwrap_or_else(|| n.clone()))
            .collect();
        edge.end_node_types = edge
            .end_node_types
            .iter()
            .map(|n| node_mapping.get(n).cloned().unwrap_or_else(|| n.clone()))
            .collect();
    }

    let node_types_snapshot = node_types.clone();
    check_and_update_supertype_relations(&mut node_types, &node_types_snapshot);
    check_and_update_supertype_relations(&mut edge_types, &node_types_snapshot);

    let snapshot_nodes = node_types.clone();
    for t in node_types.values_mut() {
        t.remove_inherited_features(&snapshot_nodes);
    }
    let snapshot_edges = edge_types.clone();
    for t in edge_types.values_mut() {
        t.remove_inherited_features(&snapshot_edges);
    }

    info!(
        node_types = node_types.len(),
        edge_types = edge_types.len(),
        "merged schemas"
    );

    GraphType {
        name: original.name.clone(),
        loose: original.loose,
        node_types,
        edge_types,
    }
}

/// Union each new type's features (and, for edges, endpoint sets) with its
/// transitive supertypes, then expand every endpoint name to include its
/// own transitive subtypes so endpoint compatibility also matches more
/// specific node types.
fn propagate_supertype_features(
    node_types: &mut IndexMap<String, Type>,
    edge_types: &mut IndexMap<String, Type>,
) {
    propagate_labels_and_properties(node_types);
    propagate_labels_and_properties(edge_types);

    let snapshot = edge_types.clone();
    for t in edge_types.values_mut() {
        for supertype_name in t.get_all_supertypes(&snapshot) {
            if let Some(s) = snapshot.get(&supertype_name) {
                t.start_node_types.extend(s.start_node_types.iter().cloned());
                t.end_node_types.extend(s.end_node_types.iter().cloned());
            }
        }
    }
    for edge in edge_types.values_mut() {
        edge.start_node_types = expand_with_subtypes(&edge.start_node_types, node_types);
        edge.end_node_types = expand_with_subtypes(&edge.end_node_types, node_types);
    }
}

fn expand_with_subtypes(
    names: &IndexSet<String>,
    node_types: &IndexMap<String, Type>,
) -> IndexSet<String> {
    let mut expanded = names.clone();
    for name in names {
        if let Some(t) = node_types.get(name) {
            expanded.extend(t.get_all_subtypes(node_types));
        }
    }
    expanded
}

/// Pair each non-abstract original type with its most similar non-abstract
/// new type (by the unweighted Jaccard formula); merge matched pairs,
/// pass unmatched originals through, and add unmatched new types under a
/// `_new`-suffixed name. Returns the merged set plus a name mapping from
/// every original input name (both sides) to its name in the result.
fn merge_type_set(
    original: &IndexMap<String, Type>,
    new: &IndexMap<String, Type>,
    threshold: f64,
) -> (IndexMap<String, Type>, IndexMap<String, String>) {
    let mut mapping = IndexMap::new();
    let mut merged = IndexMap::new();
    let mut matched_new: IndexSet<String> = IndexSet::new();

    for (name, o) in original {
        if o.is_abstract {
            merged.insert(name.clone(), o.clone());
            mapping.insert(name.clone(), name.clone());
            continue;
        }
        let best = new
            .values()
            .filter(|n| !n.is_abstract && !matched_new.contains(&n.name))
            .map(|n| (n, o.unweighted_jaccard_similarity(n)))
            .filter(|(_, sim)| *sim > threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((n, _)) => {
                matched_new.insert(n.name.clone());
                let combined = merge_two_types(o, n);
                mapping.insert(name.clone(), combined.name.clone());
                mapping.insert(n.name.clone(), combined.name.clone());
                merged.insert(combined.name.clone(), combined);
            }
            None => {
                mapping.insert(name.clone(), name.clone());
                merged.insert(name.clone(), o.clone());
            }
        }
    }

    for (name, n) in new {
        if matched_new.contains(name) {
            continue;
        }
        let new_name = format!("{name}_new");
        mapping.insert(name.clone(), new_name.clone());
        let mut t = n.clone();
        t.name = new_name.clone();
        merged.insert(new_name, t);
    }

    (merged, mapping)
}

/// Combine an original and a new type under the original's name: a feature
/// present on both sides stays mandatory; a feature present on only one
/// side becomes optional.
fn merge_two_types(original: &Type, new: &Type) -> Type {
    let mut combined = Type::new(original.name.clone(), original.kind);
    combined.is_abstract = original.is_abstract || new.is_abstract;
    combined.labels = original.labels.intersection(&new.labels).cloned().collect();
    combined.optional_labels = original
        .optional_labels
        .union(&new.optional_labels)
        .cloned()
        .chain(original.labels.symmetric_difference(&new.labels).cloned())
        .filter(|l| !combined.labels.contains(l))
        .collect();

    combined.properties = original
        .properties
        .iter()
        .filter_map(|(k, v)| new.properties.get(k).filter(|nv| *nv == v).map(|_| (k.clone(), *v)))
        .collect();
    combined.optional_properties = merge_optional_properties(original, new, &combined.properties);

    combined.supertypes = original.supertypes.union(&new.supertypes).cloned().collect();
    combined.subtypes = original.subtypes.union(&new.subtypes).cloned().collect();
    combined.members = original.members.union(&new.members).cloned().collect();
    combined.start_node_types = original
        .start_node_types
        .union(&new.start_node_types)
        .cloned()
        .collect();
    combined.end_node_types = original
        .end_node_types
        .union(&new.end_node_types)
        .cloned()
        .collect();
    combined.open_labels = original.open_labels || new.open_labels;
    combined.open_properties = original.open_properties || new.open_properties;
    combined
}

fn merge_optional_properties(
    original: &Type,
    new: &Type,
    mandatory: &IndexMap<String, DataType>,
) -> IndexMap<String, DataType> {
    let mut optional: IndexMap<String, DataType> = original
        .optional_properties
        .iter()
        .chain(new.optional_properties.iter())
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    for (k, v) in original.properties.iter().chain(new.properties.iter()) {
        if !mandatory.contains_key(k) {
            optional.insert(k.clone(), *v);
        }
    }
    optional.retain(|k, _| !mandatory.contains_key(k));
    optional
}

fn rewrite_references(types: &mut IndexMap<String, Type>, mapping: &IndexMap<String, String>) {
    for t in types.values_mut() {
        t.supertypes = t
            .supertypes
            .iter()
            .map(|n| mapping.get(n).cloned().unwrap_or_else(|| n.clone()))
            .filter(|n| n != &t.name)
            .collect();
        t.subtypes = t
            .subtypes
            .iter()
            .map(|n| mapping.get(n).cloned().unwrap_or_else(|| n.clone()))
            .filter(|n| n != &t.name)
            .collect();
    }
}

/// Keep a claimed supertype edge only if the subtype's mandatory/optional
/// labels and properties are supersets of the supertype's (and, for edges,
/// every endpoint is equal to or a subtype of some supertype endpoint).
/// Then infer any further (more general, more specific) pairs that satisfy
/// the same condition and add them as new supertype relations.
///
/// `node_types` resolves endpoint subtype relations for edge-type repair;
/// endpoint names are node-type names, never members of `types` itself
/// (which is the edge-type map when repairing edges), so it must be passed
/// in separately rather than reusing `types` as the node hierarchy.
fn check_and_update_supertype_relations(
    types: &mut IndexMap<String, Type>,
    node_types: &IndexMap<String, Type>,
) {
    let snapshot = types.clone();
    for t in types.values_mut() {
        t.supertypes.retain(|s| {
            snapshot
                .get(s)
                .is_some_and(|supertype| is_consistent_subtype(t, supertype, node_types))
        });
    }
    let snapshot = types.clone();
    for t in types.values_mut() {
        t.subtypes.retain(|s| {
            snapshot
                .get(s)
                .is_some_and(|subtype| is_consistent_subtype(subtype, t, node_types))
        });
    }

    let names: Vec<String> = types.keys().cloned().collect();
    let snapshot = types.clone();
    let mut inferred: Vec<(String, String)> = Vec::new();
    for (a_name, b_name) in names.iter().tuple_combinations() {
        let a = &snapshot[a_name];
        let b = &snapshot[b_name];
        if a.supertypes.contains(b_name) || b.supertypes.contains(a_name) {
            continue;
        }
        if is_consistent_subtype(a, b, node_types) {
            inferred.push((b_name.clone(), a_name.clone()));
        } else if is_consistent_subtype(b, a, node_types) {
            inferred.push((a_name.clone(), b_name.clone()));
        }
    }
    for (supertype, subtype) in inferred {
        if let Some(s) = types.get_mut(&subtype) {
            s.supertypes.insert(supertype.clone());
        }
        if let Some(s) = types.get_mut(&supertype) {
            s.subtypes.insert(subtype);
        }
    }
}

fn is_consistent_subtype(sub: &Type, sup: &Type, node_types: &IndexMap<String, Type>) -> bool {
    if !sub.labels.is_superset(&sup.labels) {
        return false;
    }
    if !sub.optional_labels.is_superset(&sup.optional_labels) {
        return false;
    }
    if !sup
        .properties
        .iter()
        .all(|(k, v)| sub.properties.get(k) == Some(v))
    {
        return false;
    }
    if !sup
        .optional_properties
        .iter()
        .all(|(k, v)| sub.optional_properties.get(k) == Some(v))
    {
        return false;
    }
    if sub.kind.eq(&crate::graph::ElementKind::Edge) {
        if !endpoints_conform(&sub.start_node_types, &sup.start_node_types, node_types) {
            return false;
        }
        if !endpoints_conform(&sub.end_node_types, &sup.end_node_types, node_types) {
            return false;
        }
    }
    true
}

fn endpoints_conform(
    sub_endpoints: &IndexSet<String>,
    sup_endpoints: &IndexSet<String>,
    node_types: &IndexMap<String, Type>,
) -> bool {
    sub_endpoints.iter().all(|sub_endpoint| {
        sup_endpoints.contains(sub_endpoint)
            || node_types
                .get(sub_endpoint)
                .is_some_and(|t| t.get_all_supertypes(node_types).iter().any(|s| sup_endpoints.contains(s)))
    })
}
