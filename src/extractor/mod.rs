//! Turns a concept lattice over the instance graph into an initial type
//! hierarchy, then fills in optional features, merges similar types,
//! synthesizes abstract supertypes, and computes edge endpoint types.

use std::collections::HashMap;

use indexmap::IndexMap;
use indexmap::IndexSet;
use itertools::Itertools;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::Result;
use crate::fca::build_lattice;
use crate::fca::FormalContext;
use crate::graph::AttributeMode;
use crate::graph::ElementKind;
use crate::graph::GraphModel;
use crate::types::Type;

/// Thresholds and feature flags driving one extraction pass. Node and edge
/// passes share everything except which `*_attribute_mode` and which
/// per-kind type cap applies.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub node_attribute_mode: AttributeMode,
    pub edge_attribute_mode: AttributeMode,
    pub optional_labels: bool,
    pub optional_properties: bool,
    pub property_outlier_threshold: usize,
    pub label_outlier_threshold: usize,
    pub endpoint_outlier_threshold: usize,
    pub merge_threshold: f64,
    pub abstract_type_lookup: bool,
    pub abstract_type_threshold: f64,
    pub remove_inherited_features: bool,
    pub max_types: bool,
    pub max_node_types: usize,
    pub max_edge_types: usize,
}

#[cfg_attr(feature = "snapshot_tracing", tracing::instrument(skip_all))]
pub fn extract_node_types(
    graph: &GraphModel,
    config: &ExtractorConfig,
) -> Result<IndexMap<String, Type>> {
    info!(mode = ?config.node_attribute_mode, "extracting node types");
    let mut types = initialize_types(graph, ElementKind::Node, config.node_attribute_mode)?;
    demote_members(&mut types);
    fill_features(
        &mut types,
        graph,
        ElementKind::Node,
        config.node_attribute_mode,
        config.label_outlier_threshold,
        config.property_outlier_threshold,
        config.optional_labels,
        config.optional_properties,
    );
    if config.optional_labels || config.optional_properties {
        merge_by_similarity(&mut types, config.merge_threshold);
    }
    if config.max_types && types.len() > config.max_node_types {
        cap_merge(&mut types, config.max_node_types);
    }
    if config.abstract_type_lookup {
        synthesize_abstract_types(&mut types, config.abstract_type_threshold);
    }
    if config.remove_inherited_features {
        remove_inherited_features_all(&mut types);
    }
    info!(type_count = types.len(), "node type extraction complete");
    Ok(types)
}

#[cfg_attr(feature = "snapshot_tracing", tracing::instrument(skip_all))]
pub fn extract_edge_types(
    graph: &GraphModel,
    node_types: &IndexMap<String, Type>,
    config: &ExtractorConfig,
) -> Result<IndexMap<String, Type>> {
    info!(mode = ?config.edge_attribute_mode, "extracting edge types");
    let mut types = initialize_types(graph, ElementKind::Edge, config.edge_attribute_mode)?;
    demote_members(&mut types);
    fill_features(
        &mut types,
        graph,
        ElementKind::Edge,
        config.edge_attribute_mode,
        config.label_outlier_threshold,
        config.property_outlier_threshold,
        config.optional_labels,
        config.optional_properties,
    );
    if config.optional_labels || config.optional_properties {
        merge_by_similarity(&mut types, config.merge_threshold);
    }
    if config.max_types && types.len() > config.max_edge_types {
        cap_merge(&mut types, config.max_edge_types);
    }
    compute_endpoints(&mut types, graph, node_types, config.endpoint_outlier_threshold);
    if config.remove_inherited_features {
        remove_inherited_features_all(&mut types);
    }
    info!(type_count = types.len(), "edge type extraction complete");
    Ok(types)
}

fn initialize_types(
    graph: &GraphModel,
    kind: ElementKind,
    mode: AttributeMode,
) -> Result<IndexMap<String, Type>> {
    let (elements, labels_by_id, properties_by_id): (
        Vec<String>,
        HashMap<String, IndexSet<String>>,
        HashMap<String, IndexSet<String>>,
    ) = match kind {
        ElementKind::Node => (
            graph.nodes.keys().cloned().collect(),
            graph
                .nodes
                .iter()
                .map(|(id, n)| (id.clone(), n.labels.clone()))
                .collect(),
            graph
                .nodes
                .iter()
                .map(|(id, n)| (id.clone(), n.properties.keys().cloned().collect()))
                .collect(),
        ),
        ElementKind::Edge => (
            graph.edges.keys().cloned().collect(),
            graph
                .edges
                .iter()
                .map(|(id, e)| (id.clone(), e.labels.clone()))
                .collect(),
            graph
                .edges
                .iter()
                .map(|(id, e)| (id.clone(), e.properties.keys().cloned().collect()))
                .collect(),
        ),
    };

    let mut attribute_universe: Vec<String> = Vec::new();
    if matches!(mode, AttributeMode::LabelBased | AttributeMode::LabelPropertyBased) {
        let labels = match kind {
            ElementKind::Node => graph.all_node_labels(),
            ElementKind::Edge => graph.all_edge_labels(),
        };
        attribute_universe.extend(labels.into_iter().map(|l| format!("L:{l}")));
    }
    if matches!(mode, AttributeMode::PropertyBased | AttributeMode::LabelPropertyBased) {
        let keys = match kind {
            ElementKind::Node => graph.all_node_property_keys(),
            ElementKind::Edge => graph.all_edge_property_keys(),
        };
        attribute_universe.extend(keys.into_iter().map(|k| format!("P:{k}")));
    }

    let context = FormalContext::build(elements, attribute_universe, |element_id, attr| {
        if let Some(label) = attr.strip_prefix("L:") {
            labels_by_id
                .get(element_id)
                .is_some_and(|s| s.contains(label))
        } else if let Some(key) = attr.strip_prefix("P:") {
            properties_by_id
                .get(element_id)
                .is_some_and(|s| s.contains(key))
        } else {
            false
        }
    });

    let lattice = build_lattice(&context);
    debug!(concept_count = lattice.concepts.len(), ?kind, "built concept lattice");
    #[cfg(feature = "snapshot_tracing")]
    debug!(dot = %lattice.to_dot(&context), "concept lattice");

    let top_id = lattice
        .concepts
        .first()
        .filter(|c| c.intent.is_empty())
        .map(|c| c.id);
    let bottom_id = lattice.concepts.last().map(|c| c.id);
    let top_required = graph.is_top_concept_required(mode, kind);

    let mut dropped: IndexSet<usize> = IndexSet::new();
    if !top_required {
        if let Some(id) = top_id {
            dropped.insert(id);
        }
    }
    if let Some(id) = bottom_id {
        if lattice.concepts[id].extent.is_empty() {
            dropped.insert(id);
        }
    }

    let kind_prefix = match kind {
        ElementKind::Node => "Node",
        ElementKind::Edge => "Edge",
    };

    let mut types = IndexMap::new();
    for concept in &lattice.concepts {
        if dropped.contains(&concept.id) {
            continue;
        }
        let name = format!("{kind_prefix}Type{}", concept.id);
        let mut t = Type::new(name.clone(), kind);
        for attr_idx in &concept.intent {
            let attr = &context.attributes[*attr_idx];
            if let Some(label) = attr.strip_prefix("L:") {
                t.labels.insert(label.to_string());
            } else if let Some(key) = attr.strip_prefix("P:") {
                let datatype = match kind {
                    ElementKind::Node => graph.node_property_datatype(key),
                    ElementKind::Edge => graph.edge_property_datatype(key),
                };
                t.properties.insert(key.to_string(), datatype);
            }
        }
        for elem_idx in &concept.extent {
            t.members.insert(context.elements[*elem_idx].clone());
        }
        for parent_id in &concept.parents {
            if !dropped.contains(parent_id) {
                t.supertypes.insert(format!("{kind_prefix}Type{parent_id}"));
            }
        }
        for child_id in &concept.children {
            if !dropped.contains(child_id) {
                t.subtypes.insert(format!("{kind_prefix}Type{child_id}"));
            }
        }
        types.insert(name, t);
    }
    Ok(types)
}

/// Remove from each type's members every element that also belongs to one
/// of its transitive subtypes, so an element ends up counted against only
/// its most specific type. FCA extents are already monotonic (a subtype's
/// extent is a subset of its supertype's), so this never removes an element
/// that the subtype lacks.
fn demote_members(types: &mut IndexMap<String, Type>) {
    let snapshot = types.clone();
    for t in types.values_mut() {
        let subtype_names = t.get_all_subtypes(&snapshot);
        if subtype_names.is_empty() {
            continue;
        }
        let mut absorbed: IndexSet<String> = IndexSet::new();
        for name in &subtype_names {
            if let Some(sub) = snapshot.get(name) {
                absorbed.extend(sub.members.iter().cloned());
            }
        }
        t.members.retain(|m| !absorbed.contains(m));
    }
}

#[allow(clippy::too_many_arguments)]
fn fill_features(
    types: &mut IndexMap<String, Type>,
    graph: &GraphModel,
    kind: ElementKind,
    mode: AttributeMode,
    label_outlier_threshold: usize,
    property_outlier_threshold: usize,
    optional_labels: bool,
    optional_properties: bool,
) {
    match mode {
        AttributeMode::LabelBased => {
            compute_properties(types, graph, kind, property_outlier_threshold, optional_properties)
        }
        AttributeMode::PropertyBased => {
            compute_labels(types, graph, kind, label_outlier_threshold, optional_labels)
        }
        AttributeMode::LabelPropertyBased => {
            // Labels and properties already came straight from the concept
            // intent; no counting pass needed.
        }
    }
}

fn compute_properties(
    types: &mut IndexMap<String, Type>,
    graph: &GraphModel,
    kind: ElementKind,
    threshold: usize,
    optional: bool,
) {
    for t in types.values_mut() {
        let n = t.members.len();
        if n == 0 {
            continue;
        }
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for member_id in &t.members {
            let keys: Vec<String> = match kind {
                ElementKind::Node => graph
                    .get_node(member_id)
                    .map(|n| n.properties.keys().cloned().collect())
                    .unwrap_or_default(),
                ElementKind::Edge => graph
                    .get_edge(member_id)
                    .map(|e| e.properties.keys().cloned().collect())
                    .unwrap_or_default(),
            };
            for key in keys {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        for (key, count) in counts {
            let datatype = match kind {
                ElementKind::Node => graph.node_property_datatype(&key),
                ElementKind::Edge => graph.edge_property_datatype(&key),
            };
            if count == n {
                t.properties.insert(key, datatype);
            } else if optional && count >= threshold {
                t.optional_properties.insert(key, datatype);
            }
        }
    }
}

fn compute_labels(
    types: &mut IndexMap<String, Type>,
    graph: &GraphModel,
    kind: ElementKind,
    threshold: usize,
    optional: bool,
) {
    for t in types.values_mut() {
        let n = t.members.len();
        if n == 0 {
            continue;
        }
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for member_id in &t.members {
            let labels: Vec<String> = match kind {
                ElementKind::Node => graph
                    .get_node(member_id)
                    .map(|n| n.labels.iter().cloned().collect())
                    .unwrap_or_default(),
                ElementKind::Edge => graph
                    .get_edge(member_id)
                    .map(|e| e.labels.iter().cloned().collect())
                    .unwrap_or_default(),
            };
            for label in labels {
                *counts.entry(label).or_insert(0) += 1;
            }
        }
        for (label, count) in counts {
            if count == n {
                t.labels.insert(label);
            } else if optional && count >= threshold {
                t.optional_labels.insert(label);
            }
        }
    }
}

fn merge_by_similarity(types: &mut IndexMap<String, Type>, threshold: f64) {
    loop {
        let mut best: Option<(String, String, f64)> = None;
        for (sub_name, sub) in types.iter() {
            for super_name in &sub.supertypes {
                if let Some(super_type) = types.get(super_name) {
                    let sim = sub.weighted_jaccard_similarity(super_type);
                    if best.as_ref().map_or(true, |b| sim > b.2) {
                        best = Some((sub_name.clone(), super_name.clone(), sim));
                    }
                }
            }
        }
        match best {
            Some((sub, sup, sim)) if sim >= threshold => merge_pair(types, &sub, &sup),
            _ => break,
        }
    }
}

/// Phase A greedily merges leaves into their best-matching supertype; once
/// no leaf has a supertype left, phase B merges the globally closest pair
/// regardless of hierarchy, clearing the survivor's sub/supertype claims
/// since that merge no longer reflects a real lattice edge.
fn cap_merge(types: &mut IndexMap<String, Type>, cap: usize) {
    while types.len() > cap {
        let mut best_leaf: Option<(String, String, f64)> = None;
        for (name, t) in types.iter() {
            if !t.subtypes.is_empty() {
                continue;
            }
            for super_name in &t.supertypes {
                if let Some(super_type) = types.get(super_name) {
                    let sim = t.weighted_jaccard_similarity(super_type);
                    if best_leaf.as_ref().map_or(true, |b| sim > b.2) {
                        best_leaf = Some((name.clone(), super_name.clone(), sim));
                    }
                }
            }
        }
        if let Some((sub, sup, _)) = best_leaf {
            merge_pair(types, &sub, &sup);
            continue;
        }

        let names: Vec<String> = types.keys().cloned().collect();
        let mut best_pair: Option<(String, String, f64)> = None;
        for (a, b) in names.iter().tuple_combinations() {
            let sim = types[a].weighted_jaccard_similarity(&types[b]);
            if best_pair.as_ref().map_or(true, |best| sim > best.2) {
                best_pair = Some((a.clone(), b.clone(), sim));
            }
        }
        let Some((a, b, _)) = best_pair else {
            warn!("cap merge could not reduce type count further");
            break;
        };
        let (survivor, other) = if a <= b { (a, b) } else { (b, a) };
        merge_pair(types, &other, &survivor);
        if let Some(surv) = types.get_mut(&survivor) {
            surv.supertypes.clear();
            surv.subtypes.clear();
        }
    }
}

/// Merge `sub` into `super_name`, which survives, and rewrite every other
/// type's sub/supertype references from `sub` to the survivor.
fn merge_pair(types: &mut IndexMap<String, Type>, sub_name: &str, super_name: &str) {
    let Some(sub) = types.shift_remove(sub_name) else {
        return;
    };
    if let Some(super_type) = types.get_mut(super_name) {
        super_type.merge_with(&sub);
    }
    for t in types.values_mut() {
        if t.supertypes.shift_remove(sub_name) {
            t.supertypes.insert(super_name.to_string());
        }
        if t.subtypes.shift_remove(sub_name) {
            t.subtypes.insert(super_name.to_string());
        }
    }
    if let Some(super_type) = types.get_mut(super_name) {
        super_type.supertypes.shift_remove(super_name);
        super_type.subtypes.shift_remove(super_name);
    }
}

fn synthesize_abstract_types(types: &mut IndexMap<String, Type>, threshold: f64) {
    loop {
        let names: Vec<String> = types
            .values()
            .filter(|t| !t.is_abstract)
            .map(|t| t.name.clone())
            .collect();
        let mut found = None;
        for (a_name, b_name) in names.iter().tuple_combinations() {
            let a = &types[a_name];
            let b = &types[b_name];
            if a.get_all_supertypes(types).contains(b_name) || b.get_all_supertypes(types).contains(a_name) {
                continue;
            }
            if a.weighted_jaccard_similarity(b) >= threshold {
                found = Some((a_name.clone(), b_name.clone()));
                break;
            }
        }
        let Some((a_name, b_name)) = found else {
            break;
        };
        if !create_abstract_type(types, &a_name, &b_name) {
            break;
        }
    }
}

fn create_abstract_type(types: &mut IndexMap<String, Type>, a_name: &str, b_name: &str) -> bool {
    let (shared_labels, shared_optional_labels, shared_properties, shared_optional_properties) = {
        let a = &types[a_name];
        let b = &types[b_name];
        let labels = a.labels.intersection(&b.labels).cloned().collect::<IndexSet<_>>();
        let optional_labels = a
            .optional_labels
            .intersection(&b.optional_labels)
            .cloned()
            .collect::<IndexSet<_>>();
        let properties = a
            .properties
            .iter()
            .filter(|(k, v)| b.properties.get(*k) == Some(*v))
            .map(|(k, v)| (k.clone(), *v))
            .collect::<IndexMap<_, _>>();
        let optional_properties = a
            .optional_properties
            .iter()
            .filter(|(k, v)| b.optional_properties.get(*k) == Some(*v))
            .map(|(k, v)| (k.clone(), *v))
            .collect::<IndexMap<_, _>>();
        (labels, optional_labels, properties, optional_properties)
    };
    if shared_labels.is_empty()
        && shared_optional_labels.is_empty()
        && shared_properties.is_empty()
        && shared_optional_properties.is_empty()
    {
        return false;
    }

    let mut pair_names = [a_name.to_string(), b_name.to_string()];
    pair_names.sort();
    let abstract_name = format!("AbstractNodeType{}{}", pair_names[0], pair_names[1]);
    if types.contains_key(&abstract_name) {
        return false;
    }

    let mut abstract_type = Type::new(abstract_name.clone(), ElementKind::Node);
    abstract_type.is_abstract = true;
    abstract_type.labels = shared_labels.clone();
    abstract_type.optional_labels = shared_optional_labels.clone();
    abstract_type.properties = shared_properties.clone();
    abstract_type.optional_properties = shared_optional_properties.clone();
    abstract_type.subtypes.insert(a_name.to_string());
    abstract_type.subtypes.insert(b_name.to_string());

    for name in [a_name, b_name] {
        if let Some(t) = types.get_mut(name) {
            t.labels.retain(|l| !shared_labels.contains(l));
            t.optional_labels.retain(|l| !shared_optional_labels.contains(l));
            t.properties.retain(|k, _| !shared_properties.contains_key(k));
            t.optional_properties
                .retain(|k, _| !shared_optional_properties.contains_key(k));
            t.supertypes.insert(abstract_name.clone());
        }
    }
    types.insert(abstract_name, abstract_type);
    true
}

fn compute_endpoints(
    edge_types: &mut IndexMap<String, Type>,
    graph: &GraphModel,
    node_types: &IndexMap<String, Type>,
    threshold: usize,
) {
    let mut node_id_to_types: HashMap<&str, IndexSet<String>> = HashMap::new();
    for (name, t) in node_types {
        let supertypes = t.get_all_supertypes(node_types);
        for member in &t.members {
            let entry = node_id_to_types.entry(member.as_str()).or_default();
            entry.insert(name.clone());
            entry.extend(supertypes.iter().cloned());
        }
    }

    for edge_type in edge_types.values_mut() {
        let mut start_counts: IndexMap<String, usize> = IndexMap::new();
        let mut end_counts: IndexMap<String, usize> = IndexMap::new();
        for edge_id in &edge_type.members {
            let Some(edge) = graph.get_edge(edge_id) else {
                continue;
            };
            if let Some(ts) = node_id_to_types.get(edge.start_node_id.as_str()) {
                for t in ts {
                    *start_counts.entry(t.clone()).or_insert(0) += 1;
                }
            }
            if let Some(ts) = node_id_to_types.get(edge.end_node_id.as_str()) {
                for t in ts {
                    *end_counts.entry(t.clone()).or_insert(0) += 1;
                }
            }
        }
        edge_type.start_node_types = start_counts
            .into_iter()
            .filter(|(_, c)| *c >= threshold)
            .map(|(k, _)| k)
            .collect();
        edge_type.end_node_types = end_counts
            .into_iter()
            .filter(|(_, c)| *c >= threshold)
            .map(|(k, _)| k)
            .collect();
    }

    for edge_type in edge_types.values_mut() {
        subsume_endpoint_set(&mut edge_type.start_node_types, node_types);
        subsume_endpoint_set(&mut edge_type.end_node_types, node_types);
    }
}

/// Drop a node type from an endpoint set if a transitive supertype of it is
/// also present in the set; the more general type already covers it.
fn subsume_endpoint_set(set: &mut IndexSet<String>, node_types: &IndexMap<String, Type>) {
    let original = set.clone();
    set.retain(|name| {
        let Some(t) = node_types.get(name) else {
            return true;
        };
        let supertypes = t.get_all_supertypes(node_types);
        !supertypes.iter().any(|s| original.contains(s))
    });
}

fn remove_inherited_features_all(types: &mut IndexMap<String, Type>) {
    let snapshot = types.clone();
    for t in types.values_mut() {
        t.remove_inherited_features(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::graph::Value;

    fn graph_with_person_and_customer() -> GraphModel {
        let mut graph = GraphModel::new();
        graph.add_node(Node {
            id: "n1".into(),
            labels: ["Person".to_string()].into_iter().collect(),
            properties: [("name".to_string(), Value::String("A".into()))]
                .into_iter()
                .collect(),
        });
        graph.add_node(Node {
            id: "n2".into(),
            labels: ["Person".to_string(), "Customer".to_string()]
                .into_iter()
                .collect(),
            properties: [("name".to_string(), Value::String("B".into()))]
                .into_iter()
                .collect(),
        });
        graph.add_node(Node {
            id: "n3".into(),
            labels: ["Person".to_string(), "Customer".to_string()]
                .into_iter()
                .collect(),
            properties: [("name".to_string(), Value::String("C".into()))]
                .into_iter()
                .collect(),
        });
        graph.infer_property_datatypes();
        graph
    }

    fn base_config() -> ExtractorConfig {
        ExtractorConfig {
            node_attribute_mode: AttributeMode::LabelBased,
            edge_attribute_mode: AttributeMode::LabelBased,
            optional_labels: true,
            optional_properties: true,
            property_outlier_threshold: 1,
            label_outlier_threshold: 1,
            endpoint_outlier_threshold: 1,
            merge_threshold: 0.3,
            abstract_type_lookup: false,
            abstract_type_threshold: 0.5,
            remove_inherited_features: false,
            max_types: false,
            max_node_types: 20,
            max_edge_types: 20,
        }
    }

    #[test]
    fn merges_similar_types_into_optional_label() {
        let graph = graph_with_person_and_customer();
        let config = base_config();
        let types = extract_node_types(&graph, &config).unwrap();
        assert_eq!(types.len(), 1);
        let t = types.values().next().unwrap();
        assert!(t.labels.contains("Person"));
        assert!(t.optional_labels.contains("Customer"));
        assert_eq!(t.members.len(), 3);
    }

    #[test]
    fn each_member_belongs_to_exactly_one_type_after_demotion() {
        let graph = graph_with_person_and_customer();
        let mut config = base_config();
        config.merge_threshold = 2.0; // never merges
        let types = extract_node_types(&graph, &config).unwrap();
        let mut seen: IndexSet<String> = IndexSet::new();
        for t in types.values() {
            for member in &t.members {
                assert!(seen.insert(member.clone()), "member counted twice: {member}");
            }
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn synthesizes_an_abstract_supertype_for_similar_siblings() {
        let mut a = Type::new("TypeA", ElementKind::Node);
        a.labels.insert("A".into());
        a.labels.insert("X".into());
        let mut b = Type::new("TypeB", ElementKind::Node);
        b.labels.insert("B".into());
        b.labels.insert("X".into());

        let mut types = IndexMap::new();
        types.insert(a.name.clone(), a);
        types.insert(b.name.clone(), b);

        synthesize_abstract_types(&mut types, 0.1);

        let abstract_type = types
            .values()
            .find(|t| t.is_abstract)
            .expect("an abstract type was synthesized");
        assert!(abstract_type.labels.contains("X"));
        assert_eq!(abstract_type.subtypes.len(), 2);
        for subtype_name in &abstract_type.subtypes {
            let subtype = &types[subtype_name];
            assert!(!subtype.labels.contains("X"), "X should have moved up to the abstract type");
            assert!(subtype.supertypes.contains(&abstract_type.name));
        }
    }
}
