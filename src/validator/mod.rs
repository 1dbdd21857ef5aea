//! Checks an instance graph for conformance to an inferred or parsed schema:
//! label/property presence, datatype agreement, and (for edges) endpoint
//! conformity. Grounded on the original Python `Validator`
//! (`original_source/src/utils/validator.py`), which gathers a type's
//! inherited labels/properties before checking a node or edge against it.

use indexmap::IndexMap;
use indexmap::IndexSet;
use serde::Serialize;
use tracing::error;
use tracing::info;

use crate::graph::DataType;
use crate::graph::Element;
use crate::graph::GraphModel;
use crate::types::Type;

/// One node that conformed to no declared node type.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidNode {
    pub node_id: String,
    pub labels: Vec<String>,
    pub properties: Vec<String>,
}

/// One edge that conformed to no declared edge type (including endpoint
/// conformity of its start/end nodes).
#[derive(Debug, Clone, Serialize)]
pub struct InvalidEdge {
    pub edge_id: String,
    pub labels: Vec<String>,
    pub properties: Vec<String>,
    pub start_node_id: String,
    pub end_node_id: String,
}

/// The full outcome of validating a graph against a schema: empty on both
/// sides iff the graph conforms.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub invalid_nodes: Vec<InvalidNode>,
    pub invalid_edges: Vec<InvalidEdge>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.invalid_nodes.is_empty() && self.invalid_edges.is_empty()
    }
}

/// Validate every node and edge in `graph` against `node_types`/`edge_types`,
/// resolving each property's expected datatype from the graph's own
/// dominant-datatype index, and logging a single pass/fail summary line.
#[cfg_attr(feature = "snapshot_tracing", tracing::instrument(skip_all))]
pub fn validate(
    graph: &GraphModel,
    node_types: &IndexMap<String, Type>,
    edge_types: &IndexMap<String, Type>,
) -> ValidationReport {
    let node_dt = |key: &str| graph.node_property_datatype(key);
    let edge_dt = |key: &str| graph.edge_property_datatype(key);

    let mut node_type_of: IndexMap<&str, &Type> = IndexMap::new();
    let mut invalid_nodes = Vec::new();
    for node in graph.nodes.values() {
        match node_types.values().find(|t| conforms_to_type(node, t, node_types, &node_dt)) {
            Some(t) => {
                node_type_of.insert(node.id.as_str(), t);
            }
            None => invalid_nodes.push(InvalidNode {
                node_id: node.id.clone(),
                labels: node.labels.iter().cloned().collect(),
                properties: node.properties.keys().cloned().collect(),
            }),
        }
    }

    let mut invalid_edges = Vec::new();
    for edge in graph.edges.values() {
        let conforms = edge_types.values().any(|t| {
            if !conforms_to_type(edge, t, edge_types, &edge_dt) {
                return false;
            }
            let start_ok = node_type_of
                .get(edge.start_node_id.as_str())
                .is_some_and(|nt| conforms_to_any_endpoint(nt, &t.start_node_types, node_types));
            let end_ok = node_type_of
                .get(edge.end_node_id.as_str())
                .is_some_and(|nt| conforms_to_any_endpoint(nt, &t.end_node_types, node_types));
            start_ok && end_ok
        });
        if !conforms {
            invalid_edges.push(InvalidEdge {
                edge_id: edge.id.clone(),
                labels: edge.labels.iter().cloned().collect(),
                properties: edge.properties.keys().cloned().collect(),
                start_node_id: edge.start_node_id.clone(),
                end_node_id: edge.end_node_id.clone(),
            });
        }
    }

    let report = ValidationReport {
        invalid_nodes,
        invalid_edges,
    };
    if report.is_valid() {
        info!("graph is valid under the schema");
    } else {
        error!(
            invalid_nodes = report.invalid_nodes.len(),
            invalid_edges = report.invalid_edges.len(),
            "graph is not valid under the schema"
        );
    }
    report
}

/// A node type (or one of its transitive supertypes) matches a name in
/// `permitted` — the endpoint-conformity check from §4.7.
fn conforms_to_any_endpoint(
    node_type: &Type,
    permitted: &IndexSet<String>,
    node_types: &IndexMap<String, Type>,
) -> bool {
    permitted.contains(&node_type.name)
        || node_type
            .get_all_supertypes(node_types)
            .iter()
            .any(|s| permitted.contains(s))
}

/// Whether `element` conforms to `candidate`: its inherited mandatory
/// labels/properties (gathered transitively through supertypes) are all
/// present, any extra labels/properties are tolerated only under
/// `open_labels`/`open_properties`, and every present property's inferred
/// datatype agrees with the type's declared datatype.
fn conforms_to_type(
    element: &impl Element,
    candidate: &Type,
    types: &IndexMap<String, Type>,
    dominant_datatype: &dyn Fn(&str) -> DataType,
) -> bool {
    let (mandatory_labels, optional_labels, mandatory_properties, optional_properties) =
        gather_inherited(candidate, types);

    let element_labels: IndexSet<String> = element.labels().iter().cloned().collect();
    if !mandatory_labels.is_subset(&element_labels) {
        return false;
    }
    let allowed_labels: IndexSet<String> =
        mandatory_labels.union(&optional_labels).cloned().collect();
    if !candidate.open_labels && !element_labels.is_subset(&allowed_labels) {
        return false;
    }

    let element_keys: IndexSet<String> = element.properties().keys().cloned().collect();
    let mandatory_keys: IndexSet<String> = mandatory_properties.keys().cloned().collect();
    if !mandatory_keys.is_subset(&element_keys) {
        return false;
    }
    let allowed_keys: IndexSet<String> = mandatory_properties
        .keys()
        .chain(optional_properties.keys())
        .cloned()
        .collect();
    if !candidate.open_properties && !element_keys.is_subset(&allowed_keys) {
        return false;
    }

    for (key, value) in element.properties() {
        let expected = mandatory_properties.get(key).or_else(|| optional_properties.get(key));
        let Some(expected) = expected else {
            continue;
        };
        if value.infer_datatype() != *expected || dominant_datatype(key) != *expected {
            return false;
        }
    }

    true
}

/// Union a type's own labels/properties with every transitive supertype's.
fn gather_inherited(
    t: &Type,
    types: &IndexMap<String, Type>,
) -> (IndexSet<String>, IndexSet<String>, IndexMap<String, DataType>, IndexMap<String, DataType>) {
    let mut mandatory_labels = t.labels.clone();
    let mut optional_labels = t.optional_labels.clone();
    let mut mandatory_properties = t.properties.clone();
    let mut optional_properties = t.optional_properties.clone();
    for name in t.get_all_supertypes(types) {
        if let Some(s) = types.get(&name) {
            mandatory_labels.extend(s.labels.iter().cloned());
            optional_labels.extend(s.optional_labels.iter().cloned());
            mandatory_properties.extend(s.properties.iter().map(|(k, v)| (k.clone(), *v)));
            optional_properties.extend(s.optional_properties.iter().map(|(k, v)| (k.clone(), *v)));
        }
    }
    (mandatory_labels, optional_labels, mandatory_properties, optional_properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ElementKind;
    use crate::graph::Node;
    use crate::graph::Value;

    fn person_type() -> Type {
        let mut t = Type::new("Person", ElementKind::Node);
        t.labels.insert("Person".into());
        t.properties.insert("age".into(), DataType::Integer);
        t
    }

    #[test]
    fn datatype_mismatch_marks_node_invalid() {
        let mut graph = GraphModel::new();
        graph.add_node(Node {
            id: "n1".into(),
            labels: ["Person".to_string()].into_iter().collect(),
            properties: [("age".to_string(), Value::String("27".into()))]
                .into_iter()
                .collect(),
        });
        graph.infer_property_datatypes();

        let mut node_types = IndexMap::new();
        let t = person_type();
        node_types.insert(t.name.clone(), t);

        let report = validate(&graph, &node_types, &IndexMap::new());
        assert_eq!(report.invalid_nodes.len(), 1);
        assert_eq!(report.invalid_nodes[0].node_id, "n1");
    }

    #[test]
    fn conforming_node_is_valid() {
        let mut graph = GraphModel::new();
        graph.add_node(Node {
            id: "n1".into(),
            labels: ["Person".to_string()].into_iter().collect(),
            properties: [("age".to_string(), Value::Integer(27))].into_iter().collect(),
        });
        graph.infer_property_datatypes();

        let mut node_types = IndexMap::new();
        let t = person_type();
        node_types.insert(t.name.clone(), t);

        let report = validate(&graph, &node_types, &IndexMap::new());
        assert!(report.is_valid());
    }

    #[test]
    fn extra_label_without_open_labels_is_invalid() {
        let mut graph = GraphModel::new();
        graph.add_node(Node {
            id: "n1".into(),
            labels: ["Person".to_string(), "Extra".to_string()].into_iter().collect(),
            properties: [("age".to_string(), Value::Integer(27))].into_iter().collect(),
        });
        graph.infer_property_datatypes();

        let mut node_types = IndexMap::new();
        let t = person_type();
        node_types.insert(t.name.clone(), t);

        let report = validate(&graph, &node_types, &IndexMap::new());
        assert_eq!(report.invalid_nodes.len(), 1);
    }

    #[test]
    fn open_labels_tolerates_extra_label() {
        let mut graph = GraphModel::new();
        graph.add_node(Node {
            id: "n1".into(),
            labels: ["Person".to_string(), "Extra".to_string()].into_iter().collect(),
            properties: [("age".to_string(), Value::Integer(27))].into_iter().collect(),
        });
        graph.infer_property_datatypes();

        let mut node_types = IndexMap::new();
        let mut t = person_type();
        t.open_labels = true;
        node_types.insert(t.name.clone(), t);

        let report = validate(&graph, &node_types, &IndexMap::new());
        assert!(report.is_valid());
    }

    #[test]
    fn endpoint_mismatch_marks_edge_invalid() {
        let mut graph = GraphModel::new();
        graph.add_node(Node {
            id: "n1".into(),
            labels: ["Person".to_string()].into_iter().collect(),
            properties: IndexMap::new(),
        });
        graph.add_node(Node {
            id: "n2".into(),
            labels: ["Company".to_string()].into_iter().collect(),
            properties: IndexMap::new(),
        });
        graph.add_edge(crate::graph::Edge {
            id: "e1".into(),
            labels: ["WORKS_AT".to_string()].into_iter().collect(),
            properties: IndexMap::new(),
            start_node_id: "n2".into(),
            end_node_id: "n1".into(),
        });
        graph.infer_property_datatypes();

        let mut person = Type::new("Person", ElementKind::Node);
        person.labels.insert("Person".into());
        let mut company = Type::new("Company", ElementKind::Node);
        company.labels.insert("Company".into());
        let mut node_types = IndexMap::new();
        node_types.insert("Person".to_string(), person);
        node_types.insert("Company".to_string(), company);

        let mut works_at = Type::new("WorksAt", ElementKind::Edge);
        works_at.labels.insert("WORKS_AT".into());
        works_at.start_node_types.insert("Person".into());
        works_at.end_node_types.insert("Company".into());
        let mut edge_types = IndexMap::new();
        edge_types.insert("WorksAt".to_string(), works_at);

        let report = validate(&graph, &node_types, &edge_types);
        assert_eq!(report.invalid_edges.len(), 1);
    }
}
