//! Full-pipeline scenarios straight off the public API: build a graph,
//! extract, assert on the resulting type set. Covers S1-S6.

use indexmap::IndexMap;
use pg_schema_discovery::extractor::extract_edge_types;
use pg_schema_discovery::extractor::extract_node_types;
use pg_schema_discovery::extractor::ExtractorConfig;
use pg_schema_discovery::graph::AttributeMode;
use pg_schema_discovery::graph::DataType;
use pg_schema_discovery::graph::Edge;
use pg_schema_discovery::graph::GraphModel;
use pg_schema_discovery::graph::Node;
use pg_schema_discovery::graph::Value;
use pg_schema_discovery::schema::parse_graph_type;
use pg_schema_discovery::validator::validate;

fn base_config() -> ExtractorConfig {
    ExtractorConfig {
        node_attribute_mode: AttributeMode::LabelBased,
        edge_attribute_mode: AttributeMode::LabelBased,
        optional_labels: false,
        optional_properties: false,
        property_outlier_threshold: 1,
        label_outlier_threshold: 1,
        endpoint_outlier_threshold: 1,
        merge_threshold: 0.75,
        abstract_type_lookup: false,
        abstract_type_threshold: 0.5,
        remove_inherited_features: false,
        max_types: false,
        max_node_types: 20,
        max_edge_types: 20,
    }
}

fn node(id: &str, labels: &[&str], props: &[(&str, Value)]) -> Node {
    Node {
        id: id.to_string(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        properties: props.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
    }
}

#[test]
fn s1_single_label_single_property_yields_one_type() {
    let mut graph = GraphModel::new();
    graph.add_node(node("n1", &["Person"], &[("name", Value::String("A".into()))]));
    graph.add_node(node("n2", &["Person"], &[("name", Value::String("B".into()))]));
    graph.infer_property_datatypes();

    let types = extract_node_types(&graph, &base_config()).unwrap();
    assert_eq!(types.len(), 1);
    let t = types.values().next().unwrap();
    assert_eq!(t.labels.iter().collect::<Vec<_>>(), vec!["Person"]);
    assert!(t.optional_labels.is_empty());
    assert_eq!(t.properties.get("name"), Some(&pg_schema_discovery::graph::DataType::String));
    assert_eq!(t.members.len(), 2);
}

#[test]
fn s2_optional_label_survives_merge() {
    let mut graph = GraphModel::new();
    graph.add_node(node("n1", &["Person"], &[]));
    graph.add_node(node("n2", &["Person", "Customer"], &[]));
    graph.add_node(node("n3", &["Person", "Customer"], &[]));
    graph.infer_property_datatypes();

    let mut config = base_config();
    config.optional_labels = true;
    config.merge_threshold = 0.3;

    let types = extract_node_types(&graph, &config).unwrap();
    assert_eq!(types.len(), 1);
    let t = types.values().next().unwrap();
    assert!(t.labels.contains("Person"));
    assert!(t.optional_labels.contains("Customer"));
    assert_eq!(t.members.len(), 3);
}

#[test]
fn s4_endpoint_outlier_is_dropped_by_threshold() {
    let mut graph = GraphModel::new();
    graph.add_node(node("p", &["P"], &[]));
    graph.add_node(node("q", &["Q"], &[]));
    graph.add_node(node("r", &["R"], &[]));
    for i in 0..9 {
        graph.add_edge(Edge {
            id: format!("e{i}"),
            labels: ["E".to_string()].into_iter().collect(),
            properties: IndexMap::new(),
            start_node_id: "p".into(),
            end_node_id: "q".into(),
        });
    }
    graph.add_edge(Edge {
        id: "e9".into(),
        labels: ["E".to_string()].into_iter().collect(),
        properties: IndexMap::new(),
        start_node_id: "r".into(),
        end_node_id: "q".into(),
    });
    graph.infer_property_datatypes();

    let mut config = base_config();
    config.endpoint_outlier_threshold = 5;
    let node_types = extract_node_types(&graph, &config).unwrap();
    let edge_types = extract_edge_types(&graph, &node_types, &config).unwrap();

    assert_eq!(edge_types.len(), 1);
    let edge_type = edge_types.values().next().unwrap();
    let node_type_named = |label: &str| {
        node_types
            .values()
            .find(|t| t.labels.contains(label))
            .map(|t| t.name.clone())
            .unwrap()
    };
    assert_eq!(edge_type.start_node_types.len(), 1);
    assert!(edge_type.start_node_types.contains(&node_type_named("P")));
    assert_eq!(edge_type.end_node_types.len(), 1);
    assert!(edge_type.end_node_types.contains(&node_type_named("Q")));
}

#[test]
fn s5_emitted_schema_parses_back_to_an_equivalent_type_set() {
    let mut graph = GraphModel::new();
    graph.add_node(node("n1", &["Person"], &[("name", Value::String("A".into()))]));
    graph.add_node(node("n2", &["Person", "Customer"], &[("name", Value::String("B".into()))]));
    graph.infer_property_datatypes();

    let mut config = base_config();
    config.optional_labels = true;
    config.optional_properties = true;
    config.merge_threshold = 0.3;
    let node_types = extract_node_types(&graph, &config).unwrap();

    let schema = pg_schema_discovery::types::GraphType {
        name: "G".into(),
        loose: true,
        node_types: node_types.clone(),
        edge_types: IndexMap::new(),
    };

    let text = schema.to_string();
    let reparsed = parse_graph_type(&text).unwrap();

    assert_eq!(reparsed.node_types.len(), schema.node_types.len());
    for (name, t) in &schema.node_types {
        let round_tripped = &reparsed.node_types[name];
        assert_eq!(round_tripped.labels, t.labels);
        assert_eq!(round_tripped.optional_labels, t.optional_labels);
        assert_eq!(round_tripped.properties, t.properties);
        assert_eq!(round_tripped.optional_properties, t.optional_properties);
    }
}

#[test]
fn s6_datatype_mismatch_is_reported_as_an_invalid_node() {
    let mut graph = GraphModel::new();
    graph.add_node(node("n1", &["Person"], &[("age", Value::Integer(30))]));
    graph.add_node(node("n2", &["Person"], &[("age", Value::Integer(40))]));
    graph.infer_property_datatypes();

    let config = base_config();
    let mut node_types = extract_node_types(&graph, &config).unwrap();
    assert_eq!(node_types.len(), 1);

    // Corrupt one member in place so it disagrees with the inferred schema's
    // declared datatype for "age", without touching the schema itself.
    let bad_node = graph.nodes.get_mut("n1").unwrap();
    bad_node.properties.insert("age".to_string(), Value::String("thirty".into()));

    let edge_types = IndexMap::new();
    let report = validate(&graph, &node_types, &edge_types);
    assert_eq!(report.invalid_nodes.len(), 1);
    assert_eq!(report.invalid_nodes[0].node_id, "n1");
    assert!(report.invalid_edges.is_empty());

    // Sanity: the schema itself still declares "age" as INTEGER, which is
    // what n1 now disagrees with.
    let t = node_types.values_mut().next().unwrap();
    assert_eq!(t.properties.get("age"), Some(&DataType::Integer));
}

#[test]
fn every_member_is_assigned_to_exactly_one_node_type_across_a_mixed_graph() {
    let mut graph = GraphModel::new();
    graph.add_node(node("n1", &["Person"], &[]));
    graph.add_node(node("n2", &["Person", "Customer"], &[]));
    graph.add_node(node("n3", &["Animal"], &[]));
    graph.infer_property_datatypes();

    let node_types = extract_node_types(&graph, &base_config()).unwrap();

    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    for t in node_types.values() {
        for member in &t.members {
            assert!(seen.insert(member.clone()), "member counted in more than one type: {member}");
        }
    }
    assert_eq!(seen.len(), 3);
}
