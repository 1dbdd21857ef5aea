//! Infers a property-graph schema from an instance graph via Formal Concept
//! Analysis: a concept lattice over each element's labels and/or properties
//! seeds an initial type hierarchy, which is then refined (optional-feature
//! filling, similarity-based merging, abstract-type synthesis, endpoint
//! computation) into a [`types::GraphType`] that can be emitted as PG-Schema,
//! merged into a previously inferred schema, or used to validate the graph
//! it was inferred from.

pub mod config;
pub mod error;
pub mod extractor;
pub mod fca;
pub mod graph;
#[cfg(feature = "correctness")]
pub mod generator;
mod indented_display;
pub mod merger;
pub mod schema;
pub mod types;
pub mod validator;

use error::Result;
use extractor::ExtractorConfig;
use graph::GraphModel;
use indexmap::IndexMap;
use types::GraphType;
use types::Type;

/// Every artifact a full discovery run can produce, mirroring the files a
/// CLI driver persists under `out_dir` (§6.2).
#[derive(Debug, Clone)]
pub struct DiscoveryOutput {
    pub schema: GraphType,
    pub validation: Option<validator::ValidationReport>,
    pub generated_graph: Option<GraphModel>,
}

/// Run the full inference pipeline against an already-loaded instance graph:
/// node types, then edge types (which need the node types to compute
/// endpoints), optionally merged into a prior schema, optionally validated
/// against the instance graph that produced it.
pub fn discover_schema(
    graph: &GraphModel,
    config: &config::Config,
    schema_to_merge: Option<&GraphType>,
) -> Result<DiscoveryOutput> {
    let extractor_config = extractor_config_from(config);

    let node_types = extractor::extract_node_types(graph, &extractor_config)?;
    let edge_types = extractor::extract_edge_types(graph, &node_types, &extractor_config)?;

    let mut schema = GraphType {
        name: config.graph_type_name.clone(),
        loose: matches!(config.graph_type_mode, config::GraphTypeMode::Loose),
        node_types,
        edge_types,
    };

    if let Some(existing) = schema_to_merge {
        schema = merger::merge_schemas(existing, &schema, config.schema_merge_threshold);
    }

    let validation = config
        .validate_graph
        .then(|| validator::validate(graph, &schema.node_types, &schema.edge_types));

    Ok(DiscoveryOutput {
        schema,
        validation,
        generated_graph: None,
    })
}

/// Attach mandatory/optional labels and properties that `open_labels`/
/// `open_properties` should be marked on every type, per §6.4's config keys
/// (these are schema-wide flags, not per-type inference outputs).
pub fn apply_openness(types: &mut IndexMap<String, Type>, open_labels: bool, open_properties: bool) {
    for t in types.values_mut() {
        t.open_labels = open_labels;
        t.open_properties = open_properties;
    }
}

fn extractor_config_from(config: &config::Config) -> ExtractorConfig {
    ExtractorConfig {
        node_attribute_mode: config.node_type_extraction,
        edge_attribute_mode: config.edge_type_extraction,
        optional_labels: config.optional_labels,
        optional_properties: config.optional_properties,
        property_outlier_threshold: config.property_outlier_threshold,
        label_outlier_threshold: config.label_outlier_threshold,
        endpoint_outlier_threshold: config.endpoint_outlier_threshold,
        merge_threshold: config.merge_threshold,
        abstract_type_lookup: config.abstract_type_lookup,
        abstract_type_threshold: config.abstract_type_threshold,
        remove_inherited_features: config.remove_inherited_features,
        max_types: config.max_types,
        max_node_types: config.max_node_types,
        max_edge_types: config.max_edge_types,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphTypeMode;
    use crate::graph::Node;
    use crate::graph::Value;

    fn minimal_config() -> config::Config {
        config::Config {
            data_source: "graph.json".into(),
            node_type_extraction: graph::AttributeMode::LabelBased,
            edge_type_extraction: graph::AttributeMode::LabelBased,
            out_dir: "out".into(),
            optional_labels: true,
            optional_properties: true,
            open_labels: false,
            open_properties: false,
            remove_inherited_features: false,
            abstract_type_lookup: false,
            max_types: false,
            validate_graph: true,
            merge_schema: false,
            graph_generator: false,
            property_outlier_threshold: 1,
            label_outlier_threshold: 1,
            endpoint_outlier_threshold: 1,
            max_node_types: 20,
            max_edge_types: 20,
            graph_generator_min_entities: 10,
            graph_generator_max_entities: 15,
            merge_threshold: 0.3,
            abstract_type_threshold: 0.5,
            schema_merge_threshold: 0.5,
            graph_type_name: "G".into(),
            graph_type_mode: GraphTypeMode::Loose,
            graph_generator_schema_path: None,
            schema_to_merge_path: None,
        }
    }

    #[test]
    fn discover_schema_validates_a_conforming_graph() {
        let mut graph = GraphModel::new();
        graph.add_node(Node {
            id: "n1".into(),
            labels: ["Person".to_string()].into_iter().collect(),
            properties: [("name".to_string(), Value::String("A".into()))]
                .into_iter()
                .collect(),
        });
        graph.infer_property_datatypes();

        let output = discover_schema(&graph, &minimal_config(), None).unwrap();
        assert!(!output.schema.node_types.is_empty());
        assert!(output.validation.unwrap().is_valid());
    }
}
