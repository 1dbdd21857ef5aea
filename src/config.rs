//! Driver configuration: a JSON file (`serde_json`) with CLI overrides
//! layered on top, matching the shape of the original Python `Config` class
//! this crate's driver is modeled on.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::GraphSchemaError;
use crate::error::Result;
use crate::graph::AttributeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GraphTypeMode {
    Loose,
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub data_source: PathBuf,
    pub node_type_extraction: AttributeMode,
    pub edge_type_extraction: AttributeMode,
    pub out_dir: PathBuf,

    #[serde(default)]
    pub optional_labels: bool,
    #[serde(default)]
    pub optional_properties: bool,
    #[serde(default)]
    pub open_labels: bool,
    #[serde(default)]
    pub open_properties: bool,
    #[serde(default)]
    pub remove_inherited_features: bool,
    #[serde(default)]
    pub abstract_type_lookup: bool,
    #[serde(default)]
    pub max_types: bool,
    #[serde(default)]
    pub validate_graph: bool,
    #[serde(default)]
    pub merge_schema: bool,
    #[serde(default)]
    pub graph_generator: bool,

    #[serde(default = "default_outlier_threshold")]
    pub property_outlier_threshold: usize,
    #[serde(default = "default_outlier_threshold")]
    pub label_outlier_threshold: usize,
    #[serde(default = "default_outlier_threshold")]
    pub endpoint_outlier_threshold: usize,
    #[serde(default = "default_max_node_types")]
    pub max_node_types: usize,
    #[serde(default = "default_max_edge_types")]
    pub max_edge_types: usize,
    #[serde(default = "default_min_entities")]
    pub graph_generator_min_entities: usize,
    #[serde(default = "default_max_entities")]
    pub graph_generator_max_entities: usize,

    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f64,
    #[serde(default = "default_abstract_type_threshold")]
    pub abstract_type_threshold: f64,
    #[serde(default = "default_schema_merge_threshold")]
    pub schema_merge_threshold: f64,

    #[serde(default = "default_graph_type_name")]
    pub graph_type_name: String,
    #[serde(default = "default_graph_type_mode")]
    pub graph_type_mode: GraphTypeMode,
    #[serde(default)]
    pub graph_generator_schema_path: Option<PathBuf>,
    #[serde(default)]
    pub schema_to_merge_path: Option<PathBuf>,
}

fn default_outlier_threshold() -> usize {
    1
}
fn default_max_node_types() -> usize {
    20
}
fn default_max_edge_types() -> usize {
    20
}
fn default_min_entities() -> usize {
    10
}
fn default_max_entities() -> usize {
    15
}
fn default_merge_threshold() -> f64 {
    0.75
}
fn default_abstract_type_threshold() -> f64 {
    0.5
}
fn default_schema_merge_threshold() -> f64 {
    0.5
}
fn default_graph_type_name() -> String {
    "InferredGraph".to_string()
}
fn default_graph_type_mode() -> GraphTypeMode {
    GraphTypeMode::Loose
}

/// CLI-supplied overrides, applied on top of the loaded JSON config. Every
/// field is optional; `None` leaves the loaded value untouched. Each applied
/// override is logged at `info` level.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_source: Option<PathBuf>,
    pub node_type_extraction: Option<AttributeMode>,
    pub edge_type_extraction: Option<AttributeMode>,
    pub out_dir: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| GraphSchemaError::io(path, e))?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| GraphSchemaError::Config(format!("{path:?}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(data_source) = overrides.data_source {
            tracing::info!(?data_source, "overriding data_source from CLI");
            self.data_source = data_source;
        }
        if let Some(mode) = overrides.node_type_extraction {
            tracing::info!(?mode, "overriding node_type_extraction from CLI");
            self.node_type_extraction = mode;
        }
        if let Some(mode) = overrides.edge_type_extraction {
            tracing::info!(?mode, "overriding edge_type_extraction from CLI");
            self.edge_type_extraction = mode;
        }
        if let Some(out_dir) = overrides.out_dir {
            tracing::info!(?out_dir, "overriding out_dir from CLI");
            self.out_dir = out_dir;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.graph_generator_max_entities < self.graph_generator_min_entities {
            return Err(GraphSchemaError::Config(
                "graph_generator_max_entities must be >= graph_generator_min_entities".into(),
            ));
        }
        for (name, threshold) in [
            ("merge_threshold", self.merge_threshold),
            ("abstract_type_threshold", self.abstract_type_threshold),
            ("schema_merge_threshold", self.schema_merge_threshold),
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(GraphSchemaError::Config(format!(
                    "{name} must be within [0, 1], got {threshold}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_entity_bounds() {
        let mut config = minimal_config();
        config.graph_generator_min_entities = 20;
        config.graph_generator_max_entities = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = minimal_config();
        config.merge_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    fn minimal_config() -> Config {
        Config {
            data_source: "graph.json".into(),
            node_type_extraction: AttributeMode::LabelBased,
            edge_type_extraction: AttributeMode::LabelBased,
            out_dir: "out".into(),
            optional_labels: false,
            optional_properties: false,
            open_labels: false,
            open_properties: false,
            remove_inherited_features: false,
            abstract_type_lookup: false,
            max_types: false,
            validate_graph: false,
            merge_schema: false,
            graph_generator: false,
            property_outlier_threshold: 1,
            label_outlier_threshold: 1,
            endpoint_outlier_threshold: 1,
            max_node_types: 20,
            max_edge_types: 20,
            graph_generator_min_entities: 10,
            graph_generator_max_entities: 15,
            merge_threshold: 0.75,
            abstract_type_threshold: 0.5,
            schema_merge_threshold: 0.5,
            graph_type_name: "G".into(),
            graph_type_mode: GraphTypeMode::Loose,
            graph_generator_schema_path: None,
            schema_to_merge_path: None,
        }
    }
}
