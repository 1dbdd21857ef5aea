//! The instance graph: nodes and edges carrying labels and typed properties,
//! plus per-key dominant-datatype inference used throughout extraction.

use std::collections::HashMap;

use indexmap::IndexMap;
use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

/// The classification tags a property value can be inferred to carry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
pub enum DataType {
    #[strum(to_string = "STRING")]
    String,
    #[strum(to_string = "INTEGER")]
    Integer,
    #[strum(to_string = "FLOAT")]
    Float,
    #[strum(to_string = "BOOLEAN")]
    Boolean,
    #[strum(to_string = "LIST")]
    List,
    #[strum(to_string = "MAP")]
    Map,
    #[strum(to_string = "DATE")]
    Date,
    #[strum(to_string = "TIME")]
    Time,
    #[strum(to_string = "DATETIME")]
    DateTime,
    #[strum(to_string = "DURATION")]
    Duration,
    #[strum(to_string = "POINT")]
    Point,
    #[strum(to_string = "UNKNOWN")]
    Unknown,
}

/// A property value as read from the data source. Values carry just enough
/// structure to drive [`DataType`] classification; this crate does not
/// otherwise interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Classify a value into its [`DataType`] tag. Temporal and spatial tags
    /// (DATE/TIME/DATETIME/DURATION/POINT) are recognized from tagged string
    /// conventions (`"2024-01-01"`, ISO-8601 durations, `{x,y}` maps) rather
    /// than a dedicated wire representation, mirroring how the source graph
    /// data arrives as loosely-typed JSON.
    pub fn infer_datatype(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::List(_) => DataType::List,
            Value::Map(map) => {
                if map.len() == 2 && map.contains_key("x") && map.contains_key("y") {
                    DataType::Point
                } else {
                    DataType::Map
                }
            }
            Value::String(s) => classify_string(s),
        }
    }
}

fn classify_string(s: &str) -> DataType {
    static DATETIME_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").unwrap());
    static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
    static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}$").unwrap());
    static DURATION_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^P(?:\d+Y)?(?:\d+M)?(?:\d+D)?(?:T.*)?$").unwrap());

    if DATETIME_RE.is_match(s) {
        DataType::DateTime
    } else if DATE_RE.is_match(s) {
        DataType::Date
    } else if TIME_RE.is_match(s) {
        DataType::Time
    } else if s.len() > 1 && DURATION_RE.is_match(s) {
        DataType::Duration
    } else {
        DataType::String
    }
}

/// A node or edge's shared shape: an id, a label set, and a property map.
pub trait Element {
    fn id(&self) -> &str;
    fn labels(&self) -> &IndexSet<String>;
    fn properties(&self) -> &IndexMap<String, Value>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub labels: IndexSet<String>,
    pub properties: IndexMap<String, Value>,
}

impl Element for Node {
    fn id(&self) -> &str {
        &self.id
    }
    fn labels(&self) -> &IndexSet<String> {
        &self.labels
    }
    fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub labels: IndexSet<String>,
    pub properties: IndexMap<String, Value>,
    pub start_node_id: String,
    pub end_node_id: String,
}

impl Element for Edge {
    fn id(&self) -> &str {
        &self.id
    }
    fn labels(&self) -> &IndexSet<String> {
        &self.labels
    }
    fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }
}

/// On-disk shape for a self-contained instance graph: a flat list of nodes
/// and edges. This is the fixed contract this crate relies on from instance-
/// graph acquisition; swapping in a live graph-database extractor means
/// producing this same shape rather than a file on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// The full instance graph plus the derived per-key dominant datatypes
/// computed by [`GraphModel::infer_property_datatypes`].
#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    pub nodes: IndexMap<String, Node>,
    pub edges: IndexMap<String, Edge>,
    node_property_datatypes: HashMap<String, DataType>,
    edge_property_datatypes: HashMap<String, DataType>,
}

impl GraphModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a graph from a [`GraphDocument`] JSON file at `path`, then
    /// immediately infer property datatypes so the model is ready for
    /// extraction. This is the fixed-contract boundary a live graph-database
    /// extractor would replace.
    pub fn load_json(path: &std::path::Path) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::error::GraphSchemaError::io(path, e))?;
        let document: GraphDocument = serde_json::from_str(&contents).map_err(|e| {
            crate::error::GraphSchemaError::Extraction(format!("{path:?}: {e}"))
        })?;
        let mut graph = Self::new();
        for node in document.nodes {
            graph.add_node(node);
        }
        for edge in document.edges {
            graph.add_edge(edge);
        }
        graph.infer_property_datatypes();
        Ok(graph)
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.insert(edge.id.clone(), edge);
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn all_node_labels(&self) -> IndexSet<String> {
        self.nodes
            .values()
            .flat_map(|n| n.labels.iter().cloned())
            .collect()
    }

    pub fn all_edge_labels(&self) -> IndexSet<String> {
        self.edges
            .values()
            .flat_map(|e| e.labels.iter().cloned())
            .collect()
    }

    pub fn all_node_property_keys(&self) -> IndexSet<String> {
        self.nodes
            .values()
            .flat_map(|n| n.properties.keys().cloned())
            .collect()
    }

    pub fn all_edge_property_keys(&self) -> IndexSet<String> {
        self.edges
            .values()
            .flat_map(|e| e.properties.keys().cloned())
            .collect()
    }

    /// Dominant datatype across all observed values of a node property key.
    pub fn node_property_datatype(&self, key: &str) -> DataType {
        self.node_property_datatypes
            .get(key)
            .copied()
            .unwrap_or(DataType::Unknown)
    }

    pub fn edge_property_datatype(&self, key: &str) -> DataType {
        self.edge_property_datatypes
            .get(key)
            .copied()
            .unwrap_or(DataType::Unknown)
    }

    /// Tally the classified datatype of every observed value for each
    /// property key and keep the most frequent one, breaking ties by first
    /// occurrence order.
    pub fn infer_property_datatypes(&mut self) {
        self.node_property_datatypes =
            dominant_datatypes(self.nodes.values().map(|n| &n.properties));
        self.edge_property_datatypes =
            dominant_datatypes(self.edges.values().map(|e| &e.properties));
    }

    /// True iff some element of `kind` has an empty projection under `mode`,
    /// meaning the top concept must be retained during lattice construction.
    pub fn is_top_concept_required(&self, mode: AttributeMode, kind: ElementKind) -> bool {
        match kind {
            ElementKind::Node => self.nodes.values().any(|n| projection_is_empty(n, mode)),
            ElementKind::Edge => self.edges.values().any(|e| projection_is_empty(e, mode)),
        }
    }
}

fn projection_is_empty(element: &impl Element, mode: AttributeMode) -> bool {
    match mode {
        AttributeMode::LabelBased => element.labels().is_empty(),
        AttributeMode::PropertyBased => element.properties().is_empty(),
        AttributeMode::LabelPropertyBased => {
            element.labels().is_empty() && element.properties().is_empty()
        }
    }
}

fn dominant_datatypes<'a>(
    property_maps: impl Iterator<Item = &'a IndexMap<String, Value>>,
) -> HashMap<String, DataType> {
    let mut counts: IndexMap<String, IndexMap<DataType, usize>> = IndexMap::new();
    for properties in property_maps {
        for (key, value) in properties {
            let entry = counts.entry(key.clone()).or_default();
            *entry.entry(value.infer_datatype()).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .map(|(key, tallies)| {
            // `Iterator::max_by_key` keeps the *last* maximum on a tie; the
            // dominant datatype must instead keep the *first*-seen one, so
            // fold manually rather than reach for max_by_key.
            let mut best: Option<(DataType, usize)> = None;
            for (datatype, count) in tallies {
                match best {
                    Some((_, best_count)) if count <= best_count => {}
                    _ => best = Some((datatype, count)),
                }
            }
            (key, best.map_or(DataType::Unknown, |(dt, _)| dt))
        })
        .collect()
}

/// Which facet of an element the formal context is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeMode {
    LabelBased,
    PropertyBased,
    LabelPropertyBased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Node,
    Edge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_datatype_ties_break_by_first_seen_order() {
        let mut graph = GraphModel::new();
        graph.add_node(Node {
            id: "n1".into(),
            labels: IndexSet::new(),
            properties: [("age".to_string(), Value::String("thirty".into()))]
                .into_iter()
                .collect(),
        });
        graph.add_node(Node {
            id: "n2".into(),
            labels: IndexSet::new(),
            properties: [("age".to_string(), Value::Integer(30))].into_iter().collect(),
        });
        graph.infer_property_datatypes();
        // STRING was observed first and ties 1-1 against INTEGER; first-seen
        // must win, not whichever max_by_key happens to return last.
        assert_eq!(graph.node_property_datatype("age"), DataType::String);
    }

    #[test]
    fn load_json_round_trips_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{"nodes": [{"id": "n1", "labels": ["Person"], "properties": {"name": "A"}}], "edges": []}"#,
        )
        .unwrap();
        let graph = GraphModel::load_json(&path).unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.get_node("n1").unwrap().labels.contains("Person"));
    }
}
