//! Synthesizes a fixture instance graph from a parsed or inferred schema.
//! Grounded on the original Python `GraphGenerator`
//! (`original_source/src/graph_generator/graph_generator.py`): every
//! non-abstract type gets a random count of elements in `[min, max]`, each
//! carrying all mandatory features and every optional feature with
//! independent probability 0.5. Gated behind the `correctness` feature,
//! matching the teacher's convention of fencing fixture-only code off the
//! default build.

use indexmap::IndexMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;

use crate::error::GraphSchemaError;
use crate::error::Result;
use crate::graph::DataType;
use crate::graph::Edge;
use crate::graph::GraphModel;
use crate::graph::Node;
use crate::graph::Value;
use crate::types::GraphType;
use crate::types::Type;

/// Generate a synthetic graph from `schema`: every non-abstract node type
/// gets a uniformly random number of nodes in `[min_entities, max_entities]`,
/// then every non-abstract edge type gets the same, with endpoints drawn
/// uniformly from nodes of a permitted type.
pub fn generate_graph(schema: &GraphType, min_entities: usize, max_entities: usize) -> Result<GraphModel> {
    let mut rng = rand::thread_rng();
    let mut graph = GraphModel::new();
    // Node ids grouped by the node type that admits them, so edge endpoint
    // selection can pick uniformly from a permitted type's members.
    let mut node_ids_by_type: IndexMap<String, Vec<String>> = IndexMap::new();

    for node_type in schema.node_types.values() {
        if node_type.is_abstract {
            continue;
        }
        let count = rng.gen_range(min_entities..=max_entities);
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = random_id(&mut rng);
            let node = Node {
                id: id.clone(),
                labels: node_type.labels.clone(),
                properties: random_properties(&mut rng, node_type),
            };
            graph.add_node(node);
            ids.push(id);
        }
        node_ids_by_type.insert(node_type.name.clone(), ids);
    }

    for edge_type in schema.edge_types.values() {
        if edge_type.is_abstract {
            continue;
        }
        let count = rng.gen_range(min_entities..=max_entities);
        for _ in 0..count {
            let start_node_id = pick_endpoint(&mut rng, &edge_type.start_node_types, &node_ids_by_type)
                .ok_or_else(|| {
                    GraphSchemaError::Endpoint(format!(
                        "no node of a permitted start type exists for edge type {}",
                        edge_type.name
                    ))
                })?;
            let end_node_id = pick_endpoint(&mut rng, &edge_type.end_node_types, &node_ids_by_type)
                .ok_or_else(|| {
                    GraphSchemaError::Endpoint(format!(
                        "no node of a permitted end type exists for edge type {}",
                        edge_type.name
                    ))
                })?;
            let edge = Edge {
                id: random_id(&mut rng),
                labels: edge_type.labels.clone(),
                properties: random_properties(&mut rng, edge_type),
                start_node_id,
                end_node_id,
            };
            graph.add_edge(edge);
        }
    }

    graph.infer_property_datatypes();
    info!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "generated synthetic graph"
    );
    Ok(graph)
}

fn pick_endpoint(
    rng: &mut impl Rng,
    permitted_types: &indexmap::IndexSet<String>,
    node_ids_by_type: &IndexMap<String, Vec<String>>,
) -> Option<String> {
    let candidates: Vec<&String> = permitted_types
        .iter()
        .filter_map(|name| node_ids_by_type.get(name))
        .flatten()
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let idx = rng.gen_range(0..candidates.len());
    Some(candidates[idx].clone())
}

fn random_properties(rng: &mut impl Rng, t: &Type) -> IndexMap<String, Value> {
    let mut properties = IndexMap::new();
    for (key, datatype) in &t.properties {
        properties.insert(key.clone(), random_value(rng, *datatype));
    }
    for (key, datatype) in &t.optional_properties {
        if rng.gen_bool(0.5) {
            properties.insert(key.clone(), random_value(rng, *datatype));
        }
    }
    properties
}

fn random_id(rng: &mut impl Rng) -> String {
    rng.sample_iter(Alphanumeric).take(8).map(char::from).collect()
}

fn random_string(rng: &mut impl Rng) -> String {
    rng.sample_iter(Alphanumeric).take(6).map(char::from).collect()
}

/// Draw one value from the domain declared for `datatype` (§6.3). Temporal
/// and spatial tags are represented the same way the graph-side classifier
/// recognizes them (ISO-8601-shaped strings, `{x, y}` maps) so a generated
/// graph round-trips through `infer_property_datatypes` unchanged.
fn random_value(rng: &mut impl Rng, datatype: DataType) -> Value {
    match datatype {
        DataType::String | DataType::Unknown => Value::String(random_string(rng)),
        DataType::Integer => Value::Integer(rng.gen_range(0..100)),
        DataType::Float => Value::Float(rng.gen_range(0.0..100.0)),
        DataType::Boolean => Value::Boolean(rng.gen_bool(0.5)),
        DataType::List => {
            let len = rng.gen_range(1..=5);
            Value::List((0..len).map(|_| Value::String(random_string(rng))).collect())
        }
        DataType::Map => {
            let len = rng.gen_range(1..=5);
            Value::Map((0..len).map(|_| (random_string(rng), Value::String(random_string(rng)))).collect())
        }
        DataType::Date => {
            let day_offset = rng.gen_range(0..9131); // 2000-01-01 .. ~2025
            Value::String(offset_date_string(day_offset))
        }
        DataType::Time => Value::String(format!(
            "{:02}:{:02}:{:02}",
            rng.gen_range(0..24),
            rng.gen_range(0..60),
            rng.gen_range(0..60)
        )),
        DataType::DateTime => {
            let day_offset = rng.gen_range(0..9131);
            Value::String(format!(
                "{}T{:02}:{:02}:{:02}",
                offset_date_string(day_offset),
                rng.gen_range(0..24),
                rng.gen_range(0..60),
                rng.gen_range(0..60)
            ))
        }
        DataType::Duration => Value::String(format!("P{}D", rng.gen_range(0..365))),
        DataType::Point => Value::Map(
            [
                ("x".to_string(), Value::Float(rng.gen_range(-180.0..180.0))),
                ("y".to_string(), Value::Float(rng.gen_range(-90.0..90.0))),
            ]
            .into_iter()
            .collect(),
        ),
    }
}

/// Render a day offset from 2000-01-01 as `YYYY-MM-DD` without pulling in a
/// calendar-date crate, which this fixture-only generator does not warrant.
fn offset_date_string(day_offset: u32) -> String {
    let mut year = 2000;
    let mut remaining = day_offset;
    loop {
        let year_len = if is_leap_year(year) { 366 } else { 365 };
        if remaining < year_len {
            break;
        }
        remaining -= year_len;
        year += 1;
    }
    let month_lengths: [u32; 12] = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };
    let mut month = 0;
    for (i, len) in month_lengths.iter().enumerate() {
        if remaining < *len {
            month = i;
            break;
        }
        remaining -= len;
    }
    format!("{:04}-{:02}-{:02}", year, month + 1, remaining + 1)
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
