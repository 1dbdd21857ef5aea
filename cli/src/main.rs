use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pg_schema_discovery::config::Config;
use pg_schema_discovery::config::ConfigOverrides;
use pg_schema_discovery::graph::AttributeMode;
use pg_schema_discovery::graph::GraphModel;
use pg_schema_discovery::schema::parse_graph_type;
use pg_schema_discovery::types::GraphType;

/// CLI arguments. See <https://docs.rs/clap/latest/clap/_derive/index.html>.
#[derive(Parser)]
struct Args {
    /// Path to the JSON driver configuration.
    config: PathBuf,

    /// Overrides the configured instance-graph path.
    #[arg(long)]
    data_source: Option<PathBuf>,
    /// Overrides the configured node attribute mode.
    #[arg(long, value_enum)]
    node_type_extraction: Option<CliAttributeMode>,
    /// Overrides the configured edge attribute mode.
    #[arg(long, value_enum)]
    edge_type_extraction: Option<CliAttributeMode>,
    /// Overrides the configured output directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliAttributeMode {
    LabelBased,
    PropertyBased,
    LabelPropertyBased,
}

impl From<CliAttributeMode> for AttributeMode {
    fn from(mode: CliAttributeMode) -> Self {
        match mode {
            CliAttributeMode::LabelBased => AttributeMode::LabelBased,
            CliAttributeMode::PropertyBased => AttributeMode::PropertyBased,
            CliAttributeMode::LabelPropertyBased => AttributeMode::LabelPropertyBased,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(%err, "discovery run failed");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(true)` on a clean, conforming run and `Ok(false)` when the
/// graph failed validation, so `main` can map each to an exit code (§6.2/§7)
/// without treating a failed validation as an unexpected error.
fn run(args: Args) -> anyhow::Result<bool> {
    let mut config = Config::load(&args.config)?;
    config.apply_overrides(ConfigOverrides {
        data_source: args.data_source,
        node_type_extraction: args.node_type_extraction.map(Into::into),
        edge_type_extraction: args.edge_type_extraction.map(Into::into),
        out_dir: args.out_dir,
    });

    std::fs::create_dir_all(&config.out_dir)?;

    let graph = GraphModel::load_json(&config.data_source)?;

    let schema_to_merge = if config.merge_schema {
        let path = config.schema_to_merge_path.as_ref().ok_or_else(|| {
            anyhow::anyhow!("merge_schema is set but schema_to_merge_path is missing")
        })?;
        let text = std::fs::read_to_string(path)?;
        Some(parse_graph_type(&text)?)
    } else {
        None
    };

    let mut output =
        pg_schema_discovery::discover_schema(&graph, &config, schema_to_merge.as_ref())?;
    pg_schema_discovery::apply_openness(
        &mut output.schema.node_types,
        config.open_labels,
        config.open_properties,
    );
    pg_schema_discovery::apply_openness(
        &mut output.schema.edge_types,
        config.open_labels,
        config.open_properties,
    );

    std::fs::write(config.out_dir.join("schema.txt"), output.schema.to_string())?;
    std::fs::write(
        config.out_dir.join("nodes_and_edges.json"),
        serde_json::to_string_pretty(&NodesAndEdges::from(&output.schema))?,
    )?;
    if schema_to_merge.is_some() {
        std::fs::write(config.out_dir.join("merged_schema.pgs"), output.schema.to_string())?;
    }

    run_graph_generator(&config, &output.schema)?;

    let Some(report) = output.validation else {
        return Ok(true);
    };
    if report.is_valid() {
        return Ok(true);
    }
    std::fs::write(
        config.out_dir.join("invalid_elements.json"),
        serde_json::to_string_pretty(&report)?,
    )?;
    Ok(false)
}

#[cfg(feature = "correctness")]
fn run_graph_generator(config: &Config, inferred_schema: &GraphType) -> anyhow::Result<()> {
    if !config.graph_generator {
        return Ok(());
    }
    let fixture_schema = match &config.graph_generator_schema_path {
        Some(path) => parse_graph_type(&std::fs::read_to_string(path)?)?,
        None => inferred_schema.clone(),
    };
    let generated = pg_schema_discovery::generator::generate_graph(
        &fixture_schema,
        config.graph_generator_min_entities,
        config.graph_generator_max_entities,
    )?;
    std::fs::write(
        config.out_dir.join("generated_graph.json"),
        serde_json::to_string_pretty(&GraphDocumentView::from(&generated))?,
    )?;
    Ok(())
}

#[cfg(not(feature = "correctness"))]
fn run_graph_generator(config: &Config, _inferred_schema: &GraphType) -> anyhow::Result<()> {
    if config.graph_generator {
        anyhow::bail!("graph_generator is enabled but this build lacks the `correctness` feature");
    }
    Ok(())
}

/// Per-type member id lists, the `nodes_and_edges.json` artifact (§6.2).
#[derive(serde::Serialize)]
struct NodesAndEdges {
    node_types: std::collections::BTreeMap<String, Vec<String>>,
    edge_types: std::collections::BTreeMap<String, Vec<String>>,
}

impl From<&GraphType> for NodesAndEdges {
    fn from(schema: &GraphType) -> Self {
        Self {
            node_types: schema
                .node_types
                .iter()
                .map(|(name, t)| (name.clone(), t.members.iter().cloned().collect()))
                .collect(),
            edge_types: schema
                .edge_types
                .iter()
                .map(|(name, t)| (name.clone(), t.members.iter().cloned().collect()))
                .collect(),
        }
    }
}

#[cfg(feature = "correctness")]
#[derive(serde::Serialize)]
struct GraphDocumentView {
    nodes: Vec<pg_schema_discovery::graph::Node>,
    edges: Vec<pg_schema_discovery::graph::Edge>,
}

#[cfg(feature = "correctness")]
impl From<&GraphModel> for GraphDocumentView {
    fn from(graph: &GraphModel) -> Self {
        Self {
            nodes: graph.nodes.values().cloned().collect(),
            edges: graph.edges.values().cloned().collect(),
        }
    }
}
