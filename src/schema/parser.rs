//! `nom`-based parser for the PG-Schema mini-language (see `SPEC_FULL.md`
//! section 6.1 for the grammar). `nom` composes more directly with the
//! recursive inheritance-list/property-block structure here than ad hoc
//! regexes would.

use indexmap::IndexMap;
use indexmap::IndexSet;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::alpha1;
use nom::character::complete::alphanumeric1;
use nom::character::complete::char as nchar;
use nom::character::complete::multispace0;
use nom::combinator::map;
use nom::combinator::opt;
use nom::combinator::recognize;
use nom::multi::many0;
use nom::multi::separated_list0;
use nom::multi::separated_list1;
use nom::sequence::delimited;
use nom::sequence::pair;
use nom::sequence::preceded;
use nom::sequence::terminated;
use nom::IResult;

use crate::error::GraphSchemaError;
use crate::error::Result;
use crate::graph::DataType;
use crate::graph::ElementKind;
use crate::types::GraphType;
use crate::types::Type;

struct InheritItem {
    name: String,
    optional_label: bool,
}

struct PropertyDef {
    key: String,
    datatype: DataType,
    optional: bool,
}

struct RawTypeDef {
    is_abstract: bool,
    kind: ElementKind,
    name: String,
    inherit: Vec<InheritItem>,
    open_labels: bool,
    properties: Vec<PropertyDef>,
    open_properties: bool,
    start_endpoints: Vec<String>,
    end_endpoints: Vec<String>,
}

fn ws<'a, F, O>(mut inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    move |input: &'a str| {
        let (input, _) = multispace0(input)?;
        let (input, value) = inner(input)?;
        let (input, _) = multispace0(input)?;
        Ok((input, value))
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(alpha1, many0(alt((alphanumeric1, tag("_"))))))(input)
}

fn datatype(input: &str) -> IResult<&str, DataType> {
    alt((
        map(tag("DATETIME"), |_| DataType::DateTime),
        map(tag("DATE"), |_| DataType::Date),
        map(tag("TIME"), |_| DataType::Time),
        map(tag("DURATION"), |_| DataType::Duration),
        map(tag("STRING"), |_| DataType::String),
        map(tag("INTEGER"), |_| DataType::Integer),
        map(tag("FLOAT"), |_| DataType::Float),
        map(tag("BOOLEAN"), |_| DataType::Boolean),
        map(tag("LIST"), |_| DataType::List),
        map(tag("MAP"), |_| DataType::Map),
        map(tag("POINT"), |_| DataType::Point),
        map(tag("UNKNOWN"), |_| DataType::Unknown),
    ))(input)
}

fn inherit_item(input: &str) -> IResult<&str, InheritItem> {
    let (input, name) = ws(identifier)(input)?;
    let (input, question) = opt(nchar('?'))(input)?;
    Ok((
        input,
        InheritItem {
            name: name.to_string(),
            optional_label: question.is_some(),
        },
    ))
}

fn inherit_list(input: &str) -> IResult<&str, Vec<InheritItem>> {
    separated_list1(ws(nchar('&')), inherit_item)(input)
}

fn endpoint_list(input: &str) -> IResult<&str, Vec<String>> {
    separated_list1(ws(nchar('|')), map(ws(identifier), str::to_string))(input)
}

fn property_def(input: &str) -> IResult<&str, PropertyDef> {
    let (input, optional) = opt(ws(tag("OPTIONAL")))(input)?;
    let (input, key) = ws(identifier)(input)?;
    let (input, dt) = ws(datatype)(input)?;
    Ok((
        input,
        PropertyDef {
            key: key.to_string(),
            datatype: dt,
            optional: optional.is_some(),
        },
    ))
}

/// Returns (properties, open) parsed from a `{ ... }` block.
fn properties_block(input: &str) -> IResult<&str, (Vec<PropertyDef>, bool)> {
    delimited(
        ws(nchar('{')),
        pair(
            separated_list0(ws(nchar(',')), property_def),
            map(opt(preceded(ws(nchar(',')), ws(tag("OPEN")))), |o| o.is_some()),
        ),
        ws(nchar('}')),
    )(input)
}

fn node_def(input: &str) -> IResult<&str, RawTypeDef> {
    let (input, is_abstract) = opt(ws(tag("ABSTRACT")))(input)?;
    let (input, _) = ws(nchar('('))(input)?;
    let (input, name) = ws(identifier)(input)?;
    let (input, _) = ws(nchar(':'))(input)?;
    let (input, inherit) = inherit_list(input)?;
    let (input, open_labels) = map(opt(ws(tag("OPEN"))), |o| o.is_some())(input)?;
    let (input, (properties, open_properties)) =
        map(opt(properties_block), |o| o.unwrap_or_default())(input)?;
    let (input, _) = ws(nchar(')'))(input)?;
    Ok((
        input,
        RawTypeDef {
            is_abstract: is_abstract.is_some(),
            kind: ElementKind::Node,
            name: name.to_string(),
            inherit,
            open_labels,
            properties,
            open_properties,
            start_endpoints: Vec::new(),
            end_endpoints: Vec::new(),
        },
    ))
}

fn edge_def(input: &str) -> IResult<&str, RawTypeDef> {
    let (input, is_abstract) = opt(ws(tag("ABSTRACT")))(input)?;
    let (input, _) = ws(nchar('('))(input)?;
    let (input, _) = ws(nchar(':'))(input)?;
    let (input, start_endpoints) = endpoint_list(input)?;
    let (input, _) = ws(nchar(')'))(input)?;
    let (input, _) = ws(nchar('-'))(input)?;
    let (input, _) = ws(nchar('['))(input)?;
    let (input, name) = ws(identifier)(input)?;
    let (input, _) = ws(nchar(':'))(input)?;
    let (input, inherit) = inherit_list(input)?;
    let (input, open_labels) = map(opt(ws(tag("OPEN"))), |o| o.is_some())(input)?;
    let (input, (properties, open_properties)) =
        map(opt(properties_block), |o| o.unwrap_or_default())(input)?;
    let (input, _) = ws(nchar(']'))(input)?;
    let (input, _) = ws(tag("->"))(input)?;
    let (input, _) = ws(nchar('('))(input)?;
    let (input, _) = ws(nchar(':'))(input)?;
    let (input, end_endpoints) = endpoint_list(input)?;
    let (input, _) = ws(nchar(')'))(input)?;
    Ok((
        input,
        RawTypeDef {
            is_abstract: is_abstract.is_some(),
            kind: ElementKind::Edge,
            name: name.to_string(),
            inherit,
            open_labels,
            properties,
            open_properties,
            start_endpoints,
            end_endpoints,
        },
    ))
}

fn type_def(input: &str) -> IResult<&str, RawTypeDef> {
    alt((edge_def, node_def))(input)
}

fn graph_header(input: &str) -> IResult<&str, (String, bool)> {
    let (input, _) = ws(tag("CREATE"))(input)?;
    let (input, _) = ws(tag("GRAPH"))(input)?;
    let (input, _) = ws(tag("TYPE"))(input)?;
    let (input, name) = ws(identifier)(input)?;
    let (input, mode) = opt(alt((ws(tag("LOOSE")), ws(tag("STRICT")))))(input)?;
    Ok((input, (name.to_string(), mode != Some("STRICT"))))
}

fn schema(input: &str) -> IResult<&str, (String, bool, Vec<RawTypeDef>)> {
    let (input, (name, loose)) = graph_header(input)?;
    let (input, defs) = delimited(
        ws(nchar('{')),
        separated_list0(ws(nchar(',')), type_def),
        ws(nchar('}')),
    )(input)?;
    Ok((input, (name, loose, defs)))
}

/// Parse a full `CREATE GRAPH TYPE ...` document, resolving each type's
/// transitive supertype labels/properties into its own sets.
pub fn parse_graph_type(input: &str) -> Result<GraphType> {
    let (remainder, (name, loose, defs)) = terminated(schema, multispace0)(input)
        .map_err(|e| GraphSchemaError::Parse(format!("{e}")))?;
    if !remainder.trim().is_empty() {
        return Err(GraphSchemaError::Parse(format!(
            "unexpected trailing input: {remainder:?}"
        )));
    }

    let known_names: IndexSet<String> = defs.iter().map(|d| d.name.clone()).collect();

    let mut node_types = IndexMap::new();
    let mut edge_types = IndexMap::new();
    for raw in &defs {
        let mut t = Type::new(raw.name.clone(), raw.kind);
        t.is_abstract = raw.is_abstract;
        t.open_labels = raw.open_labels;
        t.open_properties = raw.open_properties;
        for item in &raw.inherit {
            if item.optional_label {
                t.optional_labels.insert(item.name.clone());
            } else if known_names.contains(&item.name) {
                t.supertypes.insert(item.name.clone());
            } else {
                t.labels.insert(item.name.clone());
            }
        }
        for prop in &raw.properties {
            if prop.optional {
                t.optional_properties.insert(prop.key.clone(), prop.datatype);
            } else {
                t.properties.insert(prop.key.clone(), prop.datatype);
            }
        }
        t.start_node_types = raw.start_endpoints.iter().cloned().collect();
        t.end_node_types = raw.end_endpoints.iter().cloned().collect();
        match raw.kind {
            ElementKind::Node => {
                node_types.insert(t.name.clone(), t);
            }
            ElementKind::Edge => {
                edge_types.insert(t.name.clone(), t);
            }
        }
    }

    // Populate subtype back-references from the parsed supertypes.
    let node_supertype_edges: Vec<(String, String)> = node_types
        .values()
        .flat_map(|t| t.supertypes.iter().map(move |s| (s.clone(), t.name.clone())))
        .collect();
    for (supertype, subtype) in node_supertype_edges {
        if let Some(s) = node_types.get_mut(&supertype) {
            s.subtypes.insert(subtype);
        }
    }
    let edge_supertype_edges: Vec<(String, String)> = edge_types
        .values()
        .flat_map(|t| t.supertypes.iter().map(move |s| (s.clone(), t.name.clone())))
        .collect();
    for (supertype, subtype) in edge_supertype_edges {
        if let Some(s) = edge_types.get_mut(&supertype) {
            s.subtypes.insert(subtype);
        }
    }

    crate::types::propagate_labels_and_properties(&mut node_types);
    crate::types::propagate_labels_and_properties(&mut edge_types);

    Ok(GraphType {
        name,
        loose,
        node_types,
        edge_types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_with_optional_label_and_optional_property() {
        let schema = parse_graph_type(
            "CREATE GRAPH TYPE G { (A : L1 & L2? {k1 INTEGER, OPTIONAL k2 STRING}) }",
        )
        .unwrap();
        let a = &schema.node_types["A"];
        assert!(a.labels.contains("L1"));
        assert!(a.optional_labels.contains("L2"));
        assert_eq!(a.properties.get("k1"), Some(&DataType::Integer));
        assert_eq!(a.optional_properties.get("k2"), Some(&DataType::String));
    }

    #[test]
    fn resolves_supertype_inheritance() {
        let schema = parse_graph_type(
            "CREATE GRAPH TYPE G { (Base : Label1 {shared STRING}), (Sub : Base & Label2 {own INTEGER}) }",
        )
        .unwrap();
        let sub = &schema.node_types["Sub"];
        assert!(sub.labels.contains("Label1"));
        assert!(sub.labels.contains("Label2"));
        assert!(sub.properties.contains_key("shared"));
        assert!(sub.properties.contains_key("own"));
    }

    #[test]
    fn parses_edge_with_endpoints() {
        let schema = parse_graph_type(
            "CREATE GRAPH TYPE G { (A : L {}), (B : L {}), (:A) - [E : L2 {}] -> (:B) }",
        )
        .unwrap();
        let e = &schema.edge_types["E"];
        assert!(e.start_node_types.contains("A"));
        assert!(e.end_node_types.contains("B"));
    }

    #[test]
    fn unknown_supertype_reference_folds_into_mandatory_label() {
        let schema =
            parse_graph_type("CREATE GRAPH TYPE G { (A : NotARealType {}) }").unwrap();
        let a = &schema.node_types["A"];
        assert!(a.labels.contains("NotARealType"));
        assert!(a.supertypes.is_empty());
    }
}
