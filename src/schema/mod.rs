//! Parsing and emission of the PG-Schema mini-language. Emission lives on
//! [`crate::types::GraphType`]'s `Display` impl; this module owns parsing.

mod parser;

pub use parser::parse_graph_type;
