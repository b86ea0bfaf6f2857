//! Graph definition loading and semantic validation.

pub mod parser;
pub mod validate;

pub use parser::{parse_graph, parse_graph_str};
pub use validate::validate_definition;
