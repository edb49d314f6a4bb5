pub mod types;

pub use types::{AstNode, Branches, FunctionDef, FunctionTable, ParsedScript};
