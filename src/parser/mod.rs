pub mod arguments;
pub mod parser;
pub mod types;

pub use parser::{parse, Parser};
pub use types::ParseError;
