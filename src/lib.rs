//! avap-server - a multi-tenant execution service for AVAP workflow scripts
//!
//! This library provides the complete DSL parser, AST executor, signed
//! bytecode pipeline, command catalog client and HTTP envelope of the
//! service.

pub mod ast;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod engine;
pub mod executor;
pub mod optimizer;
pub mod packer;
pub mod parser;
pub mod server;

pub use ast::types::*;
pub use catalog::{Catalog, CatalogError, EngineClient};
pub use commands::{Command, CommandRegistry};
pub use engine::Engine;
pub use executor::{Context, ExecError, RequestEnv};
pub use packer::BytecodePacker;
pub use parser::{parse, ParseError, Parser};
