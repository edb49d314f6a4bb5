//! Abstract Syntax Tree (AST) Types for the AVAP DSL
//!
//! The parser produces a list of statement nodes per script. Nodes are
//! immutable after parsing and shared behind `Arc` through the AST cache, so
//! concurrent requests executing the same script never copy or mutate them.

use indexmap::IndexMap;
use serde_json::Value;

/// A single parsed statement.
///
/// Whether a `Call` names a user-defined function or a catalog command is
/// decided at dispatch time: the executor consults the script's function
/// table first, then the command catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    /// `target = expr` where the right-hand side is not a pure command call.
    Assign { target: String, expr: String },
    /// `return expr` inside a function body.
    Return { expr: String },
    /// `if (args) ... else() ... end()`
    If {
        properties: Vec<Value>,
        branches: Branches,
    },
    /// `startLoop(var, from, to) ... endLoop()`
    Loop {
        properties: Vec<Value>,
        sequence: Vec<AstNode>,
    },
    /// `name(args)` or `target = name(args)`.
    Call {
        name: String,
        properties: Vec<Value>,
        target: Option<String>,
    },
}

impl AstNode {
    /// The node's type name as it appears in execution logs.
    pub fn type_name(&self) -> &str {
        match self {
            AstNode::Assign { .. } => "assign",
            AstNode::Return { .. } => "return",
            AstNode::If { .. } => "if",
            AstNode::Loop { .. } => "startLoop",
            AstNode::Call { name, .. } => name,
        }
    }
}

/// True/false statement lists of an `if` node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Branches {
    pub on_true: Vec<AstNode>,
    pub on_false: Vec<AstNode>,
}

/// A user-defined function registered at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Ordered parameter names.
    pub params: Vec<String>,
    /// Body statements.
    pub nodes: Vec<AstNode>,
    /// First `return` expression of the body, if any.
    pub return_expr: Option<String>,
}

/// Function definitions in declaration order.
pub type FunctionTable = IndexMap<String, FunctionDef>;

/// A fully parsed script: top-level statements plus its function table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedScript {
    pub nodes: Vec<AstNode>,
    pub functions: FunctionTable,
}
