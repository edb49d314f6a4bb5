//! Compile-Time AST Optimizer
//!
//! Applied by the compile endpoint before packing: constant folding on
//! binary operations whose operands are both constants, and dead-branch
//! elimination on `if` tests whose operands are constant. The optimized
//! AST renders back to DSL source, so the stored package stays plain text
//! under the signature.

use serde_json::Value;

use crate::ast::types::{AstNode, Branches, FunctionTable};
use crate::executor::eval::{self, BinOp, Builtin, Expr, Scope};
use crate::executor::value::{contains_math_op, to_display};
use crate::parser::arguments::clean_value;
use crate::parser::{self, ParseError};

/// Parse, optimize and re-render a script.
pub fn optimize_script(source: &str) -> Result<String, ParseError> {
    let parsed = parser::parse(source)?;
    let nodes = fold_nodes(parsed.nodes);
    Ok(render_script(&parsed.functions, &nodes))
}

// ----------------------------------------------------------------------------
// Folding
// ----------------------------------------------------------------------------

fn fold_nodes(nodes: Vec<AstNode>) -> Vec<AstNode> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            AstNode::Assign { target, expr } => out.push(AstNode::Assign {
                target,
                expr: fold_expr_text(&expr),
            }),
            AstNode::Return { expr } => out.push(AstNode::Return {
                expr: fold_expr_text(&expr),
            }),
            AstNode::If {
                properties,
                branches,
            } => {
                let on_true = fold_nodes(branches.on_true);
                let on_false = fold_nodes(branches.on_false);
                match const_if_verdict(&properties) {
                    Some(true) => out.extend(on_true),
                    Some(false) => out.extend(on_false),
                    None => out.push(AstNode::If {
                        properties,
                        branches: Branches { on_true, on_false },
                    }),
                }
            }
            AstNode::Loop {
                properties,
                sequence,
            } => out.push(AstNode::Loop {
                properties,
                sequence: fold_nodes(sequence),
            }),
            AstNode::Call {
                name,
                properties,
                target,
            } => out.push(AstNode::Call {
                name,
                properties: properties.into_iter().map(fold_property).collect(),
                target,
            }),
        }
    }
    out
}

fn fold_property(prop: Value) -> Value {
    match &prop {
        Value::String(s) if contains_math_op(s) => {
            let folded = fold_expr_text(s);
            if folded == *s {
                prop
            } else {
                Value::String(folded)
            }
        }
        _ => prop,
    }
}

/// Fold an expression's constant subtrees and render it back; the original
/// text survives anything that does not parse as an expression.
fn fold_expr_text(text: &str) -> String {
    match eval::parse_expr(text) {
        Ok(expr) => render_expr(&fold_expr(expr)),
        Err(_) => text.to_string(),
    }
}

fn is_const(expr: &Expr) -> bool {
    matches!(expr, Expr::Num(_) | Expr::Str(_))
}

fn expr_from_value(v: &Value) -> Option<Expr> {
    match v {
        Value::Number(n) => Some(Expr::Num(n.clone())),
        Value::String(s) => Some(Expr::Str(s.clone())),
        _ => None,
    }
}

fn fold_expr(expr: Expr) -> Expr {
    match expr {
        Expr::Binary { op, left, right } => {
            let left = fold_expr(*left);
            let right = fold_expr(*right);
            let folded = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
            try_const_eval(folded)
        }
        Expr::Neg(inner) => {
            let folded = Expr::Neg(Box::new(fold_expr(*inner)));
            try_const_eval(folded)
        }
        Expr::Call { func, arg } => Expr::Call {
            func,
            arg: Box::new(fold_expr(*arg)),
        },
        other => other,
    }
}

/// Evaluate a subtree at compile time when all operands are constants.
fn try_const_eval(expr: Expr) -> Expr {
    let all_const = match &expr {
        Expr::Binary { left, right, .. } => is_const(left) && is_const(right),
        Expr::Neg(inner) => is_const(inner),
        _ => false,
    };
    if !all_const {
        return expr;
    }
    let empty = indexmap::IndexMap::new();
    let scope = Scope {
        globals: &empty,
        locals: None,
    };
    match eval::eval(&expr, scope) {
        Ok(v) => expr_from_value(&v).unwrap_or(expr),
        Err(_) => expr,
    }
}

/// A constant `if` test needs both operands to be numeric literals and a
/// known comparator; bare names could still be variables.
fn const_if_verdict(props: &[Value]) -> Option<bool> {
    let (Value::Number(a), Value::Number(b)) = (props.first()?, props.get(1)?) else {
        return None;
    };
    let op = to_display(props.get(2)?);
    let (x, y) = (a.as_f64()?, b.as_f64()?);
    match op.as_str() {
        "=" | "==" => Some(x == y),
        "!=" => Some(x != y),
        ">" => Some(x > y),
        "<" => Some(x < y),
        ">=" => Some(x >= y),
        "<=" => Some(x <= y),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Rendering
// ----------------------------------------------------------------------------

fn op_char(op: BinOp) -> char {
    match op {
        BinOp::Add => '+',
        BinOp::Sub => '-',
        BinOp::Mul => '*',
        BinOp::Div => '/',
        BinOp::Mod => '%',
    }
}

fn builtin_name(func: Builtin) -> &'static str {
    match func {
        Builtin::Str => "str",
        Builtin::Int => "int",
        Builtin::Float => "float",
        Builtin::Len => "len",
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary {
            op: BinOp::Add | BinOp::Sub,
            ..
        } => 1,
        Expr::Binary { .. } => 2,
        _ => 3,
    }
}

fn render_child(child: &Expr, parent_prec: u8, is_right_of_noncommutative: bool) -> String {
    let rendered = render_expr(child);
    let child_prec = precedence(child);
    if child_prec < parent_prec || (is_right_of_noncommutative && child_prec == parent_prec) {
        format!("({})", rendered)
    } else {
        rendered
    }
}

fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Num(n) => n.to_string(),
        Expr::Str(s) => format!("\"{}\"", s),
        Expr::Var(name) => name.clone(),
        Expr::Neg(inner) => format!("-{}", render_child(inner, 3, false)),
        Expr::Binary { op, left, right } => {
            let p = precedence(expr);
            let noncommutative = matches!(op, BinOp::Sub | BinOp::Div | BinOp::Mod);
            format!(
                "{} {} {}",
                render_child(left, p, false),
                op_char(*op),
                render_child(right, p, noncommutative)
            )
        }
        Expr::Call { func, arg } => format!("{}({})", builtin_name(*func), render_expr(arg)),
    }
}

/// A rendered token must clean back to the same string value; anything the
/// tokenizer would split or re-type gets quoted.
fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.contains([',', '"', '\''])
        || clean_value(s) != Value::String(s.to_string())
}

fn render_property(v: &Value) -> String {
    match v {
        Value::String(s) => {
            if s.contains(['(', ')']) || contains_math_op(s) {
                // Expression text passes through untouched.
                s.clone()
            } else if needs_quotes(s) {
                format!("\"{}\"", s)
            } else {
                s.clone()
            }
        }
        other => other.to_string(),
    }
}

fn render_properties(props: &[Value]) -> String {
    props
        .iter()
        .map(render_property)
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_line(out: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(line);
    out.push('\n');
}

fn render_nodes(out: &mut String, nodes: &[AstNode], depth: usize) {
    for node in nodes {
        match node {
            AstNode::Assign { target, expr } => {
                push_line(out, depth, &format!("{} = {}", target, expr))
            }
            AstNode::Return { expr } => push_line(out, depth, &format!("return {}", expr)),
            AstNode::If {
                properties,
                branches,
            } => {
                push_line(out, depth, &format!("if({})", render_properties(properties)));
                render_nodes(out, &branches.on_true, depth + 1);
                if !branches.on_false.is_empty() {
                    push_line(out, depth, "else()");
                    render_nodes(out, &branches.on_false, depth + 1);
                }
                push_line(out, depth, "end()");
            }
            AstNode::Loop {
                properties,
                sequence,
            } => {
                push_line(
                    out,
                    depth,
                    &format!("startLoop({})", render_properties(properties)),
                );
                render_nodes(out, sequence, depth + 1);
                push_line(out, depth, "endLoop()");
            }
            AstNode::Call {
                name,
                properties,
                target,
            } => {
                let call = format!("{}({})", name, render_properties(properties));
                match target {
                    Some(t) => push_line(out, depth, &format!("{} = {}", t, call)),
                    None => push_line(out, depth, &call),
                }
            }
        }
    }
}

fn render_script(functions: &FunctionTable, nodes: &[AstNode]) -> String {
    let mut out = String::new();
    for (name, func) in functions {
        push_line(
            &mut out,
            0,
            &format!("function {}({}) {{", name, func.params.join(", ")),
        );
        render_nodes(&mut out, &func.nodes, 1);
        push_line(&mut out, 0, "}");
    }
    render_nodes(&mut out, nodes, 0);
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folding_in_assignment() {
        let optimized = optimize_script("x = 2 + 3 * 4").unwrap();
        assert_eq!(optimized, "x = 14");
    }

    #[test]
    fn test_folding_preserves_variables() {
        let optimized = optimize_script("x = n + 1").unwrap();
        assert_eq!(optimized, "x = n + 1");
    }

    #[test]
    fn test_partial_folding() {
        let optimized = optimize_script("x = n + 2 * 3").unwrap();
        assert_eq!(optimized, "x = n + 6");
    }

    #[test]
    fn test_string_concat_folds() {
        let optimized = optimize_script("x = \"a\" + \"b\"").unwrap();
        assert_eq!(optimized, "x = \"ab\"");
    }

    #[test]
    fn test_dead_branch_elimination_true() {
        let script = "if(1, 1, =)\n  addVar(x, 1)\nelse()\n  addVar(x, 2)\nend()";
        let optimized = optimize_script(script).unwrap();
        assert_eq!(optimized, "addVar(x, 1)");
    }

    #[test]
    fn test_dead_branch_elimination_false() {
        let script = "if(1, 2, =)\n  addVar(x, 1)\nelse()\n  addVar(x, 2)\nend()";
        let optimized = optimize_script(script).unwrap();
        assert_eq!(optimized, "addVar(x, 2)");
    }

    #[test]
    fn test_variable_test_is_preserved() {
        let script = "if(max, 0, >)\n  addVar(x, 1)\nend()";
        let optimized = optimize_script(script).unwrap();
        assert!(optimized.contains("if(max, 0, >)"));
        assert!(optimized.contains("end()"));
    }

    #[test]
    fn test_loop_body_folds() {
        let script = "startLoop(i, 1, 3)\n  x = 2 + 2\nendLoop()";
        let optimized = optimize_script(script).unwrap();
        assert!(optimized.contains("x = 4"));
        assert!(optimized.starts_with("startLoop(i, 1, 3)"));
    }

    #[test]
    fn test_function_definitions_render() {
        let script = "function doble(n) {\n  r = n * 2\n  return r\n}\ntotal = doble(21)";
        let optimized = optimize_script(script).unwrap();
        assert!(optimized.starts_with("function doble(n) {"));
        assert!(optimized.contains("return r"));
        assert!(optimized.contains("total = doble(21)"));
    }

    #[test]
    fn test_optimized_script_reparses() {
        let script = "if(estado, \"on\", =)\n  x = 1 + 2\nelse()\n  x = 0 - 1\nend()";
        let optimized = optimize_script(script).unwrap();
        let reparsed = crate::parser::parse(&optimized).unwrap();
        assert_eq!(reparsed.nodes.len(), 1);
    }
}
