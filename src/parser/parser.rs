//! Line-Oriented Recursive Parser for the AVAP DSL
//!
//! The language is block structured but lexically flat: one statement per
//! line, blocks opened by `if(...)` / `startLoop(...)` and closed by
//! `else()` / `end()` / `endLoop()`. A stack of open frames collects the
//! statements of the innermost block; closing a frame materializes the
//! corresponding node into its parent list.
//!
//! `function name(p1, ...) { ... }` bodies are collected with a curly-depth
//! counter and parsed recursively; definitions register into the parser's
//! function table and do not appear in the statement stream.

use serde_json::Value;

use crate::ast::types::{AstNode, Branches, FunctionDef, FunctionTable, ParsedScript};
use crate::parser::arguments::parse_arguments;
use crate::parser::types::ParseError;

/// Parse a script into its AST and function table.
pub fn parse(script: &str) -> Result<ParsedScript, ParseError> {
    Parser::new().parse(script)
}

#[derive(Debug, Default)]
pub struct Parser {
    functions: FunctionTable,
}

/// An open block being collected.
enum Frame {
    IfTrue {
        properties: Vec<Value>,
        nodes: Vec<AstNode>,
    },
    IfFalse {
        properties: Vec<Value>,
        on_true: Vec<AstNode>,
        nodes: Vec<AstNode>,
    },
    Loop {
        properties: Vec<Value>,
        nodes: Vec<AstNode>,
    },
}

fn push_node(top: &mut Vec<AstNode>, stack: &mut [Frame], node: AstNode) {
    match stack.last_mut() {
        Some(Frame::IfTrue { nodes, .. })
        | Some(Frame::IfFalse { nodes, .. })
        | Some(Frame::Loop { nodes, .. }) => nodes.push(node),
        None => top.push(node),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Text between the first `(` and the last `)` of a statement line.
fn inner_parens(line: &str, lineno: usize) -> Result<&str, ParseError> {
    let open = line
        .find('(')
        .ok_or_else(|| ParseError::new("expected '('", lineno))?;
    let close = line
        .rfind(')')
        .filter(|c| *c > open)
        .ok_or_else(|| ParseError::new("expected ')'", lineno))?;
    Ok(&line[open + 1..close])
}

const MATH_OPS: [char; 4] = ['+', '-', '*', '/'];

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(mut self, script: &str) -> Result<ParsedScript, ParseError> {
        let lines: Vec<&str> = script.trim().split('\n').collect();
        let nodes = self.parse_lines(&lines, 0)?;
        Ok(ParsedScript {
            nodes,
            functions: self.functions,
        })
    }

    fn parse_lines(
        &mut self,
        lines: &[&str],
        line_offset: usize,
    ) -> Result<Vec<AstNode>, ParseError> {
        let mut top: Vec<AstNode> = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let lineno = line_offset + i + 1;
            let line = lines[i].trim();

            if line.is_empty() || line.starts_with("//") {
                i += 1;
                continue;
            }

            if line.starts_with("if(") || line.starts_with("if (") {
                let properties = parse_arguments(inner_parens(line, lineno)?, lineno)?;
                stack.push(Frame::IfTrue {
                    properties,
                    nodes: Vec::new(),
                });
                i += 1;
                continue;
            }

            if line.starts_with("else()") || line.starts_with("else (") {
                match stack.pop() {
                    Some(Frame::IfTrue { properties, nodes }) => stack.push(Frame::IfFalse {
                        properties,
                        on_true: nodes,
                        nodes: Vec::new(),
                    }),
                    _ => return Err(ParseError::new("else() without a matching if", lineno)),
                }
                i += 1;
                continue;
            }

            if line.starts_with("end()") || line.starts_with("endLoop()") {
                let node = match stack.pop() {
                    Some(Frame::IfTrue { properties, nodes }) => AstNode::If {
                        properties,
                        branches: Branches {
                            on_true: nodes,
                            on_false: Vec::new(),
                        },
                    },
                    Some(Frame::IfFalse {
                        properties,
                        on_true,
                        nodes,
                    }) => AstNode::If {
                        properties,
                        branches: Branches {
                            on_true,
                            on_false: nodes,
                        },
                    },
                    Some(Frame::Loop { properties, nodes }) => AstNode::Loop {
                        properties,
                        sequence: nodes,
                    },
                    None => return Err(ParseError::new("end() without an open block", lineno)),
                };
                push_node(&mut top, &mut stack, node);
                i += 1;
                continue;
            }

            if line.starts_with("startLoop(") {
                let properties = parse_arguments(inner_parens(line, lineno)?, lineno)?;
                stack.push(Frame::Loop {
                    properties,
                    nodes: Vec::new(),
                });
                i += 1;
                continue;
            }

            if let Some(header) = line.strip_prefix("function ") {
                i = self.parse_function(header, lines, i, line_offset)?;
                continue;
            }

            if let Some(expr) = line.strip_prefix("return ") {
                push_node(
                    &mut top,
                    &mut stack,
                    AstNode::Return {
                        expr: expr.trim().to_string(),
                    },
                );
                i += 1;
                continue;
            }

            if let Some(eq) = line.find('=') {
                let target = line[..eq].trim();
                if is_identifier(target) {
                    let expr = line[eq + 1..].trim();
                    push_node(&mut top, &mut stack, Self::parse_assignment(target, expr, lineno)?);
                    i += 1;
                    continue;
                }
            }

            if let (Some(open), Some(close)) = (line.find('('), line.rfind(')')) {
                if close > open {
                    let name = line[..open].trim().to_string();
                    let properties = parse_arguments(&line[open + 1..close], lineno)?;
                    push_node(
                        &mut top,
                        &mut stack,
                        AstNode::Call {
                            name,
                            properties,
                            target: None,
                        },
                    );
                }
            }
            i += 1;
        }

        if !stack.is_empty() {
            return Err(ParseError::new(
                "unterminated block: missing end()",
                line_offset + lines.len(),
            ));
        }
        Ok(top)
    }

    /// `target = expr`: a pure command call when the right-hand side is a
    /// single call with no math operator, otherwise a plain assignment.
    fn parse_assignment(target: &str, expr: &str, lineno: usize) -> Result<AstNode, ParseError> {
        let is_pure_command = expr.contains('(')
            && expr.ends_with(')')
            && !MATH_OPS.iter().any(|op| expr.contains(*op));

        if is_pure_command {
            if let Some(open) = expr.find('(') {
                let name = expr[..open].trim().to_string();
                let properties = parse_arguments(&expr[open + 1..expr.len() - 1], lineno)?;
                return Ok(AstNode::Call {
                    name,
                    properties,
                    target: Some(target.to_string()),
                });
            }
        }
        Ok(AstNode::Assign {
            target: target.to_string(),
            expr: expr.to_string(),
        })
    }

    /// Collect a function body up to the matching `}` and register it.
    /// Returns the line index just past the body.
    fn parse_function(
        &mut self,
        header: &str,
        lines: &[&str],
        at: usize,
        line_offset: usize,
    ) -> Result<usize, ParseError> {
        let lineno = line_offset + at + 1;
        let open = header
            .find('(')
            .ok_or_else(|| ParseError::new("malformed function header", lineno))?;
        let close = header
            .find(')')
            .filter(|c| *c > open)
            .ok_or_else(|| ParseError::new("malformed function header", lineno))?;
        let name = header[..open].trim().to_string();
        let params: Vec<String> = header[open + 1..close]
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();

        let mut i = at + 1;
        let body_start = i;
        let mut brace_count: i32 = 1;
        let mut body: Vec<&str> = Vec::new();
        while i < lines.len() && brace_count > 0 {
            let l = lines[i];
            brace_count += l.matches('{').count() as i32;
            brace_count -= l.matches('}').count() as i32;
            body.push(l);
            i += 1;
        }
        if brace_count > 0 {
            return Err(ParseError::new(
                format!("unterminated body of function '{}'", name),
                lineno,
            ));
        }
        // The last collected line holds the closing brace.
        body.pop();

        let nodes = self.parse_lines(&body, line_offset + body_start)?;
        let return_expr = nodes.iter().find_map(|n| match n {
            AstNode::Return { expr } => Some(expr.clone()),
            _ => None,
        });
        self.functions.insert(
            name,
            FunctionDef {
                params,
                nodes,
                return_expr,
            },
        );
        Ok(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_command_call() {
        let parsed = parse("addVar(numero, 123.45)\naddResult(numero)").unwrap();
        assert_eq!(parsed.nodes.len(), 2);
        assert_eq!(
            parsed.nodes[0],
            AstNode::Call {
                name: "addVar".into(),
                properties: vec![json!("numero"), json!(123.45)],
                target: None,
            }
        );
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let parsed = parse("// comment\n\naddVar(x, 1)\n").unwrap();
        assert_eq!(parsed.nodes.len(), 1);
    }

    #[test]
    fn test_if_else_branches() {
        let script = "if(rol, \"admin\", =)\n  addVar(acceso, \"concedido\")\nelse()\n  addVar(acceso, \"denegado\")\nend()";
        let parsed = parse(script).unwrap();
        assert_eq!(parsed.nodes.len(), 1);
        match &parsed.nodes[0] {
            AstNode::If {
                properties,
                branches,
            } => {
                assert_eq!(
                    properties,
                    &vec![json!("rol"), json!("admin"), json!("=")]
                );
                assert_eq!(branches.on_true.len(), 1);
                assert_eq!(branches.on_false.len(), 1);
            }
            other => panic!("expected if node, got {:?}", other),
        }
    }

    #[test]
    fn test_if_without_else() {
        let parsed = parse("if(x, 1, =)\n  addVar(y, 2)\nend()").unwrap();
        match &parsed.nodes[0] {
            AstNode::If { branches, .. } => {
                assert_eq!(branches.on_true.len(), 1);
                assert!(branches.on_false.is_empty());
            }
            other => panic!("expected if node, got {:?}", other),
        }
    }

    #[test]
    fn test_loop_sequence() {
        let parsed = parse("startLoop(i, 1, 3)\n  addVar(x, i)\nendLoop()").unwrap();
        match &parsed.nodes[0] {
            AstNode::Loop {
                properties,
                sequence,
            } => {
                assert_eq!(properties, &vec![json!("i"), json!(1), json!(3)]);
                assert_eq!(sequence.len(), 1);
            }
            other => panic!("expected loop node, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_if_inside_loop() {
        let script = "startLoop(i, 1, 2)\n  if(i, 1, =)\n    addVar(first, i)\n  end()\nendLoop()";
        let parsed = parse(script).unwrap();
        match &parsed.nodes[0] {
            AstNode::Loop { sequence, .. } => {
                assert!(matches!(sequence[0], AstNode::If { .. }));
            }
            other => panic!("expected loop node, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_with_math_expression() {
        let parsed = parse("ticket = \"T-\" + str(i)").unwrap();
        assert_eq!(
            parsed.nodes[0],
            AstNode::Assign {
                target: "ticket".into(),
                expr: "\"T-\" + str(i)".into(),
            }
        );
    }

    #[test]
    fn test_assignment_pure_command_call() {
        let parsed = parse("acceso = getRole(user)").unwrap();
        assert_eq!(
            parsed.nodes[0],
            AstNode::Call {
                name: "getRole".into(),
                properties: vec![json!("user")],
                target: Some("acceso".into()),
            }
        );
    }

    #[test]
    fn test_function_definition_registered() {
        let script = "function doble(n) {\n  r = n * 2\n  return r\n}\ntotal = doble(21)";
        let parsed = parse(script).unwrap();
        let func = parsed.functions.get("doble").unwrap();
        assert_eq!(func.params, vec!["n"]);
        assert_eq!(func.nodes.len(), 2);
        assert_eq!(func.return_expr.as_deref(), Some("r"));
        // The definition itself is not a statement.
        assert_eq!(parsed.nodes.len(), 1);
    }

    #[test]
    fn test_unterminated_function_is_error() {
        let err = parse("function f(a) {\n  return a").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_unmatched_else_is_error() {
        assert!(parse("else()\naddVar(x, 1)").is_err());
    }

    #[test]
    fn test_unmatched_end_is_error() {
        assert!(parse("end()").is_err());
    }

    #[test]
    fn test_missing_end_is_error() {
        assert!(parse("if(x, 1, =)\n  addVar(y, 2)").is_err());
    }

    #[test]
    fn test_unbalanced_quotes_is_error() {
        assert!(parse("addVar(x, \"abc)").is_err());
    }
}
