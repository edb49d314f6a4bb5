//! Argument tokenization
//!
//! Call arguments are comma-split at parenthesis depth 0, tracking single
//! and double quotes character by character (no nesting). Each raw token is
//! then cleaned: matching outer quotes mark a string literal, otherwise the
//! token is tried as an integer, then a float, and finally kept as a raw
//! name for the executor to resolve.

use serde_json::Value;

use crate::parser::types::ParseError;

/// Split an argument list into raw tokens.
pub fn split_arguments(args_str: &str, line: usize) -> Result<Vec<String>, ParseError> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut paren_level: i32 = 0;
    let mut quote: Option<char> = None;

    for ch in args_str.chars() {
        match ch {
            '"' | '\'' => {
                match quote {
                    None => quote = Some(ch),
                    Some(q) if q == ch => quote = None,
                    Some(_) => {}
                }
                current.push(ch);
            }
            '(' if quote.is_none() => {
                paren_level += 1;
                current.push(ch);
            }
            ')' if quote.is_none() => {
                paren_level -= 1;
                current.push(ch);
            }
            ',' if quote.is_none() && paren_level == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if quote.is_some() {
        return Err(ParseError::new("unbalanced quotes in argument list", line));
    }
    if !current.is_empty() {
        parts.push(current.trim().to_string());
    }
    parts.retain(|p| !p.is_empty());
    Ok(parts)
}

/// Clean a raw token into a literal or a raw name.
pub fn clean_value(value: &str) -> Value {
    let value = value.trim();

    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        return Value::String(value[1..value.len() - 1].to_string());
    }

    if value.contains('.') {
        if let Ok(f) = value.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    } else if let Ok(i) = value.parse::<i64>() {
        return Value::Number(i.into());
    }

    Value::String(value.to_string())
}

/// Tokenize and clean an argument list.
pub fn parse_arguments(args_str: &str, line: usize) -> Result<Vec<Value>, ParseError> {
    Ok(split_arguments(args_str, line)?
        .iter()
        .map(|p| clean_value(p))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_respects_quotes() {
        let parts = split_arguments(r#"rol, "a,b", 'c,d'"#, 1).unwrap();
        assert_eq!(parts, vec!["rol", "\"a,b\"", "'c,d'"]);
    }

    #[test]
    fn test_split_respects_parens() {
        let parts = split_arguments("x, str(a, b), 3", 1).unwrap();
        assert_eq!(parts, vec!["x", "str(a, b)", "3"]);
    }

    #[test]
    fn test_split_unbalanced_quote_is_error() {
        assert!(split_arguments(r#"a, "broken"#, 7).is_err());
    }

    #[test]
    fn test_clean_string_literal() {
        assert_eq!(clean_value("\"admin\""), json!("admin"));
        assert_eq!(clean_value("'admin'"), json!("admin"));
    }

    #[test]
    fn test_clean_numbers() {
        assert_eq!(clean_value("123"), json!(123));
        assert_eq!(clean_value("-7"), json!(-7));
        assert_eq!(clean_value("123.45"), json!(123.45));
    }

    #[test]
    fn test_clean_name_kept_raw() {
        assert_eq!(clean_value("limite"), json!("limite"));
        assert_eq!(clean_value("12a"), json!("12a"));
    }

    #[test]
    fn test_parse_arguments_mixed() {
        let args = parse_arguments(r#"numero, 123.45, "ok""#, 1).unwrap();
        assert_eq!(args, vec![json!("numero"), json!(123.45), json!("ok")]);
    }
}
