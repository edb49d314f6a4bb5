//! Catalog types and errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::packer::PackError;

/// One named parameter of a command's declared interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDef {
    #[serde(alias = "name")]
    pub item: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Parse an `interface_json` document into parameter definitions.
pub fn parse_interface(interface_json: &str) -> Result<Vec<ParamDef>, serde_json::Error> {
    if interface_json.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(interface_json)
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("definition engine transport error: {0}")]
    Transport(tonic::Status),
    #[error("invalid interface for command '{name}': {source}")]
    BadInterface {
        name: String,
        source: serde_json::Error,
    },
    #[error("unknown command implementation '{implementation}' for '{name}'")]
    UnknownImpl {
        name: String,
        implementation: String,
    },
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("invalid definition engine endpoint: {0}")]
    Endpoint(#[from] tonic::transport::Error),
    #[error("no definition engine configured")]
    NoRemote,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interface() {
        let defs = parse_interface(
            r#"[{"item":"targetVarName","type":"variable"},{"item":"varValue","type":"value"}]"#,
        )
        .unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].item, "targetVarName");
        assert_eq!(defs[1].kind, "value");
    }

    #[test]
    fn test_parse_interface_accepts_name_alias() {
        let defs = parse_interface(r#"[{"name":"url","type":"variable"}]"#).unwrap();
        assert_eq!(defs[0].item, "url");
    }

    #[test]
    fn test_parse_interface_empty() {
        assert!(parse_interface("").unwrap().is_empty());
        assert!(parse_interface("  ").unwrap().is_empty());
    }
}
