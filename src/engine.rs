//! Engine facade: parser, AST cache, catalog and executor wired together.
//!
//! One engine lives per worker process. Scripts parse once per unique hash
//! into a bounded cache of immutable ASTs; every request executes against
//! its own fresh context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde_json::Value;

use crate::ast::types::ParsedScript;
use crate::catalog::Catalog;
use crate::executor::context::{Context, RequestEnv};
use crate::executor::errors::ExecError;
use crate::executor::executor::ScriptRun;
use crate::packer::sha256_hex;
use crate::parser;

pub const DEFAULT_AST_CACHE_LIMIT: usize = 1000;

pub struct Engine {
    catalog: Arc<Catalog>,
    http: reqwest::Client,
    ast_cache: Mutex<HashMap<String, Arc<ParsedScript>>>,
    ast_cache_limit: usize,
}

impl Engine {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            http: reqwest::Client::new(),
            ast_cache: Mutex::new(HashMap::new()),
            ast_cache_limit: DEFAULT_AST_CACHE_LIMIT,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn http_client(&self) -> reqwest::Client {
        self.http.clone()
    }

    /// Parse through the bounded AST cache. Insertion races are harmless:
    /// both writers hold structurally equal ASTs for the same hash.
    fn parsed(&self, script: &str) -> Result<Arc<ParsedScript>, ExecError> {
        let normalized = script.trim();
        let hash = sha256_hex(normalized.as_bytes());
        {
            let cache = self.ast_cache.lock().expect("ast cache lock poisoned");
            if let Some(parsed) = cache.get(&hash) {
                return Ok(parsed.clone());
            }
        }
        let parsed = Arc::new(parser::parse(normalized)?);
        let mut cache = self.ast_cache.lock().expect("ast cache lock poisoned");
        if cache.len() < self.ast_cache_limit {
            cache.insert(hash, parsed.clone());
        }
        Ok(parsed)
    }

    pub fn ast_cache_len(&self) -> usize {
        self.ast_cache.lock().expect("ast cache lock poisoned").len()
    }

    /// Execute a script against an initial variable bag and the inbound
    /// request data, producing the final per-request context.
    pub async fn execute_script(
        &self,
        script: &str,
        variables: IndexMap<String, Value>,
        req: RequestEnv,
    ) -> Result<Context, ExecError> {
        let parsed = self.parsed(script)?;
        let mut run = ScriptRun::new(self, parsed, variables, req);
        run.run().await?;
        Ok(run.into_context())
    }
}
