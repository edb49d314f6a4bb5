//! Command catalog: compile-once caches with remote sync and DB fallback.
//!
//! Three parallel maps back every lookup: the raw signed bytecode, the
//! parsed parameter interface, and the compiled (verified and resolved)
//! handler. `sync_full` rebuilds all three from scratch and swaps them in
//! atomically under the write lock; point lookups fill them incrementally.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::catalog::client::EngineClient;
use crate::catalog::db;
use crate::catalog::proto::CommandResponse;
use crate::catalog::types::{parse_interface, CatalogError, ParamDef};
use crate::commands::{Command, CommandRegistry};
use crate::packer::BytecodePacker;

#[derive(Default)]
struct CatalogCaches {
    bytecode: HashMap<String, Arc<Vec<u8>>>,
    interface: HashMap<String, Arc<Vec<ParamDef>>>,
    compiled: HashMap<String, Arc<dyn Command>>,
}

pub struct Catalog {
    caches: RwLock<CatalogCaches>,
    remote: Option<EngineClient>,
    db: Option<PgPool>,
    packer: BytecodePacker,
    registry: Arc<CommandRegistry>,
}

impl Catalog {
    pub fn new(
        packer: BytecodePacker,
        registry: Arc<CommandRegistry>,
        remote: Option<EngineClient>,
        db: Option<PgPool>,
    ) -> Self {
        Self {
            caches: RwLock::new(CatalogCaches::default()),
            remote,
            db,
            packer,
            registry,
        }
    }

    /// A catalog seeded from the native registry, with no remote engine and
    /// no database. Every registered command gets a locally packed payload.
    pub fn preloaded(packer: BytecodePacker, registry: Arc<CommandRegistry>) -> Self {
        let mut caches = CatalogCaches::default();
        for (name, handler) in registry.entries() {
            let interface = parse_interface(handler.interface()).unwrap_or_default();
            caches
                .bytecode
                .insert(name.clone(), Arc::new(packer.pack(name)));
            caches.interface.insert(name.clone(), Arc::new(interface));
            caches.compiled.insert(name.clone(), handler.clone());
        }
        Self {
            caches: RwLock::new(caches),
            remote: None,
            db: None,
            packer,
            registry,
        }
    }

    /// Verify and resolve a full catalog response into fresh caches.
    fn build_caches(&self, commands: &[CommandResponse]) -> Result<CatalogCaches, CatalogError> {
        let mut next = CatalogCaches::default();
        for cmd in commands {
            let source = self.packer.unpack(&cmd.code)?;
            let implementation = source.trim().to_string();
            let handler =
                self.registry
                    .get(&implementation)
                    .ok_or_else(|| CatalogError::UnknownImpl {
                        name: cmd.name.clone(),
                        implementation: implementation.clone(),
                    })?;
            let interface =
                parse_interface(&cmd.interface_json).map_err(|e| CatalogError::BadInterface {
                    name: cmd.name.clone(),
                    source: e,
                })?;
            next.bytecode
                .insert(cmd.name.clone(), Arc::new(cmd.code.clone()));
            next.interface.insert(cmd.name.clone(), Arc::new(interface));
            next.compiled.insert(cmd.name.clone(), handler);
        }
        Ok(next)
    }

    /// Full catalog refresh. The live caches are replaced only after every
    /// entry verified and resolved; on any failure they stay untouched.
    pub async fn sync_full(&self) -> Result<usize, CatalogError> {
        let remote = self.remote.as_ref().ok_or(CatalogError::NoRemote)?;
        let response = remote
            .sync_catalog()
            .await
            .map_err(CatalogError::Transport)?;
        let next = self.build_caches(&response.commands)?;
        let count = next.bytecode.len();

        let mut live = self.caches.write().await;
        *live = next;
        info!(
            commands = count,
            version = %response.version_hash,
            "catalog synchronized"
        );
        Ok(count)
    }

    /// Bytecode and interface for one command: cache, then engine RPC, then
    /// local database. `NOT_FOUND` and transport failures both fall through
    /// to the database; only the transport case is worth a warning.
    pub async fn get(
        &self,
        name: &str,
    ) -> Result<(Arc<Vec<u8>>, Arc<Vec<ParamDef>>), CatalogError> {
        {
            let caches = self.caches.read().await;
            if let Some(bytecode) = caches.bytecode.get(name) {
                let interface = caches.interface.get(name).cloned().unwrap_or_default();
                return Ok((bytecode.clone(), interface));
            }
        }

        if let Some(remote) = &self.remote {
            match remote.get_command(name).await {
                Ok(response) => {
                    let interface = parse_interface(&response.interface_json).map_err(|e| {
                        CatalogError::BadInterface {
                            name: name.to_string(),
                            source: e,
                        }
                    })?;
                    let bytecode = Arc::new(response.code);
                    let interface = Arc::new(interface);
                    let mut caches = self.caches.write().await;
                    caches.bytecode.insert(name.to_string(), bytecode.clone());
                    caches
                        .interface
                        .insert(name.to_string(), interface.clone());
                    info!(command = name, "definition hit via engine");
                    return Ok((bytecode, interface));
                }
                Err(status) if status.code() == tonic::Code::NotFound => {
                    info!(command = name, "not in definition engine, trying local db");
                }
                Err(status) => {
                    warn!(
                        command = name,
                        error = %status,
                        "definition engine unreachable, trying local db"
                    );
                }
            }
        }

        let Some(pool) = &self.db else {
            return Err(CatalogError::NotFound(name.to_string()));
        };
        let row = db::fetch_command(pool, &self.packer, name).await?;
        let bytecode = Arc::new(row.bytecode);
        let interface = Arc::new(row.interface);
        let mut caches = self.caches.write().await;
        caches.bytecode.insert(name.to_string(), bytecode.clone());
        caches
            .interface
            .insert(name.to_string(), interface.clone());
        Ok((bytecode, interface))
    }

    /// Compile-once: verify the signed package and resolve its payload to a
    /// native handler. A package failing verification never executes.
    pub async fn compiled(
        &self,
        name: &str,
        bytecode: &[u8],
    ) -> Result<Arc<dyn Command>, CatalogError> {
        {
            let caches = self.caches.read().await;
            if let Some(handler) = caches.compiled.get(name) {
                return Ok(handler.clone());
            }
        }

        let source = self.packer.unpack(bytecode).map_err(|e| {
            error!(command = name, error = %e, "bytecode integrity alert");
            e
        })?;
        let implementation = source.trim().to_string();
        let handler = self
            .registry
            .get(&implementation)
            .ok_or_else(|| CatalogError::UnknownImpl {
                name: name.to_string(),
                implementation,
            })?;

        let mut caches = self.caches.write().await;
        caches.compiled.insert(name.to_string(), handler.clone());
        Ok(handler)
    }

    /// Drive periodic full synchronization off the I/O loop.
    pub fn spawn_refresh(self: &Arc<Self>, every: Duration) {
        let catalog = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick fires immediately; initial sync already ran.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = catalog.sync_full().await {
                    warn!(error = %e, "catalog refresh failed, keeping previous snapshot");
                }
            }
        });
    }

    /// Sorted key sets of the three caches.
    pub async fn cache_keys(&self) -> (Vec<String>, Vec<String>, Vec<String>) {
        let caches = self.caches.read().await;
        let mut bytecode: Vec<String> = caches.bytecode.keys().cloned().collect();
        let mut interface: Vec<String> = caches.interface.keys().cloned().collect();
        let mut compiled: Vec<String> = caches.compiled.keys().cloned().collect();
        bytecode.sort();
        interface.sort();
        compiled.sort();
        (bytecode, interface, compiled)
    }
}
