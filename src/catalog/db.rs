//! Local database fallback for command definitions.
//!
//! Two tables back the legacy flow: `avap_bytecode` holds pre-packed signed
//! packages, `obex_dapl_functions` holds raw source plus the JSON interface.
//! A pre-packed row wins; otherwise the source is packed, upserted into
//! `avap_bytecode`, and returned.

use sqlx::{PgPool, Row};
use tracing::info;

use crate::catalog::types::{parse_interface, CatalogError, ParamDef};
use crate::packer::{sha256_hex, BytecodePacker};

pub struct FallbackCommand {
    pub bytecode: Vec<u8>,
    pub interface: Vec<ParamDef>,
}

pub async fn fetch_command(
    pool: &PgPool,
    packer: &BytecodePacker,
    name: &str,
) -> Result<FallbackCommand, CatalogError> {
    let packed_row = sqlx::query("SELECT bytecode FROM avap_bytecode WHERE command_name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    // The source row is always needed for the parameter interface.
    let source_row = sqlx::query("SELECT code, interface FROM obex_dapl_functions WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;

    let interface_json: Option<String> = source_row.try_get("interface")?;
    let interface = interface_json
        .as_deref()
        .map(|t| parse_interface(t).unwrap_or_default())
        .unwrap_or_default();

    if let Some(row) = packed_row {
        let bytecode: Option<Vec<u8>> = row.try_get("bytecode")?;
        if let Some(bytecode) = bytecode {
            if !bytecode.is_empty() {
                return Ok(FallbackCommand {
                    bytecode,
                    interface,
                });
            }
        }
    }

    // No packed row yet: pack and sign the source, then persist it.
    let source: String = source_row.try_get("code")?;
    let bytecode = packer.pack(&source);
    let source_hash = sha256_hex(source.as_bytes());
    sqlx::query(
        "INSERT INTO avap_bytecode (command_name, bytecode, source_hash) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (command_name) \
         DO UPDATE SET bytecode = EXCLUDED.bytecode, source_hash = EXCLUDED.source_hash",
    )
    .bind(name)
    .bind(&bytecode)
    .bind(&source_hash)
    .execute(pool)
    .await?;
    info!(command = name, "packed and persisted local command source");

    Ok(FallbackCommand {
        bytecode,
        interface,
    })
}

/// Upsert a freshly compiled package (used by the compile endpoint).
pub async fn upsert_bytecode(
    pool: &PgPool,
    name: &str,
    bytecode: &[u8],
    source_hash: &str,
) -> Result<(), CatalogError> {
    sqlx::query(
        "INSERT INTO avap_bytecode (command_name, bytecode, source_hash) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (command_name) \
         DO UPDATE SET bytecode = EXCLUDED.bytecode, source_hash = EXCLUDED.source_hash",
    )
    .bind(name)
    .bind(bytecode)
    .bind(source_hash)
    .execute(pool)
    .await?;
    Ok(())
}
