//! Worker Process Model
//!
//! Every worker accepts from one shared kernel queue (`SO_REUSEPORT`) and
//! carries its own database pool, catalog client and metrics. Workers
//! stagger startup, sync the catalog once, then schedule the periodic
//! refresh before serving.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::catalog::{Catalog, EngineClient};
use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::engine::Engine;
use crate::packer::BytecodePacker;
use crate::server::http::{build_app, AppState};
use crate::server::metrics::Metrics;

pub const LISTEN_BACKLOG: i32 = 8192;

/// Bind the service port so multiple worker processes share one listening
/// socket through the kernel.
pub fn bind_shared(port: u16) -> std::io::Result<StdTcpListener> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    let listener: StdTcpListener = socket.into();
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Run one worker to completion.
pub async fn run_worker(config: Config) -> anyhow::Result<()> {
    // Stagger startup so workers do not hit the engine at the same instant.
    let delay = rand::thread_rng().gen_range(0.05..0.5);
    tokio::time::sleep(Duration::from_secs_f64(delay)).await;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .connect_lazy(&config.db_url)?;

    let packer = BytecodePacker::new(config.hmac_key.as_bytes().to_vec());
    let registry = Arc::new(CommandRegistry::builtin());
    let remote = EngineClient::new(&config.engine_host, config.engine_port, &config.auth_token)?;
    let catalog = Arc::new(Catalog::new(
        packer.clone(),
        registry,
        Some(remote),
        Some(pool.clone()),
    ));

    match catalog.sync_full().await {
        Ok(count) => info!(commands = count, "initial catalog sync complete"),
        Err(e) => warn!(error = %e, "initial catalog sync failed, relying on point lookups"),
    }
    catalog.spawn_refresh(Duration::from_secs(config.refresh_secs));

    let state = Arc::new(AppState {
        engine: Arc::new(Engine::new(catalog)),
        metrics: Arc::new(Metrics::new()),
        semaphore: Arc::new(Semaphore::new(config.max_workers)),
        admission_permits: config.max_workers,
        packer,
        db: Some(pool),
    });
    let app = build_app(state);

    let listener = match bind_shared(config.port) {
        Ok(listener) => listener,
        Err(e) => {
            // One retry covers transient rebind races on worker restart.
            warn!(error = %e, "bind failed, retrying once");
            tokio::time::sleep(Duration::from_millis(500)).await;
            bind_shared(config.port)?
        }
    };
    let listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        port = config.port,
        pid = std::process::id(),
        "worker ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
