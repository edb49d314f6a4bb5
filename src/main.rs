use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use avap_server::config::Config;
use avap_server::server::worker;

/// Set in child processes spawned by the master.
const WORKER_ENV: &str = "AVAP_WORKER_ID";

fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if std::env::var(WORKER_ENV).is_ok() {
        return block_on_worker(config);
    }

    let workers = if config.workers == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        config.workers
    };

    if workers == 1 {
        return block_on_worker(config);
    }

    // Master: validate the port is bindable, then supervise worker
    // processes that each re-bind the shared socket.
    drop(worker::bind_shared(config.port)?);
    info!(
        port = config.port,
        workers,
        pid = std::process::id(),
        "master validated port, spawning workers"
    );

    let exe = std::env::current_exe()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut children = Vec::new();
    for id in 0..workers {
        let child = std::process::Command::new(&exe)
            .args(&args)
            .env(WORKER_ENV, id.to_string())
            .spawn()?;
        children.push(child);
    }

    for mut child in children {
        let status = child.wait()?;
        if !status.success() {
            warn!(status = %status, "worker exited abnormally");
        }
    }
    Ok(())
}

fn block_on_worker(config: Config) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(worker::run_worker(config))
}
