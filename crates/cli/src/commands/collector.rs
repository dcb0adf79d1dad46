//! `gtfs-e2e collector`: run the coverage collector in the foreground

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use gtfs_e2e::helper::PidFile;
use gtfs_e2e_coverage::{serve_listener, CoverageStore};
use tokio::net::TcpListener;
use tracing::info;

/// Pid file name used by `gtfs-e2e stop coverage-collector`
pub const PID_NAME: &str = "coverage-collector";

#[derive(Args, Debug)]
pub struct CollectorArgs {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1:9999", env = "GTFS_E2E_COLLECTOR_ADDR")]
    pub addr: SocketAddr,

    /// Directory for the pid file
    #[arg(long, default_value = "test-results/pids")]
    pub pid_dir: PathBuf,
}

pub async fn execute(args: CollectorArgs) -> anyhow::Result<()> {
    let listener = TcpListener::bind(args.addr).await?;

    let pidfile = PidFile::new(&args.pid_dir, PID_NAME);
    pidfile.write(std::process::id())?;
    info!("Pid file: {}", pidfile.path().display());

    let result = tokio::select! {
        result = serve_listener(listener, CoverageStore::new()) => result.map_err(anyhow::Error::from),
        result = shutdown_signal() => {
            info!("Received shutdown signal");
            result
        }
    };

    pidfile.remove()?;
    result
}

async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
