use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr: SocketAddr = std::env::var("GTFS_E2E_COLLECTOR_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:9999".to_string())
        .parse()?;

    gtfs_e2e_coverage::serve(addr).await?;
    Ok(())
}
