use clap::Parser;
use dealdesk_server::OverlayConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = OverlayConfig::parse();
    info!(bind = %config.bind, resource = %config.resource, "starting dealdesk overlay");
    dealdesk_server::serve(config).await
}
