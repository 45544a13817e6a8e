//! Firehose tail
//!
//! Connects to an instance's federated streaming timeline and prints every
//! status as it arrives. Useful for watching the transport work end to end.
//!
//! Run with: cargo run --bin firehose -- mastodon.social
//!
//! Deletes and filter changes are logged as they stream in; press Ctrl-C to
//! exit.

use std::sync::Arc;

use anyhow::{Context, Result};
use fedistream::streaming::{StreamingConfig, StreamingTransport, Timeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let domain = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "mastodon.social".to_string());

    let transport = Arc::new(
        StreamingTransport::with_config(
            &domain,
            Timeline::Federated,
            None,
            StreamingConfig::default(),
        )
        .context("building streaming transport")?,
    );

    transport.updates().then(|status| {
        info!(
            id = %status.id,
            account = %status.account.acct,
            "status: {}",
            status.content
        );
    });
    transport.deletes().then(|id| {
        info!(%id, "status deleted");
    });
    transport.filters_changed().then(|_| {
        info!("filters changed");
    });

    info!(%domain, "tailing federated firehose");
    transport.connect();

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("disconnecting");
    transport.disconnect();

    Ok(())
}
