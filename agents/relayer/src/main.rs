//! The relayer accepts game events over HTTP and submits them on chain.
//!
//! Requests are queued in memory and drained by a single processing pass at a
//! time, which hands each request to the next idle signer of the pool.

#![forbid(unsafe_code)]
#![warn(unused_extern_crates)]

use std::sync::Arc;

use eyre::{Context, Result};
use prometheus::Registry;
use tokio::net::TcpListener;

use bossfight_ethereum::EthereumGateway;
use relayer::{metrics::RelayerMetrics, server, RelayerService, RelayerSettings};

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "Failed to listen for ctrl-c");
        return;
    }
    tracing::info!("Received ctrl-c, shutting down");
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    #[cfg(feature = "color-eyre")]
    color_eyre::install()?;

    let settings = RelayerSettings::new()?;
    settings.tracing.start_tracing()?;

    let metrics = Arc::new(RelayerMetrics::new(Registry::new())?);
    let gateway = EthereumGateway::new(settings.connection_conf())
        .context("Failed to build chain gateway")?;
    let wallets = settings.wallets()?;
    tracing::info!(
        rpc_url = %settings.rpc_url,
        contract = ?settings.contract_address,
        expected_chain_id = ?settings.chain_id,
        signers = wallets.len(),
        "Starting relayer"
    );

    let service = Arc::new(RelayerService::new(
        Arc::new(gateway),
        wallets,
        settings.processor.clone(),
        metrics,
    ));
    let router = server::router(service, &settings.server.route);
    let listener = TcpListener::bind(("0.0.0.0", settings.server.port))
        .await
        .with_context(|| format!("Failed to bind to port {}", settings.server.port))?;

    server::serve(listener, router, shutdown_signal()).await
}
