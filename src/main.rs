//! `chatwire` server binary.
//!
//! Parses CLI arguments, installs logging and optional metrics export, then
//! serves clients until Ctrl+C.

mod cli;

use std::{error::Error, num::NonZeroU32, sync::Arc, time::Duration};

use chatwire::{
    ChatServer,
    NullMarker,
    Role,
    ServerConfig,
    ServerContext,
    directory::DirectoryError,
};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, NullMarkerArg};

fn server_config(cli: &Cli) -> ServerConfig {
    let null_marker = match cli.null_marker {
        NullMarkerArg::Sentinel => NullMarker::Sentinel,
        NullMarkerArg::NegativeLength => NullMarker::NegativeLength,
    };
    ServerConfig::default()
        .with_tick_period(Duration::from_millis(cli.tick_ms))
        .with_queue_capacity(cli.queue_capacity)
        .with_max_field_length(cli.max_field_length)
        .with_null_marker(null_marker)
        .with_inbound_rate(cli.inbound_rate.and_then(NonZeroU32::new))
}

fn seed_admin(ctx: &ServerContext, cli: &Cli) -> Result<(), DirectoryError> {
    let (Some(name), Some(secret)) = (&cli.admin_user, &cli.admin_secret) else {
        return Ok(());
    };
    ctx.users().create_user(name, secret, Role::God)?;
    info!(user = %name, "seeded administrator account");
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_metrics(cli: &Cli) -> Result<(), Box<dyn Error>> {
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "serving Prometheus metrics");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(cli: &Cli) -> Result<(), Box<dyn Error>> {
    if cli.metrics_addr.is_some() {
        tracing::warn!("metrics support not compiled in; ignoring --metrics-addr");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = cli.workers {
        runtime.worker_threads(workers.max(1));
    }
    let runtime = runtime.enable_all().build()?;

    runtime.block_on(async {
        install_metrics(&cli)?;
        let ctx = ServerContext::builder().traffic_log(cli.traffic_log).build();
        seed_admin(&ctx, &cli)?;
        let server = ChatServer::new(Arc::new(ctx))
            .with_config(server_config(&cli))
            .bind(cli.bind)?;
        server.run().await?;
        Ok::<(), Box<dyn Error>>(())
    })
}
