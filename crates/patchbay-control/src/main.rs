// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Patchbay control plane daemon.
//!
//! Hosts the router, gateway and metrics services in one process, with
//! the CA persisted in the working directory.

use clap::Parser;
use patchbay::auth::StaticTokenValidator;
use patchbay::pki::Ca;
use patchbay::rpc::RpcServer;
use patchbay_control::gateway::{Gateway, GatewayHooks, GatewayRpc, GatewaySettings};
use patchbay_control::metrics::{Metrics, MetricsHooks, MetricsRpc};
use patchbay_control::router::{Router, RouterHooks, RouterRpc, RouterSettings};
use patchbay_control::ControlConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Patchbay control plane: router, gateway and metrics services
#[derive(Parser, Debug)]
#[command(name = "patchbay-control")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Router listen address
    #[arg(long)]
    router_bind: Option<String>,

    /// Gateway listen address
    #[arg(long)]
    gateway_bind: Option<String>,

    /// Metrics listen address
    #[arg(long)]
    metrics_bind: Option<String>,

    /// Working directory for the persisted CA
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Shared secret for the development token validator
    #[arg(short, long)]
    secret: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ControlConfig::from_file(path)?,
        None => ControlConfig::default(),
    };

    if let Some(bind) = args.router_bind {
        config.router_bind = bind;
    }
    if let Some(bind) = args.gateway_bind {
        config.gateway_bind = bind;
    }
    if let Some(bind) = args.metrics_bind {
        config.metrics_bind = bind;
    }
    if let Some(workdir) = args.workdir {
        config.workdir = workdir;
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }
    config.validate()?;

    let level = config.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("loaded config from {}", path.display());
    }

    let ca = Arc::new(Ca::load_or_generate(&config.workdir, config.ca_validity())?);

    let router_server = RpcServer::bind(&config.router_bind, config.call_timeout()).await?;
    let gateway_server = RpcServer::bind(&config.gateway_bind, config.call_timeout()).await?;
    let metrics_server = RpcServer::bind(&config.metrics_bind, config.call_timeout()).await?;

    info!(
        "control plane up: router {}, gateway {}, metrics {}",
        router_server.local_addr()?,
        gateway_server.local_addr()?,
        metrics_server.local_addr()?
    );

    let metrics = Metrics::new(
        Arc::new(StaticTokenValidator::new(args.secret.clone())),
        metrics_server.peers(),
    );

    let router = Router::new(
        RouterSettings {
            probe_interval: config.probe_interval(),
            probe_timeout: config.probe_timeout(),
            throughput_length: config.throughput_length,
            throughput_chunks: config.throughput_chunks,
            call_cert_validity: config.call_cert_validity(),
            benchmark_listen_cert_validity: config.benchmark_listen_cert_validity(),
            benchmark_client_cert_validity: config.benchmark_client_cert_validity(),
        },
        ca.clone(),
        Arc::new(StaticTokenValidator::new(args.secret.clone())),
        metrics.clone(),
        router_server.peers(),
    );

    let gateway = Gateway::new(
        GatewaySettings {
            probe_timeout: config.probe_timeout(),
            throughput_length: config.throughput_length,
            throughput_chunks: config.throughput_chunks,
            benchmark_client_cert_validity: config.benchmark_client_cert_validity(),
        },
        ca,
        Arc::new(StaticTokenValidator::new(args.secret)),
        gateway_server.peers(),
    );

    router.bind_gateway(gateway.clone());
    gateway.bind_router(router.clone());

    let router_shutdown = router_server.shutdown_handle();
    let gateway_shutdown = gateway_server.shutdown_handle();
    let metrics_shutdown = metrics_server.shutdown_handle();

    let mut servers = tokio::task::JoinSet::new();
    {
        let service = Arc::new(RouterRpc::new(router.clone()));
        let hooks = Arc::new(RouterHooks::new(router.clone()));
        servers.spawn(async move { router_server.run(service, hooks).await });
    }
    {
        let service = Arc::new(GatewayRpc::new(gateway.clone()));
        let hooks = Arc::new(GatewayHooks::new(gateway.clone()));
        servers.spawn(async move { gateway_server.run(service, hooks).await });
    }
    {
        let service = Arc::new(MetricsRpc::new(metrics.clone()));
        let hooks = Arc::new(MetricsHooks::new(metrics.clone()));
        servers.spawn(async move { metrics_server.run(service, hooks).await });
    }

    let probe_loop = router.spawn_probe_loop();
    let notifier = metrics.spawn_notifier();

    tokio::select! {
        joined = servers.join_next() => {
            if let Some(Ok(Err(e))) = joined {
                error!("server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    probe_loop.abort();
    notifier.abort();
    router_shutdown.notify_waiters();
    gateway_shutdown.notify_waiters();
    metrics_shutdown.notify_waiters();

    Ok(())
}
