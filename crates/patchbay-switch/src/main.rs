// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Patchbay switch daemon.
//!
//! Registers with the router, starts the benchmark listener on the
//! advertised port, and relays route hops until the control link drops.

use clap::Parser;
use patchbay::rpc::{RpcClient, DEFAULT_CALL_TIMEOUT};
use patchbay::wire::{method, RegisterSwitchRequest, SwitchConfig};
use patchbay_switch::{bench_listener, Switch, SwitchRpc};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Patchbay switch: TLS relay node
#[derive(Parser, Debug)]
#[command(name = "patchbay-switch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Router control address
    #[arg(short, long, default_value = "127.0.0.1:1337")]
    router: String,

    /// Address to advertise; the benchmark listener binds this port and
    /// relay hops bind ephemeral ports on this host
    #[arg(short, long, default_value = "127.0.0.1:1340")]
    advertise: String,

    /// Registration token
    #[arg(short, long)]
    token: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let switch = Switch::new(args.advertise.clone());
    let service = Arc::new(SwitchRpc::new(switch.clone()));

    let mut client =
        RpcClient::connect(&args.router, "router", service, DEFAULT_CALL_TIMEOUT).await?;
    info!("connected to router at {}", args.router);

    let config: SwitchConfig = client
        .handle()
        .call_as(
            method::REGISTER_SWITCH,
            &RegisterSwitchRequest {
                token: args.token,
                addr: args.advertise.clone(),
            },
        )
        .await?;
    switch.set_ca(config.ca_pem.clone());
    info!("registered with router, advertising {}", args.advertise);

    let bench = TcpListener::bind(&args.advertise).await?;
    tokio::spawn(async move {
        if let Err(e) = bench_listener::run(bench, config.ca_pem, config.benchmark_listen_cert).await
        {
            error!("benchmark listener failed: {}", e);
        }
    });

    tokio::select! {
        _ = client.join() => {
            error!("lost connection to router");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    switch.close_all().await;

    Ok(())
}
