// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Patchbay adapter daemon.
//!
//! Registers with the gateway and serves calls. With `--call` it places
//! one call to the given peer email and prints the local socket once the
//! route is up.

use async_trait::async_trait;
use clap::Parser;
use patchbay::auth::StaticTokenValidator;
use patchbay::rpc::{RpcClient, DEFAULT_CALL_TIMEOUT};
use patchbay_adapter::{Adapter, AdapterRpc, CallEvents};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Patchbay adapter: terminal call endpoint
#[derive(Parser, Debug)]
#[command(name = "patchbay-adapter")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gateway control address
    #[arg(short, long, default_value = "127.0.0.1:1338")]
    gateway: String,

    /// Host to expose local call sockets on
    #[arg(short, long, default_value = "127.0.0.1")]
    advertise_host: String,

    /// Shared secret for the development token validator
    #[arg(short, long)]
    secret: String,

    /// Subject email to authenticate as
    #[arg(short, long)]
    email: String,

    /// Decline incoming calls instead of auto-accepting them
    #[arg(long, default_value = "false")]
    decline: bool,

    /// Place a call to this peer email after registering
    #[arg(long)]
    call: Option<String>,

    /// Channel ID to request the call on
    #[arg(long, default_value = "default")]
    channel: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Logs call events and applies the auto-accept policy.
struct CliEvents {
    auto_accept: bool,
}

#[async_trait]
impl CallEvents for CliEvents {
    async fn on_request_call(
        &self,
        src_id: &str,
        src_email: &str,
        _route_id: &str,
        channel_id: &str,
    ) -> bool {
        info!(
            "incoming call from {} ({}) on channel {}: {}",
            src_email,
            src_id,
            channel_id,
            if self.auto_accept {
                "accepting"
            } else {
                "declining"
            }
        );

        self.auto_accept
    }

    async fn on_call_connected(&self, route_id: &str, local_addr: SocketAddr) {
        info!("call {} connected, local socket at {}", route_id, local_addr);
    }

    async fn on_call_disconnected(&self, route_id: &str) {
        info!("call {} ended", route_id);
    }
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

    let token = StaticTokenValidator::subject_token(&args.secret, &args.email);

    let adapter = Adapter::new(
        args.advertise_host.clone(),
        Arc::new(CliEvents {
            auto_accept: !args.decline,
        }),
    );
    let service = Arc::new(AdapterRpc::new(adapter.clone()));

    let mut client =
        RpcClient::connect(&args.gateway, "gateway", service, DEFAULT_CALL_TIMEOUT).await?;
    let gateway = client.handle();
    info!("connected to gateway at {}", args.gateway);

    adapter.register(&gateway, &token).await?;
    info!("registered as {}", args.email);

    let mut active_route = None;
    if let Some(peer_email) = &args.call {
        let dst_id = adapter.resolve_email(&gateway, &token, peer_email).await?;
        let result = adapter
            .request_call(&gateway, &token, &dst_id, &args.channel)
            .await?;

        if result.accept {
            info!("call to {} accepted, route {}", peer_email, result.route_id);
            active_route = Some(result.route_id);
        } else {
            info!("call to {} declined", peer_email);
        }
    }

    tokio::select! {
        _ = client.join() => {
            error!("lost connection to gateway");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    if let Some(route_id) = active_route {
        if let Err(e) = adapter.hangup(&gateway, &token, &route_id).await {
            if !e.is_closed() {
                error!("could not hang up call: {}", e);
            }
        }
    }

    adapter.close_all().await;

    Ok(())
}
