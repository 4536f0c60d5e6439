// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC server: accepts connections, assigns remote IDs, raises hooks.

use crate::error::Error;
use crate::rpc::peer::{drive_connection, PeerHandle, RpcService};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Live connections by remote ID.
pub type PeerMap = Arc<RwLock<HashMap<String, PeerHandle>>>;

/// Connection lifecycle hooks.
///
/// `on_disconnect` runs to completion before the next accept is affected
/// by the departure in any way other than the peer map no longer listing
/// the connection.
#[async_trait]
pub trait ConnectionHooks: Send + Sync + 'static {
    async fn on_connect(&self, _remote_id: &str) {}
    async fn on_disconnect(&self, _remote_id: &str) {}
}

/// Hooks that do nothing.
pub struct NoHooks;

#[async_trait]
impl ConnectionHooks for NoHooks {}

/// An accept loop plus the peer map of everything it has linked.
pub struct RpcServer {
    listener: TcpListener,
    peers: PeerMap,
    shutdown: Arc<Notify>,
    call_timeout: Duration,
    max_frame_size: usize,
}

impl RpcServer {
    /// Bind the listen socket.
    pub async fn bind(addr: &str, call_timeout: Duration) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            peers: Arc::new(RwLock::new(HashMap::new())),
            shutdown: Arc::new(Notify::new()),
            call_timeout,
            max_frame_size: super::MAX_FRAME_SIZE,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// The live peer map; shared with services that call back into
    /// connected peers.
    pub fn peers(&self) -> PeerMap {
        self.peers.clone()
    }

    /// A handle that stops the accept loop.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Accept connections until shut down.
    pub async fn run<S, H>(self, service: Arc<S>, hooks: Arc<H>) -> Result<(), Error>
    where
        S: RpcService,
        H: ConnectionHooks,
    {
        info!("listening on {}", self.listener.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("accept error: {}", e);
                            continue;
                        }
                    };

                    let remote_id = Uuid::new_v4().to_string();
                    debug!(remote_id = %remote_id, "new connection from {}", peer_addr);

                    let _ = stream.set_nodelay(true);

                    let (outbound_tx, outbound_rx) = mpsc::channel(64);
                    let handle =
                        PeerHandle::new(remote_id.clone(), outbound_tx, self.call_timeout);

                    self.peers
                        .write()
                        .await
                        .insert(remote_id.clone(), handle.clone());

                    let peers = self.peers.clone();
                    let service = service.clone();
                    let hooks = hooks.clone();
                    let max_frame_size = self.max_frame_size;

                    tokio::spawn(async move {
                        hooks.on_connect(&remote_id).await;

                        drive_connection(
                            stream,
                            remote_id.clone(),
                            service,
                            handle,
                            outbound_rx,
                            max_frame_size,
                        )
                        .await;

                        peers.write().await.remove(&remote_id);

                        hooks.on_disconnect(&remote_id).await;
                    });
                }
                _ = self.shutdown.notified() => {
                    info!("shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
