// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection RPC machinery shared by servers and clients.

use crate::error::Error;
use crate::rpc::protocol::{read_frame, write_frame, RpcMessage};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

/// Context handed to every request handler.
#[derive(Clone)]
pub struct RpcContext {
    /// The caller's connection ID (server side) or the configured label of
    /// the upstream (client side).
    pub remote_id: String,

    /// Handle for calling back into the peer that issued this request.
    pub peer: PeerHandle,
}

/// A request dispatcher bound to one service.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    async fn call(&self, ctx: RpcContext, method: &str, params: Value) -> Result<Value, Error>;
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, Error>>>>>;

/// Cloneable handle for issuing requests on a live connection.
#[derive(Clone)]
pub struct PeerHandle {
    remote_id: String,
    outbound: mpsc::Sender<RpcMessage>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
    call_timeout: Duration,
}

impl PeerHandle {
    pub(crate) fn new(
        remote_id: String,
        outbound: mpsc::Sender<RpcMessage>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            remote_id,
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            call_timeout,
        }
    }

    /// The opaque connection ID assigned at link time.
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Issue a request and await its reply, honoring the per-call timeout.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.pending.lock().await.insert(id, tx);

        let request = RpcMessage::Request {
            id,
            method: method.to_string(),
            params,
        };

        if self.outbound.send(request).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::Closed);
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            // The connection driver dropped the pending entry.
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Timeout)
            }
        }
    }

    /// Typed variant of [`PeerHandle::call`].
    pub async fn call_as<R, P>(&self, method: &str, request: &P) -> Result<R, Error>
    where
        R: DeserializeOwned,
        P: Serialize,
    {
        let params = serde_json::to_value(request)
            .map_err(|e| Error::Protocol(format!("encode params: {}", e)))?;

        let result = self.call(method, params).await?;

        serde_json::from_value(result).map_err(|e| Error::Protocol(format!("decode result: {}", e)))
    }

    pub(crate) fn outbound(&self) -> mpsc::Sender<RpcMessage> {
        self.outbound.clone()
    }

    pub(crate) fn pending(&self) -> PendingMap {
        self.pending.clone()
    }
}

/// Drive one connection until it closes: dispatch inbound requests to the
/// service, route replies back to pending callers, forward outbound
/// frames.
///
/// Reads and writes run as independent tasks so a frame is never dropped
/// halfway through either direction.
pub(crate) async fn drive_connection<S: RpcService>(
    stream: TcpStream,
    remote_id: String,
    service: Arc<S>,
    handle: PeerHandle,
    mut outbound_rx: mpsc::Receiver<RpcMessage>,
    max_frame_size: usize,
) {
    let pending = handle.pending();
    let (mut reader, mut writer) = stream.into_split();

    let writer_id = remote_id.clone();
    // Guarded so that dropping this future, however it ends, also drops
    // the write half and sends FIN.
    let writer_task = AbortOnDrop(tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &msg).await {
                if !e.is_closed() {
                    warn!(remote_id = %writer_id, "write error: {}", e);
                }
                break;
            }
        }
    }));

    loop {
        match read_frame(&mut reader, max_frame_size).await {
            Ok(Some(RpcMessage::Request { id, method, params })) => {
                let service = service.clone();
                let ctx = RpcContext {
                    remote_id: remote_id.clone(),
                    peer: handle.clone(),
                };
                let reply_tx = handle.outbound();

                tokio::spawn(async move {
                    let reply = match service.call(ctx, &method, params).await {
                        Ok(result) => RpcMessage::Response { id, result },
                        Err(e) => RpcMessage::Error {
                            id,
                            message: e.to_string(),
                        },
                    };

                    let _ = reply_tx.send(reply).await;
                });
            }
            Ok(Some(RpcMessage::Response { id, result })) => {
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(Ok(result));
                }
            }
            Ok(Some(RpcMessage::Error { id, message })) => {
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(Err(Error::from_remote(&message)));
                }
            }
            Ok(None) => {
                debug!(remote_id = %remote_id, "connection closed");
                break;
            }
            Err(e) if e.is_closed() => {
                debug!(remote_id = %remote_id, "connection closed: {}", e);
                break;
            }
            Err(e) => {
                warn!(remote_id = %remote_id, "read error: {}", e);
                break;
            }
        }
    }

    drop(writer_task);

    // In-flight calls on this connection will never be answered.
    let mut pending = pending.lock().await;
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(Error::Closed));
    }
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
