// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC client: dials a server and serves requests issued by it.

use crate::error::Error;
use crate::rpc::peer::{drive_connection, PeerHandle, RpcService};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A linked client connection.
///
/// The upstream can call into `service` for as long as the link is up;
/// the handle issues calls in the other direction.
pub struct RpcClient {
    handle: PeerHandle,
    driver: JoinHandle<()>,
}

impl RpcClient {
    /// Dial `addr` and start serving the connection.
    ///
    /// `label` is the remote ID handlers on this side observe for
    /// requests issued by the upstream.
    pub async fn connect<S: RpcService>(
        addr: &str,
        label: &str,
        service: Arc<S>,
        call_timeout: Duration,
    ) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let handle = PeerHandle::new(label.to_string(), outbound_tx, call_timeout);

        let driver = tokio::spawn(drive_connection(
            stream,
            label.to_string(),
            service,
            handle.clone(),
            outbound_rx,
            super::MAX_FRAME_SIZE,
        ));

        Ok(Self { handle, driver })
    }

    /// Handle for issuing calls to the upstream.
    pub fn handle(&self) -> PeerHandle {
        self.handle.clone()
    }

    /// Whether the link has gone down.
    pub fn is_closed(&self) -> bool {
        self.driver.is_finished()
    }

    /// Drop the link.
    pub fn close(&self) {
        self.driver.abort();
    }

    /// Wait until the link goes down.
    pub async fn join(&mut self) {
        let _ = (&mut self.driver).await;
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
