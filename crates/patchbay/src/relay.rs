// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection-pair bookkeeping and byte splicing for relay hops.
//!
//! Each provisioned hop owns a [`ConnPair`]: the set of tasks driving its
//! ingress and egress sides. Unprovisioning closes the pair, which aborts
//! any in-flight accept and tears down both copy directions.

use crate::error::{is_closed_io, Error};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One hop's ingress and egress, owned as abortable tasks.
///
/// The pair moves through `binding → awaiting-both-sides → copying →
/// closed`; closing is terminal and idempotent.
#[derive(Default)]
pub struct ConnPair {
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnPair {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Track a task belonging to this pair. A task attached after the
    /// pair was closed is aborted immediately.
    pub async fn attach(&self, task: JoinHandle<()>) {
        if self.closed.load(Ordering::SeqCst) {
            task.abort();
            return;
        }
        self.tasks.lock().await.push(task);
    }

    /// Close both sides. Dropping the tasks drops the listeners and
    /// streams they own, which aborts in-flight accepts and ends the
    /// copies with I/O errors.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ConnPair {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

/// Provisioned hops by route ID.
#[derive(Default)]
pub struct RouteTable {
    routes: Mutex<HashMap<String, Arc<ConnPair>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, route_id: &str, pair: Arc<ConnPair>) {
        if let Some(old) = self.routes.lock().await.insert(route_id.to_string(), pair) {
            warn!(route_id = %route_id, "replacing existing route");
            old.close().await;
        }
    }

    /// Close and forget a route. A second call for the same route reports
    /// `route-not-found`.
    pub async fn remove(&self, route_id: &str) -> Result<(), Error> {
        let pair = self
            .routes
            .lock()
            .await
            .remove(route_id)
            .ok_or(Error::RouteNotFound)?;

        pair.close().await;
        Ok(())
    }

    pub async fn contains(&self, route_id: &str) -> bool {
        self.routes.lock().await.contains_key(route_id)
    }

    pub async fn len(&self) -> usize {
        self.routes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.routes.lock().await.is_empty()
    }

    pub async fn close_all(&self) {
        for (_, pair) in self.routes.lock().await.drain() {
            pair.close().await;
        }
    }
}

/// Splice two established streams: one independent copy task per
/// direction. Closed-class errors end a direction quietly.
pub fn spawn_splice<A, B>(a: A, b: B) -> (JoinHandle<()>, JoinHandle<()>)
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let forward = tokio::spawn(async move {
        match tokio::io::copy(&mut a_read, &mut b_write).await {
            Ok(_) => {}
            Err(e) if is_closed_io(&e) => debug!("copy ended: {}", e),
            Err(e) => warn!("copy failed: {}", e),
        }
        let _ = b_write.shutdown().await;
    });

    let backward = tokio::spawn(async move {
        match tokio::io::copy(&mut b_read, &mut a_write).await {
            Ok(_) => {}
            Err(e) if is_closed_io(&e) => debug!("copy ended: {}", e),
            Err(e) => warn!("copy failed: {}", e),
        }
        let _ = a_write.shutdown().await;
    });

    (forward, backward)
}
