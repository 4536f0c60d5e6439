// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The metrics service: pushes topology and route snapshots to
//! registered visualizers.
//!
//! Publishing is decoupled from rendering through a watch channel: the
//! notifier task only ever sees the latest snapshot, so bursts of
//! topology updates coalesce instead of interleaving renderings.

use crate::gateway::AdapterEntry;
use crate::router::SwitchEntry;
use async_trait::async_trait;
use patchbay::auth::PeerValidator;
use patchbay::error::Error;
use patchbay::rpc::{ConnectionHooks, PeerHandle, PeerMap, RpcContext, RpcService};
use patchbay::wire::{
    self, method, AdapterInfo, RegisterVisualizerRequest, RenderRoutesRequest,
    RenderTopologyRequest, SwitchInfo,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What visualizers get to see.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub topology: RenderTopologyRequest,
    pub routes: RenderRoutesRequest,
}

fn switch_info(entry: &SwitchEntry) -> SwitchInfo {
    SwitchInfo {
        addr: entry.addr.clone(),
        latencies_ns: entry
            .latencies
            .iter()
            .map(|(id, latency)| (id.clone(), latency.as_nanos() as u64))
            .collect(),
        throughputs: entry.throughputs.clone(),
    }
}

fn adapter_info(entry: &AdapterEntry) -> AdapterInfo {
    AdapterInfo {
        email: entry.email.clone(),
        latencies_ns: entry
            .latencies
            .iter()
            .map(|(id, latency)| (id.clone(), latency.as_nanos() as u64))
            .collect(),
        throughputs: entry.throughputs.clone(),
    }
}

/// Snapshot publisher and visualizer registry.
pub struct Metrics {
    auth: Arc<dyn PeerValidator>,

    /// Control connections on the metrics port.
    peers: PeerMap,

    /// Remote IDs that registered as visualizers.
    visualizers: RwLock<HashSet<String>>,

    latest: watch::Sender<Snapshot>,
}

impl Metrics {
    pub fn new(auth: Arc<dyn PeerValidator>, peers: PeerMap) -> Arc<Self> {
        let (latest, _) = watch::channel(Snapshot::default());

        Arc::new(Self {
            auth,
            peers,
            visualizers: RwLock::new(HashSet::new()),
            latest,
        })
    }

    /// Publish new registry snapshots. Cheap and synchronous; the
    /// notifier task picks up whatever is newest.
    pub fn publish(
        &self,
        switches: &HashMap<String, SwitchEntry>,
        adapters: &HashMap<String, AdapterEntry>,
        routes: HashMap<String, Vec<String>>,
    ) {
        let snapshot = Snapshot {
            topology: RenderTopologyRequest {
                switches: switches
                    .iter()
                    .map(|(id, entry)| (id.clone(), switch_info(entry)))
                    .collect(),
                adapters: adapters
                    .iter()
                    .map(|(id, entry)| (id.clone(), adapter_info(entry)))
                    .collect(),
            },
            routes: RenderRoutesRequest { routes },
        };

        let _ = self.latest.send(snapshot);
    }

    /// Spawn the notifier: waits for snapshot changes and pushes the
    /// newest one to every registered visualizer.
    pub fn spawn_notifier(self: &Arc<Self>) -> JoinHandle<()> {
        let metrics = self.clone();

        tokio::spawn(async move {
            let mut rx = metrics.latest.subscribe();

            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                metrics.push_to_all(&snapshot).await;
            }
        })
    }

    async fn push_to_all(&self, snapshot: &Snapshot) {
        let targets: Vec<PeerHandle> = {
            let visualizers = self.visualizers.read().await;
            let peers = self.peers.read().await;
            visualizers
                .iter()
                .filter_map(|id| peers.get(id).cloned())
                .collect()
        };

        for peer in targets {
            Self::push_to(&peer, snapshot).await;
        }
    }

    async fn push_to(peer: &PeerHandle, snapshot: &Snapshot) {
        if let Err(e) = peer
            .call_as::<Value, _>(method::RENDER_TOPOLOGY, &snapshot.topology)
            .await
        {
            warn!("could not push topology to {}: {}", peer.remote_id(), e);
            return;
        }

        if let Err(e) = peer
            .call_as::<Value, _>(method::RENDER_ROUTES, &snapshot.routes)
            .await
        {
            warn!("could not push routes to {}: {}", peer.remote_id(), e);
        }
    }

    /// Handle `RegisterVisualizer`: authorize, then bring the newcomer
    /// up to date with the current snapshot.
    pub async fn register_visualizer(&self, remote_id: &str, token: &str) -> Result<(), Error> {
        self.auth.validate(token).await?;

        self.visualizers.write().await.insert(remote_id.to_string());
        info!(remote_id = %remote_id, "registered visualizer");

        if let Some(peer) = self.peers.read().await.get(remote_id).cloned() {
            let snapshot = self.latest.borrow().clone();
            tokio::spawn(async move {
                Self::push_to(&peer, &snapshot).await;
            });
        }

        Ok(())
    }

    pub async fn forget(&self, remote_id: &str) {
        if self.visualizers.write().await.remove(remote_id) {
            debug!(remote_id = %remote_id, "visualizer disconnected");
        }
    }
}

/// RPC dispatch for the metrics service.
pub struct MetricsRpc {
    metrics: Arc<Metrics>,
}

impl MetricsRpc {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl RpcService for MetricsRpc {
    async fn call(&self, ctx: RpcContext, method: &str, params: Value) -> Result<Value, Error> {
        match method {
            method::REGISTER_VISUALIZER => {
                let req: RegisterVisualizerRequest = wire::params(params)?;
                self.metrics
                    .register_visualizer(&ctx.remote_id, &req.token)
                    .await?;
                Ok(Value::Null)
            }
            _ => Err(Error::Protocol(format!("unknown method: {}", method))),
        }
    }
}

/// Metrics connection hooks.
pub struct MetricsHooks {
    metrics: Arc<Metrics>,
}

impl MetricsHooks {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl ConnectionHooks for MetricsHooks {
    async fn on_disconnect(&self, remote_id: &str) {
        self.metrics.forget(remote_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay::auth::StaticTokenValidator;
    use std::time::Duration;

    fn test_metrics() -> Arc<Metrics> {
        Metrics::new(
            Arc::new(StaticTokenValidator::new("secret")),
            Arc::new(RwLock::new(HashMap::new())),
        )
    }

    fn switches_with_one() -> HashMap<String, SwitchEntry> {
        let mut switches = HashMap::new();
        switches.insert(
            "sw-1".to_string(),
            SwitchEntry {
                addr: "127.0.0.1:1340".into(),
                latencies: [("sw-2".to_string(), Duration::from_micros(250))].into(),
                throughputs: HashMap::new(),
            },
        );
        switches
    }

    #[tokio::test]
    async fn test_publish_coalesces_to_latest() {
        let metrics = test_metrics();
        let mut rx = metrics.latest.subscribe();

        for _ in 0..10 {
            metrics.publish(&switches_with_one(), &HashMap::new(), HashMap::new());
        }
        metrics.publish(&HashMap::new(), &HashMap::new(), HashMap::new());

        // Only the newest snapshot is observable.
        assert!(rx.changed().await.is_ok());
        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.topology.switches.is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_register_visualizer_requires_token() {
        let metrics = test_metrics();

        let err = metrics.register_visualizer("viz-1", "bad").await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));

        metrics.register_visualizer("viz-1", "secret").await.unwrap();
        assert!(metrics.visualizers.read().await.contains("viz-1"));

        metrics.forget("viz-1").await;
        assert!(metrics.visualizers.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_conversion() {
        let metrics = test_metrics();
        let mut rx = metrics.latest.subscribe();

        metrics.publish(&switches_with_one(), &HashMap::new(), HashMap::new());

        assert!(rx.changed().await.is_ok());
        let snapshot = rx.borrow_and_update().clone();
        let info = &snapshot.topology.switches["sw-1"];
        assert_eq!(info.addr, "127.0.0.1:1340");
        assert_eq!(info.latencies_ns["sw-2"], 250_000);
    }
}
