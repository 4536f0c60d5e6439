// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The router: switch registry, probe loop, topology graph and route
//! provisioning.

use crate::gateway::Gateway;
use crate::graph::{network_graph, Graph};
use crate::metrics::Metrics;
use async_trait::async_trait;
use patchbay::auth::PeerValidator;
use patchbay::error::Error;
use patchbay::net;
use patchbay::pki::{Ca, Role};
use patchbay::rpc::{ConnectionHooks, PeerHandle, PeerMap, RpcContext, RpcService};
use patchbay::wire::{
    self, method, CertPair, Hop, LatencyRequest, LatencyResponse, ProvisionRequest,
    ProvisionResponse, PublicIpResponse, RegisterSwitchRequest, SwitchConfig, Throughput,
    ThroughputRequest, ThroughputResponse, UnprovisionRequest,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A registered switch.
///
/// The measurement maps are keyed by the other switches' remote IDs and
/// never contain the owner's own ID.
#[derive(Debug, Clone)]
pub struct SwitchEntry {
    pub addr: String,
    pub latencies: HashMap<String, Duration>,
    pub throughputs: HashMap<String, Throughput>,
}

/// A provisioned route: terminal adapters at both ends, switches in the
/// middle. Immutable once inserted.
#[derive(Debug, Clone)]
pub struct Route {
    pub path: Vec<String>,
    pub created_at: SystemTime,
}

/// Router tunables.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub throughput_length: u64,
    pub throughput_chunks: u64,
    pub call_cert_validity: Duration,
    pub benchmark_listen_cert_validity: Duration,
    pub benchmark_client_cert_validity: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            throughput_length: 1_048_576,
            throughput_chunks: 100,
            call_cert_validity: Duration::from_secs(3600),
            benchmark_listen_cert_validity: Duration::from_secs(365 * 24 * 3600),
            benchmark_client_cert_validity: Duration::from_secs(300),
        }
    }
}

/// The topology and path engine.
///
/// Locking discipline: each aggregate (switches, graph, routes) has its
/// own lock; snapshots are copied out before any RPC is issued and no
/// two aggregate locks are held at once.
pub struct Router {
    settings: RouterSettings,
    ca: Arc<Ca>,
    auth: Arc<dyn PeerValidator>,
    metrics: Arc<Metrics>,

    switches: RwLock<HashMap<String, SwitchEntry>>,
    graph: RwLock<Graph>,
    routes: RwLock<HashMap<String, Route>>,

    /// Control connections of registered switches.
    peers: PeerMap,

    gateway: OnceLock<Arc<Gateway>>,
}

impl Router {
    pub fn new(
        settings: RouterSettings,
        ca: Arc<Ca>,
        auth: Arc<dyn PeerValidator>,
        metrics: Arc<Metrics>,
        peers: PeerMap,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            ca,
            auth,
            metrics,
            switches: RwLock::new(HashMap::new()),
            graph: RwLock::new(Graph::new()),
            routes: RwLock::new(HashMap::new()),
            peers,
            gateway: OnceLock::new(),
        })
    }

    /// Bind the gateway back-reference, once, after construction.
    pub fn bind_gateway(&self, gateway: Arc<Gateway>) {
        let _ = self.gateway.set(gateway);
    }

    fn gateway(&self) -> Result<Arc<Gateway>, Error> {
        self.gateway
            .get()
            .cloned()
            .ok_or_else(|| Error::Protocol("gateway is not bound".into()))
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn ca(&self) -> &Arc<Ca> {
        &self.ca
    }

    // -- Registry --

    /// Handle `RegisterSwitch`.
    pub async fn register_switch(
        &self,
        remote_id: &str,
        token: &str,
        addr: &str,
    ) -> Result<SwitchConfig, Error> {
        self.auth.validate(token).await?;

        let host = net::host_of(addr)?;

        {
            let mut switches = self.switches.write().await;
            if switches.contains_key(remote_id) {
                return Err(Error::SwitchAlreadyRegistered);
            }

            switches.insert(
                remote_id.to_string(),
                SwitchEntry {
                    addr: addr.to_string(),
                    latencies: HashMap::new(),
                    throughputs: HashMap::new(),
                },
            );
        }

        info!(remote_id = %remote_id, "added switch at {} to topology", addr);

        self.update_graphs().await;

        let benchmark_listen_cert = self.ca.issue(
            Role::BenchmarkListener,
            "",
            &host,
            self.settings.benchmark_listen_cert_validity,
        )?;

        Ok(SwitchConfig {
            ca_pem: self.ca.ca_pem().to_string(),
            benchmark_listen_cert,
        })
    }

    pub async fn switches_snapshot(&self) -> HashMap<String, SwitchEntry> {
        self.switches.read().await.clone()
    }

    pub async fn switch_ids(&self) -> Vec<String> {
        self.switches.read().await.keys().cloned().collect()
    }

    /// Advertised addresses of all switches plus their IDs, positionally
    /// aligned.
    pub async fn switch_addrs(&self) -> (Vec<String>, Vec<String>) {
        let switches = self.switches.read().await;

        let mut addrs = Vec::with_capacity(switches.len());
        let mut ids = Vec::with_capacity(switches.len());
        for (id, entry) in switches.iter() {
            addrs.push(entry.addr.clone());
            ids.push(id.clone());
        }

        (addrs, ids)
    }

    pub async fn routes_snapshot(&self) -> HashMap<String, Vec<String>> {
        self.routes
            .read()
            .await
            .iter()
            .map(|(id, route)| (id.clone(), route.path.clone()))
            .collect()
    }

    pub async fn route_path(&self, route_id: &str) -> Option<Vec<String>> {
        self.routes
            .read()
            .await
            .get(route_id)
            .map(|route| route.path.clone())
    }

    // -- Graph --

    /// Recompute the topology graph from the registries and hand the
    /// snapshots to the metrics service.
    pub async fn update_graphs(&self) {
        let switches = self.switches_snapshot().await;
        let adapters = match self.gateway() {
            Ok(gateway) => gateway.adapters_snapshot().await,
            Err(_) => HashMap::new(),
        };

        let graph = network_graph(&switches, &adapters);
        *self.graph.write().await = graph;

        let routes = self.routes_snapshot().await;
        self.metrics.publish(&switches, &adapters, routes);
    }

    // -- Probes --

    /// Apply one switch's latency probe results.
    ///
    /// `results` must be positionally aligned with `ids`; a length
    /// mismatch rejects the whole probe without touching state.
    pub async fn apply_latency_results(
        &self,
        switch_id: &str,
        ids: &[String],
        results: Vec<Duration>,
    ) -> Result<(), Error> {
        if results.len() != ids.len() {
            return Err(Error::InvalidProbeResultLength);
        }

        {
            let mut switches = self.switches.write().await;
            let entry = switches.get_mut(switch_id).ok_or(Error::SwitchNotFound)?;

            entry.latencies = ids
                .iter()
                .cloned()
                .zip(results)
                .filter(|(id, _)| id != switch_id)
                .collect();
        }

        self.update_graphs().await;
        Ok(())
    }

    /// Apply one switch's throughput probe results. Same alignment rules
    /// as the latency variant.
    pub async fn apply_throughput_results(
        &self,
        switch_id: &str,
        ids: &[String],
        results: Vec<Throughput>,
    ) -> Result<(), Error> {
        if results.len() != ids.len() {
            return Err(Error::InvalidProbeResultLength);
        }

        {
            let mut switches = self.switches.write().await;
            let entry = switches.get_mut(switch_id).ok_or(Error::SwitchNotFound)?;

            entry.throughputs = ids
                .iter()
                .cloned()
                .zip(results)
                .filter(|(id, _)| id != switch_id)
                .collect();
        }

        self.update_graphs().await;
        Ok(())
    }

    /// Run one probe cycle: every registered switch measures latency and
    /// throughput against all the others, everything concurrently, with
    /// a barrier before returning.
    pub async fn probe_cycle(&self) {
        let peers: Vec<(String, PeerHandle)> = {
            self.peers
                .read()
                .await
                .iter()
                .map(|(id, handle)| (id.clone(), handle.clone()))
                .collect()
        };

        let registered: HashSet<String> = self.switches.read().await.keys().cloned().collect();

        let probes = peers
            .into_iter()
            .filter(|(id, _)| registered.contains(id))
            .map(|(id, peer)| async move {
                let (addrs, ids) = self.probe_targets(&id).await;
                if addrs.is_empty() {
                    return;
                }

                tokio::join!(
                    self.probe_latency(&id, &peer, &addrs, &ids),
                    self.probe_throughput(&id, &peer, &addrs, &ids),
                );
            });

        futures::future::join_all(probes).await;
    }

    /// Spawn the periodic probe loop.
    pub fn spawn_probe_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let router = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + router.settings.probe_interval,
                router.settings.probe_interval,
            );
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                router.probe_cycle().await;
            }
        })
    }

    /// Addresses and IDs of every switch except `exclude`, positionally
    /// aligned.
    async fn probe_targets(&self, exclude: &str) -> (Vec<String>, Vec<String>) {
        let switches = self.switches.read().await;

        let mut addrs = Vec::new();
        let mut ids = Vec::new();
        for (id, entry) in switches.iter() {
            if id == exclude {
                continue;
            }
            addrs.push(entry.addr.clone());
            ids.push(id.clone());
        }

        (addrs, ids)
    }

    async fn probe_latency(&self, id: &str, peer: &PeerHandle, addrs: &[String], ids: &[String]) {
        debug!(remote_id = %id, "starting latency probe");

        let client_cert = match self.ca.issue(
            Role::BenchmarkClient,
            "",
            "",
            self.settings.benchmark_client_cert_validity,
        ) {
            Ok(cert) => cert,
            Err(e) => {
                warn!(remote_id = %id, "could not mint benchmark cert: {}", e);
                return;
            }
        };

        let request = LatencyRequest {
            timeout_ms: self.settings.probe_timeout.as_millis() as u64,
            addrs: addrs.to_vec(),
            client_cert,
        };

        let response: LatencyResponse = match peer.call_as(method::TEST_LATENCY, &request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(remote_id = %id, "latency probe failed, continuing: {}", e);
                return;
            }
        };

        let results = response
            .latencies_ns
            .into_iter()
            .map(Duration::from_nanos)
            .collect();

        if let Err(e) = self.apply_latency_results(id, ids, results).await {
            warn!(remote_id = %id, "discarding latency probe: {}", e);
        }
    }

    async fn probe_throughput(
        &self,
        id: &str,
        peer: &PeerHandle,
        addrs: &[String],
        ids: &[String],
    ) {
        debug!(remote_id = %id, "starting throughput probe");

        let client_cert = match self.ca.issue(
            Role::BenchmarkClient,
            "",
            "",
            self.settings.benchmark_client_cert_validity,
        ) {
            Ok(cert) => cert,
            Err(e) => {
                warn!(remote_id = %id, "could not mint benchmark cert: {}", e);
                return;
            }
        };

        let request = ThroughputRequest {
            timeout_ms: self.settings.probe_timeout.as_millis() as u64,
            addrs: addrs.to_vec(),
            length: self.settings.throughput_length,
            chunks: self.settings.throughput_chunks,
            client_cert,
        };

        let response: ThroughputResponse =
            match peer.call_as(method::TEST_THROUGHPUT, &request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(remote_id = %id, "throughput probe failed, continuing: {}", e);
                    return;
                }
            };

        if let Err(e) = self.apply_throughput_results(id, ids, response.results).await {
            warn!(remote_id = %id, "discarding throughput probe: {}", e);
        }
    }

    // -- Provisioning --

    fn call_cert(&self, role: Role, route_id: &str, ip: &str) -> Result<CertPair, Error> {
        self.ca
            .issue(role, route_id, ip, self.settings.call_cert_validity)
    }

    /// Provision the best route from `src_id` to `dst_id`.
    ///
    /// Hops are provisioned from the terminus toward the source: each
    /// hop needs the downstream listener's address, so the chain is
    /// walked in reverse and every call yields the address the next one
    /// dials. Already-provisioned hops are not rolled back on failure;
    /// hangup or disconnect cleanup collects them.
    pub async fn provision_route(
        &self,
        src_id: &str,
        dst_id: &str,
        route_id: &str,
    ) -> Result<(), Error> {
        info!(route_id = %route_id, "provisioning route from {} to {}", src_id, dst_id);

        let path = self.graph.read().await.shortest_path(src_id, dst_id)?;
        if path.len() < 3 {
            return Err(Error::RouteNotFound);
        }

        let switches = self.switches_snapshot().await;
        let peers = self.peers.read().await.clone();

        // Interior switches, terminus-adjacent first.
        let mut chain: Vec<(String, PeerHandle, String)> = Vec::new();
        for switch_id in &path[1..path.len() - 1] {
            let peer = peers
                .get(switch_id)
                .cloned()
                .ok_or(Error::SwitchNotFound)?;
            let entry = switches.get(switch_id).ok_or(Error::SwitchNotFound)?;

            chain.insert(0, (switch_id.clone(), peer, entry.addr.clone()));
        }

        let last = chain.len() - 1;
        let mut egress_laddr = String::new();
        let mut ingress_raddr = String::new();

        for (i, (switch_id, peer, advertised)) in chain.iter().enumerate() {
            let public_ip: PublicIpResponse = peer
                .call_as(method::GET_PUBLIC_IP, &serde_json::json!({}))
                .await?;

            let hop = if chain.len() == 1 {
                Hop::Only {
                    adapter_listen: self.call_cert(
                        Role::AdapterListener,
                        route_id,
                        &public_ip.ip,
                    )?,
                }
            } else if i == 0 {
                Hop::First {
                    adapter_listen: self.call_cert(
                        Role::AdapterListener,
                        route_id,
                        &public_ip.ip,
                    )?,
                    switch_listen: self.call_cert(Role::SwitchListener, route_id, &public_ip.ip)?,
                }
            } else if i == last {
                Hop::Last {
                    adapter_listen: self.call_cert(
                        Role::AdapterListener,
                        route_id,
                        &public_ip.ip,
                    )?,
                    switch_client: self.call_cert(Role::SwitchClient, route_id, "")?,
                    upstream: ingress_raddr.clone(),
                }
            } else {
                Hop::Middle {
                    switch_listen: self.call_cert(Role::SwitchListener, route_id, &public_ip.ip)?,
                    switch_client: self.call_cert(Role::SwitchClient, route_id, "")?,
                    upstream: ingress_raddr.clone(),
                }
            };

            let expected_ports = hop.expected_ports();

            let response: ProvisionResponse = peer
                .call_as(
                    method::PROVISION_ROUTE,
                    &ProvisionRequest {
                        route_id: route_id.to_string(),
                        hop,
                    },
                )
                .await?;

            debug!(route_id = %route_id, "provisioned hop on {}: {:?}", switch_id, response.addrs);

            if response.addrs.len() != expected_ports {
                return Err(Error::InvalidPortsCount);
            }

            // Listeners bind locally; the addresses handed onward carry
            // the switch's advertised host.
            let mut addrs = response.addrs;
            if i == 0 {
                egress_laddr = net::rebase_port(advertised, &addrs[0])?;
                addrs.remove(0);
            }
            ingress_raddr = net::rebase_port(advertised, &addrs[0])?;
        }

        let gateway = self.gateway()?;
        let src_peer = gateway
            .peer(src_id)
            .await
            .ok_or(Error::AdapterNotFound)?;
        let dst_peer = gateway
            .peer(dst_id)
            .await
            .ok_or(Error::AdapterNotFound)?;

        let src_cert = self.call_cert(Role::AdapterClient, route_id, "")?;
        let _: Value = src_peer
            .call_as(
                method::PROVISION_ROUTE,
                &wire::AdapterProvisionRequest {
                    route_id: route_id.to_string(),
                    upstream: egress_laddr,
                    cert: src_cert,
                },
            )
            .await?;

        let dst_cert = self.call_cert(Role::AdapterClient, route_id, "")?;
        let _: Value = dst_peer
            .call_as(
                method::PROVISION_ROUTE,
                &wire::AdapterProvisionRequest {
                    route_id: route_id.to_string(),
                    upstream: ingress_raddr,
                    cert: dst_cert,
                },
            )
            .await?;

        self.routes.write().await.insert(
            route_id.to_string(),
            Route {
                path: path.clone(),
                created_at: SystemTime::now(),
            },
        );

        info!(route_id = %route_id, "route installed: {:?}", path);

        self.update_graphs().await;

        Ok(())
    }

    // -- Teardown --

    /// Remove one route and unprovision every participant.
    pub async fn remove_route(&self, route_id: &str) -> Result<(), Error> {
        let route = self
            .routes
            .write()
            .await
            .remove(route_id)
            .ok_or(Error::RouteNotFound)?;

        self.notify_unprovision(vec![(route_id.to_string(), route.path)])
            .await;

        self.update_graphs().await;
        Ok(())
    }

    /// Remove every route `remote_id` participates in and unprovision
    /// the other participants. The disconnected peer itself is never
    /// called.
    pub async fn unprovision_for_peer(&self, remote_id: &str) {
        let mut affected: Vec<(String, Vec<String>)> = Vec::new();

        {
            let mut routes = self.routes.write().await;
            routes.retain(|route_id, route| {
                if route.path.iter().any(|participant| participant == remote_id) {
                    affected.push((
                        route_id.clone(),
                        route
                            .path
                            .iter()
                            .filter(|participant| *participant != remote_id)
                            .cloned()
                            .collect(),
                    ));
                    false
                } else {
                    true
                }
            });
        }

        if !affected.is_empty() {
            info!(
                remote_id = %remote_id,
                "unprovisioning {} routes for departed peer",
                affected.len()
            );
            self.notify_unprovision(affected).await;
        }

        self.update_graphs().await;
    }

    /// Concurrently send `UnprovisionRoute` to every listed participant
    /// that is still connected. Failures are logged and skipped.
    async fn notify_unprovision(&self, affected: Vec<(String, Vec<String>)>) {
        let switch_peers = self.peers.read().await.clone();
        let adapter_peers = match self.gateway() {
            Ok(gateway) => gateway.peers_snapshot().await,
            Err(_) => HashMap::new(),
        };

        let mut calls = Vec::new();
        for (route_id, participants) in affected {
            for participant in participants {
                let peer = switch_peers
                    .get(&participant)
                    .or_else(|| adapter_peers.get(&participant))
                    .cloned();

                let Some(peer) = peer else {
                    continue;
                };

                let route_id = route_id.clone();
                calls.push(async move {
                    let request = UnprovisionRequest {
                        route_id: route_id.clone(),
                    };

                    if let Err(e) = peer
                        .call_as::<Value, _>(method::UNPROVISION_ROUTE, &request)
                        .await
                    {
                        warn!(
                            route_id = %route_id,
                            "could not unprovision on {}, continuing: {}",
                            participant, e
                        );
                    }
                });
            }
        }

        futures::future::join_all(calls).await;
    }

    /// Disconnect handling: drop the switch from the topology, then tear
    /// down every route it carried.
    pub async fn handle_switch_disconnect(&self, remote_id: &str) {
        let removed = self.switches.write().await.remove(remote_id).is_some();
        if removed {
            info!(remote_id = %remote_id, "removed switch from topology");
        }

        self.unprovision_for_peer(remote_id).await;
    }
}

/// RPC dispatch for the router service.
pub struct RouterRpc {
    router: Arc<Router>,
}

impl RouterRpc {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl RpcService for RouterRpc {
    async fn call(&self, ctx: RpcContext, method: &str, params: Value) -> Result<Value, Error> {
        match method {
            method::REGISTER_SWITCH => {
                let req: RegisterSwitchRequest = wire::params(params)?;
                let config = self
                    .router
                    .register_switch(&ctx.remote_id, &req.token, &req.addr)
                    .await?;
                wire::to_value(&config)
            }
            _ => Err(Error::Protocol(format!("unknown method: {}", method))),
        }
    }
}

/// Router connection hooks: a dropped control link cascades into route
/// teardown before the departure is forgotten.
pub struct RouterHooks {
    router: Arc<Router>,
}

impl RouterHooks {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl ConnectionHooks for RouterHooks {
    async fn on_disconnect(&self, remote_id: &str) {
        self.router.handle_switch_disconnect(remote_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use patchbay::auth::StaticTokenValidator;
    use std::collections::HashMap as StdHashMap;

    fn test_router() -> Arc<Router> {
        let ca = Arc::new(Ca::generate(Duration::from_secs(3600)).unwrap());
        let auth = Arc::new(StaticTokenValidator::new("secret"));
        let peers: PeerMap = Arc::new(RwLock::new(StdHashMap::new()));
        let metrics = Metrics::new(
            Arc::new(StaticTokenValidator::new("secret")),
            Arc::new(RwLock::new(StdHashMap::new())),
        );

        Router::new(RouterSettings::default(), ca, auth, metrics, peers)
    }

    #[tokio::test]
    async fn test_register_switch_rejects_duplicate() {
        let router = test_router();

        router
            .register_switch("sw-1", "secret", "127.0.0.1:1340")
            .await
            .unwrap();

        let err = router
            .register_switch("sw-1", "secret", "127.0.0.1:1341")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SwitchAlreadyRegistered));

        // The original registration is untouched.
        let switches = router.switches_snapshot().await;
        assert_eq!(switches.len(), 1);
        assert_eq!(switches["sw-1"].addr, "127.0.0.1:1340");
    }

    #[tokio::test]
    async fn test_register_switch_rejects_bad_token() {
        let router = test_router();

        let err = router
            .register_switch("sw-1", "wrong", "127.0.0.1:1340")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
        assert!(router.switches_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_register_switch_returns_ca_and_benchmark_cert() {
        let router = test_router();

        let config = router
            .register_switch("sw-1", "secret", "127.0.0.1:1340")
            .await
            .unwrap();

        assert!(config.ca_pem.contains("BEGIN CERTIFICATE"));
        assert!(config
            .benchmark_listen_cert
            .cert_pem
            .contains("BEGIN CERTIFICATE"));
    }

    #[tokio::test]
    async fn test_apply_latency_results_length_mismatch() {
        let router = test_router();
        router
            .register_switch("sw-1", "secret", "127.0.0.1:1340")
            .await
            .unwrap();

        let ids = vec!["sw-2".to_string(), "sw-3".to_string()];
        let short = vec![Duration::from_millis(1)];

        let err = router
            .apply_latency_results("sw-1", &ids, short)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProbeResultLength));

        // Nothing was recorded.
        let switches = router.switches_snapshot().await;
        assert!(switches["sw-1"].latencies.is_empty());
    }

    #[tokio::test]
    async fn test_apply_results_never_records_self() {
        let router = test_router();
        router
            .register_switch("sw-1", "secret", "127.0.0.1:1340")
            .await
            .unwrap();

        let ids = vec!["sw-1".to_string(), "sw-2".to_string()];
        router
            .apply_latency_results(
                "sw-1",
                &ids,
                vec![Duration::from_millis(1), Duration::from_millis(2)],
            )
            .await
            .unwrap();

        let switches = router.switches_snapshot().await;
        assert!(!switches["sw-1"].latencies.contains_key("sw-1"));
        assert!(switches["sw-1"].latencies.contains_key("sw-2"));
    }

    #[tokio::test]
    async fn test_unprovision_for_peer_removes_routes() {
        let router = test_router();

        router.routes.write().await.insert(
            "route-1".to_string(),
            Route {
                path: vec!["a".into(), "sw".into(), "b".into()],
                created_at: SystemTime::now(),
            },
        );
        router.routes.write().await.insert(
            "route-2".to_string(),
            Route {
                path: vec!["c".into(), "other".into(), "d".into()],
                created_at: SystemTime::now(),
            },
        );

        router.unprovision_for_peer("sw").await;

        let routes = router.routes_snapshot().await;
        assert!(!routes.contains_key("route-1"));
        assert!(routes.contains_key("route-2"));
    }

    #[tokio::test]
    async fn test_remove_route_unknown() {
        let router = test_router();
        let err = router.remove_route("missing").await.unwrap_err();
        assert!(matches!(err, Error::RouteNotFound));
    }
}
