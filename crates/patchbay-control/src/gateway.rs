// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The gateway: adapter registry and call admission.

use crate::router::Router;
use async_trait::async_trait;
use patchbay::auth::SubjectValidator;
use patchbay::error::Error;
use patchbay::pki::{Ca, Role};
use patchbay::rpc::{ConnectionHooks, PeerHandle, PeerMap, RpcContext, RpcService};
use patchbay::wire::{
    self, method, CallRequest, HangupRequest, IncomingCallRequest, IncomingCallResponse,
    LatencyRequest, LatencyResponse, RegisterAdapterRequest, RegisterAdapterResponse,
    RequestCallResult, ResolveEmailRequest, ResolveEmailResponse, Throughput, ThroughputRequest,
    ThroughputResponse,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// A registered adapter, keyed by the transport's remote ID and carrying
/// the authenticated subject email.
#[derive(Debug, Clone)]
pub struct AdapterEntry {
    pub email: String,
    pub latencies: HashMap<String, Duration>,
    pub throughputs: HashMap<String, Throughput>,
}

/// Gateway tunables.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub probe_timeout: Duration,
    pub throughput_length: u64,
    pub throughput_chunks: u64,
    pub benchmark_client_cert_validity: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            throughput_length: 1_048_576,
            throughput_chunks: 100,
            benchmark_client_cert_validity: Duration::from_secs(300),
        }
    }
}

/// Call admission over the adapter registry.
pub struct Gateway {
    settings: GatewaySettings,
    ca: Arc<Ca>,
    auth: Arc<dyn SubjectValidator>,

    adapters: RwLock<HashMap<String, AdapterEntry>>,

    /// Control connections of registered adapters.
    peers: PeerMap,

    router: OnceLock<Arc<Router>>,
}

impl Gateway {
    pub fn new(
        settings: GatewaySettings,
        ca: Arc<Ca>,
        auth: Arc<dyn SubjectValidator>,
        peers: PeerMap,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            ca,
            auth,
            adapters: RwLock::new(HashMap::new()),
            peers,
            router: OnceLock::new(),
        })
    }

    /// Bind the router back-reference, once, after construction.
    pub fn bind_router(&self, router: Arc<Router>) {
        let _ = self.router.set(router);
    }

    fn router(&self) -> Result<Arc<Router>, Error> {
        self.router
            .get()
            .cloned()
            .ok_or_else(|| Error::Protocol("router is not bound".into()))
    }

    pub async fn adapters_snapshot(&self) -> HashMap<String, AdapterEntry> {
        self.adapters.read().await.clone()
    }

    pub async fn peer(&self, remote_id: &str) -> Option<PeerHandle> {
        self.peers.read().await.get(remote_id).cloned()
    }

    pub async fn peers_snapshot(&self) -> HashMap<String, PeerHandle> {
        self.peers.read().await.clone()
    }

    // -- Registry --

    /// Handle `RegisterAdapter`.
    pub async fn register_adapter(
        &self,
        remote_id: &str,
        token: &str,
    ) -> Result<RegisterAdapterResponse, Error> {
        let subject = self.auth.validate(token).await?;

        {
            let mut adapters = self.adapters.write().await;
            if adapters.contains_key(remote_id) {
                return Err(Error::AdapterAlreadyRegistered);
            }

            adapters.insert(
                remote_id.to_string(),
                AdapterEntry {
                    email: subject.email.clone(),
                    latencies: HashMap::new(),
                    throughputs: HashMap::new(),
                },
            );
        }

        info!(remote_id = %remote_id, "added adapter for {} to topology", subject.email);

        self.router()?.update_graphs().await;

        Ok(RegisterAdapterResponse {
            ca_pem: self.ca.ca_pem().to_string(),
        })
    }

    /// Handle `ResolveEmailToID`: linear scan over live entries.
    pub async fn resolve_email_to_id(&self, token: &str, email: &str) -> Result<String, Error> {
        self.auth.validate(token).await?;

        self.adapters
            .read()
            .await
            .iter()
            .find(|(_, entry)| entry.email == email)
            .map(|(id, _)| id.clone())
            .ok_or(Error::AdapterNotFound)
    }

    // -- Call admission --

    /// Handle `RequestCall`.
    ///
    /// The callee's user is asked before any measurement work; a decline
    /// short-circuits the whole flow.
    pub async fn request_call(
        &self,
        remote_id: &str,
        token: &str,
        dst_id: &str,
        channel_id: &str,
    ) -> Result<RequestCallResult, Error> {
        self.auth.validate(token).await?;

        let route_id = Uuid::new_v4().to_string();

        info!(
            remote_id = %remote_id,
            "requesting call to {} with route ID {} on channel {}",
            dst_id, route_id, channel_id
        );

        let caller_email = {
            let adapters = self.adapters.read().await;

            let caller = adapters.get(remote_id).ok_or(Error::AdapterNotFound)?;
            if !adapters.contains_key(dst_id) {
                return Err(Error::AdapterNotFound);
            }
            if remote_id == dst_id {
                return Err(Error::DstIsSrc);
            }

            caller.email.clone()
        };

        let router = self.router()?;
        let (addrs, ids) = router.switch_addrs().await;

        let dst_peer = self.peer(dst_id).await.ok_or(Error::AdapterNotFound)?;

        let answer: IncomingCallResponse = dst_peer
            .call_as(
                method::REQUEST_CALL,
                &IncomingCallRequest {
                    src_id: remote_id.to_string(),
                    src_email: caller_email,
                    route_id: route_id.clone(),
                    channel_id: channel_id.to_string(),
                },
            )
            .await?;

        if !answer.accept {
            return Ok(RequestCallResult {
                accept: false,
                route_id: String::new(),
            });
        }

        let src_peer = self.peer(remote_id).await.ok_or(Error::PeerNotFound)?;

        self.refresh_probes(dst_id, &dst_peer, &addrs, &ids).await?;
        self.refresh_probes(remote_id, &src_peer, &addrs, &ids)
            .await?;

        router.update_graphs().await;
        router.provision_route(remote_id, dst_id, &route_id).await?;

        info!(route_id = %route_id, "call to {} established", dst_id);

        Ok(RequestCallResult {
            accept: true,
            route_id,
        })
    }

    /// Handle `HangupCall`.
    pub async fn hangup_call(&self, token: &str, route_id: &str) -> Result<(), Error> {
        self.auth.validate(token).await?;

        info!(route_id = %route_id, "hanging up call");

        self.router()?.remove_route(route_id).await
    }

    // -- Probes --

    /// Refresh one adapter's measurements against every switch.
    async fn refresh_probes(
        &self,
        remote_id: &str,
        peer: &PeerHandle,
        addrs: &[String],
        ids: &[String],
    ) -> Result<(), Error> {
        let client_cert = self.ca.issue(
            Role::BenchmarkClient,
            "",
            "",
            self.settings.benchmark_client_cert_validity,
        )?;

        let latency: LatencyResponse = peer
            .call_as(
                method::TEST_LATENCY,
                &LatencyRequest {
                    timeout_ms: self.settings.probe_timeout.as_millis() as u64,
                    addrs: addrs.to_vec(),
                    client_cert: client_cert.clone(),
                },
            )
            .await?;

        let throughput: ThroughputResponse = peer
            .call_as(
                method::TEST_THROUGHPUT,
                &ThroughputRequest {
                    timeout_ms: self.settings.probe_timeout.as_millis() as u64,
                    addrs: addrs.to_vec(),
                    length: self.settings.throughput_length,
                    chunks: self.settings.throughput_chunks,
                    client_cert,
                },
            )
            .await?;

        let latencies = latency
            .latencies_ns
            .into_iter()
            .map(Duration::from_nanos)
            .collect();

        self.apply_probe_results(remote_id, ids, latencies, throughput.results)
            .await
    }

    /// Record one adapter's probe results, positionally aligned with
    /// `ids`. A length mismatch rejects the refresh without touching
    /// state.
    pub async fn apply_probe_results(
        &self,
        remote_id: &str,
        ids: &[String],
        latencies: Vec<Duration>,
        throughputs: Vec<Throughput>,
    ) -> Result<(), Error> {
        if latencies.len() != ids.len() || throughputs.len() != ids.len() {
            return Err(Error::InvalidProbeResultLength);
        }

        let mut adapters = self.adapters.write().await;
        let entry = adapters.get_mut(remote_id).ok_or(Error::AdapterNotFound)?;

        entry.latencies = ids.iter().cloned().zip(latencies).collect();
        entry.throughputs = ids.iter().cloned().zip(throughputs).collect();

        Ok(())
    }

    // -- Disconnects --

    /// Drop the adapter from the registry, then tear down every route it
    /// participated in.
    pub async fn handle_adapter_disconnect(&self, remote_id: &str) {
        let removed = self.adapters.write().await.remove(remote_id).is_some();
        if removed {
            info!(remote_id = %remote_id, "removed adapter from topology");
        }

        if let Ok(router) = self.router() {
            router.unprovision_for_peer(remote_id).await;
        }
    }
}

/// RPC dispatch for the gateway service.
pub struct GatewayRpc {
    gateway: Arc<Gateway>,
}

impl GatewayRpc {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl RpcService for GatewayRpc {
    async fn call(&self, ctx: RpcContext, method: &str, params: Value) -> Result<Value, Error> {
        match method {
            method::REGISTER_ADAPTER => {
                let req: RegisterAdapterRequest = wire::params(params)?;
                let response = self
                    .gateway
                    .register_adapter(&ctx.remote_id, &req.token)
                    .await?;
                wire::to_value(&response)
            }
            method::RESOLVE_EMAIL_TO_ID => {
                let req: ResolveEmailRequest = wire::params(params)?;
                let id = self
                    .gateway
                    .resolve_email_to_id(&req.token, &req.email)
                    .await?;
                wire::to_value(&ResolveEmailResponse { id })
            }
            method::REQUEST_CALL => {
                let req: CallRequest = wire::params(params)?;
                let result = self
                    .gateway
                    .request_call(&ctx.remote_id, &req.token, &req.dst_id, &req.channel_id)
                    .await?;
                wire::to_value(&result)
            }
            method::HANGUP_CALL => {
                let req: HangupRequest = wire::params(params)?;
                self.gateway.hangup_call(&req.token, &req.route_id).await?;
                Ok(Value::Null)
            }
            _ => Err(Error::Protocol(format!("unknown method: {}", method))),
        }
    }
}

/// Gateway connection hooks: a dropped adapter link cascades into route
/// teardown.
pub struct GatewayHooks {
    gateway: Arc<Gateway>,
}

impl GatewayHooks {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ConnectionHooks for GatewayHooks {
    async fn on_disconnect(&self, remote_id: &str) {
        self.gateway.handle_adapter_disconnect(remote_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::router::{Router, RouterSettings};
    use patchbay::auth::StaticTokenValidator;
    use std::collections::HashMap as StdHashMap;

    fn test_pair() -> (Arc<Router>, Arc<Gateway>) {
        let ca = Arc::new(Ca::generate(Duration::from_secs(3600)).unwrap());
        let metrics = Metrics::new(
            Arc::new(StaticTokenValidator::new("secret")),
            Arc::new(RwLock::new(StdHashMap::new())),
        );

        let router = Router::new(
            RouterSettings::default(),
            ca.clone(),
            Arc::new(StaticTokenValidator::new("secret")),
            metrics,
            Arc::new(RwLock::new(StdHashMap::new())),
        );

        let gateway = Gateway::new(
            GatewaySettings::default(),
            ca,
            Arc::new(StaticTokenValidator::new("secret")),
            Arc::new(RwLock::new(StdHashMap::new())),
        );

        router.bind_gateway(gateway.clone());
        gateway.bind_router(router.clone());

        (router, gateway)
    }

    fn token(email: &str) -> String {
        StaticTokenValidator::subject_token("secret", email)
    }

    #[tokio::test]
    async fn test_register_adapter_extracts_email() {
        let (_router, gateway) = test_pair();

        let response = gateway
            .register_adapter("ad-1", &token("alice@example.com"))
            .await
            .unwrap();
        assert!(response.ca_pem.contains("BEGIN CERTIFICATE"));

        let adapters = gateway.adapters_snapshot().await;
        assert_eq!(adapters.len(), 1);
        assert_eq!(adapters["ad-1"].email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_register_adapter_rejects_duplicate() {
        let (_router, gateway) = test_pair();

        gateway
            .register_adapter("ad-1", &token("alice@example.com"))
            .await
            .unwrap();

        let err = gateway
            .register_adapter("ad-1", &token("alice2@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AdapterAlreadyRegistered));

        // State is unchanged.
        let adapters = gateway.adapters_snapshot().await;
        assert_eq!(adapters.len(), 1);
        assert_eq!(adapters["ad-1"].email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_register_adapter_rejects_bad_token() {
        let (_router, gateway) = test_pair();

        let err = gateway.register_adapter("ad-1", "garbage").await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
        assert!(gateway.adapters_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_email() {
        let (_router, gateway) = test_pair();

        gateway
            .register_adapter("ad-1", &token("alice@example.com"))
            .await
            .unwrap();
        gateway
            .register_adapter("ad-2", &token("bob@example.com"))
            .await
            .unwrap();

        let id = gateway
            .resolve_email_to_id(&token("alice@example.com"), "bob@example.com")
            .await
            .unwrap();
        assert_eq!(id, "ad-2");

        let err = gateway
            .resolve_email_to_id(&token("alice@example.com"), "carol@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AdapterNotFound));
    }

    #[tokio::test]
    async fn test_request_call_dst_is_src() {
        let (_router, gateway) = test_pair();

        gateway
            .register_adapter("ad-1", &token("alice@example.com"))
            .await
            .unwrap();

        let err = gateway
            .request_call("ad-1", &token("alice@example.com"), "ad-1", "c1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DstIsSrc));
    }

    #[tokio::test]
    async fn test_request_call_unknown_dst() {
        let (_router, gateway) = test_pair();

        gateway
            .register_adapter("ad-1", &token("alice@example.com"))
            .await
            .unwrap();

        let err = gateway
            .request_call("ad-1", &token("alice@example.com"), "ghost", "c1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AdapterNotFound));
    }

    #[tokio::test]
    async fn test_apply_probe_results_length_mismatch() {
        let (_router, gateway) = test_pair();

        gateway
            .register_adapter("ad-1", &token("alice@example.com"))
            .await
            .unwrap();

        let ids = vec!["sw-1".to_string(), "sw-2".to_string()];
        let err = gateway
            .apply_probe_results(
                "ad-1",
                &ids,
                vec![Duration::from_millis(1)],
                vec![Throughput::default(); 2],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProbeResultLength));

        let adapters = gateway.adapters_snapshot().await;
        assert!(adapters["ad-1"].latencies.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_removes_adapter() {
        let (_router, gateway) = test_pair();

        gateway
            .register_adapter("ad-1", &token("alice@example.com"))
            .await
            .unwrap();

        gateway.handle_adapter_disconnect("ad-1").await;
        assert!(gateway.adapters_snapshot().await.is_empty());

        // Registering again with the same remote ID works.
        gateway
            .register_adapter("ad-1", &token("alice@example.com"))
            .await
            .unwrap();
    }
}
