// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The adapter endpoint engine.

use async_trait::async_trait;
use patchbay::error::{is_closed_io, Error};
use patchbay::pki::verify::{client_tls_config, tls_dial};
use patchbay::relay::{spawn_splice, ConnPair, RouteTable};
use patchbay::rpc::PeerHandle;
use patchbay::wire::{
    method, CertPair, HangupRequest, RegisterAdapterRequest, RegisterAdapterResponse,
    RequestCallResult, ResolveEmailRequest, ResolveEmailResponse,
};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, warn};

/// Dial timeout for reaching the first relay hop.
const HOP_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// What the surrounding application gets told about calls.
///
/// The engine stays ignorant of presentation; a CLI or UI layer
/// implements these.
#[async_trait]
pub trait CallEvents: Send + Sync + 'static {
    /// An incoming call: return whether the user accepts it.
    async fn on_request_call(
        &self,
        src_id: &str,
        src_email: &str,
        route_id: &str,
        channel_id: &str,
    ) -> bool;

    /// A route was provisioned; the application can now connect to
    /// `local_addr`.
    async fn on_call_connected(&self, route_id: &str, local_addr: SocketAddr);

    /// The call ended; the local socket is gone.
    async fn on_call_disconnected(&self, route_id: &str);
}

/// One terminal endpoint.
pub struct Adapter {
    advertise_host: String,
    ca_pem: OnceLock<String>,
    routes: RouteTable,
    events: Arc<dyn CallEvents>,
}

impl Adapter {
    pub fn new(advertise_host: impl Into<String>, events: Arc<dyn CallEvents>) -> Arc<Self> {
        Arc::new(Self {
            advertise_host: advertise_host.into(),
            ca_pem: OnceLock::new(),
            routes: RouteTable::new(),
            events,
        })
    }

    pub fn set_ca(&self, ca_pem: String) {
        let _ = self.ca_pem.set(ca_pem);
    }

    pub fn ca(&self) -> Result<&str, Error> {
        self.ca_pem
            .get()
            .map(String::as_str)
            .ok_or_else(|| Error::Protocol("adapter is not registered".into()))
    }

    pub fn events(&self) -> &Arc<dyn CallEvents> {
        &self.events
    }

    pub async fn active_routes(&self) -> usize {
        self.routes.len().await
    }

    /// Register with the gateway and install the returned trust root.
    pub async fn register(&self, gateway: &PeerHandle, token: &str) -> Result<(), Error> {
        let resp: RegisterAdapterResponse = gateway
            .call_as(
                method::REGISTER_ADAPTER,
                &RegisterAdapterRequest {
                    token: token.to_string(),
                },
            )
            .await?;

        self.set_ca(resp.ca_pem);
        Ok(())
    }

    /// Look up a live adapter by its subject email.
    pub async fn resolve_email(
        &self,
        gateway: &PeerHandle,
        token: &str,
        email: &str,
    ) -> Result<String, Error> {
        let resp: ResolveEmailResponse = gateway
            .call_as(
                method::RESOLVE_EMAIL_TO_ID,
                &ResolveEmailRequest {
                    token: token.to_string(),
                    email: email.to_string(),
                },
            )
            .await?;

        Ok(resp.id)
    }

    /// Ask the gateway for a call to `dst_id`.
    pub async fn request_call(
        &self,
        gateway: &PeerHandle,
        token: &str,
        dst_id: &str,
        channel_id: &str,
    ) -> Result<RequestCallResult, Error> {
        gateway
            .call_as(
                method::REQUEST_CALL,
                &patchbay::wire::CallRequest {
                    token: token.to_string(),
                    dst_id: dst_id.to_string(),
                    channel_id: channel_id.to_string(),
                },
            )
            .await
    }

    /// End a call.
    pub async fn hangup(
        &self,
        gateway: &PeerHandle,
        token: &str,
        route_id: &str,
    ) -> Result<(), Error> {
        gateway
            .call_as(
                method::HANGUP_CALL,
                &HangupRequest {
                    token: token.to_string(),
                    route_id: route_id.to_string(),
                },
            )
            .await
    }

    /// Terminate a route at this endpoint: dial the first relay hop with
    /// the minted `adapter-client` certificate and splice it with a
    /// plaintext socket for the local application.
    pub async fn provision(
        &self,
        route_id: &str,
        upstream: &str,
        cert: &CertPair,
    ) -> Result<(), Error> {
        debug!(route_id = %route_id, "provisioning route to {}", upstream);

        let config = client_tls_config(self.ca()?, cert)?;
        let tunnel = tls_dial(upstream, config, HOP_DIAL_TIMEOUT).await?;

        let listener = TcpListener::bind((self.advertise_host.as_str(), 0)).await?;
        let local_addr = listener.local_addr()?;

        let pair = ConnPair::new();
        let pair_for_task = pair.clone();
        let route = route_id.to_string();

        let supervisor = tokio::spawn(async move {
            let (local, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    if is_closed_io(&e) {
                        debug!(route_id = %route, "local listener closed before accept");
                    } else {
                        warn!(route_id = %route, "could not accept local connection: {}", e);
                    }
                    return;
                }
            };
            let _ = local.set_nodelay(true);

            debug!(route_id = %route, "local application connected, copying");

            let (forward, backward) = spawn_splice(tunnel, local);
            pair_for_task.attach(forward).await;
            pair_for_task.attach(backward).await;

            // The port stays bound for the route's lifetime; teardown
            // drops it.
            let _hold = listener;
            std::future::pending::<()>().await;
        });

        pair.attach(supervisor).await;
        self.routes.insert(route_id, pair).await;

        self.events.on_call_connected(route_id, local_addr).await;

        Ok(())
    }

    /// Tear down a route at this endpoint and tell the application.
    pub async fn unprovision(&self, route_id: &str) -> Result<(), Error> {
        debug!(route_id = %route_id, "unprovisioning route");

        self.routes.remove(route_id).await?;
        self.events.on_call_disconnected(route_id).await;

        Ok(())
    }

    pub async fn close_all(&self) {
        self.routes.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay::pki::verify::{server_tls_config, ExpectedPeer};
    use patchbay::pki::{Ca, Role};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;
    use tokio_rustls::TlsAcceptor;
    use uuid::Uuid;

    struct TestEvents {
        connected: mpsc::Sender<(String, SocketAddr)>,
        disconnected: mpsc::Sender<String>,
    }

    #[async_trait]
    impl CallEvents for TestEvents {
        async fn on_request_call(&self, _: &str, _: &str, _: &str, _: &str) -> bool {
            true
        }

        async fn on_call_connected(&self, route_id: &str, local_addr: SocketAddr) {
            let _ = self.connected.send((route_id.to_string(), local_addr)).await;
        }

        async fn on_call_disconnected(&self, route_id: &str) {
            let _ = self.disconnected.send(route_id.to_string()).await;
        }
    }

    /// A stand-in for the adapter-facing listener of the nearest switch.
    async fn spawn_hop(
        ca: &Ca,
        route_id: &str,
    ) -> (
        String,
        mpsc::Receiver<tokio_rustls::server::TlsStream<tokio::net::TcpStream>>,
    ) {
        let listen_cert = ca
            .issue(
                Role::AdapterListener,
                route_id,
                "127.0.0.1",
                Duration::from_secs(300),
            )
            .unwrap();
        let config = server_tls_config(
            ca.ca_pem(),
            &listen_cert,
            ExpectedPeer {
                role: Role::AdapterClient,
                route_id: route_id.to_string(),
            },
        )
        .unwrap();
        let acceptor = TlsAcceptor::from(config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            if let Ok((tcp, _)) = listener.accept().await {
                if let Ok(stream) = acceptor.accept(tcp).await {
                    let _ = tx.send(stream).await;
                }
            }
        });

        (addr, rx)
    }

    fn test_adapter() -> (
        Arc<Adapter>,
        mpsc::Receiver<(String, SocketAddr)>,
        mpsc::Receiver<String>,
    ) {
        let (connected_tx, connected_rx) = mpsc::channel(4);
        let (disconnected_tx, disconnected_rx) = mpsc::channel(4);

        let adapter = Adapter::new(
            "127.0.0.1",
            Arc::new(TestEvents {
                connected: connected_tx,
                disconnected: disconnected_tx,
            }),
        );

        (adapter, connected_rx, disconnected_rx)
    }

    #[tokio::test]
    async fn test_provision_exposes_local_socket() {
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let route_id = Uuid::new_v4().to_string();
        let (hop_addr, mut hop_rx) = spawn_hop(&ca, &route_id).await;

        let (adapter, mut connected, _disconnected) = test_adapter();
        adapter.set_ca(ca.ca_pem().to_string());

        let cert = ca
            .issue(Role::AdapterClient, &route_id, "", Duration::from_secs(300))
            .unwrap();
        adapter.provision(&route_id, &hop_addr, &cert).await.unwrap();

        let (reported_route, local_addr) = connected.recv().await.unwrap();
        assert_eq!(reported_route, route_id);
        assert_eq!(adapter.active_routes().await, 1);

        let mut tunnel = hop_rx.recv().await.unwrap();
        let mut local = tokio::net::TcpStream::connect(local_addr).await.unwrap();

        // Local plaintext bytes come out of the TLS tunnel and back.
        local.write_all(b"outbound").await.unwrap();
        let mut buf = [0u8; 8];
        tunnel.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"outbound");

        tunnel.write_all(b"inbound!").await.unwrap();
        local.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"inbound!");
    }

    #[tokio::test]
    async fn test_unprovision_fires_disconnected_and_closes() {
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let route_id = Uuid::new_v4().to_string();
        let (hop_addr, _hop_rx) = spawn_hop(&ca, &route_id).await;

        let (adapter, mut connected, mut disconnected) = test_adapter();
        adapter.set_ca(ca.ca_pem().to_string());

        let cert = ca
            .issue(Role::AdapterClient, &route_id, "", Duration::from_secs(300))
            .unwrap();
        adapter.provision(&route_id, &hop_addr, &cert).await.unwrap();
        let (_, local_addr) = connected.recv().await.unwrap();

        adapter.unprovision(&route_id).await.unwrap();
        assert_eq!(disconnected.recv().await.unwrap(), route_id);
        assert_eq!(adapter.active_routes().await, 0);

        let err = adapter.unprovision(&route_id).await.unwrap_err();
        assert!(matches!(err, Error::RouteNotFound));

        // The local socket is gone once the aborted tasks have dropped it.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(tokio::net::TcpStream::connect(local_addr).await.is_err());
    }

    #[tokio::test]
    async fn test_provision_unreachable_hop_fails() {
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let route_id = Uuid::new_v4().to_string();

        let dead = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().to_string()
        };

        let (adapter, _connected, _disconnected) = test_adapter();
        adapter.set_ca(ca.ca_pem().to_string());

        let cert = ca
            .issue(Role::AdapterClient, &route_id, "", Duration::from_secs(300))
            .unwrap();
        let result = adapter.provision(&route_id, &dead, &cert).await;
        assert!(result.is_err());
        assert_eq!(adapter.active_routes().await, 0);
    }
}
