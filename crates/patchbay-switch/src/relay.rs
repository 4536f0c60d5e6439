// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hop provisioning and teardown.
//!
//! A hop's shape is explicit in the [`Hop`] variant it is provisioned
//! with: the chain end nearest the egress adapter listens twice, interior
//! links dial downstream and listen for the next switch, the chain end
//! nearest the ingress adapter dials downstream and listens for the
//! terminal adapter. Once both sides are established, one copy task per
//! direction splices bytes until teardown.

use patchbay::error::{is_closed_io, Error};
use patchbay::net;
use patchbay::pki::verify::{client_tls_config, server_tls_config, tls_dial, ExpectedPeer};
use patchbay::pki::Role;
use patchbay::relay::{spawn_splice, ConnPair, RouteTable};
use patchbay::wire::{CertPair, Hop};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{server, TlsAcceptor};
use tracing::{debug, warn};

/// Dial timeout for reaching the downstream hop during provisioning.
const UPSTREAM_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// One relay node.
pub struct Switch {
    advertise_addr: String,
    ca_pem: OnceLock<String>,
    routes: RouteTable,
}

impl Switch {
    pub fn new(advertise_addr: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            advertise_addr: advertise_addr.into(),
            ca_pem: OnceLock::new(),
            routes: RouteTable::new(),
        })
    }

    /// Install the trust root received at registration. Read-only
    /// afterwards.
    pub fn set_ca(&self, ca_pem: String) {
        let _ = self.ca_pem.set(ca_pem);
    }

    pub fn ca(&self) -> Result<&str, Error> {
        self.ca_pem
            .get()
            .map(String::as_str)
            .ok_or_else(|| Error::Protocol("switch is not registered".into()))
    }

    /// The host the router embeds into listen certificates for this
    /// switch.
    pub fn public_ip(&self) -> Result<String, Error> {
        net::host_of(&self.advertise_addr)
    }

    /// The advertised control address.
    pub fn advertise_addr(&self) -> &str {
        &self.advertise_addr
    }

    /// Number of currently provisioned hops.
    pub async fn active_routes(&self) -> usize {
        self.routes.len().await
    }

    /// Tear down one hop. The second teardown for the same route reports
    /// `route-not-found`.
    pub async fn unprovision(&self, route_id: &str) -> Result<(), Error> {
        debug!(route_id = %route_id, "unprovisioning route");
        self.routes.remove(route_id).await
    }

    /// Tear down everything.
    pub async fn close_all(&self) {
        self.routes.close_all().await;
    }

    /// Provision one hop of a route.
    ///
    /// Listeners are bound before this returns; accepting the peer
    /// connections and starting the copies happens asynchronously. The
    /// returned addresses are ordered adapter-facing first.
    pub async fn provision(&self, route_id: &str, hop: Hop) -> Result<Vec<String>, Error> {
        debug!(route_id = %route_id, "provisioning route");

        let pair = ConnPair::new();

        let addrs = match hop {
            Hop::Only { adapter_listen } => {
                let (near, near_addr) = self
                    .listen(&adapter_listen, Role::AdapterClient, route_id)
                    .await?;
                let (far, far_addr) = self
                    .listen(&adapter_listen, Role::AdapterClient, route_id)
                    .await?;

                self.supervise(&pair, route_id, accept_one(near), accept_one(far))
                    .await;

                vec![near_addr, far_addr]
            }
            Hop::First {
                adapter_listen,
                switch_listen,
            } => {
                let (adapter_side, adapter_addr) = self
                    .listen(&adapter_listen, Role::AdapterClient, route_id)
                    .await?;
                let (switch_side, switch_addr) = self
                    .listen(&switch_listen, Role::SwitchClient, route_id)
                    .await?;

                self.supervise(
                    &pair,
                    route_id,
                    accept_one(adapter_side),
                    accept_one(switch_side),
                )
                .await;

                vec![adapter_addr, switch_addr]
            }
            Hop::Middle {
                switch_listen,
                switch_client,
                upstream,
            } => {
                let downstream = self.dial(&switch_client, &upstream).await?;
                let (switch_side, switch_addr) = self
                    .listen(&switch_listen, Role::SwitchClient, route_id)
                    .await?;

                self.supervise(
                    &pair,
                    route_id,
                    std::future::ready(Ok(downstream)),
                    accept_one(switch_side),
                )
                .await;

                vec![switch_addr]
            }
            Hop::Last {
                adapter_listen,
                switch_client,
                upstream,
            } => {
                let downstream = self.dial(&switch_client, &upstream).await?;
                let (adapter_side, adapter_addr) = self
                    .listen(&adapter_listen, Role::AdapterClient, route_id)
                    .await?;

                self.supervise(
                    &pair,
                    route_id,
                    std::future::ready(Ok(downstream)),
                    accept_one(adapter_side),
                )
                .await;

                vec![adapter_addr]
            }
        };

        self.routes.insert(route_id, pair).await;

        Ok(addrs)
    }

    async fn listen(
        &self,
        cert: &CertPair,
        expected_role: Role,
        route_id: &str,
    ) -> Result<(Listening, String), Error> {
        let host = self.public_ip()?;
        let listener = TcpListener::bind((host.as_str(), 0)).await?;
        let addr = listener.local_addr()?.to_string();

        let config = server_tls_config(
            self.ca()?,
            cert,
            ExpectedPeer {
                role: expected_role,
                route_id: route_id.to_string(),
            },
        )?;

        Ok((
            Listening {
                listener,
                acceptor: TlsAcceptor::from(config),
            },
            addr,
        ))
    }

    async fn dial(
        &self,
        cert: &CertPair,
        upstream: &str,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>, Error> {
        let config = client_tls_config(self.ca()?, cert)?;
        tls_dial(upstream, config, UPSTREAM_DIAL_TIMEOUT).await
    }

    /// Wait for both sides, then splice. The supervisor and the copy
    /// tasks all belong to the pair so teardown reaches them wherever the
    /// hop is in its lifecycle.
    async fn supervise<FA, FB, A, B>(&self, pair: &Arc<ConnPair>, route_id: &str, a: FA, b: FB)
    where
        FA: std::future::Future<Output = Result<A, Error>> + Send + 'static,
        FB: std::future::Future<Output = Result<B, Error>> + Send + 'static,
        A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let pair_for_task = pair.clone();
        let route_id = route_id.to_string();

        let supervisor = tokio::spawn(async move {
            let (a, b) = match tokio::try_join!(a, b) {
                Ok(sides) => sides,
                Err(e) if e.is_closed() => {
                    debug!(route_id = %route_id, "route closed before both sides connected");
                    return;
                }
                Err(e) => {
                    warn!(route_id = %route_id, "could not establish both sides: {}", e);
                    return;
                }
            };

            debug!(route_id = %route_id, "both sides established, copying");

            let (forward, backward) = spawn_splice(a, b);
            pair_for_task.attach(forward).await;
            pair_for_task.attach(backward).await;
        });

        pair.attach(supervisor).await;
    }
}

struct Listening {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

/// Accept connections until one passes the certificate checks.
///
/// Rejected handshakes and transient accept errors keep the listener
/// healthy; a closed listener is terminal.
async fn accept_one(listening: Listening) -> Result<server::TlsStream<TcpStream>, Error> {
    loop {
        let (tcp, peer_addr) = match listening.listener.accept().await {
            Ok(conn) => conn,
            Err(e) if is_closed_io(&e) => return Err(Error::Closed),
            Err(e) => {
                warn!("accept error, retrying: {}", e);
                continue;
            }
        };

        let _ = tcp.set_nodelay(true);

        match listening.acceptor.accept(tcp).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("rejected connection from {}: {}", peer_addr, e);
                continue;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay::pki::Ca;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use uuid::Uuid;

    fn test_switch(ca: &Ca) -> Arc<Switch> {
        let switch = Switch::new("127.0.0.1:0");
        switch.set_ca(ca.ca_pem().to_string());
        switch
    }

    fn call_cert(ca: &Ca, role: Role, route_id: &str) -> CertPair {
        ca.issue(role, route_id, "127.0.0.1", Duration::from_secs(300))
            .unwrap()
    }

    async fn adapter_dial(
        ca: &Ca,
        route_id: &str,
        addr: &str,
    ) -> tokio_rustls::client::TlsStream<TcpStream> {
        let cert = ca
            .issue(Role::AdapterClient, route_id, "", Duration::from_secs(300))
            .unwrap();
        let config = client_tls_config(ca.ca_pem(), &cert).unwrap();
        tls_dial(addr, config, Duration::from_secs(5)).await.unwrap()
    }

    #[tokio::test]
    async fn test_only_hop_splices_adapters() {
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let switch = test_switch(&ca);
        let route_id = Uuid::new_v4().to_string();

        let addrs = switch
            .provision(
                &route_id,
                Hop::Only {
                    adapter_listen: call_cert(&ca, Role::AdapterListener, &route_id),
                },
            )
            .await
            .unwrap();
        assert_eq!(addrs.len(), 2);
        assert_eq!(switch.active_routes().await, 1);

        let mut near = adapter_dial(&ca, &route_id, &addrs[0]).await;
        let mut far = adapter_dial(&ca, &route_id, &addrs[1]).await;

        near.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        far.write_all(b"world").await.unwrap();
        near.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");
    }

    #[tokio::test]
    async fn test_chained_hops_relay_end_to_end() {
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let first = test_switch(&ca);
        let middle = test_switch(&ca);
        let last = test_switch(&ca);
        let route_id = Uuid::new_v4().to_string();

        // Provisioned in reverse order: each hop needs the downstream
        // listener's address.
        let first_addrs = first
            .provision(
                &route_id,
                Hop::First {
                    adapter_listen: call_cert(&ca, Role::AdapterListener, &route_id),
                    switch_listen: call_cert(&ca, Role::SwitchListener, &route_id),
                },
            )
            .await
            .unwrap();
        assert_eq!(first_addrs.len(), 2);

        let middle_addrs = middle
            .provision(
                &route_id,
                Hop::Middle {
                    switch_listen: call_cert(&ca, Role::SwitchListener, &route_id),
                    switch_client: call_cert(&ca, Role::SwitchClient, &route_id),
                    upstream: first_addrs[1].clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(middle_addrs.len(), 1);

        let last_addrs = last
            .provision(
                &route_id,
                Hop::Last {
                    adapter_listen: call_cert(&ca, Role::AdapterListener, &route_id),
                    switch_client: call_cert(&ca, Role::SwitchClient, &route_id),
                    upstream: middle_addrs[0].clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(last_addrs.len(), 1);

        let mut egress = adapter_dial(&ca, &route_id, &first_addrs[0]).await;
        let mut ingress = adapter_dial(&ca, &route_id, &last_addrs[0]).await;

        egress.write_all(b"through the chain").await.unwrap();
        let mut buf = [0u8; 17];
        ingress.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"through the chain");

        ingress.write_all(b"and back again!!!").await.unwrap();
        egress.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"and back again!!!");
    }

    #[tokio::test]
    async fn test_wrong_role_rejected_then_correct_accepted() {
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let first = test_switch(&ca);
        let route_id = Uuid::new_v4().to_string();

        let addrs = first
            .provision(
                &route_id,
                Hop::First {
                    adapter_listen: call_cert(&ca, Role::AdapterListener, &route_id),
                    switch_listen: call_cert(&ca, Role::SwitchListener, &route_id),
                },
            )
            .await
            .unwrap();

        // The switch-facing listener refuses an adapter-client cert even
        // with the right route tag.
        let wrong = ca
            .issue(Role::AdapterClient, &route_id, "", Duration::from_secs(300))
            .unwrap();
        let config = client_tls_config(ca.ca_pem(), &wrong).unwrap();
        let rejected = async {
            let mut stream = tls_dial(&addrs[1], config, Duration::from_secs(5)).await?;
            let mut buf = [0u8; 1];
            stream.read_exact(&mut buf).await?;
            Ok::<_, Error>(())
        }
        .await;
        assert!(rejected.is_err());

        // The listener is still healthy and accepts the correct role.
        let right = ca
            .issue(Role::SwitchClient, &route_id, "", Duration::from_secs(300))
            .unwrap();
        let config = client_tls_config(ca.ca_pem(), &right).unwrap();
        let mut switch_side = tls_dial(&addrs[1], config, Duration::from_secs(5))
            .await
            .unwrap();

        // Completing the pair proves the accept loop survived: bytes flow
        // once the adapter side connects too.
        let mut adapter_side = adapter_dial(&ca, &route_id, &addrs[0]).await;
        adapter_side.write_all(b"ok").await.unwrap();
        let mut buf = [0u8; 2];
        switch_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ok");
    }

    #[tokio::test]
    async fn test_unprovision_closes_and_is_not_idempotent() {
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let switch = test_switch(&ca);
        let route_id = Uuid::new_v4().to_string();

        let addrs = switch
            .provision(
                &route_id,
                Hop::Only {
                    adapter_listen: call_cert(&ca, Role::AdapterListener, &route_id),
                },
            )
            .await
            .unwrap();

        let mut near = adapter_dial(&ca, &route_id, &addrs[0]).await;
        let _far = adapter_dial(&ca, &route_id, &addrs[1]).await;

        switch.unprovision(&route_id).await.unwrap();
        assert_eq!(switch.active_routes().await, 0);

        let err = switch.unprovision(&route_id).await.unwrap_err();
        assert!(matches!(err, Error::RouteNotFound));

        // The spliced stream is torn down.
        let mut buf = [0u8; 1];
        let read = near.read(&mut buf).await;
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[tokio::test]
    async fn test_provision_without_registration_fails() {
        let switch = Switch::new("127.0.0.1:0");
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let route_id = Uuid::new_v4().to_string();

        let err = switch
            .provision(
                &route_id,
                Hop::Only {
                    adapter_listen: call_cert(&ca, Role::AdapterListener, &route_id),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
