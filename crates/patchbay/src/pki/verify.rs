// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TLS configurations enforcing the role and route carried in peer
//! certificates.
//!
//! Servers verify the client chain against the CA first, then check the
//! leaf's CommonName against the expected role and its Country tag against
//! the expected route. A failure at any rule rejects the handshake; the
//! listener keeps accepting.

use crate::error::Error;
use crate::net;
use crate::pki::ca::leaf_identity;
use crate::pki::role::Role;
use crate::wire::CertPair;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// What a listener requires of the peer certificate it accepts.
#[derive(Debug, Clone)]
pub struct ExpectedPeer {
    pub role: Role,
    /// Empty for benchmark listeners, which accept any route tag.
    pub route_id: String,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn root_store(ca_pem: &str) -> Result<RootCertStore, Error> {
    let mut store = RootCertStore::empty();

    for cert in CertificateDer::pem_slice_iter(ca_pem.as_bytes()) {
        let cert = cert.map_err(|e| Error::Certificate(format!("parse CA PEM: {:?}", e)))?;
        store
            .add(cert)
            .map_err(|e| Error::Certificate(format!("add CA certificate: {}", e)))?;
    }

    if store.is_empty() {
        return Err(Error::Certificate("no CA certificates".into()));
    }

    Ok(store)
}

fn cert_chain(pair: &CertPair) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), Error> {
    let certs: Vec<CertificateDer<'static>> =
        CertificateDer::pem_slice_iter(pair.cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::Certificate(format!("parse certificate PEM: {:?}", e)))?;

    if certs.is_empty() {
        return Err(Error::Certificate("no certificates in PEM".into()));
    }

    let key = PrivateKeyDer::from_pem_slice(pair.key_pem.as_bytes())
        .map_err(|e| Error::Certificate(format!("parse key PEM: {:?}", e)))?;

    Ok((certs, key))
}

/// Client-side config: trust the CA, present `pair` for mutual TLS.
pub fn client_tls_config(ca_pem: &str, pair: &CertPair) -> Result<Arc<ClientConfig>, Error> {
    let roots = root_store(ca_pem)?;
    let (certs, key) = cert_chain(pair)?;

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)?;

    Ok(Arc::new(config))
}

/// Server-side config: present `pair`, require a client certificate that
/// chains to the CA and carries the expected role and route.
pub fn server_tls_config(
    ca_pem: &str,
    pair: &CertPair,
    expected: ExpectedPeer,
) -> Result<Arc<ServerConfig>, Error> {
    let roots = root_store(ca_pem)?;

    let chain_verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider())
        .build()
        .map_err(|e| Error::Certificate(format!("build client verifier: {}", e)))?;

    let verifier = Arc::new(PeerCertVerifier {
        inner: chain_verifier,
        expected,
    });

    let (certs, key) = cert_chain(pair)?;

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}

/// Chain verification plus role/route field checks on the leaf.
#[derive(Debug)]
struct PeerCertVerifier {
    inner: Arc<dyn ClientCertVerifier>,
    expected: ExpectedPeer,
}

impl ClientCertVerifier for PeerCertVerifier {
    fn root_hint_subjects(&self) -> &[rustls::DistinguishedName] {
        self.inner.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        self.inner
            .verify_client_cert(end_entity, intermediates, now)?;

        let (role, route_id) = leaf_identity(end_entity.as_ref())
            .map_err(|e| rustls::Error::General(e.to_string()))?;

        if role != Some(self.expected.role) {
            return Err(rustls::Error::General(
                Error::UnauthenticatedRole.to_string(),
            ));
        }

        if !self.expected.route_id.is_empty() && route_id != self.expected.route_id {
            return Err(rustls::Error::General(
                Error::UnauthenticatedRoute.to_string(),
            ));
        }

        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Dial `addr` and complete the TLS handshake within `timeout`.
///
/// The server name for certificate verification is the host part of
/// `addr`, which for relay hops is the advertised host the certificate's
/// SAN was minted for.
pub async fn tls_dial(
    addr: &str,
    config: Arc<ClientConfig>,
    timeout: Duration,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, Error> {
    let (host, _) = net::split_host_port(addr)?;

    let tcp = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout)??;
    let _ = tcp.set_nodelay(true);

    let server_name = ServerName::try_from(host)
        .map_err(|e| Error::Certificate(format!("invalid server name: {}", e)))?;

    let stream = tokio::time::timeout(timeout, TlsConnector::from(config).connect(server_name, tcp))
        .await
        .map_err(|_| Error::Timeout)??;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::ca::Ca;
    use time::OffsetDateTime;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_rustls::TlsAcceptor;

    const ROUTE: &str = "3f8e2c1a-route";

    fn ca() -> Ca {
        Ca::generate(Duration::from_secs(3600)).unwrap()
    }

    /// Accept loop that stays healthy across rejected handshakes and
    /// reports each accepted stream.
    async fn spawn_listener(
        ca: &Ca,
        expected: ExpectedPeer,
        listen_role: Role,
    ) -> (String, mpsc::Receiver<()>) {
        let listen_cert = ca
            .issue(listen_role, ROUTE, "127.0.0.1", Duration::from_secs(60))
            .unwrap();
        let config = server_tls_config(ca.ca_pem(), &listen_cert, expected).unwrap();
        let acceptor = TlsAcceptor::from(config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            loop {
                let Ok((tcp, _)) = listener.accept().await else {
                    break;
                };
                match acceptor.accept(tcp).await {
                    Ok(mut stream) => {
                        let _ = tx.send(()).await;
                        let _ = stream.write_all(b"ok").await;
                        let _ = stream.shutdown().await;
                    }
                    Err(_) => continue,
                }
            }
        });

        (addr, rx)
    }

    async fn dial_ok(ca: &Ca, addr: &str, pair: &CertPair) -> Result<(), Error> {
        let config = client_tls_config(ca.ca_pem(), pair)?;
        let mut stream = tls_dial(addr, config, Duration::from_secs(5)).await?;

        // Read past the handshake so deferred server rejections surface.
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_matching_role_and_route_accepted() {
        let ca = ca();
        let (addr, mut accepted) = spawn_listener(
            &ca,
            ExpectedPeer {
                role: Role::SwitchClient,
                route_id: ROUTE.into(),
            },
            Role::SwitchListener,
        )
        .await;

        let pair = ca
            .issue(Role::SwitchClient, ROUTE, "", Duration::from_secs(60))
            .unwrap();
        dial_ok(&ca, &addr, &pair).await.unwrap();
        assert!(accepted.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_wrong_role_rejected_listener_survives() {
        let ca = ca();
        let (addr, mut accepted) = spawn_listener(
            &ca,
            ExpectedPeer {
                role: Role::SwitchClient,
                route_id: ROUTE.into(),
            },
            Role::SwitchListener,
        )
        .await;

        // Correct route, wrong role.
        let wrong = ca
            .issue(Role::AdapterClient, ROUTE, "", Duration::from_secs(60))
            .unwrap();
        assert!(dial_ok(&ca, &addr, &wrong).await.is_err());

        // The listener accepts a correct connection afterwards.
        let right = ca
            .issue(Role::SwitchClient, ROUTE, "", Duration::from_secs(60))
            .unwrap();
        dial_ok(&ca, &addr, &right).await.unwrap();
        assert!(accepted.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_wrong_route_rejected() {
        let ca = ca();
        let (addr, _accepted) = spawn_listener(
            &ca,
            ExpectedPeer {
                role: Role::AdapterClient,
                route_id: ROUTE.into(),
            },
            Role::AdapterListener,
        )
        .await;

        let wrong = ca
            .issue(
                Role::AdapterClient,
                "other-route",
                "",
                Duration::from_secs(60),
            )
            .unwrap();
        assert!(dial_ok(&ca, &addr, &wrong).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_client_cert_rejected() {
        let ca = ca();
        let (addr, _accepted) = spawn_listener(
            &ca,
            ExpectedPeer {
                role: Role::AdapterClient,
                route_id: ROUTE.into(),
            },
            Role::AdapterListener,
        )
        .await;

        let now = OffsetDateTime::now_utc();
        let expired = ca
            .issue_with_window(
                Role::AdapterClient,
                ROUTE,
                "",
                now - time::Duration::hours(2),
                now - time::Duration::hours(1),
            )
            .unwrap();
        assert!(dial_ok(&ca, &addr, &expired).await.is_err());
    }

    #[tokio::test]
    async fn test_foreign_ca_rejected() {
        let ca = ca();
        let other = Ca::generate(Duration::from_secs(3600)).unwrap();

        let (addr, _accepted) = spawn_listener(
            &ca,
            ExpectedPeer {
                role: Role::AdapterClient,
                route_id: ROUTE.into(),
            },
            Role::AdapterListener,
        )
        .await;

        let foreign = other
            .issue(Role::AdapterClient, ROUTE, "", Duration::from_secs(60))
            .unwrap();

        // Trust the real CA for the server cert, but present a leaf from
        // the wrong authority.
        let config = client_tls_config(ca.ca_pem(), &foreign).unwrap();
        let result = async {
            let mut stream = tls_dial(&addr, config, Duration::from_secs(5)).await?;
            let mut buf = [0u8; 2];
            stream.read_exact(&mut buf).await?;
            Ok::<_, Error>(())
        }
        .await;
        assert!(result.is_err());
    }
}
