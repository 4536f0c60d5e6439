// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The benchmark listener.
//!
//! Every registered switch serves probes on its advertised port: peers
//! presenting a `benchmark-client` certificate get random bytes streamed
//! at them while their own bytes are discarded, until they hang up.
//! Latency probes measure the handshake; throughput probes measure the
//! streaming.

use patchbay::bench::serve_probe;
use patchbay::error::{is_closed_io, Error};
use patchbay::pki::verify::{server_tls_config, ExpectedPeer};
use patchbay::pki::Role;
use patchbay::wire::CertPair;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

/// Serve probes on `listener` until it closes.
pub async fn run(listener: TcpListener, ca_pem: String, cert: CertPair) -> Result<(), Error> {
    let config = server_tls_config(
        &ca_pem,
        &cert,
        ExpectedPeer {
            role: Role::BenchmarkClient,
            route_id: String::new(),
        },
    )?;
    let acceptor = TlsAcceptor::from(config);

    loop {
        let (tcp, peer_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) if is_closed_io(&e) => return Ok(()),
            Err(e) => {
                warn!("benchmark accept error, retrying: {}", e);
                continue;
            }
        };

        let _ = tcp.set_nodelay(true);

        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            match acceptor.accept(tcp).await {
                Ok(stream) => serve_probe(stream).await,
                Err(e) => debug!("rejected probe from {}: {}", peer_addr, e),
            }
        });
    }
}
