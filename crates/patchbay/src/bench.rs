// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Latency and throughput probes over mutually-authenticated TLS.
//!
//! Probes dial benchmark listeners with a short-lived `benchmark-client`
//! certificate. Results are positionally aligned with the requested
//! addresses; any failed dial fails the whole probe, partial results are
//! never returned.

use crate::error::Error;
use crate::pki::verify::{client_tls_config, tls_dial};
use crate::wire::{CertPair, Throughput};
use rand::RngCore;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Measure the time to a completed TLS handshake against each address.
///
/// Dials run concurrently; the result vector is aligned with `addrs`.
pub async fn test_latency(
    ca_pem: &str,
    client_cert: &CertPair,
    timeout: Duration,
    addrs: &[String],
) -> Result<Vec<Duration>, Error> {
    if addrs.is_empty() {
        return Ok(Vec::new());
    }

    let config = client_tls_config(ca_pem, client_cert)?;

    let dials = addrs.iter().map(|addr| {
        let config = config.clone();
        let addr = addr.clone();

        async move {
            let before = Instant::now();
            let stream = tls_dial(&addr, config, timeout).await?;
            let latency = before.elapsed();
            drop(stream);

            Ok::<Duration, Error>(latency)
        }
    });

    futures::future::try_join_all(dials).await
}

/// Measure write and read throughput against each address.
///
/// For each address: dial, stream `chunks × length` random bytes while
/// timing the writes, then read the same amount back while timing the
/// reads. Addresses are probed sequentially so measurements do not skew
/// each other.
pub async fn test_throughput(
    ca_pem: &str,
    client_cert: &CertPair,
    timeout: Duration,
    addrs: &[String],
    length: u64,
    chunks: u64,
) -> Result<Vec<Throughput>, Error> {
    if addrs.is_empty() {
        return Ok(Vec::new());
    }

    let config = client_tls_config(ca_pem, client_cert)?;

    let mut payload = vec![0u8; length as usize];
    rand::thread_rng().fill_bytes(&mut payload);

    let mut results = Vec::with_capacity(addrs.len());

    for addr in addrs {
        let mut stream = tls_dial(addr, config.clone(), timeout).await?;

        let write = {
            let before = Instant::now();
            for _ in 0..chunks {
                stream.write_all(&payload).await?;
            }
            stream.flush().await?;
            before.elapsed()
        };

        let read = {
            let mut buf = vec![0u8; length as usize];
            let before = Instant::now();
            for _ in 0..chunks {
                stream.read_exact(&mut buf).await?;
            }
            before.elapsed()
        };

        results.push(Throughput { read, write });
    }

    Ok(results)
}

/// Serve one probe connection: stream random bytes to the peer while
/// discarding whatever it sends, until either direction ends.
pub async fn serve_probe<S>(stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    const CHUNK: usize = 64 * 1024;

    let (mut reader, mut writer) = tokio::io::split(stream);

    let mut payload = vec![0u8; CHUNK];
    rand::thread_rng().fill_bytes(&mut payload);

    let write = async move {
        loop {
            if writer.write_all(&payload).await.is_err() {
                break;
            }
        }
    };

    let read = async move {
        let mut buf = vec![0u8; CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };

    tokio::select! {
        _ = write => {}
        _ = read => {}
    }
}
