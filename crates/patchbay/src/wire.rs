// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request and response types spoken between the control-plane services.
//!
//! Everything here crosses the RPC boundary as JSON; durations travel as
//! integer nanoseconds or milliseconds so the wire format stays
//! language-neutral.

use crate::error::Error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// RPC method names.
pub mod method {
    // Router-hosted
    pub const REGISTER_SWITCH: &str = "RegisterSwitch";

    // Gateway-hosted
    pub const REGISTER_ADAPTER: &str = "RegisterAdapter";
    pub const RESOLVE_EMAIL_TO_ID: &str = "ResolveEmailToID";
    pub const REQUEST_CALL: &str = "RequestCall";
    pub const HANGUP_CALL: &str = "HangupCall";

    // Switch- and adapter-hosted
    pub const TEST_LATENCY: &str = "TestLatency";
    pub const TEST_THROUGHPUT: &str = "TestThroughput";
    pub const GET_PUBLIC_IP: &str = "GetPublicIP";
    pub const PROVISION_ROUTE: &str = "ProvisionRoute";
    pub const UNPROVISION_ROUTE: &str = "UnprovisionRoute";

    // Metrics-hosted
    pub const REGISTER_VISUALIZER: &str = "RegisterVisualizer";

    // Visualizer-hosted (pushed by Metrics)
    pub const RENDER_TOPOLOGY: &str = "RenderTopology";
    pub const RENDER_ROUTES: &str = "RenderRoutes";
}

/// A PEM-encoded certificate and private key, minted per purpose and
/// never reused across routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertPair {
    pub cert_pem: String,
    pub key_pem: String,
}

/// One throughput measurement: how long the probe spent writing and
/// reading the benchmark payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Throughput {
    #[serde(with = "nanos")]
    pub read: Duration,
    #[serde(with = "nanos")]
    pub write: Duration,
}

/// Duration as integer nanoseconds on the wire.
pub mod nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_nanos().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ns = u64::deserialize(d)?;
        Ok(Duration::from_nanos(ns))
    }
}

/// The position of a switch within a route chain, with exactly the
/// certificates that position needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "position", rename_all = "snake_case")]
pub enum Hop {
    /// The only interior switch of a route: both listeners face terminal
    /// adapters and share one listen certificate.
    Only { adapter_listen: CertPair },

    /// The chain end nearest the egress adapter: one adapter-facing and
    /// one switch-facing listener, nothing to dial.
    First {
        adapter_listen: CertPair,
        switch_listen: CertPair,
    },

    /// An interior link: dial the downstream listener, accept the next
    /// switch.
    Middle {
        switch_listen: CertPair,
        switch_client: CertPair,
        upstream: String,
    },

    /// The chain end nearest the ingress adapter: dial downstream, accept
    /// the terminal adapter.
    Last {
        adapter_listen: CertPair,
        switch_client: CertPair,
        upstream: String,
    },
}

impl Hop {
    /// How many listen addresses this hop reports back.
    pub fn expected_ports(&self) -> usize {
        match self {
            Hop::Only { .. } | Hop::First { .. } => 2,
            Hop::Middle { .. } | Hop::Last { .. } => 1,
        }
    }
}

// -- Router-hosted methods --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSwitchRequest {
    pub token: String,
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub ca_pem: String,
    pub benchmark_listen_cert: CertPair,
}

// -- Gateway-hosted methods --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAdapterRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAdapterResponse {
    pub ca_pem: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveEmailRequest {
    pub token: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveEmailResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub token: String,
    pub dst_id: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestCallResult {
    pub accept: bool,
    #[serde(default)]
    pub route_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HangupRequest {
    pub token: String,
    pub route_id: String,
}

// -- Switch- and adapter-hosted methods --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyRequest {
    pub timeout_ms: u64,
    pub addrs: Vec<String>,
    pub client_cert: CertPair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyResponse {
    /// Positionally aligned with the requested addresses.
    pub latencies_ns: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputRequest {
    pub timeout_ms: u64,
    pub addrs: Vec<String>,
    pub length: u64,
    pub chunks: u64,
    pub client_cert: CertPair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputResponse {
    /// Positionally aligned with the requested addresses.
    pub results: Vec<Throughput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicIpResponse {
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub route_id: String,
    pub hop: Hop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub addrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterProvisionRequest {
    pub route_id: String,
    pub upstream: String,
    pub cert: CertPair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnprovisionRequest {
    pub route_id: String,
}

// -- Adapter-hosted call signalling --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingCallRequest {
    pub src_id: String,
    pub src_email: String,
    pub route_id: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingCallResponse {
    pub accept: bool,
}

// -- Metrics notification contract --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterVisualizerRequest {
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchInfo {
    pub addr: String,
    pub latencies_ns: HashMap<String, u64>,
    pub throughputs: HashMap<String, Throughput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub email: String,
    pub latencies_ns: HashMap<String, u64>,
    pub throughputs: HashMap<String, Throughput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderTopologyRequest {
    pub switches: HashMap<String, SwitchInfo>,
    pub adapters: HashMap<String, AdapterInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderRoutesRequest {
    pub routes: HashMap<String, Vec<String>>,
}

/// Decode handler parameters.
pub fn params<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|e| Error::Protocol(format!("invalid params: {}", e)))
}

/// Encode a handler result.
pub fn to_value<T: Serialize>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|e| Error::Protocol(format!("invalid result: {}", e)))
}
