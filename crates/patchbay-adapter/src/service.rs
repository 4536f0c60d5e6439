// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control RPC surface of the adapter.

use crate::adapter::Adapter;
use async_trait::async_trait;
use patchbay::bench;
use patchbay::error::Error;
use patchbay::rpc::{RpcContext, RpcService};
use patchbay::wire::{
    self, method, AdapterProvisionRequest, IncomingCallRequest, IncomingCallResponse,
    LatencyRequest, LatencyResponse, ThroughputRequest, ThroughputResponse, UnprovisionRequest,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Dispatches the gateway's calls onto the endpoint engine.
pub struct AdapterRpc {
    adapter: Arc<Adapter>,
}

impl AdapterRpc {
    pub fn new(adapter: Arc<Adapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl RpcService for AdapterRpc {
    async fn call(&self, _ctx: RpcContext, method: &str, params: Value) -> Result<Value, Error> {
        match method {
            method::REQUEST_CALL => {
                let req: IncomingCallRequest = wire::params(params)?;

                let accept = self
                    .adapter
                    .events()
                    .on_request_call(&req.src_id, &req.src_email, &req.route_id, &req.channel_id)
                    .await;

                wire::to_value(&IncomingCallResponse { accept })
            }
            method::TEST_LATENCY => {
                let req: LatencyRequest = wire::params(params)?;

                let latencies = bench::test_latency(
                    self.adapter.ca()?,
                    &req.client_cert,
                    Duration::from_millis(req.timeout_ms),
                    &req.addrs,
                )
                .await?;

                wire::to_value(&LatencyResponse {
                    latencies_ns: latencies.iter().map(|d| d.as_nanos() as u64).collect(),
                })
            }
            method::TEST_THROUGHPUT => {
                let req: ThroughputRequest = wire::params(params)?;

                let results = bench::test_throughput(
                    self.adapter.ca()?,
                    &req.client_cert,
                    Duration::from_millis(req.timeout_ms),
                    &req.addrs,
                    req.length,
                    req.chunks,
                )
                .await?;

                wire::to_value(&ThroughputResponse { results })
            }
            method::PROVISION_ROUTE => {
                let req: AdapterProvisionRequest = wire::params(params)?;
                self.adapter
                    .provision(&req.route_id, &req.upstream, &req.cert)
                    .await?;
                Ok(Value::Null)
            }
            method::UNPROVISION_ROUTE => {
                let req: UnprovisionRequest = wire::params(params)?;
                self.adapter.unprovision(&req.route_id).await?;
                Ok(Value::Null)
            }
            _ => Err(Error::Protocol(format!("unknown method: {}", method))),
        }
    }
}
