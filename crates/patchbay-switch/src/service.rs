// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control RPC surface of the switch.

use crate::relay::Switch;
use async_trait::async_trait;
use patchbay::bench;
use patchbay::error::Error;
use patchbay::rpc::{RpcContext, RpcService};
use patchbay::wire::{
    self, method, LatencyRequest, LatencyResponse, ProvisionRequest, ProvisionResponse,
    PublicIpResponse, ThroughputRequest, ThroughputResponse, UnprovisionRequest,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Dispatches the router's control calls onto the relay engine.
pub struct SwitchRpc {
    switch: Arc<Switch>,
}

impl SwitchRpc {
    pub fn new(switch: Arc<Switch>) -> Self {
        Self { switch }
    }
}

#[async_trait]
impl RpcService for SwitchRpc {
    async fn call(&self, _ctx: RpcContext, method: &str, params: Value) -> Result<Value, Error> {
        match method {
            method::TEST_LATENCY => {
                let req: LatencyRequest = wire::params(params)?;

                let latencies = bench::test_latency(
                    self.switch.ca()?,
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
                    self.switch.ca()?,
                    &req.client_cert,
                    Duration::from_millis(req.timeout_ms),
                    &req.addrs,
                    req.length,
                    req.chunks,
                )
                .await?;

                wire::to_value(&ThroughputResponse { results })
            }
            method::GET_PUBLIC_IP => wire::to_value(&PublicIpResponse {
                ip: self.switch.public_ip()?,
            }),
            method::PROVISION_ROUTE => {
                let req: ProvisionRequest = wire::params(params)?;
                let addrs = self.switch.provision(&req.route_id, req.hop).await?;
                wire::to_value(&ProvisionResponse { addrs })
            }
            method::UNPROVISION_ROUTE => {
                let req: UnprovisionRequest = wire::params(params)?;
                self.switch.unprovision(&req.route_id).await?;
                Ok(Value::Null)
            }
            _ => Err(Error::Protocol(format!("unknown method: {}", method))),
        }
    }
}
