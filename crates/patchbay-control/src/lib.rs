// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Patchbay control plane.
//!
//! Three services cooperate behind one process:
//!
//! - the **router** owns the switch registry, probes inter-switch latency
//!   and throughput, keeps the weighted topology graph, computes shortest
//!   paths and drives route provisioning and teardown
//! - the **gateway** owns the adapter registry and admits calls
//! - the **metrics** service pushes topology and route snapshots to
//!   registered visualizers
//!
//! The router and gateway hold mutual references, bound once after both
//! are constructed; data ownership stays acyclic.

pub mod config;
pub mod gateway;
pub mod graph;
pub mod metrics;
pub mod router;

pub use config::ControlConfig;
pub use gateway::{AdapterEntry, Gateway, GatewayRpc};
pub use metrics::{Metrics, MetricsRpc};
pub use router::{Router, RouterRpc, SwitchEntry};
