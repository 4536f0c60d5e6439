// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Patchbay core library.
//!
//! Shared building blocks for the Patchbay call routing plane:
//!
//! - **`rpc`**: bidirectional request/response RPC over a length-prefixed
//!   JSON stream, with per-connection peer IDs and connect/disconnect hooks
//! - **`pki`**: the private certificate authority, per-hop certificate
//!   minting, and the role/route-checking TLS configurations
//! - **`relay`**: the connection-pair table and byte splicing used by relay
//!   nodes and terminal endpoints
//! - **`bench`**: latency and throughput probes and their serving side
//! - **`auth`**: the identity-provider contract used to gate registrations
//!   and calls
//! - **`wire`**: the request/response types spoken between services

pub mod auth;
pub mod bench;
pub mod error;
pub mod net;
pub mod pki;
pub mod relay;
pub mod rpc;
pub mod wire;

pub use error::Error;
