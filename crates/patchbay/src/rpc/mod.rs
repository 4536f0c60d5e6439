// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bidirectional RPC over a duplex byte stream.
//!
//! Both ends of a connection can issue requests; responses are correlated
//! by ID. The transport assigns every server-side connection an opaque,
//! stable remote ID and raises connect/disconnect hooks around the
//! connection's lifetime.

pub mod client;
pub mod peer;
pub mod protocol;
pub mod server;

pub use client::RpcClient;
pub use peer::{PeerHandle, RpcContext, RpcService};
pub use protocol::RpcMessage;
pub use server::{ConnectionHooks, NoHooks, PeerMap, RpcServer};

use std::time::Duration;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum frame size accepted on the wire.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
