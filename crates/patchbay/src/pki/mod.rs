// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Private PKI for the data plane.
//!
//! Every data-plane hop is mutually-authenticated TLS. The router owns a
//! long-lived CA and mints one short-lived certificate per purpose; the
//! leaf's CommonName carries the peer's role and its Country field tags
//! the route it belongs to. Relays enforce both fields on every accepted
//! handshake.

pub mod ca;
pub mod role;
pub mod verify;

pub use ca::Ca;
pub use role::Role;
pub use verify::{client_tls_config, server_tls_config, ExpectedPeer};
