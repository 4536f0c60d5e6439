// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Patchbay adapter: the terminal endpoint of a call.
//!
//! An adapter registers with the gateway, answers call signalling, runs
//! the gateway's per-call probes, and for each provisioned route dials
//! the first relay hop over mutually-authenticated TLS while exposing a
//! plaintext socket to the local application.

pub mod adapter;
pub mod service;

pub use adapter::{Adapter, CallEvents};
pub use service::AdapterRpc;
