// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared across the control plane and the relay engine.

use thiserror::Error;

/// Errors surfaced by Patchbay services.
///
/// RPC handlers return these to callers verbatim; [`Error::from_remote`]
/// restores the kind on the receiving side.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not authenticate peer")]
    Unauthenticated,

    #[error("could not authenticate peer certificate role")]
    UnauthenticatedRole,

    #[error("could not authenticate peer certificate route")]
    UnauthenticatedRoute,

    #[error("a switch with this remote ID is already registered")]
    SwitchAlreadyRegistered,

    #[error("an adapter with this remote ID is already registered")]
    AdapterAlreadyRegistered,

    #[error("could not find adapter")]
    AdapterNotFound,

    #[error("could not find switch")]
    SwitchNotFound,

    #[error("could not find peer")]
    PeerNotFound,

    #[error("could not find route when dst and src are the same")]
    DstIsSrc,

    #[error("could not find route")]
    RouteNotFound,

    #[error("could not proceed with invalid ports count")]
    InvalidPortsCount,

    #[error("received invalid length of probe results")]
    InvalidProbeResultLength,

    #[error("call timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("remote error: {0}")]
    Remote(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("address error: {0}")]
    Addr(#[from] std::net::AddrParseError),
}

impl Error {
    /// Reclassify an error message received over RPC back into its kind.
    ///
    /// Messages that match a known kind's display form map back to that
    /// kind; anything else is carried as [`Error::Remote`].
    pub fn from_remote(message: &str) -> Self {
        match message {
            m if m == Error::Unauthenticated.to_string() => Error::Unauthenticated,
            m if m == Error::UnauthenticatedRole.to_string() => Error::UnauthenticatedRole,
            m if m == Error::UnauthenticatedRoute.to_string() => Error::UnauthenticatedRoute,
            m if m == Error::SwitchAlreadyRegistered.to_string() => Error::SwitchAlreadyRegistered,
            m if m == Error::AdapterAlreadyRegistered.to_string() => {
                Error::AdapterAlreadyRegistered
            }
            m if m == Error::AdapterNotFound.to_string() => Error::AdapterNotFound,
            m if m == Error::SwitchNotFound.to_string() => Error::SwitchNotFound,
            m if m == Error::PeerNotFound.to_string() => Error::PeerNotFound,
            m if m == Error::DstIsSrc.to_string() => Error::DstIsSrc,
            m if m == Error::RouteNotFound.to_string() => Error::RouteNotFound,
            m if m == Error::InvalidPortsCount.to_string() => Error::InvalidPortsCount,
            m if m == Error::InvalidProbeResultLength.to_string() => {
                Error::InvalidProbeResultLength
            }
            m if m == Error::Timeout.to_string() => Error::Timeout,
            m if m == Error::Closed.to_string() => Error::Closed,
            _ => Error::Remote(message.to_string()),
        }
    }

    /// Whether this error is an expected-shutdown class error.
    pub fn is_closed(&self) -> bool {
        match self {
            Error::Closed => true,
            Error::Io(e) => is_closed_io(e),
            _ => false,
        }
    }
}

/// Whether an I/O error means the other end went away in an orderly or
/// half-orderly fashion. These are logged at debug severity, not treated
/// as faults.
pub fn is_closed_io(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::TimedOut
    ) || err.to_string().ends_with("unexpected EOF")
}
