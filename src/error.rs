//! Error taxonomy for the fallible, synchronous, caller-facing surface.
//!
//! Steady-state probe failures (bad status line, timeout, closed connection,
//! ...) are *not* represented here — they stay inside the verdict filter as
//! [`crate::parser::TerminalOutcome`] data, never as an `Err`. This enum only
//! covers registration and configuration mistakes the embedding proxy can
//! make while wiring the registry together.

use thiserror::Error;

/// Errors returned by [`crate::registry::Registry`] construction and peer
/// registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("peer buffer size must be non-zero (peer {upstream:?} at {addr})")]
    ZeroBuffer {
        upstream: String,
        addr: std::net::SocketAddr,
    },

    #[error("peer send payload must be non-empty (peer {upstream:?} at {addr})")]
    EmptySendPayload {
        upstream: String,
        addr: std::net::SocketAddr,
    },

    #[error("peer {addr} is already registered under upstream {upstream:?}")]
    DuplicatePeer {
        upstream: String,
        addr: std::net::SocketAddr,
    },

    #[error("failcount must be at least 1 (peer {upstream:?} at {addr})")]
    ZeroFailcount {
        upstream: String,
        addr: std::net::SocketAddr,
    },
}
