//! Stable cross-worker identities.
//!
//! [`PeerIndex`] is the only identity the shared status table and every
//! worker's private table agree on. [`WorkerId`] stands in for a concurrency
//! domain (an OS process, a thread, a task group) — any stable, nonzero
//! `u64` it is assigned once at startup.

use std::fmt;

/// Zero-based, stable index of a registered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerIndex(u32);

impl PeerIndex {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the worker currently responsible for a peer.
///
/// `0` is reserved to mean "unclaimed" and is never a valid worker identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Builds a worker identity from a nonzero raw value.
    ///
    /// # Panics
    /// Panics if `raw == 0`; `0` is reserved for "unclaimed" in `SharedSlot::owner`.
    pub fn new(raw: u64) -> Self {
        assert_ne!(raw, 0, "WorkerId(0) is reserved for the unclaimed sentinel");
        Self(raw)
    }

    /// Derives a worker identity from the current OS process id, for embedders
    /// that run one OS process per concurrency domain (e.g. `SO_REUSEPORT`
    /// multi-process deployments, matching the original nginx module).
    pub fn from_process() -> Self {
        Self::new(std::process::id() as u64)
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }

    /// The raw worker identity, for diagnostics (status page rendering).
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The sentinel stored in a freshly-registered, never-yet-claimed slot.
    pub(crate) const UNCLAIMED: u64 = 0;
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn worker_id_zero_panics() {
        WorkerId::new(0);
    }

    #[test]
    fn peer_index_roundtrips() {
        let idx = PeerIndex::new(7);
        assert_eq!(idx.as_usize(), 7);
        assert_eq!(idx.as_u32(), 7);
        assert_eq!(idx.to_string(), "7");
    }
}
