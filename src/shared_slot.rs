//! The shared status table: one peer's worth of ownership, liveness, and
//! flap-counter state, visible to every worker.
//!
//! One [`SharedSlot`] per registered peer, held in an `Arc<[SharedSlot]>` so
//! every worker task observes the same bytes. Every field that must be
//! atomically observable across workers is a real `std::sync::atomic` field;
//! cross-field consistency is explicitly not guaranteed to non-owners, so
//! there is deliberately no outer lock around the struct itself — only
//! `lock` guards the narrow ownership critical section in `ownership.rs`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

use crate::ids::WorkerId;
use crate::parser::TerminalOutcome;

/// One peer's slice of the shared memory segment, translated to Rust atomics.
#[repr(C)]
pub struct SharedSlot {
    /// `WorkerId` raw value of the current owner, or `WorkerId::UNCLAIMED`.
    pub(crate) owner: AtomicU64,
    /// Spinlock guarding only the ownership read/modify/write in `ownership.rs`.
    pub(crate) lock: AtomicU32,
    /// Milliseconds since `epoch` of the most recent probe progress or
    /// ownership touch.
    pub(crate) action_time_ms: AtomicU64,
    /// Was the most recently completed probe bad?
    pub(crate) last_verdict_bad: AtomicBool,
    /// Count of consecutive probes matching `last_verdict_bad`.
    pub(crate) run_length: AtomicU32,
    /// Milliseconds since `epoch` at which the current run began.
    pub(crate) since_ms: AtomicU64,
    /// `TerminalOutcome as u8` of the most recently completed probe.
    pub(crate) last_code: AtomicU8,
    /// The published health state consulted by the proxy's routing.
    pub(crate) down: AtomicBool,
}

pub(crate) const LOCK_FREE: u32 = 0;
pub(crate) const LOCK_HELD: u32 = 1;

impl SharedSlot {
    pub fn new() -> Self {
        Self {
            owner: AtomicU64::new(WorkerId::UNCLAIMED),
            lock: AtomicU32::new(LOCK_FREE),
            action_time_ms: AtomicU64::new(0),
            last_verdict_bad: AtomicBool::new(false),
            run_length: AtomicU32::new(0),
            since_ms: AtomicU64::new(0),
            last_code: AtomicU8::new(TerminalOutcome::Ok as u8),
            down: AtomicBool::new(false),
        }
    }

    /// `is_down` consults only this field: a single lock-free atomic load.
    #[inline]
    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::Acquire)
    }

    pub fn owner(&self) -> Option<WorkerId> {
        match self.owner.load(Ordering::Relaxed) {
            WorkerId::UNCLAIMED => None,
            raw => Some(WorkerId::new(raw)),
        }
    }

    pub fn action_time_ms(&self) -> u64 {
        self.action_time_ms.load(Ordering::Relaxed)
    }

    pub fn run_length(&self) -> u32 {
        self.run_length.load(Ordering::Relaxed)
    }

    pub fn since_ms(&self) -> u64 {
        self.since_ms.load(Ordering::Relaxed)
    }

    pub fn last_verdict_bad(&self) -> bool {
        self.last_verdict_bad.load(Ordering::Relaxed)
    }

    pub fn last_code(&self) -> TerminalOutcome {
        decode_outcome(self.last_code.load(Ordering::Relaxed))
    }
}

impl Default for SharedSlot {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_outcome(raw: u8) -> TerminalOutcome {
    match raw {
        x if x == TerminalOutcome::Ok as u8 => TerminalOutcome::Ok,
        x if x == TerminalOutcome::BadHeader as u8 => TerminalOutcome::BadHeader,
        x if x == TerminalOutcome::BadStatus as u8 => TerminalOutcome::BadStatus,
        x if x == TerminalOutcome::BadBody as u8 => TerminalOutcome::BadBody,
        x if x == TerminalOutcome::BadState as u8 => TerminalOutcome::BadState,
        x if x == TerminalOutcome::BadConn as u8 => TerminalOutcome::BadConn,
        x if x == TerminalOutcome::BadCode as u8 => TerminalOutcome::BadCode,
        x if x == TerminalOutcome::Timeout as u8 => TerminalOutcome::Timeout,
        x if x == TerminalOutcome::FullBuffer as u8 => TerminalOutcome::FullBuffer,
        // Unreachable by construction: only `encode_outcome` ever writes this
        // field, and every `TerminalOutcome` variant is covered above. Treat
        // any surprise value as the reserved invariant-violation outcome
        // rather than panicking in a health check hot path.
        _ => TerminalOutcome::BadState,
    }
}

/// Millisecond timestamp relative to a fixed [`Instant`] epoch: monotonic,
/// not wall-clock, since health state is never persisted across a restart.
pub fn now_ms(epoch: Instant) -> u64 {
    epoch.elapsed().as_millis() as u64
}
