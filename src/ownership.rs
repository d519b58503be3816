//! The ownership protocol (SPEC_FULL.md §4.1): a spinlock-guarded
//! claim/renewal scheme that elects a single worker as the current prober of
//! each peer and relinquishes ownership after a staleness deadline.
//!
//! The spinlock is the *only* lock in this crate, and by construction it can
//! never be held across an `.await`: [`SpinGuard`] borrows the slot for the
//! lifetime of a single synchronous scope and contains no suspension point.

use std::sync::atomic::Ordering;

use log::error;

use crate::ids::WorkerId;
use crate::shared_slot::{SharedSlot, LOCK_FREE, LOCK_HELD};

/// Bounded spin count for acquiring the ownership lock. The critical section
/// only ever does local memory operations, so a short bound (rather than an
/// unbounded spin or a parking primitive) is sufficient and keeps the
/// invariant "never held across I/O, sleeps, or timer operations" trivially
/// true by never blocking at all.
const SPIN_LIMIT: u32 = 1_000;

/// What happened when a worker attempted to claim or renew ownership of a
/// peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This worker already owned the peer; ownership renewed implicitly by
    /// virtue of being live (no write needed beyond what the probe lifecycle
    /// itself performs).
    AlreadyOwner,
    /// The peer was unclaimed; this worker is now the owner and should arm
    /// its `delay_timer`. Not a takeover — there was no prior live owner to
    /// displace.
    Claimed,
    /// The peer's previous owner had gone stale; this worker has taken over
    /// and should arm its `delay_timer`, exactly like `Claimed`, but this is
    /// the case `ownership_takeovers` (metrics.rs) should count.
    TookOver,
    /// Another worker owns the peer and is still live; this worker should
    /// arm its `claim_timer` to retry later.
    LiveElsewhere,
    /// The spinlock could not be acquired within [`SPIN_LIMIT`] iterations.
    /// Treated as "try again next tick" — never blocks.
    LockContended,
}

/// A held ownership spinlock. Dropping it releases the lock via CAS; if the
/// CAS fails (the lock word was corrupted by something other than this
/// guard, which should never happen), it is forced to zero as a defensive
/// fallback and a critical error is logged, per SPEC_FULL.md §4.1 step 6.
struct SpinGuard<'a> {
    slot: &'a SharedSlot,
}

impl<'a> SpinGuard<'a> {
    fn try_acquire(slot: &'a SharedSlot) -> Option<Self> {
        for _ in 0..SPIN_LIMIT {
            if slot
                .lock
                .compare_exchange_weak(
                    LOCK_FREE,
                    LOCK_HELD,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return Some(Self { slot });
            }
            std::hint::spin_loop();
        }
        None
    }
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        match self.slot.lock.compare_exchange(
            LOCK_HELD,
            LOCK_FREE,
            Ordering::Release,
            Ordering::Relaxed,
        ) {
            Ok(_) => {}
            Err(_) => {
                error!("healthcheck ownership lock CAS release failed; forcing lock to free");
                self.slot.lock.store(LOCK_FREE, Ordering::Release);
            }
        }
    }
}

/// Attempts to claim or renew ownership of `slot` on behalf of `worker`.
///
/// `now_ms` and `staleness_deadline_ms` are both caller-supplied so this
/// function stays synchronous and testable without a runtime clock.
pub fn try_claim_or_renew(
    slot: &SharedSlot,
    worker: WorkerId,
    now_ms: u64,
    staleness_deadline_ms: u64,
) -> ClaimOutcome {
    let Some(_guard) = SpinGuard::try_acquire(slot) else {
        return ClaimOutcome::LockContended;
    };

    let current_owner = slot.owner.load(Ordering::Relaxed);
    if current_owner == worker.raw() {
        return ClaimOutcome::AlreadyOwner;
    }

    if current_owner == WorkerId::UNCLAIMED {
        slot.owner.store(worker.raw(), Ordering::Relaxed);
        slot.action_time_ms.store(now_ms, Ordering::Relaxed);
        return ClaimOutcome::Claimed;
    }

    let last_action = slot.action_time_ms.load(Ordering::Relaxed);
    let age = now_ms.saturating_sub(last_action);
    if age >= staleness_deadline_ms {
        slot.owner.store(worker.raw(), Ordering::Relaxed);
        slot.action_time_ms.store(now_ms, Ordering::Relaxed);
        ClaimOutcome::TookOver
    } else {
        ClaimOutcome::LiveElsewhere
    }
    // `_guard` drops here, releasing the spinlock via CAS.
}

/// Touches `action_time` without changing ownership — called after every
/// unit of probe progress so a live owner never looks stale to a would-be
/// claimant (SPEC_FULL.md I4: `action_time` is monotonically non-decreasing
/// per owner tenure).
pub fn touch(slot: &SharedSlot, now_ms: u64) {
    // No lock needed: only the owning worker calls this, and it never races
    // with another worker's ownership write because that write only happens
    // once this owner's `action_time` has already gone stale.
    let previous = slot.action_time_ms.load(Ordering::Relaxed);
    if now_ms >= previous {
        slot.action_time_ms.store(now_ms, Ordering::Relaxed);
    }
}
