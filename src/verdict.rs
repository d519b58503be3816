//! The verdict / flap filter (SPEC_FULL.md §4.6): converts a stream of
//! per-probe terminal outcomes into the persisted "down" bit, requiring
//! `failcount` consecutive like-kind outcomes before flipping.

use std::sync::atomic::Ordering;

use crate::parser::TerminalOutcome;
use crate::shared_slot::SharedSlot;

/// Applies the "mark finished" transition described in SPEC_FULL.md §4.6
/// steps 1-5 to `slot`. Steps 6-7 (closing the connection, re-arming timers)
/// are the caller's responsibility in `probe.rs`/`scheduler.rs` — this
/// function only touches the shared slot.
pub fn mark_finished(slot: &SharedSlot, outcome: TerminalOutcome, now_ms: u64, failcount: u32) {
    let bad = outcome.is_bad();
    let previous_bad = slot.last_verdict_bad.load(Ordering::Relaxed);

    if bad == previous_bad {
        slot.run_length.fetch_add(1, Ordering::Relaxed);
    } else {
        slot.last_verdict_bad.store(bad, Ordering::Relaxed);
        slot.run_length.store(1, Ordering::Relaxed);
        slot.since_ms.store(now_ms, Ordering::Relaxed);
    }

    let run_length = slot.run_length.load(Ordering::Relaxed);
    if run_length >= failcount {
        // Flips on every qualifying probe, not just on transitions — a long
        // run of healthy checks keeps reaffirming `down = false`. Benign and
        // idempotent, per SPEC_FULL.md §4.6's closing note.
        slot.down.store(bad, Ordering::Release);
    }

    slot.last_code.store(outcome as u8, Ordering::Relaxed);
    slot.action_time_ms.store(now_ms, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t2_run_length_is_at_least_one_after_any_completed_probe() {
        let slot = SharedSlot::new();
        mark_finished(&slot, TerminalOutcome::Ok, 10, 2);
        assert!(slot.run_length() >= 1);
        assert_eq!(slot.last_code(), TerminalOutcome::Ok);
    }

    #[test]
    fn t3_down_flips_after_failcount_consecutive_bad_probes() {
        let slot = SharedSlot::new();
        let failcount = 2;
        mark_finished(&slot, TerminalOutcome::BadCode, 1, failcount);
        assert!(!slot.is_down(), "should not flip before failcount is reached");
        mark_finished(&slot, TerminalOutcome::BadCode, 2, failcount);
        assert!(slot.is_down());
    }

    #[test]
    fn t3_symmetric_recovery_after_failcount_consecutive_good_probes() {
        let slot = SharedSlot::new();
        let failcount = 2;
        mark_finished(&slot, TerminalOutcome::BadCode, 1, failcount);
        mark_finished(&slot, TerminalOutcome::BadCode, 2, failcount);
        assert!(slot.is_down());

        // A single good probe does not clear `down` yet.
        mark_finished(&slot, TerminalOutcome::Ok, 3, failcount);
        assert!(slot.is_down());

        mark_finished(&slot, TerminalOutcome::Ok, 4, failcount);
        assert!(!slot.is_down());
    }

    #[test]
    fn r2_repeated_good_probes_keep_down_false_and_grow_run_length() {
        let slot = SharedSlot::new();
        let mut last_run_length = 0;
        for t in 1..=5u64 {
            mark_finished(&slot, TerminalOutcome::Ok, t, 2);
            assert!(!slot.is_down());
            assert!(!slot.last_verdict_bad());
            assert!(slot.run_length() > last_run_length);
            last_run_length = slot.run_length();
        }
    }

    #[test]
    fn mixed_outcomes_reset_run_length_on_verdict_change() {
        let slot = SharedSlot::new();
        mark_finished(&slot, TerminalOutcome::Ok, 1, 3);
        mark_finished(&slot, TerminalOutcome::Ok, 2, 3);
        assert_eq!(slot.run_length(), 2);

        mark_finished(&slot, TerminalOutcome::BadConn, 3, 3);
        assert_eq!(slot.run_length(), 1);
        assert_eq!(slot.since_ms(), 3);
    }

    #[test]
    fn s1_two_ok_probes_in_a_row_leave_down_false() {
        let slot = SharedSlot::new();
        mark_finished(&slot, TerminalOutcome::Ok, 1, 2);
        mark_finished(&slot, TerminalOutcome::Ok, 2, 2);
        assert!(!slot.is_down());
    }

    #[test]
    fn s2_two_bad_code_probes_in_a_row_flip_down_true() {
        let slot = SharedSlot::new();
        mark_finished(&slot, TerminalOutcome::BadCode, 1, 2);
        mark_finished(&slot, TerminalOutcome::BadCode, 2, 2);
        assert!(slot.is_down());
    }
}
