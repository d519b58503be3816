//! The probe scheduler (SPEC_FULL.md §4.2): the per-peer `claim_timer` and
//! `delay_timer` interactions that drive when a probe starts, when it times
//! out, and when the next one is queued.
//!
//! One Tokio task per `(WorkerId, PeerIndex)` runs [`run_peer_loop`] for the
//! lifetime of the worker; it never exits except on a shutdown signal.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::time::Duration;

use log::{debug, info, warn};

use crate::config::PeerConfig;
use crate::ids::WorkerId;
use crate::metrics::AtomicMetrics;
use crate::ownership::{self, ClaimOutcome};
use crate::probe::{self, PrivateEntry, ProbeState};
use crate::shared_slot::{now_ms, SharedSlot};
use crate::shutdown::ShutdownSignal;
use crate::verdict;

/// Per-worker RNG seeded from the worker's own identity, per the mandatory
/// per-worker seeding called out in SPEC_FULL.md §4.2 and §9: workers that
/// fork (or are spawned) from the same image must not share jitter, or probe
/// storms synchronize across them.
fn worker_rng(worker: WorkerId) -> SmallRng {
    SmallRng::seed_from_u64(worker.raw())
}

/// Runs the claim/probe loop for one peer on behalf of one worker until
/// `shutdown` fires. This is the scheduler's entire job: decide, each time
/// around the loop, whether to wait for `claim_timer` (not yet owner) or
/// `delay_timer` (already owner, waiting to probe again).
pub async fn run_peer_loop(
    worker: WorkerId,
    slot: &SharedSlot,
    cfg: &PeerConfig,
    epoch: std::time::Instant,
    metrics: &AtomicMetrics,
    mut shutdown: ShutdownSignal,
) {
    let mut rng = worker_rng(worker);
    let mut entry = PrivateEntry::new(cfg.buffer_size);

    // Initial claim_timer: uniformly random delay in [0, delay), seeded
    // per-worker to avoid herd effects (SPEC_FULL.md §4.2).
    let initial_jitter = jitter(&mut rng, cfg.delay);
    if sleep_or_shutdown(initial_jitter, &mut shutdown).await.is_err() {
        return;
    }

    loop {
        if shutdown.is_shutting_down() {
            return;
        }

        let now = now_ms(epoch);
        let staleness_deadline = cfg.staleness_deadline().as_millis() as u64;

        match ownership::try_claim_or_renew(slot, worker, now, staleness_deadline) {
            ClaimOutcome::Claimed => {
                info!("{worker} claimed peer {} ({})", cfg.upstream, cfg.addr);
                entry.probe_state = ProbeState::Waiting;
                if sleep_or_shutdown(cfg.delay, &mut shutdown).await.is_err() {
                    return;
                }
                run_one_probe(worker, slot, cfg, &mut entry, epoch, metrics).await;
            }
            ClaimOutcome::TookOver => {
                info!("{worker} took over peer {} ({})", cfg.upstream, cfg.addr);
                metrics.record_takeover();
                entry.probe_state = ProbeState::Waiting;
                if sleep_or_shutdown(cfg.delay, &mut shutdown).await.is_err() {
                    return;
                }
                run_one_probe(worker, slot, cfg, &mut entry, epoch, metrics).await;
            }
            ClaimOutcome::AlreadyOwner => {
                if sleep_or_shutdown(cfg.delay, &mut shutdown).await.is_err() {
                    return;
                }
                run_one_probe(worker, slot, cfg, &mut entry, epoch, metrics).await;
            }
            ClaimOutcome::LiveElsewhere | ClaimOutcome::LockContended => {
                // Arm claim_timer with delay * 10 to retry later (step 7).
                debug!(
                    "{worker} did not acquire peer {} ({}); retrying",
                    cfg.upstream, cfg.addr
                );
                if sleep_or_shutdown(cfg.claim_retry_delay(), &mut shutdown)
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}

async fn run_one_probe(
    worker: WorkerId,
    slot: &SharedSlot,
    cfg: &PeerConfig,
    entry: &mut PrivateEntry,
    epoch: std::time::Instant,
    metrics: &AtomicMetrics,
) {
    let outcome = probe::run_probe(cfg, entry).await;
    let now = now_ms(epoch);
    verdict::mark_finished(slot, outcome, now, cfg.failcount);
    ownership::touch(slot, now);
    entry.probe_state = ProbeState::Waiting;
    metrics.record_probe(outcome.is_bad(), outcome == crate::parser::TerminalOutcome::Timeout);

    if outcome.is_bad() {
        warn!(
            "{worker} probe of {} ({}) finished: {outcome}",
            cfg.upstream, cfg.addr
        );
    } else {
        debug!(
            "{worker} probe of {} ({}) finished: {outcome}",
            cfg.upstream, cfg.addr
        );
    }
}

fn jitter(rng: &mut SmallRng, delay: Duration) -> Duration {
    let max_ms = delay.as_millis().max(1) as u64;
    Duration::from_millis(rng.random_range(0..max_ms))
}

/// Sleeps for `duration`, returning `Err(())` if shutdown is requested
/// first — the only two ways a sleep ever ends, matching the cancellation
/// model in SPEC_FULL.md §5 (never force-aborted, only observed).
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut ShutdownSignal) -> Result<(), ()> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = shutdown.changed() => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let mut rng = worker_rng(WorkerId::new(42));
        let delay = Duration::from_millis(100);
        for _ in 0..1000 {
            let j = jitter(&mut rng, delay);
            assert!(j < delay);
        }
    }

    #[test]
    fn different_workers_get_different_rngs() {
        let mut rng_a = worker_rng(WorkerId::new(1));
        let mut rng_b = worker_rng(WorkerId::new(2));
        let delay = Duration::from_millis(1_000_000);
        let sample_a: Vec<_> = (0..8).map(|_| jitter(&mut rng_a, delay)).collect();
        let sample_b: Vec<_> = (0..8).map(|_| jitter(&mut rng_b, delay)).collect();
        assert_ne!(sample_a, sample_b);
    }
}
