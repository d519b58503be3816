//! Lifecycle glue: registration, shared-zone init, per-worker init, graceful
//! shutdown — the single object handed to every worker, discoverable by
//! [`PeerIndex`].
//!
//! A builder accumulates configuration fallibly, then produces one
//! immutable, `Arc`-shared registry object every task clones a handle to.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::warn;
use tokio::task::JoinHandle;

use crate::config::PeerConfig;
use crate::error::RegistryError;
use crate::ids::{PeerIndex, WorkerId};
use crate::metrics::AtomicMetrics;
use crate::scheduler;
use crate::shared_slot::SharedSlot;
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal};

/// Accumulates [`PeerConfig`]s during config finalization: private entries
/// are created at registration, in the master process / config-loading
/// phase. Validation happens here, once, rather than on every probe.
#[derive(Default)]
pub struct RegistryBuilder {
    peers: Vec<PeerConfig>,
    seen_addrs: HashSet<(String, SocketAddr)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one peer, returning its stable [`PeerIndex`]. Rejects
    /// configuration mistakes the embedder could make while wiring peers
    /// together; steady-state probe failures are never represented as
    /// errors.
    pub fn register_peer(&mut self, cfg: PeerConfig) -> Result<PeerIndex, RegistryError> {
        if cfg.buffer_size == 0 {
            return Err(RegistryError::ZeroBuffer {
                upstream: cfg.upstream,
                addr: cfg.addr,
            });
        }
        if cfg.send_payload.is_empty() {
            return Err(RegistryError::EmptySendPayload {
                upstream: cfg.upstream,
                addr: cfg.addr,
            });
        }
        if cfg.failcount == 0 {
            return Err(RegistryError::ZeroFailcount {
                upstream: cfg.upstream,
                addr: cfg.addr,
            });
        }
        let key = (cfg.upstream.clone(), cfg.addr);
        if !self.seen_addrs.insert(key) {
            return Err(RegistryError::DuplicatePeer {
                upstream: cfg.upstream,
                addr: cfg.addr,
            });
        }

        let idx = PeerIndex::new(self.peers.len() as u32);
        self.peers.push(cfg);
        Ok(idx)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Finalizes the registry: allocates one [`SharedSlot`] per registered
    /// peer in a single `Arc<[SharedSlot]>`, exactly once — the in-process
    /// stand-in for the shared zone's `init` callback.
    pub fn build(self) -> Registry {
        let slots: Arc<[SharedSlot]> = self.peers.iter().map(|_| SharedSlot::new()).collect();
        Registry {
            peers: self.peers,
            slots,
            epoch: Instant::now(),
            metrics: Arc::new(AtomicMetrics::new()),
            shutdown: ShutdownCoordinator::new(),
            initialized_workers: Mutex::new(HashSet::new()),
        }
    }
}

/// Owns the peer table and the shared status table: the `Vec<PeerConfig>`
/// and the `Arc<[SharedSlot]>`. Immutable after [`RegistryBuilder::build`] —
/// there is no runtime create/destroy of peers.
pub struct Registry {
    peers: Vec<PeerConfig>,
    slots: Arc<[SharedSlot]>,
    epoch: Instant,
    metrics: Arc<AtomicMetrics>,
    shutdown: ShutdownCoordinator,
    initialized_workers: Mutex<HashSet<WorkerId>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// `is_down(index) = (index < N) AND peer_config_enabled(index) AND
    /// shared[index].down`. O(1), lock-free: a single atomic load plus two
    /// bounds/flag checks, no `.await`.
    #[inline]
    pub fn is_down(&self, idx: PeerIndex) -> bool {
        let i = idx.as_usize();
        i < self.peers.len() && self.peers[i].enabled && self.slots[i].is_down()
    }

    pub fn metrics(&self) -> &Arc<AtomicMetrics> {
        &self.metrics
    }

    pub fn config(&self, idx: PeerIndex) -> Option<&PeerConfig> {
        self.peers.get(idx.as_usize())
    }

    pub fn slot(&self, idx: PeerIndex) -> Option<&SharedSlot> {
        self.slots.get(idx.as_usize())
    }

    /// Every registered peer paired with its index and shared slot, for the
    /// status snapshot (SPEC_FULL.md §4.7).
    pub fn peers(&self) -> impl Iterator<Item = (PeerIndex, &PeerConfig, &SharedSlot)> {
        self.peers
            .iter()
            .zip(self.slots.iter())
            .enumerate()
            .map(|(i, (cfg, slot))| (PeerIndex::new(i as u32), cfg, slot))
    }

    /// Per-worker setup (SPEC_FULL.md §6 `worker_init`): spawns one scheduler
    /// task per registered peer on behalf of `worker`. Idempotent per
    /// `WorkerId` — calling it twice for the same worker is a logged no-op,
    /// not an error, mirroring "whichever worker initializes the zone first"
    /// racing harmlessly in the original (SPEC_FULL.md §6).
    pub fn worker_init(self: &Arc<Self>, worker: WorkerId) -> Vec<JoinHandle<()>> {
        {
            let mut seen = self.initialized_workers.lock().expect("registry mutex poisoned");
            if !seen.insert(worker) {
                warn!("{worker} already initialized against this registry; ignoring");
                return Vec::new();
            }
        }

        let shutdown_signal = self.shutdown.signal();
        let mut handles = Vec::with_capacity(self.peers.len());
        for i in 0..self.peers.len() {
            let registry = Arc::clone(self);
            let idx = PeerIndex::new(i as u32);
            let shutdown_signal = shutdown_signal.clone();
            handles.push(tokio::spawn(async move {
                run_registered_peer(registry, worker, idx, shutdown_signal).await;
            }));
        }
        handles
    }

    /// Requests shutdown for `worker`. In this crate's single-process Tokio
    /// target (SPEC_FULL.md §1.1) all workers share one shutdown channel, so
    /// this cancels every peer task regardless of which `WorkerId` is named;
    /// an embedder that truly runs independent OS processes would own one
    /// `Registry` per process and this call is already worker-scoped for
    /// that deployment.
    pub fn shutdown(&self, worker: WorkerId) {
        log::info!("shutdown requested by {worker}");
        self.shutdown.shut_down();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }
}

async fn run_registered_peer(
    registry: Arc<Registry>,
    worker: WorkerId,
    idx: PeerIndex,
    shutdown: ShutdownSignal,
) {
    let slot = &registry.slots[idx.as_usize()];
    let cfg = &registry.peers[idx.as_usize()];
    scheduler::run_peer_loop(worker, slot, cfg, registry.epoch, &registry.metrics, shutdown).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfigBuilder;

    fn sample_cfg(upstream: &str, port: u16) -> PeerConfig {
        PeerConfigBuilder::new(upstream, format!("127.0.0.1:{port}").parse().unwrap())
            .send_lines(["GET /health HTTP/1.1", "Host: x", "Connection: close"])
            .expected_any()
            .build()
    }

    #[test]
    fn register_peer_assigns_stable_incrementing_indices() {
        let mut builder = Registry::builder();
        let a = builder.register_peer(sample_cfg("api", 9001)).unwrap();
        let b = builder.register_peer(sample_cfg("api", 9002)).unwrap();
        assert_eq!(a.as_u32(), 0);
        assert_eq!(b.as_u32(), 1);
    }

    #[test]
    fn duplicate_peer_is_rejected() {
        let mut builder = Registry::builder();
        builder.register_peer(sample_cfg("api", 9001)).unwrap();
        let err = builder.register_peer(sample_cfg("api", 9001)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePeer { .. }));
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let mut builder = Registry::builder();
        let cfg = PeerConfigBuilder::new("api", "127.0.0.1:9001".parse().unwrap())
            .send_lines(["GET / HTTP/1.0"])
            .expected_any()
            .buffer_size(0)
            .build();
        let err = builder.register_peer(cfg).unwrap_err();
        assert!(matches!(err, RegistryError::ZeroBuffer { .. }));
    }

    #[test]
    fn fresh_registry_is_not_down_and_respects_enabled_flag() {
        let mut builder = Registry::builder();
        let idx = builder.register_peer(sample_cfg("api", 9001)).unwrap();
        let disabled_idx = builder
            .register_peer(
                PeerConfigBuilder::new("api", "127.0.0.1:9002".parse().unwrap())
                    .send_lines(["GET / HTTP/1.0"])
                    .expected_any()
                    .enabled(false)
                    .build(),
            )
            .unwrap();
        let registry = builder.build();

        assert!(!registry.is_down(idx));
        // A disabled peer never reports down, even if its shared slot were
        // somehow flipped (it never will be, since no task probes it).
        registry.slot(disabled_idx).unwrap().down.store(true, std::sync::atomic::Ordering::Relaxed);
        assert!(!registry.is_down(disabled_idx));
    }

    #[test]
    fn is_down_is_false_for_out_of_range_index() {
        let registry = Registry::builder().build();
        assert!(!registry.is_down(PeerIndex::new(0)));
    }

    #[tokio::test]
    async fn worker_init_is_idempotent_for_the_same_worker() {
        let mut builder = Registry::builder();
        builder.register_peer(sample_cfg("api", 9001)).unwrap();
        let registry = Arc::new(builder.build());
        let worker = WorkerId::new(1);

        let first = registry.worker_init(worker);
        assert_eq!(first.len(), 1);
        let second = registry.worker_init(worker);
        assert!(second.is_empty());

        registry.shutdown(worker);
        for handle in first {
            let _ = handle.await;
        }
    }
}
