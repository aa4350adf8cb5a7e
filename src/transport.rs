// Transport and clock contracts, plus the simulated implementations used
// by the emulated runtime.
//
// The packet transport is best-effort: frames may be dropped, duplicated,
// or delivered out of order. Protocol layers above tolerate all three.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::common::{Address, Tick};

/// Best-effort frame transport addressed by node address.
pub trait Transport: Send + Sync {
    /// Queue a frame for `to`. May silently drop or duplicate it.
    fn send(&self, from: &Address, to: &Address, payload: &[u8]);

    /// Remove and return every frame pending for `addr`. Ownership of the
    /// buffers transfers to the caller, which must release them on every
    /// exit path including decode failure.
    fn drain(&self, addr: &Address) -> Vec<Bytes>;
}

/// Monotonically non-decreasing discrete time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Tick;
}

/// Shared tick counter advanced once per simulation step.
#[derive(Debug, Default)]
pub struct SimClock {
    tick: AtomicI64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one tick and return the new time.
    pub fn advance(&self) -> Tick {
        self.tick.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Clock for SimClock {
    fn now(&self) -> Tick {
        self.tick.load(Ordering::SeqCst)
    }
}

/// Loss model for the simulated network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimNetConfig {
    /// Probability that a frame is dropped instead of enqueued.
    pub drop_rate: f64,
    /// Probability that an enqueued frame is enqueued twice.
    pub duplicate_rate: f64,
    /// RNG seed, so a given run is reproducible.
    pub seed: u64,
}

impl Default for SimNetConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 7,
        }
    }
}

/// In-process message bus with per-address FIFO queues.
pub struct SimNetwork {
    inner: Mutex<NetState>,
}

struct NetState {
    queues: HashMap<Address, VecDeque<Bytes>>,
    rng: StdRng,
    drop_rate: f64,
    duplicate_rate: f64,
    delivered: u64,
    dropped: u64,
}

impl SimNetwork {
    pub fn new(config: SimNetConfig) -> Self {
        Self {
            inner: Mutex::new(NetState {
                queues: HashMap::new(),
                rng: StdRng::seed_from_u64(config.seed),
                drop_rate: config.drop_rate,
                duplicate_rate: config.duplicate_rate,
                delivered: 0,
                dropped: 0,
            }),
        }
    }

    /// Change the loss probability mid-run, e.g. to let a cluster form
    /// cleanly and then degrade the links.
    pub fn set_drop_rate(&self, drop_rate: f64) {
        self.inner.lock().drop_rate = drop_rate;
    }

    /// (delivered, dropped) frame counters.
    pub fn stats(&self) -> (u64, u64) {
        let state = self.inner.lock();
        (state.delivered, state.dropped)
    }

    /// Frames currently queued for `addr`.
    pub fn pending(&self, addr: &Address) -> usize {
        self.inner
            .lock()
            .queues
            .get(addr)
            .map_or(0, VecDeque::len)
    }
}

impl Transport for SimNetwork {
    fn send(&self, _from: &Address, to: &Address, payload: &[u8]) {
        let mut state = self.inner.lock();
        let drop_rate = state.drop_rate;
        if drop_rate > 0.0 && state.rng.random_bool(drop_rate) {
            state.dropped += 1;
            return;
        }
        let duplicate_rate = state.duplicate_rate;
        let duplicate = duplicate_rate > 0.0 && state.rng.random_bool(duplicate_rate);
        let frame = Bytes::copy_from_slice(payload);
        let queue = state.queues.entry(*to).or_default();
        queue.push_back(frame.clone());
        if duplicate {
            queue.push_back(frame);
        }
        state.delivered += 1;
    }

    fn drain(&self, addr: &Address) -> Vec<Bytes> {
        let mut state = self.inner.lock();
        match state.queues.get_mut(addr) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }
}
