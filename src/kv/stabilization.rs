// Stabilization: replica repair after ring membership changes.
//
// Runs every tick right after the ring rebuild. The node keeps the
// previous tick's ring plus its two ring neighbors in each direction:
// the predecessors whose keys it holds as a follower replica, and the
// successors that hold its primaries. When either neighborhood shifts,
// every locally held key is re-placed: keys this node no longer serves
// are dropped locally (the remaining replicas re-place them on their
// own), and replicas that just became responsible receive a copy via a
// plain create request. On an unchanged ring the pass emits nothing.

use std::sync::Arc;

use crate::common::Address;
use crate::kv::message::{KvMessage, KvOp};
use crate::kv::store::KvStore;
use crate::kv::TransIdSeq;
use crate::ring::{ReplicaRole, Ring, REPLICA_COUNT};
use crate::transport::Transport;

#[derive(Debug, Default)]
pub struct Stabilizer {
    prev_ring: Option<Ring>,
    /// Successors that should hold this node's primaries.
    has_my_replicas: Vec<Address>,
    /// Predecessors whose keys this node should hold.
    have_replicas_of: Vec<Address>,
}

/// What one stabilization pass did, for diagnostics.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StabilizationReport {
    pub keys_dropped: usize,
    pub copies_sent: usize,
}

impl Stabilizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stabilize(
        &mut self,
        ring: &Ring,
        store: &mut KvStore,
        self_addr: &Address,
        seq: &mut TransIdSeq,
        transport: &Arc<dyn Transport>,
    ) -> StabilizationReport {
        let mut report = StabilizationReport::default();

        if ring.len() < REPLICA_COUNT {
            // Placement undefined; remember the ring and wait for quorum
            // of members.
            self.remember(ring, self_addr);
            return report;
        }

        let successors = ring.successors_of(self_addr, REPLICA_COUNT - 1);
        let predecessors = ring.predecessors_of(self_addr, REPLICA_COUNT - 1);
        let neighbors_changed =
            successors != self.has_my_replicas || predecessors != self.have_replicas_of;

        let mut dropped: Vec<String> = Vec::new();
        for (key, value) in store.entries() {
            let Some(replicas) = ring.replicas_of(key) else {
                continue;
            };
            if !replicas.iter().any(|replica| replica.addr == *self_addr) {
                // No message: the surviving replicas re-place the key
                // independently.
                dropped.push(key.clone());
                continue;
            }
            if !neighbors_changed {
                continue;
            }
            let previous: Vec<Address> = self
                .prev_ring
                .as_ref()
                .and_then(|prev| prev.replicas_of(key))
                .map(|set| set.iter().map(|node| node.addr).collect())
                .unwrap_or_default();
            for (index, replica) in replicas.iter().enumerate() {
                if replica.addr != *self_addr && !previous.contains(&replica.addr) {
                    let request = KvMessage::Request {
                        trans_id: seq.next(),
                        from: *self_addr,
                        op: KvOp::Create,
                        key: key.clone(),
                        value: Some(value.clone()),
                        role: Some(ReplicaRole::of_index(index)),
                    };
                    transport.send(self_addr, &replica.addr, &request.encode());
                    report.copies_sent += 1;
                }
            }
        }

        for key in &dropped {
            store.delete(key);
        }
        report.keys_dropped = dropped.len();

        if report.keys_dropped > 0 || report.copies_sent > 0 {
            tracing::debug!(
                node = %self_addr,
                dropped = report.keys_dropped,
                sent = report.copies_sent,
                "stabilization pass"
            );
        }

        self.remember(ring, self_addr);
        report
    }

    fn remember(&mut self, ring: &Ring, self_addr: &Address) {
        self.has_my_replicas = ring.successors_of(self_addr, REPLICA_COUNT - 1);
        self.have_replicas_of = ring.predecessors_of(self_addr, REPLICA_COUNT - 1);
        self.prev_ring = Some(ring.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{SimNetConfig, SimNetwork, Transport};

    const RING_SIZE: u64 = 512;

    fn addresses(ids: &[i32]) -> Vec<Address> {
        ids.iter().map(|id| Address::new(*id, 0)).collect()
    }

    fn network() -> Arc<dyn Transport> {
        Arc::new(SimNetwork::new(SimNetConfig::default()))
    }

    #[test]
    fn test_stable_ring_is_a_no_op() {
        let members = addresses(&[1, 2, 3, 4, 5]);
        let ring = Ring::build(&members, RING_SIZE);
        let self_addr = ring.replicas_of("k").unwrap()[0].addr;

        let mut store = KvStore::new();
        store.create("k", "v");
        let mut stabilizer = Stabilizer::new();
        let mut seq = TransIdSeq::new();
        let transport = network();

        // First pass seeds the caches from an identical previous ring.
        stabilizer.stabilize(&ring, &mut store, &self_addr, &mut seq, &transport);
        let report = stabilizer.stabilize(&ring, &mut store, &self_addr, &mut seq, &transport);
        assert_eq!(report, StabilizationReport::default());
        assert!(store.contains_key("k"));
    }

    #[test]
    fn test_key_leaves_node_that_lost_responsibility() {
        let members = addresses(&[1, 2, 3, 4, 5]);
        let ring = Ring::build(&members, RING_SIZE);
        let replicas = ring.replicas_of("k").unwrap();
        let outsider = members
            .iter()
            .find(|addr| !replicas.iter().any(|r| r.addr == **addr))
            .copied()
            .unwrap();

        let mut store = KvStore::new();
        store.create("k", "v");
        let mut stabilizer = Stabilizer::new();
        let mut seq = TransIdSeq::new();
        let transport = network();

        let report = stabilizer.stabilize(&ring, &mut store, &outsider, &mut seq, &transport);
        assert_eq!(report.keys_dropped, 1);
        assert_eq!(report.copies_sent, 0);
        assert!(!store.contains_key("k"));
    }

    #[test]
    fn test_replica_failure_triggers_copy_to_new_member() {
        let members = addresses(&[1, 2, 3, 4, 5]);
        let full_ring = Ring::build(&members, RING_SIZE);
        let replicas = full_ring.replicas_of("k").unwrap();
        let self_addr = replicas[1].addr;
        let failed = replicas[0].addr;

        let survivors: Vec<Address> = members
            .iter()
            .filter(|addr| **addr != failed)
            .copied()
            .collect();
        let shrunk_ring = Ring::build(&survivors, RING_SIZE);

        let mut store = KvStore::new();
        store.create("k", "v");
        let mut stabilizer = Stabilizer::new();
        let mut seq = TransIdSeq::new();
        let sim = Arc::new(SimNetwork::new(SimNetConfig::default()));
        let transport: Arc<dyn Transport> = sim.clone();

        stabilizer.stabilize(&full_ring, &mut store, &self_addr, &mut seq, &transport);
        let report = stabilizer.stabilize(&shrunk_ring, &mut store, &self_addr, &mut seq, &transport);

        // The key is still ours and exactly the newly responsible members
        // received a copy.
        assert!(store.contains_key("k"));
        let new_replicas = shrunk_ring.replicas_of("k").unwrap();
        let newcomers: Vec<Address> = new_replicas
            .iter()
            .map(|node| node.addr)
            .filter(|addr| {
                *addr != self_addr && !replicas.iter().any(|r| r.addr == *addr)
            })
            .collect();
        assert_eq!(report.copies_sent, newcomers.len());
        for addr in &newcomers {
            assert_eq!(sim.pending(addr), 1);
            let frames = sim.drain(addr);
            match KvMessage::decode(&frames[0]).unwrap() {
                KvMessage::Request { op, key, value, .. } => {
                    assert_eq!(op, KvOp::Create);
                    assert_eq!(key, "k");
                    assert_eq!(value.as_deref(), Some("v"));
                }
                other => panic!("unexpected message {other:?}"),
            }
        }
    }

    #[test]
    fn test_small_ring_leaves_data_alone() {
        let ring = Ring::build(&addresses(&[1, 2]), RING_SIZE);
        let mut store = KvStore::new();
        store.create("k", "v");
        let mut stabilizer = Stabilizer::new();
        let mut seq = TransIdSeq::new();
        let transport = network();

        let report = stabilizer.stabilize(
            &ring,
            &mut store,
            &Address::new(1, 0),
            &mut seq,
            &transport,
        );
        assert_eq!(report, StabilizationReport::default());
        assert!(store.contains_key("k"));
    }
}
