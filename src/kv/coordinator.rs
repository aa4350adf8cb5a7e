// Quorum coordinator.
//
// Each client operation opens a tracker keyed by a fresh transID and
// fans one request out to the three replicas of the key. A tracker
// finalizes exactly once: success as soon as two positive replies are in,
// failure once all three replies arrived without a quorum or once the
// deadline passes. Finalization erases the tracker, so late replies find
// no tracker and are dropped silently.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::common::{Address, Tick, TransId};
use crate::kv::message::{KvMessage, KvOp};
use crate::kv::TransIdSeq;
use crate::oplog::OpLog;
use crate::ring::{ReplicaRole, Ring, REPLICA_COUNT};
use crate::transport::{Clock, Transport};

/// Quorum size: two of the three replicas must answer positively.
pub const QUORUM: u8 = 2;

/// State of one in-flight replicated operation.
#[derive(Debug, Clone)]
pub struct QuorumTracker {
    pub trans_id: TransId,
    pub op: KvOp,
    pub key: String,
    pub value: String,
    pub total_replies: u8,
    pub ok_replies: u8,
    /// Last non-empty value observed in a READREPLY; becomes the
    /// client-visible value of a successful read.
    pub read_value: Option<String>,
    pub created_at: Tick,
}

pub struct QuorumCoordinator {
    addr: Address,
    quorum_timeout: Tick,
    trackers: BTreeMap<TransId, QuorumTracker>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    oplog: Arc<dyn OpLog>,
}

impl QuorumCoordinator {
    pub fn new(
        addr: Address,
        quorum_timeout: Tick,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        oplog: Arc<dyn OpLog>,
    ) -> Self {
        Self {
            addr,
            quorum_timeout,
            trackers: BTreeMap::new(),
            transport,
            clock,
            oplog,
        }
    }

    /// Begin a replicated operation: allocate a transID, record the
    /// tracker, and send one tagged request per replica. With fewer than
    /// three ring members nothing is sent and the tracker ages out to
    /// failure, since membership may still converge before the deadline.
    pub fn issue(
        &mut self,
        seq: &mut TransIdSeq,
        ring: &Ring,
        op: KvOp,
        key: &str,
        value: Option<&str>,
    ) -> TransId {
        let trans_id = seq.next();
        self.trackers.insert(
            trans_id,
            QuorumTracker {
                trans_id,
                op,
                key: key.to_string(),
                value: value.unwrap_or("").to_string(),
                total_replies: 0,
                ok_replies: 0,
                read_value: None,
                created_at: self.clock.now(),
            },
        );

        if let Some(replicas) = ring.replicas_of(key) {
            for (index, replica) in replicas.iter().enumerate() {
                let request = KvMessage::Request {
                    trans_id,
                    from: self.addr,
                    op,
                    key: key.to_string(),
                    value: value.map(str::to_string),
                    role: op.carries_value().then(|| ReplicaRole::of_index(index)),
                };
                self.transport
                    .send(&self.addr, &replica.addr, &request.encode());
            }
        } else {
            tracing::debug!(
                node = %self.addr,
                trans_id,
                "ring too small for placement, operation will time out"
            );
        }
        trans_id
    }

    /// Account a REPLY. Unknown transIDs are late or foreign replies and
    /// are dropped without effect.
    pub fn handle_reply(&mut self, trans_id: TransId, success: bool) {
        let Some(tracker) = self.trackers.get_mut(&trans_id) else {
            return;
        };
        tracker.total_replies += 1;
        if success {
            tracker.ok_replies += 1;
        }
        self.finalize_if_decided(trans_id);
    }

    /// Account a READREPLY; a non-empty value counts toward the quorum.
    pub fn handle_read_reply(&mut self, trans_id: TransId, value: String) {
        let Some(tracker) = self.trackers.get_mut(&trans_id) else {
            return;
        };
        tracker.total_replies += 1;
        if !value.is_empty() {
            tracker.ok_replies += 1;
            tracker.read_value = Some(value);
        }
        self.finalize_if_decided(trans_id);
    }

    /// Expire trackers past the quorum deadline. Called every tick.
    pub fn sweep(&mut self) {
        let now = self.clock.now();
        let expired: Vec<TransId> = self
            .trackers
            .values()
            .filter(|tracker| now - tracker.created_at > self.quorum_timeout)
            .map(|tracker| tracker.trans_id)
            .collect();
        for trans_id in expired {
            if let Some(tracker) = self.trackers.remove(&trans_id) {
                tracing::debug!(node = %self.addr, trans_id, "quorum deadline expired");
                self.log_outcome(&tracker, false);
            }
        }
    }

    fn finalize_if_decided(&mut self, trans_id: TransId) {
        let decided = self.trackers.get(&trans_id).and_then(|tracker| {
            let quorum_met = tracker.ok_replies >= QUORUM;
            let quorum_lost =
                tracker.total_replies >= REPLICA_COUNT as u8 && tracker.ok_replies < QUORUM;
            (quorum_met || quorum_lost).then_some(quorum_met)
        });
        // Remove first: erasure is what makes finalization exactly-once.
        if let Some(success) = decided {
            if let Some(tracker) = self.trackers.remove(&trans_id) {
                self.log_outcome(&tracker, success);
            }
        }
    }

    fn log_outcome(&self, tracker: &QuorumTracker, success: bool) {
        let addr = &self.addr;
        let id = tracker.trans_id;
        let key = tracker.key.as_str();
        match (tracker.op, success) {
            (KvOp::Create, true) => self.oplog.create_success(addr, true, id, key, &tracker.value),
            (KvOp::Create, false) => self.oplog.create_fail(addr, true, id, key, &tracker.value),
            (KvOp::Read, true) => self.oplog.read_success(
                addr,
                true,
                id,
                key,
                tracker.read_value.as_deref().unwrap_or(""),
            ),
            (KvOp::Read, false) => self.oplog.read_fail(addr, true, id, key),
            (KvOp::Update, true) => self.oplog.update_success(addr, true, id, key, &tracker.value),
            (KvOp::Update, false) => self.oplog.update_fail(addr, true, id, key, &tracker.value),
            (KvOp::Delete, true) => self.oplog.delete_success(addr, true, id, key),
            (KvOp::Delete, false) => self.oplog.delete_fail(addr, true, id, key),
        }
    }

    pub fn pending(&self) -> usize {
        self.trackers.len()
    }

    pub fn tracker(&self, trans_id: TransId) -> Option<&QuorumTracker> {
        self.trackers.get(&trans_id)
    }
}
