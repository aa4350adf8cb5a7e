// One store node: membership protocol, ring, local table, quorum
// coordinator, and the per-tick scheduler that binds them.
//
// Tick order is fixed: (1) membership receive, (2) membership
// housekeeping and gossip, (3) ring rebuild and stabilization, (4) KV
// receive, (5) quorum timeout sweep. All handlers run to completion;
// nothing blocks.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;

use crate::common::{Address, TransId};
use crate::config::ProtocolConfig;
use crate::error::{KvError, Result};
use crate::kv::coordinator::QuorumCoordinator;
use crate::kv::message::{KvMessage, KvOp};
use crate::kv::server;
use crate::kv::stabilization::Stabilizer;
use crate::kv::store::KvStore;
use crate::kv::TransIdSeq;
use crate::membership::protocol::MembershipProtocol;
use crate::membership::wire::MembershipFrame;
use crate::oplog::OpLog;
use crate::ring::Ring;
use crate::transport::{Clock, Transport};

/// Node lifecycle. A node is constructed straight into `Init` (member
/// list holding only itself); `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Initialized, not yet asked to join.
    Init,
    /// Waiting for the introducer's join reply.
    Joining,
    /// Full member: gossiping, serving, coordinating.
    InGroup,
    /// Crashed. No send, no receive, no tick work.
    Failed,
}

pub struct Node {
    addr: Address,
    config: ProtocolConfig,
    state: NodeState,
    membership: MembershipProtocol,
    ring: Ring,
    store: KvStore,
    coordinator: QuorumCoordinator,
    stabilizer: Stabilizer,
    trans_ids: TransIdSeq,
    transport: Arc<dyn Transport>,
    oplog: Arc<dyn OpLog>,
    membership_inbox: VecDeque<Bytes>,
    kv_inbox: VecDeque<Bytes>,
}

impl Node {
    pub fn new(
        addr: Address,
        config: ProtocolConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        oplog: Arc<dyn OpLog>,
    ) -> Result<Node> {
        config.validate()?;
        let membership = MembershipProtocol::new(
            addr,
            &config,
            transport.clone(),
            clock.clone(),
            oplog.clone(),
        );
        let coordinator = QuorumCoordinator::new(
            addr,
            config.quorum_timeout,
            transport.clone(),
            clock,
            oplog.clone(),
        );
        Ok(Node {
            addr,
            config,
            state: NodeState::Init,
            membership,
            ring: Ring::default(),
            store: KvStore::new(),
            coordinator,
            stabilizer: Stabilizer::new(),
            trans_ids: TransIdSeq::new(),
            transport,
            oplog,
            membership_inbox: VecDeque::new(),
            kv_inbox: VecDeque::new(),
        })
    }

    /// Ask to join the group. The introducer enters the group directly.
    pub fn start(&mut self) {
        if self.state != NodeState::Init {
            return;
        }
        self.membership.start();
        self.state = if self.membership.in_group() {
            NodeState::InGroup
        } else {
            NodeState::Joining
        };
    }

    /// Crash the node. Terminal.
    pub fn fail(&mut self) {
        tracing::debug!(node = %self.addr, "node failed");
        self.state = NodeState::Failed;
    }

    /// One scheduler round.
    pub fn tick(&mut self) {
        if self.state == NodeState::Failed || self.state == NodeState::Init {
            return;
        }

        self.ingest();

        // (1) Membership receive. Undecodable frames are dropped; the
        // buffer is released either way.
        while let Some(frame) = self.membership_inbox.pop_front() {
            let _ = self.membership.handle_frame(&frame);
        }
        if self.state == NodeState::Joining && self.membership.in_group() {
            self.state = NodeState::InGroup;
        }

        if self.state == NodeState::InGroup {
            // (2) Heartbeat, gossip, failure sweep.
            self.membership.housekeeping();

            // (3) Ring refresh from the live-member snapshot, then repair.
            self.ring = Ring::build(&self.membership.live_members(), self.config.ring_size);
            self.stabilizer.stabilize(
                &self.ring,
                &mut self.store,
                &self.addr,
                &mut self.trans_ids,
                &self.transport,
            );
        }

        // (4) KV receive.
        while let Some(frame) = self.kv_inbox.pop_front() {
            match KvMessage::decode(&frame) {
                Ok(KvMessage::Request {
                    trans_id,
                    from,
                    op,
                    key,
                    value,
                    ..
                }) => server::handle_request(
                    &mut self.store,
                    &self.addr,
                    self.transport.as_ref(),
                    self.oplog.as_ref(),
                    trans_id,
                    from,
                    op,
                    &key,
                    value.as_deref(),
                ),
                Ok(KvMessage::Reply {
                    trans_id, success, ..
                }) => self.coordinator.handle_reply(trans_id, success),
                Ok(KvMessage::ReadReply {
                    trans_id, value, ..
                }) => self.coordinator.handle_read_reply(trans_id, value),
                Err(_) => {}
            }
        }

        // (5) Quorum deadline sweep.
        self.coordinator.sweep();
    }

    fn ingest(&mut self) {
        for frame in self.transport.drain(&self.addr) {
            if MembershipFrame::is_membership_frame(&frame) {
                self.membership_inbox.push_back(frame);
            } else {
                self.kv_inbox.push_back(frame);
            }
        }
    }

    pub fn client_create(&mut self, key: &str, value: &str) -> Result<TransId> {
        self.ensure_alive()?;
        Ok(self
            .coordinator
            .issue(&mut self.trans_ids, &self.ring, KvOp::Create, key, Some(value)))
    }

    pub fn client_read(&mut self, key: &str) -> Result<TransId> {
        self.ensure_alive()?;
        Ok(self
            .coordinator
            .issue(&mut self.trans_ids, &self.ring, KvOp::Read, key, None))
    }

    pub fn client_update(&mut self, key: &str, value: &str) -> Result<TransId> {
        self.ensure_alive()?;
        Ok(self
            .coordinator
            .issue(&mut self.trans_ids, &self.ring, KvOp::Update, key, Some(value)))
    }

    pub fn client_delete(&mut self, key: &str) -> Result<TransId> {
        self.ensure_alive()?;
        Ok(self
            .coordinator
            .issue(&mut self.trans_ids, &self.ring, KvOp::Delete, key, None))
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state == NodeState::Failed {
            return Err(KvError::NodeFailed);
        }
        Ok(())
    }

    pub fn addr(&self) -> Address {
        self.addr
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_in_group(&self) -> bool {
        self.state == NodeState::InGroup
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn membership(&self) -> &MembershipProtocol {
        &self.membership
    }

    /// Open quorum trackers on this node.
    pub fn pending_operations(&self) -> usize {
        self.coordinator.pending()
    }
}
