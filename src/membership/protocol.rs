// Gossip failure detector.
//
// Bootstrap: a node starts with only itself in the list. The introducer
// is in the group immediately; everyone else sends a join request to the
// introducer and waits for the reply. Steady state: every gossip round
// the node advances its own heartbeat and fans the non-suspected entries
// out to every address it knows, then sweeps entries past the removal
// threshold. Message loss is tolerated by fan-out redundancy; duplication
// and reordering are tolerated by heartbeat monotonicity.

use std::sync::Arc;

use crate::common::{Address, Tick};
use crate::config::ProtocolConfig;
use crate::error::Result;
use crate::membership::entry::{MemberList, MergeOutcome};
use crate::membership::wire::MembershipFrame;
use crate::oplog::OpLog;
use crate::transport::{Clock, Transport};

pub struct MembershipProtocol {
    addr: Address,
    introducer: Address,
    gossip_period: Tick,
    fail_timeout: Tick,
    remove_timeout: Tick,
    members: MemberList,
    in_group: bool,
    ping_counter: Tick,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    oplog: Arc<dyn OpLog>,
}

impl MembershipProtocol {
    pub fn new(
        addr: Address,
        config: &ProtocolConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        oplog: Arc<dyn OpLog>,
    ) -> Self {
        let now = clock.now();
        let protocol = Self {
            addr,
            introducer: config.introducer,
            gossip_period: config.gossip_period,
            fail_timeout: config.fail_timeout,
            remove_timeout: config.remove_timeout,
            members: MemberList::new(addr, now),
            in_group: false,
            ping_counter: config.gossip_period,
            transport,
            clock,
            oplog,
        };
        protocol.oplog.node_add(&addr, &addr);
        protocol
    }

    /// Join the group: the introducer boots it directly, everyone else
    /// asks the introducer and stays out of the group until the reply.
    pub fn start(&mut self) {
        if self.addr == self.introducer {
            tracing::debug!(node = %self.addr, "starting up group");
            self.in_group = true;
        } else {
            tracing::debug!(node = %self.addr, introducer = %self.introducer, "requesting to join");
            let frame = MembershipFrame::JoinReq {
                addr: self.addr,
                heartbeat: self.members.self_entry().heartbeat,
            };
            self.transport
                .send(&self.addr, &self.introducer, &frame.encode());
        }
    }

    /// Decode and apply one inbound frame. A decode failure is returned to
    /// the caller, which drops the frame without any state change.
    pub fn handle_frame(&mut self, data: &[u8]) -> Result<()> {
        match MembershipFrame::decode(data)? {
            MembershipFrame::JoinReq { addr, heartbeat } => {
                self.merge(addr, heartbeat);
                let reply = MembershipFrame::JoinRep {
                    addr: self.addr,
                    heartbeat: self.members.self_entry().heartbeat,
                };
                self.transport.send(&self.addr, &addr, &reply.encode());
            }
            MembershipFrame::JoinRep { addr, heartbeat } => {
                self.in_group = true;
                self.merge(addr, heartbeat);
            }
            MembershipFrame::Gossip { entries } => {
                for (addr, heartbeat) in entries {
                    self.merge(addr, heartbeat);
                }
            }
        }
        Ok(())
    }

    /// One tick of steady-state duty: gossip when the ping counter
    /// expires, then sweep expired entries. Only called once in the group.
    pub fn housekeeping(&mut self) {
        let now = self.clock.now();
        if self.ping_counter == 0 {
            self.members.advance_self(now);
            self.gossip(now);
            self.ping_counter = self.gossip_period;
        } else {
            self.ping_counter -= 1;
        }

        for removed in self.members.sweep(now, self.remove_timeout) {
            tracing::debug!(node = %self.addr, removed = %removed, "member timed out");
            self.oplog.node_remove(&self.addr, &removed);
        }
    }

    fn gossip(&self, now: Tick) {
        let frame = MembershipFrame::Gossip {
            entries: self.members.gossip_payload(now, self.fail_timeout),
        };
        let bytes = frame.encode();
        // Fan out to everyone we know, self included; the self-send merges
        // as stale and is harmless.
        for target in self.members.addresses() {
            self.transport.send(&self.addr, &target, &bytes);
        }
    }

    fn merge(&mut self, addr: Address, heartbeat: i64) -> MergeOutcome {
        let outcome = self.members.merge(addr, heartbeat, self.clock.now());
        if outcome == MergeOutcome::Inserted {
            tracing::debug!(node = %self.addr, added = %addr, "member discovered");
            self.oplog.node_add(&self.addr, &addr);
        }
        outcome
    }

    pub fn in_group(&self) -> bool {
        self.in_group
    }

    /// Immutable snapshot of the non-suspected member set, the per-tick
    /// view the KV layer builds its ring from.
    pub fn live_members(&self) -> Vec<Address> {
        self.members
            .live_addresses(self.clock.now(), self.fail_timeout)
    }

    pub fn self_heartbeat(&self) -> i64 {
        self.members.self_entry().heartbeat
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn knows(&self, addr: &Address) -> bool {
        self.members.contains(addr)
    }

    #[cfg(test)]
    pub(crate) fn members(&self) -> &MemberList {
        &self.members
    }
}
