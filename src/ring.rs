// Consistent-hash ring and replica placement.
//
// The ring is rebuilt every tick from the non-suspected member set: each
// live address is hashed onto a fixed-size circle and the nodes are kept
// in ascending hash order. A key is owned by the first node at or past
// the key's hash position, wrapping at the top, and is replicated on the
// next two nodes in ring order. Placement is a pure function of the key
// and the ring, so any two nodes observing the same ring agree on the
// replica triple.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::common::Address;

/// Fixed replication factor.
pub const REPLICA_COUNT: usize = 3;

/// Position of a replica within a key's triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaRole {
    Primary,
    Secondary,
    Tertiary,
}

impl ReplicaRole {
    pub fn of_index(index: usize) -> ReplicaRole {
        match index {
            0 => ReplicaRole::Primary,
            1 => ReplicaRole::Secondary,
            _ => ReplicaRole::Tertiary,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            ReplicaRole::Primary => 0,
            ReplicaRole::Secondary => 1,
            ReplicaRole::Tertiary => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<ReplicaRole> {
        match tag {
            0 => Some(ReplicaRole::Primary),
            1 => Some(ReplicaRole::Secondary),
            2 => Some(ReplicaRole::Tertiary),
            _ => None,
        }
    }
}

/// A member placed on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingNode {
    pub addr: Address,
    pub hash: u64,
}

/// Sorted, deterministic hash ring over the live members.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ring {
    nodes: Vec<RingNode>,
    ring_size: u64,
}

/// Hash a key to its position on a ring of the given modulus.
pub fn hash_key(key: &str, ring_size: u64) -> u64 {
    hash_bytes(key.as_bytes(), ring_size)
}

fn hash_bytes(data: &[u8], ring_size: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish() % ring_size
}

impl Ring {
    /// Build a ring from a member snapshot. Hash ties break on lexical
    /// address order so every node sorts identically.
    pub fn build(members: &[Address], ring_size: u64) -> Ring {
        let mut nodes: Vec<RingNode> = members
            .iter()
            .map(|addr| RingNode {
                addr: *addr,
                hash: hash_bytes(&addr.to_bytes(), ring_size),
            })
            .collect();
        nodes.sort_by(|a, b| a.hash.cmp(&b.hash).then_with(|| a.addr.cmp(&b.addr)));
        Ring { nodes, ring_size }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[RingNode] {
        &self.nodes
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.nodes.iter().any(|node| node.addr == *addr)
    }

    /// The replica triple for `key`, primary first, or `None` while the
    /// ring is too small for placement to be defined.
    pub fn replicas_of(&self, key: &str) -> Option<[RingNode; REPLICA_COUNT]> {
        if self.nodes.len() < REPLICA_COUNT {
            return None;
        }
        let position = hash_key(key, self.ring_size);
        let start = self
            .nodes
            .partition_point(|node| node.hash < position)
            % self.nodes.len();
        Some([
            self.nodes[start],
            self.nodes[(start + 1) % self.nodes.len()],
            self.nodes[(start + 2) % self.nodes.len()],
        ])
    }

    /// Up to `count` successors of `addr` in ring order, nearest first.
    /// Empty when `addr` is not on the ring.
    pub fn successors_of(&self, addr: &Address, count: usize) -> Vec<Address> {
        self.walk_from(addr, count, |index, step, len| (index + step) % len)
    }

    /// Up to `count` predecessors of `addr` in ring order, nearest first.
    pub fn predecessors_of(&self, addr: &Address, count: usize) -> Vec<Address> {
        self.walk_from(addr, count, |index, step, len| (index + len - step) % len)
    }

    fn walk_from(
        &self,
        addr: &Address,
        count: usize,
        step_fn: impl Fn(usize, usize, usize) -> usize,
    ) -> Vec<Address> {
        let Some(index) = self.nodes.iter().position(|node| node.addr == *addr) else {
            return Vec::new();
        };
        let len = self.nodes.len();
        (1..=count.min(len.saturating_sub(1)))
            .map(|step| self.nodes[step_fn(index, step, len)].addr)
            .collect()
    }
}
