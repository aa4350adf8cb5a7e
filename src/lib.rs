// GossipDB - distributed in-memory key-value store
//
// Two coupled layers per node: a gossip-based membership protocol that
// maintains an eventually-consistent view of live peers, and a replicated
// KV layer that places every key on three successive nodes of a
// consistent-hash ring and runs client operations under a 2-of-3 quorum.
// Nodes run single-threaded on a discrete tick scheduler over a simulated
// best-effort transport.

pub mod common;
pub mod config;
pub mod error;
pub mod kv;
pub mod membership;
pub mod node;
pub mod oplog;
pub mod ring;
pub mod sim;
pub mod transport;

pub use common::{Address, Tick, TransId, NULL_ADDRESS};
pub use config::ProtocolConfig;
pub use error::{KvError, Result};
pub use kv::{KvMessage, KvOp, KvStore, QuorumCoordinator, Stabilizer};
pub use membership::{MemberList, MembershipProtocol};
pub use node::{Node, NodeState};
pub use oplog::{LogEvent, MemoryOpLog, OpLog, TracingOpLog};
pub use ring::{ReplicaRole, Ring, RingNode, REPLICA_COUNT};
pub use sim::Simulation;
pub use transport::{Clock, SimClock, SimNetConfig, SimNetwork, Transport};
