// Gossip-based membership and failure detection.
//
// Each node maintains a list of peers with per-peer heartbeats and local
// timestamps. Heartbeats are advertised by periodic gossip fan-out; an
// entry whose timestamp ages past the suspicion threshold stops being
// advertised and drops off the ring, and past the removal threshold it is
// deleted from the list. In the absence of message loss a crashed peer is
// removed at every correct node within the removal threshold plus the
// gossip propagation delay.

pub mod entry;
pub mod protocol;
pub mod wire;

pub use entry::{MemberEntry, MemberList, MergeOutcome};
pub use protocol::MembershipProtocol;
pub use wire::MembershipFrame;
