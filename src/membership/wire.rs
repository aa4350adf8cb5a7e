// Membership frame codec.
//
// Every frame opens with a 4-byte little-endian type word. Join frames
// carry an address, one byte of padding, and a heartbeat; gossip frames
// carry a counted list of (id, port, heartbeat) records. Decode never
// panics: a short, malformed, or unknown frame is a `KvError::Decode`
// value and the caller drops it without advancing any state.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::Address;
use crate::error::{KvError, Result};

const MSG_JOINREQ: u32 = 0;
const MSG_JOINREP: u32 = 1;
const MSG_GOSSIP: u32 = 2;

const ADDR_LEN: usize = 6;
const JOIN_PAYLOAD_LEN: usize = ADDR_LEN + 1 + 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipFrame {
    JoinReq { addr: Address, heartbeat: i64 },
    JoinRep { addr: Address, heartbeat: i64 },
    Gossip { entries: Vec<(Address, i64)> },
}

impl MembershipFrame {
    pub fn encode(&self) -> Bytes {
        match self {
            MembershipFrame::JoinReq { addr, heartbeat } => {
                encode_join(MSG_JOINREQ, addr, *heartbeat)
            }
            MembershipFrame::JoinRep { addr, heartbeat } => {
                encode_join(MSG_JOINREP, addr, *heartbeat)
            }
            MembershipFrame::Gossip { entries } => {
                let mut buf = BytesMut::with_capacity(4 + 4 + entries.len() * 14);
                buf.put_u32_le(MSG_GOSSIP);
                buf.put_i32_le(entries.len() as i32);
                for (addr, heartbeat) in entries {
                    buf.put_i32_le(addr.id);
                    buf.put_i16_le(addr.port);
                    buf.put_i64_le(*heartbeat);
                }
                buf.freeze()
            }
        }
    }

    pub fn decode(data: &[u8]) -> Result<MembershipFrame> {
        let mut buf = data;
        if buf.remaining() < 4 {
            return Err(KvError::Decode("membership frame shorter than header".into()));
        }
        match buf.get_u32_le() {
            MSG_JOINREQ => {
                let (addr, heartbeat) = decode_join(buf)?;
                Ok(MembershipFrame::JoinReq { addr, heartbeat })
            }
            MSG_JOINREP => {
                let (addr, heartbeat) = decode_join(buf)?;
                Ok(MembershipFrame::JoinRep { addr, heartbeat })
            }
            MSG_GOSSIP => {
                if buf.remaining() < 4 {
                    return Err(KvError::Decode("gossip frame missing count".into()));
                }
                let count = buf.get_i32_le();
                if count < 0 {
                    return Err(KvError::Decode("negative gossip entry count".into()));
                }
                let count = count as usize;
                if buf.remaining() < count * 14 {
                    return Err(KvError::Decode("gossip frame truncated".into()));
                }
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let id = buf.get_i32_le();
                    let port = buf.get_i16_le();
                    let heartbeat = buf.get_i64_le();
                    entries.push((Address::new(id, port), heartbeat));
                }
                Ok(MembershipFrame::Gossip { entries })
            }
            other => Err(KvError::Decode(format!(
                "unknown membership frame type {other}"
            ))),
        }
    }

    /// Whether a raw frame belongs to the membership layer. Membership
    /// frames open with a little-endian type word of at most `GOSSIP`,
    /// whose first byte is unprintable; KV frames are ASCII text starting
    /// with a decimal transID, so the first four bytes disambiguate.
    pub fn is_membership_frame(data: &[u8]) -> bool {
        data.len() >= 4
            && u32::from_le_bytes([data[0], data[1], data[2], data[3]]) <= MSG_GOSSIP
    }
}

fn encode_join(msg_type: u32, addr: &Address, heartbeat: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + JOIN_PAYLOAD_LEN);
    buf.put_u32_le(msg_type);
    buf.put_slice(&addr.to_bytes());
    buf.put_u8(0);
    buf.put_i64_le(heartbeat);
    buf.freeze()
}

fn decode_join(mut buf: &[u8]) -> Result<(Address, i64)> {
    if buf.remaining() < JOIN_PAYLOAD_LEN {
        return Err(KvError::Decode("join frame truncated".into()));
    }
    let mut addr_bytes = [0u8; ADDR_LEN];
    buf.copy_to_slice(&mut addr_bytes);
    buf.advance(1);
    let heartbeat = buf.get_i64_le();
    Ok((Address::from_bytes(&addr_bytes), heartbeat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_round_trip() {
        for frame in [
            MembershipFrame::JoinReq {
                addr: Address::new(3, 1),
                heartbeat: 17,
            },
            MembershipFrame::JoinRep {
                addr: Address::new(1, 0),
                heartbeat: 0,
            },
        ] {
            let decoded = MembershipFrame::decode(&frame.encode()).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn test_join_frame_layout() {
        let frame = MembershipFrame::JoinReq {
            addr: Address::new(2, 0),
            heartbeat: 1,
        };
        let bytes = frame.encode();
        // type word + addr + pad + heartbeat
        assert_eq!(bytes.len(), 4 + 6 + 1 + 8);
        assert_eq!(&bytes[..4], &[0, 0, 0, 0]);
        assert_eq!(bytes[10], 0);
    }

    #[test]
    fn test_gossip_round_trip() {
        let frame = MembershipFrame::Gossip {
            entries: vec![
                (Address::new(1, 0), 5),
                (Address::new(2, 0), 9),
                (Address::new(3, 2), 0),
            ],
        };
        assert_eq!(MembershipFrame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn test_empty_gossip_round_trip() {
        let frame = MembershipFrame::Gossip { entries: vec![] };
        assert_eq!(MembershipFrame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn test_decode_rejects_short_and_unknown_frames() {
        assert!(MembershipFrame::decode(&[]).is_err());
        assert!(MembershipFrame::decode(&[0, 0]).is_err());
        assert!(MembershipFrame::decode(&[9, 0, 0, 0]).is_err());

        // Truncated join payload.
        let mut bytes = MembershipFrame::JoinReq {
            addr: Address::new(2, 0),
            heartbeat: 1,
        }
        .encode()
        .to_vec();
        bytes.truncate(bytes.len() - 3);
        assert!(MembershipFrame::decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_truncated_gossip() {
        let mut bytes = MembershipFrame::Gossip {
            entries: vec![(Address::new(1, 0), 5)],
        }
        .encode()
        .to_vec();
        bytes.truncate(bytes.len() - 1);
        assert!(MembershipFrame::decode(&bytes).is_err());
    }

    #[test]
    fn test_layer_classification() {
        let membership = MembershipFrame::Gossip { entries: vec![] }.encode();
        assert!(MembershipFrame::is_membership_frame(&membership));
        assert!(!MembershipFrame::is_membership_frame(b"12::1:0::4::1"));
        assert!(!MembershipFrame::is_membership_frame(b""));
    }
}
