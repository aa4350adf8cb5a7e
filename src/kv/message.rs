// KV wire protocol: text-framed records with `::`-separated fields,
// tagged by a numeric message type.
//
//   request    transID::fromAddr::type::key[::value::replicaRole]
//   REPLY      transID::fromAddr::4::success(0|1)
//   READREPLY  transID::fromAddr::5::value
//
// Create and update requests carry the value and the target's replica
// role; read and delete requests end at the key. An empty READREPLY value
// denotes not-found. Keys and values must not contain the field
// separator.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::common::{Address, TransId};
use crate::error::{KvError, Result};
use crate::ring::ReplicaRole;

const SEPARATOR: &str = "::";

const TAG_REPLY: u8 = 4;
const TAG_READREPLY: u8 = 5;

/// Client-visible CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOp {
    Create,
    Read,
    Update,
    Delete,
}

impl KvOp {
    pub fn tag(self) -> u8 {
        match self {
            KvOp::Create => 0,
            KvOp::Read => 1,
            KvOp::Update => 2,
            KvOp::Delete => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<KvOp> {
        match tag {
            0 => Some(KvOp::Create),
            1 => Some(KvOp::Read),
            2 => Some(KvOp::Update),
            3 => Some(KvOp::Delete),
            _ => None,
        }
    }

    /// Whether requests of this op carry a value and replica role.
    pub fn carries_value(self) -> bool {
        matches!(self, KvOp::Create | KvOp::Update)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvMessage {
    Request {
        trans_id: TransId,
        from: Address,
        op: KvOp,
        key: String,
        value: Option<String>,
        role: Option<ReplicaRole>,
    },
    Reply {
        trans_id: TransId,
        from: Address,
        success: bool,
    },
    ReadReply {
        trans_id: TransId,
        from: Address,
        value: String,
    },
}

impl KvMessage {
    pub fn encode(&self) -> Bytes {
        let text = match self {
            KvMessage::Request {
                trans_id,
                from,
                op,
                key,
                value,
                role,
            } => {
                if op.carries_value() {
                    format!(
                        "{}::{}::{}::{}::{}::{}",
                        trans_id,
                        from,
                        op.tag(),
                        key,
                        value.as_deref().unwrap_or(""),
                        role.unwrap_or(ReplicaRole::Primary).tag(),
                    )
                } else {
                    format!("{}::{}::{}::{}", trans_id, from, op.tag(), key)
                }
            }
            KvMessage::Reply {
                trans_id,
                from,
                success,
            } => format!(
                "{}::{}::{}::{}",
                trans_id,
                from,
                TAG_REPLY,
                u8::from(*success)
            ),
            KvMessage::ReadReply {
                trans_id,
                from,
                value,
            } => format!("{}::{}::{}::{}", trans_id, from, TAG_READREPLY, value),
        };
        Bytes::from(text)
    }

    pub fn decode(data: &[u8]) -> Result<KvMessage> {
        let text = std::str::from_utf8(data)
            .map_err(|_| KvError::Decode("kv frame is not utf-8".into()))?;
        let fields: Vec<&str> = text.split(SEPARATOR).collect();
        if fields.len() < 4 {
            return Err(KvError::Decode(format!(
                "kv frame has {} fields, expected at least 4",
                fields.len()
            )));
        }

        let trans_id: TransId = fields[0]
            .parse()
            .map_err(|_| KvError::Decode(format!("bad transID {:?}", fields[0])))?;
        let from: Address = fields[1].parse()?;
        let tag: u8 = fields[2]
            .parse()
            .map_err(|_| KvError::Decode(format!("bad message type {:?}", fields[2])))?;

        match tag {
            TAG_REPLY => {
                let success = match fields[3] {
                    "0" => false,
                    "1" => true,
                    other => {
                        return Err(KvError::Decode(format!("bad success flag {other:?}")))
                    }
                };
                Ok(KvMessage::Reply {
                    trans_id,
                    from,
                    success,
                })
            }
            TAG_READREPLY => Ok(KvMessage::ReadReply {
                trans_id,
                from,
                value: fields[3..].join(SEPARATOR),
            }),
            tag => {
                let op = KvOp::from_tag(tag)
                    .ok_or_else(|| KvError::Decode(format!("unknown kv message type {tag}")))?;
                let (value, role) = if op.carries_value() {
                    if fields.len() != 6 {
                        return Err(KvError::Decode(format!(
                            "{op:?} request has {} fields, expected 6",
                            fields.len()
                        )));
                    }
                    let role_tag: u8 = fields[5]
                        .parse()
                        .map_err(|_| KvError::Decode(format!("bad replica role {:?}", fields[5])))?;
                    let role = ReplicaRole::from_tag(role_tag).ok_or_else(|| {
                        KvError::Decode(format!("unknown replica role {role_tag}"))
                    })?;
                    (Some(fields[4].to_string()), Some(role))
                } else {
                    if fields.len() != 4 {
                        return Err(KvError::Decode(format!(
                            "{op:?} request has {} fields, expected 4",
                            fields.len()
                        )));
                    }
                    (None, None)
                };
                Ok(KvMessage::Request {
                    trans_id,
                    from,
                    op,
                    key: fields[3].to_string(),
                    value,
                    role,
                })
            }
        }
    }
}
