// Common types shared by the membership and KV layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KvError;

/// Discrete simulation time, in ticks.
pub type Tick = i64;

/// Transaction identifier, unique per coordinator lifetime.
pub type TransId = i32;

/// A node address: 32-bit id followed by a 16-bit port, 6 bytes on the wire.
///
/// Addresses are compared by byte equality; the all-zero address is the
/// null address and never names a live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub id: i32,
    pub port: i16,
}

/// The null (all-zero) address.
pub const NULL_ADDRESS: Address = Address { id: 0, port: 0 };

impl Address {
    pub fn new(id: i32, port: i16) -> Self {
        Self { id, port }
    }

    /// Wire form: id as 4 little-endian bytes, then port as 2.
    pub fn to_bytes(self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[..4].copy_from_slice(&self.id.to_le_bytes());
        out[4..].copy_from_slice(&self.port.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; 6]) -> Self {
        let id = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let port = i16::from_le_bytes([bytes[4], bytes[5]]);
        Self { id, port }
    }

    pub fn is_null(&self) -> bool {
        *self == NULL_ADDRESS
    }
}

// Lexical byte order, so ring tie-breaking matches wire-level comparison.
impl Ord for Address {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}

impl FromStr for Address {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, port) = s
            .split_once(':')
            .ok_or_else(|| KvError::InvalidAddress(s.to_string()))?;
        let id = id
            .parse::<i32>()
            .map_err(|_| KvError::InvalidAddress(s.to_string()))?;
        let port = port
            .parse::<i16>()
            .map_err(|_| KvError::InvalidAddress(s.to_string()))?;
        Ok(Self { id, port })
    }
}
