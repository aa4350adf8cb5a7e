// Protocol configuration. All thresholds are expressed in ticks of the
// discrete clock; defaults follow the emulated runtime's values.

use serde::{Deserialize, Serialize};

use crate::common::{Address, Tick};
use crate::error::{KvError, Result};

/// Tunables for the membership and KV layers of a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Ticks between gossip rounds (the ping counter reset value).
    pub gossip_period: Tick,
    /// Age at which a member entry becomes suspected and stops being
    /// advertised or placed on the ring.
    pub fail_timeout: Tick,
    /// Age at which a suspected entry is removed from the member list.
    /// Must exceed `fail_timeout`.
    pub remove_timeout: Tick,
    /// Deadline for a quorum tracker; expiry finalizes the operation as
    /// failed.
    pub quorum_timeout: Tick,
    /// Modulus of the consistent-hash ring.
    pub ring_size: u64,
    /// Well-known bootstrap node that new members contact to join.
    pub introducer: Address,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            gossip_period: 2,
            fail_timeout: 10,
            remove_timeout: 20,
            quorum_timeout: 10,
            ring_size: 512,
            introducer: Address::new(1, 0),
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.gossip_period < 0 {
            return Err(KvError::Configuration(
                "gossip_period must be non-negative".into(),
            ));
        }
        if self.fail_timeout >= self.remove_timeout {
            return Err(KvError::Configuration(
                "fail_timeout must be less than remove_timeout".into(),
            ));
        }
        // A node refreshes its own timestamp once per gossip round; the
        // suspicion window must be wider than that or the node suspects
        // itself between rounds.
        if self.gossip_period + 1 >= self.fail_timeout {
            return Err(KvError::Configuration(
                "fail_timeout must exceed the gossip round length".into(),
            ));
        }
        if self.quorum_timeout <= 0 {
            return Err(KvError::Configuration(
                "quorum_timeout must be positive".into(),
            ));
        }
        if self.ring_size == 0 {
            return Err(KvError::Configuration("ring_size must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProtocolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_timeouts() {
        let config = ProtocolConfig {
            fail_timeout: 30,
            remove_timeout: 20,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_gossip_period_wider_than_suspicion() {
        let config = ProtocolConfig {
            gossip_period: 10,
            fail_timeout: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ProtocolConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ProtocolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ring_size, config.ring_size);
        assert_eq!(back.introducer, config.introducer);
    }
}
