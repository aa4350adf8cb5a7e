// Emulated runtime: a set of nodes sharing one simulated network and one
// discrete clock, advanced in lockstep one tick at a time. Within a tick,
// nodes run in join order; within a node there is no interleaving.

use std::sync::Arc;

use crate::common::{Address, TransId};
use crate::config::ProtocolConfig;
use crate::error::{KvError, Result};
use crate::node::Node;
use crate::oplog::MemoryOpLog;
use crate::transport::{Clock, SimClock, SimNetConfig, SimNetwork};

pub struct Simulation {
    config: ProtocolConfig,
    clock: Arc<SimClock>,
    network: Arc<SimNetwork>,
    oplog: Arc<MemoryOpLog>,
    nodes: Vec<Node>,
}

impl Simulation {
    pub fn new(config: ProtocolConfig, net_config: SimNetConfig) -> Simulation {
        Simulation {
            config,
            clock: Arc::new(SimClock::new()),
            network: Arc::new(SimNetwork::new(net_config)),
            oplog: Arc::new(MemoryOpLog::new()),
            nodes: Vec::new(),
        }
    }

    /// Create a node and immediately ask it to join.
    pub fn add_node(&mut self, addr: Address) -> Result<()> {
        let mut node = Node::new(
            addr,
            self.config.clone(),
            self.network.clone(),
            self.clock.clone(),
            self.oplog.clone(),
        )?;
        node.start();
        self.nodes.push(node);
        Ok(())
    }

    /// Advance the whole cluster by `ticks`.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            for node in &mut self.nodes {
                node.tick();
            }
            self.clock.advance();
        }
    }

    pub fn fail_node(&mut self, addr: Address) {
        if let Some(node) = self.node_mut(addr) {
            node.fail();
        }
    }

    pub fn node(&self, addr: Address) -> Option<&Node> {
        self.nodes.iter().find(|node| node.addr() == addr)
    }

    pub fn node_mut(&mut self, addr: Address) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.addr() == addr)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Live (non-failed) nodes, the set assertions quantify over.
    pub fn correct_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|node| node.state() != crate::node::NodeState::Failed)
    }

    pub fn create(&mut self, coordinator: Address, key: &str, value: &str) -> Result<TransId> {
        self.with_node(coordinator, |node| node.client_create(key, value))
    }

    pub fn read(&mut self, coordinator: Address, key: &str) -> Result<TransId> {
        self.with_node(coordinator, |node| node.client_read(key))
    }

    pub fn update(&mut self, coordinator: Address, key: &str, value: &str) -> Result<TransId> {
        self.with_node(coordinator, |node| node.client_update(key, value))
    }

    pub fn delete(&mut self, coordinator: Address, key: &str) -> Result<TransId> {
        self.with_node(coordinator, |node| node.client_delete(key))
    }

    fn with_node(
        &mut self,
        addr: Address,
        f: impl FnOnce(&mut Node) -> Result<TransId>,
    ) -> Result<TransId> {
        let node = self
            .node_mut(addr)
            .ok_or_else(|| KvError::InvalidAddress(addr.to_string()))?;
        f(node)
    }

    pub fn oplog(&self) -> &MemoryOpLog {
        &self.oplog
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }
}
