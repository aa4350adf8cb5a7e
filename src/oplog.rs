// Operation log contract.
//
// The log sink records membership changes and the terminal outcome of every
// replicated operation, once at the server side per replica and once at the
// coordinator side per transaction. The sink is not assumed idempotent:
// callers emit at most one terminal event per transID.

use parking_lot::Mutex;
use serde::Serialize;

use crate::common::{Address, TransId};
use crate::kv::message::KvOp;

pub trait OpLog: Send + Sync {
    fn node_add(&self, observer: &Address, member: &Address);
    fn node_remove(&self, observer: &Address, member: &Address);

    fn create_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str);
    fn create_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str);
    fn read_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str);
    fn read_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str);
    fn update_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str);
    fn update_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str);
    fn delete_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str);
    fn delete_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str);
}

/// One recorded log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LogEvent {
    NodeAdd {
        observer: Address,
        member: Address,
    },
    NodeRemove {
        observer: Address,
        member: Address,
    },
    Op {
        node: Address,
        coordinator: bool,
        trans_id: TransId,
        op: KvOp,
        success: bool,
        key: String,
        value: Option<String>,
    },
}

/// Sink that keeps every event in memory, for tests and run summaries.
#[derive(Debug, Default)]
pub struct MemoryOpLog {
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryOpLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Coordinator-side terminal events for `op` with the given outcome.
    pub fn coordinator_events(&self, op: KvOp, success: bool) -> Vec<LogEvent> {
        self.filter_ops(op, success, true)
    }

    /// Server-side (replica) events for `op` with the given outcome.
    pub fn server_events(&self, op: KvOp, success: bool) -> Vec<LogEvent> {
        self.filter_ops(op, success, false)
    }

    /// Every terminal event recorded for a transaction.
    pub fn events_for_trans(&self, trans_id: TransId) -> Vec<LogEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, LogEvent::Op { trans_id: t, .. } if *t == trans_id))
            .cloned()
            .collect()
    }

    /// (observer, removed member) pairs, in emission order.
    pub fn removals(&self) -> Vec<(Address, Address)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                LogEvent::NodeRemove { observer, member } => Some((*observer, *member)),
                _ => None,
            })
            .collect()
    }

    pub fn additions(&self) -> Vec<(Address, Address)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                LogEvent::NodeAdd { observer, member } => Some((*observer, *member)),
                _ => None,
            })
            .collect()
    }

    fn filter_ops(&self, op: KvOp, success: bool, coordinator: bool) -> Vec<LogEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    LogEvent::Op { op: o, success: s, coordinator: c, .. }
                        if *o == op && *s == success && *c == coordinator
                )
            })
            .cloned()
            .collect()
    }

    fn record(&self, event: LogEvent) {
        self.events.lock().push(event);
    }

    fn record_op(
        &self,
        node: &Address,
        coordinator: bool,
        trans_id: TransId,
        op: KvOp,
        success: bool,
        key: &str,
        value: Option<&str>,
    ) {
        self.record(LogEvent::Op {
            node: *node,
            coordinator,
            trans_id,
            op,
            success,
            key: key.to_string(),
            value: value.map(str::to_string),
        });
    }
}

impl OpLog for MemoryOpLog {
    fn node_add(&self, observer: &Address, member: &Address) {
        self.record(LogEvent::NodeAdd {
            observer: *observer,
            member: *member,
        });
    }

    fn node_remove(&self, observer: &Address, member: &Address) {
        self.record(LogEvent::NodeRemove {
            observer: *observer,
            member: *member,
        });
    }

    fn create_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str) {
        self.record_op(node, coordinator, trans_id, KvOp::Create, true, key, Some(value));
    }

    fn create_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str) {
        self.record_op(node, coordinator, trans_id, KvOp::Create, false, key, Some(value));
    }

    fn read_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str) {
        self.record_op(node, coordinator, trans_id, KvOp::Read, true, key, Some(value));
    }

    fn read_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str) {
        self.record_op(node, coordinator, trans_id, KvOp::Read, false, key, None);
    }

    fn update_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str) {
        self.record_op(node, coordinator, trans_id, KvOp::Update, true, key, Some(value));
    }

    fn update_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str) {
        self.record_op(node, coordinator, trans_id, KvOp::Update, false, key, Some(value));
    }

    fn delete_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str) {
        self.record_op(node, coordinator, trans_id, KvOp::Delete, true, key, None);
    }

    fn delete_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str) {
        self.record_op(node, coordinator, trans_id, KvOp::Delete, false, key, None);
    }
}

/// Sink that forwards every event to `tracing`.
#[derive(Debug, Default)]
pub struct TracingOpLog;

impl TracingOpLog {
    pub fn new() -> Self {
        Self
    }

    fn op(
        node: &Address,
        coordinator: bool,
        trans_id: TransId,
        op: &str,
        success: bool,
        key: &str,
        value: Option<&str>,
    ) {
        if success {
            tracing::info!(node = %node, coordinator, trans_id, op, key, value, "operation succeeded");
        } else {
            tracing::warn!(node = %node, coordinator, trans_id, op, key, value, "operation failed");
        }
    }
}

impl OpLog for TracingOpLog {
    fn node_add(&self, observer: &Address, member: &Address) {
        tracing::info!(observer = %observer, member = %member, "member added");
    }

    fn node_remove(&self, observer: &Address, member: &Address) {
        tracing::info!(observer = %observer, member = %member, "member removed");
    }

    fn create_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str) {
        Self::op(node, coordinator, trans_id, "create", true, key, Some(value));
    }

    fn create_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str) {
        Self::op(node, coordinator, trans_id, "create", false, key, Some(value));
    }

    fn read_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str) {
        Self::op(node, coordinator, trans_id, "read", true, key, Some(value));
    }

    fn read_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str) {
        Self::op(node, coordinator, trans_id, "read", false, key, None);
    }

    fn update_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str) {
        Self::op(node, coordinator, trans_id, "update", true, key, Some(value));
    }

    fn update_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str, value: &str) {
        Self::op(node, coordinator, trans_id, "update", false, key, Some(value));
    }

    fn delete_success(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str) {
        Self::op(node, coordinator, trans_id, "delete", true, key, None);
    }

    fn delete_fail(&self, node: &Address, coordinator: bool, trans_id: TransId, key: &str) {
        Self::op(node, coordinator, trans_id, "delete", false, key, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log_records_in_order() {
        let log = MemoryOpLog::new();
        let a = Address::new(1, 0);
        let b = Address::new(2, 0);
        log.node_add(&a, &b);
        log.create_success(&a, true, 5, "k", "v");
        log.node_remove(&a, &b);

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            LogEvent::NodeAdd {
                observer: a,
                member: b
            }
        );
        assert_eq!(log.removals(), vec![(a, b)]);
    }

    #[test]
    fn test_event_filters() {
        let log = MemoryOpLog::new();
        let a = Address::new(1, 0);
        log.create_success(&a, true, 1, "k", "v");
        log.create_success(&a, false, 1, "k", "v");
        log.create_fail(&a, true, 2, "k", "v");
        log.read_fail(&a, true, 3, "k");

        assert_eq!(log.coordinator_events(KvOp::Create, true).len(), 1);
        assert_eq!(log.server_events(KvOp::Create, true).len(), 1);
        assert_eq!(log.coordinator_events(KvOp::Create, false).len(), 1);
        assert_eq!(log.coordinator_events(KvOp::Read, false).len(), 1);
        assert_eq!(log.events_for_trans(1).len(), 2);
    }
}
