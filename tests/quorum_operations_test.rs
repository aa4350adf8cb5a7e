// Quorum Operation Integration Tests
//
// Drives client CRUD through simulated clusters: happy-path quorums,
// replica failures on both sides of the majority line, deadline expiry
// on undersized rings, and stabilization repairing replicas after a
// crash.

use gossipdb::kv::message::KvOp;
use gossipdb::oplog::LogEvent;
use gossipdb::{Address, ProtocolConfig, SimNetConfig, Simulation};

fn addr(id: i32) -> Address {
    Address::new(id, 0)
}

fn stable_cluster(count: i32) -> Simulation {
    let mut sim = Simulation::new(ProtocolConfig::default(), SimNetConfig::default());
    for id in 1..=count {
        sim.add_node(addr(id)).unwrap();
        sim.run(1);
    }
    sim.run(20);
    sim
}

/// Addresses of the replicas of `key`, as placed by the introducer's ring.
fn replicas_of(sim: &Simulation, key: &str) -> Vec<Address> {
    sim.node(addr(1))
        .unwrap()
        .ring()
        .replicas_of(key)
        .unwrap()
        .iter()
        .map(|node| node.addr)
        .collect()
}

#[test]
fn test_create_reaches_quorum() {
    let mut sim = stable_cluster(5);
    let expected = replicas_of(&sim, "a");

    sim.create(addr(2), "a", "1").unwrap();
    sim.run(4);

    // Each replica applied and logged the create; the coordinator logged
    // success exactly once and erased the tracker.
    let server_ok = sim.oplog().server_events(KvOp::Create, true);
    assert_eq!(server_ok.len(), 3);
    for event in &server_ok {
        match event {
            LogEvent::Op { node, .. } => assert!(expected.contains(node)),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(sim.oplog().coordinator_events(KvOp::Create, true).len(), 1);
    assert_eq!(sim.node(addr(2)).unwrap().pending_operations(), 0);

    // Only the replicas hold the key.
    for node in sim.correct_nodes() {
        assert_eq!(
            node.store().contains_key("a"),
            expected.contains(&node.addr())
        );
    }
}

#[test]
fn test_read_returns_written_value() {
    let mut sim = stable_cluster(5);
    sim.create(addr(2), "fruit", "mango").unwrap();
    sim.run(4);

    sim.read(addr(4), "fruit").unwrap();
    sim.run(4);

    let events = sim.oplog().coordinator_events(KvOp::Read, true);
    assert_eq!(events.len(), 1);
    match &events[0] {
        LogEvent::Op { value, .. } => assert_eq!(value.as_deref(), Some("mango")),
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_update_then_read_sees_new_value() {
    let mut sim = stable_cluster(5);
    sim.create(addr(2), "k", "old").unwrap();
    sim.run(4);
    sim.update(addr(3), "k", "new").unwrap();
    sim.run(4);
    sim.read(addr(5), "k").unwrap();
    sim.run(4);

    assert_eq!(sim.oplog().coordinator_events(KvOp::Update, true).len(), 1);
    let reads = sim.oplog().coordinator_events(KvOp::Read, true);
    assert_eq!(reads.len(), 1);
    match &reads[0] {
        LogEvent::Op { value, .. } => assert_eq!(value.as_deref(), Some("new")),
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_delete_then_read_fails() {
    let mut sim = stable_cluster(5);
    sim.create(addr(2), "k", "v").unwrap();
    sim.run(4);
    sim.delete(addr(3), "k").unwrap();
    sim.run(4);
    assert_eq!(sim.oplog().coordinator_events(KvOp::Delete, true).len(), 1);

    sim.read(addr(2), "k").unwrap();
    sim.run(4);
    assert_eq!(sim.oplog().coordinator_events(KvOp::Read, false).len(), 1);
}

#[test]
fn test_update_of_absent_key_fails() {
    let mut sim = stable_cluster(5);
    sim.update(addr(2), "ghost", "v").unwrap();
    sim.run(4);
    assert_eq!(sim.oplog().coordinator_events(KvOp::Update, false).len(), 1);
}

#[test]
fn test_minority_replica_failure_still_succeeds() {
    let mut sim = stable_cluster(5);
    let replicas = replicas_of(&sim, "k");

    // Crash one replica, coordinate from a non-replica.
    let victim = replicas[2];
    let coordinator = (1..=5)
        .map(addr)
        .find(|a| !replicas.contains(a))
        .unwrap();
    sim.fail_node(victim);
    sim.create(coordinator, "k", "v").unwrap();
    sim.run(4);

    assert_eq!(sim.oplog().coordinator_events(KvOp::Create, true).len(), 1);
    assert_eq!(sim.oplog().server_events(KvOp::Create, true).len(), 2);
}

#[test]
fn test_majority_replica_failure_times_out() {
    let mut sim = stable_cluster(5);
    let replicas = replicas_of(&sim, "k");
    let coordinator = (1..=5)
        .map(addr)
        .find(|a| !replicas.contains(a))
        .unwrap();

    sim.fail_node(replicas[0]);
    sim.fail_node(replicas[1]);
    sim.create(coordinator, "k", "v").unwrap();

    let quorum_timeout = sim.config().quorum_timeout as u64;
    sim.run(quorum_timeout + 3);

    assert_eq!(sim.oplog().coordinator_events(KvOp::Create, false).len(), 1);
    assert_eq!(sim.oplog().coordinator_events(KvOp::Create, true).len(), 0);
    assert_eq!(sim.node(coordinator).unwrap().pending_operations(), 0);
}

#[test]
fn test_undersized_ring_times_out() {
    let mut sim = Simulation::new(ProtocolConfig::default(), SimNetConfig::default());
    sim.add_node(addr(1)).unwrap();
    sim.add_node(addr(2)).unwrap();
    sim.run(10);

    sim.create(addr(1), "k", "v").unwrap();
    let quorum_timeout = sim.config().quorum_timeout as u64;
    sim.run(quorum_timeout + 3);

    assert_eq!(sim.oplog().coordinator_events(KvOp::Create, false).len(), 1);
    assert!(sim.oplog().server_events(KvOp::Create, true).is_empty());
}

#[test]
fn test_stabilization_restores_reads_after_replica_crash() {
    let mut sim = stable_cluster(5);

    // Pick a key primaried on a node we can crash without losing the
    // coordinator.
    let key = (0..200)
        .map(|i| format!("key{i}"))
        .find(|key| replicas_of(&sim, key)[0] != addr(1))
        .unwrap();
    let primary = replicas_of(&sim, &key)[0];

    sim.create(addr(1), &key, "payload").unwrap();
    sim.run(4);
    assert_eq!(sim.oplog().coordinator_events(KvOp::Create, true).len(), 1);

    sim.fail_node(primary);
    let repair_window = sim.config().remove_timeout as u64 + 12;
    sim.run(repair_window);

    // The surviving replicas re-placed the key; a quorum of the new
    // replica set answers the read.
    sim.read(addr(1), &key).unwrap();
    sim.run(4);

    let reads = sim.oplog().coordinator_events(KvOp::Read, true);
    assert_eq!(reads.len(), 1);
    match &reads[0] {
        LogEvent::Op { value, .. } => assert_eq!(value.as_deref(), Some("payload")),
        other => panic!("unexpected event {other:?}"),
    }

    // Replica invariant after repair: exactly the current replica set
    // holds the key.
    let current = replicas_of(&sim, &key);
    for node in sim.correct_nodes() {
        assert_eq!(
            node.store().contains_key(&key),
            current.contains(&node.addr()),
            "{} holds the wrong replica state",
            node.addr()
        );
    }
}

#[test]
fn test_trans_ids_are_unique_per_coordinator() {
    let mut sim = stable_cluster(5);
    let a = sim.create(addr(2), "x", "1").unwrap();
    let b = sim.create(addr(2), "y", "2").unwrap();
    let c = sim.read(addr(2), "x").unwrap();
    assert!(a != b && b != c && a != c);
    sim.run(6);
    assert_eq!(sim.node(addr(2)).unwrap().pending_operations(), 0);
}
