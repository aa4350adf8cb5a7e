// Demo driver: boot a simulated cluster, run a small CRUD workload,
// crash a node, and report what the operation log saw.

use rand::{rngs::StdRng, Rng, SeedableRng};

use gossipdb::kv::message::KvOp;
use gossipdb::{Address, ProtocolConfig, Result, SimNetConfig, Simulation};

const NODE_COUNT: i32 = 8;
const KEY_COUNT: usize = 24;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let config = ProtocolConfig::default();
    let mut sim = Simulation::new(config.clone(), SimNetConfig::default());
    let mut rng = StdRng::seed_from_u64(42);

    // Staggered joins through the introducer.
    for id in 1..=NODE_COUNT {
        sim.add_node(Address::new(id, 0))?;
        sim.run(2);
    }
    sim.run(30);
    let members = sim
        .node(config.introducer)
        .map(|node| node.membership().member_count())
        .unwrap_or(0);
    tracing::info!(nodes = NODE_COUNT, members, tick = sim.now(), "cluster converged");

    let keys: Vec<String> = (0..KEY_COUNT).map(|i| format!("key{i}")).collect();
    let coordinator = |rng: &mut StdRng| Address::new(rng.random_range(1..=NODE_COUNT), 0);

    for (i, key) in keys.iter().enumerate() {
        let from = coordinator(&mut rng);
        sim.create(from, key, &format!("value{i}"))?;
        sim.run(1);
    }
    sim.run(15);

    // Crash one non-introducer node mid-workload.
    let victim = Address::new(NODE_COUNT / 2 + 1, 0);
    tracing::info!(node = %victim, tick = sim.now(), "crashing node");
    sim.fail_node(victim);

    for key in &keys {
        let from = loop {
            let addr = coordinator(&mut rng);
            if addr != victim {
                break addr;
            }
        };
        sim.read(from, key)?;
        sim.run(1);
    }
    sim.run((config.remove_timeout + config.quorum_timeout) as u64 + 10);

    let oplog = sim.oplog();
    let (delivered, dropped) = sim.network().stats();
    tracing::info!(
        tick = sim.now(),
        creates_ok = oplog.coordinator_events(KvOp::Create, true).len(),
        creates_failed = oplog.coordinator_events(KvOp::Create, false).len(),
        reads_ok = oplog.coordinator_events(KvOp::Read, true).len(),
        reads_failed = oplog.coordinator_events(KvOp::Read, false).len(),
        removals_observed = oplog.removals().len(),
        frames_delivered = delivered,
        frames_dropped = dropped,
        "run complete"
    );

    let survivors: Vec<String> = sim
        .correct_nodes()
        .map(|node| format!("{}({} keys)", node.addr(), node.store().len()))
        .collect();
    tracing::info!(survivors = ?survivors, "final key distribution");

    Ok(())
}
