//! Simulator binary: load a config, generate a workload, run, report.

use tracing::info;
use tracing_subscriber::EnvFilter;

use oxbow_common::SimConfig;
use oxbow_sim::{Simulation, WorkloadGenerator};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(&path)?)?,
        None => SimConfig::default(),
    };
    config.validate()?;

    info!(
        fanout = config.fanout,
        memory_nodes = config.num_memory_nodes,
        key_range = config.key_range,
        read_ratio = config.read_ratio,
        "starting simulation"
    );

    let ops: Vec<_> = WorkloadGenerator::new(&config, 0).collect();
    info!(operations = ops.len(), "workload generated");

    let mut sim = Simulation::new(config)?;
    sim.enqueue_workload(ops);
    sim.run()?;

    let tree = sim.compute().tree();
    info!(
        height = tree.height,
        nodes_allocated = tree.next_id,
        "final tree shape"
    );
    info!("{}", sim.stats().summary());
    for server in sim.memory() {
        let stats = server.stats();
        info!(
            server = %server.index(),
            reads = stats.reads,
            writes = stats.writes,
            rejected = stats.rejected,
            "memory node counters"
        );
    }
    Ok(())
}
