//! Simulation wiring: compute node, memory nodes, and the event loop.

use bytes::Bytes;
use tracing::{debug, info};

use oxbow_common::{
    AddressMap, MemRequest, MemResponse, MemoryNodeIndex, NodeAddress, OpKind, Result, RespError,
    SimConfig, SimTime,
};
use oxbow_compute::{Completion, ComputeNode};
use oxbow_memnode::MemoryServer;

use crate::executor::{Event, EventQueue};
use crate::stats::SimStats;
use crate::workload::WorkloadOp;

/// One simulation instance: a compute node driving a B+tree spread over
/// `M` memory nodes, all advanced by a single discrete-event loop.
///
/// Requests are routed to the memory node owning their address; requests
/// whose address falls outside every slab are answered with an
/// error-tagged response by the transport itself. Each hop costs the
/// configured latency.
pub struct Simulation {
    config: SimConfig,
    map: AddressMap,
    queue: EventQueue,
    compute: ComputeNode,
    memory: Vec<MemoryServer>,
    stats: SimStats,
    completions: Vec<Completion>,
    now: SimTime,
}

impl Simulation {
    /// Builds a simulation and bootstraps the tree (the compute node
    /// writes the empty root before any operation runs).
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let map = config.address_map();
        let memory = (0..config.num_memory_nodes)
            .map(|m| MemoryServer::new(MemoryNodeIndex(m), map.slab_range(MemoryNodeIndex(m))))
            .collect();
        let mut compute = ComputeNode::new(0, config.fanout, map.clone());
        compute.initialize();

        let mut sim = Self {
            config,
            map,
            queue: EventQueue::new(),
            compute,
            memory,
            stats: SimStats::default(),
            completions: Vec::new(),
            now: 0,
        };
        sim.flush_outbox();
        Ok(sim)
    }

    /// Schedules a batch of operations at their timestamps.
    pub fn enqueue_workload<I: IntoIterator<Item = WorkloadOp>>(&mut self, ops: I) {
        for op in ops {
            self.queue.push(op.timestamp, Event::Dispatch(op));
        }
    }

    /// Drives the event loop until no events remain.
    pub fn run(&mut self) -> Result<()> {
        while let Some(scheduled) = self.queue.pop() {
            self.now = scheduled.time;
            match scheduled.event {
                Event::Dispatch(op) => {
                    debug!(time = self.now, kind = %op.kind, key = op.key, "dispatch");
                    match op.kind {
                        OpKind::Insert => self.compute.start_insert(self.now, op.key, op.value),
                        OpKind::Search => self.compute.start_search(self.now, op.key),
                        OpKind::Delete => self.compute.start_delete(self.now, op.key),
                        OpKind::SplitLeaf | OpKind::SplitInternal => {}
                    }
                    self.flush_outbox();
                }
                Event::Request { dest, req } => {
                    let resp = self.memory[dest.0 as usize].handle(req);
                    self.queue
                        .push(self.now + self.config.mem_latency_ns, Event::Response(resp));
                }
                Event::Response(resp) => {
                    self.compute.handle_response(self.now, resp)?;
                    for completion in self.compute.drain_completions() {
                        self.stats.record(&completion);
                        self.completions.push(completion);
                    }
                    self.flush_outbox();
                }
            }
        }
        info!(time = self.now, "simulation drained: {}", self.stats.summary());
        Ok(())
    }

    /// Routes freshly issued requests, one latency hop out. Unroutable
    /// addresses are bounced straight back as errors.
    fn flush_outbox(&mut self) {
        for req in self.compute.drain_outbox() {
            let deliver_at = self.now + self.config.mem_latency_ns;
            match self.map.route(req.addr()) {
                Ok(dest) => self.queue.push(deliver_at, Event::Request { dest, req }),
                Err(_) => {
                    let resp = match req {
                        MemRequest::Read { id, addr, .. } => MemResponse::ReadResp {
                            id,
                            result: Err(RespError::AddressOutOfRange { addr }),
                        },
                        MemRequest::Write { id, addr, .. } => MemResponse::WriteResp {
                            id,
                            result: Err(RespError::AddressOutOfRange { addr }),
                        },
                    };
                    self.queue.push(deliver_at, Event::Response(resp));
                }
            }
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// Terminal records in completion order.
    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    pub fn compute(&self) -> &ComputeNode {
        &self.compute
    }

    pub fn memory(&self) -> &[MemoryServer] {
        &self.memory
    }

    /// Reads the stored bytes of a node directly from the owning memory
    /// node, bypassing the channel. For inspection and tests only.
    pub fn node_bytes(&self, addr: NodeAddress) -> Option<Bytes> {
        let dest = self.map.route(addr).ok()?;
        self.memory[dest.0 as usize].block(addr).cloned()
    }
}
