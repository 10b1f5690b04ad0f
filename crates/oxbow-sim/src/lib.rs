//! Discrete-event simulation harness for Oxbow.
//!
//! Wires one compute node and a set of memory nodes through an event
//! queue with simulated network latency, feeds the compute node a
//! scheduled workload, and collects per-operation latency statistics.

mod executor;
mod sim;
mod stats;
mod workload;

pub use executor::{Event, EventQueue, Scheduled};
pub use sim::Simulation;
pub use stats::{LatencyStats, SimStats};
pub use workload::{WorkloadGenerator, WorkloadOp};
