//! Discrete-event queue.
//!
//! Events are ordered by simulated time with a sequence-number
//! tiebreaker, so same-time events are delivered in the order they were
//! scheduled. With a constant per-hop latency this makes every
//! compute/memory channel FIFO, which yields the per-channel response
//! ordering the rest of the simulator can reason with.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use oxbow_common::{MemRequest, MemResponse, MemoryNodeIndex, SimTime};

use crate::workload::WorkloadOp;

/// A deliverable simulation event.
#[derive(Debug)]
pub enum Event {
    /// The compute node picks up its next workload operation.
    Dispatch(WorkloadOp),
    /// A request arrives at a memory node.
    Request {
        dest: MemoryNodeIndex,
        req: MemRequest,
    },
    /// A response arrives back at the compute node.
    Response(MemResponse),
}

/// An event with its delivery time and scheduling order.
#[derive(Debug)]
pub struct Scheduled {
    pub time: SimTime,
    seq: u64,
    pub event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// Min-heap of scheduled events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `event` for delivery at `time`.
    pub fn push(&mut self, time: SimTime, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Scheduled { time, seq, event }));
    }

    /// Removes and returns the earliest event.
    pub fn pop(&mut self) -> Option<Scheduled> {
        self.heap.pop().map(|Reverse(s)| s)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
