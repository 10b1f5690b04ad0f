//! The pending-operation table: suspended state machines keyed by
//! request id.
//!
//! An entry is created when a request is sent, transferred to a new
//! entry when the next request is issued (the table is rekeyed, never
//! shared between requests), and destroyed when the operation completes
//! or records a failure.

use oxbow_common::{Key, Node, NodeAddress, OpKind, SimTime, Value};

/// What a suspended operation is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Awaiting the read of the node at `PendingOp::target` during the
    /// root-to-leaf descent.
    Descend,
    /// Awaiting the write-back of a modified leaf; completes with the
    /// recorded outcome.
    LeafWrite { outcome: Outcome },
    /// Inside the split protocol.
    Split(SplitPhase),
}

/// Sub-phase of an in-flight split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPhase {
    /// Phase A: writing the (possibly re-addressed) old node.
    WriteOld,
    /// Phase B: writing the new sibling.
    WriteNew,
    /// Root split: writing the new root into the root slot.
    WriteNewRoot,
    /// Non-root split: awaiting the parent read.
    ReadParent,
    /// Awaiting the parent write-back after inserting the separator.
    WriteParent,
    /// Parent address unknown: re-traversing from the root, guided by
    /// the separator key, until an internal node pointing at one of the
    /// two siblings is found.
    LocateParent,
}

/// State of the two halves while a split is in flight.
#[derive(Debug, Clone)]
pub struct SplitState {
    /// The lower half, staying at the split node's (possibly
    /// re-allocated) address.
    pub old: Node,
    /// The upper half at a freshly allocated address.
    pub new: Node,
    /// Key promoted to the parent; partitions the two siblings.
    pub separator: Key,
    /// Tree level of the two halves (0 = root level).
    pub level: u32,
    /// True if the node being split was the current root.
    pub root_split: bool,
}

/// One suspended operation.
#[derive(Debug, Clone)]
pub struct PendingOp {
    /// Current kind; becomes a split kind while restructuring runs.
    pub kind: OpKind,
    /// The operation's key.
    pub key: Key,
    /// The value being inserted, for inserts.
    pub value: Option<Value>,
    /// Current descent level (0 = root).
    pub level: u32,
    /// Address currently awaited.
    pub target: NodeAddress,
    /// Ancestors read so far, root first. The split path pops the node
    /// being split, so the last element is always its parent candidate.
    pub path: Vec<Node>,
    /// What the entry is suspended on.
    pub stage: Stage,
    /// Split bookkeeping, present only during split stages.
    pub split: Option<SplitState>,
    /// Simulated time the operation began, for latency accounting.
    pub started_at: SimTime,
}

impl PendingOp {
    /// Creates a fresh entry about to read the root.
    pub fn start(kind: OpKind, key: Key, value: Option<Value>, root: NodeAddress, now: SimTime) -> Self {
        Self {
            kind,
            key,
            value,
            level: 0,
            target: root,
            path: Vec::new(),
            stage: Stage::Descend,
            split: None,
            started_at: now,
        }
    }
}

/// Result of a completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Search found the key with this value.
    Found(Value),
    /// Search missed, or Delete had nothing to remove.
    NotFound,
    /// Insert stored a new pair.
    Inserted,
    /// Insert overwrote the value of an existing key.
    Updated,
    /// Delete removed the key.
    Deleted,
    /// The operation failed (out-of-range address, unusable payload).
    Failed,
}

/// Terminal record of one operation, emitted exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Workload-level kind (splits report as the insert they served).
    pub kind: OpKind,
    pub key: Key,
    pub outcome: Outcome,
    /// Simulated nanoseconds from start to completion.
    pub latency: SimTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_entry_targets_root() {
        let root = NodeAddress(0x1000_0000);
        let op = PendingOp::start(OpKind::Search, 42, None, root, 1_000);
        assert_eq!(op.kind, OpKind::Search);
        assert_eq!(op.level, 0);
        assert_eq!(op.target, root);
        assert!(op.path.is_empty());
        assert_eq!(op.stage, Stage::Descend);
        assert!(op.split.is_none());
        assert_eq!(op.started_at, 1_000);
    }

    #[test]
    fn test_insert_entry_carries_value() {
        let op = PendingOp::start(OpKind::Insert, 7, Some(700), NodeAddress(1), 0);
        assert_eq!(op.value, Some(700));
    }
}
