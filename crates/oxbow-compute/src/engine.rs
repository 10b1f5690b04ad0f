//! The compute node: entry points and the response-driven state machine.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, warn};

use oxbow_common::{
    serialized_size, AddressMap, Key, MemRequest, MemResponse, Node, NodeAddress, NodeBody, OpKind,
    OxbowError, RequestId, Result, SimTime, Value,
};

use crate::pending::{Completion, Outcome, PendingOp, SplitPhase, SplitState, Stage};

/// Tree metadata held by the compute node. The tree's contents live on
/// the memory nodes; this is only the locator state.
#[derive(Debug, Clone)]
pub struct TreeState {
    /// Address of the current root; mutated on root split.
    pub root_address: NodeAddress,
    /// Number of levels; 1 means the root is a leaf.
    pub height: u32,
    /// Monotonically increasing node identifier for the allocator.
    pub next_id: u64,
}

/// Request counters on the compute side.
#[derive(Debug, Default, Clone)]
pub struct ComputeStats {
    pub reads_sent: u64,
    pub writes_sent: u64,
    pub ops_completed: u64,
    pub ops_failed: u64,
}

/// An execution agent running the asynchronous B+tree state machine.
///
/// Requests go out through an outbox drained by the harness; responses
/// come back through [`ComputeNode::handle_response`]. The only state
/// shared between handler invocations is the pending-operation table,
/// the tree locator state, and the parent-map hint.
pub struct ComputeNode {
    node_id: u32,
    fanout: u32,
    addr_map: AddressMap,
    tree: TreeState,
    next_request: RequestId,
    pending: HashMap<RequestId, PendingOp>,
    /// Child address -> parent address, recorded opportunistically during
    /// descent. A hint only: split handling falls back to re-traversal
    /// whenever the hint is missing.
    parent_hint: HashMap<NodeAddress, NodeAddress>,
    outbox: Vec<MemRequest>,
    completions: Vec<Completion>,
    bootstrap: Option<RequestId>,
    stats: ComputeStats,
}

impl ComputeNode {
    /// Creates a compute node over the given address map.
    pub fn new(node_id: u32, fanout: u32, addr_map: AddressMap) -> Self {
        let tree = TreeState {
            root_address: addr_map.root_address(),
            height: 1,
            next_id: 0,
        };
        Self {
            node_id,
            fanout,
            addr_map,
            tree,
            next_request: RequestId::FIRST,
            pending: HashMap::new(),
            parent_hint: HashMap::new(),
            outbox: Vec::new(),
            completions: Vec::new(),
            bootstrap: None,
            stats: ComputeStats::default(),
        }
    }

    /// Writes a fresh empty leaf at the root slot and sets `height = 1`.
    /// Must run before any traversal read is issued against the root.
    pub fn initialize(&mut self) {
        let root = Node::new_leaf(self.fanout, self.tree.root_address);
        let id = self.fresh_id();
        self.outbox.push(MemRequest::Write {
            id,
            addr: root.addr,
            data: root.serialize(),
        });
        self.stats.writes_sent += 1;
        self.bootstrap = Some(id);
        self.tree.height = 1;
        debug!(node = self.node_id, root = %self.tree.root_address, "wrote empty root leaf");
    }

    /// Starts an insert: reads the root, continues on response events.
    pub fn start_insert(&mut self, now: SimTime, key: Key, value: Value) {
        self.start_op(now, OpKind::Insert, key, Some(value));
    }

    /// Starts a search.
    pub fn start_search(&mut self, now: SimTime, key: Key) {
        self.start_op(now, OpKind::Search, key, None);
    }

    /// Starts a delete.
    pub fn start_delete(&mut self, now: SimTime, key: Key) {
        self.start_op(now, OpKind::Delete, key, None);
    }

    fn start_op(&mut self, now: SimTime, kind: OpKind, key: Key, value: Option<Value>) {
        debug!(node = self.node_id, %kind, key, "starting operation");
        let op = PendingOp::start(kind, key, value, self.tree.root_address, now);
        let root = self.tree.root_address;
        self.send_read(op, root);
    }

    /// Resumes the state machine owning the response's correlation id.
    ///
    /// Responses for unknown ids are dropped with a warning. Errors
    /// returned here are invariant violations, fatal for the run.
    pub fn handle_response(&mut self, now: SimTime, resp: MemResponse) -> Result<()> {
        let id = resp.id();
        if self.bootstrap == Some(id) {
            self.bootstrap = None;
            debug!(node = self.node_id, "root bootstrap write acknowledged");
            return Ok(());
        }
        let Some(op) = self.pending.remove(&id) else {
            warn!(node = self.node_id, %id, "dropping response for unknown request");
            return Ok(());
        };
        match resp {
            MemResponse::ReadResp { result, .. } => match result {
                Ok(bytes) => self.on_read(now, op, &bytes),
                Err(err) => {
                    warn!(node = self.node_id, key = op.key, %err, "read failed");
                    self.complete(now, op, Outcome::Failed);
                    Ok(())
                }
            },
            MemResponse::WriteResp { result, .. } => match result {
                Ok(()) => self.on_write_done(now, op),
                Err(err) => {
                    warn!(node = self.node_id, key = op.key, %err, "write failed");
                    self.complete(now, op, Outcome::Failed);
                    Ok(())
                }
            },
        }
    }

    /// Outbound requests accumulated since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<MemRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Terminal records accumulated since the last drain.
    pub fn drain_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.completions)
    }

    /// Tree locator state.
    pub fn tree(&self) -> &TreeState {
        &self.tree
    }

    /// Number of operations currently suspended.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Request counters.
    pub fn stats(&self) -> &ComputeStats {
        &self.stats
    }

    // =====================================================================
    // Read-response handling
    // =====================================================================

    fn on_read(&mut self, now: SimTime, op: PendingOp, bytes: &[u8]) -> Result<()> {
        match op.stage {
            Stage::Descend => self.on_descent_read(now, op, bytes),
            Stage::Split(SplitPhase::ReadParent) => self.on_parent_read(now, op, bytes),
            Stage::Split(SplitPhase::LocateParent) => self.on_locate_read(now, op, bytes),
            _ => Err(OxbowError::InvariantViolation(format!(
                "read response while awaiting a write for key {}",
                op.key
            ))),
        }
    }

    fn on_descent_read(&mut self, now: SimTime, mut op: PendingOp, bytes: &[u8]) -> Result<()> {
        let Some(node) = self.decode(bytes) else {
            warn!(node = self.node_id, key = op.key, addr = %op.target, "unusable payload during descent");
            self.complete_soft(now, op);
            return Ok(());
        };

        debug!(
            node = self.node_id,
            level = op.level,
            addr = %node.addr,
            keys = node.num_keys(),
            leaf = node.is_leaf(),
            "descent step"
        );

        // The height check guards against a stale is_leaf flag sending the
        // descent below the leaf level.
        if node.is_leaf() || op.level + 1 >= self.tree.height {
            return self.leaf_op(now, op, node);
        }

        let idx = node.child_index_for(op.key);
        let child = node.child_at(idx);
        self.parent_hint.insert(child, node.addr);
        op.path.push(node);
        op.level += 1;
        self.send_read(op, child);
        Ok(())
    }

    fn on_parent_read(&mut self, now: SimTime, mut op: PendingOp, bytes: &[u8]) -> Result<()> {
        let Some(parent) = self.decode(bytes) else {
            warn!(node = self.node_id, key = op.key, addr = %op.target, "unusable parent payload");
            self.complete(now, op, Outcome::Failed);
            return Ok(());
        };
        // Drop the stale copy of this parent from the path so a recursive
        // split sees the grandparent next.
        if op.path.last().map(|n| n.addr) == Some(parent.addr) {
            op.path.pop();
        }
        self.apply_parent(now, op, parent)
    }

    fn on_locate_read(&mut self, now: SimTime, mut op: PendingOp, bytes: &[u8]) -> Result<()> {
        let Some(node) = self.decode(bytes) else {
            warn!(node = self.node_id, key = op.key, addr = %op.target, "unusable payload during parent re-traversal");
            self.complete(now, op, Outcome::Failed);
            return Ok(());
        };

        let (old_addr, new_addr, separator) = {
            let split = self.split_state(&op)?;
            (split.old.addr, split.new.addr, split.separator)
        };

        if let NodeBody::Internal { children, .. } = &node.body {
            if children.contains(&old_addr) || children.contains(&new_addr) {
                return self.apply_parent(now, op, node);
            }
            let idx = node.child_index_for(separator);
            let child = node.child_at(idx);
            op.level += 1;
            self.send_read(op, child);
            return Ok(());
        }

        Err(OxbowError::InvariantViolation(format!(
            "parent of split node not found; re-traversal reached leaf {}",
            node.addr
        )))
    }

    // =====================================================================
    // Write-response handling
    // =====================================================================

    fn on_write_done(&mut self, now: SimTime, mut op: PendingOp) -> Result<()> {
        match op.stage.clone() {
            Stage::LeafWrite { outcome } => {
                self.complete(now, op, outcome);
                Ok(())
            }
            Stage::Split(SplitPhase::WriteOld) => {
                let (addr, data) = {
                    let split = self.split_state(&op)?;
                    (split.new.addr, split.new.serialize())
                };
                op.stage = Stage::Split(SplitPhase::WriteNew);
                self.send_write(op, addr, data);
                Ok(())
            }
            Stage::Split(SplitPhase::WriteNew) => self.after_siblings_written(op),
            Stage::Split(SplitPhase::WriteNewRoot) => {
                self.tree.root_address = self.addr_map.root_address();
                self.tree.height += 1;
                debug!(node = self.node_id, height = self.tree.height, "installed new root");
                self.complete(now, op, Outcome::Inserted);
                Ok(())
            }
            Stage::Split(SplitPhase::WriteParent) => {
                self.complete(now, op, Outcome::Inserted);
                Ok(())
            }
            Stage::Descend
            | Stage::Split(SplitPhase::ReadParent)
            | Stage::Split(SplitPhase::LocateParent) => Err(OxbowError::InvariantViolation(
                format!("write response while awaiting a read for key {}", op.key),
            )),
        }
    }

    /// Phase C entry: both halves are durable on their memory nodes;
    /// promote the separator.
    fn after_siblings_written(&mut self, mut op: PendingOp) -> Result<()> {
        let (old_addr, new_addr, separator, root_split, level) = {
            let split = self.split_state(&op)?;
            (
                split.old.addr,
                split.new.addr,
                split.separator,
                split.root_split,
                split.level,
            )
        };

        if root_split {
            let root_addr = self.addr_map.root_address();
            let root = Node::new_internal(
                self.fanout,
                root_addr,
                vec![separator],
                vec![old_addr, new_addr],
            );
            op.stage = Stage::Split(SplitPhase::WriteNewRoot);
            let data = root.serialize();
            self.send_write(op, root_addr, data);
            return Ok(());
        }

        if level == 0 {
            return Err(OxbowError::InvariantViolation(
                "non-root split at the root level".to_string(),
            ));
        }

        if let Some(parent) = op.path.last() {
            let addr = parent.addr;
            op.stage = Stage::Split(SplitPhase::ReadParent);
            self.send_read(op, addr);
        } else if let Some(&hinted) = self.parent_hint.get(&old_addr) {
            op.stage = Stage::Split(SplitPhase::ReadParent);
            self.send_read(op, hinted);
        } else {
            // No path, no hint: re-traverse from the root using the
            // separator as the guide key.
            op.level = 0;
            op.stage = Stage::Split(SplitPhase::LocateParent);
            let root = self.tree.root_address;
            self.send_read(op, root);
        }
        Ok(())
    }

    /// Inserts the separator and new-sibling pointer into `parent`, or
    /// recursively splits it when full.
    fn apply_parent(&mut self, now: SimTime, mut op: PendingOp, mut parent: Node) -> Result<()> {
        if parent.is_leaf() {
            return Err(OxbowError::InvariantViolation(format!(
                "expected internal parent at {}",
                parent.addr
            )));
        }

        if parent.is_full() {
            return self.begin_internal_split(now, op, parent);
        }

        let (new_addr, separator) = {
            let split = self.split_state(&op)?;
            (split.new.addr, split.separator)
        };
        if let NodeBody::Internal { keys, children } = &mut parent.body {
            let pos = match keys.binary_search(&separator) {
                Ok(p) | Err(p) => p,
            };
            keys.insert(pos, separator);
            children.insert(pos + 1, new_addr);
        }
        op.stage = Stage::Split(SplitPhase::WriteParent);
        let data = parent.serialize();
        self.send_write(op, parent.addr, data);
        Ok(())
    }

    // =====================================================================
    // Leaf operations
    // =====================================================================

    fn leaf_op(&mut self, now: SimTime, mut op: PendingOp, mut leaf: Node) -> Result<()> {
        match op.kind {
            OpKind::Search => {
                let outcome = match &leaf.body {
                    NodeBody::Leaf { keys, values } => match keys.binary_search(&op.key) {
                        Ok(i) => Outcome::Found(values[i]),
                        Err(_) => Outcome::NotFound,
                    },
                    NodeBody::Internal { .. } => Outcome::NotFound,
                };
                self.complete(now, op, outcome);
                Ok(())
            }
            OpKind::Delete => {
                if !leaf.is_leaf() {
                    self.complete(now, op, Outcome::NotFound);
                    return Ok(());
                }
                match leaf.keys().binary_search(&op.key) {
                    Ok(i) => {
                        if let NodeBody::Leaf { keys, values } = &mut leaf.body {
                            keys.remove(i);
                            values.remove(i);
                        }
                        op.stage = Stage::LeafWrite {
                            outcome: Outcome::Deleted,
                        };
                        let data = leaf.serialize();
                        self.send_write(op, leaf.addr, data);
                        Ok(())
                    }
                    Err(_) => {
                        self.complete(now, op, Outcome::NotFound);
                        Ok(())
                    }
                }
            }
            OpKind::Insert => {
                let Some(value) = op.value else {
                    return Err(OxbowError::InvariantViolation(
                        "insert without a value".to_string(),
                    ));
                };
                if !leaf.is_leaf() {
                    self.complete(now, op, Outcome::Failed);
                    return Ok(());
                }
                match leaf.keys().binary_search(&op.key) {
                    Ok(i) => {
                        if let NodeBody::Leaf { values, .. } = &mut leaf.body {
                            values[i] = value;
                        }
                        op.stage = Stage::LeafWrite {
                            outcome: Outcome::Updated,
                        };
                        let data = leaf.serialize();
                        self.send_write(op, leaf.addr, data);
                        Ok(())
                    }
                    Err(pos) if !leaf.is_full() => {
                        if let NodeBody::Leaf { keys, values } = &mut leaf.body {
                            keys.insert(pos, op.key);
                            values.insert(pos, value);
                        }
                        op.stage = Stage::LeafWrite {
                            outcome: Outcome::Inserted,
                        };
                        let data = leaf.serialize();
                        self.send_write(op, leaf.addr, data);
                        Ok(())
                    }
                    Err(_) => self.begin_leaf_split(op, leaf, value),
                }
            }
            OpKind::SplitLeaf | OpKind::SplitInternal => Err(OxbowError::InvariantViolation(
                "split entry reached the leaf handler".to_string(),
            )),
        }
    }

    // =====================================================================
    // Splits
    // =====================================================================

    fn begin_leaf_split(&mut self, mut op: PendingOp, leaf: Node, value: Value) -> Result<()> {
        let Node { addr, body, .. } = leaf;
        let NodeBody::Leaf { keys, values } = body else {
            return Err(OxbowError::InvariantViolation(
                "leaf split on internal node".to_string(),
            ));
        };

        let mut pairs: Vec<(Key, Value)> = keys.into_iter().zip(values).collect();
        let pos = match pairs.binary_search_by_key(&op.key, |p| p.0) {
            Ok(p) | Err(p) => p,
        };
        pairs.insert(pos, (op.key, value));

        let mid = (self.fanout as usize + 1) / 2;
        let upper = pairs.split_off(mid);
        let separator = upper[0].0;

        let root_split = addr == self.tree.root_address;
        let old_addr = if root_split {
            // The old root moves out of the root slot before the new root
            // is installed there.
            self.alloc_node()?
        } else {
            addr
        };
        let new_addr = self.alloc_node()?;

        let old = Node::leaf_from_pairs(self.fanout, old_addr, pairs);
        let new = Node::leaf_from_pairs(self.fanout, new_addr, upper);

        debug!(
            node = self.node_id,
            separator,
            old = %old.addr,
            new = %new.addr,
            root_split,
            "leaf split"
        );

        op.kind = OpKind::SplitLeaf;
        op.split = Some(SplitState {
            old,
            new,
            separator,
            level: op.level,
            root_split,
        });
        op.stage = Stage::Split(SplitPhase::WriteOld);
        let (write_addr, data) = {
            let split = self.split_state(&op)?;
            (split.old.addr, split.old.serialize())
        };
        self.send_write(op, write_addr, data);
        Ok(())
    }

    fn begin_internal_split(&mut self, _now: SimTime, mut op: PendingOp, parent: Node) -> Result<()> {
        let (separator, new_child, child_level) = {
            let split = self.split_state(&op)?;
            (split.separator, split.new.addr, split.level)
        };
        op.split = None;

        let Node { addr, body, .. } = parent;
        let NodeBody::Internal {
            mut keys,
            mut children,
        } = body
        else {
            return Err(OxbowError::InvariantViolation(
                "internal split on leaf node".to_string(),
            ));
        };

        let pos = match keys.binary_search(&separator) {
            Ok(p) | Err(p) => p,
        };
        keys.insert(pos, separator);
        children.insert(pos + 1, new_child);

        // F+1 keys and F+2 children; the middle key is promoted, not kept.
        let mid = self.fanout as usize / 2;
        let promoted = keys[mid];
        let right_keys = keys.split_off(mid + 1);
        keys.truncate(mid);
        let right_children = children.split_off(mid + 1);

        if child_level == 0 {
            return Err(OxbowError::InvariantViolation(
                "split recursion below the root level".to_string(),
            ));
        }
        let parent_level = child_level - 1;
        let root_split = addr == self.tree.root_address;
        if !root_split && parent_level == 0 {
            return Err(OxbowError::InvariantViolation(
                "non-root internal node at the root level".to_string(),
            ));
        }

        let old_addr = if root_split { self.alloc_node()? } else { addr };
        let new_addr = self.alloc_node()?;

        let old = Node::new_internal(self.fanout, old_addr, keys, children);
        let new = Node::new_internal(self.fanout, new_addr, right_keys, right_children);

        debug!(
            node = self.node_id,
            promoted,
            old = %old.addr,
            new = %new.addr,
            root_split,
            "internal split"
        );

        op.kind = OpKind::SplitInternal;
        op.split = Some(SplitState {
            old,
            new,
            separator: promoted,
            level: parent_level,
            root_split,
        });
        op.stage = Stage::Split(SplitPhase::WriteOld);
        let (write_addr, data) = {
            let split = self.split_state(&op)?;
            (split.old.addr, split.old.serialize())
        };
        self.send_write(op, write_addr, data);
        Ok(())
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    fn fresh_id(&mut self) -> RequestId {
        let id = self.next_request;
        self.next_request = id.next();
        id
    }

    fn alloc_node(&mut self) -> Result<NodeAddress> {
        let id = self.tree.next_id;
        self.tree.next_id += 1;
        self.addr_map.node_address(id)
    }

    fn send_read(&mut self, mut op: PendingOp, addr: NodeAddress) {
        let id = self.fresh_id();
        op.target = addr;
        self.outbox.push(MemRequest::Read {
            id,
            addr,
            size: serialized_size(self.fanout) as u32,
        });
        self.stats.reads_sent += 1;
        self.pending.insert(id, op);
    }

    fn send_write(&mut self, mut op: PendingOp, addr: NodeAddress, data: Bytes) {
        let id = self.fresh_id();
        op.target = addr;
        self.outbox.push(MemRequest::Write { id, addr, data });
        self.stats.writes_sent += 1;
        self.pending.insert(id, op);
    }

    /// Decodes a response payload; `None` means the bytes cannot be
    /// trusted as a node (blank slot, short payload, foreign fanout).
    fn decode(&self, bytes: &[u8]) -> Option<Node> {
        match Node::deserialize(bytes, self.fanout) {
            Ok(node) if !node.is_blank() && node.fanout == self.fanout => Some(node),
            _ => None,
        }
    }

    fn split_state<'a>(&self, op: &'a PendingOp) -> Result<&'a SplitState> {
        op.split.as_ref().ok_or_else(|| {
            OxbowError::InvariantViolation("split stage without split state".to_string())
        })
    }

    /// Unusable payload mid-operation: not-found for reads and deletes,
    /// failure for inserts.
    fn complete_soft(&mut self, now: SimTime, op: PendingOp) {
        let outcome = match op.kind.workload_kind() {
            OpKind::Search | OpKind::Delete => Outcome::NotFound,
            _ => Outcome::Failed,
        };
        self.complete(now, op, outcome);
    }

    fn complete(&mut self, now: SimTime, op: PendingOp, outcome: Outcome) {
        if outcome == Outcome::Failed {
            self.stats.ops_failed += 1;
        } else {
            self.stats.ops_completed += 1;
        }
        self.completions.push(Completion {
            kind: op.kind.workload_kind(),
            key: op.key,
            outcome,
            latency: now.saturating_sub(op.started_at),
        });
    }
}
