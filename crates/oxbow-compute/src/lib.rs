//! Asynchronous B+tree engine for Oxbow.
//!
//! A compute node drives B+tree operations against remote memory. Every
//! node the algorithm touches costs a network round trip, so each
//! operation runs as a state machine suspended in a pending table and
//! resumed by response events: descent reads, a leaf operation, and for
//! inserts into full nodes a three-phase split protocol that carries
//! separator keys upward, creating a new root when the old one splits.

mod engine;
mod pending;

pub use engine::{ComputeNode, ComputeStats, TreeState};
pub use pending::{Completion, Outcome, PendingOp, SplitPhase, SplitState, Stage};
