//! Core scalar types shared across the simulator.

use serde::{Deserialize, Serialize};

/// B+tree key. The simulated workloads operate on fixed-width integer keys.
pub type Key = u64;

/// Value stored alongside a key in a leaf.
pub type Value = u64;

/// Simulated time in nanoseconds.
pub type SimTime = u64;

/// The kind of an in-flight B+tree operation.
///
/// `Insert`, `Search`, and `Delete` are workload-visible operations. The two
/// split kinds only appear in the pending-operation table while an insert is
/// restructuring the tree; they complete on behalf of the insert that
/// triggered them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Insert,
    Search,
    Delete,
    SplitLeaf,
    SplitInternal,
}

impl OpKind {
    /// Maps split kinds back to the workload operation that started them.
    pub fn workload_kind(&self) -> OpKind {
        match self {
            OpKind::SplitLeaf | OpKind::SplitInternal => OpKind::Insert,
            k => *k,
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpKind::Insert => "INSERT",
            OpKind::Search => "SEARCH",
            OpKind::Delete => "DELETE",
            OpKind::SplitLeaf => "SPLIT_LEAF",
            OpKind::SplitInternal => "SPLIT_INTERNAL",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_kind_mapping() {
        assert_eq!(OpKind::Insert.workload_kind(), OpKind::Insert);
        assert_eq!(OpKind::Search.workload_kind(), OpKind::Search);
        assert_eq!(OpKind::Delete.workload_kind(), OpKind::Delete);
        assert_eq!(OpKind::SplitLeaf.workload_kind(), OpKind::Insert);
        assert_eq!(OpKind::SplitInternal.workload_kind(), OpKind::Insert);
    }

    #[test]
    fn test_display() {
        assert_eq!(OpKind::Insert.to_string(), "INSERT");
        assert_eq!(OpKind::Search.to_string(), "SEARCH");
        assert_eq!(OpKind::Delete.to_string(), "DELETE");
        assert_eq!(OpKind::SplitLeaf.to_string(), "SPLIT_LEAF");
        assert_eq!(OpKind::SplitInternal.to_string(), "SPLIT_INTERNAL");
    }
}
