//! Error types for Oxbow.

use thiserror::Error;

/// Result type alias using OxbowError.
pub type Result<T> = std::result::Result<T, OxbowError>;

/// Errors that can occur in Oxbow operations.
#[derive(Debug, Error)]
pub enum OxbowError {
    // Addressing errors
    #[error("address 0x{address:x} is not owned by any memory node")]
    AddressOutOfRange { address: u64 },

    #[error("memory node {memory_node} slab exhausted while allocating node {node_id}")]
    SlabExhausted { memory_node: u32, node_id: u64 },

    // Wire format errors
    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    MalformedPayload { expected: usize, actual: usize },

    // Internal inconsistencies, fatal for a simulation run
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    // Configuration errors
    #[error("invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}
