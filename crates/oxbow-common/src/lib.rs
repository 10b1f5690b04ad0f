//! Oxbow common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all Oxbow components:
//! the error type, simulation configuration, the typed address space, the
//! B+tree node model with its fixed-footprint wire format, and the
//! request/response messages exchanged between compute and memory nodes.

pub mod addr;
pub mod config;
pub mod error;
pub mod msg;
pub mod node;
pub mod types;

pub use addr::{AddressMap, MemoryNodeIndex, NodeAddress, NODE_POOL_OFFSET};
pub use config::{KeyDistribution, SimConfig};
pub use error::{OxbowError, Result};
pub use msg::{MemRequest, MemResponse, RequestId, RespError};
pub use node::{serialized_size, Node, NodeBody, NODE_HEADER_SIZE};
pub use types::{Key, OpKind, SimTime, Value};
