//! Memory-node responder for Oxbow.
//!
//! A memory node owns one slab of the global address space and serves
//! Read/Write requests against it. It has no tree logic: it stores byte
//! blocks by address and hands them back.

mod server;

pub use server::{MemoryServer, ServerStats};
