//! Address-indexed block storage behind the memory channel.

use std::collections::HashMap;
use std::ops::Range;

use bytes::{Bytes, BytesMut};
use tracing::warn;

use oxbow_common::{MemRequest, MemResponse, MemoryNodeIndex, NodeAddress, RespError};

/// Per-server request counters.
#[derive(Debug, Default, Clone)]
pub struct ServerStats {
    /// Read requests served.
    pub reads: u64,
    /// Write requests served.
    pub writes: u64,
    /// Bytes returned by reads.
    pub bytes_read: u64,
    /// Bytes stored by writes.
    pub bytes_written: u64,
    /// Requests rejected for an out-of-range address.
    pub rejected: u64,
}

/// One memory node: the owner of a contiguous address slab.
///
/// State is a mapping from address to byte block, one entry per address
/// ever written. Reads of never-written addresses deterministically
/// return zeros; they represent an allocated-but-blank node and the
/// compute side must not interpret them as valid.
pub struct MemoryServer {
    index: MemoryNodeIndex,
    range: Range<u64>,
    blocks: HashMap<u64, Bytes>,
    stats: ServerStats,
}

impl MemoryServer {
    /// Creates a memory server owning the given address range.
    pub fn new(index: MemoryNodeIndex, range: Range<u64>) -> Self {
        Self {
            index,
            range,
            blocks: HashMap::new(),
            stats: ServerStats::default(),
        }
    }

    /// This server's index.
    pub fn index(&self) -> MemoryNodeIndex {
        self.index
    }

    /// The slab owned by this server.
    pub fn range(&self) -> &Range<u64> {
        &self.range
    }

    /// Returns true if this server owns `addr`.
    pub fn owns(&self, addr: NodeAddress) -> bool {
        self.range.contains(&addr.0)
    }

    /// Request counters.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Pre-populates slots with zero blocks. Purely an optimization:
    /// reads of unwritten addresses already return zeros.
    pub fn preformat<I: IntoIterator<Item = NodeAddress>>(&mut self, addrs: I, size: usize) {
        let zeros = Bytes::from(vec![0u8; size]);
        for addr in addrs {
            if self.owns(addr) {
                self.blocks.entry(addr.0).or_insert_with(|| zeros.clone());
            }
        }
    }

    /// Serves one request, producing the response the transport routes
    /// back along the arrival channel.
    pub fn handle(&mut self, request: MemRequest) -> MemResponse {
        match request {
            MemRequest::Read { id, addr, size } => {
                if !self.owns(addr) {
                    self.reject("read", addr);
                    return MemResponse::ReadResp {
                        id,
                        result: Err(RespError::AddressOutOfRange { addr }),
                    };
                }
                let data = self.read_block(addr.0, size as usize);
                self.stats.reads += 1;
                self.stats.bytes_read += data.len() as u64;
                MemResponse::ReadResp {
                    id,
                    result: Ok(data),
                }
            }
            MemRequest::Write { id, addr, data } => {
                if !self.owns(addr) {
                    self.reject("write", addr);
                    return MemResponse::WriteResp {
                        id,
                        result: Err(RespError::AddressOutOfRange { addr }),
                    };
                }
                self.stats.writes += 1;
                self.stats.bytes_written += data.len() as u64;
                self.blocks.insert(addr.0, data);
                MemResponse::WriteResp { id, result: Ok(()) }
            }
        }
    }

    /// Direct access to a stored block, for inspection by tests and
    /// invariant checkers. Not reachable over the channel.
    pub fn block(&self, addr: NodeAddress) -> Option<&Bytes> {
        self.blocks.get(&addr.0)
    }

    /// Returns `size` bytes at `addr`: the stored block truncated or
    /// zero-extended, or all zeros if the address was never written.
    fn read_block(&self, addr: u64, size: usize) -> Bytes {
        match self.blocks.get(&addr) {
            Some(block) if block.len() >= size => block.slice(..size),
            Some(block) => {
                let mut buf = BytesMut::with_capacity(size);
                buf.extend_from_slice(block);
                buf.resize(size, 0);
                buf.freeze()
            }
            None => Bytes::from(vec![0u8; size]),
        }
    }

    fn reject(&mut self, op: &str, addr: NodeAddress) {
        self.stats.rejected += 1;
        warn!(
            server = self.index.0,
            %addr,
            "rejected {} outside slab [0x{:x}, 0x{:x})",
            op,
            self.range.start,
            self.range.end
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_common::RequestId;

    fn test_server() -> MemoryServer {
        MemoryServer::new(MemoryNodeIndex(0), 0x1000_0000..0x1100_0000)
    }

    fn read(server: &mut MemoryServer, addr: u64, size: u32) -> MemResponse {
        server.handle(MemRequest::Read {
            id: RequestId(1),
            addr: NodeAddress(addr),
            size,
        })
    }

    fn write(server: &mut MemoryServer, addr: u64, data: &[u8]) -> MemResponse {
        server.handle(MemRequest::Write {
            id: RequestId(2),
            addr: NodeAddress(addr),
            data: Bytes::copy_from_slice(data),
        })
    }

    #[test]
    fn test_write_then_read_returns_same_bytes() {
        let mut server = test_server();
        let payload = [0xAB, 0xCD, 0xEF, 0x01];
        write(&mut server, 0x1000_0000, &payload);

        match read(&mut server, 0x1000_0000, 4) {
            MemResponse::ReadResp { result, .. } => {
                assert_eq!(result.unwrap().as_ref(), &payload);
            }
            _ => panic!("expected read response"),
        }
    }

    #[test]
    fn test_read_of_unwritten_address_is_zeros() {
        let mut server = test_server();
        match read(&mut server, 0x1000_8000, 16) {
            MemResponse::ReadResp { result, .. } => {
                let data = result.unwrap();
                assert_eq!(data.len(), 16);
                assert!(data.iter().all(|b| *b == 0));
            }
            _ => panic!("expected read response"),
        }
    }

    #[test]
    fn test_read_truncates_to_requested_size() {
        let mut server = test_server();
        write(&mut server, 0x1000_0000, &[1, 2, 3, 4, 5, 6, 7, 8]);
        match read(&mut server, 0x1000_0000, 3) {
            MemResponse::ReadResp { result, .. } => {
                assert_eq!(result.unwrap().as_ref(), &[1, 2, 3]);
            }
            _ => panic!("expected read response"),
        }
    }

    #[test]
    fn test_read_zero_extends_short_blocks() {
        let mut server = test_server();
        write(&mut server, 0x1000_0000, &[9, 9]);
        match read(&mut server, 0x1000_0000, 5) {
            MemResponse::ReadResp { result, .. } => {
                assert_eq!(result.unwrap().as_ref(), &[9, 9, 0, 0, 0]);
            }
            _ => panic!("expected read response"),
        }
    }

    #[test]
    fn test_write_replaces_block() {
        let mut server = test_server();
        write(&mut server, 0x1000_0000, &[1, 1, 1]);
        write(&mut server, 0x1000_0000, &[2, 2, 2]);
        match read(&mut server, 0x1000_0000, 3) {
            MemResponse::ReadResp { result, .. } => {
                assert_eq!(result.unwrap().as_ref(), &[2, 2, 2]);
            }
            _ => panic!("expected read response"),
        }
    }

    #[test]
    fn test_out_of_range_read_fails() {
        let mut server = test_server();
        match read(&mut server, 0x2000_0000, 8) {
            MemResponse::ReadResp { result, .. } => {
                assert_eq!(
                    result.unwrap_err(),
                    RespError::AddressOutOfRange {
                        addr: NodeAddress(0x2000_0000)
                    }
                );
            }
            _ => panic!("expected read response"),
        }
        assert_eq!(server.stats().rejected, 1);
        assert_eq!(server.stats().reads, 0);
    }

    #[test]
    fn test_out_of_range_write_fails_and_stores_nothing() {
        let mut server = test_server();
        match write(&mut server, 0x0fff_ffff, &[1]) {
            MemResponse::WriteResp { result, .. } => assert!(result.is_err()),
            _ => panic!("expected write response"),
        }
        assert!(server.block(NodeAddress(0x0fff_ffff)).is_none());
    }

    #[test]
    fn test_response_echoes_request_id() {
        let mut server = test_server();
        let resp = server.handle(MemRequest::Read {
            id: RequestId(777),
            addr: NodeAddress(0x1000_0000),
            size: 1,
        });
        assert_eq!(resp.id(), RequestId(777));
    }

    #[test]
    fn test_counters() {
        let mut server = test_server();
        write(&mut server, 0x1000_0000, &[0; 128]);
        read(&mut server, 0x1000_0000, 128);
        read(&mut server, 0x1000_1000, 128);
        let stats = server.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.bytes_written, 128);
        assert_eq!(stats.bytes_read, 256);
    }

    #[test]
    fn test_preformat_only_touches_owned_slots() {
        let mut server = test_server();
        server.preformat(
            [NodeAddress(0x1000_0000), NodeAddress(0x5000_0000)],
            64,
        );
        assert!(server.block(NodeAddress(0x1000_0000)).is_some());
        assert!(server.block(NodeAddress(0x5000_0000)).is_none());
    }

    #[test]
    fn test_preformat_does_not_clobber_existing_blocks() {
        let mut server = test_server();
        write(&mut server, 0x1000_0000, &[7; 8]);
        server.preformat([NodeAddress(0x1000_0000)], 64);
        assert_eq!(
            server.block(NodeAddress(0x1000_0000)).unwrap().as_ref(),
            &[7; 8]
        );
    }
}
