//! Request/response messages exchanged between compute and memory nodes.
//!
//! Every request carries a correlation id assigned by the sender; the
//! matching response carries the same id and is routed back along the
//! channel the request arrived on. Payload sizes are always the fixed
//! node footprint, so the transport never needs to negotiate lengths.

use bytes::Bytes;

use crate::addr::NodeAddress;

/// Correlation identifier for an outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestId(pub u64);

impl RequestId {
    /// First id handed out by a fresh compute node.
    pub const FIRST: RequestId = RequestId(1);

    /// The id following this one.
    pub fn next(&self) -> RequestId {
        RequestId(self.0 + 1)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error carried inside a response instead of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespError {
    /// The address is not inside the responder's slab.
    AddressOutOfRange { addr: NodeAddress },
}

impl std::fmt::Display for RespError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RespError::AddressOutOfRange { addr } => {
                write!(f, "address {} out of range", addr)
            }
        }
    }
}

/// A request from a compute node to a memory node.
#[derive(Debug, Clone)]
pub enum MemRequest {
    /// Return `size` bytes stored at `addr`.
    Read {
        id: RequestId,
        addr: NodeAddress,
        size: u32,
    },
    /// Store `data` at `addr`.
    Write {
        id: RequestId,
        addr: NodeAddress,
        data: Bytes,
    },
}

impl MemRequest {
    /// The correlation id of this request.
    pub fn id(&self) -> RequestId {
        match self {
            MemRequest::Read { id, .. } | MemRequest::Write { id, .. } => *id,
        }
    }

    /// The target address, used for routing to the owning memory node.
    pub fn addr(&self) -> NodeAddress {
        match self {
            MemRequest::Read { addr, .. } | MemRequest::Write { addr, .. } => *addr,
        }
    }
}

/// A response from a memory node back to the issuing compute node.
#[derive(Debug, Clone)]
pub enum MemResponse {
    /// Matches a prior [`MemRequest::Read`].
    ReadResp {
        id: RequestId,
        result: std::result::Result<Bytes, RespError>,
    },
    /// Matches a prior [`MemRequest::Write`].
    WriteResp {
        id: RequestId,
        result: std::result::Result<(), RespError>,
    },
}

impl MemResponse {
    /// The correlation id echoed from the request.
    pub fn id(&self) -> RequestId {
        match self {
            MemResponse::ReadResp { id, .. } | MemResponse::WriteResp { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_sequence() {
        let first = RequestId::FIRST;
        assert_eq!(first, RequestId(1));
        assert_eq!(first.next(), RequestId(2));
        assert_eq!(first.next().next(), RequestId(3));
    }

    #[test]
    fn test_request_accessors() {
        let read = MemRequest::Read {
            id: RequestId(9),
            addr: NodeAddress(0x1000_0000),
            size: 128,
        };
        assert_eq!(read.id(), RequestId(9));
        assert_eq!(read.addr(), NodeAddress(0x1000_0000));

        let write = MemRequest::Write {
            id: RequestId(10),
            addr: NodeAddress(0x1100_0000),
            data: Bytes::from_static(&[1, 2, 3]),
        };
        assert_eq!(write.id(), RequestId(10));
        assert_eq!(write.addr(), NodeAddress(0x1100_0000));
    }

    #[test]
    fn test_response_echoes_id() {
        let resp = MemResponse::ReadResp {
            id: RequestId(42),
            result: Ok(Bytes::new()),
        };
        assert_eq!(resp.id(), RequestId(42));

        let resp = MemResponse::WriteResp {
            id: RequestId(43),
            result: Err(RespError::AddressOutOfRange {
                addr: NodeAddress(5),
            }),
        };
        assert_eq!(resp.id(), RequestId(43));
    }

    #[test]
    fn test_resp_error_display() {
        let err = RespError::AddressOutOfRange {
            addr: NodeAddress(0xbeef),
        };
        assert_eq!(err.to_string(), "address 0xbeef out of range");
    }
}
