use std::io;
use std::net::SocketAddr;

/// Socket-level failures, reported to callers as values.
///
/// The caller decides whether to retry, drop the peer or give up; transport
/// problems never abort anything beyond the operation that hit them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding a local port failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Sending a datagram failed.
    #[error("send to {dest} failed: {source}")]
    Send {
        dest: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Receiving a datagram failed.
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),

    /// A receive deadline expired before any matching datagram arrived.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

/// Protocol-level failures layered on top of the transport.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A packet could not be serialized. Does not happen for validated
    /// in-memory values; surfaced rather than swallowed all the same.
    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),

    /// A datagram did not decode to a known packet shape.
    #[error("malformed packet: {0}")]
    Decode(#[source] bincode::Error),

    /// A well-formed packet arrived in a state that does not accept it.
    /// Fatal to the session it arrived on.
    #[error("unexpected {got} while {during}")]
    UnexpectedPacket { got: &'static str, during: &'static str },

    /// Lookup of a client id with no live entry.
    #[error("unknown client {0}")]
    UnknownClient(u32),
}
