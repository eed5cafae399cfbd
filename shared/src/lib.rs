use serde::{Deserialize, Serialize};

pub mod error;
pub mod transport;

pub use error::{ProtocolError, TransportError};
pub use transport::{Endpoint, MAX_DATAGRAM};

/// Protocol version carried in every connect request. Mismatches are logged
/// and the request ignored.
pub const PROTOCOL_VERSION: u32 = 1;

/// One action chosen by a client for one tick.
///
/// `Disconnect` is the reserved leave signal. It is a distinct variant so
/// the codec and the registry can never mistake it for a movement; clients
/// send it when the caller picks `Quit`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
    Quit,
    Disconnect,
}

impl Action {
    /// True for the leave signal.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Action::Disconnect)
    }
}

/// Every message exchanged on the wire, one datagram per packet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    /// Handshake request. Announces the port the client listens on for
    /// out-of-band snapshot updates; the server pairs it with the source
    /// address of this datagram.
    Connect {
        client_version: u32,
        update_port: u16,
    },
    /// Handshake acknowledgment carrying the assigned client id.
    Connected { client_id: u32 },
    /// Ready marker. Any packet counts as "ready" server-side; this is
    /// what conforming clients send.
    MapRequest,
    /// Aggregated actions for a tick window, ordered by client id.
    TurnBatch { actions: Vec<(u32, Action)> },
    /// One action submission for the current tick.
    Submit { action: Action },
    /// Opaque world snapshot. The protocol layer never looks inside.
    Snapshot { frame: String },
}

impl Packet {
    /// Short name for logs and protocol-violation errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "Connect",
            Packet::Connected { .. } => "Connected",
            Packet::MapRequest => "MapRequest",
            Packet::TurnBatch { .. } => "TurnBatch",
            Packet::Submit { .. } => "Submit",
            Packet::Snapshot { .. } => "Snapshot",
        }
    }
}

/// Wire codec: bincode framing over the [`Packet`] enum.
pub mod codec {
    use super::Packet;
    use crate::error::ProtocolError;

    /// Serializes a packet. Total for validated in-memory values.
    pub fn encode(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(packet).map_err(ProtocolError::Encode)
    }

    /// Deserializes a packet, rejecting malformed or truncated input
    /// without reading past declared lengths.
    pub fn decode(payload: &[u8]) -> Result<Packet, ProtocolError> {
        bincode::deserialize(payload).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_roundtrip() {
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            update_port: 9001,
        };
        let encoded = codec::encode(&packet).unwrap();
        let decoded = codec::decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn batch_roundtrip_preserves_pairs_and_order() {
        let actions = vec![
            (1, Action::Up),
            (2, Action::Left),
            (7, Action::Quit),
            (9, Action::Down),
        ];
        let packet = Packet::TurnBatch {
            actions: actions.clone(),
        };

        let encoded = codec::encode(&packet).unwrap();
        match codec::decode(&encoded).unwrap() {
            Packet::TurnBatch { actions: decoded } => assert_eq!(decoded, actions),
            other => panic!("wrong packet type after roundtrip: {}", other.kind()),
        }
    }

    #[test]
    fn empty_batch_roundtrip() {
        let packet = Packet::TurnBatch { actions: vec![] };
        let encoded = codec::encode(&packet).unwrap();
        match codec::decode(&encoded).unwrap() {
            Packet::TurnBatch { actions } => assert!(actions.is_empty()),
            other => panic!("wrong packet type after roundtrip: {}", other.kind()),
        }
    }

    #[test]
    fn snapshot_roundtrip() {
        let frame = "+---+\n|.*.|\n+---+\n".to_string();
        let packet = Packet::Snapshot {
            frame: frame.clone(),
        };
        let encoded = codec::encode(&packet).unwrap();
        match codec::decode(&encoded).unwrap() {
            Packet::Snapshot { frame: decoded } => assert_eq!(decoded, frame),
            other => panic!("wrong packet type after roundtrip: {}", other.kind()),
        }
    }

    #[test]
    fn submit_roundtrip_keeps_disconnect_distinct() {
        for action in [
            Action::Up,
            Action::Down,
            Action::Left,
            Action::Right,
            Action::Quit,
            Action::Disconnect,
        ] {
            let encoded = codec::encode(&Packet::Submit { action }).unwrap();
            match codec::decode(&encoded).unwrap() {
                Packet::Submit { action: decoded } => {
                    assert_eq!(decoded, action);
                    assert_eq!(decoded.is_disconnect(), action == Action::Disconnect);
                }
                other => panic!("wrong packet type after roundtrip: {}", other.kind()),
            }
        }
    }

    #[test]
    fn truncated_input_is_rejected() {
        let encoded = codec::encode(&Packet::Snapshot {
            frame: "a long enough snapshot payload".to_string(),
        })
        .unwrap();

        let truncated = &encoded[..encoded.len() / 2];
        assert!(matches!(
            codec::decode(truncated),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn garbage_input_is_rejected() {
        let garbage = [0xFFu8; 16];
        assert!(matches!(
            codec::decode(&garbage),
            Err(ProtocolError::Decode(_))
        ));

        assert!(matches!(codec::decode(&[]), Err(ProtocolError::Decode(_))));
    }
}
