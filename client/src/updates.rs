//! Out-of-band snapshot listener.
//!
//! The feed owns its own endpoint on the port announced during the
//! handshake. Reads are non-blocking polls: between turns there may be
//! nothing pending, and the caller must never stall on the update channel.

use log::warn;
use shared::{codec, Endpoint, Packet, ProtocolError};

/// Receives world snapshots pushed by the server's update broadcaster.
pub struct UpdateFeed {
    endpoint: Endpoint,
}

impl UpdateFeed {
    /// Binds the update endpoint. Port 0 picks an ephemeral port; announce
    /// [`UpdateFeed::local_port`] to the server in that case.
    pub async fn bind(port: u16) -> Result<Self, ProtocolError> {
        let endpoint = Endpoint::bind(&format!("0.0.0.0:{}", port)).await?;
        Ok(Self { endpoint })
    }

    pub fn local_port(&self) -> Result<u16, ProtocolError> {
        Ok(self.endpoint.local_addr()?.port())
    }

    /// Non-blocking poll for the next pending snapshot.
    ///
    /// Returns `None` when nothing has arrived. Malformed or unexpected
    /// datagrams on this channel are logged and skipped — a bad update is
    /// fatal to that one delivery, never to the session.
    pub fn poll(&self) -> Result<Option<String>, ProtocolError> {
        loop {
            let Some((payload, source)) = self.endpoint.try_recv()? else {
                return Ok(None);
            };

            match codec::decode(&payload) {
                Ok(Packet::Snapshot { frame }) => return Ok(Some(frame)),
                Ok(other) => {
                    warn!(
                        "ignoring {} on the update channel from {}",
                        other.kind(),
                        source
                    );
                }
                Err(e) => {
                    warn!("ignoring malformed update datagram from {}: {}", source, e);
                }
            }
        }
    }

    /// Drains every pending snapshot and returns the newest, if any.
    pub fn poll_latest(&self) -> Result<Option<String>, ProtocolError> {
        let mut latest = None;
        while let Some(frame) = self.poll()? {
            latest = Some(frame);
        }
        Ok(latest)
    }
}
