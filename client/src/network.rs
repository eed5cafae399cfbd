//! Client agent proxy: drives the control-channel exchange with the
//! server and exposes each turn's snapshot and batch to the caller.

use log::info;
use shared::{codec, Action, Endpoint, Packet, ProtocolError, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;

/// How long to wait for the connect acknowledgment before reporting a
/// connection failure.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for a turn's batch/snapshot pair. Generous; the server
/// answers each submission immediately.
const TURN_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the proxy is in its exchange with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Disconnected,
    Handshaking,
    AwaitingMap,
    AwaitingTurn,
    Closed,
}

/// Supplies one action per turn. How the action is derived (terminal
/// input, an AI, a script) is the caller's business; the proxy only hands
/// over the latest snapshot and batch.
pub trait ActionSource {
    fn next_action(&mut self, frame: &str, batch: &[(u32, Action)]) -> Action;
}

/// Client-side counterpart of a server session.
///
/// Owns the control-channel endpoint, announces the update port during the
/// handshake, and keeps strict request/response alternation with its
/// session: never a second submission before the prior turn's response
/// pair is consumed. Snapshot contents are never interpreted.
pub struct Client {
    endpoint: Endpoint,
    server_addr: SocketAddr,
    update_port: u16,
    client_id: Option<u32>,
    state: ProxyState,
    latest_batch: Vec<(u32, Action)>,
    latest_frame: String,
}

impl Client {
    pub async fn new(server_addr: SocketAddr, update_port: u16) -> Result<Self, ProtocolError> {
        let endpoint = Endpoint::bind("0.0.0.0:0").await?;

        Ok(Self {
            endpoint,
            server_addr,
            update_port,
            client_id: None,
            state: ProxyState::Disconnected,
            latest_batch: Vec::new(),
            latest_frame: String::new(),
        })
    }

    pub fn state(&self) -> ProxyState {
        self.state
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    /// The most recent world snapshot, verbatim.
    pub fn frame(&self) -> &str {
        &self.latest_frame
    }

    /// The most recent action batch.
    pub fn batch(&self) -> &[(u32, Action)] {
        &self.latest_batch
    }

    /// Sends the connect request and waits for the acknowledgment. A
    /// failed or silent server is reported as an error; no automatic
    /// retry.
    pub async fn connect(&mut self) -> Result<u32, ProtocolError> {
        self.state = ProxyState::Handshaking;
        info!("connecting to {}", self.server_addr);

        self.send(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
            update_port: self.update_port,
        })
        .await?;

        match self
            .recv_timeout(HANDSHAKE_TIMEOUT, "the connect acknowledgment")
            .await?
        {
            Packet::Connected { client_id } => {
                info!("connected, assigned client id {}", client_id);
                self.client_id = Some(client_id);
                self.state = ProxyState::AwaitingMap;
                Ok(client_id)
            }
            other => Err(ProtocolError::UnexpectedPacket {
                got: other.kind(),
                during: "the handshake",
            }),
        }
    }

    /// Sends the ready marker and waits for the first batch/snapshot pair.
    pub async fn request_map(&mut self) -> Result<(), ProtocolError> {
        self.send(&Packet::MapRequest).await?;
        self.await_turn().await
    }

    /// Submits one action and waits for the next batch/snapshot pair.
    pub async fn submit(&mut self, action: Action) -> Result<(), ProtocolError> {
        self.send(&Packet::Submit { action }).await?;
        self.await_turn().await
    }

    /// Sends the leave signal and closes the proxy.
    pub async fn leave(&mut self) -> Result<(), ProtocolError> {
        self.send(&Packet::Submit {
            action: Action::Disconnect,
        })
        .await?;
        self.state = ProxyState::Closed;
        info!("leave signal sent, session closed");
        Ok(())
    }

    /// Full proxy lifecycle: handshake, map request, then one action per
    /// turn until the caller picks `Quit` (sent on the wire as the leave
    /// signal) or the connection fails.
    pub async fn run(&mut self, source: &mut dyn ActionSource) -> Result<(), ProtocolError> {
        self.connect().await?;
        self.request_map().await?;

        loop {
            let action = source.next_action(&self.latest_frame, &self.latest_batch);

            if action == Action::Quit || action.is_disconnect() {
                return self.leave().await;
            }

            self.submit(action).await?;
        }
    }

    /// Receives one turn's `TurnBatch` + `Snapshot` pair, in that order.
    async fn await_turn(&mut self) -> Result<(), ProtocolError> {
        match self.recv_timeout(TURN_TIMEOUT, "the turn batch").await? {
            Packet::TurnBatch { actions } => self.latest_batch = actions,
            other => {
                return Err(ProtocolError::UnexpectedPacket {
                    got: other.kind(),
                    during: "a turn exchange",
                })
            }
        }

        match self.recv_timeout(TURN_TIMEOUT, "the world snapshot").await? {
            Packet::Snapshot { frame } => self.latest_frame = frame,
            other => {
                return Err(ProtocolError::UnexpectedPacket {
                    got: other.kind(),
                    during: "a turn exchange",
                })
            }
        }

        self.state = ProxyState::AwaitingTurn;
        Ok(())
    }

    async fn send(&self, packet: &Packet) -> Result<(), ProtocolError> {
        let payload = codec::encode(packet)?;
        self.endpoint.send(&payload, self.server_addr).await?;
        Ok(())
    }

    /// Filtered receive from the server with a deadline; datagrams from
    /// anyone else are discarded.
    async fn recv_timeout(
        &self,
        deadline: Duration,
        waiting_for: &'static str,
    ) -> Result<Packet, ProtocolError> {
        let payload = self
            .endpoint
            .recv_from_timeout(self.server_addr, deadline, waiting_for)
            .await?;
        codec::decode(&payload)
    }
}
