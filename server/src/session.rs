//! Per-client session handling: the roster of live control endpoints and
//! the state machine each connected client is driven through.
//!
//! Session tasks never touch the socket for receiving. The server's receive
//! loop decodes each datagram and routes it by source address into the
//! owning session's inbox, which is what gives every session a filtered
//! view of one peer over a single shared socket. Sending goes straight to
//! the control endpoint.

use crate::broadcast::UpdateBroadcaster;
use crate::registry::ActionRegistry;
use crate::world::World;
use log::{debug, info, warn};
use shared::{codec, Endpoint, Packet, ProtocolError, TransportError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};

/// Shared server state handed to every session task.
#[derive(Clone)]
pub struct SessionContext {
    pub endpoint: Arc<Endpoint>,
    pub registry: Arc<RwLock<ActionRegistry>>,
    pub broadcaster: Arc<UpdateBroadcaster>,
    pub sessions: Arc<RwLock<SessionTable>>,
    pub world: Arc<dyn World>,
    pub world_running: Arc<AtomicBool>,
}

struct SessionEntry {
    client_id: u32,
    inbox: mpsc::UnboundedSender<Packet>,
    last_seen: Instant,
}

/// Roster of live sessions keyed by control endpoint.
///
/// Assigns client ids, enforces capacity and tracks last activity for the
/// deadline sweep. Removing an entry drops the inbox sender, which wakes
/// the session task into its cleanup path.
pub struct SessionTable {
    sessions: HashMap<SocketAddr, SessionEntry>,
    next_client_id: u32,
    max_clients: usize,
}

impl SessionTable {
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Admits a new control endpoint, returning the assigned client id and
    /// the inbox receiver for its session task. `None` at capacity.
    pub fn register(
        &mut self,
        addr: SocketAddr,
    ) -> Option<(u32, mpsc::UnboundedReceiver<Packet>)> {
        if self.sessions.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let (inbox, rx) = mpsc::unbounded_channel();
        self.sessions.insert(
            addr,
            SessionEntry {
                client_id,
                inbox,
                last_seen: Instant::now(),
            },
        );

        Some((client_id, rx))
    }

    /// Forwards a decoded packet to the session owning `addr`, refreshing
    /// its activity stamp. Returns false for unknown sources. A session
    /// whose task already exited is dropped from the roster on the spot.
    pub fn route(&mut self, addr: SocketAddr, packet: Packet) -> bool {
        let Some(entry) = self.sessions.get_mut(&addr) else {
            return false;
        };

        entry.last_seen = Instant::now();
        if entry.inbox.send(packet).is_err() {
            debug!("session for {} already gone, dropping roster entry", addr);
            self.sessions.remove(&addr);
        }
        true
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.sessions.contains_key(addr)
    }

    /// Looks up the client id registered for a control endpoint.
    pub fn client_id(&self, addr: &SocketAddr) -> Option<u32> {
        self.sessions.get(addr).map(|entry| entry.client_id)
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> Option<u32> {
        self.sessions.remove(addr).map(|entry| entry.client_id)
    }

    /// Evicts every session silent for longer than `deadline`, returning
    /// the removed (address, client id) pairs.
    pub fn expire(&mut self, deadline: Duration) -> Vec<(SocketAddr, u32)> {
        let expired: Vec<SocketAddr> = self
            .sessions
            .iter()
            .filter(|(_, entry)| entry.last_seen.elapsed() > deadline)
            .map(|(addr, _)| *addr)
            .collect();

        expired
            .into_iter()
            .filter_map(|addr| self.remove(&addr).map(|id| (addr, id)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Lifecycle of one client's control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    AwaitingMapRequest,
    TickLoop,
    Closed,
}

/// State machine run as one task per connected client.
pub struct SessionHandler {
    client_id: u32,
    peer: SocketAddr,
    update_addr: Option<SocketAddr>,
    state: SessionState,
    inbox: mpsc::UnboundedReceiver<Packet>,
    ctx: SessionContext,
}

impl SessionHandler {
    pub fn new(
        client_id: u32,
        peer: SocketAddr,
        inbox: mpsc::UnboundedReceiver<Packet>,
        ctx: SessionContext,
    ) -> Self {
        Self {
            client_id,
            peer,
            update_addr: None,
            state: SessionState::AwaitingHandshake,
            inbox,
            ctx,
        }
    }

    /// Drives the session to completion. Any control-channel failure is
    /// fatal to this session only; cleanup always runs.
    pub async fn run(mut self) {
        if let Err(e) = self.drive().await {
            warn!("session {} ({}): {}", self.client_id, self.peer, e);
        }
        self.close().await;
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            "session {}: {:?} -> {:?}",
            self.client_id, self.state, next
        );
        self.state = next;
    }

    async fn drive(&mut self) -> Result<(), ProtocolError> {
        self.handshake().await?;
        self.await_ready().await?;
        self.tick_loop().await
    }

    /// `AwaitingHandshake`: consume the connect request, record both of the
    /// client's endpoints, acknowledge.
    async fn handshake(&mut self) -> Result<(), ProtocolError> {
        let update_port = match self.recv().await? {
            Packet::Connect { update_port, .. } => update_port,
            other => {
                return Err(ProtocolError::UnexpectedPacket {
                    got: other.kind(),
                    during: "the handshake",
                })
            }
        };

        let update_addr = SocketAddr::new(self.peer.ip(), update_port);
        self.update_addr = Some(update_addr);
        self.ctx.broadcaster.subscribe(update_addr).await;
        self.ctx.world.spawn_agent(self.client_id);

        self.send(&Packet::Connected {
            client_id: self.client_id,
        })
        .await?;

        info!(
            "client {} connected from {} (updates to {})",
            self.client_id, self.peer, update_addr
        );
        self.transition(SessionState::AwaitingMapRequest);
        Ok(())
    }

    /// `AwaitingMapRequest`: any packet counts as "ready". The first
    /// session to get here marks the shared world running, exactly once.
    async fn await_ready(&mut self) -> Result<(), ProtocolError> {
        let packet = self.recv().await?;
        debug!(
            "client {} ready (sent {} as map request)",
            self.client_id,
            packet.kind()
        );

        if !self.ctx.world_running.swap(true, Ordering::SeqCst) {
            self.ctx.world.set_running(true);
        }
        self.transition(SessionState::TickLoop);
        Ok(())
    }

    /// `TickLoop`: send the accumulated batch and a snapshot, then wait for
    /// exactly one submission. Strict alternation with this one client;
    /// no barrier across clients.
    async fn tick_loop(&mut self) -> Result<(), ProtocolError> {
        loop {
            let batch = self.ctx.registry.read().await.to_batch();
            self.send(&Packet::TurnBatch { actions: batch }).await?;

            let frame = self.ctx.world.render_snapshot();
            self.send(&Packet::Snapshot { frame }).await?;

            match self.recv().await? {
                Packet::Submit { action } if action.is_disconnect() => {
                    info!("client {} sent the leave signal", self.client_id);
                    return Ok(());
                }
                Packet::Submit { action } => {
                    self.ctx
                        .registry
                        .write()
                        .await
                        .merge(self.client_id, action);
                }
                other => {
                    return Err(ProtocolError::UnexpectedPacket {
                        got: other.kind(),
                        during: "the tick loop",
                    })
                }
            }
        }
    }

    /// Awaits the next routed packet. A closed inbox means the roster entry
    /// was dropped (eviction or a corrupt datagram) and reads as a
    /// control-channel failure.
    async fn recv(&mut self) -> Result<Packet, ProtocolError> {
        self.inbox.recv().await.ok_or_else(|| {
            TransportError::Recv(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "control channel closed",
            ))
            .into()
        })
    }

    async fn send(&self, packet: &Packet) -> Result<(), ProtocolError> {
        let payload = codec::encode(packet)?;
        self.ctx.endpoint.send(&payload, self.peer).await?;
        Ok(())
    }

    /// Terminal cleanup, identical for cooperative disconnect, protocol
    /// violations, decode failures and eviction: purge the registry entry,
    /// drop the update subscription, despawn the agent, leave the roster.
    async fn close(&mut self) {
        self.transition(SessionState::Closed);

        self.ctx.registry.write().await.remove(self.client_id);
        if let Some(update_addr) = self.update_addr {
            self.ctx.broadcaster.unsubscribe(update_addr).await;
        }
        self.ctx.world.despawn_agent(self.client_id);
        self.ctx.sessions.write().await.remove(&self.peer);

        info!("session {} ({}) closed", self.client_id, self.peer);
    }
}
