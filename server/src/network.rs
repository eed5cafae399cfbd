//! Server event loop: datagram demultiplexing, tick pacing and the
//! deadline sweep.

use crate::broadcast::UpdateBroadcaster;
use crate::registry::ActionRegistry;
use crate::session::{SessionContext, SessionHandler, SessionTable};
use crate::world::World;
use log::{debug, error, info, warn};
use shared::{codec, Endpoint, Packet, ProtocolError, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Authoritative server over one control channel and one update channel.
///
/// Spawns one task per connected client plus three long-lived tasks: the
/// receive loop that routes datagrams to sessions, the tick loop that
/// consumes the action registry and publishes snapshots, and the deadline
/// sweep that evicts stalled clients.
pub struct Server {
    ctx: SessionContext,
    tick_duration: Duration,
    deadline: Duration,
}

impl Server {
    pub async fn new(
        control_addr: &str,
        update_addr: &str,
        world: Arc<dyn World>,
        tick_duration: Duration,
        max_clients: usize,
        deadline: Duration,
    ) -> Result<Self, ProtocolError> {
        let endpoint = Arc::new(Endpoint::bind(control_addr).await?);
        let broadcaster = Arc::new(UpdateBroadcaster::new(Endpoint::bind(update_addr).await?));

        info!("control channel listening on {}", endpoint.local_addr()?);
        info!("update channel sending from {}", broadcaster.local_addr()?);

        let ctx = SessionContext {
            endpoint,
            registry: Arc::new(RwLock::new(ActionRegistry::new())),
            broadcaster,
            sessions: Arc::new(RwLock::new(SessionTable::new(max_clients))),
            world,
            world_running: Arc::new(AtomicBool::new(false)),
        };

        Ok(Self {
            ctx,
            tick_duration,
            deadline,
        })
    }

    /// Bound address of the control channel (resolves port 0 binds).
    pub fn control_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.ctx.endpoint.local_addr()?)
    }

    /// Bound address of the update channel's socket.
    pub fn update_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.ctx.broadcaster.local_addr()?)
    }

    pub async fn session_count(&self) -> usize {
        self.ctx.sessions.read().await.len()
    }

    /// Runs the server until the control socket fails. Session tasks and
    /// the tick/deadline loops are spawned internally.
    pub async fn run(&self) -> Result<(), ProtocolError> {
        let tick = self.spawn_tick_loop();
        let sweep = self.spawn_deadline_sweep();

        let receiver = {
            let ctx = self.ctx.clone();
            tokio::spawn(Self::receive_loop(ctx))
        };

        let result = receiver.await;
        tick.abort();
        sweep.abort();
        if let Err(e) = result {
            error!("receive loop task failed: {}", e);
        }
        Ok(())
    }

    /// Routes every inbound datagram to its session, admitting new clients
    /// whose first packet is a well-versed connect request.
    async fn receive_loop(ctx: SessionContext) {
        loop {
            let (payload, source) = match ctx.endpoint.recv().await {
                Ok(received) => received,
                Err(e) => {
                    error!("control receive failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            let packet = match codec::decode(&payload) {
                Ok(packet) => packet,
                Err(e) => {
                    // A corrupt datagram is fatal to the session it came
                    // from; dropping the roster entry wakes its task.
                    match ctx.sessions.write().await.remove(&source) {
                        Some(client_id) => warn!(
                            "dropping client {} after malformed packet from {}: {}",
                            client_id, source, e
                        ),
                        None => warn!("malformed packet from unknown source {}: {}", source, e),
                    }
                    continue;
                }
            };

            let known = ctx.sessions.read().await.contains(&source);
            if known {
                ctx.sessions.write().await.route(source, packet);
                continue;
            }

            match packet {
                Packet::Connect { client_version, .. } if client_version == PROTOCOL_VERSION => {
                    Self::accept(&ctx, source, packet).await;
                }
                Packet::Connect { client_version, .. } => {
                    warn!(
                        "rejecting connect from {}: protocol version {} (expected {})",
                        source, client_version, PROTOCOL_VERSION
                    );
                }
                other => {
                    debug!(
                        "ignoring {} from unknown source {}",
                        other.kind(),
                        source
                    );
                }
            }
        }
    }

    /// Admits one new client: roster entry, session task, and the connect
    /// packet delivered through the normal routing path.
    async fn accept(ctx: &SessionContext, source: SocketAddr, connect: Packet) {
        let registered = {
            let mut sessions = ctx.sessions.write().await;
            match sessions.register(source) {
                Some((client_id, inbox)) => {
                    sessions.route(source, connect);
                    Some((client_id, inbox))
                }
                None => None,
            }
        };

        match registered {
            Some((client_id, inbox)) => {
                info!("admitting session {} for {}", client_id, source);
                tokio::spawn(SessionHandler::new(client_id, source, inbox, ctx.clone()).run());
            }
            None => warn!("session table full, ignoring connect from {}", source),
        }
    }

    /// Once per tick: consume the registry atomically, advance the world,
    /// publish a snapshot to every subscriber.
    fn spawn_tick_loop(&self) -> JoinHandle<()> {
        let ctx = self.ctx.clone();
        let tick_duration = self.tick_duration;

        tokio::spawn(async move {
            let mut ticker = interval(tick_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut tick: u64 = 0;

            loop {
                ticker.tick().await;

                let batch = {
                    let mut registry = ctx.registry.write().await;
                    let batch = registry.to_batch();
                    registry.clear();
                    batch
                };

                if !ctx.world_running.load(Ordering::SeqCst) {
                    continue;
                }

                tick += 1;
                ctx.world.apply_batch(&batch);
                let frame = ctx.world.render_snapshot();

                match ctx.broadcaster.publish(&frame).await {
                    Ok(failures) if failures.is_empty() => {}
                    Ok(failures) => debug!(
                        "tick {}: {} snapshot deliveries failed",
                        tick,
                        failures.len()
                    ),
                    Err(e) => error!("tick {}: snapshot publish failed: {}", tick, e),
                }

                if tick % 64 == 0 {
                    debug!(
                        "tick {}: {} actions consumed, {} subscribers",
                        tick,
                        batch.len(),
                        ctx.broadcaster.subscriber_count().await
                    );
                }
            }
        })
    }

    /// Once per second: evict sessions silent past the deadline. The
    /// dropped inbox sender wakes each evicted task into its cleanup path.
    fn spawn_deadline_sweep(&self) -> JoinHandle<()> {
        let ctx = self.ctx.clone();
        let deadline = self.deadline;

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));

            loop {
                ticker.tick().await;

                let expired = ctx.sessions.write().await.expire(deadline);
                for (addr, client_id) in expired {
                    warn!(
                        "evicting client {} ({}): no activity within {:?}",
                        client_id, addr, deadline
                    );
                }
            }
        })
    }
}
