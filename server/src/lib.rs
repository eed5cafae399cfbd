//! # Turn-Coordination Server Library
//!
//! Authoritative side of the gridwalk protocol: reconciles many
//! independently-paced clients into one per-tick action batch over
//! unreliable datagram transport, and streams world snapshots out of band.
//!
//! ## Core Responsibilities
//!
//! ### Session Lifecycle
//! Every client is driven through a small state machine
//! (`AwaitingHandshake → AwaitingMapRequest → TickLoop → Closed`) by its
//! own task. Handshake records the client's control and update endpoints;
//! the tick loop exchanges one batch/snapshot pair for one action, strictly
//! alternating per client.
//!
//! ### Action Aggregation
//! The [`registry::ActionRegistry`] collects the most recent action per
//! live client. The tick loop consumes it atomically once per tick;
//! whatever has accumulated by then is the batch — late submissions fold
//! into the next tick. This best-effort aggregation is deliberate: a slow
//! client never blocks the others.
//!
//! ### Snapshot Fan-Out
//! The [`broadcast::UpdateBroadcaster`] owns a second socket and pushes
//! serialized snapshots to every subscribed update endpoint. Delivery
//! failures are per-subscriber; one unreachable client cannot stall or
//! abort the rest.
//!
//! ## Architecture
//!
//! A single receive loop demultiplexes the control socket by source
//! address into per-session inboxes, which is how concurrent session tasks
//! each get a filtered view of one peer over one socket. Shared mutable
//! state is limited to the action registry, the session roster and the
//! subscriber set, each behind its own lock; no lock is held across a
//! control-channel await. Control-channel failures (transport, decode,
//! protocol order) are fatal to the one session; stalled clients are
//! evicted by a per-session deadline sweep.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::world::GridWorld;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = Arc::new(GridWorld::new(16, 8));
//!     let server = Server::new(
//!         "127.0.0.1:8080", // control channel
//!         "127.0.0.1:8081", // update channel
//!         world,
//!         Duration::from_millis(500),
//!         16, // max clients
//!         Duration::from_secs(30), // eviction deadline
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod network;
pub mod registry;
pub mod session;
pub mod world;
