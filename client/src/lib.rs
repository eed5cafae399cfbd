//! # Turn-Coordination Client Library
//!
//! Client side of the gridwalk protocol: a proxy that establishes a
//! session with the authoritative server, submits one action per tick and
//! exposes the received snapshot and batch to the caller, plus a
//! non-blocking listener for out-of-band snapshot updates.
//!
//! The proxy renders nothing and interprets nothing. Snapshots are opaque
//! payloads handed to the caller verbatim; actions come from an
//! [`network::ActionSource`] collaborator the caller supplies — a terminal
//! binding, an AI, a test script.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The [`network::Client`] proxy and its state machine
//! (`Disconnected → Handshaking → AwaitingMap → AwaitingTurn → Closed`):
//! handshake with update-port announcement, map request, and the strict
//! one-submission-per-response turn loop. Connection failures are reported
//! as errors and halt the proxy; there is no automatic retry.
//!
//! ### Updates Module (`updates`)
//! The [`updates::UpdateFeed`]: a second endpoint on the announced update
//! port, polled without blocking so the caller never stalls between
//! authoritative ticks waiting for a snapshot that has not arrived.

pub mod network;
pub mod updates;
