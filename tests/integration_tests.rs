//! Integration tests for the turn-coordination protocol
//!
//! These tests run a real server on ephemeral UDP ports and drive it with
//! real clients to validate cross-component behavior.

use client::network::Client;
use client::updates::UpdateFeed;
use server::network::Server;
use server::world::{GridWorld, World};
use shared::{codec, Action, Endpoint, Packet, TransportError, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// World wrapper that counts how often the running mark is flipped.
struct CountingWorld {
    inner: GridWorld,
    running_calls: AtomicUsize,
}

impl CountingWorld {
    fn new(width: usize, height: usize) -> Self {
        Self {
            inner: GridWorld::new(width, height),
            running_calls: AtomicUsize::new(0),
        }
    }

    fn running_calls(&self) -> usize {
        self.running_calls.load(Ordering::SeqCst)
    }
}

impl World for CountingWorld {
    fn set_running(&self, running: bool) {
        self.running_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set_running(running);
    }

    fn spawn_agent(&self, client_id: u32) {
        self.inner.spawn_agent(client_id);
    }

    fn despawn_agent(&self, client_id: u32) {
        self.inner.despawn_agent(client_id);
    }

    fn apply_batch(&self, batch: &[(u32, Action)]) {
        self.inner.apply_batch(batch);
    }

    fn render_snapshot(&self) -> String {
        self.inner.render_snapshot()
    }
}

async fn start_server(
    world: Arc<dyn World>,
    tick: Duration,
    deadline: Duration,
) -> SocketAddr {
    let server = Server::new("127.0.0.1:0", "127.0.0.1:0", world, tick, 8, deadline)
        .await
        .expect("server should bind ephemeral ports");
    let addr = server.control_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    addr
}

/// Connects a client with its own update feed and completes the handshake
/// plus map request.
async fn connect_ready(addr: SocketAddr) -> (Client, UpdateFeed, u32) {
    let feed = UpdateFeed::bind(0).await.unwrap();
    let mut client = Client::new(addr, feed.local_port().unwrap()).await.unwrap();

    let client_id = client.connect().await.unwrap();
    client.request_map().await.unwrap();

    (client, feed, client_id)
}

/// Polls a feed until a snapshot arrives or the attempts run out.
async fn wait_for_update(feed: &UpdateFeed, attempts: u32) -> Option<String> {
    for _ in 0..attempts {
        if let Some(frame) = feed.poll_latest().unwrap() {
            return Some(frame);
        }
        sleep(Duration::from_millis(50)).await;
    }
    None
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Encoded packets survive a real datagram hop intact.
    #[tokio::test]
    async fn packets_roundtrip_over_the_wire() {
        let a = Endpoint::bind("127.0.0.1:0").await.unwrap();
        let b = Endpoint::bind("127.0.0.1:0").await.unwrap();

        let packets = vec![
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                update_port: 9700,
            },
            Packet::Connected { client_id: 12 },
            Packet::MapRequest,
            Packet::TurnBatch {
                actions: vec![(1, Action::Up), (2, Action::Left)],
            },
            Packet::Submit { action: Action::Quit },
            Packet::Snapshot {
                frame: "+--+\n|..|\n+--+\n".to_string(),
            },
        ];

        for packet in packets {
            let encoded = codec::encode(&packet).unwrap();
            a.send(&encoded, b.local_addr().unwrap()).await.unwrap();

            let (payload, _) = b.recv().await.unwrap();
            assert_eq!(codec::decode(&payload).unwrap(), packet);
        }
    }
}

/// SESSION LIFECYCLE TESTS
mod session_tests {
    use super::*;

    /// Scenario: connect request, acknowledgment, ready marker. Two round
    /// trips complete the handshake and the world-running mark fires
    /// exactly once, however many clients join.
    #[tokio::test]
    async fn handshake_completes_and_marks_world_running_once() {
        let world = Arc::new(CountingWorld::new(8, 8));
        let addr = start_server(
            world.clone(),
            Duration::from_secs(60),
            Duration::from_secs(30),
        )
        .await;

        // Round trip one: connect/acknowledge. Round trip two: ready
        // marker answered by the first batch/snapshot pair.
        let (_c1, _feed1, id1) = connect_ready(addr).await;
        assert_eq!(id1, 1);
        assert_eq!(world.running_calls(), 1);

        let (_c2, _feed2, id2) = connect_ready(addr).await;
        assert_eq!(id2, 2);
        assert_eq!(world.running_calls(), 1);
    }

    /// Scenario: two clients submit in the same tick window; both pairs
    /// appear in the resulting batch regardless of arrival order.
    #[tokio::test]
    async fn same_window_submissions_both_appear_in_the_batch() {
        let world = Arc::new(GridWorld::new(8, 8));
        // A one-minute tick keeps the registry from being consumed
        // mid-test.
        let addr = start_server(world, Duration::from_secs(60), Duration::from_secs(30)).await;

        let (mut c1, _feed1, id1) = connect_ready(addr).await;
        let (mut c2, _feed2, id2) = connect_ready(addr).await;

        c1.submit(Action::Up).await.unwrap();
        c2.submit(Action::Left).await.unwrap();

        let batch = c2.batch();
        assert!(batch.contains(&(id1, Action::Up)), "batch: {:?}", batch);
        assert!(batch.contains(&(id2, Action::Left)), "batch: {:?}", batch);
    }

    /// Scenario: a client sends the leave signal; it disappears from every
    /// later batch and stops receiving snapshot updates.
    #[tokio::test]
    async fn leaving_client_vanishes_from_batches_and_updates() {
        let world = Arc::new(GridWorld::new(8, 8));
        let addr = start_server(
            world,
            Duration::from_millis(100),
            Duration::from_secs(30),
        )
        .await;

        let (mut c1, feed1, id1) = connect_ready(addr).await;
        let (mut c2, feed2, _id2) = connect_ready(addr).await;

        // Updates flow to both subscribers while both are live.
        assert!(wait_for_update(&feed1, 20).await.is_some());
        assert!(wait_for_update(&feed2, 20).await.is_some());

        c1.submit(Action::Up).await.unwrap();
        c1.leave().await.unwrap();
        sleep(Duration::from_millis(300)).await;

        // No batch after the disconnect may mention the departed client.
        for action in [Action::Left, Action::Down, Action::Right] {
            c2.submit(action).await.unwrap();
            assert!(
                c2.batch().iter().all(|(id, _)| *id != id1),
                "batch still mentions departed client: {:?}",
                c2.batch()
            );
        }

        // The departed client's update endpoint was unsubscribed.
        feed1.poll_latest().unwrap();
        sleep(Duration::from_millis(500)).await;
        assert!(feed1.poll_latest().unwrap().is_none());

        // The remaining subscriber still receives snapshots.
        assert!(wait_for_update(&feed2, 20).await.is_some());
    }

    /// A corrupt datagram tears down the session it came from and nothing
    /// else.
    #[tokio::test]
    async fn malformed_datagram_is_fatal_to_one_session_only() {
        let world = Arc::new(GridWorld::new(8, 8));
        let addr = start_server(world, Duration::from_secs(60), Duration::from_secs(30)).await;

        // First client drives the wire directly.
        let raw = Endpoint::bind("127.0.0.1:0").await.unwrap();
        let connect = codec::encode(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
            update_port: 9750,
        })
        .unwrap();
        raw.send(&connect, addr).await.unwrap();

        let ack = raw
            .recv_from_timeout(addr, Duration::from_secs(2), "the connect acknowledgment")
            .await
            .unwrap();
        assert!(matches!(
            codec::decode(&ack).unwrap(),
            Packet::Connected { .. }
        ));

        raw.send(&codec::encode(&Packet::MapRequest).unwrap(), addr)
            .await
            .unwrap();
        raw.recv_from_timeout(addr, Duration::from_secs(2), "the first batch")
            .await
            .unwrap();
        raw.recv_from_timeout(addr, Duration::from_secs(2), "the first snapshot")
            .await
            .unwrap();

        let (mut c2, _feed2, _) = connect_ready(addr).await;

        // Garbage from the first client's control endpoint.
        raw.send(&[0xDE, 0xAD, 0xBE, 0xEF], addr).await.unwrap();
        sleep(Duration::from_millis(200)).await;

        // The second session is unaffected.
        c2.submit(Action::Down).await.unwrap();

        // The first session is gone: later submissions from its address
        // are ignored, so nothing comes back.
        let submit = codec::encode(&Packet::Submit { action: Action::Up }).unwrap();
        raw.send(&submit, addr).await.unwrap();
        let silence = raw
            .recv_from_timeout(addr, Duration::from_millis(300), "a reply")
            .await;
        assert!(matches!(silence, Err(TransportError::Timeout(_))));
    }

    /// A client that goes silent past the deadline is evicted: its update
    /// subscription is dropped and its slot is freed.
    #[tokio::test]
    async fn stalled_client_is_evicted_after_the_deadline() {
        let world = Arc::new(GridWorld::new(8, 8));
        let addr = start_server(
            world,
            Duration::from_millis(100),
            Duration::from_millis(500),
        )
        .await;

        let (_c1, feed1, _) = connect_ready(addr).await;
        assert!(wait_for_update(&feed1, 20).await.is_some());

        // Say nothing past the deadline; the sweep runs once a second.
        sleep(Duration::from_millis(2500)).await;

        feed1.poll_latest().unwrap();
        sleep(Duration::from_millis(500)).await;
        assert!(
            feed1.poll_latest().unwrap().is_none(),
            "evicted client still receives updates"
        );

        // The freed slot admits a new client.
        let (_c2, feed2, _) = connect_ready(addr).await;
        assert!(wait_for_update(&feed2, 20).await.is_some());
    }
}
