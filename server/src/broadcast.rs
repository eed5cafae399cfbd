//! Out-of-band snapshot fan-out to subscribed update endpoints.

use log::{debug, warn};
use shared::{codec, Endpoint, Packet, ProtocolError, TransportError};
use std::collections::HashSet;
use std::net::SocketAddr;
use tokio::sync::Mutex;

/// Pushes serialized world snapshots to every registered update endpoint,
/// independent of the control-channel tick exchange.
///
/// Owns its own [`Endpoint`]; the control socket is never reused for
/// updates. A failed send to one subscriber never blocks or aborts
/// delivery to the others.
pub struct UpdateBroadcaster {
    endpoint: Endpoint,
    subscribers: Mutex<HashSet<SocketAddr>>,
}

impl UpdateBroadcaster {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            subscribers: Mutex::new(HashSet::new()),
        }
    }

    /// Local address of the update channel's socket.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.endpoint.local_addr()
    }

    /// Registers an update endpoint. Idempotent.
    pub async fn subscribe(&self, addr: SocketAddr) {
        if self.subscribers.lock().await.insert(addr) {
            debug!("update subscriber added: {}", addr);
        }
    }

    /// Removes an update endpoint. Idempotent.
    pub async fn unsubscribe(&self, addr: SocketAddr) {
        if self.subscribers.lock().await.remove(&addr) {
            debug!("update subscriber removed: {}", addr);
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn is_subscribed(&self, addr: SocketAddr) -> bool {
        self.subscribers.lock().await.contains(&addr)
    }

    /// Sends the snapshot to every subscriber.
    ///
    /// Returns the subscribers whose delivery failed, paired with the
    /// transport error; successful deliveries are unaffected by failed
    /// ones. Failures are logged per subscriber, never aggregated.
    pub async fn publish(
        &self,
        frame: &str,
    ) -> Result<Vec<(SocketAddr, TransportError)>, ProtocolError> {
        let payload = codec::encode(&Packet::Snapshot {
            frame: frame.to_string(),
        })?;

        let targets: Vec<SocketAddr> = self.subscribers.lock().await.iter().copied().collect();

        let mut failures = Vec::new();
        for addr in targets {
            if let Err(e) = self.endpoint.send(&payload, addr).await {
                warn!("snapshot delivery to {} failed: {}", addr, e);
                failures.push((addr, e));
            }
        }
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn broadcaster() -> UpdateBroadcaster {
        UpdateBroadcaster::new(Endpoint::bind("127.0.0.1:0").await.unwrap())
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let broadcaster = broadcaster().await;

        broadcaster.subscribe(addr(9100)).await;
        broadcaster.subscribe(addr(9100)).await;
        broadcaster.subscribe(addr(9100)).await;

        assert_eq!(broadcaster.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let broadcaster = broadcaster().await;

        broadcaster.subscribe(addr(9101)).await;
        broadcaster.unsubscribe(addr(9101)).await;
        broadcaster.unsubscribe(addr(9101)).await;

        assert_eq!(broadcaster.subscriber_count().await, 0);
        assert!(!broadcaster.is_subscribed(addr(9101)).await);
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let broadcaster = broadcaster().await;

        let a = Endpoint::bind("127.0.0.1:0").await.unwrap();
        let b = Endpoint::bind("127.0.0.1:0").await.unwrap();
        broadcaster.subscribe(a.local_addr().unwrap()).await;
        broadcaster.subscribe(b.local_addr().unwrap()).await;

        let failures = broadcaster.publish("tick 1 frame").await.unwrap();
        assert!(failures.is_empty());

        for listener in [&a, &b] {
            let (payload, _) = listener.recv().await.unwrap();
            match codec::decode(&payload).unwrap() {
                Packet::Snapshot { frame } => assert_eq!(frame, "tick 1 frame"),
                other => panic!("expected snapshot, got {}", other.kind()),
            }
        }
    }

    #[tokio::test]
    async fn one_unreachable_subscriber_does_not_abort_delivery() {
        let broadcaster = broadcaster().await;

        let a = Endpoint::bind("127.0.0.1:0").await.unwrap();
        let b = Endpoint::bind("127.0.0.1:0").await.unwrap();
        // Port 0 is not a valid destination, so sends to it fail.
        let unreachable = addr(0);

        broadcaster.subscribe(a.local_addr().unwrap()).await;
        broadcaster.subscribe(unreachable).await;
        broadcaster.subscribe(b.local_addr().unwrap()).await;

        let failures = broadcaster.publish("partial delivery").await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, unreachable);

        for listener in [&a, &b] {
            let (payload, _) = listener.recv().await.unwrap();
            match codec::decode(&payload).unwrap() {
                Packet::Snapshot { frame } => assert_eq!(frame, "partial delivery"),
                other => panic!("expected snapshot, got {}", other.kind()),
            }
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_no_op() {
        let broadcaster = broadcaster().await;
        let failures = broadcaster.publish("nobody listening").await.unwrap();
        assert!(failures.is_empty());
    }
}
