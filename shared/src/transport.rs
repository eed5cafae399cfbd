//! Datagram endpoint owned by exactly one logical channel.
//!
//! The server's control channel, the server's update channel and each
//! client's two channels all hold their own [`Endpoint`]; sockets are never
//! shared between roles. Failures come back as [`TransportError`] values.

use crate::error::TransportError;
use log::debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Largest datagram either side will send or accept.
pub const MAX_DATAGRAM: usize = 2048;

/// One bound UDP socket with send/receive primitives.
pub struct Endpoint {
    socket: UdpSocket,
}

impl Endpoint {
    /// Binds a new endpoint to the given local address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { socket })
    }

    /// The address this endpoint is actually bound to (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Recv)
    }

    /// Sends one datagram to `dest`.
    pub async fn send(&self, payload: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.socket
            .send_to(payload, dest)
            .await
            .map_err(|source| TransportError::Send { dest, source })?;
        Ok(())
    }

    /// Receives one datagram from any sender.
    ///
    /// Used where new peers are discovered; established channels use the
    /// filtered variants below.
    pub async fn recv(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, source) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(TransportError::Recv)?;
        Ok((buf[..len].to_vec(), source))
    }

    /// Receives one datagram from `source`, silently discarding datagrams
    /// from anyone else.
    pub async fn recv_from(&self, source: SocketAddr) -> Result<Vec<u8>, TransportError> {
        loop {
            let (payload, from) = self.recv().await?;
            if from == source {
                return Ok(payload);
            }
            debug!("discarding datagram from unexpected source {}", from);
        }
    }

    /// Filtered receive with a deadline. Expiry maps to
    /// [`TransportError::Timeout`] so callers can treat a silent peer the
    /// same way they treat any other transport failure.
    pub async fn recv_from_timeout(
        &self,
        source: SocketAddr,
        deadline: Duration,
        waiting_for: &'static str,
    ) -> Result<Vec<u8>, TransportError> {
        tokio::time::timeout(deadline, self.recv_from(source))
            .await
            .map_err(|_| TransportError::Timeout(waiting_for))?
    }

    /// Non-blocking poll for a pending datagram.
    ///
    /// Returns `Ok(None)` when nothing has arrived. The update channel is
    /// read this way so a subscriber never stalls on data that is not there.
    pub fn try_recv(&self) -> Result<Option<(Vec<u8>, SocketAddr)>, TransportError> {
        let mut buf = [0u8; MAX_DATAGRAM];
        match self.socket.try_recv_from(&mut buf) {
            Ok((len, source)) => Ok(Some((buf[..len].to_vec(), source))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TransportError::Recv(e)),
        }
    }
}
