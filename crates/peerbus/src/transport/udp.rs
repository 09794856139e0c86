// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP broadcast socket for discovery traffic.
//!
//! One socket per discovery engine, bound to the discovery port on all
//! interfaces and configured for broadcast. Receives carry a poll timeout so
//! the reception task can interleave its exit check.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::POLL_TIMEOUT_MS;

/// Broadcast socket used for sending and receiving discovery datagrams.
pub struct DiscoverySocket {
    socket: UdpSocket,
    broadcast_addr: SocketAddr,
}

impl DiscoverySocket {
    /// Bind the discovery socket on `port`.
    ///
    /// `SO_REUSEADDR` (and `SO_REUSEPORT` on unix) let several processes on
    /// one host share the discovery port; broadcast datagrams are delivered
    /// to all of them.
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(Some(Duration::from_millis(POLL_TIMEOUT_MS)))?;

        let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
        socket.bind(&bind_addr.into())?;
        log::debug!("[udp] discovery socket bound to {}", bind_addr);

        Ok(Self {
            socket: socket.into(),
            broadcast_addr: (Ipv4Addr::BROADCAST, port).into(),
        })
    }

    /// Broadcast one datagram to the discovery group.
    pub fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        self.socket.send_to(datagram, self.broadcast_addr)
    }

    /// Receive one datagram, waiting at most the poll timeout.
    ///
    /// Returns `Ok(None)` when the timeout elapsed without traffic.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((len, src)) => Ok(Some((len, src))),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_timeout() {
        // An out-of-the-way port so parallel test runs don't interfere.
        let socket = DiscoverySocket::bind(39_431).expect("bind succeeds");
        let mut buf = [0u8; 128];
        // Nothing was sent, so the receive times out cleanly.
        let got = socket.recv(&mut buf).expect("timeout is not an error");
        assert!(got.is_none());
    }

    #[test]
    fn test_two_sockets_share_port() {
        let a = DiscoverySocket::bind(39_432).expect("first bind succeeds");
        let _b = DiscoverySocket::bind(39_432).expect("second bind succeeds");
        drop(a);
    }
}
