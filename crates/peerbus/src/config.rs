// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global configuration: wire constants, default intervals, environment
//! resolution.
//!
//! Every tunable that crosses the wire or paces a background task lives here
//! as a named constant. Environment variables are resolved once, at
//! construction time of the objects that consume them.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

/// Discovery wire protocol version. Bump when the packet layout changes;
/// datagrams with a foreign version are dropped before dispatch.
pub const WIRE_VERSION: u16 = 1;

/// UDP port used to broadcast discovery datagrams.
pub const DISCOVERY_PORT: u16 = 11312;

/// Default activity-audit interval (ms).
pub const DEF_ACTIVITY_INTERVAL_MS: u64 = 100;

/// Default heartbeat broadcast interval (ms).
pub const DEF_HEARTBEAT_INTERVAL_MS: u64 = 1_000;

/// Default beacon re-advertise interval (ms).
pub const DEF_ADVERTISE_INTERVAL_MS: u64 = 1_000;

/// Default maximum time without hearing from a process before its entries
/// are evicted (ms).
pub const DEF_SILENCE_INTERVAL_MS: u64 = 3_000;

/// Poll timeout used by the reception task for each receive (ms).
pub const POLL_TIMEOUT_MS: u64 = 250;

/// Longest discovery datagram accepted.
pub const MAX_RCV_LEN: usize = 65_536;

/// Maximum characters in a namespace, partition, topic, or fully qualified
/// topic name.
pub const MAX_NAME_LEN: usize = 65_535;

/// Write timeout applied to streaming connections; a peer that stalls longer
/// than this is dropped rather than blocking publishers indefinitely.
pub const STREAM_LINGER_MS: u64 = 200;

/// Control opcode: a remote subscriber signals interest in a topic.
pub const OP_NEW_CONNECTION: u8 = 9;

/// Control opcode: a remote subscriber withdraws interest in a topic.
pub const OP_END_CONNECTION: u8 = 10;

/// Resolve the host IP address used for scope filtering and socket binds.
///
/// `IGN_IP` overrides the selection; an empty value is reported as invalid
/// and ignored. Otherwise the primary outbound interface address is probed
/// with a connected (but traffic-free) UDP socket, falling back to loopback.
pub fn determine_host_addr() -> String {
    match std::env::var("IGN_IP") {
        Ok(ip) if !ip.is_empty() => return ip,
        Ok(_) => {
            log::warn!("[config] IGN_IP is set but empty; ignoring it");
        }
        Err(_) => {}
    }
    primary_interface_ip().unwrap_or_else(|| Ipv4Addr::LOCALHOST.to_string())
}

/// Probe the primary outbound interface by connecting a UDP socket to a
/// routable address. No packet is sent; the kernel just picks a source IP.
fn primary_interface_ip() -> Option<String> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    let probe: SocketAddr = (Ipv4Addr::new(8, 8, 8, 8), 53).into();
    socket.connect(probe).ok()?;
    let local = socket.local_addr().ok()?;
    if local.ip().is_unspecified() {
        None
    } else {
        Some(local.ip().to_string())
    }
}

/// Resolve the partition for a node.
///
/// `IGN_PARTITION` wins when set; otherwise the default is `host:user`.
pub fn default_partition() -> String {
    if let Ok(partition) = std::env::var("IGN_PARTITION") {
        return partition;
    }
    format!("{}:{}", host_name(), user_name())
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "localhost".to_string())
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "anonymous".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals() {
        assert_eq!(DEF_ACTIVITY_INTERVAL_MS, 100);
        assert_eq!(DEF_HEARTBEAT_INTERVAL_MS, 1_000);
        assert_eq!(DEF_ADVERTISE_INTERVAL_MS, 1_000);
        assert_eq!(DEF_SILENCE_INTERVAL_MS, 3_000);
    }

    #[test]
    fn test_host_addr_not_empty() {
        let addr = determine_host_addr();
        assert!(!addr.is_empty());
    }

    #[test]
    fn test_partition_shape() {
        // Either IGN_PARTITION or host:user; both are non-empty in practice,
        // and the fallback always contains the separator.
        let partition = default_partition();
        if std::env::var("IGN_PARTITION").is_err() {
            assert!(partition.contains(':'));
        }
    }
}
