// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic advertise beacon.
//!
//! One beacon exists per advertised (topic, node) pair. It re-broadcasts the
//! same ADVERTISE datagram at the advertise interval so that peers joining
//! late, or peers that missed the initial broadcast, still learn the
//! publisher's endpoints. The interval is shared with the discovery engine;
//! a running beacon picks up a changed value on its next cycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::transport::udp::DiscoverySocket;

/// Handle of one beacon thread. Dropping it stops the retransmission.
pub struct Beacon {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Beacon {
    /// Spawn a beacon re-broadcasting `datagram` at `interval_ms`.
    ///
    /// The first broadcast happens one interval after spawn; the caller is
    /// expected to have sent the initial ADVERTISE itself.
    pub fn spawn(
        socket: Arc<DiscoverySocket>,
        datagram: Vec<u8>,
        interval_ms: Arc<AtomicU64>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let handle = thread::spawn(move || {
            beacon_loop(&socket, &datagram, &interval_ms, &shutdown_clone);
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }
}

impl Drop for Beacon {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn beacon_loop(
    socket: &DiscoverySocket,
    datagram: &[u8],
    interval_ms: &AtomicU64,
    shutdown: &AtomicBool,
) {
    loop {
        // Sleep in small chunks so shutdown stays responsive.
        let sleep_end =
            Instant::now() + Duration::from_millis(interval_ms.load(Ordering::Relaxed));
        while Instant::now() < sleep_end {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }

        if shutdown.load(Ordering::Relaxed) {
            return;
        }

        if let Err(e) = socket.send(datagram) {
            log::debug!("[beacon] failed to re-broadcast advertise: {}", e);
        }
    }
}
