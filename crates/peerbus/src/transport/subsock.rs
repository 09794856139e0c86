// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber streaming socket.
//!
//! One per process, with a dynamic filter set shared by every node.
//! Maintains at most one outbound connection per publisher address; on
//! connect (and on every filter-set change) the installed filters are
//! announced upstream so the publisher can fan out selectively. Incoming
//! `[filter][payload]` messages are forwarded to the shared reception loop.

use std::collections::{HashMap, HashSet};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Sender;
use parking_lot::Mutex;

use crate::config::STREAM_LINGER_MS;
use crate::transport::frame::{read_message, write_frame};
use crate::transport::pubsock::{SUB_OP_INSTALL, SUB_OP_REMOVE};
use crate::transport::Event;
use crate::{Error, Result};

struct SubConn {
    /// Write half used for filter announcements.
    stream: Mutex<TcpStream>,
    reader: Option<JoinHandle<()>>,
}

struct SubShared {
    tx: Sender<Event>,
    conns: Mutex<HashMap<String, SubConn>>,
    filters: Mutex<HashSet<Vec<u8>>>,
    shutdown: AtomicBool,
}

/// The process-wide subscriber endpoint.
pub struct SubSocket {
    shared: Arc<SubShared>,
}

impl SubSocket {
    /// Create a subscriber socket forwarding received messages into `tx`.
    pub fn new(tx: Sender<Event>) -> Self {
        Self {
            shared: Arc::new(SubShared {
                tx,
                conns: Mutex::new(HashMap::new()),
                filters: Mutex::new(HashSet::new()),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Connect to a publisher's primary endpoint. Idempotent per address:
    /// returns `false` when a connection to `addr` already exists.
    pub fn connect(&self, addr: &str) -> Result<bool> {
        {
            let conns = self.shared.conns.lock();
            if conns.contains_key(addr) {
                return Ok(false);
            }
        }

        let stream = TcpStream::connect(addr).map_err(Error::Io)?;
        stream.set_nodelay(true).map_err(Error::Io)?;
        stream
            .set_write_timeout(Some(Duration::from_millis(STREAM_LINGER_MS)))
            .map_err(Error::Io)?;
        let mut reader_stream = stream.try_clone().map_err(Error::Io)?;

        // Announce the current filter set before any message can flow.
        {
            let filters = self.shared.filters.lock();
            let mut write_half = &stream;
            for filter in filters.iter() {
                send_filter_op(&mut write_half, SUB_OP_INSTALL, filter).map_err(Error::Io)?;
            }
        }

        let shared = Arc::clone(&self.shared);
        let peer = addr.to_string();
        let reader = thread::spawn(move || {
            loop {
                match read_message(&mut reader_stream) {
                    Ok(frames) if frames.len() == 2 => {
                        let mut frames = frames;
                        let payload = frames.pop().unwrap_or_default();
                        let topic = frames.pop().unwrap_or_default();
                        if shared.tx.send(Event::Message { topic, payload }).is_err() {
                            break;
                        }
                    }
                    Ok(frames) => {
                        log::debug!(
                            "[subsock] unexpected {}-frame message from {}",
                            frames.len(),
                            peer
                        );
                    }
                    Err(e) => {
                        if !shared.shutdown.load(Ordering::Relaxed) {
                            log::debug!("[subsock] connection to {} closed: {}", peer, e);
                        }
                        break;
                    }
                }
            }
            shared.conns.lock().remove(&peer);
        });

        self.shared.conns.lock().insert(
            addr.to_string(),
            SubConn {
                stream: Mutex::new(stream),
                reader: Some(reader),
            },
        );
        log::debug!("[subsock] connected to publisher at {}", addr);
        Ok(true)
    }

    /// Whether a connection to `addr` exists.
    pub fn has_connection(&self, addr: &str) -> bool {
        self.shared.conns.lock().contains_key(addr)
    }

    /// Install a topic filter and announce it on every connection.
    pub fn add_filter(&self, filter: &[u8]) {
        if !self.shared.filters.lock().insert(filter.to_vec()) {
            return;
        }
        self.broadcast_filter_op(SUB_OP_INSTALL, filter);
    }

    /// Remove a topic filter and announce the removal on every connection.
    pub fn remove_filter(&self, filter: &[u8]) {
        if !self.shared.filters.lock().remove(filter) {
            return;
        }
        self.broadcast_filter_op(SUB_OP_REMOVE, filter);
    }

    /// Tear down the connection to `addr` (publisher vanished).
    pub fn disconnect(&self, addr: &str) {
        let conn = self.shared.conns.lock().remove(addr);
        if let Some(mut conn) = conn {
            let _ = conn.stream.lock().shutdown(Shutdown::Both);
            if let Some(reader) = conn.reader.take() {
                let _ = reader.join();
            }
        }
    }

    fn broadcast_filter_op(&self, op: u8, filter: &[u8]) {
        let conns = self.shared.conns.lock();
        for (addr, conn) in conns.iter() {
            let mut stream = conn.stream.lock();
            if let Err(e) = send_filter_op(&mut &*stream, op, filter) {
                log::debug!("[subsock] filter update to {} failed: {}", addr, e);
            }
        }
    }
}

impl Drop for SubSocket {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        let addrs: Vec<String> = self.shared.conns.lock().keys().cloned().collect();
        for addr in addrs {
            self.disconnect(&addr);
        }
    }
}

fn send_filter_op(stream: &mut impl std::io::Write, op: u8, filter: &[u8]) -> std::io::Result<()> {
    let mut frame = Vec::with_capacity(1 + filter.len());
    frame.push(op);
    frame.extend_from_slice(filter);
    write_frame(stream, &frame, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::pubsock::PubSocket;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_connect_is_idempotent() {
        let publisher = PubSocket::bind("127.0.0.1").expect("bind succeeds");
        let (tx, _rx) = unbounded();
        let subscriber = SubSocket::new(tx);

        assert!(subscriber.connect(publisher.addr()).expect("connects"));
        assert!(!subscriber.connect(publisher.addr()).expect("second is no-op"));
        assert!(subscriber.has_connection(publisher.addr()));
    }

    #[test]
    fn test_end_to_end_delivery() {
        let publisher = PubSocket::bind("127.0.0.1").expect("bind succeeds");
        let (tx, rx) = unbounded();
        let subscriber = SubSocket::new(tx);

        subscriber.add_filter(b"@p@msg@/chatter");
        subscriber.connect(publisher.addr()).expect("connects");
        thread::sleep(Duration::from_millis(100));

        publisher
            .publish(b"@p@msg@/chatter", b"HELLO")
            .expect("publish succeeds");

        let event = rx
            .recv_timeout(Duration::from_secs(1))
            .expect("event arrives");
        match event {
            Event::Message { topic, payload } => {
                assert_eq!(topic, b"@p@msg@/chatter");
                assert_eq!(payload, b"HELLO");
            }
            _ => panic!("expected a message event"),
        }
    }

    #[test]
    fn test_filter_added_after_connect_applies() {
        let publisher = PubSocket::bind("127.0.0.1").expect("bind succeeds");
        let (tx, rx) = unbounded();
        let subscriber = SubSocket::new(tx);

        subscriber.connect(publisher.addr()).expect("connects");
        subscriber.add_filter(b"@p@msg@/late");
        thread::sleep(Duration::from_millis(100));

        publisher
            .publish(b"@p@msg@/late", b"WORLD")
            .expect("publish succeeds");

        let event = rx
            .recv_timeout(Duration::from_secs(1))
            .expect("event arrives");
        match event {
            Event::Message { payload, .. } => assert_eq!(payload, b"WORLD"),
            _ => panic!("expected a message event"),
        }
    }

    #[test]
    fn test_disconnect_removes_connection() {
        let publisher = PubSocket::bind("127.0.0.1").expect("bind succeeds");
        let (tx, _rx) = unbounded();
        let subscriber = SubSocket::new(tx);

        subscriber.connect(publisher.addr()).expect("connects");
        subscriber.disconnect(publisher.addr());
        assert!(!subscriber.has_connection(publisher.addr()));
    }
}
