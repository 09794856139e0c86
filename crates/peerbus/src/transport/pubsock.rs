// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher streaming socket.
//!
//! One per process. Accepts subscriber connections, tracks the filter set
//! each connection installed, and fans every published message out to the
//! connections whose filters prefix-match the message's topic frame.
//!
//! Subscribers announce filter changes upstream with one-byte-opcode frames
//! (`1` install, `0` remove) followed by the filter bytes; topic updates flow
//! downstream as `[filter][payload]` two-frame messages.

use std::collections::HashSet;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::STREAM_LINGER_MS;
use crate::transport::frame::{read_frame, write_message};
use crate::{Error, Result};

/// Filter install opcode on the subscription upstream.
pub const SUB_OP_INSTALL: u8 = 1;

/// Filter remove opcode on the subscription upstream.
pub const SUB_OP_REMOVE: u8 = 0;

/// One accepted subscriber connection.
struct PubConn {
    peer: SocketAddr,
    /// Write half. Reads happen on a cloned handle in the reader thread.
    stream: Mutex<TcpStream>,
    filters: Mutex<HashSet<Vec<u8>>>,
    alive: AtomicBool,
}

struct PubShared {
    conns: Mutex<Vec<Arc<PubConn>>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

/// The process-wide publisher endpoint.
pub struct PubSocket {
    addr: String,
    shared: Arc<PubShared>,
    accept_handle: Option<JoinHandle<()>>,
}

impl PubSocket {
    /// Bind on `<host>:*` and start accepting subscriber connections.
    pub fn bind(host: &str) -> Result<Self> {
        let listener = TcpListener::bind((host, 0)).map_err(Error::Io)?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();
        listener.set_nonblocking(true).map_err(Error::Io)?;
        log::debug!("[pubsock] bound publisher endpoint at {}", addr);

        let shared = Arc::new(PubShared {
            conns: Mutex::new(Vec::new()),
            readers: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_handle = thread::spawn(move || accept_loop(&listener, &accept_shared));

        Ok(Self {
            addr,
            shared,
            accept_handle: Some(accept_handle),
        })
    }

    /// The bound `host:port` endpoint.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Fan one message out to every connection whose installed filters
    /// prefix-match `topic`.
    pub fn publish(&self, topic: &[u8], payload: &[u8]) -> Result<()> {
        let conns: Vec<Arc<PubConn>> = self.shared.conns.lock().clone();
        for conn in &conns {
            if !conn.alive.load(Ordering::Relaxed) {
                continue;
            }
            let interested = conn
                .filters
                .lock()
                .iter()
                .any(|filter| topic.starts_with(filter.as_slice()));
            if !interested {
                continue;
            }
            let mut stream = conn.stream.lock();
            if let Err(e) = write_message(&mut *stream, &[topic, payload]) {
                // A stalled or vanished subscriber is dropped, not waited on.
                log::debug!("[pubsock] dropping subscriber {}: {}", conn.peer, e);
                conn.alive.store(false, Ordering::Relaxed);
                let _ = stream.shutdown(Shutdown::Both);
            }
        }

        self.shared
            .conns
            .lock()
            .retain(|c| c.alive.load(Ordering::Relaxed));
        Ok(())
    }

    /// Number of live subscriber connections.
    pub fn connection_count(&self) -> usize {
        self.shared
            .conns
            .lock()
            .iter()
            .filter(|c| c.alive.load(Ordering::Relaxed))
            .count()
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        for conn in self.shared.conns.lock().iter() {
            let _ = conn.stream.lock().shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        let readers: Vec<JoinHandle<()>> = self.shared.readers.lock().drain(..).collect();
        for handle in readers {
            let _ = handle.join();
        }
    }
}

fn accept_loop(listener: &TcpListener, shared: &Arc<PubShared>) {
    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = register_subscriber(stream, peer, shared) {
                    log::debug!("[pubsock] failed to register subscriber {}: {}", peer, e);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                log::warn!("[pubsock] accept error: {}", e);
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn register_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    shared: &Arc<PubShared>,
) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(Duration::from_millis(STREAM_LINGER_MS)))?;
    let mut reader_stream = stream.try_clone()?;

    let conn = Arc::new(PubConn {
        peer,
        stream: Mutex::new(stream),
        filters: Mutex::new(HashSet::new()),
        alive: AtomicBool::new(true),
    });
    shared.conns.lock().push(Arc::clone(&conn));
    log::debug!("[pubsock] subscriber connected from {}", peer);

    let handle = thread::spawn(move || {
        // Drain subscription opcode frames until the peer goes away.
        loop {
            match read_frame(&mut reader_stream) {
                Ok((frame, _)) if !frame.is_empty() => {
                    let filter = frame[1..].to_vec();
                    match frame[0] {
                        SUB_OP_INSTALL => {
                            conn.filters.lock().insert(filter);
                        }
                        SUB_OP_REMOVE => {
                            conn.filters.lock().remove(&filter);
                        }
                        op => {
                            log::debug!("[pubsock] unknown subscription opcode {}", op);
                        }
                    }
                }
                Ok(_) => {
                    log::debug!("[pubsock] empty subscription frame from {}", conn.peer);
                }
                Err(_) => {
                    conn.alive.store(false, Ordering::Relaxed);
                    break;
                }
            }
        }
    });
    shared.readers.lock().push(handle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::frame::{read_message, write_frame};

    fn install_filter(stream: &mut TcpStream, filter: &[u8]) {
        let mut frame = Vec::with_capacity(1 + filter.len());
        frame.push(SUB_OP_INSTALL);
        frame.extend_from_slice(filter);
        write_frame(stream, &frame, false).expect("filter install sent");
    }

    #[test]
    fn test_publish_reaches_matching_filter() {
        let socket = PubSocket::bind("127.0.0.1").expect("bind succeeds");
        let mut sub = TcpStream::connect(socket.addr()).expect("connect succeeds");
        install_filter(&mut sub, b"@p@msg@/chatter");

        // Let the reader thread register the filter.
        std::thread::sleep(Duration::from_millis(100));

        socket
            .publish(b"@p@msg@/chatter", b"HELLO")
            .expect("publish succeeds");

        let frames = read_message(&mut sub).expect("message arrives");
        assert_eq!(frames[0], b"@p@msg@/chatter");
        assert_eq!(frames[1], b"HELLO");
    }

    #[test]
    fn test_publish_skips_non_matching_filter() {
        let socket = PubSocket::bind("127.0.0.1").expect("bind succeeds");
        let mut sub = TcpStream::connect(socket.addr()).expect("connect succeeds");
        install_filter(&mut sub, b"@p@msg@/other");
        std::thread::sleep(Duration::from_millis(100));

        socket
            .publish(b"@p@msg@/chatter", b"HELLO")
            .expect("publish succeeds");
        socket
            .publish(b"@p@msg@/other", b"WORLD")
            .expect("publish succeeds");

        // Only the matching topic arrives; the first thing read is /other.
        let frames = read_message(&mut sub).expect("message arrives");
        assert_eq!(frames[0], b"@p@msg@/other");
        assert_eq!(frames[1], b"WORLD");
    }

    #[test]
    fn test_filter_removal_stops_delivery() {
        let socket = PubSocket::bind("127.0.0.1").expect("bind succeeds");
        let mut sub = TcpStream::connect(socket.addr()).expect("connect succeeds");
        install_filter(&mut sub, b"@p@msg@/chatter");
        std::thread::sleep(Duration::from_millis(100));

        let mut frame = vec![SUB_OP_REMOVE];
        frame.extend_from_slice(b"@p@msg@/chatter");
        write_frame(&mut sub, &frame, false).expect("filter removal sent");
        std::thread::sleep(Duration::from_millis(100));

        socket
            .publish(b"@p@msg@/chatter", b"HELLO")
            .expect("publish succeeds");

        sub.set_read_timeout(Some(Duration::from_millis(200)))
            .expect("timeout set");
        assert!(read_message(&mut sub).is_err(), "no message should arrive");
    }

    #[test]
    fn test_dead_subscriber_is_pruned() {
        let socket = PubSocket::bind("127.0.0.1").expect("bind succeeds");
        let mut sub = TcpStream::connect(socket.addr()).expect("connect succeeds");
        install_filter(&mut sub, b"@p@msg@/chatter");
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(socket.connection_count(), 1);

        drop(sub);
        std::thread::sleep(Duration::from_millis(100));

        // The write after disconnect fails and the connection is pruned.
        socket
            .publish(b"@p@msg@/chatter", b"HELLO")
            .expect("publish succeeds");
        socket
            .publish(b"@p@msg@/chatter", b"HELLO")
            .expect("publish succeeds");
        assert_eq!(socket.connection_count(), 0);
    }
}
