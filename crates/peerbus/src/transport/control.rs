// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control channel: subscription handshakes and the service plane.
//!
//! Each process listens on one control endpoint. Three message shapes arrive
//! there:
//!
//! - connection control, four frames `[topic][subscriber-address]
//!   [subscriber-node-uuid][opcode]` with opcode `NewConnection` or
//!   `EndConnection`;
//! - service requests, three frames `[service][hUuid][request-bytes]`;
//! - service replies never arrive here: the replier writes the four-frame
//!   `[service][hUuid][reply-bytes][success]` message back on the connection
//!   the request came in on, and the requester's reader picks it up.

use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Sender;
use parking_lot::Mutex;

use crate::config::{OP_END_CONNECTION, OP_NEW_CONNECTION, STREAM_LINGER_MS};
use crate::core::uuid::{HandlerUuid, NodeUuid};
use crate::transport::frame::{read_message, write_message};
use crate::transport::{Event, ReplySink};
use crate::{Error, Result};

struct CtrlShared {
    tx: Sender<Event>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    conns: Mutex<Vec<ReplySink>>,
    shutdown: AtomicBool,
}

/// The process-wide control endpoint.
pub struct ControlListener {
    addr: String,
    shared: Arc<CtrlShared>,
    accept_handle: Option<JoinHandle<()>>,
}

impl ControlListener {
    /// Bind on `<host>:*` and start accepting control connections.
    pub fn bind(host: &str, tx: Sender<Event>) -> Result<Self> {
        let listener = TcpListener::bind((host, 0)).map_err(Error::Io)?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();
        listener.set_nonblocking(true).map_err(Error::Io)?;
        log::debug!("[control] bound control endpoint at {}", addr);

        let shared = Arc::new(CtrlShared {
            tx,
            readers: Mutex::new(Vec::new()),
            conns: Mutex::new(Vec::new()),
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
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        for conn in self.shared.conns.lock().iter() {
            let _ = conn.lock().shutdown(Shutdown::Both);
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

fn accept_loop(listener: &TcpListener, shared: &Arc<CtrlShared>) {
    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = register_control_conn(stream, peer, shared) {
                    log::debug!("[control] failed to register connection {}: {}", peer, e);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                log::warn!("[control] accept error: {}", e);
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn register_control_conn(
    stream: TcpStream,
    peer: SocketAddr,
    shared: &Arc<CtrlShared>,
) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let mut reader_stream = stream.try_clone()?;
    let sink: ReplySink = Arc::new(Mutex::new(stream));
    shared.conns.lock().push(Arc::clone(&sink));

    let thread_shared = Arc::clone(shared);
    let handle = thread::spawn(move || loop {
        match read_message(&mut reader_stream) {
            Ok(frames) => {
                if let Some(event) = classify(frames, &sink) {
                    if thread_shared.tx.send(event).is_err() {
                        break;
                    }
                } else {
                    log::warn!("[control] unrecognized control message from {}", peer);
                }
            }
            Err(e) => {
                if !thread_shared.shutdown.load(Ordering::Relaxed) {
                    log::debug!("[control] connection from {} closed: {}", peer, e);
                }
                break;
            }
        }
    });
    shared.readers.lock().push(handle);
    Ok(())
}

/// Map a received multipart message onto an [`Event`].
fn classify(frames: Vec<Vec<u8>>, sink: &ReplySink) -> Option<Event> {
    match frames.len() {
        // [topic][subscriber-address][subscriber-node-uuid][opcode]
        4 if frames[3].len() == 1
            && matches!(frames[3][0], OP_NEW_CONNECTION | OP_END_CONNECTION) =>
        {
            let topic = String::from_utf8(frames[0].clone()).ok()?;
            let addr = String::from_utf8(frames[1].clone()).ok()?;
            let n_uuid = NodeUuid::from_bytes(frames[2].as_slice().try_into().ok()?);
            Some(Event::Control {
                topic,
                addr,
                n_uuid,
                op: frames[3][0],
            })
        }
        // [service][hUuid][request-bytes]
        3 => {
            let mut frames = frames;
            let payload = frames.pop()?;
            let h_uuid = HandlerUuid::from_bytes(frames.pop()?.as_slice().try_into().ok()?);
            let service = String::from_utf8(frames.pop()?).ok()?;
            Some(Event::Request {
                service,
                h_uuid,
                payload,
                reply: Arc::clone(sink),
            })
        }
        _ => None,
    }
}

/// Send one connection-control message to a publisher's control endpoint.
///
/// Opens a short-lived connection, writes the four frames, and closes.
pub fn send_control(
    ctrl_addr: &str,
    topic: &str,
    my_addr: &str,
    n_uuid: NodeUuid,
    op: u8,
) -> Result<()> {
    let stream = TcpStream::connect(ctrl_addr).map_err(Error::Io)?;
    stream
        .set_write_timeout(Some(Duration::from_millis(STREAM_LINGER_MS)))
        .map_err(Error::Io)?;
    let mut write_half = &stream;
    write_message(
        &mut write_half,
        &[
            topic.as_bytes(),
            my_addr.as_bytes(),
            n_uuid.as_bytes(),
            &[op],
        ],
    )
    .map_err(Error::Io)?;
    let _ = stream.shutdown(Shutdown::Write);
    Ok(())
}

/// Write a service reply back on the connection its request arrived on.
pub fn send_reply(
    sink: &ReplySink,
    service: &str,
    h_uuid: HandlerUuid,
    payload: &[u8],
    success: bool,
) -> Result<()> {
    let stream = sink.lock();
    let mut write_half = &*stream;
    write_message(
        &mut write_half,
        &[
            service.as_bytes(),
            h_uuid.as_bytes(),
            payload,
            &[u8::from(success)],
        ],
    )
    .map_err(Error::Io)
}

/// Outbound service-request connections, one per replier endpoint, with a
/// reader thread per connection forwarding replies into the reception loop.
pub struct RequesterPool {
    tx: Sender<Event>,
    conns: Mutex<HashMap<String, ReplySink>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl RequesterPool {
    /// Create an empty pool forwarding replies into `tx`.
    pub fn new(tx: Sender<Event>) -> Self {
        Self {
            tx,
            conns: Mutex::new(HashMap::new()),
            readers: Mutex::new(Vec::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send one request frame to the replier at `addr`, connecting first if
    /// no connection exists yet.
    pub fn send_request(
        &self,
        addr: &str,
        service: &str,
        h_uuid: HandlerUuid,
        payload: &[u8],
    ) -> Result<()> {
        let sink = self.get_or_connect(addr)?;
        let stream = sink.lock();
        let mut write_half = &*stream;
        write_message(
            &mut write_half,
            &[service.as_bytes(), h_uuid.as_bytes(), payload],
        )
        .map_err(|e| {
            // A broken connection is forgotten so the next call redials.
            self.conns.lock().remove(addr);
            Error::Transport(e.to_string())
        })
    }

    fn get_or_connect(&self, addr: &str) -> Result<ReplySink> {
        if let Some(sink) = self.conns.lock().get(addr) {
            return Ok(Arc::clone(sink));
        }

        let stream = TcpStream::connect(addr)
            .map_err(|e| Error::Transport(format!("connect to {}: {}", addr, e)))?;
        stream.set_nodelay(true).map_err(Error::Io)?;
        stream
            .set_write_timeout(Some(Duration::from_millis(STREAM_LINGER_MS)))
            .map_err(Error::Io)?;
        let mut reader_stream = stream.try_clone().map_err(Error::Io)?;
        let sink: ReplySink = Arc::new(Mutex::new(stream));

        let tx = self.tx.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let peer = addr.to_string();
        let handle = thread::spawn(move || loop {
            match read_message(&mut reader_stream) {
                Ok(frames) if frames.len() == 4 && frames[3].len() == 1 => {
                    let mut frames = frames;
                    let success = frames.pop().map(|f| f[0] != 0).unwrap_or(false);
                    let payload = frames.pop().unwrap_or_default();
                    let h_uuid = match frames.pop().map(|f| f.as_slice().try_into()) {
                        Some(Ok(bytes)) => HandlerUuid::from_bytes(bytes),
                        _ => {
                            log::warn!("[control] reply with malformed hUuid from {}", peer);
                            continue;
                        }
                    };
                    let service = String::from_utf8(frames.pop().unwrap_or_default())
                        .unwrap_or_default();
                    if tx
                        .send(Event::Reply {
                            service,
                            h_uuid,
                            payload,
                            success,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(frames) => {
                    log::warn!(
                        "[control] unexpected {}-frame reply from {}",
                        frames.len(),
                        peer
                    );
                }
                Err(e) => {
                    if !shutdown.load(Ordering::Relaxed) {
                        log::debug!("[control] requester connection to {} closed: {}", peer, e);
                    }
                    break;
                }
            }
        });
        self.readers.lock().push(handle);

        self.conns
            .lock()
            .insert(addr.to_string(), Arc::clone(&sink));
        Ok(sink)
    }
}

impl Drop for RequesterPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for sink in self.conns.lock().values() {
            let _ = sink.lock().shutdown(Shutdown::Both);
        }
        let readers: Vec<JoinHandle<()>> = self.readers.lock().drain(..).collect();
        for handle in readers {
            let _ = handle.join();
        }
    }
}
