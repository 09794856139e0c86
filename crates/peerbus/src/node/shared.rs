// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-process shared state.
//!
//! All nodes in a process share one [`NodeShared`]: the streaming endpoints,
//! the discovery engine, the handler registries and the remote-subscriber
//! map. The singleton is reference counted; the first node construction
//! creates it, the last node drop tears it down.
//!
//! Discovery callbacks hold a weak reference back here (the shared state
//! owns the engine, never the other way around) and only ever touch the
//! shared lock and the sockets, keeping the discovery mutex free of
//! re-entrant calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use crate::config::{DISCOVERY_PORT, OP_END_CONNECTION, OP_NEW_CONNECTION, POLL_TIMEOUT_MS};
use crate::core::uuid::ProcessUuid;
use crate::discovery::publisher::{MessagePublisher, ServicePublisher};
use crate::discovery::Discovery;
use crate::node::handlers::{HandlerStorage, RepHandler, ReqHandler, SubscriptionHandler};
use crate::transport::control::{self, ControlListener, RequesterPool};
use crate::transport::pubsock::PubSocket;
use crate::transport::subsock::SubSocket;
use crate::transport::Event;
use crate::Result;

/// Registries and bookkeeping guarded by the shared-state mutex.
pub(crate) struct SharedState {
    /// Topic subscriptions living in this process.
    pub subscriptions: HandlerStorage<SubscriptionHandler>,
    /// Service repliers living in this process.
    pub repliers: HandlerStorage<RepHandler>,
    /// Pending outbound service calls.
    pub requests: HandlerStorage<ReqHandler>,
    /// Topic -> addresses of remote processes known to be subscribed.
    pub remote_subscribers: HashMap<String, HashSet<String>>,
    /// Process -> primary addresses we connected the subscriber socket to.
    /// Consulted when a whole process vanishes.
    pub publisher_addrs: HashMap<ProcessUuid, HashSet<String>>,
}

/// The per-process singleton shared by all nodes.
pub struct NodeShared {
    p_uuid: ProcessUuid,
    host_addr: String,
    my_address: String,
    my_control_address: String,
    replier_id: String,
    pub(crate) discovery: Discovery,
    pub(crate) pub_socket: PubSocket,
    pub(crate) sub_socket: SubSocket,
    #[allow(dead_code)]
    control: ControlListener,
    pub(crate) requester: RequesterPool,
    pub(crate) state: Mutex<SharedState>,
    rx: Mutex<Option<Receiver<Event>>>,
    reception: Mutex<Option<JoinHandle<()>>>,
    exit: AtomicBool,
}

static SHARED: Mutex<Weak<NodeShared>> = Mutex::new(Weak::new());

impl NodeShared {
    /// Get the process-wide instance, creating it on the first call. Each
    /// node holds one strong reference; the instance is torn down when the
    /// last node is dropped.
    pub fn acquire() -> Result<Arc<NodeShared>> {
        let mut guard = SHARED.lock();
        if let Some(existing) = guard.upgrade() {
            return Ok(existing);
        }

        let shared = Arc::new(NodeShared::new()?);
        shared.wire(&shared);
        *guard = Arc::downgrade(&shared);
        Ok(shared)
    }

    fn new() -> Result<Self> {
        let p_uuid = ProcessUuid::random();
        let host_addr = crate::config::determine_host_addr();
        let (tx, rx) = unbounded();

        let pub_socket = PubSocket::bind(&host_addr)?;
        let control = ControlListener::bind(&host_addr, tx.clone())?;
        let sub_socket = SubSocket::new(tx.clone());
        let requester = RequesterPool::new(tx);
        let discovery = Discovery::new(p_uuid, DISCOVERY_PORT)?;

        let my_address = pub_socket.addr().to_string();
        let my_control_address = control.addr().to_string();
        log::debug!(
            "[node] shared state up pUuid={} addr={} ctrl={}",
            p_uuid,
            my_address,
            my_control_address
        );

        Ok(Self {
            p_uuid,
            host_addr,
            my_address,
            my_control_address,
            replier_id: uuid::Uuid::new_v4().simple().to_string(),
            discovery,
            pub_socket,
            sub_socket,
            control,
            requester,
            state: Mutex::new(SharedState {
                subscriptions: HandlerStorage::new(),
                repliers: HandlerStorage::new(),
                requests: HandlerStorage::new(),
                remote_subscribers: HashMap::new(),
                publisher_addrs: HashMap::new(),
            }),
            rx: Mutex::new(Some(rx)),
            reception: Mutex::new(None),
            exit: AtomicBool::new(false),
        })
    }

    /// Wire the discovery callbacks and start the reception loop. Split off
    /// from construction because both need a `Weak` back-reference.
    fn wire(&self, me: &Arc<Self>) {
        let weak = Arc::downgrade(me);
        self.discovery.set_connections_cb(Arc::new({
            let weak = weak.clone();
            move |publisher: &MessagePublisher| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_new_connection(publisher);
                }
            }
        }));
        self.discovery.set_disconnections_cb(Arc::new({
            let weak = weak.clone();
            move |publisher: &MessagePublisher| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_new_disconnection(publisher);
                }
            }
        }));
        self.discovery
            .set_connections_srv_cb(Arc::new(|publisher: &ServicePublisher| {
                log::debug!("[node] service publisher up: [{}]", publisher.topic);
            }));
        self.discovery
            .set_disconnections_srv_cb(Arc::new(|publisher: &ServicePublisher| {
                log::debug!("[node] service publisher down: [{}]", publisher.topic);
            }));

        let rx = self.rx.lock().take();
        if let Some(rx) = rx {
            let handle = thread::spawn(move || reception_loop(&weak, &rx));
            *self.reception.lock() = Some(handle);
        }
    }

    /// Process UUID.
    pub fn p_uuid(&self) -> ProcessUuid {
        self.p_uuid
    }

    /// Host IP address.
    pub fn host_addr(&self) -> &str {
        &self.host_addr
    }

    /// This process's publisher endpoint.
    pub fn my_address(&self) -> &str {
        &self.my_address
    }

    /// This process's control endpoint.
    pub fn my_control_address(&self) -> &str {
        &self.my_control_address
    }

    /// Replier socket identity advertised with every service.
    pub fn replier_id(&self) -> &str {
        &self.replier_id
    }

    /// Whether any remote process is known to subscribe to `topic`.
    pub(crate) fn has_remote_subscribers(&self, topic: &str) -> bool {
        self.state
            .lock()
            .remote_subscribers
            .get(topic)
            .is_some_and(|subs| !subs.is_empty())
    }

    /// Push one serialized message onto the shared publisher socket.
    pub(crate) fn publish(&self, topic: &str, data: &[u8]) -> Result<()> {
        self.pub_socket.publish(topic.as_bytes(), data)
    }

    /// Discovery reported a new message publisher. Connect the shared
    /// subscriber socket if anyone here cares, and announce our interest on
    /// the publisher's control endpoint.
    fn on_new_connection(&self, publisher: &MessagePublisher) {
        if publisher.p_uuid == self.p_uuid {
            return;
        }

        let node_uuids = {
            let state = self.state.lock();
            if !state.subscriptions.has_handlers_for_topic(&publisher.topic) {
                return;
            }
            state.subscriptions.node_uuids_for_topic(&publisher.topic)
        };

        self.sub_socket.add_filter(publisher.topic.as_bytes());
        match self.sub_socket.connect(&publisher.addr) {
            Ok(_) => {
                self.state
                    .lock()
                    .publisher_addrs
                    .entry(publisher.p_uuid)
                    .or_default()
                    .insert(publisher.addr.clone());
            }
            Err(e) => {
                log::warn!(
                    "[node] failed to connect to publisher at {}: {}",
                    publisher.addr,
                    e
                );
                return;
            }
        }

        for n_uuid in node_uuids {
            if let Err(e) = control::send_control(
                &publisher.ctrl,
                &publisher.topic,
                &self.my_address,
                n_uuid,
                OP_NEW_CONNECTION,
            ) {
                log::debug!(
                    "[node] failed to announce interest to {}: {}",
                    publisher.ctrl,
                    e
                );
            }
        }
    }

    /// Discovery reported a publisher going away. An empty topic means the
    /// whole process vanished; its connections are torn down. A topic-level
    /// withdrawal keeps the connection alive for the publisher's other
    /// topics; a dead peer is reaped by the connection reader anyway.
    fn on_new_disconnection(&self, publisher: &MessagePublisher) {
        if !publisher.topic.is_empty() {
            return;
        }
        let addrs = self
            .state
            .lock()
            .publisher_addrs
            .remove(&publisher.p_uuid)
            .unwrap_or_default();
        for addr in addrs {
            log::debug!("[node] dropping connection to vanished process at {}", addr);
            self.sub_socket.disconnect(&addr);
        }
    }

    /// Dispatch one transport event. Runs on the reception loop thread.
    fn handle_event(&self, event: Event) {
        match event {
            Event::Message { topic, payload } => {
                let topic = String::from_utf8_lossy(&topic).into_owned();
                let handlers = { self.state.lock().subscriptions.handlers_for_topic(&topic) };
                if handlers.is_empty() {
                    log::debug!("[node] not subscribed to topic [{}]", topic);
                    return;
                }
                for handler in handlers {
                    handler.run_raw_callback(&topic, &payload);
                }
            }
            Event::Control {
                topic,
                addr,
                n_uuid: _,
                op,
            } => {
                let mut state = self.state.lock();
                match op {
                    OP_NEW_CONNECTION => {
                        log::debug!("[node] remote subscriber {} joined [{}]", addr, topic);
                        state.remote_subscribers.entry(topic).or_default().insert(addr);
                    }
                    OP_END_CONNECTION => {
                        log::debug!("[node] remote subscriber {} left [{}]", addr, topic);
                        if let Some(subs) = state.remote_subscribers.get_mut(&topic) {
                            subs.remove(&addr);
                            if subs.is_empty() {
                                state.remote_subscribers.remove(&topic);
                            }
                        }
                    }
                    op => log::warn!("[node] unknown control opcode {}", op),
                }
            }
            Event::Request {
                service,
                h_uuid,
                payload,
                reply,
            } => {
                let handler = { self.state.lock().repliers.first_handler(&service) };
                let (rep, success) = match handler {
                    Some(handler) => handler.run_callback(&service, &payload),
                    None => {
                        log::warn!("[node] request for unknown service [{}]", service);
                        (Vec::new(), false)
                    }
                };
                if let Err(e) = control::send_reply(&reply, &service, h_uuid, &rep, success) {
                    log::warn!("[node] failed to send reply for [{}]: {}", service, e);
                }
            }
            Event::Reply {
                service,
                h_uuid,
                payload,
                success,
            } => {
                let handler = { self.state.lock().requests.handler_by_uuid(&service, h_uuid) };
                match handler {
                    Some(handler) => handler.notify_result(payload, success),
                    None => log::debug!(
                        "[node] reply for [{}] with no pending request (hUuid {})",
                        service,
                        h_uuid
                    ),
                }
            }
        }
    }
}

impl Drop for NodeShared {
    fn drop(&mut self) {
        self.exit.store(true, Ordering::Relaxed);
        let handle = self.reception.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        log::debug!("[node] shared state down pUuid={}", self.p_uuid);
    }
}

fn reception_loop(weak: &Weak<NodeShared>, rx: &Receiver<Event>) {
    loop {
        match rx.recv_timeout(Duration::from_millis(POLL_TIMEOUT_MS)) {
            Ok(event) => {
                let Some(shared) = weak.upgrade() else { break };
                if shared.exit.load(Ordering::Relaxed) {
                    break;
                }
                shared.handle_event(event);
            }
            Err(RecvTimeoutError::Timeout) => {
                let Some(shared) = weak.upgrade() else { break };
                if shared.exit.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
