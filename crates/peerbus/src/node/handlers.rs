// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handler types and their per-process registries.
//!
//! A subscription handler stores a declared type-name string plus opaque
//! decode-and-invoke closures; type compatibility is a string compare, and
//! the registries never know the concrete payload types. Reply handlers hold
//! the pending state of one service call and wake the waiting caller through
//! a condition variable.

use std::any::Any;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::uuid::{HandlerUuid, NodeUuid};
use crate::message::Message;
use crate::node::options::SubscribeOptions;
use std::sync::Arc;

/// Callback registry: topic -> node UUID -> handler UUID -> handler.
pub struct HandlerStorage<H> {
    data: HashMap<String, HashMap<NodeUuid, HashMap<HandlerUuid, Arc<H>>>>,
}

impl<H> Default for HandlerStorage<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> HandlerStorage<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Register a handler.
    pub fn add_handler(
        &mut self,
        topic: &str,
        n_uuid: NodeUuid,
        h_uuid: HandlerUuid,
        handler: Arc<H>,
    ) {
        self.data
            .entry(topic.to_string())
            .or_default()
            .entry(n_uuid)
            .or_default()
            .insert(h_uuid, handler);
    }

    /// All handlers registered for `topic`, across every node.
    pub fn handlers_for_topic(&self, topic: &str) -> Vec<Arc<H>> {
        self.data
            .get(topic)
            .map(|nodes| {
                nodes
                    .values()
                    .flat_map(|handlers| handlers.values().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Node UUIDs holding at least one handler for `topic`.
    pub fn node_uuids_for_topic(&self, topic: &str) -> Vec<NodeUuid> {
        self.data
            .get(topic)
            .map(|nodes| nodes.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Whether any handler exists for `topic`.
    pub fn has_handlers_for_topic(&self, topic: &str) -> bool {
        self.data.get(topic).is_some_and(|nodes| !nodes.is_empty())
    }

    /// Any one handler for `topic` (repliers register exactly one per
    /// service and node).
    pub fn first_handler(&self, topic: &str) -> Option<Arc<H>> {
        self.data
            .get(topic)?
            .values()
            .flat_map(|handlers| handlers.values())
            .next()
            .cloned()
    }

    /// Find a handler by its UUID, regardless of owning node.
    pub fn handler_by_uuid(&self, topic: &str, h_uuid: HandlerUuid) -> Option<Arc<H>> {
        self.data
            .get(topic)?
            .values()
            .find_map(|handlers| handlers.get(&h_uuid))
            .cloned()
    }

    /// Remove one handler. Empty levels are pruned.
    pub fn remove_handler(&mut self, topic: &str, n_uuid: NodeUuid, h_uuid: HandlerUuid) -> bool {
        let Some(nodes) = self.data.get_mut(topic) else {
            return false;
        };
        let Some(handlers) = nodes.get_mut(&n_uuid) else {
            return false;
        };
        let removed = handlers.remove(&h_uuid).is_some();
        if handlers.is_empty() {
            nodes.remove(&n_uuid);
        }
        if nodes.is_empty() {
            self.data.remove(topic);
        }
        removed
    }

    /// Remove every handler one node registered for `topic`.
    pub fn remove_handlers_for_node(&mut self, topic: &str, n_uuid: NodeUuid) -> bool {
        let Some(nodes) = self.data.get_mut(topic) else {
            return false;
        };
        let removed = nodes.remove(&n_uuid).is_some();
        if nodes.is_empty() {
            self.data.remove(topic);
        }
        removed
    }
}

struct RateWindow {
    start: Instant,
    count: u64,
}

/// A registered topic subscription.
///
/// Carries the declared type name, the decode-and-invoke closure for bytes
/// arriving off the wire, and a by-reference fast path used when publisher
/// and subscriber live in the same process.
pub struct SubscriptionHandler {
    h_uuid: HandlerUuid,
    n_uuid: NodeUuid,
    type_name: &'static str,
    opts: SubscribeOptions,
    raw_cb: Box<dyn Fn(&str, &[u8]) -> bool + Send + Sync>,
    local_cb: Box<dyn Fn(&str, &dyn Any) -> bool + Send + Sync>,
    window: Mutex<RateWindow>,
}

impl SubscriptionHandler {
    /// Create a handler for payload type `M` invoking `cb` on each update.
    pub fn new<M, F>(n_uuid: NodeUuid, opts: SubscribeOptions, cb: F) -> Self
    where
        M: Message,
        F: Fn(&M, &str) + Send + Sync + 'static,
    {
        let cb = Arc::new(cb);

        let raw_cb = {
            let cb = Arc::clone(&cb);
            Box::new(move |topic: &str, data: &[u8]| match M::decode(data) {
                Ok(msg) => {
                    cb(&msg, topic);
                    true
                }
                Err(e) => {
                    log::error!("[node] failed to parse update on [{}]: {}", topic, e);
                    false
                }
            })
        };

        let local_cb = Box::new(move |topic: &str, msg: &dyn Any| match msg.downcast_ref::<M>() {
            Some(msg) => {
                cb(msg, topic);
                true
            }
            None => false,
        });

        Self {
            h_uuid: HandlerUuid::random(),
            n_uuid,
            type_name: M::type_name(),
            opts,
            raw_cb,
            local_cb,
            window: Mutex::new(RateWindow {
                start: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Handler UUID.
    pub fn h_uuid(&self) -> HandlerUuid {
        self.h_uuid
    }

    /// Owning node.
    pub fn n_uuid(&self) -> NodeUuid {
        self.n_uuid
    }

    /// Declared payload type name.
    pub fn type_name(&self) -> &str {
        self.type_name
    }

    /// Deserialize `data` and invoke the callback. Returns `false` when the
    /// payload fails to parse or the rate cap dropped the message.
    pub fn run_raw_callback(&self, topic: &str, data: &[u8]) -> bool {
        if self.throttled() {
            return false;
        }
        (self.raw_cb)(topic, data)
    }

    /// Invoke the callback with an in-process payload, without
    /// serialization. Returns `false` on a type mismatch or when the rate
    /// cap dropped the message.
    pub fn run_local_callback(&self, topic: &str, msg: &dyn Any) -> bool {
        if self.throttled() {
            return false;
        }
        (self.local_cb)(topic, msg)
    }

    /// Per-second rate cap: counts callbacks in the current one-second
    /// window and silently drops the overflow.
    fn throttled(&self) -> bool {
        let Some(cap) = self.opts.msgs_per_sec() else {
            return false;
        };
        let mut window = self.window.lock();
        let now = Instant::now();
        if now.duration_since(window.start) >= Duration::from_secs(1) {
            window.start = now;
            window.count = 0;
        }
        if window.count >= cap {
            return true;
        }
        window.count += 1;
        false
    }
}

/// A registered service replier.
pub struct RepHandler {
    h_uuid: HandlerUuid,
    n_uuid: NodeUuid,
    req_type: &'static str,
    rep_type: &'static str,
    cb: Box<dyn Fn(&str, &[u8]) -> (Vec<u8>, bool) + Send + Sync>,
}

impl RepHandler {
    /// Create a replier for `Req -> Rep` invoking `cb` on each request.
    pub fn new<Req, Rep, F>(n_uuid: NodeUuid, cb: F) -> Self
    where
        Req: Message,
        Rep: Message,
        F: Fn(&Req) -> (Rep, bool) + Send + Sync + 'static,
    {
        let raw = Box::new(
            move |service: &str, data: &[u8]| match Req::decode(data) {
                Ok(req) => {
                    let (rep, success) = cb(&req);
                    match rep.encode() {
                        Ok(encoded) => (encoded, success),
                        Err(e) => {
                            log::error!("[node] failed to encode reply for [{}]: {}", service, e);
                            (Vec::new(), false)
                        }
                    }
                }
                Err(e) => {
                    log::error!("[node] failed to parse request for [{}]: {}", service, e);
                    (Vec::new(), false)
                }
            },
        );

        Self {
            h_uuid: HandlerUuid::random(),
            n_uuid,
            req_type: Req::type_name(),
            rep_type: Rep::type_name(),
            cb: raw,
        }
    }

    /// Handler UUID.
    pub fn h_uuid(&self) -> HandlerUuid {
        self.h_uuid
    }

    /// Owning node.
    pub fn n_uuid(&self) -> NodeUuid {
        self.n_uuid
    }

    /// Declared request type name.
    pub fn req_type(&self) -> &str {
        self.req_type
    }

    /// Declared reply type name.
    pub fn rep_type(&self) -> &str {
        self.rep_type
    }

    /// Run the user callback on serialized request bytes.
    pub fn run_callback(&self, service: &str, req: &[u8]) -> (Vec<u8>, bool) {
        (self.cb)(service, req)
    }
}

struct ReqState {
    rep: Vec<u8>,
    result: bool,
    available: bool,
}

/// The pending state of one outstanding service call.
pub struct ReqHandler {
    h_uuid: HandlerUuid,
    n_uuid: NodeUuid,
    req_data: Vec<u8>,
    state: Mutex<ReqState>,
    condition: Condvar,
}

impl ReqHandler {
    /// Create a pending request holding the serialized request bytes.
    pub fn new(n_uuid: NodeUuid, req_data: Vec<u8>) -> Self {
        Self {
            h_uuid: HandlerUuid::random(),
            n_uuid,
            req_data,
            state: Mutex::new(ReqState {
                rep: Vec::new(),
                result: false,
                available: false,
            }),
            condition: Condvar::new(),
        }
    }

    /// Handler UUID; correlates the reply with this pending call.
    pub fn h_uuid(&self) -> HandlerUuid {
        self.h_uuid
    }

    /// Owning node.
    pub fn n_uuid(&self) -> NodeUuid {
        self.n_uuid
    }

    /// The serialized request prepared at submit time.
    pub fn req_data(&self) -> &[u8] {
        &self.req_data
    }

    /// Block until the reply is available or `deadline` passes. Returns
    /// whether the reply arrived.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while !state.available {
            if self.condition.wait_until(&mut state, deadline).timed_out() {
                return state.available;
            }
        }
        true
    }

    /// Store the reply, mark it available and wake one waiter.
    pub fn notify_result(&self, rep: Vec<u8>, result: bool) {
        let mut state = self.state.lock();
        state.rep = rep;
        state.result = result;
        state.available = true;
        self.condition.notify_one();
    }

    /// The stored reply bytes and success flag.
    pub fn response(&self) -> (Vec<u8>, bool) {
        let state = self.state.lock();
        (state.rep.clone(), state.result)
    }
}
