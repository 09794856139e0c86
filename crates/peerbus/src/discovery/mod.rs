// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Distributed topic and service discovery.
//!
//! Discovery runs three background tasks over one UDP broadcast socket:
//!
//! - *reception* reads datagrams with a poll timeout and dispatches them by
//!   message type;
//! - *heartbeat* broadcasts a `Hello` at the heartbeat interval so peers keep
//!   our activity entry fresh;
//! - *activity* audits the activity map and evicts processes that stayed
//!   silent longer than the silence interval.
//!
//! Each advertised (topic, node) pair additionally owns a [`Beacon`] that
//! re-broadcasts its ADVERTISE datagram at the advertise interval.
//!
//! Callbacks registered here run on the reception or activity task; they must
//! not re-enter the engine's mutating operations. The node-shared state obeys
//! that by only touching its own lock and sockets from the callbacks.

pub mod beacon;
pub mod index;
pub mod publisher;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::{MAX_RCV_LEN, WIRE_VERSION};
use crate::core::uuid::{NodeUuid, ProcessUuid};
use crate::protocol::{
    decode_msg_publisher, decode_srv_publisher, encode_msg_publisher, encode_srv_publisher,
    DiscoveryType, Header,
};
use crate::transport::udp::DiscoverySocket;
use crate::{Error, Result};

use beacon::Beacon;
use index::{AddressMap, TopicIndex};
use publisher::{MessagePublisher, PublisherRecord, Scope, ServicePublisher};

/// Callback invoked with a message publisher record on connection or
/// disconnection events.
pub type MsgDiscoveryCallback = Arc<dyn Fn(&MessagePublisher) + Send + Sync>;

/// Callback invoked with a service publisher record on connection or
/// disconnection events.
pub type SrvDiscoveryCallback = Arc<dyn Fn(&ServicePublisher) + Send + Sync>;

#[derive(Clone, Default)]
struct Callbacks {
    msg_connection: Option<MsgDiscoveryCallback>,
    msg_disconnection: Option<MsgDiscoveryCallback>,
    srv_connection: Option<SrvDiscoveryCallback>,
    srv_disconnection: Option<SrvDiscoveryCallback>,
}

/// State guarded by the discovery mutex.
struct DiscoveryState {
    /// Process UUID -> last time we heard from it.
    activity: HashMap<ProcessUuid, Instant>,
    /// Topic -> node -> beacon handle.
    beacons: HashMap<String, HashMap<NodeUuid, Beacon>>,
    callbacks: Callbacks,
}

struct Inner {
    p_uuid: ProcessUuid,
    host_addr: String,
    socket: Arc<DiscoverySocket>,
    msg_index: TopicIndex<MessagePublisher>,
    srv_index: TopicIndex<ServicePublisher>,
    state: Mutex<DiscoveryState>,
    activity_interval_ms: AtomicU64,
    heartbeat_interval_ms: AtomicU64,
    advertise_interval_ms: Arc<AtomicU64>,
    silence_interval_ms: AtomicU64,
    exit: AtomicBool,
}

/// The per-process discovery engine.
///
/// Created once per process; dropping it signals the three tasks, joins
/// them, broadcasts one final `Bye` and silences every beacon.
pub struct Discovery {
    inner: Arc<Inner>,
    threads: Vec<JoinHandle<()>>,
}

impl Discovery {
    /// Start discovery for this process on the given UDP port.
    pub fn new(p_uuid: ProcessUuid, port: u16) -> Result<Self> {
        let socket = Arc::new(DiscoverySocket::bind(port).map_err(Error::Io)?);
        let host_addr = crate::config::determine_host_addr();
        log::debug!(
            "[discovery] starting engine pUuid={} host={} port={}",
            p_uuid,
            host_addr,
            port
        );

        let inner = Arc::new(Inner {
            p_uuid,
            host_addr,
            socket,
            msg_index: TopicIndex::new(),
            srv_index: TopicIndex::new(),
            state: Mutex::new(DiscoveryState {
                activity: HashMap::new(),
                beacons: HashMap::new(),
                callbacks: Callbacks::default(),
            }),
            activity_interval_ms: AtomicU64::new(crate::config::DEF_ACTIVITY_INTERVAL_MS),
            heartbeat_interval_ms: AtomicU64::new(crate::config::DEF_HEARTBEAT_INTERVAL_MS),
            advertise_interval_ms: Arc::new(AtomicU64::new(
                crate::config::DEF_ADVERTISE_INTERVAL_MS,
            )),
            silence_interval_ms: AtomicU64::new(crate::config::DEF_SILENCE_INTERVAL_MS),
            exit: AtomicBool::new(false),
        });

        let reception = {
            let inner = Arc::clone(&inner);
            thread::spawn(move || reception_task(&inner))
        };
        let heartbeat = {
            let inner = Arc::clone(&inner);
            thread::spawn(move || heartbeat_task(&inner))
        };
        let activity = {
            let inner = Arc::clone(&inner);
            thread::spawn(move || activity_task(&inner))
        };

        Ok(Self {
            inner,
            threads: vec![reception, heartbeat, activity],
        })
    }

    /// Process UUID this engine runs under.
    pub fn p_uuid(&self) -> ProcessUuid {
        self.inner.p_uuid
    }

    /// IP address of this host, as used for scope filtering.
    pub fn host_addr(&self) -> &str {
        &self.inner.host_addr
    }

    /// Advertise a message topic: store the record, broadcast one ADVERTISE
    /// and register a beacon retransmitting it.
    ///
    /// Records with `Process` scope are stored but never broadcast.
    pub fn advertise_msg(&self, publisher: MessagePublisher) -> Result<()> {
        self.inner.msg_index.add_publisher(publisher.clone());
        if publisher.scope != Scope::Process {
            let datagram = self.inner.msg_datagram(DiscoveryType::Adv, &publisher);
            self.inner
                .broadcast(&datagram, DiscoveryType::Adv, &publisher.topic);
            self.inner
                .new_beacon(&publisher.topic, publisher.n_uuid, datagram);
        }
        Ok(())
    }

    /// Advertise a service. Same contract as [`Discovery::advertise_msg`].
    pub fn advertise_srv(&self, publisher: ServicePublisher) -> Result<()> {
        self.inner.srv_index.add_publisher(publisher.clone());
        if publisher.scope != Scope::Process {
            let datagram = self.inner.srv_datagram(DiscoveryType::AdvSrv, &publisher);
            self.inner
                .broadcast(&datagram, DiscoveryType::AdvSrv, &publisher.topic);
            self.inner
                .new_beacon(&publisher.topic, publisher.n_uuid, datagram);
        }
        Ok(())
    }

    /// Request discovery information about a message topic.
    ///
    /// Broadcasts one SUBSCRIBE datagram; publishers answer with ADVERTISE.
    /// Publishers already known are reported immediately through the
    /// connection callback.
    pub fn discover_msg(&self, topic: &str) -> Result<()> {
        self.inner
            .send_header_only(DiscoveryType::Sub, topic);

        let cb = self.inner.state.lock().callbacks.msg_connection.clone();
        if let (Some(cb), Some(addresses)) = (cb, self.inner.msg_index.get_publishers(topic)) {
            for records in addresses.values() {
                for record in records {
                    cb(record);
                }
            }
        }
        Ok(())
    }

    /// Request discovery information about a service.
    pub fn discover_srv(&self, service: &str) -> Result<()> {
        self.inner
            .send_header_only(DiscoveryType::SubSrv, service);

        let cb = self.inner.state.lock().callbacks.srv_connection.clone();
        if let (Some(cb), Some(addresses)) = (cb, self.inner.srv_index.get_publishers(service)) {
            for records in addresses.values() {
                for record in records {
                    cb(record);
                }
            }
        }
        Ok(())
    }

    /// Withdraw a message topic advertisement: broadcast UNADVERTISE, delete
    /// the beacon and remove the local record.
    pub fn unadvertise_msg(&self, topic: &str, n_uuid: NodeUuid) -> Result<()> {
        let Some(record) = self
            .inner
            .msg_index
            .get_publisher(topic, self.inner.p_uuid, n_uuid)
        else {
            // Nothing advertised under this (topic, node); nothing to undo.
            return Ok(());
        };

        if record.scope != Scope::Process {
            let datagram = self.inner.msg_datagram(DiscoveryType::Unadv, &record);
            self.inner
                .broadcast(&datagram, DiscoveryType::Unadv, topic);
        }
        self.inner.del_beacon(topic, n_uuid);
        self.inner
            .msg_index
            .del_publisher_by_node(topic, self.inner.p_uuid, n_uuid);
        Ok(())
    }

    /// Withdraw a service advertisement.
    pub fn unadvertise_srv(&self, service: &str, n_uuid: NodeUuid) -> Result<()> {
        let Some(record) = self
            .inner
            .srv_index
            .get_publisher(service, self.inner.p_uuid, n_uuid)
        else {
            return Ok(());
        };

        if record.scope != Scope::Process {
            let datagram = self.inner.srv_datagram(DiscoveryType::UnadvSrv, &record);
            self.inner
                .broadcast(&datagram, DiscoveryType::UnadvSrv, service);
        }
        self.inner.del_beacon(service, n_uuid);
        self.inner
            .srv_index
            .del_publisher_by_node(service, self.inner.p_uuid, n_uuid);
        Ok(())
    }

    /// All message publishers known for `topic`.
    pub fn msg_publishers(&self, topic: &str) -> Option<AddressMap<MessagePublisher>> {
        self.inner.msg_index.get_publishers(topic)
    }

    /// All service publishers known for `service`.
    pub fn srv_publishers(&self, service: &str) -> Option<AddressMap<ServicePublisher>> {
        self.inner.srv_index.get_publishers(service)
    }

    /// The record of one specific (topic, process, node), if known.
    pub fn msg_publisher(
        &self,
        topic: &str,
        p_uuid: ProcessUuid,
        n_uuid: NodeUuid,
    ) -> Option<MessagePublisher> {
        self.inner.msg_index.get_publisher(topic, p_uuid, n_uuid)
    }

    /// All message topic names currently known, sorted.
    pub fn msg_topic_list(&self) -> Vec<String> {
        self.inner.msg_index.topic_list()
    }

    /// All service names currently known, sorted.
    pub fn srv_topic_list(&self) -> Vec<String> {
        self.inner.srv_index.topic_list()
    }

    /// Register the callback fired when a new message publisher is
    /// discovered.
    pub fn set_connections_cb(&self, cb: MsgDiscoveryCallback) {
        self.inner.state.lock().callbacks.msg_connection = Some(cb);
    }

    /// Register the callback fired when a message publisher goes away.
    pub fn set_disconnections_cb(&self, cb: MsgDiscoveryCallback) {
        self.inner.state.lock().callbacks.msg_disconnection = Some(cb);
    }

    /// Register the callback fired when a new service publisher is
    /// discovered.
    pub fn set_connections_srv_cb(&self, cb: SrvDiscoveryCallback) {
        self.inner.state.lock().callbacks.srv_connection = Some(cb);
    }

    /// Register the callback fired when a service publisher goes away.
    pub fn set_disconnections_srv_cb(&self, cb: SrvDiscoveryCallback) {
        self.inner.state.lock().callbacks.srv_disconnection = Some(cb);
    }

    /// Current activity-audit interval (ms).
    pub fn activity_interval(&self) -> u64 {
        self.inner.activity_interval_ms.load(Ordering::Relaxed)
    }

    /// Current heartbeat interval (ms).
    pub fn heartbeat_interval(&self) -> u64 {
        self.inner.heartbeat_interval_ms.load(Ordering::Relaxed)
    }

    /// Current beacon re-advertise interval (ms).
    pub fn advertise_interval(&self) -> u64 {
        self.inner.advertise_interval_ms.load(Ordering::Relaxed)
    }

    /// Current silence interval (ms).
    pub fn silence_interval(&self) -> u64 {
        self.inner.silence_interval_ms.load(Ordering::Relaxed)
    }

    /// Set the activity-audit interval (ms).
    pub fn set_activity_interval(&self, ms: u64) -> Result<()> {
        set_interval(&self.inner.activity_interval_ms, ms)
    }

    /// Set the heartbeat interval (ms).
    pub fn set_heartbeat_interval(&self, ms: u64) -> Result<()> {
        set_interval(&self.inner.heartbeat_interval_ms, ms)
    }

    /// Set the beacon re-advertise interval (ms). Running beacons pick the
    /// new value up on their next cycle.
    pub fn set_advertise_interval(&self, ms: u64) -> Result<()> {
        set_interval(&self.inner.advertise_interval_ms, ms)
    }

    /// Set the silence interval (ms).
    pub fn set_silence_interval(&self, ms: u64) -> Result<()> {
        set_interval(&self.inner.silence_interval_ms, ms)
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.inner.exit.store(true, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }

        // One final BYE triggers the remote cancellation of all our
        // advertised topics.
        self.inner.send_header_only(DiscoveryType::Bye, "");

        self.inner.state.lock().beacons.clear();
        log::debug!("[discovery] engine stopped pUuid={}", self.inner.p_uuid);
    }
}

fn set_interval(slot: &AtomicU64, ms: u64) -> Result<()> {
    if ms < 1 {
        return Err(Error::InvalidInterval(ms));
    }
    slot.store(ms, Ordering::Relaxed);
    Ok(())
}

impl Inner {
    fn msg_datagram(&self, t: DiscoveryType, publisher: &MessagePublisher) -> Vec<u8> {
        let header = Header::new(publisher.p_uuid, publisher.topic.clone(), t);
        let mut buf = Vec::with_capacity(header.encoded_len() + 128);
        header.encode(&mut buf);
        encode_msg_publisher(publisher, &mut buf);
        buf
    }

    fn srv_datagram(&self, t: DiscoveryType, publisher: &ServicePublisher) -> Vec<u8> {
        let header = Header::new(publisher.p_uuid, publisher.topic.clone(), t);
        let mut buf = Vec::with_capacity(header.encoded_len() + 128);
        header.encode(&mut buf);
        encode_srv_publisher(publisher, &mut buf);
        buf
    }

    fn send_header_only(&self, t: DiscoveryType, topic: &str) {
        let header = Header::new(self.p_uuid, topic, t);
        let mut buf = Vec::with_capacity(header.encoded_len());
        header.encode(&mut buf);
        self.broadcast(&buf, t, topic);
    }

    fn broadcast(&self, datagram: &[u8], t: DiscoveryType, topic: &str) {
        match self.socket.send(datagram) {
            Ok(_) => log::debug!("[discovery] sending {} msg [{}]", t, topic),
            Err(e) => log::warn!("[discovery] failed to send {} msg [{}]: {}", t, topic, e),
        }
    }

    fn new_beacon(&self, topic: &str, n_uuid: NodeUuid, datagram: Vec<u8>) {
        let mut state = self.state.lock();
        let nodes = state.beacons.entry(topic.to_string()).or_default();
        nodes.entry(n_uuid).or_insert_with(|| {
            Beacon::spawn(
                Arc::clone(&self.socket),
                datagram,
                Arc::clone(&self.advertise_interval_ms),
            )
        });
    }

    fn del_beacon(&self, topic: &str, n_uuid: NodeUuid) {
        let mut state = self.state.lock();
        if let Some(nodes) = state.beacons.get_mut(topic) {
            nodes.remove(&n_uuid);
            if nodes.is_empty() {
                state.beacons.remove(topic);
            }
        }
    }

    /// Dispatch one received datagram.
    fn dispatch(&self, from_ip: &str, data: &[u8]) {
        let (header, consumed) = match Header::decode(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("[discovery] dropping datagram: {}", e);
                return;
            }
        };

        if header.version != WIRE_VERSION {
            log::debug!(
                "[discovery] dropping datagram with wire version {}",
                header.version
            );
            return;
        }

        // Discard our own discovery messages.
        if header.p_uuid == self.p_uuid {
            return;
        }

        // Refresh the sender's activity entry and snapshot the callbacks.
        let callbacks = {
            let mut state = self.state.lock();
            state.activity.insert(header.p_uuid, Instant::now());
            state.callbacks.clone()
        };

        let body = &data[consumed..];
        match header.msg_type {
            DiscoveryType::Adv => match decode_msg_publisher(&header, body) {
                Ok(publisher) => self.on_advertise(
                    from_ip,
                    publisher,
                    &self.msg_index,
                    callbacks.msg_connection.as_ref(),
                ),
                Err(e) => log::warn!("[discovery] dropping ADVERTISE body: {}", e),
            },
            DiscoveryType::AdvSrv => match decode_srv_publisher(&header, body) {
                Ok(publisher) => self.on_advertise(
                    from_ip,
                    publisher,
                    &self.srv_index,
                    callbacks.srv_connection.as_ref(),
                ),
                Err(e) => log::warn!("[discovery] dropping ADVERTISE_SRV body: {}", e),
            },
            DiscoveryType::Sub => {
                let answers = self.sub_answers(&header.topic, from_ip, &self.msg_index);
                for record in answers {
                    let datagram = self.msg_datagram(DiscoveryType::Adv, &record);
                    self.broadcast(&datagram, DiscoveryType::Adv, &record.topic);
                }
            }
            DiscoveryType::SubSrv => {
                let answers = self.sub_answers(&header.topic, from_ip, &self.srv_index);
                for record in answers {
                    let datagram = self.srv_datagram(DiscoveryType::AdvSrv, &record);
                    self.broadcast(&datagram, DiscoveryType::AdvSrv, &record.topic);
                }
            }
            DiscoveryType::Unadv => match decode_msg_publisher(&header, body) {
                Ok(publisher) => self.on_unadvertise(
                    from_ip,
                    publisher,
                    &self.msg_index,
                    callbacks.msg_disconnection.as_ref(),
                ),
                Err(e) => log::warn!("[discovery] dropping UNADVERTISE body: {}", e),
            },
            DiscoveryType::UnadvSrv => match decode_srv_publisher(&header, body) {
                Ok(publisher) => self.on_unadvertise(
                    from_ip,
                    publisher,
                    &self.srv_index,
                    callbacks.srv_disconnection.as_ref(),
                ),
                Err(e) => log::warn!("[discovery] dropping UNADVERTISE_SRV body: {}", e),
            },
            DiscoveryType::Hello => {
                // The timestamp has already been refreshed.
            }
            DiscoveryType::Bye => {
                {
                    self.state.lock().activity.remove(&header.p_uuid);
                }
                if let Some(cb) = callbacks.msg_disconnection.as_ref() {
                    cb(&MessagePublisher::from_process(header.p_uuid));
                }
                if let Some(cb) = callbacks.srv_disconnection.as_ref() {
                    cb(&ServicePublisher::from_process(header.p_uuid));
                }
                self.msg_index.del_publishers_by_process(header.p_uuid);
                self.srv_index.del_publishers_by_process(header.p_uuid);
            }
        }
    }

    /// Whether a received record must be dropped by the scope filter. A
    /// remote `Process`-scoped record is always dropped; a `Host`-scoped one
    /// is dropped when the sender is on a different host.
    fn scope_filtered(&self, scope: Scope, from_ip: &str) -> bool {
        scope == Scope::Process || (scope == Scope::Host && from_ip != self.host_addr)
    }

    fn on_advertise<P: PublisherRecord>(
        &self,
        from_ip: &str,
        publisher: P,
        index: &TopicIndex<P>,
        cb: Option<&Arc<dyn Fn(&P) + Send + Sync>>,
    ) {
        if self.scope_filtered(publisher.scope(), from_ip) {
            return;
        }
        let added = index.add_publisher(publisher.clone());
        if added {
            if let Some(cb) = cb {
                cb(&publisher);
            }
        }
    }

    fn on_unadvertise<P: PublisherRecord>(
        &self,
        from_ip: &str,
        publisher: P,
        index: &TopicIndex<P>,
        cb: Option<&Arc<dyn Fn(&P) + Send + Sync>>,
    ) {
        if self.scope_filtered(publisher.scope(), from_ip) {
            return;
        }
        if let Some(cb) = cb {
            cb(&publisher);
        }
        index.del_publisher_by_node(publisher.topic(), publisher.p_uuid(), publisher.n_uuid());
    }

    /// Local records answering a SUBSCRIBE for `topic`, after scope
    /// filtering.
    fn sub_answers<P: PublisherRecord>(
        &self,
        topic: &str,
        from_ip: &str,
        index: &TopicIndex<P>,
    ) -> Vec<P> {
        if !index.has_any_publisher(topic, self.p_uuid) {
            return Vec::new();
        }
        let Some(addresses) = index.get_publishers(topic) else {
            return Vec::new();
        };
        addresses
            .get(&self.p_uuid)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| !self.scope_filtered(r.scope(), from_ip))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn reception_task(inner: &Arc<Inner>) {
    let mut buf = vec![0u8; MAX_RCV_LEN];
    loop {
        if inner.exit.load(Ordering::Relaxed) {
            break;
        }
        match inner.socket.recv(&mut buf) {
            Ok(Some((len, src))) => {
                inner.dispatch(&src.ip().to_string(), &buf[..len]);
            }
            Ok(None) => {}
            Err(e) => {
                // Transient socket failures never terminate the task.
                log::warn!("[discovery] recv error: {}", e);
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn heartbeat_task(inner: &Arc<Inner>) {
    loop {
        if inner.exit.load(Ordering::Relaxed) {
            break;
        }
        inner.send_header_only(DiscoveryType::Hello, "");
        sleep_chunked(
            &inner.exit,
            inner.heartbeat_interval_ms.load(Ordering::Relaxed),
        );
    }
}

fn activity_task(inner: &Arc<Inner>) {
    loop {
        if inner.exit.load(Ordering::Relaxed) {
            break;
        }

        let silence = Duration::from_millis(inner.silence_interval_ms.load(Ordering::Relaxed));
        let now = Instant::now();

        // Collect the dead under the lock, notify outside it.
        let (dead, callbacks) = {
            let mut state = inner.state.lock();
            let dead: Vec<ProcessUuid> = state
                .activity
                .iter()
                .filter(|(_, last)| now.duration_since(**last) > silence)
                .map(|(p, _)| *p)
                .collect();
            for p_uuid in &dead {
                state.activity.remove(p_uuid);
            }
            (dead, state.callbacks.clone())
        };

        for p_uuid in dead {
            log::debug!("[discovery] evicting silent process {}", p_uuid);
            inner.msg_index.del_publishers_by_process(p_uuid);
            inner.srv_index.del_publishers_by_process(p_uuid);
            if let Some(cb) = callbacks.msg_disconnection.as_ref() {
                cb(&MessagePublisher::from_process(p_uuid));
            }
            if let Some(cb) = callbacks.srv_disconnection.as_ref() {
                cb(&ServicePublisher::from_process(p_uuid));
            }
        }

        sleep_chunked(
            &inner.exit,
            inner.activity_interval_ms.load(Ordering::Relaxed),
        );
    }
}

/// Sleep `ms` in small slices, returning early when `exit` is set.
fn sleep_chunked(exit: &AtomicBool, ms: u64) {
    let sleep_end = Instant::now() + Duration::from_millis(ms);
    while Instant::now() < sleep_end {
        if exit.load(Ordering::Relaxed) {
            return;
        }
        thread::sleep(Duration::from_millis(ms.min(50)));
    }
}
