// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node facade: the per-node entry point of the public API.
//!
//! A node composes fully qualified names from its partition and namespace,
//! keeps its private sets of advertised topics, subscribed topics and
//! advertised services, and delegates to discovery and the shared state. On
//! drop it undoes every registration it made.

pub mod handlers;
pub mod options;
pub mod shared;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::OP_END_CONNECTION;
use crate::core::name::{self, NameType};
use crate::core::uuid::{HandlerUuid, NodeUuid, ProcessUuid};
use crate::discovery::publisher::{MessagePublisher, ServicePublisher};
use crate::message::Message;
use crate::transport::control;
use crate::{Error, Result};

use handlers::{RepHandler, ReqHandler, SubscriptionHandler};
use options::{AdvertiseOptions, NodeOptions, SubscribeOptions};
use shared::NodeShared;

/// A transport node.
///
/// Nodes are cheap: every node in a process shares the same sockets and
/// discovery engine. Dropping a node unsubscribes from every topic it
/// subscribed to and unadvertises every topic and service it advertised.
pub struct Node {
    shared: Arc<NodeShared>,
    n_uuid: NodeUuid,
    options: NodeOptions,
    topics_advertised: HashSet<String>,
    topics_subscribed: HashSet<String>,
    srvs_advertised: HashSet<String>,
}

impl Node {
    /// Create a node with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(NodeOptions::default())
    }

    /// Create a node with explicit partition/namespace options.
    pub fn with_options(options: NodeOptions) -> Result<Self> {
        let shared = NodeShared::acquire()?;
        Ok(Self {
            shared,
            n_uuid: NodeUuid::random(),
            options,
            topics_advertised: HashSet::new(),
            topics_subscribed: HashSet::new(),
            srvs_advertised: HashSet::new(),
        })
    }

    /// This node's UUID.
    pub fn n_uuid(&self) -> NodeUuid {
        self.n_uuid
    }

    /// The process UUID shared by every node in this process.
    pub fn p_uuid(&self) -> ProcessUuid {
        self.shared.p_uuid()
    }

    /// The node's options.
    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    /// Advertise a message topic with payload type `M`.
    ///
    /// # Errors
    ///
    /// `InvalidName` for a name violating the rules; `AlreadyAdvertised`
    /// when this node already advertises the topic.
    pub fn advertise<M: Message>(&mut self, topic: &str, opts: AdvertiseOptions) -> Result<()> {
        let fqn = self.topic_name(topic)?;
        if self.topics_advertised.contains(&fqn) {
            return Err(Error::AlreadyAdvertised(topic.to_string()));
        }

        let publisher = MessagePublisher {
            topic: fqn.clone(),
            addr: self.shared.my_address().to_string(),
            ctrl: self.shared.my_control_address().to_string(),
            p_uuid: self.shared.p_uuid(),
            n_uuid: self.n_uuid,
            scope: opts.scope(),
            msg_type: M::type_name().to_string(),
        };
        self.shared.discovery.advertise_msg(publisher)?;
        self.topics_advertised.insert(fqn);
        Ok(())
    }

    /// Withdraw a topic advertisement.
    ///
    /// # Errors
    ///
    /// `NotAdvertised` when this node does not advertise the topic.
    pub fn unadvertise(&mut self, topic: &str) -> Result<()> {
        let fqn = self.topic_name(topic)?;
        if !self.topics_advertised.remove(&fqn) {
            return Err(Error::NotAdvertised(topic.to_string()));
        }
        self.shared.discovery.unadvertise_msg(&fqn, self.n_uuid)
    }

    /// Publish one message on an advertised topic.
    ///
    /// Local subscribers with a matching declared type run synchronously on
    /// this thread; the payload is serialized only when at least one remote
    /// process subscribes.
    ///
    /// # Errors
    ///
    /// `NotAdvertised` when this node has not advertised the topic;
    /// `TypeMismatch` when `M` is not the type declared at advertise.
    pub fn publish<M: Message>(&self, topic: &str, msg: &M) -> Result<()> {
        let fqn = self.topic_name(topic)?;
        if !self.topics_advertised.contains(&fqn) {
            return Err(Error::NotAdvertised(topic.to_string()));
        }

        let record = self
            .shared
            .discovery
            .msg_publisher(&fqn, self.shared.p_uuid(), self.n_uuid)
            .ok_or_else(|| Error::NotAdvertised(topic.to_string()))?;
        if record.msg_type != M::type_name() {
            return Err(Error::TypeMismatch {
                advertised: record.msg_type,
                published: M::type_name().to_string(),
            });
        }

        // Local subscribers, invoked without serialization.
        let handlers = {
            self.shared
                .state
                .lock()
                .subscriptions
                .handlers_for_topic(&fqn)
        };
        for handler in handlers {
            if handler.type_name() != M::type_name() {
                continue;
            }
            handler.run_local_callback(&fqn, msg);
        }

        // Remote subscribers: serialize once, skip the wire when nobody is
        // interested.
        if self.shared.has_remote_subscribers(&fqn) {
            let data = msg.encode()?;
            self.shared.publish(&fqn, &data)?;
        }
        Ok(())
    }

    /// Subscribe to a topic with payload type `M`.
    ///
    /// Installs the topic filter, broadcasts one SUBSCRIBE, and connects to
    /// every publisher discovery reports (now or later).
    pub fn subscribe<M, F>(&mut self, topic: &str, cb: F, opts: SubscribeOptions) -> Result<()>
    where
        M: Message,
        F: Fn(&M, &str) + Send + Sync + 'static,
    {
        let fqn = self.topic_name(topic)?;
        let handler = Arc::new(SubscriptionHandler::new::<M, F>(self.n_uuid, opts, cb));
        self.shared.state.lock().subscriptions.add_handler(
            &fqn,
            self.n_uuid,
            handler.h_uuid(),
            handler,
        );
        self.shared.sub_socket.add_filter(fqn.as_bytes());
        self.topics_subscribed.insert(fqn.clone());

        // Publishers already known answer through the connection callback;
        // unknown ones answer the SUBSCRIBE broadcast with an ADVERTISE.
        self.shared.discovery.discover_msg(&fqn)
    }

    /// Remove this node's subscriptions on a topic.
    pub fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        let fqn = self.topic_name(topic)?;
        self.unsubscribe_fqn(&fqn)
    }

    fn unsubscribe_fqn(&mut self, fqn: &str) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            state.subscriptions.remove_handlers_for_node(fqn, self.n_uuid);
        }
        self.topics_subscribed.remove(fqn);

        // When the last handler in this process is gone, drop the filter and
        // withdraw our interest from every known publisher.
        let last = {
            !self
                .shared
                .state
                .lock()
                .subscriptions
                .has_handlers_for_topic(fqn)
        };
        if !last {
            return Ok(());
        }

        self.shared.sub_socket.remove_filter(fqn.as_bytes());
        if let Some(addresses) = self.shared.discovery.msg_publishers(fqn) {
            for records in addresses.values() {
                for record in records {
                    if record.p_uuid == self.shared.p_uuid() {
                        continue;
                    }
                    if let Err(e) = control::send_control(
                        &record.ctrl,
                        fqn,
                        self.shared.my_address(),
                        self.n_uuid,
                        OP_END_CONNECTION,
                    ) {
                        log::debug!(
                            "[node] failed to withdraw interest from {}: {}",
                            record.ctrl,
                            e
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Advertise a service with request type `Req` and reply type `Rep`.
    ///
    /// `cb` runs on the shared reception thread for every incoming request
    /// and returns the reply plus a success flag conveyed in band.
    pub fn advertise_service<Req, Rep, F>(
        &mut self,
        service: &str,
        cb: F,
        opts: AdvertiseOptions,
    ) -> Result<()>
    where
        Req: Message,
        Rep: Message,
        F: Fn(&Req) -> (Rep, bool) + Send + Sync + 'static,
    {
        let fqn = self.service_name(service)?;
        if self.srvs_advertised.contains(&fqn) {
            return Err(Error::AlreadyAdvertised(service.to_string()));
        }

        let handler = Arc::new(RepHandler::new::<Req, Rep, F>(self.n_uuid, cb));
        self.shared.state.lock().repliers.add_handler(
            &fqn,
            self.n_uuid,
            handler.h_uuid(),
            Arc::clone(&handler),
        );

        let publisher = ServicePublisher {
            topic: fqn.clone(),
            addr: self.shared.my_control_address().to_string(),
            ctrl: self.shared.my_control_address().to_string(),
            p_uuid: self.shared.p_uuid(),
            n_uuid: self.n_uuid,
            scope: opts.scope(),
            socket_id: self.shared.replier_id().to_string(),
            req_type: Req::type_name().to_string(),
            rep_type: Rep::type_name().to_string(),
        };
        self.shared.discovery.advertise_srv(publisher)?;
        self.srvs_advertised.insert(fqn);
        Ok(())
    }

    /// Withdraw a service advertisement.
    ///
    /// # Errors
    ///
    /// `NotAdvertised` when this node does not advertise the service.
    pub fn unadvertise_service(&mut self, service: &str) -> Result<()> {
        let fqn = self.service_name(service)?;
        if !self.srvs_advertised.remove(&fqn) {
            return Err(Error::NotAdvertised(service.to_string()));
        }
        self.shared
            .state
            .lock()
            .repliers
            .remove_handlers_for_node(&fqn, self.n_uuid);
        self.shared.discovery.unadvertise_srv(&fqn, self.n_uuid)
    }

    /// Call a service and block until the reply arrives or `timeout_ms`
    /// elapses.
    ///
    /// Returns the reply and the replier's in-band success flag.
    ///
    /// # Errors
    ///
    /// `NoPublisher` when no replier is known; `Timeout` when the deadline
    /// passes; `TypeMismatch` when `Req`/`Rep` do not match the replier's
    /// declared types.
    pub fn request<Req, Rep>(
        &self,
        service: &str,
        req: &Req,
        timeout_ms: u64,
    ) -> Result<(Rep, bool)>
    where
        Req: Message,
        Rep: Message,
    {
        let fqn = self.service_name(service)?;
        let record = self.first_srv_publisher(&fqn, service)?;

        if record.req_type != Req::type_name() {
            return Err(Error::TypeMismatch {
                advertised: record.req_type,
                published: Req::type_name().to_string(),
            });
        }
        if record.rep_type != Rep::type_name() {
            return Err(Error::TypeMismatch {
                advertised: record.rep_type,
                published: Rep::type_name().to_string(),
            });
        }

        let req_data = req.encode()?;

        // Replier in this very process: invoke it directly.
        if record.p_uuid == self.shared.p_uuid() {
            let handler = {
                self.shared
                    .state
                    .lock()
                    .repliers
                    .first_handler(&fqn)
                    .ok_or_else(|| Error::NoPublisher(service.to_string()))?
            };
            let (rep, success) = handler.run_callback(&fqn, &req_data);
            return Ok((Rep::decode(&rep)?, success));
        }

        let handler = Arc::new(ReqHandler::new(self.n_uuid, req_data));
        let h_uuid = handler.h_uuid();
        self.shared.state.lock().requests.add_handler(
            &fqn,
            self.n_uuid,
            h_uuid,
            Arc::clone(&handler),
        );

        if let Err(e) =
            self.shared
                .requester
                .send_request(&record.addr, &fqn, h_uuid, handler.req_data())
        {
            self.shared
                .state
                .lock()
                .requests
                .remove_handler(&fqn, self.n_uuid, h_uuid);
            return Err(e);
        }

        let fired = handler.wait_until(Instant::now() + Duration::from_millis(timeout_ms));
        self.shared
            .state
            .lock()
            .requests
            .remove_handler(&fqn, self.n_uuid, h_uuid);

        if !fired {
            return Err(Error::Timeout);
        }
        let (rep, success) = handler.response();
        Ok((Rep::decode(&rep)?, success))
    }

    /// Fire-and-forget service call: sends the request without registering a
    /// reply handler.
    ///
    /// # Errors
    ///
    /// `NoPublisher` when no replier is known.
    pub fn request_oneway<Req: Message>(&self, service: &str, req: &Req) -> Result<()> {
        let fqn = self.service_name(service)?;
        let record = self.first_srv_publisher(&fqn, service)?;
        let req_data = req.encode()?;

        if record.p_uuid == self.shared.p_uuid() {
            let handler = { self.shared.state.lock().repliers.first_handler(&fqn) };
            if let Some(handler) = handler {
                let _ = handler.run_callback(&fqn, &req_data);
            }
            return Ok(());
        }

        self.shared
            .requester
            .send_request(&record.addr, &fqn, HandlerUuid::random(), &req_data)
    }

    /// Topics this node advertises, partition prefix stripped.
    pub fn advertised_topics(&self) -> Vec<String> {
        strip_sorted(&self.topics_advertised)
    }

    /// Topics this node subscribes to, partition prefix stripped.
    pub fn subscribed_topics(&self) -> Vec<String> {
        strip_sorted(&self.topics_subscribed)
    }

    /// Services this node advertises, partition prefix stripped.
    pub fn advertised_services(&self) -> Vec<String> {
        strip_sorted(&self.srvs_advertised)
    }

    /// All topic names known to discovery for this node's partition.
    pub fn topic_list(&self) -> Vec<String> {
        self.known_names(&self.shared.discovery.msg_topic_list())
    }

    /// All service names known to discovery for this node's partition.
    pub fn service_list(&self) -> Vec<String> {
        self.known_names(&self.shared.discovery.srv_topic_list())
    }

    /// Publisher records known for one topic.
    pub fn topic_info(&self, topic: &str) -> Result<Vec<MessagePublisher>> {
        let fqn = self.topic_name(topic)?;
        Ok(self
            .shared
            .discovery
            .msg_publishers(&fqn)
            .map(|addresses| addresses.into_values().flatten().collect())
            .unwrap_or_default())
    }

    /// Publisher records known for one service.
    pub fn service_info(&self, service: &str) -> Result<Vec<ServicePublisher>> {
        let fqn = self.service_name(service)?;
        Ok(self
            .shared
            .discovery
            .srv_publishers(&fqn)
            .map(|addresses| addresses.into_values().flatten().collect())
            .unwrap_or_default())
    }

    fn topic_name(&self, topic: &str) -> Result<String> {
        name::fully_qualified_typed_name(
            NameType::Msg,
            self.options.partition(),
            self.options.namespace(),
            topic,
        )
    }

    fn service_name(&self, service: &str) -> Result<String> {
        name::fully_qualified_typed_name(
            NameType::Srv,
            self.options.partition(),
            self.options.namespace(),
            service,
        )
    }

    fn first_srv_publisher(&self, fqn: &str, service: &str) -> Result<ServicePublisher> {
        self.shared
            .discovery
            .srv_publishers(fqn)
            .and_then(|addresses| {
                addresses
                    .values()
                    .flat_map(|records| records.iter())
                    .next()
                    .cloned()
            })
            .ok_or_else(|| Error::NoPublisher(service.to_string()))
    }

    fn known_names(&self, fqns: &[String]) -> Vec<String> {
        let mut names: Vec<String> = fqns
            .iter()
            .filter(|fqn| name::partition_from_name(fqn) == Some(self.options.partition()))
            .filter_map(|fqn| name::topic_from_name(fqn))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let subscribed: Vec<String> = self.topics_subscribed.iter().cloned().collect();
        for fqn in subscribed {
            if let Err(e) = self.unsubscribe_fqn(&fqn) {
                log::error!("[node] error unsubscribing from [{}]: {}", fqn, e);
            }
        }

        for fqn in self.topics_advertised.drain() {
            if let Err(e) = self.shared.discovery.unadvertise_msg(&fqn, self.n_uuid) {
                log::error!("[node] error unadvertising topic [{}]: {}", fqn, e);
            }
        }

        for fqn in self.srvs_advertised.drain() {
            self.shared
                .state
                .lock()
                .repliers
                .remove_handlers_for_node(&fqn, self.n_uuid);
            if let Err(e) = self.shared.discovery.unadvertise_srv(&fqn, self.n_uuid) {
                log::error!("[node] error unadvertising service [{}]: {}", fqn, e);
            }
        }
    }
}

fn strip_sorted(fqns: &HashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = fqns
        .iter()
        .filter_map(|fqn| name::topic_from_name(fqn))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}
