// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport plumbing: the UDP discovery socket, the length-prefix frame
//! codec, and the three per-process streaming endpoints (publisher,
//! subscriber, control).
//!
//! Connection reader threads never dispatch in place; they forward decoded
//! frames through a channel as [`Event`]s, and the per-process reception loop
//! drains the channel. That keeps socket I/O off the registries' locks.

pub mod control;
pub mod frame;
pub mod pubsock;
pub mod subsock;
pub mod udp;

use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::uuid::{HandlerUuid, NodeUuid};

/// Write half of the connection a service request arrived on. The reply
/// frame is routed back through it.
pub type ReplySink = Arc<Mutex<TcpStream>>;

/// An inbound transport event, produced by connection reader threads and
/// consumed by the shared reception loop.
pub enum Event {
    /// A topic update arrived on the subscriber socket.
    Message {
        /// Filter prefix frame (the fully qualified topic name bytes).
        topic: Vec<u8>,
        /// Serialized payload.
        payload: Vec<u8>,
    },
    /// A connection-control handshake arrived on the control socket.
    Control {
        /// Fully qualified topic name.
        topic: String,
        /// The remote subscriber's primary address.
        addr: String,
        /// The remote subscriber's node UUID.
        n_uuid: NodeUuid,
        /// `OP_NEW_CONNECTION` or `OP_END_CONNECTION`.
        op: u8,
    },
    /// A service request arrived on the control socket.
    Request {
        /// Fully qualified service name.
        service: String,
        /// Correlation key of the caller's pending request.
        h_uuid: HandlerUuid,
        /// Serialized request.
        payload: Vec<u8>,
        /// Where to write the reply frame.
        reply: ReplySink,
    },
    /// A service reply arrived on a requester connection.
    Reply {
        /// Fully qualified service name.
        service: String,
        /// Correlation key matching the pending request.
        h_uuid: HandlerUuid,
        /// Serialized reply.
        payload: Vec<u8>,
        /// In-band service result.
        success: bool,
    },
}
