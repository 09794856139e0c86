// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # peerbus - Broker-less peer-to-peer transport
//!
//! A pure Rust transport library for exchanging typed messages over named
//! topics (publish/subscribe) and invoking named services (request/reply)
//! between independent processes, without any central broker.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peerbus::{Node, StringMsg, Result};
//!
//! fn main() -> Result<()> {
//!     let mut node = Node::new()?;
//!
//!     // Advertise and publish a topic
//!     node.advertise::<StringMsg>("chatter", Default::default())?;
//!     node.publish("chatter", &StringMsg::from("HELLO"))?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                         Application Layer                          |
//! |            Node -> advertise/subscribe/publish/request             |
//! +--------------------------------------------------------------------+
//! |                          Dispatch Layer                            |
//! |   Handler registries | Remote-subscriber map | Shared reception    |
//! +--------------------------------------------------------------------+
//! |                          Discovery Layer                           |
//! |   UDP broadcast beacons | Activity audit | Topic-address index     |
//! +--------------------------------------------------------------------+
//! |                          Transport Layer                           |
//! |   TCP pub/sub streaming | Control channel | UDP discovery socket   |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Node`] | Entry point: advertises, subscribes, publishes and requests |
//! | [`Message`] | Contract user payload types implement (type name + codec) |
//! | [`Scope`] | Visibility of a publication (`Process`, `Host`, `All`) |
//! | [`NodeOptions`] | Per-node partition and namespace |
//!
//! Nodes in the same process, on the same host, or across a LAN interoperate
//! with identical semantics. Partition isolation keeps co-located deployments
//! from seeing each other; see [`core::name`] for the naming rules.

use std::fmt;

/// Global configuration constants and environment resolution.
pub mod config;
/// Core building blocks (identifiers, topic naming).
pub mod core;
/// Discovery engine (UDP broadcast tasks, beacons, topic index).
pub mod discovery;
/// Message contract for user payload types.
pub mod message;
/// Node facade and per-process shared state.
pub mod node;
/// Discovery wire protocol (packet codec).
pub mod protocol;
/// Streaming and datagram transport plumbing.
pub mod transport;

pub use crate::core::uuid::{HandlerUuid, NodeUuid, ProcessUuid};
pub use discovery::publisher::{MessagePublisher, Scope, ServicePublisher};
pub use message::{Message, StringMsg};
pub use node::options::{AdvertiseOptions, NodeOptions, SubscribeOptions};
pub use node::Node;

/// peerbus version string.
pub const VERSION: &str = "0.2.0";

/// Errors surfaced by the public API.
///
/// Discovery-side failures (malformed datagrams, transient socket errors on
/// the background tasks) are logged and swallowed; only node-facade
/// operations return these to the caller.
#[derive(Debug)]
pub enum Error {
    /// Partition, namespace or topic violates the naming rules, or the
    /// composed fully qualified name exceeds the maximum length.
    InvalidName(String),
    /// Publish or unadvertise on a topic this node has not advertised.
    NotAdvertised(String),
    /// Second advertise from the same node on the same topic.
    AlreadyAdvertised(String),
    /// Payload type name does not match the type declared at advertise.
    TypeMismatch {
        advertised: String,
        published: String,
    },
    /// Service call issued on a service with no known replier.
    NoPublisher(String),
    /// Request deadline elapsed before a reply arrived.
    Timeout,
    /// Discovery datagram failed to decode.
    MalformedPacket(&'static str),
    /// Underlying socket failure.
    Transport(String),
    /// I/O error with underlying cause.
    Io(std::io::Error),
    /// Tunable interval set below 1 ms.
    InvalidInterval(u64),
    /// User payload failed to encode or decode.
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidName(name) => write!(f, "Invalid name: [{}]", name),
            Error::NotAdvertised(topic) => {
                write!(f, "Topic [{}] not advertised by this node", topic)
            }
            Error::AlreadyAdvertised(topic) => {
                write!(f, "Topic [{}] already advertised by this node", topic)
            }
            Error::TypeMismatch {
                advertised,
                published,
            } => write!(
                f,
                "Type mismatch: advertised [{}], published [{}]",
                advertised, published
            ),
            Error::NoPublisher(service) => {
                write!(f, "No publisher known for service [{}]", service)
            }
            Error::Timeout => write!(f, "Request timed out"),
            Error::MalformedPacket(reason) => write!(f, "Malformed packet: {}", reason),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::InvalidInterval(ms) => {
                write!(f, "Invalid interval: {} ms (must be >= 1)", ms)
            }
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenient alias for API results using the public [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
