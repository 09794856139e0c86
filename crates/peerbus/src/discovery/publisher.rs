// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher records: the addressing information discovery trades in.
//!
//! A record describes one advertised topic or service of one node: where the
//! data flows from (primary endpoint), where control handshakes go (control
//! endpoint), who owns it (process + node UUID), how far it is visible
//! (scope), and the declared payload type name(s).

use std::fmt;

use crate::core::uuid::{NodeUuid, ProcessUuid};

/// Visibility of a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Only nodes in the same process see the publication.
    Process,
    /// Only nodes on the same host see the publication.
    Host,
    /// Unrestricted.
    #[default]
    All,
}

impl Scope {
    /// One-byte wire representation.
    pub fn to_u8(self) -> u8 {
        match self {
            Scope::Process => 0,
            Scope::Host => 1,
            Scope::All => 2,
        }
    }

    /// Parse the one-byte wire representation.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Scope::Process),
            1 => Some(Scope::Host),
            2 => Some(Scope::All),
            _ => None,
        }
    }
}

/// Common accessors shared by message and service publisher records. The
/// topic index and the discovery engine are generic over this.
pub trait PublisherRecord: Clone + Send + fmt::Debug + 'static {
    /// Fully qualified topic or service name.
    fn topic(&self) -> &str;
    /// Primary (streaming) endpoint address.
    fn addr(&self) -> &str;
    /// Control endpoint address.
    fn ctrl(&self) -> &str;
    /// Owning process.
    fn p_uuid(&self) -> ProcessUuid;
    /// Owning node.
    fn n_uuid(&self) -> NodeUuid;
    /// Visibility.
    fn scope(&self) -> Scope;

    /// An empty record carrying only a process UUID and `All` scope. Used by
    /// disconnection notifications for a whole process.
    fn from_process(p_uuid: ProcessUuid) -> Self;
}

/// Addressing information for one advertised message topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePublisher {
    /// Fully qualified topic name.
    pub topic: String,
    /// Streaming endpoint the payload frames flow from.
    pub addr: String,
    /// Control endpoint for subscription handshakes.
    pub ctrl: String,
    /// Owning process.
    pub p_uuid: ProcessUuid,
    /// Owning node.
    pub n_uuid: NodeUuid,
    /// Visibility.
    pub scope: Scope,
    /// Declared message type name.
    pub msg_type: String,
}

impl PublisherRecord for MessagePublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn addr(&self) -> &str {
        &self.addr
    }

    fn ctrl(&self) -> &str {
        &self.ctrl
    }

    fn p_uuid(&self) -> ProcessUuid {
        self.p_uuid
    }

    fn n_uuid(&self) -> NodeUuid {
        self.n_uuid
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    fn from_process(p_uuid: ProcessUuid) -> Self {
        Self {
            topic: String::new(),
            addr: String::new(),
            ctrl: String::new(),
            p_uuid,
            n_uuid: NodeUuid::zero(),
            scope: Scope::All,
            msg_type: String::new(),
        }
    }
}

impl fmt::Display for MessagePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Publisher:")?;
        writeln!(f, "\tTopic: [{}]", self.topic)?;
        writeln!(f, "\tAddress: {}", self.addr)?;
        writeln!(f, "\tControl: {}", self.ctrl)?;
        writeln!(f, "\tProcess UUID: {}", self.p_uuid)?;
        writeln!(f, "\tNode UUID: {}", self.n_uuid)?;
        writeln!(f, "\tMessage type: {}", self.msg_type)
    }
}

/// Addressing information for one advertised service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePublisher {
    /// Fully qualified service name.
    pub topic: String,
    /// Endpoint the request frames go to.
    pub addr: String,
    /// Control endpoint.
    pub ctrl: String,
    /// Owning process.
    pub p_uuid: ProcessUuid,
    /// Owning node.
    pub n_uuid: NodeUuid,
    /// Visibility.
    pub scope: Scope,
    /// Replier socket identity.
    pub socket_id: String,
    /// Declared request type name.
    pub req_type: String,
    /// Declared reply type name.
    pub rep_type: String,
}

impl PublisherRecord for ServicePublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn addr(&self) -> &str {
        &self.addr
    }

    fn ctrl(&self) -> &str {
        &self.ctrl
    }

    fn p_uuid(&self) -> ProcessUuid {
        self.p_uuid
    }

    fn n_uuid(&self) -> NodeUuid {
        self.n_uuid
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    fn from_process(p_uuid: ProcessUuid) -> Self {
        Self {
            topic: String::new(),
            addr: String::new(),
            ctrl: String::new(),
            p_uuid,
            n_uuid: NodeUuid::zero(),
            scope: Scope::All,
            socket_id: String::new(),
            req_type: String::new(),
            rep_type: String::new(),
        }
    }
}

impl fmt::Display for ServicePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Service publisher:")?;
        writeln!(f, "\tService: [{}]", self.topic)?;
        writeln!(f, "\tAddress: {}", self.addr)?;
        writeln!(f, "\tControl: {}", self.ctrl)?;
        writeln!(f, "\tProcess UUID: {}", self.p_uuid)?;
        writeln!(f, "\tNode UUID: {}", self.n_uuid)?;
        writeln!(f, "\tRequest type: {}", self.req_type)?;
        writeln!(f, "\tReply type: {}", self.rep_type)
    }
}
