// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Header and advertise-body codec.
//!
//! Header layout, in order: 2-byte version, 16-byte process UUID, 2-byte
//! topic length + topic bytes, 1-byte message type, 2-byte flags. The
//! advertise body carries length-prefixed fields: address, control address,
//! node UUID, scope byte, then the type name(s) of the advertised payload.

use super::DiscoveryType;
use crate::core::uuid::{NodeUuid, ProcessUuid};
use crate::discovery::publisher::{MessagePublisher, Scope, ServicePublisher};
use crate::{Error, Result};

/// Header included in every discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Discovery protocol version.
    pub version: u16,
    /// Process UUID of the sender.
    pub p_uuid: ProcessUuid,
    /// Topic or service name the datagram refers to (empty for
    /// Hello/Bye).
    pub topic: String,
    /// Message type.
    pub msg_type: DiscoveryType,
    /// Optional flags. Unused today; reserved for compression and similar.
    pub flags: u16,
}

impl Header {
    /// Create a header with the current wire version and no flags.
    pub fn new(p_uuid: ProcessUuid, topic: impl Into<String>, msg_type: DiscoveryType) -> Self {
        Self {
            version: crate::config::WIRE_VERSION,
            p_uuid,
            topic: topic.into(),
            msg_type,
            flags: 0,
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        2 + 16 + 2 + self.topic.len() + 1 + 2
    }

    /// Serialize onto the end of `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.p_uuid.as_bytes());
        put_bytes(out, self.topic.as_bytes());
        out.push(self.msg_type.to_u8());
        out.extend_from_slice(&self.flags.to_le_bytes());
    }

    /// Deserialize a header from the front of `buf`.
    ///
    /// Returns the header and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// `MalformedPacket` on short reads or an unknown message type.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(buf);
        let version = r.u16()?;
        let p_uuid = ProcessUuid::from_bytes(r.array16()?);
        let topic = r.string()?;
        let msg_type = DiscoveryType::from_u8(r.u8()?)
            .ok_or(Error::MalformedPacket("unknown message type"))?;
        let flags = r.u16()?;
        Ok((
            Self {
                version,
                p_uuid,
                topic,
                msg_type,
                flags,
            },
            r.pos,
        ))
    }
}

/// Serialize a message publisher body onto the end of `out`.
pub fn encode_msg_publisher(publisher: &MessagePublisher, out: &mut Vec<u8>) {
    put_bytes(out, publisher.addr.as_bytes());
    put_bytes(out, publisher.ctrl.as_bytes());
    put_uuid(out, publisher.n_uuid.as_bytes());
    out.push(publisher.scope.to_u8());
    put_bytes(out, publisher.msg_type.as_bytes());
}

/// Deserialize a message publisher body. Topic and process UUID come from the
/// header.
///
/// # Errors
///
/// `MalformedPacket` on short reads or an invalid scope byte.
pub fn decode_msg_publisher(header: &Header, body: &[u8]) -> Result<MessagePublisher> {
    let mut r = Reader::new(body);
    let addr = r.string()?;
    let ctrl = r.string()?;
    let n_uuid = NodeUuid::from_bytes(r.uuid()?);
    let scope = Scope::from_u8(r.u8()?).ok_or(Error::MalformedPacket("invalid scope"))?;
    let msg_type = r.string()?;
    Ok(MessagePublisher {
        topic: header.topic.clone(),
        addr,
        ctrl,
        p_uuid: header.p_uuid,
        n_uuid,
        scope,
        msg_type,
    })
}

/// Serialize a service publisher body onto the end of `out`.
pub fn encode_srv_publisher(publisher: &ServicePublisher, out: &mut Vec<u8>) {
    put_bytes(out, publisher.addr.as_bytes());
    put_bytes(out, publisher.ctrl.as_bytes());
    put_uuid(out, publisher.n_uuid.as_bytes());
    out.push(publisher.scope.to_u8());
    put_bytes(out, publisher.socket_id.as_bytes());
    put_bytes(out, publisher.req_type.as_bytes());
    put_bytes(out, publisher.rep_type.as_bytes());
}

/// Deserialize a service publisher body.
///
/// # Errors
///
/// `MalformedPacket` on short reads or an invalid scope byte.
pub fn decode_srv_publisher(header: &Header, body: &[u8]) -> Result<ServicePublisher> {
    let mut r = Reader::new(body);
    let addr = r.string()?;
    let ctrl = r.string()?;
    let n_uuid = NodeUuid::from_bytes(r.uuid()?);
    let scope = Scope::from_u8(r.u8()?).ok_or(Error::MalformedPacket("invalid scope"))?;
    let socket_id = r.string()?;
    let req_type = r.string()?;
    let rep_type = r.string()?;
    Ok(ServicePublisher {
        topic: header.topic.clone(),
        addr,
        ctrl,
        p_uuid: header.p_uuid,
        n_uuid,
        scope,
        socket_id,
        req_type,
        rep_type,
    })
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    // Name validation caps every field at u16::MAX.
    debug_assert!(bytes.len() <= u16::MAX as usize);
    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn put_uuid(out: &mut Vec<u8>, bytes: &[u8; 16]) {
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(bytes);
}

/// Bounds-checked offset cursor over a received datagram.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(Error::MalformedPacket("short read"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn array16(&mut self) -> Result<[u8; 16]> {
        let slice = self.take(16)?;
        let mut out = [0u8; 16];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Length-prefixed UTF-8 string.
    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::MalformedPacket("invalid utf-8"))
    }

    /// Length-prefixed 16-byte UUID. The length on the wire must be exactly
    /// 16.
    fn uuid(&mut self) -> Result<[u8; 16]> {
        let len = self.u16()? as usize;
        if len != 16 {
            return Err(Error::MalformedPacket("uuid length is not 16"));
        }
        self.array16()
    }
}
