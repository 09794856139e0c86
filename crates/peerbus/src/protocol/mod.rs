// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery wire protocol.
//!
//! Every discovery datagram is one [`Header`] followed, for the
//! advertise-family types, by one advertise body carrying the publisher
//! record. All multi-byte integers are little-endian; strings and UUIDs are
//! length-prefixed with a `u16`.

mod packet;

pub use packet::{
    decode_msg_publisher, decode_srv_publisher, encode_msg_publisher, encode_srv_publisher, Header,
};

use std::fmt;

/// Discovery message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryType {
    /// Advertise a message topic.
    Adv = 0,
    /// Request information about a message topic.
    Sub = 1,
    /// Withdraw a message topic advertisement.
    Unadv = 2,
    /// Periodic liveness heartbeat.
    Hello = 3,
    /// Orderly departure of a whole process.
    Bye = 4,
    /// Advertise a service.
    AdvSrv = 5,
    /// Request information about a service.
    SubSrv = 6,
    /// Withdraw a service advertisement.
    UnadvSrv = 7,
}

impl DiscoveryType {
    /// One-byte wire representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse the one-byte wire representation.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(DiscoveryType::Adv),
            1 => Some(DiscoveryType::Sub),
            2 => Some(DiscoveryType::Unadv),
            3 => Some(DiscoveryType::Hello),
            4 => Some(DiscoveryType::Bye),
            5 => Some(DiscoveryType::AdvSrv),
            6 => Some(DiscoveryType::SubSrv),
            7 => Some(DiscoveryType::UnadvSrv),
            _ => None,
        }
    }

    /// Whether this type carries an advertise body after the header.
    pub fn has_body(self) -> bool {
        matches!(
            self,
            DiscoveryType::Adv
                | DiscoveryType::Unadv
                | DiscoveryType::AdvSrv
                | DiscoveryType::UnadvSrv
        )
    }
}

impl fmt::Display for DiscoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiscoveryType::Adv => "ADVERTISE",
            DiscoveryType::Sub => "SUBSCRIBE",
            DiscoveryType::Unadv => "UNADVERTISE",
            DiscoveryType::Hello => "HELLO",
            DiscoveryType::Bye => "BYE",
            DiscoveryType::AdvSrv => "ADVERTISE_SRV",
            DiscoveryType::SubSrv => "SUBSCRIBE_SRV",
            DiscoveryType::UnadvSrv => "UNADVERTISE_SRV",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_type_round_trip() {
        for byte in 0..=7u8 {
            let t = DiscoveryType::from_u8(byte).expect("known type");
            assert_eq!(t.to_u8(), byte);
        }
        assert_eq!(DiscoveryType::from_u8(8), None);
        assert_eq!(DiscoveryType::from_u8(255), None);
    }

    #[test]
    fn test_body_presence() {
        assert!(DiscoveryType::Adv.has_body());
        assert!(DiscoveryType::UnadvSrv.has_body());
        assert!(!DiscoveryType::Sub.has_body());
        assert!(!DiscoveryType::Hello.has_body());
        assert!(!DiscoveryType::Bye.has_body());
    }
}
