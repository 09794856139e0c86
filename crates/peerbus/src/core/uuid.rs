// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed 16-byte identifiers.
//!
//! Three id spaces exist and never mix: one [`ProcessUuid`] per process, one
//! [`NodeUuid`] per node, one [`HandlerUuid`] per registered handler or
//! pending service call. All three share the same byte layout and the same
//! dotted-hex display format.

use std::fmt;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name([u8; 16]);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn random() -> Self {
                Self(*uuid::Uuid::new_v4().as_bytes())
            }

            /// Create from raw bytes (16 bytes total).
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            /// Raw 16-byte representation.
            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            /// All-zeros placeholder identifier.
            pub fn zero() -> Self {
                Self([0u8; 16])
            }

            /// Check whether this is the all-zeros placeholder.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|&b| b == 0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Format: "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
                for (i, byte) in self.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }
    };
}

uuid_newtype! {
    /// Unique identifier of a participating process. Immutable for the
    /// process lifetime; stamped into every discovery datagram header.
    ProcessUuid
}

uuid_newtype! {
    /// Unique identifier of a node within a process.
    NodeUuid
}

uuid_newtype! {
    /// Unique identifier of a registered handler. For service calls this is
    /// the correlation key matching a reply to its waiting caller.
    HandlerUuid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_uuids_are_distinct() {
        let a = ProcessUuid::random();
        let b = ProcessUuid::random();
        assert_ne!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn test_from_bytes_round_trip() {
        let raw = [1, 15, 172, 16, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 1, 193];
        let id = NodeUuid::from_bytes(raw);
        assert_eq!(*id.as_bytes(), raw);
    }

    #[test]
    fn test_display_dotted_hex() {
        let raw = [1, 15, 172, 16, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 1, 193];
        let id = HandlerUuid::from_bytes(raw);
        assert_eq!(
            id.to_string(),
            "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
        );
    }

    #[test]
    fn test_zero() {
        assert!(ProcessUuid::zero().is_zero());
        let raw = {
            let mut b = [0u8; 16];
            b[3] = 7;
            b
        };
        assert!(!ProcessUuid::from_bytes(raw).is_zero());
    }
}
