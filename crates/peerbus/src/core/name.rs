// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic, namespace and partition naming rules.
//!
//! Every topic crosses the wire as a fully qualified name that embeds the
//! partition: `@<partition>@<topic>`, or the typed variants
//! `@<partition>@msg@<topic>` / `@<partition>@srv@<topic>`. Since the
//! partition is part of the streaming filter prefix and of every discovery
//! datagram, peers in different partitions never match each other's topics.

use crate::config::MAX_NAME_LEN;
use crate::{Error, Result};

/// Whether a fully qualified name refers to the message plane or the service
/// plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameType {
    /// Topic carrying messages (pub/sub).
    Msg,
    /// Service (request/reply).
    Srv,
}

impl NameType {
    fn tag(self) -> &'static str {
        match self {
            NameType::Msg => "msg",
            NameType::Srv => "srv",
        }
    }
}

/// Check the validity of a namespace.
///
/// A namespace may be empty but must not be a bare `/`, must not contain
/// whitespace, `~`, `@` or `//`, and must not exceed the maximum name length.
pub fn is_valid_namespace(ns: &str) -> bool {
    if ns.len() > MAX_NAME_LEN {
        return false;
    }
    if ns == "/" {
        return false;
    }
    if ns.contains('~') || ns.contains('@') || ns.contains("//") {
        return false;
    }
    if ns.chars().any(char::is_whitespace) {
        return false;
    }
    true
}

/// Check the validity of a partition. Same rules as a namespace; the empty
/// partition is valid and means "no partition".
pub fn is_valid_partition(partition: &str) -> bool {
    is_valid_namespace(partition)
}

/// Check the validity of a topic name. Same rules as a namespace, except a
/// topic must be non-empty.
pub fn is_valid_topic(topic: &str) -> bool {
    is_valid_namespace(topic) && !topic.is_empty()
}

/// Compose the canonical fully qualified name `@<partition>@<topic>`.
///
/// A topic starting with `/` is absolute and the namespace is ignored.
/// Normalization: the partition loses a trailing `/`, the namespace gains
/// leading and trailing `/`, the topic loses a trailing `/`.
///
/// # Errors
///
/// Returns `InvalidName` if any component violates the naming rules or the
/// composed name exceeds the maximum length.
pub fn fully_qualified_name(partition: &str, ns: &str, topic: &str) -> Result<String> {
    compose(partition, ns, topic, None)
}

/// Compose the typed variant `@<partition>@msg@<topic>` or
/// `@<partition>@srv@<topic>`.
///
/// # Errors
///
/// Same failure conditions as [`fully_qualified_name`].
pub fn fully_qualified_typed_name(
    kind: NameType,
    partition: &str,
    ns: &str,
    topic: &str,
) -> Result<String> {
    compose(partition, ns, topic, Some(kind))
}

fn compose(partition: &str, ns: &str, topic: &str, kind: Option<NameType>) -> Result<String> {
    if !is_valid_partition(partition) || !is_valid_namespace(ns) || !is_valid_topic(topic) {
        return Err(Error::InvalidName(format!(
            "@{}@{}{}",
            partition, ns, topic
        )));
    }

    let partition = partition.strip_suffix('/').unwrap_or(partition);
    let topic = topic.strip_suffix('/').unwrap_or(topic);

    let mut ns = ns.to_string();
    if !ns.starts_with('/') {
        ns.insert(0, '/');
    }
    if !ns.ends_with('/') {
        ns.push('/');
    }

    // An absolute topic ignores the namespace.
    let path = if topic.starts_with('/') {
        topic.to_string()
    } else {
        format!("{}{}", ns, topic)
    };

    let name = match kind {
        Some(kind) => format!("@{}@{}@{}", partition, kind.tag(), path),
        None => format!("@{}@{}", partition, path),
    };

    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidName(format!(
            "name of {} chars exceeds {}",
            name.len(),
            MAX_NAME_LEN
        )));
    }

    Ok(name)
}

/// Extract the partition from a fully qualified name (typed or untyped).
pub fn partition_from_name(name: &str) -> Option<&str> {
    let rest = name.strip_prefix('@')?;
    let end = rest.find('@')?;
    Some(&rest[..end])
}

/// Extract the name type from a fully qualified typed name. Returns `None`
/// for untyped names.
pub fn type_from_name(name: &str) -> Option<NameType> {
    let rest = name.strip_prefix('@')?;
    let second = rest.find('@')?;
    let tail = &rest[second + 1..];
    if let Some(t) = tail.strip_prefix("msg@") {
        (!t.is_empty()).then_some(NameType::Msg)
    } else if let Some(t) = tail.strip_prefix("srv@") {
        (!t.is_empty()).then_some(NameType::Srv)
    } else {
        None
    }
}

/// Extract the topic path from a fully qualified name, dropping the partition
/// prefix and (when present) the type tag.
pub fn topic_from_name(name: &str) -> Option<&str> {
    let rest = name.strip_prefix('@')?;
    let second = rest.find('@')?;
    let tail = &rest[second + 1..];
    let topic = tail
        .strip_prefix("msg@")
        .or_else(|| tail.strip_prefix("srv@"))
        .unwrap_or(tail);
    (!topic.is_empty()).then_some(topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_topics() {
        for topic in ["abc", "/abc", "/abc/de", "/abc/de/", "abc_1/de-f"] {
            assert!(is_valid_topic(topic), "{} should be valid", topic);
        }
    }

    #[test]
    fn test_invalid_topics() {
        assert!(!is_valid_topic(""));
        assert!(!is_valid_topic("/"));
        assert!(!is_valid_topic("a topic"));
        assert!(!is_valid_topic("a\ttopic"));
        assert!(!is_valid_topic("~topic"));
        assert!(!is_valid_topic("a@b"));
        assert!(!is_valid_topic("a//b"));
        assert!(!is_valid_topic(&"x".repeat(MAX_NAME_LEN + 1)));
    }

    #[test]
    fn test_namespace_and_partition_rules() {
        assert!(is_valid_namespace(""));
        assert!(!is_valid_namespace("/"));
        assert!(is_valid_namespace("/ns/sub"));
        assert!(is_valid_partition(""));
        assert!(!is_valid_partition("bad partition"));
    }

    #[test]
    fn test_fully_qualified_name_composition() {
        let name = fully_qualified_name("p", "ns", "topic").expect("valid name");
        assert_eq!(name, "@p@/ns/topic");

        // Absolute topic ignores the namespace.
        let name = fully_qualified_name("p", "ns", "/abs").expect("valid name");
        assert_eq!(name, "@p@/abs");

        // Empty partition and namespace are allowed.
        let name = fully_qualified_name("", "", "t").expect("valid name");
        assert_eq!(name, "@@/t");

        // Trailing slashes are trimmed.
        let name = fully_qualified_name("p/", "ns", "t/").expect("valid name");
        assert_eq!(name, "@p@/ns/t");
    }

    #[test]
    fn test_typed_name_composition() {
        let name =
            fully_qualified_typed_name(NameType::Msg, "p", "", "chatter").expect("valid name");
        assert_eq!(name, "@p@msg@/chatter");
        let name =
            fully_qualified_typed_name(NameType::Srv, "p", "/ns", "echo").expect("valid name");
        assert_eq!(name, "@p@srv@/ns/echo");
    }

    #[test]
    fn test_fully_qualified_name_rejects_invalid() {
        assert!(fully_qualified_name("bad part", "", "t").is_err());
        assert!(fully_qualified_name("p", "/", "t").is_err());
        assert!(fully_qualified_name("p", "", "").is_err());
    }

    #[test]
    fn test_name_too_long() {
        let topic = "t".repeat(MAX_NAME_LEN - 2);
        // The topic alone is valid, but the composed name overflows.
        assert!(is_valid_topic(&topic));
        assert!(fully_qualified_name("p", "", &topic).is_err());
    }

    #[test]
    fn test_partition_round_trip() {
        for partition in ["host:user", "", "a/b"] {
            let name = fully_qualified_name(partition, "", "topic").expect("valid name");
            assert_eq!(partition_from_name(&name), Some(partition));

            let typed = fully_qualified_typed_name(NameType::Srv, partition, "", "topic")
                .expect("valid name");
            assert_eq!(partition_from_name(&typed), Some(partition));
        }
    }

    #[test]
    fn test_type_extractor() {
        let msg = fully_qualified_typed_name(NameType::Msg, "p", "", "t").expect("valid name");
        let srv = fully_qualified_typed_name(NameType::Srv, "p", "", "t").expect("valid name");
        let plain = fully_qualified_name("p", "", "t").expect("valid name");
        assert_eq!(type_from_name(&msg), Some(NameType::Msg));
        assert_eq!(type_from_name(&srv), Some(NameType::Srv));
        assert_eq!(type_from_name(&plain), None);
    }

    #[test]
    fn test_topic_extractor() {
        let msg = fully_qualified_typed_name(NameType::Msg, "p", "/ns", "t").expect("valid name");
        assert_eq!(topic_from_name(&msg), Some("/ns/t"));
        let plain = fully_qualified_name("p", "", "t").expect("valid name");
        assert_eq!(topic_from_name(&plain), Some("/t"));
    }
}
