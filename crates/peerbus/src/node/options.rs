// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-node, per-advertise and per-subscribe options.

use crate::core::name;
use crate::discovery::publisher::Scope;

/// Options attached to a node at construction: the partition it lives in and
/// the default namespace prefixed to relative topic names.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    partition: String,
    namespace: String,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            partition: crate::config::default_partition(),
            namespace: String::new(),
        }
    }
}

impl NodeOptions {
    /// Options with the default partition (`IGN_PARTITION`, or `host:user`)
    /// and an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// The partition.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Set the partition. Returns `false` (leaving the value unchanged) when
    /// `partition` violates the naming rules.
    pub fn set_partition(&mut self, partition: &str) -> bool {
        if !name::is_valid_partition(partition) {
            return false;
        }
        self.partition = partition.to_string();
        true
    }

    /// The namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Set the namespace. Returns `false` (leaving the value unchanged) when
    /// `ns` violates the naming rules.
    pub fn set_namespace(&mut self, ns: &str) -> bool {
        if !name::is_valid_namespace(ns) {
            return false;
        }
        self.namespace = ns.to_string();
        true
    }
}

/// Options attached to one advertise call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvertiseOptions {
    scope: Scope,
}

impl AdvertiseOptions {
    /// Options with `All` scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// The visibility of the publication.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Set the visibility of the publication.
    pub fn set_scope(&mut self, scope: Scope) {
        self.scope = scope;
    }

    /// Builder-style scope setter.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

/// Options attached to one subscribe call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    msgs_per_sec: Option<u64>,
}

impl SubscribeOptions {
    /// Options without a rate cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum callbacks per second, if capped.
    pub fn msgs_per_sec(&self) -> Option<u64> {
        self.msgs_per_sec
    }

    /// Cap the callback rate; messages over the cap are silently dropped.
    pub fn with_msgs_per_sec(mut self, cap: u64) -> Self {
        self.msgs_per_sec = Some(cap);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_options_validation() {
        let mut opts = NodeOptions::new();
        assert!(opts.set_partition("deployment_a"));
        assert_eq!(opts.partition(), "deployment_a");

        assert!(!opts.set_partition("bad partition"));
        assert_eq!(opts.partition(), "deployment_a");

        assert!(opts.set_namespace("/robot1"));
        assert!(!opts.set_namespace("/"));
        assert_eq!(opts.namespace(), "/robot1");
    }

    #[test]
    fn test_advertise_options_scope() {
        let opts = AdvertiseOptions::new().with_scope(Scope::Host);
        assert_eq!(opts.scope(), Scope::Host);
        assert_eq!(AdvertiseOptions::default().scope(), Scope::All);
    }

    #[test]
    fn test_subscribe_options_cap() {
        assert_eq!(SubscribeOptions::default().msgs_per_sec(), None);
        assert_eq!(
            SubscribeOptions::new().with_msgs_per_sec(10).msgs_per_sec(),
            Some(10)
        );
    }
}
