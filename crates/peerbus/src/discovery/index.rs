// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic-address index: topic -> process -> publisher records.
//!
//! One instance exists per discovery plane (messages, services). All
//! mutations happen under the index's own lock; the lock is never held while
//! user callbacks run.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::uuid::{NodeUuid, ProcessUuid};
use crate::discovery::publisher::PublisherRecord;

/// Publishers of one topic, keyed by owning process.
pub type AddressMap<P> = HashMap<ProcessUuid, Vec<P>>;

/// Thread-safe index of every known publisher record.
pub struct TopicIndex<P: PublisherRecord> {
    data: Mutex<HashMap<String, AddressMap<P>>>,
}

impl<P: PublisherRecord> Default for TopicIndex<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PublisherRecord> TopicIndex<P> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Register a publisher record.
    ///
    /// Returns `true` when a new entry was created. A record with the same
    /// primary address and node UUID under the same (topic, process) is
    /// idempotent and returns `false`.
    pub fn add_publisher(&self, publisher: P) -> bool {
        let mut data = self.data.lock();
        let procs = data.entry(publisher.topic().to_string()).or_default();
        let records = procs.entry(publisher.p_uuid()).or_default();

        let exists = records
            .iter()
            .any(|p| p.addr() == publisher.addr() && p.n_uuid() == publisher.n_uuid());
        if exists {
            return false;
        }

        records.push(publisher);
        true
    }

    /// Whether any publisher is known for `topic`.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.data.lock().contains_key(topic)
    }

    /// Whether process `p_uuid` has at least one publisher of `topic`.
    pub fn has_any_publisher(&self, topic: &str, p_uuid: ProcessUuid) -> bool {
        self.data
            .lock()
            .get(topic)
            .is_some_and(|procs| procs.contains_key(&p_uuid))
    }

    /// Look up the record of one specific (topic, process, node).
    pub fn get_publisher(&self, topic: &str, p_uuid: ProcessUuid, n_uuid: NodeUuid) -> Option<P> {
        self.data
            .lock()
            .get(topic)?
            .get(&p_uuid)?
            .iter()
            .find(|p| p.n_uuid() == n_uuid)
            .cloned()
    }

    /// All publishers known for `topic`, keyed by process.
    pub fn get_publishers(&self, topic: &str) -> Option<AddressMap<P>> {
        self.data.lock().get(topic).cloned()
    }

    /// Remove the records of one (topic, process, node). Empty per-process
    /// lists and empty topics are pruned.
    ///
    /// Returns `true` when at least one record was removed.
    pub fn del_publisher_by_node(
        &self,
        topic: &str,
        p_uuid: ProcessUuid,
        n_uuid: NodeUuid,
    ) -> bool {
        let mut data = self.data.lock();
        let Some(procs) = data.get_mut(topic) else {
            return false;
        };
        let Some(records) = procs.get_mut(&p_uuid) else {
            return false;
        };

        let prior = records.len();
        records.retain(|p| p.n_uuid() != n_uuid);
        let removed = prior - records.len();

        if records.is_empty() {
            procs.remove(&p_uuid);
        }
        if procs.is_empty() {
            data.remove(topic);
        }
        removed > 0
    }

    /// Remove every record owned by one process (disconnection cascade).
    ///
    /// Returns `true` when at least one record was removed.
    pub fn del_publishers_by_process(&self, p_uuid: ProcessUuid) -> bool {
        let mut data = self.data.lock();
        let mut removed = false;
        data.retain(|_, procs| {
            if procs.remove(&p_uuid).is_some() {
                removed = true;
            }
            !procs.is_empty()
        });
        removed
    }

    /// All topic names currently known, sorted.
    pub fn topic_list(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.data.lock().keys().cloned().collect();
        topics.sort();
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::publisher::{MessagePublisher, Scope};

    fn publisher(topic: &str, addr: &str, p: ProcessUuid, n: NodeUuid) -> MessagePublisher {
        MessagePublisher {
            topic: topic.to_string(),
            addr: addr.to_string(),
            ctrl: format!("{}-ctrl", addr),
            p_uuid: p,
            n_uuid: n,
            scope: Scope::All,
            msg_type: "peerbus.msgs.StringMsg".to_string(),
        }
    }

    #[test]
    fn test_add_publisher_idempotent() {
        let index = TopicIndex::new();
        let p = ProcessUuid::random();
        let n = NodeUuid::random();

        assert!(index.add_publisher(publisher("@p@msg@/t", "10.0.0.1:5000", p, n)));
        // Identical arguments: the index is unchanged and the call reports
        // "not new".
        assert!(!index.add_publisher(publisher("@p@msg@/t", "10.0.0.1:5000", p, n)));

        let procs = index.get_publishers("@p@msg@/t").expect("topic exists");
        assert_eq!(procs.get(&p).map(Vec::len), Some(1));
    }

    #[test]
    fn test_add_publisher_distinct_nodes() {
        let index = TopicIndex::new();
        let p = ProcessUuid::random();

        assert!(index.add_publisher(publisher("@p@msg@/t", "10.0.0.1:5000", p, NodeUuid::random())));
        assert!(index.add_publisher(publisher("@p@msg@/t", "10.0.0.1:5000", p, NodeUuid::random())));

        let procs = index.get_publishers("@p@msg@/t").expect("topic exists");
        assert_eq!(procs.get(&p).map(Vec::len), Some(2));
    }

    #[test]
    fn test_get_publisher_by_tuple() {
        let index = TopicIndex::new();
        let p = ProcessUuid::random();
        let n1 = NodeUuid::random();
        let n2 = NodeUuid::random();
        index.add_publisher(publisher("@p@msg@/t", "10.0.0.1:5000", p, n1));
        index.add_publisher(publisher("@p@msg@/t", "10.0.0.1:5001", p, n2));

        let found = index.get_publisher("@p@msg@/t", p, n2).expect("found");
        assert_eq!(found.addr, "10.0.0.1:5001");
        assert!(index
            .get_publisher("@p@msg@/t", p, NodeUuid::random())
            .is_none());
        assert!(index
            .get_publisher("@p@msg@/other", p, n1)
            .is_none());
    }

    #[test]
    fn test_del_publisher_by_node_prunes() {
        let index = TopicIndex::new();
        let p = ProcessUuid::random();
        let n = NodeUuid::random();
        index.add_publisher(publisher("@p@msg@/t", "10.0.0.1:5000", p, n));

        assert!(index.del_publisher_by_node("@p@msg@/t", p, n));
        assert!(!index.has_topic("@p@msg@/t"));
        // Second delete is a no-op.
        assert!(!index.del_publisher_by_node("@p@msg@/t", p, n));
    }

    #[test]
    fn test_del_publishers_by_process_cascade() {
        let index = TopicIndex::new();
        let dead = ProcessUuid::random();
        let alive = ProcessUuid::random();
        index.add_publisher(publisher("@p@msg@/a", "10.0.0.1:5000", dead, NodeUuid::random()));
        index.add_publisher(publisher("@p@msg@/b", "10.0.0.1:5001", dead, NodeUuid::random()));
        index.add_publisher(publisher("@p@msg@/b", "10.0.0.2:5000", alive, NodeUuid::random()));

        assert!(index.del_publishers_by_process(dead));
        assert!(!index.has_topic("@p@msg@/a"));
        assert!(index.has_topic("@p@msg@/b"));
        assert!(index.has_any_publisher("@p@msg@/b", alive));
        assert!(!index.has_any_publisher("@p@msg@/b", dead));
    }

    #[test]
    fn test_topic_list_sorted() {
        let index = TopicIndex::new();
        let p = ProcessUuid::random();
        index.add_publisher(publisher("@p@msg@/zeta", "10.0.0.1:5000", p, NodeUuid::random()));
        index.add_publisher(publisher("@p@msg@/alpha", "10.0.0.1:5001", p, NodeUuid::random()));
        assert_eq!(index.topic_list(), vec!["@p@msg@/alpha", "@p@msg@/zeta"]);
    }
}
