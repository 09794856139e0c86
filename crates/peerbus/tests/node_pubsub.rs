// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Same-process publish/subscribe scenarios through the public Node API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use peerbus::{
    AdvertiseOptions, Error, Message, Node, NodeOptions, Result, StringMsg, SubscribeOptions,
};

/// A second payload type for type-mismatch scenarios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CounterMsg {
    value: u32,
}

impl Message for CounterMsg {
    fn type_name() -> &'static str {
        "peerbus.msgs.CounterMsg"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.value.to_le_bytes().to_vec())
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let bytes: [u8; 4] = data
            .try_into()
            .map_err(|_| peerbus::Error::Serialization("need 4 bytes".into()))?;
        Ok(Self {
            value: u32::from_le_bytes(bytes),
        })
    }
}

fn options(partition: &str) -> NodeOptions {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut opts = NodeOptions::new();
    assert!(opts.set_partition(partition));
    opts
}

#[test]
fn test_publish_without_advertise_fails() {
    let node = Node::with_options(options("pubsub_t1")).expect("node starts");
    let result = node.publish("foo", &StringMsg::from("HELLO"));
    assert!(matches!(result, Err(Error::NotAdvertised(_))));
}

#[test]
fn test_same_process_pub_sub() {
    let mut advertiser = Node::with_options(options("pubsub_t2")).expect("node starts");
    let mut subscriber = Node::with_options(options("pubsub_t2")).expect("node starts");

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = Arc::clone(&received);
    subscriber
        .subscribe(
            "foo",
            move |msg: &StringMsg, _topic: &str| {
                received_clone.lock().expect("mutex ok").push(msg.data.clone());
            },
            SubscribeOptions::default(),
        )
        .expect("subscribes");

    advertiser
        .advertise::<StringMsg>("foo", AdvertiseOptions::default())
        .expect("advertises");
    advertiser
        .publish("foo", &StringMsg::from("HELLO"))
        .expect("publishes");

    // Local dispatch is synchronous on the publishing thread.
    let got = received.lock().expect("mutex ok").clone();
    assert_eq!(got, vec!["HELLO".to_string()]);
}

#[test]
fn test_double_advertise_fails() {
    let mut node = Node::with_options(options("pubsub_t3")).expect("node starts");
    node.advertise::<StringMsg>("foo", AdvertiseOptions::default())
        .expect("first advertise succeeds");
    let result = node.advertise::<StringMsg>("foo", AdvertiseOptions::default());
    assert!(matches!(result, Err(Error::AlreadyAdvertised(_))));
}

#[test]
fn test_publish_with_wrong_type_fails() {
    let mut node = Node::with_options(options("pubsub_t4")).expect("node starts");
    node.advertise::<StringMsg>("foo", AdvertiseOptions::default())
        .expect("advertises");

    let result = node.publish("foo", &CounterMsg { value: 7 });
    assert!(matches!(result, Err(Error::TypeMismatch { .. })));
}

#[test]
fn test_subscriber_with_different_type_is_skipped() {
    let mut advertiser = Node::with_options(options("pubsub_t5")).expect("node starts");
    let mut subscriber = Node::with_options(options("pubsub_t5")).expect("node starts");

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    subscriber
        .subscribe(
            "foo",
            move |_msg: &CounterMsg, _topic: &str| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            },
            SubscribeOptions::default(),
        )
        .expect("subscribes");

    advertiser
        .advertise::<StringMsg>("foo", AdvertiseOptions::default())
        .expect("advertises");
    advertiser
        .publish("foo", &StringMsg::from("HELLO"))
        .expect("publishes");

    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unadvertise_then_publish_fails() {
    let mut node = Node::with_options(options("pubsub_t6")).expect("node starts");
    node.advertise::<StringMsg>("foo", AdvertiseOptions::default())
        .expect("advertises");
    node.unadvertise("foo").expect("unadvertises");

    let result = node.publish("foo", &StringMsg::from("HELLO"));
    assert!(matches!(result, Err(Error::NotAdvertised(_))));

    // Unadvertising again is an error too.
    assert!(matches!(
        node.unadvertise("foo"),
        Err(Error::NotAdvertised(_))
    ));
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let mut advertiser = Node::with_options(options("pubsub_t7")).expect("node starts");
    let mut subscriber = Node::with_options(options("pubsub_t7")).expect("node starts");

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    subscriber
        .subscribe(
            "foo",
            move |_msg: &StringMsg, _topic: &str| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            },
            SubscribeOptions::default(),
        )
        .expect("subscribes");

    advertiser
        .advertise::<StringMsg>("foo", AdvertiseOptions::default())
        .expect("advertises");
    advertiser
        .publish("foo", &StringMsg::from("one"))
        .expect("publishes");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    subscriber.unsubscribe("foo").expect("unsubscribes");
    advertiser
        .publish("foo", &StringMsg::from("two"))
        .expect("publishes");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rate_cap_drops_overflow() {
    let mut advertiser = Node::with_options(options("pubsub_t8")).expect("node starts");
    let mut subscriber = Node::with_options(options("pubsub_t8")).expect("node starts");

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    subscriber
        .subscribe(
            "fast",
            move |_msg: &StringMsg, _topic: &str| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            },
            SubscribeOptions::new().with_msgs_per_sec(3),
        )
        .expect("subscribes");

    advertiser
        .advertise::<StringMsg>("fast", AdvertiseOptions::default())
        .expect("advertises");
    for i in 0..10 {
        advertiser
            .publish("fast", &StringMsg::new(format!("{}", i)))
            .expect("publishes");
    }

    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn test_partition_isolation() {
    let mut advertiser = Node::with_options(options("pubsub_t9_red")).expect("node starts");
    let mut subscriber = Node::with_options(options("pubsub_t9_blue")).expect("node starts");

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    subscriber
        .subscribe(
            "foo",
            move |_msg: &StringMsg, _topic: &str| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            },
            SubscribeOptions::default(),
        )
        .expect("subscribes");

    advertiser
        .advertise::<StringMsg>("foo", AdvertiseOptions::default())
        .expect("advertises");
    advertiser
        .publish("foo", &StringMsg::from("HELLO"))
        .expect("publishes");

    // Different partition: the callback never fires and the subscriber's
    // topic list never shows the foreign topic.
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(!subscriber.topic_list().contains(&"/foo".to_string()));
    assert!(advertiser.topic_list().contains(&"/foo".to_string()));
}

#[test]
fn test_listers_strip_partition() {
    let mut node = Node::with_options(options("pubsub_t10")).expect("node starts");
    node.advertise::<StringMsg>("alpha", AdvertiseOptions::default())
        .expect("advertises");
    node.subscribe(
        "beta",
        |_msg: &StringMsg, _topic: &str| {},
        SubscribeOptions::default(),
    )
    .expect("subscribes");

    assert_eq!(node.advertised_topics(), vec!["/alpha".to_string()]);
    assert_eq!(node.subscribed_topics(), vec!["/beta".to_string()]);
    assert!(node.topic_list().contains(&"/alpha".to_string()));
}

#[test]
fn test_namespace_composition() {
    let mut opts = options("pubsub_t11");
    assert!(opts.set_namespace("/robot1"));
    let mut node = Node::with_options(opts).expect("node starts");

    node.advertise::<StringMsg>("status", AdvertiseOptions::default())
        .expect("advertises");
    assert_eq!(node.advertised_topics(), vec!["/robot1/status".to_string()]);

    // An absolute topic ignores the namespace.
    node.advertise::<StringMsg>("/global", AdvertiseOptions::default())
        .expect("advertises");
    let topics = node.advertised_topics();
    assert!(topics.contains(&"/global".to_string()));
}

#[test]
fn test_invalid_topic_name_is_rejected() {
    let mut node = Node::with_options(options("pubsub_t12")).expect("node starts");
    assert!(matches!(
        node.advertise::<StringMsg>("bad topic", AdvertiseOptions::default()),
        Err(Error::InvalidName(_))
    ));
    assert!(matches!(
        node.publish("an@t", &StringMsg::from("x")),
        Err(Error::InvalidName(_))
    ));
}
