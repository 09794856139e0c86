// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Same-process service call scenarios through the public Node API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use peerbus::{AdvertiseOptions, Error, Node, NodeOptions, StringMsg};

fn options(partition: &str) -> NodeOptions {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut opts = NodeOptions::new();
    assert!(opts.set_partition(partition));
    opts
}

#[test]
fn test_local_service_request() {
    let mut replier = Node::with_options(options("srv_t1")).expect("node starts");
    let requester = Node::with_options(options("srv_t1")).expect("node starts");

    replier
        .advertise_service(
            "echo",
            |req: &StringMsg| (StringMsg::new(req.data.to_uppercase()), true),
            AdvertiseOptions::default(),
        )
        .expect("advertises service");

    let (rep, success): (StringMsg, bool) = requester
        .request("echo", &StringMsg::from("hello"), 1_000)
        .expect("request succeeds");
    assert!(success);
    assert_eq!(rep.data, "HELLO");
}

#[test]
fn test_request_unknown_service_fails() {
    let requester = Node::with_options(options("srv_t2")).expect("node starts");
    let result: Result<(StringMsg, bool), _> =
        requester.request("nowhere", &StringMsg::from("x"), 100);
    assert!(matches!(result, Err(Error::NoPublisher(_))));
}

#[test]
fn test_service_failure_is_in_band() {
    let mut replier = Node::with_options(options("srv_t3")).expect("node starts");
    let requester = Node::with_options(options("srv_t3")).expect("node starts");

    replier
        .advertise_service(
            "flaky",
            |_req: &StringMsg| (StringMsg::default(), false),
            AdvertiseOptions::default(),
        )
        .expect("advertises service");

    let (_rep, success): (StringMsg, bool) = requester
        .request("flaky", &StringMsg::from("x"), 1_000)
        .expect("the call itself succeeds");
    assert!(!success);
}

#[test]
fn test_double_advertise_service_fails() {
    let mut node = Node::with_options(options("srv_t4")).expect("node starts");
    node.advertise_service(
        "echo",
        |req: &StringMsg| (req.clone(), true),
        AdvertiseOptions::default(),
    )
    .expect("first advertise succeeds");

    let result = node.advertise_service(
        "echo",
        |req: &StringMsg| (req.clone(), true),
        AdvertiseOptions::default(),
    );
    assert!(matches!(result, Err(Error::AlreadyAdvertised(_))));
}

#[test]
fn test_unadvertise_service_removes_replier() {
    let mut replier = Node::with_options(options("srv_t5")).expect("node starts");
    let requester = Node::with_options(options("srv_t5")).expect("node starts");

    replier
        .advertise_service(
            "echo",
            |req: &StringMsg| (req.clone(), true),
            AdvertiseOptions::default(),
        )
        .expect("advertises service");
    assert_eq!(replier.advertised_services(), vec!["/echo".to_string()]);

    replier.unadvertise_service("echo").expect("unadvertises");
    assert!(replier.advertised_services().is_empty());

    let result: Result<(StringMsg, bool), _> =
        requester.request("echo", &StringMsg::from("x"), 100);
    assert!(matches!(result, Err(Error::NoPublisher(_))));

    // Second withdrawal is an error.
    assert!(matches!(
        replier.unadvertise_service("echo"),
        Err(Error::NotAdvertised(_))
    ));
}

#[test]
fn test_request_oneway_runs_replier() {
    let mut replier = Node::with_options(options("srv_t6")).expect("node starts");
    let requester = Node::with_options(options("srv_t6")).expect("node starts");

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    replier
        .advertise_service(
            "log",
            move |_req: &StringMsg| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
                (StringMsg::default(), true)
            },
            AdvertiseOptions::default(),
        )
        .expect("advertises service");

    requester
        .request_oneway("log", &StringMsg::from("fire-and-forget"))
        .expect("oneway request succeeds");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_service_list_shows_local_service() {
    let mut replier = Node::with_options(options("srv_t7")).expect("node starts");
    replier
        .advertise_service(
            "echo",
            |req: &StringMsg| (req.clone(), true),
            AdvertiseOptions::default(),
        )
        .expect("advertises service");

    assert!(replier.service_list().contains(&"/echo".to_string()));

    let info = replier.service_info("echo").expect("valid name");
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].req_type, "peerbus.msgs.StringMsg");
    assert_eq!(info[0].rep_type, "peerbus.msgs.StringMsg");
}

#[test]
fn test_node_drop_cleans_up_service() {
    let partition = options("srv_t8");
    let requester = Node::with_options(partition.clone()).expect("node starts");

    {
        let mut replier = Node::with_options(partition).expect("node starts");
        replier
            .advertise_service(
                "transient",
                |req: &StringMsg| (req.clone(), true),
                AdvertiseOptions::default(),
            )
            .expect("advertises service");
        let (_rep, success): (StringMsg, bool) = requester
            .request("transient", &StringMsg::from("x"), 1_000)
            .expect("request succeeds while replier lives");
        assert!(success);
    }

    // The replier node is gone; its registration went with it.
    let result: Result<(StringMsg, bool), _> =
        requester.request("transient", &StringMsg::from("x"), 100);
    assert!(matches!(result, Err(Error::NoPublisher(_))));
}
