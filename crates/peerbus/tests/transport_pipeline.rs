// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two-peer wire pipeline: the message and control paths a pair of processes
//! would exercise, driven directly through the transport endpoints.

use std::time::Duration;

use crossbeam::channel::unbounded;
use peerbus::config::{OP_END_CONNECTION, OP_NEW_CONNECTION};
use peerbus::transport::control::{send_control, ControlListener};
use peerbus::transport::pubsock::PubSocket;
use peerbus::transport::subsock::SubSocket;
use peerbus::transport::Event;
use peerbus::NodeUuid;

const TOPIC: &str = "@pipeline@msg@/chatter";

#[test]
fn test_subscription_handshake_and_delivery() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Peer A: the publisher side.
    let (pub_tx, pub_rx) = unbounded();
    let pub_socket = PubSocket::bind("127.0.0.1").expect("publisher binds");
    let pub_control = ControlListener::bind("127.0.0.1", pub_tx).expect("control binds");

    // Peer B: the subscriber side.
    let (sub_tx, sub_rx) = unbounded();
    let sub_socket = SubSocket::new(sub_tx);
    let sub_node = NodeUuid::random();

    // B learns A's endpoints (as it would via discovery): install the
    // filter, connect, announce interest on the control endpoint.
    sub_socket.add_filter(TOPIC.as_bytes());
    sub_socket.connect(pub_socket.addr()).expect("connects");
    send_control(
        pub_control.addr(),
        TOPIC,
        "127.0.0.1:9999",
        sub_node,
        OP_NEW_CONNECTION,
    )
    .expect("interest announced");

    // A observes the remote subscriber joining.
    let event = pub_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("control event arrives");
    match event {
        Event::Control {
            topic,
            addr,
            n_uuid,
            op,
        } => {
            assert_eq!(topic, TOPIC);
            assert_eq!(addr, "127.0.0.1:9999");
            assert_eq!(n_uuid, sub_node);
            assert_eq!(op, OP_NEW_CONNECTION);
        }
        _ => panic!("expected a control event"),
    }

    // Let the filter announcement reach A's connection state.
    std::thread::sleep(Duration::from_millis(100));

    // A publishes twice; B receives both, in order.
    pub_socket
        .publish(TOPIC.as_bytes(), b"HELLO")
        .expect("publish succeeds");
    pub_socket
        .publish(TOPIC.as_bytes(), b"WORLD")
        .expect("publish succeeds");

    for expected in [b"HELLO".as_slice(), b"WORLD".as_slice()] {
        let event = sub_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("message arrives");
        match event {
            Event::Message { topic, payload } => {
                assert_eq!(topic, TOPIC.as_bytes());
                assert_eq!(payload, expected);
            }
            _ => panic!("expected a message event"),
        }
    }

    // B withdraws; A observes the EndConnection.
    send_control(
        pub_control.addr(),
        TOPIC,
        "127.0.0.1:9999",
        sub_node,
        OP_END_CONNECTION,
    )
    .expect("withdrawal announced");

    let event = pub_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("control event arrives");
    match event {
        Event::Control { op, .. } => assert_eq!(op, OP_END_CONNECTION),
        _ => panic!("expected a control event"),
    }
}
