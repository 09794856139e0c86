// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! peerbusctl: list and inspect the topics and services visible in the
//! current partition.
//!
//! ```text
//! peerbusctl topic list
//! peerbusctl topic info <topic>
//! peerbusctl service list
//! peerbusctl service info <service>
//! peerbusctl --version
//! ```

use std::process;
use std::thread;
use std::time::Duration;

use peerbus::Node;

/// Discovery needs roughly one heartbeat cycle to learn the network.
const DISCOVERY_SETTLE_MS: u64 = 1_200;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["--version" | "-v"] => {
            println!("peerbusctl {}", peerbus::VERSION);
        }
        ["topic", "list"] => {
            let node = start_node();
            for topic in node.topic_list() {
                println!("{}", topic);
            }
        }
        ["topic", "info", topic] => {
            let node = start_node();
            let publishers = node.topic_info(topic).unwrap_or_else(|e| usage_error(&e));
            if publishers.is_empty() {
                println!("No publishers on topic [{}]", topic);
                return;
            }
            println!("Publishers [Address, Message Type]:");
            for publisher in publishers {
                println!("  {}, {}", publisher.addr, publisher.msg_type);
            }
        }
        ["service", "list"] => {
            let node = start_node();
            for service in node.service_list() {
                println!("{}", service);
            }
        }
        ["service", "info", service] => {
            let node = start_node();
            let publishers = node.service_info(service).unwrap_or_else(|e| usage_error(&e));
            if publishers.is_empty() {
                println!("No providers of service [{}]", service);
                return;
            }
            println!("Providers [Address, Request Type, Reply Type]:");
            for publisher in publishers {
                println!(
                    "  {}, {}, {}",
                    publisher.addr, publisher.req_type, publisher.rep_type
                );
            }
        }
        _ => {
            eprintln!("usage: peerbusctl <topic|service> <list|info NAME> | --version");
            process::exit(1);
        }
    }
}

fn start_node() -> Node {
    let node = match Node::new() {
        Ok(node) => node,
        Err(e) => {
            eprintln!("peerbusctl: failed to start node: {}", e);
            process::exit(1);
        }
    };
    // Give the SUBSCRIBE broadcasts and peer beacons one cycle to answer.
    thread::sleep(Duration::from_millis(DISCOVERY_SETTLE_MS));
    node
}

fn usage_error(e: &peerbus::Error) -> ! {
    eprintln!("peerbusctl: {}", e);
    process::exit(1);
}
