// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Soft-state lifecycle: refresh, expiry, partitions and start/stop.

use aimf::protocols::wire::{Hello, HelloAssociation, Message, Packet};

use crate::common::*;

#[test]
fn test_refresh_updates_instead_of_duplicating() {
    let (mut net, x, y) = pair(3, 4);
    net.start_all().unwrap();
    net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap();
    net.run_until(secs(30));

    let repo = net.node(y).repository();
    assert_eq!(repo.neighbors().len(), 1);
    assert_eq!(repo.association_set().len(), 1);
    // the HELLO sent at 30s is still in flight; the one from 28s holds for 6s
    assert_eq!(repo.find_neighbor(X).unwrap().expires_at, secs(34) + millis(1));

    let stats = net.node(y).stats();
    assert_eq!(stats.neighbors_created, 1);
    assert_eq!(stats.associations_created, 1);
    assert_eq!(stats.messages_received, 15);
}

#[test]
fn test_partition_expires_state_after_hold_time() {
    let (mut net, x, y) = pair(3, 4);
    net.start_all().unwrap();
    net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap();
    net.run_until(secs(11));
    assert!(!net.node(x).is_forwarding());

    unlink(&mut net, x, y);

    // last HELLO from X reached Y at 10.001s
    net.run_until(secs(16));
    assert!(net.node(y).repository().find_neighbor(X).is_some());
    net.run_until(secs(17));
    assert!(net.node(y).repository().find_neighbor(X).is_none());
    assert!(net.node(y).repository().association_set().is_empty());
    assert!(net.node(y).forwarding_table_snapshot().is_empty());
    assert_eq!(net.node(y).stats().neighbors_expired, 1);
    assert_eq!(net.node(y).stats().associations_expired, 1);

    // X is alone now and takes the role back at its next pass (19s)
    net.run_until(secs(30));
    assert!(net.node(x).is_forwarding());
}

#[test]
fn test_partition_heals() {
    let (mut net, x, y) = pair(3, 4);
    net.start_all().unwrap();
    net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap();
    net.run_until(secs(11));
    unlink(&mut net, x, y);
    net.run_until(secs(30));
    assert!(net.node(y).repository().neighbors().is_empty());

    link(&mut net, x, y);
    net.run_until(secs(33));
    assert!(net.node(y).repository().find_neighbor(X).is_some());
    assert!(net
        .node(y)
        .repository()
        .find_association_tuple(X, GROUP, SOURCE)
        .is_some());
    assert_eq!(net.node(y).stats().neighbors_created, 2);
}

#[test]
fn test_stop_mid_run_then_restart() {
    let (mut net, x, y) = pair(3, 4);
    net.start_all().unwrap();
    net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap();
    net.run_until(secs(11));

    net.node_mut(y).stop();
    assert!(!net.node(y).is_running());
    assert!(!net.node(y).is_forwarding());
    assert!(net.node(y).repository().is_empty());
    assert!(net.node(y).forwarding_table_snapshot().is_empty());

    // Y's queued expiry and periodic timers all fire into an empty engine
    net.run_until(secs(40));
    assert!(net.node(y).repository().is_empty());
    assert!(net.node(x).repository().find_neighbor(Y).is_none());
    assert!(net.node(x).is_forwarding());

    net.node_mut(y).start().unwrap();
    net.run_until(secs(45));
    assert!(net.node(y).repository().find_neighbor(X).is_some());
    assert!(net.node(x).repository().find_neighbor(Y).is_some());
    assert_eq!(net.node(y).forwarding_table_snapshot().len(), 1);
    // forward from start until the first pass 10s after restart
    assert!(net.node(y).is_forwarding());
}

#[test]
fn test_local_association_add_remove_is_idempotent() {
    let (mut net, x, y) = pair(3, 4);
    net.start_all().unwrap();
    let other = std::net::Ipv4Addr::new(225, 9, 9, 9);
    net.node_mut(x).add_local_association(other, SOURCE).unwrap();
    net.run_until(secs(5));
    let before = net.node(y).forwarding_table_snapshot();
    assert_eq!(before.len(), 1);

    net.node_mut(y).add_local_association(GROUP, SOURCE).unwrap();
    assert_eq!(net.node(y).forwarding_table_snapshot().len(), 2);
    assert!(net.node_mut(y).remove_local_association(GROUP, SOURCE));
    assert_eq!(net.node(y).forwarding_table_snapshot(), before);

    // X's withdrawal ages out of Y after the hold time
    assert!(net.node_mut(x).remove_local_association(other, SOURCE));
    net.run_until(secs(15));
    assert!(net.node(y).forwarding_table_snapshot().is_empty());
}

#[test]
fn test_malformed_traffic_does_not_disturb_the_engine() {
    let (mut net, x, y) = pair(3, 4);
    net.start_all().unwrap();
    net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap();
    net.run_until(secs(3));

    // declared length larger than the datagram
    let mut truncated = Packet::new(
        0,
        vec![Message::hello(
            Z,
            0x86,
            255,
            0,
            Hello {
                htime: 0x05,
                willingness: 7,
                associations: vec![HelloAssociation {
                    group: GROUP,
                    source: SOURCE,
                }],
            },
        )],
    )
    .encode()
    .unwrap();
    truncated.truncate(truncated.len() - 4);
    net.node_mut(y).receive(WLAN, &truncated, Z);
    net.node_mut(y).receive(WLAN, &[], Z);
    // a bare header is a valid empty packet
    net.node_mut(y).receive(WLAN, &[0, 4, 0, 0], Z);

    assert_eq!(net.node(y).stats().malformed_packets, 2);
    assert!(net.node(y).repository().find_neighbor(Z).is_none());
    assert_eq!(net.node(y).repository().neighbors().len(), 1);

    net.run_until(secs(11));
    assert!(net.node(y).is_forwarding());
    assert!(!net.node(x).is_forwarding());
}
