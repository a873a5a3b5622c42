// SPDX-License-Identifier: Apache-2.0 OR MIT
//! End-to-end: X (willingness 3) wants (225.1.2.4, 10.1.1.2); Y (willingness 4)
//! learns it and takes over forwarding at the first arbitration pass.

use std::cell::RefCell;
use std::rc::Rc;

use aimf::engine::{EngineNotification, MulticastDecision, RecordingObserver};
use aimf::mroute::InterfaceSelector;
use aimf::Willingness;

use crate::common::*;

#[test]
fn test_more_willing_neighbor_takes_over() {
    let (mut net, x, y) = pair(3, 4);
    net.start_all().unwrap();
    assert!(net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap());

    // both forward until the first arbitration pass
    net.run_until(secs(9));
    assert!(net.node(x).is_forwarding());
    assert!(net.node(y).is_forwarding());

    let tuple = net
        .node(y)
        .repository()
        .find_association_tuple(X, GROUP, SOURCE)
        .cloned()
        .unwrap();
    assert_eq!(tuple.association.advertiser, X);
    assert_eq!(tuple.association.willingness, Willingness::DEFAULT);

    net.run_until(secs(11));
    assert!(!net.node(x).is_forwarding());
    assert!(net.node(y).is_forwarding());
    assert_eq!(
        net.node(x).last_arbitration().unwrap().best_reachable,
        Some(Willingness::new(4).unwrap())
    );

    // both carry the entry; only Y acts on it
    let table_y = net.node(y).forwarding_table_snapshot();
    assert_eq!(table_y.len(), 1);
    assert_eq!((table_y[0].group, table_y[0].source), (GROUP, SOURCE));
    assert_eq!(table_y[0].input_interface, WLAN);
    assert_eq!(table_y[0].output_interfaces, vec![WLAN]);

    assert!(matches!(
        net.node_mut(x)
            .route_multicast(SOURCE, GROUP, InterfaceSelector::Index(WLAN)),
        MulticastDecision::Suppressed(_)
    ));
    assert!(matches!(
        net.node_mut(y)
            .route_multicast(SOURCE, GROUP, InterfaceSelector::Index(WLAN)),
        MulticastDecision::Forward(_)
    ));
}

#[test]
fn test_decision_is_stable_over_time() {
    let (mut net, x, y) = pair(3, 4);
    net.start_all().unwrap();
    net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap();

    for t in [11, 30, 60, 120] {
        net.run_until(secs(t));
        assert!(!net.node(x).is_forwarding(), "x forwarding at {}s", t);
        assert!(net.node(y).is_forwarding(), "y not forwarding at {}s", t);
        assert_eq!(net.node(y).repository().neighbors().len(), 1);
        assert_eq!(net.node(y).forwarding_table_snapshot().len(), 1);
    }
    assert_eq!(net.node(y).stats().neighbors_created, 1);
    assert_eq!(net.node(y).stats().neighbors_expired, 0);
}

#[test]
fn test_observers_see_the_exchange() {
    let (mut net, x, y) = pair(3, 4);
    let recorder = Rc::new(RefCell::new(RecordingObserver::new()));
    net.node_mut(y).add_observer(Box::new(recorder.clone()));
    net.start_all().unwrap();
    net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap();
    net.run_until(secs(3));

    let recorder = recorder.borrow();
    let received: Vec<_> = recorder
        .notifications
        .iter()
        .filter_map(|n| match n {
            EngineNotification::PacketReceived(snapshot) => Some(snapshot),
            _ => None,
        })
        .collect();
    // HELLOs from X at t=0 and t=2
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|s| s.peer == X && s.interface == WLAN));
    assert!(recorder.count(|n| matches!(n, EngineNotification::PacketSent(_))) >= 2);
    assert!(recorder.count(|n| matches!(
        n,
        EngineNotification::TableSizeChanged { size: 1, .. }
    )) == 1);
}

#[test]
fn test_two_advertisers_yield_two_tuples_one_entry() {
    let mut net = network();
    let x = add_node(&mut net, X, config(3), &[Y]);
    let y = add_node(&mut net, Y, config(4), &[X, Z]);
    let z = add_node(&mut net, Z, config(3), &[Y]);
    link(&mut net, x, y);
    link(&mut net, z, y);
    net.start_all().unwrap();
    net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap();
    net.node_mut(z).add_local_association(GROUP, SOURCE).unwrap();
    net.run_until(secs(3));

    let repo = net.node(y).repository();
    assert_eq!(repo.association_set().len(), 2);
    assert!(repo.find_association_tuple(X, GROUP, SOURCE).is_some());
    assert!(repo.find_association_tuple(Z, GROUP, SOURCE).is_some());
    assert_eq!(net.node(y).forwarding_table_snapshot().len(), 1);
}

#[test]
fn test_hellos_are_not_relayed() {
    // X - Y - Z: Z never hears X
    let mut net = network();
    let x = add_node(&mut net, X, config(3), &[Y]);
    let y = add_node(&mut net, Y, config(3), &[X, Z]);
    let z = add_node(&mut net, Z, config(3), &[Y]);
    link(&mut net, x, y);
    link(&mut net, y, z);
    net.start_all().unwrap();
    net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap();
    net.run_until(secs(20));

    assert_eq!(net.node(y).repository().neighbors().len(), 2);
    assert!(net.node(z).repository().find_neighbor(X).is_none());
    assert!(net.node(z).repository().association_set().is_empty());
    assert!(net.node(z).forwarding_table_snapshot().is_empty());
}
