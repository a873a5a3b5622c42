// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Forwarder election across simulated neighbors.

use aimf::engine::MulticastDecision;
use aimf::mroute::InterfaceSelector;
use aimf::protocols::arbitration::{ArbitrationReason, TieBreak};

use crate::common::*;

#[test]
fn test_always_forwards_even_when_outranked_would_apply() {
    let (mut net, x, y) = pair(7, 7);
    net.start_all().unwrap();
    net.run_until(secs(11));

    assert!(net.node(x).is_forwarding());
    assert!(net.node(y).is_forwarding());
    assert_eq!(
        net.node(x).last_arbitration().unwrap().reason,
        ArbitrationReason::Always
    );
}

#[test]
fn test_never_stops_forwarding_at_first_pass() {
    let mut net = network();
    let x = add_node(&mut net, X, config(0), &[]);
    net.start_all().unwrap();

    net.run_until(secs(9));
    assert!(net.node(x).is_forwarding());

    net.run_until(secs(10));
    assert!(!net.node(x).is_forwarding());
    assert_eq!(
        net.node(x).last_arbitration().unwrap().reason,
        ArbitrationReason::Never
    );
}

#[test]
fn test_alone_means_forward() {
    let mut net = network();
    let x = add_node(&mut net, X, config(1), &[]);
    net.start_all().unwrap();
    net.run_until(secs(30));

    assert!(net.node(x).is_forwarding());
    assert_eq!(
        net.node(x).last_arbitration().unwrap().reason,
        ArbitrationReason::NoReachableNeighbor
    );
}

#[test]
fn test_unreachable_neighbor_is_ignored() {
    let mut net = network();
    // X hears Y but has no unicast route to it
    let x = add_node(&mut net, X, config(3), &[]);
    let y = add_node(&mut net, Y, config(4), &[X]);
    link(&mut net, x, y);
    net.start_all().unwrap();
    net.run_until(secs(11));

    assert!(net.node(x).repository().find_neighbor(Y).is_some());
    assert!(net.node(x).is_forwarding());
    assert!(net.node(y).is_forwarding());
}

#[test]
fn test_equal_willingness_default_tie_break_both_forward() {
    let (mut net, x, y) = pair(5, 5);
    net.start_all().unwrap();
    net.run_until(secs(11));

    assert!(net.node(x).is_forwarding());
    assert!(net.node(y).is_forwarding());
}

#[test]
fn test_lowest_address_tie_break() {
    let mut net = network();
    let x = add_node(
        &mut net,
        X,
        config_with_tie_break(5, TieBreak::LowestAddress),
        &[Y],
    );
    let y = add_node(
        &mut net,
        Y,
        config_with_tie_break(5, TieBreak::LowestAddress),
        &[X],
    );
    link(&mut net, x, y);
    net.start_all().unwrap();
    net.run_until(secs(11));

    assert!(net.node(x).is_forwarding());
    assert!(!net.node(y).is_forwarding());
    assert_eq!(
        net.node(y).last_arbitration().unwrap().reason,
        ArbitrationReason::LostTie { to: X }
    );
}

#[test]
fn test_willingness_change_moves_forwarding_role() {
    let (mut net, x, y) = pair(3, 4);
    net.start_all().unwrap();
    net.run_until(secs(11));
    assert!(!net.node(x).is_forwarding());

    net.node_mut(x).set_willingness(6).unwrap();
    // the immediate HELLO updates Y's view of X
    net.run_for(millis(5));
    assert_eq!(
        net.node(y).repository().find_neighbor(X).unwrap().willingness.value(),
        6
    );

    // Y re-arbitrates at 18s, X at 19s
    net.run_until(secs(20));
    assert!(net.node(x).is_forwarding());
    assert!(!net.node(y).is_forwarding());
}

#[test]
fn test_arbitration_cadence_depends_on_willingness() {
    let mut net = network();
    let low = add_node(&mut net, X, config(3), &[]);
    let high = add_node(&mut net, Y, config(7), &[]);
    net.start_all().unwrap();
    net.run_until(secs(30));

    // 10, 19, 28
    assert_eq!(net.node(low).stats().arbitration_runs, 3);
    // 10, 15, 20, 25, 30
    assert_eq!(net.node(high).stats().arbitration_runs, 5);
}

#[test]
fn test_suspension_overrides_arbitration() {
    let (mut net, x, y) = pair(3, 4);
    net.start_all().unwrap();
    net.node_mut(x).add_local_association(GROUP, SOURCE).unwrap();
    net.run_until(secs(11));
    assert!(net.node(y).is_forwarding());

    net.node_mut(y).set_forwarding_suspended(true);
    assert!(!net.node(y).is_forwarding());
    assert!(matches!(
        net.node_mut(y).route_multicast(SOURCE, GROUP, InterfaceSelector::Any),
        MulticastDecision::Suppressed(_)
    ));

    // arbitration keeps running underneath
    net.run_until(secs(30));
    assert!(!net.node(y).is_forwarding());

    net.node_mut(y).set_forwarding_suspended(false);
    assert!(net.node(y).is_forwarding());
    assert!(matches!(
        net.node_mut(y).route_multicast(SOURCE, GROUP, InterfaceSelector::Any),
        MulticastDecision::Forward(_)
    ));
}
