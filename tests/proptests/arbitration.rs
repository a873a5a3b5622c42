// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Property-Based Tests: Forwarder Election and Forwarding Table
//!
//! # Coverage
//!
//! - ALWAYS forwards and NEVER does not, whatever the neighborhood.
//! - A forwarding decision never ignores a more willing reachable neighbor.
//! - Adding then removing a local association leaves the table unchanged.

use std::net::Ipv4Addr;
use std::time::Duration;

use aimf::mroute::ForwardingTable;
use aimf::protocols::arbitration::{arbitrate, TieBreak};
use aimf::protocols::repository::{Association, NeighborTuple, Repository};
use aimf::Willingness;
use proptest::prelude::*;

const ME: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

fn arb_neighbors() -> impl Strategy<Value = Vec<(NeighborTuple, bool)>> {
    prop::collection::vec((2u8..=254, 0u8..=7, any::<bool>()), 0..12).prop_map(|raw| {
        raw.into_iter()
            .map(|(host, willingness, reachable)| {
                (
                    NeighborTuple {
                        address: Ipv4Addr::new(10, 0, 0, host),
                        willingness: Willingness::from_wire(willingness),
                        expires_at: Duration::from_secs(6),
                    },
                    reachable,
                )
            })
            .collect()
    })
}

fn arb_tie_break() -> impl Strategy<Value = TieBreak> {
    prop_oneof![Just(TieBreak::Forward), Just(TieBreak::LowestAddress)]
}

fn split(neighbors: Vec<(NeighborTuple, bool)>) -> (Vec<NeighborTuple>, Vec<Ipv4Addr>) {
    let reachable = neighbors
        .iter()
        .filter(|(_, r)| *r)
        .map(|(n, _)| n.address)
        .collect();
    (neighbors.into_iter().map(|(n, _)| n).collect(), reachable)
}

fn local(group: u8, source: u8, willingness: Willingness) -> Association {
    Association {
        group: Ipv4Addr::new(225, 0, 0, group),
        source: Ipv4Addr::new(10, 1, 1, source),
        advertiser: ME,
        willingness,
    }
}

proptest! {
    #[test]
    fn test_extremes_ignore_neighbors(neighbors in arb_neighbors(), tie in arb_tie_break()) {
        let (neighbors, reachable) = split(neighbors);
        let always = arbitrate(Willingness::ALWAYS, ME, &neighbors, |a| reachable.contains(&a), tie);
        let never = arbitrate(Willingness::NEVER, ME, &neighbors, |a| reachable.contains(&a), tie);
        prop_assert!(always.forward);
        prop_assert!(!never.forward);
    }

    #[test]
    fn test_forward_iff_nobody_reachable_is_more_willing(
        own in 1u8..=6,
        neighbors in arb_neighbors(),
    ) {
        let own = Willingness::new(own).unwrap();
        let (neighbors, reachable) = split(neighbors);
        let outcome = arbitrate(own, ME, &neighbors, |a| reachable.contains(&a), TieBreak::Forward);

        let outranked = neighbors
            .iter()
            .any(|n| reachable.contains(&n.address) && n.willingness > own);
        prop_assert_eq!(outcome.forward, !outranked);
    }

    #[test]
    fn test_lowest_address_never_adds_forwarders(
        own in 1u8..=6,
        neighbors in arb_neighbors(),
    ) {
        let own = Willingness::new(own).unwrap();
        let (neighbors, reachable) = split(neighbors);
        let strict = arbitrate(own, ME, &neighbors, |a| reachable.contains(&a), TieBreak::LowestAddress);
        let loose = arbitrate(own, ME, &neighbors, |a| reachable.contains(&a), TieBreak::Forward);
        prop_assert!(!strict.forward || loose.forward);
    }

    #[test]
    fn test_add_remove_restores_table(
        existing in prop::collection::btree_set((1u8..50, 1u8..50), 0..8),
        extra in (50u8..100, 1u8..50),
    ) {
        let mut repo = Repository::new();
        for (group, source) in &existing {
            repo.insert_association(local(*group, *source, Willingness::DEFAULT));
        }
        let mut table = ForwardingTable::new();
        table.rebuild(repo.associations(), repo.association_set(), Some(1), &[1, 2]);
        let before = table.clone();

        prop_assert!(repo.insert_association(local(extra.0, extra.1, Willingness::DEFAULT)));
        table.rebuild(repo.associations(), repo.association_set(), Some(1), &[1, 2]);
        prop_assert_eq!(table.len(), before.len() + 1);

        prop_assert!(repo.erase_association(Ipv4Addr::new(225, 0, 0, extra.0), Ipv4Addr::new(10, 1, 1, extra.1)).is_some());
        table.rebuild(repo.associations(), repo.association_set(), Some(1), &[1, 2]);
        prop_assert_eq!(table, before);
    }
}
