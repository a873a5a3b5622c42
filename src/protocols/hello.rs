// SPDX-License-Identifier: Apache-2.0 OR MIT
//! HELLO construction, reception and tuple expiry
//!
//! Every function here is a state transition on the [`Repository`] that
//! returns the timers the caller must arm. Tuples are LIVE while present;
//! when their expiry timer fires the expiration is re-checked against the
//! clock, because a refresh may have moved it forward after the timer was
//! scheduled.

use std::net::Ipv4Addr;
use std::time::Duration;

use super::repository::{Association, AssociationTuple, NeighborTuple, Repository};
use super::wire::{duration_to_emf, Hello, HelloAssociation, Message};
use super::{TimerRequest, TimerType};
use crate::{Timestamp, Willingness};

/// Build the HELLO message advertising `associations`
pub fn build_hello(
    originator: Ipv4Addr,
    willingness: Willingness,
    associations: &[Association],
    hello_interval: Duration,
    hold_time: Duration,
    ttl: u8,
    sequence_number: u16,
) -> Message {
    let hello = Hello {
        htime: duration_to_emf(hello_interval),
        willingness: willingness.value(),
        associations: associations
            .iter()
            .map(|a| HelloAssociation {
                group: a.group,
                source: a.source,
            })
            .collect(),
    };
    Message::hello(
        originator,
        duration_to_emf(hold_time),
        ttl,
        sequence_number,
        hello,
    )
}

/// What processing one HELLO changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HelloOutcome {
    pub neighbor_created: bool,
    pub associations_created: Vec<Association>,
    pub associations_refreshed: usize,
    /// Expiry timers for newly created tuples
    pub timers: Vec<TimerRequest>,
}

/// Apply a HELLO from `originator` valid for `validity`
///
/// Creates or refreshes one association tuple per advertised (group, source)
/// and the originator's neighbor tuple. Refreshes update in place and never
/// move an expiration backwards. Only newly created tuples get a timer.
pub fn process_hello(
    repo: &mut Repository,
    originator: Ipv4Addr,
    hello: &Hello,
    validity: Duration,
    now: Timestamp,
) -> HelloOutcome {
    let mut outcome = HelloOutcome::default();
    let expires_at = now + validity;
    let willingness = Willingness::from_wire(hello.willingness);

    for advertised in &hello.associations {
        let (group, source) = (advertised.group, advertised.source);
        match repo.find_association_tuple_mut(originator, group, source) {
            Some(tuple) => {
                tuple.expires_at = tuple.expires_at.max(expires_at);
                tuple.association.willingness = willingness;
                outcome.associations_refreshed += 1;
            }
            None => {
                let association = Association {
                    group,
                    source,
                    advertiser: originator,
                    willingness,
                };
                repo.insert_association_tuple(AssociationTuple {
                    association,
                    expires_at,
                });
                outcome.timers.push(TimerRequest::new(
                    TimerType::AssociationExpiry {
                        advertiser: originator,
                        group,
                        source,
                    },
                    expires_at,
                ));
                outcome.associations_created.push(association);
            }
        }
    }

    match repo.find_neighbor_mut(originator) {
        Some(neighbor) => {
            neighbor.expires_at = neighbor.expires_at.max(expires_at);
            neighbor.willingness = willingness;
        }
        None => {
            repo.insert_neighbor(NeighborTuple {
                address: originator,
                willingness,
                expires_at,
            });
            outcome.timers.push(TimerRequest::new(
                TimerType::NeighborExpiry {
                    neighbor: originator,
                },
                expires_at,
            ));
            outcome.neighbor_created = true;
        }
    }

    outcome
}

/// Result of an expiry timer firing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryOutcome<T> {
    /// Expiration had passed; the tuple was removed
    Erased(T),
    /// A refresh moved the expiration; check again then
    Rescheduled(TimerRequest),
    /// Tuple already gone (cleared by Stop or erased earlier)
    NotFound,
}

pub fn neighbor_expired(
    repo: &mut Repository,
    address: Ipv4Addr,
    now: Timestamp,
) -> ExpiryOutcome<NeighborTuple> {
    let Some(tuple) = repo.find_neighbor(address) else {
        return ExpiryOutcome::NotFound;
    };
    if tuple.is_expired(now) {
        match repo.erase_neighbor(address) {
            Some(erased) => ExpiryOutcome::Erased(erased),
            None => ExpiryOutcome::NotFound,
        }
    } else {
        ExpiryOutcome::Rescheduled(TimerRequest::new(
            TimerType::NeighborExpiry { neighbor: address },
            tuple.expires_at,
        ))
    }
}

pub fn association_expired(
    repo: &mut Repository,
    advertiser: Ipv4Addr,
    group: Ipv4Addr,
    source: Ipv4Addr,
    now: Timestamp,
) -> ExpiryOutcome<AssociationTuple> {
    let Some(tuple) = repo.find_association_tuple(advertiser, group, source) else {
        return ExpiryOutcome::NotFound;
    };
    if tuple.is_expired(now) {
        match repo.erase_association_tuple(advertiser, group, source) {
            Some(erased) => ExpiryOutcome::Erased(erased),
            None => ExpiryOutcome::NotFound,
        }
    } else {
        ExpiryOutcome::Rescheduled(TimerRequest::new(
            TimerType::AssociationExpiry {
                advertiser,
                group,
                source,
            },
            tuple.expires_at,
        ))
    }
}
