// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Forwarder election and group liveness
//!
//! ## Arbitration
//!
//! Among redundant forwarders on a segment, the reachable node with the
//! highest willingness forwards:
//!
//! | Own willingness | Result |
//! |-----------------|--------|
//! | ALWAYS (7) | forward |
//! | NEVER (0) | never forward |
//! | otherwise | forward iff best reachable neighbor willingness <= own |
//!
//! A neighbor counts only if the unicast table has a route to it. Equal
//! willingness forwards by default ([`TieBreak::Forward`]); with
//! [`TieBreak::LowestAddress`] only the lowest address among equals forwards.
//!
//! ## Group liveness
//!
//! A per-group deadline tracks whether traffic for the group is still being
//! seen. Sightings before the deadline pull it in to
//! `now + base + (7 - w)`; a deadline that passed without a sighting is
//! extended by `base + w`. The state is advisory only.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::repository::{NeighborTuple, Repository, TimerState};
use super::{TimerRequest, TimerType};
use crate::{Timestamp, Willingness};

/// How to settle equal willingness between reachable peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Every node at the maximum willingness forwards
    #[default]
    Forward,
    /// Only the lowest address at the maximum willingness forwards
    LowestAddress,
}

/// Why an arbitration pass decided as it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationReason {
    Always,
    Never,
    NoReachableNeighbor,
    /// No reachable neighbor is more willing
    Highest,
    /// A reachable neighbor is more willing
    Outranked { by: Ipv4Addr },
    /// Equal willingness, lost on address
    LostTie { to: Ipv4Addr },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArbitrationOutcome {
    pub forward: bool,
    /// Highest willingness among reachable neighbors
    pub best_reachable: Option<Willingness>,
    pub reason: ArbitrationReason,
}

/// Decide whether this node should forward
///
/// `reachable` answers whether the unicast table has a route to a neighbor.
pub fn arbitrate(
    own: Willingness,
    own_address: Ipv4Addr,
    neighbors: &[NeighborTuple],
    mut reachable: impl FnMut(Ipv4Addr) -> bool,
    tie_break: TieBreak,
) -> ArbitrationOutcome {
    if own == Willingness::ALWAYS {
        return ArbitrationOutcome {
            forward: true,
            best_reachable: None,
            reason: ArbitrationReason::Always,
        };
    }
    if own == Willingness::NEVER {
        return ArbitrationOutcome {
            forward: false,
            best_reachable: None,
            reason: ArbitrationReason::Never,
        };
    }

    let candidates: Vec<&NeighborTuple> = neighbors
        .iter()
        .filter(|n| reachable(n.address))
        .collect();

    let Some(best) = candidates.iter().map(|n| n.willingness).max() else {
        return ArbitrationOutcome {
            forward: true,
            best_reachable: None,
            reason: ArbitrationReason::NoReachableNeighbor,
        };
    };

    if best > own {
        let by = candidates
            .iter()
            .filter(|n| n.willingness == best)
            .map(|n| n.address)
            .min()
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        return ArbitrationOutcome {
            forward: false,
            best_reachable: Some(best),
            reason: ArbitrationReason::Outranked { by },
        };
    }

    if best == own && tie_break == TieBreak::LowestAddress {
        let lower = candidates
            .iter()
            .filter(|n| n.willingness == own && n.address < own_address)
            .map(|n| n.address)
            .min();
        if let Some(to) = lower {
            return ArbitrationOutcome {
                forward: false,
                best_reachable: Some(best),
                reason: ArbitrationReason::LostTie { to },
            };
        }
    }

    ArbitrationOutcome {
        forward: true,
        best_reachable: Some(best),
        reason: ArbitrationReason::Highest,
    }
}

/// Delay until the next arbitration pass
///
/// Less willing nodes re-check less eagerly: one extra second per step
/// below ALWAYS.
pub fn arbitration_delay(interval: Duration, own: Willingness) -> Duration {
    interval + Duration::from_secs(u64::from(own.deficit()))
}

/// How a sighting changed a group's liveness state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    /// First sighting of the group
    Created,
    /// Seen before its deadline
    Seen,
    /// Deadline had passed without a sighting
    Quiet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityUpdate {
    pub activity: Activity,
    pub deadline: Timestamp,
    /// Set when no check is pending for the group and one must be armed
    pub timer: Option<TimerRequest>,
}

/// Record a possible multicast delivery for `group`
pub fn note_possible_activity(
    repo: &mut Repository,
    group: Ipv4Addr,
    base_window: Duration,
    own: Willingness,
    now: Timestamp,
) -> ActivityUpdate {
    let deficit = u64::from(own.deficit());
    let timer = |deadline| Some(TimerRequest::new(TimerType::GroupActivity { group }, deadline));

    match repo.group_timer(group) {
        None => {
            let deadline = now + base_window + Duration::from_secs(deficit * 2);
            repo.set_group_timer(group, TimerState::Armed(deadline));
            ActivityUpdate {
                activity: Activity::Created,
                deadline,
                timer: timer(deadline),
            }
        }
        Some(TimerState::Armed(deadline)) if deadline > now => {
            let deadline = now + base_window + Duration::from_secs(deficit);
            repo.set_group_timer(group, TimerState::Armed(deadline));
            // the pending check re-arms itself at the new deadline
            ActivityUpdate {
                activity: Activity::Seen,
                deadline,
                timer: None,
            }
        }
        Some(state) => {
            let extension = base_window + Duration::from_secs(u64::from(own.value()));
            let mut deadline = state.deadline() + extension;
            if deadline <= now {
                deadline = now + extension;
            }
            repo.set_group_timer(group, TimerState::Armed(deadline));
            // an Armed state past its deadline still has its check queued
            let needs_timer = matches!(state, TimerState::Fired(_));
            ActivityUpdate {
                activity: Activity::Quiet,
                deadline,
                timer: if needs_timer { timer(deadline) } else { None },
            }
        }
    }
}

/// Handle the liveness check for `group` firing
///
/// Returns the timer to re-arm if the deadline moved forward since the
/// check was scheduled.
pub fn group_activity_fired(
    repo: &mut Repository,
    group: Ipv4Addr,
    now: Timestamp,
) -> Option<TimerRequest> {
    match repo.group_timer(group) {
        Some(TimerState::Armed(deadline)) if deadline > now => Some(TimerRequest::new(
            TimerType::GroupActivity { group },
            deadline,
        )),
        Some(TimerState::Armed(deadline)) => {
            repo.set_group_timer(group, TimerState::Fired(deadline));
            None
        }
        Some(TimerState::Fired(_)) | None => None,
    }
}

/// Whether `group` has been seen within its current window
pub fn is_group_active(repo: &Repository, group: Ipv4Addr, now: Timestamp) -> bool {
    matches!(repo.group_timer(group), Some(TimerState::Armed(deadline)) if deadline > now)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWN: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
    const GROUP: Ipv4Addr = Ipv4Addr::new(225, 1, 2, 4);

    fn w(v: u8) -> Willingness {
        Willingness::new(v).unwrap()
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn neighbor(last: u8, willingness: u8) -> NeighborTuple {
        NeighborTuple {
            address: Ipv4Addr::new(10, 0, 0, last),
            willingness: w(willingness),
            expires_at: secs(100),
        }
    }

    #[test]
    fn test_always_and_never() {
        let neighbors = vec![neighbor(1, 7)];
        let always = arbitrate(Willingness::ALWAYS, OWN, &neighbors, |_| true, TieBreak::Forward);
        assert!(always.forward);
        assert_eq!(always.reason, ArbitrationReason::Always);

        let never = arbitrate(Willingness::NEVER, OWN, &[], |_| true, TieBreak::Forward);
        assert!(!never.forward);
        assert_eq!(never.reason, ArbitrationReason::Never);
    }

    #[test]
    fn test_no_reachable_neighbor_forwards() {
        let neighbors = vec![neighbor(1, 6)];
        let outcome = arbitrate(w(3), OWN, &neighbors, |_| false, TieBreak::Forward);
        assert!(outcome.forward);
        assert_eq!(outcome.reason, ArbitrationReason::NoReachableNeighbor);
    }

    #[test]
    fn test_outranked_by_reachable_neighbor() {
        let neighbors = vec![neighbor(1, 2), neighbor(2, 4), neighbor(3, 6)];
        // 10.0.0.3 (w=6) has no route
        let reachable = |a: Ipv4Addr| a != Ipv4Addr::new(10, 0, 0, 3);

        let outcome = arbitrate(w(3), OWN, &neighbors, reachable, TieBreak::Forward);
        assert!(!outcome.forward);
        assert_eq!(outcome.best_reachable, Some(w(4)));
        assert_eq!(
            outcome.reason,
            ArbitrationReason::Outranked {
                by: Ipv4Addr::new(10, 0, 0, 2)
            }
        );

        assert!(arbitrate(w(4), OWN, &neighbors, reachable, TieBreak::Forward).forward);
    }

    #[test]
    fn test_tie_break_modes() {
        let neighbors = vec![neighbor(1, 3), neighbor(9, 3)];
        // default: ties forward
        assert!(arbitrate(w(3), OWN, &neighbors, |_| true, TieBreak::Forward).forward);

        let lost = arbitrate(w(3), OWN, &neighbors, |_| true, TieBreak::LowestAddress);
        assert!(!lost.forward);
        assert_eq!(
            lost.reason,
            ArbitrationReason::LostTie {
                to: Ipv4Addr::new(10, 0, 0, 1)
            }
        );

        let lowest = arbitrate(
            w(3),
            Ipv4Addr::new(10, 0, 0, 0),
            &neighbors,
            |_| true,
            TieBreak::LowestAddress,
        );
        assert!(lowest.forward);
    }

    #[test]
    fn test_arbitration_delay() {
        assert_eq!(arbitration_delay(secs(5), Willingness::ALWAYS), secs(5));
        assert_eq!(arbitration_delay(secs(5), w(3)), secs(9));
        assert_eq!(arbitration_delay(secs(5), Willingness::NEVER), secs(12));
    }

    #[test]
    fn test_tie_break_serde() {
        let t: TieBreak = serde_json::from_str("\"lowest-address\"").unwrap();
        assert_eq!(t, TieBreak::LowestAddress);
        assert_eq!(TieBreak::default(), TieBreak::Forward);
    }

    #[test]
    fn test_activity_first_sighting() {
        let mut repo = Repository::new();
        let update = note_possible_activity(&mut repo, GROUP, secs(8), w(3), secs(1));

        assert_eq!(update.activity, Activity::Created);
        // 1 + 8 + (7 - 3) * 2
        assert_eq!(update.deadline, secs(17));
        assert_eq!(update.timer.unwrap().fire_at, secs(17));
        assert!(is_group_active(&repo, GROUP, secs(2)));
    }

    #[test]
    fn test_activity_seen_shrinks_window() {
        let mut repo = Repository::new();
        note_possible_activity(&mut repo, GROUP, secs(8), w(3), secs(1));
        let update = note_possible_activity(&mut repo, GROUP, secs(8), w(3), secs(2));

        assert_eq!(update.activity, Activity::Seen);
        assert_eq!(update.deadline, secs(14));
        assert!(update.timer.is_none());

        // the check queued for 17 finds the deadline already passed
        assert_eq!(group_activity_fired(&mut repo, GROUP, secs(17)), None);
        assert!(matches!(repo.group_timer(GROUP), Some(TimerState::Fired(d)) if d == secs(14)));
    }

    #[test]
    fn test_activity_check_rearms_when_deadline_moved() {
        let mut repo = Repository::new();
        note_possible_activity(&mut repo, GROUP, secs(8), w(3), secs(1));
        // seen at 12: deadline moves to 24, past the queued check at 17
        note_possible_activity(&mut repo, GROUP, secs(8), w(3), secs(12));
        let rearm = group_activity_fired(&mut repo, GROUP, secs(17)).unwrap();
        assert_eq!(rearm.fire_at, secs(24));
    }

    #[test]
    fn test_activity_quiet_extends_window() {
        let mut repo = Repository::new();
        note_possible_activity(&mut repo, GROUP, secs(8), w(3), secs(1));
        assert!(group_activity_fired(&mut repo, GROUP, secs(17)).is_none());
        assert!(!is_group_active(&repo, GROUP, secs(18)));

        // quiet: 17 + 8 + 3 = 28
        let update = note_possible_activity(&mut repo, GROUP, secs(8), w(3), secs(20));
        assert_eq!(update.activity, Activity::Quiet);
        assert_eq!(update.deadline, secs(28));
        assert_eq!(update.timer.unwrap().fire_at, secs(28));

        // long silence: extension counted from now
        group_activity_fired(&mut repo, GROUP, secs(28));
        let late = note_possible_activity(&mut repo, GROUP, secs(8), w(3), secs(100));
        assert_eq!(late.deadline, secs(111));
    }

    #[test]
    fn test_activity_fired_for_unknown_group() {
        let mut repo = Repository::new();
        assert!(group_activity_fired(&mut repo, GROUP, secs(1)).is_none());
        assert!(repo.group_timer(GROUP).is_none());
    }
}
