use crate::actor::WeakActorClient;
use crate::node::timers;
use crate::node::timers::MonitorHandle;
use crate::node::NodeId;
use std::fmt;
use tokio::time::Duration;

#[derive(Copy, Clone)]
pub(crate) struct ElectionTimeouts {
    pub(crate) election_timeout: Duration,
    pub(crate) announcement_timeout: Duration,
    pub(crate) ping_timeout: Duration,
}

/// Round stamps every timer and monitor event so the actor can discard
/// events from superseded state. Any transition that invalidates an
/// outstanding timer bumps the round.
#[derive(Copy, Clone, Eq, PartialEq)]
pub(crate) struct Round(u64);

impl Round {
    fn incr(&mut self) -> Round {
        self.0 += 1;
        *self
    }
}

impl fmt::Debug for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who we currently believe the coordinator is.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CoordinatorView {
    Me,
    Other(NodeId),
    Unknown,
}

/// ElectionState owns the protocol flags, and the monitor handle while
/// following. One-shot timers are fire-and-forget; their events carry the
/// round they were armed for and stale ones are discarded. Only ever
/// touched from the actor event loop.
pub(crate) struct ElectionState {
    state: State,
    round: Round,
    timeouts: ElectionTimeouts,
    actor_client: WeakActorClient,
}

enum State {
    Idle,
    Electing {
        received_ok: bool,
    },
    AwaitingAnnouncement,
    Coordinator,
    Following {
        coordinator: NodeId,
        ponged: bool,
        _monitor: MonitorHandle,
    },
}

impl ElectionState {
    pub(crate) fn new_idle(timeouts: ElectionTimeouts, actor_client: WeakActorClient) -> Self {
        ElectionState {
            state: State::Idle,
            round: Round(0),
            timeouts,
            actor_client,
        }
    }

    pub(crate) fn is_current_round(&self, round: Round) -> bool {
        self.round == round
    }

    pub(crate) fn current_coordinator(&self) -> CoordinatorView {
        match &self.state {
            State::Coordinator => CoordinatorView::Me,
            State::Following { coordinator, .. } => CoordinatorView::Other(*coordinator),
            State::Idle | State::Electing { .. } | State::AwaitingAnnouncement => CoordinatorView::Unknown,
        }
    }

    /// Opens a new election round: coordinator forgotten, OK flag cleared,
    /// any monitor dropped and prior timers staled, window timer armed.
    pub(crate) fn begin_election(&mut self) -> Round {
        let round = self.round.incr();
        timers::spawn_election_timer(self.timeouts.election_timeout, round, self.actor_client.clone());
        self.state = State::Electing { received_ok: false };
        round
    }

    /// Records an OK for the in-flight round. Returns false when no election
    /// is open (a late OK from a superseded round).
    pub(crate) fn record_ok_received(&mut self) -> bool {
        if let State::Electing { received_ok, .. } = &mut self.state {
            *received_ok = true;
            true
        } else {
            false
        }
    }

    /// Some(received_ok) while an election window is open, None otherwise.
    pub(crate) fn electing_received_ok(&self) -> Option<bool> {
        if let State::Electing { received_ok, .. } = &self.state {
            Some(*received_ok)
        } else {
            None
        }
    }

    /// A higher node answered OK, so hold for its COORDINATOR announcement
    /// under a guard timer. Same round: nothing outstanding is invalidated.
    pub(crate) fn await_announcement(&mut self) {
        timers::spawn_announcement_timer(self.timeouts.announcement_timeout, self.round, self.actor_client.clone());
        self.state = State::AwaitingAnnouncement;
    }

    /// Self-announce. A node never pings itself, so no monitor is started.
    pub(crate) fn become_coordinator(&mut self) {
        self.round.incr();
        self.state = State::Coordinator;
    }

    /// Adopt `coordinator` and start (or restart) the single health monitor.
    /// Replacing the state drops any previous monitor handle, and the round
    /// bump stales its queued events, so only one loop is ever live.
    pub(crate) fn follow(&mut self, coordinator: NodeId) -> Round {
        let round = self.round.incr();
        self.state = State::Following {
            coordinator,
            ponged: false,
            _monitor: MonitorHandle::spawn_background_task(
                self.timeouts.ping_timeout,
                coordinator,
                round,
                self.actor_client.clone(),
            ),
        };
        round
    }

    /// Marks the coordinator alive, but only if the PONG actually came from
    /// the node we are monitoring.
    pub(crate) fn record_pong(&mut self, from: NodeId) -> bool {
        match &mut self.state {
            State::Following { coordinator, ponged, .. } if *coordinator == from => {
                *ponged = true;
                true
            }
            _ => false,
        }
    }

    /// Start of a monitor cycle: clear the PONG flag for `target`.
    pub(crate) fn clear_ponged(&mut self, target: NodeId) -> bool {
        match &mut self.state {
            State::Following { coordinator, ponged, .. } if *coordinator == target => {
                *ponged = false;
                true
            }
            _ => false,
        }
    }

    /// End of a monitor cycle: true when we are still following `target`
    /// and no PONG arrived within the window.
    pub(crate) fn pong_outstanding(&self, target: NodeId) -> bool {
        matches!(
            &self.state,
            State::Following { coordinator, ponged: false, .. } if *coordinator == target
        )
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Idle => write!(f, "Idle(Round={:?})", self.round),
            State::Electing { received_ok, .. } => {
                write!(f, "Electing(Round={:?}, ReceivedOk={})", self.round, received_ok)
            }
            State::AwaitingAnnouncement => write!(f, "AwaitingAnnouncement(Round={:?})", self.round),
            State::Coordinator => write!(f, "Coordinator(Round={:?})", self.round),
            State::Following { coordinator, .. } => {
                write!(f, "Following(Round={:?}, Coordinator={})", self.round, coordinator)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;

    fn new_state() -> ElectionState {
        let (actor_client, _rx) = ActorClient::new(16);
        ElectionState::new_idle(
            ElectionTimeouts {
                election_timeout: Duration::from_secs(3),
                announcement_timeout: Duration::from_secs(3),
                ping_timeout: Duration::from_secs(4),
            },
            actor_client.weak(),
        )
    }

    #[tokio::test]
    async fn election_round_resets_flags() {
        let mut state = new_state();

        let round = state.begin_election();
        assert!(state.is_current_round(round));
        assert_eq!(Some(false), state.electing_received_ok());
        assert_eq!(CoordinatorView::Unknown, state.current_coordinator());

        assert!(state.record_ok_received());
        assert_eq!(Some(true), state.electing_received_ok());

        // A superseding round clears the flag and stales the old one.
        let newer = state.begin_election();
        assert_eq!(Some(false), state.electing_received_ok());
        assert!(!state.is_current_round(round));
        assert!(state.is_current_round(newer));
    }

    #[tokio::test]
    async fn ok_is_only_recorded_while_electing() {
        let mut state = new_state();
        assert!(!state.record_ok_received());

        state.begin_election();
        state.become_coordinator();
        assert!(!state.record_ok_received());
        assert_eq!(CoordinatorView::Me, state.current_coordinator());
    }

    #[tokio::test]
    async fn repeated_announcements_supersede_prior_monitor() {
        let mut state = new_state();
        let peer = NodeId::new(3);

        let first_round = state.follow(peer);
        assert_eq!(CoordinatorView::Other(peer), state.current_coordinator());

        // Re-follow on a duplicate announcement: the monitor handle is
        // replaced and the prior round goes stale, which is what keeps a
        // single live monitor loop.
        let second_round = state.follow(peer);
        assert!(!state.is_current_round(first_round));
        assert!(state.is_current_round(second_round));
        assert_eq!(CoordinatorView::Other(peer), state.current_coordinator());
    }

    #[tokio::test]
    async fn pong_only_counts_from_monitored_coordinator() {
        let mut state = new_state();
        let coordinator = NodeId::new(5);
        let bystander = NodeId::new(2);

        state.follow(coordinator);
        assert!(state.clear_ponged(coordinator));
        assert!(state.pong_outstanding(coordinator));

        assert!(!state.record_pong(bystander));
        assert!(state.pong_outstanding(coordinator));

        assert!(state.record_pong(coordinator));
        assert!(!state.pong_outstanding(coordinator));

        // A stale monitor cycle for a node we stopped following is inert.
        state.begin_election();
        assert!(!state.clear_ponged(coordinator));
        assert!(!state.pong_outstanding(coordinator));
    }
}
