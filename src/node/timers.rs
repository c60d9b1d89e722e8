use crate::actor::WeakActorClient;
use crate::node::election::Round;
use crate::node::NodeId;
use crate::transport::{close_pair, CloseHandle, Closed};
use tokio::time::Duration;

/// One-shot election window. Fires exactly once; the actor discards the
/// event by round if the state has moved on by then.
pub(crate) fn spawn_election_timer(timeout: Duration, round: Round, actor_client: WeakActorClient) {
    tokio::task::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = actor_client.election_timeout(round).await;
    });
}

/// Guard window armed after an OK was received: a higher node promised to
/// take over, so give it a bounded amount of time to announce before
/// re-electing. Stale fires are discarded by round, same as above.
pub(crate) fn spawn_announcement_timer(timeout: Duration, round: Round, actor_client: WeakActorClient) {
    tokio::task::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = actor_client.announcement_timeout(round).await;
    });
}

/// Coordinator health monitor. Each cycle asks the actor to clear `ponged`
/// and send PING, sleeps the ping window, then asks the actor to check
/// whether a PONG came back. The actor ends the loop by dropping this
/// handle (new announcement, election restart, shutdown); round staleness
/// covers any cycle event already queued.
pub(crate) struct MonitorHandle {
    _closer: CloseHandle,
}

impl MonitorHandle {
    pub(crate) fn spawn_background_task(
        ping_timeout: Duration,
        coordinator: NodeId,
        round: Round,
        actor_client: WeakActorClient,
    ) -> Self {
        let (closer, closed) = close_pair();

        tokio::task::spawn(Self::monitor_task(closed, ping_timeout, coordinator, round, actor_client));

        MonitorHandle { _closer: closer }
    }

    async fn monitor_task(
        mut closed: Closed,
        ping_timeout: Duration,
        coordinator: NodeId,
        round: Round,
        actor_client: WeakActorClient,
    ) {
        loop {
            if actor_client.monitor_ping(coordinator, round).await.is_err() {
                return;
            }

            tokio::select! {
                _ = closed.recv() => return,
                _ = tokio::time::sleep(ping_timeout) => {}
            }

            if actor_client.monitor_deadline(coordinator, round).await.is_err() {
                return;
            }
        }
    }
}
