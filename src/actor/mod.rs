use crate::node::{CoordinatorView, Node, NodeId, Round};
use crate::protocol::Message;
use crate::transport::{ConnectionHandle, ConnectionId, DisconnectReason};
use tokio::sync::{mpsc, oneshot};

/// Everything that can happen to the node, funneled through one queue so a
/// single task owns every election state mutation. Receive loops, timers,
/// and the monitor only ever enqueue.
#[derive(Debug)]
pub(crate) enum Event {
    /// Accepted socket, identity unknown until its HELLO.
    InboundConnection(ConnectionHandle),

    /// Dialed socket; the initiator already knows the peer's id.
    OutboundConnection(NodeId, ConnectionHandle),

    /// Decoded frame from some connection's read loop.
    PeerMessage(ConnectionId, Message),

    /// Transport/protocol failure or orderly close, from either loop.
    ConnectionClosed(ConnectionId, DisconnectReason),

    /// The bootstrap connect pass finished; pick the startup path.
    BootstrapComplete,

    /// The election window elapsed for the stamped round.
    ElectionTimeout(Round),

    /// The guard window for a promised COORDINATOR announcement elapsed.
    AnnouncementTimeout(Round),

    /// Monitor cycle start: clear the PONG flag and ping the coordinator.
    MonitorPing { coordinator: NodeId, round: Round },

    /// Monitor cycle end: no PONG by now means the coordinator is dead.
    MonitorDeadline { coordinator: NodeId, round: Round },

    /// Read-only query of the current coordinator view.
    GetCoordinator(Callback<CoordinatorView>),
}

#[derive(Debug)]
pub(crate) struct Callback<T>(oneshot::Sender<T>);

impl<T> Callback<T> {
    pub(crate) fn send(self, value: T) {
        // Caller may have given up waiting; that's their business.
        let _ = self.0.send(value);
    }
}

/// Strong handle held by the public client. Dropping the last strong handle
/// shuts the whole node down.
#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

/// Weak handle for background tasks, so a read loop or timer never keeps a
/// shut-down node alive.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

/// The node actor has exited; the task holding this handle should too.
#[derive(Debug)]
pub(crate) struct ActorExited;

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);

        (ActorClient { sender: tx }, rx)
    }

    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn outbound_connection(&self, node_id: NodeId, handle: ConnectionHandle) {
        self.send(Event::OutboundConnection(node_id, handle)).await;
    }

    pub(crate) async fn bootstrap_complete(&self) {
        self.send(Event::BootstrapComplete).await;
    }

    pub(crate) async fn current_coordinator(&self) -> CoordinatorView {
        let (tx, rx) = oneshot::channel();
        self.send(Event::GetCoordinator(Callback(tx))).await;

        rx.await.expect("Node actor dropped the coordinator query callback")
    }

    async fn send(&self, event: Event) {
        self.sender
            .send(event)
            .await
            .expect("Node actor event loop is gone while a strong client still exists");
    }
}

impl WeakActorClient {
    pub(crate) async fn inbound_connection(&self, handle: ConnectionHandle) -> Result<(), ActorExited> {
        self.send(Event::InboundConnection(handle)).await
    }

    pub(crate) async fn peer_message(&self, connection_id: ConnectionId, message: Message) -> Result<(), ActorExited> {
        self.send(Event::PeerMessage(connection_id, message)).await
    }

    pub(crate) async fn connection_closed(
        &self,
        connection_id: ConnectionId,
        reason: DisconnectReason,
    ) -> Result<(), ActorExited> {
        self.send(Event::ConnectionClosed(connection_id, reason)).await
    }

    pub(crate) async fn election_timeout(&self, round: Round) -> Result<(), ActorExited> {
        self.send(Event::ElectionTimeout(round)).await
    }

    pub(crate) async fn announcement_timeout(&self, round: Round) -> Result<(), ActorExited> {
        self.send(Event::AnnouncementTimeout(round)).await
    }

    pub(crate) async fn monitor_ping(&self, coordinator: NodeId, round: Round) -> Result<(), ActorExited> {
        self.send(Event::MonitorPing { coordinator, round }).await
    }

    pub(crate) async fn monitor_deadline(&self, coordinator: NodeId, round: Round) -> Result<(), ActorExited> {
        self.send(Event::MonitorDeadline { coordinator, round }).await
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        match self.sender.upgrade() {
            Some(sender) => sender.send(event).await.map_err(|_| ActorExited),
            None => Err(ActorExited),
        }
    }
}

/// NodeActor drives the coordination core in actor style: one event at a
/// time, no interleaving.
pub(crate) struct NodeActor {
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    node: Node,
}

impl NodeActor {
    pub(crate) fn new(logger: slog::Logger, receiver: mpsc::Receiver<Event>, node: Node) -> Self {
        NodeActor { logger, receiver, node }
    }

    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            self.handle_event(event);
        }
        slog::info!(self.logger, "Node actor event loop has exited");
    }

    // Must stay synchronous: anything slow belongs on a background task that
    // reports back through the queue.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::InboundConnection(handle) => {
                self.node.handle_inbound_connection(handle);
            }
            Event::OutboundConnection(node_id, handle) => {
                self.node.handle_outbound_connection(node_id, handle);
            }
            Event::PeerMessage(connection_id, message) => {
                self.node.handle_peer_message(connection_id, message);
            }
            Event::ConnectionClosed(connection_id, reason) => {
                self.node.handle_connection_closed(connection_id, reason);
            }
            Event::BootstrapComplete => {
                self.node.handle_bootstrap_complete();
            }
            Event::ElectionTimeout(round) => {
                self.node.handle_election_timeout(round);
            }
            Event::AnnouncementTimeout(round) => {
                self.node.handle_announcement_timeout(round);
            }
            Event::MonitorPing { coordinator, round } => {
                self.node.handle_monitor_ping(coordinator, round);
            }
            Event::MonitorDeadline { coordinator, round } => {
                self.node.handle_monitor_deadline(coordinator, round);
            }
            Event::GetCoordinator(callback) => {
                callback.send(self.node.current_coordinator());
            }
        }
    }
}
