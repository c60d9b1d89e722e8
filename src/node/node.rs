use crate::actor::WeakActorClient;
use crate::api::event_bus::EventPublisher;
use crate::api::NodeEvent;
use crate::node::election::{CoordinatorView, ElectionState, ElectionTimeouts, Round};
use crate::node::peers::{PeerConnection, Registry};
use crate::node::NodeId;
use crate::protocol::{Message, MessageKind};
use crate::transport::{CloseHandle, ConnectionHandle, ConnectionId, DisconnectReason};
use std::collections::HashMap;

pub(crate) struct CoreConfig {
    pub(crate) logger: slog::Logger,
    pub(crate) registry: Registry,
    pub(crate) timeouts: ElectionTimeouts,
    pub(crate) actor_client: WeakActorClient,
    pub(crate) event_publisher: EventPublisher,
    pub(crate) listener_shutdown: CloseHandle,
}

/// The coordination core: election state machine plus the failure-detection
/// bookkeeping around the connected peer set. Only ever driven from the
/// actor event loop, so no field needs its own synchronization.
pub(crate) struct Node {
    logger: slog::Logger,
    my_node_id: NodeId,
    registry: Registry,
    peers: HashMap<NodeId, PeerConnection>,
    pending: HashMap<ConnectionId, ConnectionHandle>,
    election: ElectionState,
    events: EventPublisher,
    // Dropping the node releases the accept loop along with everything else.
    _listener_shutdown: CloseHandle,
}

impl Node {
    pub(crate) fn new(config: CoreConfig) -> Self {
        let my_node_id = config.registry.my_node_id();
        let election = ElectionState::new_idle(config.timeouts, config.actor_client);

        Node {
            logger: config.logger,
            my_node_id,
            registry: config.registry,
            peers: HashMap::new(),
            pending: HashMap::new(),
            election,
            events: config.event_publisher,
            _listener_shutdown: config.listener_shutdown,
        }
    }

    pub(crate) fn current_coordinator(&self) -> CoordinatorView {
        self.election.current_coordinator()
    }

    /// An accepted socket with no identity yet. It stays pending until its
    /// first HELLO arrives or it dies.
    pub(crate) fn handle_inbound_connection(&mut self, handle: ConnectionHandle) {
        slog::debug!(self.logger, "Tracking unregistered connection {:?}", handle.connection_id());
        self.pending.insert(handle.connection_id(), handle);
    }

    /// An outbound connect already knows who it dialed: greet with HELLO and
    /// register immediately, no reply needed.
    pub(crate) fn handle_outbound_connection(&mut self, node_id: NodeId, handle: ConnectionHandle) {
        if handle.send(MessageKind::Hello) {
            self.events.publish(NodeEvent::MessageSent {
                to: node_id,
                kind: MessageKind::Hello,
            });
        }
        self.register_peer(node_id, handle);
    }

    /// All bootstrap connects have been attempted. Highest possible id
    /// claims the coordinator role outright; everyone else runs an election.
    pub(crate) fn handle_bootstrap_complete(&mut self) {
        if self.my_node_id == self.registry.max_node_id() {
            slog::info!(self.logger, "Highest possible id; announcing coordinator without an election");
            self.announce_self_coordinator();
        } else {
            self.start_election();
        }
    }

    pub(crate) fn handle_peer_message(&mut self, connection_id: ConnectionId, message: Message) {
        // A pending connection must identify itself before anything else.
        if let Some(handle) = self.pending.remove(&connection_id) {
            if message.kind == MessageKind::Hello {
                self.complete_handshake(message.sender, handle);
            } else {
                slog::debug!(
                    self.logger,
                    "Dropping {} received before HELLO on connection {:?}",
                    message.kind,
                    connection_id
                );
                self.pending.insert(connection_id, handle);
            }
            return;
        }

        // Only process messages arriving on the sender's bound connection.
        // A replaced connection can still have decoded messages in flight.
        match self.peers.get(&message.sender) {
            Some(peer) if peer.handle.connection_id() == connection_id => {}
            _ => {
                slog::debug!(
                    self.logger,
                    "Dropping {} from {} on unknown or stale connection {:?}",
                    message.kind,
                    message.sender,
                    connection_id
                );
                return;
            }
        }

        self.events.publish(NodeEvent::MessageReceived {
            from: message.sender,
            kind: message.kind,
        });

        match message.kind {
            MessageKind::Election => {
                // Acknowledge the lower node, then contest the round ourselves.
                self.send_to_peer(message.sender, MessageKind::Ok);
                self.start_election();
            }
            MessageKind::Ok => {
                if !self.election.record_ok_received() {
                    slog::debug!(self.logger, "Late OK from {} outside an election window", message.sender);
                }
            }
            MessageKind::Coordinator => {
                self.adopt_coordinator(message.sender);
            }
            MessageKind::Ping => {
                self.send_to_peer(message.sender, MessageKind::Pong);
            }
            MessageKind::Pong => {
                self.election.record_pong(message.sender);
            }
            MessageKind::Hello => {
                slog::debug!(self.logger, "Redundant HELLO from registered peer {}", message.sender);
            }
        }
    }

    /// Failure detection: transport errors, protocol errors, and orderly
    /// closes all end here and evict the peer. If the coordinator was lost,
    /// the monitor's next missed PING/PONG round detects it; nothing is
    /// forced eagerly.
    pub(crate) fn handle_connection_closed(&mut self, connection_id: ConnectionId, reason: DisconnectReason) {
        if self.pending.remove(&connection_id).is_some() {
            slog::debug!(self.logger, "Unregistered connection {:?} closed: {}", connection_id, reason);
            return;
        }

        let lost = self
            .peers
            .values()
            .find(|peer| peer.handle.connection_id() == connection_id)
            .map(|peer| peer.node_id);

        match lost {
            Some(node_id) => {
                self.peers.remove(&node_id);
                slog::info!(self.logger, "Lost peer {}: {}", node_id, reason);
                self.events.publish(NodeEvent::PeerLost(node_id));
            }
            None => {
                slog::debug!(
                    self.logger,
                    "Close report for already-replaced connection {:?}: {}",
                    connection_id,
                    reason
                );
            }
        }
    }

    pub(crate) fn handle_election_timeout(&mut self, round: Round) {
        if !self.election.is_current_round(round) {
            slog::debug!(self.logger, "Stale election timer for round {:?}", round);
            return;
        }

        match self.election.electing_received_ok() {
            Some(false) => {
                // Nobody higher answered; the round is ours.
                self.announce_self_coordinator();
            }
            Some(true) => {
                // A higher node answered. Hold for its announcement, but
                // only for a bounded window.
                self.election.await_announcement();
                slog::info!(self.logger, "Election window closed; awaiting announcement: {:?}", self.election);
            }
            None => {
                slog::debug!(self.logger, "Election timer fired outside an election window");
            }
        }
    }

    pub(crate) fn handle_announcement_timeout(&mut self, round: Round) {
        if !self.election.is_current_round(round) {
            slog::debug!(self.logger, "Stale announcement timer for round {:?}", round);
            return;
        }

        slog::info!(self.logger, "No coordinator announcement arrived in time; restarting election");
        self.start_election();
    }

    pub(crate) fn handle_monitor_ping(&mut self, coordinator: NodeId, round: Round) {
        if !self.election.is_current_round(round) {
            return;
        }

        if self.election.clear_ponged(coordinator) {
            // If the coordinator's connection is already gone, no PING goes
            // out and the deadline below fails the round-trip.
            self.send_to_peer(coordinator, MessageKind::Ping);
        }
    }

    pub(crate) fn handle_monitor_deadline(&mut self, coordinator: NodeId, round: Round) {
        if !self.election.is_current_round(round) {
            return;
        }

        if self.election.pong_outstanding(coordinator) {
            slog::warn!(
                self.logger,
                "Coordinator {} missed its PING/PONG window; starting election",
                coordinator
            );
            self.start_election();
        }
    }

    fn complete_handshake(&mut self, claimed_id: NodeId, handle: ConnectionHandle) {
        if claimed_id == self.my_node_id || !self.registry.contains(claimed_id) {
            slog::warn!(self.logger, "Rejecting HELLO claiming unknown or local id {}", claimed_id);
            return;
        }

        self.register_peer(claimed_id, handle);
    }

    fn register_peer(&mut self, node_id: NodeId, handle: ConnectionHandle) {
        let replaced = self.peers.insert(node_id, PeerConnection { node_id, handle });
        if replaced.is_some() {
            // Reconnect. The prior socket and its loops retire on drop; the
            // peer's election bookkeeping continues unchanged.
            slog::info!(self.logger, "Peer {} reconnected; replacing its connection", node_id);
        } else {
            slog::info!(self.logger, "Peer {} connected", node_id);
        }
        self.events.publish(NodeEvent::PeerConnected(node_id));
    }

    fn start_election(&mut self) {
        self.election.begin_election();
        slog::info!(self.logger, "Starting election; state: {:?}", self.election);
        self.events.publish(NodeEvent::ElectionStarted);

        // Canonical Bully rule: only nodes that outrank us can take the
        // round away from us.
        let higher_peers: Vec<NodeId> = self
            .peers
            .keys()
            .copied()
            .filter(|id| *id > self.my_node_id)
            .collect();
        for node_id in higher_peers {
            self.send_to_peer(node_id, MessageKind::Election);
        }
    }

    fn announce_self_coordinator(&mut self) {
        self.election.become_coordinator();
        self.broadcast(MessageKind::Coordinator);
        slog::info!(self.logger, "Announced self as coordinator; state: {:?}", self.election);
        self.events.publish(NodeEvent::CoordinatorChanged(self.my_node_id));
    }

    fn adopt_coordinator(&mut self, coordinator: NodeId) {
        self.election.follow(coordinator);
        slog::info!(self.logger, "Adopted coordinator {}; state: {:?}", coordinator, self.election);
        self.events.publish(NodeEvent::CoordinatorChanged(coordinator));
    }

    fn send_to_peer(&self, to: NodeId, kind: MessageKind) {
        match self.peers.get(&to) {
            Some(peer) => {
                if peer.handle.send(kind) {
                    self.events.publish(NodeEvent::MessageSent { to, kind });
                } else {
                    // The write loop already exited and reported its own
                    // failure; eviction is on the way.
                    slog::debug!(self.logger, "Outbox for peer {} is closed; dropping {}", to, kind);
                }
            }
            None => {
                slog::debug!(self.logger, "No live connection to peer {}; dropping {}", to, kind);
            }
        }
    }

    fn broadcast(&self, kind: MessageKind) {
        for node_id in self.peers.keys().copied().collect::<Vec<_>>() {
            self.send_to_peer(node_id, kind);
        }
    }
}
