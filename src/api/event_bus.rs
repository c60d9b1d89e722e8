use crate::node::NodeId;
use crate::protocol::MessageKind;
use tokio::sync::broadcast;

/// Something the local node observed, for the display layer. Delivery is
/// fire-and-forget: a slow consumer lags and loses the oldest events rather
/// than ever stalling the core.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeEvent {
    PeerConnected(NodeId),
    PeerLost(NodeId),
    MessageSent { to: NodeId, kind: MessageKind },
    MessageReceived { from: NodeId, kind: MessageKind },
    ElectionStarted,
    /// Carries the local id when this node announced itself.
    CoordinatorChanged(NodeId),
}

pub(crate) fn new_event_channel(capacity: usize) -> (EventPublisher, NodeEventListener) {
    let (tx, rx) = broadcast::channel(capacity);

    (EventPublisher { tx }, NodeEventListener { rx })
}

pub(crate) struct EventPublisher {
    tx: broadcast::Sender<NodeEvent>,
}

impl EventPublisher {
    pub(crate) fn publish(&self, event: NodeEvent) {
        // No receivers is fine; nobody has to be watching.
        let _ = self.tx.send(event);
    }
}

pub struct NodeEventListener {
    rx: broadcast::Receiver<NodeEvent>,
}

impl NodeEventListener {
    /// Returns the next observed event, skipping over any gap caused by
    /// lagging behind. None once the node has shut down.
    pub async fn next(&mut self) -> Option<NodeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
