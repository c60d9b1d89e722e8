use crate::actor::ActorClient;
use crate::api::NodeEventListener;
use crate::node::CoordinatorView;

/// Handle to a running node. Dropping the last clone of this handle shuts
/// the node down: the actor loop exits, which drops every peer connection
/// and the listener socket.
pub struct NodeClient {
    actor_client: ActorClient,
    /// Fire-and-forget feed of cluster happenings. A slow consumer loses
    /// old events rather than stalling the node.
    pub event_listener: NodeEventListener,
}

impl NodeClient {
    pub(crate) fn new(actor_client: ActorClient, event_listener: NodeEventListener) -> Self {
        NodeClient {
            actor_client,
            event_listener,
        }
    }

    /// Snapshot of who this node currently believes is coordinator.
    pub async fn coordinator(&self) -> CoordinatorView {
        self.actor_client.current_coordinator().await
    }

    /// Explicit spelling of drop, for call sites that want the intent visible.
    pub fn shutdown(self) {
        drop(self);
    }
}
