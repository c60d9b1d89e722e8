use crate::transport::ConnectionHandle;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// NodeId is the externally assigned, totally ordered identity of a cluster
/// member. The highest reachable id wins elections.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        NodeId(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterConfigError {
    #[error("cluster config has no members")]
    EmptyCluster,
    #[error("duplicate node id {0} in cluster config")]
    DuplicateNodeId(NodeId),
    #[error("my node id {0} is not in the cluster config")]
    MeNotInCluster(NodeId),
}

/// Registry is the read-only id→address mapping loaded before the core
/// starts. The core only ever reads from it.
pub(crate) struct Registry {
    my_node_id: NodeId,
    members: HashMap<NodeId, SocketAddr>,
    max_node_id: NodeId,
}

impl Registry {
    pub(crate) fn new(my_node_id: NodeId, members: Vec<(NodeId, SocketAddr)>) -> Result<Self, ClusterConfigError> {
        if members.is_empty() {
            return Err(ClusterConfigError::EmptyCluster);
        }

        let mut map = HashMap::with_capacity(members.len());
        let mut max_node_id = NodeId::new(0);
        for (id, addr) in members {
            if map.insert(id, addr).is_some() {
                return Err(ClusterConfigError::DuplicateNodeId(id));
            }
            if id > max_node_id {
                max_node_id = id;
            }
        }

        if !map.contains_key(&my_node_id) {
            return Err(ClusterConfigError::MeNotInCluster(my_node_id));
        }

        Ok(Registry {
            my_node_id,
            members: map,
            max_node_id,
        })
    }

    pub(crate) fn my_node_id(&self) -> NodeId {
        self.my_node_id
    }

    pub(crate) fn max_node_id(&self) -> NodeId {
        self.max_node_id
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.members.contains_key(&id)
    }

    pub(crate) fn my_addr(&self) -> SocketAddr {
        // Constructor guarantees our own entry exists.
        self.members[&self.my_node_id]
    }

    /// Iterates every member except us, for the bootstrap connect pass.
    pub(crate) fn iter_others(&self) -> impl Iterator<Item = (NodeId, SocketAddr)> + '_ {
        let me = self.my_node_id;
        self.members.iter().filter(move |(id, _)| **id != me).map(|(id, addr)| (*id, *addr))
    }
}

/// PeerConnection is one live, identity-bound session with another node.
/// Dropping it closes the socket and stops both connection tasks.
pub(crate) struct PeerConnection {
    pub(crate) node_id: NodeId,
    pub(crate) handle: ConnectionHandle,
}
