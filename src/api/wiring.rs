use crate::actor::{ActorClient, NodeActor};
use crate::api::client::NodeClient;
use crate::api::event_bus;
use crate::api::options::BullyOptionsValidated;
use crate::api::BullyOptions;
use crate::node::{ClusterConfigError, CoreConfig, ElectionTimeouts, Node, NodeId, Registry};
use crate::transport;
use std::convert::TryFrom;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::{TcpListener, TcpStream};

const ACTOR_QUEUE_SIZE: usize = 64;
const EVENT_BUS_CAPACITY: usize = 256;

/// One row of the static cluster registry.
#[derive(Clone)]
pub struct MemberInfo {
    pub node_id: NodeId,
    pub ip_addr: Ipv4Addr,
    pub port: u16,
}

pub struct NodeConfig {
    pub my_node_id: NodeId,
    pub cluster_members: Vec<MemberInfo>,
    pub info_logger: slog::Logger,
    pub options: BullyOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeStartError {
    #[error("illegal options for configuring node: {0}")]
    IllegalOptions(&'static str),
    #[error("invalid cluster config: {0}")]
    InvalidClusterConfig(#[from] ClusterConfigError),
    #[error("failed to bind listener on port {port}: {source}")]
    ListenerBind {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Brings a node online: binds the listener, spawns the actor, dials every
/// registered peer once (absent peers will dial us when they arrive), then
/// kicks off the startup election path.
pub async fn try_start_node(config: NodeConfig) -> Result<NodeClient, NodeStartError> {
    let logger = config.info_logger;

    let options = BullyOptionsValidated::try_from(config.options).map_err(NodeStartError::IllegalOptions)?;

    let members = config
        .cluster_members
        .iter()
        .map(|m| (m.node_id, SocketAddr::V4(SocketAddrV4::new(m.ip_addr, m.port))))
        .collect();
    let registry = Registry::new(config.my_node_id, members)?;
    let my_node_id = registry.my_node_id();
    let my_addr = registry.my_addr();
    let others: Vec<(NodeId, SocketAddr)> = registry.iter_others().collect();

    // Config is fully validated before any socket opens. Bind on all
    // interfaces at our registered port.
    let listen_addr = SocketAddr::from(([0, 0, 0, 0], my_addr.port()));
    let listener = TcpListener::bind(listen_addr)
        .await
        .map_err(|source| NodeStartError::ListenerBind {
            port: my_addr.port(),
            source,
        })?;

    let (actor_client, actor_queue_rx) = ActorClient::new(ACTOR_QUEUE_SIZE);
    let (event_publisher, event_listener) = event_bus::new_event_channel(EVENT_BUS_CAPACITY);
    let (listener_shutdown, listener_shutdown_signal) = transport::close_pair();

    let node = Node::new(CoreConfig {
        logger: logger.clone(),
        registry,
        timeouts: ElectionTimeouts {
            election_timeout: options.election_timeout,
            announcement_timeout: options.announcement_timeout,
            ping_timeout: options.ping_timeout,
        },
        actor_client: actor_client.weak(),
        event_publisher,
        listener_shutdown,
    });

    let node_actor = NodeActor::new(logger.clone(), actor_queue_rx, node);
    tokio::spawn(node_actor.run_event_loop());

    tokio::spawn(transport::run_accept_loop(
        logger.clone(),
        listener,
        my_node_id,
        actor_client.weak(),
        listener_shutdown_signal,
    ));

    bootstrap_connects(&logger, my_node_id, &others, &actor_client).await;
    actor_client.bootstrap_complete().await;

    Ok(NodeClient::new(actor_client, event_listener))
}

/// One connect attempt per registered peer, no retry: a peer that is down
/// now will initiate its own connection and handshake when it comes up.
async fn bootstrap_connects(
    logger: &slog::Logger,
    my_node_id: NodeId,
    others: &[(NodeId, SocketAddr)],
    actor_client: &ActorClient,
) {
    for &(peer_id, addr) in others {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                slog::info!(logger, "Connected to peer {} at {}", peer_id, addr);
                let handle = transport::spawn_connection(logger.clone(), stream, my_node_id, actor_client.weak());
                actor_client.outbound_connection(peer_id, handle).await;
            }
            Err(e) => {
                slog::info!(logger, "Could not connect to peer {} at {}: {}", peer_id, addr, e);
            }
        }
    }
}
