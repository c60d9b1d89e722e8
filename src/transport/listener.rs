use crate::actor::WeakActorClient;
use crate::node::NodeId;
use crate::transport::connection;
use crate::transport::shutdown::Closed;
use tokio::net::TcpListener;

/// Accepts inbound sockets until shut down. Every accepted socket starts
/// anonymous; the actor tracks it as pending until its first HELLO.
pub(crate) async fn run_accept_loop(
    logger: slog::Logger,
    listener: TcpListener,
    my_node_id: NodeId,
    actor_client: WeakActorClient,
    mut shutdown_signal: Closed,
) {
    slog::info!(logger, "Listening on {:?}", listener.local_addr());

    loop {
        tokio::select! {
            _ = shutdown_signal.recv() => {
                slog::info!(logger, "Accept loop shutting down");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    slog::debug!(logger, "Accepted inbound connection from {}", remote_addr);
                    let handle = connection::spawn_connection(
                        logger.clone(),
                        stream,
                        my_node_id,
                        actor_client.clone(),
                    );
                    if actor_client.inbound_connection(handle).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    slog::warn!(logger, "Failed to accept inbound connection: {}", e);
                }
            }
        }
    }
}
