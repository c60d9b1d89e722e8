use crate::actor::WeakActorClient;
use crate::node::NodeId;
use crate::protocol;
use crate::protocol::{FrameReadError, MessageKind, ProtocolError};
use crate::transport::shutdown;
use crate::transport::shutdown::Closed;
use std::fmt;
use std::io;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Ephemeral correlation id for a socket. Connections start anonymous, so
/// this is how the read loop tags messages before (and after) the peer
/// identity is known.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct ConnectionId(u64);

impl ConnectionId {
    fn generate() -> Self {
        ConnectionId(rand::random())
    }
}

/// Why a connection died. Transport and protocol failures are treated the
/// same way downstream: the peer is evicted.
#[derive(Debug)]
pub(crate) enum DisconnectReason {
    ClosedByPeer,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
    Protocol(ProtocolError),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClosedByPeer => write!(f, "closed by peer"),
            DisconnectReason::ReadFailed(e) => write!(f, "read failed: {}", e),
            DisconnectReason::WriteFailed(e) => write!(f, "write failed: {}", e),
            DisconnectReason::Protocol(e) => write!(f, "protocol error: {}", e),
        }
    }
}

/// Owning handle for one socket's task pair. Dropping it closes the outbox
/// (stopping the write loop) and fires the read loop's close signal, so
/// every exit path releases the socket.
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    connection_id: ConnectionId,
    outbox: mpsc::UnboundedSender<MessageKind>,
    _read_closer: shutdown::CloseHandle,
}

impl ConnectionHandle {
    pub(crate) fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Enqueues a message for the write loop. A closed outbox means the
    /// write loop already died and reported its failure; nothing to do here.
    pub(crate) fn send(&self, kind: MessageKind) -> bool {
        self.outbox.send(kind).is_ok()
    }
}

/// Splits the stream and spawns the read/write task pair. All decoded
/// messages and failures flow into the actor; this layer never interprets
/// them.
pub(crate) fn spawn_connection(
    logger: slog::Logger,
    stream: TcpStream,
    my_node_id: NodeId,
    actor_client: WeakActorClient,
) -> ConnectionHandle {
    let connection_id = ConnectionId::generate();
    let (read_half, write_half) = stream.into_split();
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let (read_closer, read_close_signal) = shutdown::close_pair();

    tokio::task::spawn(write_loop(
        logger.clone(),
        write_half,
        outbox_rx,
        my_node_id,
        connection_id,
        actor_client.clone(),
    ));
    tokio::task::spawn(read_loop(logger, read_half, read_close_signal, connection_id, actor_client));

    ConnectionHandle {
        connection_id,
        outbox: outbox_tx,
        _read_closer: read_closer,
    }
}

async fn read_loop(
    logger: slog::Logger,
    mut read_half: OwnedReadHalf,
    mut close_signal: Closed,
    connection_id: ConnectionId,
    actor_client: WeakActorClient,
) {
    loop {
        tokio::select! {
            _ = close_signal.recv() => {
                // Handle dropped; socket is being replaced or torn down.
                return;
            }
            frame = protocol::read_frame(&mut read_half) => match frame {
                Ok(message) => {
                    if actor_client.peer_message(connection_id, message).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let reason = match e {
                        FrameReadError::Closed => DisconnectReason::ClosedByPeer,
                        FrameReadError::Io(ioe) => DisconnectReason::ReadFailed(ioe),
                        FrameReadError::Protocol(pe) => DisconnectReason::Protocol(pe),
                    };
                    slog::debug!(logger, "Read loop for {:?} exiting: {}", connection_id, reason);
                    let _ = actor_client.connection_closed(connection_id, reason).await;
                    return;
                }
            }
        }
    }
}

async fn write_loop(
    logger: slog::Logger,
    mut write_half: OwnedWriteHalf,
    mut outbox: mpsc::UnboundedReceiver<MessageKind>,
    my_node_id: NodeId,
    connection_id: ConnectionId,
    actor_client: WeakActorClient,
) {
    while let Some(kind) = outbox.recv().await {
        let frame = protocol::encode(kind, my_node_id);
        if let Err(e) = write_half.write_all(&frame).await {
            slog::debug!(logger, "Write loop for {:?} exiting: {}", connection_id, e);
            let _ = actor_client
                .connection_closed(connection_id, DisconnectReason::WriteFailed(e))
                .await;
            return;
        }
    }
    // Outbox closed: the handle was dropped and the connection is retired.
}

#[cfg(test)]
pub(crate) fn stub_connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<MessageKind>) {
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let (read_closer, _read_close_signal) = shutdown::close_pair();

    let handle = ConnectionHandle {
        connection_id: ConnectionId::generate(),
        outbox: outbox_tx,
        _read_closer: read_closer,
    };

    (handle, outbox_rx)
}
