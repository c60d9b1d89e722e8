//! Wire codec for the peer protocol. A frame is a u32 big-endian length
//! header followed by a plaintext payload of the form `TYPE;senderNodeId`.
//! The explicit length prefix keeps pipelined or fragmented messages intact
//! across reads; a bare bounded read cannot.

use crate::node::NodeId;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on a single payload. The payload is a short token plus a
/// decimal id, so anything near this limit is garbage.
pub(crate) const MAX_PAYLOAD_LEN: usize = 1024;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MessageKind {
    Election,
    Ok,
    Coordinator,
    Ping,
    Pong,
    Hello,
}

impl MessageKind {
    fn wire_token(&self) -> &'static str {
        match self {
            MessageKind::Election => "ELECTION",
            MessageKind::Ok => "OK",
            MessageKind::Coordinator => "COORDINATOR",
            MessageKind::Ping => "PING",
            MessageKind::Pong => "PONG",
            MessageKind::Hello => "HELLO",
        }
    }

    fn from_wire_token(token: &str) -> Option<Self> {
        match token {
            "ELECTION" => Some(MessageKind::Election),
            "OK" => Some(MessageKind::Ok),
            "COORDINATOR" => Some(MessageKind::Coordinator),
            "PING" => Some(MessageKind::Ping),
            "PONG" => Some(MessageKind::Pong),
            "HELLO" => Some(MessageKind::Hello),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_token())
    }
}

/// A decoded peer message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Message {
    pub(crate) kind: MessageKind,
    pub(crate) sender: NodeId,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty payload")]
    EmptyPayload,
    #[error("payload is not of the form TYPE;senderNodeId: {0:?}")]
    MalformedPayload(String),
    #[error("unknown message type token {0:?}")]
    UnknownMessageType(String),
    #[error("unparseable sender node id {0:?}")]
    InvalidSenderId(String),
    #[error("declared payload length {0} exceeds the frame limit")]
    PayloadTooLarge(usize),
}

pub(crate) fn encode(kind: MessageKind, sender: NodeId) -> Bytes {
    let payload = format!("{};{}", kind.wire_token(), sender.as_u32());

    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload.as_bytes());
    frame.freeze()
}

pub(crate) fn decode_payload(payload: &[u8]) -> Result<Message, ProtocolError> {
    if payload.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }

    let text = std::str::from_utf8(payload)
        .map_err(|_| ProtocolError::MalformedPayload(String::from_utf8_lossy(payload).into_owned()))?;

    let mut parts = text.splitn(2, ';');
    let token = parts.next().unwrap_or("");
    let id_text = parts
        .next()
        .ok_or_else(|| ProtocolError::MalformedPayload(text.to_string()))?;

    let kind =
        MessageKind::from_wire_token(token).ok_or_else(|| ProtocolError::UnknownMessageType(token.to_string()))?;
    let id: u32 = id_text
        .parse()
        .map_err(|_| ProtocolError::InvalidSenderId(id_text.to_string()))?;

    Ok(Message {
        kind,
        sender: NodeId::new(id),
    })
}

/// Why a read loop exits.
#[derive(Debug)]
pub(crate) enum FrameReadError {
    /// Orderly close from the remote side.
    Closed,
    Io(io::Error),
    Protocol(ProtocolError),
}

/// Reads exactly one frame. `read_exact` on the length header and payload
/// means a frame split across TCP segments is reassembled, and back-to-back
/// frames in one segment are consumed one at a time.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message, FrameReadError> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(FrameReadError::Closed),
        Err(e) => return Err(FrameReadError::Io(e)),
    };

    if len == 0 {
        return Err(FrameReadError::Protocol(ProtocolError::EmptyPayload));
    }
    if len > MAX_PAYLOAD_LEN {
        return Err(FrameReadError::Protocol(ProtocolError::PayloadTooLarge(len)));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(FrameReadError::Io)?;

    decode_payload(&payload).map_err(FrameReadError::Protocol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const ALL_KINDS: [MessageKind; 6] = [
        MessageKind::Election,
        MessageKind::Ok,
        MessageKind::Coordinator,
        MessageKind::Ping,
        MessageKind::Pong,
        MessageKind::Hello,
    ];

    #[test]
    fn encode_decode_round_trip() {
        for kind in ALL_KINDS.iter() {
            for id in [0u32, 1, 42, u32::MAX].iter() {
                let frame = encode(*kind, NodeId::new(*id));
                let decoded = decode_payload(&frame[4..]).unwrap();
                assert_eq!(*kind, decoded.kind);
                assert_eq!(NodeId::new(*id), decoded.sender);
            }
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_payload(b""), Err(ProtocolError::EmptyPayload)));
        assert!(matches!(
            decode_payload(b"ELECTION"),
            Err(ProtocolError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode_payload(b"BANANA;3"),
            Err(ProtocolError::UnknownMessageType(_))
        ));
        assert!(matches!(
            decode_payload(b"PING;not-a-number"),
            Err(ProtocolError::InvalidSenderId(_))
        ));
        assert!(matches!(
            decode_payload(b"PING;"),
            Err(ProtocolError::InvalidSenderId(_))
        ));
        assert!(matches!(decode_payload(&[0xff, 0xfe]), Err(ProtocolError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn two_frames_in_one_write_decode_separately() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let mut batch = Vec::new();
        batch.extend_from_slice(&encode(MessageKind::Hello, NodeId::new(2)));
        batch.extend_from_slice(&encode(MessageKind::Election, NodeId::new(2)));
        client.write_all(&batch).await.unwrap();

        let first = read_frame(&mut server).await.unwrap();
        let second = read_frame(&mut server).await.unwrap();
        assert_eq!(MessageKind::Hello, first.kind);
        assert_eq!(MessageKind::Election, second.kind);
        assert_eq!(NodeId::new(2), first.sender);
        assert_eq!(NodeId::new(2), second.sender);
    }

    #[tokio::test]
    async fn frame_split_across_writes_is_reassembled() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let frame = encode(MessageKind::Coordinator, NodeId::new(31));
        let writer = tokio::spawn(async move {
            for chunk in frame.chunks(3) {
                client.write_all(chunk).await.unwrap();
                client.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
            client
        });

        let message = read_frame(&mut server).await.unwrap();
        assert_eq!(MessageKind::Coordinator, message.kind);
        assert_eq!(NodeId::new(31), message.sender);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn orderly_close_and_bad_frames_are_distinguished() {
        // Clean EOF before any header byte.
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(matches!(read_frame(&mut server).await, Err(FrameReadError::Closed)));

        // Oversized declared length is a protocol error.
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&(MAX_PAYLOAD_LEN as u32 + 1).to_be_bytes()).await.unwrap();
        assert!(matches!(
            read_frame(&mut server).await,
            Err(FrameReadError::Protocol(ProtocolError::PayloadTooLarge(_)))
        ));

        // Zero-length payload is a protocol error.
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        assert!(matches!(
            read_frame(&mut server).await,
            Err(FrameReadError::Protocol(ProtocolError::EmptyPayload))
        ));
    }
}
