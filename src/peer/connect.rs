use std::net::SocketAddrV4;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

use super::{Handshake, Peer, PeerError, PeerState};
use crate::client::ClientConfig;
use crate::message::{
    format_have, format_request, Bitfield, Frame, Message, MessageCodec, MessageId, PieceIndex,
};

impl Peer {
    /// Dials `addr` and establishes the connection.
    #[instrument(skip_all, fields(peer = %addr))]
    pub async fn connect(
        addr: SocketAddrV4,
        handshake: &Handshake,
        piece_count: usize,
        config: &ClientConfig,
    ) -> Result<Self, PeerError> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| PeerError::timeout("connect", config.connect_timeout))??;

        Self::establish(addr, stream, handshake, piece_count, config).await
    }

    /// Runs the handshake over an open stream and requires the peer's first
    /// message to be a bitfield covering `piece_count` pieces.
    pub async fn establish(
        addr: SocketAddrV4,
        mut stream: TcpStream,
        handshake: &Handshake,
        piece_count: usize,
        config: &ClientConfig,
    ) -> Result<Self, PeerError> {
        let response = handshake
            .exchange(&mut stream, config.handshake_timeout)
            .await?;

        let mut frames = Framed::new(stream, MessageCodec);
        let bitfield = receive_bitfield(&mut frames, piece_count, config.bitfield_timeout).await?;
        debug!(pieces = bitfield.count(), "Received bitfield");

        Ok(Self {
            addr,
            state: PeerState::new(),
            remote_id: response.peer_id,
            bitfield,
            frames,
        })
    }

    /// Receive the next frame from the peer.
    pub async fn read(&mut self) -> Result<Frame, PeerError> {
        match self.frames.next().await {
            Some(frame) => Ok(frame?),
            None => Err(PeerError::ConnectionClosed),
        }
    }

    pub async fn send_request(
        &mut self,
        index: PieceIndex,
        begin: u32,
        length: u32,
    ) -> Result<(), PeerError> {
        self.send(format_request(index, begin, length)).await
    }

    pub async fn send_interested(&mut self) -> Result<(), PeerError> {
        self.send(Message::new(MessageId::Interested)).await
    }

    pub async fn send_not_interested(&mut self) -> Result<(), PeerError> {
        self.send(Message::new(MessageId::NotInterested)).await
    }

    pub async fn send_unchoke(&mut self) -> Result<(), PeerError> {
        self.send(Message::new(MessageId::Unchoke)).await
    }

    pub async fn send_have(&mut self, index: PieceIndex) -> Result<(), PeerError> {
        self.send(format_have(index)).await
    }

    async fn send(&mut self, message: Message) -> Result<(), PeerError> {
        self.frames.send(Frame::Message(message)).await?;
        Ok(())
    }
}

async fn receive_bitfield(
    frames: &mut Framed<TcpStream, MessageCodec>,
    piece_count: usize,
    deadline: Duration,
) -> Result<Bitfield, PeerError> {
    let frame = timeout(deadline, frames.next())
        .await
        .map_err(|_| PeerError::timeout("bitfield", deadline))?
        .ok_or(PeerError::ConnectionClosed)??;

    match frame {
        Frame::Message(Message {
            id: MessageId::Bitfield,
            payload,
        }) => {
            let expected = Bitfield::byte_len(piece_count);
            if payload.len() != expected {
                return Err(PeerError::BitfieldLength {
                    expected,
                    actual: payload.len(),
                });
            }
            Ok(Bitfield::from_bytes(payload))
        }
        other => Err(PeerError::MissingBitfield(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::BitfieldError;
    use crate::piece::{PieceProgress, PieceWork};
    use std::net::{Ipv4Addr, SocketAddr};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const INFO_HASH: [u8; 20] = [0x11; 20];

    fn test_config() -> ClientConfig {
        ClientConfig::default()
            .with_handshake_timeout(Duration::from_millis(500))
            .with_bitfield_timeout(Duration::from_millis(200))
    }

    /// Accepts one connection, answers the handshake, then writes `after`.
    async fn remote_peer(after: Vec<u8>) -> SocketAddrV4 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = match listener.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(_) => unreachable!(),
        };

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let theirs = Handshake::read(&mut stream).await.unwrap();
            let ours = Handshake::new(theirs.info_hash, *b"-RM0001-remotepeer01");
            stream.write_all(&ours.to_bytes()).await.unwrap();
            stream.write_all(&after).await.unwrap();
            // Hold the socket open until the test is done with it.
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        addr
    }

    async fn connect(addr: SocketAddrV4, piece_count: usize) -> Result<Peer, PeerError> {
        let handshake = Handshake::new(INFO_HASH, *b"-TF0001-localpeer001");
        Peer::connect(addr, &handshake, piece_count, &test_config()).await
    }

    #[tokio::test]
    async fn test_connect_receives_bitfield() {
        let bitfield = Message::with_payload(MessageId::Bitfield, vec![0b1010_0000]);
        let addr = remote_peer(bitfield.serialize()).await;

        let peer = connect(addr, 3).await.unwrap();

        assert_eq!(peer.address(), addr);
        assert_eq!(peer.remote_id(), b"-RM0001-remotepeer01");
        assert!(peer.is_choked());
        assert!(peer.bitfield().has_piece(0).unwrap());
        assert!(!peer.bitfield().has_piece(1).unwrap());
        assert!(peer.bitfield().has_piece(2).unwrap());
    }

    #[tokio::test]
    async fn test_connect_requires_bitfield_first() {
        let addr = remote_peer(Message::new(MessageId::Unchoke).serialize()).await;

        let result = connect(addr, 3).await;
        assert!(matches!(result, Err(PeerError::MissingBitfield(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_bitfield_of_wrong_length() {
        let bitfield = Message::with_payload(MessageId::Bitfield, vec![0xFF, 0xFF]);
        let addr = remote_peer(bitfield.serialize()).await;

        let result = connect(addr, 3).await;
        assert!(matches!(
            result,
            Err(PeerError::BitfieldLength {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_connect_bitfield_timeout() {
        let addr = remote_peer(Vec::new()).await;

        let result = connect(addr, 3).await;
        assert!(matches!(
            result,
            Err(PeerError::Timeout {
                stage: "bitfield",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_read_frames() {
        let mut after = Message::with_payload(MessageId::Bitfield, vec![0xFF]).serialize();
        after.extend(Frame::KeepAlive.serialize());
        after.extend(Message::new(MessageId::Unchoke).serialize());
        let addr = remote_peer(after).await;

        let mut peer = connect(addr, 8).await.unwrap();
        assert_eq!(peer.read().await.unwrap(), Frame::KeepAlive);
        assert_eq!(
            peer.read().await.unwrap(),
            Frame::Message(Message::new(MessageId::Unchoke))
        );
    }

    #[tokio::test]
    async fn test_progress_applies_choke_and_have() {
        let mut after = Message::with_payload(MessageId::Bitfield, vec![0b1000_0000]).serialize();
        after.extend(Message::new(MessageId::Unchoke).serialize());
        after.extend(format_have(5).serialize());
        after.extend(Message::new(MessageId::Choke).serialize());
        after.extend(format_have(9).serialize());
        let addr = remote_peer(after).await;

        let mut peer = connect(addr, 8).await.unwrap();
        let work = PieceWork {
            index: 0,
            hash: [0; 20],
            length: 4,
        };
        let mut progress = PieceProgress::new(&work);
        assert!(peer.is_choked());

        let frame = peer.read().await.unwrap();
        progress.handle(&mut peer, frame).unwrap();
        assert!(!peer.is_choked());

        assert!(!peer.bitfield().has_piece(5).unwrap());
        let frame = peer.read().await.unwrap();
        progress.handle(&mut peer, frame).unwrap();
        assert!(peer.bitfield().has_piece(5).unwrap());
        assert_eq!(peer.bitfield().count(), 2);

        let frame = peer.read().await.unwrap();
        progress.handle(&mut peer, frame).unwrap();
        assert!(peer.is_choked());

        let frame = peer.read().await.unwrap();
        let result = progress.handle(&mut peer, frame);
        assert!(matches!(
            result,
            Err(PeerError::Bitfield(BitfieldError { index: 9, .. }))
        ));
        assert_eq!(progress.downloaded(), 0);
    }
}
