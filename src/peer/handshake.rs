use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::timeout,
};
use tracing::{debug, warn};

use super::PeerError;

pub const PROTOCOL_IDENTIFIER: &[u8] = b"BitTorrent protocol";

/// Bytes following the identifier: reserved, info hash, peer id.
const HANDSHAKE_TAIL_LENGTH: usize = 8 + 20 + 20;

/// The connection-opening message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub pstr: Vec<u8>,
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            pstr: PROTOCOL_IDENTIFIER.to_vec(),
            info_hash,
            peer_id,
        }
    }

    /// Wire form; 68 bytes for the standard identifier. Reserved bytes are
    /// always zero.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.pstr.len() + HANDSHAKE_TAIL_LENGTH);
        bytes.push(self.pstr.len() as u8);
        bytes.extend_from_slice(&self.pstr);
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&self.info_hash);
        bytes.extend_from_slice(&self.peer_id);
        bytes
    }

    /// Reads one handshake: the length byte, then exactly `length + 48` bytes.
    pub async fn read<R>(reader: &mut R) -> Result<Self, PeerError>
    where
        R: AsyncRead + Unpin,
    {
        let pstr_length = reader.read_u8().await? as usize;
        if pstr_length == 0 {
            warn!("Peer sent a handshake with an empty protocol identifier");
            return Err(PeerError::EmptyProtocol);
        }

        let mut buf = vec![0u8; pstr_length + HANDSHAKE_TAIL_LENGTH];
        reader.read_exact(&mut buf).await?;

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[pstr_length + 8..pstr_length + 28]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[pstr_length + 28..]);

        buf.truncate(pstr_length);

        Ok(Self {
            pstr: buf,
            info_hash,
            peer_id,
        })
    }

    /// Sends `self`, then waits up to `deadline` for the remote handshake and
    /// checks that it carries the same info hash.
    pub async fn exchange<S>(&self, stream: &mut S, deadline: Duration) -> Result<Self, PeerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let exchange = async {
            stream.write_all(&self.to_bytes()).await?;
            Self::read(stream).await
        };

        let response = timeout(deadline, exchange)
            .await
            .map_err(|_| PeerError::timeout("handshake", deadline))??;

        if response.info_hash != self.info_hash {
            return Err(PeerError::InfoHashMismatch {
                expected: hex::encode(self.info_hash),
                actual: hex::encode(response.info_hash),
            });
        }

        debug!(
            remote_id = %String::from_utf8_lossy(&response.peer_id),
            "Handshake accepted"
        );
        Ok(response)
    }
}
