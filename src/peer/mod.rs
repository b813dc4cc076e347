use std::net::SocketAddrV4;

mod address;
mod connect;
mod error;
mod handshake;
mod state;

use crate::message::{Bitfield, MessageCodec};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

pub use address::CompactPeersError;
pub use error::PeerError;
pub use handshake::{Handshake, PROTOCOL_IDENTIFIER};
pub use state::PeerState;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeerAddresses(pub Vec<SocketAddrV4>);

// To make it more readable
impl PeerAddresses {
    pub fn iter(&self) -> std::slice::Iter<'_, SocketAddrV4> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An established connection to one remote peer.
///
/// Handshake and the initial bitfield are done by the time a `Peer` exists.
/// The bitfield and choke flag belong to the single worker holding this
/// value.
#[derive(Debug)]
pub struct Peer {
    addr: SocketAddrV4,
    state: PeerState,
    remote_id: [u8; 20],
    bitfield: Bitfield,
    frames: Framed<TcpStream, MessageCodec>,
}

impl Peer {
    pub fn address(&self) -> SocketAddrV4 {
        self.addr
    }

    /// Peer id the remote sent in its handshake.
    pub fn remote_id(&self) -> &[u8; 20] {
        &self.remote_id
    }

    pub fn bitfield(&self) -> &Bitfield {
        &self.bitfield
    }

    pub fn bitfield_mut(&mut self) -> &mut Bitfield {
        &mut self.bitfield
    }

    pub fn is_choked(&self) -> bool {
        self.state.is_choked()
    }

    pub fn choke(&mut self) {
        self.state.choke();
    }

    pub fn unchoke(&mut self) {
        self.state.unchoke();
    }
}
