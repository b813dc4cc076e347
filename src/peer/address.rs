// Compact peer list decoding, after
// https://github.com/jonhoo/codecrafters-bittorrent-rust/blob/master/src/tracker.rs
use crate::peer::PeerAddresses;

use serde::de::{self, Deserialize, Deserializer, Visitor};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

const COMPACT_PEER_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("compact peer list length {0} is not a multiple of 6")]
pub struct CompactPeersError(pub usize);

impl PeerAddresses {
    /// Decodes 6-byte records: IPv4 address then big-endian port.
    pub fn from_compact(bytes: &[u8]) -> Result<Self, CompactPeersError> {
        if bytes.len() % COMPACT_PEER_LENGTH != 0 {
            return Err(CompactPeersError(bytes.len()));
        }

        Ok(PeerAddresses(
            bytes
                .chunks_exact(COMPACT_PEER_LENGTH)
                .map(|record| {
                    SocketAddrV4::new(
                        Ipv4Addr::new(record[0], record[1], record[2], record[3]),
                        u16::from_be_bytes([record[4], record[5]]),
                    )
                })
                .collect(),
        ))
    }
}

struct PeerAddressesVisitor;

impl<'de> Visitor<'de> for PeerAddressesVisitor {
    type Value = PeerAddresses;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a byte string of 6-byte compact peer records")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        PeerAddresses::from_compact(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for PeerAddresses {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_bytes(PeerAddressesVisitor)
    }
}
