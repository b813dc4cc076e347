use anyhow::Context;
use core::fmt;
use serde_derive::Deserialize;
use sha1::{Digest, Sha1};
use std::path::Path;

mod hashes;

pub use hashes::Hashes;

use crate::client::TorrentDescriptor;
use crate::peer::PeerAddresses;

#[derive(Debug, Clone, Deserialize)]
pub struct Torrent {
    /// The URL of the tracker.
    pub announce: String,
    pub info: Info,
    /// SHA1 of the bencoded info dictionary.
    #[serde(skip)]
    pub info_hash: [u8; 20],
}

/// Only the info dictionary, kept generic so every key takes part in the hash.
#[derive(Deserialize)]
struct RawMetainfo {
    info: serde_bencode::value::Value,
}

impl Torrent {
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut torrent: Torrent =
            serde_bencode::from_bytes(bytes).context("Failed parsing torrent file")?;

        let raw: RawMetainfo =
            serde_bencode::from_bytes(bytes).context("Failed reading info dictionary")?;
        let info_encoded =
            serde_bencode::to_bytes(&raw.info).context("Failed to re-encode info dictionary")?;
        torrent.info_hash = Sha1::digest(&info_encoded).into();

        if torrent.info.piece_length == 0 {
            anyhow::bail!("Torrent has a piece length of zero");
        }

        Ok(torrent)
    }

    #[tracing::instrument]
    pub async fn open(file: impl AsRef<Path> + fmt::Debug) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(file)
            .await
            .context("Failed opening torrent file")?;
        let torrent = Self::from_bytes(&bytes)?;

        tracing::info!("Succesfully opened {}", torrent.info.name);
        Ok(torrent)
    }

    pub fn urlencode_infohash(&self) -> String {
        let mut encoded = String::with_capacity(self.info_hash.len() * 3);
        for byte in self.info_hash {
            encoded.push('%');
            encoded.push_str(&format!("{:02X}", byte));
        }
        encoded
    }

    pub fn length(&self) -> usize {
        match &self.info.keys {
            Keys::SingleFile { length } => *length,
            Keys::MultiFile { files } => files.iter().map(|file| file.length).sum(),
        }
    }

    pub fn piece_hashes(&self) -> &[[u8; 20]] {
        &self.info.pieces.0
    }

    /// Input for a download session from this torrent and an announce result.
    pub fn descriptor(&self, peers: &PeerAddresses, peer_id: [u8; 20]) -> TorrentDescriptor {
        TorrentDescriptor {
            peers: peers.0.clone(),
            info_hash: self.info_hash,
            peer_id,
            piece_hashes: self.info.pieces.0.clone(),
            piece_length: self.info.piece_length,
            length: self.length(),
            name: self.info.name.clone(),
        }
    }
}

// Structure mainly from https://github.com/jonhoo/codecrafters-bittorrent-rust/blob/master/src/torrent.rs

#[derive(Debug, Clone, Deserialize)]
pub struct Info {
    /// The suggested name to save the file (or directory) as. It is purely advisory.
    ///
    /// In the single file case, the name key is the name of a file, in the muliple file case, it's
    /// the name of a directory.
    pub name: String,

    /// The number of bytes in each piece the file is split into.
    ///
    /// Pieces are all the same length except for possibly the last one which may be truncated.
    #[serde(rename = "piece length")]
    pub piece_length: usize,

    /// Each entry of `pieces` is the SHA1 hash of the piece at the corresponding index.
    pub pieces: Hashes,

    #[serde(flatten)]
    pub keys: Keys,
}

/// There is a key `length` or a key `files`, but not both or neither.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Keys {
    /// If `length` is present then the download represents a single file.
    SingleFile {
        /// The length of the file in bytes.
        length: usize,
    },
    /// Otherwise it represents a set of files which go in a directory structure.
    ///
    /// The content is treated as the concatenation of the files in list order.
    MultiFile { files: Vec<File> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    /// The length of the file, in bytes.
    pub length: usize,

    /// Subdirectory names for this file, the last of which is the actual file name.
    pub path: Vec<String>,
}
