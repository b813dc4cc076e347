use anyhow::Context;
use rand::Rng;
use serde_derive::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::peer::PeerAddresses;
use crate::torrent::Torrent;

/// Client prefix of every generated peer id.
pub const PEER_ID_PREFIX: &[u8; 8] = b"-TF0001-";

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerResponse {
    /// Set instead of the other keys when the tracker refuses the announce.
    #[serde(rename = "failure reason", default)]
    pub failure_reason: Option<String>,

    /// An integer, indicating how often your client should make a request to the tracker in seconds.
    #[serde(default)]
    pub interval: usize,

    /// A string, which contains list of peers that your client can connect to.
    ///
    /// Each peer is represented using 6 bytes. The first 4 bytes are the peer's IP address and the
    /// last 2 bytes are the peer's port number.
    #[serde(rename = "peers", default)]
    pub peer_addresses: PeerAddresses,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerRequest {
    /// A unique identifier for your client.
    pub peer_id: String,

    /// The port your client is listening on.
    pub port: u16,

    /// The total amount uploaded so far.
    pub uploaded: usize,

    /// The total amount downloaded so far
    pub downloaded: usize,

    /// The number of bytes left to download.
    pub left: usize,

    /// Whether the peer list should use the compact representation
    pub compact: u8,
}

impl TrackerRequest {
    pub fn new(torrent: &Torrent, peer_id: &[u8; 20], port: u16) -> Self {
        TrackerRequest {
            peer_id: String::from_utf8_lossy(peer_id).into_owned(),
            port,
            uploaded: 0,
            downloaded: 0,
            left: torrent.length(),
            compact: 1,
        }
    }

    /// Full announce URL. The info hash is raw bytes, so it is percent-encoded by hand
    /// rather than going through `serde_urlencoded`.
    pub fn url(&self, torrent: &Torrent) -> anyhow::Result<String> {
        let params =
            serde_urlencoded::to_string(self).context("Failed to encode tracker url params!")?;
        Ok(format!(
            "{}?{}&info_hash={}",
            torrent.announce,
            params,
            torrent.urlencode_infohash(),
        ))
    }
}

/// Asks the tracker for peers of `torrent`.
#[instrument(skip_all, fields(tracker = %torrent.announce))]
pub async fn announce(
    torrent: &Torrent,
    peer_id: &[u8; 20],
    port: u16,
) -> anyhow::Result<TrackerResponse> {
    let tracker_url = TrackerRequest::new(torrent, peer_id, port).url(torrent)?;

    let response = reqwest::get(tracker_url)
        .await
        .context("Failed to make GET request to tracker server!")?;
    let response = response
        .bytes()
        .await
        .context("Failed converting tracker response into bytes!")?;

    let response: TrackerResponse = serde_bencode::from_bytes(&response)
        .context("Failed to deserialize tracker response!")?;

    if let Some(reason) = &response.failure_reason {
        anyhow::bail!("Tracker refused announce: {}", reason);
    }

    info!(
        "Sucesfully retrieved {} peers from tracker",
        response.peer_addresses.len()
    );

    Ok(response)
}

/// `-TF0001-` followed by twelve random alphanumeric bytes.
pub fn generate_peer_id() -> [u8; 20] {
    let mut rng = rand::thread_rng();
    let mut peer_id = [0u8; 20];
    peer_id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);

    for byte in peer_id.iter_mut().skip(PEER_ID_PREFIX.len()) {
        *byte = match rng.gen_range(0..3) {
            0 => rng.gen_range(b'A'..=b'Z'),
            1 => rng.gen_range(b'a'..=b'z'),
            _ => rng.gen_range(b'0'..=b'9'),
        };
    }

    peer_id
}
