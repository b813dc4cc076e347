pub mod client;
pub mod message;
pub mod peer;
pub mod piece;
pub mod torrent;
pub mod tracker;
