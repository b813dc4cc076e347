mod config;
mod error;
mod peer_worker;
mod session;
mod state;

pub use config::ClientConfig;
pub use error::DownloadError;
pub use peer_worker::{PeerWorker, WorkerEvent};
pub use session::{TorrentDescriptor, TorrentSession};
pub use state::{DownloadStats, SharedState};
