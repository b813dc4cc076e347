use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use torrent_fetch::client::{ClientConfig, TorrentSession};
use torrent_fetch::torrent::Torrent;
use torrent_fetch::tracker;

#[derive(Parser, Debug)]
#[command(author, version, about = "Downloads the content of a .torrent file from its peers")]
struct Args {
    /// Path to the .torrent file
    torrent: PathBuf,

    /// Output file (defaults to the name from the torrent, inside the download directory)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Directory for downloads when no output file is given
    #[arg(short = 'd', long, default_value = ".")]
    download_dir: PathBuf,

    /// Port reported to the tracker
    #[arg(short = 'p', long, default_value_t = 6881)]
    port: u16,

    /// Maximum number of peers connected at once
    #[arg(long, default_value_t = 50)]
    max_peers: usize,

    /// Seconds one piece may take before the peer is dropped
    #[arg(long, default_value_t = 30)]
    piece_timeout: u64,

    /// Seconds without a finished piece before giving up, 0 waits forever
    #[arg(long, default_value_t = 300)]
    stall_timeout: u64,
}

/// Keeps the advisory torrent name from escaping the download directory.
fn sanitize_filename(filename: &str) -> String {
    let safe_name = filename.replace(['/', '\\'], "_");
    if safe_name.trim().is_empty() || safe_name == "." || safe_name == ".." {
        "download".to_string()
    } else {
        safe_name
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let torrent = Torrent::open(&args.torrent).await?;
    let peer_id = tracker::generate_peer_id();
    let response = tracker::announce(&torrent, &peer_id, args.port).await?;

    let stall_timeout = (args.stall_timeout > 0).then(|| Duration::from_secs(args.stall_timeout));
    let config = ClientConfig::default()
        .with_download_path(&args.download_dir)
        .with_listen_port(args.port)
        .with_max_peers(args.max_peers)
        .with_piece_timeout(Duration::from_secs(args.piece_timeout))
        .with_stall_timeout(stall_timeout);

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| config.download_path.join(sanitize_filename(&torrent.info.name)));

    let session = TorrentSession::new(torrent.descriptor(&response.peer_addresses, peer_id), config);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}%  [{elapsed_precise}] {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );
    pb.set_message(torrent.info.name.clone());

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f64>();
    let progress_bar = pb.clone();
    let progress = tokio::spawn(async move {
        while let Some(percent) = progress_rx.recv().await {
            progress_bar.set_position(percent.round() as u64);
        }
    });

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping download");
            ctrl_c.cancel();
        }
    });

    let result = session.download(progress_tx, shutdown).await;
    // The sender was moved into the session, so the progress task ends with it.
    let _ = progress.await;

    let data = match result {
        Ok(data) => {
            pb.finish();
            data
        }
        Err(e) => {
            pb.abandon();
            return Err(e).context("Download failed");
        }
    };

    tokio::fs::write(&output, &data)
        .await
        .with_context(|| format!("Failed writing {}", output.display()))?;

    info!("Saved {} bytes to {}", data.len(), output.display());
    Ok(())
}
