use std::path::PathBuf;

use sha1::{Digest, Sha1};
use torrent_fetch::peer::PeerAddresses;
use torrent_fetch::torrent::Torrent;

fn info_dictionary() -> Vec<u8> {
    let mut info = Vec::new();
    info.extend_from_slice(b"d6:lengthi8e4:name11:fixture.bin12:piece lengthi4e6:pieces40:");
    info.extend_from_slice(&Sha1::digest(b"abcd"));
    info.extend_from_slice(&Sha1::digest(b"efgh"));
    info.extend_from_slice(b"e");
    info
}

fn write_torrent_file(name: &str) -> PathBuf {
    let mut bytes = b"d8:announce27:http://127.0.0.1:1/announce4:info".to_vec();
    bytes.extend_from_slice(&info_dictionary());
    bytes.extend_from_slice(b"e");

    let path = std::env::temp_dir().join(format!("{}-{}.torrent", name, std::process::id()));
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn test_torrent_file_parsing() -> anyhow::Result<()> {
    let path = write_torrent_file("parse");
    let torrent = Torrent::open(&path).await?;
    std::fs::remove_file(&path)?;

    assert_eq!(torrent.announce, "http://127.0.0.1:1/announce");
    assert_eq!(torrent.info.name, "fixture.bin");
    assert_eq!(torrent.length(), 8);
    assert_eq!(torrent.piece_hashes().len(), 2);

    let expected: [u8; 20] = Sha1::digest(info_dictionary()).into();
    assert_eq!(torrent.info_hash, expected);
    assert_eq!(
        torrent.urlencode_infohash(),
        expected.iter().map(|b| format!("%{:02X}", b)).collect::<String>()
    );

    let descriptor = torrent.descriptor(&PeerAddresses::default(), [1; 20]);
    assert_eq!(descriptor.piece_hashes[0], <[u8; 20]>::from(Sha1::digest(b"abcd")));
    assert_eq!(descriptor.length, 8);

    Ok(())
}

#[tokio::test]
async fn test_invalid_torrent_file_parsing() {
    let invalid_path = PathBuf::from("non_existent_torrent_file.torrent");
    assert!(
        Torrent::open(invalid_path).await.is_err(),
        "Non-existent torrent file should return an error"
    );

    let path = std::env::temp_dir().join(format!("garbage-{}.torrent", std::process::id()));
    std::fs::write(&path, b"not bencode").unwrap();
    let result = Torrent::open(&path).await;
    std::fs::remove_file(&path).unwrap();
    assert!(result.is_err(), "Malformed torrent file should return an error");
}
