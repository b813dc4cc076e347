use sha1::{Digest, Sha1};

use super::PieceWork;

/// SHA1 digest of a piece buffer.
pub fn piece_hash(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// Whether `data` hashes to `expected_hash`.
pub fn verify_piece(data: &[u8], expected_hash: &[u8; 20]) -> bool {
    piece_hash(data) == *expected_hash
}

impl PieceWork {
    pub fn verify(&self, data: &[u8]) -> bool {
        data.len() == self.length && verify_piece(data, &self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_piece_valid() {
        let data = b"Hello, World!";
        let mut hasher = Sha1::new();
        hasher.update(data);
        let expected: [u8; 20] = hasher.finalize().into();
        assert!(verify_piece(data, &expected));
    }

    #[test]
    fn test_verify_piece_invalid() {
        let data = b"Hello, World!";
        let wrong_hash = [0u8; 20];
        assert!(!verify_piece(data, &wrong_hash));
    }

    #[test]
    fn test_piece_hash_known_vector() {
        assert_eq!(
            hex::encode(piece_hash(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_work_verify_checks_length() {
        let work = PieceWork {
            index: 0,
            hash: piece_hash(b"abcd"),
            length: 5,
        };
        assert!(!work.verify(b"abcd"));

        let work = PieceWork { length: 4, ..work };
        assert!(work.verify(b"abcd"));
        assert!(!work.verify(b"abce"));
    }
}
