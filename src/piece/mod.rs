use crate::message::PieceIndex;

mod progress;
mod queue;
mod verify;

pub use progress::{download_piece, PieceProgress, PieceState};
pub use queue::WorkQueue;
pub use verify::{piece_hash, verify_piece};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    pub piece_index: PieceIndex,
    pub offset: u32,
    pub length: u32,
}

/// One piece still to be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWork {
    pub index: PieceIndex,
    pub hash: [u8; 20],
    pub length: usize,
}

/// A piece whose hash has been verified.
#[derive(Debug)]
pub struct PieceResult {
    pub index: PieceIndex,
    pub data: Vec<u8>,
}

/// Byte range `[begin, end)` of piece `index` within the whole content.
/// The last piece ends at `total_length` and may be shorter.
pub fn piece_bounds(index: PieceIndex, piece_length: usize, total_length: usize) -> (usize, usize) {
    let begin = index as usize * piece_length;
    let end = (begin + piece_length).min(total_length);
    (begin, end)
}

/// One work item per manifest entry, in index order.
pub fn piece_works(
    hashes: &[[u8; 20]],
    piece_length: usize,
    total_length: usize,
) -> Vec<PieceWork> {
    hashes
        .iter()
        .enumerate()
        .map(|(index, hash)| {
            let index = index as PieceIndex;
            let (begin, end) = piece_bounds(index, piece_length, total_length);
            PieceWork {
                index,
                hash: *hash,
                length: end.saturating_sub(begin),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_bounds() {
        assert_eq!(piece_bounds(0, 4, 10), (0, 4));
        assert_eq!(piece_bounds(1, 4, 10), (4, 8));
        assert_eq!(piece_bounds(2, 4, 10), (8, 10));
    }

    #[test]
    fn test_piece_lengths_sum_to_total() {
        for total_length in 1..200usize {
            for piece_length in 1..40usize {
                let piece_count = total_length.div_ceil(piece_length);
                let hashes = vec![[0u8; 20]; piece_count];
                let works = piece_works(&hashes, piece_length, total_length);

                let sum: usize = works.iter().map(|w| w.length).sum();
                assert_eq!(sum, total_length);

                let last = works.last().unwrap();
                assert_eq!(
                    last.length,
                    total_length - (piece_count - 1) * piece_length
                );
                assert!(works.iter().all(|w| w.length <= piece_length));
            }
        }
    }

    #[test]
    fn test_piece_works_keeps_manifest_order() {
        let hashes = [[1u8; 20], [2u8; 20], [3u8; 20]];
        let works = piece_works(&hashes, 16384, 40000);

        assert_eq!(works.len(), 3);
        for (i, work) in works.iter().enumerate() {
            assert_eq!(work.index, i as u32);
            assert_eq!(work.hash, hashes[i]);
        }
        assert_eq!(works[2].length, 40000 - 2 * 16384);
    }
}
