use super::PieceIndex;

/// Pieces a peer has announced, one bit per piece, high bit first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("piece index {index} is out of range for a bitfield of {len} bytes")]
pub struct BitfieldError {
    pub index: PieceIndex,
    pub len: usize,
}

impl Bitfield {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { data: bytes }
    }

    /// An empty bitfield sized for `piece_count` pieces.
    pub fn with_piece_count(piece_count: usize) -> Self {
        Self {
            data: vec![0; Self::byte_len(piece_count)],
        }
    }

    /// Number of bytes needed to hold `piece_count` bits.
    pub fn byte_len(piece_count: usize) -> usize {
        piece_count.div_ceil(8)
    }

    pub fn has_piece(&self, index: PieceIndex) -> Result<bool, BitfieldError> {
        let (byte_index, mask) = self.locate(index)?;
        Ok(self.data[byte_index] & mask != 0)
    }

    pub fn set_piece(&mut self, index: PieceIndex) -> Result<(), BitfieldError> {
        let (byte_index, mask) = self.locate(index)?;
        self.data[byte_index] |= mask;
        Ok(())
    }

    /// Number of pieces announced.
    pub fn count(&self) -> usize {
        self.data.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn locate(&self, index: PieceIndex) -> Result<(usize, u8), BitfieldError> {
        let byte_index = index as usize / 8;
        let bit_index = index % 8;

        if byte_index >= self.data.len() {
            return Err(BitfieldError {
                index,
                len: self.data.len(),
            });
        }

        // Big endian bit ordering
        Ok((byte_index, 1 << (7 - bit_index)))
    }
}
