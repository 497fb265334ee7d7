//! Reed-Solomon piece coding.
//!
//! `encode` pads the plaintext chunk to `D * piece_size`, splits it into D
//! data shards, and computes P parity shards via a systematic code over
//! GF(2^8) - the first D output shards are exactly the plaintext shards.
//! `decode` accepts any D of the N shards (by index) and reconstructs the
//! plaintext, stripping the padding using the stored plaintext length.

use anyhow::{bail, Context, Result};
use reed_solomon_erasure::galois_8::Field;
use reed_solomon_erasure::ReedSolomon;

/// One coded shard plus the index it occupies within the chunk.
pub type Shard = Vec<u8>;

pub struct PieceCodec {
    data_shards: usize,
    parity_shards: usize,
    piece_size: usize,
    rs: ReedSolomon<Field>,
}

impl PieceCodec {
    pub fn new(data_shards: u8, parity_shards: u8, piece_size: usize) -> Result<Self> {
        let data_shards = data_shards as usize;
        let parity_shards = parity_shards as usize;
        if !piece_size.is_power_of_two() {
            bail!("piece_size must be a power of two, got {}", piece_size);
        }
        let rs = ReedSolomon::new(data_shards, parity_shards)
            .context("constructing reed-solomon encoder")?;
        Ok(Self {
            data_shards,
            parity_shards,
            piece_size,
            rs,
        })
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    pub fn piece_size(&self) -> usize {
        self.piece_size
    }

    /// Encode `plaintext` (which must be `<= D * piece_size` bytes) into
    /// `N` pieces, zero-padding up to the coding boundary.
    pub fn encode(&self, plaintext: &[u8]) -> Result<Vec<Shard>> {
        let capacity = self.data_shards * self.piece_size;
        if plaintext.len() > capacity {
            bail!(
                "plaintext of {} bytes exceeds chunk capacity of {} bytes",
                plaintext.len(),
                capacity
            );
        }

        let mut shards: Vec<Shard> = Vec::with_capacity(self.total_shards());
        for i in 0..self.data_shards {
            let start = i * self.piece_size;
            let end = start + self.piece_size;
            let mut shard = vec![0u8; self.piece_size];
            if start < plaintext.len() {
                let copy_end = end.min(plaintext.len());
                shard[..copy_end - start].copy_from_slice(&plaintext[start..copy_end]);
            }
            shards.push(shard);
        }
        for _ in 0..self.parity_shards {
            shards.push(vec![0u8; self.piece_size]);
        }

        self.rs.encode(&mut shards).context("reed-solomon encode")?;
        Ok(shards)
    }

    /// Reconstruct the plaintext from any `>= D` pieces (indexed 0..N).
    /// `plaintext_len` is the original, un-padded length to slice back to.
    pub fn decode(
        &self,
        pieces: Vec<(usize, Shard)>,
        plaintext_len: usize,
    ) -> Result<Vec<u8>> {
        if pieces.len() < self.data_shards {
            bail!(
                "need at least {} pieces to decode, got {}",
                self.data_shards,
                pieces.len()
            );
        }

        let mut slots: Vec<Option<Shard>> = vec![None; self.total_shards()];
        for (idx, shard) in pieces {
            if idx >= self.total_shards() {
                bail!("piece index {} out of range", idx);
            }
            if shard.len() != self.piece_size {
                bail!(
                    "piece {} has wrong size {} (expected {})",
                    idx,
                    shard.len(),
                    self.piece_size
                );
            }
            slots[idx] = Some(shard);
        }

        self.rs
            .reconstruct(&mut slots)
            .context("reed-solomon reconstruct")?;

        let mut plaintext = Vec::with_capacity(self.data_shards * self.piece_size);
        for slot in slots.into_iter().take(self.data_shards) {
            plaintext.extend(slot.expect("reconstruct fills every data shard"));
        }
        plaintext.truncate(plaintext_len.min(plaintext.len()));
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_exactly_d_pieces() {
        let codec = PieceCodec::new(3, 2, 64).unwrap();
        let plaintext = b"hello reed-solomon world, this is a short message".to_vec();
        let shards = codec.encode(&plaintext).unwrap();
        assert_eq!(shards.len(), 5);

        let subset: Vec<(usize, Shard)> = shards
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| *idx % 2 == 0) // keep indices 0, 2, 4 (3 pieces)
            .collect();
        let recovered = codec.decode(subset, plaintext.len()).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn first_d_shards_equal_plaintext_shards_systematic() {
        let codec = PieceCodec::new(2, 1, 16).unwrap();
        let plaintext = vec![1u8; 32];
        let shards = codec.encode(&plaintext).unwrap();
        assert_eq!(&shards[0][..], &plaintext[0..16]);
        assert_eq!(&shards[1][..], &plaintext[16..32]);
    }

    #[test]
    fn decode_fails_with_too_few_pieces() {
        let codec = PieceCodec::new(4, 2, 16).unwrap();
        let plaintext = vec![9u8; 64];
        let shards = codec.encode(&plaintext).unwrap();
        let subset: Vec<(usize, Shard)> = shards.into_iter().enumerate().take(3).collect();
        assert!(codec.decode(subset, plaintext.len()).is_err());
    }

    #[test]
    fn pads_short_final_chunk() {
        let codec = PieceCodec::new(2, 1, 16).unwrap();
        let plaintext = vec![5u8; 10]; // shorter than one shard
        let shards = codec.encode(&plaintext).unwrap();
        let subset: Vec<(usize, Shard)> = shards.into_iter().enumerate().collect();
        let recovered = codec.decode(subset, plaintext.len()).unwrap();
        assert_eq!(recovered, plaintext);
    }
}
