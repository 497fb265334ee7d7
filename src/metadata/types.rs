//! Concrete data-model types:
//! pieces, chunks, files, contract/host identities.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

/// Default ciphertext piece size: 4 MiB.
pub const DEFAULT_PIECE_SIZE: usize = 4 * 1024 * 1024;

/// Hard upper bound on total pieces (data + parity) per chunk.
pub const MAX_TOTAL_SHARDS: usize = 30;

fn hex_of(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Unique, validated key for a tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nickname(String);

impl Nickname {
    pub fn new<S: Into<String>>(name: S) -> anyhow::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            anyhow::bail!("nickname must not be empty");
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Nickname {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque host identity (ed25519-shaped public key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPublicKey(pub [u8; 32]);

impl fmt::Display for HostPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex_of(&self.0))
    }
}

/// Canonical key for an active storage agreement; contract id, not host
/// address, is used everywhere a contract must be identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub [u8; 32]);

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex_of(&self.0))
    }
}

/// Master encryption key for a whole file; per-piece keys are derived from
/// this plus (chunk_index, piece_index), see `crate::codec::crypto`.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKey(pub [u8; 32]);

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Erasure coding parameters for a file: `data` plaintext shards plus
/// `parity` parity shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingParams {
    pub data: u8,
    pub parity: u8,
}

impl CodingParams {
    pub fn new(data: u8, parity: u8) -> anyhow::Result<Self> {
        if data == 0 {
            anyhow::bail!("data shard count must be > 0");
        }
        let total = data as usize + parity as usize;
        if total > MAX_TOTAL_SHARDS {
            anyhow::bail!(
                "total shards {} exceeds the maximum of {}",
                total,
                MAX_TOTAL_SHARDS
            );
        }
        Ok(Self { data, parity })
    }

    pub fn total(&self) -> usize {
        self.data as usize + self.parity as usize
    }
}

/// Where a single piece of a chunk currently lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiecePlacement {
    pub contract: ContractId,
    pub host: HostPublicKey,
    /// Merkle root of the ciphertext, used to fetch/verify the piece.
    pub root: [u8; 32],
}

/// A unit of erasure coding: one chunk's worth of placements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub offset: u64,
    pub length: u64,
    pub coding: CodingParams,
    /// piece index -> placement, holes mean "not yet placed".
    pub placements: std::collections::BTreeMap<usize, PiecePlacement>,
}

impl Chunk {
    pub fn new(index: usize, offset: u64, length: u64, coding: CodingParams) -> Self {
        Self {
            index,
            offset,
            length,
            coding,
            placements: Default::default(),
        }
    }

    pub fn placed(&self) -> usize {
        self.placements.len()
    }

    /// Count of placed pieces whose host is currently reachable, given a
    /// predicate supplied by the caller (the worker pool / contractor know
    /// reachability, not the metadata store itself).
    pub fn reachable_count(&self, is_reachable: impl Fn(ContractId) -> bool) -> usize {
        self.placements
            .values()
            .filter(|p| is_reachable(p.contract))
            .count()
    }

    /// health = reachable_placed / D
    pub fn health(&self, is_reachable: impl Fn(ContractId) -> bool) -> f64 {
        self.reachable_count(is_reachable) as f64 / self.coding.data as f64
    }

    pub fn missing_piece_indices(&self, is_reachable: impl Fn(ContractId) -> bool) -> Vec<usize> {
        (0..self.coding.total())
            .filter(|idx| match self.placements.get(idx) {
                Some(p) => !is_reachable(p.contract),
                None => true,
            })
            .collect()
    }
}

/// A tracked file: nickname, coding parameters, and the ordered chunk list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub nickname: Nickname,
    pub size: u64,
    pub master_key: MasterKey,
    pub coding: CodingParams,
    pub chunks: Vec<Chunk>,
    pub repair_path: Option<PathBuf>,
    pub tracked: bool,
}

impl FileEntry {
    pub fn chunk_plaintext_size(&self) -> u64 {
        self.coding.data as u64 * DEFAULT_PIECE_SIZE as u64
    }

    pub fn expected_chunk_count(&self) -> usize {
        let cps = self.chunk_plaintext_size();
        if self.size == 0 {
            return 1;
        }
        ((self.size + cps - 1) / cps) as usize
    }

    /// Returns (chunk_index, start_in_chunk, len_in_chunk) for every chunk
    /// that overlaps the half-open byte range `[offset, offset+length)`.
    pub fn chunk_range(&self, offset: u64, length: u64) -> Vec<(usize, u64, u64)> {
        if length == 0 {
            return Vec::new();
        }
        let cps = self.chunk_plaintext_size();
        let end = offset + length;
        let first = (offset / cps) as usize;
        let last = ((end - 1) / cps) as usize;
        let mut out = Vec::with_capacity(last - first + 1);
        for idx in first..=last {
            let chunk_start = idx as u64 * cps;
            let chunk_end = chunk_start + cps;
            let lo = offset.max(chunk_start) - chunk_start;
            let hi = end.min(chunk_end) - chunk_start;
            out.push((idx, lo, hi - lo));
        }
        out
    }
}
