//! File metadata store: the single source of truth for tracked files, their
//! chunks, and per-chunk piece placements.

mod store;
mod types;

pub use store::{FileStore, StoreSnapshot};
pub use types::{
    Chunk, CodingParams, ContractId, FileEntry, HostPublicKey, MasterKey, Nickname,
    PiecePlacement, DEFAULT_PIECE_SIZE, MAX_TOTAL_SHARDS,
};
