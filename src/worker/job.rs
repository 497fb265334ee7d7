//! Job envelopes carried on a worker's queues. Workers hold no back
//! reference to the renter or file store (breaks the cyclic
//! dependency" note) - results are published on the reply channel embedded
//! in each job instead.

use crate::codec::Shard;
use crate::metadata::{HostPublicKey, Nickname};
use crossbeam_channel::Sender;
use std::sync::Arc;

pub struct PieceUploadResult {
    pub piece_index: usize,
    pub outcome: Result<[u8; 32], String>,
}

pub struct UploadJob {
    pub nickname: Nickname,
    pub chunk_index: usize,
    pub piece_index: usize,
    /// All coded shards of the chunk, shared across every upload job spawned
    /// for it so no shard is cloned per-job.
    pub shards: Arc<Vec<Shard>>,
    pub host: HostPublicKey,
    pub reply: Sender<PieceUploadResult>,
}

pub struct PieceDownloadResult {
    pub piece_index: usize,
    pub outcome: Result<Vec<u8>, String>,
}

pub struct DownloadJob {
    pub chunk_index: usize,
    pub piece_index: usize,
    pub root: [u8; 32],
    pub reply: Sender<PieceDownloadResult>,
}
