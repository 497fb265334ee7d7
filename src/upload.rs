//! Chunk uploader: takes a repair task, reads plaintext,
//! erasure-codes and encrypts it, distributes pieces to selected workers,
//! tracks completion, and releases the memory debit when every piece send
//! has finished (success or permanent failure).

use crate::codec::{self, PieceCodec};
use crate::contractor::{Contractor, HostDb};
use crate::error::RenterError;
use crate::memory::MemoryManager;
use crate::metadata::{FileStore, HostPublicKey, Nickname, PiecePlacement};
use crate::worker::{PieceUploadResult, UploadJob, WorkerPool};
use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

/// A chunk that needs new pieces placed, emitted by the repair scanner.
pub struct RepairTask {
    pub nickname: Nickname,
    pub chunk_index: usize,
    /// Piece indices that are missing or placed on an unreachable host.
    pub missing_pieces: Vec<usize>,
    /// Ascending health, used by the scanner to prioritize the most
    /// degraded chunks first; not used by the uploader itself.
    pub health: f64,
}

pub struct ChunkUploader {
    file_store: Arc<FileStore>,
    worker_pool: Arc<WorkerPool>,
    host_db: Arc<dyn HostDb>,
    contractor: Arc<dyn Contractor>,
    memory: Arc<MemoryManager>,
}

/// Extra scratch space reserved on top of `N * piece_size` for the
/// in-flight coding buffers (input chunk, shard matrix).
const CODING_SCRATCH_FACTOR: f64 = 1.2;

impl ChunkUploader {
    pub fn new(
        file_store: Arc<FileStore>,
        worker_pool: Arc<WorkerPool>,
        host_db: Arc<dyn HostDb>,
        contractor: Arc<dyn Contractor>,
        memory: Arc<MemoryManager>,
    ) -> Self {
        Self {
            file_store,
            worker_pool,
            host_db,
            contractor,
            memory,
        }
    }

    pub fn memory_required(&self, total_pieces: usize, piece_size: usize) -> usize {
        ((total_pieces * piece_size) as f64 * CODING_SCRATCH_FACTOR) as usize
    }

    /// Ranks candidate hosts: lowest current worker queue depth first, then
    /// highest hostdb score.
    fn rank_hosts(
        &self,
        candidates: Vec<crate::contractor::HostEntry>,
        host_to_contract: &HashMap<HostPublicKey, crate::metadata::ContractId>,
    ) -> Vec<crate::contractor::HostEntry> {
        let mut ranked = candidates;
        ranked.sort_by(|a, b| {
            let qa = host_to_contract
                .get(&a.key)
                .and_then(|c| self.worker_pool.queue_depth(*c))
                .unwrap_or(usize::MAX);
            let qb = host_to_contract
                .get(&b.key)
                .and_then(|c| self.worker_pool.queue_depth(*c))
                .unwrap_or(usize::MAX);
            qa.cmp(&qb)
                .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
        });
        ranked
    }

    /// Admits and executes one repair task. Returns `Ok(placed_count)` on
    /// (partial or full) completion, or an error if the task must be
    /// rejected back to the scanner (insufficient hosts) or failed outright.
    pub fn upload_chunk(&self, task: RepairTask) -> Result<usize> {
        let file = self
            .file_store
            .get(task.nickname.as_str())
            .ok_or_else(|| RenterError::UnknownFile(task.nickname.clone()))?;

        let chunk = file
            .chunks
            .get(task.chunk_index)
            .context("chunk index out of range for file")?
            .clone();

        let repair_path = file
            .repair_path
            .as_ref()
            .ok_or_else(|| RenterError::NoLocalSource {
                nickname: task.nickname.clone(),
                chunk: task.chunk_index,
            })?;

        let piece_size = crate::metadata::DEFAULT_PIECE_SIZE;
        let total = chunk.coding.total();
        let memory_needed = self.memory_required(total, piece_size);
        let _permit = self.memory.acquire(memory_needed);

        // 1. Read plaintext for this chunk.
        let mut file_handle = File::open(repair_path)
            .with_context(|| format!("opening local source {:?}", repair_path))?;
        file_handle.seek(SeekFrom::Start(chunk.offset))?;
        let mut plaintext = vec![0u8; chunk.length as usize];
        file_handle
            .read_exact(&mut plaintext)
            .context("reading chunk plaintext from local source")?;

        // 2. Encode into N shards.
        let codec = PieceCodec::new(chunk.coding.data, chunk.coding.parity, piece_size)?;
        let shards = codec.encode(&plaintext)?;

        // 3. Encrypt each shard with its derived per-piece key.
        let ciphertext: Vec<Vec<u8>> = shards
            .iter()
            .enumerate()
            .map(|(idx, shard)| {
                codec::encrypt(shard, &file.master_key, task.chunk_index as u64, idx as u64)
            })
            .collect();
        let ciphertext = Arc::new(ciphertext);

        // 4. Select hosts for the missing pieces.
        let already_placed: Vec<_> = chunk.placements.values().map(|p| p.host).collect();
        let candidates = self
            .host_db
            .random_hosts(task.missing_pieces.len(), &already_placed);
        if candidates.len() < task.missing_pieces.len() {
            return Err(RenterError::InsufficientHosts {
                needed: task.missing_pieces.len(),
                found: candidates.len(),
            }
            .into());
        }

        let contracts = self.contractor.contracts();
        let host_to_contract: HashMap<HostPublicKey, crate::metadata::ContractId> =
            contracts.iter().map(|c| (c.host, c.id)).collect();
        let ranked = self.rank_hosts(candidates, &host_to_contract);

        let (reply_tx, reply_rx) = unbounded::<PieceUploadResult>();
        // piece_index -> (contract, host), so replies can be matched back
        // to the placement they belong to without round-tripping it
        // through the worker.
        let mut dispatch_info: HashMap<usize, (crate::metadata::ContractId, HostPublicKey)> =
            HashMap::new();

        for (piece_index, host) in task.missing_pieces.iter().zip(ranked.iter()) {
            let contract = match host_to_contract.get(&host.key) {
                Some(c) => *c,
                None => continue,
            };
            let job = UploadJob {
                nickname: task.nickname.clone(),
                chunk_index: task.chunk_index,
                piece_index: *piece_index,
                shards: Arc::clone(&ciphertext),
                host: host.key,
                reply: reply_tx.clone(),
            };
            if self.worker_pool.submit_upload(contract, job).is_ok() {
                dispatch_info.insert(*piece_index, (contract, host.key));
            }
        }
        drop(reply_tx);

        // 5/6. Wait for every dispatched job to complete; this thread holds
        // the memory permit until every reply has arrived, then updates
        // file metadata with whichever pieces actually succeeded.
        let mut placed = 0usize;
        for _ in 0..dispatch_info.len() {
            let result = match reply_rx.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            match result.outcome {
                Ok(root) => {
                    if let Some((contract, host)) = dispatch_info.get(&result.piece_index) {
                        let _ = self.file_store.record_piece_placement(
                            task.nickname.as_str(),
                            task.chunk_index,
                            result.piece_index,
                            PiecePlacement {
                                contract: *contract,
                                host: *host,
                                root,
                            },
                        );
                        placed += 1;
                    }
                }
                Err(msg) => {
                    log::warn!(
                        "piece {} of chunk {} ({}) left unplaced: {}",
                        result.piece_index,
                        task.chunk_index,
                        task.nickname,
                        msg
                    );
                }
            }
        }

        Ok(placed)
    }
}
