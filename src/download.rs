//! Download scheduler: decomposes a download request into
//! per-chunk fetch plans, dispatches piece reads to workers, reconstructs
//! plaintext, and writes it to the sink strictly in file order even though
//! chunks and pieces complete out of order.

use crate::codec::{self, PieceCodec};
use crate::contractor::Contractor;
use crate::error::RenterError;
use crate::memory::MemoryManager;
use crate::metadata::{Chunk, FileEntry, FileStore};
use crate::worker::{DownloadJob, PieceDownloadResult, WorkerPool};
use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Bytes of plaintext, tagged with the chunk it came from and the
/// sub-range of that chunk actually requested by the caller.
struct ChunkResult {
    chunk_index: usize,
    data: Vec<u8>,
}

pub struct DownloadHandle {
    progress_bytes: Arc<AtomicU64>,
    total_bytes: u64,
    cancel: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<Result<(), String>>>>,
}

impl DownloadHandle {
    pub fn progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.progress_bytes.load(Ordering::Relaxed) as f64 / self.total_bytes as f64
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Blocks until the download finishes (success or error).
    pub fn wait(&self) -> Result<()> {
        let mut guard = self.join.lock().expect("download handle lock poisoned");
        match guard.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("download worker thread panicked"))?
                .map_err(|e| anyhow::anyhow!(e)),
            None => Ok(()),
        }
    }
}

pub struct DownloadScheduler {
    file_store: Arc<FileStore>,
    worker_pool: Arc<WorkerPool>,
    contractor: Arc<dyn Contractor>,
    memory: Arc<MemoryManager>,
}

impl DownloadScheduler {
    pub fn new(
        file_store: Arc<FileStore>,
        worker_pool: Arc<WorkerPool>,
        contractor: Arc<dyn Contractor>,
        memory: Arc<MemoryManager>,
    ) -> Self {
        Self {
            file_store,
            worker_pool,
            contractor,
            memory,
        }
    }

    pub fn download(
        self: &Arc<Self>,
        nickname: &str,
        offset: u64,
        length: u64,
        mut sink: Box<dyn Write + Send>,
    ) -> Result<DownloadHandle> {
        let file = self
            .file_store
            .get(nickname)
            .ok_or_else(|| RenterError::UnknownFile(crate::metadata::Nickname::new(nickname.to_string())?))?;

        let ranges = file.chunk_range(offset, length);
        let progress_bytes = Arc::new(AtomicU64::new(0));
        let cancel = Arc::new(AtomicBool::new(false));

        let scheduler = Arc::clone(self);
        let progress_for_thread = Arc::clone(&progress_bytes);
        let cancel_for_thread = Arc::clone(&cancel);

        let join = std::thread::Builder::new()
            .name(format!("sia-download-{}", nickname))
            .spawn(move || -> Result<(), String> {
                scheduler
                    .run(file, ranges, &mut sink, progress_for_thread, cancel_for_thread)
                    .map_err(|e| e.to_string())
            })
            .map_err(|e| anyhow::anyhow!("failed to spawn download thread: {}", e))?;

        Ok(DownloadHandle {
            progress_bytes,
            total_bytes: length,
            cancel,
            join: Mutex::new(Some(join)),
        })
    }

    fn run(
        &self,
        file: FileEntry,
        ranges: Vec<(usize, u64, u64)>,
        sink: &mut Box<dyn Write + Send>,
        progress: Arc<AtomicU64>,
        cancel: Arc<AtomicBool>,
    ) -> Result<()> {
        let piece_size = crate::metadata::DEFAULT_PIECE_SIZE;
        let codec = PieceCodec::new(file.coding.data, file.coding.parity, piece_size)?;

        let (result_tx, result_rx) = unbounded::<ChunkResult>();

        // Dispatch every chunk fetch up front; the memory manager's FIFO
        // acquire naturally throttles how many run concurrently.
        let mut handles = Vec::with_capacity(ranges.len());
        for &(chunk_index, lo, len) in &ranges {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let chunk = file
                .chunks
                .get(chunk_index)
                .context("chunk index out of range")?
                .clone();
            let tx = result_tx.clone();
            let cancel = Arc::clone(&cancel);
            let handle = self.spawn_chunk_fetch(
                chunk,
                file.master_key,
                &codec,
                lo,
                lo + len,
                tx,
                cancel,
            )?;
            handles.push(handle);
        }
        drop(result_tx);

        // Reorder buffer: chunk fetches complete out of order, but bytes
        // must reach the sink in ascending chunk order.
        let mut pending: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
        let expected_order: Vec<usize> = ranges.iter().map(|(idx, _, _)| *idx).collect();
        let mut order_pos = 0usize;

        for result in &result_rx {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            pending.insert(result.chunk_index, result.data);
            while order_pos < expected_order.len()
                && pending.contains_key(&expected_order[order_pos])
            {
                let idx = expected_order[order_pos];
                let data = pending.remove(&idx).unwrap();
                sink.write_all(&data).context("writing to download sink")?;
                progress.fetch_add(data.len() as u64, Ordering::Relaxed);
                order_pos += 1;
            }
        }

        for handle in handles {
            let _ = handle.join();
        }

        if cancel.load(Ordering::Relaxed) {
            return Err(RenterError::ShuttingDown.into());
        }
        if order_pos != expected_order.len() {
            anyhow::bail!("download aborted before all chunks were reconstructed");
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_chunk_fetch(
        &self,
        chunk: Chunk,
        master_key: crate::metadata::MasterKey,
        codec: &PieceCodec,
        range_lo: u64,
        range_hi: u64,
        result_tx: crossbeam_channel::Sender<ChunkResult>,
        cancel: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>> {
        let data_needed = chunk.coding.data as usize;
        let piece_size = codec.piece_size();
        let memory_needed = (data_needed + 1) * piece_size; // D piece buffers + reconstruction buffer
        let memory = Arc::clone(&self.memory);
        let worker_pool = Arc::clone(&self.worker_pool);
        let contractor = Arc::clone(&self.contractor);
        let codec_data = chunk.coding.data;
        let codec_parity = chunk.coding.parity;
        let chunk_index = chunk.index;
        let plaintext_len = chunk.length as usize;

        let handle = std::thread::Builder::new()
            .name(format!("sia-download-chunk-{}", chunk_index))
            .spawn(move || {
                let _permit = memory.acquire(memory_needed);
                if cancel.load(Ordering::Relaxed) {
                    return;
                }

                let codec = match PieceCodec::new(codec_data, codec_parity, piece_size) {
                    Ok(c) => c,
                    Err(_) => return,
                };

                match Self::fetch_and_reconstruct(
                    &chunk,
                    &master_key,
                    &codec,
                    &worker_pool,
                    &contractor,
                    data_needed,
                    plaintext_len,
                    &cancel,
                ) {
                    Ok(plaintext) => {
                        let lo = (range_lo as usize).min(plaintext.len());
                        let hi = (range_hi as usize).min(plaintext.len());
                        let _ = result_tx.send(ChunkResult {
                            chunk_index,
                            data: plaintext[lo..hi].to_vec(),
                        });
                    }
                    Err(err) => {
                        log::warn!("chunk {} download failed: {}", chunk_index, err);
                    }
                }
            })
            .context("failed to spawn chunk download thread")?;

        Ok(handle)
    }

    #[allow(clippy::too_many_arguments)]
    fn fetch_and_reconstruct(
        chunk: &Chunk,
        master_key: &crate::metadata::MasterKey,
        codec: &PieceCodec,
        worker_pool: &Arc<WorkerPool>,
        contractor: &Arc<dyn Contractor>,
        data_needed: usize,
        plaintext_len: usize,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<u8>> {
        // Candidate placements whose contract's worker is alive, most
        // recently placed first is irrelevant - any D will do.
        let mut candidates: Vec<(usize, crate::metadata::PiecePlacement)> = chunk
            .placements
            .iter()
            .filter(|(_, p)| !contractor.is_offline(p.contract))
            .map(|(idx, p)| (*idx, p.clone()))
            .collect();

        if candidates.len() < data_needed {
            return Err(RenterError::InsufficientRedundancy {
                needed: data_needed,
                have: candidates.len(),
            }
            .into());
        }

        let (reply_tx, reply_rx) = unbounded::<PieceDownloadResult>();
        let mut in_flight = 0usize;
        let mut dispatched_for: BTreeMap<usize, crate::metadata::PiecePlacement> = BTreeMap::new();

        let mut dispatch_one =
            |candidates: &mut Vec<(usize, crate::metadata::PiecePlacement)>,
             dispatched_for: &mut BTreeMap<usize, crate::metadata::PiecePlacement>,
             in_flight: &mut usize| {
                while let Some((piece_index, placement)) = candidates.pop() {
                    let job = DownloadJob {
                        chunk_index: chunk.index,
                        piece_index,
                        root: placement.root,
                        reply: reply_tx.clone(),
                    };
                    if worker_pool.submit_download(placement.contract, job).is_ok() {
                        dispatched_for.insert(piece_index, placement);
                        *in_flight += 1;
                        return true;
                    }
                }
                false
            };

        for _ in 0..data_needed {
            if !dispatch_one(&mut candidates, &mut dispatched_for, &mut in_flight) {
                break;
            }
        }

        let mut collected: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
        while collected.len() < data_needed && in_flight > 0 {
            if cancel.load(Ordering::Relaxed) {
                anyhow::bail!(RenterError::ShuttingDown);
            }
            let reply = match reply_rx.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            in_flight -= 1;
            match reply.outcome {
                Ok(ciphertext) => {
                    let plaintext_shard = codec::decrypt(
                        &ciphertext,
                        master_key,
                        chunk.index as u64,
                        reply.piece_index as u64,
                    );
                    collected.insert(reply.piece_index, plaintext_shard);
                }
                Err(msg) => {
                    log::warn!(
                        "piece {} of chunk {} failed, trying a replacement: {}",
                        reply.piece_index,
                        chunk.index,
                        msg
                    );
                    // Opportunistically dispatch a replacement from another
                    // placement.
                    dispatch_one(&mut candidates, &mut dispatched_for, &mut in_flight);
                }
            }
        }

        if collected.len() < data_needed {
            return Err(RenterError::InsufficientRedundancy {
                needed: data_needed,
                have: collected.len(),
            }
            .into());
        }

        let pieces: Vec<(usize, Vec<u8>)> = collected.into_iter().collect();
        codec.decode(pieces, plaintext_len)
    }
}
