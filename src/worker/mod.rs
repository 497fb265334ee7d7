//! Worker pool: one thread per active contract, each
//! serializing I/O against that contract's host. The pool owns the map from
//! contract id to worker; each worker exclusively owns its own queues.

mod job;

pub use job::{DownloadJob, PieceDownloadResult, PieceUploadResult, UploadJob};

use crate::contractor::Contractor;
use crate::metadata::ContractId;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

enum WorkerJob {
    Upload(UploadJob),
    Download(DownloadJob),
}

/// Handle the pool keeps for a running worker. Dropping it does not stop
/// the thread; call `WorkerPool::remove` (or `shutdown`) for that.
pub struct WorkerHandle {
    contract: ContractId,
    upload_tx: Sender<UploadJob>,
    download_tx: Sender<DownloadJob>,
    terminate_tx: Sender<()>,
    queue_depth: Arc<AtomicUsize>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn contract(&self) -> ContractId {
        self.contract
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn submit_upload(&self, job: UploadJob) -> Result<(), UploadJob> {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
        self.upload_tx.send(job).map_err(|e| e.into_inner())
    }

    /// Single-slot download submission: if the slot is busy this blocks,
    /// matching "one download assignment slot" from the data model.
    pub fn submit_download(&self, job: DownloadJob) -> Result<(), DownloadJob> {
        self.download_tx.send(job).map_err(|e| e.into_inner())
    }

    fn request_stop(&self) {
        let _ = self.terminate_tx.try_send(());
    }

    fn join(mut self) {
        self.request_stop();
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    contract: ContractId,
    contractor: Arc<dyn Contractor>,
    upload_rx: Receiver<UploadJob>,
    download_rx: Receiver<DownloadJob>,
    terminate_rx: Receiver<()>,
    queue_depth: Arc<AtomicUsize>,
) {
    loop {
        // Download is latency-sensitive: check for one without blocking
        // before falling back to a fair select over everything.
        if let Ok(job) = download_rx.try_recv() {
            run_job(contract, &contractor, WorkerJob::Download(job), &queue_depth);
            continue;
        }

        select! {
            recv(download_rx) -> job => {
                if let Ok(job) = job {
                    run_job(contract, &contractor, WorkerJob::Download(job), &queue_depth);
                }
            }
            recv(upload_rx) -> job => {
                if let Ok(job) = job {
                    run_job(contract, &contractor, WorkerJob::Upload(job), &queue_depth);
                }
            }
            recv(terminate_rx) -> _ => {
                drain_and_fail(&upload_rx, &download_rx, &queue_depth);
                log::info!("worker for contract {} terminated", contract);
                return;
            }
        }
    }
}

fn drain_and_fail(
    upload_rx: &Receiver<UploadJob>,
    download_rx: &Receiver<DownloadJob>,
    queue_depth: &Arc<AtomicUsize>,
) {
    while let Ok(job) = upload_rx.try_recv() {
        queue_depth.fetch_sub(1, Ordering::Relaxed);
        let _ = job.reply.send(PieceUploadResult {
            piece_index: job.piece_index,
            outcome: Err("worker shutting down".to_string()),
        });
    }
    while let Ok(job) = download_rx.try_recv() {
        let _ = job.reply.send(PieceDownloadResult {
            piece_index: job.piece_index,
            outcome: Err("worker shutting down".to_string()),
        });
    }
}

fn run_job(
    contract: ContractId,
    contractor: &Arc<dyn Contractor>,
    job: WorkerJob,
    queue_depth: &Arc<AtomicUsize>,
) {
    // Decrement as soon as the job leaves the queue, not after it runs, so a
    // host that was offline or mid-termination never leaves a stale count
    // behind for `ChunkUploader::rank_hosts` to keep deprioritizing.
    if matches!(job, WorkerJob::Upload(_)) {
        queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    if contractor.is_offline(contract) {
        fail_job(job, "host is offline".to_string());
        return;
    }

    match job {
        WorkerJob::Upload(job) => {
            let piece_index = job.piece_index;
            let outcome = contractor
                .editor(contract)
                .and_then(|mut editor| editor.write_piece(&job.shards[piece_index]))
                .map_err(|e| e.to_string());
            if let Err(ref msg) = outcome {
                log::warn!(
                    "piece upload failed for contract {} piece {}: {}",
                    contract,
                    piece_index,
                    msg
                );
            }
            let _ = job.reply.send(PieceUploadResult { piece_index, outcome });
        }
        WorkerJob::Download(job) => {
            let piece_index = job.piece_index;
            let outcome = contractor
                .downloader(contract)
                .and_then(|mut downloader| downloader.read_piece(&job.root))
                .map_err(|e| e.to_string());
            if let Err(ref msg) = outcome {
                log::warn!(
                    "piece download failed for contract {} piece {}: {}",
                    contract,
                    piece_index,
                    msg
                );
            }
            let _ = job.reply.send(PieceDownloadResult { piece_index, outcome });
        }
    }
}

fn fail_job(job: WorkerJob, reason: String) {
    match job {
        WorkerJob::Upload(job) => {
            let _ = job.reply.send(PieceUploadResult {
                piece_index: job.piece_index,
                outcome: Err(reason),
            });
        }
        WorkerJob::Download(job) => {
            let _ = job.reply.send(PieceDownloadResult {
                piece_index: job.piece_index,
                outcome: Err(reason),
            });
        }
    }
}

/// Owns the map from contract id to worker, reconciling it against the
/// contractor's active contract set on each call to `reconcile`.
pub struct WorkerPool {
    contractor: Arc<dyn Contractor>,
    workers: RwLock<HashMap<ContractId, WorkerHandle>>,
}

impl WorkerPool {
    pub fn new(contractor: Arc<dyn Contractor>) -> Self {
        Self {
            contractor,
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Spawn a worker for each new contract id, terminate (and drain) one
    /// for each contract id that vanished from the active set.
    pub fn reconcile(&self) {
        let active: HashMap<ContractId, ()> = self
            .contractor
            .contracts()
            .into_iter()
            .map(|c| (c.id, ()))
            .collect();

        let mut workers = self.workers.write().expect("worker pool lock poisoned");

        let vanished: Vec<ContractId> = workers
            .keys()
            .filter(|id| !active.contains_key(id))
            .copied()
            .collect();
        for id in vanished {
            if let Some(handle) = workers.remove(&id) {
                handle.join();
            }
        }

        for id in active.keys() {
            if !workers.contains_key(id) {
                workers.insert(*id, self.spawn_worker(*id));
            }
        }
    }

    fn spawn_worker(&self, contract: ContractId) -> WorkerHandle {
        let (upload_tx, upload_rx) = unbounded();
        let (download_tx, download_rx) = bounded(1);
        let (terminate_tx, terminate_rx) = bounded(1);
        let queue_depth = Arc::new(AtomicUsize::new(0));
        let queue_depth_thread = Arc::clone(&queue_depth);
        let contractor = Arc::clone(&self.contractor);

        let join = std::thread::Builder::new()
            .name(format!("sia-worker-{}", contract))
            .spawn(move || {
                worker_loop(
                    contract,
                    contractor,
                    upload_rx,
                    download_rx,
                    terminate_rx,
                    queue_depth_thread,
                )
            })
            .expect("failed to spawn worker thread");

        log::info!("spawned worker for contract {}", contract);

        WorkerHandle {
            contract,
            upload_tx,
            download_tx,
            terminate_tx,
            queue_depth,
            join: Some(join),
        }
    }

    pub fn queue_depth(&self, contract: ContractId) -> Option<usize> {
        self.workers
            .read()
            .expect("worker pool lock poisoned")
            .get(&contract)
            .map(|w| w.queue_depth())
    }

    pub fn submit_upload(&self, contract: ContractId, job: UploadJob) -> Result<(), UploadJob> {
        let workers = self.workers.read().expect("worker pool lock poisoned");
        match workers.get(&contract) {
            Some(handle) => handle.submit_upload(job),
            None => Err(job),
        }
    }

    pub fn submit_download(&self, contract: ContractId, job: DownloadJob) -> Result<(), DownloadJob> {
        let workers = self.workers.read().expect("worker pool lock poisoned");
        match workers.get(&contract) {
            Some(handle) => handle.submit_download(job),
            None => Err(job),
        }
    }

    /// Signals every worker to stop, draining (and failing) its pending
    /// jobs, and waits for all threads to join.
    pub fn shutdown(&self) {
        let mut workers = self.workers.write().expect("worker pool lock poisoned");
        for (_, handle) in workers.drain() {
            handle.join();
        }
    }
}
