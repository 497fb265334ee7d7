//! Renter upload/download core: turns a local file into redundant encrypted
//! pieces distributed across untrusted hosts under storage contracts, and
//! reassembles those pieces on retrieval.
//!
//! This crate depends only on the capability traits in [`contractor`] for
//! its collaborators (host database, contract negotiation, consensus
//! subscription, fee estimation) - never on a concrete implementation, so
//! the whole core can run against deterministic stubs in tests.

pub mod codec;
pub mod config;
pub mod contractor;
pub mod download;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod persist;
pub mod repair;
mod share;
pub mod tools;
pub mod upload;
pub mod worker;

pub use share::{share_in, share_out};

use config::RenterConfig;
use contractor::{ConsensusEvent, ConsensusSubscriber, Contractor, FeeEstimator, HostDb};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use download::DownloadScheduler;
use error::RenterResult;
use memory::MemoryManager;
use metadata::{CodingParams, FileEntry, FileStore, MasterKey, Nickname};
use repair::RepairScanner;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use upload::ChunkUploader;
use worker::WorkerPool;

/// Funds and duration the renter is willing to spend.
pub use config::Allowance;

/// Fixed redundancy multiplier price estimation applies to storage/upload
/// costs. Kept hard-coded rather than derived from the allowance; see
/// DESIGN.md.
pub const REDUNDANCY_FACTOR: f64 = 3.0;

const BYTES_PER_TB: f64 = 1_000_000_000_000.0;

/// Snapshot of one file's health, returned by [`Renter::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub nickname: Nickname,
    pub size: u64,
    /// Lowest chunk redundancy (reachable_placed / D) across the file;
    /// 0.0 for a file with no chunks placed yet.
    pub redundancy: f64,
    /// Ciphertext bytes actually placed on hosts so far.
    pub uploaded_bytes: u64,
}

/// Cached result of [`Renter::price_estimation`], invalidated on the next
/// consensus-change notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEstimation {
    pub form_contracts: f64,
    pub download_tb: f64,
    pub storage_tb_month: f64,
    pub upload_tb: f64,
}

/// The renter core. Owns the file metadata store, the memory budget, the
/// worker pool, and the background repair/persistence loops; depends on its
/// collaborators only through the capability traits in [`contractor`].
pub struct Renter {
    config: Mutex<RenterConfig>,
    file_store: Arc<FileStore>,
    memory: Arc<MemoryManager>,
    worker_pool: Arc<WorkerPool>,
    uploader: Arc<ChunkUploader>,
    download_scheduler: Arc<DownloadScheduler>,
    scanner: Arc<RepairScanner>,
    host_db: Arc<dyn HostDb>,
    contractor: Arc<dyn Contractor>,
    fee_estimator: Arc<dyn FeeEstimator>,
    price_cache: Mutex<Option<PriceEstimation>>,
    persist_path: PathBuf,
    /// Background loops plus the sender that tells each one to stop. The
    /// scanner has its own internal stop channel (`RepairScanner::request_stop`)
    /// driven separately in `close`, so only the consensus reactor and
    /// persistence loop need an entry here.
    stoppable_threads: Mutex<Vec<(&'static str, Sender<()>, JoinHandle<()>)>>,
    scanner_thread: Mutex<Option<JoinHandle<()>>>,
    closed: Mutex<bool>,
}

impl Renter {
    /// Builds a renter and starts its background loops (repair scanner,
    /// consensus reactor, periodic persistence). Loads an existing snapshot
    /// from `config.persist_dir` if one is present.
    pub fn new(
        config: RenterConfig,
        host_db: Arc<dyn HostDb>,
        contractor: Arc<dyn Contractor>,
        fee_estimator: Arc<dyn FeeEstimator>,
        consensus: Arc<dyn ConsensusSubscriber>,
    ) -> anyhow::Result<Arc<Self>> {
        let file_store = Arc::new(FileStore::new());
        let persist_path = config.persist_dir.join("renter.json");
        if persist_path.exists() {
            let snapshot = persist::load(&persist_path)?;
            file_store.restore(snapshot);
            log::info!("loaded renter state from {:?}", persist_path);
        }

        let memory = MemoryManager::new(config.base_memory);
        let worker_pool = Arc::new(WorkerPool::new(Arc::clone(&contractor)));
        worker_pool.reconcile();

        let uploader = Arc::new(ChunkUploader::new(
            Arc::clone(&file_store),
            Arc::clone(&worker_pool),
            Arc::clone(&host_db),
            Arc::clone(&contractor),
            Arc::clone(&memory),
        ));
        let download_scheduler = Arc::new(DownloadScheduler::new(
            Arc::clone(&file_store),
            Arc::clone(&worker_pool),
            Arc::clone(&contractor),
            Arc::clone(&memory),
        ));
        let scanner = Arc::new(RepairScanner::new(
            Arc::clone(&file_store),
            Arc::clone(&contractor),
            Arc::clone(&uploader),
            config.scan_interval,
        ));

        let renter = Arc::new(Self {
            config: Mutex::new(config),
            file_store,
            memory,
            worker_pool,
            uploader,
            download_scheduler,
            scanner,
            host_db,
            contractor,
            fee_estimator,
            price_cache: Mutex::new(None),
            persist_path,
            stoppable_threads: Mutex::new(Vec::new()),
            scanner_thread: Mutex::new(None),
            closed: Mutex::new(false),
        });

        renter.spawn_scanner_thread(consensus.subscribe());
        renter.spawn_consensus_reactor(consensus.subscribe());
        renter.spawn_persist_thread();

        Ok(renter)
    }

    /// The scanner owns its own stop channel (`request_stop`/`run`), so this
    /// thread just needs to be joined on shutdown, not separately signalled.
    fn spawn_scanner_thread(self: &Arc<Self>, consensus_rx: Receiver<ConsensusEvent>) {
        let scanner = Arc::clone(&self.scanner);
        let handle = std::thread::Builder::new()
            .name("sia-repair-scanner".into())
            .spawn(move || scanner.run(consensus_rx))
            .expect("failed to spawn repair scanner thread");
        *self.scanner_thread.lock().expect("renter scanner-thread lock poisoned") = Some(handle);
    }

    /// Invalidates the cached price estimate and re-reconciles the worker
    /// pool whenever the consensus set changes.
    fn spawn_consensus_reactor(self: &Arc<Self>, consensus_rx: Receiver<ConsensusEvent>) {
        let (stop_tx, stop_rx) = bounded(1);
        let renter = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("sia-consensus-reactor".into())
            .spawn(move || loop {
                select! {
                    recv(consensus_rx) -> event => {
                        if let Ok(event) = event {
                            log::debug!("consensus event {:?}: invalidating price cache", event);
                            *renter.price_cache.lock().expect("price cache lock poisoned") = None;
                            renter.worker_pool.reconcile();
                        } else {
                            return;
                        }
                    }
                    recv(stop_rx) -> _ => return,
                }
            })
            .expect("failed to spawn consensus reactor thread");
        self.stoppable_threads
            .lock()
            .expect("renter thread list lock poisoned")
            .push(("consensus-reactor", stop_tx, handle));
    }

    fn spawn_persist_thread(self: &Arc<Self>) {
        let (stop_tx, stop_rx) = bounded(1);
        let renter = Arc::clone(self);
        let interval = renter
            .config
            .lock()
            .expect("renter config lock poisoned")
            .persist_interval;
        let handle = std::thread::Builder::new()
            .name("sia-persist".into())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if let Err(err) = renter.flush() {
                                log::error!("periodic persistence failed: {}", err);
                            }
                        }
                        recv(stop_rx) -> _ => return,
                    }
                }
            })
            .expect("failed to spawn persistence thread");
        self.stoppable_threads
            .lock()
            .expect("renter thread list lock poisoned")
            .push(("persist", stop_tx, handle));
    }

    /// Writes the current file store snapshot to `persist_dir/renter.json`.
    fn flush(&self) -> anyhow::Result<()> {
        persist::save(&self.persist_path, &self.file_store.snapshot())
    }

    /// Registers a new tracked file and leaves placement to the repair
    /// scanner, which picks up the freshly added (0% healthy) chunks on its
    /// next pass - the same control flow as any other degraded file (design
    /// doc §2 control-flow summary).
    pub fn upload(
        &self,
        source_path: impl AsRef<Path>,
        nickname: &str,
        data: u8,
        parity: u8,
    ) -> anyhow::Result<()> {
        let source_path = source_path.as_ref();
        let size = std::fs::metadata(source_path)
            .map(|m| m.len())
            .unwrap_or_else(|_| {
                log::warn!("could not stat {:?}, assuming empty file", source_path);
                0
            });

        let coding = CodingParams::new(data, parity)?;
        let nickname = Nickname::new(nickname.to_string())?;

        let mut entry = FileEntry {
            nickname: nickname.clone(),
            size,
            master_key: MasterKey(rand::random()),
            coding,
            chunks: Vec::new(),
            repair_path: Some(source_path.to_path_buf()),
            tracked: true,
        };

        let chunk_plaintext_size = entry.chunk_plaintext_size();
        let chunk_count = entry.expected_chunk_count();
        entry.chunks = (0..chunk_count)
            .map(|idx| {
                let offset = idx as u64 * chunk_plaintext_size;
                let length = chunk_plaintext_size.min(size - offset);
                metadata::Chunk::new(idx, offset, length, coding)
            })
            .collect();

        self.file_store.add_file(entry)?;
        Ok(())
    }

    pub fn delete(&self, nickname: &str) -> RenterResult<()> {
        self.file_store.delete(nickname)?;
        Ok(())
    }

    pub fn rename(&self, old: &str, new: &str) -> anyhow::Result<()> {
        let new = Nickname::new(new.to_string())?;
        self.file_store.rename(old, new)?;
        Ok(())
    }

    pub fn list(&self) -> Vec<FileInfo> {
        let piece_size = metadata::DEFAULT_PIECE_SIZE as u64;
        self.file_store
            .list()
            .into_iter()
            .map(|file| {
                let is_offline = |c| self.contractor.is_offline(c);
                let redundancy = file
                    .chunks
                    .iter()
                    .map(|c| c.health(is_offline_inverted(&is_offline)))
                    .fold(f64::INFINITY, f64::min);
                let redundancy = if redundancy.is_finite() { redundancy } else { 0.0 };
                let uploaded_bytes = file
                    .chunks
                    .iter()
                    .map(|c| c.placed() as u64 * piece_size)
                    .sum();
                FileInfo {
                    nickname: file.nickname,
                    size: file.size,
                    redundancy,
                    uploaded_bytes,
                }
            })
            .collect()
    }

    /// Decomposes the request into per-chunk fetches, dispatches piece reads
    /// to workers, reconstructs plaintext, and writes it to `sink` in
    /// strict file order.
    pub fn download(
        self: &Arc<Self>,
        nickname: &str,
        offset: u64,
        length: u64,
        sink: Box<dyn std::io::Write + Send>,
    ) -> anyhow::Result<download::DownloadHandle> {
        self.download_scheduler.download(nickname, offset, length, sink)
    }

    pub fn share_out(&self, nicknames: &[Nickname]) -> anyhow::Result<Vec<u8>> {
        share::share_out(&self.file_store, nicknames)
    }

    pub fn share_in(&self, blob: &[u8]) -> anyhow::Result<Vec<Nickname>> {
        share::share_in(&self.file_store, blob)
    }

    pub fn set_settings(&self, allowance: Allowance) {
        self.config.lock().expect("renter config lock poisoned").allowance = allowance;
    }

    /// Runs one repair pass immediately instead of waiting for the
    /// scanner's next scheduled wake-up. Exposed mainly for deterministic
    /// tests; the background scanner thread calls the same method.
    pub fn repair_once(&self) {
        self.scanner.scan_once();
    }

    /// Averages per-host prices over `price_estimation_scope` hosts,
    /// converts to per-TB units, applies the fixed redundancy factor, and
    /// adds the transaction fee for forming the first contract. Cached
    /// until the next consensus-change notification.
    pub fn price_estimation(&self) -> PriceEstimation {
        let mut cache = self.price_cache.lock().expect("price cache lock poisoned");
        if let Some(cached) = *cache {
            return cached;
        }

        let scope = self
            .config
            .lock()
            .expect("renter config lock poisoned")
            .price_estimation_scope;
        let hosts = self.host_db.random_hosts(scope, &[]);
        let n = hosts.len().max(1) as f64;
        let avg_storage = hosts.iter().map(|h| h.storage_price_per_tb_month).sum::<f64>() / n;
        let avg_upload = hosts.iter().map(|h| h.upload_price_per_tb).sum::<f64>() / n;
        let avg_download = hosts.iter().map(|h| h.download_price_per_tb).sum::<f64>() / n;

        let fee = self.fee_estimator.fee_estimation();
        let form_contracts = fee.min_per_byte * BYTES_PER_TB;

        let estimate = PriceEstimation {
            form_contracts,
            download_tb: avg_download,
            storage_tb_month: avg_storage * REDUNDANCY_FACTOR,
            upload_tb: avg_upload * REDUNDANCY_FACTOR,
        };
        *cache = Some(estimate);
        estimate
    }

    /// Idempotent shutdown: stops every background loop, drains the worker
    /// pool, flushes metadata, and returns only once everything has joined
    /// joined.
    pub fn close(&self) {
        let mut closed = self.closed.lock().expect("renter closed-flag lock poisoned");
        if *closed {
            return;
        }
        *closed = true;

        self.scanner.request_stop();
        if let Some(handle) = self.scanner_thread.lock().expect("renter scanner-thread lock poisoned").take() {
            if handle.join().is_err() {
                log::error!("repair scanner thread panicked during shutdown");
            }
        }

        let handles = std::mem::take(
            &mut *self
                .stoppable_threads
                .lock()
                .expect("renter thread list lock poisoned"),
        );
        for (name, stop_tx, handle) in handles {
            log::debug!("signalling {} to stop", name);
            let _ = stop_tx.send(());
            if handle.join().is_err() {
                log::error!("{} thread panicked during shutdown", name);
            }
        }

        self.worker_pool.shutdown();

        if let Err(err) = self.flush() {
            log::error!("failed to flush renter state on shutdown: {}", err);
        }
    }
}

/// `Chunk::health`/`reachable_count` take an "is reachable" predicate; the
/// contractor trait exposes "is offline" instead, so this inverts it once
/// here rather than at every call site.
fn is_offline_inverted<'a>(is_offline: &'a impl Fn(metadata::ContractId) -> bool) -> impl Fn(metadata::ContractId) -> bool + 'a {
    move |c| !is_offline(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contractor::{
        ConsensusEvent, ContractInfo, Downloader, Editor, FeeEstimate, HostEntry,
    };
    use crate::metadata::HostPublicKey;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct StubDownloader {
        pieces: Arc<StdMutex<HashMap<[u8; 32], Vec<u8>>>>,
    }
    impl Downloader for StubDownloader {
        fn read_piece(&mut self, root: &[u8; 32]) -> anyhow::Result<Vec<u8>> {
            self.pieces
                .lock()
                .unwrap()
                .get(root)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("piece not found"))
        }
    }

    // Record write_piece outcomes into the shared map so downloads can read
    // them back; a slightly richer stub than StubEditor used standalone.
    struct RecordingEditor {
        host: HostPublicKey,
        pieces: Arc<StdMutex<HashMap<[u8; 32], Vec<u8>>>>,
    }
    impl Editor for RecordingEditor {
        fn write_piece(&mut self, data: &[u8]) -> anyhow::Result<[u8; 32]> {
            let mut hasher = blake2::Blake2b::<blake2::digest::consts::U32>::new_with_prefix(
                self.host.0,
            );
            use blake2::Digest;
            hasher.update(data);
            let digest = hasher.finalize();
            let mut root = [0u8; 32];
            root.copy_from_slice(&digest);
            self.pieces.lock().unwrap().insert(root, data.to_vec());
            Ok(root)
        }
    }

    struct RecordingContractor {
        contracts: Vec<ContractInfo>,
        offline: StdMutex<Vec<metadata::ContractId>>,
        pieces: Arc<StdMutex<HashMap<[u8; 32], Vec<u8>>>>,
    }

    impl Contractor for RecordingContractor {
        fn contracts(&self) -> Vec<ContractInfo> {
            self.contracts.clone()
        }
        fn contract_by_id(&self, id: metadata::ContractId) -> Option<ContractInfo> {
            self.contracts.iter().find(|c| c.id == id).copied()
        }
        fn is_offline(&self, id: metadata::ContractId) -> bool {
            self.offline.lock().unwrap().contains(&id)
        }
        fn editor(&self, id: metadata::ContractId) -> anyhow::Result<Box<dyn Editor>> {
            let host = self.contracts.iter().find(|c| c.id == id).unwrap().host;
            Ok(Box::new(RecordingEditor {
                host,
                pieces: Arc::clone(&self.pieces),
            }))
        }
        fn downloader(&self, _id: metadata::ContractId) -> anyhow::Result<Box<dyn Downloader>> {
            Ok(Box::new(StubDownloader {
                pieces: Arc::clone(&self.pieces),
            }))
        }
        fn resolve_id(&self, id: metadata::ContractId) -> metadata::ContractId {
            id
        }
    }

    struct StubHostDb {
        hosts: Vec<HostEntry>,
    }
    impl HostDb for StubHostDb {
        fn random_hosts(&self, n: usize, exclude: &[HostPublicKey]) -> Vec<HostEntry> {
            self.hosts
                .iter()
                .filter(|h| !exclude.contains(&h.key))
                .take(n)
                .cloned()
                .collect()
        }
        fn host(&self, key: &HostPublicKey) -> Option<HostEntry> {
            self.hosts.iter().find(|h| &h.key == key).cloned()
        }
    }

    struct StubFeeEstimator;
    impl FeeEstimator for StubFeeEstimator {
        fn fee_estimation(&self) -> FeeEstimate {
            FeeEstimate {
                min_per_byte: 1e-9,
                max_per_byte: 2e-9,
            }
        }
    }

    struct StubConsensus {
        senders: StdMutex<Vec<Sender<ConsensusEvent>>>,
    }
    impl StubConsensus {
        fn new() -> Self {
            Self {
                senders: StdMutex::new(Vec::new()),
            }
        }
        fn emit(&self, event: ConsensusEvent) {
            for tx in self.senders.lock().unwrap().iter() {
                let _ = tx.send(event);
            }
        }
    }
    impl ConsensusSubscriber for StubConsensus {
        fn subscribe(&self) -> Receiver<ConsensusEvent> {
            let (tx, rx) = crossbeam_channel::unbounded();
            self.senders.lock().unwrap().push(tx);
            rx
        }
    }

    fn host(id: u8) -> HostEntry {
        HostEntry {
            key: HostPublicKey([id; 32]),
            score: 1.0,
            storage_price_per_tb_month: 1000.0,
            upload_price_per_tb: 500.0,
            download_price_per_tb: 2000.0,
        }
    }

    fn contract(id: u8, host_key: HostPublicKey) -> ContractInfo {
        ContractInfo {
            id: metadata::ContractId([id; 32]),
            host: host_key,
            end_height: 1_000_000,
            funds_remaining: 1_000_000,
        }
    }

    fn build_renter(
        num_hosts: u8,
    ) -> (
        Arc<Renter>,
        Arc<RecordingContractor>,
        Arc<StdMutex<HashMap<[u8; 32], Vec<u8>>>>,
        tempfile::TempDir,
    ) {
        let pieces = Arc::new(StdMutex::new(HashMap::new()));
        let hosts: Vec<HostEntry> = (1..=num_hosts).map(host).collect();
        let contracts: Vec<ContractInfo> = hosts.iter().map(|h| contract(h.key.0[0], h.key)).collect();

        let host_db: Arc<dyn HostDb> = Arc::new(StubHostDb { hosts });
        let contractor = Arc::new(RecordingContractor {
            contracts,
            offline: StdMutex::new(Vec::new()),
            pieces: Arc::clone(&pieces),
        });
        let fee_estimator: Arc<dyn FeeEstimator> = Arc::new(StubFeeEstimator);
        let consensus: Arc<dyn ConsensusSubscriber> = Arc::new(StubConsensus::new());

        let dir = tempfile::tempdir().unwrap();
        let mut config = RenterConfig::default();
        config.persist_dir = dir.path().to_path_buf();
        config.scan_interval = std::time::Duration::from_secs(3600);
        config.persist_interval = std::time::Duration::from_secs(3600);
        config.base_memory = 64 * 1024 * 1024;

        let renter = Renter::new(
            config,
            host_db,
            Arc::clone(&contractor) as Arc<dyn Contractor>,
            fee_estimator,
            consensus,
        )
        .unwrap();
        (renter, contractor, pieces, dir)
    }

    /// A `Write` sink backed by a shared buffer, so the test can inspect
    /// what the download scheduler wrote after `handle.wait()` returns.
    struct CollectingSink(Arc<StdMutex<Vec<u8>>>);
    impl std::io::Write for CollectingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn single_chunk_upload_then_full_download() {
        let (renter, _contractor, _pieces, data_dir) = build_renter(3);

        let source = data_dir.path().join("source.bin");
        let plaintext: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &plaintext).unwrap();

        renter.upload(&source, "photos", 2, 1).unwrap();
        renter.repair_once();

        let buf = Arc::new(StdMutex::new(Vec::new()));
        let handle = renter
            .download(
                "photos",
                0,
                plaintext.len() as u64,
                Box::new(CollectingSink(Arc::clone(&buf))),
            )
            .unwrap();
        handle.wait().unwrap();

        assert_eq!(*buf.lock().unwrap(), plaintext);
    }

    #[test]
    fn partial_range_download_returns_correct_slice() {
        let (renter, _contractor, _pieces, data_dir) = build_renter(3);

        let source = data_dir.path().join("source.bin");
        let plaintext: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &plaintext).unwrap();

        renter.upload(&source, "photos", 2, 1).unwrap();
        renter.repair_once();

        let buf = Arc::new(StdMutex::new(Vec::new()));
        let handle = renter
            .download(
                "photos",
                100,
                200,
                Box::new(CollectingSink(Arc::clone(&buf))),
            )
            .unwrap();
        handle.wait().unwrap();

        assert_eq!(*buf.lock().unwrap(), plaintext[100..300]);
    }

    #[test]
    fn repair_restores_health_after_losing_hosts() {
        // 6 hosts: 3 take the initial placements, 3 are kept spare so the
        // repair pass below has somewhere to re-place onto.
        let (renter, contractor, _pieces, data_dir) = build_renter(6);

        let source = data_dir.path().join("source.bin");
        let plaintext: Vec<u8> = vec![7u8; 2048];
        std::fs::write(&source, &plaintext).unwrap();

        renter.upload(&source, "photos", 2, 1).unwrap();
        renter.repair_once();

        let infos_before = renter.list();
        // D=2, P=1: all N=3 pieces land on distinct hosts, so reachable
        // placed (3) exceeds D (2) - `Chunk::health` is uncapped
        // (reachable_placed / D), it does not saturate at 1.0.
        assert_eq!(infos_before[0].redundancy, 1.5);

        let offline_contracts: Vec<_> = {
            let file = renter.file_store.get("photos").unwrap();
            file.chunks[0]
                .placements
                .values()
                .take(2)
                .map(|p| p.contract)
                .collect()
        };
        contractor.offline.lock().unwrap().extend(offline_contracts);

        let infos_after_loss = renter.list();
        // Only 1 of the 3 placed pieces is still reachable: 1/2 < 1.0, below
        // D - a single host loss out of three wouldn't have crossed that
        // boundary, so this drops two.
        assert!(infos_after_loss[0].redundancy < 1.0);

        renter.repair_once();
        let infos_after_repair = renter.list();
        assert!(infos_after_repair[0].redundancy >= infos_after_loss[0].redundancy);
    }

    #[test]
    fn download_fails_with_insufficient_redundancy_when_too_many_hosts_offline() {
        let (renter, contractor, _pieces, data_dir) = build_renter(3);

        let source = data_dir.path().join("source.bin");
        let plaintext: Vec<u8> = vec![3u8; 1024];
        std::fs::write(&source, &plaintext).unwrap();

        renter.upload(&source, "photos", 2, 1).unwrap();
        renter.repair_once();

        {
            let file = renter.file_store.get("photos").unwrap();
            let mut offline = contractor.offline.lock().unwrap();
            for placement in file.chunks[0].placements.values().take(2) {
                offline.push(placement.contract);
            }
        }

        let buf = Arc::new(StdMutex::new(Vec::new()));
        let handle = renter
            .download(
                "photos",
                0,
                plaintext.len() as u64,
                Box::new(CollectingSink(Arc::clone(&buf))),
            )
            .unwrap();
        assert!(handle.wait().is_err());
    }

    #[test]
    fn price_estimation_is_cached_until_consensus_change() {
        let (renter, _contractor, _pieces, _dir) = build_renter(5);
        let first = renter.price_estimation();
        let second = renter.price_estimation();
        assert_eq!(first, second);
    }

    #[test]
    fn list_reports_zero_redundancy_before_any_placement() {
        let (renter, _contractor, _pieces, data_dir) = build_renter(3);
        let source = data_dir.path().join("f.bin");
        std::fs::write(&source, vec![0u8; 512]).unwrap();
        renter.upload(&source, "f", 2, 1).unwrap();
        let infos = renter.list();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].redundancy, 0.0);
    }

    #[test]
    fn close_is_idempotent() {
        let (renter, _contractor, _pieces, _dir) = build_renter(1);
        renter.close();
        renter.close();
    }
}
