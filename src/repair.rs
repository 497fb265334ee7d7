//! Repair scanner: a long-lived loop that walks tracked
//! files, computes chunk health, and feeds unhealthy chunks into the
//! uploader. Repair passes are serialized - there is exactly one scanner
//! thread, so no two scans run concurrently.

use crate::contractor::{ConsensusEvent, Contractor};
use crate::metadata::FileStore;
use crate::upload::{ChunkUploader, RepairTask};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

pub struct RepairScanner {
    file_store: Arc<FileStore>,
    contractor: Arc<dyn Contractor>,
    uploader: Arc<ChunkUploader>,
    scan_interval: Duration,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl RepairScanner {
    pub fn new(
        file_store: Arc<FileStore>,
        contractor: Arc<dyn Contractor>,
        uploader: Arc<ChunkUploader>,
        scan_interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        Self {
            file_store,
            contractor,
            uploader,
            scan_interval,
            stop_tx,
            stop_rx,
        }
    }

    /// Signals `run` to return at the next suspension point.
    pub fn request_stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Runs the scan/sleep loop until `request_stop` is called. Intended to
    /// be run on its own thread (see `Renter::new`).
    pub fn run(&self, consensus_rx: Receiver<ConsensusEvent>) {
        let changed_rx = self.file_store.change_receiver();
        let ticker = tick(self.scan_interval);

        loop {
            if self.stop_rx.try_recv().is_ok() {
                return;
            }

            self.scan_once();

            select! {
                recv(changed_rx) -> _ => {}
                recv(ticker) -> _ => {}
                recv(consensus_rx) -> _ => {}
                recv(self.stop_rx) -> _ => { return; }
            }
        }
    }

    /// One full pass: compute health for every chunk of every tracked file,
    /// sort by ascending health (most degraded first), and submit repair
    /// tasks to the uploader.
    pub fn scan_once(&self) {
        let mut tasks = Vec::new();

        for file in self.file_store.list() {
            if !file.tracked {
                continue;
            }
            for chunk in &file.chunks {
                let is_reachable =
                    |contract| !self.contractor.is_offline(contract);
                let health = chunk.health(is_reachable);
                if health >= 1.0 {
                    // Still top up placements below N at a lower priority;
                    // pushed to the back by the sort below since their
                    // health is highest.
                    if chunk.placed() >= chunk.coding.total() {
                        continue;
                    }
                }

                let missing = chunk.missing_piece_indices(is_reachable);
                if missing.is_empty() {
                    continue;
                }

                if file.repair_path.is_none() {
                    log::warn!(
                        "data loss warning: chunk {} of '{}' is degraded (health {:.2}) with no local source",
                        chunk.index,
                        file.nickname,
                        health
                    );
                    continue;
                }

                tasks.push(RepairTask {
                    nickname: file.nickname.clone(),
                    chunk_index: chunk.index,
                    missing_pieces: missing,
                    health,
                });
            }
        }

        tasks.sort_by(|a, b| a.health.partial_cmp(&b.health).unwrap_or(std::cmp::Ordering::Equal));

        for task in tasks {
            let nickname = task.nickname.clone();
            let chunk_index = task.chunk_index;
            match self.uploader.upload_chunk(task) {
                Ok(placed) => {
                    if placed > 0 {
                        log::info!(
                            "repaired chunk {} of '{}': placed {} piece(s)",
                            chunk_index,
                            nickname,
                            placed
                        );
                    }
                }
                Err(err) => {
                    log::warn!(
                        "repair of chunk {} of '{}' deferred: {}",
                        chunk_index,
                        nickname,
                        err
                    );
                }
            }
        }
    }
}
