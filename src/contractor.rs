//! Capability traits for the collaborators this core consumes: the host
//! database, the contractor, and the consensus subscription. The renter
//! core depends only on these traits, never on a concrete implementation,
//! so tests can substitute deterministic stubs.

use crate::metadata::{ContractId, HostPublicKey};
use anyhow::Result;

/// A host entry as returned by the host database, weighted by score.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEntry {
    pub key: HostPublicKey,
    pub score: f64,
    /// Advertised price per TB for storage/upload/download, used by
    /// `Renter::price_estimation`.
    pub storage_price_per_tb_month: f64,
    pub upload_price_per_tb: f64,
    pub download_price_per_tb: f64,
}

/// Host discovery and scoring, consumed read-only by the uploader/scanner.
pub trait HostDb: Send + Sync {
    fn random_hosts(&self, n: usize, exclude: &[HostPublicKey]) -> Vec<HostEntry>;
    fn host(&self, key: &HostPublicKey) -> Option<HostEntry>;
}

/// A currently active storage agreement, as the contractor exposes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractInfo {
    pub id: ContractId,
    pub host: HostPublicKey,
    pub end_height: u64,
    pub funds_remaining: u64,
}

/// Write access to one host's sector set under a contract.
pub trait Editor: Send {
    /// Append/overwrite the piece at `root` with `data`, returning the
    /// (possibly unchanged) Merkle root the host now serves it under.
    fn write_piece(&mut self, data: &[u8]) -> Result<[u8; 32]>;
}

/// Read access to one host's sector set under a contract.
pub trait Downloader: Send {
    fn read_piece(&mut self, root: &[u8; 32]) -> Result<Vec<u8>>;
}

/// The contract negotiation/renewal/payment subsystem. The renter core
/// only ever calls these methods; it never negotiates contracts itself.
pub trait Contractor: Send + Sync {
    fn contracts(&self) -> Vec<ContractInfo>;
    fn contract_by_id(&self, id: ContractId) -> Option<ContractInfo>;
    fn is_offline(&self, id: ContractId) -> bool;
    fn editor(&self, id: ContractId) -> Result<Box<dyn Editor>>;
    fn downloader(&self, id: ContractId) -> Result<Box<dyn Downloader>>;
    /// Follows a contract through renewal: an old id may resolve to a new
    /// one after the contractor renews it.
    fn resolve_id(&self, id: ContractId) -> ContractId;
}

/// Minimum and maximum transaction fee per byte, used for price estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeEstimate {
    pub min_per_byte: f64,
    pub max_per_byte: f64,
}

pub trait FeeEstimator: Send + Sync {
    fn fee_estimation(&self) -> FeeEstimate;
}

/// Ordered consensus change notifications the renter reacts to by
/// invalidating its cached price estimate and re-running pool reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusEvent {
    HeightChanged(u64),
    Reorg,
}

pub trait ConsensusSubscriber: Send + Sync {
    /// Returns a receiver of future consensus events; composable with
    /// `select!` in the renter's background loops.
    fn subscribe(&self) -> crossbeam_channel::Receiver<ConsensusEvent>;
}
