//! Renter configuration: the fields a future CLI/daemon
//! layer would populate from a config file or flags. Deserializable with
//! `serde` the way the rest of this crate's persisted types are.

use crate::metadata::CodingParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Funds and duration the renter is willing to spend, forwarded from
/// `Renter::set_settings` into price estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allowance {
    pub funds: u64,
    pub period_blocks: u64,
    pub hosts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenterConfig {
    /// Directory the persisted snapshot and share files live in.
    pub persist_dir: PathBuf,
    /// Total bytes the memory manager may hand out at once.
    pub base_memory: usize,
    /// Default erasure coding parameters for newly uploaded files.
    pub default_coding: CodingParams,
    /// How often the repair scanner runs its fixed-interval fallback pass.
    #[serde(with = "duration_secs")]
    pub scan_interval: Duration,
    /// How often the file store's snapshot is flushed to `persist_dir`.
    #[serde(with = "duration_secs")]
    pub persist_interval: Duration,
    /// Number of hosts `price_estimation` samples and averages over.
    pub price_estimation_scope: usize,
    pub allowance: Allowance,
}

impl Default for RenterConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("."),
            base_memory: 3 * crate::metadata::DEFAULT_PIECE_SIZE * 10,
            default_coding: CodingParams::new(10, 20).expect("10/20 coding is always valid"),
            scan_interval: Duration::from_secs(30 * 60),
            persist_interval: Duration::from_secs(10 * 60),
            price_estimation_scope: 50,
            allowance: Allowance {
                funds: 0,
                period_blocks: 12_960, // ~3 months at 10 min/block
                hosts: 50,
            },
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let cfg = RenterConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RenterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base_memory, cfg.base_memory);
        assert_eq!(back.scan_interval, cfg.scan_interval);
    }
}
