//! Main persisted snapshot: a versioned header followed
//! by the file store's bucketed records, written atomically via
//! `tools::atomic_write`.

use crate::metadata::StoreSnapshot;
use crate::tools::atomic_write;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const PERSIST_NAME: &str = "Renter";
const PERSIST_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistHeader {
    name: String,
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistFile {
    header: PersistHeader,
    snapshot: StoreSnapshot,
}

pub fn save(path: &Path, snapshot: &StoreSnapshot) -> Result<()> {
    let file = PersistFile {
        header: PersistHeader {
            name: PERSIST_NAME.to_string(),
            version: PERSIST_VERSION,
        },
        snapshot: snapshot.clone(),
    };
    let json = serde_json::to_vec_pretty(&file).context("serializing renter snapshot")?;
    atomic_write(path, &json).context("writing renter snapshot")
}

pub fn load(path: &Path) -> Result<StoreSnapshot> {
    let data = std::fs::read(path)
        .with_context(|| format!("reading renter snapshot from {:?}", path))?;
    let file: PersistFile =
        serde_json::from_slice(&data).context("parsing renter snapshot")?;
    if file.header.name != PERSIST_NAME {
        anyhow::bail!(
            "not a renter snapshot file (got header name {:?})",
            file.header.name
        );
    }
    if file.header.version != PERSIST_VERSION {
        anyhow::bail!(
            "unsupported renter snapshot version {}",
            file.header.version
        );
    }
    Ok(file.snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CodingParams, FileEntry, MasterKey, Nickname};

    fn sample_snapshot() -> StoreSnapshot {
        StoreSnapshot {
            files: vec![FileEntry {
                nickname: Nickname::new("photos.tar").unwrap(),
                size: 4096,
                master_key: MasterKey([1u8; 32]),
                coding: CodingParams::new(2, 1).unwrap(),
                chunks: vec![],
                repair_path: None,
                tracked: true,
            }],
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renter.json");
        let snapshot = sample_snapshot();
        save(&path, &snapshot).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.files[0].nickname, snapshot.files[0].nickname);
    }

    #[test]
    fn load_rejects_wrong_header_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.json");
        std::fs::write(&path, br#"{"header":{"name":"NotRenter","version":1},"snapshot":{"files":[]}}"#).unwrap();
        assert!(load(&path).is_err());
    }
}
