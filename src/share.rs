//! `.sia` share format: a deterministic,
//! self-describing serialization of file metadata, independent of the main
//! persistence file so it can be copied between renters. Plaintext is never
//! included - only the records needed to re-derive placements.

use crate::metadata::{FileEntry, FileStore, Nickname};
use anyhow::{bail, Context, Result};

const SHARE_MAGIC: &[u8; 8] = b"SIAREN1\0";

/// Serialize the named files as a magic header followed by length-prefixed
/// JSON records, one per file, in the order the nicknames were given.
pub fn share_out(store: &FileStore, nicknames: &[Nickname]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(SHARE_MAGIC);

    for nickname in nicknames {
        let entry = store
            .get(nickname.as_str())
            .with_context(|| format!("unknown file '{}'", nickname))?;
        let record = serde_json::to_vec(&entry).context("serializing file record")?;
        out.extend_from_slice(&(record.len() as u64).to_le_bytes());
        out.extend_from_slice(&record);
    }

    Ok(out)
}

/// Parse a share blob produced by [`share_out`] and add every record to
/// `store`, returning the nicknames added. A nickname already tracked by
/// `store` is rejected the same way `add_file` rejects duplicates.
pub fn share_in(store: &FileStore, blob: &[u8]) -> Result<Vec<Nickname>> {
    if blob.len() < SHARE_MAGIC.len() || &blob[..SHARE_MAGIC.len()] != SHARE_MAGIC {
        bail!("not a renter share file (bad magic header)");
    }

    let mut cursor = SHARE_MAGIC.len();
    let mut added = Vec::new();

    while cursor < blob.len() {
        if cursor + 8 > blob.len() {
            bail!("truncated share file (length prefix)");
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&blob[cursor..cursor + 8]);
        let len = u64::from_le_bytes(len_bytes) as usize;
        cursor += 8;

        if cursor + len > blob.len() {
            bail!("truncated share file (record body)");
        }
        let record: FileEntry =
            serde_json::from_slice(&blob[cursor..cursor + len]).context("parsing file record")?;
        cursor += len;

        let nickname = record.nickname.clone();
        store.add_file(record)?;
        added.push(nickname);
    }

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CodingParams, MasterKey};

    fn sample(nickname: &str) -> FileEntry {
        FileEntry {
            nickname: Nickname::new(nickname).unwrap(),
            size: 4096,
            master_key: MasterKey([4u8; 32]),
            coding: CodingParams::new(2, 1).unwrap(),
            chunks: vec![],
            repair_path: None,
            tracked: true,
        }
    }

    #[test]
    fn round_trips_through_share_out_and_in() {
        let store = FileStore::new();
        store.add_file(sample("a")).unwrap();
        store.add_file(sample("b")).unwrap();

        let blob = share_out(
            &store,
            &[Nickname::new("a").unwrap(), Nickname::new("b").unwrap()],
        )
        .unwrap();

        let store2 = FileStore::new();
        let added = share_in(&store2, &blob).unwrap();
        assert_eq!(added.len(), 2);
        assert!(store2.get("a").is_some());
        assert!(store2.get("b").is_some());
    }

    #[test]
    fn rejects_bad_magic() {
        let store = FileStore::new();
        assert!(share_in(&store, b"not a share file").is_err());
    }

    #[test]
    fn rejects_duplicate_on_import() {
        let store = FileStore::new();
        store.add_file(sample("a")).unwrap();
        let blob = share_out(&store, &[Nickname::new("a").unwrap()]).unwrap();
        assert!(share_in(&store, &blob).is_err());
    }
}
