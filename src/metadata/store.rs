//! In-memory file metadata store, guarded by a single read-write lock:
//! readers take a shared lock, mutations take the single writer lock, and
//! the nickname uniqueness invariant is enforced on `add_file`.

use super::types::{FileEntry, Nickname, PiecePlacement};
use crate::error::{RenterError, RenterResult};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::RwLock;

/// Serializable snapshot of the whole store, used both for periodic
/// persistence and for `share_out`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoreSnapshot {
    pub files: Vec<FileEntry>,
}

pub struct FileStore {
    inner: RwLock<HashMap<Nickname, FileEntry>>,
    notify_tx: Sender<()>,
    notify_rx: Receiver<()>,
}

impl FileStore {
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = bounded(1);
        Self {
            inner: RwLock::new(HashMap::new()),
            notify_tx,
            notify_rx,
        }
    }

    /// Receiver the repair scanner selects on to wake on file-store changes.
    pub fn change_receiver(&self) -> Receiver<()> {
        self.notify_rx.clone()
    }

    pub fn add_file(&self, entry: FileEntry) -> RenterResult<()> {
        let mut guard = self.inner.write().expect("file store lock poisoned");
        if guard.contains_key(&entry.nickname) {
            return Err(RenterError::DuplicateNickname(entry.nickname));
        }
        guard.insert(entry.nickname.clone(), entry);
        drop(guard);
        let _ = self.notify_tx.try_send(());
        Ok(())
    }

    pub fn get(&self, nickname: &str) -> Option<FileEntry> {
        self.inner
            .read()
            .expect("file store lock poisoned")
            .get(nickname)
            .cloned()
    }

    pub fn delete(&self, nickname: &str) -> RenterResult<FileEntry> {
        self.inner
            .write()
            .expect("file store lock poisoned")
            .remove(nickname)
            .ok_or_else(|| RenterError::UnknownFile(Nickname::new(nickname.to_string()).unwrap()))
    }

    pub fn rename(&self, old: &str, new: Nickname) -> RenterResult<()> {
        let mut guard = self.inner.write().expect("file store lock poisoned");
        if guard.contains_key(&new) {
            return Err(RenterError::DuplicateNickname(new));
        }
        let mut entry = guard
            .remove(old)
            .ok_or_else(|| RenterError::UnknownFile(Nickname::new(old.to_string()).unwrap()))?;
        entry.nickname = new.clone();
        guard.insert(new, entry);
        Ok(())
    }

    pub fn list(&self) -> Vec<FileEntry> {
        self.inner
            .read()
            .expect("file store lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Record a successful piece placement. Called by the uploader after a
    /// worker reports success.
    pub fn record_piece_placement(
        &self,
        nickname: &str,
        chunk_index: usize,
        piece_index: usize,
        placement: PiecePlacement,
    ) -> RenterResult<()> {
        let mut guard = self.inner.write().expect("file store lock poisoned");
        let entry = guard
            .get_mut(nickname)
            .ok_or_else(|| RenterError::UnknownFile(Nickname::new(nickname.to_string()).unwrap()))?;
        let chunk = entry
            .chunks
            .get_mut(chunk_index)
            .expect("chunk index out of range");
        chunk.placements.insert(piece_index, placement);
        Ok(())
    }

    /// Forget a placement (host reported missing piece / integrity failure).
    pub fn forget_piece(
        &self,
        nickname: &str,
        chunk_index: usize,
        piece_index: usize,
    ) -> RenterResult<()> {
        let mut guard = self.inner.write().expect("file store lock poisoned");
        let entry = guard
            .get_mut(nickname)
            .ok_or_else(|| RenterError::UnknownFile(Nickname::new(nickname.to_string()).unwrap()))?;
        if let Some(chunk) = entry.chunks.get_mut(chunk_index) {
            chunk.placements.remove(&piece_index);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            files: self.inner.read().expect("file store lock poisoned").values().cloned().collect(),
        }
    }

    /// Replace the whole store contents, e.g. when loading from disk.
    pub fn restore(&self, snapshot: StoreSnapshot) {
        let mut guard = self.inner.write().expect("file store lock poisoned");
        guard.clear();
        for file in snapshot.files {
            guard.insert(file.nickname.clone(), file);
        }
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::types::{CodingParams, MasterKey};

    fn sample_file(nickname: &str) -> FileEntry {
        FileEntry {
            nickname: Nickname::new(nickname).unwrap(),
            size: 1024,
            master_key: MasterKey([7u8; 32]),
            coding: CodingParams::new(2, 1).unwrap(),
            chunks: vec![],
            repair_path: None,
            tracked: true,
        }
    }

    #[test]
    fn add_rejects_duplicate_nickname() {
        let store = FileStore::new();
        store.add_file(sample_file("a")).unwrap();
        let err = store.add_file(sample_file("a")).unwrap_err();
        assert!(matches!(err, RenterError::DuplicateNickname(_)));
    }

    #[test]
    fn delete_then_get_returns_none() {
        let store = FileStore::new();
        store.add_file(sample_file("a")).unwrap();
        store.delete("a").unwrap();
        assert!(store.get("a").is_none());
    }

    #[test]
    fn rename_moves_entry() {
        let store = FileStore::new();
        store.add_file(sample_file("a")).unwrap();
        store.rename("a", Nickname::new("b").unwrap()).unwrap();
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
    }

    #[test]
    fn snapshot_round_trips_through_restore() {
        let store = FileStore::new();
        store.add_file(sample_file("a")).unwrap();
        let snap = store.snapshot();
        let store2 = FileStore::new();
        store2.restore(snap);
        assert!(store2.get("a").is_some());
    }
}
