//! Single-file persistence for the chain: whole-snapshot read/write, no
//! append-only log. Every write replaces the file atomically via a
//! temp-file-then-rename, so a crash mid-write can't leave a truncated
//! chain behind.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Chain;
use crate::error::StoreError;

/// A handle to a chain persisted at a fixed path.
#[derive(Debug, Clone)]
pub struct ChainStore {
    path: PathBuf,
}

impl ChainStore {
    /// Initializes a store at `path`. Fails if `path` already exists —
    /// callers that want to reopen an existing store should keep the
    /// `ChainStore` value around rather than calling `init` twice.
    pub fn init(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(StoreError::AlreadyInitialized(path.display().to_string()));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let store = Self { path };
        store.write(&Vec::new())?;
        Ok(store)
    }

    /// Opens a store that was already initialized at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(StoreError::NotInitialized(path.display().to_string()));
        }
        Ok(Self { path })
    }

    /// Reads the currently persisted chain.
    pub fn read(&self) -> Result<Chain, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotInitialized(self.path.display().to_string()));
        }
        let bytes = fs::read(&self.path)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let chain: Chain = bincode::deserialize(&bytes)?;
        Ok(chain)
    }

    /// Atomically replaces the persisted chain with `chain`.
    pub fn write(&self, chain: &Chain) -> Result<(), StoreError> {
        let encoded = bincode::serialize(chain)?;
        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, &encoded)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "chain".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::genesis_block;

    #[test]
    fn double_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.db");
        ChainStore::init(&path).unwrap();
        let err = ChainStore::init(&path).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyInitialized(_)));
    }

    #[test]
    fn read_before_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.db");
        let err = ChainStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::NotInitialized(_)));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.db");
        let store = ChainStore::init(&path).unwrap();
        let chain = vec![genesis_block("addr1")];
        store.write(&chain).unwrap();
        let read_back = store.read().unwrap();
        assert_eq!(read_back, chain);
    }
}
