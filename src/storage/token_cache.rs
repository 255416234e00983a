//! File-backed push-token cache.
//!
//! The cache is advisory: a missing, truncated, or corrupt file is treated as
//! empty and replaced on the next write. Writes go to a temporary file that
//! is renamed over the cache so a crash never leaves a half-written file.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::config::BinwatchConfig;
use crate::driver::DriverId;
use crate::notify::PushToken;
use crate::storage::codec;
use crate::storage::memory::InMemoryTokenStore;
use crate::storage::traits::{PushTokenStore, StorageError};

/// Token store selected by `token_cache_path`: the file cache when set,
/// process memory otherwise.
#[must_use]
pub fn token_store(cfg: &BinwatchConfig) -> Arc<dyn PushTokenStore> {
    match &cfg.token_cache_path {
        Some(path) => Arc::new(FileTokenCache::open(path.clone())),
        None => Arc::new(InMemoryTokenStore::new()),
    }
}

/// Push tokens persisted to one local file.
#[derive(Debug)]
pub struct FileTokenCache {
    path: PathBuf,
    tokens: RwLock<BTreeMap<DriverId, PushToken>>,
}

impl FileTokenCache {
    /// Opens the cache at `path`, loading whatever is readable.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tokens = match load(&path) {
            Ok(tokens) => tokens,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable token cache");
                BTreeMap::new()
            }
        };
        Self {
            path,
            tokens: RwLock::new(tokens),
        }
    }

    /// Location of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tokens: &BTreeMap<DriverId, PushToken>) -> Result<(), StorageError> {
        write_atomic(&self.path, tokens).map_err(|e| {
            StorageError::BackendError(format!("token cache write failed ({}): {e}", self.path.display()))
        })
    }
}

fn load(path: &Path) -> io::Result<BTreeMap<DriverId, PushToken>> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    codec::read_header(&mut reader)?;
    let tokens: Vec<PushToken> = codec::decode(&mut reader)?;
    Ok(tokens.into_iter().map(|t| (t.driver_id, t)).collect())
}

fn write_atomic(path: &Path, tokens: &BTreeMap<DriverId, PushToken>) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let frame = codec::encode(&tokens.values().collect::<Vec<_>>())?;
    let temp_path = path.with_extension(format!("tmp.{}", Uuid::new_v4()));

    let result = write_file(&temp_path, &frame).and_then(|()| fs::rename(&temp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_file(path: &Path, frame: &[u8]) -> io::Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut writer = BufWriter::new(file);
    codec::write_header(&mut writer)?;
    writer.write_all(frame)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

impl PushTokenStore for FileTokenCache {
    fn put(&self, token: PushToken) -> Result<(), StorageError> {
        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| StorageError::BackendError("poisoned lock: token cache write".to_string()))?;
        tokens.insert(token.driver_id, token);
        self.persist(&tokens)
    }

    fn get(&self, driver: DriverId) -> Result<Option<PushToken>, StorageError> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| StorageError::BackendError("poisoned lock: token cache read".to_string()))?;
        Ok(tokens.get(&driver).cloned())
    }

    fn clear(&self, driver: DriverId) -> Result<(), StorageError> {
        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| StorageError::BackendError("poisoned lock: token cache write".to_string()))?;
        if tokens.remove(&driver).is_some() {
            self.persist(&tokens)?;
        }
        Ok(())
    }
}
