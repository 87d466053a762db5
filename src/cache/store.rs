//! Key-value persistence behind the wallet cache.
//!
//! The panel treats storage like a browser treats localStorage: best
//! effort. Every failure mode of an implementation degrades to "no
//! cached value"; nothing here ever returns an error to the caller.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use log::warn;

/// Storage contract for cache envelopes. Implementations swallow their
/// own failures: a broken store behaves like an empty one.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// One JSON file per key under a fixed directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("⚠️ [STORE] read failed for {key}: {e}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = fs::write(self.path_for(key), value) {
            warn!("⚠️ [STORE] write failed for {key}: {e}");
        }
    }

    fn has(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }
}

/// Process-local fallback used when the disk store cannot be opened.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// Open the on-disk store, falling back to a process-local map when the
/// directory is unusable. Reload survival is lost in that case; the
/// serve-stale-then-refresh contract is not.
pub fn open_or_memory<P: AsRef<Path>>(dir: P) -> Box<dyn KvStore> {
    match FileStore::open(&dir) {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!(
                "⚠️ [STORE] {} unusable ({e}), caching in memory only",
                dir.as_ref().display()
            );
            Box::new(MemoryStore::new())
        }
    }
}
