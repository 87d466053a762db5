//! TTL-bounded wallet snapshot cache.
//!
//! One entry per (kind, wallet): lamport balance, recent activity,
//! owned assets. Entries are JSON envelopes `{ data, timestamp }`
//! persisted through a [`KvStore`]. Reads never touch the network and a
//! corrupt or unreadable entry is a miss, never an error.

pub mod store;

use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use strum_macros::Display;

pub use store::{open_or_memory, FileStore, KvStore, MemoryStore};

/// Prefix shared by every persisted key, so one store can host several
/// tools without collisions.
pub const KEY_PREFIX: &str = "nftmkt_";

/// Balance snapshots go stale after 30 seconds.
pub const BALANCE_TTL: Duration = Duration::from_secs(30);
/// Activity snapshots go stale after 60 seconds.
pub const ACTIVITY_TTL: Duration = Duration::from_secs(60);
/// Owned-asset snapshots go stale after 60 seconds.
pub const ASSETS_TTL: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CacheKind {
    Balance,
    Activity,
    Assets,
}

impl CacheKind {
    pub fn ttl(&self) -> Duration {
        match self {
            CacheKind::Balance => BALANCE_TTL,
            CacheKind::Activity => ACTIVITY_TTL,
            CacheKind::Assets => ASSETS_TTL,
        }
    }
}

/// Structured cache key. The flat string form only exists at the store
/// boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub wallet: Pubkey,
}

impl CacheKey {
    pub fn new(kind: CacheKind, wallet: Pubkey) -> Self {
        Self { kind, wallet }
    }

    /// `<prefix><kind>_<wallet>`, the on-disk naming contract.
    pub fn storage_key(&self) -> String {
        format!("{KEY_PREFIX}{}_{}", self.kind, self.wallet)
    }
}

/// Persisted envelope: payload plus capture time in unix milliseconds.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: i64,
}

impl<T> CacheEntry<T> {
    pub fn age(&self) -> Duration {
        let elapsed = Utc::now().timestamp_millis().saturating_sub(self.timestamp);
        Duration::from_millis(elapsed.max(0) as u64)
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// Typed accessor over the raw key-value store.
pub struct CacheStore {
    store: Box<dyn KvStore>,
}

impl CacheStore {
    pub fn new(store: Box<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    /// Read an envelope regardless of freshness. Corrupt entries count
    /// as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let storage_key = key.storage_key();
        let raw = self.store.get(&storage_key)?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("⚠️ [CACHE] corrupt entry for {storage_key} ({e}), treating as miss");
                None
            }
        }
    }

    /// Overwrite the entry for `key`, stamped with the current time.
    pub fn put<T: Serialize>(&self, key: &CacheKey, data: &T) {
        self.put_at(key, data, Utc::now().timestamp_millis());
    }

    /// Overwrite with an explicit capture timestamp.
    pub(crate) fn put_at<T: Serialize>(&self, key: &CacheKey, data: &T, timestamp: i64) {
        let storage_key = key.storage_key();
        let envelope = serde_json::json!({ "data": data, "timestamp": timestamp });
        match serde_json::to_string(&envelope) {
            Ok(raw) => {
                self.store.set(&storage_key, &raw);
                info!("💾 [CACHE] wrote {storage_key} ({} bytes)", raw.len());
            }
            Err(e) => warn!("⚠️ [CACHE] serialize failed for {storage_key}: {e}"),
        }
    }

    /// Whether a usable entry exists for `key`, fresh or stale.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.store.has(&key.storage_key())
    }

    /// Whether the entry for `key` exists and is younger than `ttl`.
    pub fn is_fresh(&self, key: &CacheKey, ttl: Duration) -> bool {
        self.get::<serde_json::Value>(key)
            .map(|entry| entry.is_fresh(ttl))
            .unwrap_or(false)
    }
}
