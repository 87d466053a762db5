//! Runtime configuration loader and common helpers.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};

use crate::cache::{open_or_memory, CacheStore};
use crate::metadata::MetadataFetcher;
use crate::rpc::RpcChainQuery;

/// ------------------------------------------------------------------
/// Main Settings object – *single definition only!*
/// ------------------------------------------------------------------
#[derive(Clone, Debug)]
pub struct Settings {
    /* -------- infrastructure ------------------------ */
    pub rpc_url: String,
    pub fallback_rpc_url: Option<String>,

    /* -------- wallet panel -------------------------- */
    pub cache_dir: PathBuf,
    pub metadata_timeout_secs: u64,
    pub activity_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            fallback_rpc_url: None,
            cache_dir: PathBuf::from(".wallet-cache"),
            metadata_timeout_secs: 5,
            activity_limit: 20,
        }
    }
}

impl Settings {
    /// --------------------------------------------------------------
    /// Read `settings.json` from disk.
    /// --------------------------------------------------------------
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading settings file {:?}", path.as_ref()))?;
        let json: serde_json::Value = serde_json::from_str(&raw)?;
        let defaults = Settings::default();

        /* -------- plain strings ---------------------------------- */
        let rpc_url = json["rpc_url"]
            .as_str()
            .unwrap_or(&defaults.rpc_url)
            .to_string();
        let fallback_rpc_url = json["fallback_rpc_url"]
            .as_str()
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty());

        /* -------- wallet panel parameters ------------------------ */
        let cache_dir = json["cache_dir"]
            .as_str()
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);
        let metadata_timeout_secs = json["metadata_timeout_secs"]
            .as_u64()
            .unwrap_or(defaults.metadata_timeout_secs);
        let activity_limit = json["activity_limit"]
            .as_u64()
            .unwrap_or(defaults.activity_limit as u64) as usize;

        Ok(Self {
            rpc_url,
            fallback_rpc_url,
            cache_dir,
            metadata_timeout_secs,
            activity_limit,
        })
    }

    /// --------------------------------------------------------------
    /// Load settings from default config/settings.json file.
    /// --------------------------------------------------------------
    pub fn load() -> Result<Self> {
        Self::load_from_file("config/settings.json")
    }

    /// --------------------------------------------------------------
    /// Load from `path` when it exists, defaults otherwise.
    /// --------------------------------------------------------------
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// --------------------------------------------------------------
    /// Save settings to a specific file path.
    /// --------------------------------------------------------------
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let settings_json = serde_json::json!({
            "rpc_url": self.rpc_url,
            "fallback_rpc_url": self.fallback_rpc_url,
            "cache_dir": self.cache_dir,
            "metadata_timeout_secs": self.metadata_timeout_secs,
            "activity_limit": self.activity_limit
        });

        let json_string = serde_json::to_string_pretty(&settings_json)?;
        fs::write(&path, json_string)
            .with_context(|| format!("writing settings to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// --------------------------------------------------------------
    /// Shared object factories for the panel wiring.
    /// --------------------------------------------------------------
    pub fn chain_query(&self) -> RpcChainQuery {
        match &self.fallback_rpc_url {
            Some(fallback) => RpcChainQuery::with_fallback(&self.rpc_url, fallback),
            None => RpcChainQuery::new(&self.rpc_url),
        }
    }

    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(open_or_memory(&self.cache_dir))
    }

    pub fn metadata_fetcher(&self) -> MetadataFetcher {
        MetadataFetcher::with_timeout(Duration::from_secs(self.metadata_timeout_secs))
    }
}
