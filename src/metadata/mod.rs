//! Descriptive metadata for owned mints.
//!
//! Two hops per mint: the token-metadata account gives name, symbol and
//! the off-chain URI; the URI gives image, description and attributes.
//! Either hop can fail without failing the owning asset, and results
//! are memoized so re-resolving a wallet does not refetch every mint.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use borsh::BorshDeserialize;
use log::warn;
use lru::LruCache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use tokio::time::timeout;
use url::Url;

use crate::error::{WalletError, WalletResult};
use crate::market::program_ids::TOKEN_METADATA_PROGRAM;
use crate::rpc::ChainQuery;

pub const METADATA_SEED: &[u8] = b"metadata";

/// Off-chain fetches give up after this long.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Public gateway used to resolve ipfs:// URIs.
pub const IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

const MEMO_CAPACITY: usize = 256;

/// Derive the token-metadata account address for `mint`.
pub fn metadata_pda(mint: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[METADATA_SEED, TOKEN_METADATA_PROGRAM.as_ref(), mint.as_ref()],
        &TOKEN_METADATA_PROGRAM,
    )
}

/// One trait/value pair from the off-chain JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftAttribute {
    pub trait_type: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NftMetadata {
    pub name: String,
    pub symbol: String,
    pub image: Option<String>,
    pub description: Option<String>,
    pub attributes: Vec<NftAttribute>,
    pub collection: Option<String>,
}

/// Leading fields of the token-metadata account. The tail (creators,
/// edition info, collection details) is left unread.
#[derive(BorshDeserialize)]
struct OnChainMetadata {
    _key: u8,
    _update_authority: [u8; 32],
    _mint: [u8; 32],
    name: String,
    symbol: String,
    uri: String,
}

/// Borsh strings in metadata accounts are written into fixed-size
/// fields and arrive zero-padded.
fn trim_padding(raw: &str) -> String {
    raw.trim_end_matches('\0').trim().to_string()
}

pub struct MetadataFetcher {
    http: Client,
    fetch_timeout: Duration,
    memo: Mutex<LruCache<Pubkey, NftMetadata>>,
}

impl MetadataFetcher {
    pub fn new() -> Self {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    pub fn with_timeout(fetch_timeout: Duration) -> Self {
        Self {
            http: Client::builder()
                .timeout(fetch_timeout)
                .build()
                .expect("reqwest build failed"),
            fetch_timeout,
            memo: Mutex::new(LruCache::new(NonZeroUsize::new(MEMO_CAPACITY).unwrap())),
        }
    }

    /// Metadata for `mint`, memoized. An `Err` means the caller should
    /// treat metadata as absent; it never fails the owning asset.
    pub async fn fetch(&self, query: &dyn ChainQuery, mint: &Pubkey) -> WalletResult<NftMetadata> {
        if let Some(hit) = self.memo.lock().unwrap().get(mint).cloned() {
            return Ok(hit);
        }
        let meta = self.fetch_uncached(query, mint).await?;
        self.memo.lock().unwrap().put(*mint, meta.clone());
        Ok(meta)
    }

    async fn fetch_uncached(&self, query: &dyn ChainQuery, mint: &Pubkey) -> WalletResult<NftMetadata> {
        let (address, _) = metadata_pda(mint);
        let data = query.account_data(&address).await?.ok_or_else(|| WalletError::Metadata {
            mint: mint.to_string(),
            reason: "no metadata account".into(),
        })?;

        let mut slice = data.as_slice();
        let raw = OnChainMetadata::deserialize(&mut slice).map_err(|e| WalletError::Metadata {
            mint: mint.to_string(),
            reason: format!("metadata account did not parse: {e}"),
        })?;

        let mut meta = NftMetadata {
            name: trim_padding(&raw.name),
            symbol: trim_padding(&raw.symbol),
            image: None,
            description: None,
            attributes: Vec::new(),
            collection: None,
        };

        let uri = trim_padding(&raw.uri);
        if uri.is_empty() {
            return Ok(meta);
        }
        match self.fetch_json(&uri).await {
            Ok(json) => apply_off_chain(&mut meta, &json),
            // On-chain fields survive; the panel shows a placeholder
            // image in this state.
            Err(e) => warn!("⚠️ [METADATA] off-chain fetch failed for {mint} ({uri}): {e}"),
        }
        Ok(meta)
    }

    /// Resolve an off-chain URI: data: URIs decode inline, ipfs:// goes
    /// through the public gateway, http(s) passes through.
    async fn fetch_json(&self, uri: &str) -> anyhow::Result<Value> {
        if let Some(encoded) = uri.strip_prefix("data:application/json;base64,") {
            let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        let target = normalize_uri(uri)?;
        let response = timeout(self.fetch_timeout, self.http.get(target).send()).await??;
        if !response.status().is_success() {
            anyhow::bail!("metadata host returned {}", response.status());
        }
        Ok(timeout(self.fetch_timeout, response.json::<Value>()).await??)
    }
}

fn normalize_uri(uri: &str) -> anyhow::Result<String> {
    // CIDs are case-sensitive, so ipfs:// is rewritten by hand instead
    // of going through a URL parser.
    if let Some(rest) = uri.strip_prefix("ipfs://") {
        let rest = rest.strip_prefix("ipfs/").unwrap_or(rest);
        return Ok(format!("{IPFS_GATEWAY}{rest}"));
    }
    let parsed = Url::parse(uri)?;
    match parsed.scheme() {
        "http" | "https" => Ok(uri.to_string()),
        other => anyhow::bail!("unsupported metadata scheme {other}"),
    }
}

fn apply_off_chain(meta: &mut NftMetadata, json: &Value) {
    if let Some(name) = json.get("name").and_then(Value::as_str) {
        if !name.trim().is_empty() {
            meta.name = name.trim().to_string();
        }
    }
    meta.image = json.get("image").and_then(Value::as_str).map(str::to_string);
    meta.description = json.get("description").and_then(Value::as_str).map(str::to_string);
    meta.collection = json.get("collection").and_then(|collection| {
        collection
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| collection.as_str().map(str::to_string))
    });
    if let Some(list) = json.get("attributes").and_then(Value::as_array) {
        meta.attributes = list.iter().filter_map(attribute_from_json).collect();
    }
}

fn attribute_from_json(value: &Value) -> Option<NftAttribute> {
    let trait_type = value.get("trait_type")?.as_str()?.to_string();
    let rendered = match value.get("value")? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(NftAttribute {
        trait_type,
        value: rendered,
    })
}
