//! Ownership resolution: which NFTs a wallet holds, and which of them
//! are currently listed.
//!
//! One pass per wallet: enumerate token holdings, keep the NFT-shaped
//! ones, then annotate every kept mint with listing state and metadata
//! in one concurrent fan-out. Enumeration failure is the only hard
//! failure; everything per-mint degrades instead.

use std::sync::Arc;

use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::WalletResult;
use crate::market;
use crate::metadata::{MetadataFetcher, NftMetadata};
use crate::rpc::{ChainQuery, TokenHolding};

/// One owned NFT, as of a single resolution pass. Never patched in
/// place; a refresh is a whole new pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OwnedAsset {
    pub mint: Pubkey,
    pub token_account: Pubkey,
    pub amount: u64,
    pub metadata: Option<NftMetadata>,
    pub listed: bool,
    /// Asking price, when the listing account parsed.
    pub price_lamports: Option<u64>,
}

impl OwnedAsset {
    /// Name to show for this asset: metadata name, or the shortened
    /// mint when metadata is missing.
    pub fn display_name(&self) -> String {
        match &self.metadata {
            Some(meta) if !meta.name.is_empty() => meta.name.clone(),
            _ => format!("{}...", &self.mint.to_string()[..8]),
        }
    }
}

/// Whether a holding is shaped like an NFT: exactly one unit of a
/// zero-decimal mint.
pub fn is_nft_holding(holding: &TokenHolding) -> bool {
    holding.amount == 1 && holding.decimals == 0
}

/// Assets the wallet could list right now: exactly the ones without a
/// current listing.
pub fn available_to_list(assets: &[OwnedAsset]) -> Vec<&OwnedAsset> {
    assets.iter().filter(|asset| !asset.listed).collect()
}

/// The wallet's assets that are on the market right now.
pub fn listed_assets(assets: &[OwnedAsset]) -> Vec<&OwnedAsset> {
    assets.iter().filter(|asset| asset.listed).collect()
}

pub struct OwnershipResolver {
    query: Arc<dyn ChainQuery>,
    metadata: MetadataFetcher,
}

impl OwnershipResolver {
    pub fn new(query: Arc<dyn ChainQuery>) -> Self {
        Self::with_fetcher(query, MetadataFetcher::new())
    }

    pub fn with_fetcher(query: Arc<dyn ChainQuery>, metadata: MetadataFetcher) -> Self {
        Self { query, metadata }
    }

    /// Resolve `owner`'s NFT holdings with listing status and metadata.
    pub async fn resolve(&self, owner: &Pubkey) -> WalletResult<Vec<OwnedAsset>> {
        let holdings = self.query.token_holdings(owner).await?;
        let total = holdings.len();
        let nft_like: Vec<TokenHolding> = holdings.into_iter().filter(is_nft_holding).collect();
        info!(
            "🔎 [RESOLVER] {owner}: {} of {total} holdings are NFT-shaped",
            nft_like.len()
        );

        let annotations = join_all(nft_like.iter().map(|holding| self.annotate(holding))).await;

        Ok(nft_like
            .iter()
            .zip(annotations)
            .map(|(holding, annotation)| OwnedAsset {
                mint: holding.mint,
                token_account: holding.account,
                amount: holding.amount,
                metadata: annotation.metadata,
                listed: annotation.listed,
                price_lamports: annotation.price_lamports,
            })
            .collect())
    }

    /// Listing state and metadata for one holding. Failures here are
    /// absorbed; they never fail the pass.
    async fn annotate(&self, holding: &TokenHolding) -> Annotation {
        let (listing, metadata) = tokio::join!(
            market::listing_status(self.query.as_ref(), &holding.mint),
            self.metadata.fetch(self.query.as_ref(), &holding.mint),
        );

        let (listed, price_lamports) = match listing {
            Ok((listed, parsed)) => (listed, parsed.map(|l| l.price_lamports)),
            Err(e) => {
                warn!("⚠️ [RESOLVER] listing lookup failed for {}: {e}", holding.mint);
                (false, None)
            }
        };
        let metadata = match metadata {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("⚠️ [RESOLVER] metadata unavailable for {}: {e}", holding.mint);
                None
            }
        };

        Annotation {
            listed,
            price_lamports,
            metadata,
        }
    }
}

struct Annotation {
    listed: bool,
    price_lamports: Option<u64>,
    metadata: Option<NftMetadata>,
}
