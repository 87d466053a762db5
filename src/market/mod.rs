//! Marketplace surface: listing accounts, their derived addresses, and
//! the typed actions handed to the external wallet adapter.
//!
//! The marketplace program itself is out of process. This module reads
//! its accounts and forwards user intents; it never builds instructions
//! or signs anything.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use borsh::{BorshDeserialize, BorshSerialize};
use log::{info, warn};
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::pubkey::Pubkey;

use crate::error::{WalletError, WalletResult};
use crate::rpc::ChainQuery;

/// Program IDs this crate talks to.
pub mod program_ids {
    use once_cell::sync::Lazy;
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    /// The marketplace program the listing PDAs hang off.
    pub const MARKETPLACE_PROGRAM_ID: &str = "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS";

    /// Metaplex token metadata.
    pub const TOKEN_METADATA_PROGRAM_ID: &str = "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s";

    pub static MARKETPLACE_PROGRAM: Lazy<Pubkey> =
        Lazy::new(|| Pubkey::from_str(MARKETPLACE_PROGRAM_ID).unwrap());

    pub static TOKEN_METADATA_PROGRAM: Lazy<Pubkey> =
        Lazy::new(|| Pubkey::from_str(TOKEN_METADATA_PROGRAM_ID).unwrap());
}

/// Seed literal for listing PDAs.
pub const LISTING_SEED: &[u8] = b"listing";

/// Discriminator the marketplace program writes at the head of every
/// listing account.
pub const LISTING_DISCRIMINATOR: [u8; 8] = [218, 32, 50, 73, 43, 134, 26, 58];

/// Discriminator + seller + mint + price + fee.
pub const LISTING_ACCOUNT_LEN: usize = 8 + 32 + 32 + 8 + 2;

/// On-chain sale offer for one mint.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Listing {
    pub seller: Pubkey,
    pub mint: Pubkey,
    pub price_lamports: u64,
    pub fee_bps: u16,
}

impl Listing {
    /// Parse a listing account's raw data. The discriminator is
    /// validated, trailing bytes are tolerated.
    pub fn try_parse(data: &[u8]) -> Option<Listing> {
        let payload = data.strip_prefix(&LISTING_DISCRIMINATOR[..])?;
        let mut slice = payload;
        Listing::deserialize(&mut slice).ok()
    }

    pub fn price_sol(&self) -> f64 {
        self.price_lamports as f64 / LAMPORTS_PER_SOL as f64
    }
}

/// Derive the listing address for `mint`. Pure; no network access.
pub fn listing_pda(mint: &Pubkey) -> (Pubkey, u8) {
    listing_pda_for_program(mint, &program_ids::MARKETPLACE_PROGRAM)
}

pub fn listing_pda_for_program(mint: &Pubkey, program: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[LISTING_SEED, mint.as_ref()], program)
}

/// Listing existence plus, when the account parses, the decoded
/// listing for `mint`. An account that exists but does not parse still
/// counts as listed.
pub async fn listing_status(query: &dyn ChainQuery, mint: &Pubkey) -> WalletResult<(bool, Option<Listing>)> {
    let (address, _) = listing_pda(mint);
    match query.account_data(&address).await? {
        None => Ok((false, None)),
        Some(data) => {
            let listing = Listing::try_parse(&data);
            if listing.is_none() {
                warn!("⚠️ [MARKET] listing account {address} for mint {mint} exists but did not parse");
            }
            Ok((true, listing))
        }
    }
}

/// Every listing account currently owned by the marketplace program.
pub async fn fetch_all_listings(query: &dyn ChainQuery) -> WalletResult<Vec<(Pubkey, Listing)>> {
    let raw = query
        .program_accounts(&program_ids::MARKETPLACE_PROGRAM, Some(LISTING_ACCOUNT_LEN as u64))
        .await?;
    let mut listings = Vec::with_capacity(raw.len());
    for (address, data) in raw {
        match Listing::try_parse(&data) {
            Some(listing) => listings.push((address, listing)),
            None => warn!("⚠️ [MARKET] skipping undecodable listing account {address}"),
        }
    }
    Ok(listings)
}

/// Typed request handed to the wallet adapter. The adapter owns
/// instruction building, signing and submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarketAction {
    Buy { listing: Pubkey, mint: Pubkey },
    List { mint: Pubkey, price_lamports: u64 },
    Cancel { listing: Pubkey, mint: Pubkey },
    TransferSol { to: Pubkey, lamports: u64 },
}

/// Connect/sign/send surface of the user's wallet. External
/// collaborator; implementations live outside this crate.
#[async_trait]
pub trait WalletAdapter: Send + Sync + 'static {
    /// The connected wallet address.
    fn address(&self) -> Pubkey;

    /// Sign and submit `action`, returning the transaction signature.
    async fn sign_and_send(&self, action: MarketAction) -> anyhow::Result<String>;
}

/// Validating front over the wallet adapter.
pub struct MarketClient {
    adapter: Arc<dyn WalletAdapter>,
}

impl MarketClient {
    pub fn new(adapter: Arc<dyn WalletAdapter>) -> Self {
        Self { adapter }
    }

    pub fn wallet(&self) -> Pubkey {
        self.adapter.address()
    }

    pub async fn buy(&self, mint: &Pubkey) -> WalletResult<String> {
        let (listing, _) = listing_pda(mint);
        self.submit(MarketAction::Buy { listing, mint: *mint }).await
    }

    pub async fn list(&self, mint: &Pubkey, price_lamports: u64) -> WalletResult<String> {
        if price_lamports == 0 {
            return Err(WalletError::Validation {
                field: "price",
                reason: "listing price must be positive".into(),
            });
        }
        self.submit(MarketAction::List { mint: *mint, price_lamports }).await
    }

    pub async fn cancel(&self, mint: &Pubkey) -> WalletResult<String> {
        let (listing, _) = listing_pda(mint);
        self.submit(MarketAction::Cancel { listing, mint: *mint }).await
    }

    /// Validate and submit a native transfer. `recipient` and
    /// `amount_sol` are raw user input; both are checked before the
    /// adapter is touched.
    pub async fn send_sol(&self, recipient: &str, amount_sol: f64) -> WalletResult<String> {
        let to = Pubkey::from_str(recipient.trim()).map_err(|e| WalletError::Validation {
            field: "recipient",
            reason: format!("not a valid address: {e}"),
        })?;
        if !amount_sol.is_finite() || amount_sol <= 0.0 {
            return Err(WalletError::Validation {
                field: "amount",
                reason: "amount must be a positive number".into(),
            });
        }
        let lamports = sol_to_lamports(amount_sol);
        if lamports == 0 {
            return Err(WalletError::Validation {
                field: "amount",
                reason: "amount rounds to zero lamports".into(),
            });
        }
        self.submit(MarketAction::TransferSol { to, lamports }).await
    }

    async fn submit(&self, action: MarketAction) -> WalletResult<String> {
        info!("🛒 [MARKET] submitting {action:?} via wallet adapter");
        let signature = self
            .adapter
            .sign_and_send(action)
            .await
            .map_err(|e| WalletError::Transaction(e.to_string()))?;
        info!("✅ [MARKET] confirmed: {signature}");
        Ok(signature)
    }
}

/// Convert a user-typed SOL amount into lamports
pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}
