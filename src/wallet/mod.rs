//! Cache-backed wallet state: balance, recent activity, owned assets.
//!
//! Every read goes through the TTL cache: a fresh entry returns with
//! zero network access, a stale or missing entry (or a forced refresh)
//! goes to the chain exactly once and overwrites the entry in place.
//! [`WalletState::hydrate`] replays whatever entries exist for first
//! paint, whatever their age.

use std::sync::Arc;

use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::cache::{CacheEntry, CacheKey, CacheKind, CacheStore};
use crate::error::WalletResult;
use crate::resolver::{OwnedAsset, OwnershipResolver};
use crate::rpc::{ChainQuery, SignatureRecord, TxDelta};

/// How many signatures the activity feed covers by default.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
    /// No net lamport movement for this wallet.
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failed,
}

/// One row of the activity feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub signature: String,
    pub direction: Direction,
    /// Lamports moved from this wallet's point of view, net of the fee
    /// when it paid the fee.
    pub amount: u64,
    pub timestamp: Option<i64>,
    pub outcome: Outcome,
}

/// First-paint view rebuilt from the cache. Any field can be stale or
/// absent; the caller decides how to render that.
#[derive(Debug, Default)]
pub struct WalletSnapshot {
    pub balance: Option<CacheEntry<u64>>,
    pub activity: Option<CacheEntry<Vec<TransactionSummary>>>,
    pub assets: Option<CacheEntry<Vec<OwnedAsset>>>,
}

pub struct WalletState {
    query: Arc<dyn ChainQuery>,
    cache: CacheStore,
    resolver: OwnershipResolver,
    activity_limit: usize,
}

impl WalletState {
    pub fn new(query: Arc<dyn ChainQuery>, cache: CacheStore) -> Self {
        Self::with_resolver(query.clone(), cache, OwnershipResolver::new(query))
    }

    pub fn with_resolver(query: Arc<dyn ChainQuery>, cache: CacheStore, resolver: OwnershipResolver) -> Self {
        Self {
            query,
            cache,
            resolver,
            activity_limit: DEFAULT_ACTIVITY_LIMIT,
        }
    }

    pub fn with_activity_limit(mut self, limit: usize) -> Self {
        self.activity_limit = limit;
        self
    }

    /// Lamport balance through the cache (30 s TTL).
    pub async fn balance(&self, wallet: &Pubkey, force: bool) -> WalletResult<u64> {
        let key = CacheKey::new(CacheKind::Balance, *wallet);
        if let Some(hit) = self.cached(&key, force) {
            return Ok(hit);
        }
        let fresh = self.query.lamport_balance(wallet).await?;
        self.cache.put(&key, &fresh);
        Ok(fresh)
    }

    /// Recent transactions through the cache (60 s TTL).
    pub async fn activity(&self, wallet: &Pubkey, force: bool) -> WalletResult<Vec<TransactionSummary>> {
        let key = CacheKey::new(CacheKind::Activity, *wallet);
        if let Some(hit) = self.cached(&key, force) {
            return Ok(hit);
        }
        let fresh = self.fetch_activity(wallet).await?;
        self.cache.put(&key, &fresh);
        Ok(fresh)
    }

    /// Owned NFTs through the cache (60 s TTL). A refresh is a whole
    /// new resolution pass; the entry is replaced, never patched.
    pub async fn assets(&self, wallet: &Pubkey, force: bool) -> WalletResult<Vec<OwnedAsset>> {
        let key = CacheKey::new(CacheKind::Assets, *wallet);
        if let Some(hit) = self.cached(&key, force) {
            return Ok(hit);
        }
        let fresh = self.resolver.resolve(wallet).await?;
        self.cache.put(&key, &fresh);
        Ok(fresh)
    }

    /// Whatever the cache holds for `wallet`, fresh or stale. Never
    /// touches the network.
    pub fn hydrate(&self, wallet: &Pubkey) -> WalletSnapshot {
        WalletSnapshot {
            balance: self.cache.get(&CacheKey::new(CacheKind::Balance, *wallet)),
            activity: self.cache.get(&CacheKey::new(CacheKind::Activity, *wallet)),
            assets: self.cache.get(&CacheKey::new(CacheKind::Assets, *wallet)),
        }
    }

    /// After a confirmed buy/list/cancel/send, pull fresh balance and
    /// activity past the TTLs.
    pub async fn after_action(&self, wallet: &Pubkey) -> WalletResult<()> {
        self.balance(wallet, true).await?;
        self.activity(wallet, true).await?;
        Ok(())
    }

    fn cached<T: serde::de::DeserializeOwned>(&self, key: &CacheKey, force: bool) -> Option<T> {
        if force {
            return None;
        }
        let entry = self.cache.get::<T>(key)?;
        if entry.is_fresh(key.kind.ttl()) {
            info!(
                "✅ [WALLET] {} cache hit ({:.1}s old)",
                key.storage_key(),
                entry.age().as_secs_f64()
            );
            Some(entry.data)
        } else {
            None
        }
    }

    async fn fetch_activity(&self, wallet: &Pubkey) -> WalletResult<Vec<TransactionSummary>> {
        let records = self.query.signatures_for(wallet, self.activity_limit).await?;
        Ok(join_all(records.iter().map(|record| self.summarize(wallet, record))).await)
    }

    /// Build one feed row. A failed delta lookup degrades to a
    /// movement-free row rather than dropping the signature.
    async fn summarize(&self, wallet: &Pubkey, record: &SignatureRecord) -> TransactionSummary {
        let delta = match self.query.transaction_deltas(&record.signature).await {
            Ok(delta) => delta,
            Err(e) => {
                warn!("⚠️ [WALLET] delta lookup failed for {}: {e}", record.signature);
                None
            }
        };
        let (direction, amount) = delta
            .as_ref()
            .map(|d| classify(wallet, d))
            .unwrap_or((Direction::Other, 0));

        TransactionSummary {
            signature: record.signature.clone(),
            direction,
            amount,
            timestamp: delta.as_ref().and_then(|d| d.block_time).or(record.block_time),
            outcome: if record.err { Outcome::Failed } else { Outcome::Success },
        }
    }
}

/// Direction and net amount from the wallet's lamport movement. The fee
/// is subtracted from outgoing amounts when the wallet paid it (fee
/// payer is the first account key).
fn classify(wallet: &Pubkey, delta: &TxDelta) -> (Direction, u64) {
    let wallet_key = wallet.to_string();
    let index = match delta.account_keys.iter().position(|key| *key == wallet_key) {
        Some(index) => index,
        None => return (Direction::Other, 0),
    };
    let (pre, post) = match (delta.pre_balances.get(index), delta.post_balances.get(index)) {
        (Some(pre), Some(post)) => (*pre, *post),
        _ => return (Direction::Other, 0),
    };

    if post > pre {
        (Direction::Received, post - pre)
    } else {
        let fee = if index == 0 { delta.fee } else { 0 };
        let net = (pre - post).saturating_sub(fee);
        if net == 0 {
            // Fee-only movement: program interactions, cancels.
            (Direction::Other, 0)
        } else {
            (Direction::Sent, net)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use solana_sdk::native_token::LAMPORTS_PER_SOL;
    use std::sync::atomic::Ordering;

    use crate::cache::BALANCE_TTL;
    use crate::rpc::testing::MockChainQuery;

    fn state(chain: Arc<MockChainQuery>) -> WalletState {
        WalletState::new(chain, CacheStore::in_memory())
    }

    fn record(signature: &str, err: bool) -> SignatureRecord {
        SignatureRecord {
            signature: signature.to_string(),
            block_time: Some(1_722_000_000),
            err,
        }
    }

    fn transfer_delta(wallet: &Pubkey, pre: u64, post: u64, fee: u64, wallet_index: usize) -> TxDelta {
        let mut account_keys = vec![Pubkey::new_unique().to_string(), Pubkey::new_unique().to_string()];
        account_keys[wallet_index] = wallet.to_string();
        let mut pre_balances = vec![10 * LAMPORTS_PER_SOL, 10 * LAMPORTS_PER_SOL];
        let mut post_balances = pre_balances.clone();
        pre_balances[wallet_index] = pre;
        post_balances[wallet_index] = post;
        TxDelta {
            account_keys,
            pre_balances,
            post_balances,
            fee,
            block_time: Some(1_722_000_100),
            err: false,
        }
    }

    #[tokio::test]
    async fn fresh_balance_hit_never_touches_the_chain() {
        let chain = Arc::new(MockChainQuery::new());
        let wallet = Pubkey::new_unique();
        chain.set_balance(wallet, 5 * LAMPORTS_PER_SOL);
        let state = state(chain.clone());

        assert_eq!(state.balance(&wallet, false).await.unwrap(), 5 * LAMPORTS_PER_SOL);
        assert_eq!(state.balance(&wallet, false).await.unwrap(), 5 * LAMPORTS_PER_SOL);
        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forty_five_second_old_balance_refetches() {
        let chain = Arc::new(MockChainQuery::new());
        let wallet = Pubkey::new_unique();
        chain.set_balance(wallet, 2 * LAMPORTS_PER_SOL);
        let state = state(chain.clone());

        let key = CacheKey::new(CacheKind::Balance, wallet);
        state
            .cache
            .put_at(&key, &LAMPORTS_PER_SOL, Utc::now().timestamp_millis() - 45_000);

        // Past the 30 s TTL: one fetch, then the entry is fresh again.
        assert_eq!(state.balance(&wallet, false).await.unwrap(), 2 * LAMPORTS_PER_SOL);
        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), 1);

        let entry = state.cache.get::<u64>(&key).unwrap();
        assert_eq!(entry.data, 2 * LAMPORTS_PER_SOL);
        assert!(entry.is_fresh(BALANCE_TTL));
    }

    #[tokio::test]
    async fn forced_refresh_bypasses_a_fresh_entry() {
        let chain = Arc::new(MockChainQuery::new());
        let wallet = Pubkey::new_unique();
        chain.set_balance(wallet, LAMPORTS_PER_SOL);
        let state = state(chain.clone());

        state.balance(&wallet, false).await.unwrap();
        chain.set_balance(wallet, 9 * LAMPORTS_PER_SOL);

        assert_eq!(state.balance(&wallet, false).await.unwrap(), LAMPORTS_PER_SOL);
        assert_eq!(state.balance(&wallet, true).await.unwrap(), 9 * LAMPORTS_PER_SOL);
        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn balances_are_cached_per_wallet() {
        let chain = Arc::new(MockChainQuery::new());
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        chain.set_balance(a, 1);
        chain.set_balance(b, 2);
        let state = state(chain.clone());

        assert_eq!(state.balance(&a, false).await.unwrap(), 1);
        assert_eq!(state.balance(&b, false).await.unwrap(), 2);
        assert_eq!(state.balance(&a, false).await.unwrap(), 1);
        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn activity_rows_classify_lamport_movement() {
        let chain = Arc::new(MockChainQuery::new());
        let wallet = Pubkey::new_unique();
        chain.set_signatures(wallet, vec![record("sigIn", false), record("sigOut", false)]);
        chain.set_delta(
            "sigIn",
            transfer_delta(&wallet, LAMPORTS_PER_SOL, 3 * LAMPORTS_PER_SOL, 5_000, 1),
        );
        chain.set_delta(
            "sigOut",
            transfer_delta(&wallet, 3 * LAMPORTS_PER_SOL, 2 * LAMPORTS_PER_SOL - 5_000, 5_000, 0),
        );

        let rows = state(chain).activity(&wallet, false).await.unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].direction, Direction::Received);
        assert_eq!(rows[0].amount, 2 * LAMPORTS_PER_SOL);
        assert_eq!(rows[0].outcome, Outcome::Success);
        assert_eq!(rows[0].timestamp, Some(1_722_000_100));

        // Sent amount is net of the fee the wallet paid.
        assert_eq!(rows[1].direction, Direction::Sent);
        assert_eq!(rows[1].amount, LAMPORTS_PER_SOL);
    }

    #[test]
    fn fee_only_spend_reads_as_other() {
        let wallet = Pubkey::new_unique();
        let delta = transfer_delta(&wallet, LAMPORTS_PER_SOL, LAMPORTS_PER_SOL - 5_000, 5_000, 0);
        assert_eq!(classify(&wallet, &delta), (Direction::Other, 0));
    }

    #[test]
    fn uninvolved_wallet_reads_as_other() {
        let wallet = Pubkey::new_unique();
        let delta = transfer_delta(&Pubkey::new_unique(), 1, 2, 0, 0);
        assert_eq!(classify(&wallet, &delta), (Direction::Other, 0));
    }

    #[tokio::test]
    async fn missing_delta_keeps_the_row_with_no_movement() {
        let chain = Arc::new(MockChainQuery::new());
        let wallet = Pubkey::new_unique();
        chain.set_signatures(wallet, vec![record("known", false), record("pruned", true)]);
        chain.set_delta("known", transfer_delta(&wallet, 0, LAMPORTS_PER_SOL, 0, 1));

        let rows = state(chain).activity(&wallet, false).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].direction, Direction::Other);
        assert_eq!(rows[1].amount, 0);
        assert_eq!(rows[1].outcome, Outcome::Failed);
        // Falls back to the signature record's block time.
        assert_eq!(rows[1].timestamp, Some(1_722_000_000));
    }

    #[tokio::test]
    async fn delta_transport_failures_do_not_fail_the_feed() {
        let chain = Arc::new(MockChainQuery::new());
        let wallet = Pubkey::new_unique();
        chain.set_signatures(wallet, vec![record("one", false), record("two", false)]);
        chain.fail_deltas();

        let rows = state(chain).activity(&wallet, false).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.direction == Direction::Other));
    }

    #[tokio::test]
    async fn activity_respects_the_configured_limit() {
        let chain = Arc::new(MockChainQuery::new());
        let wallet = Pubkey::new_unique();
        chain.set_signatures(wallet, (0..30).map(|i| record(&format!("sig{i}"), false)).collect());

        let state = WalletState::new(chain, CacheStore::in_memory()).with_activity_limit(5);
        let rows = state.activity(&wallet, false).await.unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn assets_pass_through_the_cache_once() {
        let chain = Arc::new(MockChainQuery::new());
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        chain.set_holdings(
            wallet,
            vec![crate::rpc::TokenHolding {
                account: Pubkey::new_unique(),
                mint,
                amount: 1,
                decimals: 0,
            }],
        );
        let state = state(chain.clone());

        let first = state.assets(&wallet, false).await.unwrap();
        let second = state.assets(&wallet, false).await.unwrap();
        assert_eq!(first[0].mint, mint);
        assert_eq!(second[0].mint, mint);
        assert_eq!(chain.holdings_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hydrate_replays_stale_entries_without_fetching() {
        let chain = Arc::new(MockChainQuery::new());
        let wallet = Pubkey::new_unique();
        let state = state(chain.clone());

        let empty = state.hydrate(&wallet);
        assert!(empty.balance.is_none() && empty.activity.is_none() && empty.assets.is_none());

        state.cache.put_at(
            &CacheKey::new(CacheKind::Balance, wallet),
            &LAMPORTS_PER_SOL,
            Utc::now().timestamp_millis() - 600_000,
        );

        let snapshot = state.hydrate(&wallet);
        let balance = snapshot.balance.unwrap();
        assert_eq!(balance.data, LAMPORTS_PER_SOL);
        assert!(!balance.is_fresh(BALANCE_TTL));
        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn after_action_forces_balance_and_activity() {
        let chain = Arc::new(MockChainQuery::new());
        let wallet = Pubkey::new_unique();
        chain.set_balance(wallet, LAMPORTS_PER_SOL);
        let state = state(chain.clone());

        state.balance(&wallet, false).await.unwrap();
        state.activity(&wallet, false).await.unwrap();
        state.after_action(&wallet).await.unwrap();

        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), 2);
        assert_eq!(chain.signature_calls.load(Ordering::SeqCst), 2);
    }
}
