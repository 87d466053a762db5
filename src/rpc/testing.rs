//! Programmable [`ChainQuery`] used by the module tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use super::{ChainQuery, SignatureRecord, TokenHolding, TxDelta};
use crate::error::{WalletError, WalletResult};

/// In-memory chain fixture with per-query call counters.
#[derive(Default)]
pub struct MockChainQuery {
    holdings: Mutex<HashMap<Pubkey, Vec<TokenHolding>>>,
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    balances: Mutex<HashMap<Pubkey, u64>>,
    signatures: Mutex<HashMap<Pubkey, Vec<SignatureRecord>>>,
    deltas: Mutex<HashMap<String, TxDelta>>,
    program_owned: Mutex<HashMap<Pubkey, Vec<(Pubkey, Vec<u8>)>>>,
    fail_enumeration: AtomicBool,
    fail_accounts: AtomicBool,
    fail_deltas: AtomicBool,
    pub holdings_calls: AtomicUsize,
    pub account_calls: AtomicUsize,
    pub balance_calls: AtomicUsize,
    pub signature_calls: AtomicUsize,
    pub delta_calls: AtomicUsize,
}

impl MockChainQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_holdings(&self, owner: Pubkey, holdings: Vec<TokenHolding>) {
        self.holdings.lock().unwrap().insert(owner, holdings);
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.balances.lock().unwrap().insert(address, lamports);
    }

    pub fn set_signatures(&self, address: Pubkey, records: Vec<SignatureRecord>) {
        self.signatures.lock().unwrap().insert(address, records);
    }

    pub fn set_delta(&self, signature: &str, delta: TxDelta) {
        self.deltas.lock().unwrap().insert(signature.to_string(), delta);
    }

    pub fn set_program_accounts(&self, program: Pubkey, accounts: Vec<(Pubkey, Vec<u8>)>) {
        self.program_owned.lock().unwrap().insert(program, accounts);
    }

    /// Make every holdings enumeration fail from now on.
    pub fn fail_enumeration(&self) {
        self.fail_enumeration.store(true, Ordering::SeqCst);
    }

    /// Make every account lookup fail from now on.
    pub fn fail_accounts(&self) {
        self.fail_accounts.store(true, Ordering::SeqCst);
    }

    /// Make every delta lookup fail from now on.
    pub fn fail_deltas(&self) {
        self.fail_deltas.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainQuery for MockChainQuery {
    async fn token_holdings(&self, owner: &Pubkey) -> WalletResult<Vec<TokenHolding>> {
        self.holdings_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(WalletError::Transport("holdings enumeration refused".into()));
        }
        Ok(self.holdings.lock().unwrap().get(owner).cloned().unwrap_or_default())
    }

    async fn account_data(&self, address: &Pubkey) -> WalletResult<Option<Vec<u8>>> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_accounts.load(Ordering::SeqCst) {
            return Err(WalletError::Transport("account lookup refused".into()));
        }
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn lamport_balance(&self, address: &Pubkey) -> WalletResult<u64> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.balances.lock().unwrap().get(address).copied().unwrap_or(0))
    }

    async fn signatures_for(&self, address: &Pubkey, limit: usize) -> WalletResult<Vec<SignatureRecord>> {
        self.signature_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.signatures.lock().unwrap().get(address).cloned().unwrap_or_default();
        records.truncate(limit);
        Ok(records)
    }

    async fn transaction_deltas(&self, signature: &str) -> WalletResult<Option<TxDelta>> {
        self.delta_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deltas.load(Ordering::SeqCst) {
            return Err(WalletError::Transport("transaction lookup refused".into()));
        }
        Ok(self.deltas.lock().unwrap().get(signature).cloned())
    }

    async fn program_accounts(
        &self,
        program: &Pubkey,
        data_len: Option<u64>,
    ) -> WalletResult<Vec<(Pubkey, Vec<u8>)>> {
        let accounts = self.program_owned.lock().unwrap().get(program).cloned().unwrap_or_default();
        Ok(accounts
            .into_iter()
            .filter(|(_, data)| data_len.map(|len| data.len() as u64 == len).unwrap_or(true))
            .collect())
    }
}
