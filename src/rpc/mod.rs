//! Chain-query surface.
//!
//! Everything the panel reads from the cluster goes through
//! [`ChainQuery`], so the resolver and the wallet state can be driven by
//! a mock in tests. The live implementation wraps the nonblocking RPC
//! client and retries each query once against a fallback endpoint when
//! the primary fails.

#[cfg(test)]
pub mod testing;

use std::str::FromStr;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_account_decoder::{UiAccountData, UiAccountEncoding};
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcTransactionConfig};
use solana_client::rpc_filter::RpcFilterType;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_client::rpc_response::RpcKeyedAccount;
use solana_program::program_pack::Pack;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{EncodedTransaction, UiMessage, UiTransactionEncoding};

use crate::error::{WalletError, WalletResult};

/// A wallet's position in one token account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub account: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
    pub decimals: u8,
}

/// One row of the signature history for an address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub signature: String,
    pub block_time: Option<i64>,
    pub err: bool,
}

/// Lamport movement of one confirmed transaction.
#[derive(Clone, Debug, Default)]
pub struct TxDelta {
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub fee: u64,
    pub block_time: Option<i64>,
    pub err: bool,
}

/// Read-only window onto the cluster.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Every token holding of `owner` across both token programs.
    async fn token_holdings(&self, owner: &Pubkey) -> WalletResult<Vec<TokenHolding>>;

    /// Raw account data, or `None` when no account exists at `address`.
    async fn account_data(&self, address: &Pubkey) -> WalletResult<Option<Vec<u8>>>;

    /// Whether any account exists at `address`.
    async fn account_exists(&self, address: &Pubkey) -> WalletResult<bool> {
        Ok(self.account_data(address).await?.is_some())
    }

    async fn lamport_balance(&self, address: &Pubkey) -> WalletResult<u64>;

    /// Most recent `limit` signatures that touched `address`, newest
    /// first.
    async fn signatures_for(&self, address: &Pubkey, limit: usize) -> WalletResult<Vec<SignatureRecord>>;

    /// Balance-movement view of one transaction. `None` when the
    /// transaction could not be produced; never a hard failure of the
    /// feed.
    async fn transaction_deltas(&self, signature: &str) -> WalletResult<Option<TxDelta>>;

    /// Accounts owned by `program`, optionally filtered to an exact data
    /// length.
    async fn program_accounts(
        &self,
        program: &Pubkey,
        data_len: Option<u64>,
    ) -> WalletResult<Vec<(Pubkey, Vec<u8>)>>;
}

/// Live [`ChainQuery`] over JSON-RPC with single-shot failover.
pub struct RpcChainQuery {
    primary: RpcClient,
    fallback: Option<RpcClient>,
}

impl RpcChainQuery {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            primary: RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed()),
            fallback: None,
        }
    }

    pub fn with_fallback(rpc_url: &str, fallback_url: &str) -> Self {
        Self {
            fallback: Some(RpcClient::new_with_commitment(
                fallback_url.to_string(),
                CommitmentConfig::confirmed(),
            )),
            ..Self::new(rpc_url)
        }
    }

    /// Run `op` against the primary endpoint, once more against the
    /// fallback when the primary fails.
    async fn with_failover<'a, T, F>(&'a self, what: &str, op: F) -> WalletResult<T>
    where
        F: Fn(&'a RpcClient) -> BoxFuture<'a, Result<T, ClientError>>,
    {
        match op(&self.primary).await {
            Ok(value) => Ok(value),
            Err(primary_err) => match &self.fallback {
                Some(fallback) => {
                    warn!("⚠️ [RPC] {what} failed on primary ({primary_err}), retrying on fallback");
                    op(fallback)
                        .await
                        .map_err(|e| WalletError::Transport(format!("{what}: {e}")))
                }
                None => Err(WalletError::Transport(format!("{what}: {primary_err}"))),
            },
        }
    }

    /// Decimals of `mint`, read from the mint account itself.
    async fn mint_decimals(&self, mint: &Pubkey) -> WalletResult<Option<u8>> {
        let data = match self.account_data(mint).await? {
            Some(data) => data,
            None => return Ok(None),
        };
        Ok(spl_token::state::Mint::unpack(&data).ok().map(|m| m.decimals))
    }
}

#[async_trait]
impl ChainQuery for RpcChainQuery {
    async fn token_holdings(&self, owner: &Pubkey) -> WalletResult<Vec<TokenHolding>> {
        let owner = *owner;
        let mut holdings = Vec::new();
        for program in [spl_token::id(), spl_token_2022::id()] {
            let accounts = self
                .with_failover("token holdings enumeration", move |client| {
                    async move {
                        client
                            .get_token_accounts_by_owner(&owner, TokenAccountsFilter::ProgramId(program))
                            .await
                    }
                    .boxed()
                })
                .await?;

            for keyed in accounts {
                match parse_keyed_token_account(&keyed) {
                    ParsedTokenAccount::Ready(holding) => holdings.push(holding),
                    // A provider answered with base64 instead of
                    // jsonParsed; the raw layout has no decimals, the
                    // mint account does.
                    ParsedTokenAccount::MissingDecimals(partial) => {
                        match self.mint_decimals(&partial.mint).await {
                            Ok(Some(decimals)) => holdings.push(TokenHolding { decimals, ..partial }),
                            _ => warn!(
                                "⚠️ [RPC] no decimals for mint {}, skipping token account {}",
                                partial.mint, partial.account
                            ),
                        }
                    }
                    ParsedTokenAccount::Undecodable => {
                        warn!("⚠️ [RPC] skipping undecodable token account {}", keyed.pubkey)
                    }
                }
            }
        }
        Ok(holdings)
    }

    async fn account_data(&self, address: &Pubkey) -> WalletResult<Option<Vec<u8>>> {
        let address = *address;
        let response = self
            .with_failover("account lookup", move |client| {
                async move {
                    client
                        .get_account_with_commitment(&address, CommitmentConfig::confirmed())
                        .await
                }
                .boxed()
            })
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn lamport_balance(&self, address: &Pubkey) -> WalletResult<u64> {
        let address = *address;
        self.with_failover("balance query", move |client| {
            async move { client.get_balance(&address).await }.boxed()
        })
        .await
    }

    async fn signatures_for(&self, address: &Pubkey, limit: usize) -> WalletResult<Vec<SignatureRecord>> {
        let address = *address;
        let statuses = self
            .with_failover("signature history", move |client| {
                async move {
                    client
                        .get_signatures_for_address_with_config(
                            &address,
                            GetConfirmedSignaturesForAddress2Config {
                                limit: Some(limit),
                                ..Default::default()
                            },
                        )
                        .await
                }
                .boxed()
            })
            .await?;

        Ok(statuses
            .into_iter()
            .map(|status| SignatureRecord {
                signature: status.signature,
                block_time: status.block_time,
                err: status.err.is_some(),
            })
            .collect())
    }

    async fn transaction_deltas(&self, signature: &str) -> WalletResult<Option<TxDelta>> {
        let parsed = match Signature::from_str(signature) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("⚠️ [RPC] unparsable signature {signature}: {e}");
                return Ok(None);
            }
        };

        let lookup = self
            .with_failover("transaction lookup", move |client| {
                async move {
                    client
                        .get_transaction_with_config(
                            &parsed,
                            RpcTransactionConfig {
                                encoding: Some(UiTransactionEncoding::Json),
                                commitment: Some(CommitmentConfig::confirmed()),
                                max_supported_transaction_version: Some(0),
                            },
                        )
                        .await
                }
                .boxed()
            })
            .await;

        let tx = match lookup {
            Ok(tx) => tx,
            // Pruned or not-yet-indexed transactions stay in the feed as
            // movement-free rows.
            Err(e) => {
                warn!("⚠️ [RPC] transaction {signature} unavailable: {e}");
                return Ok(None);
            }
        };

        let meta = match tx.transaction.meta {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let account_keys = match tx.transaction.transaction {
            EncodedTransaction::Json(ui_tx) => match ui_tx.message {
                UiMessage::Raw(raw) => raw.account_keys,
                UiMessage::Parsed(parsed) => parsed.account_keys.into_iter().map(|k| k.pubkey).collect(),
            },
            _ => Vec::new(),
        };

        Ok(Some(TxDelta {
            account_keys,
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            fee: meta.fee,
            block_time: tx.block_time,
            err: meta.err.is_some(),
        }))
    }

    async fn program_accounts(
        &self,
        program: &Pubkey,
        data_len: Option<u64>,
    ) -> WalletResult<Vec<(Pubkey, Vec<u8>)>> {
        let program = *program;
        let filters = data_len.map(|len| vec![RpcFilterType::DataSize(len)]);
        let accounts = self
            .with_failover("program accounts scan", move |client| {
                let filters = filters.clone();
                async move {
                    client
                        .get_program_accounts_with_config(
                            &program,
                            RpcProgramAccountsConfig {
                                filters,
                                account_config: RpcAccountInfoConfig {
                                    encoding: Some(UiAccountEncoding::Base64),
                                    ..Default::default()
                                },
                                ..Default::default()
                            },
                        )
                        .await
                }
                .boxed()
            })
            .await?;

        Ok(accounts
            .into_iter()
            .map(|(address, account)| (address, account.data))
            .collect())
    }
}

enum ParsedTokenAccount {
    Ready(TokenHolding),
    /// Decoded from the raw 165-byte layout, which carries no decimals.
    MissingDecimals(TokenHolding),
    Undecodable,
}

fn parse_keyed_token_account(keyed: &RpcKeyedAccount) -> ParsedTokenAccount {
    let account = match Pubkey::from_str(&keyed.pubkey) {
        Ok(account) => account,
        Err(_) => return ParsedTokenAccount::Undecodable,
    };
    match &keyed.account.data {
        UiAccountData::Json(parsed) => match holding_from_parsed(account, &parsed.parsed) {
            Some(holding) => ParsedTokenAccount::Ready(holding),
            None => ParsedTokenAccount::Undecodable,
        },
        UiAccountData::Binary(_, _) | UiAccountData::LegacyBinary(_) => {
            let data = match keyed.account.data.decode() {
                Some(data) => data,
                None => return ParsedTokenAccount::Undecodable,
            };
            match spl_token::state::Account::unpack(&data) {
                Ok(token_account) => ParsedTokenAccount::MissingDecimals(TokenHolding {
                    account,
                    mint: token_account.mint,
                    amount: token_account.amount,
                    decimals: 0,
                }),
                Err(_) => ParsedTokenAccount::Undecodable,
            }
        }
    }
}

/// Dig a holding out of the jsonParsed account shape.
fn holding_from_parsed(account: Pubkey, parsed: &Value) -> Option<TokenHolding> {
    let info = parsed.get("info")?;
    let mint = Pubkey::from_str(info.get("mint")?.as_str()?).ok()?;
    let token_amount = info.get("tokenAmount")?;
    let amount = token_amount.get("amount")?.as_str()?.parse().ok()?;
    let decimals = token_amount.get("decimals")?.as_u64()? as u8;
    Some(TokenHolding {
        account,
        mint,
        amount,
        decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_program::program_option::COption;
    use spl_token::state::{Account as SplAccount, AccountState};

    #[test]
    fn holding_parses_from_json_parsed_shape() {
        let account = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let parsed = serde_json::json!({
            "type": "account",
            "info": {
                "isNative": false,
                "mint": mint.to_string(),
                "owner": Pubkey::new_unique().to_string(),
                "state": "initialized",
                "tokenAmount": {
                    "amount": "1",
                    "decimals": 0,
                    "uiAmount": 1.0,
                    "uiAmountString": "1"
                }
            }
        });

        let holding = holding_from_parsed(account, &parsed).unwrap();
        assert_eq!(holding.account, account);
        assert_eq!(holding.mint, mint);
        assert_eq!(holding.amount, 1);
        assert_eq!(holding.decimals, 0);
    }

    #[test]
    fn fungible_amounts_survive_the_string_field() {
        let parsed = serde_json::json!({
            "info": {
                "mint": Pubkey::new_unique().to_string(),
                "tokenAmount": { "amount": "2500000000", "decimals": 6 }
            }
        });
        let holding = holding_from_parsed(Pubkey::new_unique(), &parsed).unwrap();
        assert_eq!(holding.amount, 2_500_000_000);
        assert_eq!(holding.decimals, 6);
    }

    #[test]
    fn malformed_parsed_shape_is_rejected() {
        let parsed = serde_json::json!({ "info": { "mint": "not-a-pubkey" } });
        assert!(holding_from_parsed(Pubkey::new_unique(), &parsed).is_none());
    }

    #[test]
    fn raw_token_account_decodes_without_decimals() {
        let mint = Pubkey::new_unique();
        let spl_account = SplAccount {
            mint,
            owner: Pubkey::new_unique(),
            amount: 1,
            delegate: COption::None,
            state: AccountState::Initialized,
            is_native: COption::None,
            delegated_amount: 0,
            close_authority: COption::None,
        };
        let mut data = vec![0u8; SplAccount::LEN];
        SplAccount::pack(spl_account, &mut data).unwrap();

        match spl_token::state::Account::unpack(&data) {
            Ok(decoded) => {
                assert_eq!(decoded.mint, mint);
                assert_eq!(decoded.amount, 1);
            }
            Err(e) => panic!("raw layout should unpack: {e}"),
        }
    }

    #[tokio::test]
    async fn existence_follows_account_lookup() {
        let chain = testing::MockChainQuery::new();
        let present = Pubkey::new_unique();
        chain.set_account(present, vec![1, 2, 3]);

        assert!(chain.account_exists(&present).await.unwrap());
        assert!(!chain.account_exists(&Pubkey::new_unique()).await.unwrap());
    }
}
