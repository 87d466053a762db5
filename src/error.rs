//! Error taxonomy for the wallet panel.
//!
//! Only failures the caller can act on surface as errors. Per-mint
//! metadata loss, unparsable listing accounts and cache persistence
//! problems are absorbed where they happen and logged instead.

use thiserror::Error;

pub type WalletResult<T> = std::result::Result<T, WalletError>;

#[derive(Debug, Error)]
pub enum WalletError {
    /// RPC transport failure on a query the caller asked for directly
    /// (holdings enumeration, balance, history). Safe to retry.
    #[error("rpc transport failure: {0}")]
    Transport(String),

    /// Malformed user input in the send flow. Raised before any network
    /// or signing call is made.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// The external wallet adapter rejected or failed a submission.
    /// Reported as-is, no automatic retry.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Metadata could not be produced for one mint. Callers that hold
    /// the owning asset absorb this and keep the asset.
    #[error("metadata unavailable for {mint}: {reason}")]
    Metadata { mint: String, reason: String },
}

impl From<solana_client::client_error::ClientError> for WalletError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        WalletError::Transport(err.to_string())
    }
}
