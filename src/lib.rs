// App-specific modules
pub mod cache;
pub mod config;
pub mod error;
pub mod market;
pub mod metadata;
pub mod resolver;
pub mod rpc;
pub mod session;
pub mod wallet;

pub use error::{WalletError, WalletResult};
