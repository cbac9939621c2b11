//! Ledger client interface.
//!
//! Everything that reads chain state goes through [`LedgerClient`], so the
//! walker, scanner and protection monitor can run against a live node
//! ([`RpcClient`](crate::RpcClient)) or an in-process ledger
//! ([`InMemoryLedger`](crate::InMemoryLedger)) without changes.

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use mev_shield_types::Block;

/// Error type for ledger operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Ledger call timed out")]
    Timeout,
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Read access to the ledger.
///
/// Implementations bound every call by a timeout. Callers treat any error
/// as "skip this cycle"; nothing here retries.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Get the latest block number.
    async fn get_latest_block_number(&self) -> LedgerResult<u64>;

    /// Get a block with its full transactions, or `None` if the node does
    /// not know it.
    async fn get_block(&self, number: u64) -> LedgerResult<Option<Block>>;

    /// Get the current network gas price in wei.
    async fn get_gas_price(&self) -> LedgerResult<u128>;

    /// Get the deployed bytecode at `address`. Empty for externally owned
    /// accounts.
    async fn get_code(&self, address: Address) -> LedgerResult<Bytes>;

    /// Whether the last interaction with the ledger succeeded.
    fn is_connected(&self) -> bool;

    /// Human-readable connection state.
    fn connection_status(&self) -> String;
}
