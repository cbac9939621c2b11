//! Ledger access and block ingestion for MEV Shield.

pub mod ledger;
pub mod memory;
pub mod rpc_client;
pub mod scheduler;
pub mod walker;

pub use ledger::{LedgerClient, LedgerError, LedgerResult};
pub use memory::InMemoryLedger;
pub use rpc_client::RpcClient;
pub use scheduler::{Schedule, Scheduler};
pub use walker::{BlockWalker, TickOutcome, TickReport, WalkerConfig};
