//! Shared chain data model for MEV Shield.
//!
//! Blocks and transactions here are read-only views of what the ledger
//! returned. Nothing in this crate is persisted.

pub mod models;

pub use models::{wei_to_eth, Block, MevKind, Transaction};
