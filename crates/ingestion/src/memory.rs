//! In-process ledger.
//!
//! Holds blocks, bytecode and a gas price in memory. Connectivity and
//! per-block failures can be toggled, which makes it the ledger of choice
//! for tests and offline runs.

use crate::ledger::{LedgerClient, LedgerError, LedgerResult};
use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use mev_shield_types::Block;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Ledger backed by in-memory maps.
#[derive(Debug)]
pub struct InMemoryLedger {
    blocks: DashMap<u64, Block>,
    code: DashMap<Address, Bytes>,
    failing_blocks: DashSet<u64>,
    latest: AtomicU64,
    gas_price: Mutex<u128>,
    connected: AtomicBool,
    block_requests: AtomicU64,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
            code: DashMap::new(),
            failing_blocks: DashSet::new(),
            latest: AtomicU64::new(0),
            gas_price: Mutex::new(0),
            connected: AtomicBool::new(true),
            block_requests: AtomicU64::new(0),
        }
    }

    /// Add a block. The head advances to it if it is the highest seen.
    pub fn push_block(&self, block: Block) {
        self.latest.fetch_max(block.number, Ordering::SeqCst);
        self.blocks.insert(block.number, block);
    }

    /// Force the reported head, including backwards (a lagging node).
    pub fn set_latest(&self, number: u64) {
        self.latest.store(number, Ordering::SeqCst);
    }

    pub fn set_code(&self, address: Address, code: impl Into<Bytes>) {
        self.code.insert(address, code.into());
    }

    pub fn set_gas_price(&self, wei: u128) {
        let mut price = match self.gas_price.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *price = wei;
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make `get_block(number)` return an RPC error until cleared.
    pub fn fail_block(&self, number: u64) {
        self.failing_blocks.insert(number);
    }

    pub fn clear_failures(&self) {
        self.failing_blocks.clear();
    }

    /// Number of `get_block` calls served so far.
    pub fn block_requests(&self) -> u64 {
        self.block_requests.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> LedgerResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("in-memory ledger offline".to_string()))
        }
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_latest_block_number(&self) -> LedgerResult<u64> {
        self.ensure_connected()?;
        Ok(self.latest.load(Ordering::SeqCst))
    }

    async fn get_block(&self, number: u64) -> LedgerResult<Option<Block>> {
        self.block_requests.fetch_add(1, Ordering::SeqCst);
        self.ensure_connected()?;
        if self.failing_blocks.contains(&number) {
            return Err(LedgerError::Rpc(format!("block {} unavailable", number)));
        }
        Ok(self.blocks.get(&number).map(|b| b.value().clone()))
    }

    async fn get_gas_price(&self) -> LedgerResult<u128> {
        self.ensure_connected()?;
        let price = match self.gas_price.lock() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        };
        Ok(price)
    }

    async fn get_code(&self, address: Address) -> LedgerResult<Bytes> {
        self.ensure_connected()?;
        Ok(self
            .code
            .get(&address)
            .map(|c| c.value().clone())
            .unwrap_or_default())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_status(&self) -> String {
        if self.is_connected() {
            "Connected to in-memory ledger".to_string()
        } else {
            "In-memory ledger offline".to_string()
        }
    }
}
