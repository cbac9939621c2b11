//! Chain data model and classification kinds.

use alloy::primitives::{Address, B256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of wei in one ether, as a decimal scale.
const ETH_DECIMALS: u32 = 18;

/// A transaction as seen by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: B256,
    pub from: Address,
    /// `None` for contract creations.
    pub to: Option<Address>,
    /// Transferred value in wei.
    pub value: U256,
    /// Gas price in wei. For EIP-1559 transactions this is the effective
    /// price reported by the node.
    pub gas_price: u128,
}

impl Transaction {
    pub fn new(
        hash: B256,
        from: Address,
        to: Option<Address>,
        value: U256,
        gas_price: u128,
    ) -> Self {
        Self {
            hash,
            from,
            to,
            value,
            gas_price,
        }
    }

    /// Whether this transaction calls `address`.
    pub fn targets(&self, address: &Address) -> bool {
        self.to.as_ref() == Some(address)
    }
}

/// A block and its transactions in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(number: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            number,
            transactions,
        }
    }

    /// Transactions whose recipient is `address`, with their block index.
    pub fn transactions_to<'a>(
        &'a self,
        address: &'a Address,
    ) -> impl Iterator<Item = (usize, &'a Transaction)> + 'a {
        self.transactions
            .iter()
            .enumerate()
            .filter(move |(_, tx)| tx.targets(address))
    }
}

/// Kinds of value extraction the classifier recognizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MevKind {
    Sandwich,
    Arbitrage,
}

impl MevKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MevKind::Sandwich => "sandwich",
            MevKind::Arbitrage => "arbitrage",
        }
    }
}

impl std::fmt::Display for MevKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a wei amount to ether.
///
/// Amounts beyond what a `Decimal` can represent saturate to `Decimal::MAX`.
pub fn wei_to_eth(wei: U256) -> Decimal {
    i128::try_from(wei)
        .ok()
        .and_then(|w| Decimal::try_from_i128_with_scale(w, ETH_DECIMALS).ok())
        .map(|d| d.normalize())
        .unwrap_or(Decimal::MAX)
}
