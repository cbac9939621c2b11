//! MEV pattern classification.
//!
//! Every check here is a necessary-but-not-sufficient signal. A positive
//! result means the transactions *look like* a sandwich or an arbitrage,
//! not that anyone intended one. Profit figures use a fixed reference
//! price and fixed percentages; treat them as rough placeholders.

use alloy::primitives::{address, Address, B256, U256};
use mev_shield_types::{wei_to_eth, Block, MevKind, Transaction};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

/// Share of the victim's value assumed captured by a sandwich (0.2%).
const SANDWICH_PROFIT_RATE: Decimal = Decimal::from_parts(2, 0, 0, false, 3);

/// Share of the traded value assumed captured by an arbitrage (0.5%).
const ARBITRAGE_PROFIT_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// 30 gwei.
const DEFAULT_HIGH_GAS_THRESHOLD: u128 = 30_000_000_000;

/// 1 ETH in wei.
const DEFAULT_VALUE_THRESHOLD: u128 = 1_000_000_000_000_000_000;

/// Routers watched by default: Uniswap V2, SushiSwap, PancakeSwap, Uniswap V3.
pub const DEFAULT_ROUTERS: [Address; 4] = [
    address!("7a250d5630b4cf539739df2c5dacb4c659f2488d"),
    address!("d9e1ce17f2641f24ae83637ab66a2cca9c378b9f"),
    address!("10ed43c718714eb63d5aa57b78b54704e256024e"),
    address!("e592427a0aece92de3edee1f18e0157c05861564"),
];

/// Classifier thresholds and the router allow-list.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Known exchange routers. Addresses are byte values, so matching is
    /// independent of the hex casing they were configured with.
    pub routers: HashSet<Address>,
    /// Arbitrage requires a gas price strictly above this (wei).
    pub high_gas_threshold: u128,
    /// Arbitrage requires a value strictly above this (wei).
    pub value_threshold: U256,
    /// ETH price in USD used for profit estimates.
    pub reference_price_usd: Decimal,
    /// Classifications with a smaller estimated profit are dropped by
    /// [`MevClassifier::classify_block`].
    pub min_profit_usd: Decimal,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            routers: DEFAULT_ROUTERS.into_iter().collect(),
            high_gas_threshold: DEFAULT_HIGH_GAS_THRESHOLD,
            value_threshold: U256::from(DEFAULT_VALUE_THRESHOLD),
            reference_price_usd: Decimal::from(3000),
            min_profit_usd: Decimal::ZERO,
        }
    }
}

/// A positive classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub kind: MevKind,
    /// Sender of the front/back-run pair, or of the arbitrage transaction.
    pub actor: Address,
    /// The victim transaction for a sandwich, the transaction itself for
    /// an arbitrage.
    pub tx_hash: B256,
    pub estimated_profit_usd: Decimal,
}

/// Heuristic sandwich and arbitrage classifier.
#[derive(Debug, Clone, Default)]
pub struct MevClassifier {
    config: ClassifierConfig,
}

/// Whether `front` and `back` bracket `victim`: one sender on both outer
/// transactions, each paying at least the victim's gas price.
///
/// This ignores recipients; callers decide which contracts count.
pub fn brackets(front: &Transaction, victim: &Transaction, back: &Transaction) -> bool {
    front.from == back.from
        && front.gas_price >= victim.gas_price
        && back.gas_price >= victim.gas_price
}

impl MevClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Whether `tx` calls one of the known routers.
    pub fn targets_router(&self, tx: &Transaction) -> bool {
        tx.to
            .as_ref()
            .is_some_and(|to| self.config.routers.contains(to))
    }

    /// Check whether `front`, `victim`, `back` form a sandwich.
    ///
    /// Requires the same sender on both outer transactions, all three
    /// calling a known router, and both outer gas prices at or above the
    /// victim's.
    pub fn classify_sandwich(
        &self,
        front: &Transaction,
        victim: &Transaction,
        back: &Transaction,
    ) -> Option<Classification> {
        let all_to_router = self.targets_router(front)
            && self.targets_router(victim)
            && self.targets_router(back);

        if !(all_to_router && brackets(front, victim, back)) {
            return None;
        }

        Some(Classification {
            kind: MevKind::Sandwich,
            actor: front.from,
            tx_hash: victim.hash,
            estimated_profit_usd: self.estimate(victim.value, SANDWICH_PROFIT_RATE),
        })
    }

    /// Check whether `tx` looks like an arbitrage: a router call paying a
    /// premium gas price and moving significant value.
    pub fn classify_arbitrage(&self, tx: &Transaction) -> Option<Classification> {
        if !self.targets_router(tx) {
            return None;
        }
        if tx.gas_price <= self.config.high_gas_threshold || tx.value <= self.config.value_threshold
        {
            return None;
        }

        Some(Classification {
            kind: MevKind::Arbitrage,
            actor: tx.from,
            tx_hash: tx.hash,
            estimated_profit_usd: self.estimate(tx.value, ARBITRAGE_PROFIT_RATE),
        })
    }

    /// Classify every sandwich window and every transaction of a block.
    ///
    /// Sandwiches are checked over consecutive triples `(i - 1, i, i + 1)`.
    /// Results below `min_profit_usd` are dropped.
    pub fn classify_block(&self, block: &Block) -> Vec<Classification> {
        let sandwiches = block
            .transactions
            .windows(3)
            .filter_map(|w| self.classify_sandwich(&w[0], &w[1], &w[2]));
        let arbitrages = block
            .transactions
            .iter()
            .filter_map(|tx| self.classify_arbitrage(tx));

        sandwiches
            .chain(arbitrages)
            .filter(|c| c.estimated_profit_usd >= self.config.min_profit_usd)
            .collect()
    }

    fn estimate(&self, value: U256, rate: Decimal) -> Decimal {
        wei_to_eth(value)
            .checked_mul(rate)
            .and_then(|v| v.checked_mul(self.config.reference_price_usd))
            .unwrap_or(Decimal::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETH: u128 = 1_000_000_000_000_000_000;
    const GWEI: u128 = 1_000_000_000;

    fn router() -> Address {
        DEFAULT_ROUTERS[0]
    }

    fn tx(from: u8, to: Option<Address>, value: u128, gas_price: u128) -> Transaction {
        Transaction::new(
            B256::from([from; 32]),
            Address::from([from; 20]),
            to,
            U256::from(value),
            gas_price,
        )
    }

    #[test]
    fn test_sandwich_positive() {
        let classifier = MevClassifier::default();
        let front = tx(0xA, Some(router()), 0, 80);
        let victim = tx(0xB, Some(router()), 10 * ETH, 40);
        let back = tx(0xA, Some(router()), 0, 75);

        let found = classifier
            .classify_sandwich(&front, &victim, &back)
            .expect("should classify as sandwich");
        assert_eq!(found.kind, MevKind::Sandwich);
        assert_eq!(found.actor, front.from);
        assert_eq!(found.tx_hash, victim.hash);
        // 10 * 0.002 * 3000
        assert_eq!(found.estimated_profit_usd, Decimal::from(60));
    }

    #[test]
    fn test_sandwich_rejects_victim_outbidding_both_sides() {
        let classifier = MevClassifier::default();
        let front = tx(0xA, Some(router()), 0, 80);
        let victim = tx(0xB, Some(router()), 10 * ETH, 90);
        let back = tx(0xA, Some(router()), 0, 75);

        assert!(classifier.classify_sandwich(&front, &victim, &back).is_none());
    }

    #[test]
    fn test_sandwich_requires_same_actor_and_routers() {
        let classifier = MevClassifier::default();
        let victim = tx(0xB, Some(router()), ETH, 40);

        let front = tx(0xA, Some(router()), 0, 80);
        let back = tx(0xC, Some(router()), 0, 80);
        assert!(classifier.classify_sandwich(&front, &victim, &back).is_none());

        let elsewhere = Address::from([0xEE; 20]);
        let front = tx(0xA, Some(router()), 0, 80);
        let back = tx(0xA, Some(elsewhere), 0, 80);
        assert!(classifier.classify_sandwich(&front, &victim, &back).is_none());

        let back = tx(0xA, None, 0, 80);
        assert!(classifier.classify_sandwich(&front, &victim, &back).is_none());
    }

    #[test]
    fn test_brackets_ignores_recipients() {
        let pool = Address::from([0xEE; 20]);
        let front = tx(0xA, Some(pool), 0, 80);
        let victim = tx(0xB, Some(pool), ETH, 40);
        let back = tx(0xA, Some(pool), 0, 75);
        assert!(brackets(&front, &victim, &back));
        assert!(MevClassifier::default()
            .classify_sandwich(&front, &victim, &back)
            .is_none());
    }

    #[test]
    fn test_sandwich_accepts_equal_gas() {
        let classifier = MevClassifier::default();
        let front = tx(0xA, Some(router()), 0, 40);
        let victim = tx(0xB, Some(router()), ETH, 40);
        let back = tx(0xA, Some(router()), 0, 40);
        assert!(classifier.classify_sandwich(&front, &victim, &back).is_some());
    }

    #[test]
    fn test_arbitrage_thresholds_are_strict() {
        let classifier = MevClassifier::default();

        let hit = tx(0xA, Some(router()), 2 * ETH, 31 * GWEI);
        let found = classifier.classify_arbitrage(&hit).expect("arbitrage");
        // 2 * 0.005 * 3000
        assert_eq!(found.estimated_profit_usd, Decimal::from(30));

        let at_gas_threshold = tx(0xA, Some(router()), 2 * ETH, 30 * GWEI);
        assert!(classifier.classify_arbitrage(&at_gas_threshold).is_none());

        let at_value_threshold = tx(0xA, Some(router()), ETH, 31 * GWEI);
        assert!(classifier.classify_arbitrage(&at_value_threshold).is_none());

        let not_router = tx(0xA, Some(Address::from([0xEE; 20])), 2 * ETH, 31 * GWEI);
        assert!(classifier.classify_arbitrage(&not_router).is_none());
    }

    #[test]
    fn test_classify_block_finds_both_kinds() {
        let classifier = MevClassifier::default();
        let block = Block::new(
            100,
            vec![
                tx(0x1, Some(router()), 0, 50 * GWEI),
                tx(0x2, Some(router()), 5 * ETH, 40 * GWEI),
                tx(0x1, Some(router()), 0, 50 * GWEI),
                tx(0x3, None, 0, GWEI),
            ],
        );

        let found = classifier.classify_block(&block);
        let kinds: Vec<MevKind> = found.iter().map(|c| c.kind).collect();
        // One sandwich around tx 1; tx 1 is also a high-gas, high-value router call.
        assert_eq!(kinds, vec![MevKind::Sandwich, MevKind::Arbitrage]);
    }

    #[test]
    fn test_classify_block_applies_min_profit() {
        let config = ClassifierConfig {
            min_profit_usd: Decimal::from(100),
            ..Default::default()
        };
        let classifier = MevClassifier::new(config);
        let block = Block::new(
            1,
            vec![
                tx(0x1, Some(router()), 0, 50),
                tx(0x2, Some(router()), ETH, 40),
                tx(0x1, Some(router()), 0, 50),
            ],
        );
        // Estimated 6 USD, below the floor.
        assert!(classifier.classify_block(&block).is_empty());
    }

    #[test]
    fn test_short_block_has_no_sandwich_window() {
        let classifier = MevClassifier::default();
        let block = Block::new(1, vec![tx(0x1, Some(router()), 0, 50)]);
        assert!(classifier.classify_block(&block).is_empty());
    }
}
