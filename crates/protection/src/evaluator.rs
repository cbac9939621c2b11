//! Threat evaluation for protected contracts.

use crate::alert::Alert;
use alloy::primitives::Address;
use async_trait::async_trait;
use mev_shield_heuristics::classifier::brackets;
use mev_shield_types::Transaction;

/// What the monitor saw on the ledger this sweep.
#[derive(Debug, Clone)]
pub struct RecentActivity {
    pub block_number: u64,
    /// Every transaction of the latest block, in order.
    pub transactions: Vec<Transaction>,
    pub network_gas_price: u128,
}

#[async_trait]
pub trait ThreatEvaluator: Send + Sync {
    /// Decide whether `address` needs an alert given `activity`.
    async fn evaluate(
        &self,
        address: Address,
        activity: &RecentActivity,
    ) -> anyhow::Result<Option<Alert>>;
}

/// Looks for sandwich brackets, front-running and gas spikes around
/// transactions that call the contract.
///
/// Reports the most severe finding only: a sandwich, else a front-run,
/// else unusual gas.
#[derive(Debug, Clone)]
pub struct HeuristicThreatEvaluator {
    pub unusual_gas_multiplier: u128,
}

impl Default for HeuristicThreatEvaluator {
    fn default() -> Self {
        Self {
            unusual_gas_multiplier: 3,
        }
    }
}

impl HeuristicThreatEvaluator {
    fn sandwich(&self, address: &Address, txs: &[Transaction]) -> Option<Alert> {
        txs.windows(3)
            .find(|w| w[1].targets(address) && brackets(&w[0], &w[1], &w[2]))
            .map(|w| Alert::sandwich_attack(*address, w[1].hash))
    }

    /// A higher-paying call to the same contract from someone else lands
    /// right before a user's call.
    fn frontrun(&self, address: &Address, txs: &[Transaction]) -> Option<Alert> {
        txs.windows(2)
            .find(|w| {
                w[0].targets(address)
                    && w[1].targets(address)
                    && w[0].from != w[1].from
                    && w[0].gas_price > w[1].gas_price
            })
            .map(|w| Alert::frontrun_attempt(*address, w[0].hash))
    }

    fn unusual_gas(&self, address: &Address, activity: &RecentActivity) -> Option<Alert> {
        if activity.network_gas_price == 0 {
            return None;
        }
        let threshold = activity
            .network_gas_price
            .saturating_mul(self.unusual_gas_multiplier);
        activity
            .transactions
            .iter()
            .find(|tx| tx.targets(address) && tx.gas_price > threshold)
            .map(|tx| Alert::unusual_gas(*address, tx.hash))
    }
}

#[async_trait]
impl ThreatEvaluator for HeuristicThreatEvaluator {
    async fn evaluate(
        &self,
        address: Address,
        activity: &RecentActivity,
    ) -> anyhow::Result<Option<Alert>> {
        let txs = &activity.transactions;
        Ok(self
            .sandwich(&address, txs)
            .or_else(|| self.frontrun(&address, txs))
            .or_else(|| self.unusual_gas(&address, activity)))
    }
}
