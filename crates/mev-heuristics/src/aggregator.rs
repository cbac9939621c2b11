//! Running totals of everything the classifier has flagged.

use crate::classifier::Classification;
use mev_shield_types::MevKind;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Extracted value is accumulated in millionths of a dollar.
const MICRO_USD_SCALE: u32 = 6;

/// Concurrency-safe detection counters.
///
/// Every field is an atomic cell, so block processing on any number of tasks
/// can call [`record`](DetectionAggregator::record) without losing updates.
#[derive(Debug, Default)]
pub struct DetectionAggregator {
    total_detected: AtomicU64,
    sandwich_count: AtomicU64,
    arbitrage_count: AtomicU64,
    extracted_micro_usd: AtomicU64,
    last_processed_block: AtomicU64,
}

/// Point-in-time read model of the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionStats {
    pub total_detected: u64,
    pub sandwich_count: u64,
    pub arbitrage_count: u64,
    pub extracted_value_usd: Decimal,
    pub last_processed_block: u64,
}

impl DetectionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one classification and add its estimated profit.
    pub fn record(&self, classification: &Classification) {
        let counter = match classification.kind {
            MevKind::Sandwich => &self.sandwich_count,
            MevKind::Arbitrage => &self.arbitrage_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_detected.fetch_add(1, Ordering::Relaxed);

        let micro = to_micro_usd(classification.estimated_profit_usd);
        let previous = self
            .extracted_micro_usd
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| {
                Some(total.saturating_add(micro))
            })
            .unwrap_or_default();
        if previous.checked_add(micro).is_none() {
            warn!("Extracted value total saturated at {} micro-USD", u64::MAX);
        }
    }

    /// Note that `number` has been fully classified. Never moves backwards.
    pub fn mark_block_processed(&self, number: u64) {
        self.last_processed_block.fetch_max(number, Ordering::Relaxed);
    }

    /// Read all counters.
    ///
    /// Each counter is exact at the time it is read; the snapshot as a whole
    /// is not fenced against a concurrent `record`.
    pub fn stats(&self) -> DetectionStats {
        DetectionStats {
            total_detected: self.total_detected.load(Ordering::Relaxed),
            sandwich_count: self.sandwich_count.load(Ordering::Relaxed),
            arbitrage_count: self.arbitrage_count.load(Ordering::Relaxed),
            extracted_value_usd: Decimal::from_i128_with_scale(
                self.extracted_micro_usd.load(Ordering::Relaxed) as i128,
                MICRO_USD_SCALE,
            )
            .normalize(),
            last_processed_block: self.last_processed_block.load(Ordering::Relaxed),
        }
    }
}

/// Profit in micro-USD. Amounts too large for the accumulator clamp to
/// `u64::MAX` instead of vanishing.
fn to_micro_usd(profit: Decimal) -> u64 {
    if profit.is_sign_negative() {
        return 0;
    }
    match profit
        .checked_mul(Decimal::from(10u64.pow(MICRO_USD_SCALE)))
        .and_then(|d| d.trunc().to_u64())
    {
        Some(micro) => micro,
        None => {
            warn!("Estimated profit ${} exceeds the accumulator range, clamping", profit);
            u64::MAX
        }
    }
}
