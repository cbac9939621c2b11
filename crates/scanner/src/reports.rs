//! Optional scan sub-reports.

use crate::bytecode::{self, JUMPDEST, SLOAD, SSTORE};
use crate::model::{GasAnalysis, GasEfficiency, MempoolAnalysis, SuspiciousPattern};
use alloy::primitives::Address;
use mev_shield_heuristics::classifier::brackets;
use mev_shield_ingestion::{LedgerClient, LedgerResult};
use rust_decimal::Decimal;
use tracing::debug;

const GWEI_DECIMALS: u32 = 9;
/// A transaction is unusual above this multiple of the network gas price.
const UNUSUAL_GAS_MULTIPLIER: u128 = 3;

/// Gas profile from code size and storage opcode density.
pub fn gas_report(code: &[u8]) -> GasAnalysis {
    let sloads = bytecode::count_opcode(code, SLOAD);
    let sstores = bytecode::count_opcode(code, SSTORE);
    let jumpdests = bytecode::count_opcode(code, JUMPDEST);
    let storage_ops = sloads + sstores;
    // Storage opcodes per KiB of code.
    let density = storage_ops * 1024 / code.len().max(1);

    let efficiency = if code.len() > 12_000 || density > 20 {
        GasEfficiency::Low
    } else if code.len() > 2_500 || density > 8 {
        GasEfficiency::Medium
    } else {
        GasEfficiency::High
    };
    let savings = match efficiency {
        GasEfficiency::Low => 20,
        GasEfficiency::Medium => 12,
        GasEfficiency::High => 5,
    };

    let mut recommendations = Vec::new();
    if sloads >= 4 && sloads > 2 * sstores {
        recommendations.push("Cache repeated storage reads in memory".to_string());
    }
    if sstores >= 4 {
        recommendations.push("Use packed structs for storage efficiency".to_string());
    }
    if code.len() > 5_000 {
        recommendations.push("Large contract size; consider splitting into modules".to_string());
    }
    if jumpdests > 200 {
        recommendations.push("Consider simplifying control flow".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("No obvious gas optimizations found".to_string());
    }

    GasAnalysis {
        current_gas_efficiency: efficiency,
        optimization_potential: format!("~{}% gas reduction possible", savings),
        recommendations,
        estimated_savings_percent: savings,
        bytecode_size: code.len(),
        storage_ops,
    }
}

/// Activity around `address` over the last `lookback` blocks.
///
/// Blocks the ledger does not have are skipped. Any ledger error fails the
/// whole report.
pub async fn mempool_report(
    ledger: &dyn LedgerClient,
    address: Address,
    lookback: u64,
) -> LedgerResult<MempoolAnalysis> {
    let latest = ledger.get_latest_block_number().await?;
    let network_gas_price = ledger.get_gas_price().await?;
    let first = latest.saturating_sub(lookback.saturating_sub(1));

    let mut blocks_inspected = 0;
    let mut gas_prices = Vec::new();
    let mut suspicious_patterns = Vec::new();

    for number in first..=latest {
        let Some(block) = ledger.get_block(number).await? else {
            debug!("Block {} not available for mempool report", number);
            continue;
        };
        blocks_inspected += 1;

        for (i, tx) in block.transactions_to(&address) {
            gas_prices.push(tx.gas_price);

            let (Some(front), Some(back)) = (
                i.checked_sub(1).and_then(|p| block.transactions.get(p)),
                block.transactions.get(i + 1),
            ) else {
                continue;
            };
            if brackets(front, tx, back) {
                suspicious_patterns.push(SuspiciousPattern {
                    block_number: block.number,
                    victim_tx: tx.hash,
                    attacker: front.from,
                    description: format!(
                        "Transaction {} bracketed by {} in block {}",
                        tx.hash, front.from, block.number
                    ),
                });
            }
        }
    }

    let unusual_threshold = network_gas_price.saturating_mul(UNUSUAL_GAS_MULTIPLIER);
    let unusual_activity =
        network_gas_price > 0 && gas_prices.iter().any(|&p| p > unusual_threshold);
    let average = match gas_prices.len() {
        0 => 0,
        n => gas_prices.iter().sum::<u128>() / n as u128,
    };

    Ok(MempoolAnalysis {
        blocks_inspected,
        recent_transactions: gas_prices.len(),
        average_gas_price_gwei: to_gwei(average),
        network_gas_price_gwei: to_gwei(network_gas_price),
        unusual_activity,
        suspicious_patterns,
    })
}

fn to_gwei(wei: u128) -> Decimal {
    i128::try_from(wei)
        .ok()
        .and_then(|w| Decimal::try_from_i128_with_scale(w, GWEI_DECIMALS).ok())
        .map(|d| d.round_dp(2))
        .unwrap_or(Decimal::MAX)
}
