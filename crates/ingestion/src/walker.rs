//! Periodic block walking and MEV classification.

use crate::ledger::LedgerClient;
use mev_shield_heuristics::{DetectionAggregator, MevClassifier};
use mev_shield_telemetry::Metrics;
use mev_shield_types::Block;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Block walker settings.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// How far behind the head the first tick starts.
    pub window: u64,
    /// Maximum number of blocks fetched per tick.
    pub batch: u64,
    pub period: Duration,
    pub initial_delay: Duration,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            window: 10,
            batch: 5,
            period: Duration::from_secs(30),
            initial_delay: Duration::from_secs(10),
        }
    }
}

/// What happened on one walker tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The head request failed and the ledger reports itself disconnected.
    Disconnected,
    /// The head could not be read; the tick was skipped.
    LedgerUnavailable,
    Walked(TickReport),
}

/// Summary of a tick that reached the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// Cursor before the tick.
    pub from: u64,
    /// Cursor after the tick.
    pub to: u64,
    pub latest: u64,
    pub blocks_processed: usize,
    pub blocks_missing: usize,
    pub detections: usize,
}

/// Walks the ledger forward in bounded batches and feeds each block to the
/// classifier.
pub struct BlockWalker {
    ledger: Arc<dyn LedgerClient>,
    classifier: MevClassifier,
    aggregator: Arc<DetectionAggregator>,
    metrics: Metrics,
    config: WalkerConfig,
    /// Last block handled. `None` until the first successful head read.
    cursor: Mutex<Option<u64>>,
}

impl BlockWalker {
    /// Create a new block walker.
    ///
    /// # Arguments
    /// * `ledger` - Source of blocks
    /// * `classifier` - MEV classifier applied to every block
    /// * `aggregator` - Receives every positive classification
    /// * `metrics` - Metrics collector
    /// * `config` - Window, batch and schedule
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        classifier: MevClassifier,
        aggregator: Arc<DetectionAggregator>,
        metrics: Metrics,
        config: WalkerConfig,
    ) -> Self {
        Self {
            ledger,
            classifier,
            aggregator,
            metrics,
            config,
            cursor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    pub async fn cursor(&self) -> Option<u64> {
        *self.cursor.lock().await
    }

    /// Run one walk step.
    ///
    /// Processes blocks in `(cursor, min(cursor + batch, latest)]`. A block
    /// the ledger does not have is skipped over; a block that fails to load
    /// ends the tick so it is retried next time. The cursor only moves
    /// forward, and never past the head read at the start of the tick.
    pub async fn tick(&self) -> TickOutcome {
        // Held for the whole tick so ticks never interleave.
        let mut cursor = self.cursor.lock().await;

        // The head is requested even after a lost connection; a successful
        // call is how a client learns the node is back.
        let latest = match self.ledger.get_latest_block_number().await {
            Ok(latest) => latest,
            Err(e) if !self.ledger.is_connected() => {
                debug!(
                    "Ledger disconnected ({}), skipping block walk: {}",
                    self.ledger.connection_status(),
                    e
                );
                return TickOutcome::Disconnected;
            }
            Err(e) => {
                warn!("Failed to get latest block number, skipping tick: {}", e);
                return TickOutcome::LedgerUnavailable;
            }
        };

        let start = *cursor.get_or_insert_with(|| {
            let start = latest.saturating_sub(self.config.window);
            info!("Starting MEV detection from block {}", start);
            start
        });
        let end = start.saturating_add(self.config.batch).min(latest);

        let mut report = TickReport {
            from: start,
            to: start,
            latest,
            blocks_processed: 0,
            blocks_missing: 0,
            detections: 0,
        };

        if end <= start {
            debug!("No new blocks, cursor {} latest {}", start, latest);
            return TickOutcome::Walked(report);
        }

        debug!("Processing blocks {} to {}", start + 1, end);
        for number in (start + 1)..=end {
            match self.ledger.get_block(number).await {
                Ok(Some(block)) => {
                    report.detections += self.process_block(&block);
                    report.blocks_processed += 1;
                }
                Ok(None) => {
                    warn!("Block {} not found, skipping", number);
                    report.blocks_missing += 1;
                }
                Err(e) => {
                    error!("Failed to fetch block {}: {}", number, e);
                    break;
                }
            }
            *cursor = Some(number);
            report.to = number;
        }

        info!(
            "Walked blocks {}..={}: {} processed, {} missing, {} MEV detections",
            report.from + 1,
            report.to,
            report.blocks_processed,
            report.blocks_missing,
            report.detections
        );
        TickOutcome::Walked(report)
    }

    /// Classify one block and record its detections. Returns how many
    /// classifications were recorded.
    fn process_block(&self, block: &Block) -> usize {
        let classifications = self.classifier.classify_block(block);

        for c in &classifications {
            self.aggregator.record(c);
            self.metrics.inc_mev_detection(c.kind.as_str());
            info!(
                "{} detected in block {}: actor {}, tx {}, estimated profit ${}",
                c.kind,
                block.number,
                c.actor,
                c.tx_hash,
                c.estimated_profit_usd.round_dp(2)
            );
        }

        self.aggregator.mark_block_processed(block.number);
        self.metrics.inc_blocks_processed();
        self.metrics
            .inc_transactions_processed(block.transactions.len() as u64);

        classifications.len()
    }
}
