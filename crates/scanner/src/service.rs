//! Scan submission, pipeline and result store.

use crate::detectors::{default_detectors, run_detectors, Detector, DEFAULT_GAS_SIZE_THRESHOLD};
use crate::error::{ScanError, ScanResult};
use crate::model::{
    ScanAnalysis, ScanId, ScanOptions, ScanRecord, ScanStats, ScanStatus, VulnerabilitySummary,
};
use crate::recommendations::recommend;
use crate::reports::{gas_report, mempool_report};
use crate::scoring::{risk_level, risk_score};
use alloy::primitives::Address;
use dashmap::DashMap;
use mev_shield_ingestion::LedgerClient;
use mev_shield_telemetry::Metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub gas_size_threshold: usize,
    /// Blocks inspected by the mempool report, counting back from the head.
    pub mempool_lookback_blocks: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            gas_size_threshold: DEFAULT_GAS_SIZE_THRESHOLD,
            mempool_lookback_blocks: 5,
        }
    }
}

/// Runs contract scans and keeps their records.
pub struct ContractScanner {
    ledger: Arc<dyn LedgerClient>,
    detectors: Vec<Box<dyn Detector>>,
    config: ScannerConfig,
    metrics: Metrics,
    next_id: AtomicU64,
    records: DashMap<ScanId, ScanRecord>,
    history: DashMap<Address, Vec<ScanId>>,
    tracker: TaskTracker,
}

impl ContractScanner {
    /// Create a scanner with the production detector set.
    pub fn new(ledger: Arc<dyn LedgerClient>, config: ScannerConfig, metrics: Metrics) -> Self {
        let detectors = default_detectors(config.gas_size_threshold);
        Self::with_detectors(ledger, detectors, config, metrics)
    }

    pub fn with_detectors(
        ledger: Arc<dyn LedgerClient>,
        detectors: Vec<Box<dyn Detector>>,
        config: ScannerConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            ledger,
            detectors,
            config,
            metrics,
            next_id: AtomicU64::new(1),
            records: DashMap::new(),
            history: DashMap::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Queue a scan and return its id immediately.
    ///
    /// The PENDING record is visible through [`Self::get_by_id`] before
    /// this returns.
    pub fn submit_scan(self: &Arc<Self>, address: Address, options: ScanOptions) -> ScanId {
        let scan_id = self.register(address);
        let scanner = Arc::clone(self);
        self.tracker.spawn(async move {
            scanner.run_pipeline(scan_id, options).await;
        });
        scan_id
    }

    /// Run a scan to completion on the caller's task.
    pub async fn scan_now(&self, address: Address, options: ScanOptions) -> ScanRecord {
        let scan_id = self.register(address);
        self.run_pipeline(scan_id, options).await
    }

    /// Wait for every submitted scan to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    pub fn get_by_id(&self, scan_id: ScanId) -> Option<ScanRecord> {
        self.records.get(&scan_id).map(|r| r.value().clone())
    }

    /// Every scan of `address`, newest first.
    pub fn get_history_by_address(&self, address: &Address) -> Vec<ScanRecord> {
        let ids = match self.history.get(address) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };
        let mut records: Vec<ScanRecord> = ids
            .into_iter()
            .filter_map(|id| self.get_by_id(id))
            .collect();
        records.sort_by(|a, b| b.scan_id.cmp(&a.scan_id));
        records
    }

    pub fn get_aggregate_stats(&self) -> ScanStats {
        let mut stats = ScanStats {
            total_scans: 0,
            completed_scans: 0,
            failed_scans: 0,
            in_flight: 0,
            completion_rate: 0.0,
        };
        for record in self.records.iter() {
            stats.total_scans += 1;
            match record.status {
                ScanStatus::Completed => stats.completed_scans += 1,
                ScanStatus::Failed => stats.failed_scans += 1,
                ScanStatus::Pending | ScanStatus::Running => stats.in_flight += 1,
            }
        }
        if stats.total_scans > 0 {
            stats.completion_rate =
                stats.completed_scans as f64 * 100.0 / stats.total_scans as f64;
        }
        stats
    }

    fn register(&self, address: Address) -> ScanId {
        let scan_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records
            .insert(scan_id, ScanRecord::pending(scan_id, address));
        self.history.entry(address).or_default().push(scan_id);
        self.metrics.inc_scans("submitted");
        debug!("Registered scan {} for {}", scan_id, address);
        scan_id
    }

    fn store(&self, record: ScanRecord) -> ScanRecord {
        self.records.insert(record.scan_id, record.clone());
        record
    }

    async fn run_pipeline(&self, scan_id: ScanId, options: ScanOptions) -> ScanRecord {
        let Some(pending) = self.get_by_id(scan_id) else {
            // Unreachable through the public API: ids are registered first.
            error!("Scan {} vanished before it started", scan_id);
            return ScanRecord::pending(scan_id, Address::ZERO);
        };
        let address = pending.contract_address;
        let running = self.store(pending.running());

        let started = Instant::now();
        let outcome = self.analyze(address, options).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let record = match outcome {
            Ok(analysis) => {
                info!(
                    "Scan {} of {} completed in {}ms: risk {:?} (score {}), {} findings",
                    scan_id,
                    address,
                    duration_ms,
                    analysis.risk_level,
                    analysis.risk_score,
                    analysis.vulnerabilities.total
                );
                self.metrics.inc_scans("completed");
                running.completed(analysis, duration_ms)
            }
            Err(e) => {
                warn!("Scan {} of {} failed: {}", scan_id, address, e);
                self.metrics.inc_scans("failed");
                running.failed(&e, duration_ms)
            }
        };
        self.store(record)
    }

    async fn analyze(&self, address: Address, options: ScanOptions) -> ScanResult<ScanAnalysis> {
        let code = self.ledger.get_code(address).await?;
        if code.is_empty() {
            return Err(ScanError::NotAContract(address));
        }

        let findings = run_detectors(&self.detectors, &code);
        let risk_score = risk_score(&findings);
        let risk_level = risk_level(risk_score);
        let recommendations = recommend(&findings, risk_level);

        let gas_analysis = options.include_gas_analysis.then(|| gas_report(&code));
        let mempool_analysis = if options.include_mempool_analysis {
            match mempool_report(
                self.ledger.as_ref(),
                address,
                self.config.mempool_lookback_blocks,
            )
            .await
            {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Mempool report for {} omitted: {}", address, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(ScanAnalysis {
            vulnerabilities: VulnerabilitySummary::from_findings(findings),
            risk_score,
            risk_level,
            gas_analysis,
            mempool_analysis,
            recommendations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CALL, PUSH4, STOP};
    use crate::detectors::TRANSFER_SELECTOR;
    use crate::model::{Finding, FindingType, RiskLevel};
    use mev_shield_ingestion::InMemoryLedger;
    use mev_shield_types::Block;

    fn scanner_over(ledger: Arc<InMemoryLedger>) -> Arc<ContractScanner> {
        Arc::new(ContractScanner::new(
            ledger,
            ScannerConfig::default(),
            Metrics::new().unwrap(),
        ))
    }

    fn token_contract() -> Vec<u8> {
        // Unchecked CALL plus an unguarded transfer selector.
        let mut code = vec![PUSH4];
        code.extend_from_slice(&TRANSFER_SELECTOR);
        code.extend_from_slice(&[CALL, STOP]);
        code
    }

    #[tokio::test]
    async fn test_scan_of_contract_completes() {
        let ledger = Arc::new(InMemoryLedger::new());
        let contract = Address::from([0xC0; 20]);
        ledger.set_code(contract, token_contract());
        ledger.push_block(Block::new(1, vec![]));
        let scanner = scanner_over(ledger);

        let record = scanner
            .scan_now(
                contract,
                ScanOptions {
                    include_gas_analysis: true,
                    include_mempool_analysis: true,
                },
            )
            .await;

        assert_eq!(record.status, ScanStatus::Completed);
        assert_eq!(record.vulnerabilities.total, 2);
        assert_eq!(record.vulnerabilities.high, 1);
        assert_eq!(record.vulnerabilities.medium, 1);
        // HIGH 15 + MEDIUM 8
        assert_eq!(record.risk_score, 23);
        assert_eq!(record.risk_level, RiskLevel::Low);
        assert!(record.gas_analysis.is_some());
        assert!(record.mempool_analysis.is_some());
        assert!(record.recommendations.is_some());
        assert!(record.duration_ms.is_some());
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_account_without_code_fails_scan() {
        let ledger = Arc::new(InMemoryLedger::new());
        let scanner = scanner_over(ledger);
        let eoa = Address::from([0xE0; 20]);

        let record = scanner.scan_now(eoa, ScanOptions::default()).await;
        assert_eq!(record.status, ScanStatus::Failed);
        assert_eq!(record.risk_level, RiskLevel::Unknown);
        assert!(record.error.as_deref().unwrap().contains("no deployed code"));
        assert_eq!(scanner.get_aggregate_stats().failed_scans, 1);
    }

    #[tokio::test]
    async fn test_ledger_outage_fails_scan() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_connected(false);
        let scanner = scanner_over(ledger);

        let record = scanner
            .scan_now(Address::from([1; 20]), ScanOptions::default())
            .await;
        assert_eq!(record.status, ScanStatus::Failed);
        assert!(record.error.as_deref().unwrap().starts_with("ledger unavailable"));
    }

    #[tokio::test]
    async fn test_mempool_failure_does_not_fail_scan() {
        let ledger = Arc::new(InMemoryLedger::new());
        let contract = Address::from([0xC1; 20]);
        ledger.set_code(contract, vec![STOP]);
        ledger.push_block(Block::new(3, vec![]));
        ledger.fail_block(3);
        let scanner = scanner_over(ledger);

        let record = scanner.scan_now(contract, ScanOptions::default()).await;
        assert_eq!(record.status, ScanStatus::Completed);
        assert!(record.mempool_analysis.is_none());
    }

    struct Broken;
    impl Detector for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn detect(&self, _: &[u8]) -> ScanResult<Option<Finding>> {
            panic!("index out of bounds")
        }
    }

    #[tokio::test]
    async fn test_broken_detector_is_dropped() {
        let ledger = Arc::new(InMemoryLedger::new());
        let contract = Address::from([0xC2; 20]);
        ledger.set_code(contract, token_contract());
        let mut detectors = default_detectors(DEFAULT_GAS_SIZE_THRESHOLD);
        detectors.insert(0, Box::new(Broken));
        let scanner = ContractScanner::with_detectors(
            ledger,
            detectors,
            ScannerConfig::default(),
            Metrics::new().unwrap(),
        );

        let record = scanner.scan_now(contract, ScanOptions::default()).await;
        assert_eq!(record.status, ScanStatus::Completed);
        let types: Vec<FindingType> = record
            .vulnerabilities
            .details
            .iter()
            .map(|f| f.finding_type)
            .collect();
        assert_eq!(
            types,
            vec![FindingType::UncheckedExternalCall, FindingType::MevVulnerable]
        );
    }

    #[tokio::test]
    async fn test_submit_returns_pending_then_completes() {
        let ledger = Arc::new(InMemoryLedger::new());
        let contract = Address::from([0xC3; 20]);
        ledger.set_code(contract, vec![STOP]);
        let scanner = scanner_over(ledger);

        let id = scanner.submit_scan(contract, ScanOptions::default());
        assert!(scanner.get_by_id(id).is_some());

        scanner.drain().await;
        let record = scanner.get_by_id(id).unwrap();
        assert_eq!(record.status, ScanStatus::Completed);
        assert!(scanner.get_by_id(id + 1).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_get_distinct_ids() {
        let ledger = Arc::new(InMemoryLedger::new());
        let contract = Address::from([0xC4; 20]);
        ledger.set_code(contract, vec![STOP]);
        let scanner = scanner_over(ledger);

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let scanner = scanner.clone();
                tokio::spawn(async move {
                    let first = scanner.submit_scan(contract, ScanOptions::default());
                    let second = scanner.submit_scan(contract, ScanOptions::default());
                    (first, second)
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            let (first, second) = handle.await.unwrap();
            assert!(second > first);
            ids.extend([first, second]);
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=64).collect::<Vec<u64>>());

        scanner.drain().await;
        let history = scanner.get_history_by_address(&contract);
        assert_eq!(history.len(), 64);
        assert!(history.windows(2).all(|w| w[0].scan_id > w[1].scan_id));

        let stats = scanner.get_aggregate_stats();
        assert_eq!(stats.total_scans, 64);
        assert_eq!(stats.completed_scans, 64);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.completion_rate, 100.0);
    }

    #[tokio::test]
    async fn test_history_includes_failures_newest_first() {
        let ledger = Arc::new(InMemoryLedger::new());
        let contract = Address::from([0xC5; 20]);
        let scanner = scanner_over(ledger.clone());

        let failed = scanner.scan_now(contract, ScanOptions::default()).await;
        ledger.set_code(contract, vec![STOP]);
        let completed = scanner.scan_now(contract, ScanOptions::default()).await;

        let history = scanner.get_history_by_address(&contract);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].scan_id, completed.scan_id);
        assert_eq!(history[1].scan_id, failed.scan_id);
        assert_eq!(history[1].status, ScanStatus::Failed);
        assert!(scanner.get_history_by_address(&Address::ZERO).is_empty());
    }
}
