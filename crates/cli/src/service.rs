//! Wiring of the block walker, scanner and protection monitor.

use mev_shield_heuristics::{ClassifierConfig, DetectionAggregator, MevClassifier};
use mev_shield_ingestion::{BlockWalker, LedgerClient, Schedule, Scheduler, WalkerConfig};
use mev_shield_protection::{
    AlertPublisher, HeuristicThreatEvaluator, ProtectionRegistry, ThreatEvaluator, ThreatMonitor,
};
use mev_shield_scanner::{ContractScanner, ScannerConfig};
use mev_shield_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const BLOCK_WALK_TASK: &str = "block-walk";
pub const PROTECTION_SWEEP_TASK: &str = "protection-sweep";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub walker: WalkerConfig,
    pub classifier: ClassifierConfig,
    pub scanner: ScannerConfig,
    pub sweep: Schedule,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            walker: WalkerConfig::default(),
            classifier: ClassifierConfig::default(),
            scanner: ScannerConfig::default(),
            sweep: Schedule::every(Duration::from_secs(10))
                .with_initial_delay(Duration::from_secs(10)),
        }
    }
}

/// The running system: shared components plus the scheduler that drives
/// the two background loops.
pub struct Service {
    pub metrics: Metrics,
    pub aggregator: Arc<DetectionAggregator>,
    pub walker: Arc<BlockWalker>,
    pub scanner: Arc<ContractScanner>,
    pub monitor: Arc<ThreatMonitor>,
    config: ServiceConfig,
    scheduler: Scheduler,
}

impl Service {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: ServiceConfig, metrics: Metrics) -> Self {
        Self::with_evaluator(
            ledger,
            config,
            metrics,
            Arc::new(HeuristicThreatEvaluator::default()),
        )
    }

    pub fn with_evaluator(
        ledger: Arc<dyn LedgerClient>,
        config: ServiceConfig,
        metrics: Metrics,
        evaluator: Arc<dyn ThreatEvaluator>,
    ) -> Self {
        let aggregator = Arc::new(DetectionAggregator::new());
        let walker = Arc::new(BlockWalker::new(
            ledger.clone(),
            MevClassifier::new(config.classifier.clone()),
            aggregator.clone(),
            metrics.clone(),
            config.walker.clone(),
        ));
        let scanner = Arc::new(ContractScanner::new(
            ledger.clone(),
            config.scanner.clone(),
            metrics.clone(),
        ));
        let registry = Arc::new(ProtectionRegistry::new());
        let publisher = AlertPublisher::new(registry.clone(), metrics.clone());
        let monitor = Arc::new(ThreatMonitor::new(ledger, registry, evaluator, publisher));

        Self {
            metrics,
            aggregator,
            walker,
            scanner,
            monitor,
            config,
            scheduler: Scheduler::new(),
        }
    }

    /// Start the block walk and the protection sweep.
    pub fn start(&self) {
        let walker = self.walker.clone();
        let walk_schedule = Schedule::every(self.config.walker.period)
            .with_initial_delay(self.config.walker.initial_delay);
        self.scheduler
            .spawn_periodic(BLOCK_WALK_TASK, walk_schedule, move || {
                let walker = walker.clone();
                async move {
                    walker.tick().await;
                    Ok(())
                }
            });

        let monitor = self.monitor.clone();
        self.scheduler
            .spawn_periodic(PROTECTION_SWEEP_TASK, self.config.sweep, move || {
                let monitor = monitor.clone();
                async move {
                    monitor.sweep().await;
                    Ok(())
                }
            });

        info!("MEV Shield background tasks started");
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Stop both loops, then wait for queued scans.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.scanner.drain().await;
        info!("MEV Shield stopped");
    }
}
