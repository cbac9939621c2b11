//! Periodic threat sweep over protected contracts.

use crate::alert::Alert;
use crate::evaluator::{RecentActivity, ThreatEvaluator};
use crate::publisher::{AlertPublisher, DeliveryReport};
use crate::registry::ProtectionRegistry;
use crate::subscriber::{Subscriber, SubscriberId};
use alloy::primitives::Address;
use mev_shield_ingestion::LedgerClient;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// No contract is protected.
    Idle,
    Disconnected,
    LedgerUnavailable,
    /// The head has not moved since the last sweep.
    NoNewBlock(u64),
    Swept(SweepReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub block_number: u64,
    pub evaluated: usize,
    pub alerts: usize,
    /// Alerts dropped by a contract's flags.
    pub suppressed: usize,
    pub failures: usize,
    pub delivered: usize,
    pub pruned: usize,
}

/// Entry point for protection: subscription changes and the sweep.
pub struct ThreatMonitor {
    ledger: Arc<dyn LedgerClient>,
    registry: Arc<ProtectionRegistry>,
    evaluator: Arc<dyn ThreatEvaluator>,
    publisher: AlertPublisher,
    last_swept: Mutex<Option<u64>>,
}

impl ThreatMonitor {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        registry: Arc<ProtectionRegistry>,
        evaluator: Arc<dyn ThreatEvaluator>,
        publisher: AlertPublisher,
    ) -> Self {
        Self {
            ledger,
            registry,
            evaluator,
            publisher,
            last_swept: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<ProtectionRegistry> {
        &self.registry
    }

    /// Subscribe `handle` to `address` and confirm to its subscribers.
    ///
    /// The confirmation does not count towards `alert_count`.
    pub fn enable_protection(&self, address: Address, handle: Arc<dyn Subscriber>) -> DeliveryReport {
        self.registry.subscribe(address, handle);
        self.publisher.publish(&Alert::protection_enabled(address))
    }

    /// Returns true if `address` is no longer protected.
    pub fn disable_protection(&self, address: Address, subscriber: SubscriberId) -> bool {
        self.registry.unsubscribe(address, subscriber)
    }

    /// Evaluate every protected contract against the latest block.
    pub async fn sweep(&self) -> SweepOutcome {
        // Held for the whole sweep so sweeps never overlap.
        let mut last_swept = self.last_swept.lock().await;

        // Abandoned contracts go away even when no alert is due.
        let pruned = self.publisher.prune_closed();
        if self.registry.is_empty() {
            return SweepOutcome::Idle;
        }

        // Always ask the ledger: a client that lost its connection only
        // finds out it is back by making a call.
        let activity = match self.recent_activity().await {
            Ok(Some(activity)) => activity,
            Ok(None) => {
                debug!("Latest block not available yet, skipping protection sweep");
                return SweepOutcome::LedgerUnavailable;
            }
            Err(e) if !self.ledger.is_connected() => {
                debug!(
                    "Ledger disconnected ({}), skipping protection sweep: {}",
                    self.ledger.connection_status(),
                    e
                );
                return SweepOutcome::Disconnected;
            }
            Err(e) => {
                warn!("Failed to read ledger for protection sweep: {}", e);
                return SweepOutcome::LedgerUnavailable;
            }
        };
        if *last_swept == Some(activity.block_number) {
            return SweepOutcome::NoNewBlock(activity.block_number);
        }
        *last_swept = Some(activity.block_number);

        let addresses = self.registry.addresses();
        debug!(
            "Sweeping {} protected contracts at block {}",
            addresses.len(),
            activity.block_number
        );

        let mut report = SweepReport {
            block_number: activity.block_number,
            pruned,
            ..Default::default()
        };
        for address in addresses {
            report.evaluated += 1;
            let alert = match self.evaluator.evaluate(address, &activity).await {
                Ok(Some(alert)) => alert,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Threat evaluation failed for {}: {:#}", address, e);
                    report.failures += 1;
                    continue;
                }
            };

            // The address may have been unsubscribed while we evaluated it.
            let Some(flags) = self.registry.flags(&address) else {
                continue;
            };
            if !flags.allows(alert.alert_type) {
                debug!("{} alert for {} suppressed by config", alert.alert_type, address);
                report.suppressed += 1;
                continue;
            }
            if self.registry.record_alert(&address).is_none() {
                continue;
            }

            info!(
                "{} ({:?}) for {} at block {}",
                alert.alert_type, alert.threat_level, address, activity.block_number
            );
            let delivery = self.publisher.publish(&alert);
            report.alerts += 1;
            report.delivered += delivery.delivered;
            report.pruned += delivery.pruned;
        }

        info!(
            "Protection sweep at block {}: {} evaluated, {} alerts, {} failures",
            report.block_number, report.evaluated, report.alerts, report.failures
        );
        SweepOutcome::Swept(report)
    }

    async fn recent_activity(&self) -> anyhow::Result<Option<RecentActivity>> {
        let latest = self.ledger.get_latest_block_number().await?;
        let network_gas_price = self.ledger.get_gas_price().await?;
        let block = self.ledger.get_block(latest).await?;
        Ok(block.map(|block| RecentActivity {
            block_number: block.number,
            transactions: block.transactions,
            network_gas_price,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertType;
    use crate::registry::AlertFlags;
    use crate::subscriber::ChannelSubscriber;
    use async_trait::async_trait;
    use mev_shield_ingestion::InMemoryLedger;
    use mev_shield_telemetry::Metrics;
    use mev_shield_types::Block;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Alerts for one address, fails for another, and can unsubscribe a
    /// third mid-sweep.
    struct Scripted {
        target: Address,
        alert_type: AlertType,
        broken: Option<Address>,
        drop_during_eval: Option<(Arc<ProtectionRegistry>, Address, SubscriberId)>,
    }

    #[async_trait]
    impl ThreatEvaluator for Scripted {
        async fn evaluate(
            &self,
            address: Address,
            _: &RecentActivity,
        ) -> anyhow::Result<Option<Alert>> {
            if let Some((registry, victim, id)) = &self.drop_during_eval {
                registry.unsubscribe(*victim, *id);
            }
            if Some(address) == self.broken {
                anyhow::bail!("evaluator offline");
            }
            if address != self.target {
                return Ok(None);
            }
            let alert = match self.alert_type {
                AlertType::UnusualGas => Alert::unusual_gas(address, Default::default()),
                _ => Alert::sandwich_attack(address, Default::default()),
            };
            Ok(Some(alert))
        }
    }

    fn scripted(target: Address) -> Scripted {
        Scripted {
            target,
            alert_type: AlertType::SandwichAttack,
            broken: None,
            drop_during_eval: None,
        }
    }

    fn setup(evaluator: Scripted) -> (Arc<InMemoryLedger>, ThreatMonitor) {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.push_block(Block::new(7, vec![]));
        let registry = Arc::new(ProtectionRegistry::new());
        let publisher = AlertPublisher::new(registry.clone(), Metrics::new().unwrap());
        let monitor = ThreatMonitor::new(ledger.clone(), registry, Arc::new(evaluator), publisher);
        (ledger, monitor)
    }

    fn protect(monitor: &ThreatMonitor, address: Address) -> (SubscriberId, UnboundedReceiver<String>) {
        let (sub, mut rx) = ChannelSubscriber::channel(monitor.registry().next_subscriber_id());
        let id = sub.id();
        monitor.enable_protection(address, Arc::new(sub));
        // Swallow the confirmation.
        assert!(rx.try_recv().unwrap().contains("PROTECTION_ENABLED"));
        (id, rx)
    }

    fn swept(outcome: SweepOutcome) -> SweepReport {
        match outcome {
            SweepOutcome::Swept(report) => report,
            other => panic!("expected a sweep, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sweep_skips_when_idle_or_disconnected() {
        let target = Address::from([1; 20]);
        let (ledger, monitor) = setup(scripted(target));
        assert_eq!(monitor.sweep().await, SweepOutcome::Idle);

        let (_id, _rx) = protect(&monitor, target);
        ledger.set_connected(false);
        assert_eq!(monitor.sweep().await, SweepOutcome::Disconnected);
    }

    #[tokio::test]
    async fn test_alert_counts_and_reaches_subscriber() {
        let target = Address::from([1; 20]);
        let quiet = Address::from([2; 20]);
        let (ledger, monitor) = setup(scripted(target));
        let (_id, mut rx) = protect(&monitor, target);
        let (_quiet_id, mut quiet_rx) = protect(&monitor, quiet);

        let report = swept(monitor.sweep().await);
        assert_eq!(report.block_number, 7);
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.alerts, 1);
        assert_eq!(report.delivered, 1);
        assert!(rx.try_recv().unwrap().contains("SANDWICH_ATTACK"));
        assert!(quiet_rx.try_recv().is_err());
        assert_eq!(monitor.registry().get_status(target).alert_count, Some(1));
        // The confirmation is not counted.
        assert_eq!(monitor.registry().get_status(quiet).alert_count, Some(0));

        // Same head: nothing re-evaluated.
        assert_eq!(monitor.sweep().await, SweepOutcome::NoNewBlock(7));

        ledger.push_block(Block::new(8, vec![]));
        swept(monitor.sweep().await);
        assert_eq!(monitor.registry().get_global_stats().total_alerts, 2);
    }

    #[tokio::test]
    async fn test_evaluator_error_is_isolated_per_address() {
        let target = Address::from([1; 20]);
        let broken = Address::from([3; 20]);
        let (_, monitor) = setup(Scripted {
            broken: Some(broken),
            ..scripted(target)
        });
        let (_a, mut rx) = protect(&monitor, target);
        let (_b, _rx_b) = protect(&monitor, broken);

        let report = swept(monitor.sweep().await);
        assert_eq!(report.failures, 1);
        assert_eq!(report.alerts, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_flags_suppress_alerts() {
        let target = Address::from([1; 20]);
        let (_, monitor) = setup(Scripted {
            alert_type: AlertType::UnusualGas,
            ..scripted(target)
        });
        let (_id, mut rx) = protect(&monitor, target);
        monitor.registry().update_flags(
            target,
            AlertFlags {
                alert_on_unusual_gas: false,
                ..Default::default()
            },
        );

        let report = swept(monitor.sweep().await);
        assert_eq!(report.alerts, 0);
        assert_eq!(report.suppressed, 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(monitor.registry().get_status(target).alert_count, Some(0));
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_pruned_during_sweep() {
        let target = Address::from([1; 20]);
        let (_, monitor) = setup(scripted(target));
        let (_live, mut live_rx) = protect(&monitor, target);
        let (_dead, dead_rx) = protect(&monitor, target);
        drop(dead_rx);

        let report = swept(monitor.sweep().await);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, 1);
        assert!(live_rx.try_recv().is_ok());
        assert_eq!(monitor.registry().get_status(target).active_connections, Some(1));
    }

    #[tokio::test]
    async fn test_quiet_sweep_drops_abandoned_contract() {
        let abandoned = Address::from([9; 20]);
        let watched = Address::from([8; 20]);
        // The evaluator never alerts on either address.
        let (ledger, monitor) = setup(scripted(Address::from([1; 20])));
        let (_gone, gone_rx) = protect(&monitor, abandoned);
        let (_live, _live_rx) = protect(&monitor, watched);
        drop(gone_rx);

        let report = swept(monitor.sweep().await);
        assert_eq!(report.alerts, 0);
        assert_eq!(report.pruned, 1);
        assert_eq!(report.evaluated, 1);
        assert!(!monitor.registry().is_protected(&abandoned));
        assert!(monitor.registry().get_status(abandoned).active_connections.is_none());

        let stats = monitor.registry().get_global_stats();
        assert_eq!(stats.total_protected_contracts, 1);
        assert_eq!(stats.active_connections, 1);

        // Pruning happens even when the head has not moved.
        let (_late, late_rx) = protect(&monitor, watched);
        drop(late_rx);
        assert_eq!(monitor.sweep().await, SweepOutcome::NoNewBlock(7));
        assert_eq!(monitor.registry().get_status(watched).active_connections, Some(1));

        ledger.push_block(Block::new(8, vec![]));
        assert_eq!(swept(monitor.sweep().await).pruned, 0);
    }

    #[tokio::test]
    async fn test_sweep_resumes_after_ledger_returns() {
        let target = Address::from([1; 20]);
        let (ledger, monitor) = setup(scripted(target));
        let (_id, mut rx) = protect(&monitor, target);

        ledger.set_connected(false);
        assert_eq!(monitor.sweep().await, SweepOutcome::Disconnected);
        assert_eq!(monitor.sweep().await, SweepOutcome::Disconnected);

        ledger.set_connected(true);
        let report = swept(monitor.sweep().await);
        assert_eq!(report.alerts, 1);
        assert!(rx.try_recv().unwrap().contains("SANDWICH_ATTACK"));
    }

    #[tokio::test]
    async fn test_unsubscribe_during_sweep_is_tolerated() {
        let target = Address::from([1; 20]);
        let registry = Arc::new(ProtectionRegistry::new());
        let (sub, _rx) = ChannelSubscriber::channel(registry.next_subscriber_id());
        let id = sub.id();
        registry.subscribe(target, Arc::new(sub));

        let ledger = Arc::new(InMemoryLedger::new());
        ledger.push_block(Block::new(1, vec![]));
        let evaluator = Scripted {
            drop_during_eval: Some((registry.clone(), target, id)),
            ..scripted(target)
        };
        let publisher = AlertPublisher::new(registry.clone(), Metrics::new().unwrap());
        let monitor = ThreatMonitor::new(ledger, registry.clone(), Arc::new(evaluator), publisher);

        let report = swept(monitor.sweep().await);
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.alerts, 0);
        assert!(!registry.is_protected(&target));
    }
}
