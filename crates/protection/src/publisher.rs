//! Fan-out of alerts to a contract's subscribers.

use crate::alert::Alert;
use crate::registry::ProtectionRegistry;
use mev_shield_telemetry::Metrics;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub pruned: usize,
}

pub struct AlertPublisher {
    registry: Arc<ProtectionRegistry>,
    metrics: Metrics,
}

impl AlertPublisher {
    pub fn new(registry: Arc<ProtectionRegistry>, metrics: Metrics) -> Self {
        Self { registry, metrics }
    }

    /// Deliver `alert` to every subscriber of its contract.
    ///
    /// Sends happen on a snapshot of the handles, outside the registry
    /// lock. Closed handles and handles whose send fails are removed
    /// afterwards; the rest still receive the alert.
    pub fn publish(&self, alert: &Alert) -> DeliveryReport {
        let address = alert.contract_address;
        let message = match serde_json::to_string(alert) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} alert: {}", alert.alert_type, e);
                return DeliveryReport::default();
            }
        };

        let mut report = DeliveryReport::default();
        let mut dead = Vec::new();
        for handle in self.registry.handles(&address) {
            if !handle.is_open() {
                dead.push(handle.id());
                continue;
            }
            match handle.send(&message) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Dropping subscriber {} of {}: {}", handle.id(), address, e);
                    dead.push(handle.id());
                }
            }
        }

        if !dead.is_empty() {
            let outcome = self.registry.prune(address, &dead);
            report.pruned = outcome.removed;
            self.metrics.inc_subscribers_pruned(outcome.removed as u64);
            if outcome.unprotected {
                debug!("{} has no live subscribers left", address);
            }
        }

        self.metrics.inc_alerts_published();
        debug!(
            "Alert {} for {}: {} delivered, {} pruned",
            alert.alert_type, address, report.delivered, report.pruned
        );
        report
    }

    /// Drop closed handles from every protected address, whether or not an
    /// alert is due. Returns how many were removed.
    pub fn prune_closed(&self) -> usize {
        let mut removed = 0;
        for address in self.registry.addresses() {
            let outcome = self.registry.prune_closed(address);
            removed += outcome.removed;
        }
        if removed > 0 {
            self.metrics.inc_subscribers_pruned(removed as u64);
            debug!("Pruned {} closed subscribers", removed);
        }
        removed
    }
}
