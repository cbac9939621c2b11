//! Protected contracts and their subscribers.
//!
//! A contract is protected exactly while it has at least one subscriber.
//! Config and subscriber set live in the same map entry, so they are
//! created and dropped together.

use crate::alert::AlertType;
use crate::subscriber::{Subscriber, SubscriberId};
use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Which alert types a contract's subscribers want.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFlags {
    pub alert_on_sandwich: bool,
    pub alert_on_frontrun: bool,
    pub alert_on_unusual_gas: bool,
    /// Reported only; nothing acts on it yet.
    pub auto_protect: bool,
}

impl Default for AlertFlags {
    fn default() -> Self {
        Self {
            alert_on_sandwich: true,
            alert_on_frontrun: true,
            alert_on_unusual_gas: true,
            auto_protect: false,
        }
    }
}

impl AlertFlags {
    pub fn allows(&self, alert_type: AlertType) -> bool {
        match alert_type {
            AlertType::ProtectionEnabled => true,
            AlertType::SandwichAttack => self.alert_on_sandwich,
            AlertType::FrontrunAttempt => self.alert_on_frontrun,
            AlertType::UnusualGas => self.alert_on_unusual_gas,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionConfig {
    pub flags: AlertFlags,
    pub enabled_at: DateTime<Utc>,
    pub alert_count: u64,
}

impl ProtectionConfig {
    fn fresh() -> Self {
        Self {
            flags: AlertFlags::default(),
            enabled_at: Utc::now(),
            alert_count: 0,
        }
    }
}

struct ProtectedContract {
    config: ProtectionConfig,
    subscribers: HashMap<SubscriberId, Arc<dyn Subscriber>>,
}

/// Status of one address. Config fields are absent when unprotected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionStatus {
    pub protected: bool,
    pub contract_address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_connections: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<AlertFlags>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionStats {
    pub total_protected_contracts: usize,
    pub active_connections: usize,
    pub total_alerts: u64,
}

/// Result of dropping dead handles from one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneOutcome {
    pub removed: usize,
    /// The address lost its last subscriber and is no longer protected.
    pub unprotected: bool,
}

#[derive(Default)]
pub struct ProtectionRegistry {
    contracts: DashMap<Address, ProtectedContract>,
    next_id: AtomicU64,
}

impl ProtectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a new subscriber handle. Ids start at 1 and are
    /// never reused by this registry.
    pub fn next_subscriber_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Add `handle` to `address`. Returns true if the address just became
    /// protected.
    pub fn subscribe(&self, address: Address, handle: Arc<dyn Subscriber>) -> bool {
        match self.contracts.entry(address) {
            Entry::Occupied(mut entry) => {
                entry
                    .get_mut()
                    .subscribers
                    .entry(handle.id())
                    .or_insert(handle);
                false
            }
            Entry::Vacant(entry) => {
                let mut subscribers = HashMap::new();
                subscribers.insert(handle.id(), handle);
                entry.insert(ProtectedContract {
                    config: ProtectionConfig::fresh(),
                    subscribers,
                });
                info!("Protection enabled for {}", address);
                true
            }
        }
    }

    /// Remove one subscriber. Returns true if the address just became
    /// unprotected.
    pub fn unsubscribe(&self, address: Address, subscriber: SubscriberId) -> bool {
        self.prune(address, &[subscriber]).unprotected
    }

    /// Remove the given subscribers, dropping the address with its config
    /// if none remain.
    pub fn prune(&self, address: Address, subscribers: &[SubscriberId]) -> PruneOutcome {
        let Entry::Occupied(mut entry) = self.contracts.entry(address) else {
            return PruneOutcome::default();
        };

        let set = &mut entry.get_mut().subscribers;
        let removed = subscribers
            .iter()
            .filter(|id| set.remove(*id).is_some())
            .count();

        let unprotected = set.is_empty();
        if unprotected {
            entry.remove();
            info!("Protection disabled for {}", address);
        }
        PruneOutcome {
            removed,
            unprotected,
        }
    }

    /// Drop every handle of `address` that reports itself closed.
    pub fn prune_closed(&self, address: Address) -> PruneOutcome {
        let Entry::Occupied(mut entry) = self.contracts.entry(address) else {
            return PruneOutcome::default();
        };

        let set = &mut entry.get_mut().subscribers;
        let before = set.len();
        set.retain(|_, handle| handle.is_open());
        let removed = before - set.len();

        let unprotected = set.is_empty();
        if unprotected {
            entry.remove();
            info!("Protection disabled for {}: no open subscribers", address);
        }
        PruneOutcome {
            removed,
            unprotected,
        }
    }

    pub fn is_protected(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    pub fn get_status(&self, address: Address) -> ProtectionStatus {
        match self.contracts.get(&address) {
            Some(contract) => ProtectionStatus {
                protected: true,
                contract_address: address,
                enabled_at: Some(contract.config.enabled_at),
                alert_count: Some(contract.config.alert_count),
                active_connections: Some(contract.subscribers.len()),
                config: Some(contract.config.flags),
            },
            None => ProtectionStatus {
                protected: false,
                contract_address: address,
                enabled_at: None,
                alert_count: None,
                active_connections: None,
                config: None,
            },
        }
    }

    pub fn get_global_stats(&self) -> ProtectionStats {
        let mut stats = ProtectionStats {
            total_protected_contracts: 0,
            active_connections: 0,
            total_alerts: 0,
        };
        for contract in self.contracts.iter() {
            stats.total_protected_contracts += 1;
            stats.active_connections += contract.subscribers.len();
            stats.total_alerts += contract.config.alert_count;
        }
        stats
    }

    /// Replace an address's alert flags. Returns false if it is not
    /// protected.
    pub fn update_flags(&self, address: Address, flags: AlertFlags) -> bool {
        match self.contracts.get_mut(&address) {
            Some(mut contract) => {
                contract.config.flags = flags;
                true
            }
            None => false,
        }
    }

    pub fn flags(&self, address: &Address) -> Option<AlertFlags> {
        self.contracts.get(address).map(|c| c.config.flags)
    }

    /// Count one alert against `address`, returning the new total, or
    /// `None` if the address is no longer protected.
    pub fn record_alert(&self, address: &Address) -> Option<u64> {
        self.contracts.get_mut(address).map(|mut c| {
            c.config.alert_count += 1;
            c.config.alert_count
        })
    }

    /// Protected addresses at this instant.
    pub fn addresses(&self) -> Vec<Address> {
        self.contracts.iter().map(|e| *e.key()).collect()
    }

    /// Clones of the handles registered for `address`.
    pub fn handles(&self, address: &Address) -> Vec<Arc<dyn Subscriber>> {
        self.contracts
            .get(address)
            .map(|c| c.subscribers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
