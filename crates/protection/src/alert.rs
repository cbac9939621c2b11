//! Alerts pushed to protected-contract subscribers.

use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    ProtectionEnabled,
    SandwichAttack,
    FrontrunAttempt,
    UnusualGas,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertType::ProtectionEnabled => "PROTECTION_ENABLED",
            AlertType::SandwichAttack => "SANDWICH_ATTACK",
            AlertType::FrontrunAttempt => "FRONTRUN_ATTEMPT",
            AlertType::UnusualGas => "UNUSUAL_GAS",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub contract_address: Address,
    pub threat_level: ThreatLevel,
    pub description: String,
    pub recommended_action: String,
    /// The transaction that triggered the alert, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    fn new(
        alert_type: AlertType,
        contract_address: Address,
        threat_level: ThreatLevel,
        description: &str,
        recommended_action: &str,
        transaction_hash: Option<B256>,
    ) -> Self {
        Self {
            alert_type,
            contract_address,
            threat_level,
            description: description.to_string(),
            recommended_action: recommended_action.to_string(),
            transaction_hash,
            timestamp: Utc::now(),
        }
    }

    pub fn protection_enabled(contract: Address) -> Self {
        Self::new(
            AlertType::ProtectionEnabled,
            contract,
            ThreatLevel::Info,
            "Real-time MEV protection is now active for this contract",
            "Monitor transactions and gas prices",
            None,
        )
    }

    pub fn sandwich_attack(contract: Address, victim_tx: B256) -> Self {
        Self::new(
            AlertType::SandwichAttack,
            contract,
            ThreatLevel::High,
            "Potential sandwich attack detected targeting this contract",
            "Consider using MEV protection or tightening slippage tolerance",
            Some(victim_tx),
        )
    }

    pub fn frontrun_attempt(contract: Address, tx: B256) -> Self {
        Self::new(
            AlertType::FrontrunAttempt,
            contract,
            ThreatLevel::Medium,
            "Frontrunning attempt detected against this contract",
            "Monitor gas prices and consider a private mempool",
            Some(tx),
        )
    }

    pub fn unusual_gas(contract: Address, tx: B256) -> Self {
        Self::new(
            AlertType::UnusualGas,
            contract,
            ThreatLevel::Low,
            "Unusual gas price patterns detected",
            "Monitor for potential bot activity",
            Some(tx),
        )
    }
}
