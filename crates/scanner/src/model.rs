//! Scan records and their parts.
//!
//! A [`ScanRecord`] is a value: each pipeline step produces a new record
//! from the previous one instead of mutating fields in place.

use crate::error::ScanError;
use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

pub type ScanId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Contribution of one finding to the risk score.
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Critical => 25,
            Severity::High => 15,
            Severity::Medium => 8,
            Severity::Low => 3,
        }
    }
}

/// Overall contract risk. `Unknown` is reserved for failed scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingType {
    Reentrancy,
    UncheckedExternalCall,
    MevVulnerable,
    GasInefficiency,
}

/// One detector hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Where in the bytecode the pattern matched, when it is local.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub recommendation: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VulnerabilitySummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub details: Vec<Finding>,
}

impl VulnerabilitySummary {
    pub fn from_findings(details: Vec<Finding>) -> Self {
        let count = |s: Severity| details.iter().filter(|f| f.severity == s).count();
        Self {
            total: details.len(),
            critical: count(Severity::Critical),
            high: count(Severity::High),
            medium: count(Severity::Medium),
            low: count(Severity::Low),
            details,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GasEfficiency {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasAnalysis {
    pub current_gas_efficiency: GasEfficiency,
    pub optimization_potential: String,
    pub recommendations: Vec<String>,
    pub estimated_savings_percent: u8,
    pub bytecode_size: usize,
    pub storage_ops: usize,
}

/// A sandwich bracket seen around a transaction to the scanned contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousPattern {
    pub block_number: u64,
    pub victim_tx: B256,
    pub attacker: Address,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolAnalysis {
    pub blocks_inspected: u64,
    pub recent_transactions: usize,
    /// Mean gas price of those transactions, in gwei.
    pub average_gas_price_gwei: Decimal,
    pub network_gas_price_gwei: Decimal,
    pub unusual_activity: bool,
    pub suspicious_patterns: Vec<SuspiciousPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFix {
    pub issue: String,
    pub suggestion: String,
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub immediate_actions: Vec<String>,
    pub long_term_improvements: Vec<String>,
    pub code_fixes: Vec<CodeFix>,
    pub overall_strategy: String,
}

/// Which optional sub-reports to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub include_gas_analysis: bool,
    pub include_mempool_analysis: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_gas_analysis: false,
            include_mempool_analysis: true,
        }
    }
}

/// Everything a successful pipeline run produces.
#[derive(Debug, Clone)]
pub struct ScanAnalysis {
    pub vulnerabilities: VulnerabilitySummary,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub gas_analysis: Option<GasAnalysis>,
    pub mempool_analysis: Option<MempoolAnalysis>,
    pub recommendations: Recommendations,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub scan_id: ScanId,
    pub contract_address: Address,
    pub status: ScanStatus,
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub vulnerabilities: VulnerabilitySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_analysis: Option<GasAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mempool_analysis: Option<MempoolAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Recommendations>,
    pub duration_ms: Option<u64>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanRecord {
    pub fn pending(scan_id: ScanId, contract_address: Address) -> Self {
        Self {
            scan_id,
            contract_address,
            status: ScanStatus::Pending,
            risk_level: RiskLevel::Unknown,
            risk_score: 0,
            vulnerabilities: VulnerabilitySummary::default(),
            gas_analysis: None,
            mempool_analysis: None,
            recommendations: None,
            duration_ms: None,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn running(self) -> Self {
        Self {
            status: ScanStatus::Running,
            started_at: Some(Utc::now()),
            ..self
        }
    }

    pub fn completed(self, analysis: ScanAnalysis, duration_ms: u64) -> Self {
        Self {
            status: ScanStatus::Completed,
            risk_level: analysis.risk_level,
            risk_score: analysis.risk_score,
            vulnerabilities: analysis.vulnerabilities,
            gas_analysis: analysis.gas_analysis,
            mempool_analysis: analysis.mempool_analysis,
            recommendations: Some(analysis.recommendations),
            duration_ms: Some(duration_ms),
            completed_at: Some(Utc::now()),
            ..self
        }
    }

    pub fn failed(self, error: &ScanError, duration_ms: u64) -> Self {
        Self {
            status: ScanStatus::Failed,
            risk_level: RiskLevel::Unknown,
            duration_ms: Some(duration_ms),
            completed_at: Some(Utc::now()),
            error: Some(error.to_string()),
            ..self
        }
    }
}

/// Counts over every scan submitted so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub total_scans: usize,
    pub completed_scans: usize,
    pub failed_scans: usize,
    pub in_flight: usize,
    /// Completed share of all scans, in percent.
    pub completion_rate: f64,
}
