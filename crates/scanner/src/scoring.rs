use crate::model::{Finding, RiskLevel};

/// Sum of finding weights, capped at 100.
pub fn risk_score(findings: &[Finding]) -> u8 {
    let total: u32 = findings.iter().map(|f| f.severity.weight()).sum();
    total.min(100) as u8
}

pub fn risk_level(score: u8) -> RiskLevel {
    match score {
        80.. => RiskLevel::Critical,
        60..=79 => RiskLevel::High,
        30..=59 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}
