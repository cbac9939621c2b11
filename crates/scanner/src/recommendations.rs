//! Remediation advice derived from findings and the overall risk level.

use crate::model::{CodeFix, Finding, FindingType, Recommendations, RiskLevel};

pub fn recommend(findings: &[Finding], level: RiskLevel) -> Recommendations {
    let mut immediate_actions = Vec::new();
    let mut long_term_improvements = Vec::new();
    let mut code_fixes = Vec::new();

    let has = |t: FindingType| findings.iter().any(|f| f.finding_type == t);

    if has(FindingType::Reentrancy) {
        immediate_actions.push("Implement reentrancy guards on state-changing functions".to_string());
        code_fixes.push(CodeFix {
            issue: "Reentrancy".to_string(),
            suggestion: "Add a nonReentrant modifier and update state before external calls"
                .to_string(),
            example: "function withdraw() external nonReentrant { ... }".to_string(),
        });
    }
    if has(FindingType::UncheckedExternalCall) {
        immediate_actions.push("Check the return value of every low-level call".to_string());
        code_fixes.push(CodeFix {
            issue: "Unchecked external call".to_string(),
            suggestion: "Revert when a low-level call fails".to_string(),
            example: "(bool success, ) = target.call(data); require(success, \"call failed\");"
                .to_string(),
        });
    }
    if has(FindingType::MevVulnerable) {
        immediate_actions.push("Add slippage protection to DEX interactions".to_string());
        long_term_improvements
            .push("Consider MEV protection services like Flashbots Protect".to_string());
        code_fixes.push(CodeFix {
            issue: "MEV exposure".to_string(),
            suggestion: "Take a minimum output and a deadline on value-moving calls".to_string(),
            example: "require(block.timestamp <= deadline && amountOut >= amountOutMin);"
                .to_string(),
        });
    }
    if has(FindingType::GasInefficiency) {
        long_term_improvements
            .push("Optimize storage layout and reduce redundant computations".to_string());
    }

    immediate_actions.push("Review and test all external calls".to_string());
    long_term_improvements.push("Implement comprehensive access controls".to_string());
    long_term_improvements.push("Schedule regular security audits and monitoring".to_string());

    Recommendations {
        immediate_actions,
        long_term_improvements,
        code_fixes,
        overall_strategy: strategy(level).to_string(),
    }
}

fn strategy(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => {
            "Pause deployment and remediate critical findings before handling user funds"
        }
        RiskLevel::High => "Prioritize high-severity fixes and commission an external audit",
        RiskLevel::Medium => "Address findings in the next release and add targeted tests",
        RiskLevel::Low => "Maintain current practices and keep monitoring",
        RiskLevel::Unknown => "Rescan once the contract can be analyzed",
    }
}
