//! Bytecode vulnerability detectors.
//!
//! Each detector looks at the raw runtime code on its own and reports at
//! most one finding. They are heuristics over instruction patterns, not a
//! symbolic analysis.

use crate::bytecode::{
    self, CALL, DUP1, GT, ISZERO, JUMPI, LT, MLOAD, PUSH1, RETURNDATACOPY, RETURNDATASIZE, SGT,
    SLT, TIMESTAMP,
};
use crate::error::{ScanError, ScanResult};
use crate::model::{Finding, FindingType, Severity};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// `transfer(address,uint256)`
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// `transferFrom(address,address,uint256)`
pub const TRANSFER_FROM_SELECTOR: [u8; 4] = [0x23, 0xb8, 0x72, 0xdd];

/// Bytecode size above which the gas detector fires.
pub const DEFAULT_GAS_SIZE_THRESHOLD: usize = 2_500;

const RETURNDATA_COPY_FULL: [u8; 5] = [RETURNDATASIZE, PUSH1, 0x00, DUP1, RETURNDATACOPY];
const RETURNDATA_COPY: [u8; 4] = [PUSH1, 0x00, DUP1, RETURNDATACOPY];
const RESULT_LOAD: [u8; 3] = [PUSH1, 0x00, MLOAD];

/// How many instructions after a `CALL` may carry its success branch.
const CALL_CHECK_WINDOW: usize = 3;
/// How many instructions after `TIMESTAMP` may carry the deadline compare.
const DEADLINE_WINDOW: usize = 3;

pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, code: &[u8]) -> ScanResult<Option<Finding>>;
}

/// Flags an external call whose return data is copied back, the shape of
/// a call made before the caller's own state is settled.
pub struct ReentrancyDetector;

impl Detector for ReentrancyDetector {
    fn name(&self) -> &'static str {
        "reentrancy"
    }

    fn detect(&self, code: &[u8]) -> ScanResult<Option<Finding>> {
        let Some(first_call) = bytecode::instructions(code)
            .find(|ins| ins.opcode == CALL)
            .map(|ins| ins.offset)
        else {
            return Ok(None);
        };

        let copy_after_call = bytecode::find_sequence(code, &RETURNDATA_COPY_FULL)
            .chain(bytecode::find_sequence(code, &RETURNDATA_COPY))
            .filter(|&offset| offset > first_call)
            .min();

        Ok(copy_after_call.map(|offset| Finding {
            finding_type: FindingType::Reentrancy,
            severity: Severity::High,
            title: "Reentrancy".to_string(),
            location: Some(location(offset)),
            description: "External call followed by a return-data copy; state may be \
                          updated after control leaves the contract"
                .to_string(),
            recommendation: "Apply checks-effects-interactions and add a reentrancy guard"
                .to_string(),
            confidence: 0.75,
        }))
    }
}

/// Flags raw calls with no visible success check.
pub struct UncheckedCallDetector;

impl Detector for UncheckedCallDetector {
    fn name(&self) -> &'static str {
        "unchecked_call"
    }

    fn detect(&self, code: &[u8]) -> ScanResult<Option<Finding>> {
        if !bytecode::contains_opcode(code, CALL) {
            return Ok(None);
        }

        if bytecode::find_sequence(code, &RESULT_LOAD).next().is_some() {
            return Ok(None);
        }
        let Some(offset) =
            bytecode::first_unfollowed(code, CALL, CALL_CHECK_WINDOW, &[ISZERO, JUMPI])
        else {
            return Ok(None);
        };

        Ok(Some(Finding {
            finding_type: FindingType::UncheckedExternalCall,
            severity: Severity::Medium,
            title: "Unchecked external call".to_string(),
            location: Some(location(offset)),
            description: "Low-level call without a success check".to_string(),
            recommendation: "Check the return value of every low-level call".to_string(),
            confidence: 0.65,
        }))
    }
}

/// Flags token transfers with no deadline compare anywhere in the code.
pub struct MevExposureDetector;

impl Detector for MevExposureDetector {
    fn name(&self) -> &'static str {
        "mev_vulnerable"
    }

    fn detect(&self, code: &[u8]) -> ScanResult<Option<Finding>> {
        let Some(offset) = bytecode::find_selector(code, TRANSFER_SELECTOR)
            .or_else(|| bytecode::find_selector(code, TRANSFER_FROM_SELECTOR))
        else {
            return Ok(None);
        };

        let has_deadline =
            bytecode::any_followed_by(code, TIMESTAMP, DEADLINE_WINDOW, &[GT, LT, SGT, SLT]);
        if has_deadline {
            return Ok(None);
        }

        Ok(Some(Finding {
            finding_type: FindingType::MevVulnerable,
            severity: Severity::High,
            title: "MEV exposure".to_string(),
            location: Some(location(offset)),
            description: "Token transfers without deadline or slippage protection".to_string(),
            recommendation: "Add slippage limits and a deadline to value-moving functions"
                .to_string(),
            confidence: 0.80,
        }))
    }
}

/// Flags oversized runtime code.
pub struct GasInefficiencyDetector {
    pub size_threshold: usize,
}

impl Default for GasInefficiencyDetector {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_GAS_SIZE_THRESHOLD,
        }
    }
}

impl Detector for GasInefficiencyDetector {
    fn name(&self) -> &'static str {
        "gas_inefficiency"
    }

    fn detect(&self, code: &[u8]) -> ScanResult<Option<Finding>> {
        if code.len() <= self.size_threshold {
            return Ok(None);
        }
        Ok(Some(Finding {
            finding_type: FindingType::GasInefficiency,
            severity: Severity::Low,
            title: "Large runtime code".to_string(),
            location: None,
            description: format!(
                "Runtime code is {} bytes, above the {} byte guideline",
                code.len(),
                self.size_threshold
            ),
            recommendation: "Optimize storage layout and reduce redundant computations"
                .to_string(),
            confidence: 0.60,
        }))
    }
}

fn location(offset: usize) -> String {
    format!("bytecode offset {offset:#x}")
}

/// The production detector set.
pub fn default_detectors(gas_size_threshold: usize) -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(ReentrancyDetector),
        Box::new(UncheckedCallDetector),
        Box::new(MevExposureDetector),
        Box::new(GasInefficiencyDetector {
            size_threshold: gas_size_threshold,
        }),
    ]
}

/// Run every detector over `code`.
///
/// A detector that errors or panics is logged and left out; the others
/// still contribute.
pub fn run_detectors(detectors: &[Box<dyn Detector>], code: &[u8]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for detector in detectors {
        let outcome = catch_unwind(AssertUnwindSafe(|| detector.detect(code)))
            .unwrap_or_else(|_| {
                Err(ScanError::DetectorFailure {
                    detector: detector.name(),
                    reason: "panicked".to_string(),
                })
            });

        match outcome {
            Ok(Some(finding)) => {
                debug!("Detector {} reported {:?}", detector.name(), finding.finding_type);
                findings.push(finding);
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping detector: {}", e),
        }
    }
    findings
}
