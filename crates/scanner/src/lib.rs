//! Contract risk scanning over deployed bytecode.
//!
//! A scan fetches a contract's runtime code, runs independent detectors
//! over it, scores the findings and optionally attaches gas and mempool
//! reports.

pub mod bytecode;
pub mod detectors;
pub mod error;
pub mod model;
pub mod recommendations;
pub mod reports;
pub mod scoring;
pub mod service;

pub use detectors::{default_detectors, Detector};
pub use error::{ScanError, ScanResult};
pub use model::{
    Finding, FindingType, RiskLevel, ScanId, ScanOptions, ScanRecord, ScanStats, ScanStatus,
    Severity,
};
pub use service::{ContractScanner, ScannerConfig};
