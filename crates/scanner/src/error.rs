use alloy::primitives::Address;
use mev_shield_ingestion::LedgerError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ScanError {
    #[error("{0} has no deployed code")]
    NotAContract(Address),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(#[from] LedgerError),

    #[error("detector {detector} failed: {reason}")]
    DetectorFailure {
        detector: &'static str,
        reason: String,
    },
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;
