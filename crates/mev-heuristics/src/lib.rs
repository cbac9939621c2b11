//! MEV heuristic classification for ledger transactions.

pub mod aggregator;
pub mod classifier;

pub use aggregator::{DetectionAggregator, DetectionStats};
pub use classifier::{Classification, ClassifierConfig, MevClassifier};
