//! Service assembly for the `mev-shield` binary.

pub mod metrics_server;
pub mod service;

pub use service::{Service, ServiceConfig, BLOCK_WALK_TASK, PROTECTION_SWEEP_TASK};
