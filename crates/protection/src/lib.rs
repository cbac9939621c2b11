//! Real-time protection for subscribed contracts.
//!
//! Observers subscribe to a contract through the [`ProtectionRegistry`];
//! the [`ThreatMonitor`] sweeps protected contracts on a schedule and the
//! [`AlertPublisher`] pushes resulting alerts to every live subscriber.

pub mod alert;
pub mod evaluator;
pub mod monitor;
pub mod publisher;
pub mod registry;
pub mod subscriber;

pub use alert::{Alert, AlertType, ThreatLevel};
pub use evaluator::{HeuristicThreatEvaluator, RecentActivity, ThreatEvaluator};
pub use monitor::{SweepOutcome, SweepReport, ThreatMonitor};
pub use publisher::{AlertPublisher, DeliveryReport};
pub use registry::{AlertFlags, ProtectionRegistry, ProtectionStats, ProtectionStatus};
pub use subscriber::{ChannelSubscriber, DeliveryError, Subscriber, SubscriberId};
