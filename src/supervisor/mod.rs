//! Supervisor layer: the owned registry of worker instances, reconciliation
//! against the declarative account list, per-instance lifecycle control and
//! portfolio aggregation.

pub mod aggregator;
pub mod fleet;
pub mod instance;
pub mod reconciler;

pub use aggregator::{aggregate, FleetTotals};
pub use fleet::{Fleet, ReconcileOutcome};
pub use instance::{InstanceView, WorkerCommand, WorkerInstance};
pub use reconciler::ReconcilePlan;
