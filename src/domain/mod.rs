//! Domain types shared between the supervisor and worker processes.

pub mod account;
pub mod status;

pub use account::{AccountSnapshot, DealRecord, PositionRecord, PositionSide};
pub use status::{WorkerState, WorkerStatusRecord};
