pub mod bridge;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod sandbox;
pub mod server;
pub mod shutdown;
pub mod supervisor;
pub mod worker;

pub use bridge::{BridgeReader, BridgeWriter};
pub use config::{AccountConfig, AppConfig, SupervisorConfig};
pub use domain::{
    AccountSnapshot, DealRecord, PositionRecord, PositionSide, WorkerState, WorkerStatusRecord,
};
pub use error::{FleetError, Result};
pub use sandbox::Sandbox;
pub use supervisor::{
    aggregate, Fleet, FleetTotals, InstanceView, ReconcileOutcome, WorkerCommand, WorkerInstance,
};
pub use worker::{SimTerminal, TerminalApi, WorkerArgs};
