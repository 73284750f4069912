//! Worker process side: terminal session plus the bridge write loop.
//!
//! A worker monitors exactly one account. It is spawned by the supervisor
//! into a sandbox, talks to the external terminal through [`TerminalApi`] and
//! publishes every cycle into the sandbox's bridge store.

pub mod runner;
pub mod terminal;

pub use runner::{run, run_with, WorkerArgs};
pub use terminal::{ConnectParams, SimTerminal, TerminalApi};
