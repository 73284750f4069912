//! The worker's monitoring loop.
//!
//! Every `update_interval` seconds: ensure a terminal session exists, pull
//! account summary / open positions / recent deals, persist each table, then
//! write the status row reflecting the cycle's outcome. The status write
//! always happens after the cycle's data writes.

use chrono::{Duration as ChronoDuration, Utc};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::bridge::{self, BridgeWriter};
use crate::domain::WorkerState;
use crate::error::Result;
use crate::shutdown::shutdown_signal;
use crate::worker::terminal::{ConnectParams, SimTerminal, TerminalApi};

/// Backoff after a failed session attempt
const RECONNECT_BACKOFF: Duration = Duration::from_secs(10);
/// Backoff after a failed data cycle
const CYCLE_BACKOFF: Duration = Duration::from_secs(5);
/// Trailing window for deal history, per cycle
const DEAL_WINDOW_HOURS: i64 = 1;

/// Arguments the supervisor passes when spawning a worker
#[derive(Args, Clone)]
pub struct WorkerArgs {
    /// Account login
    #[arg(long)]
    pub login: i64,

    /// Account password
    #[arg(long)]
    pub password: String,

    /// Terminal server name
    #[arg(long)]
    pub server: String,

    /// Path to the terminal installation
    #[arg(long)]
    pub terminal_path: PathBuf,

    /// Sandbox directory owned by this instance
    #[arg(long)]
    pub sandbox: PathBuf,

    /// Seconds between update cycles
    #[arg(long, default_value_t = 5)]
    pub update_interval: u64,
}

impl WorkerArgs {
    fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            login: self.login,
            password: self.password.clone(),
            server: self.server.clone(),
            terminal_path: self.terminal_path.clone(),
        }
    }
}

/// Worker entry point with the default terminal adapter
pub async fn run(args: WorkerArgs) -> Result<()> {
    run_with(SimTerminal::new(), args).await
}

/// Worker entry point, generic over the terminal adapter
pub async fn run_with<T: TerminalApi>(mut terminal: T, args: WorkerArgs) -> Result<()> {
    info!(
        "Worker starting for login {} (sandbox {})",
        args.login,
        args.sandbox.display()
    );

    let store = bridge::store_path(&args.sandbox, args.login);
    let writer = BridgeWriter::open(&store).await?;

    write_terminal_config(&args)?;

    let params = args.connect_params();
    let mut connected = false;

    let mut interval = tokio::time::interval(Duration::from_secs(args.update_interval.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                if let Err(e) = run_cycle(&mut terminal, &writer, &params, &mut connected).await {
                    // Only status-row write failures end up here; the store is
                    // unusable, so there is nothing left to report into.
                    warn!("Bridge write failed for login {}: {e}", args.login);
                }
            }
        }
    }

    info!("Worker for login {} shutting down", args.login);
    terminal.disconnect().await;
    writer
        .report(args.login, WorkerState::Stopped, false)
        .await?;

    Ok(())
}

/// One monitoring cycle.
///
/// Returns `Err` only when the bridge itself cannot be written; terminal
/// failures are recorded as an `Error` status row and retried next cycle.
async fn run_cycle<T: TerminalApi>(
    terminal: &mut T,
    writer: &BridgeWriter,
    params: &ConnectParams,
    connected: &mut bool,
) -> Result<()> {
    if !*connected {
        match terminal.connect(params).await {
            Ok(()) => {
                *connected = true;
                info!("Session established for login {}", params.login);
                writer
                    .report(params.login, WorkerState::Running, true)
                    .await?;
            }
            Err(e) => {
                warn!("Session attempt failed for login {}: {e}", params.login);
                writer
                    .report(params.login, WorkerState::Error(e.to_string()), false)
                    .await?;
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                return Ok(());
            }
        }
    }

    let outcome = persist_cycle(terminal, writer).await;

    match outcome {
        Ok(()) => {
            writer
                .report(params.login, WorkerState::Running, true)
                .await?;
        }
        Err(e) => {
            warn!("Cycle failed for login {}: {e}", params.login);
            *connected = false;
            writer
                .report(params.login, WorkerState::Error(e.to_string()), false)
                .await?;
            tokio::time::sleep(CYCLE_BACKOFF).await;
        }
    }

    Ok(())
}

/// Fetch and persist the three data tables, in order
async fn persist_cycle<T: TerminalApi>(terminal: &mut T, writer: &BridgeWriter) -> Result<()> {
    let snapshot = terminal.account_summary().await?;
    writer.replace_snapshot(&snapshot).await?;

    let positions = terminal.open_positions().await?;
    writer.replace_positions(&positions).await?;

    let since = Utc::now() - ChronoDuration::hours(DEAL_WINDOW_HOURS);
    let deals = terminal.recent_deals(since).await?;
    writer.upsert_deals(&deals).await?;

    Ok(())
}

/// Terminal config artifact written into the sandbox before connecting.
///
/// Credentials are passed to the session directly and never land on disk.
fn write_terminal_config(args: &WorkerArgs) -> Result<()> {
    let contents = format!(
        "[Common]\n\
         Login={}\n\
         Server={}\n\
         EnableAPI=1\n\
         \n\
         [Experts]\n\
         AllowLiveTrading=0\n\
         Account={}\n",
        args.login, args.server, args.login
    );

    let path = args.sandbox.join("terminal.ini");
    std::fs::write(&path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountSnapshot, WorkerState};
    use crate::worker::terminal::MockTerminalApi;
    use mockall::predicate::always;

    fn test_args(sandbox: &std::path::Path) -> WorkerArgs {
        WorkerArgs {
            login: 111,
            password: "pw".into(),
            server: "Demo".into(),
            terminal_path: sandbox.to_path_buf(),
            sandbox: sandbox.to_path_buf(),
            update_interval: 1,
        }
    }

    fn sample_snapshot(login: i64) -> AccountSnapshot {
        AccountSnapshot {
            login,
            server: "Demo".into(),
            name: "Test".into(),
            company: "Test Co".into(),
            currency: "USD".into(),
            leverage: 100,
            balance: 1_000.0,
            equity: 1_010.0,
            margin: 100.0,
            margin_free: 910.0,
            margin_level: 1_010.0,
            profit: 10.0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_cycle_writes_data_then_status() {
        let dir = tempfile::tempdir().unwrap();
        let args = test_args(dir.path());
        let writer = BridgeWriter::open(&bridge::store_path(&args.sandbox, args.login))
            .await
            .unwrap();

        let mut terminal = MockTerminalApi::new();
        terminal
            .expect_connect()
            .with(always())
            .returning(|_| Ok(()));
        terminal
            .expect_account_summary()
            .returning(|| Ok(sample_snapshot(111)));
        terminal.expect_open_positions().returning(|| Ok(Vec::new()));
        terminal
            .expect_recent_deals()
            .returning(|_| Ok(Vec::new()));

        let params = args.connect_params();
        let mut connected = false;
        run_cycle(&mut terminal, &writer, &params, &mut connected)
            .await
            .unwrap();
        assert!(connected);

        let reader = crate::bridge::BridgeReader::open(&bridge::store_path(
            &args.sandbox,
            args.login,
        ))
        .await
        .unwrap()
        .unwrap();

        let snapshot = reader.snapshot().await.unwrap().unwrap();
        assert_eq!(snapshot.login, 111);

        let status = reader.status().await.unwrap().unwrap();
        assert_eq!(status.status, WorkerState::Running);
        assert!(status.connected);
    }

    #[tokio::test]
    async fn test_failed_fetch_reports_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let args = test_args(dir.path());
        let writer = BridgeWriter::open(&bridge::store_path(&args.sandbox, args.login))
            .await
            .unwrap();

        let mut terminal = MockTerminalApi::new();
        terminal
            .expect_connect()
            .with(always())
            .returning(|_| Ok(()));
        terminal
            .expect_account_summary()
            .returning(|| Err(crate::error::FleetError::Connection("feed down".into())));

        let params = args.connect_params();
        let mut connected = false;
        run_cycle(&mut terminal, &writer, &params, &mut connected)
            .await
            .unwrap();

        // connection is considered lost, next cycle reconnects
        assert!(!connected);

        let reader = crate::bridge::BridgeReader::open(&bridge::store_path(
            &args.sandbox,
            args.login,
        ))
        .await
        .unwrap()
        .unwrap();
        let status = reader.status().await.unwrap().unwrap();
        assert!(matches!(status.status, WorkerState::Error(_)));
        assert!(!status.connected);
    }

    #[test]
    fn test_terminal_config_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let args = test_args(dir.path());
        write_terminal_config(&args).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("terminal.ini")).unwrap();
        assert!(contents.contains("Login=111"));
        assert!(contents.contains("Server=Demo"));
        assert!(!contents.contains("pw"));
    }
}
