//! One worker instance and its lifecycle state machine.
//!
//! States: `Stopped -> Starting -> Running`, with `Error` on spawn failure,
//! unexpected exit or a worker-reported error, and `Stopping -> Stopped` on
//! `stop()`. `Starting -> Running` is observed, not commanded: the supervisor
//! infers it from the worker's own status record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::bridge::{self, BridgeReader};
use crate::config::AccountConfig;
use crate::domain::{AccountSnapshot, PositionRecord, WorkerState};
use crate::error::{FleetError, Result};
use crate::sandbox::Sandbox;

/// How the supervisor launches a worker process.
///
/// Defaults to re-executing the current binary with the `worker` subcommand.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// The production launcher: same binary, `worker` subcommand
    pub fn current_exe() -> Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: vec!["worker".to_string()],
        })
    }
}

/// Read-only view of one instance, as exposed to frontends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceView {
    pub login: i64,
    pub name: String,
    pub server: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub connected: bool,
    pub sandbox: Option<PathBuf>,
    pub last_update: Option<DateTime<Utc>>,
    pub snapshot: Option<AccountSnapshot>,
    pub positions: Vec<PositionRecord>,
}

impl InstanceView {
    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running.as_str()
    }
}

/// One supervised worker process and everything it owns
pub struct WorkerInstance {
    config: AccountConfig,
    state: WorkerState,
    process: Option<Child>,
    sandbox: Option<Sandbox>,
    reader: Option<BridgeReader>,
    last_update: Option<DateTime<Utc>>,
    snapshot: Option<AccountSnapshot>,
    positions: Vec<PositionRecord>,
}

impl WorkerInstance {
    pub fn new(config: AccountConfig) -> Self {
        Self {
            config,
            state: WorkerState::Stopped,
            process: None,
            sandbox: None,
            reader: None,
            last_update: None,
            snapshot: None,
            positions: Vec::new(),
        }
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Replace the configuration in place.
    ///
    /// Takes effect on the next start; an already-running process is not
    /// restarted.
    pub fn set_config(&mut self, config: AccountConfig) {
        self.config = config;
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    pub fn has_live_process(&self) -> bool {
        self.process.is_some()
    }

    pub fn sandbox_path(&self) -> Option<&std::path::Path> {
        self.sandbox.as_ref().map(|s| s.path())
    }

    /// Location of this instance's bridge store, while a sandbox exists
    pub fn store_path(&self) -> Option<PathBuf> {
        self.sandbox
            .as_ref()
            .map(|s| bridge::store_path(s.path(), self.config.login))
    }

    /// Spawn the worker process. Non-blocking: fire-and-forget.
    ///
    /// Rejected while a live process handle exists; at most one live process
    /// per login. A sandbox provisioning failure aborts before any spawn and
    /// the instance stays `Stopped`.
    pub fn start(&mut self, command: &WorkerCommand) -> Result<()> {
        if self.process.is_some() {
            return Err(FleetError::AlreadyRunning(self.config.login));
        }

        let sandbox = match self.sandbox.take() {
            Some(existing) if existing.exists() => existing,
            _ => Sandbox::provision(self.config.login)?,
        };
        let sandbox_path = sandbox.path().to_path_buf();
        let log_path = sandbox.log_path();
        self.sandbox = Some(sandbox);

        let log = std::fs::File::create(&log_path)
            .map_err(|e| FleetError::Sandbox(format!("cannot create worker log: {e}")))?;
        let log_err = log
            .try_clone()
            .map_err(|e| FleetError::Sandbox(format!("cannot clone worker log handle: {e}")))?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .arg("--login")
            .arg(self.config.login.to_string())
            .arg("--password")
            .arg(&self.config.password)
            .arg("--server")
            .arg(&self.config.server)
            .arg("--terminal-path")
            .arg(&self.config.terminal_path)
            .arg("--sandbox")
            .arg(&sandbox_path)
            .arg("--update-interval")
            .arg(self.config.update_interval.to_string())
            .current_dir(&sandbox_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        match cmd.spawn() {
            Ok(child) => {
                info!(
                    "Spawned worker for login {} (pid {:?})",
                    self.config.login,
                    child.id()
                );
                self.process = Some(child);
                self.state = WorkerState::Starting;
                Ok(())
            }
            Err(e) => {
                let message = format!("spawn failed: {e}");
                self.state = WorkerState::Error(message.clone());
                Err(FleetError::Spawn(message))
            }
        }
    }

    /// Stop the worker and remove its sandbox.
    ///
    /// Idempotent: safe on an already-stopped instance, and still attempts
    /// sandbox cleanup in case a prior stop failed partway. Blocks for at
    /// most the grace period before escalating to a forced kill.
    pub async fn stop(&mut self, grace: Duration) -> Result<()> {
        if let Some(mut child) = self.process.take() {
            self.state = WorkerState::Stopping;
            info!("Stopping worker for login {}", self.config.login);
            terminate_gracefully(&mut child, grace).await;
        }

        self.reader = None;
        self.snapshot = None;
        self.positions.clear();

        if let Some(sandbox) = self.sandbox.take() {
            if let Err(e) = sandbox.remove() {
                // Keep the handle so the next stop retries cleanup
                warn!(
                    "Sandbox cleanup failed for login {}: {e}",
                    self.config.login
                );
                self.sandbox = Some(sandbox);
            }
        }

        self.state = WorkerState::Stopped;
        Ok(())
    }

    /// Refresh liveness and bridge-observed state.
    ///
    /// Called from the supervisor tick. Never fails: bridge trouble degrades
    /// to a stale view, it does not abort the tick.
    pub async fn poll(&mut self) {
        if let Some(child) = self.process.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    self.process = None;
                    if self.state.is_live() {
                        self.state =
                            WorkerState::Error(format!("process exited unexpectedly: {status}"));
                        warn!(
                            "Worker for login {} exited unexpectedly: {status}",
                            self.config.login
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "Liveness check failed for login {}: {e}",
                    self.config.login
                ),
            }
        }

        if self.reader.is_none() {
            if let Some(sandbox) = &self.sandbox {
                let path = bridge::store_path(sandbox.path(), self.config.login);
                match BridgeReader::open(&path).await {
                    Ok(reader) => self.reader = reader,
                    Err(e) => debug!(
                        "Bridge not yet readable for login {}: {e}",
                        self.config.login
                    ),
                }
            }
        }

        let Some(reader) = &self.reader else {
            return;
        };

        match reader.status().await {
            Ok(Some(record)) => {
                self.last_update = Some(record.last_update);
                // Only trust the record while the process is actually alive;
                // a dead worker leaves a stale row behind.
                if self.process.is_some() {
                    match record.status {
                        WorkerState::Running => self.state = WorkerState::Running,
                        WorkerState::Error(message) => {
                            self.state = WorkerState::Error(message);
                        }
                        _ => {}
                    }
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Status read failed for login {}: {e}", self.config.login),
        }

        match reader.snapshot().await {
            Ok(Some(snapshot)) => self.snapshot = Some(snapshot),
            Ok(None) => {}
            Err(e) => debug!("Snapshot read failed for login {}: {e}", self.config.login),
        }

        match reader.positions().await {
            Ok(positions) => self.positions = positions,
            Err(e) => debug!(
                "Positions read failed for login {}: {e}",
                self.config.login
            ),
        }
    }

    pub fn view(&self) -> InstanceView {
        InstanceView {
            login: self.config.login,
            name: self.config.display_name(),
            server: self.config.server.clone(),
            state: self.state.as_str().to_string(),
            error_message: self.state.error_message().map(String::from),
            connected: matches!(self.state, WorkerState::Running),
            sandbox: self.sandbox.as_ref().map(|s| s.path().to_path_buf()),
            last_update: self.last_update,
            snapshot: self.snapshot.clone(),
            positions: self.positions.clone(),
        }
    }
}

/// SIGTERM, bounded wait, then SIGKILL. Total wait never exceeds the grace
/// period plus the kill itself.
async fn terminate_gracefully(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!("SIGTERM delivery failed (pid {pid}): {e}");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!("Worker exited gracefully: {status}"),
        Ok(Err(e)) => warn!("Wait on worker failed: {e}"),
        Err(_) => {
            warn!("Worker ignored termination, force-killing");
            if let Err(e) = child.kill().await {
                warn!("Force kill failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(login: i64) -> AccountConfig {
        AccountConfig {
            name: None,
            login,
            password: "pw".into(),
            server: "Demo".into(),
            terminal_path: "/nonexistent/terminal".into(),
            enabled: true,
            update_interval: 5,
        }
    }

    fn sleeper_command() -> WorkerCommand {
        // Stands in for a well-behaved worker: runs until terminated
        WorkerCommand::new("/bin/sh".into(), vec!["-c".into(), "sleep 30".into()])
    }

    #[tokio::test]
    async fn test_start_rejects_second_start() {
        let mut instance = WorkerInstance::new(test_config(111));
        instance.start(&sleeper_command()).unwrap();
        assert_eq!(instance.state(), &WorkerState::Starting);

        let second = instance.start(&sleeper_command());
        assert!(matches!(second, Err(FleetError::AlreadyRunning(111))));

        instance.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure_sets_error_state() {
        let mut instance = WorkerInstance::new(test_config(111));
        let bogus = WorkerCommand::new("/definitely/not/a/binary".into(), vec![]);

        let result = instance.start(&bogus);
        assert!(matches!(result, Err(FleetError::Spawn(_))));
        assert!(matches!(instance.state(), WorkerState::Error(_)));
        assert!(!instance.has_live_process());

        // cleanup the provisioned sandbox
        instance.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_removes_sandbox_and_is_idempotent() {
        let mut instance = WorkerInstance::new(test_config(111));
        instance.start(&sleeper_command()).unwrap();
        let sandbox = instance.sandbox_path().unwrap().to_path_buf();
        assert!(sandbox.is_dir());

        instance.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(instance.state(), &WorkerState::Stopped);
        assert!(!instance.has_live_process());
        assert!(!sandbox.exists());

        // stopping again is safe
        instance.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(instance.state(), &WorkerState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_force_kills_stubborn_worker() {
        let mut instance = WorkerInstance::new(test_config(111));
        // Ignores SIGTERM; only SIGKILL gets rid of it
        let stubborn = WorkerCommand::new(
            "/bin/sh".into(),
            vec!["-c".into(), "trap '' TERM; sleep 30".into()],
        );
        instance.start(&stubborn).unwrap();
        let sandbox = instance.sandbox_path().unwrap().to_path_buf();

        // Give the shell a moment to install the trap
        tokio::time::sleep(Duration::from_millis(300)).await;

        let started = std::time::Instant::now();
        instance.stop(Duration::from_secs(1)).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(instance.state(), &WorkerState::Stopped);
        assert!(!sandbox.exists());
        // bounded: grace period plus slack, nowhere near the sleep 30
        assert!(elapsed < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_unexpected_exit_flips_to_error() {
        let mut instance = WorkerInstance::new(test_config(111));
        let short_lived = WorkerCommand::new("/bin/sh".into(), vec!["-c".into(), "exit 3".into()]);
        instance.start(&short_lived).unwrap();

        // Wait for the process to die, then poll
        tokio::time::sleep(Duration::from_millis(500)).await;
        instance.poll().await;

        assert!(matches!(instance.state(), WorkerState::Error(_)));
        assert!(!instance.has_live_process());

        instance.stop(Duration::from_secs(1)).await.unwrap();
    }
}
