//! The owned registry of worker instances, keyed by login.
//!
//! All mutation goes through the fleet: reconciliation, start/stop commands
//! and the periodic poll tick. A failure in one instance never aborts
//! processing of the others; only a malformed account list aborts an entire
//! reconciliation pass, leaving the previous instance set untouched.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{self, AccountConfig, SupervisorConfig};
use crate::error::{FleetError, Result};
use crate::supervisor::aggregator::{self, FleetTotals};
use crate::supervisor::instance::{InstanceView, WorkerCommand, WorkerInstance};
use crate::supervisor::reconciler;

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub created: Vec<i64>,
    pub updated: Vec<i64>,
    pub removed: Vec<i64>,
}

/// The supervised fleet
pub struct Fleet {
    instances: RwLock<BTreeMap<i64, WorkerInstance>>,
    worker_command: WorkerCommand,
    grace_period: Duration,
    accounts_file: PathBuf,
    views: RwLock<Vec<InstanceView>>,
    totals: RwLock<FleetTotals>,
}

impl Fleet {
    pub fn new(config: SupervisorConfig, worker_command: WorkerCommand) -> Self {
        Self {
            instances: RwLock::new(BTreeMap::new()),
            worker_command,
            grace_period: Duration::from_secs(config.grace_period_secs),
            accounts_file: config.accounts_file,
            views: RwLock::new(Vec::new()),
            totals: RwLock::new(FleetTotals::default()),
        }
    }

    /// Re-read the declarative account list and reconcile against it
    pub async fn reload(&self) -> Result<ReconcileOutcome> {
        let accounts = config::load_accounts(&self.accounts_file)?;
        self.reconcile(accounts).await
    }

    /// Align the live instance set with the given account list.
    ///
    /// Orphan stops run synchronously before this returns, so no sandbox or
    /// process outlives its config entry. Existing instances get their config
    /// replaced in place without a restart.
    pub async fn reconcile(&self, accounts: Vec<AccountConfig>) -> Result<ReconcileOutcome> {
        let mut instances = self.instances.write().await;

        let current: BTreeSet<i64> = instances.keys().copied().collect();
        let plan = reconciler::plan(&accounts, &current);
        let mut outcome = ReconcileOutcome::default();

        for login in &plan.remove {
            if let Some(mut instance) = instances.remove(login) {
                if let Err(e) = instance.stop(self.grace_period).await {
                    warn!("Stop during reconcile failed for login {login}: {e}");
                }
                info!("Removed instance {login} (absent or disabled)");
                outcome.removed.push(*login);
            }
        }

        for account in plan.update {
            let login = account.login;
            if let Some(instance) = instances.get_mut(&login) {
                instance.set_config(account);
                outcome.updated.push(login);
            }
        }

        for account in plan.create {
            let login = account.login;
            instances.insert(login, WorkerInstance::new(account));
            info!("Created instance {login}");
            outcome.created.push(login);
        }

        drop(instances);
        self.refresh_views().await;
        Ok(outcome)
    }

    /// Start one instance; rejected if its process is already live
    pub async fn start(&self, login: i64) -> Result<()> {
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(&login)
            .ok_or(FleetError::UnknownLogin(login))?;
        let result = instance.start(&self.worker_command);
        drop(instances);

        self.refresh_views().await;
        result
    }

    /// Stop one instance and remove its sandbox
    pub async fn stop(&self, login: i64) -> Result<()> {
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(&login)
            .ok_or(FleetError::UnknownLogin(login))?;
        let result = instance.stop(self.grace_period).await;
        drop(instances);

        self.refresh_views().await;
        result
    }

    /// Start every instance without a live process; returns how many started
    pub async fn start_all(&self) -> usize {
        let mut started = 0;
        let mut instances = self.instances.write().await;
        for (login, instance) in instances.iter_mut() {
            if instance.has_live_process() {
                continue;
            }
            match instance.start(&self.worker_command) {
                Ok(()) => started += 1,
                Err(e) => warn!("Start failed for login {login}: {e}"),
            }
        }
        drop(instances);

        self.refresh_views().await;
        started
    }

    /// Stop every instance; returns how many had a live process
    pub async fn stop_all(&self) -> usize {
        let mut stopped = 0;
        let mut instances = self.instances.write().await;
        for (login, instance) in instances.iter_mut() {
            let was_live = instance.has_live_process();
            if let Err(e) = instance.stop(self.grace_period).await {
                warn!("Stop failed for login {login}: {e}");
            }
            if was_live {
                stopped += 1;
            }
        }
        drop(instances);

        self.refresh_views().await;
        stopped
    }

    /// One supervisor tick: refresh liveness and bridge state for every
    /// instance, then recompute the cached views and totals
    pub async fn poll_tick(&self) {
        let mut instances = self.instances.write().await;
        for instance in instances.values_mut() {
            instance.poll().await;
        }
        let views: Vec<InstanceView> = instances.values().map(|i| i.view()).collect();
        drop(instances);

        self.publish(views).await;
    }

    /// Stop the whole fleet; used on application shutdown
    pub async fn shutdown(&self) {
        let stopped = self.stop_all().await;
        info!("Fleet shut down ({stopped} workers stopped)");
    }

    /// Cached per-instance views from the latest tick or command
    pub async fn views(&self) -> Vec<InstanceView> {
        self.views.read().await.clone()
    }

    /// Cached view of a single instance
    pub async fn view(&self, login: i64) -> Option<InstanceView> {
        self.views
            .read()
            .await
            .iter()
            .find(|v| v.login == login)
            .cloned()
    }

    /// Cached aggregate totals from the latest tick or command
    pub async fn totals(&self) -> FleetTotals {
        self.totals.read().await.clone()
    }

    /// Deal history for one instance, most recent first.
    ///
    /// Read on demand rather than cached: deals accumulate and are only
    /// wanted when a frontend asks.
    pub async fn deals(&self, login: i64, limit: i64) -> Result<Vec<crate::domain::DealRecord>> {
        let instances = self.instances.read().await;
        let instance = instances
            .get(&login)
            .ok_or(FleetError::UnknownLogin(login))?;
        let Some(path) = instance.store_path() else {
            return Ok(Vec::new());
        };
        drop(instances);

        match crate::bridge::BridgeReader::open(&path).await? {
            Some(reader) => reader.deals(limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Number of registered instances
    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Rebuild cached views/totals without touching the bridges
    async fn refresh_views(&self) {
        let instances = self.instances.read().await;
        let views: Vec<InstanceView> = instances.values().map(|i| i.view()).collect();
        drop(instances);

        self.publish(views).await;
    }

    async fn publish(&self, views: Vec<InstanceView>) {
        let totals = aggregator::aggregate(&views);
        *self.views.write().await = views;
        *self.totals.write().await = totals;
    }
}
