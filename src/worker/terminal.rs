//! Seam to the external trading terminal.
//!
//! The terminal itself is an opaque, vendor-supplied system; everything the
//! worker needs from it goes through [`TerminalApi`]. The crate ships a
//! deterministic simulated implementation so the fleet runs end-to-end
//! without a proprietary terminal installed; deployments swap in a real
//! adapter behind the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

use crate::domain::{AccountSnapshot, DealRecord, PositionRecord, PositionSide};
use crate::error::{FleetError, Result};

/// Everything needed to establish a terminal session
#[derive(Clone)]
pub struct ConnectParams {
    pub login: i64,
    pub password: String,
    pub server: String,
    pub terminal_path: PathBuf,
}

/// Operations the worker needs from the terminal.
///
/// The data shapes are externally fixed and map directly onto the bridge
/// records. Any call may fail or time out; the worker's own loop handles
/// retry, the supervisor never intervenes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TerminalApi: Send {
    /// Establish (or re-establish) a session
    async fn connect(&mut self, params: &ConnectParams) -> Result<()>;

    /// Current account summary
    async fn account_summary(&mut self) -> Result<AccountSnapshot>;

    /// All currently-open positions
    async fn open_positions(&mut self) -> Result<Vec<PositionRecord>>;

    /// Deals closed since `since`
    async fn recent_deals(&mut self, since: DateTime<Utc>) -> Result<Vec<DealRecord>>;

    /// Tear the session down
    async fn disconnect(&mut self);
}

/// Deterministic stand-in terminal.
///
/// Produces a plausible stream of account data derived from the login and a
/// cycle counter. Connecting requires the configured terminal path to exist,
/// which mirrors how a real terminal rejects a bad installation path.
pub struct SimTerminal {
    login: i64,
    server: String,
    cycle: u64,
    connected: bool,
}

impl SimTerminal {
    pub fn new() -> Self {
        Self {
            login: 0,
            server: String::new(),
            cycle: 0,
            connected: false,
        }
    }

    fn base_balance(&self) -> f64 {
        10_000.0 + (self.login % 997) as f64
    }

    fn floating_profit(&self) -> f64 {
        (self.cycle as f64 * 0.25).sin() * 50.0
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(FleetError::Connection("no terminal session".into()))
        }
    }
}

impl Default for SimTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TerminalApi for SimTerminal {
    async fn connect(&mut self, params: &ConnectParams) -> Result<()> {
        if !params.terminal_path.exists() {
            return Err(FleetError::Connection(format!(
                "terminal not found at {}",
                params.terminal_path.display()
            )));
        }
        self.login = params.login;
        self.server = params.server.clone();
        self.connected = true;
        Ok(())
    }

    async fn account_summary(&mut self) -> Result<AccountSnapshot> {
        self.ensure_connected()?;
        self.cycle += 1;

        let balance = self.base_balance();
        let profit = self.floating_profit();
        let equity = balance + profit;
        let margin = 150.0 + (self.cycle % 7) as f64 * 10.0;

        Ok(AccountSnapshot {
            login: self.login,
            server: self.server.clone(),
            name: format!("Account {}", self.login),
            company: "Sim Brokerage Ltd".into(),
            currency: "USD".into(),
            leverage: 100,
            balance,
            equity,
            margin,
            margin_free: equity - margin,
            margin_level: if margin > 0.0 {
                equity / margin * 100.0
            } else {
                0.0
            },
            profit,
            timestamp: Utc::now(),
        })
    }

    async fn open_positions(&mut self) -> Result<Vec<PositionRecord>> {
        self.ensure_connected()?;

        let count = (self.cycle % 4) as i64;
        let positions = (0..count)
            .map(|i| {
                let side = if (self.cycle as i64 + i) % 2 == 0 {
                    PositionSide::Buy
                } else {
                    PositionSide::Sell
                };
                PositionRecord {
                    ticket: self.login * 1_000 + i,
                    symbol: if i % 2 == 0 { "EURUSD" } else { "XAUUSD" }.into(),
                    side,
                    volume: 0.1 * (i + 1) as f64,
                    price_open: 1.1000 + i as f64 * 0.001,
                    price_current: 1.1000 + i as f64 * 0.001 + self.floating_profit() / 10_000.0,
                    profit: self.floating_profit() / (count.max(1)) as f64,
                    swap: -0.12 * i as f64,
                    commission: -0.5,
                    open_time: Utc::now() - Duration::minutes(5 * (i + 1)),
                    comment: String::new(),
                }
            })
            .collect();

        Ok(positions)
    }

    async fn recent_deals(&mut self, since: DateTime<Utc>) -> Result<Vec<DealRecord>> {
        self.ensure_connected()?;

        // One closed deal every fifth cycle
        if self.cycle % 5 != 0 || self.cycle == 0 {
            return Ok(Vec::new());
        }

        Ok(vec![DealRecord {
            ticket: self.login * 10_000 + self.cycle as i64,
            order_ticket: self.login * 10_000 + self.cycle as i64 - 1,
            time: since.max(Utc::now() - Duration::minutes(1)),
            deal_type: (self.cycle % 2) as i64,
            entry: 1,
            symbol: "EURUSD".into(),
            volume: 0.1,
            price: 1.1005,
            commission: -0.5,
            swap: 0.0,
            profit: self.floating_profit() / 2.0,
            comment: String::new(),
        }])
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }
}
