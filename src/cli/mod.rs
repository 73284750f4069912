//! Command-line interface.
//!
//! `run` hosts the supervisor; `worker` is the internal entry point the
//! supervisor spawns into a sandbox. Everything else is a thin HTTP client
//! against a running supervisor's control API.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tabled::{Table, Tabled};

use crate::server::FleetPosition;
use crate::supervisor::{FleetTotals, InstanceView, ReconcileOutcome};
use crate::worker::WorkerArgs;

#[derive(Parser)]
#[command(name = "termfleet")]
#[command(version = "0.1.0")]
#[command(about = "Multi-account trading terminal fleet supervisor", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (TOML)
    #[arg(short, long)]
    pub config: Option<std::path::PathBuf>,

    /// Base URL of a running supervisor's control API
    #[arg(long, env = "TERMFLEET_API", default_value = "http://127.0.0.1:8420")]
    pub api: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the supervisor
    Run,

    /// Worker entry point (spawned by the supervisor, not for direct use)
    #[command(hide = true)]
    Worker(WorkerArgs),

    /// Show per-account status
    Status {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show all open positions across the fleet
    Positions {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show deal history for one account
    Deals {
        /// Account login
        login: i64,
        /// Maximum number of deals to show
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: i64,
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show portfolio totals
    Totals,

    /// Start one account's worker
    Start {
        /// Account login
        login: i64,
    },

    /// Stop one account's worker
    Stop {
        /// Account login
        login: i64,
    },

    /// Start every account without a live worker
    StartAll,

    /// Stop every worker
    StopAll,

    /// Re-read the account list and reconcile
    Reload,
}

/// HTTP client for the supervisor's control API
pub struct ApiClient {
    base: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ApiClient {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let url = format!("{}{path}", self.base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed; is the supervisor running?"))?;
        Self::decode(response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let url = format!("{}{path}", self.base);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("POST {url} failed; is the supervisor running?"))?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> anyhow::Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.error)
                .unwrap_or_else(|_| status.to_string());
            bail!("{message}")
        }
    }

    pub async fn status(&self) -> anyhow::Result<Vec<InstanceView>> {
        self.get_json("/status").await
    }

    pub async fn positions(&self) -> anyhow::Result<Vec<FleetPosition>> {
        self.get_json("/positions").await
    }

    pub async fn totals(&self) -> anyhow::Result<FleetTotals> {
        self.get_json("/totals").await
    }

    pub async fn deals(
        &self,
        login: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<crate::domain::DealRecord>> {
        self.get_json(&format!("/accounts/{login}/deals?limit={limit}"))
            .await
    }

    pub async fn start(&self, login: i64) -> anyhow::Result<serde_json::Value> {
        self.post_json(&format!("/accounts/{login}/start")).await
    }

    pub async fn stop(&self, login: i64) -> anyhow::Result<serde_json::Value> {
        self.post_json(&format!("/accounts/{login}/stop")).await
    }

    pub async fn start_all(&self) -> anyhow::Result<serde_json::Value> {
        self.post_json("/start-all").await
    }

    pub async fn stop_all(&self) -> anyhow::Result<serde_json::Value> {
        self.post_json("/stop-all").await
    }

    pub async fn reload(&self) -> anyhow::Result<ReconcileOutcome> {
        self.post_json("/reload").await
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "LOGIN")]
    login: i64,
    #[tabled(rename = "SERVER")]
    server: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "BALANCE")]
    balance: String,
    #[tabled(rename = "EQUITY")]
    equity: String,
    #[tabled(rename = "POSITIONS")]
    positions: usize,
    #[tabled(rename = "PROFIT")]
    profit: String,
    #[tabled(rename = "UPDATED")]
    updated: String,
}

#[derive(Tabled)]
struct PositionRow {
    #[tabled(rename = "LOGIN")]
    login: i64,
    #[tabled(rename = "TICKET")]
    ticket: i64,
    #[tabled(rename = "SYMBOL")]
    symbol: String,
    #[tabled(rename = "SIDE")]
    side: String,
    #[tabled(rename = "VOLUME")]
    volume: String,
    #[tabled(rename = "OPEN")]
    price_open: String,
    #[tabled(rename = "CURRENT")]
    price_current: String,
    #[tabled(rename = "PROFIT")]
    profit: String,
}

fn money(value: f64) -> String {
    format!("${value:.2}")
}

/// Print per-account status as a table or JSON
pub async fn show_status(client: &ApiClient, json: bool) -> anyhow::Result<()> {
    let views = client.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        println!("(no accounts configured)");
        return Ok(());
    }

    let rows: Vec<StatusRow> = views
        .iter()
        .map(|view| {
            let (balance, equity, profit) = match &view.snapshot {
                Some(s) => (money(s.balance), money(s.equity), money(s.profit)),
                None => ("-".into(), "-".into(), "-".into()),
            };
            StatusRow {
                name: view.name.clone(),
                login: view.login,
                server: view.server.clone(),
                state: match &view.error_message {
                    Some(message) => format!("{}: {message}", view.state),
                    None => view.state.clone(),
                },
                balance,
                equity,
                positions: view.positions.len(),
                profit,
                updated: view
                    .last_update
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".into()),
            }
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

/// Print all open positions as a table or JSON
pub async fn show_positions(client: &ApiClient, json: bool) -> anyhow::Result<()> {
    let positions = client.positions().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&positions)?);
        return Ok(());
    }

    if positions.is_empty() {
        println!("(no open positions)");
        return Ok(());
    }

    let rows: Vec<PositionRow> = positions
        .iter()
        .map(|p| PositionRow {
            login: p.login,
            ticket: p.position.ticket,
            symbol: p.position.symbol.clone(),
            side: p.position.side.to_string(),
            volume: format!("{:.2}", p.position.volume),
            price_open: format!("{:.5}", p.position.price_open),
            price_current: format!("{:.5}", p.position.price_current),
            profit: money(p.position.profit),
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

#[derive(Tabled)]
struct DealRow {
    #[tabled(rename = "TICKET")]
    ticket: i64,
    #[tabled(rename = "TIME")]
    time: String,
    #[tabled(rename = "SYMBOL")]
    symbol: String,
    #[tabled(rename = "VOLUME")]
    volume: String,
    #[tabled(rename = "PRICE")]
    price: String,
    #[tabled(rename = "PROFIT")]
    profit: String,
}

/// Print one account's deal history as a table or JSON
pub async fn show_deals(client: &ApiClient, login: i64, limit: i64, json: bool) -> anyhow::Result<()> {
    let deals = client.deals(login, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&deals)?);
        return Ok(());
    }

    if deals.is_empty() {
        println!("(no deals recorded)");
        return Ok(());
    }

    let rows: Vec<DealRow> = deals
        .iter()
        .map(|d| DealRow {
            ticket: d.ticket,
            time: d.time.format("%Y-%m-%d %H:%M:%S").to_string(),
            symbol: d.symbol.clone(),
            volume: format!("{:.2}", d.volume),
            price: format!("{:.5}", d.price),
            profit: money(d.profit),
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

/// Print portfolio totals
pub async fn show_totals(client: &ApiClient) -> anyhow::Result<()> {
    let totals = client.totals().await?;

    println!("Accounts:  {}/{} running", totals.running, totals.total);
    println!("Balance:   {}", money(totals.balance));
    println!("Equity:    {}", money(totals.equity));
    println!("Profit:    {}", money(totals.profit));
    Ok(())
}

/// Print the outcome of a reload
pub fn show_reload(outcome: &ReconcileOutcome) {
    println!(
        "Reconciled: {} created, {} updated, {} removed",
        outcome.created.len(),
        outcome.updated.len(),
        outcome.removed.len()
    );
}
