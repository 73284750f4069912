//! Read side of the data bridge, run by the supervisor and frontends.
//!
//! Never writes. A nonexistent store file is an empty snapshot, not an error;
//! transient lock contention is retried rather than surfaced.

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;

use crate::domain::{
    AccountSnapshot, DealRecord, PositionRecord, PositionSide, WorkerState, WorkerStatusRecord,
};
use crate::error::{FleetError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);
const LOCK_RETRIES: u32 = 3;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Read-only handle to a sandbox bridge store
pub struct BridgeReader {
    pool: SqlitePool,
}

impl BridgeReader {
    /// Open a store read-only; `Ok(None)` when the file does not exist yet
    pub async fn open(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Some(Self { pool }))
    }

    /// Latest account snapshot, if the worker has written one
    pub async fn snapshot(&self) -> Result<Option<AccountSnapshot>> {
        let row = self
            .with_retry(|pool| {
                Box::pin(async move {
                    sqlx::query(
                        r#"
                        SELECT login, server, name, company, currency, leverage, balance,
                               equity, margin, margin_free, margin_level, profit, timestamp
                        FROM account_snapshot WHERE id = 1
                        "#,
                    )
                    .fetch_optional(pool)
                    .await
                })
            })
            .await?;

        Ok(row.map(|r| AccountSnapshot {
            login: r.get("login"),
            server: r.get("server"),
            name: r.get("name"),
            company: r.get("company"),
            currency: r.get("currency"),
            leverage: r.get("leverage"),
            balance: r.get("balance"),
            equity: r.get("equity"),
            margin: r.get("margin"),
            margin_free: r.get("margin_free"),
            margin_level: r.get("margin_level"),
            profit: r.get("profit"),
            timestamp: r.get("timestamp"),
        }))
    }

    /// Exactly the open positions of the most recent completed cycle
    pub async fn positions(&self) -> Result<Vec<PositionRecord>> {
        let rows = self
            .with_retry(|pool| {
                Box::pin(async move {
                    sqlx::query(
                        r#"
                        SELECT ticket, symbol, side, volume, price_open, price_current,
                               profit, swap, commission, open_time, comment
                        FROM positions ORDER BY ticket
                        "#,
                    )
                    .fetch_all(pool)
                    .await
                })
            })
            .await?;

        rows.iter()
            .map(|r| {
                let side_raw: String = r.get("side");
                let side = PositionSide::parse(&side_raw).ok_or_else(|| {
                    FleetError::CorruptStore(format!("unknown position side: {side_raw}"))
                })?;
                Ok(PositionRecord {
                    ticket: r.get("ticket"),
                    symbol: r.get("symbol"),
                    side,
                    volume: r.get("volume"),
                    price_open: r.get("price_open"),
                    price_current: r.get("price_current"),
                    profit: r.get("profit"),
                    swap: r.get("swap"),
                    commission: r.get("commission"),
                    open_time: r.get("open_time"),
                    comment: r.get("comment"),
                })
            })
            .collect()
    }

    /// Most recent deals first, bounded by `limit`
    pub async fn deals(&self, limit: i64) -> Result<Vec<DealRecord>> {
        let rows = self
            .with_retry(move |pool| {
                Box::pin(async move {
                    sqlx::query(
                        r#"
                        SELECT ticket, order_ticket, time, deal_type, entry, symbol, volume,
                               price, commission, swap, profit, comment
                        FROM deals ORDER BY time DESC LIMIT ?
                        "#,
                    )
                    .bind(limit)
                    .fetch_all(pool)
                    .await
                })
            })
            .await?;

        Ok(rows
            .iter()
            .map(|r| DealRecord {
                ticket: r.get("ticket"),
                order_ticket: r.get("order_ticket"),
                time: r.get("time"),
                deal_type: r.get("deal_type"),
                entry: r.get("entry"),
                symbol: r.get("symbol"),
                volume: r.get("volume"),
                price: r.get("price"),
                commission: r.get("commission"),
                swap: r.get("swap"),
                profit: r.get("profit"),
                comment: r.get("comment"),
            })
            .collect())
    }

    /// Latest worker status row, if one has been written
    pub async fn status(&self) -> Result<Option<WorkerStatusRecord>> {
        let row = self
            .with_retry(|pool| {
                Box::pin(async move {
                    sqlx::query(
                        r#"
                        SELECT login, status, connected, last_update, error_message
                        FROM worker_status WHERE id = 1
                        "#,
                    )
                    .fetch_optional(pool)
                    .await
                })
            })
            .await?;

        Ok(row.map(|r| {
            let status_raw: String = r.get("status");
            let error_message: String = r.get("error_message");
            WorkerStatusRecord {
                login: r.get("login"),
                status: WorkerState::parse(&status_raw, &error_message),
                connected: r.get("connected"),
                last_update: r.get("last_update"),
            }
        }))
    }

    /// Run a query, retrying a few times on transient lock contention
    async fn with_retry<T>(
        &self,
        op: impl for<'c> Fn(&'c SqlitePool) -> BoxFuture<'c, sqlx::Result<T>>,
    ) -> sqlx::Result<T> {
        let mut delay = LOCK_RETRY_DELAY;
        for _ in 0..LOCK_RETRIES {
            match op(&self.pool).await {
                Err(e) if is_locked(&e) => {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                other => return other,
            }
        }
        op(&self.pool).await
    }
}

fn is_locked(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db)
            if db.message().contains("locked") || db.message().contains("busy")
    )
}
