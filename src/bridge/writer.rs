//! Write side of the data bridge, run inside the worker process.
//!
//! Each table write is one transaction, so stopping the worker mid-write
//! never leaves a reader with a half-replaced table.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::domain::{AccountSnapshot, DealRecord, PositionRecord, WorkerState, WorkerStatusRecord};
use crate::error::Result;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Single-writer handle to a sandbox bridge store
pub struct BridgeWriter {
    pool: SqlitePool,
}

impl BridgeWriter {
    /// Create or open the store and ensure the schema exists
    pub async fn open(path: &Path) -> Result<Self> {
        // Rollback journal, not WAL: readers must be able to open the store
        // read-only after the writer process is gone.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for statement in super::SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        debug!("Bridge store ready at {}", path.display());
        Ok(Self { pool })
    }

    /// Replace the single account snapshot row
    pub async fn replace_snapshot(&self, snapshot: &AccountSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO account_snapshot
            (id, login, server, name, company, currency, leverage, balance,
             equity, margin, margin_free, margin_level, profit, timestamp)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.login)
        .bind(&snapshot.server)
        .bind(&snapshot.name)
        .bind(&snapshot.company)
        .bind(&snapshot.currency)
        .bind(snapshot.leverage)
        .bind(snapshot.balance)
        .bind(snapshot.equity)
        .bind(snapshot.margin)
        .bind(snapshot.margin_free)
        .bind(snapshot.margin_level)
        .bind(snapshot.profit)
        .bind(snapshot.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace the positions table with exactly the currently-open set.
    ///
    /// Delete-all plus bulk insert in one transaction: a reader observes
    /// either the previous cycle's set or this one, never a mixture.
    pub async fn replace_positions(&self, positions: &[PositionRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM positions").execute(&mut *tx).await?;

        for position in positions {
            sqlx::query(
                r#"
                INSERT INTO positions
                (ticket, symbol, side, volume, price_open, price_current,
                 profit, swap, commission, open_time, comment)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(position.ticket)
            .bind(&position.symbol)
            .bind(position.side.as_str())
            .bind(position.volume)
            .bind(position.price_open)
            .bind(position.price_current)
            .bind(position.profit)
            .bind(position.swap)
            .bind(position.commission)
            .bind(position.open_time)
            .bind(&position.comment)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Replaced positions table with {} rows", positions.len());
        Ok(())
    }

    /// Upsert deals by ticket; existing history is never pruned
    pub async fn upsert_deals(&self, deals: &[DealRecord]) -> Result<()> {
        if deals.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for deal in deals {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO deals
                (ticket, order_ticket, time, deal_type, entry, symbol, volume,
                 price, commission, swap, profit, comment)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(deal.ticket)
            .bind(deal.order_ticket)
            .bind(deal.time)
            .bind(deal.deal_type)
            .bind(deal.entry)
            .bind(&deal.symbol)
            .bind(deal.volume)
            .bind(deal.price)
            .bind(deal.commission)
            .bind(deal.swap)
            .bind(deal.profit)
            .bind(&deal.comment)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Upserted {} deals", deals.len());
        Ok(())
    }

    /// Write the end-of-cycle status row.
    ///
    /// Always the last write of a cycle, success or failure.
    pub async fn write_status(&self, record: &WorkerStatusRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO worker_status
            (id, login, status, connected, last_update, error_message)
            VALUES (1, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.login)
        .bind(record.status.as_str())
        .bind(record.connected)
        .bind(record.last_update)
        .bind(record.status.error_message().unwrap_or(""))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convenience wrapper stamping `last_update` with the current time
    pub async fn report(&self, login: i64, status: WorkerState, connected: bool) -> Result<()> {
        self.write_status(&WorkerStatusRecord::new(login, status, connected))
            .await
    }
}
