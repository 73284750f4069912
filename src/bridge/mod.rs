//! Cross-process data bridge over a per-sandbox SQLite store.
//!
//! The worker is the single writer; the supervisor and any frontends are
//! readers. An embedded transactional store is used instead of a live RPC
//! channel so the monitor side can read independently of worker liveness,
//! partial writes within one cycle are never visible, and the bridge survives
//! supervisor restarts.

pub mod reader;
pub mod writer;

pub use reader::BridgeReader;
pub use writer::BridgeWriter;

use std::path::{Path, PathBuf};

/// Location of the bridge store inside a sandbox
pub fn store_path(sandbox: &Path, login: i64) -> PathBuf {
    sandbox.join(format!("bridge_{login}.db"))
}

/// Schema for the four logical tables.
///
/// `account_snapshot` and `worker_status` are single-row tables (id pinned to
/// 1); `positions` is replaced wholesale per cycle; `deals` accumulates by
/// ticket.
pub(crate) const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS account_snapshot (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        login INTEGER NOT NULL,
        server TEXT NOT NULL,
        name TEXT NOT NULL,
        company TEXT NOT NULL,
        currency TEXT NOT NULL,
        leverage INTEGER NOT NULL,
        balance REAL NOT NULL,
        equity REAL NOT NULL,
        margin REAL NOT NULL,
        margin_free REAL NOT NULL,
        margin_level REAL NOT NULL,
        profit REAL NOT NULL,
        timestamp TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS positions (
        ticket INTEGER PRIMARY KEY,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        volume REAL NOT NULL,
        price_open REAL NOT NULL,
        price_current REAL NOT NULL,
        profit REAL NOT NULL,
        swap REAL NOT NULL,
        commission REAL NOT NULL,
        open_time TEXT NOT NULL,
        comment TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS deals (
        ticket INTEGER PRIMARY KEY,
        order_ticket INTEGER NOT NULL,
        time TEXT NOT NULL,
        deal_type INTEGER NOT NULL,
        entry INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        volume REAL NOT NULL,
        price REAL NOT NULL,
        commission REAL NOT NULL,
        swap REAL NOT NULL,
        profit REAL NOT NULL,
        comment TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS worker_status (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        login INTEGER NOT NULL,
        status TEXT NOT NULL,
        connected BOOLEAN NOT NULL,
        last_update TEXT NOT NULL,
        error_message TEXT NOT NULL DEFAULT ''
    )
    "#,
];
