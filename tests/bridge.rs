//! Write/read contracts of the data bridge.

use chrono::Utc;

use termfleet::bridge::{store_path, BridgeReader, BridgeWriter};
use termfleet::domain::{
    AccountSnapshot, DealRecord, PositionRecord, PositionSide, WorkerState, WorkerStatusRecord,
};

fn snapshot(login: i64, balance: f64) -> AccountSnapshot {
    AccountSnapshot {
        login,
        server: "Demo".into(),
        name: format!("Account {login}"),
        company: "Test Co".into(),
        currency: "USD".into(),
        leverage: 100,
        balance,
        equity: balance + 25.0,
        margin: 100.0,
        margin_free: balance - 75.0,
        margin_level: 1_234.5,
        profit: 25.0,
        timestamp: Utc::now(),
    }
}

fn position(ticket: i64, side: PositionSide) -> PositionRecord {
    PositionRecord {
        ticket,
        symbol: "EURUSD".into(),
        side,
        volume: 0.10,
        price_open: 1.1000,
        price_current: 1.1012,
        profit: 12.0,
        swap: -0.3,
        commission: -0.5,
        open_time: Utc::now(),
        comment: String::new(),
    }
}

fn deal(ticket: i64) -> DealRecord {
    DealRecord {
        ticket,
        order_ticket: ticket - 1,
        time: Utc::now(),
        deal_type: 0,
        entry: 1,
        symbol: "EURUSD".into(),
        volume: 0.10,
        price: 1.1005,
        commission: -0.5,
        swap: 0.0,
        profit: 4.2,
        comment: String::new(),
    }
}

#[tokio::test]
async fn test_snapshot_is_replaced_wholesale() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(dir.path(), 111);
    let writer = BridgeWriter::open(&path).await.unwrap();

    writer.replace_snapshot(&snapshot(111, 1_000.0)).await.unwrap();
    writer.replace_snapshot(&snapshot(111, 2_000.0)).await.unwrap();

    let reader = BridgeReader::open(&path).await.unwrap().unwrap();
    let read = reader.snapshot().await.unwrap().unwrap();
    assert_eq!(read.login, 111);
    assert_eq!(read.balance, 2_000.0);
}

#[tokio::test]
async fn test_positions_mirror_current_set_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(dir.path(), 111);
    let writer = BridgeWriter::open(&path).await.unwrap();
    let reader = BridgeReader::open(&path).await.unwrap().unwrap();

    // cycle with three open positions
    writer
        .replace_positions(&[
            position(1, PositionSide::Buy),
            position(2, PositionSide::Sell),
            position(3, PositionSide::Buy),
        ])
        .await
        .unwrap();
    assert_eq!(reader.positions().await.unwrap().len(), 3);

    // next cycle everything is closed: exactly zero rows, no stale union
    writer.replace_positions(&[]).await.unwrap();
    assert!(reader.positions().await.unwrap().is_empty());

    // and a later cycle with a fresh set shows only that set
    writer
        .replace_positions(&[position(9, PositionSide::Sell)])
        .await
        .unwrap();
    let current = reader.positions().await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].ticket, 9);
    assert_eq!(current[0].side, PositionSide::Sell);
}

#[tokio::test]
async fn test_deals_accumulate_by_ticket() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(dir.path(), 111);
    let writer = BridgeWriter::open(&path).await.unwrap();
    let reader = BridgeReader::open(&path).await.unwrap().unwrap();

    writer.upsert_deals(&[deal(10), deal(11)]).await.unwrap();
    // overlapping window re-reports ticket 11
    writer.upsert_deals(&[deal(11), deal(12)]).await.unwrap();

    let deals = reader.deals(100).await.unwrap();
    let mut tickets: Vec<i64> = deals.iter().map(|d| d.ticket).collect();
    tickets.sort_unstable();
    assert_eq!(tickets, vec![10, 11, 12]);
}

#[tokio::test]
async fn test_status_row_reflects_latest_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(dir.path(), 111);
    let writer = BridgeWriter::open(&path).await.unwrap();
    let reader = BridgeReader::open(&path).await.unwrap().unwrap();

    writer
        .write_status(&WorkerStatusRecord::new(111, WorkerState::Running, true))
        .await
        .unwrap();
    writer
        .write_status(&WorkerStatusRecord::new(
            111,
            WorkerState::Error("feed down".into()),
            false,
        ))
        .await
        .unwrap();

    let status = reader.status().await.unwrap().unwrap();
    assert_eq!(status.login, 111);
    assert_eq!(status.status, WorkerState::Error("feed down".into()));
    assert!(!status.connected);
}

#[tokio::test]
async fn test_missing_store_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(dir.path(), 999);
    assert!(BridgeReader::open(&path).await.unwrap().is_none());
}

#[tokio::test]
async fn test_reader_survives_writer_going_away() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(dir.path(), 111);

    {
        let writer = BridgeWriter::open(&path).await.unwrap();
        writer.replace_snapshot(&snapshot(111, 500.0)).await.unwrap();
        writer
            .write_status(&WorkerStatusRecord::new(111, WorkerState::Running, true))
            .await
            .unwrap();
    }
    // writer pool dropped; a fresh reader still sees the last cycle
    let reader = BridgeReader::open(&path).await.unwrap().unwrap();
    assert_eq!(reader.snapshot().await.unwrap().unwrap().balance, 500.0);
    assert_eq!(
        reader.status().await.unwrap().unwrap().status,
        WorkerState::Running
    );
}
