//! Account, position and deal records exchanged over the data bridge.
//!
//! The field shapes mirror what the external terminal API reports; the bridge
//! persists them verbatim so the monitor side can reconstruct them without
//! talking to the terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Latest known account summary for one instance.
///
/// One logical row per instance, fully replaced each write cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub login: i64,
    pub server: String,
    pub name: String,
    pub company: String,
    pub currency: String,
    pub leverage: i64,
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub margin_free: f64,
    pub margin_level: f64,
    pub profit: f64,
    pub timestamp: DateTime<Utc>,
}

/// Direction of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Buy,
    Sell,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Buy => "BUY",
            PositionSide::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(PositionSide::Buy),
            "SELL" => Some(PositionSide::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One currently-open position.
///
/// The bridge's `positions` table always mirrors the exact set of open
/// positions; the full table is replaced every write cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub ticket: i64,
    pub symbol: String,
    pub side: PositionSide,
    pub volume: f64,
    pub price_open: f64,
    pub price_current: f64,
    pub profit: f64,
    pub swap: f64,
    pub commission: f64,
    pub open_time: DateTime<Utc>,
    pub comment: String,
}

/// One historical deal, keyed by ticket.
///
/// Deals accumulate in the bridge (upsert by ticket) and are never pruned
/// here. `deal_type` and `entry` are the terminal's own numeric codes and are
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealRecord {
    pub ticket: i64,
    pub order_ticket: i64,
    pub time: DateTime<Utc>,
    pub deal_type: i64,
    pub entry: i64,
    pub symbol: String,
    pub volume: f64,
    pub price: f64,
    pub commission: f64,
    pub swap: f64,
    pub profit: f64,
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_side_roundtrip() {
        assert_eq!(PositionSide::parse("BUY"), Some(PositionSide::Buy));
        assert_eq!(PositionSide::parse("sell"), Some(PositionSide::Sell));
        assert_eq!(PositionSide::parse("HOLD"), None);
        assert_eq!(PositionSide::Buy.as_str(), "BUY");
    }
}
