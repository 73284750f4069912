//! Portfolio-wide totals across the fleet.

use serde::{Deserialize, Serialize};

use crate::supervisor::instance::InstanceView;

/// Aggregated balance/equity/profit plus instance counts.
///
/// An instance that has never produced a snapshot contributes zero to the
/// sums; that is normal for a freshly started or stopped worker, not an
/// error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetTotals {
    pub balance: f64,
    pub equity: f64,
    pub profit: f64,
    pub running: usize,
    pub total: usize,
}

/// Sum snapshots and count running instances
pub fn aggregate(views: &[InstanceView]) -> FleetTotals {
    let mut totals = FleetTotals {
        total: views.len(),
        ..Default::default()
    };

    for view in views {
        if view.is_running() {
            totals.running += 1;
        }
        if let Some(snapshot) = &view.snapshot {
            totals.balance += snapshot.balance;
            totals.equity += snapshot.equity;
            totals.profit += snapshot.profit;
        }
    }

    totals
}
