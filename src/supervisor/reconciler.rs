//! Diffing the declarative account list against the live instance set.
//!
//! Pure planning: the fleet applies the plan. Disabled entries are treated
//! the same as absent ones, so a login flipped to `enabled = false` is
//! force-stopped and removed.

use std::collections::BTreeSet;

use crate::config::AccountConfig;

/// What a reconciliation pass will do, keyed by login
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// Logins new to the fleet; instances are created `Stopped`
    pub create: Vec<AccountConfig>,
    /// Logins already present; config replaced in place, no restart
    pub update: Vec<AccountConfig>,
    /// Logins gone from (or disabled in) the source; force-stopped and removed
    pub remove: Vec<i64>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

/// Build the plan for a desired account list against the current login set
pub fn plan(desired: &[AccountConfig], current: &BTreeSet<i64>) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    let mut desired_logins = BTreeSet::new();
    for account in desired {
        if !account.enabled {
            continue;
        }
        desired_logins.insert(account.login);

        if current.contains(&account.login) {
            plan.update.push(account.clone());
        } else {
            plan.create.push(account.clone());
        }
    }

    for login in current {
        if !desired_logins.contains(login) {
            plan.remove.push(*login);
        }
    }

    plan
}
