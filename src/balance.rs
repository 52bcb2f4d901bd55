// 🗓️ Leave Balance Entity - per-employee, per-type, per-year entitlement
//
// The invariant that everything else depends on:
//   remaining_days = total_days + carry_over_days - used_days
//
// A balance is identified two ways:
// - Surrogate id (SQLite rowid) - assigned by the store, 0 until persisted
// - Natural key (employee_id, leave_type_id, balance_year) - intended unique,
//   but the store tolerates transient duplicates that the conflict resolver
//   must fold back into one authoritative record

use crate::error::{BalanceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// MERGE POLICY
// ============================================================================

/// How a single quantity field is reconciled when two records for the same
/// natural key are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldRule {
    /// Add both sides (loss-free for recorded usage and allocations)
    Sum,

    /// Keep the larger side
    Max,

    /// Latest wins: the incoming record's value replaces the existing one
    Incoming,
}

impl FieldRule {
    fn apply(self, existing: f64, incoming: f64) -> f64 {
        match self {
            FieldRule::Sum => existing + incoming,
            FieldRule::Max => existing.max(incoming),
            FieldRule::Incoming => incoming,
        }
    }
}

/// Field-by-field merge rules for duplicate balances.
///
/// The precedence of each field is a policy choice, not something the ledger
/// can infer, so it is carried as an explicit value on the resolver. The
/// default sums usage and allocation (no recorded day is ever lost) and keeps
/// the larger carry-over. `remaining_days` is never merged directly; it is
/// recomputed from the invariant after every merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    pub total_days: FieldRule,
    pub used_days: FieldRule,
    pub carry_over_days: FieldRule,
}

impl MergePolicy {
    pub fn new() -> Self {
        MergePolicy {
            total_days: FieldRule::Sum,
            used_days: FieldRule::Sum,
            carry_over_days: FieldRule::Max,
        }
    }

    /// Latest-wins on every field (kept available for corrective re-imports,
    /// not the default because it can drop recorded usage)
    pub fn latest_wins() -> Self {
        MergePolicy {
            total_days: FieldRule::Incoming,
            used_days: FieldRule::Incoming,
            carry_over_days: FieldRule::Incoming,
        }
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// LEAVE BALANCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveBalance {
    /// Surrogate identity assigned by the store (0 = not yet persisted)
    #[serde(default)]
    pub id: i64,

    // Natural key
    pub employee_id: i64,
    pub leave_type_id: i64,
    pub balance_year: i32,

    // Quantities (days; half days are legal)
    pub total_days: f64,
    pub used_days: f64,
    pub carry_over_days: f64,

    /// Derived: total + carry_over - used. Recomputed after every mutation,
    /// never written directly.
    pub remaining_days: f64,

    /// Set to the current instant (UTC, the fixed operational timezone) on
    /// every write
    pub last_updated: DateTime<Utc>,
}

impl LeaveBalance {
    /// Fresh allocation: zero usage, zero carry-over
    pub fn new(employee_id: i64, leave_type_id: i64, balance_year: i32, total_days: f64) -> Self {
        LeaveBalance {
            id: 0,
            employee_id,
            leave_type_id,
            balance_year,
            total_days,
            used_days: 0.0,
            carry_over_days: 0.0,
            remaining_days: total_days,
            last_updated: Utc::now(),
        }
    }

    /// Natural key tuple (employee, leave type, year)
    pub fn natural_key(&self) -> (i64, i64, i32) {
        (self.employee_id, self.leave_type_id, self.balance_year)
    }

    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    /// Re-derive remaining from the invariant and refresh the timestamp
    pub fn recompute_remaining(&mut self) {
        self.remaining_days = self.total_days + self.carry_over_days - self.used_days;
        self.last_updated = Utc::now();
    }

    /// Check the quantity invariants. Called before any persist.
    pub fn validate(&self) -> Result<()> {
        if self.total_days < 0.0 {
            return Err(BalanceError::Validation(format!(
                "total_days must be >= 0, got {}",
                self.total_days
            )));
        }
        if self.used_days < 0.0 {
            return Err(BalanceError::Validation(format!(
                "used_days must be >= 0, got {}",
                self.used_days
            )));
        }
        if self.carry_over_days < 0.0 {
            return Err(BalanceError::Validation(format!(
                "carry_over_days must be >= 0, got {}",
                self.carry_over_days
            )));
        }
        if self.used_days > self.total_days + self.carry_over_days {
            return Err(BalanceError::Validation(format!(
                "used_days {} exceeds total + carry-over {}",
                self.used_days,
                self.total_days + self.carry_over_days
            )));
        }
        Ok(())
    }

    /// Pure merge of two records sharing a natural key.
    ///
    /// Returns a new record carrying `self`'s identity with quantities
    /// reconciled field by field under `policy` and remaining recomputed from
    /// the invariant. With `Sum`/`Max` rules the operation is commutative and
    /// associative, so folding any number of duplicates gives the same result
    /// regardless of order.
    pub fn merged_with(&self, incoming: &LeaveBalance, policy: &MergePolicy) -> LeaveBalance {
        let mut merged = LeaveBalance {
            id: self.id,
            employee_id: self.employee_id,
            leave_type_id: self.leave_type_id,
            balance_year: self.balance_year,
            total_days: policy.total_days.apply(self.total_days, incoming.total_days),
            used_days: policy.used_days.apply(self.used_days, incoming.used_days),
            carry_over_days: policy
                .carry_over_days
                .apply(self.carry_over_days, incoming.carry_over_days),
            remaining_days: 0.0,
            last_updated: Utc::now(),
        };
        merged.recompute_remaining();
        merged
    }
}

// ============================================================================
// TESTS
// ============================================================================
