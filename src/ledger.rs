// Ledger operations - day-to-day deduct / credit against one balance
//
// Each call is one transaction: the current row is re-read inside it (never a
// stale snapshot), validated, mutated and written back. A failure at any step
// leaves the stored record exactly as it was.

use crate::balance::LeaveBalance;
use crate::error::{BalanceError, Result};
use crate::store::{self, BalanceStore};
use tracing::debug;

/// Consume leave days.
///
/// Fails with `InsufficientBalance` when no record exists for the key or the
/// remaining days are fewer than requested; the record is left unchanged.
pub fn deduct(
    store: &mut BalanceStore,
    employee_id: i64,
    leave_type_id: i64,
    year: i32,
    days: f64,
) -> Result<LeaveBalance> {
    require_positive_days(days)?;

    let tx = store.conn.transaction()?;

    let mut balance = match store::fetch_by_key(&tx, employee_id, leave_type_id, year)? {
        Some(b) => b,
        None => return Err(BalanceError::insufficient(0.0, days)),
    };

    if balance.remaining_days < days {
        return Err(BalanceError::insufficient(balance.remaining_days, days));
    }

    balance.used_days += days;
    balance.recompute_remaining();
    balance.validate()?;

    let affected = store::update_row(&tx, &mut balance)?;
    if affected == 0 {
        return Err(BalanceError::not_found(format!("balance id {}", balance.id)));
    }
    tx.commit()?;

    debug!(
        employee = employee_id,
        leave_type = leave_type_id,
        year,
        days,
        remaining = balance.remaining_days,
        "deducted leave"
    );
    Ok(balance)
}

/// Reverse a cancelled consumption.
///
/// Fails with `NotFound` when no record exists. Crediting is not capped by
/// the allocation - it only reverses prior deductions - but used days are
/// floored at zero: crediting more than was ever deducted is a `Validation`
/// error and nothing is written.
pub fn credit(
    store: &mut BalanceStore,
    employee_id: i64,
    leave_type_id: i64,
    year: i32,
    days: f64,
) -> Result<LeaveBalance> {
    require_positive_days(days)?;

    let tx = store.conn.transaction()?;

    let mut balance = store::fetch_by_key(&tx, employee_id, leave_type_id, year)?.ok_or_else(
        || {
            BalanceError::not_found(format!(
                "employee {employee_id}, leave type {leave_type_id}, year {year}"
            ))
        },
    )?;

    if days > balance.used_days {
        return Err(BalanceError::Validation(format!(
            "credit of {} days exceeds recorded usage of {}",
            days, balance.used_days
        )));
    }

    balance.used_days -= days;
    balance.recompute_remaining();

    let affected = store::update_row(&tx, &mut balance)?;
    if affected == 0 {
        return Err(BalanceError::not_found(format!("balance id {}", balance.id)));
    }
    tx.commit()?;

    debug!(
        employee = employee_id,
        leave_type = leave_type_id,
        year,
        days,
        remaining = balance.remaining_days,
        "credited leave"
    );
    Ok(balance)
}

fn require_positive_days(days: f64) -> Result<()> {
    if days <= 0.0 || !days.is_finite() {
        return Err(BalanceError::Validation(format!(
            "day count must be positive and finite, got {days}"
        )));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_balance(total: f64, used: f64, carry: f64) -> BalanceStore {
        let store = BalanceStore::open_in_memory().unwrap();
        let mut b = LeaveBalance::new(7, 2, 2024, total);
        b.used_days = used;
        b.carry_over_days = carry;
        b.recompute_remaining();
        store.create(&mut b).unwrap();
        store
    }

    #[test]
    fn test_deduct_decrements_remaining() {
        let mut store = store_with_balance(20.0, 0.0, 0.0);

        let balance = deduct(&mut store, 7, 2, 2024, 3.5).unwrap();

        assert_eq!(balance.used_days, 3.5);
        assert_eq!(balance.remaining_days, 16.5);

        let persisted = store.find_by_key(7, 2, 2024).unwrap().unwrap();
        assert_eq!(persisted.used_days, 3.5);
    }

    #[test]
    fn test_deduct_boundary() {
        // total=10, used=8, carry=0 -> remaining=2
        let mut store = store_with_balance(10.0, 8.0, 0.0);

        // deduct(3) fails and leaves the record unchanged
        let err = deduct(&mut store, 7, 2, 2024, 3.0).unwrap_err();
        match err {
            BalanceError::InsufficientBalance { remaining, requested } => {
                assert_eq!(remaining, 2.0);
                assert_eq!(requested, 3.0);
            }
            other => panic!("expected InsufficientBalance, got {other:?}"),
        }
        let untouched = store.find_by_key(7, 2, 2024).unwrap().unwrap();
        assert_eq!(untouched.used_days, 8.0);
        assert_eq!(untouched.remaining_days, 2.0);

        // deduct(2) succeeds: used=10, remaining=0
        let balance = deduct(&mut store, 7, 2, 2024, 2.0).unwrap();
        assert_eq!(balance.used_days, 10.0);
        assert_eq!(balance.remaining_days, 0.0);
    }

    #[test]
    fn test_deduct_missing_record_is_insufficient() {
        let mut store = BalanceStore::open_in_memory().unwrap();
        let err = deduct(&mut store, 1, 1, 2024, 1.0).unwrap_err();
        assert!(matches!(err, BalanceError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_deduct_spends_carry_over() {
        // remaining = 5 total + 3 carry = 8
        let mut store = store_with_balance(5.0, 0.0, 3.0);
        let balance = deduct(&mut store, 7, 2, 2024, 7.0).unwrap();
        assert_eq!(balance.remaining_days, 1.0);
    }

    #[test]
    fn test_credit_reversal_round_trip() {
        let mut store = store_with_balance(20.0, 6.0, 0.0);
        let before = store.find_by_key(7, 2, 2024).unwrap().unwrap();

        deduct(&mut store, 7, 2, 2024, 4.0).unwrap();
        let after = credit(&mut store, 7, 2, 2024, 4.0).unwrap();

        assert_eq!(after.used_days, before.used_days);
        assert_eq!(after.remaining_days, before.remaining_days);
    }

    #[test]
    fn test_credit_missing_record_is_not_found() {
        let mut store = BalanceStore::open_in_memory().unwrap();
        let err = credit(&mut store, 1, 1, 2024, 1.0).unwrap_err();
        assert!(matches!(err, BalanceError::NotFound(_)));
    }

    #[test]
    fn test_credit_beyond_usage_is_rejected() {
        let mut store = store_with_balance(20.0, 2.0, 0.0);

        let err = credit(&mut store, 7, 2, 2024, 3.0).unwrap_err();
        assert!(matches!(err, BalanceError::Validation(_)));

        // Floor held: nothing was written
        let untouched = store.find_by_key(7, 2, 2024).unwrap().unwrap();
        assert_eq!(untouched.used_days, 2.0);
    }

    #[test]
    fn test_non_positive_days_rejected() {
        let mut store = store_with_balance(20.0, 5.0, 0.0);
        assert!(matches!(
            deduct(&mut store, 7, 2, 2024, 0.0).unwrap_err(),
            BalanceError::Validation(_)
        ));
        assert!(matches!(
            credit(&mut store, 7, 2, 2024, -1.0).unwrap_err(),
            BalanceError::Validation(_)
        ));
    }
}
