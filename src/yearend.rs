// 📅 Year-End Processor - bulk allocation, bounded carry-over, usage reset
//
// All three passes are batch operations over one balance year. The first two
// run inside a single transaction each: either every (employee, leave type)
// pair is handled or the store is left exactly as it was. There is no
// partial-year state.

use crate::balance::LeaveBalance;
use crate::error::{BalanceError, Result};
use crate::store::{self, BalanceStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// employee -> (leave type -> allocated days). BTreeMap keeps batch
/// processing order deterministic.
pub type AllocationMap = BTreeMap<i64, BTreeMap<i64, f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearInitSummary {
    pub year: i32,
    pub created: usize,
    pub already_present: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryOverSummary {
    pub from_year: i32,
    pub to_year: i32,
    pub rolled_over: usize,
    pub skipped: usize,
}

/// Bulk-initialize a year's allocations.
///
/// Pairs that already hold a balance for the year count as satisfied and are
/// not touched (calling this twice with the same map is a no-op the second
/// time). Any failure rolls the entire initialization back.
pub fn initialize_year(
    store: &mut BalanceStore,
    year: i32,
    allocations: &AllocationMap,
) -> Result<YearInitSummary> {
    let tx = store.conn.transaction()?;

    let mut created = 0;
    let mut already_present = 0;

    for (&employee_id, types) in allocations {
        for (&leave_type_id, &days) in types {
            if store::fetch_by_key(&tx, employee_id, leave_type_id, year)?.is_some() {
                already_present += 1;
                continue;
            }
            let mut balance = LeaveBalance::new(employee_id, leave_type_id, year, days);
            balance.validate()?;
            store::insert_row(&tx, &mut balance)?;
            created += 1;
        }
    }

    tx.commit()?;
    info!(year, created, already_present, "year initialization committed");
    Ok(YearInitSummary {
        year,
        created,
        already_present,
    })
}

/// Roll unused days forward into the next year, capped per balance.
///
/// For every `from_year` balance with a positive remainder, the carried
/// amount is `min(remaining, max_carry_over_days)`. An existing `to_year`
/// record has its carry-over overwritten with the cap; otherwise a fresh
/// record is created with no allocation or usage, only the carried days.
/// Zero and negative remainders are skipped. One transaction for the whole
/// pass.
pub fn process_carry_over(
    store: &mut BalanceStore,
    from_year: i32,
    to_year: i32,
    max_carry_over_days: f64,
) -> Result<CarryOverSummary> {
    if max_carry_over_days < 0.0 {
        return Err(BalanceError::Validation(format!(
            "max carry-over must be >= 0, got {max_carry_over_days}"
        )));
    }
    if from_year == to_year {
        return Err(BalanceError::Validation(format!(
            "carry-over source and target year are both {from_year}"
        )));
    }

    let tx = store.conn.transaction()?;

    let mut rolled_over = 0;
    let mut skipped = 0;

    for source in store::fetch_for_year(&tx, from_year)? {
        if source.remaining_days <= 0.0 {
            skipped += 1;
            continue;
        }
        let capped = source.remaining_days.min(max_carry_over_days);

        match store::fetch_by_key(&tx, source.employee_id, source.leave_type_id, to_year)? {
            Some(mut target) => {
                target.carry_over_days = capped;
                target.recompute_remaining();
                target.validate()?;
                let affected = store::update_row(&tx, &mut target)?;
                if affected == 0 {
                    return Err(BalanceError::not_found(format!("balance id {}", target.id)));
                }
            }
            None => {
                let mut target = LeaveBalance::new(source.employee_id, source.leave_type_id, to_year, 0.0);
                target.carry_over_days = capped;
                target.recompute_remaining();
                store::insert_row(&tx, &mut target)?;
            }
        }

        debug!(
            employee = source.employee_id,
            leave_type = source.leave_type_id,
            remaining = source.remaining_days,
            capped,
            "carried over"
        );
        rolled_over += 1;
    }

    tx.commit()?;
    info!(from_year, to_year, rolled_over, skipped, "carry-over pass committed");
    Ok(CarryOverSummary {
        from_year,
        to_year,
        rolled_over,
        skipped,
    })
}

/// Corrective reset: zero out usage for every record in a year, restoring
/// remaining to total + carry-over. One bulk statement. Returns the number
/// of records touched.
pub fn reset_for_new_year(store: &mut BalanceStore, year: i32) -> Result<usize> {
    let affected = store.conn.execute(
        "UPDATE leave_balances SET
            used_days = 0,
            remaining_days = total_days + carry_over_days,
            last_updated = ?1
         WHERE balance_year = ?2",
        rusqlite::params![Utc::now().to_rfc3339(), year],
    )?;
    info!(year, affected, "usage reset");
    Ok(affected)
}

// ============================================================================
// ALLOCATION CSV LOADER (CLI initialization path)
// ============================================================================

#[derive(Debug, Deserialize)]
struct AllocationRecord {
    employee_id: i64,
    leave_type_id: i64,
    total_days: f64,
}

/// Load an allocation map from CSV with header
/// `employee_id,leave_type_id,total_days`
pub fn load_allocations(csv_path: &Path) -> Result<AllocationMap> {
    let mut rdr = csv::Reader::from_path(csv_path).map_err(|e| {
        BalanceError::Validation(format!("failed to open allocation CSV: {e}"))
    })?;

    let mut allocations = AllocationMap::new();
    for result in rdr.deserialize() {
        let record: AllocationRecord = result.map_err(|e| {
            BalanceError::Validation(format!("bad allocation row: {e}"))
        })?;
        allocations
            .entry(record.employee_id)
            .or_default()
            .insert(record.leave_type_id, record.total_days);
    }
    Ok(allocations)
}

// ============================================================================
// TESTS
// ============================================================================
