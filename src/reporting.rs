// 📊 Reporting - read-only aggregation over the balance store
//
// Nothing here opens a transaction or writes; reports are computed from
// whatever is currently at rest. Department placement comes from an external
// directory collaborator behind a trait so payroll's real directory and the
// in-memory test double are interchangeable.

use crate::balance::LeaveBalance;
use crate::error::Result;
use crate::store::BalanceStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Percent of the year's allocation consumed. Zero-allocation balances
/// (carry-over-only records) report 0 rather than dividing by zero.
pub fn utilization_rate(balance: &LeaveBalance) -> f64 {
    if balance.total_days == 0.0 {
        return 0.0;
    }
    balance.used_days / balance.total_days * 100.0
}

/// Days the employee can still plan with: remainder plus the carried days
/// exposed separately for summaries
pub fn availability(balance: &LeaveBalance) -> f64 {
    balance.remaining_days + balance.carry_over_days
}

// ============================================================================
// ORGANIZATIONAL DIRECTORY (external collaborator)
// ============================================================================

/// Resolves an employee to a department name. Read-only; owned by the
/// organizational directory outside this core.
pub trait DepartmentDirectory {
    fn department_of(&self, employee_id: i64) -> Option<String>;
}

/// Map-backed directory for tests and CLI runs
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    departments: HashMap<i64, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, employee_id: i64, department: impl Into<String>) {
        self.departments.insert(employee_id, department.into());
    }
}

impl DepartmentDirectory for InMemoryDirectory {
    fn department_of(&self, employee_id: i64) -> Option<String> {
        self.departments.get(&employee_id).cloned()
    }
}

// ============================================================================
// REPORT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeLeaveSummary {
    pub employee_id: i64,
    pub year: i32,
    pub balances: Vec<LeaveBalance>,
    pub total_allocated: f64,
    pub total_used: f64,
    pub total_remaining: f64,
    pub utilization_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentUtilization {
    pub department: String,
    pub year: i32,
    pub employee_count: usize,
    pub total_allocated: f64,
    pub total_used: f64,
    pub total_remaining: f64,
    pub utilization_rate: f64,
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Per-employee rollup across leave types for one year
pub fn employee_summary(
    store: &BalanceStore,
    employee_id: i64,
    year: i32,
) -> Result<EmployeeLeaveSummary> {
    let balances = store.list_for_employee(employee_id, Some(year))?;

    let total_allocated: f64 = balances.iter().map(|b| b.total_days).sum();
    let total_used: f64 = balances.iter().map(|b| b.used_days).sum();
    let total_remaining: f64 = balances.iter().map(|b| b.remaining_days).sum();
    let rate = if total_allocated == 0.0 {
        0.0
    } else {
        total_used / total_allocated * 100.0
    };

    Ok(EmployeeLeaveSummary {
        employee_id,
        year,
        balances,
        total_allocated,
        total_used,
        total_remaining,
        utilization_rate: rate,
    })
}

/// Department-level utilization for one year, sorted by department name.
/// Employees the directory cannot place are grouped under "Unassigned".
pub fn department_utilization(
    store: &BalanceStore,
    directory: &dyn DepartmentDirectory,
    year: i32,
) -> Result<Vec<DepartmentUtilization>> {
    struct Accumulator {
        employees: HashSet<i64>,
        allocated: f64,
        used: f64,
        remaining: f64,
    }

    let mut by_department: BTreeMap<String, Accumulator> = BTreeMap::new();

    for balance in store.list_for_year(year)? {
        let department = directory
            .department_of(balance.employee_id)
            .unwrap_or_else(|| "Unassigned".to_string());

        let acc = by_department.entry(department).or_insert_with(|| Accumulator {
            employees: HashSet::new(),
            allocated: 0.0,
            used: 0.0,
            remaining: 0.0,
        });
        acc.employees.insert(balance.employee_id);
        acc.allocated += balance.total_days;
        acc.used += balance.used_days;
        acc.remaining += balance.remaining_days;
    }

    Ok(by_department
        .into_iter()
        .map(|(department, acc)| DepartmentUtilization {
            department,
            year,
            employee_count: acc.employees.len(),
            total_allocated: acc.allocated,
            total_used: acc.used,
            total_remaining: acc.remaining,
            utilization_rate: if acc.allocated == 0.0 {
                0.0
            } else {
                acc.used / acc.allocated * 100.0
            },
        })
        .collect())
}

/// Balances with unused days that will lapse at year end (minus capped
/// carry-over handled by the year-end processor)
pub fn expiring_balances(store: &BalanceStore, year: i32) -> Result<Vec<LeaveBalance>> {
    store.expiring_balances(year)
}

/// Balances running out: positive remainder at or below the threshold
pub fn low_balances(store: &BalanceStore, year: i32, threshold: f64) -> Result<Vec<LeaveBalance>> {
    store.low_balances(year, threshold)
}

// ============================================================================
// TESTS
// ============================================================================
