// Leave Ledger - Core Library
// Per-employee, per-leave-type, per-year balances with duplicate
// reconciliation, atomic ledger operations, year-end processing and
// read-only reporting

pub mod balance;
pub mod conflict;
pub mod error;
pub mod ledger;
pub mod reporting;
pub mod store;
pub mod yearend;

// Re-export commonly used types
pub use balance::{FieldRule, LeaveBalance, MergePolicy};
pub use conflict::ConflictResolver;
pub use error::{BalanceError, Result};
pub use ledger::{credit, deduct};
pub use reporting::{
    availability, department_utilization, employee_summary, expiring_balances, low_balances,
    utilization_rate, DepartmentDirectory, DepartmentUtilization, EmployeeLeaveSummary,
    InMemoryDirectory,
};
pub use store::BalanceStore;
pub use yearend::{
    initialize_year, load_allocations, process_carry_over, reset_for_new_year, AllocationMap,
    CarryOverSummary, YearInitSummary,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
