// 💾 Balance Store - keyed SQLite storage for leave balances
//
// Pure storage plus simple listing queries. No business rules live here;
// the conflict resolver, ledger and year-end processor own those and reuse
// the crate-internal row helpers below inside their own transactions.
//
// The connection location is injected at construction (file path or
// in-memory), never baked in, so every test run gets an isolated instance.

use crate::balance::LeaveBalance;
use crate::error::{BalanceError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tracing::debug;

const BALANCE_COLUMNS: &str = "id, employee_id, leave_type_id, balance_year, \
     total_days, used_days, carry_over_days, remaining_days, last_updated";

pub struct BalanceStore {
    pub(crate) conn: Connection,
}

impl BalanceStore {
    /// Open (or create) a file-backed store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_schema(&conn)?;
        debug!(path = %path.display(), "opened balance store");
        Ok(BalanceStore { conn })
    }

    /// Isolated in-memory store (one per test run)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_schema(&conn)?;
        Ok(BalanceStore { conn })
    }

    /// Persist a new balance and assign its identity.
    ///
    /// Constraint violations (the CHECK constraints on quantities) surface as
    /// `Persistence`; logically invalid balances are caught first as
    /// `Validation`. Note: this does NOT guard the natural key - creation
    /// must go through the conflict resolver for that.
    pub fn create(&self, balance: &mut LeaveBalance) -> Result<()> {
        balance.validate()?;
        insert_row(&self.conn, balance)?;
        debug!(
            id = balance.id,
            employee = balance.employee_id,
            leave_type = balance.leave_type_id,
            year = balance.balance_year,
            "created balance"
        );
        Ok(())
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<LeaveBalance>> {
        fetch_by_id(&self.conn, id)
    }

    /// Authoritative record for a natural key. When transient duplicates
    /// exist, the earliest row (lowest id) wins until the resolver runs.
    pub fn find_by_key(
        &self,
        employee_id: i64,
        leave_type_id: i64,
        year: i32,
    ) -> Result<Option<LeaveBalance>> {
        fetch_by_key(&self.conn, employee_id, leave_type_id, year)
    }

    /// Every record sharing a natural key, earliest first (resolver input)
    pub fn find_all_by_key(
        &self,
        employee_id: i64,
        leave_type_id: i64,
        year: i32,
    ) -> Result<Vec<LeaveBalance>> {
        fetch_all_by_key(&self.conn, employee_id, leave_type_id, year)
    }

    /// All balances for an employee, optionally scoped to one year.
    /// Ordered by year descending, then leave type ascending.
    pub fn list_for_employee(
        &self,
        employee_id: i64,
        year: Option<i32>,
    ) -> Result<Vec<LeaveBalance>> {
        match year {
            Some(y) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {BALANCE_COLUMNS} FROM leave_balances
                     WHERE employee_id = ?1 AND balance_year = ?2
                     ORDER BY balance_year DESC, leave_type_id ASC"
                ))?;
                let rows = stmt.query_map(params![employee_id, y], row_to_balance)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {BALANCE_COLUMNS} FROM leave_balances
                     WHERE employee_id = ?1
                     ORDER BY balance_year DESC, leave_type_id ASC"
                ))?;
                let rows = stmt.query_map(params![employee_id], row_to_balance)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
        }
    }

    /// All balances for a year, ordered by employee then leave type
    pub fn list_for_year(&self, year: i32) -> Result<Vec<LeaveBalance>> {
        fetch_for_year(&self.conn, year)
    }

    /// Update an existing balance by id
    pub fn update(&self, balance: &mut LeaveBalance) -> Result<()> {
        if balance.id <= 0 {
            return Err(BalanceError::not_found(format!(
                "cannot update unpersisted balance (id {})",
                balance.id
            )));
        }
        balance.validate()?;
        let affected = update_row(&self.conn, balance)?;
        if affected == 0 {
            return Err(BalanceError::not_found(format!("balance id {}", balance.id)));
        }
        Ok(())
    }

    /// Delete by id; returns whether a row was removed
    pub fn delete(&self, id: i64) -> Result<bool> {
        let affected = delete_row(&self.conn, id)?;
        Ok(affected > 0)
    }

    /// All-or-nothing batch update: if any record's update affects zero rows
    /// the whole batch is rolled back and reported as NotFound.
    ///
    /// The caller's records are only stamped with the persisted timestamps
    /// after the transaction commits; a failed batch leaves them untouched.
    pub fn update_batch(&mut self, balances: &mut [LeaveBalance]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut written = Vec::with_capacity(balances.len());
        for balance in balances.iter() {
            balance.validate()?;
            let mut pending = balance.clone();
            let affected = update_row(&tx, &mut pending)?;
            if affected == 0 {
                // tx dropped here -> rollback
                return Err(BalanceError::not_found(format!(
                    "balance id {} in batch update",
                    balance.id
                )));
            }
            written.push(pending.last_updated);
        }
        tx.commit()?;

        for (balance, last_updated) in balances.iter_mut().zip(written) {
            balance.last_updated = last_updated;
        }
        debug!(count = balances.len(), "batch update committed");
        Ok(balances.len())
    }

    /// Year-scoped records that still have days to spend
    pub fn expiring_balances(&self, year: i32) -> Result<Vec<LeaveBalance>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BALANCE_COLUMNS} FROM leave_balances
             WHERE balance_year = ?1 AND remaining_days > 0
             ORDER BY remaining_days DESC, employee_id ASC"
        ))?;
        let rows = stmt.query_map(params![year], row_to_balance)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Year-scoped records at or below the threshold but not yet exhausted
    pub fn low_balances(&self, year: i32, threshold: f64) -> Result<Vec<LeaveBalance>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BALANCE_COLUMNS} FROM leave_balances
             WHERE balance_year = ?1 AND remaining_days > 0 AND remaining_days <= ?2
             ORDER BY remaining_days ASC, employee_id ASC"
        ))?;
        let rows = stmt.query_map(params![year, threshold], row_to_balance)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM leave_balances", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn setup_schema(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery on file databases
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // Natural key index is deliberately NOT unique: the store tolerates
    // transient duplicates, the conflict resolver eliminates them
    conn.execute(
        "CREATE TABLE IF NOT EXISTS leave_balances (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_id INTEGER NOT NULL,
            leave_type_id INTEGER NOT NULL,
            balance_year INTEGER NOT NULL,
            total_days REAL NOT NULL CHECK (total_days >= 0),
            used_days REAL NOT NULL CHECK (used_days >= 0),
            carry_over_days REAL NOT NULL CHECK (carry_over_days >= 0),
            remaining_days REAL NOT NULL,
            last_updated TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_balances_natural_key
         ON leave_balances(employee_id, leave_type_id, balance_year)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_balances_year ON leave_balances(balance_year)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW HELPERS (crate-internal, reused inside service transactions)
// ============================================================================

pub(crate) fn insert_row(conn: &Connection, balance: &mut LeaveBalance) -> Result<()> {
    balance.last_updated = Utc::now();
    conn.execute(
        "INSERT INTO leave_balances (
            employee_id, leave_type_id, balance_year,
            total_days, used_days, carry_over_days, remaining_days, last_updated
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            balance.employee_id,
            balance.leave_type_id,
            balance.balance_year,
            balance.total_days,
            balance.used_days,
            balance.carry_over_days,
            balance.remaining_days,
            balance.last_updated.to_rfc3339(),
        ],
    )?;
    balance.id = conn.last_insert_rowid();
    Ok(())
}

pub(crate) fn update_row(conn: &Connection, balance: &mut LeaveBalance) -> Result<usize> {
    balance.last_updated = Utc::now();
    let affected = conn.execute(
        "UPDATE leave_balances SET
            employee_id = ?1, leave_type_id = ?2, balance_year = ?3,
            total_days = ?4, used_days = ?5, carry_over_days = ?6,
            remaining_days = ?7, last_updated = ?8
         WHERE id = ?9",
        params![
            balance.employee_id,
            balance.leave_type_id,
            balance.balance_year,
            balance.total_days,
            balance.used_days,
            balance.carry_over_days,
            balance.remaining_days,
            balance.last_updated.to_rfc3339(),
            balance.id,
        ],
    )?;
    Ok(affected)
}

pub(crate) fn delete_row(conn: &Connection, id: i64) -> Result<usize> {
    let affected = conn.execute("DELETE FROM leave_balances WHERE id = ?1", params![id])?;
    Ok(affected)
}

pub(crate) fn fetch_by_id(conn: &Connection, id: i64) -> Result<Option<LeaveBalance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BALANCE_COLUMNS} FROM leave_balances WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![id], row_to_balance)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub(crate) fn fetch_by_key(
    conn: &Connection,
    employee_id: i64,
    leave_type_id: i64,
    year: i32,
) -> Result<Option<LeaveBalance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BALANCE_COLUMNS} FROM leave_balances
         WHERE employee_id = ?1 AND leave_type_id = ?2 AND balance_year = ?3
         ORDER BY id ASC LIMIT 1"
    ))?;
    let mut rows = stmt.query_map(params![employee_id, leave_type_id, year], row_to_balance)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub(crate) fn fetch_all_by_key(
    conn: &Connection,
    employee_id: i64,
    leave_type_id: i64,
    year: i32,
) -> Result<Vec<LeaveBalance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BALANCE_COLUMNS} FROM leave_balances
         WHERE employee_id = ?1 AND leave_type_id = ?2 AND balance_year = ?3
         ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map(params![employee_id, leave_type_id, year], row_to_balance)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn fetch_for_year(conn: &Connection, year: i32) -> Result<Vec<LeaveBalance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BALANCE_COLUMNS} FROM leave_balances
         WHERE balance_year = ?1
         ORDER BY employee_id ASC, leave_type_id ASC"
    ))?;
    let rows = stmt.query_map(params![year], row_to_balance)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn row_to_balance(row: &Row<'_>) -> rusqlite::Result<LeaveBalance> {
    let last_updated_str: String = row.get(8)?;
    let last_updated = DateTime::parse_from_rfc3339(&last_updated_str)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(LeaveBalance {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        leave_type_id: row.get(2)?,
        balance_year: row.get(3)?,
        total_days: row.get(4)?,
        used_days: row.get(5)?,
        carry_over_days: row.get(6)?,
        remaining_days: row.get(7)?,
        last_updated,
    })
}

// ============================================================================
// TESTS
// ============================================================================
